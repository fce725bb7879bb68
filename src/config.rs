//! Settings read from the environment at startup.

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context as _, Result};

use crate::salesforce::SalesforceConfig;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://volunteer_hub.db";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_SALESFORCE_LOGIN_URL: &str = "https://login.salesforce.com";
pub const DEFAULT_SALESFORCE_API_VERSION: &str = "v58.0";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    /// Origins allowed to call the API with credentials
    pub cors_origins: Vec<String>,
    /// `None` unless every required credential is set
    pub salesforce: Option<SalesforceConfig>,
}

impl Config {
    /// Reads the config from the process environment. Call `dotenv` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let host = match var("HOST") {
            Some(host) => host
                .parse()
                .with_context(|| format!("HOST {:?} is not an IP address", host))?,
            None => IpAddr::from([0, 0, 0, 0]),
        };
        let port = match var("PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("PORT {:?} is not a valid port", port))?,
            None => 3000,
        };
        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_owned())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_owned)
            .collect();

        let salesforce = match (
            var("SALESFORCE_CLIENT_ID"),
            var("SALESFORCE_CLIENT_SECRET"),
            var("SALESFORCE_USERNAME"),
            var("SALESFORCE_PASSWORD"),
        ) {
            (Some(client_id), Some(client_secret), Some(username), Some(password)) => {
                Some(SalesforceConfig {
                    login_url: var("SALESFORCE_LOGIN_URL")
                        .unwrap_or_else(|| DEFAULT_SALESFORCE_LOGIN_URL.to_owned()),
                    client_id,
                    client_secret,
                    username,
                    password,
                    security_token: var("SALESFORCE_SECURITY_TOKEN"),
                    api_version: var("SALESFORCE_API_VERSION")
                        .unwrap_or_else(|| DEFAULT_SALESFORCE_API_VERSION.to_owned()),
                })
            }
            _ => None,
        };

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned()),
            host,
            port,
            cors_origins,
            salesforce,
        })
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_to_an_empty_environment() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.address(), SocketAddr::from(([0, 0, 0, 0], 3000)));
        assert_eq!(config.cors_origins, vec![DEFAULT_CORS_ORIGIN.to_owned()]);
        assert_eq!(config.salesforce, None);
    }

    #[test]
    fn cors_origins_are_comma_separated() {
        let config =
            config_from(&[("CORS_ORIGINS", "https://hub.example.org, http://localhost:5173,")])
                .unwrap();
        assert_eq!(
            config.cors_origins,
            vec!["https://hub.example.org", "http://localhost:5173"]
        );
    }

    #[test]
    fn bad_ports_fail_startup() {
        assert!(config_from(&[("PORT", "eighty")]).is_err());
        assert!(config_from(&[("PORT", "70000")]).is_err());
        assert_eq!(config_from(&[("PORT", "8080")]).unwrap().port, 8080);
    }

    #[test]
    fn salesforce_needs_every_credential() {
        let partial = config_from(&[
            ("SALESFORCE_CLIENT_ID", "id"),
            ("SALESFORCE_USERNAME", "hub@example.org"),
        ])
        .unwrap();
        assert_eq!(partial.salesforce, None);

        let full = config_from(&[
            ("SALESFORCE_CLIENT_ID", "id"),
            ("SALESFORCE_CLIENT_SECRET", "secret"),
            ("SALESFORCE_USERNAME", "hub@example.org"),
            ("SALESFORCE_PASSWORD", "password"),
        ])
        .unwrap();
        let salesforce = full.salesforce.unwrap();
        assert_eq!(salesforce.login_url, DEFAULT_SALESFORCE_LOGIN_URL);
        assert_eq!(salesforce.api_version, DEFAULT_SALESFORCE_API_VERSION);
        assert_eq!(salesforce.security_token, None);
    }
}
