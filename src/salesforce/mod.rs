//! One-way import from Volunteers for Salesforce.
//!
//! The CRM is only ever read from. [`Crm`] is the seam the rest of the crate
//! talks to: [`SalesforceClient`] implements it over the REST API, and tests
//! swap in a fake with canned records.

use std::fmt;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

pub mod client;
pub mod records;
pub mod sync;

pub use client::SalesforceClient;
pub use sync::{sync, SyncReport};

#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("could not reach Salesforce: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Salesforce login failed: {0}")]
    Auth(String),
    #[error("Salesforce returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response from Salesforce: {0}")]
    Decode(String),
    #[error("{0}")]
    InvalidQuery(String),
}

/// Credentials for the OAuth username-password flow.
#[derive(Clone, PartialEq)]
pub struct SalesforceConfig {
    pub login_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    /// Appended to the password, unless logging in from a trusted IP range
    pub security_token: Option<String>,
    pub api_version: String,
}

impl fmt::Debug for SalesforceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SalesforceConfig")
            .field("login_url", &self.login_url)
            .field("username", &self.username)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

/// Who the CRM session is logged in as.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmIdentity {
    pub user_info: Option<Value>,
    pub organization_id: Option<String>,
}

#[async_trait]
pub trait Crm: Send + Sync {
    async fn identity(&self) -> Result<CrmIdentity, CrmError>;

    /// The API names of every object type in the org.
    async fn list_objects(&self) -> Result<Vec<String>, CrmError>;

    /// Runs a SOQL query, returning every record across all result pages.
    async fn query(&self, soql: &str) -> Result<Vec<Value>, CrmError>;
}

/// Object names that can be interpolated into SOQL as-is.
pub fn is_valid_object_name(name: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_]+$")
        .map(|regex| regex.is_match(name))
        .unwrap_or(false)
}

/// Quotes a value for use inside a SOQL string literal.
pub fn soql_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if matches!(c, '\\' | '\'') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');

    quoted
}
