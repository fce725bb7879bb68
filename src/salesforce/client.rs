use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::salesforce::{soql_quote, Crm, CrmError, CrmIdentity, SalesforceConfig};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A Salesforce REST API client that logs in lazily and reuses its session.
pub struct SalesforceClient {
    config: SalesforceConfig,
    http: reqwest::Client,
    session: Mutex<Option<Session>>,
}

#[derive(Clone, Debug)]
struct Session {
    access_token: String,
    instance_url: String,
    /// e.g. `https://login.salesforce.com/id/<org id>/<user id>`
    identity_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryPage {
    records: Vec<Value>,
    #[serde(default)]
    done: bool,
    next_records_url: Option<String>,
}

#[derive(Deserialize)]
struct ObjectList {
    sobjects: Vec<ObjectSummary>,
}

#[derive(Deserialize)]
struct ObjectSummary {
    name: String,
}

impl SalesforceClient {
    pub fn new(config: SalesforceConfig) -> Result<Self, CrmError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            config,
            http,
            session: Mutex::new(None),
        })
    }

    async fn session(&self) -> Result<Session, CrmError> {
        let mut session = self.session.lock().await;
        if let Some(existing) = session.as_ref() {
            return Ok(existing.clone());
        }

        let fresh = self.login().await?;
        *session = Some(fresh.clone());
        Ok(fresh)
    }

    async fn login(&self) -> Result<Session, CrmError> {
        let url = format!(
            "{}/services/oauth2/token",
            self.config.login_url.trim_end_matches('/')
        );
        let password = format!(
            "{}{}",
            self.config.password,
            self.config.security_token.as_deref().unwrap_or("")
        );

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("username", self.config.username.as_str()),
                ("password", password.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(match api_error(response).await {
                CrmError::Api { message, .. } => CrmError::Auth(message),
                other => other,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|error| CrmError::Decode(error.to_string()))?;
        tracing::info!(instance = %token.instance_url, "logged in to Salesforce");

        Ok(Session {
            access_token: token.access_token,
            instance_url: token.instance_url,
            identity_url: token.id,
        })
    }

    /// GETs a path on the instance, e.g. `/services/data/v58.0/sobjects`.
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, CrmError> {
        let session = self.session().await?;
        let url = format!("{}{}", session.instance_url.trim_end_matches('/'), path);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&session.access_token)
            .query(query)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            // the session expired, log in again on the next call
            *self.session.lock().await = None;
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|error| CrmError::Decode(error.to_string()))
    }

    fn data_path(&self, rest: &str) -> String {
        format!("/services/data/{}/{}", self.config.api_version, rest)
    }
}

#[async_trait]
impl Crm for SalesforceClient {
    async fn identity(&self) -> Result<CrmIdentity, CrmError> {
        let session = self.session().await?;
        let soql = format!(
            "SELECT Id, Name, Email FROM User WHERE Username = {} LIMIT 1",
            soql_quote(&self.config.username)
        );
        let user_info = self.query(&soql).await?.into_iter().next();

        Ok(CrmIdentity {
            user_info,
            organization_id: organization_id(&session.identity_url),
        })
    }

    async fn list_objects(&self) -> Result<Vec<String>, CrmError> {
        let body = self.get(&self.data_path("sobjects"), &[]).await?;
        let objects: ObjectList =
            serde_json::from_value(body).map_err(|error| CrmError::Decode(error.to_string()))?;

        Ok(objects.sobjects.into_iter().map(|object| object.name).collect())
    }

    async fn query(&self, soql: &str) -> Result<Vec<Value>, CrmError> {
        let mut body = self.get(&self.data_path("query"), &[("q", soql)]).await?;
        let mut records = Vec::new();

        loop {
            let page: QueryPage = serde_json::from_value(body)
                .map_err(|error| CrmError::Decode(error.to_string()))?;
            records.extend(page.records);

            match page.next_records_url {
                Some(next) if !page.done => body = self.get(&next, &[]).await?,
                _ => break,
            }
        }

        tracing::debug!(records = records.len(), "ran SOQL query");
        Ok(records)
    }
}

/// Turns a failed response into an error carrying Salesforce's own message.
async fn api_error(response: Response) -> CrmError {
    let status = response.status().as_u16();
    let text = match response.text().await {
        Ok(text) => text,
        Err(error) => return CrmError::Http(error),
    };

    CrmError::Api {
        status,
        message: error_message(&text),
    }
}

/// Salesforce reports REST errors as `[{"message", "errorCode"}]` and OAuth
/// errors as `{"error", "error_description"}`.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = match &parsed {
        Some(Value::Array(errors)) => errors.first().and_then(|error| {
            let message = error.get("message")?.as_str()?;
            Some(match error.get("errorCode").and_then(Value::as_str) {
                Some(code) => format!("{}: {}", code, message),
                None => message.to_owned(),
            })
        }),
        Some(Value::Object(error)) => error
            .get("error_description")
            .or_else(|| error.get("error"))
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ => None,
    };

    message.unwrap_or_else(|| body.trim().to_owned())
}

/// The org id is the second to last segment of the identity URL.
fn organization_id(identity_url: &str) -> Option<String> {
    let mut segments = identity_url.trim_end_matches('/').rsplit('/');
    segments.next()?;
    segments
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_errors_keep_their_codes() {
        assert_eq!(
            error_message(r#"[{"message":"Session expired or invalid","errorCode":"INVALID_SESSION_ID"}]"#),
            "INVALID_SESSION_ID: Session expired or invalid"
        );
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"authentication failure"}"#),
            "authentication failure"
        );
        assert_eq!(error_message("Service Unavailable\n"), "Service Unavailable");
    }

    #[test]
    fn organization_ids_come_from_the_identity_url() {
        assert_eq!(
            organization_id("https://login.salesforce.com/id/00Dxx0000001gPL/005xx000001Sv6A"),
            Some("00Dxx0000001gPL".to_owned())
        );
        assert_eq!(organization_id("garbage"), None);
    }
}
