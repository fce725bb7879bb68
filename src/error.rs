//! Error handling for the API.
//!
//! Every failure a handler can produce is a variant of [`HubError`], which
//! knows its own status code and JSON body. Prefer adding a variant over
//! forcing a new failure into `Validation` or `Database`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::salesforce::CrmError;

/// The error enum for all error handling across the API.
///
/// See each variant for its status code and JSON body.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// \[404\] No record with the given id.
    ///
    /// ```json
    /// { "message": "resource not found", "reason": "no program with id 4" }
    /// ```
    #[error("no {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },
    /// \[400\] A required field was missing or a value was out of range.
    ///
    /// ```json
    /// { "message": "bad request", "reason": <what was wrong> }
    /// ```
    #[error("{0}")]
    Validation(String),
    /// \[400\] A foreign key pointed at a record that doesn't exist.
    #[error("no {entity} with id {id}")]
    BadReference { entity: &'static str, id: i64 },
    /// \[409\] The volunteer or participant is already signed up.
    #[error("already signed up")]
    AlreadySignedUp,
    /// \[409\] The opportunity, program, or workshop has no spots remaining.
    #[error("{entity} {id} has no spots remaining")]
    Full { entity: &'static str, id: i64 },
    /// \[409\] The change would break a uniqueness or dependency rule.
    #[error("{0}")]
    Conflict(String),
    /// \[502\] The CRM rejected or failed a request.
    ///
    /// ```json
    /// { "success": false, "message": <error message> }
    /// ```
    #[error(transparent)]
    Crm(#[from] CrmError),
    /// \[503\] No CRM credentials were configured.
    #[error("Salesforce credentials are not configured")]
    CrmDisabled,
    /// \[500\] The store failed.
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

pub type HubResult<T> = Result<T, HubError>;

impl HubError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        HubError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HubError::NotFound { .. } => StatusCode::NOT_FOUND,
            HubError::Validation(_) | HubError::BadReference { .. } => StatusCode::BAD_REQUEST,
            HubError::AlreadySignedUp | HubError::Full { .. } | HubError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            HubError::Crm(_) => StatusCode::BAD_GATEWAY,
            HubError::CrmDisabled => StatusCode::SERVICE_UNAVAILABLE,
            HubError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_json(&self) -> Value {
        match self {
            HubError::NotFound { .. } => json!({
                "message": "resource not found",
                "reason": self.to_string(),
            }),
            HubError::Validation(_) | HubError::BadReference { .. } => json!({
                "message": "bad request",
                "reason": self.to_string(),
            }),
            HubError::AlreadySignedUp => json!({
                "message": "already signed up",
            }),
            HubError::Full { .. } => json!({
                "message": "full",
                "reason": self.to_string(),
            }),
            HubError::Conflict(_) => json!({
                "message": "conflict",
                "reason": self.to_string(),
            }),
            HubError::Crm(_) | HubError::CrmDisabled => json!({
                "success": false,
                "message": self.to_string(),
            }),
            HubError::Database(error) => json!({
                "message": "database error",
                "error": error.to_string(),
            }),
        }
    }
}

impl From<sqlx::Error> for HubError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_error) = &error {
            let message = db_error.message();
            if message.contains("UNIQUE constraint failed") {
                return HubError::Conflict(format!(
                    "a record with that value already exists ({})",
                    message
                ));
            } else if message.contains("FOREIGN KEY constraint failed") {
                return HubError::Conflict("the record is referenced by other records".to_owned());
            } else if message.contains("CHECK constraint failed") {
                return HubError::Validation(format!("invalid value ({})", message));
            }
        }

        HubError::Database(error)
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        (status, Json(self.as_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        let error = HubError::Validation("name is required".to_owned());
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error.as_json(),
            json!({ "message": "bad request", "reason": "name is required" })
        );
    }

    #[test]
    fn capacity_and_duplicates_conflict() {
        assert_eq!(HubError::AlreadySignedUp.status(), StatusCode::CONFLICT);

        let full = HubError::Full {
            entity: "opportunity",
            id: 3,
        };
        assert_eq!(full.status(), StatusCode::CONFLICT);
        assert_eq!(full.as_json()["message"], "full");
        assert_eq!(
            full.as_json()["reason"],
            "opportunity 3 has no spots remaining"
        );
    }

    #[test]
    fn crm_errors_report_failure_payloads() {
        let error = HubError::Crm(CrmError::Api {
            status: 401,
            message: "INVALID_SESSION_ID".to_owned(),
        });
        assert_eq!(error.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(error.as_json()["success"], false);

        assert_eq!(HubError::CrmDisabled.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn not_found_names_the_record() {
        let error = HubError::not_found("program", 12);
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
        assert_eq!(error.as_json()["reason"], "no program with id 12");
    }
}
