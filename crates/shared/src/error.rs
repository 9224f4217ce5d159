//! Normalized error taxonomy for REST and real-time failures.

use serde::{Deserialize, Serialize};

/// RFC7807-ish error body returned by the ride backend.
///
/// The backend is not consistent about which field carries the human-readable
/// reason, so every known spelling is optional here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Attempt to pull a user-facing rejection reason out of a JSON error body.
/// Prefers `message`, then `detail`, `error` and finally `title`.
pub fn try_rejection_reason(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    [parsed.message, parsed.detail, parsed.error, parsed.title]
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
}

/// API error shapes every store sees.
///
/// Transport-specific failures are folded into one of these at the REST
/// boundary; stores never look at raw HTTP errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No response from the backend (unreachable, DNS, timeout).
    #[error("cannot reach server: {0}")]
    Connectivity(String),
    /// Credential rejected or expired.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller-supplied data rejected.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Expected absence, e.g. no active ride.
    #[error("not found: {0}")]
    NotFound(String),
    /// Duplicate identity or conflicting state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// 5xx-class response.
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    /// Success response that could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify a non-success HTTP status and its body.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let reason = try_rejection_reason(&body).unwrap_or_else(|| body.clone());
        match status {
            401 | 403 => ApiError::Unauthorized(reason),
            404 => ApiError::NotFound(reason),
            409 => ApiError::Conflict(reason),
            400..=499 => ApiError::Validation(reason),
            _ => ApiError::Server { status, body },
        }
    }

    /// Server-provided rejection reason, when there is one.
    pub fn reason(&self) -> Option<String> {
        match self {
            ApiError::Unauthorized(r)
            | ApiError::Validation(r)
            | ApiError::NotFound(r)
            | ApiError::Conflict(r) => Some(r.clone()).filter(|r| !r.trim().is_empty()),
            ApiError::Server { body, .. } => try_rejection_reason(body),
            ApiError::Connectivity(_) | ApiError::Decode(_) => None,
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, ApiError::Connectivity(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    /// Generic user-facing text for this error class.
    pub fn user_message(&self) -> &'static str {
        match self {
            ApiError::Connectivity(_) => {
                "Cannot reach the server. Check your connection and try again."
            }
            ApiError::Unauthorized(_) => "Your session has expired. Please log in again.",
            ApiError::Validation(_) => "Some of the information provided is invalid.",
            ApiError::NotFound(_) => "The requested item could not be found.",
            ApiError::Conflict(_) => "That request conflicts with existing data.",
            ApiError::Server { .. } => "Something went wrong on the server. Please try again later.",
            ApiError::Decode(_) => "The server sent an unexpected response.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(ApiError::from_status(401, ""), ApiError::Unauthorized(_)));
        assert!(matches!(ApiError::from_status(403, ""), ApiError::Unauthorized(_)));
        assert!(matches!(ApiError::from_status(404, ""), ApiError::NotFound(_)));
        assert!(matches!(ApiError::from_status(409, ""), ApiError::Conflict(_)));
        assert!(matches!(ApiError::from_status(422, ""), ApiError::Validation(_)));
        assert!(matches!(
            ApiError::from_status(503, "down"),
            ApiError::Server { status: 503, .. }
        ));
    }

    #[test]
    fn test_rejection_reason_prefers_message() {
        let body = r#"{"message":"Invalid email or password","error":"auth"}"#;
        assert_eq!(
            try_rejection_reason(body).as_deref(),
            Some("Invalid email or password")
        );
        assert_eq!(try_rejection_reason("not json"), None);
        assert_eq!(try_rejection_reason(r#"{"message":"  "}"#), None);
    }

    #[test]
    fn test_reason_from_classified_error() {
        let err = ApiError::from_status(400, r#"{"detail":"pickup is required"}"#);
        assert_eq!(err, ApiError::Validation("pickup is required".to_string()));
        assert_eq!(err.reason().as_deref(), Some("pickup is required"));
        assert_eq!(ApiError::Connectivity("refused".into()).reason(), None);
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let conn = ApiError::Connectivity(String::new()).user_message();
        let auth = ApiError::Unauthorized(String::new()).user_message();
        let invalid = ApiError::Validation(String::new()).user_message();
        let server = ApiError::Server { status: 500, body: String::new() }.user_message();
        assert_ne!(conn, auth);
        assert_ne!(conn, invalid);
        assert_ne!(auth, invalid);
        assert_ne!(server, conn);
    }
}
