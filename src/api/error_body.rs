//! Error bodies returned by the backend and the text shown for them
//!
//! The backend answers failures in three shapes: an object with a `message`,
//! a bare string, or a validation report carrying an `errors` array whose
//! entries hold `defaultMessage` or `message`. [`describe_error`] turns any
//! of those, or their absence, into one line for a toast.

use crate::error::ApiError;
use serde::Deserialize;
use serde_json::Value;

/// Parsed body of a non-2xx response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ErrorBody {
    #[default]
    Empty,
    /// Plain text, or a JSON string
    Text(String),
    /// JSON object
    Json {
        message: Option<String>,
        errors: Vec<FieldError>,
    },
}

/// One entry of a validation report
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    #[serde(default)]
    pub default_message: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl FieldError {
    fn text(&self) -> Option<&str> {
        non_empty(self.default_message.as_deref()).or_else(|| non_empty(self.message.as_deref()))
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

impl ErrorBody {
    /// Parse a raw response body
    ///
    /// Bodies that are not JSON are kept as text so proxies answering with
    /// plain messages still produce something readable.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ErrorBody::Empty;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::String(s)) => ErrorBody::Text(s),
            Ok(Value::Object(map)) => {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let errors = map
                    .get("errors")
                    .and_then(Value::as_array)
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(|e| FieldError::deserialize(e).ok())
                            .collect()
                    })
                    .unwrap_or_default();
                ErrorBody::Json { message, errors }
            }
            _ => ErrorBody::Text(trimmed.to_string()),
        }
    }

    /// Message carried by the body, in order: `message`, plain string, joined `errors`
    pub fn message(&self) -> Option<String> {
        match self {
            ErrorBody::Empty => None,
            ErrorBody::Text(text) => non_empty(Some(text)).map(str::to_string),
            ErrorBody::Json { message, errors } => {
                if let Some(message) = non_empty(message.as_deref()) {
                    return Some(message.to_string());
                }
                let joined = errors
                    .iter()
                    .filter_map(FieldError::text)
                    .collect::<Vec<_>>()
                    .join(", ");
                if joined.is_empty() {
                    None
                } else {
                    Some(joined)
                }
            }
        }
    }
}

/// Status-specific wording used when the body carries no message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusHints {
    pub conflict: Option<&'static str>,
    pub not_found: Option<&'static str>,
}

impl StatusHints {
    pub const NONE: StatusHints = StatusHints {
        conflict: None,
        not_found: None,
    };

    pub const CLIENTS: StatusHints = StatusHints {
        conflict: Some("A client with this ID already exists."),
        not_found: None,
    };

    pub const RATE_LIMITS: StatusHints = StatusHints {
        conflict: Some("A configuration for this client ID already exists."),
        not_found: None,
    };

    pub const CLIENT_LISTING: StatusHints = StatusHints {
        conflict: None,
        not_found: Some("Clients endpoint not found. Please restart the backend server."),
    };
}

/// Text to show an operator for a failed call
pub fn describe_error(err: &ApiError, base_url: &str, hints: StatusHints) -> String {
    if let Some(message) = err.body_message() {
        return message;
    }

    match err {
        ApiError::Unreachable(_) => format!(
            "Cannot connect to server. Please ensure the backend is running at {}",
            base_url
        ),
        ApiError::InvalidResponse(_) => err.to_string(),
        ApiError::Http { status, .. } => match (*status, hints) {
            (400, _) => "Invalid request. Please check all fields are filled correctly.".to_string(),
            (409, StatusHints { conflict: Some(hint), .. }) => hint.to_string(),
            (404, StatusHints { not_found: Some(hint), .. }) => hint.to_string(),
            (status, _) => format!("HTTP {} error occurred", status),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://localhost:8080/api";

    #[test]
    fn test_parse_empty_body() {
        assert_eq!(ErrorBody::parse(""), ErrorBody::Empty);
        assert_eq!(ErrorBody::parse("  \n"), ErrorBody::Empty);
        assert_eq!(ErrorBody::Empty.message(), None);
    }

    #[test]
    fn test_parse_message_object() {
        let body = ErrorBody::parse(r#"{"status": 404, "message": "Client not found: acme"}"#);
        assert_eq!(body.message().as_deref(), Some("Client not found: acme"));
    }

    #[test]
    fn test_parse_plain_text_and_json_string() {
        let text = ErrorBody::parse("Service Unavailable");
        assert_eq!(text, ErrorBody::Text("Service Unavailable".to_string()));

        let json_string = ErrorBody::parse(r#""duplicate client""#);
        assert_eq!(json_string.message().as_deref(), Some("duplicate client"));
    }

    #[test]
    fn test_parse_validation_report() {
        let body = ErrorBody::parse(
            r#"{
                "error": "Bad Request",
                "errors": [
                    {"field": "clientId", "defaultMessage": "must not be blank"},
                    {"field": "name", "message": "name is too long"},
                    {"field": "other"}
                ]
            }"#,
        );
        assert_eq!(
            body.message().as_deref(),
            Some("must not be blank, name is too long")
        );
    }

    #[test]
    fn test_message_field_wins_over_errors() {
        let body = ErrorBody::parse(
            r#"{"message": "Validation failed", "errors": [{"defaultMessage": "x"}]}"#,
        );
        assert_eq!(body.message().as_deref(), Some("Validation failed"));
    }

    #[test]
    fn test_empty_message_falls_through_to_errors() {
        let body = ErrorBody::parse(r#"{"message": "", "errors": [{"defaultMessage": "bad"}]}"#);
        assert_eq!(body.message().as_deref(), Some("bad"));
    }

    #[test]
    fn test_describe_uses_body_message_first() {
        let err = ApiError::status(409, ErrorBody::parse(r#"{"message": "Client acme exists"}"#));
        assert_eq!(
            describe_error(&err, BASE, StatusHints::CLIENTS),
            "Client acme exists"
        );
    }

    #[test]
    fn test_describe_status_fallbacks() {
        let unreachable = ApiError::Unreachable("connection refused".to_string());
        assert_eq!(
            describe_error(&unreachable, BASE, StatusHints::NONE),
            "Cannot connect to server. Please ensure the backend is running at http://localhost:8080/api"
        );

        let bad_request = ApiError::status(400, ErrorBody::Empty);
        assert_eq!(
            describe_error(&bad_request, BASE, StatusHints::NONE),
            "Invalid request. Please check all fields are filled correctly."
        );

        let conflict = ApiError::status(409, ErrorBody::Empty);
        assert_eq!(
            describe_error(&conflict, BASE, StatusHints::CLIENTS),
            "A client with this ID already exists."
        );
        assert_eq!(
            describe_error(&conflict, BASE, StatusHints::RATE_LIMITS),
            "A configuration for this client ID already exists."
        );
        assert_eq!(
            describe_error(&conflict, BASE, StatusHints::NONE),
            "HTTP 409 error occurred"
        );

        let missing = ApiError::status(404, ErrorBody::Empty);
        assert_eq!(
            describe_error(&missing, BASE, StatusHints::CLIENT_LISTING),
            "Clients endpoint not found. Please restart the backend server."
        );
        assert_eq!(
            describe_error(&missing, BASE, StatusHints::CLIENTS),
            "HTTP 404 error occurred"
        );

        let server = ApiError::status(503, ErrorBody::Empty);
        assert_eq!(
            describe_error(&server, BASE, StatusHints::NONE),
            "HTTP 503 error occurred"
        );
    }

    #[test]
    fn test_describe_invalid_response() {
        let err = ApiError::InvalidResponse("expected value at line 1".to_string());
        assert_eq!(
            describe_error(&err, BASE, StatusHints::NONE),
            "Invalid response format: expected value at line 1"
        );
    }
}
