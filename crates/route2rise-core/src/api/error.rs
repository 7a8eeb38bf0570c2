use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - session is no longer valid")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential storage failed: {0:#}")]
    Storage(anyhow::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape produced by the backend's validation handler.
#[derive(Debug, Deserialize)]
struct ValidationBody {
    message: Option<String>,
    #[serde(default)]
    detail: serde_json::Value,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Prefer the backend's own explanation of a 422 over the raw body.
    fn validation_message(body: &str) -> String {
        match serde_json::from_str::<ValidationBody>(body) {
            Ok(ValidationBody {
                message: Some(message),
                detail: serde_json::Value::Array(details),
            }) if !details.is_empty() => {
                let details: Vec<String> = details
                    .iter()
                    .map(|d| d.as_str().map(str::to_string).unwrap_or_else(|| d.to_string()))
                    .collect();
                format!("{} ({})", message, details.join("; "))
            }
            Ok(ValidationBody {
                message: Some(message),
                ..
            }) => message,
            _ => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(Self::truncate_body(body)),
            404 => ApiError::NotFound(Self::truncate_body(body)),
            422 => ApiError::Validation(Self::validation_message(body)),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(Self::truncate_body(body)),
            _ => ApiError::InvalidResponse(format!(
                "Status {}: {}",
                status,
                Self::truncate_body(body)
            )),
        }
    }

    /// True when the error means the session must be dropped.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED, "").is_unauthorized());
        assert!(matches!(
            ApiError::from_status(StatusCode::FORBIDDEN, "nope"),
            ApiError::AccessDenied(b) if b == "nope"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, "x"),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, ""),
            ApiError::ServerError(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::IM_A_TEAPOT, ""),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_validation_body_is_summarised() {
        let body = r#"{"detail": ["company_name: field required", "sector: field required"], "message": "Validation failed. Please check the required fields: company_name, sector, source"}"#;
        match ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, body) {
            ApiError::Validation(msg) => {
                assert!(msg.starts_with("Validation failed."));
                assert!(msg.contains("company_name: field required; sector: field required"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validation_without_message_falls_back_to_body() {
        match ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "bad input") {
            ApiError::Validation(msg) => assert_eq!(msg, "bad input"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "é".repeat(400);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated, 800 total bytes"));
        assert!(truncated.len() < body.len());
    }
}
