use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use studycache_api_types::ErrorBody;

use crate::application::error::ErrorReport;
use crate::cache::CacheError;

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INVALID_PATTERN: &str = "invalid_pattern";
    pub const INVALID_CONFIRMATION: &str = "invalid_confirmation";
    pub const CONFIRMATION_REQUIRED: &str = "confirmation_required";
    pub const UNSUPPORTED_ACTION: &str = "unsupported_action";
    pub const PAYLOAD: &str = "payload_error";
    pub const INTERNAL: &str = "internal_error";
}

/// JSON error response: `{error, code, hint?}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    hint: Option<String>,
    source: &'static str,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            hint,
            source: "infra::http",
        }
    }

    pub fn bad_request(message: impl Into<String>, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            message,
            None,
        )
    }

    /// Tag the error with the module that raised it, for the response log.
    pub fn with_source(mut self, source: &'static str) -> Self {
        self.source = source;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        let message = err.to_string();
        match err {
            CacheError::Validation { .. } => {
                Self::new(StatusCode::BAD_REQUEST, codes::INVALID_INPUT, message, None)
            }
            CacheError::Pattern(_) => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_PATTERN,
                message,
                Some("patterns support `*`, `?` and `[...]`".to_string()),
            ),
            CacheError::InvalidConfirmation { .. } => Self::new(
                StatusCode::CONFLICT,
                codes::INVALID_CONFIRMATION,
                message,
                Some("repeat the request without a token to obtain a new one".to_string()),
            ),
            CacheError::Unsupported { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::UNSUPPORTED_ACTION,
                message,
                Some(
                    "supported actions: invalidate, clearByType, clearByPattern, purgeExpired"
                        .to_string(),
                ),
            ),
            CacheError::Payload { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::PAYLOAD,
                message,
                None,
            ),
        }
        .with_source("cache")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("malformed request body", Some(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request("malformed query string", Some(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = format!(
            "{}: {}",
            self.code,
            self.hint.as_deref().map_or(self.message.clone(), |hint| format!(
                "{} ({hint})",
                self.message
            ))
        );
        let body = ErrorBody {
            error: self.message,
            code: self.code.to_string(),
            hint: self.hint,
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(self.source, self.status, detail).attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_errors_map_to_statuses() {
        let cases = [
            (CacheError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                CacheError::InvalidConfirmation { reason: "expired" },
                StatusCode::CONFLICT,
            ),
            (
                CacheError::unsupported("dropAll"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn response_carries_report() {
        let response = ApiError::not_found("no such entry").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.messages, vec!["not_found: no such entry".to_string()]);
    }
}
