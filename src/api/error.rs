use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::ACCEPT_LANGUAGE, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::convert::Infallible;

use crate::domain::{ErrorKind, LendingError, Locale, OpContext};

/// Lending errors rendered as JSON with the status their kind maps to.
#[derive(Debug)]
pub struct ApiError(pub LendingError);

impl From<LendingError> for ApiError {
    fn from(e: LendingError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Conflict | ErrorKind::State => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::System => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = match self.0.kind() {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::State => "state",
            ErrorKind::System => "system",
        };
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        }

        let mut body = json!({
            "error": kind,
            "message": self.0.to_string(),
            "issues": self.0.issues(),
        });
        if let LendingError::ConfirmMissing { detail_ids } = &self.0 {
            body["confirm_missing"] = json!(detail_ids);
        }
        (status, Json(body)).into_response()
    }
}

/// Per-request context: locale from `Accept-Language`, clock read once.
#[derive(Debug, Clone, Copy)]
pub struct ApiContext(pub OpContext);

#[async_trait]
impl<S> FromRequestParts<S> for ApiContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let locale = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .map(Locale::from_tag)
            .unwrap_or_default();
        Ok(ApiContext(OpContext::new(locale)))
    }
}
