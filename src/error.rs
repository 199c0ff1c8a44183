use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GangsheetError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("no placeable design items: {0}")]
    NoPlaceableItems(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("rendering failed: {0}")]
    Rendering(String),
    #[error("missing tenant context")]
    MissingTenant,
}

pub type Result<T> = std::result::Result<T, GangsheetError>;

impl GangsheetError {
    pub fn code(&self) -> &'static str {
        match self {
            GangsheetError::Validation(_) => "validation_error",
            GangsheetError::NoPlaceableItems(_) => "no_placeable_items",
            GangsheetError::NotFound(_) => "not_found",
            GangsheetError::Conflict(_) => "conflict",
            GangsheetError::Persistence(_) => "persistence_error",
            GangsheetError::Rendering(_) => "rendering_error",
            GangsheetError::MissingTenant => "missing_tenant",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GangsheetError::Validation(_) => StatusCode::BAD_REQUEST,
            GangsheetError::NoPlaceableItems(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GangsheetError::NotFound(_) => StatusCode::NOT_FOUND,
            GangsheetError::Conflict(_) => StatusCode::CONFLICT,
            GangsheetError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GangsheetError::Rendering(_) => StatusCode::BAD_GATEWAY,
            GangsheetError::MissingTenant => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for GangsheetError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{self}");
        }
        let body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GangsheetError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GangsheetError::NoPlaceableItems("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(GangsheetError::MissingTenant.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_response_status() {
        let resp = GangsheetError::NotFound("gangsheet 1".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
