use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use super::metrics;
use crate::catalog::CatalogError;
use crate::rekordbox::ExportError;

/// Handler failure, rendered as `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// The request clashes with the current state. Reported as 400.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotImplemented(String),

    /// The catalog or search service failed.
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::NotImplemented(_) => "not_implemented",
            ApiError::Upstream(_) => "upstream",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed with {}: {}", status, self);
        } else {
            debug!("Request rejected with {}: {}", status, self);
        }
        metrics::record_error(self.kind(), "api");

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<CatalogError>() {
            Ok(catalog) => catalog.into(),
            Err(err) => ApiError::Internal(format!("{:#}", err)),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::Upstream(err.to_string()),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::MissingPath
            | ExportError::UnsupportedExtension(_)
            | ExportError::InvalidDocument(_) => ApiError::BadRequest(err.to_string()),
            ExportError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ExportError::NotYetSupported => ApiError::NotImplemented(err.to_string()),
            ExportError::Io(_) | ExportError::Task(_) | ExportError::Store(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let (status, body) = body_of(ApiError::Conflict("already in a playlist".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "already in a playlist" }));
    }

    #[tokio::test]
    async fn test_catalog_not_found_maps_to_404() {
        let err: ApiError = anyhow::Error::from(CatalogError::NotFound("track x".into())).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = CatalogError::MissingCredentials.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_export_error_mapping() {
        let status = |e: ExportError| ApiError::from(e).status();
        assert_eq!(status(ExportError::NotYetSupported), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(
            status(ExportError::NotFound("x.xml".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(ExportError::UnsupportedExtension("x.txt".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ExportError::InvalidDocument("missing COLLECTION".into())),
            StatusCode::BAD_REQUEST
        );
    }
}
