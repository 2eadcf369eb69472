use crate::imaging::ImagingError;
use crate::services::{
    catalog::CatalogError, object_store::StorageError, row_store::RowStoreError,
    session::AuthError, upload::UploadError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::error;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}", self.status, self.message);
        }
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let status = match &err {
            StorageError::ObjectNotFound { .. } => StatusCode::NOT_FOUND,
            StorageError::ObjectAlreadyExists { .. } => StatusCode::CONFLICT,
            StorageError::InvalidObjectKey | StorageError::InvalidBucketName { .. } => {
                StatusCode::BAD_REQUEST
            }
            StorageError::Sqlx(_) | StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<RowStoreError> for AppError {
    fn from(err: RowStoreError) -> Self {
        let status = match &err {
            RowStoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            RowStoreError::UnknownColumn { .. }
            | RowStoreError::ReadOnlyColumn { .. }
            | RowStoreError::RangeOutOfBounds { .. } => StatusCode::BAD_REQUEST,
            RowStoreError::Decode(_) | RowStoreError::Sqlx(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<ImagingError> for AppError {
    fn from(err: ImagingError) -> Self {
        AppError::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::ForeignUrl(_) => AppError::bad_request(err.to_string()),
            UploadError::Imaging(err) => err.into(),
            UploadError::FetchFailed { source, .. } => source.into(),
            // The admin only needs to know to try again.
            UploadError::UploadFailed { .. } => {
                error!("{}", err);
                AppError::new(
                    StatusCode::BAD_GATEWAY,
                    "Image upload failed, please try again",
                )
            }
            UploadError::DeleteFailed { .. } => {
                error!("{}", err);
                AppError::new(
                    StatusCode::BAD_GATEWAY,
                    "Image could not be deleted, please try again",
                )
            }
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Rows(err) => err.into(),
            CatalogError::Upload(err) => err.into(),
            CatalogError::EmptyField(_)
            | CatalogError::UnknownItem(_)
            | CatalogError::MoveOutOfRange { .. } => AppError::bad_request(err.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::InvalidCredentials | AuthError::Unauthorized | AuthError::Expired => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Inactive => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Provider(_) => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_errors_map_to_statuses() {
        let missing = StorageError::ObjectNotFound {
            bucket: "b".into(),
            key: "k".into(),
        };
        assert_eq!(AppError::from(missing).status, StatusCode::NOT_FOUND);

        let decode = ImagingError::DecodeFailed("truncated".into());
        assert_eq!(
            AppError::from(decode).status,
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let upload = UploadError::UploadFailed {
            path: "photos/a.webp".into(),
            source: StorageError::InvalidObjectKey,
        };
        let err = AppError::from(upload);
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert!(!err.message.contains("photos/a.webp"));

        let delete = UploadError::DeleteFailed {
            path: "photos/a.webp".into(),
            source: StorageError::InvalidObjectKey,
        };
        let err = AppError::from(delete);
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.message, "Image could not be deleted, please try again");

        assert_eq!(
            AppError::internal("render task failed").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );

        assert_eq!(
            AppError::from(CatalogError::EmptyField("title")).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(AuthError::Expired).status,
            StatusCode::UNAUTHORIZED
        );
    }
}
