use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("invalid permission: {0}")]
    InvalidPermission(String),
    #[error("resource mismatch: {0}")]
    ResourceMismatch(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("duplicate slug: {0}")]
    DuplicateSlug(String),
    #[error("system role is immutable: {0}")]
    SystemRoleImmutable(String),
    #[error("role in use: {0}")]
    RoleInUse(String),
    #[error("role not found: {0}")]
    RoleNotFound(String),
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid_permission(message: impl Into<String>) -> Self {
        Self::InvalidPermission(message.into())
    }

    pub fn resource_mismatch(message: impl Into<String>) -> Self {
        Self::ResourceMismatch(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn duplicate_slug(message: impl Into<String>) -> Self {
        Self::DuplicateSlug(message.into())
    }

    pub fn system_role_immutable(message: impl Into<String>) -> Self {
        Self::SystemRoleImmutable(message.into())
    }

    pub fn role_in_use(message: impl Into<String>) -> Self {
        Self::RoleInUse(message.into())
    }

    pub fn role_not_found(message: impl Into<String>) -> Self {
        Self::RoleNotFound(message.into())
    }

    pub fn unknown_tenant(message: impl Into<String>) -> Self {
        Self::UnknownTenant(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::InvalidPermission(_)
            | AppError::ResourceMismatch(_)
            | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateSlug(_) | AppError::RoleInUse(_) => StatusCode::CONFLICT,
            AppError::SystemRoleImmutable(_) => StatusCode::FORBIDDEN,
            AppError::RoleNotFound(_) | AppError::UnknownTenant(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();
        let error = match &self {
            AppError::InvalidPermission(_) => "invalid_permission",
            AppError::ResourceMismatch(_) => "resource_mismatch",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::DuplicateSlug(_) => "duplicate_slug",
            AppError::SystemRoleImmutable(_) => "system_role_immutable",
            AppError::RoleInUse(_) => "role_in_use",
            AppError::RoleNotFound(_) => "role_not_found",
            AppError::UnknownTenant(_) => "unknown_tenant",
            AppError::Internal(_) => "internal",
        };

        let payload = ErrorResponse {
            error: error.to_string(),
            message,
        };

        (status, Json(payload)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}
