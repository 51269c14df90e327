// crates/tillhouse-server/src/error.rs
// ============================================================================
// Module: HTTP Errors
// Description: Mapping of tenancy and storage failures onto HTTP responses.
// Purpose: Render the distinguishable failure cases and hide everything else.
// Dependencies: axum, serde_json, tillhouse-store-sqlite, tillhouse-tenancy
// ============================================================================

//! ## Overview
//! Handlers return [`ApiError`]. Tenancy errors render their user message;
//! storage and credential failures collapse to a generic 500 body so driver
//! text never reaches clients.

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde_json::json;
use tillhouse_store_sqlite::StoreError;
use tillhouse_tenancy::TenancyError;

use crate::auth::AuthError;

/// Errors returned by route handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Lifecycle or storage failure.
    #[error(transparent)]
    Tenancy(#[from] TenancyError),
    /// Authentication failure.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Caller lacks the role for this route.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Malformed request input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Tenant data missing.
    #[error("not found: {0}")]
    NotFound(String),
    /// Tenant data in the wrong state.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self::Tenancy(TenancyError::from(error))
    }
}

impl ApiError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Tenancy(error) => tenancy_status(error),
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// Returns the client-facing message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Tenancy(error) => error.user_message().to_string(),
            Self::Auth(_) => "authentication required".to_string(),
            Self::Forbidden(detail)
            | Self::BadRequest(detail)
            | Self::NotFound(detail)
            | Self::Conflict(detail) => detail.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

/// Maps a tenancy error to its HTTP status.
const fn tenancy_status(error: &TenancyError) -> StatusCode {
    match error {
        TenancyError::NotFound(_) => StatusCode::NOT_FOUND,
        TenancyError::AlreadyExists(_)
        | TenancyError::InvalidState { .. }
        | TenancyError::UniqueViolation(_) => StatusCode::CONFLICT,
        TenancyError::TenantRequired | TenancyError::Expired(_) => StatusCode::FORBIDDEN,
        TenancyError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        TenancyError::Invalid(_) => StatusCode::BAD_REQUEST,
        TenancyError::Credential(_) | TenancyError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use tillhouse_store_sqlite::StoreError;
    use tillhouse_tenancy::TenancyError;

    use super::ApiError;

    #[test]
    fn statuses_follow_the_error_taxonomy() {
        let cases = [
            (ApiError::from(StoreError::NotFound("f".into())), StatusCode::NOT_FOUND),
            (ApiError::from(StoreError::AlreadyExists("f".into())), StatusCode::CONFLICT),
            (ApiError::from(StoreError::UniqueViolation("u".into())), StatusCode::CONFLICT),
            (ApiError::from(TenancyError::TenantRequired), StatusCode::FORBIDDEN),
            (ApiError::from(TenancyError::InvalidCredentials), StatusCode::UNAUTHORIZED),
            (ApiError::from(StoreError::Busy("locked".into())), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status);
        }
    }

    #[test]
    fn storage_detail_is_not_exposed() {
        let error = ApiError::from(StoreError::Storage("disk I/O error at /secret".into()));
        assert_eq!(error.message(), "internal server error");
    }
}
