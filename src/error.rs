//! API error taxonomy.
//!
//! Service functions return `ApiError`; the REST surface translates it to an
//! HTTP status exactly once, in the `IntoResponse` impl below. Best-effort
//! side effects (object deletion, `last_used_at` touches, analytics) never
//! produce an `ApiError` — they log and continue at their call sites.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed input: bad slug, bad semver, unknown platform, bad filename.
    #[error("{0}")]
    Validation(String),

    /// Missing or malformed credential.
    #[error("missing or invalid API key")]
    Unauthorized,

    /// Authenticated, but the key does not own the target resource.
    #[error("{0}")]
    Forbidden(String),

    /// Unknown app / release / artifact / group.
    #[error("{0} not found")]
    NotFound(String),

    /// Duplicate slug/version/platform or an illegal state transition.
    #[error("{0}")]
    Conflict(String),

    /// Artifact confirmation attempted on a row that is not awaiting upload.
    #[error("artifact is not awaiting upload confirmation")]
    NotPending,

    /// Artifact confirmation attempted before the object reached storage.
    #[error("uploaded object was not found in storage")]
    NotFoundInStorage,

    /// Object store misconfigured or unreachable.
    #[error("object storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Everything else. Logged with the full chain, surfaced opaquely.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Stable machine-readable code included in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::NotPending => "not_pending",
            Self::NotFoundInStorage => "not_found_in_storage",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::NotFoundInStorage => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::NotPending => StatusCode::CONFLICT,
            Self::StorageUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal errors keep their detail in the log, not the body.
        let message = match &self {
            Self::Internal(err) => {
                error!(err = %err, chain = ?err, "request failed with internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(json!({ "error": { "code": self.code(), "message": message } }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(anyhow::Error::new(err).context("database query failed"))
    }
}

/// True when a sqlx error is a UNIQUE-constraint violation.
///
/// Used to map racing inserts (duplicate slug, duplicate `(release, platform)`
/// slot, duplicate fingerprint) to `conflict` instead of `internal`.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_status() {
        assert_eq!(
            ApiError::validation("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("no").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("app").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("dup").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::NotPending.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::NotFoundInStorage.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::StorageUnavailable("down".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn confirmation_stages_have_distinct_codes() {
        assert_eq!(ApiError::NotPending.code(), "not_pending");
        assert_eq!(ApiError::NotFoundInStorage.code(), "not_found_in_storage");
    }
}
