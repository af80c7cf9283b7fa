// rest/auth.rs — credential extractors.
//
// `AdminKey` pulls and verifies `Authorization: Bearer uk_live_…`;
// `SdkKey` pulls and verifies `X-API-Key: pk_…`. Both reject with 401
// before the handler body runs. App-level scoping (CI keys, cross-app
// slugs) stays in the handlers, where the target app is known.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::sync::Arc;

use crate::auth::{AuthedKey, SdkIdentity};
use crate::error::ApiError;
use crate::AppContext;

pub const SDK_KEY_HEADER: &str = "x-api-key";

/// An authenticated admin/CI bearer key.
pub struct AdminKey(pub AuthedKey);

impl FromRequestParts<Arc<AppContext>> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;

        ctx.keys
            .authenticate_bearer(token)
            .await?
            .map(AdminKey)
            .ok_or(ApiError::Unauthorized)
    }
}

/// An authenticated SDK public key.
pub struct SdkKey(pub SdkIdentity);

impl FromRequestParts<Arc<AppContext>> for SdkKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(SDK_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        ctx.keys
            .authenticate_public(token)
            .await?
            .map(SdkKey)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Resolve the `{slug}` path segment of an SDK route and verify it names
/// the app the key is bound to. The slug routes; the key authorizes.
pub async fn require_sdk_app(
    ctx: &AppContext,
    identity: &SdkIdentity,
    slug: &str,
) -> Result<(), ApiError> {
    let app = ctx.apps.require_by_slug(slug).await?;
    if app.id != identity.app_id {
        return Err(ApiError::forbidden("API key is not valid for this app"));
    }
    Ok(())
}
