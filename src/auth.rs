use crate::error::ApiError;
use crate::user_models::User;
use crate::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;

/// Extractor for the authenticated caller. Resolves the bearer token from
/// the Authorization header against the token store; any private handler
/// takes this as an argument and gets a 401 for free when it fails.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
            })?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::Unauthorized("Invalid authorization header.".to_string())
        })?;

        let user = state
            .users
            .get_user_by_token(token)
            .await
            .ok_or_else(|| ApiError::Unauthorized("Invalid token.".to_string()))?;

        if !user.is_active {
            return Err(ApiError::Unauthorized("User inactive or deleted.".to_string()));
        }

        Ok(CurrentUser(user))
    }
}
