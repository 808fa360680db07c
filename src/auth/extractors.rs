use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::auth::jwt::{AuthFailure, JwtKeys};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::model::User;

/// Plain auth: Bearer token, verified, mapped to a live user row. The role
/// on the attached user is the current one from the store, not the claim.
pub struct AuthUser(pub User);

/// Admin auth: plain auth plus an ADMIN or SUPERADMIN current role.
pub struct AdminUser(pub User);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthFailure::NoToken)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token)?;

        let user = User::find_by_id(&state.db, claims.sub)
            .await
            .map_err(ApiError::Internal)?
            .ok_or(AuthFailure::UserMissing)?;

        Ok(AuthUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            return Err(ApiError::Forbidden("Access denied: Admins only"));
        }
        Ok(AdminUser(user))
    }
}
