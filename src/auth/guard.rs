use axum::{
    extract::{FromRef, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::auth::jwt::JwtKeys;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo_types::Role;

/// Capability lists attached to routes at registration time.
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];
pub const STAFF_ONLY: &[Role] = &[Role::Admin, Role::Trainer];

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
}

/// First gate: a request without a verifiable bearer token never reaches a
/// handler. The concrete token failure (expired, malformed, bad signature)
/// is logged but collapsed to a generic 401.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or_else(|| {
        warn!("missing or malformed Authorization header");
        ApiError::Unauthenticated
    })?;

    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify(token).map_err(|e| {
        warn!(reason = %e, "token rejected");
        ApiError::Unauthenticated
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Second gate: the verified role must be in the route's capability list.
/// Runs after `authenticate`, so a missing claims extension means the route
/// was wired without the first gate and the request is refused outright.
pub async fn require_role(
    State(allowed): State<&'static [Role]>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = req
        .extensions()
        .get::<crate::auth::claims::Claims>()
        .ok_or(ApiError::Unauthenticated)?;

    if !allowed.contains(&claims.role) {
        warn!(user_id = %claims.sub, role = %claims.role, "role not permitted for route");
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(req).await)
}
