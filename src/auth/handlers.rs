use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::auth::dto::{AuthResponse, LoginRequest, RegisterRequest};
use crate::auth::extractors::CurrentUser;
use crate::auth::services::AuthService;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::dto::PublicUser;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let auth = AuthService::from_ref(&state);
    Ok(Json(auth.register(payload).await?))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let auth = AuthService::from_ref(&state);
    Ok(Json(auth.login(&payload).await?))
}

/// Fresh read by the token's subject, so a user deactivated after issuance
/// is refused even though the token still verifies.
#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or(ApiError::Unauthenticated)?;
    Ok(Json(PublicUser::from(&user)))
}
