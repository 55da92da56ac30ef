use axum::{middleware, Router};

use crate::state::AppState;

pub mod claims;
mod dto;
pub mod extractors;
pub mod guard;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod services;

pub fn router(state: AppState) -> Router<AppState> {
    let protected = handlers::me_routes()
        .route_layer(middleware::from_fn_with_state(state, guard::authenticate));
    handlers::auth_routes().merge(protected)
}
