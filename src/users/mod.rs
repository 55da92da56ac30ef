use axum::{middleware, routing::get, Router};

use crate::auth::guard;
use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;

pub fn router(state: AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/users", get(handlers::list_users))
        .route_layer(middleware::from_fn_with_state(
            guard::ADMIN_ONLY,
            guard::require_role,
        ));
    let staff = Router::new()
        .route("/users/:id", get(handlers::get_user))
        .route_layer(middleware::from_fn_with_state(
            guard::STAFF_ONLY,
            guard::require_role,
        ));
    admin
        .merge(staff)
        .route_layer(middleware::from_fn_with_state(state, guard::authenticate))
}
