//! HTTP surface. Storefront endpoints live under `/api`, identity administration under `/users`.
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::state::AppState;

pub mod auth;
pub mod carts;
pub mod devices;
pub mod orders;
pub mod reset;
pub mod roles;
pub mod root;
pub mod users;

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/devices", get(devices::list).post(devices::create))
        .route(
            "/devices/{id}",
            get(devices::show).put(devices::update).delete(devices::remove),
        )
        .route("/cart", get(carts::show).delete(carts::clear))
        .route("/cart/items", post(carts::add))
        .route(
            "/cart/items/{device_id}",
            put(carts::update).delete(carts::remove),
        )
        .route("/orders", post(orders::create))
        .route("/orders/me", get(orders::mine))
        .route("/orders/{id}", get(orders::show))
        .route("/orders/{id}/status", put(orders::update_status))
        .route("/orders/{id}/track", get(orders::track));

    Router::new()
        .route("/", get(root::welcome))
        .route("/health", get(root::health))
        .nest("/api", api)
        .route("/users", get(users::list).post(users::create))
        .route("/users/reset-password/initiate", post(reset::initiate))
        .route("/users/reset-password/verify", post(reset::verify))
        .route("/users/reset-password/confirm", post(reset::confirm))
        .route("/users/roles", get(roles::list).post(roles::create))
        .route(
            "/users/roles/{role_id}",
            put(roles::update).delete(roles::remove),
        )
        .route("/users/{id}", get(users::show).put(users::update))
        .route("/users/{id}/deactivate", delete(users::deactivate))
        .with_state(state)
}
