use axum::Json;
use serde_json::{Value, json};

use crate::utils::message;

pub async fn welcome() -> Json<Value> {
    message("Welcome to the Storefront API!")
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
