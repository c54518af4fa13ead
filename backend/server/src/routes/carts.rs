use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shop::{carts::Cart, devices::Device};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    database::Database,
    error::AppError,
    state::AppState,
    utils::{Payload, parse_id},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItem {
    pub device_id: String,
    pub quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SetQuantity {
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub total_amount: f64,
    pub item_count: u32,
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self {
        Self {
            total_amount: cart.total_amount(),
            item_count: cart.item_count(),
            cart,
        }
    }
}

pub async fn load(database: &Database, user: Uuid) -> Result<Cart, AppError> {
    Ok(database
        .get(user)
        .await?
        .unwrap_or_else(|| Cart::empty(user, Utc::now())))
}

pub fn quantity(raw: i64) -> Result<u32, AppError> {
    u32::try_from(raw)
        .ok()
        .filter(|quantity| *quantity >= 1)
        .ok_or_else(|| AppError::Validation("Quantity must be at least 1".into()))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CartView>, AppError> {
    Ok(Json(load(&state.database, auth.id()).await?.into()))
}

pub async fn add(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(request): Payload<AddItem>,
) -> Result<Json<CartView>, AppError> {
    let quantity = quantity(request.quantity.unwrap_or(1))?;
    let id = parse_id(&request.device_id, "Device not found")?;

    let device: Device = state
        .database
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Device not found".into()))?;

    let mut cart = load(&state.database, auth.id()).await?;
    cart.add(&device, quantity, Utc::now());
    state.database.put(&cart).await?;

    Ok(Json(cart.into()))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(device_id): Path<String>,
    Payload(request): Payload<SetQuantity>,
) -> Result<Json<CartView>, AppError> {
    let device_id = parse_id(&device_id, "Item not in cart")?;
    let mut cart = load(&state.database, auth.id()).await?;

    // zero and negatives clamp to one, matching the storefront cart
    let quantity = u32::try_from(request.quantity.max(1)).unwrap_or(u32::MAX);
    if !cart.update_quantity(device_id, quantity, Utc::now()) {
        return Err(AppError::NotFound("Item not in cart".into()));
    }
    state.database.put(&cart).await?;

    Ok(Json(cart.into()))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(device_id): Path<String>,
) -> Result<Json<CartView>, AppError> {
    let device_id = parse_id(&device_id, "Item not in cart")?;
    let mut cart = load(&state.database, auth.id()).await?;

    if !cart.remove(device_id, Utc::now()) {
        return Err(AppError::NotFound("Item not in cart".into()));
    }
    state.database.put(&cart).await?;

    Ok(Json(cart.into()))
}

pub async fn clear(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CartView>, AppError> {
    let mut cart = load(&state.database, auth.id()).await?;
    cart.clear(Utc::now());
    state.database.put(&cart).await?;

    Ok(Json(cart.into()))
}
