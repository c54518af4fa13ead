//! # Checkout & Tracking
//!
//! ## Placing an order
//! 1. Reject empty carts, incomplete addresses, missing payment methods and quantities below 1
//! 2. Under the checkout lock, load every device, summing quantities of repeated ids
//! 3. Fail on the first unknown device (404) or short stock (400) before touching stock
//! 4. Decrement stock, simulate a paid payment, store the order as `Processing`
//! 5. Clear the buyer's cart and log the confirmation
//!
//! ## Access
//! Owners see their own orders. Admin and support see every order and may change its status.
use std::{collections::HashMap, sync::Arc};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use shop::{
    carts::Cart,
    devices::Device,
    orders::{Order, OrderItem, OrderStatus, PaymentStatus, ShippingAddress, Tracking},
    users::{Role, User},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    database::Database,
    error::AppError,
    routes::carts::quantity,
    state::AppState,
    utils::{Payload, non_empty, parse_id},
};

const NOT_FOUND: &str = "Order not found";
const INCOMPLETE: &str = "Please provide cart items, shipping address, and payment method";
const STAFF: [Role; 2] = [Role::Admin, Role::Support];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub device_id: String,
    pub quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOrder {
    pub cart_items: Vec<CartLine>,
    pub shipping_address: Option<ShippingAddress>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub order_status: Option<String>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(request): Payload<CreateOrder>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let shipping_address = request
        .shipping_address
        .filter(ShippingAddress::is_complete)
        .ok_or_else(|| AppError::Validation(INCOMPLETE.into()))?;
    let payment_method = non_empty(request.payment_method)
        .ok_or_else(|| AppError::Validation(INCOMPLETE.into()))?;
    if request.cart_items.is_empty() {
        return Err(AppError::Validation(INCOMPLETE.into()));
    }

    let mut requested: Vec<(String, u32)> = Vec::with_capacity(request.cart_items.len());
    for line in request.cart_items {
        requested.push((line.device_id, quantity(line.quantity)?));
    }

    let catalog_guard = state.catalog.lock().await;

    let lines = reserve(&state.database, requested).await?;

    let now = Utc::now();
    let mut order_items = Vec::with_capacity(lines.len());
    for (mut device, quantity) in lines {
        order_items.push(OrderItem {
            device: device.id,
            name: device.name.clone(),
            image_url: Some(device.image_url.clone()),
            price: device.price,
            quantity,
        });

        device.stock_quantity -= quantity;
        state.database.put(&device).await?;
    }

    // simulated gateway, always accepts
    let order = Order {
        id: Uuid::new_v4(),
        user: auth.id(),
        total_amount: Order::total(&order_items),
        order_items,
        shipping_address,
        payment_method,
        payment_result: None,
        payment_status: PaymentStatus::Paid,
        order_status: OrderStatus::Processing,
        tracking_number: Order::tracking_number(now),
        delivered_at: None,
        created_at: now,
    };
    state.database.put(&order).await?;

    drop(catalog_guard);

    // the order exists at this point, a stale cart is not worth failing the request
    if let Err(e) = state.database.put(&Cart::empty(auth.id(), now)).await {
        warn!("Failed to clear cart of {} after order {}: {e}", auth.id(), order.id);
    }

    info!("Order {} placed by {}", order.id, auth.id());
    crate::notify::order_confirmation(&auth.user.email, &order);

    Ok((StatusCode::CREATED, Json(order)))
}

/// Loads every requested device and checks stock for the summed quantities.
/// Nothing is written, so a failure leaves stock untouched.
async fn reserve(
    database: &Database,
    requested: Vec<(String, u32)>,
) -> Result<Vec<(Device, u32)>, AppError> {
    let mut lines: Vec<(Device, u32)> = Vec::new();

    for (raw_id, quantity) in requested {
        let missing = || AppError::NotFound(format!("Device with ID {raw_id} not found"));
        let id = Uuid::parse_str(raw_id.trim()).map_err(|_| missing())?;

        match lines.iter_mut().find(|(device, _)| device.id == id) {
            Some((_, total)) => *total = total.saturating_add(quantity),
            None => {
                let device: Device = database.get(id).await?.ok_or_else(missing)?;
                lines.push((device, quantity));
            }
        }
    }

    if let Some((device, _)) = lines
        .iter()
        .find(|(device, quantity)| device.stock_quantity < *quantity)
    {
        return Err(AppError::Validation(format!(
            "Not enough stock for {}",
            device.name
        )));
    }

    Ok(lines)
}

/// Replaces device ids with `{_id, name, price, imageUrl}`, or null when the device is gone.
async fn populate(
    database: &Database,
    order: &Order,
    cache: &mut HashMap<Uuid, Option<Device>>,
) -> Result<Value, AppError> {
    let mut json = serde_json::to_value(order)
        .map_err(|e| AppError::InternalError(format!("Failed to encode order: {e}")))?;

    for (index, item) in order.order_items.iter().enumerate() {
        let device = match cache.get(&item.device) {
            Some(device) => device.clone(),
            None => {
                let device: Option<Device> = database.get(item.device).await?;
                cache.insert(item.device, device.clone());
                device
            }
        };

        let populated = match device {
            Some(device) => serde_json::to_value(device.summary())
                .map_err(|e| AppError::InternalError(format!("Failed to encode device: {e}")))?,
            None => Value::Null,
        };

        if let Some(slot) = json
            .get_mut("orderItems")
            .and_then(|items| items.get_mut(index))
            .and_then(|item| item.get_mut("device"))
        {
            *slot = populated;
        }
    }

    Ok(json)
}

async fn find(database: &Database, id: &str) -> Result<Order, AppError> {
    let id = parse_id(id, NOT_FOUND)?;

    database
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.into()))
}

fn can_view(auth: &AuthUser, order: &Order) -> bool {
    order.user == auth.id() || auth.has_role(&STAFF)
}

pub async fn mine(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<Value>>, AppError> {
    let mut orders: Vec<Order> = state
        .database
        .all::<Order>()
        .await?
        .into_iter()
        .filter(|order| order.user == auth.id())
        .collect();
    orders.sort_by_key(|order| order.created_at);

    let mut cache = HashMap::new();
    let mut populated = Vec::with_capacity(orders.len());
    for order in &orders {
        populated.push(populate(&state.database, order, &mut cache).await?);
    }

    Ok(Json(populated))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let order = find(&state.database, &id).await?;

    if !can_view(&auth, &order) {
        return Err(AppError::Forbidden(
            "Not authorized to view this order".into(),
        ));
    }

    let mut json = populate(&state.database, &order, &mut HashMap::new()).await?;

    let owner: Option<User> = state.database.get(order.user).await?;
    json["user"] = match owner {
        Some(owner) => serde_json::to_value(owner.summary())
            .map_err(|e| AppError::InternalError(format!("Failed to encode user: {e}")))?,
        None => Value::Null,
    };

    Ok(Json(json))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Payload(request): Payload<StatusUpdate>,
) -> Result<Json<Order>, AppError> {
    auth.authorize(&STAFF)?;

    let status = non_empty(request.order_status)
        .map(|status| status.parse::<OrderStatus>())
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mut order = find(&state.database, &id).await?;
    order.set_status(status.unwrap_or(order.order_status), Utc::now());
    state.database.put(&order).await?;

    match state.database.get::<User>(order.user).await? {
        Some(owner) => crate::notify::order_status(&owner.email, &order),
        None => warn!("Order {} has no owner to notify", order.id),
    }

    Ok(Json(order))
}

pub async fn track(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Tracking>, AppError> {
    let order = find(&state.database, &id).await?;

    if !can_view(&auth, &order) {
        return Err(AppError::Forbidden(
            "Not authorized to view tracking for this order".into(),
        ));
    }

    Ok(Json(order.tracking()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn address() -> ShippingAddress {
        ShippingAddress {
            address: "1 Main St".into(),
            city: "Lafayette".into(),
            postal_code: "47901".into(),
            country: "US".into(),
        }
    }

    fn checkout(lines: &[(Uuid, i64)]) -> CreateOrder {
        CreateOrder {
            cart_items: lines
                .iter()
                .map(|(id, quantity)| CartLine {
                    device_id: id.to_string(),
                    quantity: *quantity,
                })
                .collect(),
            shipping_address: Some(address()),
            payment_method: Some("Credit Card".into()),
        }
    }

    async fn stock(state: &AppState, id: Uuid) -> u32 {
        state
            .database
            .get::<Device>(id)
            .await
            .unwrap()
            .unwrap()
            .stock_quantity
    }

    #[tokio::test]
    async fn test_create_order() {
        let state = testing::state();
        let customer = testing::user(&state, Role::Customer).await;
        let phone = testing::device(&state, "Phone", 100.0, 5).await;
        let case = testing::device(&state, "Case", 15.5, 10).await;

        let (status, Json(order)) = create(
            State(state.clone()),
            customer.clone(),
            Payload(checkout(&[(phone.id, 2), (case.id, 1)])),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order.user, customer.id());
        assert_eq!(order.total_amount, 215.5);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.order_status, OrderStatus::Processing);
        assert!(order.tracking_number.starts_with("TRACK-"));
        assert_eq!(stock(&state, phone.id).await, 3);
        assert_eq!(stock(&state, case.id).await, 9);
    }

    #[tokio::test]
    async fn test_create_clears_cart() {
        let state = testing::state();
        let customer = testing::user(&state, Role::Customer).await;
        let phone = testing::device(&state, "Phone", 100.0, 5).await;

        let mut cart = Cart::empty(customer.id(), Utc::now());
        cart.add(&phone, 1, Utc::now());
        state.database.put(&cart).await.unwrap();

        create(
            State(state.clone()),
            customer.clone(),
            Payload(checkout(&[(phone.id, 1)])),
        )
        .await
        .unwrap();

        let cart: Cart = state.database.get(customer.id()).await.unwrap().unwrap();
        assert!(cart.items.is_empty());
    }

    #[tokio::test]
    async fn test_short_stock_leaves_stock_untouched() {
        let state = testing::state();
        let customer = testing::user(&state, Role::Customer).await;
        let phone = testing::device(&state, "Phone", 100.0, 5).await;
        let case = testing::device(&state, "Case", 15.5, 1).await;

        let result = create(
            State(state.clone()),
            customer,
            Payload(checkout(&[(phone.id, 2), (case.id, 2)])),
        )
        .await;

        assert!(
            matches!(result, Err(AppError::Validation(ref message)) if message == "Not enough stock for Case")
        );
        assert_eq!(stock(&state, phone.id).await, 5);
        assert!(state.database.all::<Order>().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_lines_are_summed() {
        let state = testing::state();
        let customer = testing::user(&state, Role::Customer).await;
        let phone = testing::device(&state, "Phone", 100.0, 3).await;

        let result = create(
            State(state.clone()),
            customer.clone(),
            Payload(checkout(&[(phone.id, 2), (phone.id, 2)])),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let (_, Json(order)) = create(
            State(state.clone()),
            customer,
            Payload(checkout(&[(phone.id, 1), (phone.id, 2)])),
        )
        .await
        .unwrap();
        assert_eq!(order.order_items.len(), 1);
        assert_eq!(order.order_items[0].quantity, 3);
        assert_eq!(stock(&state, phone.id).await, 0);
    }

    #[tokio::test]
    async fn test_create_rejects_incomplete_requests() {
        let state = testing::state();
        let customer = testing::user(&state, Role::Customer).await;
        let phone = testing::device(&state, "Phone", 100.0, 3).await;

        let mut no_address = checkout(&[(phone.id, 1)]);
        no_address.shipping_address = Some(ShippingAddress {
            country: "".into(),
            ..address()
        });

        let mut no_payment = checkout(&[(phone.id, 1)]);
        no_payment.payment_method = None;

        for request in [checkout(&[]), no_address, no_payment, checkout(&[(phone.id, 0)])] {
            let result = create(State(state.clone()), customer.clone(), Payload(request)).await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }

        let missing = Uuid::new_v4();
        let result = create(
            State(state),
            customer,
            Payload(checkout(&[(missing, 1)])),
        )
        .await;
        assert!(
            matches!(result, Err(AppError::NotFound(ref message)) if *message == format!("Device with ID {missing} not found"))
        );
    }

    #[tokio::test]
    async fn test_order_visibility() {
        let state = testing::state();
        let owner = testing::user(&state, Role::Customer).await;
        let stranger = testing::user(&state, Role::Customer).await;
        let support = testing::user(&state, Role::Support).await;
        let phone = testing::device(&state, "Phone", 100.0, 3).await;

        let (_, Json(order)) = create(
            State(state.clone()),
            owner.clone(),
            Payload(checkout(&[(phone.id, 1)])),
        )
        .await
        .unwrap();
        let id = order.id.to_string();

        let Json(details) = show(State(state.clone()), owner.clone(), Path(id.clone()))
            .await
            .unwrap();
        assert_eq!(details["user"]["email"], owner.user.email.as_str());
        assert_eq!(details["orderItems"][0]["device"]["name"], "Phone");

        assert!(show(State(state.clone()), support.clone(), Path(id.clone())).await.is_ok());
        assert!(matches!(
            show(State(state.clone()), stranger.clone(), Path(id.clone())).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            track(State(state.clone()), stranger, Path(id.clone())).await,
            Err(AppError::Forbidden(_))
        ));

        let Json(tracking) = track(State(state.clone()), owner, Path(id)).await.unwrap();
        assert_eq!(tracking.tracking_number, order.tracking_number);

        assert!(matches!(
            show(State(state), support, Path(Uuid::new_v4().to_string())).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mine_populates_and_tolerates_deleted_devices() {
        let state = testing::state();
        let customer = testing::user(&state, Role::Customer).await;
        let phone = testing::device(&state, "Phone", 100.0, 3).await;
        let case = testing::device(&state, "Case", 10.0, 3).await;

        create(
            State(state.clone()),
            customer.clone(),
            Payload(checkout(&[(phone.id, 1), (case.id, 1)])),
        )
        .await
        .unwrap();
        state.database.delete::<Device>(case.id).await.unwrap();

        let Json(orders) = mine(State(state.clone()), customer).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["orderItems"][0]["device"]["price"], 100.0);
        assert!(orders[0]["orderItems"][1]["device"].is_null());
        assert_eq!(orders[0]["orderItems"][1]["name"], "Case");

        let other = testing::user(&state, Role::Customer).await;
        let Json(orders) = mine(State(state), other).await.unwrap();
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn test_update_status() {
        let state = testing::state();
        let customer = testing::user(&state, Role::Customer).await;
        let admin = testing::user(&state, Role::Admin).await;
        let phone = testing::device(&state, "Phone", 100.0, 3).await;

        let (_, Json(order)) = create(
            State(state.clone()),
            customer.clone(),
            Payload(checkout(&[(phone.id, 1)])),
        )
        .await
        .unwrap();
        let id = order.id.to_string();

        assert!(matches!(
            update_status(
                State(state.clone()),
                customer,
                Path(id.clone()),
                Payload(StatusUpdate {
                    order_status: Some("Shipped".into())
                })
            )
            .await,
            Err(AppError::Forbidden(_))
        ));

        assert!(matches!(
            update_status(
                State(state.clone()),
                admin.clone(),
                Path(id.clone()),
                Payload(StatusUpdate {
                    order_status: Some("Lost".into())
                })
            )
            .await,
            Err(AppError::Validation(_))
        ));

        let Json(unchanged) = update_status(
            State(state.clone()),
            admin.clone(),
            Path(id.clone()),
            Payload(StatusUpdate::default()),
        )
        .await
        .unwrap();
        assert_eq!(unchanged.order_status, OrderStatus::Processing);

        let Json(delivered) = update_status(
            State(state),
            admin,
            Path(id),
            Payload(StatusUpdate {
                order_status: Some("Delivered".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(delivered.order_status, OrderStatus::Delivered);
        assert!(delivered.delivered_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_device_edits_keep_checkout_decrements() {
        let state = testing::state();
        let admin = testing::user(&state, Role::Admin).await;
        let phone = testing::device(&state, "Phone", 100.0, 10_000).await;

        let mut tasks = Vec::new();
        for n in 0..200 {
            let state = state.clone();
            let phone_id = phone.id;

            if n % 2 == 0 {
                let buyer = testing::user(&state, Role::Customer).await;
                tasks.push(tokio::spawn(async move {
                    create(State(state), buyer, Payload(checkout(&[(phone_id, 1)])))
                        .await
                        .map(|_| ())
                }));
            } else {
                let admin = admin.clone();
                tasks.push(tokio::spawn(async move {
                    crate::routes::devices::update(
                        State(state),
                        admin,
                        Path(phone_id.to_string()),
                        Payload(shop::devices::DeviceFields {
                            description: Some(format!("Revision {n}")),
                            ..Default::default()
                        }),
                    )
                    .await
                    .map(|_| ())
                }));
            }
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(stock(&state, phone.id).await, 10_000 - 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_checkout_does_not_restore_removed_device() {
        let state = testing::state();
        let admin = testing::user(&state, Role::Admin).await;
        let buyer = testing::user(&state, Role::Customer).await;
        let phone = testing::device(&state, "Phone", 100.0, 5).await;

        let order = tokio::spawn({
            let state = state.clone();
            async move { create(State(state), buyer, Payload(checkout(&[(phone.id, 1)]))).await }
        });
        let removal = tokio::spawn({
            let state = state.clone();
            async move {
                crate::routes::devices::remove(State(state), admin, Path(phone.id.to_string())).await
            }
        });

        // the order may land before or after the removal
        let _ = order.await.unwrap();
        removal.await.unwrap().unwrap();

        assert!(state.database.get::<Device>(phone.id).await.unwrap().is_none());
    }
}
