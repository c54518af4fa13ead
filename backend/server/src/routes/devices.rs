use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde_json::Value;
use shop::{
    devices::{Device, DeviceFields},
    users::Role,
};
use tracing::info;

use crate::{
    auth::AuthUser,
    error::AppError,
    filters::{DeviceFilter, DeviceQuery},
    state::AppState,
    utils::{Params, Payload, message, parse_id},
};

const NOT_FOUND: &str = "Device not found";

pub async fn list(
    State(state): State<Arc<AppState>>,
    Params(query): Params<DeviceQuery>,
) -> Result<Json<Vec<Device>>, AppError> {
    let filter = DeviceFilter::try_from(query)?;
    let devices = state.database.all().await?;

    Ok(Json(filter.apply(devices)))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Device>, AppError> {
    let id = parse_id(&id, NOT_FOUND)?;

    state
        .database
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.into()))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(fields): Payload<DeviceFields>,
) -> Result<(StatusCode, Json<Device>), AppError> {
    auth.authorize(&[Role::Admin])?;

    let device = Device::create(fields, Utc::now())?;
    state.database.put(&device).await?;

    info!("Device {} created by {}", device.id, auth.id());

    Ok((StatusCode::CREATED, Json(device)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Payload(fields): Payload<DeviceFields>,
) -> Result<Json<Device>, AppError> {
    auth.authorize(&[Role::Admin])?;
    let id = parse_id(&id, NOT_FOUND)?;

    let _catalog = state.catalog.lock().await;
    let mut device: Device = state
        .database
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.into()))?;

    device.apply(fields)?;
    state.database.put(&device).await?;

    Ok(Json(device))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(&[Role::Admin])?;
    let id = parse_id(&id, NOT_FOUND)?;

    let _catalog = state.catalog.lock().await;
    if !state.database.delete::<Device>(id).await? {
        return Err(AppError::NotFound(NOT_FOUND.into()));
    }

    info!("Device {id} removed by {}", auth.id());

    Ok(message("Device removed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn fields() -> DeviceFields {
        DeviceFields {
            name: Some("Pixel 9".into()),
            brand: Some("Google".into()),
            model: Some("P9".into()),
            price: Some(799.0),
            stock_quantity: Some(3),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_admin_crud() {
        let state = testing::state();
        let admin = testing::user(&state, Role::Admin).await;

        let (status, Json(created)) =
            create(State(state.clone()), admin.clone(), Payload(fields()))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(updated) = update(
            State(state.clone()),
            admin.clone(),
            Path(created.id.to_string()),
            Payload(DeviceFields {
                stock_quantity: Some(0),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.stock_quantity, 0);
        assert_eq!(updated.name, "Pixel 9");

        let Json(fetched) = show(State(state.clone()), Path(created.id.to_string()))
            .await
            .unwrap();
        assert_eq!(fetched, updated);

        let Json(body) = remove(State(state.clone()), admin, Path(created.id.to_string()))
            .await
            .unwrap();
        assert_eq!(body["message"], "Device removed");

        assert!(matches!(
            show(State(state), Path(created.id.to_string())).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_customer_forbidden() {
        let state = testing::state();
        let customer = testing::user(&state, Role::Customer).await;

        let result = create(State(state), customer, Payload(fields())).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_create_missing_fields() {
        let state = testing::state();
        let admin = testing::user(&state, Role::Admin).await;

        let result = create(
            State(state),
            admin,
            Payload(DeviceFields {
                price: Some(0.0),
                ..fields()
            }),
        )
        .await;

        assert!(matches!(
            result,
            Err(AppError::Validation(message)) if message.starts_with("Please include all required fields")
        ));
    }

    #[tokio::test]
    async fn test_missing_and_malformed_ids() {
        let state = testing::state();
        let admin = testing::user(&state, Role::Admin).await;

        assert!(matches!(
            show(State(state.clone()), Path("not-an-id".into())).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            remove(State(state.clone()), admin.clone(), Path(uuid::Uuid::new_v4().to_string())).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            update(
                State(state),
                admin,
                Path(uuid::Uuid::new_v4().to_string()),
                Payload(fields())
            )
            .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let state = testing::state();
        testing::device(&state, "Pixel 9", 799.0, 3).await;
        testing::device(&state, "Budget Phone", 199.0, 3).await;

        let Json(devices) = list(
            State(state.clone()),
            Params(DeviceQuery {
                max_price: Some("500".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "Budget Phone");

        let result = list(
            State(state),
            Params(DeviceQuery {
                sort_by: Some("weight:asc".into()),
                ..Default::default()
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
