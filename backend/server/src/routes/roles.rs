use std::sync::{Arc, LazyLock};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shop::{
    roles::CustomRole,
    users::{Role, User},
};
use tracing::info;

use crate::{
    auth::AuthUser,
    database::Database,
    error::AppError,
    state::AppState,
    utils::{Payload, message, non_empty, parse_id},
};

const NOT_FOUND: &str = "Role not found";

// resource:action, lowercase, action may be a wildcard
static PERMISSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_-]*:([a-z][a-z0-9_-]*|\*)$").expect("permission pattern is valid")
});

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRole {
    pub role_name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateRole {
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct RoleEnvelope<T> {
    pub message: String,
    pub data: T,
}

fn permissions(raw: Vec<String>) -> Result<Vec<String>, AppError> {
    let mut permissions: Vec<String> = Vec::with_capacity(raw.len());

    for permission in raw {
        let permission = permission.trim().to_string();
        if !PERMISSION.is_match(&permission) {
            return Err(AppError::Validation(format!(
                "Invalid permission: {permission}"
            )));
        }
        if !permissions.contains(&permission) {
            permissions.push(permission);
        }
    }

    if permissions.is_empty() {
        return Err(AppError::Validation(
            "At least one permission is required".into(),
        ));
    }

    Ok(permissions)
}

async fn find(database: &Database, id: &str) -> Result<CustomRole, AppError> {
    let id = parse_id(id, NOT_FOUND)?;

    database
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.into()))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(request): Payload<CreateRole>,
) -> Result<(StatusCode, Json<RoleEnvelope<CustomRole>>), AppError> {
    auth.authorize(&[Role::Admin])?;

    let role_name = non_empty(request.role_name)
        .ok_or_else(|| AppError::Validation("Role name is required".into()))?;
    let permissions = permissions(request.permissions.unwrap_or_default())?;

    let roles: Vec<CustomRole> = state.database.all().await?;
    if roles.iter().any(|role| role.same_name(&role_name)) {
        return Err(AppError::Conflict(format!("Role {role_name} already exists")));
    }

    let role = CustomRole::new(
        role_name,
        non_empty(request.description).unwrap_or_default(),
        permissions,
        Utc::now(),
    );
    state.database.put(&role).await?;

    info!("Custom role {} ({}) created by {}", role.role_name, role.id, auth.id());

    Ok((
        StatusCode::CREATED,
        Json(RoleEnvelope {
            message: "Custom role created successfully".into(),
            data: role,
        }),
    ))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<RoleEnvelope<Vec<CustomRole>>>, AppError> {
    auth.authorize(&[Role::Admin])?;

    let mut roles: Vec<CustomRole> = state.database.all().await?;
    roles.sort_by_key(|role| role.role_name.to_lowercase());

    Ok(Json(RoleEnvelope {
        message: "Custom roles retrieved".into(),
        data: roles,
    }))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(role_id): Path<String>,
    Payload(request): Payload<UpdateRole>,
) -> Result<Json<RoleEnvelope<CustomRole>>, AppError> {
    auth.authorize(&[Role::Admin])?;

    let permissions = request.permissions.map(permissions).transpose()?;
    let mut role = find(&state.database, &role_id).await?;

    if let Some(description) = request.description {
        role.description = description.trim().to_string();
    }
    if let Some(permissions) = permissions {
        role.permissions = permissions;
    }
    role.updated_at = Some(Utc::now());

    state.database.put(&role).await?;

    Ok(Json(RoleEnvelope {
        message: format!("Custom role {} updated successfully", role.id),
        data: role,
    }))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(role_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(&[Role::Admin])?;
    let role = find(&state.database, &role_id).await?;

    let users: Vec<User> = state.database.all().await?;
    let assigned = users
        .iter()
        .filter(|user| user.custom_roles.contains(&role.id))
        .count();
    if assigned > 0 {
        return Err(AppError::Conflict(format!(
            "Role is assigned to {assigned} user(s)"
        )));
    }

    state.database.delete::<CustomRole>(role.id).await?;

    info!("Custom role {} deleted by {}", role.id, auth.id());

    Ok(message(format!("Custom role {} deleted successfully", role.id)))
}
