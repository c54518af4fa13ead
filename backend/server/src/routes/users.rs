//! # User Administration
//!
//! Admin-only account management.
//!
//! - Manual creation: every attribute required, email and employee id unique
//! - Attribute updates: partial, same uniqueness rules, custom roles must exist
//! - Deactivation: the account stays on record but can no longer authenticate
//!
//! Accounts created here have no password until the owner completes a reset.
use std::{collections::HashSet, sync::Arc};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shop::{
    roles::CustomRole,
    tickets::ResetTicket,
    users::{Role, User, UserProfile, normalize_email},
};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    database::Database,
    error::AppError,
    routes::auth::valid_email,
    state::AppState,
    utils::{Params, Payload, message, non_empty, parse_id},
};

const NOT_FOUND: &str = "User not found";
const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub employee_id: Option<String>,
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub employee_id: Option<String>,
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub role: Option<Role>,
    pub custom_roles: Option<Vec<Uuid>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Page {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub message: String,
    pub data: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub message: String,
    pub data: Vec<UserProfile>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
}

fn envelope(message: impl Into<String>, user: &User) -> Json<UserEnvelope> {
    Json(UserEnvelope {
        message: message.into(),
        data: user.profile(),
    })
}

async fn find(database: &Database, id: &str) -> Result<User, AppError> {
    let id = parse_id(id, NOT_FOUND)?;

    database
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.into()))
}

/// Rejects an email or employee id already held by another account.
fn ensure_unique(
    users: &[User],
    except: Option<Uuid>,
    email: &str,
    employee_id: Option<&str>,
) -> Result<(), AppError> {
    let others = || users.iter().filter(|user| Some(user.id) != except);

    if others().any(|user| user.email == email) {
        return Err(AppError::Conflict(
            "User with this email already exists".into(),
        ));
    }

    if let Some(employee_id) = employee_id {
        if others().any(|user| user.employee_id.as_deref() == Some(employee_id)) {
            return Err(AppError::Conflict(
                "User with this employee ID already exists".into(),
            ));
        }
    }

    Ok(())
}

fn parse_page(page: Page) -> Result<(usize, usize), AppError> {
    let parse = |name: &str, raw: Option<String>, default: usize| {
        non_empty(raw)
            .map(|raw| {
                raw.parse::<usize>()
                    .ok()
                    .filter(|value| *value >= 1)
                    .ok_or_else(|| AppError::Validation(format!("Invalid {name} value")))
            })
            .transpose()
            .map(|value| value.unwrap_or(default))
    };

    let page_number = parse("page", page.page, 1)?;
    let limit = parse("limit", page.limit, DEFAULT_LIMIT)?.min(MAX_LIMIT);

    Ok((page_number, limit))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(request): Payload<CreateUser>,
) -> Result<(StatusCode, Json<UserEnvelope>), AppError> {
    auth.authorize(&[Role::Admin])?;

    let attributes = [
        ("firstName", non_empty(request.first_name)),
        ("lastName", non_empty(request.last_name)),
        ("email", non_empty(request.email)),
        ("employeeId", non_empty(request.employee_id)),
        ("department", non_empty(request.department)),
        ("jobTitle", non_empty(request.job_title)),
    ];

    let missing: Vec<&str> = attributes
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "Missing required attributes: {}",
            missing.join(", ")
        )));
    }

    let [first_name, last_name, email, employee_id, department, job_title] =
        attributes.map(|(_, value)| value.unwrap_or_default());

    if !valid_email(&email) {
        return Err(AppError::Validation("Please provide a valid email".into()));
    }

    let _accounts = state.accounts.lock().await;
    let users: Vec<User> = state.database.all().await?;
    ensure_unique(&users, None, &normalize_email(&email), Some(employee_id.as_str()))?;

    let mut user = User::new(
        User::full_name(&first_name, &last_name),
        email,
        request.role.unwrap_or_default(),
        Utc::now(),
    );
    user.first_name = Some(first_name);
    user.last_name = Some(last_name);
    user.employee_id = Some(employee_id);
    user.department = Some(department);
    user.job_title = Some(job_title);

    state.database.put(&user).await?;

    info!("User {} created by {}", user.id, auth.id());

    Ok((
        StatusCode::CREATED,
        envelope("User created successfully", &user),
    ))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Params(page): Params<Page>,
) -> Result<Json<UserList>, AppError> {
    auth.authorize(&[Role::Admin])?;
    let (page, limit) = parse_page(page)?;

    let mut users: Vec<User> = state.database.all().await?;
    users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.email.cmp(&b.email)));

    let total = users.len();
    let data = users
        .iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .map(User::profile)
        .collect();

    Ok(Json(UserList {
        message: "Users retrieved".into(),
        data,
        page,
        limit,
        total,
    }))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<UserEnvelope>, AppError> {
    auth.authorize(&[Role::Admin])?;
    let user = find(&state.database, &id).await?;

    Ok(envelope("User details", &user))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Payload(request): Payload<UpdateUser>,
) -> Result<Json<UserEnvelope>, AppError> {
    auth.authorize(&[Role::Admin])?;

    let _accounts = state.accounts.lock().await;
    let mut user = find(&state.database, &id).await?;

    if let Some(email) = non_empty(request.email) {
        if !valid_email(&email) {
            return Err(AppError::Validation("Please provide a valid email".into()));
        }
        user.email = normalize_email(&email);
    }
    if let Some(employee_id) = non_empty(request.employee_id) {
        user.employee_id = Some(employee_id);
    }
    if let Some(first_name) = non_empty(request.first_name) {
        user.first_name = Some(first_name);
    }
    if let Some(last_name) = non_empty(request.last_name) {
        user.last_name = Some(last_name);
    }
    if let Some(department) = non_empty(request.department) {
        user.department = Some(department);
    }
    if let Some(job_title) = non_empty(request.job_title) {
        user.job_title = Some(job_title);
    }
    if let Some(role) = request.role {
        user.role = role;
    }

    if let Some(mut custom_roles) = request.custom_roles {
        let mut seen = HashSet::new();
        custom_roles.retain(|id| seen.insert(*id));

        let roles: Vec<CustomRole> = state.database.all().await?;
        if let Some(unknown) = custom_roles
            .iter()
            .find(|id| !roles.iter().any(|role| role.id == **id))
        {
            return Err(AppError::Validation(format!("Custom role {unknown} does not exist")));
        }
        user.custom_roles = custom_roles;
    }

    if user.first_name.is_some() || user.last_name.is_some() {
        user.name = User::full_name(
            user.first_name.as_deref().unwrap_or_default(),
            user.last_name.as_deref().unwrap_or_default(),
        );
    }

    let users: Vec<User> = state.database.all().await?;
    ensure_unique(&users, Some(user.id), &user.email, user.employee_id.as_deref())?;

    state.database.put(&user).await?;

    info!("User {} attributes updated by {}", user.id, auth.id());

    Ok(envelope(format!("User {} attributes updated", user.id), &user))
}

pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(&[Role::Admin])?;

    let _accounts = state.accounts.lock().await;
    let mut user = find(&state.database, &id).await?;

    user.deactivate(Utc::now());
    state.database.put(&user).await?;
    state.database.delete::<ResetTicket>(user.id).await?;

    info!("User {} deactivated by {}", user.id, auth.id());
    crate::notify::deactivated(&user);

    Ok(message(format!("User {} deactivated successfully.", user.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn employee(email: &str, employee_id: &str) -> CreateUser {
        CreateUser {
            first_name: Some("Grace".into()),
            last_name: Some("Hopper".into()),
            email: Some(email.into()),
            employee_id: Some(employee_id.into()),
            department: Some("Engineering".into()),
            job_title: Some("Rear Admiral".into()),
            role: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_show() {
        let state = testing::state();
        let admin = testing::user(&state, Role::Admin).await;

        let (status, Json(created)) = create(
            State(state.clone()),
            admin.clone(),
            Payload(employee("grace@navy.mil", "E-1")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.data.name, "Grace Hopper");
        assert_eq!(created.data.role, Role::Customer);
        assert!(created.data.active);

        let Json(shown) = show(State(state), admin, Path(created.data.id.to_string()))
            .await
            .unwrap();
        assert_eq!(shown.data, created.data);
    }

    #[tokio::test]
    async fn test_create_lists_missing_attributes() {
        let state = testing::state();
        let admin = testing::user(&state, Role::Admin).await;

        let result = create(
            State(state),
            admin,
            Payload(CreateUser {
                first_name: Some("Grace".into()),
                department: Some("  ".into()),
                ..Default::default()
            }),
        )
        .await;

        assert!(matches!(
            result,
            Err(AppError::Validation(ref message))
                if message == "Missing required attributes: lastName, email, employeeId, department, jobTitle"
        ));
    }

    #[tokio::test]
    async fn test_create_duplicates() {
        let state = testing::state();
        let admin = testing::user(&state, Role::Admin).await;
        create(State(state.clone()), admin.clone(), Payload(employee("grace@navy.mil", "E-1")))
            .await
            .unwrap();

        assert!(matches!(
            create(State(state.clone()), admin.clone(), Payload(employee("GRACE@navy.mil", "E-2"))).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            create(State(state), admin, Payload(employee("other@navy.mil", "E-1"))).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_keep_employee_id_unique() {
        let state = testing::state();
        let admin = testing::user(&state, Role::Admin).await;

        let tasks: Vec<_> = (0..12)
            .map(|n| {
                let state = state.clone();
                let admin = admin.clone();
                tokio::spawn(async move {
                    create(State(state), admin, Payload(employee(&format!("e{n}@navy.mil"), "E-7"))).await
                })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_non_admin_forbidden() {
        let state = testing::state();
        let support = testing::user(&state, Role::Support).await;

        assert!(matches!(
            list(State(state), support, Params(Page::default())).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let state = testing::state();
        let admin = testing::user(&state, Role::Admin).await;
        for _ in 0..4 {
            testing::user(&state, Role::Customer).await;
        }

        let Json(listing) = list(
            State(state.clone()),
            admin.clone(),
            Params(Page {
                page: Some("2".into()),
                limit: Some("2".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(listing.total, 5);
        assert_eq!(listing.data.len(), 2);

        assert!(matches!(
            list(
                State(state),
                admin,
                Params(Page {
                    page: Some("0".into()),
                    limit: None,
                })
            )
            .await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_attributes() {
        let state = testing::state();
        let admin = testing::user(&state, Role::Admin).await;
        let other = testing::user(&state, Role::Customer).await;
        let (_, Json(created)) = create(
            State(state.clone()),
            admin.clone(),
            Payload(employee("grace@navy.mil", "E-1")),
        )
        .await
        .unwrap();
        let id = created.data.id.to_string();

        let role = CustomRole::new("Auditor".into(), "".into(), vec!["orders:read".into()], Utc::now());
        state.database.put(&role).await.unwrap();

        let Json(updated) = update(
            State(state.clone()),
            admin.clone(),
            Path(id.clone()),
            Payload(UpdateUser {
                last_name: Some("Murray Hopper".into()),
                role: Some(Role::Support),
                custom_roles: Some(vec![role.id]),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.data.name, "Grace Murray Hopper");
        assert_eq!(updated.data.role, Role::Support);
        assert_eq!(updated.data.custom_roles, vec![role.id]);
        assert_eq!(updated.data.department.as_deref(), Some("Engineering"));

        assert!(matches!(
            update(
                State(state.clone()),
                admin.clone(),
                Path(id.clone()),
                Payload(UpdateUser {
                    custom_roles: Some(vec![Uuid::new_v4()]),
                    ..Default::default()
                })
            )
            .await,
            Err(AppError::Validation(_))
        ));

        assert!(matches!(
            update(
                State(state),
                admin,
                Path(id),
                Payload(UpdateUser {
                    email: Some(other.user.email.clone()),
                    ..Default::default()
                })
            )
            .await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_deactivate() {
        let state = testing::state();
        let admin = testing::user(&state, Role::Admin).await;
        let target = testing::user(&state, Role::Customer).await;

        for _ in 0..2 {
            let Json(body) = deactivate(State(state.clone()), admin.clone(), Path(target.id().to_string()))
                .await
                .unwrap();
            assert_eq!(
                body["message"],
                format!("User {} deactivated successfully.", target.id())
            );
        }

        let stored: User = state.database.get(target.id()).await.unwrap().unwrap();
        assert!(!stored.active);

        assert!(matches!(
            deactivate(State(state), admin, Path(Uuid::new_v4().to_string())).await,
            Err(AppError::NotFound(_))
        ));
    }
}
