use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shop::users::{Role, User, UserProfile, normalize_email};
use tracing::info;

use crate::{
    auth::{check_complexity, hash_password, issue_token, verify_password},
    database::Database,
    error::AppError,
    state::AppState,
    utils::{Payload, non_empty},
};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Session {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub token: String,
}

pub async fn find_by_email(database: &Database, email: &str) -> Result<Option<User>, AppError> {
    let email = normalize_email(email);
    let users: Vec<User> = database.all().await?;

    Ok(users.into_iter().find(|user| user.email == email))
}

pub fn valid_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(' '),
        None => false,
    }
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Payload(request): Payload<RegisterRequest>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let (Some(name), Some(email), Some(password)) = (
        non_empty(request.name),
        non_empty(request.email),
        request.password.filter(|password| !password.is_empty()),
    ) else {
        return Err(AppError::Validation(
            "Please provide name, email, and password".into(),
        ));
    };

    if !valid_email(&email) {
        return Err(AppError::Validation("Please provide a valid email".into()));
    }
    check_complexity(&password)?;

    let _accounts = state.accounts.lock().await;
    if find_by_email(&state.database, &email).await?.is_some() {
        return Err(AppError::Conflict("User already exists".into()));
    }

    let mut user = User::new(name, email, Role::Customer, Utc::now());
    user.credential = Some(hash_password(&password)?);
    state.database.put(&user).await?;

    info!("Registered user {}", user.id);

    let token = issue_token(&state.config, &user)?;

    Ok((
        StatusCode::CREATED,
        Json(Session {
            profile: user.profile(),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Payload(request): Payload<LoginRequest>,
) -> Result<Json<Session>, AppError> {
    let invalid = || AppError::Unauthorized("Invalid credentials".into());

    let (Some(email), Some(password)) = (non_empty(request.email), request.password) else {
        return Err(invalid());
    };

    let user = find_by_email(&state.database, &email)
        .await?
        .filter(|user| user.active)
        .ok_or_else(invalid)?;

    let verified = user
        .credential
        .as_ref()
        .is_some_and(|credential| verify_password(credential, &password));
    if !verified {
        return Err(invalid());
    }

    let token = issue_token(&state.config, &user)?;

    Ok(Json(Session {
        profile: user.profile(),
        token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::decode_token, testing};

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: Some("Ada".into()),
            email: Some(email.into()),
            password: Some("Secret123".into()),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let state = testing::state();

        let (status, Json(session)) = register(
            State(state.clone()),
            Payload(register_request("Ada@Example.com")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(session.profile.email, "ada@example.com");
        assert_eq!(session.profile.role, Role::Customer);

        let Json(login_session) = login(
            State(state.clone()),
            Payload(LoginRequest {
                email: Some("ada@example.com".into()),
                password: Some("Secret123".into()),
            }),
        )
        .await
        .unwrap();

        let claims = decode_token(&state.config, &login_session.token).unwrap();
        assert_eq!(claims.sub, session.profile.id);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let state = testing::state();
        register(State(state.clone()), Payload(register_request("a@b.io")))
            .await
            .unwrap();

        let result = register(State(state), Payload(register_request(" A@B.io "))).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let state = testing::state();

        let mut weak = register_request("a@b.io");
        weak.password = Some("weak".into());
        assert!(matches!(
            register(State(state.clone()), Payload(weak)).await,
            Err(AppError::Validation(_))
        ));

        let mut missing = register_request("a@b.io");
        missing.name = None;
        assert!(matches!(
            register(State(state.clone()), Payload(missing)).await,
            Err(AppError::Validation(_))
        ));

        assert!(matches!(
            register(State(state), Payload(register_request("not-an-email"))).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let state = testing::state();
        let mut inactive = testing::user(&state, Role::Customer).await.user;
        inactive.deactivate(Utc::now());
        state.database.put(&inactive).await.unwrap();

        for (email, password) in [
            ("nobody@example.com", testing::PASSWORD),
            (inactive.email.as_str(), testing::PASSWORD),
        ] {
            let result = login(
                State(state.clone()),
                Payload(LoginRequest {
                    email: Some(email.into()),
                    password: Some(password.into()),
                }),
            )
            .await;

            assert!(
                matches!(result, Err(AppError::Unauthorized(ref message)) if message == "Invalid credentials")
            );
        }

        let active = testing::user(&state, Role::Customer).await.user;
        let result = login(
            State(state),
            Payload(LoginRequest {
                email: Some(active.email),
                password: Some("Wrong1234".into()),
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_valid_email() {
        assert!(valid_email("ada@example.com"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("ada@localhost"));
        assert!(!valid_email("ada example@x.io"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_share_one_account() {
        let state = testing::state();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move {
                    register(State(state), Payload(register_request("race@example.com"))).await
                })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(AppError::Conflict(message)) => assert_eq!(message, "User already exists"),
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(created, 1);
        let users: Vec<User> = state.database.all().await.unwrap();
        assert_eq!(users.iter().filter(|user| user.email == "race@example.com").count(), 1);
    }
}
