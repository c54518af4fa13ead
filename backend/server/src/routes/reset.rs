//! # Self-Service Password Reset
//!
//! 1. Initiate: look the account up by email or employee id, issue a 6 digit code
//!    (leading zeroes kept) valid for `RESET_CODE_TTL_SECS`
//! 2. Verify: the code marks the ticket verified; 5 wrong codes discard it
//! 3. Confirm: a verified, unexpired ticket allows one password change
//!
//! Initiate answers the same way whether or not the account exists. Verify and confirm name the
//! account either by `userId` or by the same `usernameOrEmail` given to initiate.
use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use shop::{
    tickets::ResetTicket,
    users::{User, normalize_email},
};
use subtle::ConstantTimeEq;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    auth::{check_complexity, hash_password},
    database::Database,
    error::AppError,
    state::AppState,
    utils::{Payload, message, non_empty},
};

const INITIATED: &str =
    "Password reset initiated. Please check your email/phone for verification.";
const INVALID_CODE: &str = "Invalid or expired verification code";
const NOT_VERIFIED: &str = "Password reset has not been verified or has expired";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Initiate {
    pub username_or_email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verify {
    pub user_id: Option<String>,
    pub username_or_email: Option<String>,
    pub verification_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirm {
    pub user_id: Option<String>,
    pub username_or_email: Option<String>,
    pub new_password: String,
}

pub fn verification_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000))
}

/// Active account whose email or employee id matches `lookup`.
async fn find_account(database: &Database, lookup: &str) -> Result<Option<User>, AppError> {
    let email = normalize_email(lookup);
    let users: Vec<User> = database.all().await?;

    Ok(users.into_iter().find(|user| {
        user.active && (user.email == email || user.employee_id.as_deref() == Some(lookup))
    }))
}

/// Resolves the ticket owner from an explicit id or the initiate lookup.
async fn ticket_owner(
    database: &Database,
    user_id: Option<String>,
    lookup: Option<String>,
    error: &str,
) -> Result<Uuid, AppError> {
    let invalid = || AppError::Validation(error.to_string());

    if let Some(raw) = non_empty(user_id) {
        return Uuid::parse_str(&raw).map_err(|_| invalid());
    }

    let lookup = non_empty(lookup).ok_or_else(invalid)?;
    find_account(database, &lookup)
        .await?
        .map(|user| user.id)
        .ok_or_else(invalid)
}

pub async fn initiate(
    State(state): State<Arc<AppState>>,
    Payload(request): Payload<Initiate>,
) -> Result<Json<Value>, AppError> {
    let lookup = non_empty(request.username_or_email)
        .ok_or_else(|| AppError::Validation("Please provide a username or email".into()))?;

    match find_account(&state.database, &lookup).await? {
        Some(user) => {
            let now = Utc::now();
            let ticket =
                ResetTicket::issue(user.id, verification_code(), state.config.reset_code_ttl, now);
            state.database.put(&ticket).await?;

            info!("Password reset initiated for {}", user.id);
            crate::notify::reset_code(&user, &ticket.code, ticket.expires_at);
        }
        None => debug!("Password reset requested for unknown account"),
    }

    Ok(message(INITIATED))
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    Payload(request): Payload<Verify>,
) -> Result<Json<Value>, AppError> {
    let invalid = || AppError::Validation(INVALID_CODE.into());
    let id = ticket_owner(
        &state.database,
        request.user_id,
        request.username_or_email,
        INVALID_CODE,
    )
    .await?;

    let mut ticket: ResetTicket = state.database.get(id).await?.ok_or_else(invalid)?;

    if ticket.is_expired(Utc::now()) {
        state.database.delete::<ResetTicket>(id).await?;
        return Err(invalid());
    }

    let matches: bool = ticket
        .code
        .as_bytes()
        .ct_eq(request.verification_code.trim().as_bytes())
        .into();
    if !matches {
        ticket.attempts += 1;
        if ticket.exhausted() {
            info!("Password reset for {id} discarded after too many attempts");
            state.database.delete::<ResetTicket>(id).await?;
        } else {
            state.database.put(&ticket).await?;
        }

        return Err(invalid());
    }

    ticket.verified = true;
    state.database.put(&ticket).await?;

    Ok(message("Identity verified. You can now reset your password."))
}

pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Payload(request): Payload<Confirm>,
) -> Result<Json<Value>, AppError> {
    let not_verified = || AppError::Validation(NOT_VERIFIED.into());
    let id = ticket_owner(
        &state.database,
        request.user_id,
        request.username_or_email,
        NOT_VERIFIED,
    )
    .await?;

    let ticket: ResetTicket = state
        .database
        .get(id)
        .await?
        .filter(|ticket: &ResetTicket| ticket.verified && !ticket.is_expired(Utc::now()))
        .ok_or_else(not_verified)?;

    check_complexity(&request.new_password)?;

    let _accounts = state.accounts.lock().await;
    let mut user: User = state
        .database
        .get(ticket.user)
        .await?
        .filter(|user: &User| user.active)
        .ok_or_else(not_verified)?;

    user.credential = Some(hash_password(&request.new_password)?);
    state.database.put(&user).await?;
    state.database.delete::<ResetTicket>(id).await?;

    info!("Password reset completed for {}", user.id);

    Ok(message("Password reset successfully."))
}
