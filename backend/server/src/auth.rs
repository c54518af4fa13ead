//! # Authentication
//!
//! ## Tokens
//! - Bearer JWT, HS256, signed with `JWT_SECRET`
//! - Claims: `sub` (user id), `role`, `exp`
//! - Lifetime from `TOKEN_TTL_HOURS`
//!
//! ## Passwords
//! - HMAC-SHA256 keyed by a random 16 byte salt, both stored hex encoded
//! - At least 8 characters with a lowercase letter, an uppercase letter and a digit
//!
//! ## Access
//! [`AuthUser`] extracts the caller from the `Authorization` header and reloads the
//! account on every request, so deactivation takes effect immediately.
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use hmac::{Hmac, Mac};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use shop::users::{Credential, Role, User};
use uuid::Uuid;

use crate::{config::Config, error::AppError, state::AppState};

type HmacSha256 = Hmac<Sha256>;

const SALT_BYTES: usize = 16;
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: i64,
}

pub fn issue_token(config: &Config, user: &User) -> Result<String, AppError> {
    let claims = Claims {
        sub: user.id,
        role: user.role,
        exp: (Utc::now() + config.token_ttl).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalError(format!("Failed to sign token: {e}")))
}

pub fn decode_token(config: &Config, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Not authorized, token failed".into()))
}

fn digest(salt: &[u8], password: &str) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(salt)
        .map_err(|e| AppError::InternalError(format!("Invalid salt: {e}")))?;
    mac.update(password.as_bytes());

    Ok(mac)
}

pub fn hash_password(password: &str) -> Result<Credential, AppError> {
    let salt: [u8; SALT_BYTES] = rand::random();
    let mac = digest(&salt, password)?;

    Ok(Credential {
        salt: hex::encode(salt),
        digest: hex::encode(mac.finalize().into_bytes()),
    })
}

pub fn verify_password(credential: &Credential, password: &str) -> bool {
    let (Ok(salt), Ok(expected)) = (hex::decode(&credential.salt), hex::decode(&credential.digest))
    else {
        return false;
    };

    digest(&salt, password)
        .map(|mac| mac.verify_slice(&expected).is_ok())
        .unwrap_or(false)
}

pub fn check_complexity(password: &str) -> Result<(), AppError> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if long_enough && has_lower && has_upper && has_digit {
        return Ok(());
    }

    Err(AppError::Validation(
        "Password must be at least 8 characters and include uppercase, lowercase and a digit"
            .into(),
    ))
}

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.user.role)
    }

    pub fn authorize(&self, roles: &[Role]) -> Result<(), AppError> {
        if self.has_role(roles) {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "User role {} is not authorized to access this route",
            self.user.role
        )))
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Not authorized, no token".into()))?;

        let claims = decode_token(&state.config, token)?;

        let user: User = state
            .database
            .get(claims.sub)
            .await?
            .filter(|user: &User| user.active)
            .ok_or_else(|| AppError::Unauthorized("Not authorized, account unavailable".into()))?;

        Ok(Self { user })
    }
}
