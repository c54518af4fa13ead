use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_ATTEMPTS: u32 = 5;

/// Pending password reset. At most one per user, keyed by the user's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetTicket {
    #[serde(rename = "_id")]
    pub user: Uuid,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    pub attempts: u32,
}

impl ResetTicket {
    pub fn issue(user: Uuid, code: String, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            user,
            code,
            expires_at: now + ttl,
            verified: false,
            attempts: 0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= MAX_ATTEMPTS
    }
}
