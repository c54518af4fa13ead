use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named permission set assignable on top of a user's built-in role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRole {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub role_name: String,
    #[serde(default)]
    pub description: String,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CustomRole {
    pub fn new(
        role_name: String,
        description: String,
        permissions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            role_name,
            description,
            permissions,
            created_at: now,
            updated_at: None,
        }
    }

    pub fn same_name(&self, other: &str) -> bool {
        self.role_name.eq_ignore_ascii_case(other.trim())
    }
}
