use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Trainer,
    Admin,
}

impl Role {
    /// Returns the lowercase wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Trainer => "trainer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated-caller context injected by the auth middleware.
///
/// Written into Redis by the account service at login; this core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    /// The ID of the authenticated user.
    pub user_id: Uuid,
    /// The caller's role.
    pub role: Role,
    /// The caller's display name, echoed back to media clients.
    pub display_name: String,
    /// The timestamp when the auth session expires.
    pub expires_at: DateTime<Utc>,
}
