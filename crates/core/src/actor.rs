//! Acting identity for mutating operations.
//!
//! Authentication and role resolution happen outside the ledger; the calling
//! layer hands over an already-trusted `Actor` and the ledger records it.

use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Role resolved by the session provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Picker,
    Receiver,
    System,
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Identity used for background jobs (expiry sweeps, demo seeding).
    pub fn system() -> Self {
        Self {
            user_id: UserId::from_uuid(uuid::Uuid::nil()),
            role: Role::System,
        }
    }
}
