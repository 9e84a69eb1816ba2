use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                   // unique user ID
    pub email: String,              // lowercased login key
    pub name: String,               // display name
    #[serde(skip_serializing)]
    pub password_hash: String,      // Argon2 hash, not exposed in JSON
    pub role: Role,
    pub token_version: i32,         // bumped to revoke refresh tokens
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Insert payload; the hash comes from `PasswordHasher` only.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
}

/// Whitelisted profile fields. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A claimed password reset row.
#[derive(Debug, Clone, FromRow)]
pub struct ResetTicket {
    pub user_id: Uuid,
    pub expires_at: OffsetDateTime,
}

/// Result of redeeming a reset token together with the new password hash.
#[derive(Debug, Clone)]
pub enum ResetOutcome {
    /// Password replaced and `token_version` bumped.
    Applied(User),
    /// Token existed but had lapsed; it is spent and the password is unchanged.
    Expired { user_id: Uuid },
    /// Unknown, already used, or its owner is gone.
    Unknown,
}
