use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::repo_types::{NewUser, ProfileChanges, ResetOutcome, ResetTicket, Role, User};
use crate::error::AuthError;

const USER_COLUMNS: &str =
    "id, email, name, password_hash, role, token_version, created_at, updated_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Record not found")]
    NotFound,
    #[error("Database unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db_err)
                if db_err.code().is_some_and(|code| code.as_ref() == "23505") =>
            {
                StoreError::DuplicateEmail
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::Unavailable(err),
            other => StoreError::Database(other),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AuthError::DuplicateEmail,
            StoreError::NotFound => AuthError::NotFound,
            StoreError::Unavailable(e) => AuthError::Unavailable(e),
            StoreError::Database(e) => AuthError::Internal(e.into()),
        }
    }
}

/// Durable CRUD over user records. Emails are expected already lowercased.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Also bumps `token_version`.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<User, StoreError>;
    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> Result<User, StoreError>;
    /// Also bumps `token_version`.
    async fn update_role(&self, id: Uuid, role: Role) -> Result<User, StoreError>;
    async fn bump_token_version(&self, id: Uuid) -> Result<User, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Storage for single-use password reset tokens, keyed by token hash.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Drops the user's unused tokens and stores a new one.
    async fn replace_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &[u8],
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Spends the token and, when it is still valid at `now`, stores the new
    /// password hash. Both happen or neither does.
    async fn redeem_reset_token(
        &self,
        token_hash: &[u8],
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<ResetOutcome, StoreError>;
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, name, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.role)
        .fetch_one(&self.db)
        .await?;
        debug!(user_id = %created.id, "user row inserted");
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET password_hash = $2, token_version = token_version + 1, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name), email = COALESCE($3, email), updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.name)
        .bind(changes.email)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET role = $2, token_version = token_version + 1, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(role)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn bump_token_version(&self, id: Uuid) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET token_version = token_version + 1, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ResetTokenStore for PgStore {
    async fn replace_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &[u8],
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM password_resets WHERE user_id = $1 AND used_at IS NULL")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO password_resets (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn redeem_reset_token(
        &self,
        token_hash: &[u8],
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<ResetOutcome, StoreError> {
        let mut tx = self.db.begin().await?;
        // Row lock from the UPDATE serializes concurrent redemptions of one token.
        let ticket = sqlx::query_as::<_, ResetTicket>(
            r#"
            UPDATE password_resets
            SET used_at = now()
            WHERE token_hash = $1 AND used_at IS NULL
            RETURNING user_id, expires_at
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(ticket) = ticket else {
            return Ok(ResetOutcome::Unknown);
        };

        if ticket.expires_at <= now {
            tx.commit().await?;
            return Ok(ResetOutcome::Expired {
                user_id: ticket.user_id,
            });
        }

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET password_hash = $2, token_version = token_version + 1, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(ticket.user_id)
        .bind(password_hash)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(user) = user else {
            return Ok(ResetOutcome::Unknown);
        };

        tx.commit().await?;
        debug!(user_id = %user.id, "reset token redeemed");
        Ok(ResetOutcome::Applied(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::NotFound
        ));
    }

    #[test]
    fn pool_timeouts_surface_as_unavailable() {
        let err = AuthError::from(StoreError::from(sqlx::Error::PoolTimedOut));
        assert!(matches!(err, AuthError::Unavailable(_)));
    }

    #[test]
    fn duplicate_maps_to_auth_conflict() {
        assert!(matches!(
            AuthError::from(StoreError::DuplicateEmail),
            AuthError::DuplicateEmail
        ));
    }
}
