//! In-process stores for tests. A single lock per map stands in for the
//! unique index so concurrent inserts race the same way they do in Postgres.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo::{ResetTokenStore, StoreError, UserStore};
use super::repo_types::{NewUser, ProfileChanges, ResetOutcome, Role, User};

struct ResetRow {
    user_id: Uuid,
    expires_at: OffsetDateTime,
    used: bool,
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    resets: Arc<RwLock<HashMap<Vec<u8>, ResetRow>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<F>(&self, id: Uuid, f: F) -> Result<User, StoreError>
    where
        F: FnOnce(&mut User) + Send,
    {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        f(user);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    /// Moves every stored reset token's expiry into the past.
    pub async fn expire_reset_tokens(&self) {
        let past = OffsetDateTime::now_utc() - time::Duration::minutes(1);
        for row in self.resets.write().await.values_mut() {
            row.expires_at = past;
        }
    }
}

fn email_taken(users: &HashMap<Uuid, User>, email: &str, except: Option<Uuid>) -> bool {
    users
        .values()
        .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if email_taken(&users, &user.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role: user.role,
            token_version: 0,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<User, StoreError> {
        let hash = password_hash.to_owned();
        self.modify(id, move |u| {
            u.password_hash = hash;
            u.token_version += 1;
        })
        .await
    }

    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if let Some(email) = &changes.email {
            if email_taken(&users, email, Some(id)) {
                return Err(StoreError::DuplicateEmail);
            }
        }
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<User, StoreError> {
        self.modify(id, move |u| {
            u.role = role;
            u.token_version += 1;
        })
        .await
    }

    async fn bump_token_version(&self, id: Uuid) -> Result<User, StoreError> {
        self.modify(id, |u| u.token_version += 1).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.users
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)?;
        self.resets.write().await.retain(|_, r| r.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn replace_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &[u8],
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut resets = self.resets.write().await;
        resets.retain(|_, r| r.used || r.user_id != user_id);
        resets.insert(
            token_hash.to_vec(),
            ResetRow {
                user_id,
                expires_at,
                used: false,
            },
        );
        Ok(())
    }

    async fn redeem_reset_token(
        &self,
        token_hash: &[u8],
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<ResetOutcome, StoreError> {
        // Lock order: resets, then users.
        let mut resets = self.resets.write().await;
        let Some(row) = resets.get_mut(token_hash).filter(|row| !row.used) else {
            return Ok(ResetOutcome::Unknown);
        };
        if row.expires_at <= now {
            row.used = true;
            return Ok(ResetOutcome::Expired {
                user_id: row.user_id,
            });
        }

        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&row.user_id) else {
            return Ok(ResetOutcome::Unknown);
        };
        user.password_hash = password_hash.to_owned();
        user.token_version += 1;
        user.updated_at = now;
        row.used = true;
        Ok(ResetOutcome::Applied(user.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            name: "Ana".into(),
            password_hash: "hash".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn email_uniqueness_ignores_case() {
        let store = MemoryStore::new();
        store.create(new_user("ana@x.com")).await.expect("first insert");
        let err = store.create(new_user("ANA@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn password_update_bumps_version() {
        let store = MemoryStore::new();
        let user = store.create(new_user("ana@x.com")).await.expect("insert");
        let updated = store.update_password(user.id, "other").await.expect("update");
        assert_eq!(updated.token_version, user.token_version + 1);
        assert_eq!(updated.password_hash, "other");
    }

    #[tokio::test]
    async fn redeeming_applies_password_once() {
        let store = MemoryStore::new();
        let user = store.create(new_user("ana@x.com")).await.expect("insert");
        let expires = OffsetDateTime::now_utc() + time::Duration::minutes(30);
        store
            .replace_reset_token(user.id, b"tok", expires)
            .await
            .expect("store token");

        let now = OffsetDateTime::now_utc();
        match store.redeem_reset_token(b"tok", "new-hash", now).await {
            Ok(ResetOutcome::Applied(updated)) => {
                assert_eq!(updated.password_hash, "new-hash");
                assert_eq!(updated.token_version, user.token_version + 1);
            }
            other => panic!("expected Applied, got {other:?}"),
        }
        assert!(matches!(
            store.redeem_reset_token(b"tok", "again", now).await,
            Ok(ResetOutcome::Unknown)
        ));
        let stored = store.find_by_id(user.id).await.expect("find").expect("user");
        assert_eq!(stored.password_hash, "new-hash");
    }

    #[tokio::test]
    async fn expired_token_is_spent_without_touching_password() {
        let store = MemoryStore::new();
        let user = store.create(new_user("ana@x.com")).await.expect("insert");
        let expires = OffsetDateTime::now_utc() - time::Duration::minutes(1);
        store
            .replace_reset_token(user.id, b"tok", expires)
            .await
            .expect("store token");

        let now = OffsetDateTime::now_utc();
        assert!(matches!(
            store.redeem_reset_token(b"tok", "new-hash", now).await,
            Ok(ResetOutcome::Expired { user_id }) if user_id == user.id
        ));
        assert!(matches!(
            store.redeem_reset_token(b"tok", "new-hash", now).await,
            Ok(ResetOutcome::Unknown)
        ));
        let stored = store.find_by_id(user.id).await.expect("find").expect("user");
        assert_eq!(stored.password_hash, "hash");
        assert_eq!(stored.token_version, user.token_version);
    }

    #[tokio::test]
    async fn delete_missing_user_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.delete(Uuid::new_v4()).await,
            Err(StoreError::NotFound)
        ));
    }
}
