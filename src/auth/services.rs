use std::sync::Arc;

use anyhow::Context;
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        AuthResponse, ChangePasswordRequest, LoginRequest, PublicUser, RegisterRequest,
        ResetPasswordRequest, UpdateProfileRequest,
    },
    jwt::JwtKeys,
    mailer::Mailer,
    password::PasswordHasher,
    repo::{ResetTokenStore, StoreError, UserStore},
    repo_types::{NewUser, ProfileChanges, ResetOutcome, Role, User},
    validation,
};
use crate::config::{AdminSeed, ResetConfig};
use crate::error::{AuthError, AuthResult};

/// Orchestrates the account and session lifecycle on top of the stores,
/// the password hasher and the token issuer.
pub struct SessionService {
    users: Arc<dyn UserStore>,
    resets: Arc<dyn ResetTokenStore>,
    hasher: PasswordHasher,
    keys: JwtKeys,
    mailer: Arc<dyn Mailer>,
    reset: ResetConfig,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        resets: Arc<dyn ResetTokenStore>,
        hasher: PasswordHasher,
        keys: JwtKeys,
        mailer: Arc<dyn Mailer>,
        reset: ResetConfig,
    ) -> Self {
        Self {
            users,
            resets,
            hasher,
            keys,
            mailer,
            reset,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    fn issue_pair(&self, user: User) -> AuthResult<AuthResponse> {
        let access_token = self.keys.sign_access(&user)?;
        let refresh_token = self.keys.sign_refresh(&user)?;
        Ok(AuthResponse {
            access_token,
            refresh_token,
            user: user.into(),
        })
    }

    async fn load(&self, user_id: Uuid) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)
    }

    /// Failures are logged; the surrounding operation still succeeds.
    async fn send_best_effort(&self, to: &str, subject: &str, body: &str) {
        if let Err(e) = self.mailer.send_email(to, subject, body).await {
            let err = AuthError::from(e);
            warn!(error = %err, %to, %subject, "email not sent");
        }
    }

    #[instrument(skip(self, req), fields(email = %req.email.trim()))]
    pub async fn register(&self, req: RegisterRequest) -> AuthResult<AuthResponse> {
        let name = validation::name(&req.name)?;
        let email = validation::email(&req.email)?;
        validation::password_strength(&req.password)?;
        validation::passwords_match(&req.password, &req.confirm_password)?;

        let password_hash = self.hasher.hash_async(&req.password).await?;

        // The unique index decides races between concurrent registrations.
        let user = self
            .users
            .create(NewUser {
                email,
                name,
                password_hash,
                role: Role::User,
            })
            .await
            .map_err(|e| {
                warn!(error = %e, "create user failed");
                AuthError::from(e)
            })?;

        self.send_best_effort(
            &user.email,
            "Welcome",
            &format!("Hello {}, your account has been created.", user.name),
        )
        .await;

        info!(user_id = %user.id, "user registered");
        self.issue_pair(user)
    }

    #[instrument(skip(self, req), fields(email = %req.email.trim()))]
    pub async fn login(&self, req: LoginRequest) -> AuthResult<AuthResponse> {
        let email = validation::normalize_email(&req.email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            // Pay the hashing cost anyway so response time does not reveal the miss.
            let _ = self.hasher.hash_async(&req.password).await;
            warn!("login unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .hasher
            .verify_async(&req.password, &user.password_hash)
            .await?
        {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, "user logged in");
        self.issue_pair(user)
    }

    /// Mints a new access token and rotates the refresh token.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<AuthResponse> {
        let claims = self.keys.verify_refresh(refresh_token)?;

        let Some(user) = self.users.find_by_id(claims.sub).await? else {
            warn!(user_id = %claims.sub, "refresh for deleted user");
            return Err(AuthError::InvalidToken);
        };
        if user.token_version != claims.ver {
            warn!(user_id = %user.id, "refresh token revoked");
            return Err(AuthError::InvalidToken);
        }

        self.issue_pair(user)
    }

    /// Revokes every refresh token of the user.
    #[instrument(skip(self))]
    pub async fn logout(&self, user_id: Uuid) -> AuthResult<()> {
        self.users.bump_token_version(user_id).await?;
        info!(%user_id, "user logged out");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn me(&self, user_id: Uuid) -> AuthResult<PublicUser> {
        Ok(self.load(user_id).await?.into())
    }

    /// Returns a fresh token pair; tokens issued before the change stop refreshing.
    #[instrument(skip(self, req))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        req: ChangePasswordRequest,
    ) -> AuthResult<AuthResponse> {
        let user = self.load(user_id).await?;

        if !self
            .hasher
            .verify_async(&req.current_password, &user.password_hash)
            .await?
        {
            warn!(%user_id, "change password with wrong current password");
            return Err(AuthError::InvalidCredentials);
        }
        validation::password_strength(&req.new_password)?;

        let hash = self.hasher.hash_async(&req.new_password).await?;
        let user = self.users.update_password(user_id, &hash).await?;

        info!(%user_id, "password changed");
        self.issue_pair(user)
    }

    #[instrument(skip(self, req))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        req: UpdateProfileRequest,
    ) -> AuthResult<PublicUser> {
        let changes = ProfileChanges {
            name: req.name.as_deref().map(validation::name).transpose()?,
            email: req.email.as_deref().map(validation::email).transpose()?,
        };
        if changes.name.is_none() && changes.email.is_none() {
            return Err(AuthError::validation("Nothing to update"));
        }

        let user = self.users.update_profile(user_id, changes).await?;
        info!(%user_id, "profile updated");
        Ok(user.into())
    }

    /// Never reports whether the email is registered.
    #[instrument(skip(self, email))]
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let email = validation::email(email)?;
        let Some(user) = self.users.find_by_email(&email).await? else {
            info!("password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_reset_token()?;
        let expires_at =
            OffsetDateTime::now_utc() + TimeDuration::minutes(self.reset.ttl_minutes);
        self.resets
            .replace_reset_token(user.id, &hash_reset_token(&token), expires_at)
            .await?;

        let link = build_reset_url(&self.reset.url_base, &token);
        self.send_best_effort(
            &user.email,
            "Password reset",
            &format!(
                "Use this link within {} minutes to choose a new password: {link}",
                self.reset.ttl_minutes
            ),
        )
        .await;

        info!(user_id = %user.id, "password reset issued");
        Ok(())
    }

    #[instrument(skip(self, req))]
    pub async fn reset_password(&self, req: ResetPasswordRequest) -> AuthResult<()> {
        validation::password_strength(&req.new_password)?;
        validation::passwords_match(&req.new_password, &req.confirm_password)?;

        // Hash before touching the token so a hashing failure leaves it usable.
        let hash = self.hasher.hash_async(&req.new_password).await?;
        let outcome = self
            .resets
            .redeem_reset_token(
                &hash_reset_token(req.token.trim()),
                &hash,
                OffsetDateTime::now_utc(),
            )
            .await?;

        match outcome {
            ResetOutcome::Applied(user) => {
                info!(user_id = %user.id, "password reset completed");
                Ok(())
            }
            ResetOutcome::Expired { user_id } => {
                warn!(%user_id, "expired reset token");
                Err(AuthError::ExpiredToken)
            }
            ResetOutcome::Unknown => Err(AuthError::InvalidToken),
        }
    }

    /// Creates the seed admin, or promotes the existing account with that email.
    #[instrument(skip(self, seed), fields(email = %seed.email))]
    pub async fn ensure_admin(&self, seed: &AdminSeed) -> AuthResult<()> {
        let email = validation::email(&seed.email)?;
        if let Some(existing) = self.users.find_by_email(&email).await? {
            if existing.role != Role::Admin {
                self.users.update_role(existing.id, Role::Admin).await?;
                info!(user_id = %existing.id, "existing account promoted to admin");
            }
            return Ok(());
        }

        let name = validation::name(&seed.name)?;
        validation::password_strength(&seed.password)?;
        let password_hash = self.hasher.hash_async(&seed.password).await?;
        match self
            .users
            .create(NewUser {
                email,
                name,
                password_hash,
                role: Role::Admin,
            })
            .await
        {
            Ok(user) => info!(user_id = %user.id, "admin account created"),
            // Another instance seeded it first.
            Err(StoreError::DuplicateEmail) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Admin routes re-check the stored account so demotion, deletion and
    /// revocation apply before the access token lapses.
    #[instrument(skip(self))]
    pub async fn authorize_admin(&self, user_id: Uuid, token_version: i32) -> AuthResult<Uuid> {
        let Some(user) = self.users.find_by_id(user_id).await? else {
            warn!(%user_id, "admin token for deleted user");
            return Err(AuthError::InvalidToken);
        };
        if user.token_version != token_version {
            warn!(%user_id, "admin token revoked");
            return Err(AuthError::InvalidToken);
        }
        if user.role != Role::Admin {
            warn!(%user_id, "admin route denied for non-admin");
            return Err(AuthError::Forbidden);
        }
        Ok(user.id)
    }

    #[instrument(skip(self))]
    pub async fn set_role(&self, admin_id: Uuid, user_id: Uuid, role: Role) -> AuthResult<PublicUser> {
        if admin_id == user_id && role != Role::Admin {
            return Err(AuthError::validation("Admins cannot demote themselves"));
        }
        let user = self.users.update_role(user_id, role).await?;
        info!(%admin_id, %user_id, ?role, "role changed");
        Ok(user.into())
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, admin_id: Uuid, user_id: Uuid) -> AuthResult<()> {
        if admin_id == user_id {
            return Err(AuthError::validation("Admins cannot delete themselves"));
        }
        self.users.delete(user_id).await?;
        info!(%admin_id, %user_id, "user deleted");
        Ok(())
    }
}

/// 32 random bytes, base64url. Only the hash is stored.
fn generate_reset_token() -> AuthResult<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate reset token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

fn hash_reset_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

fn build_reset_url(base: &str, token: &str) -> String {
    format!("{}?token={token}", base.trim_end_matches('/'))
}
