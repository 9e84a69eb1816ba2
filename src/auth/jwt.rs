use std::time::Duration;

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::{Claims, TokenKind};
use super::repo_types::User;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    pub(crate) fn sign_with_ttl(
        &self,
        user: &User,
        kind: TokenKind,
        ttl: TimeDuration,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + ttl;
        let claims = Claims {
            sub: user.id,
            role: user.role,
            ver: user.token_version,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.into()))?;
        debug!(user_id = %user.id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    fn sign_with_kind(&self, user: &User, kind: TokenKind) -> AuthResult<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        self.sign_with_ttl(user, kind, TimeDuration::seconds(ttl.as_secs() as i64))
    }

    pub fn sign_access(&self, user: &User) -> AuthResult<String> {
        self.sign_with_kind(user, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user: &User) -> AuthResult<String> {
        self.sign_with_kind(user, TokenKind::Refresh)
    }

    /// Checks signature, issuer, audience and expiry; any kind is accepted.
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => {
                    debug!(error = %e, "jwt rejected");
                    AuthError::InvalidToken
                }
            }
        })?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    fn verify_kind(&self, token: &str, kind: TokenKind) -> AuthResult<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != kind {
            debug!(expected = ?kind, got = ?claims.kind, "jwt kind mismatch");
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    pub fn verify_access(&self, token: &str) -> AuthResult<Claims> {
        self.verify_kind(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> AuthResult<Claims> {
        self.verify_kind(token, TokenKind::Refresh)
    }
}

#[cfg(test)]
pub(crate) fn test_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
    JwtKeys::from(&JwtConfig {
        secret: secret.into(),
        issuer: issuer.into(),
        audience: audience.into(),
        ttl_minutes: 5,
        refresh_ttl_minutes: 60,
    })
}

#[cfg(test)]
pub(crate) fn sample_user() -> User {
    use super::repo_types::Role;
    let now = OffsetDateTime::now_utc();
    User {
        id: uuid::Uuid::new_v4(),
        email: "ana@x.com".into(),
        name: "Ana".into(),
        password_hash: "$argon2id$placeholder".into(),
        role: Role::User,
        token_version: 3,
        created_at: now,
        updated_at: now,
    }
}
