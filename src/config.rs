use anyhow::Context;
use serde::Deserialize;

/// Reset links older than a day are refused at startup.
pub const MAX_RESET_TTL_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Argon2 work factor. `None` falls back to the hasher's own default for that knob.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: Option<u32>,
    pub iterations: Option<u32>,
    pub parallelism: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    pub ttl_minutes: i64,
    pub url_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from: String,
}

/// Account promoted or created as ADMIN at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSeed {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub reset: ResetConfig,
    pub mail: MailConfig,
    pub admin: Option<AdminSeed>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests never touch the process env.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| -> anyhow::Result<Option<i64>> {
            lookup(key)
                .map(|v| v.parse::<i64>().with_context(|| format!("{key} must be an integer")))
                .transpose()
        };
        let parsed_u32 = |key: &str| -> anyhow::Result<Option<u32>> {
            lookup(key)
                .map(|v| v.parse::<u32>().with_context(|| format!("{key} must be a positive integer")))
                .transpose()
        };

        let database_url = lookup("DATABASE_URL").context("DATABASE_URL is not set")?;
        let secret = lookup("JWT_SECRET").context("JWT_SECRET is not set")?;
        if secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        let jwt = JwtConfig {
            secret,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "ledgerline".into()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "ledgerline-users".into()),
            ttl_minutes: parsed("JWT_TTL_MINUTES")?.unwrap_or(60),
            refresh_ttl_minutes: parsed("JWT_REFRESH_TTL_MINUTES")?.unwrap_or(60 * 24 * 14),
        };
        if jwt.ttl_minutes <= 0 || jwt.refresh_ttl_minutes <= jwt.ttl_minutes {
            anyhow::bail!("refresh token TTL must be longer than the positive access token TTL");
        }

        let password = PasswordConfig {
            memory_kib: parsed_u32("PASSWORD_MEMORY_KIB")?,
            iterations: parsed_u32("PASSWORD_ITERATIONS")?,
            parallelism: parsed_u32("PASSWORD_PARALLELISM")?,
        };

        let reset = ResetConfig {
            ttl_minutes: parsed("RESET_TTL_MINUTES")?.unwrap_or(30),
            url_base: lookup("RESET_URL_BASE")
                .unwrap_or_else(|| "http://localhost:3000/reset-password".into()),
        };
        if !(1..=MAX_RESET_TTL_MINUTES).contains(&reset.ttl_minutes) {
            anyhow::bail!("RESET_TTL_MINUTES must be between 1 and {MAX_RESET_TTL_MINUTES}");
        }

        let mail = MailConfig {
            from: lookup("MAIL_FROM").unwrap_or_else(|| "no-reply@ledgerline.local".into()),
        };

        let admin = match (lookup("ADMIN_EMAIL"), lookup("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                email,
                name: lookup("ADMIN_NAME").unwrap_or_else(|| "Administrator".into()),
                password,
            }),
            (None, None) => None,
            _ => anyhow::bail!("ADMIN_EMAIL and ADMIN_PASSWORD must be set together"),
        };

        let port = lookup("APP_PORT")
            .map(|v| v.parse::<u16>().context("APP_PORT must be a port number"))
            .transpose()?
            .unwrap_or(8080);

        Ok(Self {
            database_url,
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            jwt,
            password,
            reset,
            mail,
            admin,
        })
    }
}
