use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder session secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage: StorageKind,
    pub db_path: PathBuf,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    pub pending_hold_minutes: i64,
    pub cookie_secure: bool,
    pub first_user_admin: bool,
    pub currency: String,
    pub stripe_secret_key: Option<String>,
    pub smtp: Option<SmtpConfig>,
    pub admin_email: Option<String>,
    pub cors_origin: Option<String>,
    pub seed: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let session_secret = var("EVENTMASTER_SESSION_SECRET").unwrap_or_default();
        if session_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&session_secret.as_str()) {
            bail!("EVENTMASTER_SESSION_SECRET is unset or still a placeholder");
        }
        if session_secret.len() < MIN_SECRET_LEN {
            bail!("EVENTMASTER_SESSION_SECRET must be at least {MIN_SECRET_LEN} characters");
        }

        let storage = match var("EVENTMASTER_STORAGE").as_deref() {
            None | Some("sqlite") => StorageKind::Sqlite,
            Some("memory") => StorageKind::Memory,
            Some(other) => bail!("EVENTMASTER_STORAGE must be 'sqlite' or 'memory', got '{other}'"),
        };

        let port: u16 = var("EVENTMASTER_PORT")
            .unwrap_or_else(|| "5000".into())
            .parse()
            .context("EVENTMASTER_PORT must be a port number")?;

        let session_ttl_hours: i64 = match var("EVENTMASTER_SESSION_TTL_HOURS") {
            Some(v) => v.parse().context("EVENTMASTER_SESSION_TTL_HOURS must be a number")?,
            None => 168, // 7 days
        };
        if session_ttl_hours <= 0 {
            bail!("EVENTMASTER_SESSION_TTL_HOURS must be positive");
        }

        let pending_hold_minutes: i64 = match var("EVENTMASTER_PENDING_HOLD_MINUTES") {
            Some(v) => v.parse().context("EVENTMASTER_PENDING_HOLD_MINUTES must be a number")?,
            None => 30,
        };
        if pending_hold_minutes <= 0 {
            bail!("EVENTMASTER_PENDING_HOLD_MINUTES must be positive");
        }

        let smtp = match var("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: var("SMTP_PORT")
                    .map(|p| p.parse::<u16>())
                    .transpose()
                    .context("SMTP_PORT must be a port number")?
                    .unwrap_or(587),
                username: var("SMTP_USERNAME"),
                password: var("SMTP_PASSWORD"),
                from: var("SMTP_FROM").context("SMTP_FROM is required when SMTP_HOST is set")?,
            }),
            None => None,
        };

        Ok(Self {
            host: var("EVENTMASTER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            storage,
            db_path: var("EVENTMASTER_DB_PATH")
                .unwrap_or_else(|| "eventmaster.db".into())
                .into(),
            session_secret,
            session_ttl_hours,
            pending_hold_minutes,
            cookie_secure: flag(var("EVENTMASTER_COOKIE_SECURE"), false)?,
            first_user_admin: flag(var("EVENTMASTER_FIRST_USER_ADMIN"), true)?,
            currency: var("EVENTMASTER_CURRENCY")
                .unwrap_or_else(|| "usd".into())
                .to_lowercase(),
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            smtp,
            admin_email: var("EVENTMASTER_ADMIN_EMAIL"),
            cors_origin: var("EVENTMASTER_CORS_ORIGIN"),
            seed: flag(var("EVENTMASTER_SEED"), false)?,
        })
    }
}

fn flag(value: Option<String>, default: bool) -> anyhow::Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => bail!("expected a boolean, got '{other}'"),
    }
}
