use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use anyhow::{Result, Context};
use log::debug;

use crate::security::rate_limit::{Endpoint, RateLimitPolicy};

/// Database configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: String,
    /// Maximum number of connections in the connection pool
    pub max_connections: u32,
}

/// Security configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SecurityConfig {
    /// HMAC secret used to sign access and refresh tokens
    pub jwt_secret: String,
    /// Issuer claim written into every token
    pub jwt_issuer: String,
    /// Access token lifetime in minutes
    pub access_token_minutes: i64,
    /// Refresh token lifetime in days
    pub refresh_token_days: i64,
    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,
    /// Argon2 iterations
    pub argon2_iterations: u32,
    /// Optional pepper mixed into passwords before hashing
    #[serde(default)]
    pub password_pepper: Option<String>,
    /// Failed logins before the account is locked
    pub max_failed_attempts: u32,
    /// Account lockout duration in minutes
    pub lockout_duration_minutes: i64,
    /// Password reset token lifetime in minutes
    pub reset_token_minutes: i64,
}

/// Email verification code settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerificationConfig {
    pub code_ttl_minutes: i64,
    pub max_attempts: u32,
}

/// In-memory rate limiter settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitConfig {
    /// Seconds between sweeps of expired counters
    pub sweep_interval_secs: u64,
    /// Per-endpoint overrides of the built-in policy table
    #[serde(default)]
    pub policies: HashMap<String, RateLimitPolicy>,
}

impl RateLimitConfig {
    /// Policy for an endpoint, falling back to the built-in quota
    pub fn policy_for(&self, endpoint: Endpoint) -> RateLimitPolicy {
        self.policies
            .get(endpoint.as_str())
            .copied()
            .unwrap_or_else(|| endpoint.default_policy())
    }
}

/// Outgoing email configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmailConfig {
    /// Deliver through SMTP when true, otherwise write messages to the outbox directory
    pub smtp_enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
    /// Directory used when SMTP delivery is disabled
    pub outbox_dir: String,
    /// Base URL of the web client, used in password reset links
    pub frontend_url: String,
}

/// Global application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Application version
    pub version: String,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Verification code configuration
    pub verification: VerificationConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Email configuration
    pub email: EmailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Accessible Auth".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseConfig {
                path: "data/accounts.db".to_string(),
                max_connections: 10,
            },
            security: SecurityConfig {
                jwt_secret: "change_me_in_production".to_string(),
                jwt_issuer: "accessible-auth".to_string(),
                access_token_minutes: 30,
                refresh_token_days: 7,
                argon2_memory_kib: 19456,
                argon2_iterations: 2,
                password_pepper: None,
                max_failed_attempts: 5,
                lockout_duration_minutes: 15,
                reset_token_minutes: 60,
            },
            verification: VerificationConfig {
                code_ttl_minutes: 15,
                max_attempts: 5,
            },
            rate_limit: RateLimitConfig {
                sweep_interval_secs: 60,
                policies: HashMap::new(),
            },
            email: EmailConfig {
                smtp_enabled: false,
                smtp_host: "smtp.gmail.com".to_string(),
                smtp_port: 587,
                smtp_username: String::new(),
                smtp_password: String::new(),
                from_email: "no-reply@example.com".to_string(),
                from_name: "Accessible Auth".to_string(),
                outbox_dir: "data/outbox".to_string(),
                frontend_url: "http://localhost:3000".to_string(),
            },
        }
    }
}

/// Load configuration from file, writing the defaults first if the file is missing
pub fn load_config(path: &str) -> Result<Config> {
    let mut config = if !Path::new(path).exists() {
        let default_config = Config::default();
        save_config(path, &default_config)?;
        debug!("Wrote default configuration to {}", path);
        default_config
    } else {
        let mut file = File::open(path).context(format!("Failed to open config file: {}", path))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).context("Failed to read config file")?;

        match path.ends_with(".toml") {
            true => toml::from_str(&contents).context("Failed to parse TOML config")?,
            false => serde_json::from_str(&contents).context("Failed to parse JSON config")?,
        }
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Secrets may come from the environment (or `.env`) instead of the config file
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(secret) = env::var("JWT_SECRET_KEY") {
        config.security.jwt_secret = secret;
    }
    if let Ok(pepper) = env::var("PASSWORD_PEPPER") {
        config.security.password_pepper = Some(pepper);
    }
    if let Ok(password) = env::var("SMTP_PASSWORD") {
        config.email.smtp_password = password;
    }
    if let Ok(path) = env::var("DATABASE_PATH") {
        config.database.path = path;
    }
}

/// Save configuration to file
pub fn save_config(path: &str, config: &Config) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
    }

    let serialized = match path.ends_with(".toml") {
        true => toml::to_string_pretty(config).context("Failed to serialize config to TOML")?,
        false => serde_json::to_string_pretty(config).context("Failed to serialize config to JSON")?,
    };

    std::fs::write(path, serialized).context(format!("Failed to write config to file: {}", path))?;

    Ok(())
}
