use anyhow::{Context, Result};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

use crate::accessibility::UsageTracker;
use crate::audit::AuditLogger;
use crate::config::Config;
use crate::database::models::User;
use crate::database::{self, CredentialStore, DbPool, SqliteCredentialStore};
use crate::email;
use crate::security::auth::Authenticator;
use crate::security::jwt::TokenService;
use crate::security::password::Argon2Hasher;
use crate::security::rate_limit::{is_accessibility_user, Endpoint, RateLimitDecision, RateLimiter};
use crate::user::{ProfileService, Registrar, VerificationManager};

/// Services wired once at start-up and shared by every command
pub struct App {
    pub config: Config,
    pub pool: DbPool,
    pub store: Arc<dyn CredentialStore>,
    pub audit: Arc<AuditLogger>,
    pub limiter: Arc<RateLimiter>,
    pub tokens: TokenService,
    pub auth: Arc<Authenticator>,
    pub verification: Arc<VerificationManager>,
    pub registrar: Registrar,
    pub profiles: ProfileService,
    pub accessibility: UsageTracker,
}

impl App {
    /// Open the database and build every service from the configuration
    pub fn build(config: Config) -> Result<Self> {
        let pool = database::initialize(&config.database).context("Failed to initialize database")?;
        let store: Arc<dyn CredentialStore> = Arc::new(SqliteCredentialStore::new(pool.clone()));
        let audit = Arc::new(AuditLogger::new(pool.clone()));

        let hasher = Arc::new(
            Argon2Hasher::new(
                config.security.argon2_memory_kib,
                config.security.argon2_iterations,
                config.security.password_pepper.as_deref(),
            )
            .context("Invalid password hashing parameters")?,
        );
        let mailer = email::from_config(&config.email).context("Failed to set up email delivery")?;

        let limiter = Arc::new(RateLimiter::new());
        limiter
            .spawn_sweeper(Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1)))
            .context("Failed to start rate limit sweeper")?;

        let tokens = TokenService::from_config(store.clone(), &config.security);
        let auth = Arc::new(Authenticator::new(
            store.clone(),
            hasher.clone(),
            mailer.clone(),
            audit.clone(),
            &config.security,
            &config.email,
        ));
        let verification = Arc::new(VerificationManager::new(
            store.clone(),
            mailer,
            audit.clone(),
            &config.verification,
        ));
        let registrar = Registrar::new(store.clone(), hasher, verification.clone(), audit.clone());
        let profiles = ProfileService::new(store.clone(), auth.clone(), audit.clone());
        let accessibility = UsageTracker::new(audit.clone());

        info!("{} v{} ready", config.app_name, config.version);
        Ok(Self {
            config,
            pool,
            store,
            audit,
            limiter,
            tokens,
            auth,
            verification,
            registrar,
            profiles,
            accessibility,
        })
    }

    /// Count one request against the endpoint's quota.
    ///
    /// Signed-in users are counted per account and get the accessibility bonus
    /// when their preferences qualify; everyone else is counted per address.
    pub fn throttle(&self, endpoint: Endpoint, ip: &str, user: Option<&User>) -> RateLimitDecision {
        let key = RateLimiter::key(ip, endpoint.as_str(), user.map(|u| u.id.as_str()));
        let bonus = user.map(|u| is_accessibility_user(&u.accessibility)).unwrap_or(false);
        let policy = self.config.rate_limit.policy_for(endpoint);

        debug!("Rate limit check for {}", key);
        self.limiter.check_policy(&key, policy, bonus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::VisualImpairmentLevel;
    use crate::database::testing::sample_user;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.database.path = dir.join("app.db").to_str().unwrap().to_string();
        config.email.outbox_dir = dir.join("outbox").to_str().unwrap().to_string();
        config.security.argon2_memory_kib = 1024;
        config.security.argon2_iterations = 1;
        config
    }

    #[test]
    fn test_build_and_throttle_by_ip() {
        let dir = tempdir().unwrap();
        let app = App::build(test_config(dir.path())).unwrap();

        for _ in 0..5 {
            assert!(app.throttle(Endpoint::Register, "10.0.0.1", None).allowed);
        }
        let denied = app.throttle(Endpoint::Register, "10.0.0.1", None);
        assert!(!denied.allowed);
        assert!(denied.retry_after_seconds.unwrap() > 0);

        // Another address has its own counter
        assert!(app.throttle(Endpoint::Register, "10.0.0.2", None).allowed);
    }

    #[test]
    fn test_accessibility_user_gets_larger_quota() {
        let dir = tempdir().unwrap();
        let app = App::build(test_config(dir.path())).unwrap();

        let mut user = sample_user("blind@example.com", "hash");
        user.accessibility.visual_impairment_level = VisualImpairmentLevel::Blind;

        let decision = app.throttle(Endpoint::Login, "10.0.0.1", Some(&user));
        assert!(decision.accessibility_bonus);
        assert_eq!(decision.limit, 15);
    }

    #[test]
    fn test_configured_policy_overrides_default() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.rate_limit.policies.insert(
            "login".to_string(),
            crate::security::rate_limit::RateLimitPolicy { max_requests: 1, window_minutes: 1 },
        );
        let app = App::build(config).unwrap();

        assert!(app.throttle(Endpoint::Login, "10.0.0.1", None).allowed);
        assert!(!app.throttle(Endpoint::Login, "10.0.0.1", None).allowed);
    }
}
