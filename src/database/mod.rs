use anyhow::{Result, Context};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;
use log::{info, debug};

use crate::config::DatabaseConfig;

mod schema;
pub mod models;
pub mod store;

#[cfg(test)]
mod tests;

pub use store::{CredentialStore, SqliteCredentialStore, StoreError, UserField};

/// Pooled SQLite connections
pub type DbPool = Pool<SqliteConnectionManager>;

/// Open the connection pool and create the schema if needed
pub fn initialize(config: &DatabaseConfig) -> Result<DbPool> {
    let db_path = &config.path;

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }

    let db_exists = Path::new(db_path).exists();

    // Concurrent handlers wait on the file lock instead of failing fast
    let manager = SqliteConnectionManager::file(db_path)
        .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .build(manager)
        .context("Failed to create database connection pool")?;

    let mut conn = pool.get().context("Failed to get a database connection")?;

    if !db_exists {
        debug!("Creating new database at {}", db_path);
    } else {
        debug!("Using existing database at {}", db_path);
    }
    schema::create_schema(&mut conn).context("Failed to create database schema")?;

    info!("Database initialized successfully");
    Ok(pool)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    use models::{AccessibilityPreferences, User, UserProfile};

    /// Fresh database in a temporary directory; keep the `TempDir` alive for the test
    pub fn temp_store() -> (TempDir, DbPool, Arc<SqliteCredentialStore>) {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("test.db").to_str().unwrap().to_string(),
            max_connections: 4,
        };
        let pool = initialize(&config).unwrap();
        let store = Arc::new(SqliteCredentialStore::new(pool.clone()));
        (dir, pool, store)
    }

    /// Unverified user with default profile and preferences
    pub fn sample_user(email: &str, password_hash: &str) -> User {
        User::new(
            email.to_string(),
            password_hash.to_string(),
            UserProfile::default(),
            AccessibilityPreferences::default(),
        )
    }
}
