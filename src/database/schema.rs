use anyhow::{Result, Context};
use log::debug;
use rusqlite::Connection;

/// Create the database schema
pub fn create_schema(conn: &mut Connection) -> Result<()> {
    debug!("Creating database schema");

    let tx = conn.transaction().context("Failed to start transaction for schema creation")?;

    // Security state lives under the security_ prefix; nested records are JSON
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_verified INTEGER NOT NULL DEFAULT 0,
            profile TEXT NOT NULL,
            accessibility TEXT NOT NULL,
            security_failed_login_attempts INTEGER NOT NULL DEFAULT 0,
            security_account_locked_until TEXT,
            security_last_login TEXT,
            security_password_reset_tokens TEXT NOT NULL DEFAULT '[]',
            security_email_verification_code TEXT,
            security_email_verified_at TEXT,
            security_verification_skipped_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    ).context("Failed to create users table")?;

    // Append-only activity trail; rows outlive deleted users
    tx.execute(
        "CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            event_type TEXT NOT NULL,
            user_id TEXT,
            ip_address TEXT,
            details TEXT,
            timestamp TEXT NOT NULL
        )",
        [],
    ).context("Failed to create audit_logs table")?;

    tx.execute(
        "CREATE TABLE IF NOT EXISTS database_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    ).context("Failed to create database_version table")?;

    create_indices(&tx)?;

    tx.execute(
        "INSERT OR IGNORE INTO database_version (version, applied_at) VALUES (?1, datetime('now'))",
        [SCHEMA_VERSION],
    ).context("Failed to record schema version")?;

    tx.commit().context("Failed to commit schema creation")?;

    debug!("Database schema created successfully");
    Ok(())
}

/// Current schema version
pub const SCHEMA_VERSION: i64 = 1;

fn create_indices(conn: &Connection) -> Result<()> {
    conn.execute("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)", [])
        .context("Failed to create index on users(email)")?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_audit_logs_user_id ON audit_logs(user_id)", [])
        .context("Failed to create index on audit_logs(user_id)")?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp)", [])
        .context("Failed to create index on audit_logs(timestamp)")?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_audit_logs_event_type ON audit_logs(event_type)", [])
        .context("Failed to create index on audit_logs(event_type)")?;

    Ok(())
}
