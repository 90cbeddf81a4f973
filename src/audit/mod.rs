use chrono::Utc;
use log::{debug, error};
use parking_lot::RwLock;
use rusqlite::params;
use uuid::Uuid;

use crate::database::models::{AuditEventType, AuditLog};
use crate::database::store::{format_timestamp, parse_timestamp};
use crate::database::{DbPool, StoreError};

/// Destination for account activity events.
///
/// Recording never fails the operation being audited.
pub trait AuditSink: Send + Sync {
    fn record(&self, event_type: AuditEventType, user_id: Option<&str>, details: Option<&str>);
}

/// Audit logger backed by the `audit_logs` table
pub struct AuditLogger {
    pool: DbPool,
    /// Address of the client this process acts for, stamped on recorded events
    client_address: RwLock<Option<String>>,
}

impl AuditLogger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, client_address: RwLock::new(None) }
    }

    pub fn set_client_address(&self, ip: &str) {
        *self.client_address.write() = Some(ip.to_string());
    }

    /// Log an audit event and return its id
    pub fn log_event(
        &self,
        event_type: AuditEventType,
        user_id: Option<&str>,
        ip_address: Option<&str>,
        details: Option<&str>,
    ) -> Result<String, StoreError> {
        let event_id = Uuid::new_v4().to_string();
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO audit_logs (id, event_type, user_id, ip_address, details, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event_id,
                event_type.as_str(),
                user_id,
                ip_address,
                details,
                format_timestamp(&Utc::now()),
            ],
        )?;

        debug!("Audit event logged: {} - {}", event_id, event_type);
        Ok(event_id)
    }

    /// Most recent events for a user, newest first
    pub fn user_activity(&self, user_id: &str, limit: usize) -> Result<Vec<AuditLog>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, event_type, user_id, ip_address, details, timestamp
             FROM audit_logs
             WHERE user_id = ?1
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?2",
        )?;

        let logs = stmt
            .query_map(params![user_id, limit as i64], |row| {
                let event_type: String = row.get(1)?;
                Ok(AuditLog {
                    id: row.get(0)?,
                    event_type: AuditEventType::from_str(&event_type).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            e.into(),
                        )
                    })?,
                    user_id: row.get(2)?,
                    ip_address: row.get(3)?,
                    details: row.get(4)?,
                    timestamp: parse_timestamp(5, row.get(5)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(logs)
    }
}

impl AuditSink for AuditLogger {
    fn record(&self, event_type: AuditEventType, user_id: Option<&str>, details: Option<&str>) {
        let ip = self.client_address.read().clone();
        if let Err(e) = self.log_event(event_type, user_id, ip.as_deref(), details) {
            error!("Failed to record audit event {}: {}", event_type, e);
        }
    }
}
