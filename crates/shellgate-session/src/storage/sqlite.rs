//! SQLite storage (feature-gated).
//!
//! Timestamps are stored as epoch milliseconds; handles as hyphenated UUID text.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shellgate_core::{
    AuditFilter, AuditRecord, AuditStatus, AuthToken, SessionHandle, SessionOutcome, Target,
    traits::{AuditStore, StorageError, TargetStore, TokenStore},
};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS targets (
        id TEXT PRIMARY KEY,
        host TEXT NOT NULL,
        port INTEGER NOT NULL DEFAULT 22,
        username TEXT NOT NULL,
        password TEXT,
        private_key TEXT,
        display_name TEXT
    )",
    "CREATE TABLE IF NOT EXISTS audit_records (
        id TEXT PRIMARY KEY,
        target_id TEXT NOT NULL,
        target_name TEXT NOT NULL,
        host TEXT NOT NULL,
        port INTEGER NOT NULL,
        username TEXT NOT NULL,
        start_time INTEGER NOT NULL,
        end_time INTEGER,
        status TEXT NOT NULL,
        reason TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS audit_records_start ON audit_records (start_time)",
    "CREATE TABLE IF NOT EXISTS auth_tokens (
        token TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        provider TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS auth_tokens_expiry ON auth_tokens (expires_at)",
];

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if missing) a database and ensure the schema exists.
    ///
    /// # Errors
    /// Returns error if database connection or schema creation fails.
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(map_err)?
            .create_if_missing(true);

        // Every connection to an in-memory database is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(map_err)?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(map_err)?;
        }

        tracing::debug!(url = %database_url, "SQLite storage ready");
        Ok(Self { pool })
    }
}

fn map_err(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StorageError::Conflict(db.message().to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StorageError::Unavailable(e.to_string())
        }
        other => StorageError::Internal(other.to_string()),
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::Internal(format!("timestamp out of range: {ms}")))
}

fn target_from_row(row: &SqliteRow) -> Result<Target, StorageError> {
    let port: i64 = row.try_get("port").map_err(map_err)?;
    Ok(Target {
        id: row.try_get("id").map_err(map_err)?,
        host: row.try_get("host").map_err(map_err)?,
        port: u16::try_from(port).map_err(|e| StorageError::Internal(e.to_string()))?,
        username: row.try_get("username").map_err(map_err)?,
        password: row.try_get("password").map_err(map_err)?,
        private_key: row.try_get("private_key").map_err(map_err)?,
        display_name: row.try_get("display_name").map_err(map_err)?,
    })
}

fn audit_from_row(row: &SqliteRow) -> Result<AuditRecord, StorageError> {
    let id: String = row.try_get("id").map_err(map_err)?;
    let port: i64 = row.try_get("port").map_err(map_err)?;
    let status: String = row.try_get("status").map_err(map_err)?;
    let end_time: Option<i64> = row.try_get("end_time").map_err(map_err)?;
    Ok(AuditRecord {
        id: Uuid::parse_str(&id).map_err(|e| StorageError::Internal(e.to_string()))?,
        target_id: row.try_get("target_id").map_err(map_err)?,
        target_name: row.try_get("target_name").map_err(map_err)?,
        host: row.try_get("host").map_err(map_err)?,
        port: u16::try_from(port).map_err(|e| StorageError::Internal(e.to_string()))?,
        username: row.try_get("username").map_err(map_err)?,
        start_time: from_millis(row.try_get("start_time").map_err(map_err)?)?,
        end_time: end_time.map(from_millis).transpose()?,
        status: AuditStatus::from_str(&status).map_err(StorageError::Internal)?,
        reason: row.try_get("reason").map_err(map_err)?,
    })
}

fn token_from_row(row: &SqliteRow) -> Result<AuthToken, StorageError> {
    Ok(AuthToken {
        token: row.try_get("token").map_err(map_err)?,
        username: row.try_get("username").map_err(map_err)?,
        provider: row.try_get("provider").map_err(map_err)?,
        created_at: from_millis(row.try_get("created_at").map_err(map_err)?)?,
        expires_at: from_millis(row.try_get("expires_at").map_err(map_err)?)?,
    })
}

#[async_trait]
impl TargetStore for SqliteStorage {
    async fn list_targets(&self) -> Result<Vec<Target>, StorageError> {
        let rows = sqlx::query("SELECT * FROM targets ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        rows.iter().map(target_from_row).collect()
    }

    async fn get_target(&self, id: &str) -> Result<Option<Target>, StorageError> {
        let row = sqlx::query("SELECT * FROM targets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.as_ref().map(target_from_row).transpose()
    }

    async fn insert_target(&self, target: &Target) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO targets (id, host, port, username, password, private_key, display_name)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&target.id)
        .bind(&target.host)
        .bind(i64::from(target.port))
        .bind(&target.username)
        .bind(&target.password)
        .bind(&target.private_key)
        .bind(&target.display_name)
        .execute(&self.pool)
        .await
        .map_err(|e| match map_err(e) {
            StorageError::Conflict(_) => StorageError::Conflict(format!("Target \"{}\"", target.id)),
            other => other,
        })?;
        Ok(())
    }

    async fn update_target(&self, target: &Target) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE targets SET host = ?, port = ?, username = ?, password = ?,
             private_key = ?, display_name = ? WHERE id = ?",
        )
        .bind(&target.host)
        .bind(i64::from(target.port))
        .bind(&target.username)
        .bind(&target.password)
        .bind(&target.private_key)
        .bind(&target.display_name)
        .bind(&target.id)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("Target \"{}\"", target.id)));
        }
        Ok(())
    }

    async fn delete_target(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM targets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditStore for SqliteStorage {
    async fn insert_audit(&self, record: &AuditRecord) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO audit_records
             (id, target_id, target_name, host, port, username, start_time, end_time, status, reason)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.target_id)
        .bind(&record.target_name)
        .bind(&record.host)
        .bind(i64::from(record.port))
        .bind(&record.username)
        .bind(record.start_time.timestamp_millis())
        .bind(record.end_time.map(|t| t.timestamp_millis()))
        .bind(record.status.as_str())
        .bind(&record.reason)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn get_audit(&self, id: SessionHandle) -> Result<Option<AuditRecord>, StorageError> {
        let row = sqlx::query("SELECT * FROM audit_records WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.as_ref().map(audit_from_row).transpose()
    }

    async fn finalize_audit(
        &self,
        id: SessionHandle,
        end_time: DateTime<Utc>,
        outcome: SessionOutcome,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE audit_records SET status = ?, end_time = ?
             WHERE id = ? AND status = 'connected'",
        )
        .bind(AuditStatus::from(outcome).as_str())
        .bind(end_time.timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        match self.get_audit(id).await? {
            Some(_) => Ok(false),
            None => Err(StorageError::NotFound(format!("Audit record {id}"))),
        }
    }

    async fn list_audit(&self, filter: AuditFilter) -> Result<Vec<AuditRecord>, StorageError> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = filter
            .limit
            .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));

        let rows = sqlx::query(
            "SELECT * FROM audit_records
             WHERE (?1 IS NULL OR target_id = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY start_time DESC LIMIT ?3",
        )
        .bind(filter.target_id)
        .bind(filter.status.map(AuditStatus::as_str))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.iter().map(audit_from_row).collect()
    }
}

#[async_trait]
impl TokenStore for SqliteStorage {
    async fn put_token(&self, token: &AuthToken) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR REPLACE INTO auth_tokens (token, username, provider, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&token.token)
        .bind(&token.username)
        .bind(&token.provider)
        .bind(token.created_at.timestamp_millis())
        .bind(token.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn get_token(&self, token: &str) -> Result<Option<AuthToken>, StorageError> {
        let row = sqlx::query("SELECT * FROM auth_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.as_ref().map(token_from_row).transpose()
    }

    async fn delete_token(&self, token: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected())
    }
}
