//! In-memory storage.

use std::{
    collections::{BTreeMap, HashMap},
    sync::RwLock,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shellgate_core::{
    AuditFilter, AuditRecord, AuthToken, SessionHandle, SessionOutcome, Target,
    traits::{AuditStore, StorageError, TargetStore, TokenStore},
};

/// In-memory storage implementation.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
pub struct MemoryStorage {
    targets: RwLock<BTreeMap<String, Target>>,
    audit: RwLock<HashMap<SessionHandle, AuditRecord>>,
    tokens: RwLock<HashMap<String, AuthToken>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(BTreeMap::new()),
            audit: RwLock::new(HashMap::new()),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored tokens, expired or not.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn token_count(&self) -> Result<usize, StorageError> {
        Ok(self.tokens.read().map_err(poisoned)?.len())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[async_trait]
impl TargetStore for MemoryStorage {
    async fn list_targets(&self) -> Result<Vec<Target>, StorageError> {
        Ok(self
            .targets
            .read()
            .map_err(poisoned)?
            .values()
            .cloned()
            .collect())
    }

    async fn get_target(&self, id: &str) -> Result<Option<Target>, StorageError> {
        Ok(self.targets.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn insert_target(&self, target: &Target) -> Result<(), StorageError> {
        let mut targets = self.targets.write().map_err(poisoned)?;
        if targets.contains_key(&target.id) {
            return Err(StorageError::Conflict(format!("Target \"{}\"", target.id)));
        }
        targets.insert(target.id.clone(), target.clone());
        Ok(())
    }

    async fn update_target(&self, target: &Target) -> Result<(), StorageError> {
        let mut targets = self.targets.write().map_err(poisoned)?;
        let slot = targets
            .get_mut(&target.id)
            .ok_or_else(|| StorageError::NotFound(format!("Target \"{}\"", target.id)))?;
        *slot = target.clone();
        Ok(())
    }

    async fn delete_target(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.targets.write().map_err(poisoned)?.remove(id).is_some())
    }
}

#[async_trait]
impl AuditStore for MemoryStorage {
    async fn insert_audit(&self, record: &AuditRecord) -> Result<(), StorageError> {
        let mut audit = self.audit.write().map_err(poisoned)?;
        if audit.contains_key(&record.id) {
            return Err(StorageError::Conflict(format!("Audit record {}", record.id)));
        }
        audit.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_audit(&self, id: SessionHandle) -> Result<Option<AuditRecord>, StorageError> {
        Ok(self.audit.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn finalize_audit(
        &self,
        id: SessionHandle,
        end_time: DateTime<Utc>,
        outcome: SessionOutcome,
    ) -> Result<bool, StorageError> {
        let mut audit = self.audit.write().map_err(poisoned)?;
        let record = audit
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("Audit record {id}")))?;
        Ok(record.close(end_time, outcome))
    }

    async fn list_audit(&self, filter: AuditFilter) -> Result<Vec<AuditRecord>, StorageError> {
        let audit = self.audit.read().map_err(poisoned)?;

        let mut result: Vec<AuditRecord> = audit
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        // Sort by start_time descending
        result.sort_by(|a, b| b.start_time.cmp(&a.start_time));

        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }

        Ok(result)
    }
}

#[async_trait]
impl TokenStore for MemoryStorage {
    async fn put_token(&self, token: &AuthToken) -> Result<(), StorageError> {
        self.tokens
            .write()
            .map_err(poisoned)?
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_token(&self, token: &str) -> Result<Option<AuthToken>, StorageError> {
        Ok(self.tokens.read().map_err(poisoned)?.get(token).cloned())
    }

    async fn delete_token(&self, token: &str) -> Result<bool, StorageError> {
        Ok(self.tokens.write().map_err(poisoned)?.remove(token).is_some())
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use shellgate_core::{AuditStatus, LiveSession};
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_target_crud() {
        let storage = MemoryStorage::new();
        let target = Target::new("b", "h2", "u");
        storage.insert_target(&Target::new("a", "h1", "u")).await.unwrap();
        storage.insert_target(&target).await.unwrap();

        let ids: Vec<String> = storage
            .list_targets()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, ["a", "b"]);

        assert!(matches!(
            storage.insert_target(&target).await,
            Err(StorageError::Conflict(_))
        ));

        storage
            .update_target(&target.clone().with_port(2200))
            .await
            .unwrap();
        assert_eq!(storage.get_target("b").await.unwrap().unwrap().port, 2200);

        assert!(storage.delete_target("b").await.unwrap());
        assert!(!storage.delete_target("b").await.unwrap());
        assert!(matches!(
            storage.update_target(&target).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_finalize_is_conditional() {
        let storage = MemoryStorage::new();
        let target = Target::new("a", "h", "u");
        let record = AuditRecord::opened(&LiveSession::new(Uuid::new_v4(), "a", "why"), &target);
        storage.insert_audit(&record).await.unwrap();

        let end = Utc::now();
        assert!(storage
            .finalize_audit(record.id, end, SessionOutcome::Disconnected)
            .await
            .unwrap());
        assert!(!storage
            .finalize_audit(record.id, Utc::now(), SessionOutcome::Error)
            .await
            .unwrap());

        let stored = storage.get_audit(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AuditStatus::Disconnected);
        assert_eq!(stored.end_time, Some(end));
        assert_eq!(storage.list_audit(AuditFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_audit_newest_first_with_limit() {
        let storage = MemoryStorage::new();
        let target = Target::new("a", "h", "u");
        let mut handles = Vec::new();
        for i in 0..3 {
            let mut session = LiveSession::new(Uuid::new_v4(), "a", "why");
            session.created_at = Utc::now() + Duration::seconds(i);
            handles.push(session.handle);
            storage
                .insert_audit(&AuditRecord::opened(&session, &target))
                .await
                .unwrap();
        }

        let listed = storage
            .list_audit(AuditFilter {
                limit: Some(2),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, handles[2]);
        assert_eq!(listed[1].id, handles[1]);
    }

    #[tokio::test]
    async fn test_delete_expired_tokens_counts() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        for (name, offset) in [("old", -10), ("edge", 0), ("fresh", 10)] {
            storage
                .put_token(&AuthToken {
                    token: name.into(),
                    username: "u".into(),
                    provider: "p".into(),
                    created_at: now - Duration::seconds(60),
                    expires_at: now + Duration::seconds(offset),
                })
                .await
                .unwrap();
        }

        assert_eq!(storage.delete_expired_tokens(now).await.unwrap(), 2);
        assert_eq!(storage.token_count().unwrap(), 1);
        assert!(storage.get_token("fresh").await.unwrap().is_some());
    }
}
