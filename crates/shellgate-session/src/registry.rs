//! Validated access to stored targets.

use std::sync::Arc;

use shellgate_core::{BrokerError, Target, TargetPatch, traits::TargetStore};

use crate::resolver::{self, TargetQuery};

/// Target registry over a [`TargetStore`].
pub struct TargetRegistry<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for TargetRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> TargetRegistry<S>
where
    S: TargetStore + ?Sized,
{
    /// Create a registry over a store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// All targets, ordered by id.
    ///
    /// # Errors
    /// Returns error if the store is unavailable.
    pub async fn list(&self) -> Result<Vec<Target>, BrokerError> {
        Ok(self.store.list_targets().await?)
    }

    /// Get a target by id.
    ///
    /// # Errors
    /// `NotFound` if no target has this id.
    pub async fn get(&self, id: &str) -> Result<Target, BrokerError> {
        self.store
            .get_target(id)
            .await?
            .ok_or_else(|| BrokerError::not_found(format!("Target \"{id}\"")))
    }

    /// Create a target.
    ///
    /// # Errors
    /// `Validation` for missing fields or a duplicate id.
    pub async fn create(&self, target: Target) -> Result<Target, BrokerError> {
        target.validate().map_err(BrokerError::Validation)?;
        self.store.insert_target(&target).await?;
        tracing::info!(target_id = %target.id, host = %target.host, "Target created");
        Ok(target)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `Validation` if the result is invalid.
    pub async fn update(&self, id: &str, patch: TargetPatch) -> Result<Target, BrokerError> {
        let mut target = self.get(id).await?;
        target.apply(patch);
        target.validate().map_err(BrokerError::Validation)?;
        self.store.update_target(&target).await?;
        tracing::info!(target_id = %id, "Target updated");
        Ok(target)
    }

    /// Delete a target. Audit history referencing it is kept.
    ///
    /// # Errors
    /// `NotFound` for an unknown id.
    pub async fn delete(&self, id: &str) -> Result<(), BrokerError> {
        if self.store.delete_target(id).await? {
            tracing::info!(target_id = %id, "Target deleted");
            Ok(())
        } else {
            Err(BrokerError::not_found(format!("Target \"{id}\"")))
        }
    }

    /// Resolve an id, hint or nothing to exactly one target.
    ///
    /// # Errors
    /// `NotFound`, `Ambiguous` or `Validation` with suggestions.
    pub async fn resolve(&self, query: &TargetQuery) -> Result<Target, BrokerError> {
        if let TargetQuery::Id(id) = query {
            if let Some(target) = self.store.get_target(id).await? {
                return Ok(target);
            }
        }
        let targets = self.list().await?;
        resolver::resolve(&targets, query).map_err(|e| {
            tracing::debug!(?query, error = %e, "Target resolution failed");
            e.into()
        })
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use shellgate_core::ErrorKind;

    use super::*;
    use crate::storage::MemoryStorage;

    fn registry() -> TargetRegistry<MemoryStorage> {
        TargetRegistry::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_create_rejects_missing_fields_and_duplicates() {
        let registry = registry();
        let err = registry.create(Target::new("a", "", "u")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        registry.create(Target::new("a", "h", "u")).await.unwrap();
        let err = registry.create(Target::new("a", "h", "u")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let registry = registry();
        registry.create(Target::new("a", "h", "u")).await.unwrap();

        let updated = registry
            .update(
                "a",
                TargetPatch {
                    display_name: Some("alpha".into()),
                    ..TargetPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("alpha"));

        let err = registry
            .update(
                "a",
                TargetPatch {
                    host: Some(String::new()),
                    ..TargetPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(registry.get("a").await.unwrap().host, "h");

        registry.delete("a").await.unwrap();
        assert_eq!(registry.delete("a").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            registry.update("a", TargetPatch::default()).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_resolve_scenario() {
        let registry = registry();
        registry
            .create(
                Target::new("prod-a", "10.0.0.5", "root")
                    .with_port(22)
                    .with_display_name("prod"),
            )
            .await
            .unwrap();

        let hint = |h: &str| TargetQuery::Hint(h.to_string());
        assert_eq!(registry.resolve(&hint("prod")).await.unwrap().id, "prod-a");
        assert_eq!(registry.resolve(&hint("PROD")).await.unwrap().id, "prod-a");

        let err = registry.resolve(&hint("stage")).await.unwrap_err();
        match err {
            BrokerError::NotFound { suggestions, .. } => {
                assert_eq!(suggestions, vec!["prod (prod-a)".to_string()]);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }

        assert_eq!(
            registry.resolve(&TargetQuery::Unspecified).await.unwrap().id,
            "prod-a"
        );
    }
}
