//! Authentication-session table with TTL.
//!
//! Expired tokens are removed lazily on read and in bulk by
//! [`AuthSessions::prune_expired`]. A token is expired from the instant
//! its `expires_at` is reached.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use shellgate_core::{AuthToken, BrokerError, traits::TokenStore};
use tokio::task::JoinHandle;

/// Token table over a [`TokenStore`].
pub struct AuthSessions<S: ?Sized> {
    store: Arc<S>,
}

impl<S> AuthSessions<S>
where
    S: TokenStore + ?Sized + 'static,
{
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record a new token valid for `ttl`.
    ///
    /// # Errors
    /// `Validation` for a blank token or a zero TTL.
    pub async fn create(
        &self,
        token: &str,
        username: &str,
        provider: &str,
        ttl: Duration,
    ) -> Result<AuthToken, BrokerError> {
        if token.trim().is_empty() {
            return Err(BrokerError::Validation("token is required".to_string()));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .ok()
            .filter(|d| *d > chrono::Duration::zero())
            .ok_or_else(|| BrokerError::Validation("token TTL must be positive".to_string()))?;

        let now = Utc::now();
        let record = AuthToken {
            token: token.to_string(),
            username: username.to_string(),
            provider: provider.to_string(),
            created_at: now,
            expires_at: now + ttl,
        };
        self.store.put_token(&record).await?;
        tracing::debug!(%username, %provider, "Auth session created");
        Ok(record)
    }

    /// Look up a token, treating expired ones as absent.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub async fn get(&self, token: &str) -> Result<Option<AuthToken>, BrokerError> {
        self.get_at(token, Utc::now()).await
    }

    /// Look up a token as of `now`. An expired token is deleted before
    /// `None` is returned.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub async fn get_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthToken>, BrokerError> {
        match self.store.get_token(token).await? {
            Some(record) if record.is_expired_at(now) => {
                self.store.delete_token(token).await?;
                tracing::debug!(username = %record.username, "Expired auth session removed on read");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Delete a token. Returns whether it existed.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub async fn delete(&self, token: &str) -> Result<bool, BrokerError> {
        Ok(self.store.delete_token(token).await?)
    }

    /// Remove every token expired as of `now`; returns how many.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, BrokerError> {
        let removed = self.store.delete_expired_tokens(now).await?;
        if removed > 0 {
            tracing::info!(removed, "Pruned expired auth sessions");
        }
        Ok(removed)
    }

    /// Prune on a fixed interval until the task is aborted.
    pub fn spawn_pruner(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.prune_expired(Utc::now()).await {
                    tracing::warn!(error = %e, "Auth session prune failed");
                }
            }
        })
    }
}
