//! Expiring auth tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A login token with a hard expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub token: String,
    pub username: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    /// A token is logically absent once `now >= expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let token = AuthToken {
            token: "t".into(),
            username: "alice".into(),
            provider: "github".into(),
            created_at: now,
            expires_at: now + Duration::seconds(60),
        };

        assert!(!token.is_expired_at(now));
        assert!(token.is_expired_at(token.expires_at));
        assert!(token.is_expired_at(now + Duration::seconds(61)));
    }
}
