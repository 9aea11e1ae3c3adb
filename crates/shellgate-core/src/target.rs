//! Connection profiles for remote hosts.

use serde::{Deserialize, Serialize};

/// Port used when a profile does not name one.
pub const DEFAULT_SSH_PORT: u16 = 22;

const fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// A named, persisted remote-host connection profile.
///
/// Password and private key are not mutually exclusive; the connector
/// tries whatever is present (see [`Credential`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Caller-chosen stable identifier.
    pub id: String,
    /// Hostname or address.
    pub host: String,
    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Password, if any.
    #[serde(default)]
    pub password: Option<String>,
    /// PEM/OpenSSH encoded private key material, if any.
    #[serde(default)]
    pub private_key: Option<String>,
    /// Human-friendly name used by hint resolution.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Target {
    /// Create a profile with the default port and no credentials.
    #[must_use]
    pub fn new(id: impl Into<String>, host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            password: None,
            private_key: None,
            display_name: None,
        }
    }

    /// Set port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set private key material.
    #[must_use]
    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    /// Set display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Display name when set, id otherwise.
    #[must_use]
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    /// Rendering used in resolution suggestions: `name (id)` or just `id`.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) => format!("{name} ({})", self.id),
            None => self.id.clone(),
        }
    }

    /// `host:port` address string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Credentials available for this profile.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        Credential::from_parts(self.password.clone(), self.private_key.clone())
    }

    /// Check required fields.
    ///
    /// # Errors
    /// Returns the name of the first missing or invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id is required".to_string());
        }
        if self.host.trim().is_empty() {
            return Err("host is required".to_string());
        }
        if self.username.trim().is_empty() {
            return Err("username is required".to_string());
        }
        if self.port == 0 {
            return Err("port must be between 1 and 65535".to_string());
        }
        Ok(())
    }

    /// Apply a partial update in place. The id never changes.
    pub fn apply(&mut self, patch: TargetPatch) {
        if let Some(host) = patch.host {
            self.host = host;
        }
        if let Some(port) = patch.port {
            self.port = port;
        }
        if let Some(username) = patch.username {
            self.username = username;
        }
        if let Some(password) = patch.password {
            self.password = non_empty(password);
        }
        if let Some(key) = patch.private_key {
            self.private_key = non_empty(key);
        }
        if let Some(name) = patch.display_name {
            self.display_name = non_empty(name);
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// Partial target update.
///
/// For optional profile fields an empty string clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPatch {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Credential-free view of a target for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub display_name: Option<String>,
    pub has_password: bool,
    pub has_private_key: bool,
}

impl From<&Target> for TargetSummary {
    fn from(target: &Target) -> Self {
        Self {
            id: target.id.clone(),
            host: target.host.clone(),
            port: target.port,
            username: target.username.clone(),
            display_name: target.display_name.clone(),
            has_password: target.password.is_some(),
            has_private_key: target.private_key.is_some(),
        }
    }
}

/// Credentials to present to the remote host.
///
/// `Both` is tried key first; the password is only attempted after the
/// key has been rejected.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    PrivateKey(String),
    Both { private_key: String, password: String },
}

impl Credential {
    /// Build from optional parts. `None` when neither is present.
    #[must_use]
    pub fn from_parts(password: Option<String>, private_key: Option<String>) -> Option<Self> {
        match (password, private_key) {
            (Some(password), Some(private_key)) => Some(Self::Both {
                private_key,
                password,
            }),
            (Some(password), None) => Some(Self::Password(password)),
            (None, Some(key)) => Some(Self::PrivateKey(key)),
            (None, None) => None,
        }
    }

    /// Private key material, if any.
    #[must_use]
    pub fn private_key(&self) -> Option<&str> {
        match self {
            Self::PrivateKey(key) | Self::Both { private_key: key, .. } => Some(key),
            Self::Password(_) => None,
        }
    }

    /// Password, if any.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        match self {
            Self::Password(password) | Self::Both { password, .. } => Some(password),
            Self::PrivateKey(_) => None,
        }
    }
}

// Secrets never reach logs through Debug.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(***)"),
            Self::PrivateKey(_) => f.write_str("PrivateKey(***)"),
            Self::Both { .. } => f.write_str("Both(***)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_defaults_when_absent() {
        let json = r#"{"id":"prod-a","host":"10.0.0.5","username":"root","displayName":"prod"}"#;
        let target: Target = serde_json::from_str(json).unwrap();
        assert_eq!(target.port, DEFAULT_SSH_PORT);
        assert_eq!(target.display_name.as_deref(), Some("prod"));
        assert_eq!(target.label(), "prod (prod-a)");
    }

    #[test]
    fn test_label_without_display_name() {
        let target = Target::new("db-1", "db.internal", "ops");
        assert_eq!(target.label(), "db-1");
        assert_eq!(target.name(), "db-1");
    }

    #[test]
    fn test_credential_variants() {
        assert_eq!(Credential::from_parts(None, None), None);
        assert_eq!(
            Credential::from_parts(Some("pw".into()), None),
            Some(Credential::Password("pw".into()))
        );

        let both = Credential::from_parts(Some("pw".into()), Some("KEY".into())).unwrap();
        assert_eq!(both.private_key(), Some("KEY"));
        assert_eq!(both.password(), Some("pw"));
        assert_eq!(format!("{both:?}"), "Both(***)");
    }

    #[test]
    fn test_apply_patch_clears_with_empty_string() {
        let mut target = Target::new("a", "h", "u")
            .with_password("secret")
            .with_display_name("alpha");

        target.apply(TargetPatch {
            port: Some(2222),
            password: Some(String::new()),
            display_name: Some("renamed".into()),
            ..TargetPatch::default()
        });

        assert_eq!(target.port, 2222);
        assert_eq!(target.password, None);
        assert_eq!(target.display_name.as_deref(), Some("renamed"));
        assert_eq!(target.id, "a");
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        assert!(Target::new("a", "h", "u").validate().is_ok());
        assert_eq!(
            Target::new(" ", "h", "u").validate().unwrap_err(),
            "id is required"
        );
        assert_eq!(
            Target::new("a", "h", "").validate().unwrap_err(),
            "username is required"
        );
        assert!(Target::new("a", "h", "u").with_port(0).validate().is_err());
    }

    #[test]
    fn test_summary_hides_credentials() {
        let target = Target::new("a", "h", "u").with_private_key("KEY");
        let summary = TargetSummary::from(&target);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("KEY"));
        assert!(summary.has_private_key);
        assert!(!summary.has_password);
    }
}
