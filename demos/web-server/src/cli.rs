use std::{net::SocketAddr, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use clap::{Parser, ValueEnum};
use shellgate_core::BrokerStorage;
use shellgate_session::{ReattachPolicy, SessionConfig, storage::MemoryStorage};
use shellgate_ssh::{HostKeyPolicy, SshConfig};
use shellgate_transport::BridgeConfig;

/// Brokered SSH terminal sessions over WebSocket.
#[derive(Debug, Parser)]
#[command(name = "shellgate", version)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "SHELLGATE_LISTEN", default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Base URL used in attach URLs (defaults to http://<listen>)
    #[arg(long, env = "SHELLGATE_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Storage backend: `memory` or a `sqlite:` URL
    #[arg(long, env = "SHELLGATE_STORAGE", default_value = "memory")]
    pub storage: StorageBackend,

    /// Seconds an unattached handle stays valid (0 disables expiry)
    #[arg(long, env = "SHELLGATE_HANDLE_TTL", default_value_t = 600)]
    pub handle_ttl: u64,

    /// What to do when a second caller attaches to a live session
    #[arg(long, env = "SHELLGATE_REATTACH", value_enum, default_value_t = Reattach::Allow)]
    pub reattach: Reattach,

    /// Seconds between expired auth token sweeps
    #[arg(long, env = "SHELLGATE_TOKEN_PRUNE_INTERVAL", default_value_t = 300)]
    pub token_prune_interval: u64,

    /// SSH connect timeout in seconds
    #[arg(long, env = "SHELLGATE_CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout: u64,

    /// Host key policy: `accept-any`, `known-hosts` or a known_hosts path.
    /// Only plain host entries are matched; hashed (`HashKnownHosts`) lines
    /// are ignored
    #[arg(long, env = "SHELLGATE_HOST_KEYS", default_value = "accept-any")]
    pub host_keys: HostKeyPolicy,

    /// Terminal type requested for remote PTYs
    #[arg(long, env = "SHELLGATE_TERM", default_value = "xterm-256color")]
    pub term: String,

    /// TOML file of `[[targets]]` seeded at startup
    #[arg(long, env = "SHELLGATE_TARGETS")]
    pub targets: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "SHELLGATE_LOG", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Reattach {
    Allow,
    Reject,
}

impl From<Reattach> for ReattachPolicy {
    fn from(value: Reattach) -> Self {
        match value {
            Reattach::Allow => Self::Allow,
            Reattach::Reject => Self::Reject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    #[cfg(feature = "sqlite")]
    Sqlite(String),
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "memory" => Ok(Self::Memory),
            #[cfg(feature = "sqlite")]
            url if url.starts_with("sqlite:") => Ok(Self::Sqlite(url.to_string())),
            url if url.starts_with("sqlite:") => {
                Err("this build has no SQLite support (enable the `sqlite` feature)".to_string())
            }
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

impl StorageBackend {
    /// Open the backend.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened.
    pub async fn open(&self) -> anyhow::Result<Arc<dyn BrokerStorage>> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryStorage::new())),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(url) => {
                let storage = shellgate_session::storage::SqliteStorage::new(url).await?;
                Ok(Arc::new(storage))
            }
        }
    }
}

impl Args {
    pub fn public_base_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.listen))
    }

    pub fn session_config(&self) -> SessionConfig {
        let ttl = (self.handle_ttl > 0).then(|| Duration::from_secs(self.handle_ttl));
        SessionConfig::default()
            .public_base_url(self.public_base_url())
            .handle_ttl(ttl)
            .reattach(self.reattach.into())
    }

    pub fn ssh_config(&self) -> SshConfig {
        SshConfig::default()
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .host_keys(self.host_keys.clone())
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig::default().term(self.term.as_str())
    }

    pub const fn token_prune_interval(&self) -> Duration {
        Duration::from_secs(self.token_prune_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["shellgate"]).unwrap();
        assert_eq!(args.storage, StorageBackend::Memory);
        assert_eq!(args.public_base_url(), "http://127.0.0.1:3000");

        let config = args.session_config();
        assert_eq!(config.handle_ttl, Some(Duration::from_secs(600)));
        assert_eq!(config.reattach, ReattachPolicy::Allow);
        assert_eq!(args.ssh_config().host_keys, HostKeyPolicy::AcceptAny);
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "shellgate",
            "--public-url",
            "https://gate.example.com",
            "--handle-ttl",
            "0",
            "--reattach",
            "reject",
            "--host-keys",
            "/etc/ssh/ssh_known_hosts",
            "--term",
            "vt100",
        ])
        .unwrap();

        let config = args.session_config();
        assert_eq!(config.public_base_url, "https://gate.example.com");
        assert_eq!(config.handle_ttl, None);
        assert_eq!(config.reattach, ReattachPolicy::Reject);
        assert_eq!(
            args.ssh_config().host_keys,
            HostKeyPolicy::KnownHosts(PathBuf::from("/etc/ssh/ssh_known_hosts"))
        );
        assert_eq!(args.bridge_config().term, "vt100");
    }

    #[test]
    fn test_unknown_storage_is_rejected() {
        assert!(Args::try_parse_from(["shellgate", "--storage", "redis://x"]).is_err());
    }
}
