//! Connector configuration.

use std::{path::PathBuf, str::FromStr, time::Duration};

use shellgate_core::DEFAULT_CHANNEL_BUFFER;

/// How server host keys are checked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Accept any host key.
    #[default]
    AcceptAny,
    /// Accept only keys listed in an OpenSSH `known_hosts` file.
    KnownHosts(PathBuf),
}

impl HostKeyPolicy {
    /// `~/.ssh/known_hosts` for the current user.
    #[must_use]
    pub fn user_known_hosts() -> Option<Self> {
        dirs::home_dir().map(|home| Self::KnownHosts(home.join(".ssh").join("known_hosts")))
    }
}

impl FromStr for HostKeyPolicy {
    type Err = String;

    /// `accept-any`, `known-hosts` (the user's file) or a path to a `known_hosts` file.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("host key policy cannot be empty".to_string()),
            "accept-any" => Ok(Self::AcceptAny),
            "known-hosts" => {
                Self::user_known_hosts().ok_or_else(|| "cannot locate home directory".to_string())
            }
            path => Ok(Self::KnownHosts(PathBuf::from(path))),
        }
    }
}

/// SSH connector configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Upper bound on connect, handshake, authentication and shell start.
    pub connect_timeout: Duration,
    pub host_keys: HostKeyPolicy,
    /// Interval for keepalive requests on idle sessions.
    pub keepalive_interval: Option<Duration>,
    /// Depth of the event and input queues per shell.
    pub buffer: usize,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            host_keys: HostKeyPolicy::default(),
            keepalive_interval: Some(Duration::from_secs(30)),
            buffer: DEFAULT_CHANNEL_BUFFER,
        }
    }
}

impl SshConfig {
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn host_keys(mut self, policy: HostKeyPolicy) -> Self {
        self.host_keys = policy;
        self
    }

    #[must_use]
    pub const fn keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Client protocol settings for russh.
    pub(crate) fn client_config(&self) -> russh::client::Config {
        russh::client::Config {
            keepalive_interval: self.keepalive_interval,
            ..russh::client::Config::default()
        }
    }
}
