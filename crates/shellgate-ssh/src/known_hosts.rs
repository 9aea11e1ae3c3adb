//! OpenSSH `known_hosts` parsing.
//!
//! Plain host lists only: hashed entries (`|1|...`) and marker lines
//! (`@cert-authority`, `@revoked`) are not matched. Hashed entries are
//! counted so callers can say why a host was not found.

use std::path::{Path, PathBuf};

use russh::keys::{HashAlg, PublicKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnownHostsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Host pattern as OpenSSH writes it: bare host on port 22, `[host]:port` otherwise.
#[must_use]
pub fn host_pattern(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}

struct Entry {
    hosts: Vec<String>,
    key: PublicKey,
}

/// Parsed `known_hosts` file.
pub struct KnownHosts {
    entries: Vec<Entry>,
    hashed: usize,
}

impl KnownHosts {
    /// Parse file contents. Lines that cannot be parsed are ignored.
    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let lines: Vec<&str> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('@'))
            .collect();
        let hashed = lines.iter().filter(|line| line.starts_with('|')).count();

        let entries = lines
            .into_iter()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let hosts = parts.next()?;
                let _key_type = parts.next()?;
                let key = russh::keys::parse_public_key_base64(parts.next()?).ok()?;
                if hosts.starts_with('|') {
                    return None;
                }
                Some(Entry {
                    hosts: hosts.split(',').map(str::to_lowercase).collect(),
                    key,
                })
            })
            .collect();
        Self { entries, hashed }
    }

    /// Read and parse a file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read.
    pub async fn load(path: &Path) -> Result<Self, KnownHostsError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| KnownHostsError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
        Ok(Self::parse(&contents))
    }

    /// Number of usable entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of hashed (`|1|`) lines, which are never matched.
    #[must_use]
    pub const fn hashed_len(&self) -> usize {
        self.hashed
    }

    /// Whether `key` is listed for `host:port`.
    #[must_use]
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> bool {
        let pattern = host_pattern(&host.to_lowercase(), port);
        let fingerprint = key.fingerprint(HashAlg::Sha256);
        self.entries
            .iter()
            .filter(|e| e.hosts.iter().any(|h| *h == pattern || h == "*"))
            .any(|e| e.key.fingerprint(HashAlg::Sha256) == fingerprint)
    }
}
