//! [`RemoteConnector`] implementation over russh.

use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys::PublicKey};
use shellgate_core::{ConnectError, RemoteConnector, ShellChannel, ShellRequest};

use crate::{
    auth,
    config::{HostKeyPolicy, SshConfig},
    known_hosts::KnownHosts,
    pump,
};

/// russh client handler that applies the host key policy.
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        match &self.policy {
            HostKeyPolicy::AcceptAny => Ok(true),
            HostKeyPolicy::KnownHosts(path) => match KnownHosts::load(path).await {
                Ok(known) => {
                    let accepted = known.verify(&self.host, self.port, server_public_key);
                    if !accepted {
                        tracing::warn!(
                            host = %self.host,
                            port = self.port,
                            hashed_entries = known.hashed_len(),
                            "Host key not in known_hosts (hashed entries are not matched)"
                        );
                    }
                    Ok(accepted)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Rejecting host key");
                    Ok(false)
                }
            },
        }
    }
}

/// Opens interactive shells over SSH.
pub struct SshConnector {
    config: SshConfig,
    client: Arc<client::Config>,
}

impl SshConnector {
    #[must_use]
    pub fn new(config: SshConfig) -> Self {
        let client = Arc::new(config.client_config());
        Self { config, client }
    }

    #[must_use]
    pub const fn config(&self) -> &SshConfig {
        &self.config
    }

    async fn establish(&self, request: &ShellRequest) -> Result<ShellChannel, ConnectError> {
        let address = format!("{}:{}", request.host, request.port);
        let handler = ClientHandler {
            host: request.host.clone(),
            port: request.port,
            policy: self.config.host_keys.clone(),
        };

        tracing::debug!(%address, user = %request.username, "Connecting");
        let mut handle = client::connect(
            Arc::clone(&self.client),
            (request.host.as_str(), request.port),
            handler,
        )
        .await
        .map_err(|e| map_connect_error(e, request))?;

        auth::authenticate(&mut handle, &request.username, request.credential.as_ref()).await?;

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| ConnectError::Channel(format!("Session open failed: {e}")))?;
        channel
            .request_pty(
                false,
                &request.term,
                request.cols.into(),
                request.rows.into(),
                0,
                0,
                &[],
            )
            .await
            .map_err(|e| ConnectError::Channel(format!("PTY request failed: {e}")))?;
        channel
            .request_shell(false)
            .await
            .map_err(|e| ConnectError::Channel(format!("Shell request failed: {e}")))?;

        tracing::info!(%address, user = %request.username, "Remote shell started");

        let (shell, remote) = ShellChannel::pair(self.config.buffer);
        pump::spawn(handle, channel, remote, address);
        Ok(shell)
    }
}

fn map_connect_error(err: russh::Error, request: &ShellRequest) -> ConnectError {
    match err {
        russh::Error::UnknownKey => ConnectError::HostKeyRejected {
            host: request.host.clone(),
        },
        other => ConnectError::Unreachable {
            address: format!("{}:{}", request.host, request.port),
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn open_shell(&self, request: &ShellRequest) -> Result<ShellChannel, ConnectError> {
        let timeout = self.config.connect_timeout;
        tokio::time::timeout(timeout, self.establish(request))
            .await
            .map_err(|_| ConnectError::Timeout(timeout))?
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shellgate_core::Target;

    use super::*;

    fn request(port: u16) -> ShellRequest {
        ShellRequest::for_target(&Target::new("t", "127.0.0.1", "ops").with_port(port))
    }

    #[test]
    fn test_unknown_key_maps_to_host_key_rejected() {
        let err = map_connect_error(russh::Error::UnknownKey, &request(22));
        assert!(matches!(err, ConnectError::HostKeyRejected { host } if host == "127.0.0.1"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = SshConnector::new(SshConfig::default().connect_timeout(Duration::from_secs(5)));
        let err = connector.open_shell(&request(port)).await.unwrap_err();
        assert!(
            matches!(err, ConnectError::Unreachable { ref address, .. } if address.ends_with(&port.to_string())),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let connector =
            SshConnector::new(SshConfig::default().connect_timeout(Duration::from_millis(200)));
        let err = connector.open_shell(&request(port)).await.unwrap_err();
        assert!(matches!(err, ConnectError::Timeout(_)));
    }
}
