//! Credential attempts against an SSH server.

use std::sync::Arc;

use russh::{
    client,
    keys::{PrivateKey, PrivateKeyWithHashAlg},
};
use shellgate_core::{ConnectError, Credential};

/// One authentication method to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAttempt<'a> {
    PublicKey(&'a str),
    Password(&'a str),
    None,
}

/// Methods to try, in order. A key is tried before a password; with no
/// credential only the `none` method is tried.
#[must_use]
pub fn attempts(credential: Option<&Credential>) -> Vec<AuthAttempt<'_>> {
    match credential {
        Some(Credential::Password(password)) => vec![AuthAttempt::Password(password)],
        Some(Credential::PrivateKey(key)) => vec![AuthAttempt::PublicKey(key)],
        Some(Credential::Both {
            private_key,
            password,
        }) => vec![
            AuthAttempt::PublicKey(private_key),
            AuthAttempt::Password(password),
        ],
        None => vec![AuthAttempt::None],
    }
}

/// Decode an unencrypted private key in OpenSSH or PEM form.
///
/// # Errors
/// `InvalidKey` if the key cannot be decoded.
pub fn decode_key(pem: &str) -> Result<PrivateKey, ConnectError> {
    russh::keys::decode_secret_key(pem.trim(), None)
        .map_err(|e| ConnectError::InvalidKey(e.to_string()))
}

/// Authenticate `username` with each attempt in turn.
///
/// An undecodable key fails fast when it is the only method and is
/// skipped when a password follows it.
///
/// # Errors
/// `AuthenticationFailed` once every method is exhausted.
pub async fn authenticate<H>(
    handle: &mut client::Handle<H>,
    username: &str,
    credential: Option<&Credential>,
) -> Result<(), ConnectError>
where
    H: client::Handler,
{
    let plan = attempts(credential);
    let last = plan.len().saturating_sub(1);

    for (i, attempt) in plan.into_iter().enumerate() {
        let result = match attempt {
            AuthAttempt::PublicKey(pem) => {
                let key = match decode_key(pem) {
                    Ok(key) => key,
                    Err(e) if i == last => return Err(e),
                    Err(e) => {
                        tracing::warn!(user = %username, error = %e, "Skipping undecodable private key");
                        continue;
                    }
                };
                let rsa_hash = handle
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                handle
                    .authenticate_publickey(
                        username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), rsa_hash),
                    )
                    .await
            }
            AuthAttempt::Password(password) => {
                handle.authenticate_password(username, password).await
            }
            AuthAttempt::None => handle.authenticate_none(username).await,
        };

        match result {
            Ok(auth) if auth.success() => {
                tracing::debug!(user = %username, method = method_name(attempt), "Authenticated");
                return Ok(());
            }
            Ok(_) => {
                tracing::debug!(user = %username, method = method_name(attempt), "Authentication rejected");
            }
            Err(e) => {
                tracing::debug!(user = %username, method = method_name(attempt), error = %e, "Authentication error");
            }
        }
    }

    Err(ConnectError::AuthenticationFailed {
        user: username.to_string(),
    })
}

const fn method_name(attempt: AuthAttempt<'_>) -> &'static str {
    match attempt {
        AuthAttempt::PublicKey(_) => "publickey",
        AuthAttempt::Password(_) => "password",
        AuthAttempt::None => "none",
    }
}
