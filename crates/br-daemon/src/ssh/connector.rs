//! Outbound SSH connections to the pipeline endpoints
//!
//! Every session authenticates with the same private key, loaded once at
//! startup and shared read-only.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config};
use russh_keys::key::{KeyPair, PublicKey};

use br_core::config::EndpointConfig;
use br_core::traits::{RemoteSession, SessionFactory};
use br_core::{ConfigError, RunError};

use super::session::SshSession;

/// Load the private key used for every session
pub fn load_credentials(path: &Path) -> Result<Arc<KeyPair>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Credentials {
            path: path.to_path_buf(),
            reason: "file does not exist".to_string(),
        });
    }

    let key = russh_keys::load_secret_key(path, None).map_err(|e| ConfigError::Credentials {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(Arc::new(key))
}

/// Opens [`SshSession`]s with the shared key
pub struct SshSessionFactory {
    /// Shared SSH client configuration
    ssh_config: Arc<Config>,
    /// Private key for authentication
    key: Arc<KeyPair>,
    connect_timeout: Duration,
}

impl SshSessionFactory {
    /// Create a factory authenticating with `key`
    pub fn new(key: Arc<KeyPair>, connect_timeout: Duration) -> Self {
        Self {
            ssh_config: Arc::new(Config::default()),
            key,
            connect_timeout,
        }
    }
}

#[async_trait]
impl SessionFactory for SshSessionFactory {
    async fn open(&self, endpoint: &EndpointConfig) -> Result<Box<dyn RemoteSession>, RunError> {
        let address = endpoint.address();
        let connect_error = |reason: String| RunError::Connect {
            host: endpoint.host.clone(),
            reason,
        };

        tracing::debug!("Connecting to {}", address);
        let handler = ClientHandler::new(endpoint.host.clone(), endpoint.host_key_fingerprint.clone());
        let mut handle = tokio::time::timeout(
            self.connect_timeout,
            client::connect(Arc::clone(&self.ssh_config), address.as_str(), handler),
        )
        .await
        .map_err(|_| connect_error("connection timed out".to_string()))?
        .map_err(|e| connect_error(e.to_string()))?;

        tracing::debug!("Authenticating as user '{}'", endpoint.user);
        let authenticated = handle
            .authenticate_publickey(&endpoint.user, Arc::clone(&self.key))
            .await
            .map_err(|e| connect_error(format!("authentication error: {}", e)))?;

        if !authenticated {
            return Err(RunError::Auth {
                user: endpoint.user.clone(),
                host: endpoint.host.clone(),
            });
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| RunError::Spawn {
                host: endpoint.host.clone(),
                reason: format!("failed to open session channel: {}", e),
            })?;

        tracing::info!("Connected to {}", endpoint.label());
        Ok(Box::new(SshSession::new(endpoint.host.clone(), handle, channel)))
    }
}

/// SSH client handler for pipeline sessions
pub(crate) struct ClientHandler {
    host: String,
    /// Expected host key fingerprint, if pinned
    expected_host_key: Option<String>,
}

impl ClientHandler {
    fn new(host: String, expected_host_key: Option<String>) -> Self {
        Self {
            host,
            expected_host_key,
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    /// Accept the server key unless a different fingerprint is pinned
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        tracing::debug!("Host key for {}: {}", self.host, fingerprint);

        match &self.expected_host_key {
            Some(expected) if *expected != fingerprint => {
                tracing::error!(
                    "Host key for {} differs from configured: expected {}, got {}",
                    self.host,
                    expected,
                    fingerprint
                );
                Ok(false)
            }
            Some(_) => {
                tracing::debug!("Host key verified against configured fingerprint");
                Ok(true)
            }
            None => Ok(true),
        }
    }
}
