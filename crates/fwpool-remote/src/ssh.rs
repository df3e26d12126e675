//! SSH transport for the remote configuration client, built on russh.
//!
//! A freshly booted appliance's management service takes a while to start
//! accepting connections, so `connect` retries the dial with exponential
//! backoff up to a bounded attempt count. Authentication rejection is not
//! retried — bad credentials do not fix themselves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use tracing::{debug, warn};

use crate::error::{RemoteError, RemoteResult};
use crate::{RemoteConfigClient, RemoteSession};

/// Credentials for the appliance management interface.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Connection tuning for the SSH client.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub port: u16,
    /// Bounded dial attempts before giving up.
    pub attempts: u32,
    /// Per-attempt dial + handshake timeout.
    pub connect_timeout: Duration,
    /// Per-command execution timeout.
    pub command_timeout: Duration,
    /// First retry delay; doubles per attempt up to `max_backoff`.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            port: 22,
            attempts: 6,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// SSH-backed implementation of [`RemoteConfigClient`].
pub struct SshConfigClient {
    options: ConnectOptions,
}

impl SshConfigClient {
    pub fn new(options: ConnectOptions) -> Self {
        Self { options }
    }

    /// One dial + handshake + password auth attempt.
    async fn dial(&self, host: &str, credentials: &Credentials) -> RemoteResult<Handle<Accept>> {
        let config = Arc::new(client::Config::default());

        let mut handle = tokio::time::timeout(
            self.options.connect_timeout,
            client::connect(config, (host, self.options.port), Accept),
        )
        .await
        .map_err(|_| RemoteError::Timeout {
            operation: format!("connect to {host}"),
        })??;

        let authenticated = handle
            .authenticate_password(&credentials.user, &credentials.password)
            .await?;
        if !authenticated {
            return Err(RemoteError::Auth {
                host: host.to_string(),
            });
        }
        Ok(handle)
    }
}

#[async_trait]
impl RemoteConfigClient for SshConfigClient {
    async fn connect(
        &self,
        host: &str,
        credentials: &Credentials,
    ) -> RemoteResult<Box<dyn RemoteSession>> {
        let mut backoff = self.options.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=self.options.attempts.max(1) {
            match self.dial(host, credentials).await {
                Ok(handle) => {
                    debug!(%host, attempt, "ssh session established");
                    return Ok(Box::new(SshSession {
                        handle,
                        command_timeout: self.options.command_timeout,
                    }));
                }
                Err(err @ RemoteError::Auth { .. }) => return Err(err),
                Err(err) => {
                    warn!(%host, attempt, error = %err, "ssh connect attempt failed");
                    last_error = err.to_string();
                }
            }
            if attempt < self.options.attempts {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(self.options.max_backoff);
            }
        }

        Err(RemoteError::Connect {
            host: host.to_string(),
            attempts: self.options.attempts,
            reason: last_error,
        })
    }
}

/// Client-side handler. Appliances are freshly provisioned, so their host
/// keys are not known ahead of time; any presented key is accepted.
struct Accept;

#[async_trait]
impl client::Handler for Accept {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// One authenticated SSH session. Each command runs on its own exec
/// channel; the connection itself is reused across commands.
struct SshSession {
    handle: Handle<Accept>,
    command_timeout: Duration,
}

impl SshSession {
    async fn run_exec(&mut self, command: &str) -> RemoteResult<String> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut output = Vec::new();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.extend_from_slice(&data[..]),
                ChannelMsg::ExtendedData { ref data, .. } => output.extend_from_slice(&data[..]),
                // The appliance CLI signals failure in output text, not
                // exit codes; the status is not meaningful here.
                ChannelMsg::ExitStatus { .. } => {}
                _ => {}
            }
        }
        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn execute(&mut self, command: &str) -> RemoteResult<String> {
        let timeout = self.command_timeout;
        tokio::time::timeout(timeout, self.run_exec(command))
            .await
            .map_err(|_| RemoteError::Timeout {
                operation: format!("execute {command:?}"),
            })?
    }

    async fn transfer_file(&mut self, contents: &[u8], remote_path: &str) -> RemoteResult<()> {
        let timeout = self.command_timeout;
        let transfer = async {
            let mut channel = self.handle.channel_open_session().await?;
            channel.exec(true, format!("cat > {remote_path}")).await?;
            channel.data(contents).await?;
            channel.eof().await?;

            let mut exit_status = 0u32;
            while let Some(msg) = channel.wait().await {
                if let ChannelMsg::ExitStatus { exit_status: code } = msg {
                    exit_status = code;
                }
            }
            if exit_status != 0 {
                return Err(RemoteError::Transfer {
                    path: remote_path.to_string(),
                    reason: format!("remote write exited with status {exit_status}"),
                });
            }
            Ok(())
        };

        tokio::time::timeout(timeout, transfer)
            .await
            .map_err(|_| RemoteError::Timeout {
                operation: format!("transfer to {remote_path}"),
            })?
    }

    async fn close(&mut self) {
        if let Err(err) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!(error = %err, "ssh disconnect failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_bounded() {
        let options = ConnectOptions::default();
        assert!(options.attempts > 0);
        assert!(options.connect_timeout > Duration::ZERO);
        assert!(options.initial_backoff <= options.max_backoff);
    }

    #[tokio::test]
    async fn connect_to_unreachable_host_exhausts_attempts() {
        // Nothing listens on this port; every dial fails fast.
        let client = SshConfigClient::new(ConnectOptions {
            port: 1,
            attempts: 2,
            connect_timeout: Duration::from_millis(200),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..ConnectOptions::default()
        });
        let credentials = Credentials {
            user: "admin".to_string(),
            password: "secret".to_string(),
        };

        let err = client
            .connect("127.0.0.1", &credentials)
            .await
            .err()
            .expect("connect must fail");
        match err {
            RemoteError::Connect { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
