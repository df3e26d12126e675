//! fwpool-remote — remote configuration of appliances over SSH.
//!
//! Appliances are configured by executing literal CLI command lines over
//! an authenticated SSH session. Transport failure and command failure are
//! distinct: the transport layer retries connects with backoff (a freshly
//! booted appliance refuses connections for a while), while a command whose
//! output contains a known failure marker aborts the remaining script
//! without retrying, so partial configuration is never re-applied.
//!
//! # Architecture
//!
//! ```text
//! RemoteConfigClient (trait)
//!   ├── SshConfigClient    — russh client, bounded connect retries
//!   └── ScriptedRemote     — canned responses for tests and dry runs
//!
//! RemoteSession (trait)
//!   ├── execute(command)   → literal output text
//!   └── transfer_file(...) → streamed through an exec channel
//!
//! ConfigScript + apply()   — ordered commands, failure-marker scanning
//! ```

pub mod error;
pub mod fake;
pub mod script;
pub mod ssh;

pub use error::{RemoteError, RemoteResult};
pub use script::{ConfigScript, apply};
pub use ssh::{ConnectOptions, Credentials, SshConfigClient};

use async_trait::async_trait;

/// Opens authenticated sessions to appliance management addresses.
#[async_trait]
pub trait RemoteConfigClient: Send + Sync {
    /// Connect and authenticate, retrying with backoff up to the client's
    /// bounded attempt count.
    async fn connect(
        &self,
        host: &str,
        credentials: &Credentials,
    ) -> RemoteResult<Box<dyn RemoteSession>>;
}

/// One live session to an appliance.
///
/// Implementations close the underlying connection when dropped; `close`
/// exists for the orderly path.
#[async_trait]
pub trait RemoteSession: Send {
    /// Execute one command and return its literal output (stdout + stderr).
    async fn execute(&mut self, command: &str) -> RemoteResult<String>;

    /// Write `contents` to `remote_path` on the appliance.
    async fn transfer_file(&mut self, contents: &[u8], remote_path: &str) -> RemoteResult<()>;

    /// Disconnect. Best effort; errors are logged, not surfaced.
    async fn close(&mut self);
}
