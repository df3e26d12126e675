//! fwpool-handlers — event-triggered orchestration of the appliance pool.
//!
//! Each handler invocation is an isolated unit of work triggered by one
//! platform event; all durable state lives behind the cloud adapter, so
//! concurrent invocations are tolerated by re-reading state before every
//! mutation and treating already-done as success.
//!
//! # Control flow
//!
//! ```text
//! platform event (JSON)
//!   │
//!   ▼
//! TriggerEvent::from_json → dispatch()
//!   ├── instance.launched  → lifecycle::handle_launch
//!   ├── alarm.scale_out    → scale::handle_scale_out
//!   ├── alarm.scale_in     → scale::handle_scale_in
//!   ├── alarm.health       → health::handle_health_alarm
//!   └── timer.metrics      → fwpool_metrics::publish_load_metrics
//! ```

pub mod event;
pub mod health;
pub mod lifecycle;
pub mod scale;

pub use event::{EventKind, HandlerContext, Outcome, TriggerEvent, dispatch};

use fwpool_core::OrchestratorConfig;
use fwpool_remote::{ConnectOptions, SshConfigClient};

/// Build the production SSH client from deployment configuration.
pub fn ssh_client(config: &OrchestratorConfig) -> SshConfigClient {
    SshConfigClient::new(ConnectOptions {
        attempts: config.connect_attempts,
        connect_timeout: config.connect_timeout(),
        command_timeout: config.command_timeout(),
        ..ConnectOptions::default()
    })
}
