//! fwpool-core — deployment configuration and shared domain types.
//!
//! Everything here is read-only to the handlers: the configuration is
//! loaded once at startup and passed by `Arc`, and the domain types are
//! views over state that lives in the cloud provider's backing services.

pub mod config;
pub mod types;

pub use config::{ConfigError, LoadBalancerBinding, OrchestratorConfig};
pub use types::{
    InstanceView, LifecycleStage, MetricSample, PoolView, RunState, VnicRole, VnicView,
};
