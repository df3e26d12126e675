//! fwpool-cloud — typed interface to the cloud provider.
//!
//! Handlers never talk to provider SDKs directly. Everything goes through
//! the [`CloudAdapter`] trait: instance lifecycle, pool sizing, load
//! balancer backend membership, custom metrics, secret decryption, and
//! object fetches. Each call returns a typed success or a [`CloudError`];
//! transient provider errors are retried by the [`retry::Retrying`]
//! decorator before a terminal failure surfaces to the calling handler.
//!
//! Already-done races are success at this boundary: deregistering a
//! backend that is already gone and terminating an instance that is
//! already terminated both return Ok, so handlers stay idempotent without
//! special-casing.

pub mod adapter;
pub mod error;
pub mod memory;
pub mod retry;

pub use adapter::{BackendRef, CloudAdapter, VnicAttachSpec};
pub use error::{CloudError, CloudResult};
pub use memory::InMemoryCloud;
pub use retry::{Retrying, RetryPolicy};
