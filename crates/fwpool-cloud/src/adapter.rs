//! The cloud resource adapter trait.
//!
//! A deployment supplies one implementation per provider; tests and the
//! simulator use [`crate::InMemoryCloud`]. Identifiers are opaque provider
//! strings — no provider field names appear in orchestration logic.

use async_trait::async_trait;

use fwpool_core::types::{InstanceView, LifecycleStage, MetricSample, PoolView, VnicRole, VnicView};

use crate::error::CloudResult;

/// What to attach when wiring a data interface onto an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct VnicAttachSpec {
    pub role: VnicRole,
    pub subnet: String,
    pub security_group: String,
}

/// Addresses one backend set on one load balancer.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRef {
    pub load_balancer: String,
    pub backend_set: String,
}

/// Typed interface to the cloud provider.
///
/// Mutating calls are check-before-act friendly: `terminate_instance` of an
/// already-terminated instance and `deregister_backend` of an absent target
/// return Ok (spec'd already-done semantics), and `set_instance_stage`
/// rejects backward lifecycle transitions.
#[async_trait]
pub trait CloudAdapter: Send + Sync {
    // ── Instances ─────────────────────────────────────────────────
    async fn get_instance(&self, instance_id: &str) -> CloudResult<InstanceView>;
    async fn terminate_instance(&self, instance_id: &str) -> CloudResult<()>;
    async fn attach_vnic(&self, instance_id: &str, spec: &VnicAttachSpec) -> CloudResult<VnicView>;
    async fn set_instance_stage(&self, instance_id: &str, stage: LifecycleStage)
    -> CloudResult<()>;

    // ── Pool ──────────────────────────────────────────────────────
    async fn get_pool(&self, pool_id: &str) -> CloudResult<PoolView>;
    async fn set_pool_target(&self, pool_id: &str, target: u32) -> CloudResult<()>;
    async fn list_pool_members(&self, pool_id: &str) -> CloudResult<Vec<InstanceView>>;

    // ── Load balancers ────────────────────────────────────────────
    async fn register_backend(&self, backend: &BackendRef, ip: &str, port: u16)
    -> CloudResult<()>;
    async fn deregister_backend(
        &self,
        backend: &BackendRef,
        ip: &str,
        port: u16,
    ) -> CloudResult<()>;

    // ── Monitoring ────────────────────────────────────────────────
    async fn publish_metric(&self, sample: &MetricSample) -> CloudResult<()>;

    // ── Secrets / object storage ──────────────────────────────────
    async fn decrypt_secret(&self, key_ref: &str, ciphertext: &str) -> CloudResult<String>;
    async fn fetch_object(&self, url: &str) -> CloudResult<String>;
}
