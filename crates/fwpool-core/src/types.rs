//! Domain types for the appliance pool.
//!
//! These are views over durable state that lives in the cloud provider
//! (instance tables, pool membership, backend sets). Identifiers are
//! opaque provider strings throughout — no provider field names leak
//! into the orchestration logic.

use serde::{Deserialize, Serialize};

/// Opaque provider identifier for an instance.
pub type InstanceId = String;

/// Opaque provider identifier for a pool.
pub type PoolId = String;

// ── Lifecycle ─────────────────────────────────────────────────────

/// Orchestration lifecycle stage of an appliance instance.
///
/// Stages only move forward; `Failed` is terminal and triggers
/// replacement, never retry-in-place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Provisioning,
    AwaitingNetwork,
    Configuring,
    InService,
    Draining,
    Terminating,
    Failed,
}

impl LifecycleStage {
    /// Whether this stage can advance to `next`.
    ///
    /// Forward transitions only, except that any non-terminal stage may
    /// jump to `Failed` or `Terminating` (an instance can be discarded
    /// from anywhere).
    pub fn advances_to(self, next: LifecycleStage) -> bool {
        use LifecycleStage::*;
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match next {
            Failed | Terminating => true,
            _ => Self::rank(next) > Self::rank(self),
        }
    }

    /// Whether no further transitions are allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleStage::Failed | LifecycleStage::Terminating)
    }

    fn rank(stage: LifecycleStage) -> u8 {
        use LifecycleStage::*;
        match stage {
            Provisioning => 0,
            AwaitingNetwork => 1,
            Configuring => 2,
            InService => 3,
            Draining => 4,
            Terminating => 5,
            Failed => 6,
        }
    }
}

/// Provider-reported power state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Provisioning,
    Starting,
    Running,
    Stopping,
    Terminated,
}

// ── Network ───────────────────────────────────────────────────────

/// Role of a network interface on an appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VnicRole {
    /// Boot-time interface used for SSH management.
    Management,
    /// Trusted-side data interface.
    Inside,
    /// Untrusted-side data interface.
    Outside,
}

/// An attached network interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VnicView {
    pub role: VnicRole,
    /// Private IP assigned by the provider.
    pub ip: String,
}

// ── Instance / pool views ─────────────────────────────────────────

/// Provider view of a single appliance instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceView {
    pub id: InstanceId,
    pub run_state: RunState,
    pub stage: LifecycleStage,
    /// Unix timestamp (seconds) when the instance was launched.
    pub launched_at: u64,
    pub vnics: Vec<VnicView>,
}

impl InstanceView {
    /// IP of the interface with the given role, if attached.
    pub fn ip(&self, role: VnicRole) -> Option<&str> {
        self.vnics
            .iter()
            .find(|v| v.role == role)
            .map(|v| v.ip.as_str())
    }
}

/// Provider view of the appliance pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolView {
    pub id: PoolId,
    /// Size the provider reconciles toward.
    pub target: u32,
    pub members: Vec<InstanceId>,
}

// ── Metrics ───────────────────────────────────────────────────────

/// One custom-metric datum, scoped to a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub namespace: String,
    pub name: String,
    /// Instance id for per-appliance samples, pool id for the aggregate.
    pub resource_id: String,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    pub value: f64,
}
