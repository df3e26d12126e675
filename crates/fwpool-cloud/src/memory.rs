//! In-memory cloud provider.
//!
//! Complete in-process implementation of [`CloudAdapter`] used by unit
//! tests, the handler integration tests, and the `fwpoold` simulator.
//! It models the provider behaviors the handlers depend on:
//!
//! - pool reconciliation: raising the target (or resizing back to it when
//!   members are missing) provisions new instances into the pool
//! - forward-only lifecycle stage transitions
//! - already-done semantics: terminating a terminated instance and
//!   deregistering an absent backend are Ok
//! - failure injection per operation, for retry and terminal-path tests
//!
//! Every mutating call is appended to an operation log so tests can assert
//! ordering invariants (drain before terminate, register after configure).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use fwpool_core::types::{
    InstanceView, LifecycleStage, MetricSample, PoolView, RunState, VnicRole, VnicView,
};

use crate::adapter::{BackendRef, CloudAdapter, VnicAttachSpec};
use crate::error::{CloudError, CloudResult};

#[derive(Default)]
struct Inner {
    pool_id: String,
    target: u32,
    members: Vec<String>,
    instances: HashMap<String, InstanceView>,
    /// (load_balancer, backend_set) → registered (ip, port) targets.
    backends: HashMap<(String, String), Vec<(String, u16)>>,
    metrics: Vec<MetricSample>,
    /// (key_ref, ciphertext) → plaintext.
    secrets: HashMap<(String, String), String>,
    objects: HashMap<String, String>,
    /// Per-operation queues of injected failures.
    failures: HashMap<String, Vec<CloudError>>,
    /// Monotonic counters for generated ids, ips, and launch timestamps.
    next_instance: u32,
    next_ip: u32,
    clock: u64,
    /// Whether provisioned instances come up Running with a management ip.
    auto_ready: bool,
    ops: Vec<String>,
}

/// In-memory [`CloudAdapter`] implementation.
pub struct InMemoryCloud {
    inner: Mutex<Inner>,
}

impl InMemoryCloud {
    /// An empty pool with the given id and target size zero.
    pub fn new(pool_id: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pool_id: pool_id.into(),
                auto_ready: true,
                clock: 1_000,
                ..Inner::default()
            }),
        }
    }

    /// Provisioned instances stay in `Provisioning` with no management ip
    /// until `set_run_state` is called. For readiness-timeout tests.
    pub fn hold_new_instances(&self) {
        self.inner.lock().unwrap().auto_ready = false;
    }

    /// Seed one pool member directly, already Running with a management
    /// vnic, and bump the target to match.
    pub fn seed_member(&self, id: impl Into<String>, stage: LifecycleStage) -> String {
        let id = id.into();
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let n = inner.next_instance;
        inner.next_instance += 1;
        let view = InstanceView {
            id: id.clone(),
            run_state: RunState::Running,
            stage,
            launched_at: inner.clock,
            vnics: vec![VnicView {
                role: VnicRole::Management,
                ip: format!("10.0.0.{}", n + 10),
            }],
        };
        inner.instances.insert(id.clone(), view);
        inner.members.push(id.clone());
        inner.target = inner.members.len() as u32;
        id
    }

    pub fn put_secret(
        &self,
        key_ref: impl Into<String>,
        ciphertext: impl Into<String>,
        plaintext: impl Into<String>,
    ) {
        self.inner
            .lock()
            .unwrap()
            .secrets
            .insert((key_ref.into(), ciphertext.into()), plaintext.into());
    }

    pub fn put_object(&self, url: impl Into<String>, content: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .objects
            .insert(url.into(), content.into());
    }

    /// Inject an error for the next call to `operation` (queued FIFO when
    /// called repeatedly).
    pub fn fail_next(&self, operation: &str, error: CloudError) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .entry(operation.to_string())
            .or_default()
            .push(error);
    }

    /// Force an instance's power state (and give it a management ip when
    /// moving to Running).
    pub fn set_run_state(&self, instance_id: &str, state: RunState) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(view) = inner.instances.get_mut(instance_id) {
            view.run_state = state;
            if state == RunState::Running && view.ip(VnicRole::Management).is_none() {
                view.vnics.push(VnicView {
                    role: VnicRole::Management,
                    ip: "10.0.0.99".to_string(),
                });
            }
        }
    }

    // ── Test observers ────────────────────────────────────────────

    pub fn registered_backends(&self, backend: &BackendRef) -> Vec<(String, u16)> {
        self.inner
            .lock()
            .unwrap()
            .backends
            .get(&(backend.load_balancer.clone(), backend.backend_set.clone()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn published_metrics(&self) -> Vec<MetricSample> {
        self.inner.lock().unwrap().metrics.clone()
    }

    pub fn stage_of(&self, instance_id: &str) -> Option<LifecycleStage> {
        self.inner
            .lock()
            .unwrap()
            .instances
            .get(instance_id)
            .map(|v| v.stage)
    }

    pub fn run_state_of(&self, instance_id: &str) -> Option<RunState> {
        self.inner
            .lock()
            .unwrap()
            .instances
            .get(instance_id)
            .map(|v| v.run_state)
    }

    /// Mutating operations in call order, as `"<op> <details>"` strings.
    pub fn operations(&self) -> Vec<String> {
        self.inner.lock().unwrap().ops.clone()
    }

    fn take_failure(inner: &mut Inner, operation: &str) -> Option<CloudError> {
        let queue = inner.failures.get_mut(operation)?;
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    }

    /// Provision instances until the member count reaches the target.
    fn reconcile_up(inner: &mut Inner) {
        while (inner.members.len() as u32) < inner.target {
            inner.clock += 1;
            let n = inner.next_instance;
            inner.next_instance += 1;
            let id = format!("i-{n:04}");
            let (run_state, vnics) = if inner.auto_ready {
                (
                    RunState::Running,
                    vec![VnicView {
                        role: VnicRole::Management,
                        ip: format!("10.0.0.{}", n + 10),
                    }],
                )
            } else {
                (RunState::Provisioning, Vec::new())
            };
            let view = InstanceView {
                id: id.clone(),
                run_state,
                stage: LifecycleStage::Provisioning,
                launched_at: inner.clock,
                vnics,
            };
            debug!(instance = %id, "provisioned pool member");
            inner.instances.insert(id.clone(), view);
            inner.members.push(id);
        }
    }

    fn check_pool(inner: &Inner, pool_id: &str) -> CloudResult<()> {
        if inner.pool_id == pool_id {
            Ok(())
        } else {
            Err(CloudError::not_found(pool_id))
        }
    }
}

#[async_trait]
impl CloudAdapter for InMemoryCloud {
    async fn get_instance(&self, instance_id: &str) -> CloudResult<InstanceView> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut inner, "get_instance") {
            return Err(err);
        }
        inner
            .instances
            .get(instance_id)
            .cloned()
            .ok_or_else(|| CloudError::not_found(instance_id))
    }

    async fn terminate_instance(&self, instance_id: &str) -> CloudResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut inner, "terminate_instance") {
            return Err(err);
        }
        inner.ops.push(format!("terminate {instance_id}"));
        match inner.instances.get_mut(instance_id) {
            Some(view) => view.run_state = RunState::Terminated,
            // Already gone entirely: still success.
            None => return Ok(()),
        }
        inner.members.retain(|m| m != instance_id);
        Ok(())
    }

    async fn attach_vnic(&self, instance_id: &str, spec: &VnicAttachSpec) -> CloudResult<VnicView> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut inner, "attach_vnic") {
            return Err(err);
        }
        inner.next_ip += 1;
        let n = inner.next_ip;
        let view = inner
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| CloudError::not_found(instance_id))?;
        let octet = match spec.role {
            VnicRole::Management => 0,
            VnicRole::Inside => 1,
            VnicRole::Outside => 2,
        };
        let vnic = VnicView {
            role: spec.role,
            ip: format!("10.{octet}.0.{}", n + 10),
        };
        view.vnics.push(vnic.clone());
        inner
            .ops
            .push(format!("attach {instance_id} {:?}", spec.role));
        Ok(vnic)
    }

    async fn set_instance_stage(
        &self,
        instance_id: &str,
        stage: LifecycleStage,
    ) -> CloudResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut inner, "set_instance_stage") {
            return Err(err);
        }
        let view = inner
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| CloudError::not_found(instance_id))?;
        if !view.stage.advances_to(stage) {
            return Err(CloudError::invalid(format!(
                "stage cannot move {:?} -> {:?}",
                view.stage, stage
            )));
        }
        view.stage = stage;
        inner.ops.push(format!("stage {instance_id} {stage:?}"));
        Ok(())
    }

    async fn get_pool(&self, pool_id: &str) -> CloudResult<PoolView> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut inner, "get_pool") {
            return Err(err);
        }
        Self::check_pool(&inner, pool_id)?;
        Ok(PoolView {
            id: inner.pool_id.clone(),
            target: inner.target,
            members: inner.members.clone(),
        })
    }

    async fn set_pool_target(&self, pool_id: &str, target: u32) -> CloudResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut inner, "set_pool_target") {
            return Err(err);
        }
        Self::check_pool(&inner, pool_id)?;
        inner.target = target;
        inner.ops.push(format!("set_target {target}"));
        Self::reconcile_up(&mut inner);
        Ok(())
    }

    async fn list_pool_members(&self, pool_id: &str) -> CloudResult<Vec<InstanceView>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut inner, "list_pool_members") {
            return Err(err);
        }
        Self::check_pool(&inner, pool_id)?;
        Ok(inner
            .members
            .iter()
            .filter_map(|id| inner.instances.get(id).cloned())
            .collect())
    }

    async fn register_backend(
        &self,
        backend: &BackendRef,
        ip: &str,
        port: u16,
    ) -> CloudResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut inner, "register_backend") {
            return Err(err);
        }
        let key = (backend.load_balancer.clone(), backend.backend_set.clone());
        let targets = inner.backends.entry(key).or_default();
        let entry = (ip.to_string(), port);
        if !targets.contains(&entry) {
            targets.push(entry);
        }
        inner.ops.push(format!(
            "register {}/{} {ip}:{port}",
            backend.load_balancer, backend.backend_set
        ));
        Ok(())
    }

    async fn deregister_backend(
        &self,
        backend: &BackendRef,
        ip: &str,
        port: u16,
    ) -> CloudResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut inner, "deregister_backend") {
            return Err(err);
        }
        let key = (backend.load_balancer.clone(), backend.backend_set.clone());
        if let Some(targets) = inner.backends.get_mut(&key) {
            // Absent targets are fine: already-done is success.
            targets.retain(|(t_ip, t_port)| !(t_ip == ip && *t_port == port));
        }
        inner.ops.push(format!(
            "deregister {}/{} {ip}:{port}",
            backend.load_balancer, backend.backend_set
        ));
        Ok(())
    }

    async fn publish_metric(&self, sample: &MetricSample) -> CloudResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut inner, "publish_metric") {
            return Err(err);
        }
        inner.metrics.push(sample.clone());
        Ok(())
    }

    async fn decrypt_secret(&self, key_ref: &str, ciphertext: &str) -> CloudResult<String> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut inner, "decrypt_secret") {
            return Err(err);
        }
        inner
            .secrets
            .get(&(key_ref.to_string(), ciphertext.to_string()))
            .cloned()
            .ok_or_else(|| CloudError::Denied {
                reason: format!("no key material for {key_ref}"),
                request_id: None,
            })
    }

    async fn fetch_object(&self, url: &str) -> CloudResult<String> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = Self::take_failure(&mut inner, "fetch_object") {
            return Err(err);
        }
        inner
            .objects
            .get(url)
            .cloned()
            .ok_or_else(|| CloudError::not_found(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{Retrying, RetryPolicy};

    #[tokio::test]
    async fn raising_target_provisions_members() {
        let cloud = InMemoryCloud::new("pool-1");
        cloud.set_pool_target("pool-1", 3).await.unwrap();

        let pool = cloud.get_pool("pool-1").await.unwrap();
        assert_eq!(pool.target, 3);
        assert_eq!(pool.members.len(), 3);

        let members = cloud.list_pool_members("pool-1").await.unwrap();
        assert!(members.iter().all(|m| m.run_state == RunState::Running));
        // Launch timestamps are strictly ordered for victim selection.
        assert!(members[0].launched_at < members[1].launched_at);
    }

    #[tokio::test]
    async fn terminate_is_idempotent_and_removes_membership() {
        let cloud = InMemoryCloud::new("pool-1");
        let id = cloud.seed_member("i-a", LifecycleStage::InService);

        cloud.terminate_instance(&id).await.unwrap();
        assert_eq!(cloud.run_state_of(&id), Some(RunState::Terminated));
        assert!(
            cloud
                .get_pool("pool-1")
                .await
                .unwrap()
                .members
                .is_empty()
        );

        // Second termination: already done, still success.
        cloud.terminate_instance(&id).await.unwrap();
        cloud.terminate_instance("i-never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn stage_transitions_are_forward_only() {
        let cloud = InMemoryCloud::new("pool-1");
        let id = cloud.seed_member("i-a", LifecycleStage::Configuring);

        cloud
            .set_instance_stage(&id, LifecycleStage::InService)
            .await
            .unwrap();
        let err = cloud
            .set_instance_stage(&id, LifecycleStage::Configuring)
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn deregister_absent_backend_is_ok() {
        let cloud = InMemoryCloud::new("pool-1");
        let backend = BackendRef {
            load_balancer: "lb-1".to_string(),
            backend_set: "set-1".to_string(),
        };
        cloud
            .deregister_backend(&backend, "10.0.0.5", 443)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let cloud = InMemoryCloud::new("pool-1");
        let backend = BackendRef {
            load_balancer: "lb-1".to_string(),
            backend_set: "set-1".to_string(),
        };
        cloud
            .register_backend(&backend, "10.0.0.5", 443)
            .await
            .unwrap();
        cloud
            .register_backend(&backend, "10.0.0.5", 443)
            .await
            .unwrap();
        assert_eq!(cloud.registered_backends(&backend).len(), 1);
    }

    #[tokio::test]
    async fn injected_transient_failures_are_absorbed_by_retry() {
        let cloud = InMemoryCloud::new("pool-1");
        cloud.seed_member("i-a", LifecycleStage::InService);
        cloud.fail_next("get_instance", CloudError::RateLimited { request_id: None });
        cloud.fail_next(
            "get_instance",
            CloudError::Unavailable {
                reason: "blip".into(),
                request_id: None,
            },
        );

        let retrying = Retrying::new(cloud, RetryPolicy::immediate(4));
        let view = retrying.get_instance("i-a").await.unwrap();
        assert_eq!(view.id, "i-a");
    }

    #[tokio::test]
    async fn secrets_and_objects() {
        let cloud = InMemoryCloud::new("pool-1");
        cloud.put_secret("key-1", "AQID", "hunter2");
        cloud.put_object("https://objects/day0.conf", "set admin timeout 30");

        assert_eq!(
            cloud.decrypt_secret("key-1", "AQID").await.unwrap(),
            "hunter2"
        );
        assert!(cloud.decrypt_secret("key-2", "AQID").await.is_err());
        assert_eq!(
            cloud
                .fetch_object("https://objects/day0.conf")
                .await
                .unwrap(),
            "set admin timeout 30"
        );
        assert!(cloud.fetch_object("https://objects/missing").await.is_err());
    }
}
