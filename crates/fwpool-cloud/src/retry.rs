//! Bounded retry with exponential backoff and jitter.
//!
//! Transient provider errors (rate limiting, temporary unavailability,
//! timeouts) are retried inside the adapter layer; terminal errors surface
//! to the calling handler immediately.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use fwpool_core::types::{InstanceView, LifecycleStage, MetricSample, PoolView, VnicView};

use crate::adapter::{BackendRef, CloudAdapter, VnicAttachSpec};
use crate::error::{CloudError, CloudResult};

/// Retry tuning for adapter calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Run `operation`, retrying transient [`CloudError`]s with exponential
/// backoff and 0.5–1.5x jitter up to the policy's attempt bound.
pub async fn with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> CloudResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = CloudResult<T>>,
{
    let mut delay = policy.initial_delay;

    for attempt in 1..=policy.max_attempts.max(1) {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let sleep = Duration::from_secs_f64(delay.as_secs_f64() * jitter);
                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %err,
                    delay_ms = sleep.as_millis(),
                    "transient provider error, retrying"
                );
                tokio::time::sleep(sleep).await;
                delay = (delay * 2).min(policy.max_delay);
            }
            Err(err) => return Err(err),
        }
    }
    unreachable!("loop returns on the final attempt")
}

/// Adapter decorator applying [`with_backoff`] to every call.
pub struct Retrying<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: CloudAdapter> Retrying<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<A: CloudAdapter> CloudAdapter for Retrying<A> {
    async fn get_instance(&self, instance_id: &str) -> CloudResult<InstanceView> {
        with_backoff(&self.policy, "get_instance", || {
            self.inner.get_instance(instance_id)
        })
        .await
    }

    async fn terminate_instance(&self, instance_id: &str) -> CloudResult<()> {
        with_backoff(&self.policy, "terminate_instance", || {
            self.inner.terminate_instance(instance_id)
        })
        .await
    }

    async fn attach_vnic(&self, instance_id: &str, spec: &VnicAttachSpec) -> CloudResult<VnicView> {
        with_backoff(&self.policy, "attach_vnic", || {
            self.inner.attach_vnic(instance_id, spec)
        })
        .await
    }

    async fn set_instance_stage(
        &self,
        instance_id: &str,
        stage: LifecycleStage,
    ) -> CloudResult<()> {
        with_backoff(&self.policy, "set_instance_stage", || {
            self.inner.set_instance_stage(instance_id, stage)
        })
        .await
    }

    async fn get_pool(&self, pool_id: &str) -> CloudResult<PoolView> {
        with_backoff(&self.policy, "get_pool", || self.inner.get_pool(pool_id)).await
    }

    async fn set_pool_target(&self, pool_id: &str, target: u32) -> CloudResult<()> {
        with_backoff(&self.policy, "set_pool_target", || {
            self.inner.set_pool_target(pool_id, target)
        })
        .await
    }

    async fn list_pool_members(&self, pool_id: &str) -> CloudResult<Vec<InstanceView>> {
        with_backoff(&self.policy, "list_pool_members", || {
            self.inner.list_pool_members(pool_id)
        })
        .await
    }

    async fn register_backend(
        &self,
        backend: &BackendRef,
        ip: &str,
        port: u16,
    ) -> CloudResult<()> {
        with_backoff(&self.policy, "register_backend", || {
            self.inner.register_backend(backend, ip, port)
        })
        .await
    }

    async fn deregister_backend(
        &self,
        backend: &BackendRef,
        ip: &str,
        port: u16,
    ) -> CloudResult<()> {
        with_backoff(&self.policy, "deregister_backend", || {
            self.inner.deregister_backend(backend, ip, port)
        })
        .await
    }

    async fn publish_metric(&self, sample: &MetricSample) -> CloudResult<()> {
        with_backoff(&self.policy, "publish_metric", || {
            self.inner.publish_metric(sample)
        })
        .await
    }

    async fn decrypt_secret(&self, key_ref: &str, ciphertext: &str) -> CloudResult<String> {
        with_backoff(&self.policy, "decrypt_secret", || {
            self.inner.decrypt_secret(key_ref, ciphertext)
        })
        .await
    }

    async fn fetch_object(&self, url: &str) -> CloudResult<String> {
        with_backoff(&self.policy, "fetch_object", || self.inner.fetch_object(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(4);

        let result = with_backoff(&policy, "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CloudError::RateLimited { request_id: None })
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(4);

        let result: CloudResult<()> = with_backoff(&policy, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CloudError::not_found("inst-1")) }
        })
        .await;

        assert!(matches!(result, Err(CloudError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_error_surfaces_after_bound() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);

        let result: CloudResult<()> = with_backoff(&policy, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(CloudError::Unavailable {
                    reason: "maintenance".into(),
                    request_id: None,
                })
            }
        })
        .await;

        assert!(matches!(result, Err(CloudError::Unavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
