//! Scale decision handlers.
//!
//! Scale-out raises the pool target by a fixed step, clamped to the
//! configured maximum; instance creation itself is the pool's own
//! reconciliation, not driven here. Scale-in picks the oldest InService
//! member (the pool API guarantees no ordering, so age comes from launch
//! timestamps), drains it from both backend sets, and only then terminates
//! and decrements the target.

use tracing::{debug, info};

use fwpool_cloud::BackendRef;
use fwpool_core::LoadBalancerBinding;
use fwpool_core::types::{InstanceView, LifecycleStage, VnicRole};

use crate::event::{HandlerContext, Outcome};

/// Handle a sustained-high-utilization alarm.
pub async fn handle_scale_out(ctx: &HandlerContext) -> anyhow::Result<Outcome> {
    let config = &ctx.config;
    let pool = ctx.cloud.get_pool(&config.pool_id).await?;

    if pool.target >= config.max_size {
        info!(target = pool.target, max = config.max_size, "scale-out no-op: at maximum");
        return Ok(Outcome::NoOp("pool already at maximum size".to_string()));
    }

    let new_target = (pool.target + config.scale_step).min(config.max_size);
    ctx.cloud
        .set_pool_target(&config.pool_id, new_target)
        .await?;
    info!(from = pool.target, to = new_target, "scaled out");
    Ok(Outcome::Completed)
}

/// Handle a sustained-low-utilization alarm.
pub async fn handle_scale_in(ctx: &HandlerContext) -> anyhow::Result<Outcome> {
    let config = &ctx.config;
    let pool = ctx.cloud.get_pool(&config.pool_id).await?;

    if pool.target <= config.min_size {
        info!(target = pool.target, min = config.min_size, "scale-in no-op: at minimum");
        return Ok(Outcome::NoOp("pool already at minimum size".to_string()));
    }

    let members = ctx.cloud.list_pool_members(&config.pool_id).await?;
    let Some(victim) = select_victim(&members) else {
        debug!("scale-in no-op: no in-service member to retire");
        return Ok(Outcome::NoOp("no in-service member to retire".to_string()));
    };

    info!(victim = %victim.id, launched_at = victim.launched_at, "scaling in");

    // Drain precedes destroy.
    ctx.cloud
        .set_instance_stage(&victim.id, LifecycleStage::Draining)
        .await?;
    deregister(ctx, &config.external_lb, victim, VnicRole::Outside).await?;
    deregister(ctx, &config.internal_lb, victim, VnicRole::Inside).await?;
    tokio::time::sleep(config.drain_wait()).await;

    ctx.cloud
        .set_instance_stage(&victim.id, LifecycleStage::Terminating)
        .await?;
    ctx.cloud.terminate_instance(&victim.id).await?;
    ctx.cloud
        .set_pool_target(&config.pool_id, pool.target - 1)
        .await?;

    Ok(Outcome::Completed)
}

/// Oldest InService member, id as tiebreak for determinism.
fn select_victim(members: &[InstanceView]) -> Option<&InstanceView> {
    members
        .iter()
        .filter(|m| m.stage == LifecycleStage::InService)
        .min_by(|a, b| {
            a.launched_at
                .cmp(&b.launched_at)
                .then_with(|| a.id.cmp(&b.id))
        })
}

/// Deregister one data interface from one backend set. An instance whose
/// interface was never attached has nothing registered, so that is a
/// no-op rather than an error.
pub(crate) async fn deregister(
    ctx: &HandlerContext,
    binding: &LoadBalancerBinding,
    member: &InstanceView,
    role: VnicRole,
) -> anyhow::Result<()> {
    let Some(ip) = member.ip(role) else {
        debug!(instance = %member.id, ?role, "no interface to deregister");
        return Ok(());
    };
    let backend = BackendRef {
        load_balancer: binding.id.clone(),
        backend_set: binding.backend_set.clone(),
    };
    ctx.cloud
        .deregister_backend(&backend, ip, binding.port)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwpool_core::types::RunState;

    fn member(id: &str, launched_at: u64, stage: LifecycleStage) -> InstanceView {
        InstanceView {
            id: id.to_string(),
            run_state: RunState::Running,
            stage,
            launched_at,
            vnics: Vec::new(),
        }
    }

    #[test]
    fn victim_is_oldest_in_service() {
        let members = vec![
            member("i-new", 300, LifecycleStage::InService),
            member("i-old", 100, LifecycleStage::InService),
            member("i-mid", 200, LifecycleStage::InService),
        ];
        assert_eq!(select_victim(&members).unwrap().id, "i-old");
    }

    #[test]
    fn victim_skips_non_in_service_members() {
        let members = vec![
            member("i-draining", 50, LifecycleStage::Draining),
            member("i-configuring", 80, LifecycleStage::Configuring),
            member("i-serving", 200, LifecycleStage::InService),
        ];
        assert_eq!(select_victim(&members).unwrap().id, "i-serving");
    }

    #[test]
    fn victim_tiebreak_is_deterministic() {
        let members = vec![
            member("i-b", 100, LifecycleStage::InService),
            member("i-a", 100, LifecycleStage::InService),
        ];
        assert_eq!(select_victim(&members).unwrap().id, "i-a");
    }

    #[test]
    fn no_victim_when_none_in_service() {
        let members = vec![member("i-x", 100, LifecycleStage::Configuring)];
        assert!(select_victim(&members).is_none());
    }
}
