//! Health reconciliation handler.
//!
//! A health-check alarm names one unhealthy instance. Membership is
//! re-checked first because scale-in may have already removed it — in
//! that case the work is done and the event is a no-op. Unlike scale-in,
//! the pool target is left unchanged and an explicit resize to the current
//! target is issued afterward, so the provider provisions a replacement
//! instead of shrinking the pool.

use tracing::{debug, info, warn};

use fwpool_core::types::{LifecycleStage, VnicRole};

use crate::event::{HandlerContext, Outcome};
use crate::scale::deregister;

/// Handle a health-check-failed alarm for one instance.
pub async fn handle_health_alarm(
    ctx: &HandlerContext,
    instance_id: &str,
) -> anyhow::Result<Outcome> {
    let config = &ctx.config;
    let pool = ctx.cloud.get_pool(&config.pool_id).await?;
    let members = ctx.cloud.list_pool_members(&config.pool_id).await?;

    // Check before acting: a racing scale-in or an earlier invocation of
    // this handler may have removed the instance already.
    let Some(member) = members.iter().find(|m| m.id == instance_id) else {
        info!(instance = %instance_id, "health alarm for former member, nothing to do");
        return Ok(Outcome::NoOp("instance no longer a pool member".to_string()));
    };

    info!(instance = %instance_id, stage = ?member.stage, "removing unhealthy instance");

    // The stage update is advisory; a concurrent handler may have advanced
    // it past Draining already, which changes nothing about the cleanup.
    if let Err(err) = ctx
        .cloud
        .set_instance_stage(instance_id, LifecycleStage::Draining)
        .await
    {
        debug!(instance = %instance_id, error = %err, "stage already advanced");
    }

    deregister(ctx, &config.external_lb, member, VnicRole::Outside).await?;
    deregister(ctx, &config.internal_lb, member, VnicRole::Inside).await?;
    ctx.cloud.terminate_instance(instance_id).await?;

    // Target size stays unchanged: health-driven removal implies a
    // replacement. The explicit resize forces the provider to reconcile
    // rather than trusting its own trigger.
    if let Err(err) = ctx.cloud.set_pool_target(&config.pool_id, pool.target).await {
        warn!(error = %err, "replacement resize failed; provider reconciliation will catch up");
    }

    Ok(Outcome::Completed)
}
