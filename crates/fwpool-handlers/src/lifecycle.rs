//! Instance lifecycle handler.
//!
//! Reacts to an instance-launched event: waits for the instance to become
//! reachable, wires its data interfaces, pushes day-0 configuration over
//! the management channel, and only then registers it with both load
//! balancers. Registration is strictly the last step so a failure anywhere
//! earlier can never leave a half-configured appliance taking traffic.
//!
//! A failed or timed-out instance is marked Failed and its termination
//! requested; it is never retried in place. The pool's own reconciliation
//! provisions the replacement.

use tokio::time::Instant;
use tracing::{info, warn};

use fwpool_cloud::{BackendRef, VnicAttachSpec};
use fwpool_core::LoadBalancerBinding;
use fwpool_core::types::{InstanceView, LifecycleStage, RunState, VnicRole};
use fwpool_remote::{ConfigScript, Credentials, RemoteSession, apply};

use crate::event::{HandlerContext, Outcome};

/// Handle an instance-launched event.
pub async fn handle_launch(ctx: &HandlerContext, instance_id: &str) -> anyhow::Result<Outcome> {
    info!(instance = %instance_id, "instance launched, beginning configuration");

    // Step 1: wait for the instance to come up. A timeout here discards
    // the instance; the next scale evaluation provisions a replacement.
    let view = match wait_until_ready(ctx, instance_id).await {
        Some(view) => view,
        None => {
            warn!(instance = %instance_id, "instance never became ready, discarding");
            return Ok(discard(ctx, instance_id, "instance never became ready").await);
        }
    };

    match configure_and_register(ctx, &view).await {
        Ok(()) => {
            info!(instance = %instance_id, "instance in service");
            Ok(Outcome::Completed)
        }
        Err(err) => {
            warn!(instance = %instance_id, error = %err, "configuration failed, discarding");
            Ok(discard(ctx, instance_id, &err.to_string()).await)
        }
    }
}

/// Poll instance state until Running with a management address, bounded by
/// the configured readiness timeout.
async fn wait_until_ready(ctx: &HandlerContext, instance_id: &str) -> Option<InstanceView> {
    let started = Instant::now();
    loop {
        if let Ok(view) = ctx.cloud.get_instance(instance_id).await
            && view.run_state == RunState::Running
            && view.ip(VnicRole::Management).is_some()
        {
            return Some(view);
        }
        if started.elapsed() >= ctx.config.ready_timeout() {
            return None;
        }
        tokio::time::sleep(ctx.config.poll_interval()).await;
    }
}

/// Steps 2–6: attach interfaces, push configuration, register backends,
/// mark InService. Any error propagates to the discard path.
async fn configure_and_register(ctx: &HandlerContext, view: &InstanceView) -> anyhow::Result<()> {
    let config = &ctx.config;
    let instance_id = view.id.as_str();
    // Safe: wait_until_ready verified the management address.
    let management_ip = view
        .ip(VnicRole::Management)
        .ok_or_else(|| anyhow::anyhow!("management interface missing"))?
        .to_string();

    // Step 2: data interfaces.
    ctx.cloud
        .set_instance_stage(instance_id, LifecycleStage::AwaitingNetwork)
        .await?;
    let inside = ctx
        .cloud
        .attach_vnic(
            instance_id,
            &VnicAttachSpec {
                role: VnicRole::Inside,
                subnet: config.inside_subnet.clone(),
                security_group: config.inside_security_group.clone(),
            },
        )
        .await?;
    let outside = ctx
        .cloud
        .attach_vnic(
            instance_id,
            &VnicAttachSpec {
                role: VnicRole::Outside,
                subnet: config.outside_subnet.clone(),
                security_group: config.outside_security_group.clone(),
            },
        )
        .await?;

    // Step 3: admin credential.
    ctx.cloud
        .set_instance_stage(instance_id, LifecycleStage::Configuring)
        .await?;
    let password = ctx
        .cloud
        .decrypt_secret(&config.credential_key_ref, &config.credential_ciphertext)
        .await?;
    let credentials = Credentials {
        user: config.admin_user.clone(),
        password,
    };

    // Step 4: day-0 configuration, then the externally supplied config.
    let bootstrap = ctx.cloud.fetch_object(&config.bootstrap_config_url).await?;
    let mut session = ctx.remote.connect(&management_ip, &credentials).await?;
    let pushed = push_configuration(session.as_mut(), &inside.ip, &outside.ip, &bootstrap).await;
    session.close().await;
    pushed?;

    // Step 5: backend registration, the last fallible step.
    register_backend(ctx, &config.external_lb, &outside.ip).await?;
    register_backend(ctx, &config.internal_lb, &inside.ip).await?;

    // Step 6: in service.
    ctx.cloud
        .set_instance_stage(instance_id, LifecycleStage::InService)
        .await?;
    Ok(())
}

async fn push_configuration(
    session: &mut dyn RemoteSession,
    inside_ip: &str,
    outside_ip: &str,
    bootstrap: &str,
) -> anyhow::Result<()> {
    apply(session, &day0_script(inside_ip, outside_ip)).await?;
    apply(session, &ConfigScript::from_text(bootstrap)).await?;
    Ok(())
}

/// Interface and management hardening applied before the externally
/// supplied configuration.
fn day0_script(inside_ip: &str, outside_ip: &str) -> ConfigScript {
    let mut script = ConfigScript::new();
    script
        .push("config system interface")
        .push("edit inside")
        .push(format!("set ip {inside_ip} 255.255.255.0"))
        .push("set allowaccess ping")
        .push("next")
        .push("edit outside")
        .push(format!("set ip {outside_ip} 255.255.255.0"))
        .push("next")
        .push("end");
    script
}

async fn register_backend(
    ctx: &HandlerContext,
    binding: &LoadBalancerBinding,
    ip: &str,
) -> anyhow::Result<()> {
    let backend = BackendRef {
        load_balancer: binding.id.clone(),
        backend_set: binding.backend_set.clone(),
    };
    ctx.cloud
        .register_backend(&backend, ip, binding.port)
        .await?;
    Ok(())
}

/// Mark Failed and request termination, best effort on both: the instance
/// may already be gone, and the outcome is the same either way.
async fn discard(ctx: &HandlerContext, instance_id: &str, reason: &str) -> Outcome {
    if let Err(err) = ctx
        .cloud
        .set_instance_stage(instance_id, LifecycleStage::Failed)
        .await
    {
        warn!(instance = %instance_id, error = %err, "could not mark instance failed");
    }
    if let Err(err) = ctx.cloud.terminate_instance(instance_id).await {
        warn!(instance = %instance_id, error = %err, "termination request failed");
    }
    Outcome::Discarded {
        instance: instance_id.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day0_script_sets_both_interfaces() {
        let script = day0_script("10.1.0.5", "10.2.0.5");
        let joined = script.commands().join("\n");
        assert!(joined.contains("set ip 10.1.0.5 255.255.255.0"));
        assert!(joined.contains("set ip 10.2.0.5 255.255.255.0"));
        assert_eq!(script.commands().last().map(String::as_str), Some("end"));
    }
}
