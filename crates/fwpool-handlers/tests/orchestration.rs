//! End-to-end handler scenarios against the in-memory provider.
//!
//! These exercise the orchestration invariants: registration strictly
//! after configuration, drain before destroy, min/max clamping, and
//! idempotent health reconciliation.

use std::sync::Arc;

use fwpool_cloud::{BackendRef, CloudAdapter, InMemoryCloud, VnicAttachSpec};
use fwpool_core::OrchestratorConfig;
use fwpool_core::types::{LifecycleStage, RunState, VnicRole};
use fwpool_handlers::{HandlerContext, Outcome, TriggerEvent, dispatch};
use fwpool_remote::fake::ScriptedRemote;

struct Harness {
    cloud: Arc<InMemoryCloud>,
    remote: ScriptedRemote,
    ctx: HandlerContext,
}

fn harness() -> Harness {
    let config = Arc::new(OrchestratorConfig::default());
    let cloud = Arc::new(InMemoryCloud::new(config.pool_id.clone()));
    cloud.put_secret(
        config.credential_key_ref.clone(),
        config.credential_ciphertext.clone(),
        "hunter2",
    );
    cloud.put_object(
        config.bootstrap_config_url.clone(),
        "set admin timeout 30\nset hostname fw-edge\n",
    );
    let remote = ScriptedRemote::new();
    let ctx = HandlerContext {
        config,
        cloud: cloud.clone(),
        remote: Arc::new(remote.clone()),
    };
    Harness { cloud, remote, ctx }
}

fn event(event_type: &str, resource_id: Option<&str>) -> TriggerEvent {
    let payload = match resource_id {
        Some(id) => format!(r#"{{"eventType":"{event_type}","resourceId":"{id}"}}"#),
        None => format!(r#"{{"eventType":"{event_type}"}}"#),
    };
    TriggerEvent::from_json(&payload).unwrap()
}

/// Index of the first operation containing `needle`, or panic.
fn op_index(ops: &[String], needle: &str) -> usize {
    ops.iter()
        .position(|op| op.contains(needle))
        .unwrap_or_else(|| panic!("no operation containing {needle:?} in {ops:?}"))
}

// ── Instance lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn launch_configures_then_registers() {
    let h = harness();
    h.cloud.seed_member("i-a", LifecycleStage::Provisioning);

    let outcome = dispatch(&event("instance.launched", Some("i-a")), &h.ctx)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(h.cloud.stage_of("i-a"), Some(LifecycleStage::InService));

    // Day-0 commands, then the bootstrap file content, over one session.
    let executed = h.remote.executed();
    assert_eq!(executed.first().map(String::as_str), Some("config system interface"));
    assert!(executed.contains(&"set admin timeout 30".to_string()));
    assert_eq!(h.remote.connects(), 1);

    // Registration happened, on both load balancers, strictly after the
    // instance entered Configuring (the configuration push).
    let ops = h.cloud.operations();
    let configuring = op_index(&ops, "stage i-a Configuring");
    let register_external = op_index(&ops, "register lb-external");
    let register_internal = op_index(&ops, "register lb-internal");
    assert!(register_external > configuring);
    assert!(register_internal > configuring);

    let external = BackendRef {
        load_balancer: "lb-external".to_string(),
        backend_set: "fw-backends".to_string(),
    };
    assert_eq!(h.cloud.registered_backends(&external).len(), 1);
}

#[tokio::test]
async fn config_push_failure_discards_without_registration() {
    let h = harness();
    h.cloud.seed_member("i-a", LifecycleStage::Provisioning);
    h.remote
        .respond("set allowaccess ping", "% Error: command rejected");

    let outcome = dispatch(&event("instance.launched", Some("i-a")), &h.ctx)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Discarded { .. }));

    assert_eq!(h.cloud.stage_of("i-a"), Some(LifecycleStage::Failed));
    assert_eq!(h.cloud.run_state_of("i-a"), Some(RunState::Terminated));

    // Never registered anywhere.
    let ops = h.cloud.operations();
    assert!(!ops.iter().any(|op| op.starts_with("register")));
}

#[tokio::test]
async fn unreachable_instance_is_discarded_without_registration() {
    let h = harness();
    h.cloud.seed_member("i-a", LifecycleStage::Provisioning);
    // Management service never comes up within the connect window.
    h.remote.fail_connects(u32::MAX);

    let outcome = dispatch(&event("instance.launched", Some("i-a")), &h.ctx)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Discarded { .. }));
    assert_eq!(h.cloud.stage_of("i-a"), Some(LifecycleStage::Failed));
    assert_eq!(h.cloud.run_state_of("i-a"), Some(RunState::Terminated));
    assert!(!h.cloud.operations().iter().any(|op| op.starts_with("register")));
}

#[tokio::test]
async fn never_ready_instance_times_out_and_is_discarded() {
    let h = harness();
    h.cloud.hold_new_instances();
    h.cloud
        .set_pool_target(&h.ctx.config.pool_id, 1)
        .await
        .unwrap();
    let id = h.cloud.get_pool(&h.ctx.config.pool_id).await.unwrap().members[0].clone();

    let outcome = dispatch(&event("instance.launched", Some(&id)), &h.ctx)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Discarded { .. }));
    assert_eq!(h.cloud.stage_of(&id), Some(LifecycleStage::Failed));
    // No SSH attempt was ever made.
    assert_eq!(h.remote.connects(), 0);
}

// ── Scale decisions ───────────────────────────────────────────────

#[tokio::test]
async fn scale_out_raises_target_by_one_step() {
    let h = harness();
    for id in ["i-a", "i-b", "i-c"] {
        h.cloud.seed_member(id, LifecycleStage::InService);
    }

    // min/max (1,5), size 3 → 4.
    let outcome = dispatch(&event("alarm.scale_out", None), &h.ctx).await.unwrap();
    assert_eq!(outcome, Outcome::Completed);
    let pool = h.cloud.get_pool(&h.ctx.config.pool_id).await.unwrap();
    assert_eq!(pool.target, 4);
    assert_eq!(pool.members.len(), 4);
}

#[tokio::test]
async fn scale_out_at_maximum_is_a_noop() {
    let h = harness();
    for id in ["i-a", "i-b", "i-c", "i-d", "i-e"] {
        h.cloud.seed_member(id, LifecycleStage::InService);
    }

    let outcome = dispatch(&event("alarm.scale_out", None), &h.ctx).await.unwrap();
    assert!(matches!(outcome, Outcome::NoOp(_)));
    let pool = h.cloud.get_pool(&h.ctx.config.pool_id).await.unwrap();
    assert_eq!(pool.target, 5);
    assert_eq!(pool.members.len(), 5);
}

#[tokio::test]
async fn scale_in_at_minimum_is_a_noop() {
    let h = harness();
    h.cloud.seed_member("i-a", LifecycleStage::InService);

    // min/max (1,5), size 1 → unchanged.
    let outcome = dispatch(&event("alarm.scale_in", None), &h.ctx).await.unwrap();
    assert!(matches!(outcome, Outcome::NoOp(_)));
    let pool = h.cloud.get_pool(&h.ctx.config.pool_id).await.unwrap();
    assert_eq!(pool.target, 1);
    assert!(!h.cloud.operations().iter().any(|op| op.starts_with("terminate")));
}

#[tokio::test]
async fn scale_in_drains_oldest_member_before_terminating() {
    let h = harness();
    // i-a is seeded first, so it is the oldest InService member.
    for id in ["i-a", "i-b", "i-c"] {
        h.cloud.seed_member(id, LifecycleStage::InService);
    }

    // Give the victim data interfaces and registered backends.
    let config = &h.ctx.config;
    let outside = h
        .cloud
        .attach_vnic(
            "i-a",
            &VnicAttachSpec {
                role: VnicRole::Outside,
                subnet: config.outside_subnet.clone(),
                security_group: config.outside_security_group.clone(),
            },
        )
        .await
        .unwrap();
    let external = BackendRef {
        load_balancer: config.external_lb.id.clone(),
        backend_set: config.external_lb.backend_set.clone(),
    };
    h.cloud
        .register_backend(&external, &outside.ip, config.external_lb.port)
        .await
        .unwrap();

    let outcome = dispatch(&event("alarm.scale_in", None), &h.ctx).await.unwrap();
    assert_eq!(outcome, Outcome::Completed);

    let ops = h.cloud.operations();
    let deregister = op_index(&ops, "deregister lb-external");
    let terminate = op_index(&ops, "terminate i-a");
    assert!(deregister < terminate, "drain must precede destroy: {ops:?}");

    let pool = h.cloud.get_pool(&h.ctx.config.pool_id).await.unwrap();
    assert_eq!(pool.target, 2);
    assert!(!pool.members.contains(&"i-a".to_string()));
    assert!(h.cloud.registered_backends(&external).is_empty());
}

// ── Health reconciliation ─────────────────────────────────────────

#[tokio::test]
async fn health_alarm_replaces_instance_without_shrinking_pool() {
    let h = harness();
    h.cloud.seed_member("i-a", LifecycleStage::InService);
    h.cloud.seed_member("i-b", LifecycleStage::InService);

    let outcome = dispatch(&event("alarm.health", Some("i-a")), &h.ctx).await.unwrap();
    assert_eq!(outcome, Outcome::Completed);

    let pool = h.cloud.get_pool(&h.ctx.config.pool_id).await.unwrap();
    // Target unchanged; the explicit resize provisioned a replacement.
    assert_eq!(pool.target, 2);
    assert_eq!(pool.members.len(), 2);
    assert!(!pool.members.contains(&"i-a".to_string()));
    assert_eq!(h.cloud.run_state_of("i-a"), Some(RunState::Terminated));
}

#[tokio::test]
async fn health_alarm_is_idempotent_for_removed_instance() {
    let h = harness();
    h.cloud.seed_member("i-a", LifecycleStage::InService);
    h.cloud.seed_member("i-b", LifecycleStage::InService);

    let first = dispatch(&event("alarm.health", Some("i-a")), &h.ctx).await.unwrap();
    assert_eq!(first, Outcome::Completed);

    // Second alarm for the same instance: membership check short-circuits.
    let second = dispatch(&event("alarm.health", Some("i-a")), &h.ctx).await.unwrap();
    assert!(matches!(second, Outcome::NoOp(_)));

    let terminations = h
        .cloud
        .operations()
        .iter()
        .filter(|op| op.as_str() == "terminate i-a")
        .count();
    assert_eq!(terminations, 1, "no duplicate termination request");
}
