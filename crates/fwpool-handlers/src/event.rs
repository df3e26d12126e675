//! Trigger event parsing and handler dispatch.
//!
//! The platform delivers events as JSON payloads. Only three fields are
//! interpreted — `eventType`, `compartmentId`, `resourceId` — everything
//! else is provider-defined and ignored. Unknown event types are logged
//! and treated as handled, not as errors.

use std::sync::Arc;

use anyhow::Context as _;
use tracing::{info, warn};

use fwpool_cloud::CloudAdapter;
use fwpool_core::OrchestratorConfig;
use fwpool_remote::RemoteConfigClient;

use crate::{health, lifecycle, scale};

/// Event types the orchestrator reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A pool instance finished launching.
    InstanceLaunched,
    /// Sustained-high-utilization alarm fired.
    ScaleOutAlarm,
    /// Sustained-low-utilization alarm fired.
    ScaleInAlarm,
    /// A health check for one instance failed.
    HealthAlarm,
    /// Scheduled metrics-poll tick.
    MetricsTimer,
    /// Anything else; handled as a no-op.
    Unknown(String),
}

impl EventKind {
    fn from_type(event_type: &str) -> Self {
        match event_type {
            "instance.launched" => EventKind::InstanceLaunched,
            "alarm.scale_out" => EventKind::ScaleOutAlarm,
            "alarm.scale_in" => EventKind::ScaleInAlarm,
            "alarm.health" => EventKind::HealthAlarm,
            "timer.metrics" => EventKind::MetricsTimer,
            other => EventKind::Unknown(other.to_string()),
        }
    }
}

/// One parsed trigger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub kind: EventKind,
    /// Opaque compartment identifier, when the provider supplies one.
    pub compartment: Option<String>,
    /// Instance or alarm resource identifier.
    pub resource_id: Option<String>,
}

impl TriggerEvent {
    /// Parse a provider event payload.
    pub fn from_json(payload: &str) -> anyhow::Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(payload).context("event payload is not valid JSON")?;
        let event_type = value
            .get("eventType")
            .and_then(|v| v.as_str())
            .context("event payload missing eventType")?;

        Ok(Self {
            kind: EventKind::from_type(event_type),
            compartment: value
                .get("compartmentId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            resource_id: value
                .get("resourceId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }
}

/// Outcome of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The handler ran its full sequence.
    Completed,
    /// Nothing to do (bounds reached, target already gone, unknown event).
    NoOp(String),
    /// The instance was marked Failed and its termination requested; a
    /// replacement arrives via pool reconciliation.
    Discarded { instance: String, reason: String },
}

/// Everything a handler invocation needs, constructed once at startup.
#[derive(Clone)]
pub struct HandlerContext {
    pub config: Arc<OrchestratorConfig>,
    pub cloud: Arc<dyn CloudAdapter>,
    pub remote: Arc<dyn RemoteConfigClient>,
}

/// Route one event to its handler.
pub async fn dispatch(event: &TriggerEvent, ctx: &HandlerContext) -> anyhow::Result<Outcome> {
    match &event.kind {
        EventKind::InstanceLaunched => {
            let instance_id = event
                .resource_id
                .as_deref()
                .context("instance.launched event missing resourceId")?;
            lifecycle::handle_launch(ctx, instance_id).await
        }
        EventKind::ScaleOutAlarm => scale::handle_scale_out(ctx).await,
        EventKind::ScaleInAlarm => scale::handle_scale_in(ctx).await,
        EventKind::HealthAlarm => {
            let instance_id = event
                .resource_id
                .as_deref()
                .context("alarm.health event missing resourceId")?;
            health::handle_health_alarm(ctx, instance_id).await
        }
        EventKind::MetricsTimer => {
            let summary = fwpool_metrics::publish_load_metrics(
                &ctx.config,
                ctx.cloud.as_ref(),
                ctx.remote.as_ref(),
            )
            .await?;
            info!(
                published = summary.published,
                skipped = summary.skipped,
                aggregate = ?summary.aggregate,
                "metrics poll complete"
            );
            Ok(Outcome::Completed)
        }
        EventKind::Unknown(event_type) => {
            warn!(%event_type, "ignoring unknown event type");
            Ok(Outcome::NoOp(format!("unknown event type {event_type}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_event() {
        let event = TriggerEvent::from_json(
            r#"{"eventType":"instance.launched","compartmentId":"c-1","resourceId":"i-9"}"#,
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::InstanceLaunched);
        assert_eq!(event.compartment.as_deref(), Some("c-1"));
        assert_eq!(event.resource_id.as_deref(), Some("i-9"));
    }

    #[test]
    fn unknown_event_type_is_preserved() {
        let event =
            TriggerEvent::from_json(r#"{"eventType":"instance.preempted","resourceId":"i-9"}"#)
                .unwrap();
        assert_eq!(event.kind, EventKind::Unknown("instance.preempted".into()));
    }

    #[test]
    fn extra_provider_fields_are_ignored() {
        let event = TriggerEvent::from_json(
            r#"{"eventType":"alarm.scale_out","severity":"CRITICAL","dimensions":{"x":1}}"#,
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::ScaleOutAlarm);
        assert_eq!(event.resource_id, None);
    }

    #[test]
    fn missing_event_type_is_an_error() {
        assert!(TriggerEvent::from_json(r#"{"resourceId":"i-9"}"#).is_err());
        assert!(TriggerEvent::from_json("not json").is_err());
    }
}
