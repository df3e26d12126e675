//! The load-metrics publisher.

use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use tracing::{debug, warn};

use fwpool_cloud::CloudAdapter;
use fwpool_core::OrchestratorConfig;
use fwpool_core::types::{LifecycleStage, MetricSample, VnicRole};
use fwpool_remote::{Credentials, RemoteConfigClient};

/// What one publisher run accomplished.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishSummary {
    /// Per-instance samples published.
    pub published: u32,
    /// Members skipped because of connect/parse failures.
    pub skipped: u32,
    /// The max-aggregate value, when at least one member reported.
    pub aggregate: Option<f64>,
}

/// Poll every InService member for utilization and publish one datum per
/// member plus the max aggregate scoped to the pool.
pub async fn publish_load_metrics(
    config: &OrchestratorConfig,
    cloud: &dyn CloudAdapter,
    remote: &dyn RemoteConfigClient,
) -> anyhow::Result<PublishSummary> {
    let members = cloud.list_pool_members(&config.pool_id).await?;
    let password = cloud
        .decrypt_secret(&config.credential_key_ref, &config.credential_ciphertext)
        .await?;
    let credentials = Credentials {
        user: config.admin_user.clone(),
        password,
    };

    let timestamp = epoch_secs();
    let mut summary = PublishSummary {
        published: 0,
        skipped: 0,
        aggregate: None,
    };
    let mut max_value: Option<f64> = None;

    for member in members
        .iter()
        .filter(|m| m.stage == LifecycleStage::InService)
    {
        let value = match poll_member(config, remote, &credentials, member).await {
            Ok(value) => value,
            Err(err) => {
                // One bad appliance must not starve the rest of the batch.
                warn!(instance = %member.id, error = %err, "skipping member in metrics poll");
                summary.skipped += 1;
                continue;
            }
        };

        cloud
            .publish_metric(&MetricSample {
                namespace: config.metric_namespace.clone(),
                name: config.metric_name.clone(),
                resource_id: member.id.clone(),
                timestamp,
                value,
            })
            .await?;
        summary.published += 1;
        max_value = Some(max_value.map_or(value, |m: f64| m.max(value)));
    }

    if let Some(aggregate) = max_value {
        cloud
            .publish_metric(&MetricSample {
                namespace: config.metric_namespace.clone(),
                name: config.metric_name.clone(),
                resource_id: config.pool_id.clone(),
                timestamp,
                value: aggregate,
            })
            .await?;
        summary.aggregate = Some(aggregate);
        debug!(aggregate, published = summary.published, "published pool aggregate");
    } else {
        warn!("no member reported utilization; aggregate not published");
    }

    Ok(summary)
}

async fn poll_member(
    config: &OrchestratorConfig,
    remote: &dyn RemoteConfigClient,
    credentials: &Credentials,
    member: &fwpool_core::types::InstanceView,
) -> anyhow::Result<f64> {
    let host = member
        .ip(VnicRole::Management)
        .ok_or_else(|| anyhow::anyhow!("no management address"))?;

    let mut session = remote.connect(host, credentials).await?;
    let output = session.execute(&config.load_query_command).await;
    session.close().await;

    let output = output?;
    parse_utilization(&output)
        .ok_or_else(|| anyhow::anyhow!("no utilization value in output: {output:?}"))
}

/// Pull a numeric utilization value out of appliance CLI output.
///
/// Prefers the first percentage (`"CPU: 42%"`), falling back to the first
/// bare number.
pub fn parse_utilization(output: &str) -> Option<f64> {
    let percent = Regex::new(r"(\d+(?:\.\d+)?)\s*%").unwrap();
    if let Some(captures) = percent.captures(output) {
        return captures[1].parse().ok();
    }
    let number = Regex::new(r"\d+(?:\.\d+)?").unwrap();
    number.find(output)?.as_str().parse().ok()
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
