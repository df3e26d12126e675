//! fwpoold — dry-run simulator for the pool orchestration logic.
//!
//! Replays a JSON event stream against the in-memory cloud provider and a
//! scripted appliance responder, dispatching each event through the same
//! handlers a production deployment wires behind the platform's function
//! entrypoint. Useful for validating orchestration changes locally before
//! anything touches a real pool.
//!
//! The platform fires an instance-launched event for every instance the
//! pool provisions; the simulator mirrors that by synthesizing launch
//! events for newly provisioned members after each dispatched event.
//!
//! # Usage
//!
//! ```text
//! fwpoold simulate --config fwpool.toml --events events.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use fwpool_cloud::{CloudAdapter, InMemoryCloud, Retrying, RetryPolicy};
use fwpool_core::OrchestratorConfig;
use fwpool_core::types::LifecycleStage;
use fwpool_handlers::{HandlerContext, Outcome, TriggerEvent, dispatch};
use fwpool_remote::fake::ScriptedRemote;

#[derive(Parser)]
#[command(name = "fwpoold", about = "Appliance pool orchestration simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay an event stream against the in-memory provider.
    Simulate {
        /// Deployment configuration (fwpool.toml).
        #[arg(long)]
        config: PathBuf,

        /// JSON array of trigger-event payloads.
        #[arg(long)]
        events: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fwpool=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Simulate { config, events } => simulate(config, events).await,
    }
}

async fn simulate(config_path: PathBuf, events_path: PathBuf) -> anyhow::Result<()> {
    let config = Arc::new(OrchestratorConfig::from_file(&config_path)?);

    let cloud = InMemoryCloud::new(config.pool_id.clone());
    cloud.put_secret(
        config.credential_key_ref.clone(),
        config.credential_ciphertext.clone(),
        "simulated-admin-password",
    );
    cloud.put_object(
        config.bootstrap_config_url.clone(),
        "# simulated bootstrap configuration\nset admin timeout 30\n",
    );
    cloud
        .set_pool_target(&config.pool_id, config.min_size)
        .await
        .context("seeding pool to minimum size")?;

    let remote = ScriptedRemote::new();
    remote.respond(config.load_query_command.clone(), "CPU: 37%");

    let ctx = HandlerContext {
        config: config.clone(),
        cloud: Arc::new(Retrying::new(cloud, RetryPolicy::default())),
        remote: Arc::new(remote),
    };

    let raw = std::fs::read_to_string(&events_path)
        .with_context(|| format!("reading {}", events_path.display()))?;
    let payloads: Vec<serde_json::Value> =
        serde_json::from_str(&raw).context("events file must be a JSON array")?;

    // Configure instances the seed provisioned before any event arrives.
    let mut failures = 0u32;
    failures += drain_launch_events(&ctx).await?;

    for (index, payload) in payloads.iter().enumerate() {
        let event = TriggerEvent::from_json(&payload.to_string())
            .with_context(|| format!("event #{index} is malformed"))?;
        info!(?event.kind, index, "dispatching event");

        match dispatch(&event, &ctx).await {
            Ok(outcome) => report(index, &outcome),
            Err(err) => {
                warn!(index, error = %err, "event handler failed");
                failures += 1;
            }
        }
        failures += drain_launch_events(&ctx).await?;
    }

    let pool = ctx.cloud.get_pool(&config.pool_id).await?;
    info!(
        target = pool.target,
        members = pool.members.len(),
        "replay finished"
    );

    if failures > 0 {
        anyhow::bail!("{failures} event(s) failed during replay");
    }
    Ok(())
}

/// Dispatch a synthetic instance-launched event for every member still in
/// Provisioning, the way the platform would. Returns the failure count.
async fn drain_launch_events(ctx: &HandlerContext) -> anyhow::Result<u32> {
    let members = ctx.cloud.list_pool_members(&ctx.config.pool_id).await?;
    let mut failures = 0;

    for member in members
        .iter()
        .filter(|m| m.stage == LifecycleStage::Provisioning)
    {
        let event = TriggerEvent::from_json(&format!(
            r#"{{"eventType":"instance.launched","resourceId":"{}"}}"#,
            member.id
        ))?;
        match dispatch(&event, ctx).await {
            Ok(Outcome::Completed) => info!(instance = %member.id, "configured new member"),
            Ok(outcome) => warn!(instance = %member.id, ?outcome, "launch handling incomplete"),
            Err(err) => {
                warn!(instance = %member.id, error = %err, "launch handling failed");
                failures += 1;
            }
        }
    }
    Ok(failures)
}

fn report(index: usize, outcome: &Outcome) {
    match outcome {
        Outcome::Completed => info!(index, "event completed"),
        Outcome::NoOp(reason) => info!(index, %reason, "event was a no-op"),
        Outcome::Discarded { instance, reason } => {
            warn!(index, %instance, %reason, "instance discarded")
        }
    }
}
