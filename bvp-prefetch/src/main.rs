//! Branching video prefetch simulator - Main entry point
//!
//! Loads a graph description, starts the prefetch service over simulated
//! players, walks a viewer path through the graph and logs every buffering
//! decision along the way.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bvp_common::config::{load_toml_or_default, resolve_config_path, CONFIG_ENV_VAR};
use bvp_common::events::PrefetchEvent;
use bvp_common::NodeId;
use clap::Parser;
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bvp_prefetch::player::sim::{SimProfile, SimulatedProvisioner};
use bvp_prefetch::{AppConfig, NodeGraph, PrefetchService};

/// Command-line arguments for bvp-prefetch
#[derive(Parser, Debug)]
#[command(name = "bvp-prefetch")]
#[command(about = "Replay a viewer path over a branching video graph with simulated prefetching")]
#[command(version)]
struct Args {
    /// Graph description (JSON with `nodes` and `hotspots`)
    #[arg(short, long)]
    graph: PathBuf,

    /// Comma-separated node ids the viewer visits, in order
    #[arg(short, long, value_delimiter = ',', required = true)]
    path: Vec<String>,

    /// Time spent on each node before jumping to the next (milliseconds)
    #[arg(short, long, default_value = "3000")]
    dwell_ms: u64,

    /// Config file (TOML)
    #[arg(short, long, env = "BVP_CONFIG")]
    config: Option<PathBuf>,

    /// Simulated buffering speed, media seconds per second
    #[arg(long, default_value = "4.0")]
    fill_rate: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR, "prefetch");
    let config: AppConfig =
        load_toml_or_default(config_path.as_deref()).context("Failed to load config file")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "bvp_prefetch={level},bvp_common={level}",
                    level = config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }

    let graph = NodeGraph::from_path(&args.graph)
        .with_context(|| format!("Failed to load graph {}", args.graph.display()))?;
    for issue in graph.validate() {
        warn!("Graph: {}", issue);
    }
    info!("Loaded graph with {} nodes", graph.nodes().len());

    if !(args.fill_rate.is_finite() && args.fill_rate > 0.0) {
        bail!("--fill-rate must be a positive number");
    }
    let provisioner = SimulatedProvisioner::new(SimProfile {
        fill_rate: args.fill_rate,
        ..Default::default()
    });

    let (handle, task) = PrefetchService::spawn(
        Arc::new(graph),
        config.prefetch.clone(),
        Box::new(provisioner),
    )
    .context("Failed to start prefetch service")?;

    let mut events = BroadcastStream::new(handle.subscribe_all());
    let logger = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(PrefetchEvent::PrefetchPlanComputed { entry_ids, .. }) => {
                    info!("📋 plan: {:?}", entry_ids)
                }
                Ok(PrefetchEvent::BufferStarted { entry_id, .. }) => info!("⏳ start {}", entry_id),
                Ok(PrefetchEvent::BufferEnded {
                    entry_id, outcome, ..
                }) => info!("✅ end {} ({})", entry_id, outcome),
                Ok(PrefetchEvent::AllBuffered { .. }) => info!("🏁 all buffered"),
                Err(e) => warn!("Event stream lagged: {}", e),
            }
        }
    });

    for node in &args.path {
        let node = NodeId::from(node.as_str());
        let plan = handle
            .switch_to(Some(node.clone()))
            .await
            .with_context(|| format!("Failed to switch to node {}", node))?;

        if let Some(active_entry) = plan.first() {
            let player = handle.activate(active_entry.clone()).await?;
            info!("▶ node {} playing on {}", node, player);
        }

        tokio::time::sleep(Duration::from_millis(args.dwell_ms)).await;
    }

    let snapshot = handle.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    handle.shutdown().await?;
    task.await.context("Prefetch service task panicked")?;
    drop(handle);
    logger.await.ok();

    Ok(())
}
