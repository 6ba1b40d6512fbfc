//! Messenger Automation: keyword rules, conversational flows, delayed
//! sequences and policy-aware broadcasts for Messenger pages.
//!
//! Main entry point that wires the subsystems and starts the server.

mod seed;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use messenger_api::{ApiServer, AppState};
use messenger_automation::InboundPipeline;
use messenger_broadcast::{BroadcastRunner, CampaignService, UtilitySender};
use messenger_cache::RedisCheckpointStore;
use messenger_channels::{GraphApiSender, PayloadBuilder};
use messenger_core::clock::{Clock, SystemClock};
use messenger_core::config::AppConfig;
use messenger_core::memory::MemoryStore;
use messenger_core::store::{CheckpointStore, Repositories};
use messenger_policy::{ComplianceGuard, TemplateRegistry};
use messenger_scheduler::wake::{spawn_nats_consumer, spawn_timer_worker};
use messenger_scheduler::{
    ActionDispatcher, ExecutionScheduler, NatsNotifier, NoopNotifier, TimerNotifier,
};
use tracing::{debug, error, info, warn};

use crate::seed::Seed;

#[derive(Parser, Debug)]
#[command(name = "messenger-automation")]
#[command(about = "Keyword automations, flows, delayed sequences and broadcasts for Messenger")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "MESSENGER_AUTOMATION__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "MESSENGER_AUTOMATION__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Metrics port (overrides config)
    #[arg(long, env = "MESSENGER_AUTOMATION__API__METRICS_PORT")]
    metrics_port: Option<u16>,

    /// JSON file with pages, rules and templates to load at startup
    #[arg(long, env = "MESSENGER_AUTOMATION_SEED")]
    seed: Option<PathBuf>,

    /// Serve HTTP triggers only; no background sweep or broadcast loops
    #[arg(long, default_value_t = false)]
    no_background: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "messenger_automation=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Messenger Automation starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.api.metrics_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.api.metrics_port,
        redis = !config.redis.urls.is_empty(),
        nats = !config.nats.urls.is_empty(),
        "Configuration loaded"
    );
    if config.platform.app_secret.is_empty() {
        warn!("No app secret configured; every webhook delivery will be rejected");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(TemplateRegistry::new());
    if let Some(path) = &cli.seed {
        Seed::from_file(path)?.apply(&store, &registry)?;
    }
    let repos = Repositories::from_store(store.clone());

    let checkpoints: Arc<dyn CheckpointStore> = if config.redis.urls.is_empty() {
        info!("No Redis configured, checkpoints kept in memory");
        store.clone()
    } else {
        Arc::new(
            RedisCheckpointStore::connect(&config.redis, &config.node_id)
                .await
                .context("Redis connection required for durable checkpoints")?,
        )
    };

    let sender = Arc::new(GraphApiSender::new(&config.platform)?);
    let dispatcher = Arc::new(ActionDispatcher::new(
        sender,
        store.clone(),
        PayloadBuilder::default(),
        clock.clone(),
    ));

    let scheduler = ExecutionScheduler::new(
        repos.clone(),
        checkpoints,
        dispatcher.clone(),
        clock.clone(),
        config.scheduler.clone(),
    )
    .with_max_actions(config.automation.max_actions_per_run);

    // Push wake path: NATS when configured, else an in-process timer.
    let scheduler = if !config.scheduler.push_enabled {
        info!("Push wake disabled, relying on sweep");
        Arc::new(scheduler.with_notifier(Arc::new(NoopNotifier)))
    } else if let Some(url) = config.nats.urls.first().cloned() {
        info!(url = %url, "Connecting to NATS");
        let client = async_nats::ConnectOptions::new()
            .max_reconnects(Some(config.nats.max_reconnects))
            .connect(&url)
            .await?;
        info!("NATS connection established");

        let subject = config.nats.wake_subject.clone();
        let scheduler = Arc::new(
            scheduler.with_notifier(Arc::new(NatsNotifier::new(client.clone(), subject.clone()))),
        );
        spawn_nats_consumer(scheduler.clone(), client, subject);
        scheduler
    } else {
        let (notifier, rx) = TimerNotifier::channel();
        let scheduler = Arc::new(scheduler.with_notifier(Arc::new(notifier)));
        spawn_timer_worker(scheduler.clone(), rx);
        scheduler
    };

    let pipeline = Arc::new(InboundPipeline::new(
        repos.clone(),
        scheduler.clone(),
        dispatcher.clone(),
        clock.clone(),
        &config.automation,
        config.platform.app_secret.clone(),
    ));
    let broadcasts = Arc::new(BroadcastRunner::new(
        repos.clone(),
        dispatcher.clone(),
        clock.clone(),
        config.broadcast.clone(),
    ));
    let campaigns = Arc::new(CampaignService::new(repos.clone(), clock.clone()));
    let utility = Arc::new(UtilitySender::new(
        repos,
        Arc::new(ComplianceGuard::new(registry)),
        dispatcher,
        clock.clone(),
    ));

    if cli.no_background {
        info!("Background loops disabled, HTTP triggers only");
    } else {
        spawn_background_loops(
            &config,
            clock.clone(),
            scheduler.clone(),
            broadcasts.clone(),
            pipeline.clone(),
        );
    }

    let state = AppState {
        pipeline,
        scheduler,
        broadcasts,
        campaigns,
        utility,
        verify_token: config.platform.verify_token.clone(),
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };
    let api_server = ApiServer::new(config.api.clone(), state);

    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Messenger Automation is ready to serve traffic");

    // Blocks until shutdown
    api_server.start_http().await?;

    Ok(())
}

/// Periodic sweep, broadcast pass and dedup eviction.
fn spawn_background_loops(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
    scheduler: Arc<ExecutionScheduler>,
    broadcasts: Arc<BroadcastRunner>,
    pipeline: Arc<InboundPipeline>,
) {
    let sweep_every = Duration::from_secs(config.scheduler.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            match scheduler.sweep().await {
                Ok(report) if report.count > 0 => {
                    info!(count = report.count, "Sweep resumed due executions")
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Sweep failed"),
            }
        }
    });

    let broadcast_every = Duration::from_secs(config.broadcast.interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(broadcast_every);
        loop {
            interval.tick().await;
            match broadcasts.process_due().await {
                Ok(report) if report.processed_count > 0 => {
                    info!(campaigns = report.processed_count, "Broadcast pass finished")
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Broadcast pass failed"),
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let evicted = pipeline.dedup().evict_expired(clock.now());
            debug!(evicted, "Dedup caches trimmed");
        }
    });
}
