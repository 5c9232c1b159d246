//! agent-balancer daemon.
//!
//! Loads `balancer.toml`, registers the configured backends, and runs the
//! health loop, the scaling engine, and the admin API until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use agent_balancer::admin::{self, AppState};
use agent_balancer::config::{load_config, reconcile_backends, BalancerConfig, ConfigWatcher};
use agent_balancer::health::{BackendHealthRegistry, HealthProbe, HttpProbe};
use agent_balancer::lifecycle::{signals::wait_for_signal, Shutdown};
use agent_balancer::load_balancer::LoadBalancer;
use agent_balancer::observability::{logging::init_logging, metrics::init_metrics};
use agent_balancer::scaling::{ScalingDecision, ScalingRuleEngine};

#[derive(Parser)]
#[command(name = "agent-balancer", version)]
#[command(about = "Adaptive load balancer with circuit breakers and health tracking", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "balancer.toml")]
    config: PathBuf,

    /// Do not reload backends when the config file changes.
    #[arg(long)]
    no_watch: bool,
}

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "agent-balancer starting");
    tracing::info!(
        algorithm = %config.routing.algorithm,
        backends = config.backends.len(),
        scaling_rules = config.scaling.rules.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        init_metrics(addr)?;
    }

    let registry = Arc::new(BackendHealthRegistry::new(config.health_settings()));
    let balancer = Arc::new(LoadBalancer::new(registry, config.balancer_options()));
    let probe = Arc::new(HttpProbe::new(Duration::from_secs(config.health.probe_timeout_secs))?);
    reconcile_backends(&balancer, Some(&*probe), &config.backends);

    let shutdown = Shutdown::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let health_probe: Arc<dyn HealthProbe> = probe.clone();
    tasks.push(balancer.spawn_health_checks(Some(health_probe)));

    if config.scaling.enabled {
        let engine = ScalingRuleEngine::new(config.scaling.rules.clone());
        tasks.push(tokio::spawn(engine.run(
            balancer.clone(),
            Duration::from_secs(config.scaling.interval_secs),
            shutdown.subscribe(),
            log_decision,
        )));
    }

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address)
            .await
            .with_context(|| format!("binding admin API to {}", config.admin.bind_address))?;
        let state = AppState::new(balancer.clone(), config.admin.api_key.as_str())
            .with_probe(probe.clone());
        let admin_shutdown = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }));
    }

    // Dropping the watcher stops it, so it lives until main returns.
    let _watcher = if args.no_watch {
        None
    } else {
        let (watcher, updates) = ConfigWatcher::new(&args.config);
        let watcher = watcher.run()?;
        tasks.push(tokio::spawn(apply_reloads(
            config,
            updates,
            balancer.clone(),
            probe.clone(),
            shutdown.clone(),
        )));
        Some(watcher)
    };

    wait_for_signal().await;
    tracing::info!("Shutting down");
    shutdown.trigger();
    balancer.stop();

    for task in tasks {
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            tracing::warn!("Background task did not stop within the grace period");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn log_decision(decision: ScalingDecision) {
    tracing::warn!(
        rule = %decision.rule,
        action = %decision.action,
        condition = ?decision.condition,
        "Scaling decision"
    );
}

/// Apply backend membership changes from reloaded configs.
async fn apply_reloads(
    mut current: BalancerConfig,
    mut updates: mpsc::UnboundedReceiver<BalancerConfig>,
    balancer: Arc<LoadBalancer>,
    probe: Arc<HttpProbe>,
    shutdown: Shutdown,
) {
    let mut stop = shutdown.subscribe();
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(next) = update else { break };
                if next.routing != current.routing
                    || next.health != current.health
                    || next.circuit_breaker != current.circuit_breaker
                {
                    tracing::warn!("Only backend membership is applied on reload; other changes need a restart");
                }
                reconcile_backends(&balancer, Some(&*probe), &next.backends);
                current = next;
            }
            _ = stop.recv() => break,
        }
    }
}
