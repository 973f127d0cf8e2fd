//! nlb-control - Load balancer control plane
//!
//! This is the composition root that wires together all the components.
//! The role is taken from the first argument or `NLB_ROLE`.

use anyhow::Context;
use nlb_control::adapters::inbound::{AgentApi, AgentState, DnsServer, EventApi, EventState, EventTimeouts};
use nlb_control::adapters::outbound::{
    AgentCommandChannel, CommandReloader, DashMapDnsDirectory, HttpHealthProbe, PlatformClient,
};
use nlb_control::application::{
    BackendDirectoryService, ClusterChangeReconciler, ClusterReconcilerConfig, DnsPublisher,
    ScalingLifecycleReconciler, TaggedAliases,
};
use nlb_control::config::{load_config, Config};
use nlb_control::infrastructure::{shutdown_signal, Deadline, HealthChecker, ShutdownController};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

/// How long in-flight invocations get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// One-shot backend directory rebuild
    Rebuild,
    /// Per-node agent: rebuild, then serve health and commands
    Agent,
    /// Event triggers and the fleet DNS zone
    Controller,
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rebuild" => Ok(Role::Rebuild),
            "agent" => Ok(Role::Agent),
            "controller" => Ok(Role::Controller),
            other => anyhow::bail!("unknown role {:?}: expected rebuild, agent or controller", other),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let role: Role = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("NLB_ROLE").ok())
        .unwrap_or_else(|| "rebuild".to_string())
        .parse()?;

    tracing::info!(
        "starting nlb-control role={:?} cluster={} region={}",
        role,
        cfg.cluster,
        cfg.region
    );

    match role {
        Role::Rebuild => run_rebuild(&cfg).await,
        Role::Agent => run_agent(&cfg).await,
        Role::Controller => run_controller(&cfg).await,
    }
}

fn directory_service(cfg: &Config) -> anyhow::Result<BackendDirectoryService> {
    anyhow::ensure!(
        !cfg.cluster.is_empty(),
        "cluster is unknown: set NLB_CLUSTER or write {}/.cluster",
        cfg.bootstrap_dir
    );

    let platform = Arc::new(PlatformClient::new(&cfg.platform_api)?);
    let reloader = Arc::new(CommandReloader::new(&cfg.reload_command)?);

    Ok(BackendDirectoryService::new(
        cfg.cluster.clone(),
        platform,
        reloader,
        PathBuf::from(&cfg.config_path),
    ))
}

async fn run_rebuild(cfg: &Config) -> anyhow::Result<()> {
    let service = directory_service(cfg)?;
    let outcome = service
        .rebuild()
        .await
        .context("rebuild failed, previous configuration kept")?;
    tracing::info!(?outcome, "rebuild finished");
    Ok(())
}

async fn run_agent(cfg: &Config) -> anyhow::Result<()> {
    let state = AgentState::new(Arc::new(directory_service(cfg)?));

    // Initial install; health stays unavailable until one succeeds.
    if !state.rebuild().await {
        tracing::warn!("initial rebuild failed, serving health as unavailable");
    }

    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let api = AgentApi::new(cfg.agent_listen_addr.clone(), state);
    api.run(shutdown.clone()).await?;

    shutdown.wait_for_drain(DRAIN_TIMEOUT).await;
    tracing::info!("agent stopped");
    Ok(())
}

async fn run_controller(cfg: &Config) -> anyhow::Result<()> {
    // ===== COMPOSITION ROOT =====

    let group = cfg
        .auto_scaling_group
        .clone()
        .context("NLB_AUTO_SCALING_GROUP is required for the controller")?;
    let zone = cfg.zone().context("NLB_DNS_DOMAIN is required for the controller")?;
    let names = cfg
        .fleet_names()
        .context("NLB_DNS_DOMAIN is required for the controller")?;

    // 1. Outbound adapters
    let platform = Arc::new(PlatformClient::new(&cfg.platform_api)?);
    let dns = Arc::new(DashMapDnsDirectory::new(zone.clone()));
    let probe = Arc::new(HttpHealthProbe::new(
        cfg.health_port,
        &cfg.health_path,
        cfg.health_timeout(),
    )?);
    let commands = Arc::new(AgentCommandChannel::new(platform.clone(), cfg.agent_port)?);

    let aliases = cfg.alias_names([]);
    tracing::info!(public = %names.public, private = %names.private, aliases = aliases.len(), "fleet names");

    // 2. Application services
    let mut publisher = DnsPublisher::new(dns.clone(), names, aliases, cfg.dns_ttl_secs);
    // Service subdomain tags are re-read on every publication
    match cfg.dns_domain.clone() {
        Some(domain) if !cfg.cluster.is_empty() => {
            publisher = publisher.with_tagged_aliases(TaggedAliases::new(
                platform.clone(),
                cfg.cluster.clone(),
                domain,
                zone.clone(),
            ));
        }
        _ => {}
    }
    let health = HealthChecker::new(cfg.health_check_config(), probe);
    let lifecycle = Arc::new(ScalingLifecycleReconciler::new(
        group.clone(),
        platform.clone(),
        health,
        publisher,
    ));
    let cluster = Arc::new(ClusterChangeReconciler::new(
        ClusterReconcilerConfig {
            cluster: cfg.cluster.clone(),
            group,
            poll_interval: cfg.command_poll_interval(),
            fanout_limit: cfg.fanout_limit,
        },
        platform.clone(),
        commands,
    ));

    // Seed the zone from the current fleet
    if let Err(e) = lifecycle.resync(Deadline::after(cfg.terminate_timeout())).await {
        tracing::error!("initial fleet publication failed: {}", e);
    }

    // 3. Inbound adapters
    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let timeouts = EventTimeouts {
        task_change: cfg.task_change_timeout(),
        launch: cfg.launch_timeout(),
        terminate: cfg.terminate_timeout(),
    };
    let events = EventApi::new(
        cfg.events_listen_addr.clone(),
        EventState::new(cluster, lifecycle, timeouts, shutdown.clone()),
    );
    let dns_server = DnsServer::new(cfg.dns_listen_addr.clone(), zone, dns);

    tokio::try_join!(events.run(), dns_server.run(shutdown.clone()))?;

    shutdown.wait_for_drain(DRAIN_TIMEOUT).await;
    tracing::info!("controller stopped");
    Ok(())
}
