//! redis-failover-operator - a Kubernetes operator for Sentinel-managed Redis.
//!
//! This is the main entry point that:
//! - Parses flags and environment
//! - Initializes structured logging
//! - Creates the Kubernetes client
//! - Runs leader election (optional, required for HA deployments)
//! - Starts the controller and the health/metrics server
//!
//! Exit codes: 0 clean shutdown, 1 startup failure, 2 lost leadership.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::Client;
use kube::config::{Config, KubeConfigOptions, Kubeconfig};
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tracing::{error, info, warn};

use redis_failover_operator::health::{HealthState, run_health_server};
use redis_failover_operator::{ControllerSettings, run_controller_with};

/// Lease configuration
const LEASE_NAME: &str = "redis-failover-operator-leader";
const LEASE_TTL_SECS: u64 = 15;
const LEASE_RENEW_INTERVAL_SECS: u64 = 5;

/// Exit code signalling lost leadership so the orchestrator restarts us.
const EXIT_LOST_LEADERSHIP: i32 = 2;

/// Grace period for in-flight reconciliations to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

/// Operator for highly-available Redis with Sentinel.
#[derive(Parser, Debug)]
#[command(name = "redis-failover-operator", version, about)]
struct Cli {
    /// Path to a kubeconfig file; defaults to in-cluster or local config.
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Enable leader election (required when running more than one replica).
    #[arg(long)]
    leader_election: bool,

    /// Address for the health and metrics endpoints.
    #[arg(long, default_value = ":9710")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Maximum number of resources reconciled in parallel.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Seconds between periodic reconciliations of a healthy resource.
    #[arg(long, default_value_t = 30)]
    resync_period: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("redis_failover_operator={}", cli.log_level).parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .json()
        .init();

    info!("Starting redis-failover-operator");

    let metrics_addr = parse_metrics_addr(&cli.metrics_addr)?;

    // Create Kubernetes client with bounded per-call timeouts
    let mut config = match cli.kubeconfig {
        Some(ref path) => {
            let kubeconfig = Kubeconfig::read_from(path)?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
        }
        None => Config::infer().await?,
    };
    config.connect_timeout = Some(Duration::from_secs(30));
    config.read_timeout = Some(Duration::from_secs(30));
    let client = Client::try_from(config)?;
    info!("Connected to Kubernetes cluster");

    // Watch scope from the environment; empty means cluster-wide
    let namespace = std::env::var("NAMESPACE").ok().filter(|ns| !ns.is_empty());
    let label_selector = std::env::var("WATCH_LABEL_SELECTOR")
        .ok()
        .filter(|sel| !sel.is_empty());

    let settings = ControllerSettings {
        namespace,
        label_selector,
        concurrency: cli.concurrency,
        resync_period: Duration::from_secs(cli.resync_period),
    };

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Start health server immediately (probes should work even as non-leader)
    let health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, metrics_addr).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let lease_renewal_handle = if cli.leader_election {
        Some(acquire_leadership(client.clone()).await)
    } else {
        info!("Leader election disabled");
        None
    };

    // Start controller (only runs as leader when election is enabled)
    let controller_handle = {
        let health_state = health_state.clone();
        let controller_client = client.clone();
        tokio::spawn(async move {
            run_controller_with(controller_client, Some(health_state), settings).await;
        })
    };

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!("Controller task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        // Lease renewal task only exits via process::exit() or panic
        result = async {
            match lease_renewal_handle {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        } => {
            if let Err(e) = result {
                error!("Lease renewal task panicked: {}", e);
            }
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready to stop receiving new work
            health_state.set_ready(false).await;
            info!("Marked operator as not ready");

            // Give in-flight reconciliations time to complete
            info!(
                "Waiting {}s for in-flight reconciliations to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Operator stopped");
    Ok(())
}

/// Block until leadership is acquired, then return the renewal task.
///
/// Losing the lease terminates the process with exit code 2 so the
/// orchestrator restarts it into a fresh election.
async fn acquire_leadership(client: Client) -> tokio::task::JoinHandle<()> {
    let pod_name = std::env::var("POD_NAME").unwrap_or_else(|_| {
        warn!("POD_NAME not set, using hostname");
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    });
    let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| {
        warn!("POD_NAMESPACE not set, using 'default'");
        "default".to_string()
    });

    info!(
        holder_id = %pod_name,
        namespace = %namespace,
        lease_name = LEASE_NAME,
        "Initializing leader election"
    );

    let params = || LeaseLockParams {
        holder_id: pod_name.clone(),
        lease_name: LEASE_NAME.to_string(),
        lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
    };

    let lease_lock = LeaseLock::new(client.clone(), &namespace, params());

    info!("Waiting to acquire leadership...");
    loop {
        match lease_lock.try_acquire_or_renew().await {
            Ok(result) => {
                if result.acquired_lease {
                    info!("Acquired leadership");
                    break;
                }
                info!("Another instance is leader, waiting...");
            }
            Err(e) => {
                warn!("Failed to acquire lease: {}, retrying...", e);
            }
        }
        tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;
    }

    // Renewal task keeps the lease alive for the lifetime of the process
    let lease_lock = LeaseLock::new(client, &namespace, params());

    #[allow(clippy::exit)]
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;

            match lease_lock.try_acquire_or_renew().await {
                Ok(result) => {
                    if !result.acquired_lease {
                        error!("Lost leadership! Shutting down...");
                        std::process::exit(EXIT_LOST_LEADERSHIP);
                    }
                }
                Err(e) => {
                    error!("Failed to renew lease: {}. Shutting down...", e);
                    std::process::exit(EXIT_LOST_LEADERSHIP);
                }
            }
        }
    })
}

/// Parse a listen address, accepting the `:port` shorthand.
fn parse_metrics_addr(addr: &str) -> Result<SocketAddr, std::net::AddrParseError> {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}").parse()
    } else {
        addr.parse()
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the operator cannot shut
/// down gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
