//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 when ready to serve traffic)
//! - `/metrics` - Prometheus metrics endpoint

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

/// Labels for per-resource metrics (namespace + name)
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ResourceLabels {
    pub namespace: String,
    pub name: String,
}

impl EncodeLabelSet for ResourceLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for errors-by-kind metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct KindLabels {
    pub kind: String,
}

impl EncodeLabelSet for KindLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for heal-actions-by-type metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ActionLabels {
    pub action: String,
}

impl EncodeLabelSet for ActionLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("action", self.action.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the operator
pub struct Metrics {
    /// Total reconciliations counter
    pub reconciliations_total: Family<ResourceLabels, Counter>,
    /// Reconciliation errors by kind
    pub reconciliation_errors_total: Family<KindLabels, Counter>,
    /// Heal actions by type
    pub heal_actions_total: Family<ActionLabels, Counter>,
    /// Reconciliation duration histogram
    pub reconcile_duration_seconds: Family<ResourceLabels, Histogram>,
    /// Masters observed per resource during the last pass
    pub masters_seen: Family<ResourceLabels, Gauge>,
    /// Sentinels that passed every check during the last pass
    pub sentinels_healthy: Family<ResourceLabels, Gauge>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let reconciliations_total = Family::<ResourceLabels, Counter>::default();
        registry.register(
            "redisfailover_reconciliations",
            "Total number of reconciliations",
            reconciliations_total.clone(),
        );

        let reconciliation_errors_total = Family::<KindLabels, Counter>::default();
        registry.register(
            "redisfailover_reconciliation_errors",
            "Total number of reconciliation errors by kind",
            reconciliation_errors_total.clone(),
        );

        let heal_actions_total = Family::<ActionLabels, Counter>::default();
        registry.register(
            "redisfailover_heal_actions",
            "Total number of heal actions by type",
            heal_actions_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<ResourceLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "redisfailover_reconcile_duration_seconds",
            "Duration of reconciliation in seconds",
            reconcile_duration_seconds.clone(),
        );

        let masters_seen = Family::<ResourceLabels, Gauge>::default();
        registry.register(
            "redisfailover_masters_seen",
            "Redises reporting role master in the last pass",
            masters_seen.clone(),
        );

        let sentinels_healthy = Family::<ResourceLabels, Gauge>::default();
        registry.register(
            "redisfailover_sentinels_healthy",
            "Sentinels that passed every check in the last pass",
            sentinels_healthy.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            heal_actions_total,
            reconcile_duration_seconds,
            masters_seen,
            sentinels_healthy,
            registry,
        }
    }

    /// Record a successful reconciliation
    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        let labels = ResourceLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a reconciliation error by kind
    pub fn record_error(&self, kind: &str) {
        let labels = KindLabels {
            kind: kind.to_string(),
        };
        self.reconciliation_errors_total
            .get_or_create(&labels)
            .inc();
    }

    /// Record a heal action by type
    pub fn record_heal_action(&self, action: &str) {
        let labels = ActionLabels {
            action: action.to_string(),
        };
        self.heal_actions_total.get_or_create(&labels).inc();
    }

    /// Update per-resource convergence gauges
    pub fn set_convergence(
        &self,
        namespace: &str,
        name: &str,
        masters_seen: i64,
        sentinels_healthy: i64,
    ) {
        let labels = ResourceLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.masters_seen.get_or_create(&labels).set(masters_seen);
        self.sentinels_healthy
            .get_or_create(&labels)
            .set(sentinels_healthy);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the operator is ready (acquired leadership and running controller)
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the operator as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the operator is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on the given address
pub async fn run_health_server(
    state: Arc<HealthState>,
    addr: SocketAddr,
) -> Result<(), std::io::Error> {
    let app = create_router(state);

    info!(addr = %addr, "Starting health server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
