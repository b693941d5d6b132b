//! redis-failover-operator library crate
//!
//! This module exports the controller, CRD definitions, resource generators,
//! and the Redis/Sentinel admin client.

pub mod client;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;

pub use health::HealthState;

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, metadata_watcher, predicates, reflector, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use controller::context::{Context, DEFAULT_CONCURRENCY, DEFAULT_RESYNC_PERIOD};
use controller::reconciler::reconcile;
use crd::RedisFailover;

/// Runtime settings for the controller loop.
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    /// Namespace to watch; `None` watches cluster-wide.
    pub namespace: Option<String>,
    /// Optional label selector restricting which RedisFailovers are watched.
    pub label_selector: Option<String>,
    /// Maximum number of resources reconciled in parallel.
    pub concurrency: usize,
    /// Interval between periodic reconciliations of a healthy resource.
    pub resync_period: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            namespace: None,
            label_selector: None,
            concurrency: DEFAULT_CONCURRENCY,
            resync_period: DEFAULT_RESYNC_PERIOD,
        }
    }
}

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Create the watcher configuration shared by all watches.
fn watcher_config(label_selector: Option<&str>) -> WatcherConfig {
    let config = WatcherConfig::default().any_semantic();
    match label_selector {
        Some(selector) => config.labels(selector),
        None => config,
    }
}

/// Create a filtered stream for the RedisFailover watch.
///
/// This creates a reflector-backed stream that:
/// - Maintains an in-memory cache via reflector
/// - Uses automatic retry with exponential backoff on errors
/// - Converts watch events to objects (Added/Modified only)
/// - Filters out status-only updates via generation predicate
///
/// Returns the reflector store (for cache lookups) and the filtered stream.
fn create_filtered_stream<K>(
    api: Api<K>,
    watcher_config: WatcherConfig,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation);
    (reader, stream)
}

/// Run the operator controller with default settings (cluster-wide).
pub async fn run_controller(client: Client, health_state: Option<Arc<HealthState>>) {
    run_controller_with(client, health_state, ControllerSettings::default()).await
}

/// Run the operator controller.
///
/// Watches RedisFailover resources in the configured scope and reconciles
/// them. Owned StatefulSets and Deployments trigger reconciliation through
/// full watches; Services and ConfigMaps only need existence signals, so
/// they use metadata watches to cut memory and IO.
pub async fn run_controller_with(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    settings: ControllerSettings,
) {
    let scope_msg = settings.namespace.as_deref().unwrap_or("cluster-wide");
    info!(
        scope = %scope_msg,
        concurrency = settings.concurrency,
        resync_secs = settings.resync_period.as_secs(),
        "Starting controller for RedisFailover resources"
    );

    // Mark as ready once we start the controller
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ctx = Arc::new(Context::with_settings(
        client.clone(),
        health_state,
        settings.concurrency,
        settings.resync_period,
    ));

    let namespace = settings.namespace.as_deref();
    let failovers: Api<RedisFailover> = scoped_api(client.clone(), namespace);
    let statefulsets: Api<StatefulSet> = scoped_api(client.clone(), namespace);
    let deployments: Api<Deployment> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client.clone(), namespace);
    let configmaps: Api<ConfigMap> = scoped_api(client.clone(), namespace);

    // The label selector only filters the root resources; owned objects are
    // matched through owner references.
    let root_config = watcher_config(settings.label_selector.as_deref());
    let owned_config = watcher_config(None);

    let (reader, resource_stream) = create_filtered_stream(failovers, root_config);

    Controller::for_stream(resource_stream, reader)
        .owns(statefulsets, owned_config.clone())
        .owns(deployments, owned_config.clone())
        .owns_stream(metadata_watcher(services, owned_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(configmaps, owned_config).touched_objects())
        .run(reconcile, controller::reconciler::error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // ObjectNotFound/NotFound errors are expected after deletion
                    // when related watch events trigger reconciliation for a
                    // deleted object.
                    let is_not_found = match &e {
                        kube::runtime::controller::Error::ObjectNotFound(_) => true,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) => {
                            err.is_not_found()
                        }
                        _ => false,
                    };
                    if is_not_found {
                        debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    error!("Controller stream ended unexpectedly");
}
