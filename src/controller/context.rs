//! Shared context for the controller.
//!
//! Holds the Kubernetes client, the event recorder identity, the health
//! state, and the per-resource failure counters behind the error backoff.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource};
use tokio::sync::Semaphore;

use crate::controller::error::Error;
use crate::crd::RedisFailover;
use crate::health::HealthState;

/// Field manager name for server-side apply.
pub const FIELD_MANAGER: &str = "redis-failover-operator";

/// Default number of resources reconciled in parallel.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default resync period.
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(30);

/// Key within the auth secret holding the password.
const AUTH_SECRET_KEY: &str = "password";

/// Shared context for the controller.
pub struct Context {
    /// Kubernetes client.
    pub client: Client,
    /// Event reporter identity.
    reporter: Reporter,
    /// Optional health state for metrics and readiness.
    pub health_state: Option<Arc<HealthState>>,
    /// Bounds cross-resource reconcile parallelism.
    pub reconcile_permits: Semaphore,
    /// Interval between periodic reconciliations of a healthy resource.
    pub resync_period: Duration,
    /// Consecutive failure counts per resource key, for backoff.
    failures: Mutex<HashMap<String, u32>>,
}

impl Context {
    /// Create a new context.
    pub fn new(client: Client, health_state: Option<Arc<HealthState>>) -> Self {
        Self::with_settings(client, health_state, DEFAULT_CONCURRENCY, DEFAULT_RESYNC_PERIOD)
    }

    /// Create a context with explicit concurrency and resync settings.
    pub fn with_settings(
        client: Client,
        health_state: Option<Arc<HealthState>>,
        concurrency: usize,
        resync_period: Duration,
    ) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
            health_state,
            reconcile_permits: Semaphore::new(concurrency.max(1)),
            resync_period,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Create an event recorder for publishing Kubernetes events.
    fn recorder(&self) -> Recorder {
        Recorder::new(self.client.clone(), self.reporter.clone())
    }

    /// Publish a normal event for a RedisFailover resource.
    pub async fn publish_normal_event(
        &self,
        resource: &RedisFailover,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish_event(resource, EventType::Normal, reason, action, note)
            .await;
    }

    /// Publish a warning event for a RedisFailover resource.
    pub async fn publish_warning_event(
        &self,
        resource: &RedisFailover,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish_event(resource, EventType::Warning, reason, action, note)
            .await;
    }

    async fn publish_event(
        &self,
        resource: &RedisFailover,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let recorder = self.recorder();
        let object_ref = resource.object_ref(&());
        if let Err(e) = recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.into(),
                    note,
                    action: action.into(),
                    secondary: None,
                },
                &object_ref,
            )
            .await
        {
            tracing::warn!(reason = %reason, error = %e, "Failed to publish event");
        }
    }

    /// Retrieve the password from the auth secret, if the spec names one.
    pub async fn get_auth_password(
        &self,
        resource: &RedisFailover,
        namespace: &str,
    ) -> Result<Option<String>, Error> {
        let Some(auth) = resource.spec.auth.as_ref() else {
            return Ok(None);
        };

        let secret_api: Api<k8s_openapi::api::core::v1::Secret> =
            Api::namespaced(self.client.clone(), namespace);

        match secret_api.get(&auth.secret_path).await {
            Ok(secret) => {
                if let Some(data) = secret.data
                    && let Some(password_bytes) = data.get(AUTH_SECRET_KEY)
                {
                    let password = String::from_utf8(password_bytes.0.clone()).map_err(|e| {
                        Error::Validation(format!("Invalid password encoding: {}", e))
                    })?;
                    return Ok(Some(password));
                }
                Err(Error::MissingField(format!(
                    "secret {} has no {} key",
                    auth.secret_path, AUTH_SECRET_KEY
                )))
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Err(Error::MissingField(format!(
                "auth secret {} not found",
                auth.secret_path
            ))),
            Err(e) => Err(Error::Kube(e)),
        }
    }

    /// Record a failed reconciliation; returns the new consecutive count.
    pub fn record_failure(&self, key: &str) -> u32 {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let count = failures.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Reset the failure counter after a successful reconciliation.
    pub fn reset_failures(&self, key: &str) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.remove(key);
    }
}
