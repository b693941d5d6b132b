//! RedisFailover Custom Resource Definition.
//!
//! Declares a highly-available Redis replication group fronted by a Sentinel
//! quorum. The operator drives the cluster toward exactly one master, all
//! other Redises replicating from it, and every Sentinel monitoring it.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, PersistentVolumeClaim};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// RedisFailover is a custom resource for deploying Sentinel-managed Redis.
///
/// Example:
/// ```yaml
/// apiVersion: redisfailover.dev/v1
/// kind: RedisFailover
/// metadata:
///   name: my-failover
/// spec:
///   redis:
///     replicas: 3
///   sentinel:
///     replicas: 3
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "redisfailover.dev",
    version = "v1",
    kind = "RedisFailover",
    plural = "redisfailovers",
    shortname = "rf",
    status = "RedisFailoverStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Redis", "type":"integer", "jsonPath":".spec.redis.replicas"}"#,
    printcolumn = r#"{"name":"Sentinels", "type":"integer", "jsonPath":".spec.sentinel.replicas"}"#,
    printcolumn = r#"{"name":"Master", "type":"string", "jsonPath":".status.masterIP"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisFailoverSpec {
    /// Redis replication group settings.
    #[serde(default)]
    pub redis: RedisSettings,

    /// Sentinel quorum settings.
    #[serde(default)]
    pub sentinel: SentinelSettings,

    /// Additional labels applied to every managed resource.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Authentication configuration. When set, Redis and Sentinel require
    /// the password stored in the referenced secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSettings>,
}

impl Default for RedisFailoverSpec {
    fn default() -> Self {
        Self {
            redis: RedisSettings::default(),
            sentinel: SentinelSettings::default(),
            labels: BTreeMap::new(),
            auth: None,
        }
    }
}

/// Settings for the Redis replication group.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisSettings {
    /// Number of Redis instances (minimum 3, odd preferred).
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Redis container image.
    #[serde(default = "default_redis_image")]
    pub image: String,

    /// Resource requests and limits for Redis pods.
    #[serde(default)]
    pub resources: ResourceRequirementsSpec,

    /// Storage configuration for /data.
    #[serde(default)]
    pub storage: RedisStorage,

    /// Extra Redis directives applied at runtime via CONFIG SET and
    /// rendered into the generated redis.conf.
    #[serde(default)]
    pub custom_config: Vec<String>,

    /// Container command override. When non-empty it replaces the default
    /// command entirely.
    #[serde(default)]
    pub command: Vec<String>,

    /// Annotations added to Redis pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_annotations: Option<BTreeMap<String, String>>,

    /// Run a redis-exporter sidecar next to each Redis container.
    #[serde(default)]
    pub exporter: bool,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            image: default_redis_image(),
            resources: ResourceRequirementsSpec::default(),
            storage: RedisStorage::default(),
            custom_config: Vec::new(),
            command: Vec::new(),
            pod_annotations: None,
            exporter: false,
        }
    }
}

/// Settings for the Sentinel quorum.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SentinelSettings {
    /// Number of Sentinel instances (minimum 3, odd preferred).
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Sentinel container image.
    #[serde(default = "default_redis_image")]
    pub image: String,

    /// Resource requests and limits for Sentinel pods.
    #[serde(default)]
    pub resources: ResourceRequirementsSpec,

    /// Extra Sentinel directives applied via SENTINEL SET and rendered
    /// into the generated sentinel.conf.
    #[serde(default)]
    pub custom_config: Vec<String>,

    /// Container command override. When non-empty it replaces the default
    /// command entirely.
    #[serde(default)]
    pub command: Vec<String>,

    /// Annotations added to Sentinel pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_annotations: Option<BTreeMap<String, String>>,
}

impl Default for SentinelSettings {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            image: default_redis_image(),
            resources: ResourceRequirementsSpec::default(),
            custom_config: Vec::new(),
            command: Vec::new(),
            pod_annotations: None,
        }
    }
}

impl SentinelSettings {
    /// Quorum required to agree on a failover: a strict majority.
    pub fn quorum(&self) -> i32 {
        self.replicas / 2 + 1
    }
}

fn default_replicas() -> i32 {
    3
}

fn default_redis_image() -> String {
    "redis:7-alpine".to_string()
}

/// Storage configuration for the Redis data directory.
///
/// Exactly one of `empty_dir` or `persistent_volume_claim` may be set.
/// When neither is set an empty `emptyDir` is used.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisStorage {
    /// Keep the persistent volume claims when the RedisFailover is deleted.
    #[serde(default)]
    pub keep_after_deletion: bool,

    /// Ephemeral storage, optionally memory-backed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDirVolumeSource>,

    /// Claim template appended to the StatefulSet volumeClaimTemplates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaim>,
}

/// Authentication configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthSettings {
    /// Name of a Secret whose `password` key holds the Redis password.
    pub secret_path: String,
}

/// Resource requests and limits for managed pods.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsSpec {
    /// CPU and memory requests.
    #[serde(default)]
    pub requests: ResourceSpec,

    /// CPU and memory limits.
    #[serde(default)]
    pub limits: ResourceSpec,
}

/// A cpu/memory pair; empty strings mean "unset".
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(default)]
    pub cpu: String,

    #[serde(default)]
    pub memory: String,
}

/// Status of a RedisFailover.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisFailoverStatus {
    /// Current lifecycle phase.
    #[serde(default)]
    pub phase: Phase,

    /// IP of the Redis currently acting as master, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_ip: Option<String>,

    /// The generation most recently observed by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Lifecycle phase of a RedisFailover.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum Phase {
    /// Initial state, waiting for reconciliation.
    #[default]
    Pending,
    /// Topology converged: one master, replication and Sentinels in sync.
    Running,
    /// Cluster reachable but not yet converged.
    Degraded,
    /// Spec invalid or the cluster requires intervention.
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Pending => write!(f, "Pending"),
            Phase::Running => write!(f, "Running"),
            Phase::Degraded => write!(f, "Degraded"),
            Phase::Failed => write!(f, "Failed"),
        }
    }
}

/// Condition describes the state of a RedisFailover at a certain point.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition.
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: jiff::Timestamp::now().to_string(),
            observed_generation: generation,
        }
    }

    /// Create a "Ready" condition.
    pub fn ready(ready: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Ready", ready, reason, message, generation)
    }

    /// Create a "Progressing" condition.
    pub fn progressing(
        progressing: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self::new("Progressing", progressing, reason, message, generation)
    }

    /// Create a "Degraded" condition.
    pub fn degraded(degraded: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Degraded", degraded, reason, message, generation)
    }
}

/// Default client port for Redis.
pub const REDIS_PORT: u16 = 6379;

/// Default client port for Sentinel.
pub const SENTINEL_PORT: u16 = 26379;

/// Name under which Sentinels monitor the Redis master.
pub const MONITORED_MASTER_NAME: &str = "mymaster";
