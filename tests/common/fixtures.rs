//! Test fixtures and builder patterns for RedisFailover.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, PersistentVolumeClaim};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use redis_failover_operator::crd::{
    AuthSettings, RedisFailover, RedisFailoverSpec, RedisStorage,
};

/// Builder for creating RedisFailover test fixtures.
///
/// # Example
/// ```
/// let resource = RedisFailoverBuilder::new("test-resource")
///     .namespace("test-ns")
///     .redis_replicas(3)
///     .sentinel_replicas(3)
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct RedisFailoverBuilder {
    name: String,
    namespace: Option<String>,
    redis_replicas: i32,
    sentinel_replicas: i32,
    labels: BTreeMap<String, String>,
    redis_command: Vec<String>,
    sentinel_command: Vec<String>,
    redis_pod_annotations: Option<BTreeMap<String, String>>,
    sentinel_pod_annotations: Option<BTreeMap<String, String>>,
    custom_config: Vec<String>,
    storage: RedisStorage,
    auth_secret: Option<String>,
    exporter: bool,
    uid: Option<String>,
}

impl RedisFailoverBuilder {
    /// Create a new builder with the given resource name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            redis_replicas: 3,
            sentinel_replicas: 3,
            labels: BTreeMap::new(),
            redis_command: Vec::new(),
            sentinel_command: Vec::new(),
            redis_pod_annotations: None,
            sentinel_pod_annotations: None,
            custom_config: Vec::new(),
            storage: RedisStorage::default(),
            auth_secret: None,
            exporter: false,
            uid: Some("test-uid".to_string()),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn redis_replicas(mut self, replicas: i32) -> Self {
        self.redis_replicas = replicas;
        self
    }

    pub fn sentinel_replicas(mut self, replicas: i32) -> Self {
        self.sentinel_replicas = replicas;
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn redis_command(mut self, command: Vec<String>) -> Self {
        self.redis_command = command;
        self
    }

    pub fn sentinel_command(mut self, command: Vec<String>) -> Self {
        self.sentinel_command = command;
        self
    }

    pub fn redis_pod_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.redis_pod_annotations = Some(annotations);
        self
    }

    pub fn sentinel_pod_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.sentinel_pod_annotations = Some(annotations);
        self
    }

    pub fn custom_config(mut self, config: Vec<String>) -> Self {
        self.custom_config = config;
        self
    }

    pub fn empty_dir(mut self, source: EmptyDirVolumeSource) -> Self {
        self.storage = RedisStorage {
            empty_dir: Some(source),
            ..Default::default()
        };
        self
    }

    pub fn persistent_volume_claim(mut self, pvc: PersistentVolumeClaim, keep: bool) -> Self {
        self.storage = RedisStorage {
            keep_after_deletion: keep,
            persistent_volume_claim: Some(pvc),
            ..Default::default()
        };
        self
    }

    pub fn auth_secret(mut self, name: impl Into<String>) -> Self {
        self.auth_secret = Some(name.into());
        self
    }

    pub fn exporter(mut self, exporter: bool) -> Self {
        self.exporter = exporter;
        self
    }

    /// Build the RedisFailover resource.
    pub fn build(self) -> RedisFailover {
        let mut spec = RedisFailoverSpec::default();
        spec.redis.replicas = self.redis_replicas;
        spec.redis.command = self.redis_command;
        spec.redis.pod_annotations = self.redis_pod_annotations;
        spec.redis.custom_config = self.custom_config;
        spec.redis.storage = self.storage;
        spec.redis.exporter = self.exporter;
        spec.sentinel.replicas = self.sentinel_replicas;
        spec.sentinel.command = self.sentinel_command;
        spec.sentinel.pod_annotations = self.sentinel_pod_annotations;
        spec.labels = self.labels;
        spec.auth = self.auth_secret.map(|secret_path| AuthSettings { secret_path });

        RedisFailover {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: self.namespace.or_else(|| Some("default".to_string())),
                uid: self.uid,
                ..Default::default()
            },
            spec,
            status: None,
        }
    }
}
