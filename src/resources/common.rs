//! Common resource generation utilities.
//!
//! Naming, labels, owner references, and the template hash that drives
//! operator-controlled rolling updates.

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::RedisFailover;

/// Label carrying the hash of the pod template a pod was created from.
/// Pods whose label differs from the current StatefulSet hash are stale.
pub const DEPLOYMENT_VERSION_LABEL: &str = "deployment-version";

/// Component label value for Redis workloads.
pub const REDIS_COMPONENT: &str = "redis";

/// Component label value for Sentinel workloads.
pub const SENTINEL_COMPONENT: &str = "sentinel";

/// part-of label value shared by every managed resource.
const PART_OF: &str = "redis-failover";

/// Name of the Redis StatefulSet, ConfigMap, and headless Service.
pub fn redis_name(resource: &RedisFailover) -> String {
    format!("rfr-{}", resource.name_any())
}

/// Name of the Sentinel Deployment, ConfigMap, and Service.
pub fn sentinel_name(resource: &RedisFailover) -> String {
    format!("rfs-{}", resource.name_any())
}

/// Name of the ConfigMap holding the Redis shutdown script.
pub fn redis_shutdown_configmap_name(resource: &RedisFailover) -> String {
    format!("rfr-s-{}", resource.name_any())
}

/// Create owner reference for a RedisFailover.
///
/// Every generated object carries this reference so deletion of the root
/// cascades to its children.
pub fn owner_reference(resource: &RedisFailover) -> OwnerReference {
    OwnerReference {
        api_version: "redisfailover.dev/v1".to_string(),
        kind: "RedisFailover".to_string(),
        name: resource.name_any(),
        uid: resource.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Labels for Redis workload objects and pods.
pub fn redis_labels(resource: &RedisFailover) -> BTreeMap<String, String> {
    component_labels(resource, REDIS_COMPONENT, redis_template_hash(resource))
}

/// Labels for Sentinel workload objects and pods.
pub fn sentinel_labels(resource: &RedisFailover) -> BTreeMap<String, String> {
    component_labels(resource, SENTINEL_COMPONENT, sentinel_template_hash(resource))
}

/// Merge user labels with the operator-required set.
///
/// Operator labels take precedence, with one exception: a user-supplied
/// `deployment-version` overrides the computed hash.
fn component_labels(
    resource: &RedisFailover,
    component: &str,
    template_hash: String,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(DEPLOYMENT_VERSION_LABEL.to_string(), template_hash);

    for (key, value) in &resource.spec.labels {
        labels.insert(key.clone(), value.clone());
    }

    labels.insert(
        "app.kubernetes.io/name".to_string(),
        resource.name_any(),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        component.to_string(),
    );
    labels.insert("app.kubernetes.io/part-of".to_string(), PART_OF.to_string());

    labels
}

/// Selector labels (the stable subset used by services, PDBs, and pod
/// listing; excludes the template hash so selectors survive rollouts).
pub fn selector_labels(resource: &RedisFailover, component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        resource.name_any(),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        component.to_string(),
    );
    labels
}

/// Label selector string for listing pods of one component.
pub fn selector_string(resource: &RedisFailover, component: &str) -> String {
    format!(
        "app.kubernetes.io/name={},app.kubernetes.io/component={}",
        resource.name_any(),
        component
    )
}

/// Hash of the fields that shape the Redis pod template.
///
/// Stored as the `deployment-version` label on the StatefulSet and its pods;
/// a pod whose label no longer matches must be replaced. DefaultHasher uses
/// fixed keys, so the value is stable across operator restarts.
pub fn redis_template_hash(resource: &RedisFailover) -> String {
    let redis = &resource.spec.redis;
    let rendered = serde_json::to_string(&(
        &redis.image,
        &redis.resources,
        &redis.command,
        &redis.custom_config,
        &redis.pod_annotations,
        redis.exporter,
    ))
    .unwrap_or_default();
    hash_string(&rendered)
}

/// Hash of the fields that shape the Sentinel pod template.
pub fn sentinel_template_hash(resource: &RedisFailover) -> String {
    let sentinel = &resource.spec.sentinel;
    let rendered = serde_json::to_string(&(
        &sentinel.image,
        &sentinel.resources,
        &sentinel.command,
        &sentinel.custom_config,
        &sentinel.pod_annotations,
    ))
    .unwrap_or_default();
    hash_string(&rendered)
}

fn hash_string(input: &str) -> String {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
