//! ConfigMap generation for Redis and Sentinel.
//!
//! Three maps per RedisFailover:
//! - Redis config (`redis.conf`: base config plus user directives)
//! - Redis shutdown script (mounted executable, triggers a Sentinel failover
//!   before a master pod terminates)
//! - Sentinel config (`sentinel.conf`: bootstrap monitor entry; Sentinel
//!   rewrites it at runtime)

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{MONITORED_MASTER_NAME, REDIS_PORT, RedisFailover, SENTINEL_PORT};
use crate::resources::common::{
    owner_reference, redis_labels, redis_name, redis_shutdown_configmap_name, sentinel_labels,
    sentinel_name,
};

/// Generate the Redis ConfigMap.
///
/// The base config keeps Redis replication-friendly; user directives are
/// appended verbatim and win on conflict (last directive wins in redis.conf).
pub fn generate_redis_configmap(resource: &RedisFailover) -> ConfigMap {
    let mut config = vec![
        format!("port {REDIS_PORT}"),
        "tcp-keepalive 60".to_string(),
        "save 900 1".to_string(),
        "save 300 10".to_string(),
    ];
    config.extend(resource.spec.redis.custom_config.iter().cloned());

    let mut data = BTreeMap::new();
    data.insert("redis.conf".to_string(), config.join("\n"));

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(redis_name(resource)),
            namespace: resource.namespace(),
            labels: Some(redis_labels(resource)),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Generate the Redis shutdown ConfigMap.
///
/// The script runs as a preStop hook. A terminating master saves its dataset
/// and asks a Sentinel to fail over before the process goes away, so the
/// replacement pod comes back as a slave of the promoted replica.
pub fn generate_redis_shutdown_configmap(resource: &RedisFailover) -> ConfigMap {
    let sentinel_svc = sentinel_name(resource);
    let script = format!(
        r#"#!/bin/sh
master=$(redis-cli -h {sentinel_svc} -p {SENTINEL_PORT} --csv SENTINEL get-master-addr-by-name {MONITORED_MASTER_NAME} | tr ',' ' ' | tr -d '"' | cut -d' ' -f1)
redis-cli SAVE
if [ "$master" = "$(hostname -i)" ]; then
  redis-cli -h {sentinel_svc} -p {SENTINEL_PORT} SENTINEL failover {MONITORED_MASTER_NAME}
fi
"#
    );

    let mut data = BTreeMap::new();
    data.insert("shutdown.sh".to_string(), script);

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(redis_shutdown_configmap_name(resource)),
            namespace: resource.namespace(),
            labels: Some(redis_labels(resource)),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Generate the Sentinel ConfigMap.
///
/// The monitor entry points at a placeholder; the operator rewires every
/// Sentinel at runtime once the real master is known.
pub fn generate_sentinel_configmap(resource: &RedisFailover) -> ConfigMap {
    let quorum = resource.spec.sentinel.quorum();
    let config = format!(
        "sentinel monitor {MONITORED_MASTER_NAME} 127.0.0.1 {REDIS_PORT} {quorum}\n\
         sentinel down-after-milliseconds {MONITORED_MASTER_NAME} 5000\n\
         sentinel failover-timeout {MONITORED_MASTER_NAME} 10000\n\
         sentinel parallel-syncs {MONITORED_MASTER_NAME} 2\n"
    );

    let mut data = BTreeMap::new();
    data.insert("sentinel.conf".to_string(), config);

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(sentinel_name(resource)),
            namespace: resource.namespace(),
            labels: Some(sentinel_labels(resource)),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}
