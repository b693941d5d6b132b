//! Service generation.
//!
//! - **Redis headless Service**: stable per-pod DNS for the StatefulSet; the
//!   operator and Sentinels address Redis pods by IP, clients go through
//!   Sentinel.
//! - **Sentinel Service**: ClusterIP endpoint clients query for the current
//!   master address.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::{REDIS_PORT, RedisFailover, SENTINEL_PORT};
use crate::resources::common::{
    REDIS_COMPONENT, SENTINEL_COMPONENT, owner_reference, redis_labels, redis_name,
    selector_labels, sentinel_labels, sentinel_name,
};

/// Generate the headless Service in front of the Redis StatefulSet.
pub fn generate_redis_headless_service(resource: &RedisFailover) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(redis_name(resource)),
            namespace: resource.namespace(),
            labels: Some(redis_labels(resource)),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            // Pods must be resolvable while replication is still syncing
            publish_not_ready_addresses: Some(true),
            selector: Some(selector_labels(resource, REDIS_COMPONENT)),
            ports: Some(vec![ServicePort {
                port: i32::from(REDIS_PORT),
                target_port: Some(IntOrString::String("redis".to_string())),
                name: Some("redis".to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the Sentinel Service.
pub fn generate_sentinel_service(resource: &RedisFailover) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(sentinel_name(resource)),
            namespace: resource.namespace(),
            labels: Some(sentinel_labels(resource)),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(resource, SENTINEL_COMPONENT)),
            ports: Some(vec![ServicePort {
                port: i32::from(SENTINEL_PORT),
                target_port: Some(IntOrString::String("sentinel".to_string())),
                name: Some("sentinel".to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
