//! PodDisruptionBudget generation.
//!
//! One budget per workload. `minAvailable = replicas - 1` allows voluntary
//! disruptions to take out at most one pod at a time, which keeps the
//! Sentinel quorum and the replication chain intact during node drains.

use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::RedisFailover;
use crate::resources::common::{
    REDIS_COMPONENT, SENTINEL_COMPONENT, owner_reference, redis_labels, redis_name,
    selector_labels, sentinel_labels, sentinel_name,
};

/// Generate the PodDisruptionBudget for the Redis StatefulSet.
pub fn generate_redis_pdb(resource: &RedisFailover) -> PodDisruptionBudget {
    generate_pdb(
        resource,
        redis_name(resource),
        REDIS_COMPONENT,
        resource.spec.redis.replicas,
    )
}

/// Generate the PodDisruptionBudget for the Sentinel Deployment.
pub fn generate_sentinel_pdb(resource: &RedisFailover) -> PodDisruptionBudget {
    generate_pdb(
        resource,
        sentinel_name(resource),
        SENTINEL_COMPONENT,
        resource.spec.sentinel.replicas,
    )
}

fn generate_pdb(
    resource: &RedisFailover,
    name: String,
    component: &str,
    replicas: i32,
) -> PodDisruptionBudget {
    let labels = if component == REDIS_COMPONENT {
        redis_labels(resource)
    } else {
        sentinel_labels(resource)
    };

    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: resource.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(replicas - 1)),
            selector: Some(LabelSelector {
                match_labels: Some(selector_labels(resource, component)),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
