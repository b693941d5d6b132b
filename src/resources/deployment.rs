//! Deployment generation for the Sentinel quorum.
//!
//! Sentinel rewrites its own config file, so the rendered sentinel.conf is
//! copied from the ConfigMap into a writable emptyDir by an init container
//! before the Sentinel process starts.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, ExecAction, PodSpec,
    PodTemplateSpec, Probe, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use crate::crd::{RedisFailover, SENTINEL_PORT};
use crate::resources::common::{
    SENTINEL_COMPONENT, owner_reference, selector_labels, sentinel_labels, sentinel_name,
};
use crate::resources::statefulset::generate_resource_requirements;

/// Generate the Sentinel Deployment for a RedisFailover.
pub fn generate_sentinel_deployment(resource: &RedisFailover) -> Deployment {
    let labels = sentinel_labels(resource);

    Deployment {
        metadata: ObjectMeta {
            name: Some(sentinel_name(resource)),
            namespace: resource.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(resource.spec.sentinel.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(resource, SENTINEL_COMPONENT)),
                ..Default::default()
            },
            template: generate_pod_template(resource, &labels),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn generate_pod_template(
    resource: &RedisFailover,
    labels: &BTreeMap<String, String>,
) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            annotations: resource.spec.sentinel.pod_annotations.clone(),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            init_containers: Some(vec![generate_config_copy_container(resource)]),
            containers: vec![generate_sentinel_container(resource)],
            volumes: Some(vec![
                Volume {
                    name: "sentinel-config".to_string(),
                    config_map: Some(ConfigMapVolumeSource {
                        name: sentinel_name(resource),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                Volume {
                    name: "sentinel-config-writable".to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
    }
}

/// Sentinel mutates sentinel.conf in place; a read-only ConfigMap mount
/// would make it fail at startup.
fn generate_config_copy_container(resource: &RedisFailover) -> Container {
    Container {
        name: "sentinel-config-copy".to_string(),
        image: Some(resource.spec.sentinel.image.clone()),
        command: Some(vec![
            "cp".to_string(),
            "/redis-init/sentinel.conf".to_string(),
            "/redis/sentinel.conf".to_string(),
        ]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: "sentinel-config".to_string(),
                mount_path: "/redis-init".to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: "sentinel-config-writable".to_string(),
                mount_path: "/redis".to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

fn generate_sentinel_container(resource: &RedisFailover) -> Container {
    let command = if resource.spec.sentinel.command.is_empty() {
        vec![
            "redis-server".to_string(),
            "/redis/sentinel.conf".to_string(),
            "--sentinel".to_string(),
        ]
    } else {
        resource.spec.sentinel.command.clone()
    };

    Container {
        name: "sentinel".to_string(),
        image: Some(resource.spec.sentinel.image.clone()),
        command: Some(command),
        ports: Some(vec![ContainerPort {
            container_port: i32::from(SENTINEL_PORT),
            name: Some("sentinel".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: generate_resource_requirements(&resource.spec.sentinel.resources),
        volume_mounts: Some(vec![VolumeMount {
            name: "sentinel-config-writable".to_string(),
            mount_path: "/redis".to_string(),
            ..Default::default()
        }]),
        readiness_probe: Some(generate_ping_probe(5)),
        liveness_probe: Some(generate_ping_probe(15)),
        ..Default::default()
    }
}

fn generate_ping_probe(initial_delay: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("redis-cli -p {SENTINEL_PORT} ping"),
            ]),
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        failure_threshold: Some(3),
        ..Default::default()
    }
}
