//! StatefulSet generation for the Redis replication group.
//!
//! The StatefulSet provides stable pod identity and ordered recreation. Its
//! update strategy is OnDelete: the rolling updater deletes stale pods in a
//! replication-safe order instead of letting the StatefulSet controller roll
//! them top-down.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    ExecAction, Lifecycle, LifecycleHandler, PersistentVolumeClaim, PodSpec, PodTemplateSpec,
    Probe, ResourceRequirements, SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use crate::crd::{REDIS_PORT, RedisFailover, ResourceRequirementsSpec};
use crate::resources::common::{
    REDIS_COMPONENT, owner_reference, redis_labels, redis_name, redis_shutdown_configmap_name,
    selector_labels,
};

/// Mode bits for the shutdown script volume; the script must be executable.
const SHUTDOWN_SCRIPT_MODE: i32 = 0o744;

/// Name of the data volume when it is not backed by a claim template.
const DATA_VOLUME_NAME: &str = "redis-data";

/// Default key holding the password inside the auth secret.
const AUTH_SECRET_KEY: &str = "password";

/// Exporter sidecar image.
const EXPORTER_IMAGE: &str = "oliver006/redis_exporter:v1.62.0";

/// Exporter metrics port.
const EXPORTER_PORT: i32 = 9121;

/// Generate the Redis StatefulSet for a RedisFailover.
pub fn generate_redis_statefulset(resource: &RedisFailover) -> StatefulSet {
    let name = redis_name(resource);
    let labels = redis_labels(resource);

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: resource.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(resource.spec.redis.replicas),
            service_name: Some(name),
            selector: LabelSelector {
                match_labels: Some(selector_labels(resource, REDIS_COMPONENT)),
                ..Default::default()
            },
            // The rolling updater decides deletion order, not the controller
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("OnDelete".to_string()),
                ..Default::default()
            }),
            template: generate_pod_template(resource, &labels),
            volume_claim_templates: generate_volume_claim_templates(resource),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn generate_pod_template(
    resource: &RedisFailover,
    labels: &BTreeMap<String, String>,
) -> PodTemplateSpec {
    let mut containers = vec![generate_redis_container(resource)];
    if resource.spec.redis.exporter {
        containers.push(generate_exporter_container(resource));
    }

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            annotations: resource.spec.redis.pod_annotations.clone(),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers,
            volumes: Some(generate_volumes(resource)),
            ..Default::default()
        }),
    }
}

fn generate_redis_container(resource: &RedisFailover) -> Container {
    let command = if resource.spec.redis.command.is_empty() {
        vec!["redis-server".to_string(), "/redis/redis.conf".to_string()]
    } else {
        resource.spec.redis.command.clone()
    };

    Container {
        name: "redis".to_string(),
        image: Some(resource.spec.redis.image.clone()),
        command: Some(command),
        ports: Some(vec![ContainerPort {
            container_port: i32::from(REDIS_PORT),
            name: Some("redis".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: generate_auth_env(resource),
        resources: generate_resource_requirements(&resource.spec.redis.resources),
        volume_mounts: Some(generate_volume_mounts(resource)),
        readiness_probe: Some(generate_ping_probe(5)),
        liveness_probe: Some(generate_ping_probe(15)),
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                exec: Some(ExecAction {
                    command: Some(vec![
                        "/bin/sh".to_string(),
                        "/redis-shutdown/shutdown.sh".to_string(),
                    ]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn generate_exporter_container(resource: &RedisFailover) -> Container {
    Container {
        name: "redis-exporter".to_string(),
        image: Some(EXPORTER_IMAGE.to_string()),
        ports: Some(vec![ContainerPort {
            container_port: EXPORTER_PORT,
            name: Some("metrics".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: generate_auth_env(resource),
        ..Default::default()
    }
}

/// Expose the auth password to the container when auth is configured.
fn generate_auth_env(resource: &RedisFailover) -> Option<Vec<EnvVar>> {
    resource.spec.auth.as_ref().map(|auth| {
        vec![EnvVar {
            name: "REDIS_PASSWORD".to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: auth.secret_path.clone(),
                    key: AUTH_SECRET_KEY.to_string(),
                    optional: Some(false),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]
    })
}

/// Build k8s resource requirements, leaving unset quantities out.
pub(crate) fn generate_resource_requirements(
    spec: &ResourceRequirementsSpec,
) -> Option<ResourceRequirements> {
    let to_list = |cpu: &str, memory: &str| -> Option<BTreeMap<String, Quantity>> {
        let mut list = BTreeMap::new();
        if !cpu.is_empty() {
            list.insert("cpu".to_string(), Quantity(cpu.to_string()));
        }
        if !memory.is_empty() {
            list.insert("memory".to_string(), Quantity(memory.to_string()));
        }
        if list.is_empty() { None } else { Some(list) }
    };

    let requests = to_list(&spec.requests.cpu, &spec.requests.memory);
    let limits = to_list(&spec.limits.cpu, &spec.limits.memory);

    if requests.is_none() && limits.is_none() {
        return None;
    }

    Some(ResourceRequirements {
        requests,
        limits,
        ..Default::default()
    })
}

fn generate_ping_probe(initial_delay: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                "redis-cli -p 6379 ping".to_string(),
            ]),
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

/// The pod data mount is named after the claim template when a PVC is used.
fn data_volume_name(resource: &RedisFailover) -> String {
    resource
        .spec
        .redis
        .storage
        .persistent_volume_claim
        .as_ref()
        .and_then(|pvc| pvc.metadata.name.clone())
        .unwrap_or_else(|| DATA_VOLUME_NAME.to_string())
}

fn generate_volume_mounts(resource: &RedisFailover) -> Vec<VolumeMount> {
    vec![
        VolumeMount {
            name: "redis-config".to_string(),
            mount_path: "/redis".to_string(),
            ..Default::default()
        },
        VolumeMount {
            name: "redis-shutdown-config".to_string(),
            mount_path: "/redis-shutdown".to_string(),
            ..Default::default()
        },
        VolumeMount {
            name: data_volume_name(resource),
            mount_path: "/data".to_string(),
            ..Default::default()
        },
    ]
}

/// Pod volumes. The data volume is an emptyDir unless a claim template is
/// supplied, in which case it is omitted here and served by the template.
fn generate_volumes(resource: &RedisFailover) -> Vec<Volume> {
    let mut volumes = vec![
        Volume {
            name: "redis-config".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: redis_name(resource),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: "redis-shutdown-config".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: redis_shutdown_configmap_name(resource),
                default_mode: Some(SHUTDOWN_SCRIPT_MODE),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];

    if resource.spec.redis.storage.persistent_volume_claim.is_none() {
        let empty_dir = resource
            .spec
            .redis
            .storage
            .empty_dir
            .clone()
            .unwrap_or_else(EmptyDirVolumeSource::default);
        volumes.push(Volume {
            name: DATA_VOLUME_NAME.to_string(),
            empty_dir: Some(empty_dir),
            ..Default::default()
        });
    }

    volumes
}

/// Claim templates. The owner reference is attached only when the claims are
/// not kept after deletion.
fn generate_volume_claim_templates(resource: &RedisFailover) -> Option<Vec<PersistentVolumeClaim>> {
    let pvc = resource.spec.redis.storage.persistent_volume_claim.as_ref()?;

    let mut claim = pvc.clone();
    if !resource.spec.redis.storage.keep_after_deletion {
        claim.metadata.owner_references = Some(vec![owner_reference(resource)]);
    }

    Some(vec![claim])
}
