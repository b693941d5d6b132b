//! Unit tests for redis-failover-operator.
//!
//! These tests run without a Kubernetes cluster and exercise the resource
//! generators and CRD types through the public API.
//!
//! Test code is allowed to use expect() for error handling
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]

#[path = "../common/fixtures.rs"]
mod fixtures;

use fixtures::RedisFailoverBuilder;

mod storage_tests {
    use super::RedisFailoverBuilder;
    use k8s_openapi::api::core::v1::{
        EmptyDirVolumeSource, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use redis_failover_operator::resources::statefulset::generate_redis_statefulset;

    fn data_pvc() -> PersistentVolumeClaim {
        let mut requests = std::collections::BTreeMap::new();
        requests.insert("storage".to_string(), Quantity("1Gi".to_string()));
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some("pvc-data".to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(k8s_openapi::api::core::v1::VolumeResourceRequirements {
                    requests: Some(requests),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn default_storage_mounts_emptydir_at_data() {
        let resource = RedisFailoverBuilder::new("test").build();
        let sts = generate_redis_statefulset(&resource);
        let pod_spec = sts.spec.as_ref().unwrap().template.spec.as_ref().unwrap();

        let volumes = pod_spec.volumes.as_ref().unwrap();
        let names: Vec<&str> = volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["redis-config", "redis-shutdown-config", "redis-data"]);
        assert!(volumes[2].empty_dir.is_some());

        let mounts = pod_spec.containers[0].volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[0].mount_path, "/redis");
        assert_eq!(mounts[1].mount_path, "/redis-shutdown");
        assert_eq!(mounts[2].mount_path, "/data");
    }

    #[test]
    fn shutdown_script_volume_is_executable() {
        let resource = RedisFailoverBuilder::new("test").build();
        let sts = generate_redis_statefulset(&resource);
        let pod_spec = sts.spec.as_ref().unwrap().template.spec.as_ref().unwrap();

        let shutdown = pod_spec
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .find(|v| v.name == "redis-shutdown-config")
            .expect("shutdown volume present");
        assert_eq!(
            shutdown.config_map.as_ref().unwrap().default_mode,
            Some(0o744)
        );
    }

    #[test]
    fn memory_backed_emptydir_is_preserved() {
        let resource = RedisFailoverBuilder::new("test")
            .empty_dir(EmptyDirVolumeSource {
                medium: Some("Memory".to_string()),
                ..Default::default()
            })
            .build();

        let sts = generate_redis_statefulset(&resource);
        let volumes = sts
            .spec
            .unwrap()
            .template
            .spec
            .unwrap()
            .volumes
            .unwrap();
        let data = volumes.iter().find(|v| v.name == "redis-data").unwrap();
        assert_eq!(
            data.empty_dir.as_ref().unwrap().medium,
            Some("Memory".to_string())
        );
    }

    #[test]
    fn pvc_storage_appends_claim_template_and_drops_pod_volume() {
        let resource = RedisFailoverBuilder::new("test")
            .persistent_volume_claim(data_pvc(), false)
            .build();

        let sts = generate_redis_statefulset(&resource);
        let spec = sts.spec.unwrap();

        let volumes = spec.template.spec.as_ref().unwrap().volumes.as_ref().unwrap();
        assert!(volumes.iter().all(|v| v.name != "redis-data"));

        let mounts = spec.template.spec.as_ref().unwrap().containers[0]
            .volume_mounts
            .as_ref()
            .unwrap();
        assert_eq!(mounts[2].name, "pvc-data");
        assert_eq!(mounts[2].mount_path, "/data");

        let templates = spec.volume_claim_templates.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].metadata.name, Some("pvc-data".to_string()));
        let owner_refs = templates[0].metadata.owner_references.as_ref().unwrap();
        assert_eq!(owner_refs[0].kind, "RedisFailover");
    }

    #[test]
    fn kept_claims_carry_no_owner_references() {
        let resource = RedisFailoverBuilder::new("test")
            .persistent_volume_claim(data_pvc(), true)
            .build();

        let sts = generate_redis_statefulset(&resource);
        let templates = sts.spec.unwrap().volume_claim_templates.unwrap();
        assert!(templates[0].metadata.owner_references.is_none());
    }
}

mod command_tests {
    use super::RedisFailoverBuilder;
    use redis_failover_operator::resources::deployment::generate_sentinel_deployment;
    use redis_failover_operator::resources::statefulset::generate_redis_statefulset;

    #[test]
    fn redis_default_command() {
        let resource = RedisFailoverBuilder::new("test").build();
        let sts = generate_redis_statefulset(&resource);
        let command = sts.spec.unwrap().template.spec.unwrap().containers[0]
            .command
            .clone()
            .unwrap();
        assert_eq!(command, vec!["redis-server", "/redis/redis.conf"]);
    }

    #[test]
    fn redis_command_override() {
        let resource = RedisFailoverBuilder::new("test")
            .redis_command(vec!["test".to_string(), "command".to_string()])
            .build();
        let sts = generate_redis_statefulset(&resource);
        let command = sts.spec.unwrap().template.spec.unwrap().containers[0]
            .command
            .clone()
            .unwrap();
        assert_eq!(command, vec!["test", "command"]);
    }

    #[test]
    fn sentinel_default_command() {
        let resource = RedisFailoverBuilder::new("test").build();
        let deploy = generate_sentinel_deployment(&resource);
        let command = deploy.spec.unwrap().template.spec.unwrap().containers[0]
            .command
            .clone()
            .unwrap();
        assert_eq!(
            command,
            vec!["redis-server", "/redis/sentinel.conf", "--sentinel"]
        );
    }

    #[test]
    fn sentinel_command_override() {
        let resource = RedisFailoverBuilder::new("test")
            .sentinel_command(vec!["test".to_string(), "command".to_string()])
            .build();
        let deploy = generate_sentinel_deployment(&resource);
        let command = deploy.spec.unwrap().template.spec.unwrap().containers[0]
            .command
            .clone()
            .unwrap();
        assert_eq!(command, vec!["test", "command"]);
    }
}

mod annotation_tests {
    use super::RedisFailoverBuilder;
    use redis_failover_operator::resources::deployment::generate_sentinel_deployment;
    use redis_failover_operator::resources::statefulset::generate_redis_statefulset;
    use std::collections::BTreeMap;

    fn annotations() -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("some".to_string(), "annotation".to_string());
        map.insert("path/to/annotation".to_string(), "here".to_string());
        map
    }

    #[test]
    fn redis_pods_without_annotations() {
        let resource = RedisFailoverBuilder::new("test").build();
        let sts = generate_redis_statefulset(&resource);
        assert_eq!(sts.spec.unwrap().template.metadata.unwrap().annotations, None);
    }

    #[test]
    fn redis_pods_with_annotations() {
        let resource = RedisFailoverBuilder::new("test")
            .redis_pod_annotations(annotations())
            .build();
        let sts = generate_redis_statefulset(&resource);
        assert_eq!(
            sts.spec.unwrap().template.metadata.unwrap().annotations,
            Some(annotations())
        );
    }

    #[test]
    fn sentinel_pods_with_annotations() {
        let resource = RedisFailoverBuilder::new("test")
            .sentinel_pod_annotations(annotations())
            .build();
        let deploy = generate_sentinel_deployment(&resource);
        assert_eq!(
            deploy.spec.unwrap().template.metadata.unwrap().annotations,
            Some(annotations())
        );
    }
}

mod label_tests {
    use super::RedisFailoverBuilder;
    use redis_failover_operator::resources::statefulset::generate_redis_statefulset;

    #[test]
    fn pods_carry_operator_labels() {
        let resource = RedisFailoverBuilder::new("test").build();
        let sts = generate_redis_statefulset(&resource);
        let labels = sts.spec.unwrap().template.metadata.unwrap().labels.unwrap();

        assert_eq!(labels.get("app.kubernetes.io/name"), Some(&"test".to_string()));
        assert_eq!(
            labels.get("app.kubernetes.io/component"),
            Some(&"redis".to_string())
        );
        assert_eq!(
            labels.get("app.kubernetes.io/part-of"),
            Some(&"redis-failover".to_string())
        );
        assert!(labels.contains_key("deployment-version"));
    }

    #[test]
    fn user_labels_are_merged() {
        let resource = RedisFailoverBuilder::new("test")
            .label("someotherlabel", "value")
            .build();
        let sts = generate_redis_statefulset(&resource);
        let labels = sts.spec.unwrap().template.metadata.unwrap().labels.unwrap();

        assert_eq!(labels.get("someotherlabel"), Some(&"value".to_string()));
        assert_eq!(
            labels.get("app.kubernetes.io/component"),
            Some(&"redis".to_string())
        );
    }

    #[test]
    fn user_deployment_version_wins() {
        let resource = RedisFailoverBuilder::new("test")
            .label("deployment-version", "10")
            .build();
        let sts = generate_redis_statefulset(&resource);
        let labels = sts.spec.unwrap().template.metadata.unwrap().labels.unwrap();

        assert_eq!(labels.get("deployment-version"), Some(&"10".to_string()));
    }

    #[test]
    fn statefulset_and_pod_template_share_the_version() {
        let resource = RedisFailoverBuilder::new("test").build();
        let sts = generate_redis_statefulset(&resource);

        let sts_version = sts
            .metadata
            .labels
            .as_ref()
            .unwrap()
            .get("deployment-version")
            .cloned();
        let pod_version = sts
            .spec
            .unwrap()
            .template
            .metadata
            .unwrap()
            .labels
            .unwrap()
            .get("deployment-version")
            .cloned();
        assert_eq!(sts_version, pod_version);
        assert!(sts_version.is_some());
    }
}

mod pdb_tests {
    use super::RedisFailoverBuilder;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use redis_failover_operator::resources::pdb::{generate_redis_pdb, generate_sentinel_pdb};

    #[test]
    fn redis_pdb_allows_one_disruption() {
        let resource = RedisFailoverBuilder::new("test").redis_replicas(3).build();
        let pdb = generate_redis_pdb(&resource);
        assert_eq!(pdb.metadata.name, Some("rfr-test".to_string()));
        assert_eq!(pdb.spec.unwrap().min_available, Some(IntOrString::Int(2)));
    }

    #[test]
    fn sentinel_pdb_allows_one_disruption() {
        let resource = RedisFailoverBuilder::new("test")
            .sentinel_replicas(5)
            .build();
        let pdb = generate_sentinel_pdb(&resource);
        assert_eq!(pdb.metadata.name, Some("rfs-test".to_string()));
        assert_eq!(pdb.spec.unwrap().min_available, Some(IntOrString::Int(4)));
    }
}

mod configmap_tests {
    use super::RedisFailoverBuilder;
    use redis_failover_operator::resources::configmaps::{
        generate_redis_configmap, generate_sentinel_configmap,
    };

    #[test]
    fn custom_directives_land_in_redis_conf() {
        let resource = RedisFailoverBuilder::new("test")
            .custom_config(vec!["maxmemory 1gb".to_string()])
            .build();
        let cm = generate_redis_configmap(&resource);
        let conf = cm.data.unwrap().get("redis.conf").cloned().unwrap();
        assert!(conf.contains("maxmemory 1gb"));
    }

    #[test]
    fn sentinel_conf_uses_majority_quorum() {
        let resource = RedisFailoverBuilder::new("test")
            .sentinel_replicas(3)
            .build();
        let cm = generate_sentinel_configmap(&resource);
        let conf = cm.data.unwrap().get("sentinel.conf").cloned().unwrap();
        assert!(conf.contains("sentinel monitor mymaster 127.0.0.1 6379 2"));
    }
}

mod sidecar_tests {
    use super::RedisFailoverBuilder;
    use redis_failover_operator::resources::statefulset::generate_redis_statefulset;

    #[test]
    fn exporter_sidecar_added_when_enabled() {
        let resource = RedisFailoverBuilder::new("test").exporter(true).build();
        let sts = generate_redis_statefulset(&resource);
        let containers = sts.spec.unwrap().template.spec.unwrap().containers;
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[1].name, "redis-exporter");
    }

    #[test]
    fn auth_secret_wired_into_redis_env() {
        let resource = RedisFailoverBuilder::new("test")
            .namespace("prod")
            .auth_secret("redis-auth")
            .build();
        let sts = generate_redis_statefulset(&resource);
        let env = sts.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();
        let secret_ref = env[0]
            .value_from
            .as_ref()
            .unwrap()
            .secret_key_ref
            .as_ref()
            .unwrap();
        assert_eq!(secret_ref.name, "redis-auth");
    }
}

mod crd_tests {
    use super::RedisFailoverBuilder;
    use redis_failover_operator::crd::Phase;

    #[test]
    fn builder_defaults_are_valid() {
        let resource = RedisFailoverBuilder::new("test").build();
        assert_eq!(resource.spec.redis.replicas, 3);
        assert_eq!(resource.spec.sentinel.replicas, 3);
        assert_eq!(resource.spec.sentinel.quorum(), 2);
    }

    #[test]
    fn phase_defaults_to_pending() {
        assert_eq!(Phase::default(), Phase::Pending);
    }
}
