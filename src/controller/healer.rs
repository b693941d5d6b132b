//! Idempotent write actions that push the cluster toward desired state.
//!
//! The `Healer` contract is everything the check-and-heal loop and the
//! rolling updater are allowed to change. Each action is safe to re-invoke;
//! the caller invokes any action at most once per iteration.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams};
use kube::{Api, Client, ResourceExt};
use tracing::info;

use crate::client::RedisAdmin;
use crate::client::redis_client::{is_runtime_settable, split_directive};
use crate::controller::error::{Error, Result};
use crate::crd::{REDIS_PORT, RedisFailover, SENTINEL_PORT};
use crate::health::HealthState;
use crate::resources::common::{REDIS_COMPONENT, selector_string};

/// Sentinel options re-applied after MONITOR, mirroring the generated
/// sentinel.conf.
const SENTINEL_DEFAULTS: &[(&str, &str)] = &[
    ("down-after-milliseconds", "5000"),
    ("failover-timeout", "10000"),
    ("parallel-syncs", "2"),
];

/// Idempotent cluster mutations.
#[allow(async_fn_in_trait)]
pub trait Healer {
    /// Promote the Redis at `ip` to master. Used only when it is the sole
    /// reachable Redis.
    async fn make_master(&self, ip: &str, resource: &RedisFailover) -> Result<()>;

    /// Promote the oldest Redis pod to master and point every other Redis
    /// at it.
    async fn set_oldest_as_master(&self, resource: &RedisFailover) -> Result<()>;

    /// Point every Redis except the master at `master_ip`.
    async fn set_master_on_all(&self, master_ip: &str, resource: &RedisFailover) -> Result<()>;

    /// Reset the Sentinel and point it at `master_ip`, re-applying the
    /// configured monitoring options.
    async fn new_sentinel_monitor(
        &self,
        sentinel_ip: &str,
        master_ip: &str,
        resource: &RedisFailover,
    ) -> Result<()>;

    /// Reset the Sentinel so it re-discovers peers and slaves.
    async fn restore_sentinel(&self, sentinel_ip: &str) -> Result<()>;

    /// Apply the spec's Redis directives at runtime.
    async fn set_redis_custom_config(&self, ip: &str, resource: &RedisFailover) -> Result<()>;

    /// Apply the spec's Sentinel directives at runtime.
    async fn set_sentinel_custom_config(&self, ip: &str, resource: &RedisFailover) -> Result<()>;

    /// Delete a pod so its controller recreates it from the current template.
    async fn delete_pod(&self, pod_name: &str, resource: &RedisFailover) -> Result<()>;
}

/// Production healer over the Kubernetes API and the Redis protocol.
pub struct ClusterHealer {
    client: Client,
    password: Option<String>,
    health_state: Option<Arc<HealthState>>,
}

impl ClusterHealer {
    pub fn new(
        client: Client,
        password: Option<String>,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            client,
            password,
            health_state,
        }
    }

    fn namespace(resource: &RedisFailover) -> String {
        resource.namespace().unwrap_or_else(|| "default".to_string())
    }

    fn record_action(&self, action: &str) {
        if let Some(ref state) = self.health_state {
            state.metrics.record_heal_action(action);
        }
    }

    async fn redis_admin(&self, ip: &str) -> Result<RedisAdmin> {
        Ok(RedisAdmin::connect(ip, REDIS_PORT, self.password.as_deref()).await?)
    }

    async fn sentinel_admin(&self, ip: &str) -> Result<RedisAdmin> {
        Ok(RedisAdmin::connect(ip, SENTINEL_PORT, None).await?)
    }

    /// Running Redis pods with an assigned IP, oldest first. Pod name breaks
    /// creation-time ties so the pick is deterministic.
    async fn redis_pods_oldest_first(&self, resource: &RedisFailover) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &Self::namespace(resource));
        let params = ListParams::default().labels(&selector_string(resource, REDIS_COMPONENT));
        let mut pods: Vec<Pod> = api
            .list(&params)
            .await?
            .items
            .into_iter()
            .filter(|pod| {
                pod.status
                    .as_ref()
                    .and_then(|s| s.pod_ip.as_deref())
                    .is_some()
            })
            .collect();

        pods.sort_by(|a, b| {
            let a_created = a.metadata.creation_timestamp.as_ref().map(|t| t.0.timestamp());
            let b_created = b.metadata.creation_timestamp.as_ref().map(|t| t.0.timestamp());
            a_created
                .cmp(&b_created)
                .then_with(|| a.name_any().cmp(&b.name_any()))
        });

        Ok(pods)
    }

    async fn promote(&self, ip: &str) -> Result<()> {
        let admin = self.redis_admin(ip).await?;
        let result = admin.promote_to_master().await;
        let _ = admin.close().await;
        result?;
        Ok(())
    }

    async fn enslave(&self, ip: &str, master_ip: &str) -> Result<()> {
        let admin = self.redis_admin(ip).await?;
        let result = admin.slave_of(master_ip, REDIS_PORT).await;
        let _ = admin.close().await;
        result?;
        Ok(())
    }
}

impl Healer for ClusterHealer {
    async fn make_master(&self, ip: &str, _resource: &RedisFailover) -> Result<()> {
        info!(ip = %ip, "Promoting sole redis to master");
        self.promote(ip).await?;
        self.record_action("make_master");
        Ok(())
    }

    async fn set_oldest_as_master(&self, resource: &RedisFailover) -> Result<()> {
        let pods = self.redis_pods_oldest_first(resource).await?;
        let Some(oldest) = pods.first() else {
            return Err(Error::InconsistentState(
                "no redis pods to promote".to_string(),
            ));
        };
        let master_ip = oldest
            .status
            .as_ref()
            .and_then(|s| s.pod_ip.clone())
            .ok_or_else(|| Error::InconsistentState("oldest pod has no IP".to_string()))?;

        info!(pod = %oldest.name_any(), ip = %master_ip, "Promoting oldest redis to master");
        self.promote(&master_ip).await?;

        for pod in pods.iter().skip(1) {
            if let Some(ip) = pod.status.as_ref().and_then(|s| s.pod_ip.as_deref()) {
                self.enslave(ip, &master_ip).await?;
            }
        }

        self.record_action("set_oldest_as_master");
        Ok(())
    }

    async fn set_master_on_all(&self, master_ip: &str, resource: &RedisFailover) -> Result<()> {
        let pods = self.redis_pods_oldest_first(resource).await?;
        for pod in &pods {
            let Some(ip) = pod.status.as_ref().and_then(|s| s.pod_ip.as_deref()) else {
                continue;
            };
            if ip == master_ip {
                continue;
            }
            info!(ip = %ip, master = %master_ip, "Repointing slave at master");
            self.enslave(ip, master_ip).await?;
        }
        self.record_action("set_master_on_all");
        Ok(())
    }

    async fn new_sentinel_monitor(
        &self,
        sentinel_ip: &str,
        master_ip: &str,
        resource: &RedisFailover,
    ) -> Result<()> {
        info!(sentinel = %sentinel_ip, master = %master_ip, "Rewiring sentinel monitor");
        let admin = self.sentinel_admin(sentinel_ip).await?;
        let result = async {
            admin.sentinel_reset().await?;
            admin
                .sentinel_monitor(master_ip, resource.spec.sentinel.quorum())
                .await?;
            for (option, value) in SENTINEL_DEFAULTS {
                admin.sentinel_set(option, value).await?;
            }
            if let Some(ref password) = self.password {
                admin.sentinel_set("auth-pass", password).await?;
            }
            Ok::<(), crate::client::RedisError>(())
        }
        .await;
        let _ = admin.close().await;
        result?;

        self.record_action("new_sentinel_monitor");
        Ok(())
    }

    async fn restore_sentinel(&self, sentinel_ip: &str) -> Result<()> {
        info!(sentinel = %sentinel_ip, "Resetting sentinel state");
        let admin = self.sentinel_admin(sentinel_ip).await?;
        let result = admin.sentinel_reset().await;
        let _ = admin.close().await;
        result?;

        self.record_action("restore_sentinel");
        Ok(())
    }

    async fn set_redis_custom_config(&self, ip: &str, resource: &RedisFailover) -> Result<()> {
        let admin = self.redis_admin(ip).await?;
        let result = async {
            if let Some(ref password) = self.password {
                admin.config_set("requirepass", password).await?;
                admin.config_set("masterauth", password).await?;
            }
            for line in &resource.spec.redis.custom_config {
                let Some((directive, value)) = split_directive(line) else {
                    continue;
                };
                // Startup-only directives land in the ConfigMap instead
                if !is_runtime_settable(directive) {
                    continue;
                }
                admin.config_set(directive, value).await?;
            }
            Ok::<(), crate::client::RedisError>(())
        }
        .await;
        let _ = admin.close().await;
        result?;
        Ok(())
    }

    async fn set_sentinel_custom_config(&self, ip: &str, resource: &RedisFailover) -> Result<()> {
        let admin = self.sentinel_admin(ip).await?;
        let result = async {
            for line in &resource.spec.sentinel.custom_config {
                let Some((option, value)) = split_directive(line) else {
                    continue;
                };
                admin.sentinel_set(option, value).await?;
            }
            Ok::<(), crate::client::RedisError>(())
        }
        .await;
        let _ = admin.close().await;
        result?;
        Ok(())
    }

    async fn delete_pod(&self, pod_name: &str, resource: &RedisFailover) -> Result<()> {
        info!(pod = %pod_name, "Deleting pod for template rollout");
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &Self::namespace(resource));
        api.delete(pod_name, &DeleteParams::default()).await?;
        self.record_action("delete_pod");
        Ok(())
    }
}
