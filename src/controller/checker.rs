//! Read-only probes of the live cluster.
//!
//! The `Checker` contract is everything the check-and-heal loop and the
//! rolling updater are allowed to observe. None of these queries mutates
//! cluster state. Tests substitute scripted implementations; production
//! wiring composes the Kubernetes client and the Redis admin client.

use std::time::Duration;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};

use crate::client::{RedisAdmin, Role};
use crate::controller::error::{Error, Result};
use crate::crd::{REDIS_PORT, RedisFailover, SENTINEL_PORT};
use crate::resources::common::{
    DEPLOYMENT_VERSION_LABEL, REDIS_COMPONENT, SENTINEL_COMPONENT, redis_name, selector_string,
    sentinel_name,
};

/// Read-only cluster queries. Never mutates cluster state.
#[allow(async_fn_in_trait)]
pub trait Checker {
    /// Error when the StatefulSet replica count differs from the spec.
    async fn check_redis_replicas(&self, resource: &RedisFailover) -> Result<()>;

    /// Error when the Deployment replica count differs from the spec.
    async fn check_sentinel_replicas(&self, resource: &RedisFailover) -> Result<()>;

    /// Number of Redises reporting `role:master`. Error when any Redis is
    /// unreachable, never a silent zero.
    async fn master_count(&self, resource: &RedisFailover) -> Result<usize>;

    /// IP of the single master. Error when zero or more than one.
    async fn master_ip(&self, resource: &RedisFailover) -> Result<String>;

    /// IPs of the reachable Redis pods.
    async fn redis_ips(&self, resource: &RedisFailover) -> Result<Vec<String>>;

    /// IPs of the Sentinel pods.
    async fn sentinel_ips(&self, resource: &RedisFailover) -> Result<Vec<String>>;

    /// Age of the youngest Redis pod. Error when there are no pods.
    async fn min_redis_pod_age(&self, resource: &RedisFailover) -> Result<Duration>;

    /// Error when any slave does not replicate from `master_ip`.
    async fn check_slaves_point_to(
        &self,
        master_ip: &str,
        resource: &RedisFailover,
    ) -> Result<()>;

    /// Error when the Sentinel monitors an IP other than `master_ip`.
    async fn check_sentinel_monitor(&self, sentinel_ip: &str, master_ip: &str) -> Result<()>;

    /// Error when the Sentinel's known-peer count differs from replicas − 1.
    async fn check_sentinel_peer_count(
        &self,
        sentinel_ip: &str,
        resource: &RedisFailover,
    ) -> Result<()>;

    /// Error when the Sentinel's known-slave count differs from
    /// redis replicas − 1.
    async fn check_sentinel_slave_count(
        &self,
        sentinel_ip: &str,
        resource: &RedisFailover,
    ) -> Result<()>;

    /// Whether the Redis is in the middle of an initial sync from its master.
    async fn is_redis_syncing(&self, redis_ip: &str, resource: &RedisFailover) -> Result<bool>;

    /// Template hash currently stored on the StatefulSet.
    async fn statefulset_version(&self, resource: &RedisFailover) -> Result<String>;

    /// Template hash a pod was created from (its `deployment-version` label).
    async fn pod_template_version(
        &self,
        pod_name: &str,
        resource: &RedisFailover,
    ) -> Result<String>;

    /// Name of the pod whose Redis reports `role:master`.
    async fn master_pod(&self, resource: &RedisFailover) -> Result<String>;

    /// Names of the pods whose Redis reports `role:slave`.
    async fn slave_pods(&self, resource: &RedisFailover) -> Result<Vec<String>>;
}

/// Production checker over the Kubernetes API and the Redis protocol.
pub struct ClusterChecker {
    client: Client,
    password: Option<String>,
}

impl ClusterChecker {
    pub fn new(client: Client, password: Option<String>) -> Self {
        Self { client, password }
    }

    fn namespace(resource: &RedisFailover) -> String {
        resource.namespace().unwrap_or_else(|| "default".to_string())
    }

    fn pod_api(&self, resource: &RedisFailover) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &Self::namespace(resource))
    }

    /// List running pods of one component.
    async fn list_pods(&self, resource: &RedisFailover, component: &str) -> Result<Vec<Pod>> {
        let params = ListParams::default().labels(&selector_string(resource, component));
        let pods = self.pod_api(resource).list(&params).await?;
        Ok(pods
            .items
            .into_iter()
            .filter(|pod| {
                pod.status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .is_some_and(|phase| phase == "Running")
            })
            .collect())
    }

    fn pod_ip(pod: &Pod) -> Option<String> {
        pod.status.as_ref().and_then(|s| s.pod_ip.clone())
    }

    async fn redis_admin(&self, ip: &str) -> Result<RedisAdmin> {
        Ok(RedisAdmin::connect(ip, REDIS_PORT, self.password.as_deref()).await?)
    }

    async fn sentinel_admin(&self, ip: &str) -> Result<RedisAdmin> {
        Ok(RedisAdmin::connect(ip, SENTINEL_PORT, None).await?)
    }

    /// Role of the Redis at `ip`, plus the master it replicates from.
    async fn redis_role(&self, ip: &str) -> Result<(Role, Option<String>)> {
        let admin = self.redis_admin(ip).await?;
        let info = admin.replication_info().await;
        let _ = admin.close().await;
        let info = info?;
        Ok((info.role, info.master_host))
    }
}

impl Checker for ClusterChecker {
    async fn check_redis_replicas(&self, resource: &RedisFailover) -> Result<()> {
        let api: Api<StatefulSet> =
            Api::namespaced(self.client.clone(), &Self::namespace(resource));
        let sts = api.get(&redis_name(resource)).await?;
        let actual = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
        if actual != resource.spec.redis.replicas {
            return Err(Error::InconsistentState(format!(
                "redis replicas: expected {}, statefulset has {}",
                resource.spec.redis.replicas, actual
            )));
        }
        Ok(())
    }

    async fn check_sentinel_replicas(&self, resource: &RedisFailover) -> Result<()> {
        let api: Api<Deployment> =
            Api::namespaced(self.client.clone(), &Self::namespace(resource));
        let deploy = api.get(&sentinel_name(resource)).await?;
        let actual = deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
        if actual != resource.spec.sentinel.replicas {
            return Err(Error::InconsistentState(format!(
                "sentinel replicas: expected {}, deployment has {}",
                resource.spec.sentinel.replicas, actual
            )));
        }
        Ok(())
    }

    async fn master_count(&self, resource: &RedisFailover) -> Result<usize> {
        let mut masters = 0;
        for ip in self.redis_ips(resource).await? {
            let (role, _) = self.redis_role(&ip).await?;
            if role == Role::Master {
                masters += 1;
            }
        }
        Ok(masters)
    }

    async fn master_ip(&self, resource: &RedisFailover) -> Result<String> {
        let mut masters = Vec::new();
        for ip in self.redis_ips(resource).await? {
            let (role, _) = self.redis_role(&ip).await?;
            if role == Role::Master {
                masters.push(ip);
            }
        }
        match masters.len() {
            1 => Ok(masters.remove(0)),
            n => Err(Error::InconsistentState(format!(
                "expected exactly one master, found {n}"
            ))),
        }
    }

    async fn redis_ips(&self, resource: &RedisFailover) -> Result<Vec<String>> {
        let pods = self.list_pods(resource, REDIS_COMPONENT).await?;
        Ok(pods.iter().filter_map(Self::pod_ip).collect())
    }

    async fn sentinel_ips(&self, resource: &RedisFailover) -> Result<Vec<String>> {
        let pods = self.list_pods(resource, SENTINEL_COMPONENT).await?;
        Ok(pods.iter().filter_map(Self::pod_ip).collect())
    }

    async fn min_redis_pod_age(&self, resource: &RedisFailover) -> Result<Duration> {
        let pods = self.list_pods(resource, REDIS_COMPONENT).await?;
        let now = jiff::Timestamp::now().as_second();

        let min_age = pods
            .iter()
            .filter_map(|pod| pod.metadata.creation_timestamp.as_ref())
            .map(|created| (now - created.0.timestamp()).max(0) as u64)
            .min()
            .ok_or_else(|| Error::InconsistentState("no redis pods found".to_string()))?;

        Ok(Duration::from_secs(min_age))
    }

    async fn check_slaves_point_to(
        &self,
        master_ip: &str,
        resource: &RedisFailover,
    ) -> Result<()> {
        for ip in self.redis_ips(resource).await? {
            if ip == master_ip {
                continue;
            }
            let (role, master_of) = self.redis_role(&ip).await?;
            if role != Role::Slave || master_of.as_deref() != Some(master_ip) {
                return Err(Error::InconsistentState(format!(
                    "redis {ip} does not replicate from {master_ip}"
                )));
            }
        }
        Ok(())
    }

    async fn check_sentinel_monitor(&self, sentinel_ip: &str, master_ip: &str) -> Result<()> {
        let admin = self.sentinel_admin(sentinel_ip).await?;
        let monitored = admin.monitored_master().await;
        let _ = admin.close().await;
        let monitored = monitored?;
        if monitored.ip != master_ip {
            return Err(Error::InconsistentState(format!(
                "sentinel {sentinel_ip} monitors {} instead of {master_ip}",
                monitored.ip
            )));
        }
        Ok(())
    }

    async fn check_sentinel_peer_count(
        &self,
        sentinel_ip: &str,
        resource: &RedisFailover,
    ) -> Result<()> {
        let admin = self.sentinel_admin(sentinel_ip).await?;
        let monitored = admin.monitored_master().await;
        let _ = admin.close().await;
        let monitored = monitored?;
        let expected = resource.spec.sentinel.replicas - 1;
        if monitored.num_other_sentinels != expected {
            return Err(Error::InconsistentState(format!(
                "sentinel {sentinel_ip} knows {} peers, expected {expected}",
                monitored.num_other_sentinels
            )));
        }
        Ok(())
    }

    async fn check_sentinel_slave_count(
        &self,
        sentinel_ip: &str,
        resource: &RedisFailover,
    ) -> Result<()> {
        let admin = self.sentinel_admin(sentinel_ip).await?;
        let monitored = admin.monitored_master().await;
        let _ = admin.close().await;
        let monitored = monitored?;
        let expected = resource.spec.redis.replicas - 1;
        if monitored.num_slaves != expected {
            return Err(Error::InconsistentState(format!(
                "sentinel {sentinel_ip} knows {} slaves, expected {expected}",
                monitored.num_slaves
            )));
        }
        Ok(())
    }

    async fn is_redis_syncing(&self, redis_ip: &str, _resource: &RedisFailover) -> Result<bool> {
        let admin = self.redis_admin(redis_ip).await?;
        let info = admin.replication_info().await;
        let _ = admin.close().await;
        Ok(info?.master_sync_in_progress)
    }

    async fn statefulset_version(&self, resource: &RedisFailover) -> Result<String> {
        let api: Api<StatefulSet> =
            Api::namespaced(self.client.clone(), &Self::namespace(resource));
        let sts = api.get(&redis_name(resource)).await?;
        sts.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(DEPLOYMENT_VERSION_LABEL).cloned())
            .ok_or_else(|| {
                Error::MissingField(format!(
                    "statefulset {} has no {DEPLOYMENT_VERSION_LABEL} label",
                    redis_name(resource)
                ))
            })
    }

    async fn pod_template_version(
        &self,
        pod_name: &str,
        resource: &RedisFailover,
    ) -> Result<String> {
        let pod = self.pod_api(resource).get(pod_name).await?;
        pod.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(DEPLOYMENT_VERSION_LABEL).cloned())
            .ok_or_else(|| {
                Error::MissingField(format!(
                    "pod {pod_name} has no {DEPLOYMENT_VERSION_LABEL} label"
                ))
            })
    }

    async fn master_pod(&self, resource: &RedisFailover) -> Result<String> {
        for pod in self.list_pods(resource, REDIS_COMPONENT).await? {
            let Some(ip) = Self::pod_ip(&pod) else {
                continue;
            };
            let (role, _) = self.redis_role(&ip).await?;
            if role == Role::Master {
                return Ok(pod.name_any());
            }
        }
        Err(Error::InconsistentState(
            "no master pod found".to_string(),
        ))
    }

    async fn slave_pods(&self, resource: &RedisFailover) -> Result<Vec<String>> {
        let mut slaves = Vec::new();
        for pod in self.list_pods(resource, REDIS_COMPONENT).await? {
            let Some(ip) = Self::pod_ip(&pod) else {
                continue;
            };
            let (role, _) = self.redis_role(&ip).await?;
            if role == Role::Slave {
                slaves.push(pod.name_any());
            }
        }
        Ok(slaves)
    }
}
