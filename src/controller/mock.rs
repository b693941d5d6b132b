//! Scripted Checker/Healer implementations for the loop tests.
//!
//! Each mock records the calls it receives; tests configure observed state
//! through plain fields and assert on the recorded call sequence.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::controller::checker::Checker;
use crate::controller::error::{Error, Result};
use crate::controller::healer::Healer;
use crate::crd::{RedisFailover, RedisFailoverSpec};

/// A RedisFailover fixture with sane defaults.
pub fn test_failover(name: &str) -> RedisFailover {
    RedisFailover {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some("test-uid".to_string()),
            ..Default::default()
        },
        spec: RedisFailoverSpec::default(),
        status: None,
    }
}

/// Scripted checker. Boolean fields flip individual checks to failing;
/// list fields feed the observation queries.
pub struct MockChecker {
    pub redis_replicas_err: bool,
    pub sentinel_replicas_err: bool,
    pub masters: usize,
    pub redis_ips: Vec<String>,
    pub min_pod_age: Duration,
    pub master: String,
    pub slaves_ok: bool,
    pub syncing_ips: Vec<String>,
    pub sentinels: Vec<String>,
    pub monitor_ok: bool,
    pub peer_count_ok: bool,
    pub slave_count_ok: bool,
    pub ss_version: String,
    pub pod_versions: HashMap<String, String>,
    pub master_pod_name: String,
    pub slave_pod_names: Vec<String>,
    pub calls: Mutex<Vec<String>>,
}

impl Default for MockChecker {
    fn default() -> Self {
        Self {
            redis_replicas_err: false,
            sentinel_replicas_err: false,
            masters: 1,
            redis_ips: Vec::new(),
            min_pod_age: Duration::ZERO,
            master: "0.0.0.0".to_string(),
            slaves_ok: true,
            syncing_ips: Vec::new(),
            sentinels: Vec::new(),
            monitor_ok: true,
            peer_count_ok: true,
            slave_count_ok: true,
            ss_version: "1".to_string(),
            pod_versions: HashMap::new(),
            master_pod_name: "master".to_string(),
            slave_pod_names: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockChecker {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: &str) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call.to_string());
    }

    fn check(&self, failing: bool, what: &str) -> Result<()> {
        if failing {
            Err(Error::InconsistentState(what.to_string()))
        } else {
            Ok(())
        }
    }
}

impl Checker for MockChecker {
    async fn check_redis_replicas(&self, _resource: &RedisFailover) -> Result<()> {
        self.record("check_redis_replicas");
        self.check(self.redis_replicas_err, "redis replicas")
    }

    async fn check_sentinel_replicas(&self, _resource: &RedisFailover) -> Result<()> {
        self.record("check_sentinel_replicas");
        self.check(self.sentinel_replicas_err, "sentinel replicas")
    }

    async fn master_count(&self, _resource: &RedisFailover) -> Result<usize> {
        self.record("master_count");
        Ok(self.masters)
    }

    async fn master_ip(&self, _resource: &RedisFailover) -> Result<String> {
        self.record("master_ip");
        Ok(self.master.clone())
    }

    async fn redis_ips(&self, _resource: &RedisFailover) -> Result<Vec<String>> {
        self.record("redis_ips");
        Ok(self.redis_ips.clone())
    }

    async fn sentinel_ips(&self, _resource: &RedisFailover) -> Result<Vec<String>> {
        self.record("sentinel_ips");
        Ok(self.sentinels.clone())
    }

    async fn min_redis_pod_age(&self, _resource: &RedisFailover) -> Result<Duration> {
        self.record("min_redis_pod_age");
        Ok(self.min_pod_age)
    }

    async fn check_slaves_point_to(
        &self,
        _master_ip: &str,
        _resource: &RedisFailover,
    ) -> Result<()> {
        self.record("check_slaves_point_to");
        self.check(!self.slaves_ok, "slave topology")
    }

    async fn check_sentinel_monitor(&self, sentinel_ip: &str, _master_ip: &str) -> Result<()> {
        self.record(&format!("check_sentinel_monitor({sentinel_ip})"));
        self.check(!self.monitor_ok, "sentinel monitor")
    }

    async fn check_sentinel_peer_count(
        &self,
        sentinel_ip: &str,
        _resource: &RedisFailover,
    ) -> Result<()> {
        self.record(&format!("check_sentinel_peer_count({sentinel_ip})"));
        self.check(!self.peer_count_ok, "sentinel peer count")
    }

    async fn check_sentinel_slave_count(
        &self,
        sentinel_ip: &str,
        _resource: &RedisFailover,
    ) -> Result<()> {
        self.record(&format!("check_sentinel_slave_count({sentinel_ip})"));
        self.check(!self.slave_count_ok, "sentinel slave count")
    }

    async fn is_redis_syncing(&self, redis_ip: &str, _resource: &RedisFailover) -> Result<bool> {
        self.record(&format!("is_redis_syncing({redis_ip})"));
        Ok(self.syncing_ips.iter().any(|ip| ip == redis_ip))
    }

    async fn statefulset_version(&self, _resource: &RedisFailover) -> Result<String> {
        self.record("statefulset_version");
        Ok(self.ss_version.clone())
    }

    async fn pod_template_version(
        &self,
        pod_name: &str,
        _resource: &RedisFailover,
    ) -> Result<String> {
        self.record(&format!("pod_template_version({pod_name})"));
        self.pod_versions
            .get(pod_name)
            .cloned()
            .ok_or_else(|| Error::MissingField(format!("version of {pod_name}")))
    }

    async fn master_pod(&self, _resource: &RedisFailover) -> Result<String> {
        self.record("master_pod");
        Ok(self.master_pod_name.clone())
    }

    async fn slave_pods(&self, _resource: &RedisFailover) -> Result<Vec<String>> {
        self.record("slave_pods");
        Ok(self.slave_pod_names.clone())
    }
}

/// Recording healer. Actions named in `fail_actions` return an error after
/// being recorded.
#[derive(Default)]
pub struct MockHealer {
    pub fail_actions: Vec<String>,
    pub calls: Mutex<Vec<String>>,
}

impl MockHealer {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: String) -> Result<()> {
        let failing = self.fail_actions.contains(&call);
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call.clone());
        if failing {
            Err(Error::Redis(format!("scripted failure: {call}")))
        } else {
            Ok(())
        }
    }
}

impl Healer for MockHealer {
    async fn make_master(&self, ip: &str, _resource: &RedisFailover) -> Result<()> {
        self.record(format!("make_master({ip})"))
    }

    async fn set_oldest_as_master(&self, _resource: &RedisFailover) -> Result<()> {
        self.record("set_oldest_as_master".to_string())
    }

    async fn set_master_on_all(&self, master_ip: &str, _resource: &RedisFailover) -> Result<()> {
        self.record(format!("set_master_on_all({master_ip})"))
    }

    async fn new_sentinel_monitor(
        &self,
        sentinel_ip: &str,
        master_ip: &str,
        _resource: &RedisFailover,
    ) -> Result<()> {
        self.record(format!("new_sentinel_monitor({sentinel_ip}, {master_ip})"))
    }

    async fn restore_sentinel(&self, sentinel_ip: &str) -> Result<()> {
        self.record(format!("restore_sentinel({sentinel_ip})"))
    }

    async fn set_redis_custom_config(&self, ip: &str, _resource: &RedisFailover) -> Result<()> {
        self.record(format!("set_redis_custom_config({ip})"))
    }

    async fn set_sentinel_custom_config(&self, ip: &str, _resource: &RedisFailover) -> Result<()> {
        self.record(format!("set_sentinel_custom_config({ip})"))
    }

    async fn delete_pod(&self, pod_name: &str, _resource: &RedisFailover) -> Result<()> {
        self.record(format!("delete_pod({pod_name})"))
    }
}
