//! Operator-controlled rolling updates.
//!
//! The StatefulSet uses an OnDelete strategy; this module decides deletion
//! order when pod templates drift. Slaves are replaced first, one per
//! iteration, and the master only once every slave already runs the current
//! template. Deleting the master hands the write role to a replica via
//! Sentinel, so doing it last minimizes write-availability loss.

use tracing::{debug, info};

use crate::controller::checker::Checker;
use crate::controller::error::Result;
use crate::controller::healer::Healer;
use crate::crd::RedisFailover;

/// Replace pods whose `deployment-version` label no longer matches the
/// StatefulSet template hash.
///
/// At most one pod is deleted per invocation; the StatefulSet recreates it
/// and the next reconciliation continues the rollout.
pub async fn update_redis_pods<C: Checker, H: Healer>(
    resource: &RedisFailover,
    checker: &C,
    healer: &H,
) -> Result<()> {
    // Never take a pod away while a replica is mid-sync.
    for ip in checker.redis_ips(resource).await? {
        if checker.is_redis_syncing(&ip, resource).await? {
            debug!(ip = %ip, "Redis syncing, deferring rolling update");
            return Ok(());
        }
    }

    let ss_version = checker.statefulset_version(resource).await?;

    for pod in checker.slave_pods(resource).await? {
        let pod_version = checker.pod_template_version(&pod, resource).await?;
        if pod_version != ss_version {
            info!(pod = %pod, from = %pod_version, to = %ss_version, "Replacing stale slave");
            healer.delete_pod(&pod, resource).await?;
            // One pod per iteration; the StatefulSet recreates it in order
            return Ok(());
        }
    }

    // Only once every slave runs the current template may the master go.
    let master = checker.master_pod(resource).await?;
    let master_version = checker.pod_template_version(&master, resource).await?;
    if master_version != ss_version {
        info!(pod = %master, from = %master_version, to = %ss_version, "Replacing stale master");
        healer.delete_pod(&master, resource).await?;
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::controller::mock::{MockChecker, MockHealer, test_failover};

    fn versions(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(pod, version)| (pod.to_string(), version.to_string()))
            .collect()
    }

    fn rollout_checker(pod_versions: HashMap<String, String>, ss_version: &str) -> MockChecker {
        MockChecker {
            redis_ips: vec![
                "0.0.0.0".to_string(),
                "0.0.0.1".to_string(),
                "1.1.1.1".to_string(),
            ],
            ss_version: ss_version.to_string(),
            pod_versions,
            master_pod_name: "master".to_string(),
            slave_pod_names: vec!["slave1".to_string(), "slave2".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_all_current_no_deletes() {
        let rf = test_failover("test");
        let checker = rollout_checker(
            versions(&[("slave1", "10"), ("slave2", "10"), ("master", "10")]),
            "10",
        );
        let healer = MockHealer::default();

        update_redis_pods(&rf, &checker, &healer).await.unwrap();

        assert!(healer.calls().is_empty());
        // The master was inspected, meaning the slave pass completed
        assert!(checker.calls().iter().any(|c| c == "master_pod"));
    }

    #[tokio::test]
    async fn test_syncing_defers_rollout() {
        let rf = test_failover("test");
        let checker = MockChecker {
            syncing_ips: vec!["0.0.0.1".to_string()],
            ..rollout_checker(
                versions(&[("slave1", "9"), ("slave2", "9"), ("master", "9")]),
                "10",
            )
        };
        let healer = MockHealer::default();

        update_redis_pods(&rf, &checker, &healer).await.unwrap();

        assert!(healer.calls().is_empty());
        assert!(!checker.calls().iter().any(|c| c == "statefulset_version"));
    }

    #[tokio::test]
    async fn test_stale_slave_deleted_master_untouched() {
        let rf = test_failover("test");
        let checker = rollout_checker(
            versions(&[("slave1", "9"), ("slave2", "10"), ("master", "10")]),
            "10",
        );
        let healer = MockHealer::default();

        update_redis_pods(&rf, &checker, &healer).await.unwrap();

        assert_eq!(healer.calls(), vec!["delete_pod(slave1)".to_string()]);
        // The master is not even queried in the iteration that deleted a slave
        assert!(!checker.calls().iter().any(|c| c == "master_pod"));
    }

    #[tokio::test]
    async fn test_one_slave_per_iteration() {
        let rf = test_failover("test");
        let checker = rollout_checker(
            versions(&[("slave1", "9"), ("slave2", "9"), ("master", "9")]),
            "10",
        );
        let healer = MockHealer::default();

        update_redis_pods(&rf, &checker, &healer).await.unwrap();

        assert_eq!(healer.calls(), vec!["delete_pod(slave1)".to_string()]);
    }

    #[tokio::test]
    async fn test_master_deleted_only_when_slaves_current() {
        let rf = test_failover("test");
        let checker = rollout_checker(
            versions(&[("slave1", "10"), ("slave2", "10"), ("master", "9")]),
            "10",
        );
        let healer = MockHealer::default();

        update_redis_pods(&rf, &checker, &healer).await.unwrap();

        assert_eq!(healer.calls(), vec!["delete_pod(master)".to_string()]);
    }
}
