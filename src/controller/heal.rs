//! The check-and-heal loop.
//!
//! Executed once per reconciliation after the workload objects are ensured.
//! The ordered decision sequence encodes the repair priority: master
//! cardinality precedes slave repair because reconfiguring slaves against a
//! fake master is destructive, and Sentinel repair follows replication
//! repair so Sentinels observe the intended topology before their memory is
//! reset.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::controller::checker::Checker;
use crate::controller::error::{Error, Result};
use crate::controller::healer::Healer;
use crate::crd::RedisFailover;

/// Minimum age of the youngest Redis pod before the operator elects a master
/// out of zero. Younger pods mean the cluster is still coming up or a
/// Sentinel failover is in flight.
pub const BOOTSTRAP_GRACE: Duration = Duration::from_secs(120);

/// What one check-and-heal pass observed, for status and metrics.
#[derive(Debug, Default)]
pub struct HealReport {
    /// Redises reporting role:master when the pass ran.
    pub masters_seen: usize,
    /// The single master's IP, when cardinality was correct.
    pub master_ip: Option<String>,
    /// Sentinels inspected.
    pub sentinels_total: usize,
    /// Sentinels that passed every check without needing a heal.
    pub sentinels_healthy: usize,
    /// Per-sentinel heal failures; the loop continues past them so
    /// independent repairs still happen in the same iteration.
    pub sentinel_errors: Vec<Error>,
}

/// Run one check-and-heal pass over the cluster.
///
/// Observations happen before mutations; writes are issued sequentially. On
/// the first branch that triggers a bootstrap heal the pass stops, leaving
/// the follow-up convergence to the next iteration.
pub async fn check_and_heal<C: Checker, H: Healer>(
    resource: &RedisFailover,
    checker: &C,
    healer: &H,
) -> Result<HealReport> {
    let mut report = HealReport::default();

    // The orchestrator must have settled before the data plane is touched.
    checker.check_redis_replicas(resource).await?;
    checker.check_sentinel_replicas(resource).await?;

    let masters = checker.master_count(resource).await?;
    report.masters_seen = masters;

    match masters {
        0 => {
            let redises = checker.redis_ips(resource).await?;
            if redises.len() == 1 {
                // Bootstrap: a single reachable Redis becomes the master.
                healer.make_master(&redises[0], resource).await?;
                return Ok(report);
            }

            let min_age = checker.min_redis_pod_age(resource).await?;
            if min_age >= BOOTSTRAP_GRACE {
                info!(min_age_secs = min_age.as_secs(), "No master and pods settled, electing oldest");
                healer.set_oldest_as_master(resource).await?;
            } else {
                debug!(
                    min_age_secs = min_age.as_secs(),
                    "No master yet, waiting out the bootstrap grace"
                );
            }
            return Ok(report);
        }
        1 => {}
        n => {
            // Sentinel is the authority on demotion; picking a winner here
            // could discard acknowledged writes.
            return Err(Error::InconsistentState(format!(
                "{n} masters found, waiting for sentinel to resolve"
            )));
        }
    }

    let master_ip = checker.master_ip(resource).await?;
    report.master_ip = Some(master_ip.clone());

    if let Err(e) = checker.check_slaves_point_to(&master_ip, resource).await {
        warn!(master = %master_ip, error = %e, "Slave topology drifted, repointing");
        healer.set_master_on_all(&master_ip, resource).await?;
    }

    // A slave mid-sync is rebuilding its dataset from the master; further
    // writes this iteration could interrupt the transfer.
    for ip in checker.redis_ips(resource).await? {
        if checker.is_redis_syncing(&ip, resource).await? {
            debug!(ip = %ip, "Redis syncing, deferring remaining heals");
            return Ok(report);
        }
    }

    healer.set_redis_custom_config(&master_ip, resource).await?;

    let sentinels = checker.sentinel_ips(resource).await?;
    report.sentinels_total = sentinels.len();

    for sentinel in &sentinels {
        match heal_sentinel(resource, checker, healer, sentinel, &master_ip).await {
            Ok(healthy) => {
                if healthy {
                    report.sentinels_healthy += 1;
                }
            }
            Err(e) => {
                // Keep going; the remaining sentinels can still converge.
                warn!(sentinel = %sentinel, error = %e, "Sentinel heal failed");
                report.sentinel_errors.push(e);
            }
        }
    }

    Ok(report)
}

/// Converge a single Sentinel. Returns whether it was already healthy.
async fn heal_sentinel<C: Checker, H: Healer>(
    resource: &RedisFailover,
    checker: &C,
    healer: &H,
    sentinel: &str,
    master_ip: &str,
) -> Result<bool> {
    let mut healthy = true;

    if checker.check_sentinel_monitor(sentinel, master_ip).await.is_err() {
        healthy = false;
        healer
            .new_sentinel_monitor(sentinel, master_ip, resource)
            .await?;
    }

    // A reset already forces rediscovery of both peers and slaves; a second
    // reset in the same pass would be a no-op, so it is skipped outright.
    let mut reset_done = false;

    if checker.check_sentinel_peer_count(sentinel, resource).await.is_err() {
        healthy = false;
        healer.restore_sentinel(sentinel).await?;
        reset_done = true;
    }

    if checker
        .check_sentinel_slave_count(sentinel, resource)
        .await
        .is_err()
    {
        healthy = false;
        if !reset_done {
            healer.restore_sentinel(sentinel).await?;
        }
    }

    healer.set_sentinel_custom_config(sentinel, resource).await?;

    Ok(healthy)
}
