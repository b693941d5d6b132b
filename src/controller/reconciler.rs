//! Reconciliation loop for RedisFailover.
//!
//! One pass per event or resync: validate the spec, ensure the workload
//! objects, run check-and-heal against the live cluster, then advance any
//! pending rolling update. Every step is best-effort; errors requeue the
//! resource with capped exponential backoff.

use std::sync::Arc;
use std::time::Instant;

use kube::{
    Api, ResourceExt,
    api::{Patch, PatchParams},
    runtime::controller::Action,
};
use tracing::{debug, error, info, warn};

use crate::controller::{
    checker::ClusterChecker,
    context::{Context, FIELD_MANAGER},
    error::{Error, backoff_for_attempt},
    heal::{HealReport, check_and_heal},
    healer::ClusterHealer,
    rolling_update::update_redis_pods,
};
use crate::crd::{Condition, Phase, RedisFailover, RedisFailoverStatus};
use crate::resources::{
    configmaps::{
        generate_redis_configmap, generate_redis_shutdown_configmap, generate_sentinel_configmap,
    },
    deployment::generate_sentinel_deployment,
    pdb::{generate_redis_pdb, generate_sentinel_pdb},
    services::{generate_redis_headless_service, generate_sentinel_service},
    statefulset::generate_redis_statefulset,
};

/// Reconcile a RedisFailover.
pub async fn reconcile(obj: Arc<RedisFailover>, ctx: Arc<Context>) -> Result<Action, Error> {
    // Bound cross-resource parallelism; per-resource serialization comes
    // from the controller's keyed queue.
    let _permit = ctx.reconcile_permits.acquire().await.ok();

    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let key = format!("{namespace}/{name}");

    debug!(name = %name, namespace = %namespace, "Reconciling RedisFailover");

    let api: Api<RedisFailover> = Api::namespaced(ctx.client.clone(), &namespace);

    // Deletion cascades through owner references; claims marked
    // keep-after-deletion carry none and survive.
    if obj.metadata.deletion_timestamp.is_some() {
        debug!(name = %name, "Resource deleting, nothing to do");
        return Ok(Action::await_change());
    }

    if let Err(e) = validate_spec(&obj) {
        error!(name = %name, error = %e, "Spec validation failed");
        ctx.publish_warning_event(&obj, "ValidationFailed", "Validating", Some(e.to_string()))
            .await;
        if let Some(ref state) = ctx.health_state {
            state.metrics.record_error(e.kind_label());
        }
        let status = degraded_status(&obj, &e.to_string());
        patch_status(&api, &name, status).await?;
        // Invalid specs are not retried until the user changes them
        return Ok(Action::await_change());
    }

    apply_resources(&obj, &ctx, &namespace).await?;

    let password = ctx.get_auth_password(&obj, &namespace).await?;
    let checker = ClusterChecker::new(ctx.client.clone(), password.clone());
    let healer = ClusterHealer::new(ctx.client.clone(), password, ctx.health_state.clone());

    let report = check_and_heal(&obj, &checker, &healer).await?;
    for e in &report.sentinel_errors {
        if let Some(ref state) = ctx.health_state {
            state.metrics.record_error(e.kind_label());
        }
    }

    update_redis_pods(&obj, &checker, &healer).await?;

    let converged = report.masters_seen == 1
        && report.sentinels_total > 0
        && report.sentinels_healthy == report.sentinels_total
        && report.sentinel_errors.is_empty();

    let status = convergence_status(&obj, &report, converged);
    patch_status(&api, &name, status).await?;

    if converged {
        debug!(name = %name, "Cluster converged");
    } else {
        info!(
            name = %name,
            masters = report.masters_seen,
            sentinels_healthy = report.sentinels_healthy,
            sentinels_total = report.sentinels_total,
            "Cluster not yet converged"
        );
    }

    if let Some(ref state) = ctx.health_state {
        let duration = start_time.elapsed().as_secs_f64();
        state.metrics.record_reconcile(&namespace, &name, duration);
        state.metrics.set_convergence(
            &namespace,
            &name,
            report.masters_seen as i64,
            report.sentinels_healthy as i64,
        );
    }

    ctx.reset_failures(&key);
    Ok(Action::requeue(ctx.resync_period))
}

/// Error policy for the controller.
pub fn error_policy(obj: Arc<RedisFailover>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let key = format!("{namespace}/{name}");

    if let Some(ref state) = ctx.health_state {
        state.metrics.record_error(error.kind_label());
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if !error.is_retryable() {
        error!(name = %name, error = %error, "Non-retryable error, waiting for spec change");
        return Action::await_change();
    }

    let attempt = ctx.record_failure(&key);
    let delay = backoff_for_attempt(attempt);
    warn!(name = %name, error = %error, attempt, delay_ms = delay.as_millis() as u64, "Requeueing with backoff");
    Action::requeue(delay)
}

/// Validate the resource spec. Invariants of the desired state: at least
/// three replicas on both sides, non-empty images, unambiguous storage.
fn validate_spec(resource: &RedisFailover) -> Result<(), Error> {
    let spec = &resource.spec;

    if spec.redis.replicas < 3 {
        return Err(Error::Validation(format!(
            "redis.replicas must be at least 3, got {}",
            spec.redis.replicas
        )));
    }
    if spec.sentinel.replicas < 3 {
        return Err(Error::Validation(format!(
            "sentinel.replicas must be at least 3, got {}",
            spec.sentinel.replicas
        )));
    }
    if spec.redis.image.is_empty() {
        return Err(Error::Validation("redis.image must not be empty".to_string()));
    }
    if spec.sentinel.image.is_empty() {
        return Err(Error::Validation(
            "sentinel.image must not be empty".to_string(),
        ));
    }
    if spec.redis.storage.persistent_volume_claim.is_some()
        && spec.redis.storage.empty_dir.is_some()
    {
        return Err(Error::Validation(
            "storage.emptyDir and storage.persistentVolumeClaim are mutually exclusive"
                .to_string(),
        ));
    }

    Ok(())
}

/// Apply every owned object with server-side apply, in dependency order.
async fn apply_resources(
    resource: &RedisFailover,
    ctx: &Context,
    namespace: &str,
) -> Result<(), Error> {
    let params = PatchParams::apply(FIELD_MANAGER).force();

    let cm_api: Api<k8s_openapi::api::core::v1::ConfigMap> =
        Api::namespaced(ctx.client.clone(), namespace);
    for configmap in [
        generate_redis_configmap(resource),
        generate_redis_shutdown_configmap(resource),
        generate_sentinel_configmap(resource),
    ] {
        let name = configmap.metadata.name.clone().unwrap_or_default();
        cm_api
            .patch(&name, &params, &Patch::Apply(&configmap))
            .await?;
    }

    let svc_api: Api<k8s_openapi::api::core::v1::Service> =
        Api::namespaced(ctx.client.clone(), namespace);
    for service in [
        generate_redis_headless_service(resource),
        generate_sentinel_service(resource),
    ] {
        let name = service.metadata.name.clone().unwrap_or_default();
        svc_api
            .patch(&name, &params, &Patch::Apply(&service))
            .await?;
    }

    let pdb_api: Api<k8s_openapi::api::policy::v1::PodDisruptionBudget> =
        Api::namespaced(ctx.client.clone(), namespace);
    for pdb in [generate_redis_pdb(resource), generate_sentinel_pdb(resource)] {
        let name = pdb.metadata.name.clone().unwrap_or_default();
        pdb_api.patch(&name, &params, &Patch::Apply(&pdb)).await?;
    }

    let sts = generate_redis_statefulset(resource);
    let sts_api: Api<k8s_openapi::api::apps::v1::StatefulSet> =
        Api::namespaced(ctx.client.clone(), namespace);
    let sts_name = sts.metadata.name.clone().unwrap_or_default();
    sts_api.patch(&sts_name, &params, &Patch::Apply(&sts)).await?;

    let deploy = generate_sentinel_deployment(resource);
    let deploy_api: Api<k8s_openapi::api::apps::v1::Deployment> =
        Api::namespaced(ctx.client.clone(), namespace);
    let deploy_name = deploy.metadata.name.clone().unwrap_or_default();
    deploy_api
        .patch(&deploy_name, &params, &Patch::Apply(&deploy))
        .await?;

    debug!(name = %resource.name_any(), "Applied owned resources");
    Ok(())
}

fn degraded_status(resource: &RedisFailover, message: &str) -> RedisFailoverStatus {
    let generation = resource.metadata.generation;
    RedisFailoverStatus {
        phase: Phase::Failed,
        master_ip: None,
        observed_generation: generation,
        conditions: vec![Condition::degraded(
            true,
            "SpecInvalid",
            message,
            generation,
        )],
    }
}

fn convergence_status(
    resource: &RedisFailover,
    report: &HealReport,
    converged: bool,
) -> RedisFailoverStatus {
    let generation = resource.metadata.generation;
    let conditions = if converged {
        vec![Condition::ready(
            true,
            "Converged",
            "One master, replication and sentinels in sync",
            generation,
        )]
    } else {
        vec![Condition::progressing(
            true,
            "Converging",
            &format!(
                "{} masters seen, {}/{} sentinels healthy",
                report.masters_seen, report.sentinels_healthy, report.sentinels_total
            ),
            generation,
        )]
    };

    RedisFailoverStatus {
        phase: if converged { Phase::Running } else { Phase::Degraded },
        master_ip: report.master_ip.clone(),
        observed_generation: generation,
        conditions,
    }
}

async fn patch_status(
    api: &Api<RedisFailover>,
    name: &str,
    status: RedisFailoverStatus,
) -> Result<(), Error> {
    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}
