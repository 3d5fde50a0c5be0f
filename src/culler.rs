//! Idle culling
//!
//! An external activity probe keeps [`LAST_ACTIVITY_ANNOTATION`] current on
//! each Notebook. Once that timestamp is older than the configured idle time
//! the controller sets [`STOP_ANNOTATION`], which the compiler turns into a
//! zero-replica StatefulSet. Clearing the stop marker is left to the user.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, warn};

use crate::config::CullingConfig;

/// RFC 3339 timestamp of the notebook's last observed activity
pub const LAST_ACTIVITY_ANNOTATION: &str = "notebooks.kubeflow.org/last-activity";

/// Present while the notebook is stopped; value is the RFC 3339 stop time
pub const STOP_ANNOTATION: &str = "notebooks.kubeflow.org/kubeflow-resource-stopped";

/// What the reconciler should do about idleness this pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullDecision {
    /// No pod is running: drop the stale last-activity annotation
    ClearLastActivity,
    /// No pod and nothing to clean up
    Nothing,
    /// Idle past the limit: set the stop marker and persist it
    Cull,
    /// Check again after the given period
    Recheck(Duration),
}

/// Whether the notebook is marked as stopped
pub fn stop_annotation_is_set(meta: &ObjectMeta) -> bool {
    meta.annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(STOP_ANNOTATION))
}

/// Mark the notebook as stopped at `now`
pub fn set_stop_annotation(meta: &mut ObjectMeta, now: DateTime<Utc>) {
    meta.annotations.get_or_insert_with(Default::default).insert(
        STOP_ANNOTATION.to_string(),
        now.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
}

/// Remove the last-activity annotation, returning whether it was present
pub fn remove_last_activity(meta: &mut ObjectMeta) -> bool {
    meta.annotations
        .as_mut()
        .is_some_and(|a| a.remove(LAST_ACTIVITY_ANNOTATION).is_some())
}

/// Whether the notebook has been idle longer than the configured limit
pub fn needs_culling(meta: &ObjectMeta, config: &CullingConfig, now: DateTime<Utc>) -> bool {
    if !config.enabled || stop_annotation_is_set(meta) {
        return false;
    }
    let Some(raw) = meta
        .annotations
        .as_ref()
        .and_then(|a| a.get(LAST_ACTIVITY_ANNOTATION))
    else {
        debug!("no last-activity annotation, not culling");
        return false;
    };
    let last_activity = match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            warn!(value = %raw, error = %e, "unparsable last-activity annotation");
            return false;
        }
    };
    let idle = now.signed_duration_since(last_activity);
    match idle.to_std() {
        Ok(idle) => idle > config.idle_time,
        // Activity in the future
        Err(_) => false,
    }
}

/// Delay before the next idleness check
pub fn requeue_time(config: &CullingConfig) -> Duration {
    config.check_period
}

/// Decide what to do about idleness once status has been written
pub fn decide(
    meta: &ObjectMeta,
    pod_exists: bool,
    config: &CullingConfig,
    now: DateTime<Utc>,
) -> CullDecision {
    if !pod_exists {
        let has_activity = meta
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(LAST_ACTIVITY_ANNOTATION));
        return if has_activity {
            CullDecision::ClearLastActivity
        } else {
            CullDecision::Nothing
        };
    }
    if needs_culling(meta, config, now) {
        CullDecision::Cull
    } else {
        CullDecision::Recheck(requeue_time(config))
    }
}
