//! Notebook status derived from the primary pod
//!
//! The status mirrors the StatefulSet's ready replicas and the state of the
//! pod's primary container, found by name since the kubelet reports container
//! statuses in its own order. Each state change prepends one condition to a
//! most-recent-first history; repeating the head observation is a no-op.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ContainerState, Pod};

use crate::crd::{NotebookCondition, NotebookConditionType, NotebookStatus};

/// Result of observing the cluster against the stored status
#[derive(Clone, Debug, PartialEq)]
pub struct StatusChange {
    /// Status to persist
    pub status: NotebookStatus,
    /// Whether `status` differs from what is stored
    pub changed: bool,
}

/// Condition describing a container state, or `None` when the runtime
/// reported no state at all
pub fn next_condition(state: &ContainerState, now: DateTime<Utc>) -> Option<NotebookCondition> {
    if state.running.is_some() {
        return Some(NotebookCondition::new(
            NotebookConditionType::Running,
            "",
            "",
            now,
        ));
    }
    if let Some(waiting) = &state.waiting {
        return Some(NotebookCondition::new(
            NotebookConditionType::Waiting,
            waiting.reason.clone().unwrap_or_default(),
            waiting.message.clone().unwrap_or_default(),
            now,
        ));
    }
    state.terminated.as_ref().map(|terminated| {
        let reason = terminated.reason.clone().unwrap_or_default();
        let message = terminated
            .message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| reason.clone());
        NotebookCondition::new(NotebookConditionType::Terminated, reason, message, now)
    })
}

/// Prepend `condition` unless it repeats the head; returns whether it was added
pub fn push_condition(history: &mut Vec<NotebookCondition>, condition: NotebookCondition) -> bool {
    if history
        .first()
        .is_some_and(|head| head.same_observation(&condition))
    {
        return false;
    }
    history.insert(0, condition);
    true
}

fn container_state<'a>(pod: &'a Pod, container: &str) -> Option<&'a ContainerState> {
    pod.status
        .as_ref()?
        .container_statuses
        .as_ref()?
        .iter()
        .find(|s| s.name == container)?
        .state
        .as_ref()
}

/// Fold the observed ready replicas and the state of `primary_container` in
/// `pod` into the stored status
pub fn observe(
    stored: &NotebookStatus,
    sts_ready_replicas: i32,
    pod: Option<&Pod>,
    primary_container: &str,
    now: DateTime<Utc>,
) -> StatusChange {
    let mut status = stored.clone();
    let mut changed = false;

    if status.ready_replicas != sts_ready_replicas {
        status.ready_replicas = sts_ready_replicas;
        changed = true;
    }

    if let Some(state) = pod.and_then(|p| container_state(p, primary_container)) {
        if status.container_state.as_ref() != Some(state) {
            status.container_state = Some(state.clone());
            changed = true;
            if let Some(condition) = next_condition(state, now) {
                push_condition(&mut status.conditions, condition);
            }
        }
    }

    StatusChange { status, changed }
}
