//! Kubernetes Events emitted by the controller
//!
//! The reconciler reports culling and rejected Notebooks, and the relay
//! re-emits pod and StatefulSet events, all through [`EventPublisher`].
//! Publishing never fails from the caller's point of view: a rejected event
//! is logged and dropped.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Sink for Events about Notebooks and their children
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Record an Event regarding `regarding`
    ///
    /// `reason` is the machine-readable cause (see [`reasons`]), `action` what
    /// the controller did about it (see [`actions`]), `note` the text shown by
    /// `kubectl describe`.
    async fn publish(
        &self,
        regarding: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by the `events.k8s.io` API
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Publisher reporting as `controller_name`, with the pod name from the
    /// downward API as the instance when available
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        regarding: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, regarding).await {
            warn!(
                object = ?regarding.name,
                reason,
                error = %e,
                "dropping event the API server rejected"
            );
        }
    }
}

/// Publisher that discards everything
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _: &ObjectReference, _: EventType, _: &str, _: &str, _: Option<String>) {}
}

/// Event reasons
pub mod reasons {
    /// The notebook was idle past the limit and scaled to zero
    pub const CULLED: &str = "Culled";
    /// The Notebook cannot be compiled into children as written
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
}

/// Event actions
pub mod actions {
    /// A regular reconcile pass
    pub const RECONCILE: &str = "Reconcile";
    /// Scaling an idle notebook to zero
    pub const CULL: &str = "Cull";
    /// Re-emitting a child object's event on its Notebook
    pub const REISSUE: &str = "Reissue";
}
