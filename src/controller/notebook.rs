//! Notebook reconciler
//!
//! One pass, in order:
//! 1. compile the desired children from the Notebook and the controller config
//! 2. sync PVC, StatefulSet, Service, Ingress, Certificate and, with Istio, the VirtualService
//! 3. fold the StatefulSet's ready replicas and the primary pod's state into status
//! 4. apply the idle-culling decision
//!
//! Any failure aborts the pass; the next attempt starts over from step 1.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::client::{KubeClientImpl, NotebookKubeClient};
use crate::compiler::{pod_name, NotebookCompiler};
use crate::config::ControllerConfig;
use crate::crd::Notebook;
use crate::culler::{self, CullDecision};
use crate::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use crate::metrics::{self, ErrorType, ReconcileTimer};
use crate::status;
use crate::sync::sync_child;
use crate::Error;

/// Name the controller reports as on Events and writes
pub const CONTROLLER_NAME: &str = "notebook-controller";

/// Requeue delay after an optimistic concurrency conflict
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Requeue delay after a retryable failure
pub const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Controller context shared by every reconcile
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn NotebookKubeClient>,
    /// Event recorder
    pub events: Arc<dyn EventPublisher>,
    /// Configuration frozen at startup
    pub config: Arc<ControllerConfig>,
}

impl Context {
    /// Create a context talking to the cluster through `client`
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        Self {
            kube: Arc::new(KubeClientImpl::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
            config: Arc::new(config),
        }
    }

    /// Create a context from explicit collaborators
    ///
    /// Primarily for unit tests where the client and event recorder are fakes.
    pub fn for_testing(
        kube: Arc<dyn NotebookKubeClient>,
        events: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            kube,
            events,
            config: Arc::new(config),
        }
    }
}

/// Reconcile a Notebook
///
/// Returns the requeue action: the idleness check period while a pod exists,
/// otherwise wait for the next change.
#[instrument(
    skip(notebook, ctx),
    fields(
        notebook = %notebook.name_any(),
        namespace = %notebook.namespace().unwrap_or_default(),
    )
)]
pub async fn reconcile(notebook: Arc<Notebook>, ctx: Arc<Context>) -> Result<Action, Error> {
    let timer = ReconcileTimer::start();
    let result = reconcile_at(&notebook, &ctx, Utc::now()).await;
    match &result {
        Ok(_) => timer.success(),
        Err(e) => timer.error(ErrorType::of(e)),
    }
    result
}

pub(crate) async fn reconcile_at(
    notebook: &Notebook,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    if notebook.meta().deletion_timestamp.is_some() {
        debug!("notebook is being deleted, children go with it");
        return Ok(Action::await_change());
    }

    let name = notebook.name_any();
    let namespace = notebook.require_namespace()?;
    let kube = ctx.kube.as_ref();

    let desired = match NotebookCompiler::new(&ctx.config).compile(notebook) {
        Ok(desired) => desired,
        Err(Error::Validation(msg)) => {
            warn!(error = %msg, "notebook validation failed");
            ctx.events
                .publish(
                    &notebook.object_ref(&()),
                    EventType::Warning,
                    reasons::VALIDATION_FAILED,
                    actions::RECONCILE,
                    Some(msg),
                )
                .await;
            // Needs a spec change
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e),
    };

    sync_child(kube, &desired.pvc).await?;
    let stateful_set = sync_child(kube, &desired.stateful_set).await?.object;
    sync_child(kube, &desired.service).await?;
    sync_child(kube, &desired.ingress).await?;
    sync_child(kube, &desired.certificate).await?;
    if let Some(virtual_service) = &desired.virtual_service {
        sync_child(kube, virtual_service).await?;
    }

    let pod = kube.get_pod(&namespace, &pod_name(&name)).await?;
    if pod.is_none() {
        debug!("notebook pod not found");
    }

    let ready_replicas = stateful_set
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    let primary = notebook
        .spec
        .template
        .spec
        .containers
        .first()
        .map(|c| c.name.as_str())
        .unwrap_or_default();
    let change = status::observe(
        &notebook.status_or_default(),
        ready_replicas,
        pod.as_ref(),
        primary,
        now,
    );
    let current = if change.changed {
        info!(
            ready_replicas = change.status.ready_replicas,
            conditions = change.status.conditions.len(),
            "updating notebook status"
        );
        kube.patch_notebook_status(notebook, &change.status).await?
    } else {
        notebook.clone()
    };

    match culler::decide(&current.metadata, pod.is_some(), &ctx.config.culling, now) {
        CullDecision::Nothing => Ok(Action::await_change()),
        CullDecision::ClearLastActivity => {
            info!("notebook has no pod, removing last-activity annotation");
            let mut updated = current;
            culler::remove_last_activity(&mut updated.metadata);
            kube.replace_notebook(&updated).await?;
            Ok(Action::await_change())
        }
        CullDecision::Cull => {
            info!("notebook idle past the limit, culling");
            let mut updated = current;
            culler::set_stop_annotation(&mut updated.metadata, now);
            kube.replace_notebook(&updated).await?;
            metrics::record_cull(&namespace, &name, now);
            ctx.events
                .publish(
                    &updated.object_ref(&()),
                    EventType::Normal,
                    reasons::CULLED,
                    actions::CULL,
                    Some(format!(
                        "Idle for longer than {} minutes, scaling to zero",
                        ctx.config.culling.idle_time.as_secs() / 60
                    )),
                )
                .await;
            Ok(Action::requeue(culler::requeue_time(&ctx.config.culling)))
        }
        CullDecision::Recheck(after) => Ok(Action::requeue(after)),
    }
}

/// Error policy for the Notebook controller
///
/// Conflicts are retried almost immediately against fresh state, other
/// retryable errors after a pause, and permanent errors wait for a change.
pub fn error_policy(notebook: Arc<Notebook>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_conflict() {
        debug!(notebook = %notebook.name_any(), "write conflict, retrying");
        return Action::requeue(CONFLICT_REQUEUE);
    }
    if !error.is_retryable() {
        warn!(
            ?error,
            notebook = %notebook.name_any(),
            "reconciliation failed permanently"
        );
        return Action::await_change();
    }
    error!(
        ?error,
        notebook = %notebook.name_any(),
        "reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE)
}
