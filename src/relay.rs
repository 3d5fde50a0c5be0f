//! Re-emission of child object events on their Notebook
//!
//! Events the kubelet and the StatefulSet controller raise against a
//! notebook's pod or StatefulSet are copied onto the Notebook itself, so
//! `kubectl describe notebook` shows why a notebook is not starting.
//!
//! Pods are linked to their Notebook only through the `notebook-name` label
//! the compiler puts on the pod template, and are read from a local cache of
//! labelled pods. Removing that label silently detaches the pod.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Event, ObjectReference, Pod};
use kube::runtime::events::EventType;
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, info, warn};

use crate::compiler::NOTEBOOK_NAME_LABEL;
use crate::controller::NotebookKubeClient;
use crate::crd::Notebook;
use crate::events::{actions, EventPublisher};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::Error;

const POD_KIND: &str = "Pod";
const STATEFULSET_KIND: &str = "StatefulSet";

/// Name of the Notebook a pod or StatefulSet belongs to
///
/// Returns `None` for subjects of any other kind, for pods missing from the
/// cache of labelled pods, and for pods without the `notebook-name` label.
pub fn notebook_name_for(pods: &Store<Pod>, subject: &ObjectReference) -> Option<String> {
    let name = subject.name.as_deref()?;
    match subject.kind.as_deref() {
        Some(STATEFULSET_KIND) => Some(name.to_string()),
        Some(POD_KIND) => {
            let namespace = subject.namespace.as_deref().unwrap_or_default();
            let pod = pods.get(&ObjectRef::new(name).within(namespace))?;
            pod.labels().get(NOTEBOOK_NAME_LABEL).cloned()
        }
        _ => None,
    }
}

/// The live Notebook an event is about, if any
///
/// `Ok(None)` when the subject is unrelated or the Notebook does not exist;
/// an error when the Notebook lookup itself failed.
pub async fn notebook_for_event(
    kube: &dyn NotebookKubeClient,
    pods: &Store<Pod>,
    event: &Event,
) -> Result<Option<Notebook>, Error> {
    let Some(name) = notebook_name_for(pods, &event.involved_object) else {
        return Ok(None);
    };
    let namespace = event.namespace().unwrap_or_default();
    kube.get_notebook(&namespace, &name).await
}

/// Whether an event should be re-emitted on a Notebook
///
/// A failed Notebook lookup other than NotFound lets the event through, and
/// [`relay_with_retry`] keeps trying to resolve it.
pub async fn should_relay(kube: &dyn NotebookKubeClient, pods: &Store<Pod>, event: &Event) -> bool {
    match notebook_for_event(kube, pods, event).await {
        Ok(found) => found.is_some(),
        Err(e) => {
            warn!(event = %event.name_any(), error = %e, "notebook lookup failed, relaying event anyway");
            true
        }
    }
}

/// Message of the re-emitted event
pub fn reissued_message(event: &Event) -> String {
    let subject = &event.involved_object;
    format!(
        "Reissued from {}/{}: {}",
        subject.kind.as_deref().unwrap_or_default().to_lowercase(),
        subject.name.as_deref().unwrap_or_default(),
        event.message.as_deref().unwrap_or_default()
    )
}

fn event_type(event: &Event) -> EventType {
    match event.type_.as_deref() {
        Some("Warning") => EventType::Warning,
        _ => EventType::Normal,
    }
}

/// Re-emit `event` on the already resolved `notebook`
pub async fn relay_event(publisher: &dyn EventPublisher, notebook: &Notebook, event: &Event) {
    let reason = event.reason.clone().unwrap_or_default();
    debug!(notebook = %notebook.name_any(), reason = %reason, "re-emitting event on notebook");
    publisher
        .publish(
            &notebook.object_ref(&()),
            event_type(event),
            &reason,
            actions::REISSUE,
            Some(reissued_message(event)),
        )
        .await;
}

/// Resolve `event`'s Notebook, retrying failed lookups with backoff, and
/// re-emit it there; returns whether an event was published
pub async fn relay_with_retry(
    kube: &dyn NotebookKubeClient,
    pods: &Store<Pod>,
    publisher: &dyn EventPublisher,
    event: &Event,
    retry: &RetryConfig,
) -> Result<bool, Error> {
    let notebook = retry_with_backoff(retry, "resolve event notebook", Error::is_retryable, || {
        notebook_for_event(kube, pods, event)
    })
    .await?;
    match notebook {
        Some(notebook) => {
            relay_event(publisher, &notebook, event).await;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Watch trigger for pods: the pod's Notebook, if it carries the label
pub fn notebook_for_pod(pod: Pod) -> Option<ObjectRef<Notebook>> {
    let name = pod.labels().get(NOTEBOOK_NAME_LABEL)?.clone();
    let namespace = pod.namespace()?;
    Some(ObjectRef::new(&name).within(&namespace))
}

/// Watch core Events cluster-wide and relay the qualifying ones
///
/// Runs a cache of `notebook-name` labelled pods alongside the Event watch.
/// Each qualifying event is relayed on its own task so a slow lookup never
/// stalls the watch.
pub async fn run_event_relay(
    client: Client,
    kube: Arc<dyn NotebookKubeClient>,
    publisher: Arc<dyn EventPublisher>,
) {
    let (pods, writer) = reflector::store::<Pod>();
    let pod_watch = watcher(
        Api::<Pod>::all(client.clone()),
        watcher::Config::default().labels(NOTEBOOK_NAME_LABEL),
    );
    let pod_cache = reflector::reflector(writer, pod_watch)
        .default_backoff()
        .for_each(|_| futures::future::ready(()));

    tokio::select! {
        _ = pod_cache => warn!("notebook pod cache stopped"),
        _ = relay_events(client, kube, publisher, pods) => {}
    }
    info!("event relay stopped");
}

async fn relay_events(
    client: Client,
    kube: Arc<dyn NotebookKubeClient>,
    publisher: Arc<dyn EventPublisher>,
    pods: Store<Pod>,
) {
    if pods.wait_until_ready().await.is_err() {
        warn!("notebook pod cache never became ready");
        return;
    }
    info!("starting event relay");

    let events: Api<Event> = Api::all(client);
    let stream = watcher(events, watcher::Config::default()).default_backoff();
    let mut stream = std::pin::pin!(stream);
    let retry = RetryConfig::default();
    loop {
        match stream.try_next().await {
            Ok(Some(watcher::Event::Apply(event) | watcher::Event::InitApply(event))) => {
                // Cheap rejection before spawning anything
                if notebook_name_for(&pods, &event.involved_object).is_none() {
                    continue;
                }
                let (kube, publisher, pods, retry) =
                    (kube.clone(), publisher.clone(), pods.clone(), retry.clone());
                tokio::spawn(async move {
                    let relayed =
                        relay_with_retry(kube.as_ref(), &pods, publisher.as_ref(), &event, &retry)
                            .await;
                    if let Err(e) = relayed {
                        warn!(event = %event.name_any(), error = %e, "failed to relay event");
                    }
                });
            }
            // Deleted events never trigger anything
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => warn!(error = %e, "event watch error"),
        }
    }
}
