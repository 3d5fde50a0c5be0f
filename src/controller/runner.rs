//! Controller runner - builds the futures that make up the running controller

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::DynamicObject;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use super::notebook::{error_policy, reconcile, Context};
use crate::compiler::{certificate, virtual_service, NOTEBOOK_NAME_LABEL};
use crate::config::ControllerConfig;
use crate::crd::Notebook;
use crate::relay::{notebook_for_pod, run_event_relay};

/// Server-side watch timeout; stays under the client's 30s read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Build the Notebook controller and the event relay
///
/// The controller is triggered by Notebook changes, changes to the children
/// it owns, and changes to pods carrying the `notebook-name` label.
pub fn build_controllers(
    client: Client,
    config: ControllerConfig,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let use_istio = config.istio.is_some();
    let ctx = Arc::new(Context::new(client.clone(), config));

    let notebooks: Api<Notebook> = Api::all(client.clone());
    let certificate_resource = certificate::api_resource();

    tracing::info!("- Notebook controller");
    let mut controller = Controller::new(notebooks, watcher_config())
        .owns(Api::<StatefulSet>::all(client.clone()), watcher_config())
        .owns(Api::<Service>::all(client.clone()), watcher_config())
        .owns(Api::<Ingress>::all(client.clone()), watcher_config())
        .owns_with(
            Api::<DynamicObject>::all_with(client.clone(), &certificate_resource),
            certificate_resource,
            watcher_config(),
        )
        .watches(
            Api::<Pod>::all(client.clone()),
            watcher_config().labels(NOTEBOOK_NAME_LABEL),
            notebook_for_pod,
        );

    if use_istio {
        tracing::info!("- VirtualService watch (Istio enabled)");
        let vs_resource = virtual_service::api_resource();
        controller = controller.owns_with(
            Api::<DynamicObject>::all_with(client.clone(), &vs_resource),
            vs_resource,
            watcher_config(),
        );
    }

    let notebook_ctrl = controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(log_reconcile_result("Notebook"));

    tracing::info!("- Event relay");
    let relay = run_event_relay(client, ctx.kube.clone(), ctx.events.clone());

    vec![Box::pin(notebook_ctrl), Box::pin(relay)]
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
