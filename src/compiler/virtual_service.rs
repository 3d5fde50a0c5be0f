//! Istio VirtualService for mesh-routed installs

use std::collections::BTreeMap;

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::json;
use tracing::debug;

use super::{url_prefix, virtual_service_name, Owner};
use crate::config::{ControllerConfig, IstioConfig};
use crate::unstructured::{set_nested_field, set_nested_string_map, set_nested_string_slice};
use crate::Error;

/// Annotation overriding the URI the notebook prefix is rewritten to
pub const REWRITE_URI_ANNOTATION: &str = "notebooks.kubeflow.org/http-rewrite-uri";
/// Annotation holding a JSON object of request headers to set
pub const HEADERS_ANNOTATION: &str = "notebooks.kubeflow.org/http-headers-request-set";

/// Port the VirtualService routes to on the notebook Service
pub const ROUTE_PORT: i64 = 80;

/// API resource for Istio VirtualServices
pub fn api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "networking.istio.io",
        "v1alpha3",
        "VirtualService",
    ))
}

/// Parse the header annotation; anything but a JSON string map yields no headers.
pub fn request_headers(raw: Option<&str>) -> BTreeMap<String, String> {
    let Some(raw) = raw else {
        return BTreeMap::new();
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
        debug!(error = %e, "ignoring malformed request header annotation");
        BTreeMap::new()
    })
}

pub(crate) fn compile(
    owner: &Owner<'_>,
    istio: &IstioConfig,
    config: &ControllerConfig,
) -> Result<DynamicObject, Error> {
    let name = virtual_service_name(&owner.name, &owner.namespace);
    let mut vs = DynamicObject::new(&name, &api_resource()).within(&owner.namespace);
    vs.metadata = owner.child_meta(name);

    let annotations = owner.notebook.metadata.annotations.as_ref();
    let prefix = format!("{}/", url_prefix(&owner.name, &owner.namespace));
    let rewrite = annotations
        .and_then(|a| a.get(REWRITE_URI_ANNOTATION))
        .filter(|uri| !uri.is_empty())
        .cloned()
        .unwrap_or_else(|| prefix.clone());
    let headers = request_headers(
        annotations
            .and_then(|a| a.get(HEADERS_ANNOTATION))
            .map(String::as_str),
    );
    let service_host = format!(
        "{}.{}.svc.{}",
        owner.name, owner.namespace, config.cluster_domain
    );

    let data = &mut vs.data;
    set_nested_string_slice(data, "spec.hosts", &["*"])?;
    set_nested_string_slice(data, "spec.gateways", &[istio.gateway.as_str()])?;
    let mut route = json!({
        "match": [{ "uri": { "prefix": prefix } }],
        "rewrite": { "uri": rewrite },
        "route": [{
            "destination": {
                "host": service_host,
                "port": { "number": ROUTE_PORT },
            },
        }],
    });
    set_nested_string_map(&mut route, "headers.request.set", &headers)?;
    set_nested_field(data, "spec.http", json!([route]))?;

    Ok(vs)
}
