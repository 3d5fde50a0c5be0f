//! cert-manager Certificate for the notebook's TLS secret

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::{json, Value};

use super::{certificate_name, secret_name, Owner};
use crate::config::ControllerConfig;
use crate::unstructured::{set_nested_field, set_nested_string_slice};
use crate::Error;

/// Usages requested on every notebook certificate
pub const CERTIFICATE_USAGES: [&str; 4] = [
    "digital signature",
    "key encipherment",
    "server auth",
    "client auth",
];

/// API resource for cert-manager Certificates
pub fn api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("cert-manager.io", "v1", "Certificate"))
}

pub(crate) fn compile(owner: &Owner<'_>, config: &ControllerConfig) -> Result<DynamicObject, Error> {
    let name = certificate_name(&owner.name, &owner.namespace);
    let mut cert = DynamicObject::new(&name, &api_resource()).within(&owner.namespace);
    cert.metadata = owner.child_meta(name);

    let data = &mut cert.data;
    set_nested_field(data, "spec.secretName", Value::String(secret_name(&owner.name)))?;
    set_nested_field(data, "spec.isCA", Value::Bool(false))?;
    set_nested_string_slice(data, "spec.dnsNames", config.certificate_dns_names.as_slice())?;
    set_nested_string_slice(data, "spec.usages", &CERTIFICATE_USAGES)?;
    set_nested_field(
        data,
        "spec.issuerRef",
        json!({
            "group": "cert-manager.io",
            "kind": "ClusterIssuer",
            "name": config.cluster_issuer,
        }),
    )?;

    Ok(cert)
}
