//! External TLS route

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};

use super::service::SERVICE_PORT;
use super::{ingress_name, Owner};
use crate::config::ControllerConfig;

/// Label carrying the ingress's own name, used by the platform's ingress tooling
pub const INGRESS_NAME_LABEL: &str = "ingress.tmaxcloud.org/name";

const ENTRYPOINTS_ANNOTATION: &str = "traefik.ingress.kubernetes.io/router.entrypoints";
const CLUSTER_ISSUER_ANNOTATION: &str = "cert-manager.io/cluster-issuer";

/// External host of a notebook (`<name>-<namespace>.<domain>`)
pub fn host(name: &str, namespace: &str, domain: &str) -> String {
    format!("{name}-{namespace}.{domain}")
}

pub(crate) fn compile(owner: &Owner<'_>, config: &ControllerConfig) -> Ingress {
    let name = ingress_name(&owner.name, &owner.namespace);
    let host = host(&owner.name, &owner.namespace, &config.custom_domain);

    let mut metadata = owner.child_meta(name.clone());
    metadata.labels = Some(BTreeMap::from([(INGRESS_NAME_LABEL.to_string(), name)]));
    metadata.annotations = Some(BTreeMap::from([
        (ENTRYPOINTS_ANNOTATION.to_string(), "websecure".to_string()),
        (
            CLUSTER_ISSUER_ANNOTATION.to_string(),
            config.cluster_issuer.clone(),
        ),
    ]));

    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: owner.name.clone(),
            port: Some(ServiceBackendPort {
                number: Some(SERVICE_PORT),
                ..Default::default()
            }),
        }),
        ..Default::default()
    };

    Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: Some(config.ingress_class.clone()),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![host.clone()]),
                secret_name: None,
            }]),
            rules: Some(vec![IngressRule {
                host: Some(host),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend,
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
