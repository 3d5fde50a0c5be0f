//! ClusterIP Service in front of the gatekeeper

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::statefulset::GATEKEEPER_PORT;
use super::{Owner, STATEFULSET_LABEL};

/// Port the Service exposes to the Ingress
pub const SERVICE_PORT: i32 = 443;

/// Traefik must talk TLS to the gatekeeper without verifying its certificate
const SERVERS_TRANSPORT_ANNOTATION: &str = "traefik.ingress.kubernetes.io/service.serverstransport";
const INSECURE_TRANSPORT: &str = "insecure@file";

pub(crate) fn compile(owner: &Owner<'_>) -> Service {
    let mut metadata = owner.child_meta(owner.name.clone());
    metadata.annotations = Some(BTreeMap::from([(
        SERVERS_TRANSPORT_ANNOTATION.to_string(),
        INSECURE_TRANSPORT.to_string(),
    )]));

    Service {
        metadata,
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(BTreeMap::from([(
                STATEFULSET_LABEL.to_string(),
                owner.name.clone(),
            )])),
            ports: Some(vec![ServicePort {
                name: Some(format!("https-{}", owner.name)),
                port: SERVICE_PORT,
                target_port: Some(IntOrString::Int(GATEKEEPER_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_notebook;

    #[test]
    fn service_routes_https_to_the_gatekeeper() {
        let nb = sample_notebook("nb1", "team-a");
        let svc = compile(&Owner::new(&nb).unwrap());

        assert_eq!(svc.metadata.name.as_deref(), Some("nb1"));
        assert_eq!(
            svc.metadata
                .annotations
                .unwrap()
                .get(SERVERS_TRANSPORT_ANNOTATION)
                .map(String::as_str),
            Some(INSECURE_TRANSPORT)
        );

        let spec = svc.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert!(spec.cluster_ip.is_none());
        assert_eq!(
            spec.selector.unwrap().get(STATEFULSET_LABEL).map(String::as_str),
            Some("nb1")
        );
        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.name.as_deref(), Some("https-nb1"));
        assert_eq!(port.port, 443);
        assert_eq!(port.target_port, Some(IntOrString::Int(3000)));
    }
}
