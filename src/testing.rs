//! Shared test fixtures

use k8s_openapi::api::core::v1::{Container, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::config::ControllerConfig;
use crate::crd::{Notebook, NotebookSpec, NotebookTemplateSpec, VolumeClaim};

/// Configuration with a concrete base domain and secrets filled in
pub(crate) fn test_config() -> ControllerConfig {
    let mut config = ControllerConfig {
        custom_domain: "tmaxcloud.org".to_string(),
        ..Default::default()
    };
    config.gatekeeper.client_secret = "s3cr3t".to_string();
    config.gatekeeper.discovery_url = "https://hyperauth.tmaxcloud.org/auth/realms/tmax".to_string();
    config.gatekeeper.version = "10.0.0".to_string();
    config
}

/// A Notebook with one jupyter container and a 10Gi workspace claim
pub(crate) fn sample_notebook(name: &str, namespace: &str) -> Notebook {
    Notebook {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{namespace}-{name}")),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: NotebookSpec {
            template: NotebookTemplateSpec {
                spec: PodSpec {
                    containers: vec![Container {
                        name: name.to_string(),
                        image: Some("tmaxcloudck/jupyter-scipy:latest".to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            },
            volume_claim: vec![VolumeClaim {
                name: format!("{name}-workspace"),
                size: "10Gi".to_string(),
                storage_class: None,
            }],
        },
        status: None,
    }
}
