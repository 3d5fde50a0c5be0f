//! Notebook StatefulSet
//!
//! The user's pod template is taken as-is and then completed:
//! - the primary container gets a working directory, port and launch args when unset
//! - `NB_PREFIX` is injected (or corrected) so the server knows its base URL
//! - the gatekeeper side-car terminates TLS and OIDC in front of the server
//! - the `<name>-secret` TLS secret is mounted into both containers
//! - pods without a security context get `fsGroup: 100` unless opted out

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSecurityContext, PodTemplateSpec, SecretVolumeSource,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::{secret_name, url_prefix, Owner, NOTEBOOK_NAME_LABEL, STATEFULSET_LABEL};
use crate::config::{ControllerConfig, GatekeeperConfig};
use crate::culler;
use crate::Error;

/// Port the notebook server listens on
pub const DEFAULT_CONTAINER_PORT: i32 = 8888;
/// Name of the notebook server port
pub const NOTEBOOK_PORT_NAME: &str = "notebook-port";
/// Port the gatekeeper listens on
pub const GATEKEEPER_PORT: i32 = 3000;
/// Name of the gatekeeper side-car container
pub const GATEKEEPER_CONTAINER: &str = "gatekeeper";
/// Environment variable carrying the notebook URL prefix
pub const PREFIX_ENV_VAR: &str = "NB_PREFIX";
/// Working directory when the template sets none
pub const DEFAULT_WORKING_DIR: &str = "/home/jovyan";
/// fsGroup applied to pods without a security context
pub const DEFAULT_FS_GROUP: i64 = 100;
/// Name of the TLS secret volume
pub const SECRET_VOLUME: &str = "secret";

const CA_CERTIFICATES_DIR: &str = "/usr/local/share/ca-certificates";
const GATEKEEPER_SECRETS_DIR: &str = "/etc/secrets";
const SECRET_DEFAULT_MODE: i32 = 0o777;

const DEFAULT_LAUNCH_COMMAND: &str = "update-ca-certificates && jupyter lab \
--notebook-dir=/home/${NB_USER} --ip=0.0.0.0 --no-browser --allow-root --port=8888 \
--NotebookApp.token='' --NotebookApp.password='' --NotebookApp.allow_origin='*' \
--NotebookApp.base_url=${NB_PREFIX}";

pub(crate) fn compile(owner: &Owner<'_>, config: &ControllerConfig) -> Result<StatefulSet, Error> {
    let notebook = owner.notebook;
    let replicas = if culler::stop_annotation_is_set(&notebook.metadata) {
        0
    } else {
        1
    };

    let mut pod_labels = BTreeMap::from([
        (STATEFULSET_LABEL.to_string(), owner.name.clone()),
        (NOTEBOOK_NAME_LABEL.to_string(), owner.name.clone()),
    ]);
    if let Some(labels) = &notebook.metadata.labels {
        pod_labels.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let mut pod_spec = notebook.spec.template.spec.clone();
    let primary = pod_spec
        .containers
        .first_mut()
        .ok_or_else(|| Error::validation("notebook template must declare at least one container"))?;
    complete_primary_container(primary, &url_prefix(&owner.name, &owner.namespace));

    pod_spec
        .containers
        .push(gatekeeper_container(&config.gatekeeper));
    pod_spec
        .volumes
        .get_or_insert_with(Vec::new)
        .push(Volume {
            name: SECRET_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret_name(&owner.name)),
                default_mode: Some(SECRET_DEFAULT_MODE),
                ..Default::default()
            }),
            ..Default::default()
        });

    if config.add_fsgroup && pod_spec.security_context.is_none() {
        pod_spec.security_context = Some(PodSecurityContext {
            fs_group: Some(DEFAULT_FS_GROUP),
            ..Default::default()
        });
    }

    Ok(StatefulSet {
        metadata: owner.child_meta(owner.name.clone()),
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    STATEFULSET_LABEL.to_string(),
                    owner.name.clone(),
                )])),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    annotations: Some(BTreeMap::from([(
                        "sidecar.istio.io/inject".to_string(),
                        "false".to_string(),
                    )])),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn complete_primary_container(container: &mut Container, prefix: &str) {
    if container.working_dir.as_deref().unwrap_or_default().is_empty() {
        container.working_dir = Some(DEFAULT_WORKING_DIR.to_string());
    }
    if container.ports.is_none() {
        container.ports = Some(vec![ContainerPort {
            name: Some(NOTEBOOK_PORT_NAME.to_string()),
            container_port: DEFAULT_CONTAINER_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]);
    }
    container
        .volume_mounts
        .get_or_insert_with(Vec::new)
        .push(VolumeMount {
            name: SECRET_VOLUME.to_string(),
            mount_path: CA_CERTIFICATES_DIR.to_string(),
            ..Default::default()
        });
    if container.args.is_none() {
        container.args = Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            DEFAULT_LAUNCH_COMMAND.to_string(),
        ]);
    }
    set_prefix_env_var(container, prefix);
}

/// Inject `NB_PREFIX`, or overwrite it in place when the template already has one.
fn set_prefix_env_var(container: &mut Container, prefix: &str) {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|e| e.name == PREFIX_ENV_VAR) {
        Some(existing) => {
            existing.value = Some(prefix.to_string());
            existing.value_from = None;
        }
        None => env.push(EnvVar {
            name: PREFIX_ENV_VAR.to_string(),
            value: Some(prefix.to_string()),
            ..Default::default()
        }),
    }
}

fn gatekeeper_container(gatekeeper: &GatekeeperConfig) -> Container {
    let args = vec![
        "--client-id=notebook-gatekeeper".to_string(),
        format!("--client-secret={}", gatekeeper.client_secret),
        format!("--listen=:{GATEKEEPER_PORT}"),
        format!("--upstream-url=http://127.0.0.1:{DEFAULT_CONTAINER_PORT}"),
        format!("--discovery-url={}", gatekeeper.discovery_url),
        "--secure-cookie=false".to_string(),
        "--upstream-keepalives=false".to_string(),
        "--skip-openid-provider-tls-verify=true".to_string(),
        "--skip-upstream-tls-verify=true".to_string(),
        format!("--tls-cert={GATEKEEPER_SECRETS_DIR}/tls.crt"),
        format!("--tls-private-key={GATEKEEPER_SECRETS_DIR}/tls.key"),
        format!("--tls-ca-certificate={GATEKEEPER_SECRETS_DIR}/ca.crt"),
        "--enable-self-signed-tls=false".to_string(),
        "--enable-refresh-tokens=true".to_string(),
        "--enable-default-deny=true".to_string(),
        "--enable-metrics=true".to_string(),
        "--encryption-key=AgXa7xRcoClDEU0ZDSH4X0XhL5Qy2Z2j".to_string(),
        "--resources=uri=/*|roles=notebook-gatekeeper:notebook-gatekeeper-manager".to_string(),
        format!("--log-level={}", gatekeeper.log_level),
    ];

    Container {
        name: GATEKEEPER_CONTAINER.to_string(),
        image: Some(gatekeeper.image()),
        args: Some(args),
        ports: Some(vec![ContainerPort {
            name: Some("service".to_string()),
            container_port: GATEKEEPER_PORT,
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: SECRET_VOLUME.to_string(),
            mount_path: GATEKEEPER_SECRETS_DIR.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}
