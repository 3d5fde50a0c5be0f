//! Desired-state compiler for Notebooks
//!
//! Turns a [`Notebook`] plus the frozen [`ControllerConfig`] into the full set
//! of child objects the controller owns. Compilation is pure: no API calls,
//! no clock reads, and the same input always yields the same output.
//!
//! # Children
//!
//! - [`pvc`]: workspace PersistentVolumeClaim
//! - [`statefulset`]: single-replica StatefulSet with the gatekeeper side-car
//! - [`service`]: ClusterIP Service in front of the gatekeeper
//! - [`ingress`]: TLS Ingress routing the notebook host to the Service
//! - [`certificate`]: cert-manager Certificate backing the pod's TLS secret
//! - [`virtual_service`]: optional Istio VirtualService

pub mod certificate;
pub mod ingress;
pub mod pvc;
pub mod service;
pub mod statefulset;
pub mod virtual_service;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};

use crate::config::ControllerConfig;
use crate::crd::Notebook;
use crate::Error;

/// URL path segment every notebook is served under
pub const URL_SCOPE: &str = "notebook";

/// Label linking pods back to their Notebook
pub const NOTEBOOK_NAME_LABEL: &str = "notebook-name";

/// Label selecting the StatefulSet's pods
pub const STATEFULSET_LABEL: &str = "statefulset";

/// Name of the Ingress for a notebook
pub fn ingress_name(name: &str, namespace: &str) -> String {
    format!("{name}-{namespace}")
}

/// Name of the cert-manager Certificate for a notebook
pub fn certificate_name(name: &str, namespace: &str) -> String {
    format!("cert-{namespace}-{name}")
}

/// Name of the Istio VirtualService for a notebook
pub fn virtual_service_name(name: &str, namespace: &str) -> String {
    format!("notebook-{namespace}-{name}")
}

/// Name of the TLS secret mounted into the notebook pod
pub fn secret_name(name: &str) -> String {
    format!("{name}-secret")
}

/// Name of the single pod the StatefulSet runs
pub fn pod_name(name: &str) -> String {
    format!("{name}-0")
}

/// External URL prefix of a notebook (`/notebook/<namespace>/<name>`)
pub fn url_prefix(name: &str, namespace: &str) -> String {
    format!("/{URL_SCOPE}/{namespace}/{name}")
}

/// Every child object compiled from one Notebook
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledNotebook {
    /// Workspace claim
    pub pvc: PersistentVolumeClaim,
    /// Notebook workload
    pub stateful_set: StatefulSet,
    /// In-cluster service
    pub service: Service,
    /// External route
    pub ingress: Ingress,
    /// TLS certificate request
    pub certificate: DynamicObject,
    /// Istio route, present only when Istio integration is enabled
    pub virtual_service: Option<DynamicObject>,
}

/// Identity shared by every child of one Notebook
pub(crate) struct Owner<'a> {
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) notebook: &'a Notebook,
    reference: OwnerReference,
}

impl<'a> Owner<'a> {
    fn new(notebook: &'a Notebook) -> Result<Self, Error> {
        let name = notebook.name_any();
        let namespace = notebook.require_namespace()?;
        let reference = notebook
            .controller_owner_ref(&())
            .ok_or_else(|| Error::internal(format!("Notebook {namespace}/{name} has no uid")))?;
        Ok(Self {
            name,
            namespace,
            notebook,
            reference,
        })
    }

    /// Metadata for a child object with the controller owner reference set
    pub(crate) fn child_meta(&self, name: impl Into<String>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            namespace: Some(self.namespace.clone()),
            owner_references: Some(vec![self.reference.clone()]),
            ..Default::default()
        }
    }
}

/// Compiles Notebooks into their child objects
pub struct NotebookCompiler<'a> {
    config: &'a ControllerConfig,
}

impl<'a> NotebookCompiler<'a> {
    /// Create a compiler bound to the controller configuration
    pub fn new(config: &'a ControllerConfig) -> Self {
        Self { config }
    }

    /// Compile every child object of `notebook`
    ///
    /// Fails when the spec is invalid, when the Notebook has no namespace or
    /// uid, or when a nested field of a dynamic child cannot be written.
    pub fn compile(&self, notebook: &Notebook) -> Result<CompiledNotebook, Error> {
        notebook.spec.validate()?;
        let owner = Owner::new(notebook)?;

        let virtual_service = match &self.config.istio {
            Some(istio) => Some(virtual_service::compile(&owner, istio, self.config)?),
            None => None,
        };

        Ok(CompiledNotebook {
            pvc: pvc::compile(&owner)?,
            stateful_set: statefulset::compile(&owner, self.config)?,
            service: service::compile(&owner),
            ingress: ingress::compile(&owner, self.config),
            certificate: certificate::compile(&owner, self.config)?,
            virtual_service,
        })
    }
}
