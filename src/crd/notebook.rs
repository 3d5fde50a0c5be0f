//! Notebook Custom Resource Definition
//!
//! A Notebook declares one interactive compute workload: a single-replica
//! StatefulSet running the notebook server behind an authenticating gateway,
//! plus the storage, network and certificate objects it needs.

use k8s_openapi::api::core::v1::ContainerState;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{NotebookCondition, NotebookTemplateSpec, VolumeClaim};

/// Specification for a Notebook
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kubeflow.org",
    version = "v1",
    kind = "Notebook",
    plural = "notebooks",
    shortname = "nb",
    status = "NotebookStatus",
    namespaced,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.conditions[0].type"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NotebookSpec {
    /// Pod template for the notebook server
    pub template: NotebookTemplateSpec,

    /// Volumes to provision; the first entry becomes the workspace claim
    #[serde(default)]
    pub volume_claim: Vec<VolumeClaim>,
}

impl NotebookSpec {
    /// Validate the Notebook specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.volume_claim.is_empty() {
            return Err(crate::Error::validation(
                "notebook must declare at least one volumeClaim",
            ));
        }
        for claim in &self.volume_claim {
            if claim.name.is_empty() {
                return Err(crate::Error::validation("volumeClaim name must not be empty"));
            }
            if claim.size.is_empty() {
                return Err(crate::Error::validation(format!(
                    "volumeClaim {} must request a size",
                    claim.name
                )));
            }
        }
        if self.template.spec.containers.is_empty() {
            return Err(crate::Error::validation(
                "notebook template must declare at least one container",
            ));
        }
        Ok(())
    }
}

/// Status for a Notebook
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotebookStatus {
    /// Ready replicas reported by the StatefulSet
    #[serde(default)]
    pub ready_replicas: i32,

    /// Last observed state of the primary container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_state: Option<ContainerState>,

    /// Condition history, most recent first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<NotebookCondition>,
}

impl Notebook {
    /// Namespace of the Notebook, required for every child object
    pub fn require_namespace(&self) -> Result<String, crate::Error> {
        self.namespace()
            .ok_or_else(|| crate::Error::missing_namespace("Notebook", self.name_any()))
    }

    /// Current status, or the default when none has been written yet
    pub fn status_or_default(&self) -> NotebookStatus {
        self.status.clone().unwrap_or_default()
    }
}
