//! Shared types for the Notebook CRD

use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::PodSpec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Pod template embedded in a Notebook
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotebookTemplateSpec {
    /// Pod spec for the notebook server. The first container is the primary one.
    #[serde(default)]
    pub spec: PodSpec,
}

/// Persistent volume requested for a Notebook
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaim {
    /// Name of the PersistentVolumeClaim
    pub name: String,

    /// Requested storage size (e.g. "10Gi")
    pub size: String,

    /// Storage class; the cluster default is used when unset or empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/// Condition type derived from the primary container's state
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum NotebookConditionType {
    /// Container is running
    Running,
    /// Container is waiting to start
    Waiting,
    /// Container has exited
    Terminated,
}

impl NotebookConditionType {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Waiting => "Waiting",
            Self::Terminated => "Terminated",
        }
    }
}

impl fmt::Display for NotebookConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the Notebook condition history
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotebookCondition {
    /// Container state at the time of observation
    #[serde(rename = "type")]
    pub type_: NotebookConditionType,

    /// Last time the condition was probed
    pub last_probe_time: DateTime<Utc>,

    /// Machine-readable reason reported by the container runtime
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable message reported by the container runtime
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl NotebookCondition {
    /// Create a condition probed at `now`
    pub fn new(
        type_: NotebookConditionType,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_,
            last_probe_time: now,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Whether two conditions describe the same observation, ignoring time
    pub fn same_observation(&self, other: &NotebookCondition) -> bool {
        self.type_ == other.type_ && self.reason == other.reason && self.message == other.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_type_serializes_as_pascal_case() {
        let json = serde_json::to_string(&NotebookConditionType::Terminated).unwrap();
        assert_eq!(json, "\"Terminated\"");
        assert_eq!(NotebookConditionType::Waiting.to_string(), "Waiting");
    }

    #[test]
    fn condition_omits_empty_reason_and_message() {
        let cond = NotebookCondition::new(NotebookConditionType::Running, "", "", Utc::now());
        let value = serde_json::to_value(&cond).unwrap();
        assert_eq!(value["type"], "Running");
        assert!(value.get("reason").is_none());
        assert!(value.get("message").is_none());
        assert!(value.get("lastProbeTime").is_some());
    }

    #[test]
    fn same_observation_ignores_probe_time() {
        let earlier = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let a = NotebookCondition::new(NotebookConditionType::Waiting, "Pulling", "img", earlier);
        let b = NotebookCondition::new(NotebookConditionType::Waiting, "Pulling", "img", Utc::now());
        assert!(a.same_observation(&b));

        let c = NotebookCondition::new(NotebookConditionType::Waiting, "Pulling", "other", earlier);
        assert!(!a.same_observation(&c));
    }

    #[test]
    fn volume_claim_parses_camel_case() {
        let claim: VolumeClaim = serde_json::from_value(serde_json::json!({
            "name": "nb1-workspace",
            "size": "10Gi",
            "storageClass": "csi-cephfs"
        }))
        .unwrap();
        assert_eq!(claim.storage_class.as_deref(), Some("csi-cephfs"));
    }
}
