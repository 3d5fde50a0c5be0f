//! Per-kind copy of controller-owned fields
//!
//! Each function copies from `desired` into `stored` and reports whether a
//! copied value differed. Absent and empty maps compare equal.
//!
//! Pod templates come back from the API server with defaults filled in, so
//! they only count as drifted when a value the controller sets is missing or
//! different in the stored copy.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use serde_json::Value;

use crate::unstructured::{nested_map, set_nested_field, UnstructuredError};
use crate::Error;

fn copy_map(
    desired: &Option<BTreeMap<String, String>>,
    stored: &mut Option<BTreeMap<String, String>>,
) -> bool {
    let empty = BTreeMap::new();
    let differs = desired.as_ref().unwrap_or(&empty) != stored.as_ref().unwrap_or(&empty);
    *stored = desired.clone();
    differs
}

fn copy_value<T: Clone + PartialEq>(desired: &T, stored: &mut T) -> bool {
    if desired == stored {
        return false;
    }
    *stored = desired.clone();
    true
}

/// Whether every value set in `want` is present and equal in `have`
///
/// Objects may carry extra keys in `have`; arrays must match element-wise.
pub fn json_subset(want: &Value, have: &Value) -> bool {
    match (want, have) {
        (Value::Null, _) => true,
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(k, w)| match have.get(k) {
            Some(h) => json_subset(w, h),
            None => w.is_null(),
        }),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(w, h)| json_subset(w, h))
        }
        _ => want == have,
    }
}

/// Labels only; claim specs are immutable once bound
pub fn copy_pvc(desired: &PersistentVolumeClaim, stored: &mut PersistentVolumeClaim) -> bool {
    copy_map(&desired.metadata.labels, &mut stored.metadata.labels)
}

/// Labels, annotations, replicas and the full pod template spec
///
/// The template is rewritten whole when any value the controller sets has
/// drifted; server-populated defaults alone never force a write.
pub fn copy_stateful_set(desired: &StatefulSet, stored: &mut StatefulSet) -> Result<bool, Error> {
    let mut changed = copy_map(&desired.metadata.labels, &mut stored.metadata.labels);
    changed |= copy_map(
        &desired.metadata.annotations,
        &mut stored.metadata.annotations,
    );

    let Some(want) = desired.spec.as_ref() else {
        return Ok(changed);
    };
    let have = stored.spec.get_or_insert_with(Default::default);
    changed |= copy_value(&want.replicas, &mut have.replicas);

    let template_matches = match (&want.template.spec, &have.template.spec) {
        (Some(w), Some(h)) => json_subset(&serde_json::to_value(w)?, &serde_json::to_value(h)?),
        (None, _) => true,
        (Some(_), None) => false,
    };
    if !template_matches {
        have.template.spec = want.template.spec.clone();
        changed = true;
    }
    Ok(changed)
}

/// Labels, annotations, selector and ports; the cluster IP stays as allocated
pub fn copy_service(desired: &Service, stored: &mut Service) -> bool {
    let mut changed = copy_map(&desired.metadata.labels, &mut stored.metadata.labels);
    changed |= copy_map(
        &desired.metadata.annotations,
        &mut stored.metadata.annotations,
    );

    let Some(want) = desired.spec.as_ref() else {
        return changed;
    };
    let have = stored.spec.get_or_insert_with(Default::default);
    changed |= copy_map(&want.selector, &mut have.selector);
    changed |= copy_value(&want.ports, &mut have.ports);
    changed
}

/// TLS and rules
pub fn copy_ingress(desired: &Ingress, stored: &mut Ingress) -> bool {
    let Some(want) = desired.spec.as_ref() else {
        return false;
    };
    let have = stored.spec.get_or_insert_with(Default::default);
    let mut changed = copy_value(&want.tls, &mut have.tls);
    changed |= copy_value(&want.rules, &mut have.rules);
    changed
}

/// The whole `spec` map of a schemaless object
///
/// A desired object without a `spec` never forces a write. A stored object
/// whose `spec` is missing or not a map is overwritten.
pub fn copy_dynamic_spec(desired: &Value, stored: &mut Value) -> Result<bool, UnstructuredError> {
    let Some(want) = nested_map(desired, "spec")? else {
        return Ok(false);
    };
    let have = nested_map(stored, "spec").ok().flatten();
    if have == Some(want) {
        return Ok(false);
    }
    let want = Value::Object(want.clone());
    if !stored.is_object() {
        *stored = Value::Object(Default::default());
    }
    set_nested_field(stored, "spec", want)?;
    Ok(true)
}
