//! Dotted-path access into schemaless child objects
//!
//! Certificates and VirtualServices are handled as [`DynamicObject`]s whose
//! payload is a `serde_json::Value`. These helpers read and write nested
//! fields by path (`"spec.issuerRef.name"`) and fail with a typed error when
//! an intermediate segment exists but is not a map.

use std::collections::BTreeMap;

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::{Map, Value};
use thiserror::Error;

/// Failure to access a nested field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnstructuredError {
    /// A path segment exists but holds something other than a map
    #[error("field {path} is not a map")]
    NotAMap {
        /// Dotted path of the offending segment
        path: String,
    },

    /// The path has no segments
    #[error("empty field path")]
    EmptyPath,

    /// The object carries no apiVersion/kind
    #[error("object {name} has no type information")]
    MissingTypeMeta {
        /// Name of the object
        name: String,
    },
}

fn segments(path: &str) -> Result<Vec<&str>, UnstructuredError> {
    let parts: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        return Err(UnstructuredError::EmptyPath);
    }
    Ok(parts)
}

fn prefix(parts: &[&str], upto: usize) -> String {
    parts[..=upto].join(".")
}

/// Look up a nested field.
///
/// Returns `Ok(None)` when any segment is absent.
pub fn nested_field<'a>(obj: &'a Value, path: &str) -> Result<Option<&'a Value>, UnstructuredError> {
    let parts = segments(path)?;
    let mut current = obj;
    for (i, part) in parts.iter().enumerate() {
        let map = current.as_object().ok_or_else(|| UnstructuredError::NotAMap {
            path: if i == 0 {
                "<root>".to_string()
            } else {
                prefix(&parts, i - 1)
            },
        })?;
        match map.get(*part) {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Look up a nested map. A present value of another shape is an error.
pub fn nested_map<'a>(
    obj: &'a Value,
    path: &str,
) -> Result<Option<&'a Map<String, Value>>, UnstructuredError> {
    match nested_field(obj, path)? {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(UnstructuredError::NotAMap {
            path: path.to_string(),
        }),
    }
}

/// Look up a nested string. Values of other shapes read as absent.
pub fn nested_str<'a>(obj: &'a Value, path: &str) -> Result<Option<&'a str>, UnstructuredError> {
    Ok(nested_field(obj, path)?.and_then(Value::as_str))
}

/// Set a nested field, creating intermediate maps as needed.
pub fn set_nested_field(obj: &mut Value, path: &str, value: Value) -> Result<(), UnstructuredError> {
    let parts = segments(path)?;
    if obj.is_null() {
        *obj = Value::Object(Map::new());
    }
    let mut current = obj;
    for (i, part) in parts.iter().enumerate() {
        let map = match current {
            Value::Object(map) => map,
            _ => {
                return Err(UnstructuredError::NotAMap {
                    path: if i == 0 {
                        "<root>".to_string()
                    } else {
                        prefix(&parts, i - 1)
                    },
                })
            }
        };
        if i == parts.len() - 1 {
            map.insert((*part).to_string(), value);
            return Ok(());
        }
        current = map
            .entry((*part).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Ok(())
}

/// Set a nested list of strings
pub fn set_nested_string_slice<S: AsRef<str>>(
    obj: &mut Value,
    path: &str,
    values: &[S],
) -> Result<(), UnstructuredError> {
    let list = values
        .iter()
        .map(|v| Value::String(v.as_ref().to_string()))
        .collect();
    set_nested_field(obj, path, Value::Array(list))
}

/// Set a nested string-to-string map
pub fn set_nested_string_map(
    obj: &mut Value,
    path: &str,
    values: &BTreeMap<String, String>,
) -> Result<(), UnstructuredError> {
    let map = values
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    set_nested_field(obj, path, Value::Object(map))
}

/// Resolve the [`ApiResource`] of a dynamic object from its TypeMeta
pub fn api_resource_of(obj: &DynamicObject) -> Result<ApiResource, UnstructuredError> {
    let types = obj
        .types
        .as_ref()
        .ok_or_else(|| UnstructuredError::MissingTypeMeta {
            name: obj.metadata.name.clone().unwrap_or_default(),
        })?;
    let (group, version) = match types.api_version.split_once('/') {
        Some((g, v)) => (g, v),
        None => ("", types.api_version.as_str()),
    };
    Ok(ApiResource::from_gvk(&GroupVersionKind::gvk(
        group,
        version,
        &types.kind,
    )))
}
