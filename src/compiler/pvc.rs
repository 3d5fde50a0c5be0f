//! Workspace PersistentVolumeClaim

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::Owner;
use crate::Error;

/// Label carrying the owning notebook's name
pub const NOTEBOOK_LABEL: &str = "notebook";

/// Build the claim for the first declared volume.
///
/// Access mode is always `ReadWriteMany`. The storage class is only set when
/// one is requested, so the cluster default applies otherwise.
pub(crate) fn compile(owner: &Owner<'_>) -> Result<PersistentVolumeClaim, Error> {
    let claim = owner
        .notebook
        .spec
        .volume_claim
        .first()
        .ok_or_else(|| Error::validation("notebook must declare at least one volumeClaim"))?;

    let mut metadata = owner.child_meta(claim.name.clone());
    metadata.labels = Some(BTreeMap::from([(
        NOTEBOOK_LABEL.to_string(),
        owner.name.clone(),
    )]));

    let storage_class_name = claim
        .storage_class
        .as_ref()
        .filter(|sc| !sc.is_empty())
        .cloned();

    Ok(PersistentVolumeClaim {
        metadata,
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteMany".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(claim.size.clone()),
                )])),
                ..Default::default()
            }),
            storage_class_name,
            ..Default::default()
        }),
        ..Default::default()
    })
}
