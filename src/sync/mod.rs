//! Create-or-update of Notebook children
//!
//! Each child is fetched by its deterministic name. Missing children are
//! created; existing ones have the fields the controller owns copied in from
//! the desired object and are only written back when one of those fields
//! actually differed. Fields owned by other actors (a Service's cluster IP,
//! status, server-populated metadata) are never touched.

mod fields;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, warn};

use crate::controller::NotebookKubeClient;
use crate::metrics;
use crate::unstructured::api_resource_of;
use crate::Error;

pub use fields::{
    copy_dynamic_spec, copy_ingress, copy_pvc, copy_service, copy_stateful_set, json_subset,
};

/// What a sync did to the stored object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The object did not exist and was created
    Created,
    /// Owned fields had drifted and were written back
    Updated,
    /// Stored object already matched
    Unchanged,
}

/// Result of syncing one child
#[derive(Clone, Debug)]
pub struct Synced<R> {
    /// What happened
    pub outcome: SyncOutcome,
    /// The object as stored after the sync
    pub object: R,
}

/// A child kind the sync engine knows how to fetch, write and diff
#[async_trait]
pub trait ChildResource: Resource + Clone + Send + Sync + Sized {
    /// Kind name used in logs and metrics
    fn kind_name(&self) -> String;

    /// Fetch the stored object with the same name and namespace
    async fn fetch_stored(
        &self,
        kube: &dyn NotebookKubeClient,
        namespace: &str,
    ) -> Result<Option<Self>, Error>;

    /// Create this object
    async fn create(&self, kube: &dyn NotebookKubeClient) -> Result<Self, Error>;

    /// Replace the stored object with this one
    async fn replace(&self, kube: &dyn NotebookKubeClient) -> Result<Self, Error>;

    /// Copy the controller-owned fields of `self` into `stored`, returning
    /// whether any of them differed
    fn copy_owned_fields(&self, stored: &mut Self) -> Result<bool, Error>;
}

/// Bring one child in line with its desired form
pub async fn sync_child<R: ChildResource>(
    kube: &dyn NotebookKubeClient,
    desired: &R,
) -> Result<Synced<R>, Error> {
    let kind = desired.kind_name();
    let name = desired.name_any();
    let namespace = desired
        .namespace()
        .ok_or_else(|| Error::missing_namespace(kind.clone(), name.clone()))?;

    let Some(mut stored) = desired.fetch_stored(kube, &namespace).await? else {
        info!(kind = %kind, name = %name, namespace = %namespace, "creating child");
        return match desired.create(kube).await {
            Ok(object) => {
                metrics::record_child_created(&kind, &namespace);
                Ok(Synced {
                    outcome: SyncOutcome::Created,
                    object,
                })
            }
            Err(e) => {
                warn!(kind = %kind, name = %name, error = %e, "failed to create child");
                metrics::record_child_creation_failed(&kind, &namespace);
                Err(e)
            }
        };
    };

    if !desired.copy_owned_fields(&mut stored)? {
        debug!(kind = %kind, name = %name, "child up to date");
        return Ok(Synced {
            outcome: SyncOutcome::Unchanged,
            object: stored,
        });
    }

    info!(kind = %kind, name = %name, namespace = %namespace, "updating child");
    let object = stored.replace(kube).await?;
    Ok(Synced {
        outcome: SyncOutcome::Updated,
        object,
    })
}

#[async_trait]
impl ChildResource for PersistentVolumeClaim {
    fn kind_name(&self) -> String {
        "PersistentVolumeClaim".to_string()
    }

    async fn fetch_stored(
        &self,
        kube: &dyn NotebookKubeClient,
        namespace: &str,
    ) -> Result<Option<Self>, Error> {
        kube.get_pvc(namespace, &self.name_any()).await
    }

    async fn create(&self, kube: &dyn NotebookKubeClient) -> Result<Self, Error> {
        kube.create_pvc(self).await
    }

    async fn replace(&self, kube: &dyn NotebookKubeClient) -> Result<Self, Error> {
        kube.replace_pvc(self).await
    }

    fn copy_owned_fields(&self, stored: &mut Self) -> Result<bool, Error> {
        Ok(copy_pvc(self, stored))
    }
}

#[async_trait]
impl ChildResource for StatefulSet {
    fn kind_name(&self) -> String {
        "StatefulSet".to_string()
    }

    async fn fetch_stored(
        &self,
        kube: &dyn NotebookKubeClient,
        namespace: &str,
    ) -> Result<Option<Self>, Error> {
        kube.get_stateful_set(namespace, &self.name_any()).await
    }

    async fn create(&self, kube: &dyn NotebookKubeClient) -> Result<Self, Error> {
        kube.create_stateful_set(self).await
    }

    async fn replace(&self, kube: &dyn NotebookKubeClient) -> Result<Self, Error> {
        kube.replace_stateful_set(self).await
    }

    fn copy_owned_fields(&self, stored: &mut Self) -> Result<bool, Error> {
        copy_stateful_set(self, stored)
    }
}

#[async_trait]
impl ChildResource for Service {
    fn kind_name(&self) -> String {
        "Service".to_string()
    }

    async fn fetch_stored(
        &self,
        kube: &dyn NotebookKubeClient,
        namespace: &str,
    ) -> Result<Option<Self>, Error> {
        kube.get_service(namespace, &self.name_any()).await
    }

    async fn create(&self, kube: &dyn NotebookKubeClient) -> Result<Self, Error> {
        kube.create_service(self).await
    }

    async fn replace(&self, kube: &dyn NotebookKubeClient) -> Result<Self, Error> {
        kube.replace_service(self).await
    }

    fn copy_owned_fields(&self, stored: &mut Self) -> Result<bool, Error> {
        Ok(copy_service(self, stored))
    }
}

#[async_trait]
impl ChildResource for Ingress {
    fn kind_name(&self) -> String {
        "Ingress".to_string()
    }

    async fn fetch_stored(
        &self,
        kube: &dyn NotebookKubeClient,
        namespace: &str,
    ) -> Result<Option<Self>, Error> {
        kube.get_ingress(namespace, &self.name_any()).await
    }

    async fn create(&self, kube: &dyn NotebookKubeClient) -> Result<Self, Error> {
        kube.create_ingress(self).await
    }

    async fn replace(&self, kube: &dyn NotebookKubeClient) -> Result<Self, Error> {
        kube.replace_ingress(self).await
    }

    fn copy_owned_fields(&self, stored: &mut Self) -> Result<bool, Error> {
        Ok(copy_ingress(self, stored))
    }
}

#[async_trait]
impl ChildResource for DynamicObject {
    fn kind_name(&self) -> String {
        self.types
            .as_ref()
            .map(|t| t.kind.clone())
            .unwrap_or_else(|| "DynamicObject".to_string())
    }

    async fn fetch_stored(
        &self,
        kube: &dyn NotebookKubeClient,
        namespace: &str,
    ) -> Result<Option<Self>, Error> {
        let resource = api_resource_of(self)?;
        kube.get_dynamic(&resource, namespace, &self.name_any())
            .await
    }

    async fn create(&self, kube: &dyn NotebookKubeClient) -> Result<Self, Error> {
        let resource = api_resource_of(self)?;
        kube.create_dynamic(&resource, self).await
    }

    async fn replace(&self, kube: &dyn NotebookKubeClient) -> Result<Self, Error> {
        let resource = api_resource_of(self)?;
        kube.replace_dynamic(&resource, self).await
    }

    fn copy_owned_fields(&self, stored: &mut Self) -> Result<bool, Error> {
        Ok(copy_dynamic_spec(&self.data, &mut stored.data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::MockNotebookKubeClient;
    use crate::error::api_error;
    use k8s_openapi::api::apps::v1::StatefulSetSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::sync::{Arc, Mutex};

    fn desired_sts(replicas: i32) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some("nb1".to_string()),
                namespace: Some("team-a".to_string()),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn stored(mut sts: StatefulSet) -> StatefulSet {
        sts.metadata.resource_version = Some("42".to_string());
        sts.metadata.uid = Some("sts-uid".to_string());
        sts
    }

    #[tokio::test]
    async fn missing_child_is_created() {
        let mut mock = MockNotebookKubeClient::new();
        mock.expect_get_stateful_set().returning(|_, _| Ok(None));
        mock.expect_create_stateful_set()
            .times(1)
            .returning(|sts| Ok(stored(sts.clone())));
        mock.expect_replace_stateful_set().never();

        let synced = sync_child(&mock, &desired_sts(1)).await.unwrap();
        assert_eq!(synced.outcome, SyncOutcome::Created);
        assert_eq!(synced.object.metadata.resource_version.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn matching_child_is_left_alone() {
        let mut mock = MockNotebookKubeClient::new();
        mock.expect_get_stateful_set()
            .returning(|_, _| Ok(Some(stored(desired_sts(1)))));
        mock.expect_create_stateful_set().never();
        mock.expect_replace_stateful_set().never();

        let synced = sync_child(&mock, &desired_sts(1)).await.unwrap();
        assert_eq!(synced.outcome, SyncOutcome::Unchanged);
    }

    #[tokio::test]
    async fn drifted_child_is_replaced_with_stored_identity() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let written_clone = written.clone();

        let mut mock = MockNotebookKubeClient::new();
        mock.expect_get_stateful_set()
            .returning(|_, _| Ok(Some(stored(desired_sts(1)))));
        mock.expect_replace_stateful_set()
            .times(1)
            .returning(move |sts| {
                written_clone.lock().unwrap().push(sts.clone());
                Ok(sts.clone())
            });

        let synced = sync_child(&mock, &desired_sts(0)).await.unwrap();
        assert_eq!(synced.outcome, SyncOutcome::Updated);

        let written = written.lock().unwrap();
        assert_eq!(written[0].spec.as_ref().unwrap().replicas, Some(0));
        // The write carries the stored resourceVersion for optimistic concurrency
        assert_eq!(written[0].metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(written[0].metadata.uid.as_deref(), Some("sts-uid"));
    }

    #[tokio::test]
    async fn create_failure_propagates() {
        let mut mock = MockNotebookKubeClient::new();
        mock.expect_get_stateful_set().returning(|_, _| Ok(None));
        mock.expect_create_stateful_set()
            .returning(|_| Err(api_error(403, "Forbidden")));

        let err = sync_child(&mock, &desired_sts(1)).await.unwrap_err();
        assert!(matches!(err, Error::Kube(_)));
    }

    #[tokio::test]
    async fn lookup_failure_propagates_without_writes() {
        let mut mock = MockNotebookKubeClient::new();
        mock.expect_get_stateful_set()
            .returning(|_, _| Err(api_error(500, "InternalError")));
        mock.expect_create_stateful_set().never();

        assert!(sync_child(&mock, &desired_sts(1)).await.is_err());
    }

    #[tokio::test]
    async fn child_without_namespace_is_rejected() {
        let mock = MockNotebookKubeClient::new();
        let mut sts = desired_sts(1);
        sts.metadata.namespace = None;
        let err = sync_child(&mock, &sts).await.unwrap_err();
        assert!(matches!(err, Error::MissingNamespace { .. }));
    }
}
