//! Cluster access used by the Notebook reconciler

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use crate::crd::{Notebook, NotebookStatus};
use crate::Error;

/// Field manager recorded on writes made by the controller
pub const FIELD_MANAGER: &str = "notebook-controller";

/// Trait abstracting the Kubernetes API calls the reconciler makes
///
/// Lookups return `Ok(None)` for objects that do not exist. Replacements
/// carry the stored `resourceVersion`, so a concurrent writer surfaces as a
/// 409 Conflict.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotebookKubeClient: Send + Sync {
    /// Fetch a Notebook
    async fn get_notebook(&self, namespace: &str, name: &str) -> Result<Option<Notebook>, Error>;

    /// Replace a Notebook's metadata and spec
    async fn replace_notebook(&self, notebook: &Notebook) -> Result<Notebook, Error>;

    /// Write the status subresource, returning the updated Notebook
    async fn patch_notebook_status(
        &self,
        notebook: &Notebook,
        status: &NotebookStatus,
    ) -> Result<Notebook, Error>;

    /// Fetch a Pod
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, Error>;

    /// Fetch a PersistentVolumeClaim
    async fn get_pvc(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, Error>;
    /// Create a PersistentVolumeClaim
    async fn create_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim, Error>;
    /// Replace a PersistentVolumeClaim
    async fn replace_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim, Error>;

    /// Fetch a StatefulSet
    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StatefulSet>, Error>;
    /// Create a StatefulSet
    async fn create_stateful_set(&self, sts: &StatefulSet) -> Result<StatefulSet, Error>;
    /// Replace a StatefulSet
    async fn replace_stateful_set(&self, sts: &StatefulSet) -> Result<StatefulSet, Error>;

    /// Fetch a Service
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error>;
    /// Create a Service
    async fn create_service(&self, service: &Service) -> Result<Service, Error>;
    /// Replace a Service
    async fn replace_service(&self, service: &Service) -> Result<Service, Error>;

    /// Fetch an Ingress
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, Error>;
    /// Create an Ingress
    async fn create_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error>;
    /// Replace an Ingress
    async fn replace_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error>;

    /// Fetch an object of a kind without a static schema
    async fn get_dynamic(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;
    /// Create an object of a kind without a static schema
    async fn create_dynamic(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error>;
    /// Replace an object of a kind without a static schema
    async fn replace_dynamic(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of<K>(obj: &K) -> Result<String, Error>
where
    K: Resource,
    <K as Resource>::DynamicType: Default,
{
    obj.namespace()
        .ok_or_else(|| Error::missing_namespace(K::kind(&Default::default()), obj.name_any()))
}

fn post_params() -> PostParams {
    PostParams {
        dry_run: false,
        field_manager: Some(FIELD_MANAGER.to_string()),
    }
}

async fn create_in<K>(api: Api<K>, obj: &K) -> Result<K, Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + std::fmt::Debug,
{
    Ok(api.create(&post_params(), obj).await?)
}

async fn replace_in<K>(api: Api<K>, obj: &K) -> Result<K, Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + std::fmt::Debug,
{
    Ok(api.replace(&obj.name_any(), &post_params(), obj).await?)
}

#[async_trait]
impl NotebookKubeClient for KubeClientImpl {
    async fn get_notebook(&self, namespace: &str, name: &str) -> Result<Option<Notebook>, Error> {
        Ok(self.api::<Notebook>(namespace).get_opt(name).await?)
    }

    async fn replace_notebook(&self, notebook: &Notebook) -> Result<Notebook, Error> {
        let namespace = notebook.require_namespace()?;
        replace_in(self.api::<Notebook>(&namespace), notebook).await
    }

    async fn patch_notebook_status(
        &self,
        notebook: &Notebook,
        status: &NotebookStatus,
    ) -> Result<Notebook, Error> {
        let namespace = notebook.require_namespace()?;
        let status_patch = serde_json::json!({
            "metadata": { "resourceVersion": notebook.resource_version() },
            "status": status,
        });
        Ok(self
            .api::<Notebook>(&namespace)
            .patch_status(
                &notebook.name_any(),
                &PatchParams {
                    field_manager: Some(FIELD_MANAGER.to_string()),
                    ..Default::default()
                },
                &Patch::Merge(&status_patch),
            )
            .await?)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, Error> {
        Ok(self.api::<Pod>(namespace).get_opt(name).await?)
    }

    async fn get_pvc(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, Error> {
        Ok(self.api::<PersistentVolumeClaim>(namespace).get_opt(name).await?)
    }

    async fn create_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim, Error> {
        create_in(self.api(&namespace_of(pvc)?), pvc).await
    }

    async fn replace_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim, Error> {
        replace_in(self.api(&namespace_of(pvc)?), pvc).await
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StatefulSet>, Error> {
        Ok(self.api::<StatefulSet>(namespace).get_opt(name).await?)
    }

    async fn create_stateful_set(&self, sts: &StatefulSet) -> Result<StatefulSet, Error> {
        create_in(self.api(&namespace_of(sts)?), sts).await
    }

    async fn replace_stateful_set(&self, sts: &StatefulSet) -> Result<StatefulSet, Error> {
        replace_in(self.api(&namespace_of(sts)?), sts).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error> {
        Ok(self.api::<Service>(namespace).get_opt(name).await?)
    }

    async fn create_service(&self, service: &Service) -> Result<Service, Error> {
        create_in(self.api(&namespace_of(service)?), service).await
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, Error> {
        replace_in(self.api(&namespace_of(service)?), service).await
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, Error> {
        Ok(self.api::<Ingress>(namespace).get_opt(name).await?)
    }

    async fn create_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        create_in(self.api(&namespace_of(ingress)?), ingress).await
    }

    async fn replace_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        replace_in(self.api(&namespace_of(ingress)?), ingress).await
    }

    async fn get_dynamic(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        Ok(api.get_opt(name).await?)
    }

    async fn create_dynamic(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::missing_namespace(resource.kind.clone(), obj.name_any()))?;
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &namespace, resource);
        create_in(api, obj).await
    }

    async fn replace_dynamic(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::missing_namespace(resource.kind.clone(), obj.name_any()))?;
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &namespace, resource);
        replace_in(api, obj).await
    }
}
