//! In-memory cluster for multi-pass reconcile tests

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetStatus};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{ApiResource, DynamicObject};
use kube::{Resource, ResourceExt};

use super::NotebookKubeClient;
use crate::crd::{Notebook, NotebookStatus};
use crate::error::api_error;
use crate::Error;

type Key = (String, String, String);

fn key(kind: &str, namespace: &str, name: &str) -> Key {
    (kind.to_string(), namespace.to_string(), name.to_string())
}

#[derive(Default)]
struct Store {
    notebooks: BTreeMap<Key, Notebook>,
    pods: BTreeMap<Key, Pod>,
    pvcs: BTreeMap<Key, PersistentVolumeClaim>,
    stateful_sets: BTreeMap<Key, StatefulSet>,
    services: BTreeMap<Key, Service>,
    ingresses: BTreeMap<Key, Ingress>,
    dynamic: BTreeMap<Key, DynamicObject>,
    next_version: u64,
    writes: Vec<(String, &'static str)>,
}

impl Store {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// API server stand-in with optimistic concurrency and a write log
#[derive(Default)]
pub(crate) struct FakeCluster {
    store: Mutex<Store>,
}

fn create_into<K: Resource + Clone>(
    map: &mut BTreeMap<Key, K>,
    k: Key,
    obj: &K,
    version: String,
) -> Result<K, Error> {
    if map.contains_key(&k) {
        return Err(api_error(409, "AlreadyExists"));
    }
    let mut stored = obj.clone();
    stored.meta_mut().resource_version = Some(version);
    stored.meta_mut().uid = Some(format!("uid-{}", k.2));
    map.insert(k, stored.clone());
    Ok(stored)
}

fn replace_into<K: Resource + Clone>(
    map: &mut BTreeMap<Key, K>,
    k: Key,
    obj: &K,
    version: String,
) -> Result<K, Error> {
    let current = map.get(&k).ok_or_else(|| api_error(404, "NotFound"))?;
    if current.meta().resource_version != obj.meta().resource_version {
        return Err(api_error(409, "Conflict"));
    }
    let mut stored = obj.clone();
    stored.meta_mut().resource_version = Some(version);
    map.insert(k, stored.clone());
    Ok(stored)
}

/// Fill in the pod template defaults the API server adds on every write
pub(crate) fn apply_pod_defaults(sts: &mut StatefulSet) {
    let Some(pod) = sts.spec.as_mut().and_then(|s| s.template.spec.as_mut()) else {
        return;
    };
    pod.restart_policy.get_or_insert_with(|| "Always".to_string());
    pod.dns_policy.get_or_insert_with(|| "ClusterFirst".to_string());
    pod.scheduler_name.get_or_insert_with(|| "default-scheduler".to_string());
    pod.termination_grace_period_seconds.get_or_insert(30);
    pod.security_context.get_or_insert_with(Default::default);
    for c in &mut pod.containers {
        c.image_pull_policy.get_or_insert_with(|| "Always".to_string());
        c.termination_message_path
            .get_or_insert_with(|| "/dev/termination-log".to_string());
        c.termination_message_policy.get_or_insert_with(|| "File".to_string());
        for port in c.ports.iter_mut().flatten() {
            port.protocol.get_or_insert_with(|| "TCP".to_string());
        }
    }
}

impl FakeCluster {
    /// Seed a Notebook
    pub(crate) fn with_notebook(self, notebook: Notebook) -> Self {
        {
            let mut store = self.store.lock().unwrap();
            let k = key("Notebook", &notebook.namespace().unwrap_or_default(), &notebook.name_any());
            store.notebooks.insert(k, notebook);
        }
        self
    }

    /// Put or replace a pod
    pub(crate) fn set_pod(&self, pod: Pod) {
        let mut store = self.store.lock().unwrap();
        let k = key("Pod", &pod.namespace().unwrap_or_default(), &pod.name_any());
        store.pods.insert(k, pod);
    }

    /// Report the StatefulSet's ready replicas, as the StatefulSet controller would
    pub(crate) fn set_ready_replicas(&self, namespace: &str, name: &str, ready: i32) {
        let mut store = self.store.lock().unwrap();
        if let Some(sts) = store.stateful_sets.get_mut(&key("StatefulSet", namespace, name)) {
            sts.status = Some(StatefulSetStatus {
                ready_replicas: Some(ready),
                replicas: ready,
                ..Default::default()
            });
        }
    }

    /// Current stored Notebook
    pub(crate) fn notebook(&self, namespace: &str, name: &str) -> Notebook {
        self.store.lock().unwrap().notebooks[&key("Notebook", namespace, name)].clone()
    }

    /// Current stored StatefulSet
    pub(crate) fn stateful_set(&self, namespace: &str, name: &str) -> StatefulSet {
        self.store.lock().unwrap().stateful_sets[&key("StatefulSet", namespace, name)].clone()
    }

    /// Every write so far as `(kind, verb)`
    pub(crate) fn writes(&self) -> Vec<(String, &'static str)> {
        self.store.lock().unwrap().writes.clone()
    }

    /// Forget the write log
    pub(crate) fn clear_writes(&self) {
        self.store.lock().unwrap().writes.clear();
    }

    /// Number of stored children of every kind except Notebooks and pods
    pub(crate) fn child_count(&self) -> usize {
        let store = self.store.lock().unwrap();
        store.pvcs.len()
            + store.stateful_sets.len()
            + store.services.len()
            + store.ingresses.len()
            + store.dynamic.len()
    }
}

#[async_trait]
impl NotebookKubeClient for FakeCluster {
    async fn get_notebook(&self, namespace: &str, name: &str) -> Result<Option<Notebook>, Error> {
        let store = self.store.lock().unwrap();
        Ok(store.notebooks.get(&key("Notebook", namespace, name)).cloned())
    }

    async fn replace_notebook(&self, notebook: &Notebook) -> Result<Notebook, Error> {
        let mut store = self.store.lock().unwrap();
        let k = key("Notebook", &notebook.namespace().unwrap_or_default(), &notebook.name_any());
        let version = store.bump();
        // Status is a subresource and is not written through the main resource
        let status = store.notebooks.get(&k).and_then(|n| n.status.clone());
        let mut incoming = notebook.clone();
        incoming.status = status;
        let stored = replace_into(&mut store.notebooks, k, &incoming, version)?;
        store.writes.push(("Notebook".to_string(), "replace"));
        Ok(stored)
    }

    async fn patch_notebook_status(
        &self,
        notebook: &Notebook,
        status: &NotebookStatus,
    ) -> Result<Notebook, Error> {
        let mut store = self.store.lock().unwrap();
        let k = key("Notebook", &notebook.namespace().unwrap_or_default(), &notebook.name_any());
        let version = store.bump();
        let current = store
            .notebooks
            .get_mut(&k)
            .ok_or_else(|| api_error(404, "NotFound"))?;
        if current.metadata.resource_version != notebook.metadata.resource_version {
            return Err(api_error(409, "Conflict"));
        }
        current.status = Some(status.clone());
        current.metadata.resource_version = Some(version);
        let updated = current.clone();
        store.writes.push(("NotebookStatus".to_string(), "patch"));
        Ok(updated)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, Error> {
        let store = self.store.lock().unwrap();
        Ok(store.pods.get(&key("Pod", namespace, name)).cloned())
    }

    async fn get_pvc(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, Error> {
        let store = self.store.lock().unwrap();
        Ok(store.pvcs.get(&key("PersistentVolumeClaim", namespace, name)).cloned())
    }

    async fn create_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim, Error> {
        let mut store = self.store.lock().unwrap();
        let k = key("PersistentVolumeClaim", &pvc.namespace().unwrap_or_default(), &pvc.name_any());
        let version = store.bump();
        let stored = create_into(&mut store.pvcs, k, pvc, version)?;
        store.writes.push(("PersistentVolumeClaim".to_string(), "create"));
        Ok(stored)
    }

    async fn replace_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim, Error> {
        let mut store = self.store.lock().unwrap();
        let k = key("PersistentVolumeClaim", &pvc.namespace().unwrap_or_default(), &pvc.name_any());
        let version = store.bump();
        let stored = replace_into(&mut store.pvcs, k, pvc, version)?;
        store.writes.push(("PersistentVolumeClaim".to_string(), "replace"));
        Ok(stored)
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StatefulSet>, Error> {
        let store = self.store.lock().unwrap();
        Ok(store.stateful_sets.get(&key("StatefulSet", namespace, name)).cloned())
    }

    async fn create_stateful_set(&self, sts: &StatefulSet) -> Result<StatefulSet, Error> {
        let mut store = self.store.lock().unwrap();
        let k = key("StatefulSet", &sts.namespace().unwrap_or_default(), &sts.name_any());
        let version = store.bump();
        let mut sts = sts.clone();
        apply_pod_defaults(&mut sts);
        let stored = create_into(&mut store.stateful_sets, k, &sts, version)?;
        store.writes.push(("StatefulSet".to_string(), "create"));
        Ok(stored)
    }

    async fn replace_stateful_set(&self, sts: &StatefulSet) -> Result<StatefulSet, Error> {
        let mut store = self.store.lock().unwrap();
        let k = key("StatefulSet", &sts.namespace().unwrap_or_default(), &sts.name_any());
        let version = store.bump();
        let mut sts = sts.clone();
        apply_pod_defaults(&mut sts);
        let stored = replace_into(&mut store.stateful_sets, k, &sts, version)?;
        store.writes.push(("StatefulSet".to_string(), "replace"));
        Ok(stored)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error> {
        let store = self.store.lock().unwrap();
        Ok(store.services.get(&key("Service", namespace, name)).cloned())
    }

    async fn create_service(&self, service: &Service) -> Result<Service, Error> {
        let mut store = self.store.lock().unwrap();
        let k = key("Service", &service.namespace().unwrap_or_default(), &service.name_any());
        let version = store.bump();
        let mut allocated = service.clone();
        if let Some(spec) = allocated.spec.as_mut() {
            spec.cluster_ip = Some("10.96.0.15".to_string());
        }
        let stored = create_into(&mut store.services, k, &allocated, version)?;
        store.writes.push(("Service".to_string(), "create"));
        Ok(stored)
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, Error> {
        let mut store = self.store.lock().unwrap();
        let k = key("Service", &service.namespace().unwrap_or_default(), &service.name_any());
        let version = store.bump();
        let stored = replace_into(&mut store.services, k, service, version)?;
        store.writes.push(("Service".to_string(), "replace"));
        Ok(stored)
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, Error> {
        let store = self.store.lock().unwrap();
        Ok(store.ingresses.get(&key("Ingress", namespace, name)).cloned())
    }

    async fn create_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        let mut store = self.store.lock().unwrap();
        let k = key("Ingress", &ingress.namespace().unwrap_or_default(), &ingress.name_any());
        let version = store.bump();
        let stored = create_into(&mut store.ingresses, k, ingress, version)?;
        store.writes.push(("Ingress".to_string(), "create"));
        Ok(stored)
    }

    async fn replace_ingress(&self, ingress: &Ingress) -> Result<Ingress, Error> {
        let mut store = self.store.lock().unwrap();
        let k = key("Ingress", &ingress.namespace().unwrap_or_default(), &ingress.name_any());
        let version = store.bump();
        let stored = replace_into(&mut store.ingresses, k, ingress, version)?;
        store.writes.push(("Ingress".to_string(), "replace"));
        Ok(stored)
    }

    async fn get_dynamic(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        let store = self.store.lock().unwrap();
        Ok(store.dynamic.get(&key(&resource.kind, namespace, name)).cloned())
    }

    async fn create_dynamic(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let mut store = self.store.lock().unwrap();
        let k = key(&resource.kind, &obj.namespace().unwrap_or_default(), &obj.name_any());
        let version = store.bump();
        let stored = create_into(&mut store.dynamic, k, obj, version)?;
        store.writes.push((resource.kind.clone(), "create"));
        Ok(stored)
    }

    async fn replace_dynamic(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let mut store = self.store.lock().unwrap();
        let k = key(&resource.kind, &obj.namespace().unwrap_or_default(), &obj.name_any());
        let version = store.bump();
        let stored = replace_into(&mut store.dynamic, k, obj, version)?;
        store.writes.push((resource.kind.clone(), "replace"));
        Ok(stored)
    }
}
