// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Object store client used by the reconciliation engine.
//!
//! The engine never talks to `kube::Api` directly. It goes through [`ObjectStore`],
//! which has exactly the operations a reconcile pass needs: get, create, update with
//! a concurrency token, list by labels and status patch. [`KubeStore`] implements it
//! against a live API server; tests use an in-memory implementation.
//!
//! "Not found" is a distinguishable outcome: [`ObjectStore::get`] returns `Ok(None)`.

use async_trait::async_trait;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::debug;

use crate::constants::FIELD_MANAGER;
use crate::errors::{ReconcileError, Result};

/// Namespaced, typed objects the store can handle.
pub trait StoreResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> StoreResource for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Remote object store contract.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch an object. `Ok(None)` when it does not exist.
    async fn get<K: StoreResource>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// Create an object and return the stored version.
    async fn create<K: StoreResource>(&self, namespace: &str, obj: &K) -> Result<K>;

    /// Replace an object. `obj.metadata.resourceVersion` is the concurrency token.
    async fn update<K: StoreResource>(&self, namespace: &str, obj: &K) -> Result<K>;

    /// List objects matching every label in `labels`.
    async fn list<K: StoreResource>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>>;

    /// Merge-patch the status subresource of an object.
    async fn patch_status<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<()>;
}

/// Render a label map as a Kubernetes label selector string.
#[must_use]
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// [`ObjectStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoreResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn status_patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// Map a write failure to [`ReconcileError::Conflict`] when the server says 409.
fn map_write_error<K: StoreResource>(err: kube::Error, namespace: &str, name: &str) -> ReconcileError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => ReconcileError::Conflict {
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: ae.message,
        },
        other => ReconcileError::ObjectStore(other),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreResource>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        debug!(kind = %K::kind(&()), namespace, name, "Fetching object");
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create<K: StoreResource>(&self, namespace: &str, obj: &K) -> Result<K> {
        let name = obj.meta().name.clone().unwrap_or_default();
        self.api::<K>(namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_write_error::<K>(e, namespace, &name))
    }

    async fn update<K: StoreResource>(&self, namespace: &str, obj: &K) -> Result<K> {
        let name = obj.meta().name.clone().unwrap_or_default();
        self.api::<K>(namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_write_error::<K>(e, namespace, &name))
    }

    async fn list<K: StoreResource>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let params = ListParams::default().labels(&label_selector(labels));
        let list = self.api::<K>(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn patch_status<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<()> {
        let patch = serde_json::json!({ "status": status });
        self.api::<K>(namespace)
            .patch_status(name, &status_patch_params(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_write_error::<K>(e, namespace, name))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
