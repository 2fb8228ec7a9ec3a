// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`ObjectStore`] for unit tests.
//!
//! Objects are kept as JSON keyed by kind, namespace and name. Every call is recorded,
//! writes bump `metadata.resourceVersion`, and updates with a stale version fail with a
//! conflict the way the API server does. Individual operations can be made to fail.

use async_trait::async_trait;
use kube::error::ErrorResponse;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::errors::{ReconcileError, Result};
use crate::store::{ObjectStore, StoreResource};

/// Store operation, as recorded in [`FakeStore::calls`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    Create,
    Update,
    List,
    PatchStatus,
}

/// One recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub kind: String,
    pub namespace: String,
    /// Object name, or the label selector for `List`
    pub name: String,
}

/// Failure a test can inject for one operation on one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    Conflict,
    Forbidden,
}

type Key = (String, String, String);

#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<Key, Value>>,
    calls: Mutex<Vec<StoreCall>>,
    failures: Mutex<Vec<(StoreOp, String, Failure)>>,
    status_patches: Mutex<Vec<(String, Value)>>,
}

fn kind_of<K: StoreResource>() -> String {
    K::kind(&()).to_string()
}

fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
    kube::Error::Api(Box::new(ErrorResponse {
        status: Some(kube::core::response::StatusSummary::Failure),
        message: message.to_string(),
        reason: reason.to_string(),
        code,
        ..Default::default()
    }))
}

fn resource_version(value: &Value) -> Option<String> {
    value
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn set_metadata(value: &mut Value, field: &str, content: &str) {
    if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.insert(field.to_string(), Value::String(content.to_string()));
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an object into the store as-is, bypassing call recording.
    pub fn insert<K: StoreResource>(&self, obj: &K) {
        let namespace = obj.meta().namespace.clone().unwrap_or_default();
        let name = obj.meta().name.clone().unwrap_or_default();
        let mut value = serde_json::to_value(obj).unwrap();
        if resource_version(&value).is_none() {
            set_metadata(&mut value, "resourceVersion", "1");
        }
        self.objects
            .lock()
            .unwrap()
            .insert((kind_of::<K>(), namespace, name), value);
    }

    /// Read an object back, bypassing call recording.
    pub fn object<K: StoreResource>(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(kind_of::<K>(), namespace.to_string(), name.to_string()))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    /// Make `op` on the object named `name` fail with `failure`.
    pub fn fail(&self, op: StoreOp, name: &str, failure: Failure) {
        self.failures
            .lock()
            .unwrap()
            .push((op, name.to_string(), failure));
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded `op` calls on objects of `kind`.
    pub fn count(&self, op: StoreOp, kind: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op == op && c.kind == kind)
            .count()
    }

    /// Status patches sent so far, as `(name, status)`.
    pub fn status_patches(&self) -> Vec<(String, Value)> {
        self.status_patches.lock().unwrap().clone()
    }

    fn record(&self, op: StoreOp, kind: String, namespace: &str, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(StoreCall {
            op,
            kind: kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(o, n, _)| *o == op && n == name)
            .map(|(_, _, f)| *f);
        match failure {
            None => Ok(()),
            Some(Failure::Conflict) => Err(ReconcileError::Conflict {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
                message: "injected conflict".to_string(),
            }),
            Some(Failure::Forbidden) => Err(ReconcileError::ObjectStore(api_error(
                403,
                "Forbidden",
                "injected failure",
            ))),
        }
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get<K: StoreResource>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        self.record(StoreOp::Get, kind_of::<K>(), namespace, name)?;
        let stored = self
            .objects
            .lock()
            .unwrap()
            .get(&(kind_of::<K>(), namespace.to_string(), name.to_string()))
            .cloned();
        Ok(stored.map(serde_json::from_value).transpose()?)
    }

    async fn create<K: StoreResource>(&self, namespace: &str, obj: &K) -> Result<K> {
        let name = obj.meta().name.clone().unwrap_or_default();
        self.record(StoreOp::Create, kind_of::<K>(), namespace, &name)?;

        let key = (kind_of::<K>(), namespace.to_string(), name.clone());
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(ReconcileError::Conflict {
                kind: kind_of::<K>(),
                namespace: namespace.to_string(),
                name,
                message: "already exists".to_string(),
            });
        }
        let mut value = serde_json::to_value(obj)?;
        set_metadata(&mut value, "namespace", namespace);
        set_metadata(&mut value, "resourceVersion", "1");
        set_metadata(&mut value, "uid", &format!("uid-{name}"));
        objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn update<K: StoreResource>(&self, namespace: &str, obj: &K) -> Result<K> {
        let name = obj.meta().name.clone().unwrap_or_default();
        self.record(StoreOp::Update, kind_of::<K>(), namespace, &name)?;

        let key = (kind_of::<K>(), namespace.to_string(), name.clone());
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get(&key) else {
            return Err(ReconcileError::ObjectStore(api_error(
                404,
                "NotFound",
                "not found",
            )));
        };
        let stored_version = resource_version(stored).unwrap_or_default();
        if obj.meta().resource_version.as_deref() != Some(stored_version.as_str()) {
            return Err(ReconcileError::Conflict {
                kind: kind_of::<K>(),
                namespace: namespace.to_string(),
                name,
                message: "stale resourceVersion".to_string(),
            });
        }
        let next = stored_version.parse::<u64>().unwrap_or(0) + 1;
        let mut value = serde_json::to_value(obj)?;
        set_metadata(&mut value, "resourceVersion", &next.to_string());
        objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn list<K: StoreResource>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let selector = crate::store::label_selector(labels);
        self.record(StoreOp::List, kind_of::<K>(), namespace, &selector)?;

        let kind = kind_of::<K>();
        let objects = self.objects.lock().unwrap();
        objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .filter(|(_, value)| {
                labels.iter().all(|(label, expected)| {
                    value
                        .pointer("/metadata/labels")
                        .and_then(|l| l.get(label))
                        .and_then(Value::as_str)
                        == Some(expected.as_str())
                })
            })
            .map(|(_, value)| {
                serde_json::from_value::<K>(value.clone()).map_err(ReconcileError::from)
            })
            .collect()
    }

    async fn patch_status<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
        status: Value,
    ) -> Result<()> {
        self.record(StoreOp::PatchStatus, kind_of::<K>(), namespace, name)?;

        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        if let Some(Value::Object(map)) = self.objects.lock().unwrap().get_mut(&key) {
            map.insert("status".to_string(), status.clone());
        }
        self.status_patches
            .lock()
            .unwrap()
            .push((name.to_string(), status));
        Ok(())
    }
}
