// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Structural diff between a desired and a current object.
//!
//! Objects are compared as JSON. The desired object "is covered" by the current one when
//! every field the operator sets has the same value on the server; fields only the
//! server sets (defaults, status, bookkeeping metadata) never cause an update. Fields
//! the operator set last time but no longer sets are detected through the last-applied
//! annotation.
//!
//! Two kinds need extra handling before the comparison:
//!
//! - `Service`: the cluster IP and per-port node ports are assigned by the server and are
//!   copied from the current object into the desired one.
//! - `StatefulSet`: the server fills `apiVersion`, `kind` and `status` of volume claim
//!   templates, so those are ignored.

use serde_json::{Map, Value};

use crate::labels::LAST_APPLIED_ANNOTATION;
use crate::quantity::quantities_equal;

const KIND_SERVICE: &str = "Service";
const KIND_STATEFUL_SET: &str = "StatefulSet";

/// Canonical JSON of an object as applied by the operator.
///
/// Drops `status` and the last-applied annotation itself. `serde_json` maps are sorted,
/// so the result is reproducible.
#[must_use]
pub fn last_applied_value(obj: &Value) -> String {
    let mut copy = obj.clone();
    strip_for_compare(&mut copy);
    copy.to_string()
}

/// Store the last-applied annotation on `obj`.
pub fn set_last_applied(obj: &mut Value) {
    let applied = last_applied_value(obj);
    let Some(metadata) = obj.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    let annotations = metadata
        .entry("annotations")
        .or_insert_with(|| Value::Object(Map::new()));
    if !annotations.is_object() {
        *annotations = Value::Object(Map::new());
    }
    if let Some(map) = annotations.as_object_mut() {
        map.insert(LAST_APPLIED_ANNOTATION.to_string(), Value::String(applied));
    }
}

/// Parse the last-applied annotation of `obj`, if present and valid.
#[must_use]
pub fn get_last_applied(obj: &Value) -> Option<Value> {
    let raw = obj
        .pointer("/metadata/annotations")?
        .get(LAST_APPLIED_ANNOTATION)?
        .as_str()?;
    serde_json::from_str(raw).ok()
}

/// Remove everything that never takes part in the comparison.
fn strip_for_compare(obj: &mut Value) {
    let Some(map) = obj.as_object_mut() else {
        return;
    };
    map.remove("status");

    if let Some(metadata) = map.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in [
            "resourceVersion",
            "uid",
            "generation",
            "creationTimestamp",
            "managedFields",
            "selfLink",
        ] {
            metadata.remove(field);
        }
        let empty = metadata
            .get_mut("annotations")
            .and_then(Value::as_object_mut)
            .map(|a| {
                a.remove(LAST_APPLIED_ANNOTATION);
                a.is_empty()
            })
            .unwrap_or(false);
        if empty {
            metadata.remove("annotations");
        }
    }
}

/// Drop the server-populated parts of volume claim templates.
fn strip_claim_template_metadata(obj: &mut Value) {
    let Some(templates) = obj
        .pointer_mut("/spec/volumeClaimTemplates")
        .and_then(Value::as_array_mut)
    else {
        return;
    };
    for template in templates.iter_mut().filter_map(Value::as_object_mut) {
        template.remove("apiVersion");
        template.remove("kind");
        template.remove("status");
    }
}

fn port_key(port: &Value) -> Option<Value> {
    port.get("name")
        .filter(|n| !n.is_null())
        .or_else(|| port.get("port"))
        .cloned()
}

/// Copy server-assigned service fields from `current` into `desired`.
///
/// The cluster IP is always kept. Node ports are kept per port (matched by name, or by
/// port number for unnamed ports) when the service type allocates them.
pub fn preserve_service_assigned(current: &Value, desired: &mut Value) {
    let Some(current_spec) = current.get("spec") else {
        return;
    };
    let Some(desired_spec) = desired.get_mut("spec").and_then(Value::as_object_mut) else {
        return;
    };

    for field in ["clusterIP", "clusterIPs"] {
        let unset = desired_spec.get(field).is_none_or(Value::is_null);
        if let Some(value) = current_spec.get(field).filter(|v| !v.is_null()) {
            if unset {
                desired_spec.insert(field.to_string(), value.clone());
            }
        }
    }

    let allocates_node_ports = matches!(
        desired_spec.get("type").and_then(Value::as_str),
        Some("NodePort" | "LoadBalancer")
    );
    if !allocates_node_ports {
        return;
    }

    let current_ports = current_spec
        .get("ports")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let Some(desired_ports) = desired_spec.get_mut("ports").and_then(Value::as_array_mut) else {
        return;
    };
    for port in desired_ports.iter_mut() {
        let key = port_key(port);
        let Some(map) = port.as_object_mut() else {
            continue;
        };
        if map.get("nodePort").is_some_and(|v| !v.is_null()) {
            continue;
        }
        let node_port = current_ports
            .iter()
            .find(|p| key.is_some() && port_key(p) == key)
            .and_then(|p| p.get("nodePort"))
            .filter(|v| !v.is_null());
        if let Some(node_port) = node_port {
            map.insert("nodePort".to_string(), node_port.clone());
        }
    }
}

/// Bring `desired` in line with the kind-specific rules before it is compared or sent.
pub fn prepare_desired(kind: &str, current: &Value, desired: &mut Value) {
    match kind {
        KIND_SERVICE => preserve_service_assigned(current, desired),
        KIND_STATEFUL_SET => strip_claim_template_metadata(desired),
        _ => {}
    }
}

/// Whether `path` names a resource quantity, such as `/resources/limits/memory` in a
/// container or `/spec/resources/requests/storage` in a claim template.
fn is_quantity_path(path: &str) -> bool {
    let mut segments = path.rsplit('/').skip(1);
    matches!(
        (segments.next(), segments.next()),
        (Some("requests" | "limits"), Some("resources"))
    )
}

fn scalar_equal(desired: &Value, current: &Value, path: &str) -> bool {
    match (desired, current) {
        (Value::String(d), Value::String(c)) => {
            d == c || (is_quantity_path(path) && quantities_equal(d, c))
        }
        (Value::Number(d), Value::Number(c)) => d.as_f64() == c.as_f64(),
        _ => desired == current,
    }
}

/// Collect the paths where `current` does not match what `desired` sets.
fn collect_uncovered(desired: &Value, current: &Value, path: &str, out: &mut Vec<String>) {
    match (desired, current) {
        (Value::Object(d), Value::Object(c)) => {
            for (key, d_value) in d {
                if d_value.is_null() {
                    continue;
                }
                let child = format!("{path}/{key}");
                match c.get(key) {
                    Some(c_value) => collect_uncovered(d_value, c_value, &child, out),
                    None => out.push(child),
                }
            }
        }
        (Value::Array(d), Value::Array(c)) => {
            if d.len() != c.len() {
                out.push(path.to_string());
                return;
            }
            for (i, (d_item, c_item)) in d.iter().zip(c).enumerate() {
                collect_uncovered(d_item, c_item, &format!("{path}/{i}"), out);
            }
        }
        _ => {
            if !scalar_equal(desired, current, path) {
                out.push(path.to_string());
            }
        }
    }
}

/// Collect the paths the operator set last time and no longer sets.
fn collect_removed(last_applied: &Value, desired: &Value, path: &str, out: &mut Vec<String>) {
    let (Value::Object(last), Value::Object(d)) = (last_applied, desired) else {
        return;
    };
    for (key, last_value) in last {
        if last_value.is_null() {
            continue;
        }
        let child = format!("{path}/{key}");
        match d.get(key).filter(|v| !v.is_null()) {
            Some(d_value) => collect_removed(last_value, d_value, &child, out),
            None => out.push(child),
        }
    }
}

/// Paths that differ between `current` and `desired` for an object of `kind`.
///
/// `desired` must already have been passed through [`prepare_desired`]. An empty result
/// means no update is needed.
#[must_use]
pub fn diff(kind: &str, current: &Value, desired: &Value) -> Vec<String> {
    let mut desired = desired.clone();
    let mut current_cmp = current.clone();
    strip_for_compare(&mut desired);
    strip_for_compare(&mut current_cmp);
    if kind == KIND_STATEFUL_SET {
        strip_claim_template_metadata(&mut desired);
        strip_claim_template_metadata(&mut current_cmp);
    }

    let mut paths = Vec::new();
    collect_uncovered(&desired, &current_cmp, "", &mut paths);
    if let Some(last_applied) = get_last_applied(current) {
        collect_removed(&last_applied, &desired, "", &mut paths);
    }
    paths
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
