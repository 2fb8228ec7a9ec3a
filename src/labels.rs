// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and operator-specific
//! labels/annotations so every managed object is selectable the same way.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture (the role, e.g. "broker")
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application (e.g., "kafka")
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the role group a pod belongs to
pub const K8S_ROLE_GROUP: &str = "app.kubernetes.io/role-group";

/// Label set by the StatefulSet controller on every pod
pub const STATEFULSET_POD_NAME: &str = "statefulset.kubernetes.io/pod-name";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Application name for Kafka resources
pub const APP_NAME_KAFKA: &str = "kafka";

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_KAFKA_OPERATOR: &str = "kafka.kubedoop.dev";

// ============================================================================
// Operator-Specific Labels
// ============================================================================

/// Marks bootstrap `Listener` objects so discovery can find them
pub const LISTENER_BOOTSTRAP_LABEL: &str = "app.kubernetes.io/listener-bootstrap";

/// Value of [`LISTENER_BOOTSTRAP_LABEL`]
pub const LISTENER_BOOTSTRAP_VALUE: &str = "true";

/// Scope label placed on per-pod services
pub const POD_SERVICE_SCOPE_LABEL: &str = "kafka.kubedoop.dev/scope";

/// Value of [`POD_SERVICE_SCOPE_LABEL`]
pub const POD_SERVICE_SCOPE_VALUE: &str = "pod";

// ============================================================================
// Operator-Specific Annotations
// ============================================================================

/// Annotation holding the last applied desired object (JSON)
pub const LAST_APPLIED_ANNOTATION: &str = "kafka.kubedoop.dev/last-applied";

/// Secret operator annotation: secret class
pub const SECRET_CLASS_ANNOTATION: &str = "secrets.kubedoop.dev/class";

/// Secret operator annotation: scope
pub const SECRET_SCOPE_ANNOTATION: &str = "secrets.kubedoop.dev/scope";

/// Secret operator annotation: output format
pub const SECRET_FORMAT_ANNOTATION: &str = "secrets.kubedoop.dev/format";

/// Secret operator annotation: PKCS#12 store password
pub const SECRET_PKCS12_PASSWORD_ANNOTATION: &str = "secrets.kubedoop.dev/tlsPKCS12Password";

/// Secret operator annotation: requested certificate lifetime
pub const SECRET_LIFETIME_ANNOTATION: &str = "secrets.kubedoop.dev/autoTlsCertLifetime";

/// Listener operator annotation on ephemeral listener volumes
pub const LISTENER_CLASS_ANNOTATION: &str = "listeners.kubedoop.dev/listenerClass";

/// Listener operator annotation naming an existing `Listener`
pub const LISTENER_NAME_ANNOTATION: &str = "listeners.kubedoop.dev/listenerName";
