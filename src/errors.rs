// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error taxonomy of the reconciliation core.
//!
//! Every failure a reconcile pass can surface is one of these variants. Object store
//! errors are carried verbatim; "not found" is reported through `Option` by the store
//! and only becomes [`ReconcileError::NotFound`] where a caller requires the object.

use std::time::Duration;
use thiserror::Error;

use crate::constants::ERROR_REQUEUE_DURATION_SECS;

/// Errors that can occur while reconciling a `KafkaCluster`.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// A required configuration layer or capability is missing or invalid.
    ///
    /// Fatal to the current pass for the affected resource.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An object required by a builder does not exist (yet).
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Kind of the missing object
        kind: String,
        /// Namespace of the missing object
        namespace: String,
        /// Name of the missing object
        name: String,
    },

    /// Optimistic-concurrency failure on update. The next scheduled pass retries.
    #[error("conflict updating {kind} {namespace}/{name}: {message}")]
    Conflict {
        /// Kind of the conflicting object
        kind: String,
        /// Namespace of the conflicting object
        namespace: String,
        /// Name of the conflicting object
        name: String,
        /// Message returned by the API server
        message: String,
    },

    /// Any other object store failure, unmodified.
    #[error("object store error: {0}")]
    ObjectStore(#[from] kube::Error),

    /// A port name referenced by discovery is absent from a listener.
    #[error("topology error: {0}")]
    Topology(String),

    /// Converting an object to or from JSON failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The pass was cancelled before it completed.
    #[error("reconciliation cancelled")]
    Cancelled,
}

/// Result type of reconciliation operations
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;

impl ReconcileError {
    /// Create a [`ReconcileError::NotFound`].
    pub fn not_found(kind: &str, namespace: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether a later pass can be expected to succeed without user action.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Conflict { .. } | Self::ObjectStore(_)
        )
    }

    /// Suggested requeue delay after this error.
    ///
    /// Configuration and topology errors still requeue, but slower, so a fix to a
    /// referenced object is picked up without a spec change.
    #[must_use]
    pub fn requeue_delay(&self) -> Option<Duration> {
        match self {
            Self::Cancelled => None,
            _ if self.is_retryable() => Some(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS)),
            _ => Some(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS * 10)),
        }
    }

    /// Short machine-friendly name used as a metrics label.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::ObjectStore(_) => "object_store",
            Self::Topology(_) => "topology",
            Self::Serialization(_) => "serialization",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
