// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the `KafkaCluster` controller.
//!
//! The controller receives an `Arc<Context>` that contains:
//! - the object store every pass reads from and writes to
//! - the process-wide shutdown token
//!
//! Each pass gets a child of the shutdown token, so stopping the operator cancels every
//! pass in flight while a single pass can never stop the operator.

use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::constants::{ERROR_REQUEUE_DURATION_SECS, REQUEUE_WHEN_READY_SECS};
use crate::errors::ReconcileError;
use crate::store::{KubeStore, ObjectStore};

/// Shared context passed to the controller.
pub struct Context<S: ObjectStore = KubeStore> {
    /// Object store for all managed objects
    pub store: Arc<S>,

    /// Cancelled when the operator shuts down
    pub shutdown: CancellationToken,
}

impl<S: ObjectStore> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S: ObjectStore> Context<S> {
    pub fn new(store: Arc<S>, shutdown: CancellationToken) -> Self {
        Self { store, shutdown }
    }

    /// Token for one reconciliation pass.
    #[must_use]
    pub fn pass_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Action for a pass triggered after shutdown began, `None` while running.
    ///
    /// Such a pass writes nothing and is not requeued.
    #[must_use]
    pub fn shutdown_action(&self) -> Option<Action> {
        self.is_shutting_down().then(Action::await_change)
    }
}

/// Delay before the next pass after a successful one.
///
/// A converged cluster is still revisited periodically to repair drift.
#[must_use]
pub fn requeue_after_success(requested: Option<Duration>) -> Duration {
    requested.unwrap_or(Duration::from_secs(REQUEUE_WHEN_READY_SECS))
}

/// Delay before the next pass after a failed one.
#[must_use]
pub fn requeue_after_error(error: &ReconcileError) -> Duration {
    error
        .requeue_delay()
        .unwrap_or(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
