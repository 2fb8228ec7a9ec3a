// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation for Kafka clusters.
//!
//! # Reconciliation Architecture
//!
//! The operator follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - The controller in `main.rs` watches `KafkaCluster` objects and the
//!    objects they own
//! 2. **Reconcile** - [`reconcile_kafkacluster`] derives every managed object and
//!    applies it through the [`engine`]
//! 3. **Status** - The `Available` condition is written back with [`status`]
//!
//! # Modules
//!
//! - [`engine`] - Per-object strategies (single, config override, workload, set)
//! - [`diff`] - Desired versus current comparison on JSON documents
//! - [`status`] - Status condition helpers
//! - [`kafkacluster`] - The ordered pass over one `KafkaCluster`
//!
//! # Example: Using the Reconciler
//!
//! ```rust,no_run
//! use kafka_operator::crd::KafkaCluster;
//! use kafka_operator::reconcilers::reconcile_kafkacluster;
//! use kafka_operator::store::KubeStore;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn reconcile(client: kube::Client, cluster: KafkaCluster) -> anyhow::Result<()> {
//!     let store = Arc::new(KubeStore::new(client));
//!     let requeue = reconcile_kafkacluster(store, Arc::new(cluster), CancellationToken::new())
//!         .await?;
//!     println!("requeue after {requeue:?}");
//!     Ok(())
//! }
//! ```

pub mod diff;
pub mod engine;
pub mod kafkacluster;
pub mod status;

#[cfg(test)]
pub mod fake_store;

pub use engine::{Reconcile, ReconcileContext, ReconcileOutcome, ResourceReconciler};
pub use kafkacluster::reconcile_kafkacluster;
