// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Standard Kubernetes status condition types and reasons for `KafkaCluster`.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a condition has
//! a particular status.
//!
//! # Condition Model
//!
//! A `KafkaCluster` carries exactly one condition of type `Available`. It is written
//! only by the workload readiness check and is overwritten in place on every
//! transition.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   conditions:
//!     - type: Available
//!       status: "False"
//!       reason: WorkloadNotSatisfied
//!       message: "Workload is not satisfied"
//!       observedGeneration: 4
//!       lastTransitionTime: "2025-01-01T00:00:00Z"
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// The single condition type maintained on the owning cluster
pub const CONDITION_TYPE_AVAILABLE: &str = "Available";

// ============================================================================
// Condition Status Values
// ============================================================================

/// Condition status `True`
pub const CONDITION_STATUS_TRUE: &str = "True";

/// Condition status `False`
pub const CONDITION_STATUS_FALSE: &str = "False";

// ============================================================================
// Workload Reasons
// ============================================================================

/// Observed pod count equals the declared replica count.
pub const REASON_WORKLOAD_SATISFIED: &str = "WorkloadSatisfied";

/// Observed pod count differs from the declared replica count.
///
/// The engine requeues after a short fixed interval while this reason is set.
pub const REASON_WORKLOAD_NOT_SATISFIED: &str = "WorkloadNotSatisfied";

/// Message accompanying [`REASON_WORKLOAD_SATISFIED`]
pub const MESSAGE_WORKLOAD_SATISFIED: &str = "Workload is satisfied";

/// Message accompanying [`REASON_WORKLOAD_NOT_SATISFIED`]
pub const MESSAGE_WORKLOAD_NOT_SATISFIED: &str = "Workload is not satisfied";
