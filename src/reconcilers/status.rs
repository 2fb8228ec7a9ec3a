// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers for `KafkaCluster` resources.
//!
//! The operator maintains exactly one condition, `Available`. It is written only by the
//! workload readiness check and persisted once per pass through the status subresource.
//!
//! # Condition Format
//!
//! - `type`: always `Available`
//! - `status`: "True" or "False"
//! - `reason`: `WorkloadSatisfied` or `WorkloadNotSatisfied`
//! - `message`: A human-readable explanation
//! - `observedGeneration`: generation of the `KafkaCluster` the check ran against
//! - `lastTransitionTime`: RFC3339 timestamp of the last status flip
//!
//! # Example
//!
//! ```rust,no_run
//! use kafka_operator::reconcilers::status::ConditionsHandle;
//!
//! let conditions = ConditionsHandle::new(Vec::new());
//! conditions.set_available(false, Some(1));
//! conditions.set_available(true, Some(1));
//! assert_eq!(conditions.snapshot().len(), 1);
//! ```

use crate::crd::{Condition, KafkaCluster, KafkaClusterStatus};
use crate::errors::Result;
use crate::status_reasons::{
    CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE, CONDITION_TYPE_AVAILABLE,
    MESSAGE_WORKLOAD_NOT_SATISFIED, MESSAGE_WORKLOAD_SATISFIED, REASON_WORKLOAD_NOT_SATISFIED,
    REASON_WORKLOAD_SATISFIED,
};
use crate::store::ObjectStore;
use chrono::Utc;
use kube::ResourceExt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Create a new condition with the current timestamp.
///
/// # Example
///
/// ```rust,no_run
/// # use kafka_operator::reconcilers::status::create_condition;
/// let condition = create_condition(
///     "Available",
///     "True",
///     "WorkloadSatisfied",
///     "Workload is satisfied",
///     Some(2),
/// );
/// assert_eq!(condition.r#type, "Available");
/// ```
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        observed_generation,
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Find a condition by type in a list of conditions.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Update or add a condition in a mutable conditions list (in-memory, no API call).
///
/// An existing condition of the same type is overwritten in place; any duplicates of
/// that type are dropped. `lastTransitionTime` is kept when the status is unchanged.
pub fn update_condition_in_memory(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) {
    let mut seen = false;
    conditions.retain(|c| {
        if c.r#type != condition_type {
            return true;
        }
        let keep = !seen;
        seen = true;
        keep
    });

    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        // Preserve lastTransitionTime if status hasn't changed
        let last_transition_time = if existing.status == status {
            existing
                .last_transition_time
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339())
        } else {
            Utc::now().to_rfc3339()
        };

        existing.status = status.to_string();
        existing.reason = Some(reason.to_string());
        existing.message = Some(message.to_string());
        existing.observed_generation = observed_generation;
        existing.last_transition_time = Some(last_transition_time);
    } else {
        conditions.push(create_condition(
            condition_type,
            status,
            reason,
            message,
            observed_generation,
        ));
    }
}

/// Compare two condition lists, ignoring `lastTransitionTime`.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    if current.len() != new.len() {
        return false;
    }

    new.iter().all(|new_cond| {
        current.iter().any(|c| {
            c.r#type == new_cond.r#type
                && c.status == new_cond.status
                && c.reason == new_cond.reason
                && c.message == new_cond.message
                && c.observed_generation == new_cond.observed_generation
        })
    })
}

/// Shared, per-pass view of a `KafkaCluster`'s status conditions.
///
/// Handed to every workload strategy of one pass; the orchestrator persists the final
/// list once at the end of the pass. Clones share the same list.
#[derive(Clone, Debug, Default)]
pub struct ConditionsHandle {
    inner: Arc<Mutex<Vec<Condition>>>,
}

impl ConditionsHandle {
    #[must_use]
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conditions)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Condition>> {
        // A panic while holding the lock leaves a list that is still well formed
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record the outcome of a readiness check as the `Available` condition.
    pub fn set_available(&self, satisfied: bool, observed_generation: Option<i64>) {
        let (status, reason, message) = if satisfied {
            (
                CONDITION_STATUS_TRUE,
                REASON_WORKLOAD_SATISFIED,
                MESSAGE_WORKLOAD_SATISFIED,
            )
        } else {
            (
                CONDITION_STATUS_FALSE,
                REASON_WORKLOAD_NOT_SATISFIED,
                MESSAGE_WORKLOAD_NOT_SATISFIED,
            )
        };
        update_condition_in_memory(
            &mut self.lock(),
            CONDITION_TYPE_AVAILABLE,
            status,
            reason,
            message,
            observed_generation,
        );
    }

    /// The current `Available` condition, if any.
    #[must_use]
    pub fn available(&self) -> Option<Condition> {
        find_condition(&self.lock(), CONDITION_TYPE_AVAILABLE).cloned()
    }

    /// Copy of the full condition list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Condition> {
        self.lock().clone()
    }
}

/// Persist the pass's conditions on the `KafkaCluster` if they changed.
///
/// Returns whether a status patch was sent.
///
/// # Errors
///
/// Returns the object store error of the status patch.
pub async fn persist_conditions<S: ObjectStore>(
    store: &S,
    cluster: &KafkaCluster,
    conditions: &ConditionsHandle,
) -> Result<bool> {
    let current = cluster
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();
    let new_conditions = conditions.snapshot();

    if conditions_equal(current, &new_conditions) {
        debug!(cluster = %cluster.name_any(), "Status conditions unchanged, skipping patch");
        return Ok(false);
    }

    let status = KafkaClusterStatus {
        conditions: new_conditions,
    };
    store
        .patch_status::<KafkaCluster>(
            &cluster.namespace().unwrap_or_default(),
            &cluster.name_any(),
            serde_json::to_value(&status)?,
        )
        .await?;
    Ok(true)
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
