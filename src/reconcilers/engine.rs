// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation engine for managed objects.
//!
//! One reconcile of one managed resource runs build, fetch, create-or-diff, update and,
//! for workloads, a readiness check. Every step is re-derived from the object store on
//! each pass; nothing is remembered between passes.
//!
//! # Strategies
//!
//! - [`SingleObject`] - build one object and apply it
//! - [`ConfigOverrideObject`] - like single, with a required hook that applies user
//!   configuration overrides onto the built object
//! - [`WorkloadObject`] - apply a workload with optional command, environment, logging
//!   and affinity hooks, then compare observed pods with the declared replica count
//! - [`MultiObject`] - apply a set of objects, continuing past member failures
//!
//! [`ResourceReconciler`] wraps the four strategies for one object kind and implements
//! [`Reconcile`], which erases the kind so an orchestrator can run a heterogeneous list.
//!
//! # Errors
//!
//! Object store errors are returned unmodified. The engine never retries and never
//! sleeps; a requeue is expressed through [`ReconcileOutcome`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{
    REQUEUE_AFTER_UPDATE, REQUEUE_AFTER_WORKLOAD_UPDATE, REQUEUE_MEMBER_COUNT_MISMATCH,
    REQUEUE_WORKLOAD_NOT_READY,
};
use crate::errors::{ReconcileError, Result};
use crate::metrics;
use crate::reconcilers::diff;
use crate::reconcilers::status::ConditionsHandle;
use crate::store::{ObjectStore, StoreResource};

/// Terminal result of reconciling one resource in one pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The object did not exist and was created.
    Created,
    /// The object differed and was updated; wait before looking at it again.
    Updated { requeue_after: Duration },
    /// The object already matched the desired state.
    Unchanged,
    /// The builder produced no object for this pass.
    Skipped,
    /// Not converged yet; reconcile again after the delay.
    RequeueAfter(Duration),
}

impl ReconcileOutcome {
    /// Delay requested before the next pass, `None` for zero requeue.
    #[must_use]
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::Updated { requeue_after } | Self::RequeueAfter(requeue_after) => {
                Some(*requeue_after)
            }
            Self::Created | Self::Unchanged | Self::Skipped => None,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated { .. } => "updated",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
            Self::RequeueAfter(_) => "requeue",
        }
    }
}

/// Everything one pass needs to talk to the object store.
pub struct ReconcileContext<S> {
    pub store: Arc<S>,
    /// Namespace all managed objects live in
    pub namespace: String,
    /// Owner reference stamped on objects that do not carry one
    pub owner: Option<OwnerReference>,
    pub cancel: CancellationToken,
}

impl<S> Clone for ReconcileContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: self.namespace.clone(),
            owner: self.owner.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S: ObjectStore> ReconcileContext<S> {
    pub fn new(store: Arc<S>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            owner: None,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner = Some(owner);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// # Errors
    ///
    /// [`ReconcileError::Cancelled`] once the pass's token has been cancelled.
    pub fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        Ok(())
    }
}

/// Produces the desired state of one object.
///
/// `Ok(None)` means the object does not apply this pass, which is not an error.
#[async_trait]
pub trait ObjectBuilder<K, S: ObjectStore>: Send + Sync {
    async fn build(&self, ctx: &ReconcileContext<S>) -> Result<Option<K>>;
}

/// [`ObjectBuilder`] around a synchronous closure that needs no store access.
pub struct FnBuilder<F>(pub F);

impl<F> FnBuilder<F> {
    pub fn new<K>(f: F) -> Self
    where
        F: Fn() -> Result<Option<K>> + Send + Sync,
    {
        Self(f)
    }
}

#[async_trait]
impl<K, S, F> ObjectBuilder<K, S> for FnBuilder<F>
where
    K: StoreResource,
    S: ObjectStore,
    F: Fn() -> Result<Option<K>> + Send + Sync,
{
    async fn build(&self, _ctx: &ReconcileContext<S>) -> Result<Option<K>> {
        (self.0)()
    }
}

/// Mutation applied to a built object before it is sent.
pub type ObjectHook<K> = Box<dyn Fn(&mut K) + Send + Sync>;

/// Shared contract of every strategy.
#[async_trait]
pub trait Reconcile<S: ObjectStore>: Send + Sync {
    async fn reconcile(&self, ctx: &ReconcileContext<S>) -> Result<ReconcileOutcome>;
}

async fn build<K, S>(
    ctx: &ReconcileContext<S>,
    builder: &dyn ObjectBuilder<K, S>,
) -> Result<Option<K>>
where
    K: StoreResource,
    S: ObjectStore,
{
    ctx.ensure_not_cancelled()?;
    builder.build(ctx).await
}

/// Create the object, or update it when it differs from the current state.
async fn apply<K, S>(
    ctx: &ReconcileContext<S>,
    mut desired: K,
    update_requeue: Duration,
) -> Result<ReconcileOutcome>
where
    K: StoreResource,
    S: ObjectStore,
{
    ctx.ensure_not_cancelled()?;

    let kind = K::kind(&()).to_string();
    let namespace = ctx.namespace.as_str();
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| ReconcileError::Configuration(format!("{kind} built without a name")))?;

    let meta = desired.meta_mut();
    meta.namespace = Some(namespace.to_string());
    if let Some(owner) = &ctx.owner {
        if meta.owner_references.as_ref().is_none_or(Vec::is_empty) {
            meta.owner_references = Some(vec![owner.clone()]);
        }
    }

    let Some(current) = ctx.store.get::<K>(namespace, &name).await? else {
        let mut value = serde_json::to_value(&desired)?;
        diff::set_last_applied(&mut value);
        let obj: K = serde_json::from_value(value)?;
        ctx.store.create(namespace, &obj).await?;
        info!(kind = %kind, namespace, name = %name, "Created object");
        metrics::record_object_applied(&kind, "created");
        return Ok(ReconcileOutcome::Created);
    };

    let current_value = serde_json::to_value(&current)?;
    let mut desired_value = serde_json::to_value(&desired)?;
    diff::prepare_desired(&kind, &current_value, &mut desired_value);

    let changed = diff::diff(&kind, &current_value, &desired_value);
    if changed.is_empty() {
        debug!(kind = %kind, namespace, name = %name, "Object up to date");
        metrics::record_object_applied(&kind, "unchanged");
        return Ok(ReconcileOutcome::Unchanged);
    }
    debug!(kind = %kind, namespace, name = %name, paths = ?changed, "Object differs from desired state");

    diff::set_last_applied(&mut desired_value);
    let mut obj: K = serde_json::from_value(desired_value)?;
    obj.meta_mut()
        .resource_version
        .clone_from(&current.meta().resource_version);
    ctx.store.update(namespace, &obj).await?;

    info!(kind = %kind, namespace, name = %name, "Updated object");
    metrics::record_object_applied(&kind, "updated");
    Ok(ReconcileOutcome::Updated {
        requeue_after: update_requeue,
    })
}

// ============================================================================
// Single object
// ============================================================================

/// Build one object and apply it.
pub struct SingleObject<K, S: ObjectStore> {
    builder: Box<dyn ObjectBuilder<K, S>>,
}

impl<K: StoreResource, S: ObjectStore> SingleObject<K, S> {
    pub fn new(builder: impl ObjectBuilder<K, S> + 'static) -> Self {
        Self {
            builder: Box::new(builder),
        }
    }

    async fn run(&self, ctx: &ReconcileContext<S>) -> Result<ReconcileOutcome> {
        match build(ctx, self.builder.as_ref()).await? {
            Some(desired) => apply(ctx, desired, REQUEUE_AFTER_UPDATE).await,
            None => Ok(ReconcileOutcome::Skipped),
        }
    }
}

// ============================================================================
// Config override object
// ============================================================================

/// Build a configuration object and apply user overrides onto it before applying.
pub struct ConfigOverrideObject<K, S: ObjectStore> {
    builder: Box<dyn ObjectBuilder<K, S>>,
    config_override: Option<ObjectHook<K>>,
}

impl<K: StoreResource, S: ObjectStore> ConfigOverrideObject<K, S> {
    pub fn new(builder: impl ObjectBuilder<K, S> + 'static) -> Self {
        Self {
            builder: Box::new(builder),
            config_override: None,
        }
    }

    #[must_use]
    pub fn with_config_override(mut self, hook: impl Fn(&mut K) + Send + Sync + 'static) -> Self {
        self.config_override = Some(Box::new(hook));
        self
    }

    async fn run(&self, ctx: &ReconcileContext<S>) -> Result<ReconcileOutcome> {
        let Some(hook) = &self.config_override else {
            return Err(ReconcileError::Configuration(format!(
                "{} reconciler has no config override hook",
                K::kind(&())
            )));
        };
        let Some(mut desired) = build(ctx, self.builder.as_ref()).await? else {
            return Ok(ReconcileOutcome::Skipped);
        };
        hook(&mut desired);
        apply(ctx, desired, REQUEUE_AFTER_UPDATE).await
    }
}

// ============================================================================
// Workload object
// ============================================================================

/// Apply a workload, then check that its pods match the declared replica count.
pub struct WorkloadObject<K, S: ObjectStore> {
    builder: Box<dyn ObjectBuilder<K, S>>,
    replicas: i32,
    pod_selector: BTreeMap<String, String>,
    conditions: Option<ConditionsHandle>,
    observed_generation: Option<i64>,
    command_override: Option<ObjectHook<K>>,
    env_override: Option<ObjectHook<K>>,
    logging_override: Option<ObjectHook<K>>,
    affinity: Option<ObjectHook<K>>,
}

impl<K: StoreResource, S: ObjectStore> WorkloadObject<K, S> {
    pub fn new(
        builder: impl ObjectBuilder<K, S> + 'static,
        replicas: i32,
        pod_selector: BTreeMap<String, String>,
    ) -> Self {
        Self {
            builder: Box::new(builder),
            replicas,
            pod_selector,
            conditions: None,
            observed_generation: None,
            command_override: None,
            env_override: None,
            logging_override: None,
            affinity: None,
        }
    }

    /// Where the readiness check records the `Available` condition.
    #[must_use]
    pub fn with_conditions(
        mut self,
        conditions: ConditionsHandle,
        observed_generation: Option<i64>,
    ) -> Self {
        self.conditions = Some(conditions);
        self.observed_generation = observed_generation;
        self
    }

    #[must_use]
    pub fn with_command_override(mut self, hook: impl Fn(&mut K) + Send + Sync + 'static) -> Self {
        self.command_override = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn with_env_override(mut self, hook: impl Fn(&mut K) + Send + Sync + 'static) -> Self {
        self.env_override = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn with_logging_override(mut self, hook: impl Fn(&mut K) + Send + Sync + 'static) -> Self {
        self.logging_override = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn with_affinity(mut self, hook: impl Fn(&mut K) + Send + Sync + 'static) -> Self {
        self.affinity = Some(Box::new(hook));
        self
    }

    fn apply_hooks(&self, desired: &mut K) {
        let hooks = [
            &self.command_override,
            &self.env_override,
            &self.logging_override,
            &self.affinity,
        ];
        for hook in hooks.into_iter().flatten() {
            hook(desired);
        }
    }

    async fn run(&self, ctx: &ReconcileContext<S>) -> Result<ReconcileOutcome> {
        let Some(conditions) = &self.conditions else {
            return Err(ReconcileError::Configuration(format!(
                "{} workload reconciler has no status conditions",
                K::kind(&())
            )));
        };
        let Some(mut desired) = build(ctx, self.builder.as_ref()).await? else {
            return Ok(ReconcileOutcome::Skipped);
        };
        self.apply_hooks(&mut desired);
        let name = desired.meta().name.clone().unwrap_or_default();

        let outcome = apply(ctx, desired, REQUEUE_AFTER_WORKLOAD_UPDATE).await?;
        if matches!(outcome, ReconcileOutcome::Updated { .. }) {
            // Rolling out; pods are checked on the next pass
            conditions.set_available(false, self.observed_generation);
            return Ok(outcome);
        }

        if self.check_readiness(ctx, &name, conditions).await? {
            Ok(outcome)
        } else {
            Ok(ReconcileOutcome::RequeueAfter(REQUEUE_WORKLOAD_NOT_READY))
        }
    }

    /// Compare the pods selected by the workload with its replica count.
    async fn check_readiness(
        &self,
        ctx: &ReconcileContext<S>,
        name: &str,
        conditions: &ConditionsHandle,
    ) -> Result<bool> {
        ctx.ensure_not_cancelled()?;
        let pods = ctx
            .store
            .list::<Pod>(&ctx.namespace, &self.pod_selector)
            .await?;
        let observed = pods.len();
        metrics::record_workload_pods(&format!("{}/{name}", ctx.namespace), observed);

        let satisfied = i32::try_from(observed).is_ok_and(|n| n == self.replicas);
        conditions.set_available(satisfied, self.observed_generation);

        if satisfied {
            debug!(namespace = %ctx.namespace, name, observed, "Workload satisfied");
        } else {
            warn!(
                namespace = %ctx.namespace,
                name,
                observed,
                expected = self.replicas,
                "Workload not satisfied, requeueing"
            );
        }
        Ok(satisfied)
    }
}

// ============================================================================
// Multi object
// ============================================================================

/// Requeue a set whose produced member count differs from the expected count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberCountValidator {
    pub expected: usize,
    pub requeue_after: Duration,
}

impl MemberCountValidator {
    #[must_use]
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            requeue_after: REQUEUE_MEMBER_COUNT_MISMATCH,
        }
    }
}

/// Apply every member of a set; the first member error is returned after all ran.
pub struct MultiObject<K, S: ObjectStore> {
    members: Vec<Box<dyn ObjectBuilder<K, S>>>,
    validator: Option<MemberCountValidator>,
}

impl<K: StoreResource, S: ObjectStore> MultiObject<K, S> {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            validator: None,
        }
    }

    #[must_use]
    pub fn with_member(mut self, builder: impl ObjectBuilder<K, S> + 'static) -> Self {
        self.members.push(Box::new(builder));
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: MemberCountValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    async fn run(&self, ctx: &ReconcileContext<S>) -> Result<ReconcileOutcome> {
        let mut first_error = None;
        let mut produced = 0usize;
        let mut created = false;
        let mut requeue: Option<Duration> = None;

        for (index, member) in self.members.iter().enumerate() {
            // Cancellation aborts the set; any other error only skips this member
            ctx.ensure_not_cancelled()?;
            let result = match build(ctx, member.as_ref()).await {
                Ok(Some(desired)) => apply(ctx, desired, REQUEUE_AFTER_UPDATE).await,
                Ok(None) => Ok(ReconcileOutcome::Skipped),
                Err(e) => Err(e),
            };
            match result {
                Ok(ReconcileOutcome::Skipped) => {}
                Ok(outcome) => {
                    produced += 1;
                    created |= outcome == ReconcileOutcome::Created;
                    if let Some(delay) = outcome.requeue_after() {
                        requeue = Some(requeue.map_or(delay, |r| r.min(delay)));
                    }
                }
                Err(ReconcileError::Cancelled) => return Err(ReconcileError::Cancelled),
                Err(e) => {
                    warn!(
                        kind = %K::kind(&()),
                        member = index,
                        error = %e,
                        "Set member failed, continuing with siblings"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if let Some(validator) = &self.validator {
            if produced != validator.expected {
                warn!(
                    kind = %K::kind(&()),
                    produced,
                    expected = validator.expected,
                    "Set member count mismatch, requeueing"
                );
                return Ok(ReconcileOutcome::RequeueAfter(validator.requeue_after));
            }
        }

        Ok(match requeue {
            Some(delay) => ReconcileOutcome::RequeueAfter(delay),
            None if created => ReconcileOutcome::Created,
            None if produced == 0 => ReconcileOutcome::Skipped,
            None => ReconcileOutcome::Unchanged,
        })
    }
}

impl<K: StoreResource, S: ObjectStore> Default for MultiObject<K, S> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Strategy dispatch
// ============================================================================

/// The closed set of reconciliation strategies for objects of kind `K`.
pub enum ResourceReconciler<K, S: ObjectStore> {
    Single(SingleObject<K, S>),
    ConfigOverride(ConfigOverrideObject<K, S>),
    Workload(WorkloadObject<K, S>),
    Multi(MultiObject<K, S>),
}

#[async_trait]
impl<K: StoreResource, S: ObjectStore> Reconcile<S> for ResourceReconciler<K, S> {
    async fn reconcile(&self, ctx: &ReconcileContext<S>) -> Result<ReconcileOutcome> {
        let outcome = match self {
            Self::Single(r) => r.run(ctx).await,
            Self::ConfigOverride(r) => r.run(ctx).await,
            Self::Workload(r) => r.run(ctx).await,
            Self::Multi(r) => r.run(ctx).await,
        };
        if let Ok(outcome) = &outcome {
            debug!(kind = %K::kind(&()), action = outcome.action(), "Resource reconciled");
        }
        outcome
    }
}

impl<K: StoreResource, S: ObjectStore> From<SingleObject<K, S>> for ResourceReconciler<K, S> {
    fn from(r: SingleObject<K, S>) -> Self {
        Self::Single(r)
    }
}

impl<K: StoreResource, S: ObjectStore> From<ConfigOverrideObject<K, S>>
    for ResourceReconciler<K, S>
{
    fn from(r: ConfigOverrideObject<K, S>) -> Self {
        Self::ConfigOverride(r)
    }
}

impl<K: StoreResource, S: ObjectStore> From<WorkloadObject<K, S>> for ResourceReconciler<K, S> {
    fn from(r: WorkloadObject<K, S>) -> Self {
        Self::Workload(r)
    }
}

impl<K: StoreResource, S: ObjectStore> From<MultiObject<K, S>> for ResourceReconciler<K, S> {
    fn from(r: MultiObject<K, S>) -> Self {
        Self::Multi(r)
    }
}

macro_rules! impl_boxed {
    ($($strategy:ident),+ $(,)?) => {
        $(
            impl<K: StoreResource, S: ObjectStore> $strategy<K, S> {
                /// Box this strategy as a kind-erased [`Reconcile`].
                #[must_use]
                pub fn boxed(self) -> Box<dyn Reconcile<S>> {
                    Box::new(ResourceReconciler::from(self))
                }
            }
        )+
    };
}

impl_boxed!(SingleObject, ConfigOverrideObject, WorkloadObject, MultiObject);

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
