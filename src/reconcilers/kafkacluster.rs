// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `KafkaCluster` reconciliation logic.
//!
//! One pass over a `KafkaCluster`:
//!
//! 1. Skips everything while `clusterOperation.reconciliationPaused` is set
//! 2. Resolves the effective configuration of every broker role group
//! 3. Reconciles the managed objects strictly in dependency order:
//!    - `ServiceAccount`, `Role`, `RoleBinding`
//!    - the role `PodDisruptionBudget`
//!    - per role group, by name: `ConfigMap`, headless `Service`, bootstrap `Listener`,
//!      `StatefulSet`, per-pod `Service`s
//!    - the discovery `ConfigMap`
//! 4. Persists the `Available` condition
//!
//! The pass stops at the first step that requests a requeue or fails.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cascade::{
    default_broker_config, CacheKey, CascadeResolver, EffectiveConfig, MergedConfigCache,
};
use crate::constants::{KIND_KAFKA_CLUSTER, ROLE_BROKER};
use crate::crd::{KafkaCluster, Listener};
use crate::errors::{ReconcileError, Result};
use crate::kafka_resources::{
    apply_affinity, apply_cli_overrides, apply_config_overrides, apply_env_overrides,
    apply_logging, build_bootstrap_listener, build_configmap, build_discovery_configmap,
    build_headless_service, build_owner_reference, build_pdb, build_pod_service, build_role,
    build_role_binding, build_service_account, build_statefulset, pod_names, role_group_name,
    RoleGroupInputs,
};
use crate::labels::{K8S_INSTANCE, LISTENER_BOOTSTRAP_LABEL, LISTENER_BOOTSTRAP_VALUE};
use crate::listener::{compute_topology_in_domain, ListenerTopology, SecuritySettings};
use crate::metrics;
use crate::reconcilers::engine::{
    ConfigOverrideObject, FnBuilder, MemberCountValidator, MultiObject, ObjectBuilder,
    Reconcile, ReconcileContext, SingleObject, WorkloadObject,
};
use crate::reconcilers::status::{persist_conditions, ConditionsHandle};
use crate::store::ObjectStore;

/// Everything needed to build the objects of one role group.
#[derive(Clone, Debug)]
pub struct RoleGroupPlan {
    pub cluster: Arc<KafkaCluster>,
    pub group: String,
    pub config: EffectiveConfig,
    pub security: SecuritySettings,
    pub topology: ListenerTopology,
}

impl RoleGroupPlan {
    #[must_use]
    pub fn inputs(&self) -> RoleGroupInputs<'_> {
        RoleGroupInputs {
            cluster: &self.cluster,
            group: &self.group,
            config: &self.config,
            security: &self.security,
            topology: &self.topology,
        }
    }
}

/// Resolve the effective configuration and listener topology of every role group.
///
/// Role groups are returned in name order. Configurations are memoized in `cache`.
///
/// # Errors
///
/// Returns [`ReconcileError::Configuration`] when the cluster has no namespace, an
/// encrypted listener has no secret class, or a role group's configuration cannot be
/// merged.
pub fn plan_role_groups(
    cluster: &Arc<KafkaCluster>,
    security: &SecuritySettings,
    cache: &mut MergedConfigCache,
) -> Result<Vec<RoleGroupPlan>> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().ok_or_else(|| {
        ReconcileError::Configuration(format!("KafkaCluster {name} has no namespace"))
    })?;
    security.validate()?;
    let Some(brokers) = cluster.spec.brokers.as_ref() else {
        debug!(cluster = %name, "No broker role defined");
        return Ok(Vec::new());
    };

    let defaults = default_broker_config(&name);
    let resolver = CascadeResolver::new().with_kerberos(security.kerberos_enabled);
    let domain = cluster.spec.cluster_config.cluster_domain.as_str();

    let mut plans = Vec::with_capacity(brokers.role_groups.len());
    for (group, spec) in &brokers.role_groups {
        let key = CacheKey::new(&namespace, &name, ROLE_BROKER, group);
        let config = cache
            .get_or_try_insert_with(key, || {
                resolver.merge(Some(&defaults), Some(brokers), Some(spec), None)
            })?
            .clone();
        let topology = compute_topology_in_domain(
            security,
            &namespace,
            &role_group_name(&name, group),
            domain,
        );
        plans.push(RoleGroupPlan {
            cluster: Arc::clone(cluster),
            group: group.clone(),
            config,
            security: security.clone(),
            topology,
        });
    }
    Ok(plans)
}

/// One named step of a pass.
pub struct Step<S: ObjectStore> {
    pub name: String,
    pub reconciler: Box<dyn Reconcile<S>>,
}

impl<S: ObjectStore> Step<S> {
    fn new(name: impl Into<String>, reconciler: Box<dyn Reconcile<S>>) -> Self {
        Self {
            name: name.into(),
            reconciler,
        }
    }
}

/// Builds the `NodePort` service of one broker pod; the pod must exist.
struct PodServiceBuilder {
    plan: Arc<RoleGroupPlan>,
    pod_name: String,
}

#[async_trait]
impl<S: ObjectStore> ObjectBuilder<Service, S> for PodServiceBuilder {
    async fn build(&self, ctx: &ReconcileContext<S>) -> Result<Option<Service>> {
        let pod = ctx
            .store
            .get::<Pod>(&ctx.namespace, &self.pod_name)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Pod", &ctx.namespace, &self.pod_name))?;
        Ok(Some(build_pod_service(
            &self.plan.cluster,
            &self.plan.group,
            &self.plan.security,
            &pod,
        )))
    }
}

/// Builds the discovery `ConfigMap` from the bootstrap listeners' statuses.
struct DiscoveryBuilder {
    cluster: Arc<KafkaCluster>,
    port_name: &'static str,
}

#[async_trait]
impl<S: ObjectStore> ObjectBuilder<ConfigMap, S> for DiscoveryBuilder {
    async fn build(&self, ctx: &ReconcileContext<S>) -> Result<Option<ConfigMap>> {
        let mut selector = BTreeMap::new();
        selector.insert(K8S_INSTANCE.to_string(), self.cluster.name_any());
        selector.insert(
            LISTENER_BOOTSTRAP_LABEL.to_string(),
            LISTENER_BOOTSTRAP_VALUE.to_string(),
        );
        let listeners = ctx
            .store
            .list::<Listener>(&ctx.namespace, &selector)
            .await?;
        debug!(
            cluster = %self.cluster.name_any(),
            listeners = listeners.len(),
            "Building discovery ConfigMap"
        );
        build_discovery_configmap(&self.cluster, &listeners, self.port_name).map(Some)
    }
}

/// Steps of one role group, in dependency order.
fn role_group_steps<S: ObjectStore>(
    plan: &Arc<RoleGroupPlan>,
    conditions: &ConditionsHandle,
    stopped: bool,
) -> Vec<Step<S>> {
    let name = role_group_name(&plan.cluster.name_any(), &plan.group);
    let replicas = if stopped { 0 } else { plan.config.replicas };
    let generation = plan.cluster.metadata.generation;

    let p = Arc::clone(plan);
    let overrides = Arc::clone(plan);
    let configmap = ConfigOverrideObject::new(FnBuilder::new(move || {
        Ok(Some(build_configmap(&p.inputs())))
    }))
    .with_config_override(move |cm: &mut ConfigMap| {
        apply_config_overrides(cm, &overrides.config.overrides.config_overrides);
    });

    let p = Arc::clone(plan);
    let headless = SingleObject::new(FnBuilder::new(move || {
        Ok(Some(build_headless_service(&p.inputs())))
    }));

    let p = Arc::clone(plan);
    let bootstrap = SingleObject::new(FnBuilder::new(move || {
        Ok(Some(build_bootstrap_listener(&p.inputs())))
    }));

    let p = Arc::clone(plan);
    let cli = Arc::clone(plan);
    let env = Arc::clone(plan);
    let affinity = Arc::clone(plan);
    let workload = WorkloadObject::new(
        FnBuilder::new(move || Ok(Some(build_statefulset(&p.inputs(), replicas)))),
        replicas,
        plan.inputs().selector_labels(),
    )
    .with_conditions(conditions.clone(), generation)
    .with_command_override(move |sts: &mut StatefulSet| {
        apply_cli_overrides(sts, &cli.config.overrides);
    })
    .with_env_override(move |sts: &mut StatefulSet| {
        apply_env_overrides(sts, &env.config.overrides);
    })
    .with_logging_override(apply_logging)
    .with_affinity(move |sts: &mut StatefulSet| apply_affinity(sts, &affinity.config));

    let pods = pod_names(&plan.cluster.name_any(), &plan.group, replicas);
    let expected = pods.len();
    let pod_services = pods
        .into_iter()
        .fold(MultiObject::<Service, S>::new(), |set, pod_name| {
            set.with_member(PodServiceBuilder {
                plan: Arc::clone(plan),
                pod_name,
            })
        })
        .with_validator(MemberCountValidator::new(expected));

    vec![
        Step::new(format!("ConfigMap/{name}"), configmap.boxed()),
        Step::new(format!("Service/{name}"), headless.boxed()),
        Step::new(format!("Listener/{name}-bootstrap"), bootstrap.boxed()),
        Step::new(format!("StatefulSet/{name}"), workload.boxed()),
        Step::new(format!("Service/{name}-<pod>"), pod_services.boxed()),
    ]
}

/// All steps of a pass, in dependency order.
pub fn build_steps<S: ObjectStore>(
    cluster: &Arc<KafkaCluster>,
    plans: &[RoleGroupPlan],
    security: &SecuritySettings,
    conditions: &ConditionsHandle,
) -> Vec<Step<S>> {
    let name = cluster.name_any();
    let stopped = cluster
        .spec
        .cluster_operation
        .as_ref()
        .is_some_and(|o| o.stopped);

    let mut steps = Vec::new();

    let c = Arc::clone(cluster);
    steps.push(Step::new(
        "ServiceAccount",
        SingleObject::new(FnBuilder::new(move || Ok(Some(build_service_account(&c))))).boxed(),
    ));
    let c = Arc::clone(cluster);
    steps.push(Step::new(
        "Role",
        SingleObject::new(FnBuilder::new(move || Ok(Some(build_role(&c))))).boxed(),
    ));
    let c = Arc::clone(cluster);
    steps.push(Step::new(
        "RoleBinding",
        SingleObject::new(FnBuilder::new(move || Ok(Some(build_role_binding(&c))))).boxed(),
    ));
    let c = Arc::clone(cluster);
    steps.push(Step::new(
        "PodDisruptionBudget",
        SingleObject::new(FnBuilder::new(move || {
            let role_config = c
                .spec
                .brokers
                .as_ref()
                .and_then(|b| b.role_config.as_ref());
            Ok(build_pdb(&c, role_config))
        }))
        .boxed(),
    ));

    for plan in plans {
        let plan = Arc::new(plan.clone());
        steps.extend(role_group_steps(&plan, conditions, stopped));
    }

    steps.push(Step::new(
        format!("ConfigMap/{name}"),
        SingleObject::new(DiscoveryBuilder {
            cluster: Arc::clone(cluster),
            port_name: security.discovery_port_name(),
        })
        .boxed(),
    ));
    steps
}

/// Run steps in order, stopping at the first requeue or error.
async fn run_steps<S: ObjectStore>(
    ctx: &ReconcileContext<S>,
    steps: &[Step<S>],
) -> Result<Option<Duration>> {
    for step in steps {
        ctx.ensure_not_cancelled()?;
        let outcome = match step.reconciler.reconcile(ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(step = %step.name, namespace = %ctx.namespace, error = %e, "Step failed");
                return Err(e);
            }
        };
        if let Some(delay) = outcome.requeue_after() {
            info!(
                step = %step.name,
                namespace = %ctx.namespace,
                delay_secs = delay.as_secs(),
                "Step not converged, stopping pass"
            );
            return Ok(Some(delay));
        }
    }
    Ok(None)
}

/// Reconciles one `KafkaCluster`.
///
/// Returns the requeue delay requested by the pass, `None` once every managed object
/// has converged.
///
/// # Errors
///
/// Returns the first error of the pass. The `Available` condition is persisted before
/// the error is returned, unless the pass was cancelled.
pub async fn reconcile_kafkacluster<S: ObjectStore>(
    store: Arc<S>,
    cluster: Arc<KafkaCluster>,
    cancel: CancellationToken,
) -> Result<Option<Duration>> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().ok_or_else(|| {
        ReconcileError::Configuration(format!("KafkaCluster {name} has no namespace"))
    })?;

    info!(cluster = %name, namespace = %namespace, "Reconciling KafkaCluster");

    if cluster
        .spec
        .cluster_operation
        .as_ref()
        .is_some_and(|o| o.reconciliation_paused)
    {
        info!(cluster = %name, namespace = %namespace, "Reconciliation paused, skipping");
        metrics::record_reconciliation_paused(KIND_KAFKA_CLUSTER);
        return Ok(None);
    }

    let security = SecuritySettings::from_cluster_config(&cluster.spec.cluster_config);
    let mut cache = MergedConfigCache::new();
    let plans = plan_role_groups(&cluster, &security, &mut cache)?;
    debug!(cluster = %name, role_groups = plans.len(), "Resolved role groups");

    let conditions = ConditionsHandle::new(
        cluster
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default(),
    );
    let ctx = ReconcileContext::new(Arc::clone(&store), namespace)
        .with_owner(build_owner_reference(&cluster))
        .with_cancellation(cancel);
    let steps = build_steps::<S>(&cluster, &plans, &security, &conditions);

    let result = run_steps(&ctx, &steps).await;
    if matches!(result, Err(ReconcileError::Cancelled)) {
        warn!(cluster = %name, "Reconciliation cancelled");
        return result;
    }

    let persisted = persist_conditions(store.as_ref(), &cluster, &conditions).await;
    let requeue = result?;
    persisted?;
    Ok(requeue)
}

#[cfg(test)]
#[path = "kafkacluster_tests.rs"]
mod kafkacluster_tests;
