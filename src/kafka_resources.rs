// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kafka Kubernetes resource builders
//!
//! This module provides functions to build every object the operator manages for a
//! `KafkaCluster`: RBAC, the role `PodDisruptionBudget`, and per role group a `ConfigMap`,
//! a headless `Service`, a bootstrap `Listener`, a `StatefulSet` and one `NodePort`
//! `Service` per broker pod, plus the cluster discovery `ConfigMap`.
//!
//! All functions are pure. Fetching whatever a builder depends on (pods, listener
//! statuses) is done by the caller.

use crate::cascade::{kafka_container_logging, EffectiveConfig};
use crate::constants::{
    API_GROUP_VERSION, BOOTSTRAP_PORT, BOOTSTRAP_PORT_NAME, CONFIG_DIR, CONTAINER_NAME_KAFKA,
    DATA_DIR, DEFAULT_PDB_MAX_UNAVAILABLE, DEFAULT_STORAGE_CAPACITY, DISCOVERY_KEY,
    INTERNAL_PORT_NAME, KIND_KAFKA_CLUSTER, LISTENER_BOOTSTRAP_DIR, LISTENER_BROKER_DIR, LIVENESS_FAILURE_THRESHOLD,
    LIVENESS_INITIAL_DELAY_SECS, LIVENESS_PERIOD_SECS, LOG4J_PROPERTIES_FILE, METRICS_PORT,
    METRICS_PORT_NAME, READINESS_FAILURE_THRESHOLD, READINESS_INITIAL_DELAY_SECS,
    READINESS_PERIOD_SECS, ROLE_BROKER, SECURITY_PROPERTIES_FILE, SERVER_PROPERTIES_FILE,
    TLS_KEYSTORE_INTERNAL_DIR, TLS_KEYSTORE_SERVER_DIR, ZOOKEEPER_DISCOVERY_KEY,
};
use crate::crd::{
    KafkaCluster, Listener, ListenerPort, ListenerSpec, OverridesSpec, RoleConfigSpec,
};
use crate::errors::{ReconcileError, Result};
use crate::labels::{
    APP_NAME_KAFKA, K8S_COMPONENT, K8S_INSTANCE, K8S_MANAGED_BY, K8S_NAME, K8S_ROLE_GROUP,
    LISTENER_BOOTSTRAP_LABEL, LISTENER_BOOTSTRAP_VALUE, LISTENER_CLASS_ANNOTATION,
    LISTENER_NAME_ANNOTATION, MANAGED_BY_KAFKA_OPERATOR, POD_SERVICE_SCOPE_LABEL,
    POD_SERVICE_SCOPE_VALUE, SECRET_CLASS_ANNOTATION, SECRET_FORMAT_ANNOTATION,
    SECRET_LIFETIME_ANNOTATION, SECRET_PKCS12_PASSWORD_ANNOTATION, SECRET_SCOPE_ANNOTATION,
    STATEFULSET_POD_NAME,
};
use crate::listener::{tls_config_settings, ListenerTopology, SecuritySettings};
use crate::properties::{apply_overrides, render_log4j, render_properties};
use crate::quantity::parse_duration_secs;
use k8s_openapi::api::{
    apps::v1::{StatefulSet, StatefulSetSpec},
    core::v1::{
        ConfigMap, ConfigMapKeySelector, ConfigMapVolumeSource, Container, ContainerPort,
        EmptyDirVolumeSource, EnvVar, EnvVarSource, EphemeralVolumeSource, ObjectFieldSelector,
        PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimTemplate, Pod,
        PodSpec, PodTemplateSpec, Probe, ResourceRequirements, Service, ServiceAccount,
        ServicePort, ServiceSpec, TCPSocketAction, Volume, VolumeMount,
        VolumeResourceRequirements,
    },
    policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec},
    rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject},
};
use k8s_openapi::apimachinery::pkg::{
    api::resource::Quantity,
    apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference},
    util::intstr::IntOrString,
};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::debug;

// Volume names
const VOLUME_CONFIG: &str = "config";
const VOLUME_DATA: &str = "data";
const VOLUME_LOG: &str = "log";
const VOLUME_LISTENER_BROKER: &str = "listener-broker";
const VOLUME_LISTENER_BOOTSTRAP: &str = "listener-bootstrap";
const VOLUME_TLS_SERVER: &str = "tls-keystore-server";
const VOLUME_TLS_INTERNAL: &str = "tls-keystore-internal";

/// Mount point of the log volume
const LOG_DIR: &str = "/kubedoop/log";

/// Storage classes served by the listener and secret operators
const LISTENER_STORAGE_CLASS: &str = "listeners.kubedoop.dev";
const SECRET_STORAGE_CLASS: &str = "secrets.kubedoop.dev";

/// Environment variable carrying the ZooKeeper connection string
const ENV_ZOOKEEPER: &str = "ZOOKEEPER";

/// Environment variable carrying the pod name
const ENV_POD_NAME: &str = "POD_NAME";

// ============================================================================
// Names, labels and owner references
// ============================================================================

/// Name shared by the `StatefulSet`, headless `Service` and `ConfigMap` of a role group.
#[must_use]
pub fn role_group_name(cluster_name: &str, group: &str) -> String {
    format!("{cluster_name}-{ROLE_BROKER}-{group}")
}

/// Name of the bootstrap `Listener` of a role group.
#[must_use]
pub fn bootstrap_listener_name(cluster_name: &str, group: &str) -> String {
    format!("{}-bootstrap", role_group_name(cluster_name, group))
}

#[must_use]
pub fn service_account_name(cluster_name: &str) -> String {
    format!("{cluster_name}-sa")
}

/// Builds standardized Kubernetes labels for cluster-wide resources.
#[must_use]
pub fn build_cluster_labels(cluster_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(K8S_NAME.into(), APP_NAME_KAFKA.into());
    labels.insert(K8S_INSTANCE.into(), cluster_name.into());
    labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY_KAFKA_OPERATOR.into());
    labels
}

/// Builds the labels selecting the pods of one role group.
///
/// These are immutable once a `StatefulSet` exists, so they never include anything
/// that can change over the life of the cluster.
#[must_use]
pub fn build_selector_labels(cluster_name: &str, group: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(K8S_NAME.into(), APP_NAME_KAFKA.into());
    labels.insert(K8S_INSTANCE.into(), cluster_name.into());
    labels.insert(K8S_COMPONENT.into(), ROLE_BROKER.into());
    labels.insert(K8S_ROLE_GROUP.into(), group.into());
    labels
}

/// Builds standardized Kubernetes labels for role group resources.
#[must_use]
pub fn build_role_group_labels(cluster_name: &str, group: &str) -> BTreeMap<String, String> {
    let mut labels = build_selector_labels(cluster_name, group);
    labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY_KAFKA_OPERATOR.into());
    labels
}

/// Builds owner references for a resource owned by a `KafkaCluster`
///
/// Sets up cascade deletion so that when the `KafkaCluster` is deleted,
/// all its child resources are automatically deleted.
#[must_use]
pub fn build_owner_references(cluster: &KafkaCluster) -> Vec<OwnerReference> {
    vec![build_owner_reference(cluster)]
}

#[must_use]
pub fn build_owner_reference(cluster: &KafkaCluster) -> OwnerReference {
    OwnerReference {
        api_version: API_GROUP_VERSION.to_string(),
        kind: KIND_KAFKA_CLUSTER.to_string(),
        name: cluster.name_any(),
        uid: cluster.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn metadata(
    name: &str,
    cluster: &KafkaCluster,
    labels: BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: cluster.namespace(),
        labels: Some(labels),
        owner_references: Some(build_owner_references(cluster)),
        ..Default::default()
    }
}

// ============================================================================
// RBAC
// ============================================================================

/// Builds the `ServiceAccount` the broker pods run as.
#[must_use]
pub fn build_service_account(cluster: &KafkaCluster) -> ServiceAccount {
    let name = cluster.name_any();
    ServiceAccount {
        metadata: metadata(&service_account_name(&name), cluster, build_cluster_labels(&name)),
        ..Default::default()
    }
}

/// Builds the `Role` granting the broker pods read access to their own topology.
#[must_use]
pub fn build_role(cluster: &KafkaCluster) -> Role {
    let name = cluster.name_any();
    let read = vec!["get".to_string(), "list".to_string(), "watch".to_string()];
    Role {
        metadata: metadata(&format!("{name}-role"), cluster, build_cluster_labels(&name)),
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec![
                    "pods".to_string(),
                    "configmaps".to_string(),
                    "services".to_string(),
                ]),
                verbs: read.clone(),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["listeners.kubedoop.dev".to_string()]),
                resources: Some(vec!["listeners".to_string()]),
                verbs: read,
                ..Default::default()
            },
        ]),
    }
}

/// Builds the `RoleBinding` of the broker `ServiceAccount` to its `Role`.
#[must_use]
pub fn build_role_binding(cluster: &KafkaCluster) -> RoleBinding {
    let name = cluster.name_any();
    RoleBinding {
        metadata: metadata(&format!("{name}-rolebinding"), cluster, build_cluster_labels(&name)),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: format!("{name}-role"),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: service_account_name(&name),
            namespace: cluster.namespace(),
            ..Default::default()
        }]),
    }
}

/// Builds the broker role `PodDisruptionBudget`, or `None` when disabled.
#[must_use]
pub fn build_pdb(
    cluster: &KafkaCluster,
    role_config: Option<&RoleConfigSpec>,
) -> Option<PodDisruptionBudget> {
    let pdb = role_config
        .and_then(|r| r.pod_disruption_budget.clone())
        .unwrap_or_default();
    if !pdb.enabled {
        debug!(cluster = %cluster.name_any(), "PodDisruptionBudget disabled");
        return None;
    }

    let name = cluster.name_any();
    let mut selector = BTreeMap::new();
    selector.insert(K8S_NAME.to_string(), APP_NAME_KAFKA.to_string());
    selector.insert(K8S_INSTANCE.to_string(), name.clone());
    selector.insert(K8S_COMPONENT.to_string(), ROLE_BROKER.to_string());

    Some(PodDisruptionBudget {
        metadata: metadata(&format!("{name}-{ROLE_BROKER}"), cluster, build_cluster_labels(&name)),
        spec: Some(PodDisruptionBudgetSpec {
            max_unavailable: Some(IntOrString::Int(
                pdb.max_unavailable.unwrap_or(DEFAULT_PDB_MAX_UNAVAILABLE),
            )),
            selector: Some(LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

// ============================================================================
// Role group resources
// ============================================================================

/// Everything the role group builders need, computed once per role group and pass.
#[derive(Clone, Copy, Debug)]
pub struct RoleGroupInputs<'a> {
    pub cluster: &'a KafkaCluster,
    pub group: &'a str,
    pub config: &'a EffectiveConfig,
    pub security: &'a SecuritySettings,
    pub topology: &'a ListenerTopology,
}

impl RoleGroupInputs<'_> {
    fn cluster_name(&self) -> String {
        self.cluster.name_any()
    }

    fn name(&self) -> String {
        role_group_name(&self.cluster_name(), self.group)
    }

    fn labels(&self) -> BTreeMap<String, String> {
        build_role_group_labels(&self.cluster_name(), self.group)
    }

    /// Labels selecting the pods of this role group.
    #[must_use]
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        build_selector_labels(&self.cluster_name(), self.group)
    }
}

/// Builds the role group `ConfigMap` with `server.properties`, `security.properties`
/// and `log4j.properties`.
///
/// Only operator-derived settings are rendered here. User and default-computed file
/// overrides are applied afterwards with [`apply_config_overrides`].
#[must_use]
pub fn build_configmap(inputs: &RoleGroupInputs<'_>) -> ConfigMap {
    let server = tls_config_settings(inputs.security, inputs.topology);

    let mut data = BTreeMap::new();
    data.insert(SERVER_PROPERTIES_FILE.to_string(), render_properties(&server));
    data.insert(SECURITY_PROPERTIES_FILE.to_string(), String::new());
    data.insert(
        LOG4J_PROPERTIES_FILE.to_string(),
        render_log4j(kafka_container_logging(&inputs.config.config)),
    );

    ConfigMap {
        metadata: metadata(&inputs.name(), inputs.cluster, inputs.labels()),
        data: Some(data),
        ..Default::default()
    }
}

/// Apply per-file overrides onto the files of a role group `ConfigMap`.
///
/// Files that do not exist yet are created from the overrides alone.
pub fn apply_config_overrides(
    config_map: &mut ConfigMap,
    overrides: &BTreeMap<String, BTreeMap<String, String>>,
) {
    let data = config_map.data.get_or_insert_with(BTreeMap::new);
    for (file, entries) in overrides {
        let rendered = data.get(file).map(String::as_str).unwrap_or_default();
        let merged = apply_overrides(rendered, entries);
        data.insert(file.clone(), merged);
    }
}

/// Builds the headless `Service` giving every broker pod a stable DNS name.
#[must_use]
pub fn build_headless_service(inputs: &RoleGroupInputs<'_>) -> Service {
    Service {
        metadata: metadata(&inputs.name(), inputs.cluster, inputs.labels()),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".into()),
            selector: Some(inputs.selector_labels()),
            publish_not_ready_addresses: Some(true),
            ports: Some(vec![
                service_port(INTERNAL_PORT_NAME, inputs.security.internal_port()),
                service_port(METRICS_PORT_NAME, METRICS_PORT),
            ]),
            type_: Some("ClusterIP".into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.into()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".into()),
        ..Default::default()
    }
}

/// Builds the bootstrap `Listener` clients use to discover the brokers.
///
/// Labelled with the listener-bootstrap label so the discovery builder can find it.
#[must_use]
pub fn build_bootstrap_listener(inputs: &RoleGroupInputs<'_>) -> Listener {
    let cluster_name = inputs.cluster_name();
    let mut labels = inputs.labels();
    labels.insert(
        LISTENER_BOOTSTRAP_LABEL.to_string(),
        LISTENER_BOOTSTRAP_VALUE.to_string(),
    );

    let mut listener = Listener::new(
        &bootstrap_listener_name(&cluster_name, inputs.group),
        ListenerSpec {
            class_name: Some(inputs.config.bootstrap_listener_class().to_string()),
            extra_pod_selector_labels: BTreeMap::new(),
            ports: inputs
                .security
                .bootstrap_ports()
                .into_iter()
                .map(|(name, port)| ListenerPort {
                    name: name.to_string(),
                    port,
                    protocol: Some("TCP".to_string()),
                })
                .collect(),
            publish_not_ready_addresses: Some(true),
        },
    );
    listener.metadata = metadata(
        &bootstrap_listener_name(&cluster_name, inputs.group),
        inputs.cluster,
        labels,
    );
    listener
}

fn ephemeral_volume(
    name: &str,
    storage_class: &str,
    annotations: BTreeMap<String, String>,
    access_mode: &str,
) -> Volume {
    let mut requests = BTreeMap::new();
    requests.insert("storage".to_string(), Quantity("1".to_string()));

    Volume {
        name: name.into(),
        ephemeral: Some(EphemeralVolumeSource {
            volume_claim_template: Some(PersistentVolumeClaimTemplate {
                metadata: Some(ObjectMeta {
                    annotations: Some(annotations),
                    ..Default::default()
                }),
                spec: PersistentVolumeClaimSpec {
                    access_modes: Some(vec![access_mode.to_string()]),
                    storage_class_name: Some(storage_class.to_string()),
                    volume_mode: Some("Filesystem".to_string()),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(requests),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            }),
        }),
        ..Default::default()
    }
}

fn tls_volume(name: &str, secret_class: &str, inputs: &RoleGroupInputs<'_>) -> Volume {
    let mut annotations = BTreeMap::new();
    annotations.insert(SECRET_CLASS_ANNOTATION.to_string(), secret_class.to_string());
    annotations.insert(
        SECRET_SCOPE_ANNOTATION.to_string(),
        format!("pod,service={},listener-volume={VOLUME_LISTENER_BROKER}", inputs.name()),
    );
    annotations.insert(SECRET_FORMAT_ANNOTATION.to_string(), "tls-p12".to_string());
    annotations.insert(
        SECRET_PKCS12_PASSWORD_ANNOTATION.to_string(),
        inputs.security.ssl_store_password.clone(),
    );
    annotations.insert(
        SECRET_LIFETIME_ANNOTATION.to_string(),
        inputs.config.requested_secret_lifetime().to_string(),
    );
    ephemeral_volume(name, SECRET_STORAGE_CLASS, annotations, "ReadWriteOnce")
}

fn build_volumes(inputs: &RoleGroupInputs<'_>) -> (Vec<Volume>, Vec<VolumeMount>) {
    let cluster_name = inputs.cluster_name();
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    volumes.push(Volume {
        name: VOLUME_CONFIG.into(),
        config_map: Some(ConfigMapVolumeSource {
            name: inputs.name(),
            ..Default::default()
        }),
        ..Default::default()
    });
    mounts.push(mount(VOLUME_CONFIG, CONFIG_DIR));

    volumes.push(Volume {
        name: VOLUME_LOG.into(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    });
    mounts.push(mount(VOLUME_LOG, LOG_DIR));

    let mut broker_annotations = BTreeMap::new();
    broker_annotations.insert(
        LISTENER_CLASS_ANNOTATION.to_string(),
        inputs.config.broker_listener_class().to_string(),
    );
    volumes.push(ephemeral_volume(
        VOLUME_LISTENER_BROKER,
        LISTENER_STORAGE_CLASS,
        broker_annotations,
        "ReadWriteMany",
    ));
    mounts.push(mount(VOLUME_LISTENER_BROKER, LISTENER_BROKER_DIR));

    let mut bootstrap_annotations = BTreeMap::new();
    bootstrap_annotations.insert(
        LISTENER_NAME_ANNOTATION.to_string(),
        bootstrap_listener_name(&cluster_name, inputs.group),
    );
    volumes.push(ephemeral_volume(
        VOLUME_LISTENER_BOOTSTRAP,
        LISTENER_STORAGE_CLASS,
        bootstrap_annotations,
        "ReadWriteMany",
    ));
    mounts.push(mount(VOLUME_LISTENER_BOOTSTRAP, LISTENER_BOOTSTRAP_DIR));

    if let Some(class) = inputs.security.client_keystore_class() {
        volumes.push(tls_volume(VOLUME_TLS_SERVER, class, inputs));
        mounts.push(mount(VOLUME_TLS_SERVER, TLS_KEYSTORE_SERVER_DIR));
    }
    if let Some(class) = inputs.security.internal_secret_class.as_deref() {
        volumes.push(tls_volume(VOLUME_TLS_INTERNAL, class, inputs));
        mounts.push(mount(VOLUME_TLS_INTERNAL, TLS_KEYSTORE_INTERNAL_DIR));
    }

    mounts.push(mount(VOLUME_DATA, DATA_DIR));
    (volumes, mounts)
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.into(),
        mount_path: path.into(),
        ..Default::default()
    }
}

/// The broker start script.
///
/// The listener strings contain `$(cat ...)` placeholders, so they are passed as
/// `--override` arguments inside double quotes and expanded by the shell at start.
#[must_use]
pub fn build_start_script(topology: &ListenerTopology) -> String {
    [
        format!("bin/kafka-server-start.sh {CONFIG_DIR}/{SERVER_PROPERTIES_FILE}"),
        format!("--override \"zookeeper.connect=${ENV_ZOOKEEPER}\""),
        format!("--override \"listeners={}\"", topology.listeners_string()),
        format!(
            "--override \"advertised.listeners={}\"",
            topology.advertised_listeners_string()
        ),
        format!(
            "--override \"listener.security.protocol.map={}\"",
            topology.security_protocol_map_string()
        ),
        format!("--override \"broker.id=${{{ENV_POD_NAME}##*-}}\""),
    ]
    .join(" \\\n  ")
}

fn build_env(inputs: &RoleGroupInputs<'_>) -> Vec<EnvVar> {
    vec![
        EnvVar {
            name: ENV_POD_NAME.into(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.name".into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        EnvVar {
            name: ENV_ZOOKEEPER.into(),
            value_from: Some(EnvVarSource {
                config_map_key_ref: Some(ConfigMapKeySelector {
                    name: inputs
                        .cluster
                        .spec
                        .cluster_config
                        .zookeeper_config_map_name
                        .clone(),
                    key: ZOOKEEPER_DISCOVERY_KEY.into(),
                    optional: Some(false),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        EnvVar {
            name: "EXTRA_ARGS".into(),
            value: Some(format!(
                "-Djava.security.properties={CONFIG_DIR}/{SECURITY_PROPERTIES_FILE}"
            )),
            ..Default::default()
        },
    ]
}

fn build_ports(inputs: &RoleGroupInputs<'_>) -> Vec<ContainerPort> {
    let mut ports = vec![
        container_port(inputs.security.client_port_name(), inputs.security.client_port()),
        container_port(INTERNAL_PORT_NAME, inputs.security.internal_port()),
        container_port(METRICS_PORT_NAME, METRICS_PORT),
    ];
    if inputs.security.kerberos_enabled {
        ports.push(container_port(BOOTSTRAP_PORT_NAME, BOOTSTRAP_PORT));
    }
    ports
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.into()),
        container_port: port,
        protocol: Some("TCP".into()),
        ..Default::default()
    }
}

fn build_resources(config: &EffectiveConfig) -> Option<ResourceRequirements> {
    let resources = config.config.resources.as_ref()?;
    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();

    if let Some(cpu) = &resources.cpu {
        if let Some(min) = &cpu.min {
            requests.insert("cpu".to_string(), Quantity(min.clone()));
        }
        if let Some(max) = &cpu.max {
            limits.insert("cpu".to_string(), Quantity(max.clone()));
        }
    }
    if let Some(limit) = resources.memory.as_ref().and_then(|m| m.limit.clone()) {
        requests.insert("memory".to_string(), Quantity(limit.clone()));
        limits.insert("memory".to_string(), Quantity(limit));
    }

    Some(ResourceRequirements {
        requests: (!requests.is_empty()).then_some(requests),
        limits: (!limits.is_empty()).then_some(limits),
        ..Default::default()
    })
}

fn tcp_probe(port_name: &str, initial_delay: i32, period: i32, failure_threshold: i32) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::String(port_name.into()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        failure_threshold: Some(failure_threshold),
        ..Default::default()
    }
}

fn build_data_claim(config: &EffectiveConfig) -> PersistentVolumeClaim {
    let capacity = config
        .config
        .resources
        .as_ref()
        .and_then(|r| r.storage.as_ref())
        .and_then(|s| s.capacity.clone())
        .unwrap_or_else(|| DEFAULT_STORAGE_CAPACITY.to_string());
    let mut requests = BTreeMap::new();
    requests.insert("storage".to_string(), Quantity(capacity));

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(VOLUME_DATA.into()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the role group `StatefulSet`.
///
/// Scheduling constraints and user overrides are not applied here; the workload hooks
/// ([`apply_affinity`], [`apply_cli_overrides`], [`apply_env_overrides`],
/// [`apply_logging`]) do that during reconciliation.
#[must_use]
pub fn build_statefulset(inputs: &RoleGroupInputs<'_>, replicas: i32) -> StatefulSet {
    let cluster_name = inputs.cluster_name();
    let (volumes, mounts) = build_volumes(inputs);
    let client_port_name = inputs.security.client_port_name();

    let container = Container {
        name: CONTAINER_NAME_KAFKA.into(),
        image: Some(inputs.cluster.spec.image.image_ref()),
        image_pull_policy: Some(inputs.cluster.spec.image.pull_policy.clone()),
        command: Some(vec![
            "/bin/bash".into(),
            "-x".into(),
            "-euo".into(),
            "pipefail".into(),
            "-c".into(),
        ]),
        args: Some(vec![build_start_script(inputs.topology)]),
        env: Some(build_env(inputs)),
        ports: Some(build_ports(inputs)),
        resources: build_resources(inputs.config),
        volume_mounts: Some(mounts),
        liveness_probe: Some(tcp_probe(
            client_port_name,
            LIVENESS_INITIAL_DELAY_SECS,
            LIVENESS_PERIOD_SECS,
            LIVENESS_FAILURE_THRESHOLD,
        )),
        readiness_probe: Some(tcp_probe(
            client_port_name,
            READINESS_INITIAL_DELAY_SECS,
            READINESS_PERIOD_SECS,
            READINESS_FAILURE_THRESHOLD,
        )),
        ..Default::default()
    };

    let termination_grace = inputs
        .config
        .config
        .graceful_shutdown_timeout
        .as_deref()
        .and_then(parse_duration_secs);

    StatefulSet {
        metadata: metadata(&inputs.name(), inputs.cluster, inputs.labels()),
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            service_name: Some(inputs.name()),
            pod_management_policy: Some("Parallel".into()),
            selector: LabelSelector {
                match_labels: Some(inputs.selector_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(inputs.labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    service_account_name: Some(service_account_name(&cluster_name)),
                    termination_grace_period_seconds: termination_grace,
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![build_data_claim(inputs.config)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn kafka_container(sts: &mut StatefulSet) -> Option<&mut Container> {
    sts.spec
        .as_mut()?
        .template
        .spec
        .as_mut()?
        .containers
        .iter_mut()
        .find(|c| c.name == CONTAINER_NAME_KAFKA)
}

/// Apply scheduling constraints from the effective configuration to the pod template.
pub fn apply_affinity(sts: &mut StatefulSet, config: &EffectiveConfig) {
    let Some(pod) = sts.spec.as_mut().and_then(|s| s.template.spec.as_mut()) else {
        return;
    };
    pod.affinity.clone_from(&config.config.affinity);
    pod.node_selector.clone_from(&config.config.node_selector);
    pod.tolerations.clone_from(&config.config.tolerations);
}

/// Append CLI overrides to the broker start script.
pub fn apply_cli_overrides(sts: &mut StatefulSet, overrides: &OverridesSpec) {
    if overrides.cli_overrides.is_empty() {
        return;
    }
    if let Some(script) = kafka_container(sts)
        .and_then(|c| c.args.as_mut())
        .and_then(|args| args.first_mut())
    {
        for arg in &overrides.cli_overrides {
            script.push_str(" \\\n  ");
            script.push_str(arg);
        }
    }
}

/// Set environment overrides on the broker container, replacing same-named variables.
pub fn apply_env_overrides(sts: &mut StatefulSet, overrides: &OverridesSpec) {
    let Some(container) = kafka_container(sts) else {
        return;
    };
    let env = container.env.get_or_insert_with(Vec::new);
    for (name, value) in &overrides.env_overrides {
        env.retain(|e| &e.name != name);
        env.push(EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        });
    }
}

/// Point the broker at the rendered log4j configuration.
pub fn apply_logging(sts: &mut StatefulSet) {
    let Some(container) = kafka_container(sts) else {
        return;
    };
    let env = container.env.get_or_insert_with(Vec::new);
    if env.iter().any(|e| e.name == "KAFKA_LOG4J_OPTS") {
        return;
    }
    env.push(EnvVar {
        name: "KAFKA_LOG4J_OPTS".into(),
        value: Some(format!(
            "-Dlog4j.configuration=file:{CONFIG_DIR}/{LOG4J_PROPERTIES_FILE}"
        )),
        ..Default::default()
    });
}

// ============================================================================
// Per-pod services and discovery
// ============================================================================

/// Names of the pods of a role group `StatefulSet`, in ordinal order.
#[must_use]
pub fn pod_names(cluster_name: &str, group: &str, replicas: i32) -> Vec<String> {
    let sts = role_group_name(cluster_name, group);
    (0..replicas.max(0)).map(|i| format!("{sts}-{i}")).collect()
}

/// Builds the `NodePort` `Service` exposing one broker pod.
///
/// The service is owned by the pod, so it disappears with it.
#[must_use]
pub fn build_pod_service(
    cluster: &KafkaCluster,
    group: &str,
    security: &SecuritySettings,
    pod: &Pod,
) -> Service {
    let pod_name = pod.name_any();
    let mut labels = build_role_group_labels(&cluster.name_any(), group);
    labels.insert(
        POD_SERVICE_SCOPE_LABEL.to_string(),
        POD_SERVICE_SCOPE_VALUE.to_string(),
    );

    let mut selector = BTreeMap::new();
    selector.insert(STATEFULSET_POD_NAME.to_string(), pod_name.clone());

    let owner = OwnerReference {
        api_version: Pod::api_version(&()).to_string(),
        kind: Pod::kind(&()).to_string(),
        name: pod_name.clone(),
        uid: pod.metadata.uid.clone().unwrap_or_default(),
        controller: Some(false),
        block_owner_deletion: Some(false),
    };

    Service {
        metadata: ObjectMeta {
            name: Some(pod_name),
            namespace: cluster.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("NodePort".into()),
            selector: Some(selector),
            publish_not_ready_addresses: Some(true),
            ports: Some(vec![service_port(
                security.client_port_name(),
                security.client_port(),
            )]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the discovery `ConfigMap` named after the cluster.
///
/// `KAFKA` holds the comma-joined `host:port` of every ingress address of every
/// bootstrap listener, using the port published under `port_name`. Listeners without
/// a status yet contribute nothing.
///
/// # Errors
///
/// Returns [`ReconcileError::Topology`] when an ingress address has no port named
/// `port_name`.
pub fn build_discovery_configmap(
    cluster: &KafkaCluster,
    listeners: &[Listener],
    port_name: &str,
) -> Result<ConfigMap> {
    let mut sorted: Vec<&Listener> = listeners.iter().collect();
    sorted.sort_by_key(|l| l.name_any());

    let mut servers = Vec::new();
    for listener in sorted {
        let Some(status) = listener.status.as_ref() else {
            continue;
        };
        for ingress in &status.ingress_addresses {
            let port = ingress.ports.get(port_name).ok_or_else(|| {
                ReconcileError::Topology(format!(
                    "listener {} has no port named '{port_name}'",
                    listener.name_any()
                ))
            })?;
            servers.push(format!("{}:{port}", ingress.address));
        }
    }

    let name = cluster.name_any();
    let mut data = BTreeMap::new();
    data.insert(DISCOVERY_KEY.to_string(), servers.join(","));

    Ok(ConfigMap {
        metadata: metadata(&name, cluster, build_cluster_labels(&name)),
        data: Some(data),
        ..Default::default()
    })
}

#[cfg(test)]
#[path = "kafka_resources_tests.rs"]
mod kafka_resources_tests;
