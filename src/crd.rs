// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for Kafka cluster management.
//!
//! This module defines the `KafkaCluster` resource reconciled by this operator and a
//! typed view of the listener operator's `Listener` resource, which the operator
//! creates for bootstrap discovery and reads back for its ingress addresses.
//!
//! # Resource Types
//!
//! - [`KafkaCluster`] - One Kafka cluster: image, security settings and broker role groups
//! - [`Listener`] - External `listeners.kubedoop.dev` object (not generated by `crdgen`)
//!
//! # Example: Creating a Kafka Cluster
//!
//! ```yaml
//! apiVersion: kafka.kubedoop.dev/v1alpha1
//! kind: KafkaCluster
//! metadata:
//!   name: simple-kafka
//!   namespace: default
//! spec:
//!   clusterConfig:
//!     zookeeperConfigMapName: simple-zk-znode
//!     tls:
//!       serverSecretClass: tls
//!   brokers:
//!     config:
//!       resources:
//!         memory:
//!           limit: 2Gi
//!     roleGroups:
//!       default:
//!         replicas: 3
//! ```

use k8s_openapi::api::core::v1::{Affinity, Toleration};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::DEFAULT_CLUSTER_DOMAIN;

/// Default image repository for Kafka brokers
const DEFAULT_IMAGE_REPOSITORY: &str = "quay.io/zncdatadev/kafka";

/// Default Kafka product version
const DEFAULT_PRODUCT_VERSION: &str = "3.7.1";

/// Default kubedoop platform version used in the image tag
const DEFAULT_KUBEDOOP_VERSION: &str = "0.0.0-dev";

/// Default secret class for TLS certificates
const DEFAULT_TLS_SECRET_CLASS: &str = "tls";

/// Default password of the generated PKCS#12 stores
const DEFAULT_SSL_STORE_PASSWORD: &str = "changeit";

/// Condition represents an observation of a resource's current state.
///
/// Conditions are used in status subresources to communicate the state of
/// a resource to users and controllers.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. This operator maintains a single `Available` condition.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Generation of the owning resource the condition was computed from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// `KafkaCluster` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
pub struct KafkaClusterStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `KafkaCluster` describes a ZooKeeper-backed Apache Kafka cluster.
///
/// The operator derives a `StatefulSet`, a `ConfigMap`, services and listeners for every
/// broker role group and publishes a discovery `ConfigMap` named after the cluster.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kafka.kubedoop.dev",
    version = "v1alpha1",
    kind = "KafkaCluster",
    namespaced,
    shortname = "kafka",
    doc = "KafkaCluster describes an Apache Kafka cluster whose brokers are split into independently configurable role groups."
)]
#[kube(status = "KafkaClusterStatus")]
#[serde(rename_all = "camelCase")]
pub struct KafkaClusterSpec {
    /// Container image of the brokers.
    #[serde(default)]
    pub image: ImageSpec,

    /// Settings shared by every role group of the cluster.
    pub cluster_config: ClusterConfigSpec,

    /// Cluster-wide operations such as pausing reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_operation: Option<ClusterOperationSpec>,

    /// The broker role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brokers: Option<BrokersSpec>,
}

/// Broker container image
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    #[serde(default = "default_image_repository")]
    pub repository: String,

    /// Explicit image tag. Derived from `productVersion` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default = "default_product_version")]
    pub product_version: String,

    #[serde(default = "default_kubedoop_version")]
    pub kubedoop_version: String,

    #[serde(default = "default_pull_policy")]
    pub pull_policy: String,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            repository: default_image_repository(),
            tag: None,
            product_version: default_product_version(),
            kubedoop_version: default_kubedoop_version(),
            pull_policy: default_pull_policy(),
        }
    }
}

impl ImageSpec {
    /// Full image reference, `repository:tag`.
    #[must_use]
    pub fn image_ref(&self) -> String {
        let tag = self.tag.clone().unwrap_or_else(|| {
            format!(
                "{}-kubedoop{}",
                self.product_version, self.kubedoop_version
            )
        });
        format!("{}:{tag}", self.repository)
    }
}

fn default_image_repository() -> String {
    DEFAULT_IMAGE_REPOSITORY.to_string()
}

fn default_product_version() -> String {
    DEFAULT_PRODUCT_VERSION.to_string()
}

fn default_kubedoop_version() -> String {
    DEFAULT_KUBEDOOP_VERSION.to_string()
}

fn default_pull_policy() -> String {
    "IfNotPresent".to_string()
}

/// Cluster-wide configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfigSpec {
    /// Client authentication settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationSpec>,

    /// TLS settings. When omitted, every listener is plaintext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<KafkaTlsSpec>,

    /// DNS domain of the Kubernetes cluster.
    #[serde(default = "default_cluster_domain")]
    pub cluster_domain: String,

    /// Name of the discovery `ConfigMap` of the ZooKeeper znode used by this cluster.
    pub zookeeper_config_map_name: String,

    /// Name of the vector aggregator discovery `ConfigMap`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_aggregator_config_map_name: Option<String>,
}

fn default_cluster_domain() -> String {
    DEFAULT_CLUSTER_DOMAIN.to_string()
}

/// Client authentication
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationSpec {
    /// Secret class used for mutual TLS client authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_class: Option<String>,

    /// Kerberos authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kerberos: Option<KerberosSpec>,
}

/// Kerberos authentication settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KerberosSpec {
    /// Secret class providing keytabs and `krb5.conf`.
    pub kerberos_secret_class: String,
}

/// TLS settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaTlsSpec {
    /// Secret class for client-facing TLS. An empty string disables it.
    #[serde(default = "default_tls_secret_class")]
    pub server_secret_class: String,

    /// Secret class for inter-broker TLS. An empty string disables it.
    #[serde(default = "default_tls_secret_class")]
    pub internal_secret_class: String,

    /// Password of the PKCS#12 key and trust stores.
    #[serde(default = "default_ssl_store_password")]
    pub ssl_store_password: String,
}

impl Default for KafkaTlsSpec {
    fn default() -> Self {
        Self {
            server_secret_class: default_tls_secret_class(),
            internal_secret_class: default_tls_secret_class(),
            ssl_store_password: default_ssl_store_password(),
        }
    }
}

fn default_tls_secret_class() -> String {
    DEFAULT_TLS_SECRET_CLASS.to_string()
}

fn default_ssl_store_password() -> String {
    DEFAULT_SSL_STORE_PASSWORD.to_string()
}

/// Cluster operations
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOperationSpec {
    /// Skip reconciliation entirely while set.
    #[serde(default)]
    pub reconciliation_paused: bool,

    /// Scale every role group to zero replicas while set.
    #[serde(default)]
    pub stopped: bool,
}

/// The broker role
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrokersSpec {
    /// Role-level configuration, inherited by every role group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BrokersConfigSpec>,

    /// Role-wide settings that are not inherited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_config: Option<RoleConfigSpec>,

    /// Role-level overrides.
    #[serde(flatten)]
    pub overrides: OverridesSpec,

    /// Role groups keyed by name.
    #[serde(default)]
    pub role_groups: BTreeMap<String, BrokersRoleGroupSpec>,
}

/// One broker role group
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrokersRoleGroupSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BrokersConfigSpec>,

    #[serde(flatten)]
    pub overrides: OverridesSpec,
}

/// Role-wide settings
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_disruption_budget: Option<PodDisruptionBudgetSpec>,
}

/// `PodDisruptionBudget` settings for the broker role
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodDisruptionBudgetSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<i32>,
}

impl Default for PodDisruptionBudgetSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            max_unavailable: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Configuration inherited along cluster default → role → role group.
///
/// Every field is optional. An unset field falls through to the next broader layer;
/// a set field wins as a whole block.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrokersConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    /// Graceful shutdown timeout, e.g. `30s`, `5m`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graceful_shutdown_timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSpec>,

    /// Listener class of the per-broker listener volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_listener_class: Option<String>,

    /// Listener class used for bootstrapping new clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_listener_class: Option<String>,

    /// Lifetime requested for TLS certificates, e.g. `1d`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_secret_lifetime: Option<String>,
}

/// Compute and storage resources
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuResource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryResource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageResource>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CpuResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemoryResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
}

/// Logging settings
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_vector_agent: Option<bool>,

    /// Per-container logging keyed by container name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub containers: BTreeMap<String, LoggingConfigSpec>,
}

/// Logging of one container
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfigSpec {
    /// Log levels keyed by logger name. `ROOT` sets the root logger.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub loggers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_level: Option<String>,
}

/// Three independent override channels.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverridesSpec {
    /// Extra command line arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cli_overrides: Vec<String>,

    /// Environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_overrides: BTreeMap<String, String>,

    /// Property overrides keyed by file name, then by property key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config_overrides: BTreeMap<String, BTreeMap<String, String>>,
}

// ============================================================================
// Listener operator types
// ============================================================================

/// Typed view of a listener operator `Listener`.
///
/// The operator creates one bootstrap listener per role group and reads the
/// `status.ingressAddresses` back when assembling the discovery `ConfigMap`.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "listeners.kubedoop.dev",
    version = "v1alpha1",
    kind = "Listener",
    namespaced
)]
#[kube(status = "ListenerStatus")]
#[serde(rename_all = "camelCase")]
pub struct ListenerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_pod_selector_labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ListenerPort>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_not_ready_addresses: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerPort {
    pub name: String,
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress_addresses: Vec<ListenerIngress>,
}

/// One address a listener is reachable on, with its ports keyed by name.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerIngress {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_type: Option<String>,
    #[serde(default)]
    pub ports: BTreeMap<String, i32>,
}
