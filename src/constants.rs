// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Kafka operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

use std::time::Duration;

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `KafkaCluster` CRD
pub const API_GROUP: &str = "kafka.kubedoop.dev";

/// API version for the `KafkaCluster` CRD
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "kafka.kubedoop.dev/v1alpha1";

/// Kind name for `KafkaCluster` resource
pub const KIND_KAFKA_CLUSTER: &str = "KafkaCluster";

/// API version of the listener operator's `Listener` objects
pub const LISTENER_API_VERSION: &str = "listeners.kubedoop.dev/v1alpha1";

/// Kind name for listener operator objects
pub const KIND_LISTENER: &str = "Listener";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "kafka-operator";

// ============================================================================
// Roles and Containers
// ============================================================================

/// The single role managed by this operator
pub const ROLE_BROKER: &str = "broker";

/// Name of the main broker container
pub const CONTAINER_NAME_KAFKA: &str = "kafka";

// ============================================================================
// Kafka Ports
// ============================================================================

/// Plaintext client port
pub const CLIENT_PORT: i32 = 9092;

/// TLS client port
pub const SECURE_CLIENT_PORT: i32 = 9093;

/// Plaintext inter-broker port
pub const INTERNAL_PORT: i32 = 19092;

/// TLS inter-broker port
pub const SECURE_INTERNAL_PORT: i32 = 19093;

/// Kerberos bootstrap port
pub const BOOTSTRAP_PORT: i32 = 9094;

/// JMX exporter metrics port
pub const METRICS_PORT: i32 = 9606;

/// Port name of the plaintext client port
pub const CLIENT_PORT_NAME: &str = "kafka";

/// Port name of the TLS client port
pub const SECURE_CLIENT_PORT_NAME: &str = "kafka-tls";

/// Port name of the inter-broker port
pub const INTERNAL_PORT_NAME: &str = "internal";

/// Port name of the bootstrap port
pub const BOOTSTRAP_PORT_NAME: &str = "bootstrap";

/// Port name of the metrics port
pub const METRICS_PORT_NAME: &str = "metrics";

// ============================================================================
// Filesystem Layout
// ============================================================================

/// Root directory of everything mounted into the broker container
pub const KUBEDOOP_ROOT: &str = "/kubedoop";

/// Mount point of the rendered configuration files
pub const CONFIG_DIR: &str = "/kubedoop/config";

/// Mount point of the broker data volume
pub const DATA_DIR: &str = "/kubedoop/data";

/// Kafka log directory below the data volume
pub const LOG_DIRS: &str = "/kubedoop/data/topicdata";

/// Mount point of the per-broker listener volume
pub const LISTENER_BROKER_DIR: &str = "/kubedoop/listener-broker";

/// Mount point of the bootstrap listener volume
pub const LISTENER_BOOTSTRAP_DIR: &str = "/kubedoop/listener-bootstrap";

/// Server keystore directory for client-facing TLS
pub const TLS_KEYSTORE_SERVER_DIR: &str = "/kubedoop/tls_keystore_server";

/// Internal keystore directory for inter-broker TLS
pub const TLS_KEYSTORE_INTERNAL_DIR: &str = "/kubedoop/tls_keystore_internal";

/// Kerberos configuration mount
pub const KERBEROS_DIR: &str = "/kubedoop/kerberos";

/// Keystore format produced by the secret operator
pub const TLS_STORE_TYPE: &str = "PKCS12";

/// `server.properties` file name
pub const SERVER_PROPERTIES_FILE: &str = "server.properties";

/// `security.properties` file name
pub const SECURITY_PROPERTIES_FILE: &str = "security.properties";

/// `log4j.properties` file name
pub const LOG4J_PROPERTIES_FILE: &str = "log4j.properties";

/// Key of the discovery `ConfigMap` entry holding the bootstrap servers
pub const DISCOVERY_KEY: &str = "KAFKA";

/// Key of the `ZooKeeper` discovery `ConfigMap` entry
pub const ZOOKEEPER_DISCOVERY_KEY: &str = "ZOOKEEPER";

// ============================================================================
// Cascade Defaults
// ============================================================================

/// Default listener class for broker and bootstrap listeners
pub const DEFAULT_LISTENER_CLASS: &str = "cluster-internal";

/// Default lifetime requested for TLS secrets
pub const DEFAULT_SECRET_LIFETIME: &str = "1d";

/// Default graceful shutdown timeout
pub const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT: &str = "30s";

/// Default minimum CPU
pub const DEFAULT_CPU_MIN: &str = "250m";

/// Default maximum CPU
pub const DEFAULT_CPU_MAX: &str = "1000m";

/// Default memory limit
pub const DEFAULT_MEMORY_LIMIT: &str = "1Gi";

/// Default data volume capacity
pub const DEFAULT_STORAGE_CAPACITY: &str = "2Gi";

/// Weight of the default pod anti-affinity term
pub const DEFAULT_ANTI_AFFINITY_WEIGHT: i32 = 70;

/// Share of the container memory limit handed to the JVM heap (percent)
pub const JVM_HEAP_PERCENT: u64 = 80;

/// Default replica count for a role group that omits it
pub const DEFAULT_REPLICAS: i32 = 1;

/// Default `maxUnavailable` of the broker `PodDisruptionBudget`
pub const DEFAULT_PDB_MAX_UNAVAILABLE: i32 = 1;

/// Default cluster domain
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

// ============================================================================
// Reconciliation Timing
// ============================================================================

/// Requeue after updating a non-workload object
pub const REQUEUE_AFTER_UPDATE: Duration = Duration::from_secs(5);

/// Requeue after updating a workload object
pub const REQUEUE_AFTER_WORKLOAD_UPDATE: Duration = Duration::from_secs(10);

/// Poll interval while a workload is not yet satisfied
pub const REQUEUE_WORKLOAD_NOT_READY: Duration = Duration::from_secs(10);

/// Requeue when a multi-object set does not have the expected member count
pub const REQUEUE_MEMBER_COUNT_MISMATCH: Duration = Duration::from_secs(5);

/// Requeue interval once the cluster is fully available
pub const REQUEUE_WHEN_READY_SECS: u64 = 300;

/// Requeue interval while the cluster is converging
pub const REQUEUE_WHEN_NOT_READY_SECS: u64 = 30;

/// Requeue interval after a reconciliation error
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

// ============================================================================
// Probes
// ============================================================================

/// Initial delay before the liveness probe starts
pub const LIVENESS_INITIAL_DELAY_SECS: i32 = 30;

/// Liveness probe period
pub const LIVENESS_PERIOD_SECS: i32 = 10;

/// Liveness probe failure threshold
pub const LIVENESS_FAILURE_THRESHOLD: i32 = 6;

/// Initial delay before the readiness probe starts
pub const READINESS_INITIAL_DELAY_SECS: i32 = 10;

/// Readiness probe period
pub const READINESS_PERIOD_SECS: i32 = 10;

/// Readiness probe failure threshold
pub const READINESS_FAILURE_THRESHOLD: i32 = 3;

// ============================================================================
// Runtime
// ============================================================================

/// Default bind address of the metrics endpoint
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// Number of tokio worker threads
pub const TOKIO_WORKER_THREADS: usize = 4;
