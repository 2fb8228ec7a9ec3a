// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration cascade resolver.
//!
//! Broker configuration is declared on four layers, from broadest to most specific:
//!
//! 1. **Cluster default** - computed by the operator ([`default_broker_config`])
//! 2. **Role** - `spec.brokers.config` and the role-level overrides
//! 3. **Role group** - `spec.brokers.roleGroups.<name>` (required)
//! 4. **User overrides** - explicit override channels, winning over everything
//!
//! # Structural merge
//!
//! Starting from the role-group layer, every field that is still unset is copied from
//! the role layer, then from the cluster default. Fields are merged as whole blocks:
//! a role group that defines `resources` at all keeps exactly its own `resources`.
//! The per-field fill is generated by [`fill_if_empty!`] for each configuration type,
//! and a configurable exclusion list keeps named fields from being filled.
//!
//! # Override merge
//!
//! [`merge_overrides`] is a separate additive pass that folds default-computed
//! overrides into the user's without ever replacing a user value.
//!
//! # Example
//!
//! ```rust,no_run
//! use kafka_operator::cascade::{default_broker_config, CascadeResolver};
//! use kafka_operator::crd::BrokersRoleGroupSpec;
//!
//! let cluster_default = default_broker_config("simple-kafka");
//! let group = BrokersRoleGroupSpec { replicas: Some(3), ..Default::default() };
//!
//! let effective = CascadeResolver::default()
//!     .merge(Some(&cluster_default), None, Some(&group), None)
//!     .unwrap();
//! assert_eq!(effective.replicas, 3);
//! ```

use k8s_openapi::api::core::v1::{
    Affinity, PodAffinityTerm, PodAntiAffinity, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::constants::{
    CONTAINER_NAME_KAFKA, DEFAULT_ANTI_AFFINITY_WEIGHT, DEFAULT_CPU_MAX, DEFAULT_CPU_MIN,
    DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT, DEFAULT_LISTENER_CLASS, DEFAULT_MEMORY_LIMIT,
    DEFAULT_REPLICAS, DEFAULT_SECRET_LIFETIME, DEFAULT_STORAGE_CAPACITY, JVM_HEAP_PERCENT,
    KERBEROS_DIR, LOG_DIRS, ROLE_BROKER, SECURITY_PROPERTIES_FILE, SERVER_PROPERTIES_FILE,
};
use crate::crd::{
    BrokersConfigSpec, BrokersRoleGroupSpec, BrokersSpec, CpuResource, LoggingConfigSpec,
    LoggingSpec, MemoryResource, OverridesSpec, ResourcesSpec, StorageResource,
};
use crate::errors::{ReconcileError, Result};
use crate::labels::{APP_NAME_KAFKA, K8S_COMPONENT, K8S_INSTANCE, K8S_NAME};
use crate::quantity::quantity_to_mib;

// ============================================================================
// Fill-if-empty machinery
// ============================================================================

/// Zero-value test used by the structural merge.
pub trait Unset {
    /// Whether the value counts as "not set" and may be filled from a broader layer.
    fn is_unset(&self) -> bool;
}

impl<T> Unset for Option<T> {
    fn is_unset(&self) -> bool {
        self.is_none()
    }
}

impl Unset for String {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

impl<T> Unset for Vec<T> {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Unset for BTreeMap<K, V> {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

/// Generates the per-field fill for a configuration struct.
///
/// For every listed field that is not excluded and still [`Unset`], the value of the
/// broader layer is cloned in. Field names in the exclusion list are the Rust field
/// names (`snake_case`).
macro_rules! fill_if_empty {
    ($target:expr, $broader:expr, $exclude:expr; $($field:ident),+ $(,)?) => {
        $(
            if !$exclude.contains(&stringify!($field)) && Unset::is_unset(&$target.$field) {
                $target.$field = $broader.$field.clone();
            }
        )+
    };
}

/// Structural fill from a broader layer.
pub trait FillEmpty {
    /// Fill every unset, non-excluded field of `self` from `broader`.
    fn fill_empty_from(&mut self, broader: &Self, exclude: &[&str]);
}

impl FillEmpty for BrokersConfigSpec {
    fn fill_empty_from(&mut self, broader: &Self, exclude: &[&str]) {
        fill_if_empty!(self, broader, exclude;
            resources,
            affinity,
            node_selector,
            tolerations,
            graceful_shutdown_timeout,
            logging,
            broker_listener_class,
            bootstrap_listener_class,
            requested_secret_lifetime,
        );
    }
}

impl FillEmpty for OverridesSpec {
    fn fill_empty_from(&mut self, broader: &Self, exclude: &[&str]) {
        fill_if_empty!(self, broader, exclude;
            cli_overrides,
            env_overrides,
            config_overrides,
        );
    }
}

// ============================================================================
// Effective configuration
// ============================================================================

/// The merged configuration of one role group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectiveConfig {
    /// Declared replica count
    pub replicas: i32,
    /// Structurally merged configuration
    pub config: BrokersConfigSpec,
    /// User overrides with default-computed overrides folded in
    pub overrides: OverridesSpec,
}

impl EffectiveConfig {
    /// Express this effective configuration as a role-group layer.
    ///
    /// Feeding it back into [`CascadeResolver::merge`] yields the same value.
    #[must_use]
    pub fn as_role_group(&self) -> BrokersRoleGroupSpec {
        BrokersRoleGroupSpec {
            replicas: Some(self.replicas),
            config: Some(self.config.clone()),
            overrides: self.overrides.clone(),
        }
    }

    /// Broker listener class, falling back to the default class.
    #[must_use]
    pub fn broker_listener_class(&self) -> &str {
        self.config
            .broker_listener_class
            .as_deref()
            .unwrap_or(DEFAULT_LISTENER_CLASS)
    }

    /// Bootstrap listener class, falling back to the default class.
    #[must_use]
    pub fn bootstrap_listener_class(&self) -> &str {
        self.config
            .bootstrap_listener_class
            .as_deref()
            .unwrap_or(DEFAULT_LISTENER_CLASS)
    }

    /// Requested TLS secret lifetime, falling back to the default.
    #[must_use]
    pub fn requested_secret_lifetime(&self) -> &str {
        self.config
            .requested_secret_lifetime
            .as_deref()
            .unwrap_or(DEFAULT_SECRET_LIFETIME)
    }
}

/// Merges the four configuration layers of a role group.
#[derive(Clone, Debug, Default)]
pub struct CascadeResolver {
    exclude: Vec<&'static str>,
    kerberos_enabled: bool,
}

impl CascadeResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Never fill the named fields from broader layers.
    #[must_use]
    pub fn with_excluded_fields(mut self, fields: &[&'static str]) -> Self {
        self.exclude.extend_from_slice(fields);
        self
    }

    /// Include Kerberos environment defaults.
    #[must_use]
    pub fn with_kerberos(mut self, enabled: bool) -> Self {
        self.kerberos_enabled = enabled;
        self
    }

    /// Merge the four layers into one [`EffectiveConfig`].
    ///
    /// The role-group layer is required. Missing cluster default, role or user
    /// overrides are treated as empty. The role group's own overrides sit between the
    /// explicit user overrides and the role overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Configuration`] when the role-group layer is missing or
    /// the effective memory limit cannot be parsed.
    pub fn merge(
        &self,
        cluster_default: Option<&BrokersConfigSpec>,
        role: Option<&BrokersSpec>,
        role_group: Option<&BrokersRoleGroupSpec>,
        user_overrides: Option<&OverridesSpec>,
    ) -> Result<EffectiveConfig> {
        let role_group = role_group.ok_or_else(|| {
            ReconcileError::Configuration("role group configuration is required".to_string())
        })?;

        let exclude = self.exclude.as_slice();

        // Structural merge: role group <- role <- cluster default
        let mut config = role_group.config.clone().unwrap_or_default();
        if let Some(role_config) = role.and_then(|r| r.config.as_ref()) {
            config.fill_empty_from(role_config, exclude);
        }
        if let Some(defaults) = cluster_default {
            config.fill_empty_from(defaults, exclude);
        }

        // Override channels: user <- role group <- role
        let mut overrides = user_overrides.cloned().unwrap_or_default();
        overrides.fill_empty_from(&role_group.overrides, exclude);
        if let Some(role) = role {
            overrides.fill_empty_from(&role.overrides, exclude);
        }

        let defaults = self.compute_default_overrides(&config)?;
        let overrides = merge_overrides(&overrides, &defaults);

        Ok(EffectiveConfig {
            replicas: role_group.replicas.unwrap_or(DEFAULT_REPLICAS),
            config,
            overrides,
        })
    }

    /// Overrides the operator always wants present unless the user set them.
    fn compute_default_overrides(&self, config: &BrokersConfigSpec) -> Result<OverridesSpec> {
        let mut defaults = OverridesSpec::default();

        let mut server = BTreeMap::new();
        server.insert(
            "zookeeper.connection.timeout.ms".to_string(),
            "18000".to_string(),
        );
        server.insert("controlled.shutdown.enable".to_string(), "true".to_string());
        server.insert("log.dirs".to_string(), LOG_DIRS.to_string());
        defaults
            .config_overrides
            .insert(SERVER_PROPERTIES_FILE.to_string(), server);

        let mut security = BTreeMap::new();
        security.insert("networkaddress.cache.ttl".to_string(), "30".to_string());
        security.insert(
            "networkaddress.cache.negative.ttl".to_string(),
            "0".to_string(),
        );
        defaults
            .config_overrides
            .insert(SECURITY_PROPERTIES_FILE.to_string(), security);

        if let Some(limit) = config
            .resources
            .as_ref()
            .and_then(|r| r.memory.as_ref())
            .and_then(|m| m.limit.as_deref())
        {
            let mib = quantity_to_mib(limit).ok_or_else(|| {
                ReconcileError::Configuration(format!("invalid memory limit '{limit}'"))
            })?;
            let heap = mib
                .checked_mul(JVM_HEAP_PERCENT)
                .map(|scaled| scaled / 100)
                .ok_or_else(|| {
                    ReconcileError::Configuration(format!("memory limit '{limit}' is too large"))
                })?;
            defaults.env_overrides.insert(
                "KAFKA_HEAP_OPTS".to_string(),
                format!("-Xmx{heap}m -Xms{heap}m"),
            );
        }

        if self.kerberos_enabled {
            let krb5 = format!("{KERBEROS_DIR}/krb5.conf");
            defaults
                .env_overrides
                .insert("KRB5_CONFIG".to_string(), krb5.clone());
            defaults.env_overrides.insert(
                "KAFKA_OPTS".to_string(),
                format!("-Djava.security.krb5.conf={krb5}"),
            );
        }

        Ok(defaults)
    }
}

/// Fold default-computed overrides into user overrides without replacing user values.
///
/// - CLI arguments: defaults not already present are appended after the user's
/// - Environment: only keys the user did not set are added
/// - Files: a file the user did not supply is taken whole; otherwise only missing
///   keys are added
#[must_use]
pub fn merge_overrides(user: &OverridesSpec, defaults: &OverridesSpec) -> OverridesSpec {
    let mut merged = user.clone();

    for arg in &defaults.cli_overrides {
        if !merged.cli_overrides.contains(arg) {
            merged.cli_overrides.push(arg.clone());
        }
    }

    for (key, value) in &defaults.env_overrides {
        merged
            .env_overrides
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    for (file, entries) in &defaults.config_overrides {
        let target = merged.config_overrides.entry(file.clone()).or_default();
        for (key, value) in entries {
            target.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    merged
}

/// The cluster default layer for the broker role.
#[must_use]
pub fn default_broker_config(cluster_name: &str) -> BrokersConfigSpec {
    let mut match_labels = BTreeMap::new();
    match_labels.insert(K8S_NAME.to_string(), APP_NAME_KAFKA.to_string());
    match_labels.insert(K8S_INSTANCE.to_string(), cluster_name.to_string());
    match_labels.insert(K8S_COMPONENT.to_string(), ROLE_BROKER.to_string());

    let affinity = Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: DEFAULT_ANTI_AFFINITY_WEIGHT,
                    pod_affinity_term: PodAffinityTerm {
                        label_selector: Some(LabelSelector {
                            match_labels: Some(match_labels),
                            ..Default::default()
                        }),
                        topology_key: "kubernetes.io/hostname".to_string(),
                        ..Default::default()
                    },
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    };

    BrokersConfigSpec {
        resources: Some(ResourcesSpec {
            cpu: Some(CpuResource {
                min: Some(DEFAULT_CPU_MIN.to_string()),
                max: Some(DEFAULT_CPU_MAX.to_string()),
            }),
            memory: Some(MemoryResource {
                limit: Some(DEFAULT_MEMORY_LIMIT.to_string()),
            }),
            storage: Some(StorageResource {
                capacity: Some(DEFAULT_STORAGE_CAPACITY.to_string()),
            }),
        }),
        affinity: Some(affinity),
        node_selector: None,
        tolerations: None,
        graceful_shutdown_timeout: Some(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT.to_string()),
        logging: Some(LoggingSpec {
            enable_vector_agent: Some(false),
            containers: BTreeMap::new(),
        }),
        broker_listener_class: Some(DEFAULT_LISTENER_CLASS.to_string()),
        bootstrap_listener_class: Some(DEFAULT_LISTENER_CLASS.to_string()),
        requested_secret_lifetime: Some(DEFAULT_SECRET_LIFETIME.to_string()),
    }
}

/// Logging settings of the main broker container, if any.
#[must_use]
pub fn kafka_container_logging(config: &BrokersConfigSpec) -> Option<&LoggingConfigSpec> {
    config
        .logging
        .as_ref()
        .and_then(|l| l.containers.get(CONTAINER_NAME_KAFKA))
}

// ============================================================================
// Per-pass memoization
// ============================================================================

/// Structured key of a memoized effective configuration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub namespace: String,
    pub instance: String,
    pub role: String,
    pub group: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(namespace: &str, instance: &str, role: &str, group: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            instance: instance.to_string(),
            role: role.to_string(),
            group: group.to_string(),
        }
    }
}

/// Effective configurations computed during one owner-instance pass.
///
/// The orchestrator creates one cache per pass, so concurrent passes of different
/// clusters never share entries or locks.
#[derive(Debug, Default)]
pub struct MergedConfigCache {
    entries: HashMap<CacheKey, EffectiveConfig>,
}

impl MergedConfigCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// # Errors
    ///
    /// Propagates the error of `compute`; nothing is cached in that case.
    pub fn get_or_try_insert_with<F>(
        &mut self,
        key: CacheKey,
        compute: F,
    ) -> Result<&EffectiveConfig>
    where
        F: FnOnce() -> Result<EffectiveConfig>,
    {
        use std::collections::hash_map::Entry;

        match self.entries.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                debug!(
                    instance = %entry.key().instance,
                    role = %entry.key().role,
                    group = %entry.key().group,
                    "Computing effective configuration"
                );
                let value = compute()?;
                Ok(entry.insert(value))
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<&EffectiveConfig> {
        self.entries.get(key)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "cascade_tests.rs"]
mod cascade_tests;
