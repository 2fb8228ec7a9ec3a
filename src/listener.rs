// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Listener and security topology calculator.
//!
//! Derives the broker listeners (`CLIENT`/`CLIENT_AUTH`, `INTERNAL` and, with Kerberos,
//! `BOOTSTRAP`) from a [`SecuritySettings`] snapshot and renders the three strings passed
//! to the broker at startup: `listeners`, `advertised.listeners` and
//! `listener.security.protocol.map`.
//!
//! The client-facing listener is chosen by [`CLIENT_LISTENER_RULES`], an ordered table of
//! guards evaluated top to bottom. Exactly one rule fires, so exactly one client-facing
//! listener is emitted. Mutual TLS wins over Kerberos, and Kerberos wins over server TLS.
//!
//! Every string follows listener emission order. Nothing here iterates a hash map, so
//! identical settings always give byte-identical output.

use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{
    BOOTSTRAP_PORT, BOOTSTRAP_PORT_NAME, CLIENT_PORT, CLIENT_PORT_NAME, DEFAULT_CLUSTER_DOMAIN, INTERNAL_PORT,
    LISTENER_BOOTSTRAP_DIR, LISTENER_BROKER_DIR, SECURE_CLIENT_PORT, SECURE_CLIENT_PORT_NAME,
    SECURE_INTERNAL_PORT, TLS_KEYSTORE_INTERNAL_DIR, TLS_KEYSTORE_SERVER_DIR, TLS_STORE_TYPE,
};
use crate::crd::ClusterConfigSpec;
use crate::errors::{ReconcileError, Result};

/// Wildcard bind address of every listener
pub const LISTENER_BIND_HOST: &str = "0.0.0.0";

/// Listener used for broker-to-broker traffic
pub const INTER_BROKER_LISTENER: ListenerName = ListenerName::Internal;

/// Immutable security snapshot taken from the cluster configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecuritySettings {
    /// Secret class of the client-facing TLS certificate
    pub server_secret_class: Option<String>,
    /// Secret class of the inter-broker TLS certificate
    pub internal_secret_class: Option<String>,
    /// Authentication class for mutual TLS client authentication
    pub client_auth_class: Option<String>,
    pub kerberos_enabled: bool,
    pub ssl_store_password: String,
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl SecuritySettings {
    /// Snapshot the security-related part of a cluster configuration.
    ///
    /// Empty secret class names count as unset.
    #[must_use]
    pub fn from_cluster_config(config: &ClusterConfigSpec) -> Self {
        let tls = config.tls.as_ref();
        let authentication = config.authentication.as_ref();

        Self {
            server_secret_class: tls.and_then(|t| non_empty(&t.server_secret_class)),
            internal_secret_class: tls.and_then(|t| non_empty(&t.internal_secret_class)),
            client_auth_class: authentication
                .and_then(|a| a.tls_class.as_deref())
                .and_then(non_empty),
            kerberos_enabled: authentication.is_some_and(|a| a.kerberos.is_some()),
            ssl_store_password: tls
                .map(|t| t.ssl_store_password.clone())
                .unwrap_or_default(),
        }
    }

    /// Whether client traffic is encrypted.
    #[must_use]
    pub fn client_tls_enabled(&self) -> bool {
        self.client_auth_class.is_some() || self.kerberos_enabled || self.server_secret_class.is_some()
    }

    /// Whether inter-broker traffic is encrypted.
    #[must_use]
    pub fn internal_tls_enabled(&self) -> bool {
        self.internal_secret_class.is_some() || self.kerberos_enabled
    }

    #[must_use]
    pub fn client_port(&self) -> i32 {
        if self.client_tls_enabled() {
            SECURE_CLIENT_PORT
        } else {
            CLIENT_PORT
        }
    }

    /// Name of the client port, as published by the listener volume.
    #[must_use]
    pub fn client_port_name(&self) -> &'static str {
        if self.client_tls_enabled() {
            SECURE_CLIENT_PORT_NAME
        } else {
            CLIENT_PORT_NAME
        }
    }

    #[must_use]
    pub fn internal_port(&self) -> i32 {
        if self.internal_tls_enabled() {
            SECURE_INTERNAL_PORT
        } else {
            INTERNAL_PORT
        }
    }

    /// Secret class backing the client-facing keystore.
    ///
    /// Mutual TLS uses its authentication class, otherwise the server secret class.
    #[must_use]
    pub fn client_keystore_class(&self) -> Option<&str> {
        self.client_auth_class
            .as_deref()
            .or(self.server_secret_class.as_deref())
    }

    /// Ports published by the bootstrap `Listener`, as `(name, port)`.
    ///
    /// Kerberos adds the `BOOTSTRAP` listener port next to the client port.
    #[must_use]
    pub fn bootstrap_ports(&self) -> Vec<(&'static str, i32)> {
        let mut ports = vec![(self.client_port_name(), self.client_port())];
        if self.kerberos_enabled {
            ports.push((BOOTSTRAP_PORT_NAME, BOOTSTRAP_PORT));
        }
        ports
    }

    /// Port name clients bootstrap through, as published by the bootstrap `Listener`.
    #[must_use]
    pub fn discovery_port_name(&self) -> &'static str {
        if self.kerberos_enabled {
            BOOTSTRAP_PORT_NAME
        } else {
            self.client_port_name()
        }
    }

    /// Check that every encrypted listener has a secret class to mount its keystore from.
    ///
    /// Kerberos encrypts both client and inter-broker traffic, so it needs the server and
    /// internal secret classes of `clusterConfig.tls`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Configuration`] naming the missing secret class.
    pub fn validate(&self) -> Result<()> {
        if self.client_tls_enabled() && self.client_keystore_class().is_none() {
            return Err(ReconcileError::Configuration(
                "client TLS is enabled but clusterConfig.tls.serverSecretClass is not set"
                    .to_string(),
            ));
        }
        if self.internal_tls_enabled() && self.internal_secret_class.is_none() {
            return Err(ReconcileError::Configuration(
                "internal TLS is enabled but clusterConfig.tls.internalSecretClass is not set"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Listener names
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerName {
    Client,
    ClientAuth,
    Internal,
    Bootstrap,
}

impl ListenerName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::ClientAuth => "CLIENT_AUTH",
            Self::Internal => "INTERNAL",
            Self::Bootstrap => "BOOTSTRAP",
        }
    }

    /// Prefix of per-listener broker settings, e.g. `listener.name.internal.`
    #[must_use]
    pub fn settings_prefix(self) -> String {
        format!("listener.name.{}.", self.as_str().to_lowercase())
    }
}

impl fmt::Display for ListenerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire-level security protocol of a listener
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecurityProtocol {
    Plaintext,
    Ssl,
    SaslSsl,
}

impl SecurityProtocol {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Ssl => "SSL",
            Self::SaslSsl => "SASL_SSL",
        }
    }
}

impl fmt::Display for SecurityProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One broker listener with its bind and advertised endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerDefinition {
    pub name: ListenerName,
    pub bind_host: String,
    pub bind_port: i32,
    /// Literal host or a shell expression resolved when the container starts
    pub advertised_host: String,
    /// Literal port or a shell expression resolved when the container starts
    pub advertised_port: String,
    pub protocol: SecurityProtocol,
}

impl ListenerDefinition {
    fn bind_string(&self) -> String {
        format!("{}://{}:{}", self.name, self.bind_host, self.bind_port)
    }

    fn advertised_string(&self) -> String {
        format!("{}://{}:{}", self.name, self.advertised_host, self.advertised_port)
    }
}

/// One row of the client listener decision table.
pub struct ClientListenerRule {
    /// Short description, used in logs and tests
    pub description: &'static str,
    pub applies: fn(&SecuritySettings) -> bool,
    pub name: ListenerName,
    pub protocol: SecurityProtocol,
    /// Bind on the secure client port instead of the plain one
    pub secure: bool,
}

fn has_client_auth(settings: &SecuritySettings) -> bool {
    settings.client_auth_class.is_some()
}

fn has_kerberos(settings: &SecuritySettings) -> bool {
    settings.kerberos_enabled
}

fn has_server_tls(settings: &SecuritySettings) -> bool {
    settings.server_secret_class.is_some()
}

fn always(_: &SecuritySettings) -> bool {
    true
}

/// Client listener rules in priority order. The first matching row wins.
///
/// Kerberos is layered on TLS transport, so its row reports `Ssl`. It sits above
/// server TLS: enabling both gives the Kerberos treatment.
pub static CLIENT_LISTENER_RULES: [ClientListenerRule; 4] = [
    ClientListenerRule {
        description: "mutual TLS client authentication",
        applies: has_client_auth,
        name: ListenerName::ClientAuth,
        protocol: SecurityProtocol::Ssl,
        secure: true,
    },
    ClientListenerRule {
        description: "kerberos",
        applies: has_kerberos,
        name: ListenerName::Client,
        protocol: SecurityProtocol::Ssl,
        secure: true,
    },
    ClientListenerRule {
        description: "server TLS",
        applies: has_server_tls,
        name: ListenerName::Client,
        protocol: SecurityProtocol::Ssl,
        secure: true,
    },
    ClientListenerRule {
        description: "plaintext",
        applies: always,
        name: ListenerName::Client,
        protocol: SecurityProtocol::Plaintext,
        secure: false,
    },
];

/// First rule of [`CLIENT_LISTENER_RULES`] whose guard holds.
#[must_use]
pub fn select_client_rule(settings: &SecuritySettings) -> &'static ClientListenerRule {
    CLIENT_LISTENER_RULES
        .iter()
        .find(|rule| (rule.applies)(settings))
        .unwrap_or(&CLIENT_LISTENER_RULES[CLIENT_LISTENER_RULES.len() - 1])
}

/// Ordered listeners of one broker role group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerTopology {
    pub listeners: Vec<ListenerDefinition>,
}

impl ListenerTopology {
    /// Bind listeners, e.g. `CLIENT://0.0.0.0:9092,INTERNAL://0.0.0.0:19092`
    #[must_use]
    pub fn listeners_string(&self) -> String {
        self.join(ListenerDefinition::bind_string)
    }

    /// Advertised listeners, with shell placeholders left for the container to expand.
    #[must_use]
    pub fn advertised_listeners_string(&self) -> String {
        self.join(ListenerDefinition::advertised_string)
    }

    /// Protocol map, e.g. `CLIENT:PLAINTEXT,INTERNAL:PLAINTEXT`
    #[must_use]
    pub fn security_protocol_map_string(&self) -> String {
        self.join(|l| format!("{}:{}", l.name, l.protocol))
    }

    /// Listener name to protocol.
    #[must_use]
    pub fn protocol_map(&self) -> BTreeMap<ListenerName, SecurityProtocol> {
        self.listeners.iter().map(|l| (l.name, l.protocol)).collect()
    }

    #[must_use]
    pub fn get(&self, name: ListenerName) -> Option<&ListenerDefinition> {
        self.listeners.iter().find(|l| l.name == name)
    }

    /// The single client-facing listener.
    #[must_use]
    pub fn client_listener(&self) -> Option<&ListenerDefinition> {
        self.listeners
            .iter()
            .find(|l| matches!(l.name, ListenerName::Client | ListenerName::ClientAuth))
    }

    fn join<F>(&self, render: F) -> String
    where
        F: Fn(&ListenerDefinition) -> String,
    {
        self.listeners
            .iter()
            .map(render)
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn address_file(listener_dir: &str) -> String {
    format!("$(cat {listener_dir}/default-address/address)")
}

fn port_file(listener_dir: &str, port_name: &str) -> String {
    format!("$(cat {listener_dir}/default-address/ports/{port_name})")
}

/// Stable in-cluster DNS name of the broker pod behind the headless service `service`.
#[must_use]
pub fn pod_fqdn(namespace: &str, service: &str, cluster_domain: &str) -> String {
    format!("$POD_NAME.{service}.{namespace}.svc.{cluster_domain}")
}

/// Compute the topology with the default cluster domain.
#[must_use]
pub fn compute_topology(
    settings: &SecuritySettings,
    namespace: &str,
    owner_name: &str,
) -> ListenerTopology {
    compute_topology_in_domain(settings, namespace, owner_name, DEFAULT_CLUSTER_DOMAIN)
}

/// Compute the listeners of a role group whose headless service is `owner_name`.
#[must_use]
pub fn compute_topology_in_domain(
    settings: &SecuritySettings,
    namespace: &str,
    owner_name: &str,
    cluster_domain: &str,
) -> ListenerTopology {
    let mut listeners = Vec::with_capacity(3);
    let client_port_name = settings.client_port_name();

    let rule = select_client_rule(settings);
    let client_port = if rule.secure {
        SECURE_CLIENT_PORT
    } else {
        CLIENT_PORT
    };
    listeners.push(ListenerDefinition {
        name: rule.name,
        bind_host: LISTENER_BIND_HOST.to_string(),
        bind_port: client_port,
        advertised_host: address_file(LISTENER_BROKER_DIR),
        advertised_port: port_file(LISTENER_BROKER_DIR, client_port_name),
        protocol: rule.protocol,
    });

    let (internal_port, internal_protocol) = if settings.internal_tls_enabled() {
        (SECURE_INTERNAL_PORT, SecurityProtocol::Ssl)
    } else {
        (INTERNAL_PORT, SecurityProtocol::Plaintext)
    };
    listeners.push(ListenerDefinition {
        name: ListenerName::Internal,
        bind_host: LISTENER_BIND_HOST.to_string(),
        bind_port: internal_port,
        advertised_host: pod_fqdn(namespace, owner_name, cluster_domain),
        advertised_port: internal_port.to_string(),
        protocol: internal_protocol,
    });

    if settings.kerberos_enabled {
        listeners.push(ListenerDefinition {
            name: ListenerName::Bootstrap,
            bind_host: LISTENER_BIND_HOST.to_string(),
            bind_port: BOOTSTRAP_PORT,
            advertised_host: address_file(LISTENER_BOOTSTRAP_DIR),
            advertised_port: port_file(LISTENER_BOOTSTRAP_DIR, BOOTSTRAP_PORT_NAME),
            protocol: SecurityProtocol::Ssl,
        });
    }

    ListenerTopology { listeners }
}

fn insert_store_settings(
    settings: &mut BTreeMap<String, String>,
    listener: ListenerName,
    store_dir: &str,
    password: &str,
) {
    let prefix = listener.settings_prefix();
    for store in ["keystore", "truststore"] {
        settings.insert(
            format!("{prefix}ssl.{store}.location"),
            format!("{store_dir}/{store}.p12"),
        );
        settings.insert(
            format!("{prefix}ssl.{store}.type"),
            TLS_STORE_TYPE.to_string(),
        );
        settings.insert(
            format!("{prefix}ssl.{store}.password"),
            password.to_string(),
        );
    }
}

/// Broker settings for every TLS-enabled listener of `topology`.
///
/// Always sets `inter.broker.listener.name`.
#[must_use]
pub fn tls_config_settings(
    settings: &SecuritySettings,
    topology: &ListenerTopology,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let password = settings.ssl_store_password.as_str();

    for listener in &topology.listeners {
        if listener.protocol == SecurityProtocol::Plaintext {
            continue;
        }
        match listener.name {
            ListenerName::Client | ListenerName::Bootstrap => {
                insert_store_settings(&mut out, listener.name, TLS_KEYSTORE_SERVER_DIR, password);
            }
            ListenerName::ClientAuth => {
                insert_store_settings(&mut out, listener.name, TLS_KEYSTORE_SERVER_DIR, password);
                out.insert(
                    format!("{}ssl.client.auth", listener.name.settings_prefix()),
                    "required".to_string(),
                );
            }
            ListenerName::Internal => {
                insert_store_settings(&mut out, listener.name, TLS_KEYSTORE_INTERNAL_DIR, password);
                out.insert(
                    format!("{}ssl.client.auth", listener.name.settings_prefix()),
                    "required".to_string(),
                );
            }
        }
    }

    out.insert(
        "inter.broker.listener.name".to_string(),
        INTER_BROKER_LISTENER.to_string(),
    );
    out
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod listener_tests;
