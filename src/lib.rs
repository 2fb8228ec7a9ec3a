// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # kafka-operator - Apache Kafka Operator for Kubernetes
//!
//! A Kubernetes operator written in Rust that manages Apache Kafka clusters through the
//! `KafkaCluster` Custom Resource Definition.
//!
//! ## Overview
//!
//! This library provides the core functionality of the operator:
//!
//! - Custom Resource Definitions for Kafka clusters
//! - Merging of the cluster default, role and role group configuration layers
//! - Listener and security topology derived from the TLS and Kerberos settings
//! - A reconciliation engine that creates, diffs and updates managed objects
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`cascade`] - Configuration cascade and merged-config cache
//! - [`listener`] - Listener and security topology
//! - [`kafka_resources`] - Builders for every managed Kubernetes object
//! - [`reconcilers`] - Reconciliation engine and the `KafkaCluster` pass
//! - [`store`] - Object store contract and its kube-rs implementation
//! - [`context`] - Shared controller context
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use kafka_operator::cascade::{default_broker_config, CascadeResolver};
//! use kafka_operator::crd::{BrokersRoleGroupSpec, BrokersSpec};
//!
//! let role = BrokersSpec::default();
//! let group = BrokersRoleGroupSpec {
//!     replicas: Some(3),
//!     ..Default::default()
//! };
//!
//! let effective = CascadeResolver::new()
//!     .merge(Some(&default_broker_config("simple")), Some(&role), Some(&group), None)
//!     .unwrap();
//! assert_eq!(effective.replicas, 3);
//! ```
//!
//! ## Features
//!
//! - **Ordered Reconciliation** - Dependencies are applied before their dependents
//! - **Drift Repair** - Managed objects are diffed against the desired state every pass
//! - **TLS and Kerberos** - Listener protocols follow the cluster security settings
//! - **Status Tracking** - `Available` condition on the `KafkaCluster` status

pub mod cascade;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod kafka_resources;
pub mod labels;
pub mod listener;
pub mod metrics;
pub mod properties;
pub mod quantity;
pub mod reconcilers;
pub mod status_reasons;
pub mod store;
