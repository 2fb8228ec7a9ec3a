// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Generates the `KafkaCluster` CRD YAML from the Rust types in src/crd.rs, so the
//! files in deploy/crds/ always match the code.
//!
//! Usage:
//!   cargo run --bin crdgen
//!
//! The `Listener` type is only consumed here; its CRD ships with the listener operator.

use anyhow::{Context, Result};
use kafka_operator::crd::KafkaCluster;
use kube::CustomResourceExt;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<()> {
    let output_dir = Path::new("deploy/crds");

    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    println!("Generating CRD YAML files from src/crd.rs...");

    generate_crd::<KafkaCluster>("kafkaclusters.crd.yaml", output_dir)?;

    println!("✓ Successfully generated CRD YAML files in deploy/crds/");
    println!("\nNext steps:");
    println!("  1. Review the generated files");
    println!("  2. Deploy with: kubectl apply -f deploy/crds/");

    Ok(())
}

fn generate_crd<T>(filename: &str, output_dir: &Path) -> Result<()>
where
    T: CustomResourceExt,
{
    let crd = T::crd();

    let mut crd_json: Value = serde_json::to_value(&crd)?;

    // Show the Available condition in `kubectl get`
    if let Some(versions) = crd_json["spec"]["versions"].as_array_mut() {
        for version in versions {
            version["additionalPrinterColumns"] = json!([
                {
                    "name": "Available",
                    "type": "string",
                    "jsonPath": ".status.conditions[?(@.type==\"Available\")].status"
                },
                {
                    "name": "Age",
                    "type": "date",
                    "jsonPath": ".metadata.creationTimestamp"
                }
            ]);
        }
    }

    let yaml = serde_yaml::to_string(&crd_json)?;
    let content = format!("{COPYRIGHT_HEADER}{yaml}");

    let output_path = output_dir.join(filename);
    fs::write(&output_path, content)
        .with_context(|| format!("writing {}", output_path.display()))?;

    println!("  ✓ Generated {filename}");

    Ok(())
}
