// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `kafka_resources.rs`

#[cfg(test)]
mod tests {
    use crate::cascade::{default_broker_config, CascadeResolver, EffectiveConfig};
    use crate::crd::{
        BrokersRoleGroupSpec, ClusterConfigSpec, ImageSpec, KafkaCluster, KafkaClusterSpec,
        KafkaTlsSpec, Listener, ListenerIngress, ListenerSpec, ListenerStatus,
        PodDisruptionBudgetSpec, RoleConfigSpec,
    };
    use crate::errors::ReconcileError;
    use crate::kafka_resources::{
        apply_affinity, apply_cli_overrides, apply_config_overrides, apply_env_overrides,
        apply_logging, build_bootstrap_listener, build_configmap, build_discovery_configmap,
        build_headless_service, build_pdb, build_pod_service, build_role, build_role_binding,
        build_service_account, build_start_script, build_statefulset, pod_names,
        role_group_name, RoleGroupInputs,
    };
    use crate::listener::{compute_topology, SecuritySettings};
    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::ResourceExt;
    use std::collections::BTreeMap;

    fn cluster(tls: Option<KafkaTlsSpec>) -> KafkaCluster {
        let mut cluster = KafkaCluster::new(
            "simple-kafka",
            KafkaClusterSpec {
                image: ImageSpec::default(),
                cluster_config: ClusterConfigSpec {
                    authentication: None,
                    tls,
                    cluster_domain: "cluster.local".to_string(),
                    zookeeper_config_map_name: "simple-zk".to_string(),
                    vector_aggregator_config_map_name: None,
                },
                cluster_operation: None,
                brokers: None,
            },
        );
        cluster.metadata.namespace = Some("kafka".to_string());
        cluster.metadata.uid = Some("uid-1".to_string());
        cluster
    }

    fn effective() -> EffectiveConfig {
        let defaults = default_broker_config("simple-kafka");
        let group = BrokersRoleGroupSpec {
            replicas: Some(3),
            ..Default::default()
        };
        CascadeResolver::new()
            .merge(Some(&defaults), None, Some(&group), None)
            .unwrap()
    }

    fn env_value(sts: &k8s_openapi::api::apps::v1::StatefulSet, name: &str) -> Option<String> {
        sts.spec.as_ref()?.template.spec.as_ref()?.containers[0]
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.clone())
    }

    #[test]
    fn test_rbac_names() {
        let c = cluster(None);
        assert_eq!(build_service_account(&c).metadata.name.as_deref(), Some("simple-kafka-sa"));
        assert_eq!(build_role(&c).metadata.name.as_deref(), Some("simple-kafka-role"));

        let binding = build_role_binding(&c);
        assert_eq!(binding.role_ref.name, "simple-kafka-role");
        let subjects = binding.subjects.unwrap();
        assert_eq!(subjects[0].name, "simple-kafka-sa");
        assert_eq!(subjects[0].namespace.as_deref(), Some("kafka"));
    }

    #[test]
    fn test_owner_reference_points_at_cluster() {
        let sa = build_service_account(&cluster(None));
        let owners = sa.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "KafkaCluster");
        assert_eq!(owners[0].uid, "uid-1");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn test_pdb_default_and_disabled() {
        let c = cluster(None);
        let pdb = build_pdb(&c, None).unwrap();
        assert_eq!(pdb.metadata.name.as_deref(), Some("simple-kafka-broker"));
        assert_eq!(
            pdb.spec.unwrap().max_unavailable,
            Some(k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(1))
        );

        let disabled = RoleConfigSpec {
            pod_disruption_budget: Some(PodDisruptionBudgetSpec {
                enabled: false,
                max_unavailable: None,
            }),
        };
        assert!(build_pdb(&c, Some(&disabled)).is_none());
    }

    #[test]
    fn test_configmap_and_overrides() {
        let c = cluster(Some(KafkaTlsSpec::default()));
        let config = effective();
        let security = SecuritySettings::from_cluster_config(&c.spec.cluster_config);
        let topology = compute_topology(&security, "kafka", "simple-kafka-broker-default");
        let inputs = RoleGroupInputs {
            cluster: &c,
            group: "default",
            config: &config,
            security: &security,
            topology: &topology,
        };

        let mut cm = build_configmap(&inputs);
        assert_eq!(cm.metadata.name.as_deref(), Some("simple-kafka-broker-default"));

        apply_config_overrides(&mut cm, &config.overrides.config_overrides);
        let data = cm.data.unwrap();
        let server = &data["server.properties"];
        assert!(server.contains("inter.broker.listener.name=INTERNAL\n"));
        assert!(server.contains("log.dirs=/kubedoop/data/topicdata\n"));
        assert!(server.contains(
            "listener.name.client.ssl.keystore.location=/kubedoop/tls_keystore_server/keystore.p12\n"
        ));
        assert!(data["security.properties"].contains("networkaddress.cache.ttl=30\n"));
        assert!(data["log4j.properties"].contains("log4j.rootLogger=INFO, CONSOLE, FILE"));
    }

    #[test]
    fn test_headless_service_and_bootstrap_listener() {
        let c = cluster(None);
        let config = effective();
        let security = SecuritySettings::default();
        let topology = compute_topology(&security, "kafka", "simple-kafka-broker-default");
        let inputs = RoleGroupInputs {
            cluster: &c,
            group: "default",
            config: &config,
            security: &security,
            topology: &topology,
        };

        let svc = build_headless_service(&inputs);
        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        let ports: Vec<i32> = spec.ports.unwrap().iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![19092, 9606]);

        let listener = build_bootstrap_listener(&inputs);
        assert_eq!(
            listener.metadata.name.as_deref(),
            Some("simple-kafka-broker-default-bootstrap")
        );
        assert_eq!(
            listener.labels()["app.kubernetes.io/listener-bootstrap"],
            "true"
        );
        assert_eq!(listener.spec.class_name.as_deref(), Some("cluster-internal"));
        assert_eq!(listener.spec.ports[0].name, "kafka");
        assert_eq!(listener.spec.ports[0].port, 9092);
    }

    #[test]
    fn test_kerberos_bootstrap_listener_and_keystores() {
        let c = cluster(Some(KafkaTlsSpec::default()));
        let config = effective();
        let security = SecuritySettings {
            kerberos_enabled: true,
            ..SecuritySettings::from_cluster_config(&c.spec.cluster_config)
        };
        let topology = compute_topology(&security, "kafka", "simple-kafka-broker-default");
        let inputs = RoleGroupInputs {
            cluster: &c,
            group: "default",
            config: &config,
            security: &security,
            topology: &topology,
        };

        let listener = build_bootstrap_listener(&inputs);
        let ports: Vec<(&str, i32)> = listener
            .spec
            .ports
            .iter()
            .map(|p| (p.name.as_str(), p.port))
            .collect();
        assert_eq!(ports, vec![("kafka-tls", 9093), ("bootstrap", 9094)]);

        let sts = build_statefulset(&inputs, 1);
        let volumes: Vec<String> = sts
            .spec
            .unwrap()
            .template
            .spec
            .unwrap()
            .volumes
            .unwrap()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert!(volumes.contains(&"tls-keystore-server".to_string()), "{volumes:?}");
        assert!(volumes.contains(&"tls-keystore-internal".to_string()), "{volumes:?}");
    }

    #[test]
    fn test_statefulset_shape() {
        let c = cluster(Some(KafkaTlsSpec::default()));
        let config = effective();
        let security = SecuritySettings::from_cluster_config(&c.spec.cluster_config);
        let topology = compute_topology(&security, "kafka", "simple-kafka-broker-default");
        let inputs = RoleGroupInputs {
            cluster: &c,
            group: "default",
            config: &config,
            security: &security,
            topology: &topology,
        };

        let sts = build_statefulset(&inputs, 3);
        let spec = sts.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.service_name.as_deref(), Some("simple-kafka-broker-default"));

        let pod = spec.template.spec.as_ref().unwrap();
        assert_eq!(pod.service_account_name.as_deref(), Some("simple-kafka-sa"));
        assert_eq!(pod.termination_grace_period_seconds, Some(30));
        // Affinity is applied by a hook, not the builder
        assert!(pod.affinity.is_none());

        let volumes: Vec<&str> = pod
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert!(volumes.contains(&"tls-keystore-server"));
        assert!(volumes.contains(&"tls-keystore-internal"));
        assert!(volumes.contains(&"listener-broker"));

        let args = pod.containers[0].args.as_ref().unwrap();
        assert!(args[0].contains("--override \"listeners=CLIENT://0.0.0.0:9093,INTERNAL://0.0.0.0:19093\""));

        let claims = spec.volume_claim_templates.as_ref().unwrap();
        assert_eq!(claims[0].metadata.name.as_deref(), Some("data"));
    }

    #[test]
    fn test_statefulset_hooks() {
        let c = cluster(None);
        let mut config = effective();
        config
            .overrides
            .env_overrides
            .insert("POD_NAME".to_string(), "overridden".to_string());
        config.overrides.cli_overrides.push("--override num.partitions=3".to_string());
        let security = SecuritySettings::default();
        let topology = compute_topology(&security, "kafka", "simple-kafka-broker-default");
        let inputs = RoleGroupInputs {
            cluster: &c,
            group: "default",
            config: &config,
            security: &security,
            topology: &topology,
        };

        let mut sts = build_statefulset(&inputs, 1);
        apply_affinity(&mut sts, &config);
        apply_cli_overrides(&mut sts, &config.overrides);
        apply_env_overrides(&mut sts, &config.overrides);
        apply_logging(&mut sts);
        apply_logging(&mut sts);

        let pod = sts.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        assert!(pod.affinity.is_some());
        assert!(pod.containers[0].args.as_ref().unwrap()[0].ends_with("--override num.partitions=3"));

        let env = pod.containers[0].env.as_ref().unwrap();
        assert_eq!(env.iter().filter(|e| e.name == "POD_NAME").count(), 1);
        assert_eq!(env.iter().filter(|e| e.name == "KAFKA_LOG4J_OPTS").count(), 1);
        assert_eq!(env_value(&sts, "POD_NAME").as_deref(), Some("overridden"));
        assert_eq!(
            env_value(&sts, "KAFKA_HEAP_OPTS").as_deref(),
            Some("-Xmx819m -Xms819m")
        );
    }

    #[test]
    fn test_start_script_keeps_placeholders() {
        let topology = compute_topology(&SecuritySettings::default(), "kafka", "svc");
        let script = build_start_script(&topology);
        assert!(script.starts_with("bin/kafka-server-start.sh /kubedoop/config/server.properties"));
        assert!(script.contains("zookeeper.connect=$ZOOKEEPER"));
        assert!(script.contains("$(cat /kubedoop/listener-broker/default-address/address)"));
        assert!(script.contains("broker.id=${POD_NAME##*-}"));
    }

    #[test]
    fn test_pod_service_selects_one_pod() {
        let c = cluster(None);
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("simple-kafka-broker-default-1".to_string()),
                uid: Some("pod-uid".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let svc = build_pod_service(&c, "default", &SecuritySettings::default(), &pod);
        assert_eq!(svc.metadata.name.as_deref(), Some("simple-kafka-broker-default-1"));
        assert_eq!(svc.metadata.owner_references.as_ref().unwrap()[0].uid, "pod-uid");

        let spec = svc.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("NodePort"));
        assert_eq!(
            spec.selector.unwrap()["statefulset.kubernetes.io/pod-name"],
            "simple-kafka-broker-default-1"
        );
    }

    #[test]
    fn test_pod_names() {
        assert_eq!(
            pod_names("simple-kafka", "default", 2),
            vec![
                "simple-kafka-broker-default-0".to_string(),
                "simple-kafka-broker-default-1".to_string()
            ]
        );
        assert!(pod_names("simple-kafka", "default", 0).is_empty());
        assert_eq!(role_group_name("a", "b"), "a-broker-b");
    }

    fn bootstrap(name: &str, address: &str, ports: &[(&str, i32)]) -> Listener {
        let mut listener = Listener::new(name, ListenerSpec::default());
        listener.status = Some(ListenerStatus {
            service_name: None,
            ingress_addresses: vec![ListenerIngress {
                address: address.to_string(),
                address_type: None,
                ports: ports
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), *v))
                    .collect::<BTreeMap<_, _>>(),
            }],
        });
        listener
    }

    #[test]
    fn test_discovery_joins_bootstrap_addresses() {
        let c = cluster(None);
        let listeners = vec![
            bootstrap("b", "10.0.0.2", &[("kafka", 31002)]),
            bootstrap("a", "10.0.0.1", &[("kafka", 31001)]),
            Listener::new("c", ListenerSpec::default()),
        ];

        let cm = build_discovery_configmap(&c, &listeners, "kafka").unwrap();
        assert_eq!(cm.metadata.name.as_deref(), Some("simple-kafka"));
        assert_eq!(cm.data.unwrap()["KAFKA"], "10.0.0.1:31001,10.0.0.2:31002");
    }

    #[test]
    fn test_discovery_missing_port_is_topology_error() {
        let c = cluster(None);
        let listeners = vec![bootstrap("a", "10.0.0.1", &[("kafka", 31001)])];

        let result = build_discovery_configmap(&c, &listeners, "kafka-tls");
        assert!(matches!(result, Err(ReconcileError::Topology(_))));
    }
}
