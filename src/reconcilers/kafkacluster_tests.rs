// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `kafkacluster.rs`

#[cfg(test)]
mod tests {
    use crate::cascade::MergedConfigCache;
    use crate::crd::{KafkaCluster, Listener, ListenerIngress, ListenerSpec, ListenerStatus};
    use crate::errors::ReconcileError;
    use crate::kafka_resources::build_selector_labels;
    use crate::labels::{K8S_INSTANCE, LISTENER_BOOTSTRAP_LABEL, LISTENER_BOOTSTRAP_VALUE};
    use crate::listener::SecuritySettings;
    use crate::reconcilers::fake_store::{FakeStore, StoreOp};
    use crate::reconcilers::kafkacluster::{plan_role_groups, reconcile_kafkacluster};
    use crate::status_reasons::{CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE};
    use k8s_openapi::api::apps::v1::StatefulSet;
    use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const NS: &str = "default";
    const STS: &str = "simple-broker-default";

    fn cluster_json() -> Value {
        json!({
            "apiVersion": "kafka.kubedoop.dev/v1alpha1",
            "kind": "KafkaCluster",
            "metadata": { "name": "simple", "namespace": NS, "uid": "cluster-uid", "generation": 2 },
            "spec": {
                "image": { "productVersion": "3.7.1" },
                "clusterConfig": { "zookeeperConfigMapName": "zk" },
                "brokers": {
                    "roleGroups": { "default": { "replicas": 1 } }
                }
            }
        })
    }

    fn cluster_from(value: Value) -> Arc<KafkaCluster> {
        Arc::new(serde_json::from_value(value).unwrap())
    }

    fn broker_pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(NS.to_string()),
                uid: Some(format!("uid-{name}")),
                labels: Some(build_selector_labels("simple", "default")),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn available_status(store: &FakeStore) -> Option<String> {
        store.status_patches().last().and_then(|(_, status)| {
            status["conditions"]
                .as_array()?
                .iter()
                .find(|c| c["type"] == "Available")
                .and_then(|c| c["status"].as_str())
                .map(str::to_string)
        })
    }

    async fn run(
        store: &Arc<FakeStore>,
        cluster: Arc<KafkaCluster>,
    ) -> crate::errors::Result<Option<Duration>> {
        reconcile_kafkacluster(Arc::clone(store), cluster, CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_first_pass_waits_for_pods() {
        let store = Arc::new(FakeStore::new());
        let cluster = cluster_from(cluster_json());
        store.insert(cluster.as_ref());

        let requeue = run(&store, Arc::clone(&cluster)).await.unwrap();

        assert_eq!(requeue, Some(Duration::from_secs(10)));
        assert!(store.object::<StatefulSet>(NS, STS).is_some());
        assert!(store.object::<ConfigMap>(NS, STS).is_some());
        assert!(store.object::<Service>(NS, STS).is_some());
        assert!(store
            .object::<Listener>(NS, &format!("{STS}-bootstrap"))
            .is_some());
        // Pass stopped at the workload; nothing after it ran
        assert!(store.object::<Service>(NS, &format!("{STS}-0")).is_none());
        assert!(store.object::<ConfigMap>(NS, "simple").is_none());
        assert_eq!(available_status(&store).as_deref(), Some(CONDITION_STATUS_FALSE));
    }

    #[tokio::test]
    async fn test_second_pass_converges_once_pods_exist() {
        let store = Arc::new(FakeStore::new());
        let cluster = cluster_from(cluster_json());
        store.insert(cluster.as_ref());
        run(&store, Arc::clone(&cluster)).await.unwrap();

        store.insert(&broker_pod(&format!("{STS}-0")));
        let refreshed = Arc::new(store.object::<KafkaCluster>(NS, "simple").unwrap());
        let requeue = run(&store, refreshed).await.unwrap();

        assert_eq!(requeue, None);
        assert_eq!(store.count(StoreOp::Update, "StatefulSet"), 0);
        assert_eq!(store.count(StoreOp::Update, "ConfigMap"), 0);

        let pod_service = store.object::<Service>(NS, &format!("{STS}-0")).unwrap();
        let owner = &pod_service.metadata.owner_references.unwrap()[0];
        assert_eq!(owner.kind, "Pod");
        assert_eq!(owner.uid, format!("uid-{STS}-0"));

        let discovery = store.object::<ConfigMap>(NS, "simple").unwrap();
        assert_eq!(discovery.data.unwrap()["KAFKA"], "");
        assert_eq!(available_status(&store).as_deref(), Some(CONDITION_STATUS_TRUE));
    }

    #[tokio::test]
    async fn test_managed_objects_owned_by_cluster() {
        let store = Arc::new(FakeStore::new());
        let cluster = cluster_from(cluster_json());
        run(&store, cluster).await.unwrap();

        let sts = store.object::<StatefulSet>(NS, STS).unwrap();
        let owner = &sts.metadata.owner_references.unwrap()[0];
        assert_eq!(owner.kind, "KafkaCluster");
        assert_eq!(owner.uid, "cluster-uid");
    }

    #[tokio::test]
    async fn test_paused_cluster_touches_nothing() {
        let store = Arc::new(FakeStore::new());
        let mut value = cluster_json();
        value["spec"]["clusterOperation"] = json!({ "reconciliationPaused": true });

        let requeue = run(&store, cluster_from(value)).await.unwrap();

        assert_eq!(requeue, None);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stopped_cluster_scales_to_zero() {
        let store = Arc::new(FakeStore::new());
        let mut value = cluster_json();
        value["spec"]["clusterOperation"] = json!({ "stopped": true });

        let requeue = run(&store, cluster_from(value)).await.unwrap();

        assert_eq!(requeue, None);
        let sts = store.object::<StatefulSet>(NS, STS).unwrap();
        assert_eq!(sts.spec.unwrap().replicas, Some(0));
        // No pods are expected, so the discovery step is reached
        assert!(store.object::<ConfigMap>(NS, "simple").is_some());
    }

    #[tokio::test]
    async fn test_missing_namespace_is_configuration_error() {
        let store = Arc::new(FakeStore::new());
        let mut value = cluster_json();
        value["metadata"]
            .as_object_mut()
            .unwrap()
            .remove("namespace");

        let result = run(&store, cluster_from(value)).await;

        assert!(matches!(result, Err(ReconcileError::Configuration(_))));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_memory_limit_fails_before_any_write() {
        let store = Arc::new(FakeStore::new());
        let mut value = cluster_json();
        value["spec"]["brokers"]["roleGroups"]["default"]["config"] =
            json!({ "resources": { "memory": { "limit": "lots" } } });

        let result = run(&store, cluster_from(value)).await;

        assert!(matches!(result, Err(ReconcileError::Configuration(_))));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_memory_limit_fails_before_any_write() {
        let store = Arc::new(FakeStore::new());
        let mut value = cluster_json();
        value["spec"]["brokers"]["roleGroups"]["default"]["config"] =
            json!({ "resources": { "memory": { "limit": "300000000000Ti" } } });

        let result = run(&store, cluster_from(value)).await;

        assert!(matches!(result, Err(ReconcileError::Configuration(_))));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_kerberos_without_tls_fails_before_any_write() {
        let store = Arc::new(FakeStore::new());
        let mut value = cluster_json();
        value["spec"]["clusterConfig"]["authentication"] =
            json!({ "kerberos": { "kerberosSecretClass": "kerberos" } });

        let result = run(&store, cluster_from(value)).await;

        assert!(
            matches!(result, Err(ReconcileError::Configuration(ref m)) if m.contains("serverSecretClass"))
        );
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_kerberos_with_tls_mounts_keystores() {
        let store = Arc::new(FakeStore::new());
        let mut value = cluster_json();
        value["spec"]["clusterConfig"]["authentication"] =
            json!({ "kerberos": { "kerberosSecretClass": "kerberos" } });
        value["spec"]["clusterConfig"]["tls"] = json!({});

        run(&store, cluster_from(value)).await.unwrap();

        let sts = store.object::<StatefulSet>(NS, STS).unwrap();
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

        let bootstrap = store
            .object::<Listener>(NS, &format!("{STS}-bootstrap"))
            .unwrap();
        assert!(bootstrap
            .spec
            .ports
            .iter()
            .any(|p| p.name == "bootstrap" && p.port == 9094));
    }

    #[tokio::test]
    async fn test_default_overrides_reach_server_properties() {
        let store = Arc::new(FakeStore::new());
        run(&store, cluster_from(cluster_json())).await.unwrap();

        let cm = store.object::<ConfigMap>(NS, STS).unwrap();
        let server = &cm.data.unwrap()["server.properties"];
        assert!(server.contains("log.dirs=/kubedoop/data/topicdata"));
    }

    #[tokio::test]
    async fn test_listener_without_client_port_is_topology_error() {
        let store = Arc::new(FakeStore::new());
        let mut value = cluster_json();
        value["spec"]["clusterOperation"] = json!({ "stopped": true });

        let mut stray = Listener::new("stray-bootstrap", ListenerSpec::default());
        stray.metadata.namespace = Some(NS.to_string());
        stray.metadata.labels = Some(BTreeMap::from([
            (K8S_INSTANCE.to_string(), "simple".to_string()),
            (
                LISTENER_BOOTSTRAP_LABEL.to_string(),
                LISTENER_BOOTSTRAP_VALUE.to_string(),
            ),
        ]));
        stray.status = Some(ListenerStatus {
            ingress_addresses: vec![ListenerIngress {
                address: "10.0.0.9".to_string(),
                ports: BTreeMap::from([("other".to_string(), 1234)]),
                ..Default::default()
            }],
            ..Default::default()
        });
        store.insert(&stray);

        let result = run(&store, cluster_from(value)).await;

        assert!(matches!(result, Err(ReconcileError::Topology(_))));
        // Conditions are still persisted after a failed step
        assert_eq!(store.status_patches().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_pass_does_not_persist_status() {
        let store = Arc::new(FakeStore::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result =
            reconcile_kafkacluster(Arc::clone(&store), cluster_from(cluster_json()), cancel).await;

        assert!(matches!(result, Err(ReconcileError::Cancelled)));
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_role_groups_planned_in_name_order() {
        let mut value = cluster_json();
        value["spec"]["brokers"]["roleGroups"] = json!({
            "zeta": { "replicas": 1 },
            "alpha": { "replicas": 3 }
        });
        let cluster = cluster_from(value);
        let security = SecuritySettings::from_cluster_config(&cluster.spec.cluster_config);
        let mut cache = MergedConfigCache::new();

        let plans = plan_role_groups(&cluster, &security, &mut cache).unwrap();

        let groups: Vec<_> = plans
            .iter()
            .map(|p| (p.group.as_str(), p.config.replicas))
            .collect();
        assert_eq!(groups, vec![("alpha", 3), ("zeta", 1)]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_no_broker_role_plans_nothing() {
        let mut value = cluster_json();
        value["spec"].as_object_mut().unwrap().remove("brokers");
        let cluster = cluster_from(value);
        let security = SecuritySettings::from_cluster_config(&cluster.spec.cluster_config);

        let plans = plan_role_groups(&cluster, &security, &mut MergedConfigCache::new()).unwrap();

        assert!(plans.is_empty());
    }
}
