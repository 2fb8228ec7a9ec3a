// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cascade.rs`

#[cfg(test)]
mod tests {
    use crate::cascade::{
        default_broker_config, merge_overrides, CacheKey, CascadeResolver, FillEmpty,
        MergedConfigCache,
    };
    use crate::crd::{
        BrokersConfigSpec, BrokersRoleGroupSpec, BrokersSpec, MemoryResource, OverridesSpec,
        ResourcesSpec,
    };
    use crate::errors::ReconcileError;
    use std::collections::BTreeMap;

    fn memory(limit: &str) -> Option<ResourcesSpec> {
        Some(ResourcesSpec {
            memory: Some(MemoryResource {
                limit: Some(limit.to_string()),
            }),
            ..Default::default()
        })
    }

    fn role_with_class(class: &str) -> BrokersSpec {
        BrokersSpec {
            config: Some(BrokersConfigSpec {
                broker_listener_class: Some(class.to_string()),
                graceful_shutdown_timeout: Some("2m".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_role_group_is_configuration_error() {
        let result = CascadeResolver::new().merge(None, None, None, None);
        assert!(matches!(result, Err(ReconcileError::Configuration(_))));
    }

    #[test]
    fn test_missing_optional_layers_are_empty() {
        let group = BrokersRoleGroupSpec::default();
        let effective = CascadeResolver::new()
            .merge(None, None, Some(&group), None)
            .unwrap();

        assert_eq!(effective.replicas, 1);
        assert_eq!(effective.config, BrokersConfigSpec::default());
        // No memory limit means no heap default
        assert!(!effective.overrides.env_overrides.contains_key("KAFKA_HEAP_OPTS"));
        assert_eq!(
            effective.overrides.config_overrides["server.properties"]["log.dirs"],
            "/kubedoop/data/topicdata"
        );
    }

    #[test]
    fn test_role_group_field_wins_over_broader_layers() {
        let defaults = default_broker_config("simple-kafka");
        let role = role_with_class("external-unstable");
        let group = BrokersRoleGroupSpec {
            replicas: Some(3),
            config: Some(BrokersConfigSpec {
                broker_listener_class: Some("external-stable".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let effective = CascadeResolver::new()
            .merge(Some(&defaults), Some(&role), Some(&group), None)
            .unwrap();

        assert_eq!(effective.replicas, 3);
        assert_eq!(effective.broker_listener_class(), "external-stable");
        // Unset in the group, set in the role
        assert_eq!(
            effective.config.graceful_shutdown_timeout.as_deref(),
            Some("2m")
        );
        // Unset in group and role, taken from the cluster default
        assert_eq!(effective.bootstrap_listener_class(), "cluster-internal");
        assert_eq!(effective.requested_secret_lifetime(), "1d");
        assert!(effective.config.affinity.is_some());
    }

    #[test]
    fn test_sub_objects_merge_as_whole_blocks() {
        let defaults = default_broker_config("simple-kafka");
        let group = BrokersRoleGroupSpec {
            config: Some(BrokersConfigSpec {
                resources: memory("4Gi"),
                ..Default::default()
            }),
            ..Default::default()
        };

        let effective = CascadeResolver::new()
            .merge(Some(&defaults), None, Some(&group), None)
            .unwrap();

        let resources = effective.config.resources.unwrap();
        assert_eq!(
            resources.memory.unwrap().limit.as_deref(),
            Some("4Gi")
        );
        // The default cpu and storage blocks are discarded with the rest of `resources`
        assert!(resources.cpu.is_none());
        assert!(resources.storage.is_none());
    }

    #[test]
    fn test_excluded_fields_are_never_filled() {
        let defaults = default_broker_config("simple-kafka");
        let group = BrokersRoleGroupSpec::default();

        let effective = CascadeResolver::new()
            .with_excluded_fields(&["logging", "affinity"])
            .merge(Some(&defaults), None, Some(&group), None)
            .unwrap();

        assert!(effective.config.logging.is_none());
        assert!(effective.config.affinity.is_none());
        assert!(effective.config.resources.is_some());
    }

    #[test]
    fn test_fill_empty_overrides_channel_is_all_or_nothing() {
        let mut target = OverridesSpec {
            cli_overrides: vec!["--user".to_string()],
            ..Default::default()
        };
        let broader = OverridesSpec {
            cli_overrides: vec!["--role".to_string()],
            env_overrides: BTreeMap::from([("A".to_string(), "1".to_string())]),
            ..Default::default()
        };

        target.fill_empty_from(&broader, &[]);

        assert_eq!(target.cli_overrides, vec!["--user".to_string()]);
        assert_eq!(target.env_overrides["A"], "1");
    }

    #[test]
    fn test_heap_options_follow_memory_limit() {
        let group = BrokersRoleGroupSpec {
            config: Some(BrokersConfigSpec {
                resources: memory("2Gi"),
                ..Default::default()
            }),
            ..Default::default()
        };

        let effective = CascadeResolver::new()
            .merge(None, None, Some(&group), None)
            .unwrap();

        // 80% of 2048 MiB
        assert_eq!(
            effective.overrides.env_overrides["KAFKA_HEAP_OPTS"],
            "-Xmx1638m -Xms1638m"
        );
    }

    #[test]
    fn test_invalid_memory_limit_is_configuration_error() {
        let group = BrokersRoleGroupSpec {
            config: Some(BrokersConfigSpec {
                resources: memory("lots"),
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = CascadeResolver::new().merge(None, None, Some(&group), None);
        assert!(matches!(result, Err(ReconcileError::Configuration(_))));
    }

    #[test]
    fn test_oversized_memory_limit_is_configuration_error() {
        for limit in ["300000000000Ti", "100000000000000000Ti"] {
            let group = BrokersRoleGroupSpec {
                config: Some(BrokersConfigSpec {
                    resources: memory(limit),
                    ..Default::default()
                }),
                ..Default::default()
            };

            let result = CascadeResolver::new().merge(None, None, Some(&group), None);
            assert!(
                matches!(result, Err(ReconcileError::Configuration(_))),
                "limit {limit} should be rejected"
            );
        }
    }

    #[test]
    fn test_kerberos_adds_krb5_environment() {
        let group = BrokersRoleGroupSpec::default();
        let effective = CascadeResolver::new()
            .with_kerberos(true)
            .merge(None, None, Some(&group), None)
            .unwrap();

        assert_eq!(
            effective.overrides.env_overrides["KRB5_CONFIG"],
            "/kubedoop/kerberos/krb5.conf"
        );
        assert!(effective.overrides.env_overrides["KAFKA_OPTS"]
            .contains("-Djava.security.krb5.conf="));
    }

    #[test]
    fn test_user_environment_is_never_replaced() {
        let group = BrokersRoleGroupSpec {
            config: Some(BrokersConfigSpec {
                resources: memory("1Gi"),
                ..Default::default()
            }),
            ..Default::default()
        };
        let user = OverridesSpec {
            env_overrides: BTreeMap::from([(
                "KAFKA_HEAP_OPTS".to_string(),
                "-Xmx256m".to_string(),
            )]),
            ..Default::default()
        };

        let effective = CascadeResolver::new()
            .merge(None, None, Some(&group), Some(&user))
            .unwrap();

        assert_eq!(effective.overrides.env_overrides["KAFKA_HEAP_OPTS"], "-Xmx256m");
    }

    #[test]
    fn test_group_overrides_sit_between_user_and_role() {
        let role = BrokersSpec {
            overrides: OverridesSpec {
                env_overrides: BTreeMap::from([("FROM".to_string(), "role".to_string())]),
                cli_overrides: vec!["--role".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let group = BrokersRoleGroupSpec {
            overrides: OverridesSpec {
                env_overrides: BTreeMap::from([("FROM".to_string(), "group".to_string())]),
                ..Default::default()
            },
            ..Default::default()
        };

        let effective = CascadeResolver::new()
            .merge(None, Some(&role), Some(&group), None)
            .unwrap();

        assert_eq!(effective.overrides.env_overrides["FROM"], "group");
        assert_eq!(effective.overrides.cli_overrides, vec!["--role".to_string()]);
    }

    #[test]
    fn test_merge_overrides_rules() {
        let user = OverridesSpec {
            cli_overrides: vec!["--b".to_string(), "--a".to_string()],
            env_overrides: BTreeMap::from([("K".to_string(), "user".to_string())]),
            config_overrides: BTreeMap::from([(
                "server.properties".to_string(),
                BTreeMap::from([("log.dirs".to_string(), "/custom".to_string())]),
            )]),
        };
        let defaults = OverridesSpec {
            cli_overrides: vec!["--a".to_string(), "--c".to_string()],
            env_overrides: BTreeMap::from([
                ("K".to_string(), "default".to_string()),
                ("J".to_string(), "default".to_string()),
            ]),
            config_overrides: BTreeMap::from([
                (
                    "server.properties".to_string(),
                    BTreeMap::from([
                        ("log.dirs".to_string(), "/default".to_string()),
                        ("broker.rack".to_string(), "r1".to_string()),
                    ]),
                ),
                (
                    "security.properties".to_string(),
                    BTreeMap::from([("networkaddress.cache.ttl".to_string(), "30".to_string())]),
                ),
            ]),
        };

        let merged = merge_overrides(&user, &defaults);

        assert_eq!(
            merged.cli_overrides,
            vec!["--b".to_string(), "--a".to_string(), "--c".to_string()]
        );
        assert_eq!(merged.env_overrides["K"], "user");
        assert_eq!(merged.env_overrides["J"], "default");

        let server = &merged.config_overrides["server.properties"];
        assert_eq!(server["log.dirs"], "/custom");
        assert_eq!(server["broker.rack"], "r1");
        assert_eq!(
            merged.config_overrides["security.properties"]["networkaddress.cache.ttl"],
            "30"
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let defaults = default_broker_config("simple-kafka");
        let role = role_with_class("external-unstable");
        let group = BrokersRoleGroupSpec {
            replicas: Some(2),
            config: Some(BrokersConfigSpec {
                resources: memory("3Gi"),
                ..Default::default()
            }),
            overrides: OverridesSpec {
                cli_overrides: vec!["--override".to_string()],
                ..Default::default()
            },
        };
        let resolver = CascadeResolver::new().with_kerberos(true);

        for user in [None, Some(OverridesSpec::default())] {
            let once = resolver
                .merge(Some(&defaults), Some(&role), Some(&group), user.as_ref())
                .unwrap();
            let twice = resolver
                .merge(
                    Some(&defaults),
                    Some(&role),
                    Some(&once.as_role_group()),
                    user.as_ref(),
                )
                .unwrap();
            assert_eq!(once, twice);

            let again = resolver
                .merge(Some(&defaults), Some(&role), Some(&group), user.as_ref())
                .unwrap();
            assert_eq!(once, again);
        }
    }

    #[test]
    fn test_default_broker_config_anti_affinity() {
        let defaults = default_broker_config("simple-kafka");
        let terms = defaults
            .affinity
            .unwrap()
            .pod_anti_affinity
            .unwrap()
            .preferred_during_scheduling_ignored_during_execution
            .unwrap();

        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].weight, 70);
        assert_eq!(terms[0].pod_affinity_term.topology_key, "kubernetes.io/hostname");
        let labels = terms[0]
            .pod_affinity_term
            .label_selector
            .as_ref()
            .unwrap()
            .match_labels
            .as_ref()
            .unwrap();
        assert_eq!(labels["app.kubernetes.io/instance"], "simple-kafka");
        assert_eq!(labels["app.kubernetes.io/component"], "broker");
    }

    #[test]
    fn test_cache_computes_once_per_key() {
        let mut cache = MergedConfigCache::new();
        let key = CacheKey::new("kafka", "simple-kafka", "broker", "default");
        let mut calls = 0;

        for _ in 0..3 {
            let value = cache
                .get_or_try_insert_with(key.clone(), || {
                    calls += 1;
                    Ok(crate::cascade::EffectiveConfig {
                        replicas: 3,
                        ..Default::default()
                    })
                })
                .unwrap();
            assert_eq!(value.replicas, 3);
        }

        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_does_not_store_errors() {
        let mut cache = MergedConfigCache::new();
        let key = CacheKey::new("kafka", "simple-kafka", "broker", "default");

        let result = cache.get_or_try_insert_with(key.clone(), || {
            Err(ReconcileError::Configuration("bad".to_string()))
        });
        assert!(result.is_err());
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_cache_keys_are_structured() {
        // Same concatenation, different tuples
        let a = CacheKey::new("ns", "a-b", "broker", "c");
        let b = CacheKey::new("ns", "a", "b-broker", "c");
        assert_ne!(a, b);
    }
}
