// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `properties.rs`

#[cfg(test)]
mod tests {
    use crate::crd::LoggingConfigSpec;
    use crate::properties::{apply_overrides, parse_properties, render_log4j, render_properties};
    use std::collections::BTreeMap;

    #[test]
    fn test_render_is_sorted() {
        let props = BTreeMap::from([
            ("log.dirs".to_string(), "/kubedoop/data/topicdata".to_string()),
            ("controlled.shutdown.enable".to_string(), "true".to_string()),
        ]);

        assert_eq!(
            render_properties(&props),
            "controlled.shutdown.enable=true\nlog.dirs=/kubedoop/data/topicdata\n"
        );
    }

    #[test]
    fn test_render_escapes_separators_in_keys() {
        let props = BTreeMap::from([("a=b".to_string(), "c:d".to_string())]);
        let text = render_properties(&props);

        assert_eq!(text, "a\\=b=c:d\n");
        assert_eq!(parse_properties(&text), props);
    }

    #[test]
    fn test_parse_skips_comments() {
        let parsed = parse_properties("# comment\n\n! other\nkey=value=with=equals\nempty=\n");

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["key"], "value=with=equals");
        assert_eq!(parsed["empty"], "");
    }

    #[test]
    fn test_apply_overrides_replaces_and_adds() {
        let rendered = "broker.rack=r1\nlog.dirs=/data\n";
        let overrides = BTreeMap::from([
            ("log.dirs".to_string(), "/custom".to_string()),
            ("num.partitions".to_string(), "3".to_string()),
        ]);

        assert_eq!(
            apply_overrides(rendered, &overrides),
            "broker.rack=r1\nlog.dirs=/custom\nnum.partitions=3\n"
        );
    }

    #[test]
    fn test_log4j_defaults() {
        let text = render_log4j(None);
        assert!(text.contains("log4j.rootLogger=INFO, CONSOLE, FILE\n"));
        assert!(text.contains("log4j.appender.FILE.Threshold=INFO\n"));
    }

    #[test]
    fn test_log4j_levels() {
        let logging = LoggingConfigSpec {
            loggers: BTreeMap::from([
                ("ROOT".to_string(), "WARN".to_string()),
                ("kafka.controller".to_string(), "DEBUG".to_string()),
            ]),
            console_level: Some("ERROR".to_string()),
            file_level: None,
        };

        let text = render_log4j(Some(&logging));
        assert!(text.contains("log4j.rootLogger=WARN, CONSOLE, FILE\n"));
        assert!(text.contains("log4j.appender.CONSOLE.Threshold=ERROR\n"));
        assert!(text.contains("log4j.logger.kafka.controller=DEBUG\n"));
        assert!(!text.contains("log4j.logger.ROOT"));
    }
}
