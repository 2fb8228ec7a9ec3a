// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Java `.properties` and log4j file rendering for the broker `ConfigMap`.

use std::collections::BTreeMap;

use crate::crd::LoggingConfigSpec;

/// Directory the broker writes its log file to
const BROKER_LOG_DIR: &str = "/kubedoop/log/kafka";

/// Default level of every log4j appender and of the root logger
const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Logger name that sets the root logger
const ROOT_LOGGER: &str = "ROOT";

fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' if is_key => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Render sorted `key=value` lines.
#[must_use]
pub fn render_properties(properties: &BTreeMap<String, String>) -> String {
    properties
        .iter()
        .map(|(k, v)| format!("{}={}\n", escape(k, true), escape(v, false)))
        .collect()
}

/// Parse `key=value` lines. Comments and blank lines are skipped.
///
/// Only the `=` separator is recognised, which is all [`render_properties`] emits.
#[must_use]
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        // First unescaped '='
        let mut split = None;
        let mut escaped = false;
        for (i, c) in line.char_indices() {
            match c {
                '\\' if !escaped => escaped = true,
                '=' if !escaped => {
                    split = Some(i);
                    break;
                }
                _ => escaped = false,
            }
        }

        let (key, value) = match split {
            Some(i) => (&line[..i], &line[i + 1..]),
            None => (line, ""),
        };
        out.insert(unescape(key.trim_end()), unescape(value));
    }
    out
}

/// Apply `overrides` onto a rendered properties file and render it again.
#[must_use]
pub fn apply_overrides(rendered: &str, overrides: &BTreeMap<String, String>) -> String {
    let mut properties = parse_properties(rendered);
    for (key, value) in overrides {
        properties.insert(key.clone(), value.clone());
    }
    render_properties(&properties)
}

/// Render `log4j.properties` for the broker container.
#[must_use]
pub fn render_log4j(logging: Option<&LoggingConfigSpec>) -> String {
    let root_level = logging
        .and_then(|l| l.loggers.get(ROOT_LOGGER))
        .map_or(DEFAULT_LOG_LEVEL, String::as_str);
    let console_level = logging
        .and_then(|l| l.console_level.as_deref())
        .unwrap_or(DEFAULT_LOG_LEVEL);
    let file_level = logging
        .and_then(|l| l.file_level.as_deref())
        .unwrap_or(DEFAULT_LOG_LEVEL);

    let mut properties = BTreeMap::new();
    properties.insert(
        "log4j.rootLogger".to_string(),
        format!("{root_level}, CONSOLE, FILE"),
    );
    properties.insert(
        "log4j.appender.CONSOLE".to_string(),
        "org.apache.log4j.ConsoleAppender".to_string(),
    );
    properties.insert(
        "log4j.appender.CONSOLE.Threshold".to_string(),
        console_level.to_string(),
    );
    properties.insert(
        "log4j.appender.CONSOLE.layout".to_string(),
        "org.apache.log4j.PatternLayout".to_string(),
    );
    properties.insert(
        "log4j.appender.CONSOLE.layout.ConversionPattern".to_string(),
        "[%d] %p %m (%c)%n".to_string(),
    );
    properties.insert(
        "log4j.appender.FILE".to_string(),
        "org.apache.log4j.RollingFileAppender".to_string(),
    );
    properties.insert(
        "log4j.appender.FILE.Threshold".to_string(),
        file_level.to_string(),
    );
    properties.insert(
        "log4j.appender.FILE.File".to_string(),
        format!("{BROKER_LOG_DIR}/kafka.log"),
    );
    properties.insert("log4j.appender.FILE.MaxFileSize".to_string(), "5MB".to_string());
    properties.insert("log4j.appender.FILE.MaxBackupIndex".to_string(), "1".to_string());
    properties.insert(
        "log4j.appender.FILE.layout".to_string(),
        "org.apache.log4j.PatternLayout".to_string(),
    );

    if let Some(logging) = logging {
        for (logger, level) in logging.loggers.iter().filter(|(k, _)| *k != ROOT_LOGGER) {
            properties.insert(format!("log4j.logger.{logger}"), level.clone());
        }
    }

    render_properties(&properties)
}

#[cfg(test)]
#[path = "properties_tests.rs"]
mod properties_tests;
