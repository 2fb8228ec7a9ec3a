// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes quantity and duration parsing.
//!
//! Only the subset the operator needs: decimal and binary SI suffixes for
//! quantities (`250m`, `1Gi`, `2G`) and `h`/`m`/`s` compound durations (`1h30m`).

/// Parse a Kubernetes quantity into its numeric value (bytes, cores, ...).
///
/// Returns `None` for anything that is not a plain number with an optional
/// recognised suffix.
#[must_use]
pub fn parse_quantity(value: &str) -> Option<f64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);
    if number.is_empty() || number.matches('.').count() > 1 {
        return None;
    }
    let number: f64 = number.parse().ok()?;

    let multiplier = match suffix {
        "" => 1.0,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "Ki" => 1024.0,
        "Mi" => 1024.0_f64.powi(2),
        "Gi" => 1024.0_f64.powi(3),
        "Ti" => 1024.0_f64.powi(4),
        _ => return None,
    };
    Some(number * multiplier)
}

/// Parse a quantity and express it in whole mebibytes (rounded down).
#[must_use]
pub fn quantity_to_mib(value: &str) -> Option<u64> {
    let bytes = parse_quantity(value)?;
    if !bytes.is_finite() || bytes < 0.0 {
        return None;
    }
    let mib = (bytes / 1024.0_f64.powi(2)).floor();
    // u64::MAX as f64 rounds up to 2^64, which no longer fits
    #[allow(clippy::cast_precision_loss)]
    let limit = u64::MAX as f64;
    if mib >= limit {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(mib as u64)
}

/// Whether two strings denote the same quantity, e.g. `1000m` and `1`.
#[must_use]
pub fn quantities_equal(a: &str, b: &str) -> bool {
    match (parse_quantity(a), parse_quantity(b)) {
        (Some(x), Some(y)) => (x - y).abs() <= f64::EPSILON * x.abs().max(y.abs()).max(1.0),
        _ => false,
    }
}

/// Parse a duration such as `30s`, `5m` or `1h30m` into seconds.
#[must_use]
pub fn parse_duration_secs(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let mut total: i64 = 0;
    let mut digits = String::new();
    for c in value.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let amount: i64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        total = total.checked_add(amount.checked_mul(unit)?)?;
    }

    // A trailing bare number is seconds
    if !digits.is_empty() {
        total = total.checked_add(digits.parse().ok()?)?;
    }
    Some(total)
}

#[cfg(test)]
#[path = "quantity_tests.rs"]
mod quantity_tests;
