//! Field predicates for the endpoint schema table.
//!
//! Every predicate takes a present, non-null JSON value and reports a short
//! reason on rejection; the engine prefixes the field name. Numeric and
//! boolean predicates also accept string spellings so values captured from
//! query strings (always strings on the wire) pass through the same checks
//! as body fields.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use crate::auth::roles::Role;

pub const TRANSACTION_TYPES: [&str; 5] =
    ["purchase", "adjustment", "redemption", "transfer", "event"];
pub const PROMOTION_TYPES: [&str; 2] = ["automatic", "one-time"];
pub const COMPARISON_OPERATORS: [&str; 2] = ["gte", "lte"];

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
    .filter(|parsed| parsed.is_finite())
}

fn one_of(value: &Value, allowed: &[&str]) -> Result<(), String> {
    match value.as_str() {
        Some(text) if allowed.contains(&text) => Ok(()),
        _ => Err(format!("must be one of {}", allowed.join(", "))),
    }
}

pub fn boolean(value: &Value) -> Result<(), String> {
    match value {
        Value::Bool(_) => Ok(()),
        Value::String(text) if text == "true" || text == "false" => Ok(()),
        _ => Err("must be a boolean".into()),
    }
}

pub fn integer(value: &Value) -> Result<(), String> {
    as_integer(value)
        .map(|_| ())
        .ok_or_else(|| "must be an integer".into())
}

pub fn number(value: &Value) -> Result<(), String> {
    as_number(value)
        .map(|_| ())
        .ok_or_else(|| "must be a number".into())
}

pub fn text(value: &Value) -> Result<(), String> {
    if value.is_string() {
        Ok(())
    } else {
        Err("must be a string".into())
    }
}

pub fn non_empty_text(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(text) if !text.trim().is_empty() => Ok(()),
        _ => Err("must be a non-empty string".into()),
    }
}

/// Institutional account identifier: 7 or 8 alphanumeric ASCII characters.
pub fn utorid(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(text)
            if (7..=8).contains(&text.len())
                && text.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            Ok(())
        }
        _ => Err("must be 7-8 alphanumeric characters".into()),
    }
}

pub fn person_name(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(text) if (1..=50).contains(&text.chars().count()) => Ok(()),
        _ => Err("must be 1-50 characters".into()),
    }
}

/// University email addresses only. The local part just has to look like
/// one; the domain is exact.
pub fn institutional_email(value: &Value) -> Result<(), String> {
    let rejection = || "must be a valid University of Toronto email".to_string();
    let text = value.as_str().ok_or_else(rejection)?;
    let local = text.strip_suffix("@mail.utoronto.ca").ok_or_else(rejection)?;
    if local.is_empty() || local.contains('@') || local.contains(char::is_whitespace) {
        return Err(rejection());
    }
    Ok(())
}

/// 8-20 characters with at least one uppercase letter, one lowercase letter,
/// one digit, and one special character.
pub fn password_complexity(value: &Value) -> Result<(), String> {
    let rejection = || {
        "must be 8-20 characters with an uppercase letter, a lowercase letter, \
         a number, and a special character"
            .to_string()
    };
    let text = value.as_str().ok_or_else(rejection)?;
    let length = text.chars().count();
    if !(8..=20).contains(&length) {
        return Err(rejection());
    }
    let has_upper = text.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = text.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = text.chars().any(|c| c.is_ascii_digit());
    let has_special = text.chars().any(|c| !c.is_ascii_alphanumeric());
    if has_upper && has_lower && has_digit && has_special {
        Ok(())
    } else {
        Err(rejection())
    }
}

pub fn iso_timestamp(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(text) if DateTime::parse_from_rfc3339(text).is_ok() => Ok(()),
        _ => Err("must be an ISO 8601 timestamp".into()),
    }
}

pub fn iso_date(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(text) if NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok() => Ok(()),
        _ => Err("must be a date in YYYY-MM-DD form".into()),
    }
}

pub fn positive_integer(value: &Value) -> Result<(), String> {
    match as_integer(value) {
        Some(parsed) if parsed > 0 => Ok(()),
        _ => Err("must be a positive integer".into()),
    }
}

pub fn non_negative_integer(value: &Value) -> Result<(), String> {
    match as_integer(value) {
        Some(parsed) if parsed >= 0 => Ok(()),
        _ => Err("must be a non-negative integer".into()),
    }
}

pub fn positive_number(value: &Value) -> Result<(), String> {
    match as_number(value) {
        Some(parsed) if parsed > 0.0 => Ok(()),
        _ => Err("must be a positive number".into()),
    }
}

pub fn non_negative_number(value: &Value) -> Result<(), String> {
    match as_number(value) {
        Some(parsed) if parsed >= 0.0 => Ok(()),
        _ => Err("must be a non-negative number".into()),
    }
}

pub fn transaction_type(value: &Value) -> Result<(), String> {
    one_of(value, &TRANSACTION_TYPES)
}

pub fn promotion_type(value: &Value) -> Result<(), String> {
    one_of(value, &PROMOTION_TYPES)
}

pub fn comparison_operator(value: &Value) -> Result<(), String> {
    one_of(value, &COMPARISON_OPERATORS)
}

pub fn role_name(value: &Value) -> Result<(), String> {
    match value.as_str().and_then(Role::from_str) {
        Some(_) => Ok(()),
        None => Err(format!(
            "must be one of {}",
            Role::ALL.map(|role| role.as_str()).join(", ")
        )),
    }
}

pub fn redemption_type(value: &Value) -> Result<(), String> {
    one_of(value, &["redemption"])
}

pub fn transfer_type(value: &Value) -> Result<(), String> {
    one_of(value, &["transfer"])
}

pub fn event_award_type(value: &Value) -> Result<(), String> {
    one_of(value, &["event"])
}

/// A JSON array of integer ids. Elements go through the same lenient integer
/// coercion as scalar fields.
pub fn id_list(value: &Value) -> Result<(), String> {
    match value.as_array() {
        Some(items) if items.iter().all(|item| as_integer(item).is_some()) => Ok(()),
        _ => Err("must be an array of integer ids".into()),
    }
}
