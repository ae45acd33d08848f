//! Request input plumbing shared by route handlers.
//!
//! Bodies and query strings are validated against the endpoint schema table
//! before any handler logic runs, so the readers here assume a map that has
//! already been checked and mirror the coercions the field checks apply.

use rocket::form::{self, DataField, FromForm, Options, ValueField};
use schemars::JsonSchema;
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Uninterpreted query string, captured as a JSON object so list filters run
/// through the same whitelist schemas as request bodies. Every value arrives
/// as a string; the schema checks do their own coercion. When a key repeats,
/// the last occurrence wins.
#[derive(Debug, Default, Clone, JsonSchema)]
pub struct RawQuery(pub Map<String, Value>);

#[rocket::async_trait]
impl<'r> FromForm<'r> for RawQuery {
    type Context = Map<String, Value>;

    fn init(_opts: Options) -> Self::Context {
        Map::new()
    }

    fn push_value(ctxt: &mut Self::Context, field: ValueField<'r>) {
        ctxt.insert(
            field.name.source().as_str().to_string(),
            Value::String(field.value.to_string()),
        );
    }

    async fn push_data(_ctxt: &mut Self::Context, _field: DataField<'r, '_>) {}

    fn finalize(ctxt: Self::Context) -> form::Result<'r, Self> {
        Ok(RawQuery(ctxt))
    }
}

/// Borrow the body as a JSON object, rejecting arrays, scalars, and null.
pub fn object_body(payload: &Value) -> Result<&Map<String, Value>, ApiError> {
    payload
        .as_object()
        .ok_or_else(|| ApiError::BadRequest("request body must be a JSON object".to_string()))
}

/// Read an optional string field. Null and absent are both `None`.
pub fn text_field(map: &Map<String, Value>, name: &str) -> Option<String> {
    match map.get(name) {
        Some(Value::String(text)) => Some(text.clone()),
        _ => None,
    }
}

/// Read an optional boolean, accepting the string spellings query values use.
pub fn bool_field(map: &Map<String, Value>, name: &str) -> Option<bool> {
    match map.get(name)? {
        Value::Bool(value) => Some(*value),
        Value::String(text) if text == "true" => Some(true),
        Value::String(text) if text == "false" => Some(false),
        _ => None,
    }
}

/// Read an optional integer, accepting numeric strings.
pub fn int_field(map: &Map<String, Value>, name: &str) -> Option<i64> {
    match map.get(name)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rocket::form::Form;
    use serde_json::json;

    use super::*;

    #[test]
    fn captures_every_query_pair_as_text() {
        let parsed: RawQuery = Form::parse("role=cashier&verified=true&page=2").unwrap();
        assert_eq!(parsed.0.len(), 3);
        assert_eq!(parsed.0["role"], json!("cashier"));
        assert_eq!(parsed.0["verified"], json!("true"));
        assert_eq!(parsed.0["page"], json!("2"));
    }

    #[test]
    fn empty_query_yields_empty_map() {
        let parsed: RawQuery = Form::parse("").unwrap();
        assert!(parsed.0.is_empty());
    }

    #[test]
    fn repeated_keys_keep_the_last_value() {
        let parsed: RawQuery = Form::parse("page=1&page=4").unwrap();
        assert_eq!(parsed.0["page"], json!("4"));
    }

    #[test]
    fn readers_coerce_like_the_schema_checks() {
        let map = match json!({
            "name": "Ada",
            "verified": "true",
            "suspicious": false,
            "page": "3",
            "limit": 25,
            "birthday": null
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        assert_eq!(text_field(&map, "name").as_deref(), Some("Ada"));
        assert_eq!(text_field(&map, "birthday"), None);
        assert_eq!(text_field(&map, "absent"), None);
        assert_eq!(bool_field(&map, "verified"), Some(true));
        assert_eq!(bool_field(&map, "suspicious"), Some(false));
        assert_eq!(int_field(&map, "page"), Some(3));
        assert_eq!(int_field(&map, "limit"), Some(25));
        assert_eq!(int_field(&map, "name"), None);
    }

    #[test]
    fn object_body_rejects_non_objects() {
        assert!(object_body(&json!({"a": 1})).is_ok());
        assert!(object_body(&json!([1, 2])).is_err());
        assert!(object_body(&json!("text")).is_err());
        assert!(object_body(&json!(null)).is_err());
    }
}
