use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::validation::validators;

/// A field check, applied to a present, non-null value.
///
/// The primitive variants cover the common JSON types; `Custom` carries a
/// predicate from the validator library. Using an enum here makes an
/// unrecognized check unrepresentable, so the only schema-authoring mistakes
/// left (duplicate fields, duplicate endpoint keys) are caught by panics
/// while the table is built at process start.
#[derive(Clone, Copy)]
pub enum FieldCheck {
    Boolean,
    Integer,
    Number,
    Text,
    Custom(fn(&Value) -> Result<(), String>),
}

impl FieldCheck {
    fn apply(&self, value: &Value) -> Result<(), String> {
        match self {
            FieldCheck::Boolean => validators::boolean(value),
            FieldCheck::Integer => validators::integer(value),
            FieldCheck::Number => validators::number(value),
            FieldCheck::Text => validators::text(value),
            FieldCheck::Custom(predicate) => predicate(value),
        }
    }
}

pub struct FieldRule {
    pub name: &'static str,
    pub required: bool,
    pub check: FieldCheck,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The endpoint key is not in the registry. Mutating and filtering
    /// routes are checked for coverage at startup, so hitting this at
    /// runtime is a server bug, not a client error.
    #[error("no validation schema registered for {0}")]
    UnknownEndpoint(String),
    #[error("unexpected fields: {}", .0.join(", "))]
    UnexpectedFields(Vec<String>),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

/// Whitelist schema for one endpoint: the accepted fields in declaration
/// order, or an explicit accept-anything marker for endpoints that take
/// arbitrary input (none today) or whose lack of constraints has been
/// audited.
pub struct EndpointSchema {
    fields: Vec<FieldRule>,
    accept_any: bool,
}

impl EndpointSchema {
    /// An empty whitelist: no fields are accepted at all. The right schema
    /// for mutating endpoints that take no body.
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            accept_any: false,
        }
    }

    /// Skip validation entirely. Spelled out rather than implied by a missing
    /// table entry so every unconstrained endpoint is visible in the table.
    pub fn accept_anything() -> Self {
        Self {
            fields: Vec::new(),
            accept_any: true,
        }
    }

    pub fn required(self, name: &'static str, check: FieldCheck) -> Self {
        self.field(name, true, check)
    }

    pub fn optional(self, name: &'static str, check: FieldCheck) -> Self {
        self.field(name, false, check)
    }

    fn field(mut self, name: &'static str, required: bool, check: FieldCheck) -> Self {
        assert!(
            !self.accept_any,
            "cannot add field rules to an accept-anything schema"
        );
        assert!(
            self.fields.iter().all(|rule| rule.name != name),
            "duplicate field rule: {name}"
        );
        self.fields.push(FieldRule {
            name,
            required,
            check,
        });
        self
    }

    /// Validate an input object against this schema.
    ///
    /// Order of rejection: undeclared fields first (all of them, listed),
    /// then required/check failures in field declaration order. `null` and
    /// absent are the same thing throughout.
    pub fn validate(&self, input: &Map<String, Value>) -> Result<(), ValidationError> {
        if self.accept_any {
            return Ok(());
        }

        let mut unexpected: Vec<String> = input
            .keys()
            .filter(|name| self.fields.iter().all(|rule| rule.name != name.as_str()))
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            unexpected.sort();
            return Err(ValidationError::UnexpectedFields(unexpected));
        }

        for rule in &self.fields {
            let value = match input.get(rule.name) {
                None | Some(Value::Null) => {
                    if rule.required {
                        return Err(ValidationError::MissingField(rule.name));
                    }
                    continue;
                }
                Some(value) => value,
            };

            if let Err(reason) = rule.check.apply(value) {
                return Err(ValidationError::InvalidField {
                    field: rule.name,
                    reason,
                });
            }
        }

        Ok(())
    }
}

impl Default for EndpointSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// The full endpoint-keyed schema table, keyed `"METHOD /path/template"`
/// (path parameters in Rocket's `<name>` form, query string excluded).
///
/// Built once via [`crate::validation::schemas::build`] and managed as Rocket
/// state. Lookups are fail-closed: a key with no entry is an error, never
/// silent acceptance.
pub struct SchemaRegistry {
    schemas: HashMap<&'static str, EndpointSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    pub fn register(&mut self, key: &'static str, schema: EndpointSchema) {
        let prior = self.schemas.insert(key, schema);
        assert!(prior.is_none(), "duplicate schema registered for {key}");
    }

    pub fn contains(&self, key: &str) -> bool {
        self.schemas.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn validate(&self, key: &str, input: &Map<String, Value>) -> Result<(), ValidationError> {
        let schema = self
            .schemas
            .get(key)
            .ok_or_else(|| ValidationError::UnknownEndpoint(key.to_string()))?;
        schema.validate(input)
    }

    /// Startup coverage check: every mutating route and every route with a
    /// query contract must have a table entry. Returns the keys that are
    /// missing; launch is aborted unless this comes back empty.
    ///
    /// `routes` items are `(method, path, has_query)` with the path template
    /// stripped of its query part.
    pub fn missing_coverage<I>(&self, routes: I) -> Vec<String>
    where
        I: IntoIterator<Item = (String, String, bool)>,
    {
        let mut missing: Vec<String> = routes
            .into_iter()
            .filter_map(|(method, path, has_query)| {
                let mutating = matches!(method.as_str(), "POST" | "PUT" | "PATCH" | "DELETE");
                if !mutating && !has_query {
                    return None;
                }
                let key = format!("{method} {path}");
                if self.contains(&key) { None } else { Some(key) }
            })
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn input(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("test input must be an object, got {other}"),
        }
    }

    fn sample_schema() -> EndpointSchema {
        EndpointSchema::new()
            .required("utorid", FieldCheck::Custom(validators::utorid))
            .required("name", FieldCheck::Text)
            .optional("verified", FieldCheck::Boolean)
    }

    #[test]
    fn accepts_a_conforming_payload() {
        let schema = sample_schema();
        let payload = input(json!({"utorid": "abcd1234", "name": "Ada", "verified": true}));
        assert_eq!(schema.validate(&payload), Ok(()));
    }

    #[test]
    fn rejects_undeclared_fields_listing_all_of_them() {
        let schema = sample_schema();
        let payload = input(json!({
            "utorid": "abcd1234",
            "name": "Ada",
            "points": 5,
            "role": "superuser"
        }));

        assert_eq!(
            schema.validate(&payload),
            Err(ValidationError::UnexpectedFields(vec![
                "points".into(),
                "role".into()
            ]))
        );
    }

    #[test]
    fn undeclared_fields_outrank_other_failures() {
        // Even with a required field missing, the whitelist violation wins.
        let schema = sample_schema();
        let payload = input(json!({"points": 5}));
        assert_eq!(
            schema.validate(&payload),
            Err(ValidationError::UnexpectedFields(vec!["points".into()]))
        );
    }

    #[test]
    fn rejects_missing_required_field_by_name() {
        let schema = sample_schema();
        let payload = input(json!({"utorid": "abcd1234"}));
        assert_eq!(
            schema.validate(&payload),
            Err(ValidationError::MissingField("name"))
        );
    }

    #[test]
    fn null_is_absent() {
        let schema = sample_schema();

        // Null on a required field is the same as omitting it.
        let payload = input(json!({"utorid": "abcd1234", "name": null}));
        assert_eq!(
            schema.validate(&payload),
            Err(ValidationError::MissingField("name"))
        );

        // Null on an optional field passes without running the check.
        let payload = input(json!({"utorid": "abcd1234", "name": "Ada", "verified": null}));
        assert_eq!(schema.validate(&payload), Ok(()));
    }

    #[test]
    fn optional_fields_may_be_omitted_but_not_malformed() {
        let schema = sample_schema();

        let payload = input(json!({"utorid": "abcd1234", "name": "Ada"}));
        assert_eq!(schema.validate(&payload), Ok(()));

        let payload = input(json!({"utorid": "abcd1234", "name": "Ada", "verified": "soon"}));
        assert!(matches!(
            schema.validate(&payload),
            Err(ValidationError::InvalidField {
                field: "verified",
                ..
            })
        ));
    }

    #[test]
    fn failures_follow_declaration_order() {
        let schema = sample_schema();
        // Both utorid and name are bad; utorid is declared first.
        let payload = input(json!({"utorid": "x", "name": 7}));
        assert!(matches!(
            schema.validate(&payload),
            Err(ValidationError::InvalidField { field: "utorid", .. })
        ));
    }

    #[test]
    fn empty_whitelist_rejects_every_field() {
        let schema = EndpointSchema::new();
        assert_eq!(schema.validate(&Map::new()), Ok(()));
        let payload = input(json!({"anything": 1}));
        assert_eq!(
            schema.validate(&payload),
            Err(ValidationError::UnexpectedFields(vec!["anything".into()]))
        );
    }

    #[test]
    fn accept_anything_tolerates_arbitrary_input() {
        let schema = EndpointSchema::accept_anything();
        let payload = input(json!({"whatever": [1, 2, 3], "else": null}));
        assert_eq!(schema.validate(&payload), Ok(()));
    }

    #[test]
    #[should_panic(expected = "duplicate field rule")]
    fn duplicate_field_rule_panics_at_construction() {
        let _ = EndpointSchema::new()
            .required("utorid", FieldCheck::Text)
            .optional("utorid", FieldCheck::Text);
    }

    #[test]
    #[should_panic(expected = "cannot add field rules")]
    fn accept_anything_refuses_field_rules() {
        let _ = EndpointSchema::accept_anything().optional("utorid", FieldCheck::Text);
    }

    #[test]
    #[should_panic(expected = "duplicate schema registered")]
    fn duplicate_endpoint_key_panics_at_registration() {
        let mut registry = SchemaRegistry::new();
        registry.register("POST /things", EndpointSchema::new());
        registry.register("POST /things", EndpointSchema::new());
    }

    #[test]
    fn unknown_endpoint_key_is_an_error_not_a_pass() {
        let registry = SchemaRegistry::new();
        let payload = input(json!({"utorid": "abcd1234"}));
        assert_eq!(
            registry.validate("POST /nowhere", &payload),
            Err(ValidationError::UnknownEndpoint("POST /nowhere".into()))
        );
    }

    #[test]
    fn coverage_check_flags_unregistered_mutating_routes() {
        let mut registry = SchemaRegistry::new();
        registry.register("POST /widgets", EndpointSchema::new());

        let routes = vec![
            ("POST".to_string(), "/widgets".to_string(), false),
            ("GET".to_string(), "/widgets/<id>".to_string(), false),
            ("DELETE".to_string(), "/widgets/<id>".to_string(), false),
            ("GET".to_string(), "/widgets".to_string(), true),
        ];

        assert_eq!(
            registry.missing_coverage(routes),
            vec!["DELETE /widgets/<id>".to_string(), "GET /widgets".to_string()]
        );
    }

    #[test]
    fn coverage_check_exempts_plain_reads() {
        let registry = SchemaRegistry::new();
        let routes = vec![
            ("GET".to_string(), "/health".to_string(), false),
            ("OPTIONS".to_string(), "/<catchall..>".to_string(), false),
        ];
        assert!(registry.missing_coverage(routes).is_empty());
    }
}
