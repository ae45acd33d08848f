//! Declarative request validation.
//!
//! Every endpoint in the program declares a whitelist schema: an ordered list
//! of accepted fields, each with a required flag and a check. Input carrying
//! any undeclared field is rejected outright, which closes mass-assignment
//! style injection into downstream persistence calls. Schemas are plain data,
//! built once at process start and never mutated.

pub mod rules;
pub mod schemas;
pub mod validators;

pub use rules::{EndpointSchema, FieldCheck, FieldRule, SchemaRegistry, ValidationError};
