//! HTTP route handlers grouped by resource domain.
//!
//! Each submodule exposes typed Rocket handlers annotated with `#[openapi]`
//! so `rocket_okapi` can derive an OpenAPI document automatically. Request
//! bodies and list filters clear the endpoint whitelist schemas before any
//! handler logic runs.

pub mod health;
pub mod params;
pub mod users;
