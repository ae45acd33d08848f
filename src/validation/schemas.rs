//! The endpoint schema table for the whole program API.
//!
//! One entry per endpoint, keyed `"METHOD /path/template"` with path
//! parameters in `<name>` form. Absence from this table is a server error at
//! lookup time and (for mutating or filtering routes) a launch failure, so
//! adding an endpoint without deciding its accepted fields is impossible.
//! Endpoints that genuinely take no input get an empty whitelist; endpoints
//! whose input is deliberately unconstrained say so with `accept_anything`.

use crate::validation::rules::FieldCheck::{Boolean, Custom, Integer, Number, Text};
use crate::validation::rules::{EndpointSchema, SchemaRegistry};
use crate::validation::validators;

/// Build the registry. Panics on authoring mistakes (duplicate keys or
/// fields), which surface on the first test run or launch.
pub fn build() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();

    // Authentication and password resets.
    registry.register(
        "POST /auth/tokens",
        EndpointSchema::new()
            .required("utorid", Custom(validators::non_empty_text))
            .required("password", Custom(validators::non_empty_text)),
    );
    registry.register(
        "POST /auth/resets",
        EndpointSchema::new().required("utorid", Custom(validators::non_empty_text)),
    );
    registry.register(
        "POST /auth/resets/<reset_token>",
        EndpointSchema::new()
            .required("utorid", Custom(validators::non_empty_text))
            .required("password", Custom(validators::password_complexity)),
    );

    // Users.
    registry.register(
        "POST /users",
        EndpointSchema::new()
            .required("utorid", Custom(validators::utorid))
            .required("name", Custom(validators::person_name))
            .required("email", Custom(validators::institutional_email)),
    );
    registry.register(
        "GET /users",
        EndpointSchema::new()
            .optional("name", Text)
            .optional("role", Custom(validators::role_name))
            .optional("verified", Boolean)
            .optional("activated", Boolean)
            .optional("page", Custom(validators::positive_integer))
            .optional("limit", Custom(validators::positive_integer)),
    );
    registry.register("GET /users/me", EndpointSchema::accept_anything());
    registry.register("GET /users/<user_id>", EndpointSchema::accept_anything());
    registry.register(
        "PATCH /users/<user_id>",
        EndpointSchema::new()
            .optional("email", Custom(validators::institutional_email))
            .optional("verified", Boolean)
            .optional("suspicious", Boolean)
            .optional("role", Custom(validators::role_name)),
    );
    registry.register(
        "PATCH /users/me",
        EndpointSchema::new()
            .optional("name", Custom(validators::person_name))
            .optional("email", Custom(validators::institutional_email))
            .optional("birthday", Custom(validators::iso_date)),
    );
    registry.register(
        "PATCH /users/me/password",
        EndpointSchema::new()
            .required("old", Custom(validators::non_empty_text))
            .required("new", Custom(validators::password_complexity)),
    );

    // Transactions.
    registry.register(
        "POST /transactions",
        EndpointSchema::new()
            .required("utorid", Custom(validators::utorid))
            .required("type", Custom(validators::transaction_type))
            .optional("spent", Custom(validators::positive_number))
            .optional("amount", Number)
            .optional("relatedId", Integer)
            .optional("promotionIds", Custom(validators::id_list))
            .optional("remark", Text),
    );
    registry.register(
        "GET /transactions",
        EndpointSchema::new()
            .optional("name", Text)
            .optional("createdBy", Text)
            .optional("suspicious", Boolean)
            .optional("promotionId", Custom(validators::positive_integer))
            .optional("type", Custom(validators::transaction_type))
            .optional("relatedId", Integer)
            .optional("amount", Integer)
            .optional("operator", Custom(validators::comparison_operator))
            .optional("page", Custom(validators::positive_integer))
            .optional("limit", Custom(validators::positive_integer)),
    );
    registry.register(
        "GET /transactions/<transaction_id>",
        EndpointSchema::accept_anything(),
    );
    registry.register(
        "PATCH /transactions/<transaction_id>/suspicious",
        EndpointSchema::new().required("suspicious", Boolean),
    );
    registry.register(
        "POST /users/me/transactions",
        EndpointSchema::new()
            .required("type", Custom(validators::redemption_type))
            .required("amount", Custom(validators::positive_integer))
            .optional("remark", Text),
    );
    registry.register(
        "GET /users/me/transactions",
        EndpointSchema::new()
            .optional("type", Custom(validators::transaction_type))
            .optional("relatedId", Integer)
            .optional("promotionId", Custom(validators::positive_integer))
            .optional("amount", Integer)
            .optional("operator", Custom(validators::comparison_operator))
            .optional("page", Custom(validators::positive_integer))
            .optional("limit", Custom(validators::positive_integer)),
    );
    registry.register(
        "POST /users/<user_id>/transactions",
        EndpointSchema::new()
            .required("type", Custom(validators::transfer_type))
            .required("amount", Custom(validators::positive_integer))
            .optional("remark", Text),
    );

    // Events.
    registry.register(
        "POST /events",
        EndpointSchema::new()
            .required("name", Custom(validators::non_empty_text))
            .required("description", Custom(validators::non_empty_text))
            .required("location", Custom(validators::non_empty_text))
            .required("startTime", Custom(validators::iso_timestamp))
            .required("endTime", Custom(validators::iso_timestamp))
            .optional("capacity", Custom(validators::positive_integer))
            .required("points", Custom(validators::positive_integer)),
    );
    registry.register(
        "GET /events",
        EndpointSchema::new()
            .optional("name", Text)
            .optional("location", Text)
            .optional("started", Boolean)
            .optional("ended", Boolean)
            .optional("showFull", Boolean)
            .optional("published", Boolean)
            .optional("page", Custom(validators::positive_integer))
            .optional("limit", Custom(validators::positive_integer)),
    );
    registry.register("GET /events/<event_id>", EndpointSchema::accept_anything());
    registry.register(
        "PATCH /events/<event_id>",
        EndpointSchema::new()
            .optional("name", Custom(validators::non_empty_text))
            .optional("description", Custom(validators::non_empty_text))
            .optional("location", Custom(validators::non_empty_text))
            .optional("startTime", Custom(validators::iso_timestamp))
            .optional("endTime", Custom(validators::iso_timestamp))
            .optional("capacity", Custom(validators::positive_integer))
            .optional("points", Custom(validators::positive_integer))
            .optional("published", Boolean),
    );
    registry.register("DELETE /events/<event_id>", EndpointSchema::new());
    registry.register(
        "POST /events/<event_id>/organizers",
        EndpointSchema::new().required("utorid", Custom(validators::utorid)),
    );
    registry.register(
        "DELETE /events/<event_id>/organizers/<user_id>",
        EndpointSchema::new(),
    );
    registry.register(
        "POST /events/<event_id>/guests",
        EndpointSchema::new().required("utorid", Custom(validators::utorid)),
    );
    registry.register(
        "DELETE /events/<event_id>/guests/<user_id>",
        EndpointSchema::new(),
    );
    registry.register("POST /events/<event_id>/guests/me", EndpointSchema::new());
    registry.register("DELETE /events/<event_id>/guests/me", EndpointSchema::new());
    registry.register(
        "POST /events/<event_id>/transactions",
        EndpointSchema::new()
            .required("type", Custom(validators::event_award_type))
            .optional("utorid", Custom(validators::utorid))
            .required("amount", Custom(validators::positive_integer))
            .optional("remark", Text),
    );

    // Promotions.
    registry.register(
        "POST /promotions",
        EndpointSchema::new()
            .required("name", Custom(validators::non_empty_text))
            .required("description", Custom(validators::non_empty_text))
            .required("type", Custom(validators::promotion_type))
            .required("startTime", Custom(validators::iso_timestamp))
            .required("endTime", Custom(validators::iso_timestamp))
            .optional("minSpending", Custom(validators::positive_number))
            .optional("rate", Custom(validators::positive_number))
            .optional("points", Custom(validators::positive_integer)),
    );
    registry.register(
        "GET /promotions",
        EndpointSchema::new()
            .optional("name", Text)
            .optional("type", Custom(validators::promotion_type))
            .optional("started", Boolean)
            .optional("ended", Boolean)
            .optional("page", Custom(validators::positive_integer))
            .optional("limit", Custom(validators::positive_integer)),
    );
    registry.register(
        "GET /promotions/<promotion_id>",
        EndpointSchema::accept_anything(),
    );
    registry.register(
        "PATCH /promotions/<promotion_id>",
        EndpointSchema::new()
            .optional("name", Custom(validators::non_empty_text))
            .optional("description", Custom(validators::non_empty_text))
            .optional("type", Custom(validators::promotion_type))
            .optional("startTime", Custom(validators::iso_timestamp))
            .optional("endTime", Custom(validators::iso_timestamp))
            .optional("minSpending", Custom(validators::positive_number))
            .optional("rate", Custom(validators::positive_number))
            .optional("points", Custom(validators::positive_integer)),
    );
    registry.register("DELETE /promotions/<promotion_id>", EndpointSchema::new());

    registry
}
