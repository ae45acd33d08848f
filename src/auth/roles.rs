use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Privilege tiers of the loyalty program, declared in ascending order.
///
/// The declaration order is the canonical ranking; every authorization
/// comparison in the crate goes through it. Derived `Ord` therefore gives the
/// privilege order directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Regular,
    Cashier,
    Manager,
    Superuser,
}

impl Role {
    /// All roles, lowest privilege first.
    pub const ALL: [Role; 4] = [Role::Regular, Role::Cashier, Role::Manager, Role::Superuser];

    /// Parse a role name. Strings outside the enumerated set yield `None`;
    /// matching is exact (role names are stored lowercase).
    pub fn from_str(value: &str) -> Option<Role> {
        match value {
            "regular" => Some(Role::Regular),
            "cashier" => Some(Role::Cashier),
            "manager" => Some(Role::Manager),
            "superuser" => Some(Role::Superuser),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Regular => "regular",
            Role::Cashier => "cashier",
            Role::Manager => "manager",
            Role::Superuser => "superuser",
        }
    }

    /// Position in the privilege order, starting at 0 for `regular`.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn is_at_least(&self, minimum: Role) -> bool {
        *self >= minimum
    }
}

/// String-level privilege comparison for call sites that hold raw role names
/// (token claims, query filters). A name outside the enumerated set never
/// satisfies any minimum, including itself.
pub fn meets_minimum(candidate: &str, minimum: &str) -> bool {
    match (Role::from_str(candidate), Role::from_str(minimum)) {
        (Some(candidate), Some(minimum)) => candidate.is_at_least(minimum),
        _ => false,
    }
}
