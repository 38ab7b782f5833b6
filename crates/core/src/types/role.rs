//! Principal roles and privilege levels.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Privilege level attached to a session.
///
/// An absent session always implies [`Role::Guest`]; the backend never
/// issues a token for a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Unauthenticated visitor.
    #[default]
    Guest,
    /// Regular authenticated shopper.
    Customer,
    /// Store administrator.
    Admin,
}

/// Error returned when parsing an unknown role string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid role: {0}. Valid roles: guest, customer, admin")]
pub struct RoleParseError(pub String);

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guest => write!(f, "guest"),
            Self::Customer => write!(f, "customer"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Self::Guest),
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            other => Err(RoleParseError(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display_parse_roundtrip() {
        for role in [Role::Guest, Role::Customer, Role::Admin] {
            let parsed: Role = role.to_string().parse().expect("parse role");
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn test_role_parse_invalid() {
        let err = "superuser".parse::<Role>().unwrap_err();
        assert_eq!(err, RoleParseError("superuser".to_owned()));
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Admin).expect("serialize");
        assert_eq!(json, "\"admin\"");
        let back: Role = serde_json::from_str("\"customer\"").expect("deserialize");
        assert_eq!(back, Role::Customer);
    }

    #[test]
    fn test_role_default_is_guest() {
        assert_eq!(Role::default(), Role::Guest);
    }
}
