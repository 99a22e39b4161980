//! Strongly-typed identifier value objects.
//!
//! Users, communities and plans are owned by collaborators outside this
//! crate and arrive as integer keys. Subscriptions and payments are minted
//! here and use UUIDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Creates a new random SubscriptionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a SubscriptionId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriptionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for a recorded payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(Uuid);

impl PaymentId {
    /// Creates a new random PaymentId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a PaymentId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Defines a positive integer key issued by an external collaborator.
macro_rules! external_key {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates the key, rejecting zero and negative values.
            pub fn new(value: i64) -> Result<Self, ValidationError> {
                if value <= 0 {
                    return Err(ValidationError::invalid_format(
                        $field,
                        format!("must be positive, got {}", value),
                    ));
                }
                Ok(Self(value))
            }

            /// Returns the raw integer value.
            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ValidationError::invalid_format($field, "not an integer"))?;
                Self::new(value)
            }
        }
    };
}

external_key!(
    /// User identifier issued by the account system.
    UserId,
    "user_id"
);

external_key!(
    /// Community identifier.
    CommunityId,
    "community_id"
);

external_key!(
    /// Support plan identifier.
    PlanId,
    "plan_id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_id_generates_unique_values() {
        assert_ne!(SubscriptionId::new(), SubscriptionId::new());
    }

    #[test]
    fn subscription_id_parses_from_valid_string() {
        let id = SubscriptionId::new();
        let parsed: SubscriptionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn subscription_id_serializes_as_bare_uuid() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let json = serde_json::to_string(&SubscriptionId::from_uuid(uuid)).unwrap();
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }

    #[test]
    fn user_id_accepts_positive_values() {
        assert_eq!(UserId::new(3).unwrap().value(), 3);
    }

    #[test]
    fn user_id_rejects_zero_and_negative() {
        assert!(UserId::new(0).is_err());
        assert!(UserId::new(-7).is_err());
    }

    #[test]
    fn community_id_parses_from_path_segment() {
        let id: CommunityId = "42".parse().unwrap();
        assert_eq!(id.value(), 42);
        assert!("abc".parse::<CommunityId>().is_err());
    }

    #[test]
    fn plan_id_displays_raw_value() {
        assert_eq!(PlanId::new(9).unwrap().to_string(), "9");
    }
}
