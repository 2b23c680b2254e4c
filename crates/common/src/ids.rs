use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key under which events are stored and partitioned.
///
/// Payment-aggregate events use the payment id as their key; wallet-aggregate
/// events use the user id. The log and the bus only ever see this string key,
/// so the type is deliberately not a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(String);

impl AggregateId {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AggregateId {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for AggregateId {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a single event record.
    EventId
}

uuid_id! {
    /// Identifier for a payment; doubles as the aggregate key of the
    /// payment event stream.
    PaymentId
}

uuid_id! {
    /// Identifier for a saga instance, distinct from the payment id.
    SagaId
}

impl From<PaymentId> for AggregateId {
    fn from(id: PaymentId) -> Self {
        AggregateId::new(id.to_string())
    }
}

/// Identifier of a wallet owner; the aggregate key of the wallet stream.
///
/// User ids come from an external identity system and are opaque strings
/// (`"user_123"`), not UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<UserId> for AggregateId {
    fn from(id: UserId) -> Self {
        AggregateId::new(id.0)
    }
}

impl From<&UserId> for AggregateId {
    fn from(id: &UserId) -> Self {
        AggregateId::new(id.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_ids_are_unique() {
        assert_ne!(PaymentId::new(), PaymentId::new());
    }

    #[test]
    fn aggregate_id_roundtrips_through_serde() {
        let id = AggregateId::new("user_123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"user_123\"");
        let back: AggregateId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn payment_id_converts_to_aggregate_key() {
        let payment_id = PaymentId::new();
        let key: AggregateId = payment_id.into();
        assert_eq!(key.as_str(), payment_id.to_string());
    }

    #[test]
    fn user_id_preserves_raw_string() {
        let user: UserId = "user_456".into();
        let key: AggregateId = (&user).into();
        assert_eq!(key.as_str(), "user_456");
    }
}
