//! Partition selection: a pure function of event type and payload key.
//!
//! Partitions are split in half by parity. Even partitions carry the wallet
//! event family keyed by user id, odd partitions carry the payment event
//! family keyed by payment id. The split isolates wallet stream processing
//! from payment stream processing while keeping per-key ordering: debits
//! and credits for one user always land on one partition, and all gateway
//! traffic for one payment always lands on one partition.

use domain::Event;

use crate::error::{EventBusError, Result};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of a key string.
fn hash_key(key: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn is_wallet_event(event_type: &str) -> bool {
    matches!(
        event_type,
        "WalletPaymentRequested"
            | "FundsDebited"
            | "FundsCredited"
            | "FundsInsufficient"
            | "WalletPaymentCompleted"
            | "WalletPaymentFailed"
    )
}

fn is_payment_event(event_type: &str) -> bool {
    matches!(
        event_type,
        "ExternalPaymentRequested"
            | "PaymentSentToGateway"
            | "PaymentGatewayResponse"
            | "ExternalPaymentCompleted"
            | "ExternalPaymentFailed"
            | "PaymentGatewayTimeout"
            | "PaymentRetryRequested"
    )
}

/// Chooses the partition for an event on a topic with `num_partitions`
/// partitions.
///
/// Events outside both families (unknown types) go to partition 0.
pub fn partition_for(event: &Event, num_partitions: usize) -> Result<usize> {
    if num_partitions < 2 {
        return Err(EventBusError::InvalidPartitionCount(num_partitions));
    }

    let half = num_partitions / 2;
    let event_type = event.event_type();

    if is_wallet_event(event_type) {
        let key = match event.payload.user_id() {
            Some(user_id) => user_id.to_string(),
            None => event
                .payload
                .payment_id()
                .map(|id| id.to_string())
                .ok_or_else(|| EventBusError::Partition {
                    event_type: event_type.to_string(),
                    reason: "missing user_id and payment_id".to_string(),
                })?,
        };
        let slot = hash_key(&key) as usize % half;
        return Ok(slot * 2);
    }

    if is_payment_event(event_type) {
        let key = event
            .payload
            .payment_id()
            .map(|id| id.to_string())
            .ok_or_else(|| EventBusError::Partition {
                event_type: event_type.to_string(),
                reason: "missing payment_id".to_string(),
            })?;
        let slot = hash_key(&key) as usize % half;
        return Ok(slot * 2 + 1);
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{EventMetadata, PaymentId, SagaId, UserId};
    use domain::Money;
    use std::collections::HashMap;

    fn wallet_request(user: &str) -> Event {
        Event::wallet_payment_requested(
            PaymentId::new(),
            SagaId::new(),
            UserId::new(user),
            "svc_1",
            Money::from_cents(100),
            "USD",
            HashMap::new(),
            EventMetadata::new(),
        )
    }

    fn external_request() -> Event {
        Event::external_payment_requested(
            PaymentId::new(),
            SagaId::new(),
            UserId::new("user_1"),
            "svc_1",
            Money::from_cents(100),
            "USD",
            "tok",
            HashMap::new(),
            EventMetadata::new(),
        )
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        // Standard FNV-1a 32-bit test vectors.
        assert_eq!(hash_key(""), 0x811c_9dc5);
        assert_eq!(hash_key("a"), 0xe40c_292c);
        assert_eq!(hash_key("foobar"), 0xbf9c_f968);
    }

    #[test]
    fn wallet_events_land_on_even_partitions() {
        for user in ["user_1", "user_2", "user_3", "alice", "bob"] {
            let partition = partition_for(&wallet_request(user), 12).unwrap();
            assert_eq!(partition % 2, 0, "user {user} got partition {partition}");
            assert!(partition < 12);
        }
    }

    #[test]
    fn payment_events_land_on_odd_partitions() {
        for _ in 0..5 {
            let partition = partition_for(&external_request(), 12).unwrap();
            assert_eq!(partition % 2, 1);
            assert!(partition < 12);
        }
    }

    #[test]
    fn same_user_always_hashes_to_the_same_partition() {
        let a = partition_for(&wallet_request("user_42"), 12).unwrap();
        let b = partition_for(&wallet_request("user_42"), 12).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn same_payment_pins_its_gateway_stream() {
        let payment_id = PaymentId::new();
        let saga_id = SagaId::new();
        let sent = Event::payment_sent_to_gateway(
            payment_id,
            saga_id,
            "external",
            "gw",
            EventMetadata::new(),
        );
        let response = Event::payment_gateway_response(
            payment_id,
            saga_id,
            "external",
            "SUCCESS",
            "txn",
            EventMetadata::new(),
        );

        assert_eq!(
            partition_for(&sent, 12).unwrap(),
            partition_for(&response, 12).unwrap()
        );
    }

    #[test]
    fn too_few_partitions_is_rejected() {
        let err = partition_for(&wallet_request("user_1"), 1).unwrap_err();
        assert!(matches!(err, EventBusError::InvalidPartitionCount(1)));
    }
}
