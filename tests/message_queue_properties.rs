//! Property-based coverage of the message queue's FIFO ordering invariant
//! (§4.2, §10.4), using `proptest`-generated payload sizes rather than
//! example-based unit tests.

use ccmp::domain::message::{now_ms, CustomHeaders, EffortLevel, MessageParams};
use ccmp::domain::{Message, MessageType, ParticipantId};
use ccmp::message_queue::{MessageQueue, MessageQueueCaps};
use proptest::prelude::*;

prop_compose! {
    fn arb_payload_sizes()(sizes in prop::collection::vec(1usize..256, 1..50)) -> Vec<usize> {
        sizes
    }
}

fn message_for(recipient: ParticipantId, payload_size: usize) -> Message {
    Message::try_new(MessageParams {
        sender: ParticipantId::generate(),
        recipient,
        message_type: MessageType::OneWay,
        expiry_ms: now_ms() + 60_000,
        effort: EffortLevel::Normal,
        reply_to: None,
        headers: CustomHeaders::new(),
        encrypt: false,
        compress: false,
        payload: vec![0u8; payload_size],
    })
    .unwrap()
}

proptest! {
    /// With caps generous enough that nothing is ever evicted, dequeuing a
    /// single recipient's queue returns its messages in the same order they
    /// were enqueued.
    #[test]
    fn dequeue_preserves_enqueue_order(sizes in arb_payload_sizes()) {
        let queue = MessageQueue::new(MessageQueueCaps {
            global_byte_cap: 10 * 1024 * 1024,
            global_count_cap: 10_000,
            per_key_count_cap: 10_000,
        });
        let recipient = ParticipantId::generate();
        let message_ids: Vec<_> = sizes
            .iter()
            .map(|&size| {
                let message = message_for(recipient, size);
                let id = message.message_id();
                queue.enqueue(recipient, message);
                id
            })
            .collect();

        let mut dequeued_ids = Vec::new();
        while let Some(message) = queue.dequeue(recipient) {
            dequeued_ids.push(message.message_id());
        }

        prop_assert_eq!(dequeued_ids, message_ids);
    }

    /// Draining a recipient returns exactly what enqueue put there, in
    /// order, and leaves the queue empty for that key afterward.
    #[test]
    fn drain_returns_enqueue_order_and_empties_the_key(sizes in arb_payload_sizes()) {
        let queue = MessageQueue::new(MessageQueueCaps {
            global_byte_cap: 10 * 1024 * 1024,
            global_count_cap: 10_000,
            per_key_count_cap: 10_000,
        });
        let recipient = ParticipantId::generate();
        let message_ids: Vec<_> = sizes
            .iter()
            .map(|&size| {
                let message = message_for(recipient, size);
                let id = message.message_id();
                queue.enqueue(recipient, message);
                id
            })
            .collect();

        let drained_ids: Vec<_> = queue.drain(recipient).iter().map(Message::message_id).collect();
        prop_assert_eq!(drained_ids, message_ids);
        prop_assert!(queue.dequeue(recipient).is_none());
    }

    /// Two recipients' queues never interleave or steal each other's
    /// messages regardless of enqueue order between them.
    #[test]
    fn separate_recipients_stay_independent(
        sizes_a in arb_payload_sizes(),
        sizes_b in arb_payload_sizes(),
    ) {
        let queue = MessageQueue::new(MessageQueueCaps {
            global_byte_cap: 10 * 1024 * 1024,
            global_count_cap: 10_000,
            per_key_count_cap: 10_000,
        });
        let a = ParticipantId::generate();
        let b = ParticipantId::generate();

        let ids_a: Vec<_> = sizes_a
            .iter()
            .map(|&size| {
                let message = message_for(a, size);
                let id = message.message_id();
                queue.enqueue(a, message);
                id
            })
            .collect();
        let ids_b: Vec<_> = sizes_b
            .iter()
            .map(|&size| {
                let message = message_for(b, size);
                let id = message.message_id();
                queue.enqueue(b, message);
                id
            })
            .collect();

        let mut dequeued_a = Vec::new();
        while let Some(message) = queue.dequeue(a) {
            dequeued_a.push(message.message_id());
        }
        let mut dequeued_b = Vec::new();
        while let Some(message) = queue.dequeue(b) {
            dequeued_b.push(message.message_id());
        }

        prop_assert_eq!(dequeued_a, ids_a);
        prop_assert_eq!(dequeued_b, ids_b);
    }
}
