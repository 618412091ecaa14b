//! Invariant checks over the cache, the matcher, and the dispatcher.

use crate::*;
use cairn_core::addr::{matches, matching_bits};
use cairn_core::extract_id;
use cairn_core::fingerprint::fingerprint;
use cairn_core::packet::PRIORITY_DEFAULT;
use cairn_services::cache::{PacketCache, RejectReason};
use cairn_services::Outbox;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// xorshift64 — deterministic pseudo-random bytes for property sweeps.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn address(&mut self) -> [u8; ADDRESS_SIZE] {
        self.next().to_le_bytes()
    }

    fn id(&mut self) -> [u8; MESSAGE_ID_SIZE] {
        let mut id = [0u8; MESSAGE_ID_SIZE];
        id[..8].copy_from_slice(&self.next().to_le_bytes());
        id[8..].copy_from_slice(&self.next().to_le_bytes());
        id
    }
}

#[test]
fn save_then_lookup_returns_the_same_buffer() {
    let mut rng = Rng(0x1234_5678_9ABC_DEF0);
    let mut cache = PacketCache::new(64, Box::new(|_| {}));

    for _ in 0..32 {
        let bytes = data_packet(&rng.address(), &rng.address(), 64, rng.id());
        let id = extract_id(&bytes).copied().unwrap();
        cache.add(bytes.clone()).unwrap();
        assert_eq!(cache.get(&id).unwrap().bytes(), &bytes[..]);

        // a second save is a duplicate and the stored copy is unchanged
        let rejected = cache.add(bytes.clone()).unwrap_err();
        assert_eq!(rejected.reason, RejectReason::Duplicate);
        assert_eq!(cache.get(&id).unwrap().bytes(), &bytes[..]);
    }
}

#[test]
fn filling_the_cache_evicts_exactly_once() {
    let capacity = 16;
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let mut cache = PacketCache::new(
        capacity,
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let mut rng = Rng(0xFEED_FACE_CAFE_BEEF);
    for _ in 0..capacity {
        cache
            .add(data_packet(&rng.address(), &rng.address(), 64, rng.id()))
            .unwrap();
    }
    assert_eq!(cache.len(), capacity - 1);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn matching_bits_identity_bound_and_symmetry() {
    let mut rng = Rng(0x0DDB_A11_5EED);
    for _ in 0..200 {
        let a = rng.address();
        let b = rng.address();
        let a_n = (rng.next() % 65) as u8;
        let b_n = (rng.next() % 65) as u8;

        assert_eq!(matching_bits(&a, a_n, &a, a_n), a_n);
        assert!(matching_bits(&a, a_n, &b, b_n) <= a_n.min(b_n));
        assert_eq!(
            matching_bits(&a, a_n, &b, b_n),
            matching_bits(&b, b_n, &a, a_n)
        );
        assert!(matches(&a, 0, &b, b_n));
    }
}

#[test]
fn zero_bit_request_returns_every_live_entry() {
    let (mut dispatcher, _) = counting_dispatcher(32);
    let mut out = Outbox::new();
    let mut rng = Rng(0xABCD_EF01_2345_6789);

    let stored = 10;
    for _ in 0..stored {
        dispatcher
            .handle_frame(
                data_packet(&rng.address(), &rng.address(), 64, rng.id()),
                PRIORITY_DEFAULT,
                &mut out,
            )
            .unwrap();
    }
    dispatcher
        .handle_frame(data_request(&rng.address(), 0), PRIORITY_DEFAULT, &mut out)
        .unwrap();
    assert_eq!(out.take().len(), stored);
}

#[test]
fn only_the_matching_token_removes_a_packet() {
    let (mut dispatcher, released) = counting_dispatcher(16);
    let mut out = Outbox::new();

    let token = [0x0Fu8; MESSAGE_ID_SIZE];
    let stored_id = fingerprint(&token);
    dispatcher
        .handle_frame(
            data_packet(&addr(&[0xAA]), &addr(&[0xBB]), 64, stored_id),
            PRIORITY_DEFAULT,
            &mut out,
        )
        .unwrap();

    // a token whose fingerprint names nothing stored
    dispatcher
        .handle_frame(ack_packet(&[[0xF0; MESSAGE_ID_SIZE]]), PRIORITY_DEFAULT, &mut out)
        .unwrap();
    assert!(dispatcher.cache().contains(&stored_id));
    assert_eq!(released.load(Ordering::SeqCst), 0);

    // the right token removes it
    dispatcher
        .handle_frame(ack_packet(&[token]), PRIORITY_DEFAULT, &mut out)
        .unwrap();
    assert!(!dispatcher.cache().contains(&stored_id));
    assert_eq!(released.load(Ordering::SeqCst), 1);
}
