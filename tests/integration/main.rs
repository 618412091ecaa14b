//! Cairn integration test harness.
//!
//! Everything runs in-process: the dispatchers are driven through the same
//! framed-channel contract the daemons use, either directly via an Outbox
//! or over a real Unix socket pair with the frame codec in between.

mod channel_loop;
mod properties;

pub use cairn_core::packet::{MessageType, PacketBuilder, ADDRESS_SIZE, MESSAGE_ID_SIZE};
pub use cairn_services::cache::PacketCache;
pub use cairn_services::CacheDispatcher;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An address with the given leading bytes, zero-padded to full width.
pub fn addr(leading: &[u8]) -> [u8; ADDRESS_SIZE] {
    let mut out = [0u8; ADDRESS_SIZE];
    out[..leading.len()].copy_from_slice(leading);
    out
}

/// A DATA packet carrying a message ID, from `src` (full width) to `dst`.
pub fn data_packet(
    src: &[u8; ADDRESS_SIZE],
    dst: &[u8; ADDRESS_SIZE],
    dst_nbits: u8,
    id: [u8; MESSAGE_ID_SIZE],
) -> Vec<u8> {
    PacketBuilder::new(MessageType::Data, src, 64, dst, dst_nbits)
        .message_id(id)
        .payload(id[..4].to_vec())
        .build()
}

/// A DATA_REQ from `src` with the given prefix length.
pub fn data_request(src: &[u8; ADDRESS_SIZE], src_nbits: u8) -> Vec<u8> {
    PacketBuilder::new(
        MessageType::DataReq,
        src,
        src_nbits,
        &[0u8; ADDRESS_SIZE],
        0,
    )
    .build()
}

/// An ACK carrying the given tokens, addressed back toward the sender.
pub fn ack_packet(tokens: &[[u8; MESSAGE_ID_SIZE]]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(tokens.len() * MESSAGE_ID_SIZE);
    for token in tokens {
        payload.extend_from_slice(token);
    }
    PacketBuilder::new(
        MessageType::Ack,
        &addr(&[0xBB]),
        64,
        &addr(&[0xAA]),
        64,
    )
    .payload(payload)
    .build()
}

/// A dispatcher over a cache of `capacity` slots whose release calls are
/// counted.
pub fn counting_dispatcher(capacity: usize) -> (CacheDispatcher, Arc<AtomicUsize>) {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let cache = PacketCache::new(
        capacity,
        Box::new(move |_entry| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    (CacheDispatcher::with_cache(cache), released)
}
