//! Cache dispatcher — classifies each inbound frame and drives the cache.
//!
//! Data requests are answered out of the cache; acks delete what they
//! acknowledge; everything else is a candidate for storage. A frame's
//! buffer belongs to the dispatcher until the cache accepts it; if the
//! cache refuses, the buffer dies at the end of the iteration.
//!
//! Per-packet problems are logged and absorbed — the loop keeps going.
//! Only channel errors escape, and they end the process.

use cairn_core::addr;
use cairn_core::fingerprint::fingerprint;
use cairn_core::packet::{transport, MessageType, Packet, MESSAGE_ID_SIZE, PRIORITY_CACHE_RESPONSE};

use crate::cache::{PacketCache, RejectReason, CACHE_CAPACITY};
use crate::channel::{ChannelError, FrameSink};

pub struct CacheDispatcher {
    cache: PacketCache,
}

impl Default for CacheDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheDispatcher {
    /// A dispatcher over a default-capacity cache whose release path just
    /// drops the buffer.
    pub fn new() -> Self {
        Self::with_cache(PacketCache::new(
            CACHE_CAPACITY,
            Box::new(|entry| {
                tracing::trace!(len = entry.len(), "released cached packet");
            }),
        ))
    }

    pub fn with_cache(cache: PacketCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &PacketCache {
        &self.cache
    }

    /// Handle one inbound frame from AD.
    pub fn handle_frame(
        &mut self,
        bytes: Vec<u8>,
        _priority: u32,
        out: &mut dyn FrameSink,
    ) -> Result<(), ChannelError> {
        let (message_type, no_cache) = match Packet::parse(&bytes) {
            Ok(packet) => (
                packet.message_type(),
                packet.transport() & transport::DO_NOT_CACHE != 0,
            ),
            Err(e) => {
                tracing::debug!(len = bytes.len(), error = %e, "ignoring malformed packet");
                return Ok(());
            }
        };

        if message_type == Some(MessageType::DataReq) {
            // answer out of the cache; the request itself is never stored
            let sent = self.respond(&bytes, out)?;
            tracing::debug!(sent, "data request handled");
            return Ok(());
        }

        if message_type == Some(MessageType::Ack) {
            self.ack(&bytes);
        }
        if no_cache {
            tracing::debug!("packet flagged do-not-cache, not saving");
            return Ok(());
        }
        self.save(bytes);
        Ok(())
    }

    /// Store a packet, taking ownership. Refusals drop the buffer here.
    fn save(&mut self, bytes: Vec<u8>) {
        let len = bytes.len();
        match self.cache.add(bytes) {
            Ok(()) => {
                tracing::debug!(len, live = self.cache.len(), "saved packet");
            }
            Err(rejected) => {
                match rejected.reason {
                    RejectReason::NoId => {
                        tracing::debug!(len, "packet has no id, not saving");
                    }
                    RejectReason::Duplicate => {
                        tracing::debug!(len, "packet already cached, not saving");
                    }
                    RejectReason::NoFreeSlot => {
                        tracing::error!(len, "cache refused packet: no free slot");
                    }
                }
                // rejected.bytes dropped here: the dispatcher releases
                // what the cache declined
            }
        }
    }

    /// Emit every stored packet whose destination prefix matches the
    /// requester's source prefix. Candidates stay cached. Returns whether
    /// anything was sent.
    fn respond(&self, request: &[u8], out: &mut dyn FrameSink) -> Result<bool, ChannelError> {
        let Ok(req) = Packet::parse(request) else {
            return Ok(false);
        };
        let candidates = self.cache.all_matches(|entry| {
            let Ok(stored) = Packet::parse(entry.bytes()) else {
                return false;
            };
            addr::matches(
                req.source(),
                req.src_nbits(),
                stored.destination(),
                stored.dst_nbits(),
            )
        });
        for entry in &candidates {
            tracing::debug!(len = entry.len(), "sending cached response");
            out.send(entry.bytes(), PRIORITY_CACHE_RESPONSE)?;
        }
        Ok(!candidates.is_empty())
    }

    /// Delete every stored packet named by the ack's tokens. Each token's
    /// fingerprint is the stored packet's ID.
    fn ack(&mut self, bytes: &[u8]) {
        let Ok(packet) = Packet::parse(bytes) else {
            return;
        };
        let mut removed = 0;
        for token in packet.payload().chunks_exact(MESSAGE_ID_SIZE) {
            let id = fingerprint(token);
            removed += self.cache.remove_id(&id);
        }
        if removed > 0 {
            tracing::debug!(removed, "ack cleared cached packets");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
