//! Cairn wire format — the packet header every participant shares.
//!
//! Every field, every size, every flag bit here is part of the wire format
//! and is shared with the application-delivery daemon and every peer on the
//! mesh. Changing anything after deployment is a breaking change.
//!
//! The fixed header is #[repr(C)] with zerocopy derives for deterministic
//! layout. The transport-dependent tail (packet ID, message ID, stream ID,
//! expiration) is located by offset arithmetic; no accessor ever reads past
//! the end of the buffer.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::addr;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Address width in bytes. Addresses are fixed-width; only the leading
/// `nbits` bits are meaningful.
pub const ADDRESS_SIZE: usize = 8;

/// Maximum meaningful bits in an address.
pub const ADDRESS_BITS: u8 = (ADDRESS_SIZE * 8) as u8;

/// Width of packet IDs, message IDs, and ack tokens.
pub const MESSAGE_ID_SIZE: usize = 16;

/// Width of the stream ID transport field.
pub const STREAM_ID_SIZE: usize = 16;

/// Width of the expiration transport field (u64, little-endian).
pub const EXPIRATION_SIZE: usize = 8;

/// Size of the fixed header: 8 scalar bytes + source + destination.
pub const HEADER_SIZE: usize = 8 + 2 * ADDRESS_SIZE;

/// Current packet format version.
pub const PACKET_VERSION: u8 = 0x01;

/// Priority scale maximum. Priorities are carried on the AD channel, not
/// on the wire; a u32 word per frame.
pub const PRIORITY_MAX: u32 = 1 << 30;

/// Priority for ordinary locally originated traffic.
pub const PRIORITY_DEFAULT: u32 = PRIORITY_MAX / 2;

/// Priority for packets replayed out of the cache in answer to a data
/// request. Below default so fresh traffic wins.
pub const PRIORITY_CACHE_RESPONSE: u32 = PRIORITY_MAX / 4;

/// Hop budget extension applied by responders replying to a routed
/// request: the reply may need to travel back the way the request came.
pub const HOPS_EXTRA: u8 = 4;

/// Default hop budget for locally originated packets.
pub const DEFAULT_HOPS: u8 = 10;

/// Transport flag bits. Each set bit appends a field to the header, in the
/// order listed here. `DO_NOT_CACHE` carries no field; it asks caches to
/// let the packet pass through unstored.
pub mod transport {
    pub const PKT_ID: u8 = 0x01;
    pub const MSG_ID: u8 = 0x02;
    pub const STREAM: u8 = 0x04;
    pub const EXPIRATION: u8 = 0x08;
    pub const DO_NOT_CACHE: u8 = 0x10;
}

// ── Message types ─────────────────────────────────────────────────────────────

/// Packet taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Ordinary payload, stored by caches.
    Data = 1,
    /// Payload is one or more 16-byte ack tokens; the SHA-512 fingerprint
    /// of a token names the stored packet it acknowledges.
    Ack = 2,
    /// Query for stored packets whose destination prefix matches the
    /// requester's source prefix.
    DataReq = 3,
    /// Key exchange; payload carries key material behind a length byte.
    KeyXchg = 4,
    /// Key request; payload is parsed by the key responder.
    KeyReq = 5,
    /// Cleartext payload, unsigned and unencrypted.
    Clear = 6,
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Data),
            2 => Ok(MessageType::Ack),
            3 => Ok(MessageType::DataReq),
            4 => Ok(MessageType::KeyXchg),
            5 => Ok(MessageType::KeyReq),
            6 => Ok(MessageType::Clear),
            other => Err(WireError::UnknownMessageType(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(t: MessageType) -> u8 {
        t as u8
    }
}

// ── Signature algorithms ──────────────────────────────────────────────────────

/// Signature algorithm carried in the header. Verification is the business
/// of the application layer; the cache only transports the byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SigAlgo {
    None = 0,
    RsaPkcs1 = 1,
}

impl TryFrom<u8> for SigAlgo {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SigAlgo::None),
            1 => Ok(SigAlgo::RsaPkcs1),
            other => Err(WireError::UnknownSigAlgo(other)),
        }
    }
}

// ── Fixed header ──────────────────────────────────────────────────────────────

/// The fixed 24-byte prefix of every packet.
///
/// Wire layout, byte order:
///   0 version, 1 message_type, 2 hops, 3 hops_max, 4 transport,
///   5 src_nbits, 6 dst_nbits, 7 sig_algo, 8..16 source, 16..24 destination.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct FixedHeader {
    pub version: u8,
    pub message_type: u8,
    /// Hops traversed so far.
    pub hops: u8,
    /// Hop budget; forwarders drop the packet when hops reaches this.
    pub hops_max: u8,
    /// Transport flag bits; see [`transport`].
    pub transport: u8,
    /// Meaningful leading bits of `source`.
    pub src_nbits: u8,
    /// Meaningful leading bits of `destination`.
    pub dst_nbits: u8,
    pub sig_algo: u8,
    pub source: [u8; ADDRESS_SIZE],
    pub destination: [u8; ADDRESS_SIZE],
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(FixedHeader, [u8; HEADER_SIZE]);

/// Header size implied by a transport flags byte — the fixed header plus
/// every flagged field, in wire order.
pub fn header_size(transport_flags: u8) -> usize {
    let mut size = HEADER_SIZE;
    if transport_flags & transport::PKT_ID != 0 {
        size += MESSAGE_ID_SIZE;
    }
    if transport_flags & transport::MSG_ID != 0 {
        size += MESSAGE_ID_SIZE;
    }
    if transport_flags & transport::STREAM != 0 {
        size += STREAM_ID_SIZE;
    }
    if transport_flags & transport::EXPIRATION != 0 {
        size += EXPIRATION_SIZE;
    }
    size
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("packet too short: {0} bytes (fixed header is {HEADER_SIZE})")]
    TooShort(usize),

    #[error("packet shorter than its transport-implied header: {have} < {need}")]
    Truncated { need: usize, have: usize },

    #[error("address bits out of range: src {src}, dst {dst} (max {ADDRESS_BITS})")]
    AddressBits { src: u8, dst: u8 },

    #[error("unknown message type: 0x{0:02x}")]
    UnknownMessageType(u8),

    #[error("unknown signature algorithm: 0x{0:02x}")]
    UnknownSigAlgo(u8),
}

// ── Parsed view ───────────────────────────────────────────────────────────────

/// A validated, borrow-based view of a packet buffer.
///
/// Parsing copies the 24-byte fixed header and checks that the buffer is at
/// least as long as its transport flags imply; all other accessors are
/// offset arithmetic over the original bytes.
#[derive(Debug, Clone)]
pub struct Packet<'a> {
    bytes: &'a [u8],
    header: FixedHeader,
}

impl<'a> Packet<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, WireError> {
        let header =
            FixedHeader::read_from_prefix(bytes).ok_or(WireError::TooShort(bytes.len()))?;
        let need = header_size(header.transport);
        if bytes.len() < need {
            return Err(WireError::Truncated {
                need,
                have: bytes.len(),
            });
        }
        if header.src_nbits > ADDRESS_BITS || header.dst_nbits > ADDRESS_BITS {
            return Err(WireError::AddressBits {
                src: header.src_nbits,
                dst: header.dst_nbits,
            });
        }
        Ok(Self { bytes, header })
    }

    /// The parse gate as a predicate. Everything the dispatchers handle
    /// passes through here first.
    pub fn is_valid(bytes: &[u8]) -> bool {
        Packet::parse(bytes).is_ok()
    }

    pub fn version(&self) -> u8 {
        self.header.version
    }

    /// Raw message type byte. Unknown types are transported, not rejected.
    pub fn message_type_raw(&self) -> u8 {
        self.header.message_type
    }

    /// Message type, if it is one this node knows about.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::try_from(self.header.message_type).ok()
    }

    pub fn hops(&self) -> u8 {
        self.header.hops
    }

    pub fn hops_max(&self) -> u8 {
        self.header.hops_max
    }

    pub fn transport(&self) -> u8 {
        self.header.transport
    }

    pub fn sig_algo_raw(&self) -> u8 {
        self.header.sig_algo
    }

    pub fn src_nbits(&self) -> u8 {
        self.header.src_nbits
    }

    pub fn dst_nbits(&self) -> u8 {
        self.header.dst_nbits
    }

    pub fn source(&self) -> &'a [u8; ADDRESS_SIZE] {
        // length guaranteed by parse
        self.bytes[8..8 + ADDRESS_SIZE].try_into().unwrap()
    }

    pub fn destination(&self) -> &'a [u8; ADDRESS_SIZE] {
        self.bytes[8 + ADDRESS_SIZE..HEADER_SIZE].try_into().unwrap()
    }

    /// Offset of the transport field selected by `flag`, if present.
    /// Fields appear in flag-bit order after the fixed header.
    fn field_offset(&self, flag: u8) -> Option<usize> {
        if self.header.transport & flag == 0 {
            return None;
        }
        let mut off = HEADER_SIZE;
        for (bit, width) in [
            (transport::PKT_ID, MESSAGE_ID_SIZE),
            (transport::MSG_ID, MESSAGE_ID_SIZE),
            (transport::STREAM, STREAM_ID_SIZE),
            (transport::EXPIRATION, EXPIRATION_SIZE),
        ] {
            if bit == flag {
                return Some(off);
            }
            if self.header.transport & bit != 0 {
                off += width;
            }
        }
        None
    }

    pub fn packet_id(&self) -> Option<&'a [u8; MESSAGE_ID_SIZE]> {
        self.field_offset(transport::PKT_ID)
            .map(|off| self.bytes[off..off + MESSAGE_ID_SIZE].try_into().unwrap())
    }

    pub fn message_id(&self) -> Option<&'a [u8; MESSAGE_ID_SIZE]> {
        self.field_offset(transport::MSG_ID)
            .map(|off| self.bytes[off..off + MESSAGE_ID_SIZE].try_into().unwrap())
    }

    pub fn stream_id(&self) -> Option<&'a [u8; STREAM_ID_SIZE]> {
        self.field_offset(transport::STREAM)
            .map(|off| self.bytes[off..off + STREAM_ID_SIZE].try_into().unwrap())
    }

    pub fn expiration(&self) -> Option<u64> {
        self.field_offset(transport::EXPIRATION).map(|off| {
            u64::from_le_bytes(
                self.bytes[off..off + EXPIRATION_SIZE].try_into().unwrap(),
            )
        })
    }

    /// Everything after the transport-expanded header.
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[header_size(self.header.transport)..]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

// ── ID extraction ─────────────────────────────────────────────────────────────

/// Extract the 16-byte ID a cache would file this packet under.
///
/// Priority order: the packet-ID transport field, then the message-ID
/// field, then type-specific payload locations — an ACK's first token, or
/// the fingerprint/key bytes behind the length byte of a KEY_XCHG/KEY_REQ
/// payload. Returns None for packets that carry no usable ID.
pub fn extract_id(bytes: &[u8]) -> Option<&[u8; MESSAGE_ID_SIZE]> {
    let packet = Packet::parse(bytes).ok()?;
    if let Some(id) = packet.packet_id() {
        return Some(id);
    }
    if let Some(id) = packet.message_id() {
        return Some(id);
    }
    let payload = packet.payload();
    match packet.message_type() {
        Some(MessageType::Ack) if payload.len() >= MESSAGE_ID_SIZE => {
            payload[..MESSAGE_ID_SIZE].try_into().ok()
        }
        Some(MessageType::KeyXchg) | Some(MessageType::KeyReq) => {
            let len = *payload.first()? as usize;
            if len >= MESSAGE_ID_SIZE && payload.len() >= 1 + len {
                payload[1..1 + MESSAGE_ID_SIZE].try_into().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Constructs a packet buffer from scratch.
///
/// Unused trailing address bits are zeroed so that equal prefixes compare
/// equal byte-for-byte. Transport fields are emitted in wire order for
/// whatever the caller sets.
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    message_type: MessageType,
    hops: u8,
    hops_max: u8,
    sig_algo: SigAlgo,
    source: [u8; ADDRESS_SIZE],
    src_nbits: u8,
    destination: [u8; ADDRESS_SIZE],
    dst_nbits: u8,
    packet_id: Option<[u8; MESSAGE_ID_SIZE]>,
    message_id: Option<[u8; MESSAGE_ID_SIZE]>,
    stream_id: Option<[u8; STREAM_ID_SIZE]>,
    expiration: Option<u64>,
    do_not_cache: bool,
    payload: Vec<u8>,
}

impl PacketBuilder {
    pub fn new(
        message_type: MessageType,
        source: &[u8; ADDRESS_SIZE],
        src_nbits: u8,
        destination: &[u8; ADDRESS_SIZE],
        dst_nbits: u8,
    ) -> Self {
        let src_nbits = src_nbits.min(ADDRESS_BITS);
        let dst_nbits = dst_nbits.min(ADDRESS_BITS);
        let mut source = *source;
        let mut destination = *destination;
        addr::clamp(&mut source, src_nbits);
        addr::clamp(&mut destination, dst_nbits);
        Self {
            message_type,
            hops: 0,
            hops_max: DEFAULT_HOPS,
            sig_algo: SigAlgo::None,
            source,
            src_nbits,
            destination,
            dst_nbits,
            packet_id: None,
            message_id: None,
            stream_id: None,
            expiration: None,
            do_not_cache: false,
            payload: Vec::new(),
        }
    }

    pub fn hops(mut self, hops: u8) -> Self {
        self.hops = hops;
        self
    }

    pub fn hops_max(mut self, hops_max: u8) -> Self {
        self.hops_max = hops_max;
        self
    }

    pub fn sig_algo(mut self, sig_algo: SigAlgo) -> Self {
        self.sig_algo = sig_algo;
        self
    }

    pub fn packet_id(mut self, id: [u8; MESSAGE_ID_SIZE]) -> Self {
        self.packet_id = Some(id);
        self
    }

    pub fn message_id(mut self, id: [u8; MESSAGE_ID_SIZE]) -> Self {
        self.message_id = Some(id);
        self
    }

    pub fn stream_id(mut self, id: [u8; STREAM_ID_SIZE]) -> Self {
        self.stream_id = Some(id);
        self
    }

    pub fn expiration(mut self, at: u64) -> Self {
        self.expiration = Some(at);
        self
    }

    pub fn do_not_cache(mut self) -> Self {
        self.do_not_cache = true;
        self
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    fn transport_flags(&self) -> u8 {
        let mut flags = 0;
        if self.packet_id.is_some() {
            flags |= transport::PKT_ID;
        }
        if self.message_id.is_some() {
            flags |= transport::MSG_ID;
        }
        if self.stream_id.is_some() {
            flags |= transport::STREAM;
        }
        if self.expiration.is_some() {
            flags |= transport::EXPIRATION;
        }
        if self.do_not_cache {
            flags |= transport::DO_NOT_CACHE;
        }
        flags
    }

    pub fn build(self) -> Vec<u8> {
        let flags = self.transport_flags();
        let header = FixedHeader {
            version: PACKET_VERSION,
            message_type: self.message_type as u8,
            hops: self.hops,
            hops_max: self.hops_max,
            transport: flags,
            src_nbits: self.src_nbits,
            dst_nbits: self.dst_nbits,
            sig_algo: self.sig_algo as u8,
            source: self.source,
            destination: self.destination,
        };
        let mut buf = Vec::with_capacity(header_size(flags) + self.payload.len());
        buf.extend_from_slice(header.as_bytes());
        if let Some(id) = self.packet_id {
            buf.extend_from_slice(&id);
        }
        if let Some(id) = self.message_id {
            buf.extend_from_slice(&id);
        }
        if let Some(id) = self.stream_id {
            buf.extend_from_slice(&id);
        }
        if let Some(at) = self.expiration {
            buf.extend_from_slice(&at.to_le_bytes());
        }
        buf.extend_from_slice(&self.payload);
        buf
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
