//! Key responder — answers key requests addressed to local identities.
//!
//! A key request carries a destination prefix; every local identity whose
//! address matches it gets to reply with its public key. If the requester
//! supplied a reply key, the public key goes back encrypted in a DATA
//! packet; otherwise it goes back in the clear as a CLEAR packet. The
//! encryption primitive itself is a collaborator behind [`ReplyCipher`].

use cairn_core::addr;
use cairn_core::packet::{
    MessageType, Packet, PacketBuilder, SigAlgo, ADDRESS_BITS, HOPS_EXTRA, PRIORITY_DEFAULT,
};

use crate::channel::{ChannelError, FrameSink};
use crate::keyring::{Identity, Keyring};

/// Algorithm tag of the single supported reply-key format.
pub const KEY_RSA4096_E65537: u8 = 0x01;

/// Reply-key material length: 1 tag byte + 512 key bytes.
pub const RSA4096_KEY_BYTES: usize = 513;

// ── Request parsing ───────────────────────────────────────────────────────────

/// Parse errors for the key-request payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyRequestError {
    #[error("empty key request payload")]
    Empty,

    #[error("fingerprint truncated: need {need} bytes, have {have}")]
    TruncatedFingerprint { need: usize, have: usize },
}

/// A decoded key request: `[nbits: 1][fingerprint: ceil(nbits/8)]` and
/// optionally a reply key for encrypting the answer.
#[derive(Debug, PartialEq, Eq)]
pub struct KeyRequest<'a> {
    pub nbits: u8,
    /// Fingerprint of the requested key. Parsed but not yet used for
    /// filtering.
    pub fingerprint: &'a [u8],
    /// Accepted only when the trailing bytes are exactly one supported
    /// key: RSA4096_KEY_BYTES long, tagged KEY_RSA4096_E65537. Anything
    /// else downgrades the reply to cleartext.
    pub reply_key: Option<&'a [u8]>,
}

impl<'a> KeyRequest<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self, KeyRequestError> {
        let (&nbits, rest) = payload.split_first().ok_or(KeyRequestError::Empty)?;
        let fp_len = (nbits as usize).div_ceil(8);
        if rest.len() < fp_len {
            return Err(KeyRequestError::TruncatedFingerprint {
                need: fp_len,
                have: rest.len(),
            });
        }
        let (fingerprint, rest) = rest.split_at(fp_len);
        let reply_key =
            (rest.len() == RSA4096_KEY_BYTES && rest[0] == KEY_RSA4096_E65537).then_some(rest);
        Ok(Self {
            nbits,
            fingerprint,
            reply_key,
        })
    }
}

// ── Reply encryption seam ─────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("no cipher provider configured")]
    Unavailable,

    #[error("encryption failed: {0}")]
    Failed(String),
}

/// Encrypts a reply under the requester-supplied key. The cryptographic
/// primitive lives with the collaborator that implements this.
pub trait ReplyCipher {
    fn encrypt(&self, plaintext: &[u8], reply_key: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// Refuses every encryption request. Clear-key replies still work.
pub struct NoCipher;

impl ReplyCipher for NoCipher {
    fn encrypt(&self, _plaintext: &[u8], _reply_key: &[u8]) -> Result<Vec<u8>, CipherError> {
        Err(CipherError::Unavailable)
    }
}

// ── Responder ─────────────────────────────────────────────────────────────────

pub struct KeyResponder<K, C> {
    keyring: K,
    cipher: C,
}

impl<K: Keyring, C: ReplyCipher> KeyResponder<K, C> {
    pub fn new(keyring: K, cipher: C) -> Self {
        Self { keyring, cipher }
    }

    /// Handle one inbound frame. Anything that is not a valid key request
    /// is ignored; a failed encryption skips that identity's reply and
    /// the remaining identities are still attempted.
    pub fn handle_frame(&self, bytes: &[u8], out: &mut dyn FrameSink) -> Result<(), ChannelError> {
        let Ok(packet) = Packet::parse(bytes) else {
            tracing::debug!(len = bytes.len(), "ignoring malformed packet");
            return Ok(());
        };
        if packet.message_type() != Some(MessageType::KeyReq) {
            return Ok(());
        }
        let request = match KeyRequest::parse(packet.payload()) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unparseable key request");
                return Ok(());
            }
        };

        let identities = self.keyring.identities();
        if identities.is_empty() {
            tracing::debug!("no local identities, nothing to send");
            return Ok(());
        }
        for identity in &identities {
            let mbits = addr::matching_bits(
                packet.destination(),
                packet.dst_nbits(),
                &identity.address,
                ADDRESS_BITS,
            );
            tracing::debug!(
                identity = hex::encode(identity.address),
                matching = mbits,
                needed = packet.dst_nbits(),
                "key request candidate"
            );
            if mbits < packet.dst_nbits() {
                continue;
            }
            if let Some(reply) = self.build_reply(&packet, identity, request.reply_key) {
                out.send(&reply, PRIORITY_DEFAULT)?;
            }
        }
        Ok(())
    }

    /// One reply packet carrying this identity's public key, or None when
    /// the requested encryption is not possible.
    fn build_reply(
        &self,
        request: &Packet<'_>,
        identity: &Identity,
        reply_key: Option<&[u8]>,
    ) -> Option<Vec<u8>> {
        let (message_type, key_bytes) = match reply_key {
            Some(key) => match self.cipher.encrypt(&identity.public_key, key) {
                Ok(ciphertext) => (MessageType::Data, ciphertext),
                Err(e) => {
                    tracing::warn!(
                        identity = hex::encode(identity.address),
                        error = %e,
                        "skipping reply, cannot encrypt"
                    );
                    return None;
                }
            },
            None => (MessageType::Clear, identity.public_key.clone()),
        };
        Some(
            PacketBuilder::new(
                message_type,
                &identity.address,
                ADDRESS_BITS,
                request.source(),
                request.src_nbits(),
            )
            .hops_max(request.hops().saturating_add(HOPS_EXTRA))
            .sig_algo(SigAlgo::None)
            .payload(key_bytes)
            .build(),
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
