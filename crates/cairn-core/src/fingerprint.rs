//! Ack-token fingerprint.
//!
//! A stored packet advertises its ID as the SHA-512 fingerprint of a
//! secret token known only to the original sender. The ack carries the
//! token itself; hashing it recovers the stored ID, so an observer who
//! saw only the ack cannot tell which stored packet it acknowledged.

use sha2::{Digest, Sha512};

use crate::packet::MESSAGE_ID_SIZE;

/// SHA-512 of `token`, truncated to the first MESSAGE_ID_SIZE bytes.
pub fn fingerprint(token: &[u8]) -> [u8; MESSAGE_ID_SIZE] {
    let digest = Sha512::digest(token);
    let mut out = [0u8; MESSAGE_ID_SIZE];
    out.copy_from_slice(&digest[..MESSAGE_ID_SIZE]);
    out
}
