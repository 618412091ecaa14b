//! Local identity enumeration.
//!
//! The key responder only needs to list local identities — an address and
//! the public key to hand out. Key generation, signing, and storage
//! formats beyond this live with the keyring owner.

use std::path::PathBuf;

use serde::Deserialize;

use cairn_core::packet::ADDRESS_SIZE;

/// One local identity: where it lives on the mesh and what to hand out.
#[derive(Debug, Clone)]
pub struct Identity {
    pub address: [u8; ADDRESS_SIZE],
    pub public_key: Vec<u8>,
}

/// Key enumeration interface consumed by the key responder.
pub trait Keyring {
    fn identities(&self) -> Vec<Identity>;
}

/// A directory of identity files, one TOML file per identity:
///
/// ```toml
/// address = "c0a1b2c3d4e5f607"   # 8 bytes, hex
/// public_key = "30820222300d…"   # hex
/// ```
///
/// Unreadable or malformed files are skipped with a warning; the keyring
/// is re-read on every enumeration so key changes need no restart.
pub struct FileKeyring {
    dir: PathBuf,
}

#[derive(Deserialize)]
struct IdentityFile {
    address: String,
    public_key: String,
}

impl FileKeyring {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn parse(text: &str) -> Option<Identity> {
        let file: IdentityFile = toml::from_str(text).ok()?;
        let address_bytes = hex::decode(file.address).ok()?;
        let address: [u8; ADDRESS_SIZE] = address_bytes.try_into().ok()?;
        let public_key = hex::decode(file.public_key).ok()?;
        Some(Identity {
            address,
            public_key,
        })
    }
}

impl Keyring for FileKeyring {
    fn identities(&self) -> Vec<Identity> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "cannot read keyring");
                return Vec::new();
            }
        };
        let mut identities = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(&path) else {
                tracing::warn!(file = %path.display(), "unreadable identity file");
                continue;
            };
            match Self::parse(&text) {
                Some(identity) => identities.push(identity),
                None => {
                    tracing::warn!(file = %path.display(), "malformed identity file");
                }
            }
        }
        identities
    }
}
