//! cairn-services — the cache engine, the two dispatchers, and the framed
//! channel they share with the application-delivery daemon.

pub mod cache;
pub mod channel;
pub mod dispatch;
pub mod keyd;
pub mod keyring;

pub use cache::{CacheEntry, PacketCache, RejectReason, RejectedPacket, CACHE_CAPACITY};
pub use channel::{ChannelError, Frame, FrameSink, Outbox};
pub use dispatch::CacheDispatcher;
pub use keyd::{KeyRequest, KeyResponder, NoCipher, ReplyCipher};
pub use keyring::{FileKeyring, Identity, Keyring};
