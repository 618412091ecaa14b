//! Framed channel to the application-delivery daemon.
//!
//! AD speaks length-prefixed frames with a priority word:
//!
//!   [len: u32 LE] [priority: u32 LE] [len bytes]
//!
//! Reads and writes are async so a dispatcher can block on the channel
//! without holding a thread; everything downstream of the frame boundary
//! is synchronous. `FrameSink` is the seam the dispatchers emit responses
//! through — the event loop drains an [`Outbox`], tests inspect it.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. AD never sends more; anything larger is
/// a desynchronized stream.
pub const MAX_FRAME_SIZE: usize = 1 << 20;

/// Errors on the AD channel. All of them are fatal to the owning
/// dispatcher process; per-packet problems never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("frame of {0} bytes exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    #[error("channel io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One framed message with its priority word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub priority: u32,
    pub bytes: Vec<u8>,
}

/// Read one frame. Returns None on clean EOF at a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 8];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(header[..4].try_into().unwrap()) as usize;
    let priority = u32::from_le_bytes(header[4..].try_into().unwrap());
    if len > MAX_FRAME_SIZE {
        return Err(ChannelError::FrameTooLarge(len));
    }
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).await?;
    Ok(Some(Frame { priority, bytes }))
}

/// Write one frame and flush it.
pub async fn write_frame<W>(
    writer: &mut W,
    bytes: &[u8],
    priority: u32,
) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
{
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(ChannelError::FrameTooLarge(bytes.len()));
    }
    writer.write_all(&(bytes.len() as u32).to_le_bytes()).await?;
    writer.write_all(&priority.to_le_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Where dispatchers put outbound frames. The channel copies the bytes
/// into the frame, so stored packets can be emitted without leaving the
/// cache.
pub trait FrameSink {
    fn send(&mut self, bytes: &[u8], priority: u32) -> Result<(), ChannelError>;
}

/// Collects outbound frames for the event loop to write after each
/// inbound frame is handled.
#[derive(Debug, Default)]
pub struct Outbox {
    frames: Vec<Frame>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Drain everything queued so far.
    pub fn take(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }
}

impl FrameSink for Outbox {
    fn send(&mut self, bytes: &[u8], priority: u32) -> Result<(), ChannelError> {
        self.frames.push(Frame {
            priority,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}
