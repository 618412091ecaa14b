//! cairnd — Cairn packet-cache daemon.
//!
//! Connects to the application-delivery daemon over one framed channel
//! and runs the cache dispatcher until the channel closes: data requests
//! are answered out of the cache, acks delete what they acknowledge, and
//! everything else with an ID is stored.
//!
//! The channel is either a file descriptor inherited from AD (first
//! argument) or the socket path from the configuration.

use std::os::fd::RawFd;
use std::os::unix::io::FromRawFd;

use anyhow::{Context, Result};
use tokio::net::UnixStream;

use cairn_core::config::CairnConfig;
use cairn_services::channel;
use cairn_services::{CacheDispatcher, Outbox};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialise tracing — RUST_LOG controls verbosity
    // e.g. RUST_LOG=debug cargo run -p cairnd
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = CairnConfig::load().context("loading configuration")?;
    let stream = connect(&config).await?;
    tracing::info!("cairnd connected to ad");
    run(stream).await
}

/// Inherited fd from AD if one was passed, else the configured socket.
async fn connect(config: &CairnConfig) -> Result<UnixStream> {
    if let Some(arg) = std::env::args().nth(1) {
        let fd: RawFd = arg
            .parse()
            .with_context(|| format!("fd argument is not a number: {arg}"))?;
        // Safety: AD hands us this descriptor at spawn; nothing else owns it.
        let std_stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(fd) };
        std_stream
            .set_nonblocking(true)
            .context("setting inherited fd nonblocking")?;
        return UnixStream::from_std(std_stream).context("registering inherited fd");
    }
    UnixStream::connect(&config.channel.socket_path)
        .await
        .with_context(|| {
            format!(
                "connecting to ad at {}",
                config.channel.socket_path.display()
            )
        })
}

async fn run(mut stream: UnixStream) -> Result<()> {
    let mut dispatcher = CacheDispatcher::new();
    let mut outbox = Outbox::new();
    let (mut reader, mut writer) = stream.split();

    while let Some(frame) = channel::read_frame(&mut reader).await? {
        dispatcher.handle_frame(frame.bytes, frame.priority, &mut outbox)?;
        for out in outbox.take() {
            channel::write_frame(&mut writer, &out.bytes, out.priority).await?;
        }
    }
    tracing::info!("ad channel closed, exiting");
    Ok(())
}
