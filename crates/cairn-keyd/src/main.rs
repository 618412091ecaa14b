//! cairn-keyd — Cairn key responder daemon.
//!
//! Independent of cairnd, on its own framed channel to AD: consumes key
//! requests, enumerates local identities from the keyring directory, and
//! replies with public keys for every identity the request's destination
//! prefix reaches.

use std::os::fd::RawFd;
use std::os::unix::io::FromRawFd;

use anyhow::{Context, Result};
use tokio::net::UnixStream;

use cairn_core::config::CairnConfig;
use cairn_services::channel;
use cairn_services::{FileKeyring, KeyResponder, NoCipher, Outbox};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = CairnConfig::load().context("loading configuration")?;
    let stream = connect(&config).await?;
    tracing::info!(keys = %config.keys.dir.display(), "cairn-keyd connected to ad");

    let responder = KeyResponder::new(FileKeyring::open(&config.keys.dir), NoCipher);
    run(stream, responder).await
}

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

async fn run(
    mut stream: UnixStream,
    responder: KeyResponder<FileKeyring, NoCipher>,
) -> Result<()> {
    let mut outbox = Outbox::new();
    let (mut reader, mut writer) = stream.split();

    while let Some(frame) = channel::read_frame(&mut reader).await? {
        responder.handle_frame(&frame.bytes, &mut outbox)?;
        for out in outbox.take() {
            channel::write_frame(&mut writer, &out.bytes, out.priority).await?;
        }
    }
    tracing::info!("ad channel closed, exiting");
    Ok(())
}
