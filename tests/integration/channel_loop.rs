//! The daemon event loop driven over a real socket pair.
//!
//! Mirrors the cairnd loop: read a frame, hand it to the dispatcher,
//! write whatever the dispatcher queued, until the channel closes.

use crate::*;
use anyhow::Result;
use cairn_core::packet::{PRIORITY_CACHE_RESPONSE, PRIORITY_DEFAULT};
use cairn_services::{channel, Outbox};
use std::sync::atomic::Ordering;
use tokio::net::UnixStream;

async fn serve_cache(mut stream: UnixStream, mut dispatcher: CacheDispatcher) -> Result<()> {
    let (mut reader, mut writer) = stream.split();
    let mut outbox = Outbox::new();
    while let Some(frame) = channel::read_frame(&mut reader).await? {
        dispatcher.handle_frame(frame.bytes, frame.priority, &mut outbox)?;
        for out in outbox.take() {
            channel::write_frame(&mut writer, &out.bytes, out.priority).await?;
        }
    }
    Ok(())
}

#[tokio::test]
async fn store_and_retrieve_over_the_channel() {
    let (server, client) = UnixStream::pair().unwrap();
    let task = tokio::spawn(serve_cache(server, CacheDispatcher::new()));

    let stored = data_packet(&addr(&[0xAA]), &addr(&[0xBB]), 64, [0x31; MESSAGE_ID_SIZE]);
    let (mut reader, mut writer) = client.into_split();
    channel::write_frame(&mut writer, &stored, PRIORITY_DEFAULT)
        .await
        .unwrap();
    channel::write_frame(&mut writer, &data_request(&addr(&[0xBB]), 8), PRIORITY_DEFAULT)
        .await
        .unwrap();

    let response = channel::read_frame(&mut reader).await.unwrap().unwrap();
    assert_eq!(response.bytes, stored);
    assert_eq!(response.priority, PRIORITY_CACHE_RESPONSE);

    drop(reader);
    drop(writer);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn channel_close_drains_every_live_entry() {
    let (server, mut client) = UnixStream::pair().unwrap();
    let (dispatcher, released) = counting_dispatcher(32);
    let task = tokio::spawn(serve_cache(server, dispatcher));

    let stored = 5u8;
    for i in 1..=stored {
        let packet = data_packet(&addr(&[0xAA]), &addr(&[0xBB]), 64, [i; MESSAGE_ID_SIZE]);
        channel::write_frame(&mut client, &packet, PRIORITY_DEFAULT)
            .await
            .unwrap();
    }

    // closing the channel ends the loop; dropping the dispatcher inside
    // the task releases everything still live
    drop(client);
    task.await.unwrap().unwrap();
    assert_eq!(released.load(Ordering::SeqCst), stored as usize);
}

#[tokio::test]
async fn malformed_frames_do_not_kill_the_loop() {
    let (server, client) = UnixStream::pair().unwrap();
    let task = tokio::spawn(serve_cache(server, CacheDispatcher::new()));

    let (mut reader, mut writer) = client.into_split();
    channel::write_frame(&mut writer, &[0xDE, 0xAD], PRIORITY_DEFAULT)
        .await
        .unwrap();
    let stored = data_packet(&addr(&[0xAA]), &addr(&[0xBB]), 64, [0x77; MESSAGE_ID_SIZE]);
    channel::write_frame(&mut writer, &stored, PRIORITY_DEFAULT)
        .await
        .unwrap();
    channel::write_frame(&mut writer, &data_request(&addr(&[0xBB]), 8), PRIORITY_DEFAULT)
        .await
        .unwrap();

    let response = channel::read_frame(&mut reader).await.unwrap().unwrap();
    assert_eq!(response.bytes, stored);

    drop(reader);
    drop(writer);
    task.await.unwrap().unwrap();
}
