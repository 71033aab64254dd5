use crate::*;
use anyhow::{bail, Result};
use bytes::Bytes;
use cairn_core::wire::{decode_listing, ErrorKind, Frame};

#[tokio::test]
async fn thousand_byte_file_reads_as_two_blocks() -> Result<()> {
    let server = start_server().await?;
    let contents: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
    server.store.create("report.txt", &contents).await?;

    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await?;
    client
        .send(&Frame::Read {
            filename: "report.txt".into(),
        })
        .await?;

    // Block 1: 512 bytes. Block 2: 488 bytes, under 512, so final.
    let first = client.recv().await?;
    let Frame::Data { block: 1, payload } = &first else {
        bail!("expected data block 1, got {first:?}");
    };
    assert_eq!(payload.len(), 512);
    client.send(&Frame::Ack { block: 1 }).await?;

    let second = client.recv().await?;
    let Frame::Data { block: 2, payload } = &second else {
        bail!("expected data block 2, got {second:?}");
    };
    assert_eq!(payload.len(), 488);
    client.send(&Frame::Ack { block: 2 }).await?;

    // No further frames after the final ACK.
    client.expect_silence().await?;

    let mut reassembled = Vec::new();
    for frame in [first, second] {
        if let Frame::Data { payload, .. } = frame {
            reassembled.extend_from_slice(&payload);
        }
    }
    assert_eq!(reassembled, contents);
    Ok(())
}

#[tokio::test]
async fn block_two_waits_for_ack_one() -> Result<()> {
    let server = start_server().await?;
    server.store.create("f.bin", &[1u8; 600]).await?;

    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await?;
    client
        .send(&Frame::Read {
            filename: "f.bin".into(),
        })
        .await?;

    assert!(matches!(client.recv().await?, Frame::Data { block: 1, .. }));
    // Strict stop-and-wait: nothing more until the ACK goes out.
    client.expect_silence().await?;

    client.send(&Frame::Ack { block: 1 }).await?;
    assert!(matches!(client.recv().await?, Frame::Data { block: 2, .. }));
    Ok(())
}

#[tokio::test]
async fn exact_multiple_download_ends_with_empty_block() -> Result<()> {
    let server = start_server().await?;
    server.store.create("exact.bin", &[9u8; 512]).await?;

    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await?;
    client
        .send(&Frame::Read {
            filename: "exact.bin".into(),
        })
        .await?;

    let bytes = client.pull_transfer().await?;
    assert_eq!(bytes.len(), 512);
    client.expect_silence().await?;
    Ok(())
}

#[tokio::test]
async fn upload_round_trips_through_the_store() -> Result<()> {
    let server = start_server().await?;
    let contents: Vec<u8> = (0..1000u32).map(|i| (i * 7) as u8).collect();

    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await?;

    client
        .send(&Frame::Write {
            filename: "up.bin".into(),
        })
        .await?;
    assert_eq!(client.recv().await?, Frame::Ack { block: 0 });

    client
        .send(&Frame::Data {
            block: 1,
            payload: Bytes::copy_from_slice(&contents[..512]),
        })
        .await?;
    assert_eq!(client.recv().await?, Frame::Ack { block: 1 });

    client
        .send(&Frame::Data {
            block: 2,
            payload: Bytes::copy_from_slice(&contents[512..]),
        })
        .await?;
    assert_eq!(client.recv().await?, Frame::Ack { block: 2 });

    // The uploader is logged in, so it receives the added notification too.
    assert_eq!(
        client.recv().await?,
        Frame::Broadcast {
            added: true,
            filename: "up.bin".into(),
        }
    );

    assert_eq!(server.store.read("up.bin").await?, contents);

    // And the file can be read back over the wire.
    client
        .send(&Frame::Read {
            filename: "up.bin".into(),
        })
        .await?;
    assert_eq!(client.pull_transfer().await?, contents);
    Ok(())
}

#[tokio::test]
async fn full_final_block_needs_the_empty_sentinel() -> Result<()> {
    let server = start_server().await?;
    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await?;

    client
        .send(&Frame::Write {
            filename: "exact.bin".into(),
        })
        .await?;
    assert_eq!(client.recv().await?, Frame::Ack { block: 0 });

    client
        .send(&Frame::Data {
            block: 1,
            payload: Bytes::from(vec![4u8; 512]),
        })
        .await?;
    assert_eq!(client.recv().await?, Frame::Ack { block: 1 });

    // A full block never completes a transfer: the file is not there yet.
    assert!(!server.store.exists("exact.bin").await?);

    client
        .send(&Frame::Data {
            block: 2,
            payload: Bytes::new(),
        })
        .await?;
    assert_eq!(client.recv().await?, Frame::Ack { block: 2 });
    assert!(matches!(client.recv().await?, Frame::Broadcast { .. }));
    assert_eq!(server.store.read("exact.bin").await?.len(), 512);
    Ok(())
}

#[tokio::test]
async fn mismatched_ack_is_rejected_without_advancing() -> Result<()> {
    let server = start_server().await?;
    server.store.create("f.bin", &[1u8; 600]).await?;

    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await?;
    client
        .send(&Frame::Read {
            filename: "f.bin".into(),
        })
        .await?;
    assert!(matches!(client.recv().await?, Frame::Data { block: 1, .. }));

    client.send(&Frame::Ack { block: 5 }).await?;
    assert_eq!(client.recv().await?, Frame::error(ErrorKind::NotDefined));

    // The queue head is still block 1.
    client.send(&Frame::Ack { block: 1 }).await?;
    assert!(matches!(client.recv().await?, Frame::Data { block: 2, .. }));
    Ok(())
}

#[tokio::test]
async fn missing_file_and_duplicate_create_are_reported() -> Result<()> {
    let server = start_server().await?;
    server.store.create("taken.txt", b"x").await?;

    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await?;

    client
        .send(&Frame::Read {
            filename: "ghost.txt".into(),
        })
        .await?;
    assert_eq!(client.recv().await?, Frame::error(ErrorKind::FileNotFound));

    client
        .send(&Frame::Write {
            filename: "taken.txt".into(),
        })
        .await?;
    assert_eq!(client.recv().await?, Frame::error(ErrorKind::FileExists));
    Ok(())
}

#[tokio::test]
async fn listing_streams_all_names() -> Result<()> {
    let server = start_server().await?;
    server.store.create("a.txt", b"1").await?;
    server.store.create("b.txt", b"2").await?;
    server.store.create("c.txt", b"3").await?;

    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await?;

    client.send(&Frame::List).await?;
    let listing = client.pull_transfer().await?;
    assert_eq!(decode_listing(&listing), vec!["a.txt", "b.txt", "c.txt"]);
    Ok(())
}

#[tokio::test]
async fn empty_store_lists_as_one_empty_block() -> Result<()> {
    let server = start_server().await?;
    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await?;

    client.send(&Frame::List).await?;
    let frame = client.recv().await?;
    let Frame::Data { block: 1, payload } = &frame else {
        bail!("expected data block 1, got {frame:?}");
    };
    assert!(payload.is_empty());
    client.send(&Frame::Ack { block: 1 }).await?;
    client.expect_silence().await?;
    Ok(())
}
