use crate::*;
use anyhow::{bail, Result};
use cairn_core::{ErrorKind, Frame};
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn login_is_acknowledged() -> Result<()> {
    let server = start_server().await?;
    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await
}

#[tokio::test]
async fn duplicate_username_is_rejected_across_connections() -> Result<()> {
    let server = start_server().await?;
    let mut alice = TestClient::connect(server.addr).await?;
    alice.login("alice").await?;

    let mut intruder = TestClient::connect(server.addr).await?;
    intruder
        .send(&Frame::Login {
            username: "alice".into(),
        })
        .await?;
    assert_eq!(
        intruder.recv().await?,
        Frame::error(ErrorKind::AlreadyLoggedIn)
    );
    Ok(())
}

#[tokio::test]
async fn requests_before_login_are_rejected() -> Result<()> {
    let server = start_server().await?;
    let mut client = TestClient::connect(server.addr).await?;

    client.send(&Frame::List).await?;
    assert_eq!(client.recv().await?, Frame::error(ErrorKind::NotLoggedIn));

    client
        .send(&Frame::Read {
            filename: "anything.txt".into(),
        })
        .await?;
    assert_eq!(client.recv().await?, Frame::error(ErrorKind::NotLoggedIn));
    Ok(())
}

#[tokio::test]
async fn disconnect_is_acked_then_connection_closes() -> Result<()> {
    let server = start_server().await?;
    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await?;

    client.send(&Frame::Disconnect).await?;
    assert_eq!(client.recv().await?, Frame::Ack { block: 0 });
    client.expect_closed().await?;

    // The username was freed on disconnect.
    let mut replacement = TestClient::connect(server.addr).await?;
    replacement.login("alice").await
}

#[tokio::test]
async fn unknown_opcode_gets_error_then_close() -> Result<()> {
    let server = start_server().await?;
    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await?;

    // No frame starts with opcode 0x0063.
    client.stream.write_all(&[0x00, 0x63]).await?;
    assert_eq!(
        client.recv().await?,
        Frame::error(ErrorKind::IllegalOperation)
    );
    client.expect_closed().await?;

    // The torn-down connection released its username.
    let mut replacement = TestClient::connect(server.addr).await?;
    replacement.login("alice").await
}

#[tokio::test]
async fn lost_connection_frees_the_username() -> Result<()> {
    let server = start_server().await?;
    let mut client = TestClient::connect(server.addr).await?;
    client.login("alice").await?;
    drop(client); // hang up without DISC

    // Teardown is asynchronous; retry until the name frees up.
    for _ in 0..50 {
        let mut retry = TestClient::connect(server.addr).await?;
        retry
            .send(&Frame::Login {
                username: "alice".into(),
            })
            .await?;
        match retry.recv().await? {
            Frame::Ack { block: 0 } => return Ok(()),
            Frame::Error { .. } => {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
            other => bail!("unexpected login reply: {other:?}"),
        }
    }
    bail!("username was never released after connection loss")
}
