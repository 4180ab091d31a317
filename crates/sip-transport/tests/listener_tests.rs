use std::time::Duration;

use sipbell_sip_transport::{connect, ConnectionInfo, Error, Listener};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn bind_loopback() -> (Listener, mpsc::UnboundedReceiver<tokio::net::TcpStream>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = Listener::bind(ConnectionInfo::tcp("127.0.0.1", 0), move |stream, _peer| {
        let _ = tx.send(stream);
    })
    .await
    .unwrap();
    (listener, rx)
}

#[tokio::test]
async fn accepted_connections_reach_the_callback() {
    let (mut listener, mut accepted) = bind_loopback().await;
    assert!(listener.is_running());

    let port = listener.local_addr().port();
    let mut client = connect(&ConnectionInfo::tcp("127.0.0.1", port)).await.unwrap();
    let mut server = timeout(Duration::from_secs(2), accepted.recv())
        .await
        .unwrap()
        .unwrap();

    client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    listener.stop().await;
}

#[tokio::test]
async fn stop_closes_the_server_socket() {
    let (mut listener, _accepted) = bind_loopback().await;
    let info = ConnectionInfo::tcp("127.0.0.1", listener.local_addr().port());

    listener.stop().await;
    assert!(!listener.is_running());
    listener.stop().await;

    assert!(matches!(
        connect(&info).await,
        Err(Error::ConnectFailed { .. })
    ));
}

#[tokio::test]
async fn stop_leaves_accepted_connections_open() {
    let (mut listener, mut accepted) = bind_loopback().await;
    let port = listener.local_addr().port();
    let mut client = connect(&ConnectionInfo::tcp("127.0.0.1", port)).await.unwrap();
    let mut server = timeout(Duration::from_secs(2), accepted.recv())
        .await
        .unwrap()
        .unwrap();

    listener.stop().await;

    server.write_all(b"still here").await.unwrap();
    let mut buf = [0u8; 10];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"still here");
}

#[tokio::test]
async fn only_tcp_is_supported() {
    let result = Listener::bind(ConnectionInfo::new("udp", "127.0.0.1", 0), |_, _| {}).await;
    assert!(matches!(result, Err(Error::UnsupportedTransport(_))));

    let result = connect(&ConnectionInfo::new("ws", "127.0.0.1", 5060)).await;
    assert!(matches!(result, Err(Error::UnsupportedTransport(_))));
}
