use std::net::SocketAddr;
use std::time::Duration;

use sipbell_client_core::{Call, Client, ClientError};
use sipbell_sip_core::{Message, StreamParser};
use sipbell_sip_transport::Error as TransportError;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sipbell_client_core=debug,sipbell_sip_transport=debug")
        .with_test_writer()
        .try_init();
}

/// Caller side of an inbound connection
struct Caller {
    parser: StreamParser<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Caller {
    async fn connect(addr: SocketAddr) -> Self {
        init_tracing();
        let (read_half, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            parser: StreamParser::new(BufReader::new(read_half)),
            writer,
        }
    }

    async fn send(&mut self, msg: &Message) {
        self.writer.write_all(&msg.to_bytes()).await.unwrap();
    }

    async fn recv(&mut self) -> Message {
        timeout(Duration::from_secs(2), self.parser.next_message())
            .await
            .expect("timed out waiting for a reply")
            .unwrap()
            .expect("connection closed")
    }
}

fn request(method: &str, call_id: &str) -> Message {
    let mut msg = Message::request(method, "sip:bob@127.0.0.1");
    msg.set_via("SIP/2.0/TCP 127.0.0.1:5080;branch=z9hG4bKcaller")
        .set_from("<sip:alice@example.com>;tag=caller")
        .set_to("<sip:bob@example.com>")
        .set_call_id(call_id)
        .set_cseq(1, method)
        .set_content_length(0);
    msg
}

fn call_channel(client: &Client) -> (mpsc::UnboundedReceiver<Call>, mpsc::UnboundedReceiver<Call>) {
    let (call_tx, call_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = mpsc::unbounded_channel();
    client.on_incoming_call(move |call| {
        let _ = call_tx.send(call);
    });
    client.on_cancel(move |call| {
        let _ = cancel_tx.send(call);
    });
    (call_rx, cancel_rx)
}

async fn next_call(rx: &mut mpsc::UnboundedReceiver<Call>) -> Call {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for the callback")
        .expect("callback channel closed")
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn invite_is_answered_then_reported() {
    let client = Client::default();
    let (mut calls, _cancels) = call_channel(&client);
    let addr = client.listen("tcp", "127.0.0.1", 0).await.unwrap();

    let mut caller = Caller::connect(addr).await;
    caller.send(&request("INVITE", "call-1")).await;

    let trying = caller.recv().await;
    assert_eq!(trying.status_code(), Some(100));
    assert_eq!(trying.call_id(), Some("call-1"));
    let ringing = caller.recv().await;
    assert_eq!(ringing.status_code(), Some(180));
    assert_eq!(ringing.cseq().unwrap().method, "INVITE");

    let call = next_call(&mut calls).await;
    assert_eq!(call.from, "<sip:alice@example.com>;tag=caller");

    client.stop_listening_all().await;
}

#[tokio::test]
async fn cancel_is_answered_then_reported() {
    let client = Client::default();
    let (_calls, mut cancels) = call_channel(&client);
    let addr = client.listen("tcp", "127.0.0.1", 0).await.unwrap();

    let mut caller = Caller::connect(addr).await;
    caller.send(&request("CANCEL", "call-2")).await;

    let ok = caller.recv().await;
    assert_eq!(ok.status_code(), Some(200));
    assert_eq!(ok.reason(), Some("OK"));
    assert_eq!(ok.cseq().unwrap().method, "CANCEL");

    let call = next_call(&mut cancels).await;
    assert_eq!(call.from, "<sip:alice@example.com>;tag=caller");

    client.stop_listening_all().await;
}

#[tokio::test]
async fn other_requests_get_no_reply() {
    let client = Client::default();
    let (mut calls, _cancels) = call_channel(&client);
    let addr = client.listen("", "127.0.0.1", 0).await.unwrap();

    let mut caller = Caller::connect(addr).await;
    caller.send(&request("OPTIONS", "probe")).await;
    caller.send(&request("INVITE", "call-3")).await;

    // the first reply on the connection belongs to the INVITE
    let first = caller.recv().await;
    assert_eq!(first.status_code(), Some(100));
    assert_eq!(first.call_id(), Some("call-3"));
    next_call(&mut calls).await;

    client.stop_listening_all().await;
}

#[tokio::test]
async fn duplicate_listener_is_rejected() {
    let client = Client::default();
    let port = free_port();

    client.listen("tcp", "127.0.0.1", port).await.unwrap();
    let second = client.listen("", "127.0.0.1", port).await;
    match second {
        Err(ClientError::DuplicateListener { key }) => {
            assert_eq!(key, format!("tcp_127.0.0.1_{}", port))
        }
        other => panic!("expected duplicate listener error, got {:?}", other),
    }
    assert!(matches!(
        client.listen("TCP", "127.0.0.1", port).await,
        Err(ClientError::DuplicateListener { .. })
    ));
    assert_eq!(client.listener_count().await, 1);

    client.stop_listening_all().await;
}

#[tokio::test]
async fn transport_case_does_not_hide_duplicates() {
    let client = Client::default();

    client.listen("TCP", "127.0.0.1", 0).await.unwrap();
    match client.listen("tcp", "127.0.0.1", 0).await {
        Err(ClientError::DuplicateListener { key }) => assert_eq!(key, "tcp_127.0.0.1_0"),
        other => panic!("expected duplicate listener error, got {:?}", other),
    }
    assert_eq!(client.listener_count().await, 1);

    client.stop_listening_all().await;
}

#[tokio::test]
async fn unsupported_transport_is_rejected() {
    let client = Client::default();

    assert!(matches!(
        client.listen("udp", "127.0.0.1", 0).await,
        Err(ClientError::Transport(TransportError::UnsupportedTransport(_)))
    ));
    assert!(client.set_default_transport("udp").is_err());
    assert!(client.set_default_transport("TCP").is_ok());
    assert_eq!(client.config().default_transport, "tcp");
    assert_eq!(client.listener_count().await, 0);
}

#[tokio::test]
async fn stopping_listeners_keeps_accepted_dialogs() {
    let client = Client::default();
    let (mut calls, mut cancels) = call_channel(&client);
    let first = client.listen("tcp", "127.0.0.1", free_port()).await.unwrap();
    let second = client.listen("tcp", "127.0.0.1", free_port()).await.unwrap();
    assert_eq!(client.listener_count().await, 2);

    let mut caller = Caller::connect(first).await;
    caller.send(&request("INVITE", "call-4")).await;
    assert_eq!(caller.recv().await.status_code(), Some(100));
    assert_eq!(caller.recv().await.status_code(), Some(180));
    next_call(&mut calls).await;

    client.stop_listening_all().await;
    assert_eq!(client.listener_count().await, 0);
    assert!(TcpStream::connect(first).await.is_err());
    assert!(TcpStream::connect(second).await.is_err());

    caller.send(&request("CANCEL", "call-4")).await;
    let ok = caller.recv().await;
    assert_eq!(ok.status_code(), Some(200));
    assert_eq!(next_call(&mut cancels).await.from, "<sip:alice@example.com>;tag=caller");
}
