use std::time::Duration;

use sipbell_sip_core::{Message, ParserEvent, ParserExit, StreamParser};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

fn sample_stream(count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..count {
        let mut msg = if i % 2 == 0 {
            Message::request("MESSAGE", format!("sip:bob{}@example.com", i))
        } else {
            Message::response(200, "OK")
        };
        let body = format!("body-{}", i);
        msg.set_call_id(format!("call-{}", i))
            .set_cseq(100 + i as u32, "MESSAGE")
            .set_content_length(body.len())
            .set_body(body);
        out.extend_from_slice(&msg.to_bytes());
    }
    out
}

async fn collect(mut parser: StreamParser<impl tokio::io::AsyncBufRead + Unpin>) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Some(msg) = parser.next_message().await.unwrap() {
        messages.push(msg);
    }
    messages
}

#[tokio::test]
async fn yields_every_message_regardless_of_chunking() {
    let stream = sample_stream(5);

    for chunk_size in [1, 2, 7, 13, 64, stream.len()] {
        let mut builder = tokio_test::io::Builder::new();
        for chunk in stream.chunks(chunk_size) {
            builder.read(chunk);
        }
        let parser = StreamParser::new(BufReader::new(builder.build()));
        let messages = collect(parser).await;

        assert_eq!(messages.len(), 5, "chunk size {}", chunk_size);
        for (i, msg) in messages.iter().enumerate() {
            assert_eq!(msg.call_id(), Some(format!("call-{}", i).as_str()));
            assert_eq!(msg.cseq().unwrap().number, 100 + i as u32);
            assert_eq!(&msg.body()[..], format!("body-{}", i).as_bytes());
        }
    }
}

#[tokio::test]
async fn blank_lines_between_messages_are_skipped() {
    let mut stream = b"\r\n\r\n".to_vec();
    stream.extend(sample_stream(1));
    stream.extend_from_slice(b"\r\n");
    stream.extend(sample_stream(1));

    let messages = collect(StreamParser::new(&stream[..])).await;
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn empty_stream_yields_nothing() {
    let messages = collect(StreamParser::new(&b""[..])).await;
    assert!(messages.is_empty());
}

#[tokio::test]
async fn started_parser_delivers_in_order_then_closes() {
    let (client, server) = tokio::io::duplex(1024);
    let (read_half, _write_half) = tokio::io::split(server);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (_stop_tx, stop_rx) = oneshot::channel();

    let handle = StreamParser::new(BufReader::new(read_half)).start(
        move |event| {
            let _ = tx.send(event);
        },
        stop_rx,
    );

    let mut client = client;
    client.write_all(&sample_stream(3)).await.unwrap();
    for i in 0..3 {
        match rx.recv().await {
            Some(ParserEvent::Message(msg)) => {
                assert_eq!(msg.call_id(), Some(format!("call-{}", i).as_str()))
            }
            other => panic!("expected message {}, got {:?}", i, other),
        }
    }

    drop(client);
    assert!(matches!(
        rx.recv().await,
        Some(ParserEvent::Closed(ParserExit::EndOfStream))
    ));
    handle.await.unwrap();
}

#[tokio::test]
async fn stop_signal_ends_the_loop() {
    let (_client, server) = tokio::io::duplex(1024);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();

    let handle = StreamParser::new(BufReader::new(server)).start(
        move |event| {
            let _ = tx.send(event);
        },
        stop_rx,
    );

    stop_tx.send(()).unwrap();
    let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert!(matches!(event, Some(ParserEvent::Closed(ParserExit::Stopped))));
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}
