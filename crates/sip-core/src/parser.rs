//! Incremental stream parser.
//!
//! One [`StreamParser`] is bound to one byte stream for its whole life and
//! yields the messages on it one by one:
//!
//! ```text
//! FirstLine -> Headers -> Body -> FirstLine -> ...
//! ```
//!
//! Malformed fields never abort parsing. A non-numeric status code becomes
//! 400, a non-numeric Content-Length or one above [`MAX_BODY_SIZE`] becomes 0,
//! and header lines without a `": "` separator are skipped.

use std::borrow::Cow;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::headers::names;
use crate::message::{Headline, Message, FALLBACK_STATUS_CODE, SIP_VERSION};

/// Largest Content-Length honored
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Where the parser is inside the current message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for a request line or status line
    FirstLine,
    /// Reading header lines until the blank line
    Headers,
    /// Reading Content-Length bytes of body
    Body,
}

/// Why a started parser loop ended
#[derive(Debug)]
pub enum ParserExit {
    /// The stop signal fired or its sender was dropped
    Stopped,
    /// The peer closed the stream
    EndOfStream,
    /// Reading from the stream failed, or the read loop panicked
    Failed(Error),
}

/// What a started parser hands to its callback
#[derive(Debug)]
pub enum ParserEvent {
    /// One complete message, in stream order
    Message(Message),
    /// The read loop ended; delivered exactly once, last
    Closed(ParserExit),
}

/// Turns a byte stream into [`Message`]s
pub struct StreamParser<R> {
    reader: R,
    state: ParserState,
    current: Option<Message>,
    expected_body: usize,
    line: Vec<u8>,
}

impl<R> StreamParser<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: ParserState::FirstLine,
            current: None,
            expected_body: 0,
            line: Vec::with_capacity(256),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Reads the next complete message.
    ///
    /// Returns `Ok(None)` once the stream has ended. A message cut short by
    /// the end of the stream is logged and dropped.
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            match self.state {
                ParserState::FirstLine => {
                    let Some(line) = self.read_line().await? else {
                        return Ok(self.end_of_stream());
                    };
                    if line.is_empty() {
                        // keep-alive CRLFs between messages
                        continue;
                    }
                    self.current = Some(Message::from_headline(parse_headline(&line)));
                    self.expected_body = 0;
                    self.state = ParserState::Headers;
                }
                ParserState::Headers => {
                    let Some(line) = self.read_line().await? else {
                        return Ok(self.end_of_stream());
                    };
                    if line.is_empty() {
                        self.state = ParserState::Body;
                        continue;
                    }
                    let Some((name, value)) = line.split_once(": ") else {
                        warn!("skipping malformed header line {:?}", line);
                        continue;
                    };
                    if name == names::CONTENT_LENGTH {
                        self.expected_body = parse_content_length(value);
                    }
                    if let Some(message) = self.current.as_mut() {
                        message.headers_mut().add(name, value);
                    }
                }
                ParserState::Body => {
                    // grows with the bytes that actually arrive
                    let mut body = Vec::new();
                    if self.expected_body > 0 {
                        (&mut self.reader)
                            .take(self.expected_body as u64)
                            .read_to_end(&mut body)
                            .await?;
                        if body.len() < self.expected_body {
                            return Ok(self.end_of_stream());
                        }
                    }

                    self.state = ParserState::FirstLine;
                    self.expected_body = 0;
                    if let Some(mut message) = self.current.take() {
                        message.set_body(body);
                        trace!(
                            correlation_id = %message.correlation_id(),
                            "parsed {}: {}",
                            message.kind(),
                            message.headline()
                        );
                        return Ok(Some(message));
                    }
                }
            }
        }
    }

    /// Reads one line without its LF / CRLF terminator. `None` at end of
    /// stream.
    async fn read_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        let n = self.reader.read_until(b'\n', &mut self.line).await?;
        if n == 0 {
            return Ok(None);
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
        }
        let line = match String::from_utf8_lossy(&self.line) {
            Cow::Borrowed(s) => s.to_string(),
            Cow::Owned(s) => {
                warn!("line is not valid UTF-8, decoded lossily: {:?}", s);
                s
            }
        };
        Ok(Some(line))
    }

    fn end_of_stream(&mut self) -> Option<Message> {
        if let Some(partial) = self.current.take() {
            warn!(
                correlation_id = %partial.correlation_id(),
                state = ?self.state,
                "stream ended inside a message, dropping {}",
                partial.headline()
            );
        }
        self.state = ParserState::FirstLine;
        self.expected_body = 0;
        None
    }
}

impl<R> StreamParser<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    /// Runs the parser on its own task.
    ///
    /// `callback` sees every message in stream order, then exactly one
    /// [`ParserEvent::Closed`]. The loop ends at end of stream, on a read
    /// error, or when `stop` fires (or its sender is dropped). A panic in the
    /// loop, including one raised by `callback`, is reported as
    /// [`ParserExit::Failed`].
    pub fn start<F>(mut self, callback: F, mut stop: oneshot::Receiver<()>) -> JoinHandle<()>
    where
        F: FnMut(ParserEvent) + Send + 'static,
    {
        let callback = Arc::new(Mutex::new(callback));
        let loop_callback = callback.clone();

        let read_loop = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop => break ParserExit::Stopped,
                    next = self.next_message() => match next {
                        Ok(Some(message)) => {
                            let mut callback = loop_callback.lock();
                            (&mut *callback)(ParserEvent::Message(message));
                        }
                        Ok(None) => break ParserExit::EndOfStream,
                        Err(e) => {
                            error!("error reading SIP stream: {}", e);
                            break ParserExit::Failed(e);
                        }
                    },
                }
            }
        });

        tokio::spawn(async move {
            let exit = match read_loop.await {
                Ok(exit) => exit,
                Err(e) => {
                    error!("parser task failed: {}", e);
                    ParserExit::Failed(Error::TaskFailed(e.to_string()))
                }
            };
            debug!("parser loop finished: {:?}", exit);
            let mut callback = callback.lock();
            (&mut *callback)(ParserEvent::Closed(exit));
        })
    }
}

fn parse_content_length(value: &str) -> usize {
    match value.trim().parse::<usize>() {
        Ok(len) if len <= MAX_BODY_SIZE => len,
        Ok(len) => {
            warn!("Content-Length {} exceeds {} bytes, assuming 0", len, MAX_BODY_SIZE);
            0
        }
        Err(_) => {
            warn!("Content-Length {:?} is not a number, assuming 0", value);
            0
        }
    }
}

fn parse_headline(line: &str) -> Headline {
    let mut parts = line.splitn(3, ' ');
    let first = parts.next().unwrap_or_default();
    let second = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default();

    if first == SIP_VERSION {
        let code = second.parse().unwrap_or_else(|_| {
            warn!("status code {:?} is not a number, assuming {}", second, FALLBACK_STATUS_CODE);
            FALLBACK_STATUS_CODE
        });
        Headline::Response {
            version: first.to_string(),
            code,
            reason: rest.to_string(),
        }
    } else {
        Headline::Request {
            method: first.to_string(),
            uri: second.to_string(),
            version: if rest.is_empty() { SIP_VERSION } else { rest }.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    async fn parse_all(input: &[u8]) -> Vec<Message> {
        let mut parser = StreamParser::new(input);
        let mut out = Vec::new();
        while let Some(message) = parser.next_message().await.unwrap() {
            out.push(message);
        }
        out
    }

    #[tokio::test]
    async fn parses_request_headers_in_order() {
        let raw = b"INVITE sip:bob@example.com SIP/2.0\r\nVia: SIP/2.0/TCP a\r\nVia: SIP/2.0/TCP b\r\nFrom: <sip:alice@example.com>;tag=1\r\nContent-Length: 0\r\n\r\n";
        let messages = parse_all(raw).await;

        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.kind(), MessageKind::Request);
        assert_eq!(msg.method(), Some("INVITE"));
        assert_eq!(msg.uri(), Some("sip:bob@example.com"));
        let names: Vec<_> = msg.headers().iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Via", "Via", "From", "Content-Length"]);
    }

    #[tokio::test]
    async fn response_reason_keeps_all_words() {
        let messages = parse_all(b"SIP/2.0 486 Busy Here\r\n\r\n").await;
        assert_eq!(messages[0].status_code(), Some(486));
        assert_eq!(messages[0].reason(), Some("Busy Here"));
    }

    #[tokio::test]
    async fn bad_status_code_becomes_400() {
        let messages = parse_all(b"SIP/2.0 abc Weird\r\nContent-Length: 0\r\n\r\n").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status_code(), Some(FALLBACK_STATUS_CODE));
    }

    #[tokio::test]
    async fn reads_body_of_content_length() {
        let raw = b"MESSAGE sip:bob@example.com SIP/2.0\r\nContent-Length: 5\r\n\r\nhelloOPTIONS sip:x SIP/2.0\r\n\r\n";
        let messages = parse_all(raw).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(&messages[0].body()[..], b"hello");
        assert_eq!(messages[1].method(), Some("OPTIONS"));
        assert!(messages[1].body().is_empty());
    }

    #[tokio::test]
    async fn non_numeric_content_length_means_no_body() {
        let raw = b"SIP/2.0 200 OK\r\nContent-Length: lots\r\n\r\nSIP/2.0 180 Ringing\r\n\r\n";
        let messages = parse_all(raw).await;
        assert_eq!(messages.len(), 2);
        assert!(messages[0].body().is_empty());
        assert_eq!(messages[1].status_code(), Some(180));
    }

    #[tokio::test]
    async fn lowercase_content_length_is_not_a_length() {
        let raw = b"SIP/2.0 200 OK\r\ncontent-length: 3\r\n\r\nSIP/2.0 202 Accepted\r\n\r\n";
        let messages = parse_all(raw).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].status_code(), Some(202));
    }

    #[tokio::test]
    async fn tolerates_bare_lf_and_malformed_header_lines() {
        let raw = b"SIP/2.0 200 OK\nCall-ID: abc\nGarbage\nCSeq: 1 REGISTER\n\n";
        let messages = parse_all(raw).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].call_id(), Some("abc"));
        assert_eq!(messages[0].headers().len(), 2);
    }

    #[tokio::test]
    async fn oversized_content_length_means_no_body() {
        let raw = b"SIP/2.0 100 Trying\r\nContent-Length: 18446744073709551615\r\n\r\nSIP/2.0 200 OK\r\nContent-Length: 0\r\n\r\n";
        let messages = parse_all(raw).await;
        assert_eq!(messages.len(), 2);
        assert!(messages[0].body().is_empty());
        assert_eq!(messages[1].status_code(), Some(200));

        // one past the limit, still a valid usize
        let raw = format!(
            "SIP/2.0 200 OK\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_SIZE + 1
        );
        let messages = parse_all(raw.as_bytes()).await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].body().is_empty());
    }

    #[tokio::test]
    async fn started_parser_survives_oversized_content_length() {
        let raw: &'static [u8] =
            b"SIP/2.0 200 OK\r\nContent-Length: 18446744073709551615\r\n\r\n";
        let (_stop_tx, stop_rx) = oneshot::channel();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let handle = StreamParser::new(raw).start(move |event| sink.lock().push(event), stop_rx);
        handle.await.unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ParserEvent::Message(m) if m.status_code() == Some(200)));
        assert!(matches!(events[1], ParserEvent::Closed(ParserExit::EndOfStream)));
    }

    #[tokio::test]
    async fn panicking_callback_still_gets_closed() {
        let raw: &'static [u8] = b"OPTIONS sip:x SIP/2.0\r\n\r\nOPTIONS sip:y SIP/2.0\r\n\r\n";
        let (_stop_tx, stop_rx) = oneshot::channel();
        let (closed_tx, mut closed_rx) = tokio::sync::mpsc::unbounded_channel();

        let handle = StreamParser::new(raw).start(
            move |event| match event {
                ParserEvent::Message(_) => panic!("handler bug"),
                ParserEvent::Closed(exit) => {
                    let _ = closed_tx.send(exit);
                }
            },
            stop_rx,
        );
        handle.await.unwrap();

        assert!(matches!(
            closed_rx.recv().await,
            Some(ParserExit::Failed(Error::TaskFailed(_)))
        ));
        assert!(closed_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn truncated_message_is_dropped_at_end_of_stream() {
        let raw = b"SIP/2.0 200 OK\r\nContent-Length: 0\r\n\r\nSIP/2.0 200 OK\r\nContent-Length: 10\r\n\r\nabc";
        let mut parser = StreamParser::new(&raw[..]);
        assert!(parser.next_message().await.unwrap().is_some());
        assert!(parser.next_message().await.unwrap().is_none());
        assert_eq!(parser.state(), ParserState::FirstLine);
    }
}
