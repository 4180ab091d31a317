//! Per-connection message exchange.
//!
//! A [`Dialog`] owns one byte stream. The read half feeds a
//! [`StreamParser`] task that hands every message to the installed handler;
//! the write half is driven by a writer task fed through an unbounded
//! channel, so sending never blocks and keeps the order of the calls.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use sipbell_sip_core::{
    names, random_token, DigestComputation, Message, MessageKind, ParserEvent, ParserExit,
    StreamParser, TOKEN_LEN,
};
use sipbell_sip_core::message::DEFAULT_EXPIRES;
use sipbell_sip_transport::{ConnectionInfo, DEFAULT_TRANSPORT};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::cseq::CSeqCounter;
use crate::error::{DialogError, DialogResult};
use crate::register::{DialogConfig, RegisterInfo};

/// Callback invoked for every message received on a dialog
pub type MessageHandler = Arc<dyn Fn(&Dialog, Message) + Send + Sync>;

/// Headers copied from a request into every reply to it
const REPLY_HEADERS: [&str; 5] = [
    names::VIA,
    names::FROM,
    names::TO,
    names::CALL_ID,
    names::CSEQ,
];

/// Addressing state a dialog learns from traffic
#[derive(Debug, Clone, Default)]
struct DialogState {
    remote_addr: Option<String>,
    local_addr: Option<String>,
    call_id: Option<String>,
    via: Option<String>,
    via_branch: String,
    cseq: CSeqCounter,
    last_request: Option<Message>,
    last_response: Option<Message>,
}

impl DialogState {
    fn observe(&mut self, message: &Message) {
        if let Some(via) = message.via() {
            self.via = Some(via.to_string());
        }
        if let Some(call_id) = message.call_id() {
            self.call_id = Some(call_id.to_string());
        }

        let from = message.from().map(str::to_string);
        let to = message.to().map(str::to_string);
        match message.kind() {
            MessageKind::Request => {
                self.remote_addr = from.or(self.remote_addr.take());
                self.local_addr = to.or(self.local_addr.take());
                self.last_request = Some(message.clone());
            }
            MessageKind::Response => {
                self.local_addr = from.or(self.local_addr.take());
                self.remote_addr = to.or(self.remote_addr.take());
                self.last_response = Some(message.clone());
            }
        }
    }
}

struct DialogInner {
    id: String,
    peer: Option<SocketAddr>,
    config: DialogConfig,
    handler: RwLock<Option<MessageHandler>>,
    state: Mutex<DialogState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    closed: AtomicBool,
}

/// One connection and the messages exchanged on it.
///
/// Cloning is cheap and every clone refers to the same connection.
#[derive(Clone)]
pub struct Dialog {
    inner: Arc<DialogInner>,
}

impl Dialog {
    /// Wraps an established stream and starts reading from it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<S>(stream: S, peer: Option<SocketAddr>, config: DialogConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let state = DialogState {
            via_branch: random_token(TOKEN_LEN),
            ..DialogState::default()
        };
        let dialog = Dialog {
            inner: Arc::new(DialogInner {
                id: Uuid::new_v4().to_string(),
                peer,
                config,
                handler: RwLock::new(None),
                state: Mutex::new(state),
                outbound: Mutex::new(Some(outbound_tx)),
                stop_tx: Mutex::new(Some(stop_tx)),
                closed: AtomicBool::new(false),
            }),
        };
        debug!(dialog_id = %dialog.id(), peer = ?peer, "dialog created");

        tokio::spawn(write_loop(write_half, outbound_rx, dialog.id().to_string()));

        let receiver = dialog.clone();
        StreamParser::new(BufReader::new(read_half)).start(
            move |event| match event {
                ParserEvent::Message(message) => receiver.dispatch(message),
                ParserEvent::Closed(exit) => receiver.finish(exit),
            },
            stop_rx,
        );

        dialog
    }

    /// Dials `info` and wraps the new connection
    pub async fn connect(info: &ConnectionInfo, config: DialogConfig) -> DialogResult<Self> {
        let stream = sipbell_sip_transport::connect(info).await?;
        let peer = stream.peer_addr().ok();
        info!("connected to {}", info);
        Ok(Self::new(stream, peer, config))
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.inner.peer
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Installs the message handler.
    ///
    /// Only one handler exists at a time: installing a new one discards the
    /// previous one, and the next message dispatched goes to the new one.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&Dialog, Message) + Send + Sync + 'static,
    {
        *self.inner.handler.write() = Some(Arc::new(handler));
    }

    /// Removes the installed handler, if any
    pub fn clear_handler(&self) {
        self.inner.handler.write().take();
    }

    pub fn remote_addr(&self) -> Option<String> {
        self.inner.state.lock().remote_addr.clone()
    }

    pub fn local_addr(&self) -> Option<String> {
        self.inner.state.lock().local_addr.clone()
    }

    pub fn call_id(&self) -> Option<String> {
        self.inner.state.lock().call_id.clone()
    }

    pub fn via(&self) -> Option<String> {
        self.inner.state.lock().via.clone()
    }

    pub fn via_branch(&self) -> String {
        self.inner.state.lock().via_branch.clone()
    }

    pub fn last_request(&self) -> Option<Message> {
        self.inner.state.lock().last_request.clone()
    }

    pub fn last_response(&self) -> Option<Message> {
        self.inner.state.lock().last_response.clone()
    }

    /// Queues `message` for writing
    pub fn send_message(&self, message: &Message) -> DialogResult<()> {
        let outbound = self.inner.outbound.lock();
        let tx = outbound.as_ref().ok_or(DialogError::Closed)?;
        trace!(
            dialog_id = %self.id(),
            correlation_id = %message.correlation_id(),
            "sending:\n{}",
            message
        );
        tx.send(message.to_bytes()).map_err(|_| DialogError::Closed)
    }

    /// Replies to the last request received on this dialog, copying its
    /// Via, From, To, Call-ID and CSeq
    pub fn reply(&self, code: u16, reason: &str) -> DialogResult<Message> {
        let request = self.last_request().ok_or(DialogError::NoRequest)?;

        let mut response = Message::response(code, reason);
        for name in REPLY_HEADERS {
            let mut copied = false;
            for value in request.headers().get_all(name) {
                response.add_header(name, value);
                copied = true;
            }
            if !copied {
                warn!(
                    correlation_id = %request.correlation_id(),
                    "request has no {} header to copy into the {} reply",
                    name,
                    code
                );
            }
        }
        response.set_content_length(0);

        self.send_message(&response)?;
        debug!(dialog_id = %self.id(), "sent {} {}", code, reason);
        Ok(response)
    }

    pub fn reply_100_trying(&self) -> DialogResult<Message> {
        self.reply(100, "Trying")
    }

    pub fn reply_180_ringing(&self) -> DialogResult<Message> {
        self.reply(180, "Ringing")
    }

    pub fn reply_200_ok(&self) -> DialogResult<Message> {
        self.reply(200, "OK")
    }

    /// Composes and sends a REGISTER, returning the request as sent.
    ///
    /// Call-ID and the From tag are created on the first send and reused by
    /// later ones; every send takes the next CSeq number.
    pub fn send_register(
        &self,
        info: &RegisterInfo,
        auth: Option<&DigestComputation>,
    ) -> DialogResult<Message> {
        let registrar_host = info.registrar.host.as_str();
        let transport = if info.client.transport.is_empty() {
            DEFAULT_TRANSPORT
        } else {
            info.client.transport.as_str()
        };

        let request = {
            let mut state = self.inner.state.lock();
            let mut msg = Message::request("REGISTER", format!("sip:{}", registrar_host));

            msg.set_via_parts(
                transport,
                &info.client.host,
                info.client.port,
                &state.via_branch,
            );

            match state.local_addr.clone() {
                Some(from) => {
                    msg.set_from(from);
                }
                None => {
                    let tag = random_token(TOKEN_LEN);
                    msg.set_from_parts(&info.username, registrar_host, Some(&tag));
                    state.local_addr = msg.from().map(str::to_string);
                }
            }
            match state.remote_addr.clone() {
                Some(to) => msg.set_to(to),
                None => msg.set_to_parts(&info.username, registrar_host, None),
            };

            let call_id = state
                .call_id
                .get_or_insert_with(|| random_token(TOKEN_LEN))
                .clone();
            let cseq = state.cseq.next_seq();

            msg.set_call_id(call_id)
                .set_cseq(cseq, "REGISTER")
                .set_contact_parts(&info.username, &info.client.host, info.client.port)
                .set_expires(DEFAULT_EXPIRES);
            if let Some(auth) = auth {
                msg.set_authorization(auth.authorization_value());
            }
            msg.set_user_agent(self.inner.config.user_agent.as_str())
                .set_allow(&self.inner.config.allowed_methods)
                .set_content_length(0);
            msg
        };

        self.send_message(&request)?;
        debug!(
            dialog_id = %self.id(),
            correlation_id = %request.correlation_id(),
            authenticated = auth.is_some(),
            "sent REGISTER to {}",
            info.registrar
        );
        Ok(request)
    }

    /// Stops the parser and the writer.
    ///
    /// Messages already queued are still written before the connection is
    /// shut down. Calling this again is a no-op.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(stop) = self.inner.stop_tx.lock().take() {
            let _ = stop.send(());
        }
        self.inner.outbound.lock().take();
        debug!(dialog_id = %self.id(), "dialog closed");
    }

    fn dispatch(&self, message: Message) {
        self.inner.state.lock().observe(&message);

        // Cloned out so the handler may replace itself
        let handler = self.inner.handler.read().clone();
        match handler {
            Some(handler) => handler(self, message),
            None => debug!(
                dialog_id = %self.id(),
                correlation_id = %message.correlation_id(),
                "no handler installed, dropping {}",
                message.headline()
            ),
        }
    }

    fn finish(&self, exit: ParserExit) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.stop_tx.lock().take();
        self.inner.outbound.lock().take();
        self.inner.handler.write().take();
        match exit {
            ParserExit::Failed(e) => warn!(dialog_id = %self.id(), "dialog read failed: {}", e),
            other => info!(dialog_id = %self.id(), "dialog finished: {:?}", other),
        }
    }
}

impl fmt::Debug for Dialog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialog")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn write_loop<W>(mut writer: W, mut outbound_rx: mpsc::UnboundedReceiver<Bytes>, dialog_id: String)
where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = outbound_rx.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            error!(dialog_id = %dialog_id, "error writing to connection: {}", e);
            break;
        }
        if let Err(e) = writer.flush().await {
            error!(dialog_id = %dialog_id, "error flushing connection: {}", e);
            break;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!(dialog_id = %dialog_id, "error shutting down writer: {}", e);
    }
    debug!(dialog_id = %dialog_id, "writer finished");
}
