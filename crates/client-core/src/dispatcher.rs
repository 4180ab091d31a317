//! Handling of requests on inbound dialogs
//!
//! Every connection accepted by a listener gets a dialog whose handler is
//! installed here. INVITE is answered with 100 Trying and 180 Ringing before
//! the incoming-call callback runs; CANCEL is answered with 200 OK before the
//! cancel callback runs. Everything else is logged and ignored.

use std::sync::Arc;

use parking_lot::RwLock;
use sipbell_dialog_core::Dialog;
use sipbell_sip_core::{Headline, Message};
use tracing::{debug, info, warn};

/// The caller of an inbound INVITE or CANCEL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// From header of the request
    pub from: String,
}

impl Call {
    fn from_request(message: &Message) -> Self {
        Self {
            from: message.from().unwrap_or_default().to_string(),
        }
    }
}

/// Application callback for call events.
///
/// Runs on the dialog's read task and should return quickly.
pub type CallHandler = Arc<dyn Fn(Call) + Send + Sync>;

/// Callbacks shared by every inbound dialog of a client
#[derive(Default)]
pub struct Callbacks {
    on_call: RwLock<Option<CallHandler>>,
    on_cancel: RwLock<Option<CallHandler>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_call(&self, handler: CallHandler) {
        *self.on_call.write() = Some(handler);
    }

    pub fn set_on_cancel(&self, handler: CallHandler) {
        *self.on_cancel.write() = Some(handler);
    }

    fn notify_call(&self, call: Call) {
        let handler = self.on_call.read().clone();
        match handler {
            Some(handler) => handler(call),
            None => debug!("no incoming-call handler for {}", call.from),
        }
    }

    fn notify_cancel(&self, call: Call) {
        let handler = self.on_cancel.read().clone();
        match handler {
            Some(handler) => handler(call),
            None => debug!("no cancel handler for {}", call.from),
        }
    }
}

/// Routes the requests arriving on `dialog` to `callbacks`
pub fn install(dialog: &Dialog, callbacks: Arc<Callbacks>) {
    dialog.on_message(move |dialog, message| handle(dialog, message, &callbacks));
}

fn handle(dialog: &Dialog, message: Message, callbacks: &Callbacks) {
    let method = match message.headline() {
        Headline::Request { method, .. } => method.as_str(),
        Headline::Response { code, reason, .. } => {
            debug!(
                dialog_id = %dialog.id(),
                correlation_id = %message.correlation_id(),
                "ignoring {} {} on inbound dialog",
                code,
                reason
            );
            return;
        }
    };

    match method {
        "INVITE" => {
            let replied = dialog
                .reply_100_trying()
                .and_then(|_| dialog.reply_180_ringing());
            if let Err(e) = replied {
                warn!(dialog_id = %dialog.id(), "cannot answer INVITE: {}", e);
                return;
            }
            let call = Call::from_request(&message);
            info!(dialog_id = %dialog.id(), "incoming call from {}", call.from);
            callbacks.notify_call(call);
        }
        "CANCEL" => {
            if let Err(e) = dialog.reply_200_ok() {
                warn!(dialog_id = %dialog.id(), "cannot answer CANCEL: {}", e);
                return;
            }
            let call = Call::from_request(&message);
            info!(dialog_id = %dialog.id(), "call from {} cancelled", call.from);
            callbacks.notify_cancel(call);
        }
        other => debug!(
            dialog_id = %dialog.id(),
            correlation_id = %message.correlation_id(),
            "ignoring {} request",
            other
        ),
    }
}
