//! The client: composition root of the stack
//!
//! A [`Client`] owns the listeners it started and the call callbacks shared
//! by all inbound dialogs, and runs registrations on request.
//!
//! ```rust,no_run
//! use sipbell_client_core::{Client, ClientConfig};
//!
//! # async fn example() -> Result<(), sipbell_client_core::ClientError> {
//! let client = Client::new(ClientConfig::default());
//! client.on_incoming_call(|call| println!("ringing: {}", call.from));
//! let addr = client.listen("tcp", "0.0.0.0", 5060).await?;
//! println!("listening on {}", addr);
//! # client.stop_listening_all().await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use sipbell_dialog_core::{Dialog, RegisterInfo};
use sipbell_sip_transport::{ConnectionInfo, Listener, TransportKind};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::dispatcher::{self, Call, Callbacks};
use crate::error::{ClientError, ClientResult};
use crate::registration::{self, RegistrationOutcome};

/// SIP user agent: listeners, call callbacks and registration
pub struct Client {
    config: RwLock<ClientConfig>,
    callbacks: Arc<Callbacks>,
    listeners: Mutex<HashMap<String, Listener>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: RwLock::new(config),
            callbacks: Arc::new(Callbacks::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> ClientConfig {
        self.config.read().clone()
    }

    /// Transport used by [`listen`](Self::listen) when given an empty one
    pub fn set_default_transport(&self, transport: &str) -> ClientResult<()> {
        let kind: TransportKind = transport.parse()?;
        self.config.write().default_transport = kind.to_string();
        Ok(())
    }

    /// Called after an inbound INVITE has been answered with 100 and 180
    pub fn on_incoming_call<F>(&self, handler: F)
    where
        F: Fn(Call) + Send + Sync + 'static,
    {
        self.callbacks.set_on_call(Arc::new(handler));
    }

    /// Called after an inbound CANCEL has been answered with 200
    pub fn on_cancel<F>(&self, handler: F)
    where
        F: Fn(Call) + Send + Sync + 'static,
    {
        self.callbacks.set_on_cancel(Arc::new(handler));
    }

    /// Starts a listener and returns the address it is bound to.
    ///
    /// An empty `transport` means the configured default. Listening twice on
    /// the same transport, host and port fails with
    /// [`ClientError::DuplicateListener`].
    pub async fn listen(&self, transport: &str, host: &str, port: u16) -> ClientResult<SocketAddr> {
        let (transport, dialog_config) = {
            let config = self.config.read();
            let transport = if transport.is_empty() {
                config.default_transport.clone()
            } else {
                transport.to_string()
            };
            (transport, config.dialog_config())
        };
        let info = ConnectionInfo::new(transport, host, port);
        let key = info.key()?;

        let mut listeners = self.listeners.lock().await;
        if listeners.contains_key(&key) {
            return Err(ClientError::DuplicateListener { key });
        }

        let callbacks = self.callbacks.clone();
        let listener = Listener::bind(info, move |stream, peer| {
            let dialog = Dialog::new(stream, Some(peer), dialog_config.clone());
            debug!(dialog_id = %dialog.id(), "inbound dialog from {}", peer);
            dispatcher::install(&dialog, callbacks.clone());
        })
        .await?;

        let local_addr = listener.local_addr();
        info!("listening on {} ({})", local_addr, key);
        listeners.insert(key, listener);
        Ok(local_addr)
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.lock().await.len()
    }

    /// Stops every listener concurrently and waits for all of them.
    ///
    /// Dialogs already accepted keep running.
    pub async fn stop_listening_all(&self) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .await
            .drain()
            .map(|(_, listener)| listener)
            .collect();
        let count = listeners.len();

        let mut stopping = JoinSet::new();
        for mut listener in listeners {
            stopping.spawn(async move {
                listener.stop().await;
                listener.local_addr()
            });
        }
        while let Some(stopped) = stopping.join_next().await {
            match stopped {
                Ok(addr) => debug!("listener on {} stopped", addr),
                Err(e) => error!("stopping listener failed: {}", e),
            }
        }
        info!("stopped {} listeners", count);
    }

    /// Registers with the registrar named in `info`
    pub async fn try_register(&self, info: &RegisterInfo) -> RegistrationOutcome {
        let (dialog_config, wait) = {
            let config = self.config.read();
            (config.dialog_config(), config.register_timeout())
        };
        registration::register(info, dialog_config, wait).await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}
