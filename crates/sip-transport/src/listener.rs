use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connection::ConnectionInfo;
use crate::error::{Error, Result};

// Pause after a failed accept so a persistent error does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// A bound server socket with its accept loop.
///
/// Every accepted connection is handed to the `on_connection` callback and
/// is not tracked afterwards: stopping the listener closes the server socket
/// only.
pub struct Listener {
    info: ConnectionInfo,
    local_addr: SocketAddr,
    running: bool,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Listener {
    /// Binds `info` and starts accepting connections
    pub async fn bind<F>(info: ConnectionInfo, on_connection: F) -> Result<Self>
    where
        F: Fn(TcpStream, SocketAddr) + Send + 'static,
    {
        let kind = info.transport_kind()?;
        let address = info.address();
        let listener = TcpListener::bind(address.as_str())
            .await
            .map_err(|source| Error::BindFailed { address, source })?;
        let local_addr = listener.local_addr()?;
        info!("SIP {} listener bound to {}", kind, local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, on_connection, shutdown_rx));

        Ok(Self {
            info,
            local_addr,
            running: true,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stops accepting and waits until the server socket is closed.
    ///
    /// Calling this again is a no-op.
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("accept loop for {} failed: {}", self.local_addr, e);
            }
        }
        info!("SIP listener on {} stopped", self.local_addr);
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({}, running={})", self.local_addr, self.running)
    }
}

async fn accept_loop<F>(listener: TcpListener, on_connection: F, mut shutdown_rx: oneshot::Receiver<()>)
where
    F: Fn(TcpStream, SocketAddr) + Send + 'static,
{
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("accepted connection from {}", peer);
                    on_connection(stream, peer);
                }
                Err(e) => {
                    warn!("error accepting connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
    debug!("accept loop terminated");
}
