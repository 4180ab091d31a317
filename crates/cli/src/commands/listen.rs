//! Listen command - answer inbound calls until Ctrl+C

use anyhow::{Context, Result};
use sipbell_client_core::Client;
use tokio::signal::ctrl_c;
use tracing::info;

/// Execute listen command
pub async fn execute(client: &Client, transport: &str, host: &str, port: u16) -> Result<()> {
    client.on_incoming_call(|call| info!("incoming call from {}", call.from));
    client.on_cancel(|call| info!("call from {} cancelled", call.from));

    let addr = client
        .listen(transport, host, port)
        .await
        .with_context(|| format!("Failed to listen on {}:{}", host, port))?;
    info!("listening on {}, press Ctrl+C to stop", addr);

    ctrl_c().await.context("Failed to listen for Ctrl+C")?;

    info!("shutting down");
    client.stop_listening_all().await;
    Ok(())
}
