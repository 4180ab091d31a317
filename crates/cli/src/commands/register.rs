//! Register command - one REGISTER exchange with a registrar

use anyhow::{anyhow, Result};
use sipbell_client_core::{
    Client, ConnectionInfo, RegisterInfo, RegistrationOutcome, UserCredential,
};
use tracing::{info, warn};

/// Execute register command
pub async fn execute(
    client: &Client,
    registrar: &str,
    registrar_port: u16,
    host: &str,
    port: u16,
    username: &str,
    password: Option<&str>,
) -> Result<()> {
    let transport = client.config().default_transport;
    let credential = match password {
        Some(password) => UserCredential::digest(username, password),
        None => UserCredential::unauthenticated(username),
    };
    let info = RegisterInfo::new(
        ConnectionInfo::new(transport.as_str(), host, port),
        ConnectionInfo::new(transport.as_str(), registrar, registrar_port),
        username,
        credential,
    );

    info!("registering {} with {}", username, info.registrar);
    match client.try_register(&info).await {
        RegistrationOutcome::Okay => {
            info!("registration successful");
            Ok(())
        }
        RegistrationOutcome::Unauthorized(error) => {
            warn!("registration unauthorized");
            Err(match error {
                Some(e) => anyhow!(e).context("registrar refused authorization"),
                None => anyhow!("registrar refused authorization"),
            })
        }
        RegistrationOutcome::Error(e) => Err(anyhow!(e).context("registration failed")),
    }
}
