//! Registration with a remote registrar
//!
//! A registration dials the registrar, sends REGISTER and waits for the
//! final response. A 401 carrying a Digest challenge is answered once with
//! an authenticated REGISTER when the user has a password.
//!
//! # State machine
//!
//! ```text
//!  Idle ──send──▶ AwaitingFirstResponse ──2xx──▶ Okay
//!                        │  │
//!                        │  └─other final──▶ Error
//!                       401
//!                        │
//!          no password / bad challenge ──▶ Unauthorized
//!                        │
//!                  send with digest
//!                        ▼
//!              AwaitingRetryResponse ──2xx──▶ Okay
//!                        ├──401──▶ Unauthorized
//!                        └─other final──▶ Error
//! ```
//!
//! Each wait is a one-shot hand-off resolved by the dialog's message handler.
//! Provisional (1xx) responses never resolve it, and responses whose CSeq
//! does not belong to the outstanding REGISTER are logged and skipped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sipbell_dialog_core::{Dialog, DialogConfig, RegisterInfo};
use sipbell_sip_core::{
    names, parse_www_authenticate, Challenge, DigestComputation, Error as CoreError, Message,
    MessageKind, UserCredential,
};
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::error::ClientError;

/// Coarse result of a registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationResult {
    Okay,
    Unauthorized,
    Error,
}

impl fmt::Display for RegistrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationResult::Okay => write!(f, "okay"),
            RegistrationResult::Unauthorized => write!(f, "unauthorized"),
            RegistrationResult::Error => write!(f, "error"),
        }
    }
}

/// Outcome of a registration attempt, with the cause when it failed
#[derive(Debug)]
pub enum RegistrationOutcome {
    Okay,
    Unauthorized(Option<ClientError>),
    Error(ClientError),
}

impl RegistrationOutcome {
    pub fn result(&self) -> RegistrationResult {
        match self {
            RegistrationOutcome::Okay => RegistrationResult::Okay,
            RegistrationOutcome::Unauthorized(_) => RegistrationResult::Unauthorized,
            RegistrationOutcome::Error(_) => RegistrationResult::Error,
        }
    }

    pub fn error(&self) -> Option<&ClientError> {
        match self {
            RegistrationOutcome::Okay => None,
            RegistrationOutcome::Unauthorized(e) => e.as_ref(),
            RegistrationOutcome::Error(e) => Some(e),
        }
    }

    pub fn is_okay(&self) -> bool {
        matches!(self, RegistrationOutcome::Okay)
    }
}

/// Where a registration currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    AwaitingFirstResponse,
    AwaitingRetryResponse,
    Okay,
    Unauthorized,
    Error,
}

/// Dials the registrar, registers and closes the connection again.
///
/// `wait` bounds each wait for a final response.
pub async fn register(info: &RegisterInfo, config: DialogConfig, wait: Duration) -> RegistrationOutcome {
    let dialog = match Dialog::connect(&info.registrar, config).await {
        Ok(dialog) => dialog,
        Err(e) => {
            warn!("cannot reach registrar {}: {}", info.registrar, e);
            return RegistrationOutcome::Error(e.into());
        }
    };
    let outcome = register_on(&dialog, info, wait).await;
    dialog.close();
    outcome
}

/// Runs the registration exchange on an already connected dialog
pub async fn register_on(dialog: &Dialog, info: &RegisterInfo, wait: Duration) -> RegistrationOutcome {
    Registration {
        dialog,
        info,
        wait,
        state: RegistrationState::Idle,
    }
    .run()
    .await
}

struct Registration<'a> {
    dialog: &'a Dialog,
    info: &'a RegisterInfo,
    wait: Duration,
    state: RegistrationState,
}

impl Registration<'_> {
    fn transition(&mut self, next: RegistrationState) {
        debug!(
            user = %self.info.username,
            dialog_id = %self.dialog.id(),
            "registration {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    async fn run(mut self) -> RegistrationOutcome {
        self.transition(RegistrationState::AwaitingFirstResponse);
        let response = match self.exchange(None).await {
            Ok(response) => response,
            Err(e) => return self.error(e),
        };

        match response.status_code() {
            Some(code) if (200..300).contains(&code) => self.okay(),
            Some(401) => self.answer_challenge(&response).await,
            _ => self.error(rejected(&response)),
        }
    }

    async fn answer_challenge(mut self, response: &Message) -> RegistrationOutcome {
        let info = self.info;
        let (username, password) = match &info.credential {
            UserCredential::Unauthenticated { .. } => {
                return self.unauthorized(ClientError::AuthorizationRequired);
            }
            UserCredential::Digest { username, password } => (username, password),
        };

        let challenge = match response.www_authenticate() {
            Some(value) => parse_www_authenticate(value),
            None => Err(CoreError::MissingHeader(names::WWW_AUTHENTICATE)),
        };
        let challenge = match challenge {
            Ok(Challenge::Digest(challenge)) => challenge,
            Ok(Challenge::Unknown { scheme }) => {
                return self.unauthorized(ClientError::UnsupportedChallenge { scheme });
            }
            Err(e) => return self.unauthorized(e.into()),
        };

        let computation = DigestComputation::new(
            challenge,
            username.as_str(),
            password.as_str(),
            info.registrar.host.as_str(),
        );

        self.transition(RegistrationState::AwaitingRetryResponse);
        let response = match self.exchange(Some(&computation)).await {
            Ok(response) => response,
            Err(e) => return self.error(e),
        };

        match response.status_code() {
            Some(code) if (200..300).contains(&code) => self.okay(),
            Some(401) => self.unauthorized(ClientError::CredentialsRejected),
            _ => self.error(rejected(&response)),
        }
    }

    /// Sends one REGISTER and waits for its final response
    async fn exchange(&self, auth: Option<&DigestComputation>) -> Result<Message, ClientError> {
        let expected = Arc::new(Mutex::new(None));
        let rx = {
            // Held until the CSeq is known so the handler cannot race it
            let mut expected_guard = expected.lock();
            let rx = await_final_response(self.dialog, expected.clone());
            let request = self.dialog.send_register(self.info, auth)?;
            *expected_guard = Some(request.cseq()?.number);
            rx
        };

        match tokio::time::timeout(self.wait, rx).await {
            Err(_) => Err(ClientError::Timeout(self.wait)),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Ok(Ok(result)) => result,
        }
    }

    fn okay(mut self) -> RegistrationOutcome {
        self.transition(RegistrationState::Okay);
        info!(user = %self.info.username, "registered with {}", self.info.registrar);
        RegistrationOutcome::Okay
    }

    fn unauthorized(mut self, cause: ClientError) -> RegistrationOutcome {
        self.transition(RegistrationState::Unauthorized);
        warn!(user = %self.info.username, "registration unauthorized: {}", cause);
        RegistrationOutcome::Unauthorized(Some(cause))
    }

    fn error(mut self, cause: ClientError) -> RegistrationOutcome {
        self.transition(RegistrationState::Error);
        warn!(user = %self.info.username, "registration failed: {}", cause);
        RegistrationOutcome::Error(cause)
    }
}

fn rejected(response: &Message) -> ClientError {
    ClientError::Rejected {
        code: response.status_code().unwrap_or_default(),
        reason: response.reason().unwrap_or_default().to_string(),
    }
}

/// Installs a handler that resolves the returned receiver with the first
/// final response whose CSeq number matches `expected`.
fn await_final_response(
    dialog: &Dialog,
    expected: Arc<Mutex<Option<u32>>>,
) -> oneshot::Receiver<Result<Message, ClientError>> {
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));

    dialog.on_message(move |_, message| {
        let resolve = |result: Result<Message, ClientError>| match tx.lock().take() {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => debug!("registration wait already resolved, ignoring message"),
        };

        if message.kind() == MessageKind::Request {
            let method = message.method().unwrap_or_default().to_string();
            warn!(
                correlation_id = %message.correlation_id(),
                "unexpected {} request on registration dialog",
                method
            );
            resolve(Err(ClientError::ProtocolDesync {
                reason: format!("received {} request while awaiting a REGISTER response", method),
            }));
            return;
        }

        if !message.headline().is_final() {
            trace!(
                correlation_id = %message.correlation_id(),
                "ignoring provisional {}",
                message.headline()
            );
            return;
        }

        match message.cseq() {
            Err(e) => resolve(Err(ClientError::MalformedCSeq(e))),
            Ok(cseq) => {
                let expected = *expected.lock();
                if expected == Some(cseq.number) {
                    resolve(Ok(message));
                } else {
                    warn!(
                        correlation_id = %message.correlation_id(),
                        "ignoring response for CSeq {} while awaiting {:?}",
                        cseq.number,
                        expected
                    );
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_accessors() {
        assert_eq!(RegistrationOutcome::Okay.result(), RegistrationResult::Okay);
        assert!(RegistrationOutcome::Okay.error().is_none());

        let unauthorized = RegistrationOutcome::Unauthorized(Some(ClientError::AuthorizationRequired));
        assert_eq!(unauthorized.result(), RegistrationResult::Unauthorized);
        assert!(unauthorized.error().is_some_and(|e| e.is_auth_error()));

        let error = RegistrationOutcome::Error(ClientError::ConnectionClosed);
        assert_eq!(error.result(), RegistrationResult::Error);
        assert_eq!(error.result().to_string(), "error");
    }
}
