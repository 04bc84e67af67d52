//! The dispatcher: authenticated command dispatch with bounded retries.

use std::cmp;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::token::{Token, TokenSource, TokenStore};
use crate::transport::Connection;
use crate::wire::{self, ExceptionCode, MessageType, Request, Response};
use crate::Result;

const MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Client handle for the warden daemon.
///
/// Owns the process's token cache and the acquisition collaborator; every
/// dispatch is self-healing against an expired or never-issued token, so
/// callers never manage authentication explicitly. Calls block on network
/// I/O and belong on a worker thread. The handle is `Sync`: concurrent
/// dispatches each open their own socket and share only the token cache.
pub struct WardenClient {
    config: ClientConfig,
    connection: Connection,
    store: TokenStore,
    source: Arc<dyn TokenSource>,
}

impl WardenClient {
    /// Build a client with [`ClientConfig::from_env`].
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self::with_config(ClientConfig::from_env(), source)
    }

    pub fn with_config(config: ClientConfig, source: Arc<dyn TokenSource>) -> Self {
        let connection = Connection::new(&config);
        Self {
            config,
            connection,
            store: TokenStore::new(),
            source,
        }
    }

    /// `true` if the daemon process is reachable at all, independent of
    /// whether this caller is authorized.
    pub fn is_server_active(&self) -> bool {
        self.connection.probe()
    }

    /// Dispatch one authenticated command and return the daemon's result
    /// string.
    pub fn run(&self, service: &str, command: &str, args: &[&str]) -> Result<String> {
        let token = self.ensure_verified_token()?;
        let request = Request::Command {
            token,
            service: service.to_string(),
            command: command.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        };
        self.send_with_retry(&request)
    }

    /// Authenticated no-op dispatch. Yields the fixed sentinel
    /// [`wire::VOID_RETURN_PASS`], since VOID responses carry no payload.
    pub fn ping(&self) -> Result<String> {
        // The frame omits the token, but the dispatch still authenticates.
        self.ensure_verified_token()?;
        self.send_with_retry(&Request::Void)
    }

    // =========================================================================
    // Token preparation
    // =========================================================================

    /// Ensure a token is cached and currently accepted by the daemon.
    ///
    /// Both loops are bounded; falling out of either means the caller never
    /// completed the out-of-band permission grant (or lost it), which only
    /// they can fix.
    fn ensure_verified_token(&self) -> Result<Token> {
        if !self.store.has_token() {
            for _ in 0..self.config.max_attempts {
                if self.store.refresh(self.source.as_ref()) {
                    break;
                }
            }
            if !self.store.has_token() {
                return Err(Error::security("the access permission was never granted"));
            }
        }

        // A rejected token may simply have been rotated by the daemon, so
        // refresh and try again up to the bound.
        for attempt in 1..=self.config.max_attempts {
            if let Some(token) = self.store.current() {
                if self.verify(token) {
                    return Ok(token);
                }
            }
            tracing::debug!(attempt, "token not verified, refreshing");
            self.store.refresh(self.source.as_ref());
        }

        Err(Error::security("the daemon kept rejecting the token"))
    }

    /// `true` iff the daemon answers the authorized sentinel. Transport
    /// failures count as "not verified"; nothing propagates past here.
    fn verify(&self, token: Token) -> bool {
        match self.connection.exchange_verify(&Request::Verify { token }) {
            Ok(code) => code == wire::VERIFICATION_AUTHORIZED,
            Err(err) => {
                tracing::debug!("verification exchange failed: {err}");
                false
            }
        }
    }

    // =========================================================================
    // Send
    // =========================================================================

    /// Send the frame, retrying retryable transport failures on a fresh
    /// socket with capped exponential backoff. Fresh loopback sockets derp
    /// under quick successive operations; a retry usually lands.
    fn send_with_retry(&self, request: &Request) -> Result<String> {
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 1u32;
        loop {
            match self.connection.exchange(request) {
                Ok(response) => return interpret(request.message_type(), response),
                Err(err) if err.transience().is_retryable() && attempt < self.config.max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        "transport failure, retrying: {err}"
                    );
                    thread::sleep(backoff);
                    backoff = cmp::min(backoff * 2, MAX_BACKOFF);
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!("dispatch failed after {attempt} attempt(s): {err}");
                    return Err(Error::Transport(err));
                }
            }
        }
    }
}

fn interpret(sent: MessageType, response: Response) -> Result<String> {
    match response.code {
        ExceptionCode::CommandError => Err(Error::RemoteCommand {
            message: response.payload.unwrap_or_default(),
        }),
        ExceptionCode::Security => Err(Error::security("the daemon rejected the dispatch")),
        ExceptionCode::None => Ok(match sent {
            MessageType::Void => wire::VOID_RETURN_PASS.to_string(),
            _ => response.payload.unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_success_yields_the_pass_sentinel() {
        let response = Response {
            code: ExceptionCode::None,
            payload: None,
        };
        assert_eq!(interpret(MessageType::Void, response).unwrap(), "pass");
    }

    #[test]
    fn command_success_yields_the_payload() {
        let response = Response {
            code: ExceptionCode::None,
            payload: Some("enabled".to_string()),
        };
        assert_eq!(interpret(MessageType::Command, response).unwrap(), "enabled");
    }

    #[test]
    fn command_error_surfaces_the_daemon_message() {
        let response = Response {
            code: ExceptionCode::CommandError,
            payload: Some("overlay not found".to_string()),
        };
        match interpret(MessageType::Command, response) {
            Err(Error::RemoteCommand { message }) => assert_eq!(message, "overlay not found"),
            other => panic!("expected RemoteCommand, got {other:?}"),
        }
    }

    #[test]
    fn security_code_surfaces_as_security_error() {
        let response = Response {
            code: ExceptionCode::Security,
            payload: None,
        };
        assert!(matches!(
            interpret(MessageType::Command, response),
            Err(Error::Security { .. })
        ));
    }
}
