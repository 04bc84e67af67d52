//! Per-call loopback connections to the daemon.

use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use thiserror::Error;

use crate::config::ClientConfig;
use crate::error::{Effect, Transience};
use crate::wire::{self, Request, Response, WireError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("could not connect to the warden daemon: {0}")]
    Connect(#[source] std::io::Error),
    #[error("connection to the warden daemon broke mid-exchange: {0}")]
    Io(#[source] std::io::Error),
    #[error("daemon sent an indecodable response: {0}")]
    Protocol(#[source] WireError),
}

impl TransportError {
    /// Whether retrying the exchange on a fresh socket may succeed.
    pub fn transience(&self) -> Transience {
        match self {
            TransportError::Connect(_) | TransportError::Io(_) => Transience::Retryable,
            TransportError::Protocol(_) => Transience::Permanent,
        }
    }

    /// What we know about side effects when this error is returned.
    pub fn effect(&self) -> Effect {
        match self {
            // The request never reached the daemon.
            TransportError::Connect(_) => Effect::None,
            TransportError::Io(_) | TransportError::Protocol(_) => Effect::Unknown,
        }
    }

    fn from_wire(err: WireError) -> Self {
        match err {
            // A read that failed or truncated is a broken connection, not a
            // protocol violation.
            WireError::Io(e) => TransportError::Io(e),
            other => TransportError::Protocol(other),
        }
    }
}

/// One exchange per socket: connect, write the frame, read the response,
/// release. No pooling or reuse, so concurrent calls never share in-flight
/// connection state and a derped exchange cannot poison the next one.
#[derive(Debug, Clone)]
pub struct Connection {
    addr: SocketAddr,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
}

impl Connection {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), config.port),
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
        }
    }

    /// Send one request and read its response on a fresh socket.
    pub fn exchange(&self, request: &Request) -> Result<Response, TransportError> {
        let frame = wire::encode_request(request).map_err(TransportError::from_wire)?;
        let mut stream = self.connect()?;
        stream.write_all(&frame).map_err(TransportError::Io)?;
        wire::decode_response(&mut stream, request.message_type())
            .map_err(TransportError::from_wire)
    }

    /// Send a VERIFY frame and read the bare authorization code.
    pub fn exchange_verify(&self, request: &Request) -> Result<i32, TransportError> {
        let frame = wire::encode_request(request).map_err(TransportError::from_wire)?;
        let mut stream = self.connect()?;
        stream.write_all(&frame).map_err(TransportError::Io)?;
        wire::read_verify_code(&mut stream).map_err(TransportError::from_wire)
    }

    /// Liveness probe: write one VOID frame, report success purely on the
    /// write, never read. Answers "is the daemon reachable at all",
    /// independent of token state.
    pub fn probe(&self) -> bool {
        let frame = match wire::encode_request(&Request::Void) {
            Ok(frame) => frame,
            Err(_) => return false,
        };
        match self.connect() {
            Ok(mut stream) => match stream.write_all(&frame) {
                Ok(()) => true,
                Err(err) => {
                    tracing::debug!("liveness probe write failed: {err}");
                    false
                }
            },
            Err(err) => {
                tracing::debug!("liveness probe connect failed: {err}");
                false
            }
        }
    }

    fn connect(&self) -> Result<TcpStream, TransportError> {
        let stream = match self.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&self.addr, timeout),
            None => TcpStream::connect(self.addr),
        }
        .map_err(TransportError::Connect)?;
        stream
            .set_read_timeout(self.read_timeout)
            .map_err(TransportError::Connect)?;
        Ok(stream)
    }
}
