#![forbid(unsafe_code)]

//! Client library for the warden daemon.
//!
//! The warden daemon performs privileged device-control operations on behalf
//! of unprivileged callers. This crate implements the client side of its
//! loopback protocol: capability-token caching and verification, the binary
//! request/response framing, and the bounded retry orchestration around each
//! dispatch. Per-service wrappers and platform bootstrap (permission prompts,
//! token persistence) live with the embedding application, which supplies a
//! [`TokenSource`] and calls [`WardenClient::run`] from a worker thread.

pub mod client;
pub mod config;
pub mod error;
pub mod token;
pub mod transport;
pub mod wire;

pub use client::WardenClient;
pub use config::ClientConfig;
pub use error::{Effect, Error, Transience};
pub use token::{Token, TokenSource, TokenStore};
pub use transport::TransportError;
pub use wire::{ExceptionCode, MessageType, Request, Response};

pub type Result<T> = std::result::Result<T, Error>;
