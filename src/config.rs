//! Client configuration and env overrides.

use std::time::Duration;

/// Well-known loopback port the warden daemon listens on.
pub const DEFAULT_PORT: u16 = 13212;

const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Tunables for one [`crate::WardenClient`].
///
/// The defaults reproduce the daemon's published contract (port, ten-attempt
/// retry bounds); the timeouts are a local strengthening so a hung daemon
/// connection cannot block a dispatch attempt forever.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub port: u16,
    /// `None` disables the connect deadline.
    pub connect_timeout: Option<Duration>,
    /// `None` disables the read deadline.
    pub read_timeout: Option<Duration>,
    /// Bound for each of the three retry loops: token acquisition, token
    /// verification, and transport sends.
    pub max_attempts: u32,
    /// Initial delay between transport send attempts; doubles per attempt,
    /// capped at 200ms.
    pub retry_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl ClientConfig {
    /// Defaults with `WARDEN_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        apply_env_overrides(&mut config);
        config
    }
}

/// Apply `WARDEN_*` overrides in place. Invalid values are ignored with a
/// warning rather than failing the caller. A timeout of `0` ms disables that
/// deadline.
pub fn apply_env_overrides(config: &mut ClientConfig) {
    if let Some(port) = parse_env("WARDEN_PORT") {
        config.port = port;
    }

    if let Some(ms) = parse_env::<u64>("WARDEN_CONNECT_TIMEOUT_MS") {
        config.connect_timeout = timeout_from_ms(ms);
    }

    if let Some(ms) = parse_env::<u64>("WARDEN_READ_TIMEOUT_MS") {
        config.read_timeout = timeout_from_ms(ms);
    }

    if let Some(attempts) = parse_env::<u32>("WARDEN_MAX_ATTEMPTS") {
        if attempts == 0 {
            tracing::warn!("WARDEN_MAX_ATTEMPTS must be at least 1, ignoring");
        } else {
            config.max_attempts = attempts;
        }
    }
}

fn timeout_from_ms(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("invalid {name}, ignoring: {err}");
            None
        }
    }
}
