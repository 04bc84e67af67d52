//! Capability token cache and the acquisition collaborator seam.

use std::fmt;
use std::sync::RwLock;

use uuid::Uuid;

/// Opaque 128-bit capability value proving the caller was granted access.
///
/// The two halves are exactly the two big-endian words of the wire frame.
/// "No token" is modelled as `Option<Token>`, never as a zero value.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Token {
    high: u64,
    low: u64,
}

impl Token {
    pub fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    pub fn high(&self) -> u64 {
        self.high
    }

    pub fn low(&self) -> u64 {
        self.low
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        let (high, low) = uuid.as_u64_pair();
        Self { high, low }
    }

    pub fn as_uuid(&self) -> Uuid {
        Uuid::from_u64_pair(self.high, self.low)
    }
}

// The token is a secret; keep it out of logs and panic messages.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(..)")
    }
}

/// Source of capability tokens, implemented by the embedding application.
///
/// On the reference platform this is an inter-process call to the daemon's
/// token provider; in tests it is a stub. `has_permission` is an optional
/// fast-path gate: returning `false` skips the acquisition call entirely.
/// Correctness does not depend on it, since acquisition failure alone is
/// sufficient signal.
pub trait TokenSource: Send + Sync {
    fn request_token(&self) -> Option<Token>;

    fn has_permission(&self) -> bool {
        true
    }
}

/// Process-lifetime token cache.
///
/// Starts empty and is populated lazily by the dispatcher on first need.
/// Refresh replaces the whole value (last writer wins); there are no merge
/// semantics, so concurrent refreshes are safe.
#[derive(Default)]
pub struct TokenStore {
    current: RwLock<Option<Token>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_token(&self) -> bool {
        self.current().is_some()
    }

    pub fn current(&self) -> Option<Token> {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Ask the source for a fresh token and cache it. Returns whether a token
    /// is present afterwards. A source that answers `None` leaves any
    /// previously cached token in place.
    pub fn refresh(&self, source: &dyn TokenSource) -> bool {
        if !source.has_permission() {
            tracing::debug!("token source reports no permission grant, skipping acquisition");
            return self.has_token();
        }
        match source.request_token() {
            Some(token) => {
                *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(token);
                true
            }
            None => {
                tracing::debug!("token source returned no token");
                self.has_token()
            }
        }
    }
}
