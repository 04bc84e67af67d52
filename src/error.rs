use thiserror::Error;

use crate::transport::TransportError;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (transient contention/outage).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// What we know about side effects when an error is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Definitely no side effects occurred.
    None,
    /// Side effects definitely occurred on the daemon.
    Some,
    /// We don't know if side effects occurred.
    Unknown,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::Some => "some",
            Effect::Unknown => "unknown",
        }
    }
}

/// Crate-level dispatch error.
///
/// The three variants are the three recovery paths a caller has: ask the user
/// to grant access, show the daemon's own message, or treat the daemon as
/// temporarily unreachable.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No token could be acquired, or the daemon kept rejecting it.
    #[error("not authorized to access the warden daemon: {reason}")]
    Security { reason: String },

    /// The daemon accepted the dispatch but the requested operation failed.
    #[error("warden command failed: {message}")]
    RemoteCommand { message: String },

    /// The retry budget for transport failures is exhausted.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    pub(crate) fn security(reason: impl Into<String>) -> Self {
        Error::Security {
            reason: reason.into(),
        }
    }

    pub fn transience(&self) -> Transience {
        match self {
            // Resolving a permission problem is out-of-band, not a retry.
            Error::Security { .. } => Transience::Permanent,
            Error::RemoteCommand { .. } => Transience::Permanent,
            Error::Transport(e) => e.transience(),
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Security { .. } => Effect::None,
            // The daemon ran its dispatch logic before failing.
            Error::RemoteCommand { .. } => Effect::Unknown,
            Error::Transport(e) => e.effect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_is_permanent_with_no_effect() {
        let err = Error::security("no permission grant");
        assert_eq!(err.transience(), Transience::Permanent);
        assert_eq!(err.effect(), Effect::None);
    }

    #[test]
    fn remote_command_carries_daemon_message() {
        let err = Error::RemoteCommand {
            message: "overlay not found".to_string(),
        };
        assert!(err.to_string().contains("overlay not found"));
        assert!(!err.transience().is_retryable());
    }
}
