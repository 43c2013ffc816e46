// src/error.rs

use thiserror::Error;

/// Failure taxonomy for a sync run. The driver treats `SessionInvalid` as
/// terminal (operator must re-link out of band); everything else is either
/// transient for the source or already contained per item.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The messaging session was invalidated (logged out). Retrying without
    /// re-linking cannot succeed.
    #[error("session invalidated; re-linking required")]
    SessionInvalid,

    /// The session closed before ever reaching the open state.
    #[error("connection failed before sync started (code {code})")]
    ConnectionFailed { code: u16 },

    /// Timed out waiting for the session to open.
    #[error("timed out connecting to the messaging network")]
    ConnectTimeout,

    /// The restart-required handshake artifact kept recurring past the
    /// retry bound.
    #[error("session restart loop exceeded {attempts} attempts")]
    RestartExhausted { attempts: u32 },

    /// A second trigger arrived while a run held the lease.
    #[error("a sync run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    pub fn is_session_invalid(&self) -> bool {
        matches!(self, Self::SessionInvalid)
    }
}
