//! Error types for the progress engine.

use thiserror::Error;

/// Which transport raised a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Network module transport
    Netmod,
    /// Shared-memory transport
    Shm,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Netmod => write!(f, "netmod"),
            TransportKind::Shm => write!(f, "shm"),
        }
    }
}

/// Errors surfaced by the progress engine.
///
/// The engine does not interpret collaborator failures; it only reports the
/// first one it hits. The remaining variants come from engine construction
/// and snapshot validation.
///
/// # Examples
///
/// ```
/// use vci_progress::error::{ProgressError, ProgressResult, TransportKind};
///
/// let err = ProgressError::Transport {
///     kind: TransportKind::Netmod,
///     vci: 3,
///     reason: "link down".to_string(),
/// };
/// assert_eq!(err.to_string(), "netmod transport failed on vci 3: link down");
///
/// let ok: ProgressResult<()> = Ok(());
/// assert!(ok.is_ok());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgressError {
    #[error("{kind} transport failed on vci {vci}: {reason}")]
    Transport {
        kind: TransportKind,
        vci: usize,
        reason: String,
    },
    #[error("progress hook failed: {0}")]
    Hook(String),
    #[error("failed-process detection failed: {0}")]
    FailedProcess(String),
    #[error("work queue progress failed: {0}")]
    WorkQueue(String),
    #[error("vci {vci} out of range (registry holds {count})")]
    InvalidContext { vci: usize, count: usize },
    #[error("requested {requested} contexts, at most {max} supported")]
    TooManyContexts { requested: usize, max: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
    #[error("lock guard for vci {vci} was taken from a different registry")]
    ForeignGuard { vci: usize },
}

impl ProgressError {
    /// Shorthand for a transport failure.
    pub fn transport(kind: TransportKind, vci: usize, reason: impl Into<String>) -> Self {
        ProgressError::Transport {
            kind,
            vci,
            reason: reason.into(),
        }
    }

    /// True when the failure was raised by a collaborator rather than by
    /// engine-side validation.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            ProgressError::Transport { .. }
                | ProgressError::Hook(_)
                | ProgressError::FailedProcess(_)
                | ProgressError::WorkQueue(_)
        )
    }
}

/// Result type for progress operations
pub type ProgressResult<T> = Result<T, ProgressError>;
