//! Errors raised while driving a server context's lifecycle.

use thiserror::Error;

use lwm2m_core::CoreError;

use crate::lifecycle::LifecycleState;

/// Errors specific to the per-server lifecycle state machine. Dispatch
/// errors from the registry/ACL engine surface as [`CoreError`] and are
/// wrapped here rather than duplicated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// An operation was attempted that does not apply in the context's
    /// current lifecycle state.
    #[error("{operation} is invalid in state {state:?}")]
    InvalidState {
        /// The state the context was in.
        state: LifecycleState,
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// Dispatch, encoding, or ACL failure from the underlying engine crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The bootstrap procedure exhausted its retries with no server
    /// willing to configure this device. The context halts; an operator
    /// must intervene.
    #[error("bootstrap failed permanently: {0}")]
    BootstrapExhausted(String),
}

impl ClientError {
    /// Whether the caller may reasonably retry after this error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Core(e) => e.is_transient(),
            Self::InvalidState { .. } | Self::BootstrapExhausted(_) => false,
        }
    }
}
