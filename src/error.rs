use thiserror::Error;

/// Errors surfaced by the body intake engine.
///
/// The variants split into two families: stream conditions that a correct
/// caller can hit at runtime (`StreamTruncated`, `Callback`), and programming
/// errors in how the engine is driven (`NotReady`, `DuplicateRegistration`,
/// `ProducerAfterTerminal`, `ListenerMode`, `AsyncNotStarted`) which fail
/// fast and are never retried.
///
/// A transient "no data yet" condition is not an error: it is represented by
/// the unready state and resolved by fill-interest notification.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The stream terminated abnormally while bytes were still expected.
    #[error("stream truncated before end of content")]
    StreamTruncated,

    /// A read was attempted without first confirming readiness.
    #[error("read attempted while not ready")]
    NotReady,

    /// A second read listener registration was attempted on one request.
    #[error("read listener already registered")]
    DuplicateRegistration,

    /// The producer pushed content after a terminal sentinel was already set.
    #[error("content pushed after terminal state")]
    ProducerAfterTerminal,

    /// A blocking read was attempted while a read listener is registered.
    #[error("blocking read while in listener mode")]
    ListenerMode,

    /// A read listener registration was attempted before the request
    /// switched to async mode, so its callbacks could never be delivered.
    #[error("read listener registered outside async mode")]
    AsyncNotStarted,

    /// A listener callback returned an error; the request is abandoned.
    #[error("listener callback failed: {reason}")]
    Callback { reason: String },
}

impl IntakeError {
    pub fn callback<S: ToString>(reason: S) -> Self {
        Self::Callback { reason: reason.to_string() }
    }

    /// Returns true if this error reports misuse of the engine rather than
    /// a stream condition.
    #[inline]
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::NotReady
                | Self::DuplicateRegistration
                | Self::ProducerAfterTerminal
                | Self::ListenerMode
                | Self::AsyncNotStarted
        )
    }
}
