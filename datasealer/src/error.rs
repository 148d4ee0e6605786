use thiserror::Error;

/// Errors returned by [`crate::sealer::DataSealer::wrap`] and
/// [`crate::sealer::DataSealer::unwrap`].
///
/// Deliberately coarse: per the envelope's non-goals, callers are not meant
/// to branch on *why* an unwrap failed beyond "expired or inaccessible" vs.
/// "malformed". Finer detail is still available via the `tracing` events
/// emitted at the call site and via [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum SealError {
    #[error("sealed blob is malformed: {0}")]
    Malformed(String),

    #[error("sealed blob has expired or references an unavailable key")]
    Expired,

    #[error("key strategy could not produce a key: {0}")]
    KeyUnavailable(#[from] KeyStrategyError),

    #[error("cryptographic operation failed")]
    Crypto,

    #[error("{0}")]
    ConstraintViolation(String),

    #[error("component is not initialized or has been destroyed")]
    Lifecycle(#[from] LifecycleError),

    #[error("sealer failed to initialize: {0}")]
    Init(String),
}

/// Errors surfaced by a [`crate::key_strategy::KeyStrategy`] implementation.
#[derive(Debug, Error, Clone)]
pub enum KeyStrategyError {
    #[error("no key is registered under label {0:?}")]
    UnknownLabel(String),

    #[error("key material is currently unavailable: {0}")]
    Unavailable(String),

    #[error("key strategy backing resource is malformed: {0}")]
    SourceMalformed(String),

    #[error("key strategy has been destroyed")]
    Destroyed,
}

/// Errors from the shared [`crate::lifecycle::Lifecycle`] state machine.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("component has already been initialized")]
    AlreadyInitialized,

    #[error("component has not been initialized")]
    NotInitialized,

    #[error("component has been destroyed")]
    Destroyed,
}
