//! The `CREATED -> INITIALIZED -> DESTROYED` state machine shared by every
//! [`crate::key_strategy::KeyStrategy`] variant and by [`crate::sealer::DataSealer`]
//! itself.
//!
//! Transitions are enforced with a single `AtomicU8` rather than a mutex:
//! `should_reload`/`key` lookups happen on every `wrap`/`unwrap` call and
//! must not contend with each other for a lock that destroy() could also be
//! waiting on.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::LifecycleError;

const CREATED: u8 = 0;
const INITIALIZED: u8 = 1;
const DESTROYED: u8 = 2;

/// Tracks a component's position in the shared lifecycle.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(CREATED),
        }
    }

    /// Moves `CREATED -> INITIALIZED`. Errors if called twice or after
    /// `destroy()`.
    pub fn initialize(&self) -> Result<(), LifecycleError> {
        match self
            .state
            .compare_exchange(CREATED, INITIALIZED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(DESTROYED) => Err(LifecycleError::Destroyed),
            Err(_) => Err(LifecycleError::AlreadyInitialized),
        }
    }

    /// Moves to `DESTROYED` from any state. Idempotent: destroying an
    /// already-destroyed component is a no-op, not an error.
    pub fn destroy(&self) {
        self.state.store(DESTROYED, Ordering::Release);
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.load(Ordering::Acquire) == DESTROYED
    }

    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == INITIALIZED
    }

    /// Returns `Ok(())` only while `INITIALIZED`; used as a guard at the top
    /// of any operation that requires a live component.
    pub fn require_initialized(&self) -> Result<(), LifecycleError> {
        match self.state.load(Ordering::Acquire) {
            INITIALIZED => Ok(()),
            DESTROYED => Err(LifecycleError::Destroyed),
            _ => Err(LifecycleError::NotInitialized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let lc = Lifecycle::new();
        assert!(lc.require_initialized().is_err());
        lc.initialize().unwrap();
        assert!(lc.require_initialized().is_ok());
        lc.destroy();
        assert!(matches!(
            lc.require_initialized(),
            Err(LifecycleError::Destroyed)
        ));
    }

    #[test]
    fn double_initialize_errors() {
        let lc = Lifecycle::new();
        lc.initialize().unwrap();
        assert!(matches!(
            lc.initialize(),
            Err(LifecycleError::AlreadyInitialized)
        ));
    }

    #[test]
    fn destroy_is_idempotent() {
        let lc = Lifecycle::new();
        lc.initialize().unwrap();
        lc.destroy();
        lc.destroy();
        assert!(lc.is_destroyed());
    }
}
