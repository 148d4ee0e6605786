//! The reload scheduling machinery shared by [`super::KeystoreKeyStrategy`]
//! and [`super::ScriptedKeyStrategy`].
//!
//! A single background task per strategy instance calls `should_reload`,
//! and on a positive answer, `do_reload`, at a fixed interval. The task is
//! cancelled deterministically on `destroy()`: cancellation interrupts the
//! task only while it is sleeping between ticks, never mid-reload, so an
//! in-flight `do_reload` always runs to completion.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A point-in-time snapshot of a reloading strategy's health, exposed for
/// monitoring and tests. Mirrors the kind of fields an audit event would
/// carry, simplified to what `should_reload`/`do_reload` themselves need.
#[derive(Debug, Clone, Default)]
pub struct ReloadStatus {
    pub last_reload_attempt: Option<DateTime<Utc>>,
    pub last_successful_reload: Option<DateTime<Utc>>,
    pub last_failure_cause: Option<String>,
}

/// Implemented by anything the background scheduler can drive.
pub trait Reloadable: Send + Sync {
    /// Cheap check: is there reason to believe a reload would pick up new
    /// material? Called on every tick of the scheduler.
    fn should_reload(&self) -> bool;

    /// Performs the reload. Only called after `should_reload` returns
    /// `true`. Implementations must leave any previously loaded key
    /// material intact on failure.
    fn do_reload(&self) -> Result<(), String>;
}

/// A handle to a spawned background reload task. Dropping this handle
/// without calling [`ReloadHandle::cancel`] leaves the task running;
/// `KeyStrategy` variants are expected to call `cancel` from their
/// `destroy()` implementation.
pub struct ReloadHandle {
    notify: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ReloadHandle {
    /// Spawns a task that calls `target.should_reload()` every `interval`
    /// and follows up with `target.do_reload()` when it returns `true`.
    /// Requires a Tokio runtime to already be running.
    pub fn spawn(interval: Duration, target: Arc<dyn Reloadable>) -> Self {
        let notify = Arc::new(Notify::new());
        let cancel_signal = notify.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel_signal.notified() => break,
                }
                if target.should_reload() {
                    if let Err(cause) = target.do_reload() {
                        tracing::warn!(%cause, "background key reload failed");
                    }
                }
            }
        });
        Self { notify, task }
    }

    /// Cancels the background task. Returns once the task has observed the
    /// cancellation and exited; if a reload is in progress this waits for
    /// it to finish first.
    pub async fn cancel(self) {
        self.notify.notify_one();
        let _ = self.task.await;
    }
}
