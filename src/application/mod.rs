//! Application layer: the schedulers that drive domain records over time.
//!
//! `PollingCoordinator` runs adaptive status polling for backend records and
//! `VerificationController` runs bounded payment confirmation. Both own their
//! registries explicitly; create one instance per scope and share it by
//! cloning the handle.
//!
//! Each monitored resource gets one tokio task that sleeps, calls its injected
//! port, then applies the result. The next wait only starts after that, so two
//! ticks of the same resource never overlap.

pub mod coordinator;
pub mod verification;

use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

thread_local! {
    static CALLBACK_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Marks the current thread as running an observer callback.
struct CallbackScope;

impl CallbackScope {
    fn enter() -> Self {
        CALLBACK_DEPTH.with(|depth| depth.set(depth.get() + 1));
        CallbackScope
    }

    fn active() -> bool {
        CALLBACK_DEPTH.with(|depth| depth.get() > 0)
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        CALLBACK_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// One scheduled record plus the gate its observer callbacks run behind.
///
/// The state lock is only held for short, synchronous updates and reads, never
/// while an observer runs, so callbacks may inspect or stop any record. The
/// callback gate serializes callbacks against [`silence`](Self::silence): once
/// `silence` returns, no callback for this record starts, and one that was
/// already running has returned. From inside a callback `silence` does not
/// wait, since the running callback may be the one that holds the gate.
pub(crate) struct Record<T> {
    state: Mutex<T>,
    callbacks: Mutex<()>,
    silenced: AtomicBool,
}

pub(crate) type Shared<T> = Arc<Record<T>>;

pub(crate) fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Record {
        state: Mutex::new(value),
        callbacks: Mutex::new(()),
        silenced: AtomicBool::new(false),
    })
}

impl<T> Record<T> {
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Runs `callback` unless the record has been silenced. Returns whether
    /// it ran.
    pub(crate) fn notify(&self, callback: impl FnOnce()) -> bool {
        let _gate = self.callbacks.lock();
        if self.silenced.load(Ordering::Acquire) {
            return false;
        }
        let _scope = CallbackScope::enter();
        callback();
        true
    }

    pub(crate) fn silence(&self) {
        self.silenced.store(true, Ordering::Release);
        if !CallbackScope::active() {
            drop(self.callbacks.lock());
        }
    }
}

/// What a tick decided about the next one.
pub(crate) enum Tick {
    After(std::time::Duration),
    Done,
}
