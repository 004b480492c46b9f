use crate::error::{Error, Result};
use log::{error, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Work run by a [`RepeatingTimer`] on every tick.
///
/// Implemented for any `FnMut()` closure, and by types that need to be handed
/// back to the owner once the timer thread has been joined.
pub trait Tick: Send + 'static {
    fn tick(&mut self);
}

impl<F> Tick for F
where
    F: FnMut() + Send + 'static,
{
    fn tick(&mut self) {
        self()
    }
}

/// Runs a callback repeatedly on its own thread until stopped.
///
/// The callback is invoked, then the thread sleeps for the interval, then the
/// running flag is checked again. `stop()` therefore returns after at most one
/// in-flight callback plus one sleep.
///
/// The thread owns the callback while running and returns it when it exits, so
/// `stop()` hands the callback, and whatever state it carries, back to the
/// caller once the join completes.
#[derive(Debug)]
pub struct RepeatingTimer<T> {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<T>>,
}

impl<T> Default for RepeatingTimer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RepeatingTimer<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// True between a `start()` and the matching `stop()`, as long as the
    /// thread has not died on a panicking callback.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self
                .handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the thread to exit and wait for it.
    ///
    /// Returns `Ok(None)` if the timer was never started (or already stopped),
    /// otherwise the callback that the thread was running.
    ///
    /// # Errors
    /// `Error::TickPanicked` if the callback panicked and took the thread down.
    pub fn stop(&mut self) -> Result<Option<T>> {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            trace!("TIMER: stop requested while idle");
            return Ok(None);
        };
        match handle.join() {
            Ok(callback) => {
                trace!("TIMER: thread joined");
                Ok(Some(callback))
            }
            Err(_) => {
                error!("TIMER: callback panicked, timer thread terminated");
                Err(Error::TickPanicked)
            }
        }
    }
}

impl<T: Tick> RepeatingTimer<T> {
    /// Start invoking `callback` every `interval`.
    ///
    /// A timer that is already running is stopped (and joined) first, the
    /// callback of that previous run is returned.
    pub fn start(&mut self, interval: Duration, mut callback: T) -> Option<T> {
        let previous = if self.handle.is_some() {
            warn!("TIMER: start while running, stopping the previous run first");
            self.stop().ok().flatten()
        } else {
            None
        };

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        trace!("TIMER: launching thread, interval {interval:?}");
        self.handle = Some(thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                callback.tick();
                thread::sleep(interval);
            }
            callback
        }));
        previous
    }
}

impl<T> Drop for RepeatingTimer<T> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            // Errors were already logged by stop()
            let _ = self.stop();
        }
    }
}
