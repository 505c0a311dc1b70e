//! Cancellable armed timers
//!
//! A [`TimerSlot`] holds at most one pending timer task. Arming cancels the
//! previous timer first. Every arm and cancel bumps the slot generation, and
//! the fired callback receives the generation it was armed with, so work
//! that raced a cancel can tell it is stale.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any armed timer, then run `on_fire(generation)` after `delay`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn arm<F, Fut>(&mut self, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(generation).await;
        }));
        generation
    }

    /// Clear the armed timer. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.generation += 1;
        match self.handle.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    /// Called by a fired timer. Releases the slot and returns `true` if the
    /// timer is still the current one.
    pub fn fired(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        // detach rather than abort: the caller is this task
        self.handle = None;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
