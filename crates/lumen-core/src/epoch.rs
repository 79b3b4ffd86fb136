#![forbid(unsafe_code)]

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Generation token attached to every asynchronous operation.
///
/// An epoch stays valid until its [`EpochCounter`] advances. Results produced
/// under a superseded epoch must be discarded; callers check
/// [`Epoch::is_current`] right before mutating state.
#[derive(Clone, Debug)]
pub struct Epoch {
    id: u64,
    current: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl Epoch {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True while no newer generation has been started.
    pub fn is_current(&self) -> bool {
        !self.cancel.is_cancelled() && self.current.load(Ordering::Acquire) == self.id
    }

    pub fn is_stale(&self) -> bool {
        !self.is_current()
    }

    /// Token cancelled when this generation is superseded.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolves once this generation is superseded or torn down.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// Monotonic source of [`Epoch`]s for one playback surface.
#[derive(Debug)]
pub struct EpochCounter {
    current: Arc<AtomicU64>,
    cancel: Mutex<CancellationToken>,
}

impl EpochCounter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Arc::new(AtomicU64::new(0)),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Epoch of the running generation.
    pub fn current(&self) -> Epoch {
        let cancel = self.cancel.lock().clone();
        Epoch {
            id: self.current.load(Ordering::Acquire),
            current: Arc::clone(&self.current),
            cancel,
        }
    }

    /// Start a new generation, cancelling everything tied to the previous one.
    pub fn advance(&self) -> Epoch {
        let fresh = CancellationToken::new();
        let previous = std::mem::replace(&mut *self.cancel.lock(), fresh.clone());
        let id = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        previous.cancel();
        Epoch {
            id,
            current: Arc::clone(&self.current),
            cancel: fresh,
        }
    }
}

impl Default for EpochCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_invalidates_previous_epoch() {
        let counter = EpochCounter::new();
        let first = counter.advance();
        assert!(first.is_current());

        let second = counter.advance();
        assert!(first.is_stale());
        assert!(first.cancel_token().is_cancelled());
        assert!(second.is_current());
        assert!(second.id() > first.id());
    }

    #[test]
    fn current_shares_the_running_generation() {
        let counter = EpochCounter::new();
        let started = counter.advance();
        let observed = counter.current();
        assert_eq!(started.id(), observed.id());
        assert!(observed.is_current());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_advance() {
        let counter = EpochCounter::new();
        let epoch = counter.advance();
        counter.advance();
        epoch.cancelled().await;
        assert!(epoch.is_stale());
    }
}
