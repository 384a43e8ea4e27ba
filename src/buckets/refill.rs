use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use super::BoxFuture;
use crate::scope::{Scope, State};
use crate::{validate, Result};

/// Edge-triggered broadcast of refill completions.
///
/// Each broadcast releases every task currently waiting, then the signal is
/// armed again for the next cycle. A wait that starts after a broadcast only
/// completes on the following one.
#[derive(Debug, Default)]
pub(crate) struct RefillSignal {
    notify: Notify,
    generation: AtomicU64,
}

impl RefillSignal {
    /// Registers interest right away, even though the future is polled later.
    pub(crate) fn wait(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.notify.notified())
    }

    pub(crate) fn broadcast(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!("Broadcasting refill #{generation}");
        self.notify.notify_waiters();
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Runs one refill timer per scheduled replenishment and announces each
/// completion on a [`RefillSignal`].
#[derive(Debug)]
pub(crate) struct RefillScheduler {
    delay: Duration,
    scope: Scope,
    signal: Arc<RefillSignal>,
}

impl RefillScheduler {
    pub(crate) fn new(delay: Duration) -> Result<Self> {
        validate::delay(delay)?;
        Ok(Self {
            delay,
            scope: Scope::default(),
            signal: Arc::new(RefillSignal::default()),
        })
    }

    pub(crate) fn delay(&self) -> Duration {
        self.delay
    }

    pub(crate) fn state(&self) -> State {
        self.scope.state()
    }

    pub(crate) fn enter(&self) -> Result<()> {
        self.scope.enter()?;
        tracing::debug!("Refill scheduler entered with a delay of {:?}", self.delay);
        Ok(())
    }

    pub(crate) async fn exit(&self) {
        self.scope.exit().await;
        tracing::debug!("Refill scheduler exited");
    }

    pub(crate) fn ensure_entered(&self) -> Result<()> {
        self.scope.ensure_entered()
    }

    pub(crate) fn wait_for_refill(&self) -> BoxFuture<'_, ()> {
        self.signal.wait()
    }

    #[cfg(test)]
    pub(crate) fn refills(&self) -> u64 {
        self.signal.generation()
    }

    /// Runs `refill` once the delay has elapsed, then wakes the waiters.
    pub(crate) fn schedule<F>(&self, refill: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let signal = Arc::clone(&self.signal);
        let delay = self.delay;
        self.scope.spawn(async move {
            tokio::time::sleep(delay).await;
            refill();
            signal.broadcast();
        })
    }
}
