use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BoxFuture, Bucket, RefillScheduler, TokenReservoir, UpdateCapacity};
use crate::scope::{lock, State};
use crate::Result;

/// Bucket following the sliding window log algorithm.
///
/// Every acquisition is replenished on its own, exactly `duration` after it
/// happened, so consumed capacity trickles back instead of resetting at once.
#[derive(Debug)]
pub struct SlidingWindowLog {
    reservoir: Arc<Mutex<TokenReservoir>>,
    refills: RefillScheduler,
}

impl SlidingWindowLog {
    /// Creates a log allowing `capacity` tokens within any span of `duration`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument) if
    /// `capacity` is not strictly positive or `duration` is zero.
    pub fn new(capacity: f64, duration: Duration) -> Result<Self> {
        Ok(Self {
            reservoir: Arc::new(Mutex::new(TokenReservoir::new(capacity)?)),
            refills: RefillScheduler::new(duration)?,
        })
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.refills.delay()
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.refills.state()
    }
}

impl Bucket for SlidingWindowLog {
    fn enter(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.refills.enter() })
    }

    fn exit(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.refills.exit())
    }

    fn wait_for_refill(&self) -> BoxFuture<'_, ()> {
        self.refills.wait_for_refill()
    }

    fn ensure_entered(&self) -> Result<()> {
        self.refills.ensure_entered()
    }

    fn can_acquire(&self, tokens: f64) -> bool {
        lock(&self.reservoir).can_acquire(tokens)
    }

    fn acquire(&self, tokens: f64) -> Result<()> {
        self.refills.ensure_entered()?;
        let mut reservoir = lock(&self.reservoir);
        reservoir.take(tokens)?;

        let shared = Arc::clone(&self.reservoir);
        let scheduled = self.refills.schedule(move || {
            let mut reservoir = lock(&shared);
            reservoir.give_back(tokens);
            tracing::trace!(
                "Gave {tokens} tokens back, {available} available",
                available = reservoir.tokens()
            );
        });
        if let Err(err) = scheduled {
            reservoir.give_back(tokens);
            return Err(err);
        }
        tracing::trace!(
            "Acquired {tokens} tokens, {remaining} left",
            remaining = reservoir.tokens()
        );
        Ok(())
    }
}

impl UpdateCapacity for SlidingWindowLog {
    fn capacity(&self) -> f64 {
        lock(&self.reservoir).capacity()
    }

    fn tokens(&self) -> f64 {
        lock(&self.reservoir).tokens()
    }

    fn update_capacity(&self, new_capacity: f64) -> Result<()> {
        lock(&self.reservoir).update_capacity(new_capacity)
    }
}
