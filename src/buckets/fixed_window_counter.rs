use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BoxFuture, Bucket, RefillScheduler, TokenReservoir, UpdateCapacity};
use crate::scope::{lock, State};
use crate::Result;

/// Bucket following the fixed window counter algorithm.
///
/// The first acquisition of a window starts a timer; once `duration` has
/// elapsed the balance is reset to the full capacity and the next acquisition
/// opens a new window.
#[derive(Debug)]
pub struct FixedWindowCounter {
    window: Arc<Mutex<Window>>,
    refills: RefillScheduler,
}

#[derive(Debug)]
struct Window {
    reservoir: TokenReservoir,
    refill_scheduled: bool,
}

impl FixedWindowCounter {
    /// Creates a counter allowing `capacity` tokens per window of `duration`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument) if
    /// `capacity` is not strictly positive or `duration` is zero.
    pub fn new(capacity: f64, duration: Duration) -> Result<Self> {
        Ok(Self {
            window: Arc::new(Mutex::new(Window {
                reservoir: TokenReservoir::new(capacity)?,
                refill_scheduled: false,
            })),
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

impl Bucket for FixedWindowCounter {
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
        lock(&self.window).reservoir.can_acquire(tokens)
    }

    fn acquire(&self, tokens: f64) -> Result<()> {
        self.refills.ensure_entered()?;
        let mut window = lock(&self.window);
        window.reservoir.take(tokens)?;
        tracing::trace!(
            "Acquired {tokens} tokens, {remaining} left in the window",
            remaining = window.reservoir.tokens()
        );

        if !window.refill_scheduled {
            let shared = Arc::clone(&self.window);
            let scheduled = self.refills.schedule(move || {
                let mut window = lock(&shared);
                window.reservoir.fill();
                window.refill_scheduled = false;
                tracing::trace!("Window reset to {} tokens", window.reservoir.capacity());
            });
            if let Err(err) = scheduled {
                window.reservoir.give_back(tokens);
                return Err(err);
            }
            window.refill_scheduled = true;
        }
        Ok(())
    }
}

impl UpdateCapacity for FixedWindowCounter {
    fn capacity(&self) -> f64 {
        lock(&self.window).reservoir.capacity()
    }

    fn tokens(&self) -> f64 {
        lock(&self.window).reservoir.tokens()
    }

    fn update_capacity(&self, new_capacity: f64) -> Result<()> {
        lock(&self.window).reservoir.update_capacity(new_capacity)
    }
}
