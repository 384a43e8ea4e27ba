use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{BoxFuture, Bucket, RefillScheduler};
use crate::scope::State;
use crate::{validate, Error, Result};

/// Bucket following the leaky bucket algorithm.
///
/// A single request passes every `delay`, whatever the amount of tokens it
/// asks for.
#[derive(Debug)]
pub struct LeakyBucket {
    can_pass: Arc<AtomicBool>,
    refills: RefillScheduler,
}

impl LeakyBucket {
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `delay` is zero.
    pub fn new(delay: Duration) -> Result<Self> {
        Ok(Self {
            can_pass: Arc::new(AtomicBool::new(true)),
            refills: RefillScheduler::new(delay)?,
        })
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.refills.delay()
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.refills.state()
    }
}

impl Bucket for LeakyBucket {
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
        validate::tokens(tokens).is_ok() && self.can_pass.load(Ordering::Acquire)
    }

    fn acquire(&self, tokens: f64) -> Result<()> {
        validate::tokens(tokens)?;
        self.refills.ensure_entered()?;
        if self
            .can_pass
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::RateLimit { tokens });
        }

        let can_pass = Arc::clone(&self.can_pass);
        let scheduled = self.refills.schedule(move || {
            can_pass.store(true, Ordering::Release);
            tracing::trace!("Leaky bucket slot freed");
        });
        if let Err(err) = scheduled {
            self.can_pass.store(true, Ordering::Release);
            return Err(err);
        }
        tracing::trace!("Leaky bucket slot taken for {:?}", self.refills.delay());
        Ok(())
    }
}
