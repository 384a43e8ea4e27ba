//! Controllers deciding when requests may run.
//!
//! A successful request hands out a [`Permit`]. The request holds its share of
//! the concurrency until the permit is dropped, whatever way the caller's work
//! ends.

use std::fmt;
use std::future::Future;

use crate::Result;

mod admission;
mod noop;
mod rate_limiter;
mod scheduler;

pub use noop::NoopController;
pub use rate_limiter::{RateLimiter, RateLimiterBuilder};
pub use scheduler::{QueueFactory, Scheduler, SchedulerBuilder};

/// Common interface of the rate controllers.
pub trait RateController {
    /// Whether a request for `tokens` could run right now.
    fn can_acquire(&self, tokens: f64) -> bool;

    /// Requests `tokens`, resolving once the request is allowed to run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimit`](crate::Error::RateLimit) when the controller
    /// turns the request down, along with any controller-specific error.
    fn request(&self, tokens: f64) -> impl Future<Output = Result<Permit<'_>>> + Send;
}

/// Gives back the concurrency held by a [`Permit`].
pub(crate) trait ReleaseConcurrency: Send + Sync {
    fn release(&self);
}

/// A RAII guard for an admitted request.
///
/// The tokens the request consumed stay consumed; dropping the permit only
/// releases its unit of concurrency.
#[must_use]
pub struct Permit<'a> {
    owner: Option<&'a dyn ReleaseConcurrency>,
    tokens: f64,
}

impl<'a> Permit<'a> {
    pub(crate) fn new(owner: &'a dyn ReleaseConcurrency, tokens: f64) -> Self {
        Self {
            owner: Some(owner),
            tokens,
        }
    }

    /// A permit that holds no concurrency.
    pub(crate) fn detached(tokens: f64) -> Self {
        Self {
            owner: None,
            tokens,
        }
    }

    /// The tokens consumed by the request.
    #[must_use]
    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

impl fmt::Debug for Permit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("tokens", &self.tokens)
            .field("holds_concurrency", &self.owner.is_some())
            .finish()
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        tracing::trace!("Dropping permit for {} tokens", self.tokens);
        if let Some(owner) = self.owner {
            owner.release();
        }
    }
}
