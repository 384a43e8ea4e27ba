//! Token reservoirs and their refill algorithms.
//!
//! Every algorithm is assembled from two building blocks: a [`TokenReservoir`]
//! that does the token accounting, and a `RefillScheduler` that runs the refill
//! timers and broadcasts each replenishment to the tasks waiting for it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::Result;

mod fixed_window_counter;
mod leaky_bucket;
mod refill;
mod reservoir;
mod sliding_window_log;
mod unlimited;

pub use fixed_window_counter::FixedWindowCounter;
pub use leaky_bucket::LeakyBucket;
pub use reservoir::TokenReservoir;
pub use sliding_window_log::SlidingWindowLog;
pub use unlimited::UnlimitedBucket;

pub(crate) use refill::RefillScheduler;

/// Boxed future returned by the object-safe [`Bucket`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A reservoir of tokens that replenishes over time.
///
/// Acquisitions never suspend: a bucket answers immediately whether tokens are
/// available, and callers that want to wait use [`Bucket::wait_for_refill`].
pub trait Bucket: Send + Sync + fmt::Debug {
    /// Enters the bucket's scope so that it can schedule refills.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyEntered`](crate::Error::AlreadyEntered) or
    /// [`Error::Closed`](crate::Error::Closed) if the bucket was entered before.
    fn enter(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Exits the bucket's scope, cancelling pending refills.
    fn exit(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    /// Waits for the next replenishment.
    ///
    /// Only refills happening after this call are observed: a refill that
    /// completed earlier does not release the returned future.
    fn wait_for_refill(&self) -> BoxFuture<'_, ()>;

    /// Checks that the bucket is usable, which timer based buckets only are
    /// while entered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotEntered`](crate::Error::NotEntered) or
    /// [`Error::Closed`](crate::Error::Closed) outside of the bucket's scope.
    fn ensure_entered(&self) -> Result<()> {
        Ok(())
    }

    /// Whether `tokens` can be acquired right now.
    ///
    /// Negative or NaN amounts are never acquirable.
    fn can_acquire(&self, tokens: f64) -> bool;

    /// Consumes `tokens` from the bucket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimit`](crate::Error::RateLimit) if the tokens are not
    /// available, [`Error::InvalidArgument`](crate::Error::InvalidArgument) for a
    /// negative amount, and [`Error::NotEntered`](crate::Error::NotEntered) if the
    /// bucket needs to schedule a refill but its scope was not entered.
    fn acquire(&self, tokens: f64) -> Result<()>;
}

/// Buckets whose token capacity can change at runtime.
pub trait UpdateCapacity {
    /// The current capacity.
    fn capacity(&self) -> f64;

    /// The tokens available right now.
    fn tokens(&self) -> f64;

    /// Replaces the capacity, shifting the available tokens by the same delta
    /// so that tokens already consumed stay consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument) if the new
    /// capacity is not strictly positive.
    fn update_capacity(&self, new_capacity: f64) -> Result<()>;
}
