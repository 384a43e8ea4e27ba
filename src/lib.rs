//! # Ratekeeper
//!
//! `ratekeeper` throttles units of work, called requests, that consume tokens from
//! replenishing buckets.
//!
//! Buckets implement the refill algorithms: [`FixedWindowCounter`],
//! [`SlidingWindowLog`], [`LeakyBucket`] and [`UnlimitedBucket`]. A
//! [`BucketGroup`] combines several buckets so that a request has to fit in all
//! of them.
//!
//! Controllers decide when a request may run:
//!
//! - [`RateLimiter`] runs a request right away or turns it down with
//!   [`Error::RateLimit`].
//! - [`Scheduler`] queues the requests it cannot run yet, by [`Priority`], and
//!   admits them as the bucket refills or concurrency frees up.
//! - [`NoopController`] accepts everything.
//!
//! Both bucket based controllers hand out a [`Permit`] per admitted request. The
//! permit holds one unit of concurrency until it is dropped, so `max_concurrency`
//! is respected whatever way the caller's work ends.
//!
//! Buckets with timers, bucket groups and controllers go through a single
//! `Unentered -> Entered -> Closed` lifecycle. They have to be entered inside a
//! tokio runtime before use, and exiting them cancels their background tasks.

mod bucket_group;
mod buckets;
mod controllers;
pub mod duration;
mod error;
mod priority;
pub mod queues;
mod request;
mod scope;
mod validate;

pub use bucket_group::BucketGroup;
pub use buckets::{
    BoxFuture, Bucket, FixedWindowCounter, LeakyBucket, SlidingWindowLog, TokenReservoir,
    UnlimitedBucket, UpdateCapacity,
};
pub use controllers::{
    NoopController, Permit, QueueFactory, RateController, RateLimiter, RateLimiterBuilder,
    Scheduler, SchedulerBuilder,
};
pub use error::{Error, Result};
pub use priority::Priority;
pub use request::Request;
pub use scope::State;
