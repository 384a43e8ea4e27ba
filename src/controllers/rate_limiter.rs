use std::future::Future;
use std::sync::Arc;

use super::admission::{Admission, AdmissionConfig};
use super::{Permit, RateController, ReleaseConcurrency};
use crate::buckets::Bucket;
use crate::scope::{Scope, State};
use crate::{validate, Result};

/// Rate controller that turns down any request it cannot run instantly.
///
/// ```no_run
/// # async fn run() -> ratekeeper::Result<()> {
/// use ratekeeper::{duration, FixedWindowCounter, RateLimiter};
///
/// let limiter = RateLimiter::builder()
///     .bucket(FixedWindowCounter::new(10.0, duration::SECOND)?)
///     .max_concurrency(2)
///     .build()?;
/// limiter.enter().await?;
/// {
///     let _permit = limiter.hold(1.0)?;
///     // Call the rate limited resource.
/// }
/// limiter.exit().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    admission: Admission,
    scope: Scope,
}

impl RateLimiter {
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::default()
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.scope.state()
    }

    #[must_use]
    pub fn max_concurrency(&self) -> Option<usize> {
        self.admission.max_concurrency()
    }

    /// The number of permits currently handed out.
    #[must_use]
    pub fn concurrent_requests(&self) -> usize {
        self.admission.concurrent_requests()
    }

    #[must_use]
    pub fn bucket(&self) -> Option<&Arc<dyn Bucket>> {
        self.admission.bucket()
    }

    /// Enters the limiter, and its bucket when it manages it.
    ///
    /// # Errors
    ///
    /// Fails if the limiter or its bucket was entered before, or outside of a
    /// tokio runtime.
    pub async fn enter(&self) -> Result<()> {
        self.scope.enter()?;
        if let Err(err) = self.admission.enter_bucket().await {
            self.scope.exit().await;
            return Err(err);
        }
        tracing::debug!("Rate limiter entered");
        Ok(())
    }

    pub async fn exit(&self) {
        let was_entered = self.state() == State::Entered;
        self.scope.exit().await;
        if was_entered {
            self.admission.exit_bucket().await;
        }
        tracing::debug!("Rate limiter exited");
    }

    /// Acquires `tokens` right away, holding concurrency until the permit is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimit`](crate::Error::RateLimit) if the request
    /// cannot run instantly, and [`Error::NotEntered`](crate::Error::NotEntered)
    /// or [`Error::Closed`](crate::Error::Closed) outside of the limiter's scope.
    pub fn hold(&self, tokens: f64) -> Result<Permit<'_>> {
        validate::tokens(tokens)?;
        self.scope.ensure_entered()?;
        self.admission.try_admit(tokens)?;
        Ok(Permit::new(self, tokens))
    }
}

impl ReleaseConcurrency for RateLimiter {
    fn release(&self) {
        self.admission.release();
    }
}

impl RateController for RateLimiter {
    fn can_acquire(&self, tokens: f64) -> bool {
        self.admission.can_acquire(tokens)
    }

    fn request(&self, tokens: f64) -> impl Future<Output = Result<Permit<'_>>> + Send {
        std::future::ready(self.hold(tokens))
    }
}

/// Configures a [`RateLimiter`].
#[derive(Debug, Default)]
#[must_use]
pub struct RateLimiterBuilder {
    config: AdmissionConfig,
}

impl RateLimiterBuilder {
    /// Adds a bucket. Several buckets are combined into a
    /// [`BucketGroup`](crate::BucketGroup).
    pub fn bucket<B: Bucket + 'static>(self, bucket: B) -> Self {
        self.shared_bucket(Arc::new(bucket))
    }

    /// Adds a bucket that is also used elsewhere.
    pub fn shared_bucket(mut self, bucket: Arc<dyn Bucket>) -> Self {
        self.config.buckets.push(bucket);
        self
    }

    /// Whether entering the limiter also enters its buckets. Defaults to `true`.
    pub fn should_enter_context(mut self, should_enter_context: bool) -> Self {
        self.config.should_enter_context = should_enter_context;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = Some(max_concurrency);
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument) for a
    /// zero concurrency limit.
    pub fn build(self) -> Result<RateLimiter> {
        Ok(RateLimiter {
            admission: self.config.build()?,
            scope: Scope::default(),
        })
    }
}
