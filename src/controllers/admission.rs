use std::sync::{Arc, Mutex};

use crate::bucket_group::BucketGroup;
use crate::buckets::Bucket;
use crate::scope::lock;
use crate::{validate, Error, Result};

/// Bucket and concurrency settings shared by the controller builders.
#[derive(Debug)]
pub(crate) struct AdmissionConfig {
    pub(crate) buckets: Vec<Arc<dyn Bucket>>,
    pub(crate) should_enter_context: bool,
    pub(crate) max_concurrency: Option<usize>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
            should_enter_context: true,
            max_concurrency: None,
        }
    }
}

impl AdmissionConfig {
    pub(crate) fn build(self) -> Result<Admission> {
        validate::max_concurrency(self.max_concurrency)?;
        let mut buckets = self.buckets;
        let (bucket, enter_bucket) = match buckets.len() {
            0 => (None, false),
            1 => (buckets.pop(), self.should_enter_context),
            _ => {
                let group = BucketGroup::new(buckets, self.should_enter_context)?;
                // The group belongs to the controller, so it is always entered.
                (Some(Arc::new(group) as Arc<dyn Bucket>), true)
            }
        };
        Ok(Admission {
            bucket,
            enter_bucket,
            max_concurrency: self.max_concurrency,
            concurrent_requests: Mutex::new(0),
        })
    }
}

/// Token and concurrency bookkeeping behind every bucket based controller.
///
/// An admission takes the request's tokens from the bucket and one unit of
/// concurrency in a single critical section. Each admission is matched by
/// exactly one [`Admission::release`].
#[derive(Debug)]
pub(crate) struct Admission {
    bucket: Option<Arc<dyn Bucket>>,
    enter_bucket: bool,
    max_concurrency: Option<usize>,
    concurrent_requests: Mutex<usize>,
}

impl Admission {
    pub(crate) fn bucket(&self) -> Option<&Arc<dyn Bucket>> {
        self.bucket.as_ref()
    }

    pub(crate) fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    pub(crate) fn concurrent_requests(&self) -> usize {
        *lock(&self.concurrent_requests)
    }

    fn is_concurrency_limited(&self, concurrent_requests: usize) -> bool {
        self.max_concurrency
            .is_some_and(|max_concurrency| concurrent_requests >= max_concurrency)
    }

    pub(crate) fn can_acquire(&self, tokens: f64) -> bool {
        !self.is_concurrency_limited(self.concurrent_requests())
            && self
                .bucket
                .as_ref()
                .map_or(true, |bucket| bucket.can_acquire(tokens))
    }

    /// Admits a request for `tokens` right away, or fails without side effects.
    pub(crate) fn try_admit(&self, tokens: f64) -> Result<()> {
        let mut concurrent_requests = lock(&self.concurrent_requests);
        if self.is_concurrency_limited(*concurrent_requests) {
            tracing::trace!("Concurrency limit of {concurrent_requests} reached");
            return Err(Error::RateLimit { tokens });
        }
        if let Some(bucket) = &self.bucket {
            bucket.acquire(tokens)?;
        }
        *concurrent_requests += 1;
        tracing::trace!(
            "Admitted a request for {tokens} tokens, {concurrent_requests} running",
            concurrent_requests = *concurrent_requests
        );
        Ok(())
    }

    /// Gives back the concurrency of a finished request.
    ///
    /// Returns whether this made room under a concurrency limit that was
    /// reached.
    pub(crate) fn release(&self) -> bool {
        let mut concurrent_requests = lock(&self.concurrent_requests);
        let Some(remaining) = concurrent_requests.checked_sub(1) else {
            tracing::warn!("Released more requests than were admitted");
            return false;
        };
        *concurrent_requests = remaining;
        tracing::trace!("Request released, {remaining} running");
        self.max_concurrency == Some(remaining + 1)
    }

    pub(crate) async fn enter_bucket(&self) -> Result<()> {
        match &self.bucket {
            Some(bucket) if self.enter_bucket => bucket.enter().await,
            _ => Ok(()),
        }
    }

    pub(crate) async fn exit_bucket(&self) {
        if let Some(bucket) = self.bucket.as_ref().filter(|_| self.enter_bucket) {
            bucket.exit().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::buckets::{FixedWindowCounter, LeakyBucket, UnlimitedBucket};

    fn admission(buckets: Vec<Arc<dyn Bucket>>, max_concurrency: Option<usize>) -> Admission {
        AdmissionConfig {
            buckets,
            max_concurrency,
            ..Default::default()
        }
        .build()
        .unwrap()
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let config = AdmissionConfig {
            max_concurrency: Some(0),
            ..Default::default()
        };

        assert!(matches!(config.build(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_bucket_selection() {
        assert!(admission(Vec::new(), None).bucket().is_none());

        let unlimited: Arc<dyn Bucket> = Arc::new(UnlimitedBucket::new());
        let single = admission(vec![Arc::clone(&unlimited)], None);
        assert!(single.bucket().is_some());

        let grouped = admission(
            vec![
                unlimited,
                Arc::new(LeakyBucket::new(Duration::from_secs(1)).unwrap()) as Arc<dyn Bucket>,
            ],
            None,
        );
        assert!(grouped.enter_bucket);
    }

    #[test]
    fn test_concurrency_limit() {
        let admission = admission(Vec::new(), Some(2));

        admission.try_admit(1.0).unwrap();
        admission.try_admit(1.0).unwrap();
        assert!(!admission.can_acquire(1.0));
        assert_eq!(admission.try_admit(1.0), Err(Error::RateLimit { tokens: 1.0 }));

        assert!(admission.release());
        assert!(admission.can_acquire(1.0));
        assert!(!admission.release());
        assert_eq!(admission.concurrent_requests(), 0);
        assert!(!admission.release());
    }

    #[tokio::test]
    async fn test_failed_admission_takes_no_concurrency() {
        let counter = Arc::new(FixedWindowCounter::new(1.0, Duration::from_secs(1)).unwrap());
        let admission = admission(vec![counter as Arc<dyn Bucket>], Some(5));
        admission.enter_bucket().await.unwrap();

        admission.try_admit(1.0).unwrap();
        assert_eq!(admission.try_admit(1.0), Err(Error::RateLimit { tokens: 1.0 }));

        assert_eq!(admission.concurrent_requests(), 1);
        admission.exit_bucket().await;
    }
}
