//! Handshake between a caller waiting in a scheduler queue and the task that
//! admits it.
//!
//! The processor *fires* a request once its tokens are committed, then waits
//! for the caller to *acknowledge* it. The caller acknowledges on every exit
//! path, including cancellation, so the processor never waits forever.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{self, AtomicU64};
use std::sync::Arc;

use tokio::sync::watch;

use crate::{Error, Result};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Validation {
    Pending,
    Fired,
    Rejected,
}

struct Handshake {
    id: u64,
    cost: f64,
    validation: watch::Sender<Validation>,
    ack: watch::Sender<bool>,
}

/// A caller's request for tokens, queued until a scheduler can admit it.
///
/// Clones share the same handshake. Requests are ordered by ascending cost,
/// and by arrival among equal costs.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Handshake>,
}

impl Request {
    #[must_use]
    pub fn new(cost: f64) -> Self {
        let (validation, _) = watch::channel(Validation::Pending);
        let (ack, _) = watch::channel(false);
        Self {
            inner: Arc::new(Handshake {
                id: NEXT_ID.fetch_add(1, atomic::Ordering::Relaxed),
                cost,
                validation,
                ack,
            }),
        }
    }

    /// The number of tokens requested.
    #[must_use]
    pub fn cost(&self) -> f64 {
        self.inner.cost
    }

    /// Whether the request has been admitted.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        *self.inner.validation.borrow() == Validation::Fired
    }

    #[must_use]
    pub fn is_acked(&self) -> bool {
        *self.inner.ack.borrow()
    }

    pub(crate) fn fire(&self) {
        self.settle(Validation::Fired);
    }

    /// Turns the request down for good, used when the scheduler shuts down.
    pub(crate) fn reject(&self) {
        self.settle(Validation::Rejected);
    }

    fn settle(&self, outcome: Validation) {
        let settled = self.inner.validation.send_if_modified(|validation| {
            if *validation == Validation::Pending {
                *validation = outcome;
                true
            } else {
                false
            }
        });
        if !settled {
            tracing::warn!("Request #{} was already settled", self.inner.id);
        }
    }

    /// Waits until the request is fired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the request was rejected instead.
    pub(crate) async fn wait_for_validation(&self) -> Result<()> {
        let mut validation = self.inner.validation.subscribe();
        let outcome = validation
            .wait_for(|validation| *validation != Validation::Pending)
            .await
            .map_or(Validation::Rejected, |outcome| *outcome);
        match outcome {
            Validation::Fired => Ok(()),
            Validation::Pending | Validation::Rejected => Err(Error::Closed),
        }
    }

    pub(crate) fn ack(&self) {
        self.inner.ack.send_replace(true);
    }

    pub(crate) async fn wait_for_ack(&self) {
        let mut ack = self.inner.ack.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = ack.wait_for(|acked| *acked).await;
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("cost", &self.inner.cost)
            .field("validation", &*self.inner.validation.borrow())
            .field("acked", &*self.inner.ack.borrow())
            .finish()
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Request {}

impl PartialOrd for Request {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Request {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner
            .cost
            .total_cmp(&other.inner.cost)
            .then(self.inner.id.cmp(&other.inner.id))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_orders_by_cost_then_arrival() {
        let expensive = Request::new(3.0);
        let first_cheap = Request::new(1.0);
        let second_cheap = Request::new(1.0);

        assert!(first_cheap < expensive);
        assert!(first_cheap < second_cheap);
        assert_eq!(first_cheap.clone(), first_cheap);
        assert_ne!(first_cheap, second_cheap);
    }

    mod handshake {
        use pretty_assertions::assert_eq;

        use super::*;

        #[tokio::test]
        async fn test_fire_releases_validation_wait() {
            let request = Request::new(1.0);
            let waiting = tokio::spawn({
                let request = request.clone();
                async move { request.wait_for_validation().await }
            });
            tokio::task::yield_now().await;

            request.fire();

            assert_eq!(waiting.await.unwrap(), Ok(()));
            assert!(request.is_fired());
        }

        #[tokio::test]
        async fn test_validation_is_level_triggered() {
            let request = Request::new(1.0);
            request.fire();

            assert_eq!(request.wait_for_validation().await, Ok(()));
        }

        #[tokio::test]
        async fn test_rejected_request_is_closed() {
            let request = Request::new(1.0);
            request.reject();
            request.fire();

            assert_eq!(request.wait_for_validation().await, Err(Error::Closed));
            assert!(!request.is_fired());
        }

        #[tokio::test(start_paused = true)]
        async fn test_ack_releases_the_processor() {
            let request = Request::new(1.0);
            let pending = tokio::time::timeout(Duration::from_secs(1), request.wait_for_ack()).await;
            assert!(pending.is_err());

            request.ack();

            request.wait_for_ack().await;
            assert!(request.is_acked());
        }
    }
}
