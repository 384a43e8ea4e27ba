use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::buckets::{BoxFuture, Bucket};
use crate::scope::{lock, Scope, State};
use crate::{Error, Result};

/// Bucket that aggregates other buckets.
///
/// Tokens can only be acquired when every child bucket can provide them, and
/// the group refills whenever any of its children does. Refills nobody waited
/// for are coalesced, keeping at most one queued refill per child.
#[derive(Debug)]
pub struct BucketGroup {
    buckets: Vec<Arc<dyn Bucket>>,
    should_enter_context: bool,
    scope: Scope,
    refilled_tx: mpsc::UnboundedSender<usize>,
    refilled_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<usize>>,
    /// Whether each child has a refill waiting in the channel.
    queued: Arc<[AtomicBool]>,
    acquisition: Mutex<()>,
}

impl BucketGroup {
    /// Groups `buckets` together.
    ///
    /// When `should_enter_context` is set, entering and exiting the group also
    /// enters and exits every child bucket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `buckets` is empty.
    pub fn new<I>(buckets: I, should_enter_context: bool) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn Bucket>>,
    {
        let buckets: Vec<_> = buckets.into_iter().collect();
        if buckets.is_empty() {
            return Err(Error::InvalidArgument(
                "A bucket group needs at least one bucket".to_owned(),
            ));
        }
        let (refilled_tx, refilled_rx) = mpsc::unbounded_channel();
        let queued = buckets.iter().map(|_| AtomicBool::new(false)).collect();
        Ok(Self {
            buckets,
            should_enter_context,
            scope: Scope::default(),
            refilled_tx,
            refilled_rx: tokio::sync::Mutex::new(refilled_rx),
            queued,
            acquisition: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn should_enter_context(&self) -> bool {
        self.should_enter_context
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.scope.state()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Always `false`, a group holds at least one bucket.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Arc<dyn Bucket>> {
        self.buckets.iter()
    }

    async fn enter_children(&self) -> Result<()> {
        for (index, bucket) in self.buckets.iter().enumerate() {
            if let Err(err) = bucket.enter().await {
                tracing::debug!("Bucket #{index} of the group failed to enter: {err}");
                for entered in &self.buckets[..index] {
                    entered.exit().await;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn listen_for_refills(&self, index: usize, bucket: Arc<dyn Bucket>) -> Result<()> {
        let refilled = self.refilled_tx.clone();
        let queued = Arc::clone(&self.queued);
        self.scope.spawn(async move {
            let mut refill = bucket.wait_for_refill();
            loop {
                refill.await;
                refill = bucket.wait_for_refill();
                if queued[index].swap(true, Ordering::AcqRel) {
                    tracing::trace!("Bucket #{index} of the group refilled again");
                    continue;
                }
                tracing::trace!("Bucket #{index} of the group refilled");
                if refilled.send(index).is_err() {
                    break;
                }
            }
        })
    }

    fn dequeue(&self, index: usize) {
        self.queued[index].store(false, Ordering::Release);
    }

    #[cfg(test)]
    fn queued_refills(&self) -> usize {
        self.refilled_rx.try_lock().map_or(0, |refilled| refilled.len())
    }
}

impl Bucket for BucketGroup {
    fn enter(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.scope.enter()?;
            if self.should_enter_context {
                if let Err(err) = self.enter_children().await {
                    self.scope.exit().await;
                    return Err(err);
                }
            }
            for (index, bucket) in self.buckets.iter().enumerate() {
                self.listen_for_refills(index, Arc::clone(bucket))?;
            }
            tracing::debug!("Bucket group of {} entered", self.buckets.len());
            Ok(())
        })
    }

    fn exit(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let was_entered = self.state() == State::Entered;
            self.scope.exit().await;
            if was_entered && self.should_enter_context {
                for bucket in &self.buckets {
                    bucket.exit().await;
                }
            }
            tracing::debug!("Bucket group of {} exited", self.buckets.len());
        })
    }

    /// Waits until any of the underlying buckets refills.
    ///
    /// Refills that happened since the previous call are reported right away.
    fn wait_for_refill(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut refilled = self.refilled_rx.lock().await;
            let mut drained = 0_usize;
            while let Ok(index) = refilled.try_recv() {
                self.dequeue(index);
                drained += 1;
            }
            if drained == 0 {
                // The group owns a sender, so the channel never closes.
                if let Some(index) = refilled.recv().await {
                    self.dequeue(index);
                }
            } else {
                tracing::trace!("{drained} refill(s) already queued for the group");
            }
        })
    }

    /// Checks the group and every child, so that an acquisition never stops
    /// halfway on a child that cannot be used.
    fn ensure_entered(&self) -> Result<()> {
        self.scope.ensure_entered()?;
        self.buckets.iter().try_for_each(|bucket| bucket.ensure_entered())
    }

    fn can_acquire(&self, tokens: f64) -> bool {
        self.buckets.iter().all(|bucket| bucket.can_acquire(tokens))
    }

    fn acquire(&self, tokens: f64) -> Result<()> {
        let _acquisition = lock(&self.acquisition);
        self.ensure_entered()?;
        if !self.can_acquire(tokens) {
            return Err(Error::RateLimit { tokens });
        }
        for bucket in &self.buckets {
            bucket.acquire(tokens)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a BucketGroup {
    type Item = &'a Arc<dyn Bucket>;
    type IntoIter = slice::Iter<'a, Arc<dyn Bucket>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
