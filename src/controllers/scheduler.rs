use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use super::admission::{Admission, AdmissionConfig};
use super::{Permit, RateController, ReleaseConcurrency};
use crate::buckets::Bucket;
use crate::queues::{PriorityQueue, Queue};
use crate::scope::{lock, Scope, State};
use crate::{validate, Error, Priority, Request, Result};

/// Builds the queue holding the pending requests of one priority level.
pub type QueueFactory = Box<dyn Fn() -> Box<dyn Queue<Request> + Send> + Send + Sync>;

/// Rate controller that queues the requests it cannot run instantly.
///
/// Pending requests are admitted by priority whenever the bucket refills or a
/// running request frees up concurrency.
///
/// ```no_run
/// # async fn run() -> ratekeeper::Result<()> {
/// use ratekeeper::{duration, Priority, Scheduler, SlidingWindowLog};
///
/// let scheduler = Scheduler::builder()
///     .bucket(SlidingWindowLog::new(100.0, duration::MINUTE)?)
///     .max_pending(1_000)
///     .build()?;
/// scheduler.enter().await?;
/// {
///     let _permit = scheduler.schedule(5.0, Priority::High, false).await?;
///     // Call the rate limited resource.
/// }
/// scheduler.exit().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    this: Weak<Shared>,
    admission: Admission,
    max_pending: Option<usize>,
    queues: Mutex<Queues>,
    scope: Scope,
}

struct Queues {
    by_priority: Vec<Box<dyn Queue<Request> + Send>>,
    pending_requests: usize,
    is_processing: bool,
    /// Set once the pending requests were rejected on exit.
    closed: bool,
}

impl fmt::Debug for Queues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lengths: Vec<_> = self.by_priority.iter().map(|queue| queue.len()).collect();
        f.debug_struct("Queues")
            .field("lengths", &lengths)
            .field("pending_requests", &self.pending_requests)
            .field("is_processing", &self.is_processing)
            .field("closed", &self.closed)
            .finish()
    }
}

enum Arrival<'a> {
    Admitted(Permit<'a>),
    Queued(Request),
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.shared.scope.state()
    }

    #[must_use]
    pub fn max_concurrency(&self) -> Option<usize> {
        self.shared.admission.max_concurrency()
    }

    #[must_use]
    pub fn max_pending(&self) -> Option<usize> {
        self.shared.max_pending
    }

    /// The number of permits currently handed out.
    #[must_use]
    pub fn concurrent_requests(&self) -> usize {
        self.shared.admission.concurrent_requests()
    }

    /// The number of requests waiting in the queues.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        lock(&self.shared.queues).pending_requests
    }

    #[must_use]
    pub fn bucket(&self) -> Option<&Arc<dyn Bucket>> {
        self.shared.admission.bucket()
    }

    /// Enters the scheduler, and its bucket when it manages it, then starts
    /// listening for refills.
    ///
    /// # Errors
    ///
    /// Fails if the scheduler or its bucket was entered before, or outside of
    /// a tokio runtime.
    pub async fn enter(&self) -> Result<()> {
        let shared = &self.shared;
        shared.scope.enter()?;
        if let Err(err) = shared.admission.enter_bucket().await {
            shared.scope.exit().await;
            return Err(err);
        }
        if let Some(bucket) = shared.admission.bucket() {
            shared.listen_for_refills(Arc::clone(bucket))?;
        }
        tracing::debug!("Scheduler entered");
        Ok(())
    }

    /// Stops processing, turns down every pending request and exits the
    /// bucket when the scheduler manages it.
    pub async fn exit(&self) {
        let shared = &self.shared;
        let was_entered = self.state() == State::Entered;
        shared.scope.exit().await;
        let rejected = shared.reject_pending();
        if was_entered {
            shared.admission.exit_bucket().await;
        }
        tracing::debug!("Scheduler exited, {rejected} pending request(s) rejected");
    }

    /// Waits until a request for `cost` tokens can run, then holds
    /// concurrency until the permit is dropped.
    ///
    /// Dropping the returned future while it waits withdraws the request. A
    /// queued request's tokens are taken when it is admitted, so a caller that
    /// stops waiting right after its admission still consumes them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimit`] if the request cannot run instantly and
    /// `fill_or_kill` is set, [`Error::ReachedMaxPending`] if the queues are
    /// full, and [`Error::Closed`] if the scheduler exits while the request
    /// waits.
    pub async fn schedule(
        &self,
        cost: f64,
        priority: Priority,
        fill_or_kill: bool,
    ) -> Result<Permit<'_>> {
        let shared = &*self.shared;
        let request = match shared.arrive(cost, priority, fill_or_kill)? {
            Arrival::Admitted(permit) => return Ok(permit),
            Arrival::Queued(request) => request,
        };

        let mut pending = PendingRequest {
            shared,
            request,
            priority,
            admitted: false,
        };
        pending.request.wait_for_validation().await?;
        pending.admitted = true;
        tracing::trace!("Pending request for {cost} tokens admitted");
        Ok(Permit::new(shared, cost))
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.scope.abort();
    }
}

impl RateController for Scheduler {
    fn can_acquire(&self, tokens: f64) -> bool {
        self.shared.admission.can_acquire(tokens)
    }

    /// Schedules `tokens` with [`Priority::Normal`], waiting for its turn.
    fn request(&self, tokens: f64) -> impl Future<Output = Result<Permit<'_>>> + Send {
        self.schedule(tokens, Priority::Normal, false)
    }
}

impl Shared {
    fn arrive(&self, cost: f64, priority: Priority, fill_or_kill: bool) -> Result<Arrival<'_>> {
        validate::tokens(cost)?;
        self.scope.ensure_entered()?;

        let mut queues = lock(&self.queues);
        if queues.closed {
            return Err(Error::Closed);
        }
        match self.admission.try_admit(cost) {
            Ok(()) => return Ok(Arrival::Admitted(Permit::new(self, cost))),
            Err(Error::RateLimit { .. }) if !fill_or_kill => {}
            Err(err) => return Err(err),
        }
        if let Some(max_pending) = self.max_pending {
            if queues.pending_requests >= max_pending {
                return Err(Error::ReachedMaxPending { max_pending });
            }
        }

        let request = Request::new(cost);
        queues.by_priority[priority.index()].add(request.clone());
        queues.pending_requests += 1;
        tracing::trace!(
            "Queued a {priority:?} request for {cost} tokens, {pending} pending",
            pending = queues.pending_requests
        );
        Ok(Arrival::Queued(request))
    }

    /// Withdraws a request whose caller stopped waiting.
    fn discard(&self, request: &Request, priority: Priority) {
        let mut queues = lock(&self.queues);
        if queues.by_priority[priority.index()].remove(request).is_ok() {
            queues.pending_requests -= 1;
            tracing::trace!("Withdrew a request for {} tokens", request.cost());
        } else if request.is_fired() {
            drop(queues);
            // Admitted by the processor, but nobody will hold the permit.
            self.release();
        }
    }

    fn reject_pending(&self) -> usize {
        let mut queues = lock(&self.queues);
        let mut rejected = 0;
        for queue in &mut queues.by_priority {
            while let Ok(request) = queue.pop() {
                request.reject();
                rejected += 1;
            }
        }
        queues.pending_requests = 0;
        queues.closed = true;
        rejected
    }

    fn listen_for_refills(&self, bucket: Arc<dyn Bucket>) -> Result<()> {
        let this = self.this.clone();
        self.scope.spawn(async move {
            let mut refill = bucket.wait_for_refill();
            loop {
                refill.await;
                refill = bucket.wait_for_refill();
                let Some(shared) = this.upgrade() else {
                    break;
                };
                shared.process_queued_requests().await;
                drop(shared);
                tokio::task::yield_now().await;
            }
        })
    }

    fn spawn_processing(&self) {
        let this = self.this.clone();
        let spawned = self.scope.spawn(async move {
            if let Some(shared) = this.upgrade() {
                shared.process_queued_requests().await;
            }
        });
        if let Err(err) = spawned {
            tracing::debug!("Not processing queued requests: {err}");
        }
    }

    /// Admits queued requests one at a time for as long as possible.
    async fn process_queued_requests(&self) {
        {
            let mut queues = lock(&self.queues);
            if queues.is_processing {
                return;
            }
            queues.is_processing = true;
        }
        let mut processing = Processing {
            queues: &self.queues,
            running: true,
        };
        while let Some(request) = self.fire_next(&mut processing) {
            request.wait_for_ack().await;
        }
    }

    /// Admits the head of the most urgent queue that can run, if any.
    ///
    /// The request's tokens and concurrency are committed before it is fired.
    /// When nothing can run, processing ends within the same critical section
    /// so that a concurrent trigger cannot be lost.
    fn fire_next(&self, processing: &mut Processing<'_>) -> Option<Request> {
        let mut queues = lock(&self.queues);
        let Queues {
            by_priority,
            pending_requests,
            is_processing,
            ..
        } = &mut *queues;

        for (index, queue) in by_priority.iter_mut().enumerate() {
            let Ok(cost) = queue.head().map(Request::cost) else {
                continue;
            };
            if !self.admission.can_acquire(cost) {
                continue;
            }
            let Ok(request) = queue.pop() else {
                continue;
            };
            *pending_requests -= 1;
            if let Err(err) = self.admission.try_admit(cost) {
                tracing::warn!("Could not admit a request for {cost} tokens: {err}");
                queue.add(request);
                *pending_requests += 1;
                continue;
            }
            tracing::trace!(
                "Firing a {priority:?} request for {cost} tokens",
                priority = Priority::ALL[index]
            );
            request.fire();
            return Some(request);
        }

        *is_processing = false;
        processing.running = false;
        None
    }
}

impl ReleaseConcurrency for Shared {
    fn release(&self) {
        if self.admission.release() {
            self.spawn_processing();
        }
    }
}

/// Clears the processing flag if a processing pass is cancelled midway.
struct Processing<'a> {
    queues: &'a Mutex<Queues>,
    running: bool,
}

impl Drop for Processing<'_> {
    fn drop(&mut self) {
        if self.running {
            lock(self.queues).is_processing = false;
        }
    }
}

/// Cleans up after a queued caller, however its wait ends.
struct PendingRequest<'a> {
    shared: &'a Shared,
    request: Request,
    priority: Priority,
    admitted: bool,
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if !self.admitted {
            self.shared.discard(&self.request, self.priority);
        }
        self.request.ack();
    }
}

/// Configures a [`Scheduler`].
#[derive(Default)]
#[must_use]
pub struct SchedulerBuilder {
    config: AdmissionConfig,
    max_pending: Option<usize>,
    queue_factory: Option<QueueFactory>,
}

impl fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("max_pending", &self.max_pending)
            .field("custom_queues", &self.queue_factory.is_some())
            .finish()
    }
}

impl SchedulerBuilder {
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

    /// Whether entering the scheduler also enters its buckets. Defaults to
    /// `true`.
    pub fn should_enter_context(mut self, should_enter_context: bool) -> Self {
        self.config.should_enter_context = should_enter_context;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = Some(max_concurrency);
        self
    }

    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }

    /// Replaces the queues of pending requests, one per priority level.
    ///
    /// By default requests are processed by ascending cost.
    pub fn queue_factory<F>(mut self, queue_factory: F) -> Self
    where
        F: Fn() -> Box<dyn Queue<Request> + Send> + Send + Sync + 'static,
    {
        self.queue_factory = Some(Box::new(queue_factory));
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a zero concurrency or pending
    /// limit.
    pub fn build(self) -> Result<Scheduler> {
        validate::max_pending(self.max_pending)?;
        let admission = self.config.build()?;
        let queue_factory = match self.queue_factory {
            Some(queue_factory) => queue_factory,
            None => Box::new(queue_by_cost) as QueueFactory,
        };
        let by_priority = Priority::ALL.iter().map(|_| queue_factory()).collect();
        let max_pending = self.max_pending;

        Ok(Scheduler {
            shared: Arc::new_cyclic(|this| Shared {
                this: this.clone(),
                admission,
                max_pending,
                queues: Mutex::new(Queues {
                    by_priority,
                    pending_requests: 0,
                    is_processing: false,
                    closed: false,
                }),
                scope: Scope::default(),
            }),
        })
    }
}

fn queue_by_cost() -> Box<dyn Queue<Request> + Send> {
    Box::new(PriorityQueue::<Request>::new())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::buckets::{FixedWindowCounter, UpdateCapacity};
    use crate::queues::FifoQueue;

    const WINDOW: Duration = Duration::from_secs(1);
    const MARGIN: Duration = Duration::from_millis(10);

    fn counter(capacity: f64) -> Arc<FixedWindowCounter> {
        Arc::new(FixedWindowCounter::new(capacity, WINDOW).unwrap())
    }

    async fn entered(builder: SchedulerBuilder) -> Arc<Scheduler> {
        let scheduler = builder.build().unwrap();
        scheduler.enter().await.unwrap();
        Arc::new(scheduler)
    }

    async fn with_counter(counter: &Arc<FixedWindowCounter>) -> Arc<Scheduler> {
        entered(Scheduler::builder().shared_bucket(Arc::clone(counter) as Arc<dyn Bucket>)).await
    }

    /// Lets spawned tasks run without moving the paused clock much.
    async fn settle() {
        tokio::time::sleep(MARGIN).await;
    }

    /// Schedules a request in the background; the flag is raised once it runs.
    fn spawn_request(
        scheduler: &Arc<Scheduler>,
        cost: f64,
        priority: Priority,
    ) -> (tokio::task::JoinHandle<Result<()>>, Arc<AtomicBool>) {
        let called = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn({
            let scheduler = Arc::clone(scheduler);
            let called = Arc::clone(&called);
            async move {
                let _permit = scheduler.schedule(cost, priority, false).await?;
                called.store(true, Ordering::SeqCst);
                Ok(())
            }
        });
        (handle, called)
    }

    #[test]
    fn test_argument_validation() {
        assert!(Scheduler::builder().build().is_ok());
        assert!(matches!(
            Scheduler::builder().max_concurrency(0).build(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Scheduler::builder().max_pending(0).build(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(Scheduler::builder()
            .max_concurrency(3)
            .max_pending(7)
            .build()
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_request_waits_for_refill() {
        let counter = counter(2.0);
        let scheduler = with_counter(&counter).await;

        let requests: Vec<_> = (0..3)
            .map(|_| spawn_request(&scheduler, 1.0, Priority::Normal))
            .collect();
        settle().await;
        let called = |index: usize| requests[index].1.load(Ordering::SeqCst);
        assert!(called(0));
        assert!(called(1));
        assert!(!called(2));
        assert_eq!(scheduler.pending_requests(), 1);

        tokio::time::sleep(WINDOW).await;
        assert!(called(2));
        assert_eq!(scheduler.pending_requests(), 0);
        assert_eq!(counter.tokens(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_higher_priority_goes_first() {
        let counter = counter(2.0);
        let scheduler = with_counter(&counter).await;
        let _exhausting = scheduler.schedule(2.0, Priority::Normal, false).await.unwrap();

        let (_, low_called) = spawn_request(&scheduler, 2.0, Priority::Low);
        settle().await;
        let (_, high_called) = spawn_request(&scheduler, 2.0, Priority::High);
        settle().await;

        tokio::time::sleep(WINDOW).await;
        assert!(high_called.load(Ordering::SeqCst));
        assert!(!low_called.load(Ordering::SeqCst));

        tokio::time::sleep(WINDOW).await;
        assert!(low_called.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cheaper_requests_go_first_within_a_priority() {
        let counter = counter(3.0);
        let scheduler = with_counter(&counter).await;
        let _exhausting = scheduler.schedule(3.0, Priority::Normal, false).await.unwrap();

        let (_, expensive_called) = spawn_request(&scheduler, 3.0, Priority::Normal);
        settle().await;
        let (_, cheap_called) = spawn_request(&scheduler, 1.0, Priority::Normal);
        settle().await;

        tokio::time::sleep(WINDOW).await;
        assert!(cheap_called.load(Ordering::SeqCst));
        assert!(!expensive_called.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_priority_does_not_block_lower_ones() {
        let counter = counter(2.0);
        let scheduler = with_counter(&counter).await;
        let _exhausting = scheduler.schedule(2.0, Priority::Normal, false).await.unwrap();

        let (_, too_expensive_called) = spawn_request(&scheduler, 5.0, Priority::Highest);
        let (_, low_called) = spawn_request(&scheduler, 1.0, Priority::Lowest);
        settle().await;

        tokio::time::sleep(WINDOW).await;
        assert!(low_called.load(Ordering::SeqCst));
        assert!(!too_expensive_called.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending_requests(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_never_runs() {
        let counter = counter(2.0);
        let scheduler = with_counter(&counter).await;
        let _exhausting = scheduler.schedule(2.0, Priority::Normal, false).await.unwrap();

        let (cancelled, cancelled_called) = spawn_request(&scheduler, 2.0, Priority::High);
        let (_, other_called) = spawn_request(&scheduler, 2.0, Priority::Low);
        settle().await;
        assert_eq!(scheduler.pending_requests(), 2);

        cancelled.abort();
        settle().await;
        assert_eq!(scheduler.pending_requests(), 1);

        tokio::time::sleep(WINDOW).await;
        assert!(!cancelled_called.load(Ordering::SeqCst));
        assert!(other_called.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_pending() {
        let counter = counter(1.0);
        let scheduler = entered(
            Scheduler::builder()
                .shared_bucket(Arc::clone(&counter) as Arc<dyn Bucket>)
                .max_pending(2),
        )
        .await;
        let _exhausting = scheduler.schedule(1.0, Priority::Normal, false).await.unwrap();

        let _waiting: Vec<_> = (0..2)
            .map(|_| spawn_request(&scheduler, 1.0, Priority::Normal))
            .collect();
        settle().await;

        assert_eq!(
            scheduler.schedule(1.0, Priority::Highest, false).await.unwrap_err(),
            Error::ReachedMaxPending { max_pending: 2 }
        );
        assert_eq!(scheduler.pending_requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_or_kill() {
        let counter = counter(1.0);
        let scheduler = with_counter(&counter).await;
        let _exhausting = scheduler.schedule(1.0, Priority::Normal, false).await.unwrap();

        assert_eq!(
            scheduler.schedule(1.0, Priority::Normal, true).await.unwrap_err(),
            Error::RateLimit { tokens: 1.0 }
        );
        assert_eq!(scheduler.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_concurrency_queues_requests() {
        let scheduler = entered(Scheduler::builder().max_concurrency(2)).await;
        let first = scheduler.request(1.0).await.unwrap();
        let _second = scheduler.request(1.0).await.unwrap();
        assert!(!scheduler.can_acquire(1.0));

        let (_, additional_called) = spawn_request(&scheduler, 1.0, Priority::Normal);
        settle().await;
        assert!(!additional_called.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending_requests(), 1);

        drop(first);
        settle().await;
        assert!(additional_called.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_queue_factory() {
        let counter = counter(3.0);
        let scheduler = entered(
            Scheduler::builder()
                .shared_bucket(Arc::clone(&counter) as Arc<dyn Bucket>)
                .queue_factory(|| Box::new(FifoQueue::<Request>::new())),
        )
        .await;
        let _exhausting = scheduler.schedule(3.0, Priority::Normal, false).await.unwrap();

        let (_, expensive_called) = spawn_request(&scheduler, 3.0, Priority::Normal);
        settle().await;
        let (_, cheap_called) = spawn_request(&scheduler, 1.0, Priority::Normal);
        settle().await;

        tokio::time::sleep(WINDOW).await;
        assert!(expensive_called.load(Ordering::SeqCst));
        assert!(!cheap_called.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_several_buckets_are_grouped() {
        let fast = counter(2.0);
        let slow = Arc::new(FixedWindowCounter::new(3.0, WINDOW * 2).unwrap());
        let scheduler = entered(
            Scheduler::builder()
                .shared_bucket(Arc::clone(&fast) as Arc<dyn Bucket>)
                .shared_bucket(Arc::clone(&slow) as Arc<dyn Bucket>),
        )
        .await;
        assert_eq!(fast.state(), State::Entered);

        let _first = scheduler.schedule(2.0, Priority::Normal, false).await.unwrap();
        assert_eq!(slow.tokens(), 1.0);
        let (_, second_called) = spawn_request(&scheduler, 2.0, Priority::Normal);

        tokio::time::sleep(WINDOW + MARGIN).await;
        assert!(!second_called.load(Ordering::SeqCst));

        tokio::time::sleep(WINDOW).await;
        assert!(second_called.load(Ordering::SeqCst));

        scheduler.exit().await;
        assert_eq!(fast.state(), State::Closed);
        assert_eq!(slow.state(), State::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_leaving_after_admission_releases_concurrency() {
        let scheduler = entered(Scheduler::builder().max_concurrency(1)).await;
        let first = scheduler.request(1.0).await.unwrap();

        let mut waiting = Box::pin(scheduler.schedule(1.0, Priority::Normal, false));
        tokio::select! {
            biased;
            _ = &mut waiting => panic!("admitted past the concurrency limit"),
            () = std::future::ready(()) => {}
        }
        assert_eq!(scheduler.pending_requests(), 1);

        drop(first);
        settle().await;
        // Admitted and holding concurrency, but the caller has not resumed yet.
        assert_eq!(scheduler.pending_requests(), 0);
        assert_eq!(scheduler.concurrent_requests(), 1);

        drop(waiting);
        settle().await;
        assert_eq!(scheduler.concurrent_requests(), 0);
        assert!(!lock(&scheduler.shared.queues).is_processing);
        let _next = scheduler.request(1.0).await.unwrap();
        assert_eq!(scheduler.concurrent_requests(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_and_release_at_the_same_time() {
        let counter = counter(1.0);
        let scheduler = entered(
            Scheduler::builder()
                .shared_bucket(Arc::clone(&counter) as Arc<dyn Bucket>)
                .max_concurrency(1),
        )
        .await;
        let start = tokio::time::Instant::now();

        let holder = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move {
                let _permit = scheduler.schedule(1.0, Priority::Normal, false).await?;
                // Released at the very moment the counter refills.
                tokio::time::sleep_until(start + WINDOW).await;
                Ok::<_, Error>(())
            }
        });
        settle().await;
        let requests: Vec<_> = (0..2)
            .map(|_| spawn_request(&scheduler, 1.0, Priority::Normal))
            .collect();
        settle().await;
        assert_eq!(scheduler.pending_requests(), 2);
        let called = || {
            requests
                .iter()
                .filter(|(_, called)| called.load(Ordering::SeqCst))
                .count()
        };

        tokio::time::sleep_until(start + WINDOW + MARGIN).await;
        holder.await.unwrap().unwrap();
        assert_eq!(called(), 1);
        assert_eq!(scheduler.pending_requests(), 1);
        assert_eq!(scheduler.concurrent_requests(), 0);
        assert!(!lock(&scheduler.shared.queues).is_processing);

        tokio::time::sleep(WINDOW).await;
        assert_eq!(called(), 2);
        assert_eq!(scheduler.pending_requests(), 0);
    }

    mod lifecycle {
        use pretty_assertions::assert_eq;

        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_nothing_is_queued_once_pending_requests_were_rejected() {
            let counter = counter(1.0);
            let scheduler = with_counter(&counter).await;
            let _exhausting = scheduler.schedule(1.0, Priority::Normal, false).await.unwrap();

            // As `exit` does, after its state check may already have passed.
            assert_eq!(scheduler.shared.reject_pending(), 0);

            assert_eq!(
                scheduler.schedule(1.0, Priority::Normal, false).await.unwrap_err(),
                Error::Closed
            );
            assert_eq!(scheduler.pending_requests(), 0);
        }

        #[tokio::test]
        async fn test_requires_entering() {
            let scheduler = Scheduler::builder().build().unwrap();

            assert_eq!(
                scheduler.schedule(1.0, Priority::Normal, false).await.unwrap_err(),
                Error::NotEntered
            );
        }

        #[tokio::test]
        async fn test_cannot_enter_twice_or_reopen() {
            let scheduler = Scheduler::builder().build().unwrap();
            scheduler.enter().await.unwrap();

            assert_eq!(scheduler.enter().await, Err(Error::AlreadyEntered));
            scheduler.exit().await;
            assert_eq!(scheduler.state(), State::Closed);
            assert_eq!(scheduler.enter().await, Err(Error::Closed));
            assert_eq!(
                scheduler.request(1.0).await.unwrap_err(),
                Error::Closed
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_exit_rejects_pending_requests() {
            let counter = counter(1.0);
            let scheduler = with_counter(&counter).await;
            let exhausting = scheduler.schedule(1.0, Priority::Normal, false).await.unwrap();
            let (waiting, called) = spawn_request(&scheduler, 1.0, Priority::Normal);
            settle().await;

            drop(exhausting);
            scheduler.exit().await;

            assert_eq!(waiting.await.unwrap(), Err(Error::Closed));
            assert!(!called.load(Ordering::SeqCst));
            assert_eq!(scheduler.pending_requests(), 0);
            assert_eq!(counter.state(), State::Closed);
        }
    }
}
