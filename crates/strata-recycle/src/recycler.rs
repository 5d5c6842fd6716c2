//! Background recycler
//!
//! Receives locations that metadata no longer references and asks the owning
//! backend cluster to release them. The dispatcher routes every task to a
//! per-cluster lane drained by a fixed set of workers. A worker issues one
//! delete under a deadline; a failed task goes to the retry timer and the
//! worker moves on. Tasks that spend their retry budget become
//! [`DeadLetter`] records.

use crate::recovery::GarbageSource;
use crate::retry::BackoffPolicy;
use crate::task::{DeadLetter, DeadLetterLog, RecycleTask, TaskState};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use strata_common::config::RecycleConfig;
use strata_common::{ClusterId, Error, ObjectLocation, Result};
use strata_placement::ClusterRegistry;
use strata_storage::{BackendError, BackendTable, DeleteOutcome};
use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type Lane = Arc<AsyncMutex<mpsc::UnboundedReceiver<RecycleTask>>>;

/// Recycler statistics for monitoring
#[derive(Debug, Default)]
pub struct RecyclerStats {
    /// Tasks accepted by `enqueue`
    pub enqueued: AtomicU64,
    /// Enqueues ignored because the location already had a live task
    pub duplicates: AtomicU64,
    /// Tasks that reached `Done`
    pub reclaimed: AtomicU64,
    /// Of `reclaimed`, tasks whose locator was already gone
    pub not_found: AtomicU64,
    /// Individual delete attempts that failed or timed out
    pub failed_attempts: AtomicU64,
    /// Tasks that exhausted their retry budget
    pub dead_lettered: AtomicU64,
    /// Dead letters dropped to keep the log within capacity
    pub dead_letters_evicted: AtomicU64,
    /// Tasks dropped at shutdown before they finished
    pub abandoned: AtomicU64,
}

/// A failed task waiting out its backoff
struct DelayedTask {
    due: Instant,
    seq: u64,
    task: RecycleTask,
}

impl PartialEq for DelayedTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for DelayedTask {}

impl PartialOrd for DelayedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Asynchronous reclaimer of unreferenced backend storage
pub struct Recycler {
    config: RecycleConfig,
    backoff: BackoffPolicy,
    registry: Arc<ClusterRegistry>,
    backends: Arc<BackendTable>,
    /// Non-terminal tasks by location; at most one per location
    active: DashMap<ObjectLocation, TaskState>,
    dead_letters: Mutex<DeadLetterLog>,
    /// Work queue per cluster, each drained by `workers_per_cluster` workers
    lanes: DashMap<ClusterId, mpsc::UnboundedSender<RecycleTask>>,
    /// Failed tasks by retry time, earliest first
    retries: Mutex<BinaryHeap<Reverse<DelayedTask>>>,
    retry_seq: AtomicU64,
    retry_scheduled: Notify,
    stopping: AtomicBool,
    queue_tx: mpsc::UnboundedSender<RecycleTask>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<RecycleTask>>>,
    idle: Notify,
    stats: RecyclerStats,
}

impl Recycler {
    /// Create a recycler. Nothing is reclaimed until [`Recycler::run`] (or
    /// [`Recycler::start`]) drives the queue.
    #[must_use]
    pub fn new(
        config: RecycleConfig,
        registry: Arc<ClusterRegistry>,
        backends: Arc<BackendTable>,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            backoff: BackoffPolicy::from_config(&config),
            config,
            registry,
            backends,
            active: DashMap::new(),
            dead_letters: Mutex::new(DeadLetterLog::default()),
            lanes: DashMap::new(),
            retries: Mutex::new(BinaryHeap::new()),
            retry_seq: AtomicU64::new(0),
            retry_scheduled: Notify::new(),
            stopping: AtomicBool::new(false),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            idle: Notify::new(),
            stats: RecyclerStats::default(),
        })
    }

    /// Spawn the dispatcher on the current runtime
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(shutdown))
    }

    /// Dispatcher loop: route queued tasks to their cluster lane and release
    /// failed tasks whose backoff has elapsed, until `shutdown` flips to
    /// true (or its sender is dropped).
    ///
    /// Deletes already in flight finish after shutdown. Tasks still queued
    /// or backing off are abandoned; recovery re-derives them on the next
    /// start.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let queue = self.queue_rx.lock().take();
        let Some(mut queue) = queue else {
            warn!("recycler dispatcher already running");
            return;
        };
        info!(
            workers_per_cluster = self.config.workers_per_cluster,
            max_retries = self.config.max_retries,
            "recycler started"
        );

        loop {
            let next_retry = self.retries.lock().peek().map(|Reverse(d)| d.due);
            let retry_timer = async move {
                match next_retry {
                    Some(due) => tokio::time::sleep_until(due).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                task = queue.recv() => {
                    let Some(task) = task else { break };
                    self.route(task);
                }
                () = retry_timer => self.release_due_retries(),
                // An earlier retry may have been scheduled; re-arm the timer
                () = self.retry_scheduled.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let waiting: Vec<RecycleTask> = {
            let mut retries = self.retries.lock();
            self.stopping.store(true, Ordering::SeqCst);
            retries.drain().map(|Reverse(d)| d.task).collect()
        };
        // Workers exit once their lane is drained
        self.lanes.clear();

        queue.close();
        let mut abandoned = waiting.len();
        for task in waiting {
            self.abandon(&task);
        }
        while let Ok(task) = queue.try_recv() {
            self.abandon(&task);
            abandoned += 1;
        }
        info!(abandoned, "recycler stopped");
    }

    /// Schedule a location for reclaim.
    ///
    /// Returns false when the location already has a task that is not
    /// terminal, when it sits in the dead-letter log, or when the recycler
    /// has shut down.
    pub fn enqueue(&self, location: ObjectLocation) -> bool {
        if self.dead_letters.lock().contains(&location) {
            debug!(%location, "location is dead-lettered, drain dead letters before re-enqueueing");
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        match self.active.entry(location.clone()) {
            Entry::Occupied(existing) => {
                debug!(%location, state = %existing.get(), "recycle task already scheduled");
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(TaskState::Pending);
            }
        }

        if self.queue_tx.send(RecycleTask::new(location.clone())).is_err() {
            warn!(%location, "recycler is shut down, task not accepted");
            self.finish(&location);
            return false;
        }
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!(%location, "recycle task enqueued");
        true
    }

    /// Re-enqueue every location a garbage source reports as unreferenced.
    /// Returns how many new tasks were created.
    pub async fn recover(&self, source: &dyn GarbageSource) -> Result<usize> {
        let locations = source.list_unreferenced().await?;
        let total = locations.len();
        let enqueued = locations
            .into_iter()
            .map(|location| self.enqueue(location))
            .filter(|accepted| *accepted)
            .count();
        info!(total, enqueued, "recycle tasks recovered");
        Ok(enqueued)
    }

    /// Current state of the task for a location.
    ///
    /// `None` means no task exists: never enqueued, or already `Done`.
    #[must_use]
    pub fn task_state(&self, location: &ObjectLocation) -> Option<TaskState> {
        if let Some(state) = self.active.get(location) {
            return Some(*state);
        }
        self.dead_letters
            .lock()
            .contains(location)
            .then_some(TaskState::DeadLettered)
    }

    /// Copy of the dead-letter records, oldest first
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().to_vec()
    }

    /// Drain the dead-letter records. Drained locations can be enqueued again.
    pub fn take_dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().drain()
    }

    /// Tasks not yet terminal
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.active.len()
    }

    pub const fn stats(&self) -> &RecyclerStats {
        &self.stats
    }

    /// Wait until no task is pending, in flight or backing off
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Hand a task to its cluster lane, opening the lane on first use
    fn route(self: &Arc<Self>, task: RecycleTask) {
        let cluster = task.location.cluster.clone();
        let lane = self
            .lanes
            .entry(cluster.clone())
            .or_insert_with(|| self.open_lane(&cluster))
            .clone();

        if let Err(mpsc::error::SendError(task)) = lane.send(task) {
            error!(location = %task.location, "recycle lane has no workers, dropping task");
            self.lanes.remove(&cluster);
            self.abandon(&task);
        }
    }

    fn open_lane(self: &Arc<Self>, cluster: &ClusterId) -> mpsc::UnboundedSender<RecycleTask> {
        let (tx, rx) = mpsc::unbounded_channel();
        let lane: Lane = Arc::new(AsyncMutex::new(rx));
        let workers = self.config.workers_per_cluster.max(1);
        for worker in 0..workers {
            tokio::spawn(Arc::clone(self).work(cluster.clone(), worker, Arc::clone(&lane)));
        }
        debug!(%cluster, workers, "recycle lane opened");
        tx
    }

    /// Worker loop: one delete at a time from the cluster lane
    async fn work(self: Arc<Self>, cluster: ClusterId, worker: usize, lane: Lane) {
        loop {
            let next = lane.lock().await.recv().await;
            let Some(task) = next else { break };
            if self.stopping.load(Ordering::SeqCst) {
                self.abandon(&task);
                continue;
            }
            self.attempt(task).await;
        }
        debug!(%cluster, worker, "recycle worker stopped");
    }

    /// Move every task whose backoff has elapsed back to its lane
    fn release_due_retries(self: &Arc<Self>) {
        let now = Instant::now();
        let mut due = Vec::new();
        {
            let mut retries = self.retries.lock();
            while retries.peek().is_some_and(|Reverse(d)| d.due <= now) {
                if let Some(Reverse(delayed)) = retries.pop() {
                    due.push(delayed.task);
                }
            }
        }
        for task in due {
            self.set_state(&task.location, TaskState::Pending);
            self.route(task);
        }
    }

    fn set_state(&self, location: &ObjectLocation, state: TaskState) {
        if let Some(mut entry) = self.active.get_mut(location) {
            *entry = state;
        }
    }

    fn finish(&self, location: &ObjectLocation) {
        self.active.remove(location);
        if self.active.is_empty() {
            self.idle.notify_waiters();
        }
    }

    fn abandon(&self, task: &RecycleTask) {
        debug!(location = %task.location, attempts = task.attempts, "recycle task abandoned");
        self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
        self.finish(&task.location);
    }

    /// One delete call, then the task is done, dead-lettered or scheduled
    /// for a retry
    async fn attempt(&self, mut task: RecycleTask) {
        self.set_state(&task.location, TaskState::InFlight);
        task.attempts += 1;

        match self.reclaim(&task.location).await {
            Ok(outcome) => {
                if outcome == DeleteOutcome::NotFound {
                    self.stats.not_found.fetch_add(1, Ordering::Relaxed);
                }
                self.stats.reclaimed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    location = %task.location,
                    attempts = task.attempts,
                    ?outcome,
                    queued_ms = task.enqueued_at.elapsed().as_millis(),
                    "recycle task done"
                );
                self.finish(&task.location);
            }
            Err(e) => {
                self.stats.failed_attempts.fetch_add(1, Ordering::Relaxed);
                // The first call is not a retry
                if task.attempts > self.config.max_retries {
                    self.dead_letter(task, &e);
                } else {
                    self.schedule_retry(task, &e);
                }
            }
        }
    }

    fn schedule_retry(&self, task: RecycleTask, error: &Error) {
        let delay = self.backoff.delay_after(task.attempts);
        let mut retries = self.retries.lock();
        if self.stopping.load(Ordering::SeqCst) {
            drop(retries);
            self.abandon(&task);
            return;
        }

        debug!(
            location = %task.location,
            attempts = task.attempts,
            error = %error,
            delay_ms = delay.as_millis(),
            "recycle attempt failed, backing off"
        );
        self.set_state(&task.location, TaskState::Failed);
        retries.push(Reverse(DelayedTask {
            due: Instant::now() + delay,
            seq: self.retry_seq.fetch_add(1, Ordering::Relaxed),
            task,
        }));
        drop(retries);
        self.retry_scheduled.notify_one();
    }

    fn dead_letter(&self, task: RecycleTask, error: &Error) {
        warn!(
            location = %task.location,
            attempts = task.attempts,
            error = %error,
            "recycle task dead-lettered"
        );
        self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);

        let location = task.location.clone();
        let (evicted, held) = {
            let mut log = self.dead_letters.lock();
            let evicted = log.push(task.into_dead_letter(error.to_string()), self.config.dead_letter_capacity);
            (evicted, log.len())
        };
        if let Some(oldest) = evicted {
            warn!(
                location = %oldest.location,
                held,
                "dead-letter log full, dropping oldest record"
            );
            self.stats.dead_letters_evicted.fetch_add(1, Ordering::Relaxed);
        }
        self.finish(&location);
    }

    /// One delete call against the owning cluster
    async fn reclaim(&self, location: &ObjectLocation) -> Result<DeleteOutcome> {
        // Liveness is not checked: dead clusters still get their garbage back
        if self.registry.snapshot().get(&location.cluster).is_none() {
            return Err(Error::UnknownCluster(location.cluster.clone()));
        }
        let driver = self.backends.require(&location.cluster)?;

        let call = driver.delete(&location.pool, &location.locator);
        match tokio::time::timeout(self.config.call_timeout(), call).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(BackendError::NotFound(_))) => Ok(DeleteOutcome::NotFound),
            Ok(Err(e)) => Err(e.for_cluster(&location.cluster)),
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::StaticGarbageSource;
    use bytes::Bytes;
    use std::time::Duration;
    use strata_common::{ClusterStatus, Locator, PoolName, PoolRegime, StorageClass};
    use strata_placement::ClusterDescriptor;
    use strata_storage::MemoryBackend;

    struct Harness {
        recycler: Arc<Recycler>,
        backend: Arc<MemoryBackend>,
        backends: Arc<BackendTable>,
        shutdown: watch::Sender<bool>,
        dispatcher: JoinHandle<()>,
    }

    fn config() -> RecycleConfig {
        RecycleConfig {
            workers_per_cluster: 2,
            max_retries: 2,
            base_backoff_ms: 100,
            max_backoff_ms: 1_000,
            call_timeout_ms: 500,
            dead_letter_capacity: 100,
        }
    }

    fn harness_with(config: RecycleConfig, status: ClusterStatus) -> Harness {
        let registry = Arc::new(
            ClusterRegistry::with_clusters(vec![
                ClusterDescriptor::new("ceph-a", 1)
                    .with_pool("rabbit", StorageClass::Standard, PoolRegime::Small)
                    .with_status(status),
                ClusterDescriptor::new("ceph-b", 1)
                    .with_pool("rabbit", StorageClass::Standard, PoolRegime::Small),
            ])
            .unwrap(),
        );
        let backend = Arc::new(MemoryBackend::new());
        let backends = Arc::new(BackendTable::new());
        backends.register(ClusterId::new("ceph-a"), backend.clone());

        let recycler = Recycler::new(config, registry, Arc::clone(&backends));
        let (shutdown, rx) = watch::channel(false);
        let dispatcher = recycler.start(rx);
        Harness {
            recycler,
            backend,
            backends,
            shutdown,
            dispatcher,
        }
    }

    fn harness() -> Harness {
        harness_with(config(), ClusterStatus::Live)
    }

    fn location(n: u32) -> ObjectLocation {
        ObjectLocation::new("ceph-a", "rabbit", format!("obj-{n}"))
    }

    fn store(backend: &MemoryBackend, n: u32) {
        backend.insert("rabbit", format!("obj-{n}"), Bytes::from_static(b"garbage"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaims_and_removes_task() {
        let h = harness();
        store(&h.backend, 1);

        assert!(h.recycler.enqueue(location(1)));
        h.recycler.wait_idle().await;

        assert!(!h.backend.contains(&PoolName::new("rabbit"), &Locator::new("obj-1")));
        assert_eq!(h.recycler.task_state(&location(1)), None);
        assert_eq!(h.recycler.stats().reclaimed.load(Ordering::Relaxed), 1);
        assert_eq!(h.recycler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_enqueue_reclaims_once() {
        let h = harness();
        store(&h.backend, 1);
        h.backend.set_delete_delay(Some(Duration::from_millis(50)));

        assert!(h.recycler.enqueue(location(1)));
        assert!(!h.recycler.enqueue(location(1)));
        assert_eq!(h.recycler.task_state(&location(1)), Some(TaskState::Pending));

        h.recycler.wait_idle().await;
        assert_eq!(h.backend.stats().deletes.load(Ordering::Relaxed), 1);
        assert_eq!(h.recycler.stats().duplicates.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_locator_counts_as_done() {
        let h = harness();

        assert!(h.recycler.enqueue(location(7)));
        h.recycler.wait_idle().await;

        assert_eq!(h.recycler.stats().reclaimed.load(Ordering::Relaxed), 1);
        assert_eq!(h.recycler.stats().not_found.load(Ordering::Relaxed), 1);
        assert!(h.recycler.dead_letters().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let h = harness();
        store(&h.backend, 1);
        h.backend.fail_next_deletes(2);

        h.recycler.enqueue(location(1));
        h.recycler.wait_idle().await;

        assert_eq!(h.backend.stats().deletes.load(Ordering::Relaxed), 3);
        assert_eq!(h.recycler.stats().failed_attempts.load(Ordering::Relaxed), 2);
        assert_eq!(h.recycler.stats().reclaimed.load(Ordering::Relaxed), 1);
        assert!(h.backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_is_failed_while_backing_off() {
        let h = harness();
        store(&h.backend, 1);
        h.backend.fail_next_deletes(1);

        h.recycler.enqueue(location(1));
        // First attempt fails at t=0, the retry waits 100ms
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.recycler.task_state(&location(1)), Some(TaskState::Failed));

        h.recycler.wait_idle().await;
        assert_eq!(h.recycler.task_state(&location(1)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_dead_letter() {
        let h = harness();
        store(&h.backend, 1);
        h.backend.fail_next_deletes(100);

        h.recycler.enqueue(location(1));
        h.recycler.wait_idle().await;

        // The first call plus every retry
        let calls = config().max_retries + 1;
        assert_eq!(h.backend.stats().deletes.load(Ordering::Relaxed), u64::from(calls));
        assert_eq!(h.recycler.task_state(&location(1)), Some(TaskState::DeadLettered));

        let letters = h.recycler.dead_letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].location, location(1));
        assert_eq!(letters[0].attempts, calls);
        assert!(letters[0].last_error.contains("unavailable"));

        // No further attempts once dead-lettered
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.backend.stats().deletes.load(Ordering::Relaxed), u64::from(calls));

        assert_eq!(h.recycler.take_dead_letters().len(), 1);
        assert!(h.recycler.dead_letters().is_empty());
        assert_eq!(h.recycler.task_state(&location(1)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_makes_one_call() {
        let mut config = config();
        config.max_retries = 0;
        let h = harness_with(config, ClusterStatus::Live);
        store(&h.backend, 1);
        h.backend.fail_next_deletes(100);

        h.recycler.enqueue(location(1));
        h.recycler.wait_idle().await;

        assert_eq!(h.backend.stats().deletes.load(Ordering::Relaxed), 1);
        assert_eq!(h.recycler.dead_letters()[0].attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_lettered_location_not_requeued_until_drained() {
        let h = harness();
        store(&h.backend, 1);
        h.backend.fail_next_deletes(3);

        h.recycler.enqueue(location(1));
        h.recycler.wait_idle().await;
        assert_eq!(h.recycler.task_state(&location(1)), Some(TaskState::DeadLettered));

        // Recovery would otherwise loop the same garbage forever
        let source = StaticGarbageSource::new(vec![location(1)]);
        assert_eq!(h.recycler.recover(&source).await.unwrap(), 0);
        assert!(!h.recycler.enqueue(location(1)));
        assert_eq!(h.recycler.dead_letters().len(), 1);
        assert_eq!(h.recycler.pending_count(), 0);

        assert_eq!(h.recycler.take_dead_letters().len(), 1);
        assert!(h.recycler.enqueue(location(1)));
        h.recycler.wait_idle().await;

        assert!(h.backend.is_empty());
        assert!(h.recycler.dead_letters().is_empty());
        assert_eq!(h.recycler.task_state(&location(1)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_letter_log_drops_oldest_at_capacity() {
        let mut config = config();
        config.max_retries = 0;
        config.dead_letter_capacity = 2;
        let h = harness_with(config, ClusterStatus::Live);
        h.backend.fail_next_deletes(100);
        h.backend.set_delete_delay(Some(Duration::from_millis(10)));

        // Serialize the failures so the dead-letter order is known
        for n in 0..4 {
            h.recycler.enqueue(location(n));
            h.recycler.wait_idle().await;
        }

        let kept: Vec<_> = h.recycler.dead_letters().into_iter().map(|l| l.location).collect();
        assert_eq!(kept, vec![location(2), location(3)]);
        assert_eq!(h.recycler.stats().dead_lettered.load(Ordering::Relaxed), 4);
        assert_eq!(h.recycler.stats().dead_letters_evicted.load(Ordering::Relaxed), 2);
        // Evicted locations may be enqueued again
        assert_eq!(h.recycler.task_state(&location(0)), None);
        assert!(h.recycler.enqueue(location(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let h = harness();
        store(&h.backend, 1);
        h.backend.set_delete_delay(Some(Duration::from_secs(5)));

        h.recycler.enqueue(location(1));
        h.recycler.wait_idle().await;

        let letters = h.recycler.dead_letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].last_error, Error::Timeout.to_string());
        assert_eq!(h.recycler.stats().failed_attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_per_cluster() {
        let h = harness();
        h.backend.set_delete_delay(Some(Duration::from_millis(100)));
        for n in 0..10 {
            store(&h.backend, n);
            assert!(h.recycler.enqueue(location(n)));
        }

        h.recycler.wait_idle().await;

        assert!(h.backend.is_empty());
        assert_eq!(h.backend.stats().max_concurrent_deletes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlog_runs_on_fixed_workers() {
        let h = harness();
        h.backend.set_delete_delay(Some(Duration::from_millis(100)));
        let baseline = tokio::runtime::Handle::current().metrics().num_alive_tasks();
        for n in 0..500 {
            store(&h.backend, n);
            assert!(h.recycler.enqueue(location(n)));
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        let alive = tokio::runtime::Handle::current().metrics().num_alive_tasks();
        // Dispatcher already counted in the baseline; one lane of two workers
        assert!(alive <= baseline + 2, "{alive} tasks alive for a 500 task backlog");
        assert_eq!(h.recycler.pending_count(), 500);

        h.recycler.wait_idle().await;
        assert!(h.backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_does_not_hold_a_worker() {
        let mut config = config();
        config.workers_per_cluster = 1;
        config.base_backoff_ms = 10_000;
        config.max_backoff_ms = 10_000;
        let h = harness_with(config, ClusterStatus::Live);
        store(&h.backend, 1);
        store(&h.backend, 2);
        h.backend.fail_next_deletes(1);

        h.recycler.enqueue(location(1));
        h.recycler.enqueue(location(2));
        tokio::time::sleep(Duration::from_secs(1)).await;

        // The only worker moved on to obj-2 while obj-1 waits out its backoff
        assert_eq!(h.recycler.task_state(&location(1)), Some(TaskState::Failed));
        assert_eq!(h.recycler.task_state(&location(2)), None);
        assert!(!h.backend.contains(&PoolName::new("rabbit"), &Locator::new("obj-2")));

        h.recycler.wait_idle().await;
        assert!(h.backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_cluster_is_still_reclaimed() {
        let h = harness_with(config(), ClusterStatus::Dead);
        store(&h.backend, 1);

        h.recycler.enqueue(location(1));
        h.recycler.wait_idle().await;

        assert!(h.backend.is_empty());
        assert!(h.recycler.dead_letters().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_cluster_and_missing_driver_dead_letter() {
        let h = harness();
        let ghost = ObjectLocation::new("ghost", "rabbit", "obj-1");
        // Known to the registry, but no driver registered
        let orphan = ObjectLocation::new("ceph-b", "rabbit", "obj-1");

        h.recycler.enqueue(ghost.clone());
        h.recycler.enqueue(orphan.clone());
        h.recycler.wait_idle().await;

        let letters = h.recycler.dead_letters();
        assert_eq!(letters.len(), 2);
        assert!(letters.iter().all(|l| l.attempts == config().max_retries + 1));
        assert!(letters.iter().all(|l| l.last_error.contains("unknown cluster")));
        assert!(h.backends.get(&ClusterId::new("ceph-b")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_enqueues_unreferenced() {
        let h = harness();
        for n in 0..3 {
            store(&h.backend, n);
        }
        h.backend.set_delete_delay(Some(Duration::from_millis(10)));
        h.recycler.enqueue(location(0));

        let source = StaticGarbageSource::new(vec![location(0), location(1), location(2)]);
        assert_eq!(h.recycler.recover(&source).await.unwrap(), 2);

        h.recycler.wait_idle().await;
        assert!(h.backend.is_empty());
        assert_eq!(h.recycler.stats().enqueued.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_after_shutdown_is_rejected() {
        let h = harness();
        h.shutdown.send(true).unwrap();
        h.dispatcher.await.unwrap();

        assert!(!h.recycler.enqueue(location(1)));
        assert_eq!(h.recycler.pending_count(), 0);
        h.recycler.wait_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_tasks_backing_off() {
        let mut config = config();
        config.base_backoff_ms = 10_000;
        config.max_backoff_ms = 10_000;
        let h = harness_with(config, ClusterStatus::Live);
        store(&h.backend, 1);
        h.backend.fail_next_deletes(1);

        h.recycler.enqueue(location(1));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.recycler.task_state(&location(1)), Some(TaskState::Failed));

        h.shutdown.send(true).unwrap();
        h.dispatcher.await.unwrap();
        h.recycler.wait_idle().await;

        assert_eq!(h.recycler.pending_count(), 0);
        assert_eq!(h.recycler.stats().abandoned.load(Ordering::Relaxed), 1);
        assert_eq!(h.backend.stats().deletes.load(Ordering::Relaxed), 1);
        // Recovery picks the garbage up on the next start
        assert_eq!(h.backend.len(), 1);
    }
}
