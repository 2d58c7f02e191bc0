// Asynchronous node discovery.
//
// A discovery task is one blocking "nearest feature of kind F within R of P"
// query against the host's `FeatureLocator`. The `DiscoveryCoordinator`
// spreads tasks over a fixed pool of worker threads and collects their
// answers.
//
// Workers never touch shared state. Each one loops on a job channel, runs
// the query, and sends a `WorkerMessage` back on a result channel. The
// coordinator is the single consumer and owns the result table outright (a
// `BTreeMap` keyed by task id), so callers poll and take results without any
// locking. A pool of size 0, or one whose threads cannot be spawned, runs
// every task inline on the caller instead (`WorkerPoolUnavailable` is logged,
// never returned).
//
// Target filters are scheduled by `RoundRobin`: across N submissions each of
// K filters is searched N / K times, interleaved, rather than one filter
// being exhausted before the next starts.
//
// A task whose filter the locator cannot resolve (`InvalidTargetFilter`) is
// logged and dropped: it never produces a result. A locator that panics
// yields a result with `completed: false`; the worker survives.
//
// Shutdown stops accepting tasks, closes the job channel, and waits up to a
// timeout for the workers to drain it and exit. Threads still busy after the
// timeout are told to abort before their next task and then detached; a
// thread blocked inside the locator cannot be interrupted.
//
// See also: `batch.rs` (where discovered nodes wait before planning),
// `network.rs` (which feeds results into the graph).

use crate::config::DiscoveryParams;
use crate::error::DiscoveryError;
use crate::types::Point2;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use waymark_prng::PlanRng;

pub type TaskId = u64;

/// Host-side feature search. Implementations may block.
pub trait FeatureLocator: Send + Sync {
    /// Nearest feature matching `filter` within `radius` of `center`, or
    /// `None` if there is none.
    fn locate_nearest(
        &self,
        filter: &str,
        center: Point2,
        radius: i32,
    ) -> Result<Option<Point2>, DiscoveryError>;
}

/// One queued search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryTask {
    pub id: TaskId,
    pub center: Point2,
    pub radius: i32,
    pub filter: String,
}

/// Outcome of a finished search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskResult {
    pub id: TaskId,
    pub center: Point2,
    /// Where the feature was found, if anywhere.
    pub position: Option<Point2>,
    /// The filter that was searched.
    pub label: String,
    pub completed: bool,
}

enum WorkerMessage {
    Done(TaskResult),
    Dropped(TaskId),
    Exited,
}

/// Endless cycle over the configured target filters.
#[derive(Clone, Debug)]
pub struct RoundRobin {
    filters: Vec<String>,
    cursor: usize,
}

impl RoundRobin {
    pub fn new(filters: Vec<String>) -> Self {
        Self { filters, cursor: 0 }
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }
}

impl Iterator for RoundRobin {
    type Item = String;

    /// The next filter in rotation; `None` only when there are no filters.
    fn next(&mut self) -> Option<String> {
        if self.filters.is_empty() {
            return None;
        }
        let filter = self.filters[self.cursor % self.filters.len()].clone();
        self.cursor = (self.cursor + 1) % self.filters.len();
        Some(filter)
    }
}

/// Run one search. A panicking locator is contained here: the task comes
/// back with `completed: false` and the worker keeps serving the queue.
fn run_task(locator: &dyn FeatureLocator, task: DiscoveryTask) -> WorkerMessage {
    let (id, center, label) = (task.id, task.center, task.filter.clone());
    panic::catch_unwind(AssertUnwindSafe(|| locate(locator, task))).unwrap_or_else(|_| {
        warn!("discovery task {id} ({label} near {center}): locator panicked");
        WorkerMessage::Done(TaskResult {
            id,
            center,
            position: None,
            label,
            completed: false,
        })
    })
}

fn locate(locator: &dyn FeatureLocator, task: DiscoveryTask) -> WorkerMessage {
    match locator.locate_nearest(&task.filter, task.center, task.radius) {
        Ok(position) => {
            debug!(
                "discovery task {} ({} near {}): {:?}",
                task.id, task.filter, task.center, position
            );
            WorkerMessage::Done(TaskResult {
                id: task.id,
                center: task.center,
                position,
                label: task.filter,
                completed: true,
            })
        }
        Err(err @ DiscoveryError::InvalidTargetFilter(_)) => {
            warn!("dropping discovery task {}: {err}", task.id);
            WorkerMessage::Dropped(task.id)
        }
        Err(err) => {
            warn!("discovery task {} failed: {err}", task.id);
            WorkerMessage::Done(TaskResult {
                id: task.id,
                center: task.center,
                position: None,
                label: task.filter,
                completed: true,
            })
        }
    }
}

/// Owns the worker pool, the filter rotation, and the result table.
pub struct DiscoveryCoordinator {
    locator: Arc<dyn FeatureLocator>,
    scheduler: RoundRobin,
    radius: i32,
    next_id: TaskId,
    job_tx: Option<Sender<DiscoveryTask>>,
    msg_rx: Receiver<WorkerMessage>,
    workers: Vec<JoinHandle<()>>,
    live_workers: usize,
    abort: Arc<AtomicBool>,
    accepting: bool,
    in_flight: BTreeSet<TaskId>,
    results: BTreeMap<TaskId, TaskResult>,
}

impl DiscoveryCoordinator {
    pub fn new(locator: Arc<dyn FeatureLocator>, params: &DiscoveryParams) -> Self {
        let (job_tx, job_rx) = unbounded::<DiscoveryTask>();
        let (msg_tx, msg_rx) = unbounded::<WorkerMessage>();
        let abort = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(params.worker_count);
        for i in 0..params.worker_count {
            let job_rx = job_rx.clone();
            let msg_tx = msg_tx.clone();
            let locator = Arc::clone(&locator);
            let abort = Arc::clone(&abort);
            let spawned = std::thread::Builder::new()
                .name(format!("waymark-discovery-{i}"))
                .spawn(move || {
                    while let Ok(task) = job_rx.recv() {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }
                        if msg_tx.send(run_task(&*locator, task)).is_err() {
                            break;
                        }
                    }
                    let _ = msg_tx.send(WorkerMessage::Exited);
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    warn!("{}", DiscoveryError::WorkerPoolUnavailable(e.to_string()));
                    break;
                }
            }
        }

        let live_workers = workers.len();
        let job_tx = if live_workers > 0 {
            Some(job_tx)
        } else {
            if params.worker_count > 0 {
                warn!("no discovery workers started; running searches synchronously");
            } else {
                debug!("discovery pool size 0; running searches synchronously");
            }
            None
        };

        Self {
            locator,
            scheduler: RoundRobin::new(params.target_filters.clone()),
            radius: params.search_radius,
            next_id: 0,
            job_tx,
            msg_rx,
            workers,
            live_workers,
            abort,
            accepting: true,
            in_flight: BTreeSet::new(),
            results: BTreeMap::new(),
        }
    }

    /// Whether tasks run on the caller's thread.
    pub fn is_synchronous(&self) -> bool {
        self.job_tx.is_none()
    }

    /// Submit a search at `center` for the next filter in rotation. Returns
    /// `None` if no filters are configured or the coordinator is shut down.
    pub fn submit(&mut self, center: Point2) -> Option<TaskId> {
        if !self.accepting {
            return None;
        }
        let filter = self.scheduler.next()?;
        self.submit_with_filter(center, &filter)
    }

    /// Submit a search for a specific filter, bypassing the rotation.
    pub fn submit_with_filter(&mut self, center: Point2, filter: &str) -> Option<TaskId> {
        if !self.accepting {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        let task = DiscoveryTask {
            id,
            center,
            radius: self.radius,
            filter: filter.to_string(),
        };
        self.in_flight.insert(id);

        let task = match &self.job_tx {
            Some(tx) => match tx.send(task) {
                Ok(()) => return Some(id),
                Err(failed) => failed.into_inner(),
            },
            None => task,
        };
        if self.job_tx.take().is_some() {
            let err = DiscoveryError::WorkerPoolUnavailable("job channel closed".into());
            warn!("{err}; running searches synchronously");
        }
        let msg = run_task(&*self.locator, task);
        self.handle(msg);
        Some(id)
    }

    fn handle(&mut self, msg: WorkerMessage) -> bool {
        match msg {
            WorkerMessage::Done(result) => {
                self.in_flight.remove(&result.id);
                self.results.insert(result.id, result);
                true
            }
            WorkerMessage::Dropped(id) => {
                self.in_flight.remove(&id);
                false
            }
            WorkerMessage::Exited => {
                self.live_workers = self.live_workers.saturating_sub(1);
                false
            }
        }
    }

    /// Move every message the workers have sent so far into the result
    /// table. Returns how many new results arrived.
    pub fn poll(&mut self) -> usize {
        let mut arrived = 0;
        while let Ok(msg) = self.msg_rx.try_recv() {
            if self.handle(msg) {
                arrived += 1;
            }
        }
        arrived
    }

    /// Remove and return the result of task `id`, if it has finished.
    pub fn take_result(&mut self, id: TaskId) -> Option<TaskResult> {
        self.poll();
        self.results.remove(&id)
    }

    /// Remove and return every finished result, in task order.
    pub fn take_completed(&mut self) -> Vec<TaskResult> {
        self.poll();
        std::mem::take(&mut self.results).into_values().collect()
    }

    /// Tasks submitted but not yet finished or dropped.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Block until every submitted task has finished or been dropped, or
    /// until `timeout` passes. Returns true if nothing is left in flight.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        self.poll();
        let deadline = Instant::now() + timeout;
        while !self.in_flight.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.msg_rx.recv_timeout(remaining) {
                Ok(msg) => {
                    self.handle(msg);
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        self.in_flight.is_empty()
    }

    /// Stop accepting tasks and wait up to `timeout` for the workers to
    /// drain the queue and exit. Results that arrive meanwhile stay
    /// available. Returns true if every worker exited in time; otherwise the
    /// stragglers are told to abort and detached.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        self.accepting = false;
        self.job_tx = None;
        let deadline = Instant::now() + timeout;
        while self.live_workers > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.msg_rx.recv_timeout(remaining) {
                Ok(msg) => {
                    self.handle(msg);
                }
                Err(_) => break,
            }
        }
        if self.live_workers > 0 {
            warn!(
                "{} discovery workers still busy after {:?}; detaching",
                self.live_workers, timeout
            );
            self.abort.store(true, Ordering::Relaxed);
            self.workers.clear();
            return false;
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        true
    }
}

impl Drop for DiscoveryCoordinator {
    fn drop(&mut self) {
        // Never block on drop: close the queue, flag the workers, detach.
        self.job_tx = None;
        self.abort.store(true, Ordering::Relaxed);
    }
}

/// `count` search centers scattered around `origin`: evenly spaced angles
/// with up to half a sector of jitter, at 50-100% of `radius`.
pub fn scatter_search_centers(
    origin: Point2,
    radius: i32,
    count: usize,
    rng: &mut PlanRng,
) -> Vec<Point2> {
    if count == 0 {
        return Vec::new();
    }
    let sector = std::f64::consts::TAU / count as f64;
    (0..count)
        .map(|i| {
            let angle = sector * i as f64 + rng.range_f64(-0.5, 0.5) * sector;
            let dist = radius.max(0) as f64 * rng.range_f64(0.5, 1.0);
            Point2::new(
                origin.x + (angle.cos() * dist).round() as i32,
                origin.z + (angle.sin() * dist).round() as i32,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Finds a feature 10 blocks east of every center; records filter order.
    struct EastLocator {
        seen: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl EastLocator {
        fn new() -> Arc<Self> {
            Self::with_delay(Duration::ZERO)
        }

        fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                delay,
            })
        }
    }

    impl FeatureLocator for EastLocator {
        fn locate_nearest(
            &self,
            filter: &str,
            center: Point2,
            _radius: i32,
        ) -> Result<Option<Point2>, DiscoveryError> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.seen.lock().push(filter.to_string());
            match filter {
                "bogus" => Err(DiscoveryError::InvalidTargetFilter(filter.into())),
                "nothing" => Ok(None),
                "boom" => panic!("locator failure near {center}"),
                _ => Ok(Some(center.offset(10, 0))),
            }
        }
    }

    fn params(workers: usize, filters: &[&str]) -> DiscoveryParams {
        DiscoveryParams {
            worker_count: workers,
            target_filters: filters.iter().map(|f| f.to_string()).collect(),
            ..DiscoveryParams::default()
        }
    }

    #[test]
    fn round_robin_cycles() {
        let mut rr = RoundRobin::new(vec!["a".into(), "b".into(), "c".into()]);
        let got: Vec<String> = rr.by_ref().take(7).collect();
        assert_eq!(got, ["a", "b", "c", "a", "b", "c", "a"]);
        assert!(RoundRobin::new(Vec::new()).next().is_none());
    }

    #[test]
    fn two_filters_ten_tasks_five_each_in_order() {
        let locator = EastLocator::new();
        let mut coord = DiscoveryCoordinator::new(locator.clone(), &params(0, &["village", "temple"]));
        for i in 0..10 {
            coord.submit(Point2::new(i * 100, 0)).unwrap();
        }
        let seen = locator.seen.lock().clone();
        assert_eq!(seen.len(), 10);
        assert_eq!(seen.iter().filter(|f| *f == "village").count(), 5);
        assert_eq!(seen.iter().filter(|f| *f == "temple").count(), 5);
        for (i, f) in seen.iter().enumerate() {
            assert_eq!(f, if i % 2 == 0 { "village" } else { "temple" });
        }
    }

    #[test]
    fn synchronous_fallback_completes_immediately() {
        let mut coord = DiscoveryCoordinator::new(EastLocator::new(), &params(0, &["village"]));
        assert!(coord.is_synchronous());
        let id = coord.submit(Point2::new(5, 5)).unwrap();
        assert_eq!(coord.pending(), 0);
        let result = coord.take_result(id).unwrap();
        assert_eq!(result.position, Some(Point2::new(15, 5)));
        assert_eq!(result.label, "village");
        assert!(result.completed);
        assert!(coord.take_result(id).is_none(), "results are removed on take");
    }

    #[test]
    fn worker_pool_collects_every_result() {
        let mut coord = DiscoveryCoordinator::new(EastLocator::new(), &params(3, &["village"]));
        assert!(!coord.is_synchronous());
        let ids: Vec<TaskId> = (0..20)
            .map(|i| coord.submit(Point2::new(i, -i)).unwrap())
            .collect();
        assert!(coord.wait_idle(Duration::from_secs(5)));
        for (i, id) in ids.into_iter().enumerate() {
            let r = coord.take_result(id).unwrap();
            assert_eq!(r.center, Point2::new(i as i32, -(i as i32)));
            assert_eq!(r.position, Some(Point2::new(i as i32 + 10, -(i as i32))));
        }
        assert!(coord.shutdown(Duration::from_secs(5)));
    }

    #[test]
    fn invalid_filter_is_dropped() {
        let mut coord = DiscoveryCoordinator::new(EastLocator::new(), &params(2, &["village"]));
        let bad = coord.submit_with_filter(Point2::new(0, 0), "bogus").unwrap();
        let empty = coord.submit_with_filter(Point2::new(0, 0), "nothing").unwrap();
        assert!(coord.wait_idle(Duration::from_secs(5)));
        assert!(coord.take_result(bad).is_none());
        let empty = coord.take_result(empty).unwrap();
        assert!(empty.completed);
        assert_eq!(empty.position, None);
    }

    #[test]
    fn panicking_locator_does_not_kill_the_worker() {
        for workers in [0, 1] {
            let mut coord =
                DiscoveryCoordinator::new(EastLocator::new(), &params(workers, &["village"]));
            let first = coord.submit_with_filter(Point2::new(0, 0), "boom").unwrap();
            let second = coord.submit_with_filter(Point2::new(5, 0), "boom").unwrap();
            let after = coord.submit(Point2::new(9, 9)).unwrap();
            assert!(coord.wait_idle(Duration::from_millis(500)), "{workers} workers");
            assert_eq!(coord.pending(), 0);
            for id in [first, second] {
                let failed = coord.take_result(id).unwrap();
                assert!(!failed.completed);
                assert_eq!(failed.position, None);
                assert_eq!(failed.label, "boom");
            }
            // The same worker goes on to serve the next task.
            let ok = coord.take_result(after).unwrap();
            assert_eq!(ok.position, Some(Point2::new(19, 9)));
            assert!(coord.shutdown(Duration::from_secs(5)));
        }
    }

    #[test]
    fn shutdown_stops_accepting() {
        let mut coord = DiscoveryCoordinator::new(EastLocator::new(), &params(2, &["village"]));
        let id = coord.submit(Point2::new(1, 1)).unwrap();
        assert!(coord.shutdown(Duration::from_secs(5)));
        assert!(coord.submit(Point2::new(2, 2)).is_none());
        // Work queued before shutdown still lands.
        assert!(coord.take_result(id).is_some());
    }

    #[test]
    fn shutdown_times_out_on_slow_workers() {
        let locator = EastLocator::with_delay(Duration::from_millis(300));
        let mut coord = DiscoveryCoordinator::new(locator, &params(1, &["village"]));
        for i in 0..3 {
            coord.submit(Point2::new(i, 0));
        }
        assert!(!coord.shutdown(Duration::from_millis(20)));
    }

    #[test]
    fn take_completed_returns_task_order() {
        let mut coord = DiscoveryCoordinator::new(EastLocator::new(), &params(0, &["a", "b"]));
        for i in 0..4 {
            coord.submit(Point2::new(i, 0));
        }
        let all = coord.take_completed();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(coord.take_completed().len(), 0);
    }

    #[test]
    fn scatter_is_deterministic_and_in_range() {
        let origin = Point2::new(1000, -500);
        let a = scatter_search_centers(origin, 800, 12, &mut PlanRng::new(3));
        let b = scatter_search_centers(origin, 800, 12, &mut PlanRng::new(3));
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        for c in &a {
            let d = c.distance(origin);
            assert!((399.0..=801.0).contains(&d), "{c} at {d}");
        }
        assert!(scatter_search_centers(origin, 800, 0, &mut PlanRng::new(3)).is_empty());
    }
}
