//! Delivery deduplication.
//!
//! The provider retries deliveries it considers failed, and a retry can race
//! the original. [`DedupCoordinator::run_once`] makes concurrent calls for the
//! same delivery id share one execution, and remembers successfully executed
//! ids until a sweep forgets them.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// This call started the work.
    Executed,
    /// The work was started by a concurrent call with the same id; this call shared its result.
    Coalesced,
    /// The id was executed earlier and has not been forgotten yet.
    Skipped,
}

/// The work for a delivery ended without producing a result (it panicked or
/// the runtime shut down under it).
#[derive(Debug, Error)]
#[error("work for delivery {delivery_id} was aborted")]
pub struct WorkAborted {
    pub delivery_id: String,
}

type SharedResult<E> = Result<(), Arc<E>>;

struct InFlight<E> {
    generation: u64,
    result: watch::Receiver<Option<SharedResult<E>>>,
}

struct DedupState<E> {
    in_flight: HashMap<String, InFlight<E>>,
    executed: HashMap<String, Instant>,
    next_generation: u64,
}

pub struct DedupCoordinator<E> {
    state: Arc<Mutex<DedupState<E>>>,
}

impl<E> Clone for DedupCoordinator<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<E> Default for DedupCoordinator<E> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(DedupState {
                in_flight: HashMap::new(),
                executed: HashMap::new(),
                next_generation: 0,
            })),
        }
    }
}

impl<E> DedupCoordinator<E>
where
    E: From<WorkAborted> + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` unless `delivery_id` was already executed or is executing.
    ///
    /// The work runs on its own task, so it completes even when the calling
    /// future is dropped. Callers arriving while it is in flight wait for it
    /// and receive the same result. Only a successful run marks the id as
    /// executed, so a failed delivery can be retried.
    pub async fn run_once<F, Fut>(
        &self,
        delivery_id: &str,
        work: F,
    ) -> Result<RunOutcome, Arc<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let (mut result, started) = {
            let mut state = self.lock();
            if state.executed.contains_key(delivery_id) {
                return Ok(RunOutcome::Skipped);
            }
            match state.in_flight.get(delivery_id) {
                Some(flight) => (flight.result.clone(), None),
                None => {
                    state.next_generation += 1;
                    let generation = state.next_generation;
                    let (done_tx, done_rx) = watch::channel(None);
                    state.in_flight.insert(
                        delivery_id.to_string(),
                        InFlight {
                            generation,
                            result: done_rx.clone(),
                        },
                    );
                    (done_rx, Some((generation, done_tx)))
                }
            }
        };

        let outcome = match started {
            Some((generation, done_tx)) => {
                self.spawn_work(delivery_id.to_string(), generation, work(), done_tx);
                RunOutcome::Executed
            }
            None => RunOutcome::Coalesced,
        };

        let shared = match result.wait_for(Option::is_some).await {
            Ok(done) => done.clone(),
            Err(_) => None,
        };
        match shared {
            Some(Ok(())) => Ok(outcome),
            Some(Err(err)) => Err(err),
            None => Err(Arc::new(E::from(WorkAborted {
                delivery_id: delivery_id.to_string(),
            }))),
        }
    }

    fn spawn_work<Fut>(
        &self,
        delivery_id: String,
        generation: u64,
        work: Fut,
        done_tx: watch::Sender<Option<SharedResult<E>>>,
    ) where
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let result = match tokio::spawn(work).await {
                Ok(result) => result.map_err(Arc::new),
                Err(err) => {
                    error!(delivery_id = %delivery_id, "delivery work failed: {}", err);
                    Err(Arc::new(E::from(WorkAborted {
                        delivery_id: delivery_id.clone(),
                    })))
                }
            };
            coordinator.finish(&delivery_id, generation, result.is_ok());
            done_tx.send_replace(Some(result));
        });
    }

    /// Records a successful id and clears the in-flight entry in one step, so
    /// a caller arriving after waiters are released is skipped rather than
    /// starting a second run.
    fn finish(&self, delivery_id: &str, generation: u64, succeeded: bool) {
        let mut state = self.lock();
        if succeeded {
            state
                .executed
                .insert(delivery_id.to_string(), Instant::now());
        }
        let current = state
            .in_flight
            .get(delivery_id)
            .is_some_and(|flight| flight.generation == generation);
        if current {
            state.in_flight.remove(delivery_id);
        }
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn is_executed(&self, delivery_id: &str) -> bool {
        self.lock().executed.contains_key(delivery_id)
    }

    pub fn executed_len(&self) -> usize {
        self.lock().executed.len()
    }

    /// Forgets executed ids recorded more than `ttl` ago and returns how many
    /// were removed.
    pub fn expire_older_than(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let before = state.executed.len();
        state
            .executed
            .retain(|_, executed_at| now.saturating_duration_since(*executed_at) <= ttl);
        before - state.executed.len()
    }

    /// Starts a background task that calls [`expire_older_than`] every
    /// `interval`. A panicking sweep is logged and the task keeps running.
    ///
    /// The task stops when the returned handle is stopped or dropped.
    ///
    /// [`expire_older_than`]: Self::expire_older_than
    pub fn spawn_sweeper(&self, interval: Duration, ttl: Duration) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let coordinator = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => coordinator.sweep(ttl),
                }
            }
        });
        SweeperHandle { stop_tx, task }
    }

    fn sweep(&self, ttl: Duration) {
        match catch_unwind(AssertUnwindSafe(|| self.expire_older_than(ttl))) {
            Ok(0) => {}
            Ok(invalidated) => info!(
                invalidated,
                remaining = self.executed_len(),
                "forgot executed deliveries"
            ),
            Err(panic) => error!(
                panic = %panic_message(panic.as_ref()),
                "executed delivery sweep panicked"
            ),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DedupState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct SweeperHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(err) = self.task.await {
            error!("dedup sweeper task failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::task::JoinSet;

    #[derive(Debug, Error)]
    enum WorkError {
        #[error("relay unavailable")]
        Unavailable,
        #[error(transparent)]
        Aborted(#[from] WorkAborted),
    }

    #[tokio::test]
    async fn concurrent_duplicates_run_once() {
        let coordinator = DedupCoordinator::<WorkError>::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let mut calls = JoinSet::new();
        for _ in 0..5 {
            let coordinator = coordinator.clone();
            let runs = Arc::clone(&runs);
            calls.spawn(async move {
                coordinator
                    .run_once("delivery-1", || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(())
                    })
                    .await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = calls.join_next().await {
            outcomes.push(joined.expect("join").expect("run"));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|outcome| **outcome == RunOutcome::Executed)
                .count(),
            1
        );
        assert!(coordinator.is_executed("delivery-1"));
        assert_eq!(coordinator.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn executed_ids_are_skipped() {
        let coordinator = DedupCoordinator::<WorkError>::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let mut outcomes = Vec::new();
        for _ in 0..2 {
            let runs = Arc::clone(&runs);
            let outcome = coordinator
                .run_once("delivery-1", || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .expect("run");
            outcomes.push(outcome);
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes, vec![RunOutcome::Executed, RunOutcome::Skipped]);
    }

    #[tokio::test]
    async fn distinct_ids_run_independently() {
        let coordinator = DedupCoordinator::<WorkError>::new();
        for id in ["a", "b"] {
            let outcome = coordinator
                .run_once(id, || async { Ok(()) })
                .await
                .expect("run");
            assert_eq!(outcome, RunOutcome::Executed);
        }
        assert_eq!(coordinator.executed_len(), 2);
    }

    #[tokio::test]
    async fn failures_are_shared_and_not_recorded() {
        let coordinator = DedupCoordinator::<WorkError>::new();
        let err = coordinator
            .run_once("delivery-1", || async { Err(WorkError::Unavailable) })
            .await
            .expect_err("failure");
        assert_eq!(err.to_string(), "relay unavailable");
        assert!(!coordinator.is_executed("delivery-1"));

        let retry = coordinator
            .run_once("delivery-1", || async { Ok(()) })
            .await
            .expect("retry");
        assert_eq!(retry, RunOutcome::Executed);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_failure() {
        let coordinator = DedupCoordinator::<WorkError>::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let mut calls = JoinSet::new();
        for _ in 0..4 {
            let coordinator = coordinator.clone();
            let runs = Arc::clone(&runs);
            calls.spawn(async move {
                coordinator
                    .run_once("delivery-1", || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err(WorkError::Unavailable)
                    })
                    .await
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = calls.join_next().await {
            errors.push(joined.expect("join").expect_err("failure"));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().all(|err| Arc::ptr_eq(err, &errors[0])));
        assert!(matches!(*errors[0], WorkError::Unavailable));
        assert!(!coordinator.is_executed("delivery-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_caller_does_not_restart_work() {
        let coordinator = DedupCoordinator::<WorkError>::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let first = {
            let coordinator = coordinator.clone();
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                tokio::time::timeout(
                    Duration::from_secs(15),
                    coordinator.run_once("delivery-1", || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(20)).await;
                        Ok(())
                    }),
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        let second = {
            let coordinator = coordinator.clone();
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                coordinator
                    .run_once("delivery-1", || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            })
        };

        assert!(first.await.expect("join").is_err());
        let outcome = second.await.expect("join").expect("run");
        assert_eq!(outcome, RunOutcome::Coalesced);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(coordinator.is_executed("delivery-1"));
        assert_eq!(coordinator.in_flight_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_work_completes_and_clears_in_flight() {
        let coordinator = DedupCoordinator::<WorkError>::new();
        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            coordinator.run_once("delivery-1", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(coordinator.in_flight_len(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(coordinator.in_flight_len(), 0);
        assert!(coordinator.is_executed("delivery-1"));
    }

    #[tokio::test]
    async fn panicking_work_is_reported_as_aborted() {
        let coordinator = DedupCoordinator::<WorkError>::new();
        let err = coordinator
            .run_once("delivery-1", || async {
                let exploded = true;
                if exploded {
                    panic!("relay exploded");
                }
                Ok(())
            })
            .await
            .expect_err("aborted");

        assert!(matches!(&*err, WorkError::Aborted(aborted) if aborted.delivery_id == "delivery-1"));
        assert_eq!(coordinator.in_flight_len(), 0);
        assert!(!coordinator.is_executed("delivery-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn expire_removes_only_old_entries() {
        let coordinator = DedupCoordinator::<WorkError>::new();
        coordinator
            .run_once("old", || async { Ok(()) })
            .await
            .expect("old");
        tokio::time::advance(Duration::from_secs(90)).await;
        coordinator
            .run_once("new", || async { Ok(()) })
            .await
            .expect("new");
        tokio::time::advance(Duration::from_secs(60)).await;

        assert_eq!(coordinator.expire_older_than(Duration::from_secs(120)), 1);
        assert!(!coordinator.is_executed("old"));
        assert!(coordinator.is_executed("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_forgets_ids_after_ttl_and_one_interval() {
        let coordinator = DedupCoordinator::<WorkError>::new();
        let sweeper =
            coordinator.spawn_sweeper(Duration::from_secs(60), Duration::from_secs(120));
        coordinator
            .run_once("delivery-1", || async { Ok(()) })
            .await
            .expect("run");

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(coordinator.is_executed("delivery-1"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!coordinator.is_executed("delivery-1"));

        let outcome = coordinator
            .run_once("delivery-1", || async { Ok(()) })
            .await
            .expect("rerun");
        assert_eq!(outcome, RunOutcome::Executed);
        sweeper.stop().await;
    }
}
