//! Counting admission gate bounding how many units of work run at once.
//!
//! Backed by a fair [`tokio::sync::Semaphore`]: waiters are served strictly in
//! arrival order and a released permit is handed to the oldest waiter before
//! anyone else can observe it. There is no timeout, so a holder that never
//! finishes keeps its slot forever. [`ConcurrencyGate::close`] stops further
//! admissions; grants already handed out run to completion.

use std::future::Future;
use std::sync::Arc;

use log::warn;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("concurrency gate was closed")]
pub struct GateClosed;

#[derive(Clone, Debug)]
pub struct ConcurrencyGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// Grant returned by [`ConcurrencyGate::acquire`]. Dropping it (on any path,
/// including unwinding) returns the permit to the gate exactly once.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    pub fn release(self) {}
}

impl ConcurrencyGate {
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Grants currently held; `available() + outstanding() == capacity()`.
    pub fn outstanding(&self) -> usize {
        self.capacity - self.available()
    }

    /// Refuse every pending and future `acquire`. Shared by all clones.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;
        Ok(GatePermit { _permit: permit })
    }

    /// Run `work` while holding a permit.
    pub async fn run<F>(&self, work: F) -> Result<F::Output, GateClosed>
    where
        F: Future,
    {
        let permit = self.acquire().await?;
        let output = work.await;
        permit.release();
        Ok(output)
    }
}

/// Close `gate` on the first Ctrl-C: nothing new is admitted and units
/// already running finish normally.
pub fn close_on_ctrl_c(gate: ConcurrencyGate) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for running work to finish");
            gate.close();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Duration, sleep};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_capacity() {
        for capacity in [1usize, 2, 3, 7] {
            let gate = ConcurrencyGate::new(capacity);
            let active = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let mut handles = Vec::new();
            for _ in 0..(capacity * 4 + 3) {
                let gate = gate.clone();
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                handles.push(tokio::spawn(async move {
                    let _permit = gate.acquire().await.unwrap();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            assert!(peak.load(Ordering::SeqCst) <= capacity);
            assert_eq!(gate.available(), capacity);
            assert_eq!(gate.outstanding(), 0);
        }
    }

    #[tokio::test]
    async fn waiters_resume_in_arrival_order() {
        let gate = ConcurrencyGate::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let held = gate.acquire().await.unwrap();

        let mut handles = Vec::new();
        for id in 1..=3 {
            let gate = gate.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let permit = gate.acquire().await.unwrap();
                order.lock().unwrap().push(id);
                sleep(Duration::from_millis(2)).await;
                permit.release();
            }));
            // let the task park on the gate before the next one arrives
            sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(gate.outstanding(), 1);
        held.release();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn closing_wakes_waiters_but_keeps_held_grants() {
        let gate = ConcurrencyGate::new(1);
        let held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        sleep(Duration::from_millis(5)).await;

        gate.close();
        assert!(gate.is_closed());
        assert_eq!(waiter.await.unwrap(), Err(GateClosed));
        assert_eq!(gate.acquire().await.err(), Some(GateClosed));
        assert_eq!(gate.outstanding(), 1);
        held.release();
    }

    #[tokio::test]
    async fn zero_capacity_is_raised_to_one() {
        let gate = ConcurrencyGate::new(0);
        assert_eq!(gate.capacity(), 1);
        let value = gate.run(async { 41 + 1 }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(gate.available(), 1);
    }
}
