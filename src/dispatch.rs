//! Bounded fan-out driver shared by the channel crawl and the DNS batch.
//!
//! Every unit runs on its own tokio task while holding a [`GatePermit`];
//! completions are reported as they arrive, keyed by the unit's own key.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use log::debug;
use thiserror::Error;
use tokio::time::{Duration, sleep};

use crate::gate::{ConcurrencyGate, GateClosed, GatePermit};

/// Anything that can be dispatched must name itself, so results stay
/// attributable regardless of completion order.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for String {
    fn key(&self) -> &str {
        self
    }
}

/// How new units are admitted once the ceiling is reached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Admission {
    /// Start the next unit the instant a slot frees.
    #[default]
    SlidingWindow,
    /// Run fixed groups of `ceiling` units, waiting for the whole group and
    /// then sleeping `pause` before starting the next one.
    Batched { pause: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Gate(#[from] GateClosed),
    #[error("task panicked: {0}")]
    Panicked(String),
}

#[derive(Debug)]
pub struct Completion<R> {
    pub key: String,
    pub outcome: Result<R, DispatchError>,
}

/// Drive `work` over `items` with at most `gate.capacity()` units in flight,
/// calling `on_done` once per item. Items that cannot be admitted because the
/// gate was closed complete with [`DispatchError::Gate`] without running.
/// Returns the number of completions.
pub async fn dispatch<T, R, F, Fut, C>(
    items: Vec<T>,
    gate: &ConcurrencyGate,
    admission: Admission,
    work: F,
    on_done: C,
) -> usize
where
    T: Keyed + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    C: FnMut(Completion<R>),
{
    let work = Arc::new(work);
    match admission {
        Admission::SlidingWindow => sliding_window(items, gate, work, on_done).await,
        Admission::Batched { pause } => batched(items, gate, pause, work, on_done).await,
    }
}

async fn sliding_window<T, R, F, Fut, C>(
    items: Vec<T>,
    gate: &ConcurrencyGate,
    work: Arc<F>,
    mut on_done: C,
) -> usize
where
    T: Keyed + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    C: FnMut(Completion<R>),
{
    let mut pending = items.into_iter();
    let mut next = pending.next();
    let mut running = FuturesUnordered::new();
    let mut completed = 0;

    loop {
        tokio::select! {
            biased;

            Some(done) = running.next(), if !running.is_empty() => {
                completed += 1;
                on_done(done);
            }
            permit = gate.acquire(), if next.is_some() => {
                let Some(item) = next.take() else { continue };
                next = pending.next();
                match permit {
                    Ok(permit) => running.push(spawn_unit(item, permit, &work)),
                    Err(closed) => {
                        completed += 1;
                        on_done(Completion {
                            key: item.key().to_string(),
                            outcome: Err(closed.into()),
                        });
                    }
                }
            }
            else => break,
        }
    }

    completed
}

async fn batched<T, R, F, Fut, C>(
    items: Vec<T>,
    gate: &ConcurrencyGate,
    pause: Duration,
    work: Arc<F>,
    mut on_done: C,
) -> usize
where
    T: Keyed + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    C: FnMut(Completion<R>),
{
    let size = gate.capacity();
    let total_batches = items.len().div_ceil(size);
    let mut pending = items.into_iter().peekable();
    let mut batch_no = 0;
    let mut completed = 0;

    while pending.peek().is_some() {
        batch_no += 1;
        debug!("Processing batch {}/{}", batch_no, total_batches);

        let mut running = FuturesUnordered::new();
        for item in pending.by_ref().take(size) {
            // a batch never exceeds capacity, so this only fails once closed
            match gate.acquire().await {
                Ok(permit) => running.push(spawn_unit(item, permit, &work)),
                Err(closed) => {
                    completed += 1;
                    on_done(Completion {
                        key: item.key().to_string(),
                        outcome: Err(closed.into()),
                    });
                }
            }
        }

        while let Some(done) = running.next().await {
            completed += 1;
            on_done(done);
        }

        if pending.peek().is_some() && !pause.is_zero() {
            sleep(pause).await;
        }
    }

    completed
}

fn spawn_unit<T, R, F, Fut>(
    item: T,
    permit: GatePermit,
    work: &Arc<F>,
) -> impl Future<Output = Completion<R>> + use<T, R, F, Fut>
where
    T: Keyed + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let key = item.key().to_string();
    let work = Arc::clone(work);
    let handle = tokio::spawn(async move {
        let output = work(item).await;
        permit.release();
        output
    });

    async move {
        let outcome = handle
            .await
            .map_err(|e| DispatchError::Panicked(e.to_string()));
        Completion { key, outcome }
    }
}
