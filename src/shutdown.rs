// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Shutdown Coordination
//!
//! The `ShutdownCoordinator` is the single owner of the process-wide stop
//! signals. It is built once at startup and shared by the binding monitor,
//! every worker pool and the HTTP server. On termination it runs, in order:
//!
//! 1. stop the binding monitor and wait for its last tick to finish
//! 2. cancel the broker consumer of every bound queue
//! 3. wait for every worker of every pool to drain its stream
//! 4. close the broker channel and connection
//! 5. release dependent listeners (the HTTP server)
//!
//! A failing step is logged and the sequence moves on. Step 3 has no
//! timeout: a worker exits only after settling the delivery it holds.
//!
//! A queue stays in the bound table while at least one worker of its pool
//! holds a `WorkerLease`, so a stream that ended on the broker side (remote
//! cancel, lost channel) drops out without waiting for shutdown.

use crate::{broker::Broker, errors::AmqpError, tag::ConsumerTag};
use std::{
    collections::BTreeMap,
    pin::pin,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex as SyncMutex, MutexGuard, PoisonError,
    },
};
use tokio::{
    sync::{Mutex, Notify},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Countdown of live workers across every bound queue.
#[derive(Debug, Default)]
pub struct DrainCounter {
    outstanding: AtomicUsize,
    drained: Notify,
}

impl DrainCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(DrainCounter::default())
    }

    /// Counts one more worker. The count goes back down when the guard drops.
    pub fn acquire(self: &Arc<Self>) -> DrainGuard {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        DrainGuard {
            counter: self.clone(),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Resolves once every guard handed out so far has been dropped.
    pub async fn wait(&self) {
        loop {
            let mut notified = pin!(self.drained.notified());
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }

            notified.await;
        }
    }

    fn release(&self) {
        let previous = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        if previous == Ok(1) {
            self.drained.notify_waiters();
        }
    }
}

/// Held by a worker for the lifetime of its loop.
#[derive(Debug)]
pub struct DrainGuard {
    counter: Arc<DrainCounter>,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.counter.release();
    }
}

type BoundTable = Arc<SyncMutex<BTreeMap<String, ConsumerTag>>>;

fn lock(table: &BoundTable) -> MutexGuard<'_, BTreeMap<String, ConsumerTag>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared by the workers of one pool. The last one dropped unbinds the queue.
#[derive(Debug)]
struct PoolBinding {
    bound: BoundTable,
    queue: String,
    tag: ConsumerTag,
}

impl Drop for PoolBinding {
    fn drop(&mut self) {
        let mut bound = lock(&self.bound);
        if bound.get(&self.queue) == Some(&self.tag) {
            bound.remove(&self.queue);
            debug!(queue = %self.queue, consumer_tag = %self.tag, "consumer unbound");
        }
    }
}

/// What a worker holds for the lifetime of its loop: its share of the pool
/// binding and one count in the drain counter.
#[derive(Debug)]
pub struct WorkerLease {
    _binding: Arc<PoolBinding>,
    _drain: DrainGuard,
}

pub struct ShutdownCoordinator {
    broker: Arc<dyn Broker>,
    stop_binding: CancellationToken,
    released: CancellationToken,
    bound: BoundTable,
    monitor: Mutex<Option<JoinHandle<()>>>,
    drain: Arc<DrainCounter>,
    started: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(broker: Arc<dyn Broker>) -> Arc<Self> {
        Arc::new(ShutdownCoordinator {
            broker,
            stop_binding: CancellationToken::new(),
            released: CancellationToken::new(),
            bound: BoundTable::default(),
            monitor: Mutex::new(None),
            drain: DrainCounter::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Cancelled when the binding monitor must stop ticking.
    pub fn binding_token(&self) -> CancellationToken {
        self.stop_binding.clone()
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_binding.is_cancelled()
    }

    /// Records `tag` as the consumer bound on `queue` and returns one lease
    /// per worker. The queue is unbound when the last lease is dropped.
    ///
    /// # Errors
    /// `ShuttingDownError` once the shutdown sequence has started: the
    /// caller owns the broker consumer and must cancel it.
    pub fn register_consumer(
        &self,
        queue: &str,
        tag: &ConsumerTag,
        workers: usize,
    ) -> Result<Vec<WorkerLease>, AmqpError> {
        let mut bound = lock(&self.bound);

        if self.is_stopping() {
            return Err(AmqpError::ShuttingDownError(queue.to_owned()));
        }

        bound.insert(queue.to_owned(), tag.clone());
        let binding = Arc::new(PoolBinding {
            bound: self.bound.clone(),
            queue: queue.to_owned(),
            tag: tag.clone(),
        });

        Ok((0..workers)
            .map(|_| WorkerLease {
                _binding: binding.clone(),
                _drain: self.drain.acquire(),
            })
            .collect())
    }

    /// Hands over the binding monitor task so shutdown can await its last tick.
    pub async fn supervise_monitor(&self, handle: JoinHandle<()>) {
        let previous = self.monitor.lock().await.replace(handle);
        if let Some(previous) = previous {
            warn!("replacing a supervised binding monitor");
            previous.abort();
        }
    }

    /// Runs the shutdown sequence. Concurrent or repeated calls wait for the
    /// first one to complete.
    pub async fn shutdown(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            self.released.cancelled().await;
            return;
        }

        info!("stopping consumer binding");
        self.stop_binding.cancel();

        let monitor = self.monitor.lock().await.take();
        if let Some(handle) = monitor {
            if let Err(err) = handle.await {
                error!(error = err.to_string(), "binding monitor ended abnormally");
            }
        }

        let bound = lock(&self.bound).clone();
        for (queue, tag) in &bound {
            debug!(queue, consumer_tag = %tag, "cancelling consumer");

            if let Err(err) = self.broker.cancel(tag.as_str()).await {
                error!(
                    error = err.to_string(),
                    queue,
                    consumer_tag = %tag,
                    "failure to cancel consumer"
                );
            }
        }

        info!(
            workers = self.drain.outstanding(),
            queues = bound.len(),
            "waiting for workers to drain"
        );
        self.drain.wait().await;

        if let Err(err) = self.broker.close().await {
            error!(error = err.to_string(), "failure to close broker connection");
        }

        self.released.cancel();
        info!("broker shutdown complete");
    }

    /// Resolves once the broker side has shut down.
    pub async fn released(&self) {
        self.released.cancelled().await
    }

    pub fn released_token(&self) -> CancellationToken {
        self.released.clone()
    }

    #[cfg(test)]
    pub(crate) fn is_released(&self) -> bool {
        self.released.is_cancelled()
    }

    /// Queues with at least one live worker.
    pub fn bound_queues(&self) -> Vec<String> {
        lock(&self.bound).keys().cloned().collect()
    }

    /// Number of workers that have not exited yet.
    pub fn outstanding(&self) -> usize {
        self.drain.outstanding()
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C elsewhere).
pub async fn termination_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received Ctrl+C");
    }

    Ok(())
}
