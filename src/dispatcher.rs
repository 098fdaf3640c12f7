// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Worker Pool
//!
//! A `WorkerPool` is what binding a queue produces: one broker consumer
//! (tagged with the process consumer tag, prefetch = concurrency) whose
//! stream is shared by N workers. Workers steal work from the shared stream,
//! so the first idle worker takes the next delivery.
//!
//! A worker leaves its loop only when the stream ends, which happens after
//! the consumer is cancelled and every buffered delivery has been handed
//! out. Each worker holds a lease until it leaves, which is what the
//! shutdown sequence waits on.

use crate::{
    broker::{Broker, DeliveryStream},
    consumer::consume,
    errors::AmqpError,
    queue::QueueDefinition,
    registry::ConsumerSpec,
    shutdown::{ShutdownCoordinator, WorkerLease},
    tag::ConsumerTag,
};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, warn};

type SharedStream = Arc<Mutex<DeliveryStream>>;

/// The running consumer of one queue.
pub struct WorkerPool {
    tag: ConsumerTag,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Binds `spec`'s queue and starts `concurrency` workers on it.
    ///
    /// # Parameters
    /// * `broker` - Broker client shared by the process
    /// * `spec` - Queue binding holding the handler and requeue policy
    /// * `tag` - Consumer tag registered with the broker
    /// * `concurrency` - Number of workers, also used as prefetch count
    /// * `coordinator` - Receives the binding and hands out the worker leases
    ///
    /// # Returns
    /// The running pool, or the declare/consume error. When the shutdown
    /// sequence already started the broker consumer is cancelled again and
    /// `ShuttingDownError` is returned.
    pub async fn start(
        broker: Arc<dyn Broker>,
        spec: Arc<ConsumerSpec>,
        tag: ConsumerTag,
        concurrency: usize,
        coordinator: &ShutdownCoordinator,
    ) -> Result<WorkerPool, AmqpError> {
        let concurrency = concurrency.max(1);
        let prefetch = u16::try_from(concurrency).unwrap_or(u16::MAX);

        broker
            .declare_queue(&QueueDefinition::new(spec.queue()).durable())
            .await?;

        let stream = broker.consume(spec.queue(), tag.as_str(), prefetch).await?;

        let leases = match coordinator.register_consumer(spec.queue(), &tag, concurrency) {
            Ok(leases) => leases,
            Err(err) => {
                warn!(queue = spec.queue(), "binding refused, cancelling consumer");
                if let Err(cancel_err) = broker.cancel(tag.as_str()).await {
                    error!(
                        error = cancel_err.to_string(),
                        consumer_tag = %tag,
                        "failure to cancel consumer"
                    );
                }
                return Err(err);
            }
        };

        let stream: SharedStream = Arc::new(Mutex::new(stream));
        let workers = leases
            .into_iter()
            .enumerate()
            .map(|(worker, lease)| {
                tokio::spawn(run_worker(worker, spec.clone(), stream.clone(), lease))
            })
            .collect();

        info!(
            queue = spec.queue(),
            consumer_tag = %tag,
            concurrency,
            "consumer bound"
        );

        Ok(WorkerPool {
            tag,
            workers,
        })
    }

    pub fn tag(&self) -> &ConsumerTag {
        &self.tag
    }

    #[cfg(test)]
    fn size(&self) -> usize {
        self.workers.len()
    }

    /// Whether at least one worker is still in its loop.
    pub fn is_running(&self) -> bool {
        self.workers.iter().any(|worker| !worker.is_finished())
    }
}

async fn run_worker(
    worker: usize,
    spec: Arc<ConsumerSpec>,
    stream: SharedStream,
    _lease: WorkerLease,
) {
    debug!(queue = spec.queue(), worker, "worker started");

    loop {
        let next = stream.lock().await.next().await;

        match next {
            Some(Ok(delivery)) => {
                if let Err(err) = consume(&spec, delivery).await {
                    error!(
                        error = err.to_string(),
                        queue = spec.queue(),
                        "failure to settle message"
                    );
                }
            }
            Some(Err(err)) => {
                error!(
                    error = err.to_string(),
                    queue = spec.queue(),
                    "errors consume msg"
                );
            }
            None => break,
        }
    }

    debug!(queue = spec.queue(), worker, "worker drained");
}
