// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Registry
//!
//! The registry is the static table of queue bindings built once at startup:
//! which queue, which handler, and whether a failed delivery is requeued.
//! It is immutable once handed to the binding monitor.

use crate::{errors::AmqpError, message::Delivery};
use async_trait::async_trait;
use std::{fmt, sync::Arc};

/// Per-delivery context handed to a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerContext {
    pub queue: String,
    pub correlation_id: String,
}

/// Application-level processing of one delivery. `true` acknowledges it,
/// `false` negatively acknowledges it.
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn exec(&self, ctx: &HandlerContext, delivery: &Delivery) -> bool;
}

/// Binding of a queue to its handler.
#[derive(Clone)]
pub struct ConsumerSpec {
    pub(crate) queue: String,
    pub(crate) handler: Arc<dyn ConsumerHandler>,
    pub(crate) requeue_on_failure: bool,
    pub(crate) concurrency: Option<usize>,
}

impl ConsumerSpec {
    /// Failed deliveries are dropped unless `requeue_on_failure` is set.
    pub fn new(queue: &str, handler: Arc<dyn ConsumerHandler>) -> Self {
        ConsumerSpec {
            queue: queue.to_owned(),
            handler,
            requeue_on_failure: false,
            concurrency: None,
        }
    }

    pub fn requeue_on_failure(mut self, requeue: bool) -> Self {
        self.requeue_on_failure = requeue;
        self
    }

    /// Overrides the process-wide worker count for this queue.
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = Some(workers.max(1));
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Worker count for this queue given the process default.
    pub fn effective_concurrency(&self, default: usize) -> usize {
        self.concurrency.unwrap_or(default).max(1)
    }
}

impl fmt::Debug for ConsumerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerSpec")
            .field("queue", &self.queue)
            .field("requeue_on_failure", &self.requeue_on_failure)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsumerRegistry {
    specs: Vec<Arc<ConsumerSpec>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        ConsumerRegistry::default()
    }

    /// Adds a binding. A queue can be registered only once.
    pub fn register(&mut self, spec: ConsumerSpec) -> Result<(), AmqpError> {
        if self.get(&spec.queue).is_some() {
            return Err(AmqpError::DuplicateConsumerError(spec.queue));
        }

        self.specs.push(Arc::new(spec));
        Ok(())
    }

    pub fn get(&self, queue: &str) -> Option<&Arc<ConsumerSpec>> {
        self.specs.iter().find(|spec| spec.queue == queue)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ConsumerSpec>> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedHandler;

    #[test]
    fn queue_registered_once() {
        let mut registry = ConsumerRegistry::new();
        let handler = ScriptedHandler::always(true);

        registry
            .register(ConsumerSpec::new("payment_proccess", handler.clone()))
            .unwrap();

        assert_eq!(
            registry.register(ConsumerSpec::new("payment_proccess", handler)),
            Err(AmqpError::DuplicateConsumerError("payment_proccess".to_owned()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrency_falls_back_to_default() {
        let handler = ScriptedHandler::always(true);
        let spec = ConsumerSpec::new("a", handler.clone()).requeue_on_failure(true);

        assert!(spec.requeue_on_failure);
        assert_eq!(spec.effective_concurrency(3), 3);
        assert_eq!(spec.effective_concurrency(0), 1);
        assert_eq!(ConsumerSpec::new("b", handler).concurrency(5).effective_concurrency(3), 5);
    }
}
