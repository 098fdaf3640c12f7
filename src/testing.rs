// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! In-memory broker and handlers shared by the unit tests.

use crate::{
    broker::{Broker, DeliveryStream},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    message::{Acknowledge, Delivery},
    queue::{QueueBinding, QueueDefinition},
    registry::{ConsumerHandler, HandlerContext},
};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::{mpsc, Semaphore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BrokerEvent {
    DeclareQueue(String),
    DeclareExchange(String),
    Bind {
        queue: String,
        exchange: String,
        routing_key: String,
    },
    Publish {
        routing_key: String,
        message_id: String,
    },
    Consume {
        queue: String,
        tag: String,
        prefetch: u16,
    },
    Cancel(String),
    Ack(String),
    Nack {
        message_id: String,
        requeue: bool,
    },
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Published {
    pub routing_key: String,
    pub message_id: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Message {
    message_id: String,
    data: Vec<u8>,
    redelivered: bool,
}

struct Subscription {
    queue: String,
    sender: mpsc::UnboundedSender<Result<Delivery, AmqpError>>,
}

#[derive(Default)]
struct Inner {
    events: Vec<BrokerEvent>,
    queues: HashMap<String, QueueDefinition>,
    exchanges: HashMap<String, ExchangeDefinition>,
    subscriptions: HashMap<String, Subscription>,
    pending: HashMap<String, VecDeque<Message>>,
    published: Vec<Published>,
    next_delivery_tag: u64,
    closed: bool,
    fail_publish: bool,
}

impl Inner {
    fn route(state: &Arc<Mutex<Inner>>, inner: &mut Inner, queue: &str, message: Message) {
        let sender = inner
            .subscriptions
            .values()
            .find(|s| s.queue == queue && !s.sender.is_closed())
            .map(|s| s.sender.clone());

        let Some(sender) = sender else {
            inner
                .pending
                .entry(queue.to_owned())
                .or_default()
                .push_back(message);
            return;
        };

        inner.next_delivery_tag += 1;
        let delivery = Delivery::new(
            inner.next_delivery_tag,
            Some(message.message_id.clone()),
            message.redelivered,
            message.data.clone(),
            Arc::new(InMemoryAcker {
                state: state.clone(),
                queue: queue.to_owned(),
                message: message.clone(),
            }),
        );

        if sender.send(Ok(delivery)).is_err() {
            inner
                .pending
                .entry(queue.to_owned())
                .or_default()
                .push_back(message);
        }
    }
}

/// Broker double with the AMQP behaviours the lifecycle relies on:
/// streams end after cancel once drained, nack with requeue redelivers,
/// identical declares are idempotent and mismatching ones fail.
#[derive(Clone, Default)]
pub(crate) struct InMemoryBroker {
    state: Arc<Mutex<Inner>>,
}

impl InMemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(InMemoryBroker::default())
    }

    /// Enqueues a message as if another process had published it.
    pub fn deliver(&self, queue: &str, message_id: &str, body: &str) {
        let mut inner = self.state.lock().unwrap();
        let message = Message {
            message_id: message_id.to_owned(),
            data: body.as_bytes().to_vec(),
            redelivered: false,
        };
        Inner::route(&self.state, &mut inner, queue, message);
    }

    pub fn events(&self) -> Vec<BrokerEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn queue(&self, name: &str) -> Option<QueueDefinition> {
        self.state.lock().unwrap().queues.get(name).cloned()
    }

    pub fn exchange(&self, name: &str) -> Option<ExchangeDefinition> {
        self.state.lock().unwrap().exchanges.get(name).cloned()
    }

    pub fn consumers(&self, queue: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|(_, s)| s.queue == queue)
            .map(|(tag, _)| tag.clone())
            .collect()
    }

    pub fn acks(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BrokerEvent::Ack(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn nacks(&self) -> Vec<(String, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BrokerEvent::Nack {
                    message_id,
                    requeue,
                } => Some((message_id, requeue)),
                _ => None,
            })
            .collect()
    }

    pub fn fail_publishing(&self) {
        self.state.lock().unwrap().fail_publish = true;
    }

    fn record(&self, event: BrokerEvent) {
        self.state.lock().unwrap().events.push(event);
    }

    fn ensure_open(&self) -> Result<(), AmqpError> {
        if self.state.lock().unwrap().closed {
            return Err(AmqpError::ConnectionClosedError);
        }
        Ok(())
    }
}

struct InMemoryAcker {
    state: Arc<Mutex<Inner>>,
    queue: String,
    message: Message,
}

#[async_trait]
impl Acknowledge for InMemoryAcker {
    async fn ack(&self) -> Result<(), AmqpError> {
        let mut inner = self.state.lock().unwrap();
        if inner.closed {
            return Err(AmqpError::AckMessageError);
        }
        inner
            .events
            .push(BrokerEvent::Ack(self.message.message_id.clone()));
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), AmqpError> {
        let mut inner = self.state.lock().unwrap();
        if inner.closed {
            return Err(AmqpError::NackMessageError);
        }
        inner.events.push(BrokerEvent::Nack {
            message_id: self.message.message_id.clone(),
            requeue,
        });

        if requeue {
            let mut message = self.message.clone();
            message.redelivered = true;
            Inner::route(&self.state, &mut inner, &self.queue, message);
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut inner = self.state.lock().unwrap();

        if let Some(existing) = inner.queues.get(&def.name) {
            if existing != def {
                return Err(AmqpError::DeclareQueueError(def.name.clone()));
            }
        }

        inner.queues.insert(def.name.clone(), def.clone());
        inner.events.push(BrokerEvent::DeclareQueue(def.name.clone()));
        Ok(())
    }

    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut inner = self.state.lock().unwrap();

        if let Some(existing) = inner.exchanges.get(&def.name) {
            if existing != def {
                return Err(AmqpError::DeclareExchangeError(def.name.clone()));
            }
        }

        inner.exchanges.insert(def.name.clone(), def.clone());
        inner
            .events
            .push(BrokerEvent::DeclareExchange(def.name.clone()));
        Ok(())
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut inner = self.state.lock().unwrap();

        if !inner.queues.contains_key(&binding.queue_name)
            || !inner.exchanges.contains_key(&binding.exchange_name)
        {
            return Err(AmqpError::BindingExchangeToQueueError(
                binding.exchange_name.clone(),
                binding.queue_name.clone(),
            ));
        }

        inner.events.push(BrokerEvent::Bind {
            queue: binding.queue_name.clone(),
            exchange: binding.exchange_name.clone(),
            routing_key: binding.routing_key.clone(),
        });
        Ok(())
    }

    async fn publish(
        &self,
        routing_key: &str,
        body: &[u8],
        message_id: &str,
    ) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut inner = self.state.lock().unwrap();

        if inner.fail_publish {
            return Err(AmqpError::PublishingError);
        }

        inner.events.push(BrokerEvent::Publish {
            routing_key: routing_key.to_owned(),
            message_id: message_id.to_owned(),
        });
        inner.published.push(Published {
            routing_key: routing_key.to_owned(),
            message_id: message_id.to_owned(),
            body: body.to_vec(),
        });
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        tag: &str,
        prefetch: u16,
    ) -> Result<DeliveryStream, AmqpError> {
        self.ensure_open()?;
        let (sender, receiver) = mpsc::unbounded_channel();

        {
            let mut inner = self.state.lock().unwrap();
            if inner.subscriptions.contains_key(tag) {
                return Err(AmqpError::BindingConsumerError(tag.to_owned()));
            }

            inner.events.push(BrokerEvent::Consume {
                queue: queue.to_owned(),
                tag: tag.to_owned(),
                prefetch,
            });
            inner.subscriptions.insert(
                tag.to_owned(),
                Subscription {
                    queue: queue.to_owned(),
                    sender,
                },
            );

            let backlog = inner.pending.remove(queue).unwrap_or_default();
            for message in backlog {
                Inner::route(&self.state, &mut inner, queue, message);
            }
        }

        let stream = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        });

        Ok(stream.boxed())
    }

    async fn cancel(&self, tag: &str) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut inner = self.state.lock().unwrap();

        if inner.subscriptions.remove(tag).is_none() {
            return Err(AmqpError::CancelConsumerError(tag.to_owned()));
        }

        inner.events.push(BrokerEvent::Cancel(tag.to_owned()));
        Ok(())
    }

    async fn close(&self) -> Result<(), AmqpError> {
        let mut inner = self.state.lock().unwrap();
        inner.closed = true;
        inner.subscriptions.clear();
        inner.events.push(BrokerEvent::Close);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        !self.state.lock().unwrap().closed
    }
}

type Script = dyn Fn(&Delivery) -> bool + Send + Sync;

/// Handler answering from a closure and recording what it saw.
pub(crate) struct ScriptedHandler {
    script: Box<Script>,
    seen: Mutex<Vec<(String, bool)>>,
}

impl ScriptedHandler {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&Delivery) -> bool + Send + Sync + 'static,
    {
        Arc::new(ScriptedHandler {
            script: Box::new(script),
            seen: Mutex::new(vec![]),
        })
    }

    pub fn always(result: bool) -> Arc<Self> {
        Self::new(move |_| result)
    }

    /// `(message_id, redelivered)` for every invocation, in order.
    pub fn seen(&self) -> Vec<(String, bool)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConsumerHandler for ScriptedHandler {
    async fn exec(&self, ctx: &HandlerContext, delivery: &Delivery) -> bool {
        self.seen
            .lock()
            .unwrap()
            .push((ctx.correlation_id.clone(), delivery.redelivered));
        (self.script)(delivery)
    }
}

/// Handler that blocks each invocation until the test releases a permit.
pub(crate) struct GatedHandler {
    gate: Semaphore,
    started: Semaphore,
}

impl GatedHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(GatedHandler {
            gate: Semaphore::new(0),
            started: Semaphore::new(0),
        })
    }

    /// Waits until `n` invocations are in flight.
    pub async fn wait_started(&self, n: u32) {
        self.started.acquire_many(n).await.unwrap().forget();
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl ConsumerHandler for GatedHandler {
    async fn exec(&self, _ctx: &HandlerContext, _delivery: &Delivery) -> bool {
        self.started.add_permits(1);
        self.gate.acquire().await.unwrap().forget();
        true
    }
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub(crate) async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
