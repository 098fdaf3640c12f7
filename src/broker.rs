// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Client Contract
//!
//! The `Broker` trait is the single seam between the consumer lifecycle and
//! the AMQP connection. The worker pools, the binding monitor, the shutdown
//! coordinator and the publisher all hold an `Arc<dyn Broker>`; the lapin
//! backed implementation lives in the `channel` module.
//!
//! Implementations own exactly one connection and one channel per process
//! and transparently re-establish them before declare, publish and consume
//! calls when they were lost.

use crate::{
    errors::AmqpError,
    exchange::ExchangeDefinition,
    message::Delivery,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A consumption stream. It ends once the consumer is cancelled and every
/// delivery already pushed by the broker has been yielded.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, AmqpError>>;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Declares a queue. Re-declaring an identical queue is a no-op.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError>;

    /// Declares an exchange. Re-declaring an identical exchange is a no-op.
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    /// Binds a queue to an exchange.
    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    /// Publishes a persistent JSON message on the default exchange, routed to
    /// the queue named `routing_key`, with `message_id` as correlation id.
    async fn publish(
        &self,
        routing_key: &str,
        body: &[u8],
        message_id: &str,
    ) -> Result<(), AmqpError>;

    /// Sets the prefetch window to `prefetch` and registers a manual-ack
    /// consumer tagged `tag` on `queue`.
    async fn consume(
        &self,
        queue: &str,
        tag: &str,
        prefetch: u16,
    ) -> Result<DeliveryStream, AmqpError>;

    /// Cancels the broker-side registration of the consumer tagged `tag`.
    async fn cancel(&self, tag: &str) -> Result<(), AmqpError>;

    /// Closes the channel, then the connection. No reconnect happens after.
    async fn close(&self) -> Result<(), AmqpError>;

    /// Whether the connection is currently up.
    async fn is_connected(&self) -> bool;
}
