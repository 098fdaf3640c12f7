// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delayed Retry Topology
//!
//! Delayed redelivery is delegated to the broker's dead-lettering. For a
//! queue `q` and a TTL the topology is:
//! - `q.retry`: durable direct exchange, `q` bound to it with routing key `q`
//! - `q.{ttl_seconds}s.retry`: durable queue with `x-message-ttl = ttl`,
//!   dead-lettering to `q.retry` with routing key `q`
//!
//! A message published into the delayed queue expires after the TTL and
//! the broker routes it back to `q`. Every name is a pure function of
//! `(queue, ttl)`, so declaring the same topology again is a no-op.

use crate::{
    broker::Broker,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use std::time::Duration;
use tracing::debug;

/// Constant for the header field used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Constant for the header field used to specify a dead letter routing key
pub const AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";
/// Constant for the header field used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";

const RETRY_SUFFIX: &str = "retry";

/// Names and TTL of the delayed retry topology of one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterTopology {
    pub queue: String,
    pub retry_exchange: String,
    pub delayed_queue: String,
    pub ttl_ms: i32,
}

impl DeadLetterTopology {
    /// Derives the topology for `queue` delayed by `ttl`.
    ///
    /// The delayed queue is named after whole seconds, so only whole-second
    /// TTLs are accepted: 1500ms and 1800ms would share `q.1s.retry` with
    /// different `x-message-ttl` values, and the broker refuses the second
    /// declaration by closing the channel.
    ///
    /// # Errors
    /// `InvalidTtlError` when `ttl` is zero, not a whole number of seconds
    /// or does not fit the broker's 32-bit `x-message-ttl`.
    pub fn new(queue: &str, ttl: Duration) -> Result<Self, AmqpError> {
        let millis = ttl.as_millis();
        let ttl_ms = i32::try_from(millis)
            .ok()
            .filter(|ms| *ms > 0 && ms % 1000 == 0)
            .ok_or(AmqpError::InvalidTtlError(millis))?;

        Ok(DeadLetterTopology {
            queue: queue.to_owned(),
            retry_exchange: format!("{queue}.{RETRY_SUFFIX}"),
            delayed_queue: format!("{queue}.{}s.{RETRY_SUFFIX}", ttl_ms / 1000),
            ttl_ms,
        })
    }

    /// Declares the exchange, the binding and both queues.
    pub async fn declare(&self, broker: &dyn Broker) -> Result<(), AmqpError> {
        debug!(
            queue = %self.queue,
            exchange = %self.retry_exchange,
            delayed_queue = %self.delayed_queue,
            ttl = self.ttl_ms,
            "declaring retry topology"
        );

        broker
            .declare_queue(&QueueDefinition::new(&self.queue).durable())
            .await?;

        broker
            .declare_exchange(
                &ExchangeDefinition::new(&self.retry_exchange)
                    .direct()
                    .durable(),
            )
            .await?;

        broker
            .bind_queue(
                &QueueBinding::new(&self.queue)
                    .exchange(&self.retry_exchange)
                    .routing_key(&self.queue),
            )
            .await?;

        broker
            .declare_queue(
                &QueueDefinition::new(&self.delayed_queue)
                    .durable()
                    .ttl(self.ttl_ms)
                    .dead_letter(&self.retry_exchange, &self.queue),
            )
            .await
    }
}
