// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! This module provides the publish operations used by the application:
//! an immediate publish into a queue and a delayed publish through the
//! dead-letter retry topology. Payloads are JSON encoded and published as
//! persistent messages whose `message_id` is the caller's correlation id.

use crate::{
    broker::Broker, errors::AmqpError, queue::QueueDefinition, topology::DeadLetterTopology,
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error};

/// Publishes JSON payloads through the shared broker client.
pub struct Publisher {
    broker: Arc<dyn Broker>,
}

impl Publisher {
    /// Creates a new publisher.
    ///
    /// # Parameters
    /// * `broker` - The broker client shared by the process
    ///
    /// # Returns
    /// An Arc-wrapped Publisher instance for thread-safe sharing
    pub fn new(broker: Arc<dyn Broker>) -> Arc<Publisher> {
        Arc::new(Publisher { broker })
    }

    /// Publishes `payload` into `queue`, declaring the queue durable first.
    ///
    /// # Parameters
    /// * `correlation_id` - Used as AMQP `message_id`
    /// * `queue` - Destination queue, also the routing key on the default exchange
    /// * `payload` - Serialized as JSON
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn publish<T>(
        &self,
        correlation_id: &str,
        queue: &str,
        payload: &T,
    ) -> Result<(), AmqpError>
    where
        T: Serialize + ?Sized + Sync,
    {
        let body = encode(payload)?;

        self.broker
            .declare_queue(&QueueDefinition::new(queue).durable())
            .await?;

        self.send(correlation_id, queue, &body).await
    }

    /// Publishes `payload` so that it lands in `queue` once `ttl` elapsed.
    ///
    /// The retry topology of `(queue, ttl)` is declared before every publish;
    /// the message goes into the delayed queue and is dead-lettered back to
    /// `queue` by the broker.
    ///
    /// # Returns
    /// The topology the message went through, or AmqpError on failure
    pub async fn publish_delayed<T>(
        &self,
        correlation_id: &str,
        queue: &str,
        payload: &T,
        ttl: Duration,
    ) -> Result<DeadLetterTopology, AmqpError>
    where
        T: Serialize + ?Sized + Sync,
    {
        let topology = DeadLetterTopology::new(queue, ttl)?;
        let body = encode(payload)?;

        topology.declare(self.broker.as_ref()).await?;
        self.send(correlation_id, &topology.delayed_queue, &body).await?;

        Ok(topology)
    }

    async fn send(&self, correlation_id: &str, queue: &str, body: &[u8]) -> Result<(), AmqpError> {
        match self.broker.publish(queue, body, correlation_id).await {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    queue,
                    message_id = correlation_id,
                    "error publishing message"
                );
                Err(err)
            }
            Ok(()) => {
                debug!(queue, message_id = correlation_id, "message published");
                Ok(())
            }
        }
    }
}

fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>, AmqpError> {
    serde_json::to_vec(payload).map_err(|err| {
        error!(error = err.to_string(), "failure to serialize payload");
        AmqpError::SerializePayloadError
    })
}
