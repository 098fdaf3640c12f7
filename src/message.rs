// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Envelope
//!
//! A `Delivery` is what a worker pulls from a consumption stream: the body,
//! the correlation identifier (AMQP `message_id`) and a handle that settles
//! the delivery with the broker. Settling consumes the delivery, so a single
//! delivery can never be both acked and nacked.

use crate::errors::AmqpError;
use async_trait::async_trait;
use std::{fmt, sync::Arc};
use uuid::Uuid;

/// Settles a single delivery with the broker that pushed it.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Positive acknowledgment; the broker forgets the message.
    async fn ack(&self) -> Result<(), AmqpError>;

    /// Negative acknowledgment; `requeue` asks the broker to redeliver.
    async fn nack(&self, requeue: bool) -> Result<(), AmqpError>;
}

/// A message pushed by the broker and owned by it until settled.
pub struct Delivery {
    pub delivery_tag: u64,
    pub message_id: Option<String>,
    pub redelivered: bool,
    pub data: Vec<u8>,
    acker: Arc<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(
        delivery_tag: u64,
        message_id: Option<String>,
        redelivered: bool,
        data: Vec<u8>,
        acker: Arc<dyn Acknowledge>,
    ) -> Self {
        Delivery {
            delivery_tag,
            message_id,
            redelivered,
            data,
            acker,
        }
    }

    /// Correlation identifier for logs: the message id, or a fresh UUID when
    /// the publisher did not set one.
    pub fn correlation_id(&self) -> String {
        match &self.message_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => Uuid::new_v4().to_string(),
        }
    }

    /// Body decoded as UTF-8 for logging, lossy.
    pub fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub async fn ack(self) -> Result<(), AmqpError> {
        self.acker.ack().await
    }

    pub async fn nack(self, requeue: bool) -> Result<(), AmqpError> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("message_id", &self.message_id)
            .field("redelivered", &self.redelivered)
            .field("data", &self.body_lossy())
            .finish()
    }
}
