// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Processing
//!
//! This module processes a single delivery on behalf of a worker:
//! 1. Builds the handler context (queue + correlation id) and a log span
//! 2. Invokes the registered handler behind a panic guard
//! 3. Acknowledges on success
//! 4. Negatively acknowledges on failure or panic, requeueing per the
//!    consumer's policy
//!
//! The delivery is consumed by the settlement call, so every delivery that
//! enters `consume` is settled exactly once.

use crate::{
    errors::AmqpError,
    message::Delivery,
    registry::{ConsumerSpec, HandlerContext},
};
use futures_util::FutureExt;
use std::{any::Any, panic::AssertUnwindSafe};
use tracing::{debug, error, info_span, warn, Instrument};

/// How a delivery was settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Nacked { requeue: bool },
}

/// Runs the handler for `delivery` and settles it.
///
/// # Parameters
/// * `spec` - Consumer binding holding the handler and requeue policy
/// * `delivery` - The delivery pulled from the consumption stream
///
/// # Returns
/// The settlement issued, or the ack/nack error reported by the broker
pub(crate) async fn consume(
    spec: &ConsumerSpec,
    delivery: Delivery,
) -> Result<Settlement, AmqpError> {
    let ctx = HandlerContext {
        queue: spec.queue.clone(),
        correlation_id: delivery.correlation_id(),
    };
    let span = info_span!(
        "delivery",
        queue = %ctx.queue,
        message_id = %ctx.correlation_id,
        redelivered = delivery.redelivered
    );

    async move {
        debug!(body = %delivery.body_lossy(), "received");

        let outcome = AssertUnwindSafe(spec.handler.exec(&ctx, &delivery))
            .catch_unwind()
            .await;

        let success = match outcome {
            Ok(success) => success,
            Err(panic) => {
                error!(panic = panic_message(panic.as_ref()), "handler panicked, treating as failure");
                false
            }
        };

        if success {
            debug!("message successfully processed");
            delivery.ack().await?;
            return Ok(Settlement::Acked);
        }

        let requeue = spec.requeue_on_failure;
        warn!(requeue, "message processing failed");
        delivery.nack(requeue).await?;

        Ok(Settlement::Nacked { requeue })
    }
    .instrument(span)
    .await
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
