// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Consumer Lifecycle
//!
//! This module provides the error taxonomy for every broker-facing operation.
//! The `AmqpError` enum covers connection and channel failures, topology
//! declarations, publishing, the consumption stream, settlement (ack/nack),
//! cancellation and close, as well as management API introspection.
//!
//! Handler failures are intentionally absent: a handler that returns `false`
//! or panics is converted into a negative acknowledgment and never surfaces
//! as an error.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Each variant names the operation that failed. Variants carrying a `String`
/// hold the resource name (queue, exchange, consumer tag) or the underlying
/// reason, so values stay comparable in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// The client was closed by the shutdown sequence and will not reconnect
    #[error("connection was closed by shutdown")]
    ConnectionClosedError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to binding queue `{1}` to exchange `{0}`")]
    BindingExchangeToQueueError(String, String),

    /// Error registering a consumer on a queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error serializing a message payload
    #[error("failure to serialize payload")]
    SerializePayloadError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error cancelling the consumer with the given tag
    #[error("failure to cancel consumer `{0}`")]
    CancelConsumerError(String),

    /// Error closing the channel
    #[error("failure to close the channel")]
    CloseChannelError,

    /// Error closing the connection
    #[error("failure to close the connection")]
    CloseConnectionError,

    /// Error receiving a delivery from a consumption stream
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// The management API was unreachable or answered with an unexpected body
    #[error("failure to inspect queue `{0}`")]
    IntrospectionError(String),

    /// A consumer was already registered for the queue
    #[error("consumer for queue `{0}` already registered")]
    DuplicateConsumerError(String),

    /// A delayed publish was requested with a TTL the broker cannot hold
    #[error("invalid message ttl `{0}ms`")]
    InvalidTtlError(u128),

    /// A binding was requested after the shutdown sequence started
    #[error("shutdown in progress, queue `{0}` not bound")]
    ShuttingDownError(String),
}
