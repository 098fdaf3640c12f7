// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # dbo-amqp
//!
//! Payment service built around a self-healing RabbitMQ consumer subsystem.
//! A `BindingMonitor` periodically checks, through the management API,
//! that every registered queue is consumed by this instance and starts a
//! `WorkerPool` for the ones that are not. The `ShutdownCoordinator` stops
//! the monitor, cancels consumers, drains in-flight deliveries and only then
//! closes the broker connection and releases the HTTP listener.

mod consumer;

pub mod broker;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod exchange;
pub mod http;
pub mod logging;
pub mod management;
pub mod message;
pub mod monitor;
pub mod payment;
pub mod publisher;
pub mod queue;
pub mod registry;
pub mod shutdown;
pub mod tag;
pub mod topology;

#[cfg(test)]
pub(crate) mod testing;
