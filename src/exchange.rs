// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! The retry topology routes dead-lettered messages back to their queue
//! through a direct exchange; `ExchangeDefinition` describes it.

/// Exchange types the client declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Routes on an exact routing key match
    #[default]
    Direct,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        }
    }
}

/// Definition of a RabbitMQ exchange, built with chained calls.
///
/// Exchanges are never auto-deleted nor internal: retry exchanges must
/// survive the last binding going away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) durable: bool,
}

impl ExchangeDefinition {
    /// A transient direct exchange named `name`.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn direct(mut self) -> Self {
        self.kind = ExchangeKind::Direct;
        self
    }

    /// Keeps the exchange across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }
}
