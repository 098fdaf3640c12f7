// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Payment Processing
//!
//! The `payment_proccess` queue carries orders that are ready to be paid.
//! `request_payment` is the publishing side (called by the HTTP layer) and
//! `PaymentProcessHandler` is the consumer registered for the queue.
//!
//! Persistence is behind `OrderRepository`. The handler acknowledges every
//! message it can never succeed on (undecodable, unknown order, terminal
//! status) and fails, so the delivery is requeued, only on transient
//! repository or broker errors. A confirmation that arrives while the order
//! is still in `Create` is deferred through the delayed retry topology.

use crate::{
    errors::AmqpError,
    message::Delivery,
    publisher::Publisher,
    registry::{ConsumerHandler, HandlerContext},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Queue consumed by the payment handler
pub const PAYMENT_PROCESS_QUEUE: &str = "payment_proccess";

/// Order lifecycle, serialized as its integer code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum OrderStatus {
    #[default]
    Create,
    ReadyToPay,
    Paid,
    Success,
    Failed,
}

impl TryFrom<i32> for OrderStatus {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(OrderStatus::Create),
            2 => Ok(OrderStatus::ReadyToPay),
            3 => Ok(OrderStatus::Paid),
            4 => Ok(OrderStatus::Success),
            10 => Ok(OrderStatus::Failed),
            other => Err(format!("unknown order status {other}")),
        }
    }
}

impl From<OrderStatus> for i32 {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Create => 1,
            OrderStatus::ReadyToPay => 2,
            OrderStatus::Paid => 3,
            OrderStatus::Success => 4,
            OrderStatus::Failed => 10,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub item_id: String,
    pub item_name: String,
    pub sku: String,
    pub quantity: i32,
    pub item_price: i64,
    pub discount_amount: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub order_item: Vec<OrderItem>,
    pub total_amount: i64,
    pub total_quantity: i32,
    pub total_discount_amount: i64,
    pub payment_method: String,
    pub payment_acquirement_id: String,
    pub payment_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Status history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLog {
    pub order_id: String,
    pub order_status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderLog {
    pub fn now(order_id: &str, order_status: OrderStatus) -> Self {
        OrderLog {
            order_id: order_id.to_owned(),
            order_status,
            created_at: Utc::now(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("order `{0}` not found")]
    NotFound(String),

    #[error("order storage unavailable: {0}")]
    Unavailable(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, RepositoryError>;

    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), RepositoryError>;

    async fn insert_log(&self, log: OrderLog) -> Result<(), RepositoryError>;
}

/// Process-local order store.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, Order>>,
    logs: RwLock<Vec<OrderLog>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(InMemoryOrderRepository::default())
    }

    pub async fn insert(&self, order: Order) {
        self.orders.write().await.insert(order.id.clone(), order);
    }

    pub async fn logs(&self, order_id: &str) -> Vec<OrderLog> {
        self.logs
            .read()
            .await
            .iter()
            .filter(|log| log.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| RepositoryError::NotFound(order_id.to_owned()))?;

        let now = Utc::now();
        order.status = status;
        order.updated_at = Some(now);
        if status == OrderStatus::Paid {
            order.payment_date = Some(now);
        }
        Ok(())
    }

    async fn insert_log(&self, log: OrderLog) -> Result<(), RepositoryError> {
        self.logs.write().await.push(log);
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentRequestError {
    #[error("order `{0}` not found")]
    OrderNotFound(String),

    #[error("order `{0}` is {1}, expected Create")]
    InvalidStatus(String, OrderStatus),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Publish(#[from] AmqpError),
}

/// Moves an order from `Create` to `ReadyToPay` and publishes it to the
/// payment queue with `correlation_id` as message id. The order goes back
/// to `Create` when the publish fails, so the request can be retried.
pub async fn request_payment(
    orders: &dyn OrderRepository,
    publisher: &Publisher,
    order_id: &str,
    correlation_id: &str,
) -> Result<Order, PaymentRequestError> {
    let mut order = orders
        .find_order(order_id)
        .await?
        .filter(|order| !order.id.is_empty())
        .ok_or_else(|| PaymentRequestError::OrderNotFound(order_id.to_owned()))?;

    if order.status != OrderStatus::Create {
        return Err(PaymentRequestError::InvalidStatus(order.id, order.status));
    }

    orders
        .update_status(order_id, OrderStatus::ReadyToPay)
        .await?;

    order.status = OrderStatus::ReadyToPay;
    if let Err(err) = publisher
        .publish(correlation_id, PAYMENT_PROCESS_QUEUE, &order)
        .await
    {
        warn!(order_id, "payment not published, moving order back to Create");
        if let Err(rollback) = orders.update_status(order_id, OrderStatus::Create).await {
            error!(
                error = rollback.to_string(),
                order_id,
                "failure to move order back to Create"
            );
        }
        return Err(err.into());
    }

    if let Err(err) = orders
        .insert_log(OrderLog::now(order_id, OrderStatus::ReadyToPay))
        .await
    {
        error!(error = err.to_string(), order_id, "failure to insert order log");
    }

    info!(order_id, message_id = correlation_id, "order sent to payment");
    Ok(order)
}

/// Consumer of the `payment_proccess` queue.
pub struct PaymentProcessHandler {
    orders: Arc<dyn OrderRepository>,
    publisher: Arc<Publisher>,
    retry_delay: Duration,
}

impl PaymentProcessHandler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        publisher: Arc<Publisher>,
        retry_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(PaymentProcessHandler {
            orders,
            publisher,
            retry_delay,
        })
    }

    async fn mark_paid(&self, order: &Order) -> bool {
        // third party payment call goes here
        if let Err(err) = self
            .orders
            .update_status(&order.id, OrderStatus::Paid)
            .await
        {
            error!(error = err.to_string(), order_id = %order.id, "failure to mark order paid");
            return false;
        }

        if let Err(err) = self
            .orders
            .insert_log(OrderLog::now(&order.id, OrderStatus::Paid))
            .await
        {
            error!(error = err.to_string(), order_id = %order.id, "failure to insert order log");
        }

        info!(order_id = %order.id, "order paid");
        true
    }

    async fn defer(&self, ctx: &HandlerContext, order: &Order) -> bool {
        warn!(
            order_id = %order.id,
            delay = ?self.retry_delay,
            "order not ready to pay yet, deferring"
        );

        match self
            .publisher
            .publish_delayed(&ctx.correlation_id, &ctx.queue, order, self.retry_delay)
            .await
        {
            Ok(_) => true,
            Err(err) => {
                error!(error = err.to_string(), order_id = %order.id, "failure to defer payment");
                false
            }
        }
    }
}

#[async_trait]
impl ConsumerHandler for PaymentProcessHandler {
    async fn exec(&self, ctx: &HandlerContext, delivery: &Delivery) -> bool {
        let message: Order = match serde_json::from_slice(&delivery.data) {
            Ok(message) => message,
            Err(err) => {
                error!(error = err.to_string(), "undecodable payment message, dropping");
                return true;
            }
        };

        if message.id.is_empty() {
            info!("payment not valid, empty order id");
            return true;
        }

        let order = match self.orders.find_order(&message.id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!(order_id = %message.id, "order not found, dropping payment");
                return true;
            }
            Err(err) => {
                error!(error = err.to_string(), order_id = %message.id, "failure to load order");
                return false;
            }
        };

        match order.status {
            OrderStatus::ReadyToPay => self.mark_paid(&order).await,
            OrderStatus::Create => self.defer(ctx, &order).await,
            OrderStatus::Paid | OrderStatus::Success => {
                info!(order_id = %order.id, status = %order.status, "order already settled");
                true
            }
            OrderStatus::Failed => {
                warn!(order_id = %order.id, "order failed, payment ignored");
                true
            }
        }
    }
}
