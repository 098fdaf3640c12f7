// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use anyhow::Context;
use dbo_amqp::{
    broker::Broker,
    channel::AmqpBroker,
    config::Settings,
    http::{self, AppState},
    logging,
    management::HttpManagementApi,
    monitor::BindingMonitor,
    payment::{InMemoryOrderRepository, PaymentProcessHandler, PAYMENT_PROCESS_QUEUE},
    publisher::Publisher,
    registry::{ConsumerRegistry, ConsumerSpec},
    shutdown::{termination_signal, ShutdownCoordinator},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    logging::init(&settings).context("installing tracing subscriber")?;

    info!(
        name = %settings.name,
        env = %settings.env,
        version = %settings.version,
        "starting"
    );

    let broker: Arc<dyn Broker> = Arc::new(
        AmqpBroker::connect(&settings.rabbitmq_url, &settings.name)
            .await
            .context("connecting to rabbitmq")?,
    );
    let coordinator = ShutdownCoordinator::new(broker.clone());
    let publisher = Publisher::new(broker.clone());
    let orders = InMemoryOrderRepository::new();

    let mut registry = ConsumerRegistry::new();
    registry.register(
        ConsumerSpec::new(
            PAYMENT_PROCESS_QUEUE,
            PaymentProcessHandler::new(
                orders.clone(),
                publisher.clone(),
                settings.payment_retry_delay(),
            ),
        )
        .requeue_on_failure(true),
    )?;

    let management = Arc::new(HttpManagementApi::new(&settings.management())?);
    let monitor = BindingMonitor::new(
        broker.clone(),
        management,
        Arc::new(registry),
        coordinator.clone(),
        settings.monitor(),
    );
    info!(instance = %monitor.instance(), "spawning binding monitor");
    coordinator.supervise_monitor(monitor.spawn()).await;

    let signals = coordinator.clone();
    tokio::spawn(async move {
        if let Err(err) = termination_signal().await {
            error!(error = err.to_string(), "failure to listen for signals");
        }
        info!("termination requested");
        signals.shutdown().await;
    });

    let app = http::router(Arc::new(AppState {
        coordinator: coordinator.clone(),
        broker,
        orders,
        publisher,
        version: settings.version.clone(),
    }));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "http server listening");

    http::serve(listener, app, coordinator, settings.server_timeout()).await?;

    info!("stopped");
    Ok(())
}
