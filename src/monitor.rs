// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Binding Monitor
//!
//! A single timer-driven loop that keeps every registered queue bound to
//! exactly one worker pool of this process. On each tick it asks the
//! management API which consumers are attached to the queue and looks for
//! a tag whose last segment is this process's instance token. A queue
//! without one gets a new `WorkerPool`; a queue with one is left alone.
//!
//! The management API lags behind the broker, so a pool started by this
//! monitor that is still running also counts as bound. Consumers owned by
//! other processes never do.

use crate::{
    broker::Broker,
    dispatcher::WorkerPool,
    management::ManagementApi,
    registry::ConsumerRegistry,
    shutdown::ShutdownCoordinator,
    tag::{ConsumerTag, InstanceToken},
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    /// First segment of every consumer tag
    pub app_name: String,
    /// Time between two binding checks
    pub interval: Duration,
    /// Workers per queue unless the consumer overrides it
    pub concurrency: usize,
}

/// What the last tick learned about a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingState {
    pub queue: String,
    pub bound_tag: Option<String>,
    pub is_bound: bool,
}

impl BindingState {
    fn unbound(queue: &str) -> Self {
        BindingState {
            queue: queue.to_owned(),
            bound_tag: None,
            is_bound: false,
        }
    }
}

pub struct BindingMonitor {
    broker: Arc<dyn Broker>,
    management: Arc<dyn ManagementApi>,
    registry: Arc<ConsumerRegistry>,
    coordinator: Arc<ShutdownCoordinator>,
    settings: MonitorSettings,
    instance: InstanceToken,
    states: BTreeMap<String, BindingState>,
    pools: HashMap<String, WorkerPool>,
}

impl BindingMonitor {
    pub fn new(
        broker: Arc<dyn Broker>,
        management: Arc<dyn ManagementApi>,
        registry: Arc<ConsumerRegistry>,
        coordinator: Arc<ShutdownCoordinator>,
        settings: MonitorSettings,
    ) -> Self {
        BindingMonitor {
            broker,
            management,
            registry,
            coordinator,
            settings,
            instance: InstanceToken::generate(),
            states: BTreeMap::new(),
            pools: HashMap::new(),
        }
    }

    /// Replaces the generated instance token.
    pub fn with_instance(mut self, instance: InstanceToken) -> Self {
        self.instance = instance;
        self
    }

    pub fn instance(&self) -> &InstanceToken {
        &self.instance
    }

    pub fn state(&self, queue: &str) -> Option<&BindingState> {
        self.states.get(queue)
    }

    /// Checks every registered queue once and binds the unbound ones.
    ///
    /// # Returns
    /// The number of worker pools started by this tick
    pub async fn tick(&mut self) -> usize {
        let mut started = 0;

        for spec in self.registry.iter() {
            if self.coordinator.is_stopping() {
                break;
            }

            let queue = spec.queue();
            let info = match self.management.queue_info(queue).await {
                Ok(info) => info,
                Err(err) => {
                    warn!(error = err.to_string(), queue, "skipping queue this tick");
                    continue;
                }
            };

            let owned_tag = info
                .consumer_tags()
                .find(|tag| self.instance.owns(tag))
                .map(str::to_owned);
            let local_tag = self
                .pools
                .get(queue)
                .filter(|pool| pool.is_running())
                .map(|pool| pool.tag().to_string());

            let state = self
                .states
                .entry(queue.to_owned())
                .or_insert_with(|| BindingState::unbound(queue));

            if let Some(tag) = owned_tag.or(local_tag) {
                debug!(queue, consumer_tag = %tag, "queue already bound");
                state.bound_tag = Some(tag);
                state.is_bound = true;
                continue;
            }

            debug!(
                queue,
                consumers = info.consumers,
                "no consumer of this process on queue"
            );

            let tag = ConsumerTag::new(&self.settings.app_name, queue, &self.instance);
            let concurrency = spec.effective_concurrency(self.settings.concurrency);

            match WorkerPool::start(
                self.broker.clone(),
                spec.clone(),
                tag.clone(),
                concurrency,
                &self.coordinator,
            )
            .await
            {
                Ok(pool) => {
                    state.bound_tag = Some(tag.to_string());
                    state.is_bound = true;
                    self.pools.insert(queue.to_owned(), pool);
                    started += 1;
                }
                Err(err) => {
                    error!(
                        error = err.to_string(),
                        queue,
                        consumer_tag = %tag,
                        "failure to bind consumer"
                    );
                    *state = BindingState::unbound(queue);
                }
            }
        }

        started
    }

    /// Ticks until the coordinator stops binding. The first tick is immediate.
    pub async fn run(mut self) {
        let token = self.coordinator.binding_token();
        let mut ticker = interval(self.settings.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            instance = %self.instance,
            interval = ?self.settings.interval,
            queues = self.registry.len(),
            "binding monitor started"
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let started = self.tick().await;
            if started > 0 {
                info!(started, "worker pools started");
            }
        }

        info!("binding monitor stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
