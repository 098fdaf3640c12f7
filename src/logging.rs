// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Tracing subscriber setup. `RUST_LOG` wins over `LOG_LEVEL`; logs are
//! JSON everywhere except in the development environment.

use crate::config::Settings;
use tracing_subscriber::{
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(settings: &Settings) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(&settings.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if settings.is_development() {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
    }
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("{level},lapin=warn,tower_http=info"))
        .unwrap_or_else(|_| EnvFilter::new("info,lapin=warn,tower_http=info"))
}
