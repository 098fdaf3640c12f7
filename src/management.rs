// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Management API Introspection
//!
//! The binding monitor asks the RabbitMQ management plugin which consumers
//! are attached to a queue: `GET {host}/api/queues/{vhost}/{queue}` with
//! basic authentication. Only `consumers` and `consumer_details[].consumer_tag`
//! are read from the answer.

use crate::errors::AmqpError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConsumerDetail {
    #[serde(default)]
    pub consumer_tag: String,
}

/// Subset of the management API queue object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QueueInfo {
    #[serde(default)]
    pub consumers: u32,
    #[serde(default)]
    pub consumer_details: Vec<ConsumerDetail>,
}

impl QueueInfo {
    pub fn consumer_tags(&self) -> impl Iterator<Item = &str> {
        self.consumer_details.iter().map(|d| d.consumer_tag.as_str())
    }
}

/// Introspection surface used to decide whether a queue still needs a
/// consumer from this process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManagementApi: Send + Sync {
    async fn queue_info(&self, queue: &str) -> Result<QueueInfo, AmqpError>;
}

#[derive(Debug, Clone)]
pub struct ManagementSettings {
    /// Base URL of the management plugin, e.g. `http://localhost:15672`
    pub host: String,
    pub vhost: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

pub struct HttpManagementApi {
    client: Client,
    base: Url,
    vhost: String,
    username: String,
    password: String,
}

impl HttpManagementApi {
    pub fn new(settings: &ManagementSettings) -> Result<Self, AmqpError> {
        let base = Url::parse(&settings.host).map_err(|err| {
            AmqpError::IntrospectionError(format!("invalid management host: {err}"))
        })?;

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| AmqpError::IntrospectionError(err.to_string()))?;

        Ok(HttpManagementApi {
            client,
            base,
            vhost: settings.vhost.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        })
    }

    /// `{host}/api/queues/{vhost}/{queue}` with each segment percent-encoded,
    /// so the default vhost `/` becomes `%2F`.
    pub fn queue_url(&self, queue: &str) -> Result<Url, AmqpError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AmqpError::IntrospectionError(queue.to_owned()))?
            .pop_if_empty()
            .extend(["api", "queues", self.vhost.as_str(), queue]);

        Ok(url)
    }
}

#[async_trait]
impl ManagementApi for HttpManagementApi {
    async fn queue_info(&self, queue: &str) -> Result<QueueInfo, AmqpError> {
        let url = self.queue_url(queue)?;
        debug!(url = %url, "inspecting queue consumers");

        let introspection_error =
            |err: reqwest::Error| AmqpError::IntrospectionError(format!("{queue}: {err}"));

        self.client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(introspection_error)?
            .error_for_status()
            .map_err(introspection_error)?
            .json::<QueueInfo>()
            .await
            .map_err(introspection_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(host: &str) -> ManagementSettings {
        ManagementSettings {
            host: host.to_owned(),
            vhost: "/".to_owned(),
            username: "guest".to_owned(),
            password: "guest".to_owned(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn queue_info_from_management_json() {
        let body = r#"{"consumers":1,"consumer_details":[{"consumer_tag":"app|payment_proccess|XYZ123","prefetch_count":1}],"name":"payment_proccess"}"#;

        let info: QueueInfo = serde_json::from_str(body).unwrap();

        assert_eq!(info.consumers, 1);
        assert_eq!(
            info.consumer_tags().collect::<Vec<_>>(),
            vec!["app|payment_proccess|XYZ123"]
        );
    }

    #[test]
    fn idle_queue_has_no_details() {
        let info: QueueInfo = serde_json::from_str(r#"{"consumers":0}"#).unwrap();

        assert_eq!(info, QueueInfo::default());
    }

    #[test]
    fn default_vhost_is_percent_encoded() {
        let api = HttpManagementApi::new(&settings("http://localhost:15672")).unwrap();

        assert_eq!(
            api.queue_url("payment_proccess").unwrap().as_str(),
            "http://localhost:15672/api/queues/%2F/payment_proccess"
        );
    }

    #[test]
    fn host_with_trailing_slash() {
        let api = HttpManagementApi::new(&settings("http://rabbit:15672/")).unwrap();

        assert_eq!(
            api.queue_url("orders").unwrap().as_str(),
            "http://rabbit:15672/api/queues/%2F/orders"
        );
    }

    #[test]
    fn invalid_host_is_rejected() {
        assert!(matches!(
            HttpManagementApi::new(&settings("not a url")),
            Err(AmqpError::IntrospectionError(_))
        ));
    }
}
