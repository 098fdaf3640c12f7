// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Tags
//!
//! A consumer tag is `{app}|{queue}|{instance}` where the instance token is
//! generated once per process. The binding monitor recognises its own
//! consumers in the management API by comparing the last `|`-separated
//! segment of each attached tag with its token. The format is shared with
//! every other process bound to the same broker, so it must not change.

use std::fmt;
use uuid::Uuid;

/// Separator between consumer tag segments
pub const CONSUMER_TAG_SEPARATOR: char = '|';

/// Random token identifying this process among the consumers of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceToken(String);

impl InstanceToken {
    /// Generates a fresh token. Call once per process.
    pub fn generate() -> Self {
        InstanceToken(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `consumer_tag` was issued by this process.
    pub fn owns(&self, consumer_tag: &str) -> bool {
        consumer_tag
            .rsplit(CONSUMER_TAG_SEPARATOR)
            .next()
            .is_some_and(|last| last == self.0)
    }
}

impl From<&str> for InstanceToken {
    fn from(token: &str) -> Self {
        InstanceToken(token.to_owned())
    }
}

impl fmt::Display for InstanceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerTag(String);

impl ConsumerTag {
    pub fn new(app_name: &str, queue: &str, instance: &InstanceToken) -> Self {
        ConsumerTag(format!(
            "{app_name}{sep}{queue}{sep}{instance}",
            sep = CONSUMER_TAG_SEPARATOR
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
