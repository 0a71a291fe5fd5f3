//! # Node Configuration
//!
//! Uses the `config` crate for layered configuration: built-in defaults, an
//! optional file, then `MESH__*` environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the Resource Directory does when a second node announces a collection
/// name that already has an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The latest announcement takes over ownership.
    #[default]
    LastWriteWins,
    /// The first owner stays; later claimants are ignored.
    KeepFirst,
}

/// Runtime settings of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Upper bound on every remote `send`.
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Interval between reconciliation cycles.
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Capacity of the node's request and inbound channels.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,

    /// Capacity of each collection actor's channel.
    #[serde(default = "default_collection_buffer")]
    pub collection_buffer: usize,

    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_inbox_capacity() -> usize {
    64
}

fn default_collection_buffer() -> usize {
    32
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            poll_interval: default_poll_interval(),
            inbox_capacity: default_inbox_capacity(),
            collection_buffer: default_collection_buffer(),
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MESH")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}
