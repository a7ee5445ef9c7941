//! Session configuration.

use std::time::Duration;

/// Environment variable naming the host to advertise.
pub const HOSTNAME_ENV: &str = "ROS_HOSTNAME";
/// Fallback environment variable holding the address to advertise.
pub const IP_ENV: &str = "ROS_IP";

/// First port tried by the publisher port search.
pub const DEFAULT_BASE_PORT: u16 = 9000;

/// What a publisher does when a subscriber's send queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the oldest queued frame to make room.
    #[default]
    DropOldest,
    /// Close the slow subscriber's connection.
    Disconnect,
}

/// Publisher configuration.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Host or address to listen on.
    pub host: String,
    /// First port tried; `0` lets the OS pick.
    pub base_port: u16,
    /// Number of consecutive ports tried.
    pub port_search_limit: u16,
    /// Frames buffered per subscriber before the overflow policy applies.
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    /// Time a subscriber has to send its header after connecting.
    pub handshake_timeout: Duration,
    /// Announce the topic as latched and replay the last message to new
    /// subscribers.
    pub latching: bool,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_port: DEFAULT_BASE_PORT,
            port_search_limit: 1000,
            queue_capacity: 64,
            overflow: OverflowPolicy::DropOldest,
            handshake_timeout: Duration::from_secs(5),
            latching: false,
            event_capacity: 64,
        }
    }
}

impl PublisherConfig {
    /// Builder: set the listen host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Builder: set the first port tried.
    #[must_use]
    pub fn with_base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    /// Builder: set how many ports are tried. At least one is always tried.
    #[must_use]
    pub fn with_port_search_limit(mut self, limit: u16) -> Self {
        self.port_search_limit = limit.max(1);
        self
    }

    /// Builder: set the per-subscriber queue capacity (minimum 1).
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_latching(mut self, latching: bool) -> Self {
        self.latching = latching;
        self
    }
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub connect_timeout: Duration,
    /// Time the publisher has to answer with its header.
    pub handshake_timeout: Duration,
    /// Capacity of the event channel; a full channel pauses reading.
    pub event_capacity: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            event_capacity: 256,
        }
    }
}

impl SubscriberConfig {
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// Returns the host to listen on and advertise.
///
/// Uses `ROS_HOSTNAME`, then `ROS_IP`, then the loopback address.
pub fn default_host() -> String {
    host_from(|key| std::env::var(key).ok())
}

fn host_from(lookup: impl Fn(&str) -> Option<String>) -> String {
    [HOSTNAME_ENV, IP_ENV]
        .into_iter()
        .filter_map(&lookup)
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publisher_defaults() {
        let config = PublisherConfig::default();
        assert_eq!(config.base_port, 9000);
        assert_eq!(config.overflow, OverflowPolicy::DropOldest);
        assert!(!config.latching);
    }

    #[test]
    fn builders_clamp_to_useful_values() {
        let config = PublisherConfig::default()
            .with_host("10.0.0.2")
            .with_base_port(0)
            .with_port_search_limit(0)
            .with_queue_capacity(0)
            .with_overflow(OverflowPolicy::Disconnect)
            .with_latching(true);
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.base_port, 0);
        assert_eq!(config.port_search_limit, 1);
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.overflow, OverflowPolicy::Disconnect);
        assert!(config.latching);

        let sub = SubscriberConfig::default()
            .with_connect_timeout(Duration::from_millis(250))
            .with_event_capacity(0);
        assert_eq!(sub.connect_timeout, Duration::from_millis(250));
        assert_eq!(sub.event_capacity, 1);
    }

    #[test]
    fn host_lookup_order() {
        let env = |pairs: &'static [(&'static str, &'static str)]| {
            move |key: &str| {
                pairs
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
            }
        };
        assert_eq!(host_from(env(&[("ROS_HOSTNAME", "robot"), ("ROS_IP", "10.0.0.1")])), "robot");
        assert_eq!(host_from(env(&[("ROS_HOSTNAME", " "), ("ROS_IP", "10.0.0.1")])), "10.0.0.1");
        assert_eq!(host_from(env(&[])), "127.0.0.1");
    }
}
