//! Node handle: caller identity, type loading and the open session set.

use tcpros_core::MessageLoader;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::{PublisherConfig, SubscriberConfig};
use crate::error::TransportResult;
use crate::publisher::{Publisher, PublisherEvent};
use crate::session::{SessionKind, SessionSet};
use crate::subscriber::{Subscriber, SubscriberEvent};

/// Adds a leading `/` to node and topic names that lack one.
pub fn normalize_name(name: &str) -> String {
    let name = name.trim();
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

/// A named participant that advertises and subscribes to topics.
///
/// Sessions created through the node are tracked in [`Node::sessions`]
/// until they close.
#[derive(Clone)]
pub struct Node {
    caller_id: String,
    loader: MessageLoader,
    sessions: SessionSet,
    publisher_config: PublisherConfig,
    subscriber_config: SubscriberConfig,
}

impl Node {
    pub fn new(name: &str, loader: MessageLoader) -> Self {
        Self {
            caller_id: normalize_name(name),
            loader,
            sessions: SessionSet::new(),
            publisher_config: PublisherConfig::default(),
            subscriber_config: SubscriberConfig::default(),
        }
    }

    /// Creates a node that loads types through `ROS_PACKAGE_PATH`.
    pub fn from_env(name: &str) -> Self {
        Self::new(name, MessageLoader::from_env())
    }

    #[must_use]
    pub fn with_publisher_config(mut self, config: PublisherConfig) -> Self {
        self.publisher_config = config;
        self
    }

    #[must_use]
    pub fn with_subscriber_config(mut self, config: SubscriberConfig) -> Self {
        self.subscriber_config = config;
        self
    }

    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    pub fn loader(&self) -> &MessageLoader {
        &self.loader
    }

    pub fn sessions(&self) -> &SessionSet {
        &self.sessions
    }

    /// Loads `type_id` and starts publishing it on `topic`.
    pub async fn advertise(
        &self,
        topic: &str,
        type_id: &str,
    ) -> TransportResult<(Publisher, mpsc::Receiver<PublisherEvent>)> {
        let topic = normalize_name(topic);
        let descriptor = self.loader.load(type_id).await?;
        let (publisher, events) = Publisher::new(
            &self.caller_id,
            &topic,
            descriptor,
            self.publisher_config.clone(),
        );
        publisher.start().await?;

        let id = self.sessions.insert(SessionKind::Publisher, &topic, type_id);
        let sessions = self.sessions.clone();
        publisher.on_close(move || {
            sessions.remove(id);
        });
        debug!(caller_id = %self.caller_id, %topic, type_id, "Advertised topic");
        Ok((publisher, events))
    }

    /// Loads `type_id` and subscribes to the publisher at `host:port`.
    pub async fn subscribe(
        &self,
        topic: &str,
        type_id: &str,
        host: &str,
        port: u16,
    ) -> TransportResult<(Subscriber, mpsc::Receiver<SubscriberEvent>)> {
        let topic = normalize_name(topic);
        let descriptor = self.loader.load(type_id).await?;
        let (subscriber, events) = Subscriber::new(
            &self.caller_id,
            &topic,
            descriptor,
            self.subscriber_config.clone(),
        );

        let id = self.sessions.insert(SessionKind::Subscriber, &topic, type_id);
        let sessions = self.sessions.clone();
        subscriber.on_close(move || {
            sessions.remove(id);
        });

        if let Err(e) = subscriber.connect(host, port).await {
            self.sessions.remove(id);
            return Err(e);
        }
        debug!(caller_id = %self.caller_id, %topic, type_id, host, port, "Subscribed to topic");
        Ok((subscriber, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_get_a_leading_slash() {
        assert_eq!(normalize_name("talker"), "/talker");
        assert_eq!(normalize_name("/talker"), "/talker");
        assert_eq!(normalize_name(" chatter "), "/chatter");
    }
}
