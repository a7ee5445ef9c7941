//! `tcpros pub`: advertise a topic and publish a message on it.

use std::time::Duration;

use tcpros_core::MessageInstance;
use tcpros_transport::{Node, PublisherEvent, ShutdownHandle};
use tracing::{debug, info, warn};

use crate::error::{CliError, CliResult};

/// Time given to links to write queued frames before the publisher closes.
const LINGER: Duration = Duration::from_millis(500);

/// Options for [`run`].
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub topic: String,
    pub type_id: String,
    pub message: String,
    pub rate: f64,
    pub count: Option<u64>,
}

/// Publishes until `count` messages went out or shutdown is signaled.
/// Returns the number of messages published.
pub async fn run(node: &Node, options: &PublishOptions, shutdown: ShutdownHandle) -> CliResult<u64> {
    let period = period(options.rate)?;
    let json: serde_json::Value = serde_json::from_str(&options.message)?;

    let (publisher, mut events) = node.advertise(&options.topic, &options.type_id).await?;
    let message = MessageInstance::from_json(publisher.descriptor(), &json)?;
    if let Some(addr) = publisher.endpoint() {
        eprintln!("publishing {} on {} at {addr}", options.type_id, publisher.topic());
    }

    let mut ticker = tokio::time::interval(period);
    let mut published = 0u64;
    let stop = shutdown.wait().wait();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => {
                info!("Shutdown requested");
                break;
            }
            Some(event) = events.recv() => log_event(event),
            _ = ticker.tick() => {
                let reached = publisher.publish(&message)?;
                published += 1;
                debug!(published, reached, "Published message");
                if options.count.is_some_and(|count| published >= count) {
                    tokio::time::sleep(LINGER).await;
                    break;
                }
            }
        }
    }

    publisher.shutdown();
    Ok(published)
}

fn period(rate: f64) -> CliResult<Duration> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(CliError::Argument(format!("rate must be a positive number of Hz, got {rate}")));
    }
    Ok(Duration::from_secs_f64(1.0 / rate))
}

fn log_event(event: PublisherEvent) {
    match event {
        PublisherEvent::Connected { peer, caller_id, .. } => {
            info!(%peer, caller_id = caller_id.as_deref().unwrap_or("?"), "Subscriber connected");
        }
        PublisherEvent::Disconnected { peer, .. } => info!(%peer, "Subscriber disconnected"),
        PublisherEvent::Error { peer, message } => warn!(?peer, %message, "Publisher error"),
        PublisherEvent::Listening(addr) => debug!(%addr, "Listening"),
    }
}
