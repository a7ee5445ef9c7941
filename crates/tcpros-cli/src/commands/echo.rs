//! `tcpros echo`: print messages from a publisher as JSON lines.

use std::io::Write;

use tcpros_transport::{Node, ShutdownHandle, SubscriberEvent};
use tracing::{debug, info, warn};

use crate::error::CliResult;

/// Options for [`run`].
#[derive(Debug, Clone)]
pub struct EchoOptions {
    pub topic: String,
    pub type_id: String,
    pub host: String,
    pub port: u16,
    pub count: Option<u64>,
}

/// Writes one JSON line per message to `out` until `count` messages arrived,
/// the publisher hangs up or shutdown is signaled. Returns the number of
/// messages written.
pub async fn run<W: Write>(
    node: &Node,
    options: &EchoOptions,
    shutdown: ShutdownHandle,
    out: &mut W,
) -> CliResult<u64> {
    let (subscriber, mut events) = node
        .subscribe(&options.topic, &options.type_id, &options.host, options.port)
        .await?;

    let mut received = 0u64;
    let stop = shutdown.wait().wait();
    tokio::pin!(stop);

    loop {
        if options.count.is_some_and(|count| received >= count) {
            break;
        }
        tokio::select! {
            _ = &mut stop => {
                info!("Shutdown requested");
                break;
            }
            event = events.recv() => match event {
                Some(SubscriberEvent::Message(message)) => {
                    writeln!(out, "{}", serde_json::to_string(&message.to_json())?)?;
                    out.flush()?;
                    received += 1;
                }
                Some(SubscriberEvent::Connected(header)) => {
                    debug!(caller_id = header.caller_id.as_deref().unwrap_or("?"), "Handshake complete");
                }
                Some(SubscriberEvent::Error(message)) => warn!(%message, "Dropped a message"),
                Some(SubscriberEvent::Disconnected) | None => {
                    info!("Publisher went away");
                    break;
                }
            },
        }
    }

    subscriber.close();
    Ok(received)
}
