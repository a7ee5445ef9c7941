//! Subscriber session: connect to a publisher and decode its stream.

use std::sync::{Arc, Mutex};

use tcpros_core::{MessageInstance, TypeDescriptor};
use tcpros_protocol::{ConnectionHeader, FrameReader, FrameWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Notify, mpsc, watch};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::SubscriberConfig;
use crate::error::{TransportError, TransportResult};
use crate::session::CloseHook;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Disconnected,
    Connecting,
    Connected,
}

/// Things that happen to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriberEvent {
    /// Handshake completed; carries the publisher's header.
    Connected(ConnectionHeader),
    Message(MessageInstance),
    Disconnected,
    /// A frame could not be decoded; the connection stays up.
    Error(String),
}

struct Shared {
    caller_id: String,
    topic: String,
    descriptor: Arc<TypeDescriptor>,
    config: SubscriberConfig,
    state: watch::Sender<SubscriberState>,
    events: mpsc::Sender<SubscriberEvent>,
    /// Stop signal of the current connection, replaced on every `connect`.
    shutdown: Mutex<Option<Arc<Notify>>>,
    on_close: Mutex<Option<CloseHook>>,
}

impl Shared {
    fn run_close_hook(&self) {
        if let Some(hook) = self.on_close.lock().unwrap_or_else(|e| e.into_inner()).take() {
            hook();
        }
    }
}

/// A single subscription to one publisher.
///
/// Messages are delivered through the event receiver returned by
/// [`Subscriber::new`]. Reading pauses while that channel is full.
pub struct Subscriber {
    shared: Arc<Shared>,
}

impl Subscriber {
    pub fn new(
        caller_id: impl Into<String>,
        topic: impl Into<String>,
        descriptor: Arc<TypeDescriptor>,
        config: SubscriberConfig,
    ) -> (Self, mpsc::Receiver<SubscriberEvent>) {
        let (events, rx) = mpsc::channel(config.event_capacity.max(1));
        let (state, _) = watch::channel(SubscriberState::Disconnected);
        let shared = Arc::new(Shared {
            caller_id: caller_id.into(),
            topic: topic.into(),
            descriptor,
            config,
            state,
            events,
            shutdown: Mutex::new(None),
            on_close: Mutex::new(None),
        });
        (Self { shared }, rx)
    }

    /// Connects to a publisher and performs the handshake.
    ///
    /// On success the publisher's header is returned and a background task
    /// starts delivering messages. On failure the subscriber is left
    /// disconnected and may be connected again.
    pub async fn connect(&self, host: &str, port: u16) -> TransportResult<ConnectionHeader> {
        let shared = &self.shared;
        let claimed = shared.state.send_if_modified(|state| {
            if *state == SubscriberState::Disconnected {
                *state = SubscriberState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(TransportError::AlreadyConnected {
                topic: shared.topic.clone(),
            });
        }

        let stop = Arc::new(Notify::new());
        *shared.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = Some(stop.clone());

        match handshake(shared, host, port).await {
            Ok((header, reader, writer)) => {
                shared.state.send_replace(SubscriberState::Connected);
                info!(topic = %shared.topic, host, port, "Connected to publisher");
                let _ = shared.events.send(SubscriberEvent::Connected(header.clone())).await;

                let span = info_span!("subscription", topic = %shared.topic, host, port);
                tokio::spawn(read_loop(shared.clone(), stop, reader, writer).instrument(span));
                Ok(header)
            }
            Err(e) => {
                warn!(topic = %shared.topic, host, port, error = %e, "Failed to connect to publisher");
                shared.shutdown.lock().unwrap_or_else(|e| e.into_inner()).take();
                shared.state.send_replace(SubscriberState::Disconnected);
                Err(e)
            }
        }
    }

    /// Closes the current connection. The read task sends
    /// [`SubscriberEvent::Disconnected`] once it stops. Does nothing while
    /// disconnected.
    pub fn close(&self) {
        if let Some(stop) = self.shared.shutdown.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            stop.notify_one();
        }
    }

    /// Registers a callback run once when the connection ends.
    pub fn on_close(&self, hook: impl FnOnce() + Send + 'static) {
        *self.shared.on_close.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(hook));
    }

    pub fn caller_id(&self) -> &str {
        &self.shared.caller_id
    }

    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.shared.descriptor
    }

    pub fn state(&self) -> SubscriberState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SubscriberState> {
        self.shared.state.subscribe()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.close();
        if self.state() == SubscriberState::Disconnected {
            self.shared.run_close_hook();
        }
    }
}

async fn handshake(
    shared: &Shared,
    host: &str,
    port: u16,
) -> TransportResult<(ConnectionHeader, FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>)> {
    let stream = tokio::time::timeout(shared.config.connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| TransportError::timeout("connect"))??;
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    let descriptor = &shared.descriptor;
    let mut request = ConnectionHeader::new()
        .with_caller_id(&shared.caller_id)
        .with_topic(&shared.topic)
        .with_type(descriptor.schema_id())
        .with_md5sum(descriptor.digest());
    if !descriptor.definition().is_empty() {
        request = request.with_message_definition(descriptor.definition());
    }
    writer.write_header(&request).await?;

    let response = tokio::time::timeout(shared.config.handshake_timeout, reader.read_header())
        .await
        .map_err(|_| TransportError::timeout("publisher handshake"))??;
    if !response.check_digest(descriptor.digest()) {
        return Err(TransportError::digest_mismatch(descriptor.digest(), response.md5sum.as_deref()));
    }

    Ok((response, reader, writer))
}

async fn read_loop(
    shared: Arc<Shared>,
    stop: Arc<Notify>,
    mut reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
) {
    // The write half stays open for the whole subscription; dropping it
    // would look like a hang-up to the publisher.
    let _writer = writer;
    let mut received = 0u64;

    loop {
        tokio::select! {
            _ = stop.notified() => {
                debug!("Subscription closed locally");
                break;
            }
            frame = reader.read_frame() => match frame {
                Ok(Some(bytes)) => match tcpros_core::decode_body(&bytes, &shared.descriptor) {
                    Ok(instance) => {
                        received += 1;
                        if shared.events.send(SubscriberEvent::Message(instance)).await.is_err() {
                            debug!("Event receiver dropped, closing subscription");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to decode message");
                        let _ = shared.events.send(SubscriberEvent::Error(e.to_string())).await;
                    }
                },
                Ok(None) => {
                    debug!("Publisher closed the connection");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Subscription read failed");
                    let _ = shared.events.try_send(SubscriberEvent::Error(e.to_string()));
                    break;
                }
            },
        }
    }

    info!(received, "Disconnected from publisher");
    shared.state.send_replace(SubscriberState::Disconnected);
    shared.run_close_hook();
    let _ = shared.events.try_send(SubscriberEvent::Disconnected);
}
