//! Publisher session: listen, accept subscribers, fan out messages.
//!
//! ```text
//! Unbound --start()--> PortSearching --bind--> Listening --shutdown()--> Closed
//! ```
//!
//! Every accepted socket becomes a link with its own bounded send queue.
//! A link reads the subscriber's header, answers with the publisher's header
//! and then writes queued frames until the subscriber leaves or the
//! publisher shuts down.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tcpros_core::{CodecError, MessageInstance, TypeDescriptor, codec};
use tcpros_protocol::{ConnectionHeader, FrameReader, FrameWriter};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::config::PublisherConfig;
use crate::error::{TransportError, TransportResult};
use crate::port::bind_first_free;
use crate::queue::{Frame, Push, SendQueue};
use crate::session::CloseHook;

/// Lifecycle of a publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Unbound,
    PortSearching,
    Listening(SocketAddr),
    Closed,
}

/// Things that happen to a publisher, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherEvent {
    Listening(SocketAddr),
    /// A subscriber completed the handshake.
    Connected {
        link: u64,
        peer: SocketAddr,
        caller_id: Option<String>,
    },
    Disconnected {
        link: u64,
        peer: SocketAddr,
    },
    Error {
        peer: Option<SocketAddr>,
        message: String,
    },
}

struct Link {
    id: u64,
    peer: SocketAddr,
    queue: Arc<SendQueue>,
}

#[derive(Default)]
struct Links {
    /// Registration order.
    list: Vec<Link>,
    /// Last published frame, kept when latching.
    latched: Option<Frame>,
}

struct Shared {
    caller_id: String,
    topic: String,
    descriptor: Arc<TypeDescriptor>,
    config: PublisherConfig,
    links: Mutex<Links>,
    next_link: AtomicU64,
    state: watch::Sender<PublisherState>,
    events: mpsc::Sender<PublisherEvent>,
}

impl Shared {
    fn links(&self) -> MutexGuard<'_, Links> {
        self.links.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: PublisherEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events.try_send(event) {
            trace!(?event, "Event channel full, dropping event");
        }
    }

    fn register(&self, peer: SocketAddr) -> (u64, Arc<SendQueue>) {
        let id = self.next_link.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SendQueue::new(self.config.queue_capacity, self.config.overflow));

        let mut links = self.links();
        if let Some(frame) = &links.latched {
            queue.push(frame.clone());
        }
        links.list.push(Link {
            id,
            peer,
            queue: queue.clone(),
        });
        (id, queue)
    }

    fn deregister(&self, id: u64) {
        self.links().list.retain(|link| link.id != id);
    }

    fn response_header(&self) -> ConnectionHeader {
        let header = ConnectionHeader::new()
            .with_caller_id(&self.caller_id)
            .with_topic(&self.topic)
            .with_descriptor(&self.descriptor);
        if self.config.latching {
            header.with_latching(true)
        } else {
            header
        }
    }
}

/// A topic being published.
///
/// Dropping the publisher shuts it down.
pub struct Publisher {
    shared: Arc<Shared>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    on_close: Mutex<Option<CloseHook>>,
}

impl Publisher {
    /// Creates an unbound publisher and the receiver for its events.
    pub fn new(
        caller_id: impl Into<String>,
        topic: impl Into<String>,
        descriptor: Arc<TypeDescriptor>,
        config: PublisherConfig,
    ) -> (Self, mpsc::Receiver<PublisherEvent>) {
        let (events, rx) = mpsc::channel(config.event_capacity.max(1));
        let (state, _) = watch::channel(PublisherState::Unbound);
        let shared = Arc::new(Shared {
            caller_id: caller_id.into(),
            topic: topic.into(),
            descriptor,
            config,
            links: Mutex::new(Links::default()),
            next_link: AtomicU64::new(0),
            state,
            events,
        });

        let publisher = Self {
            shared,
            accept_task: Mutex::new(None),
            on_close: Mutex::new(None),
        };
        (publisher, rx)
    }

    /// Binds a port and starts accepting subscribers.
    ///
    /// Returns the listening address; calling it again while listening
    /// returns the same address.
    pub async fn start(&self) -> TransportResult<SocketAddr> {
        let shared = &self.shared;
        match *shared.state.borrow() {
            PublisherState::Listening(addr) => return Ok(addr),
            PublisherState::Closed => return Err(TransportError::Closed),
            PublisherState::Unbound | PublisherState::PortSearching => {}
        }

        shared.state.send_replace(PublisherState::PortSearching);
        let config = &shared.config;
        let listener = match bind_first_free(&config.host, config.base_port, config.port_search_limit).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(topic = %shared.topic, error = %e, "Failed to bind publisher");
                shared.state.send_replace(PublisherState::Unbound);
                shared.emit(PublisherEvent::Error {
                    peer: None,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let addr = listener.local_addr()?;
        shared.state.send_replace(PublisherState::Listening(addr));
        info!(topic = %shared.topic, %addr, "Publisher listening");
        shared.emit(PublisherEvent::Listening(addr));

        let task = tokio::spawn(accept_loop(shared.clone(), listener));
        *self.accept_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        Ok(addr)
    }

    /// Sends a message to every connected subscriber.
    ///
    /// The message is validated and encoded once; the same buffer is queued
    /// on every link in registration order. Returns how many links it was
    /// queued on.
    pub fn publish(&self, instance: &MessageInstance) -> TransportResult<usize> {
        let shared = &self.shared;
        if *shared.state.borrow() == PublisherState::Closed {
            return Err(TransportError::Closed);
        }

        shared
            .descriptor
            .validate(instance, true)
            .map_err(CodecError::from)?;
        let frame: Frame = codec::encode(instance, &shared.descriptor)?.into();

        let mut reached = 0;
        let mut overflowed = Vec::new();
        {
            let mut links = shared.links();
            if shared.config.latching {
                links.latched = Some(frame.clone());
            }
            for link in &links.list {
                match link.queue.push(frame.clone()) {
                    Push::Queued => reached += 1,
                    Push::DroppedOldest => {
                        reached += 1;
                        debug!(peer = %link.peer, "Send queue full, dropped oldest frame");
                    }
                    Push::Overflow => overflowed.push(link.peer),
                    Push::Closed => {}
                }
            }
        }

        for peer in overflowed {
            warn!(topic = %shared.topic, %peer, "Send queue full, disconnecting subscriber");
        }
        trace!(topic = %shared.topic, reached, bytes = frame.len(), "Published message");
        Ok(reached)
    }

    /// Stops accepting, closes every link and runs the close hook.
    pub fn shutdown(&self) {
        if let Some(task) = self.accept_task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }

        let links = std::mem::take(&mut self.shared.links().list);
        for link in &links {
            link.queue.close();
        }

        let previous = self.shared.state.send_replace(PublisherState::Closed);
        if previous != PublisherState::Closed {
            info!(topic = %self.shared.topic, links = links.len(), "Publisher shut down");
        }

        if let Some(hook) = self.on_close.lock().unwrap_or_else(|e| e.into_inner()).take() {
            hook();
        }
    }

    /// Registers a callback run once when the publisher shuts down.
    pub fn on_close(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_close.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(hook));
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

    pub fn state(&self) -> PublisherState {
        *self.shared.state.borrow()
    }

    /// Returns a receiver that observes state changes.
    pub fn watch_state(&self) -> watch::Receiver<PublisherState> {
        self.shared.state.subscribe()
    }

    /// Listening address, once bound.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        match self.state() {
            PublisherState::Listening(addr) => Some(addr),
            _ => None,
        }
    }

    /// Number of registered links.
    pub fn link_count(&self) -> usize {
        self.shared.links().list.len()
    }

    /// Peer addresses of the registered links, in registration order.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.shared.links().list.iter().map(|l| l.peer).collect()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                }
                let (id, queue) = shared.register(peer);
                debug!(topic = %shared.topic, %peer, link = id, "Accepted subscriber");

                let span = info_span!("link", topic = %shared.topic, %peer, link = id);
                tokio::spawn(serve_link(shared.clone(), stream, id, peer, queue).instrument(span));
            }
            Err(e) => {
                error!(topic = %shared.topic, error = %e, "Failed to accept connection");
                shared.emit(PublisherEvent::Error {
                    peer: None,
                    message: e.to_string(),
                });
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn serve_link(shared: Arc<Shared>, stream: TcpStream, id: u64, peer: SocketAddr, queue: Arc<SendQueue>) {
    // Closing the queue ends the link even mid-handshake or mid-write.
    let result = tokio::select! {
        result = run_link(&shared, stream, id, peer, &queue) => result,
        () = queue.closed() => Ok(()),
    };
    let result = if queue.overflowed() {
        Err(TransportError::QueueOverflow {
            capacity: shared.config.queue_capacity.max(1),
        })
    } else {
        result
    };
    shared.deregister(id);
    queue.close();

    if let Err(e) = result {
        warn!(error = %e, "Subscriber link failed");
        shared.emit(PublisherEvent::Error {
            peer: Some(peer),
            message: e.to_string(),
        });
    }
    debug!("Subscriber disconnected");
    shared.emit(PublisherEvent::Disconnected { link: id, peer });
}

async fn run_link(
    shared: &Shared,
    stream: TcpStream,
    id: u64,
    peer: SocketAddr,
    queue: &SendQueue,
) -> TransportResult<()> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    let request = tokio::time::timeout(shared.config.handshake_timeout, reader.read_header())
        .await
        .map_err(|_| TransportError::timeout("subscriber handshake"))??;

    let digest = shared.descriptor.digest();
    if !request.check_digest(digest) {
        return Err(TransportError::digest_mismatch(digest, request.md5sum.as_deref()));
    }

    writer.write_header(&shared.response_header()).await?;
    info!(caller_id = request.caller_id.as_deref().unwrap_or("?"), "Subscriber connected");
    shared.emit(PublisherEvent::Connected {
        link: id,
        peer,
        caller_id: request.caller_id,
    });

    // Subscribers send nothing after their header; reading only detects EOF.
    let mut read_half = reader.into_inner();
    let mut scratch = [0u8; 512];
    loop {
        tokio::select! {
            frame = queue.pop() => match frame {
                Some(frame) => writer.write_encoded(&frame).await?,
                None => return Ok(()),
            },
            read = read_half.read(&mut scratch) => match read? {
                0 => return Ok(()),
                n => trace!(bytes = n, "Ignoring data from subscriber"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use tcpros_core::Value;
    use tokio::io::AsyncWriteExt;

    fn descriptor() -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor::from_text("std_msgs/String", "string data\n", |_| None).unwrap())
    }

    fn config() -> PublisherConfig {
        PublisherConfig::default().with_host("127.0.0.1").with_base_port(0)
    }

    async fn next_event(events: &mut mpsc::Receiver<PublisherEvent>) -> PublisherEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn handshake(addr: SocketAddr, md5sum: &str) -> (FrameReader<tokio::net::tcp::OwnedReadHalf>, FrameWriter<tokio::net::tcp::OwnedWriteHalf>) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        let mut writer = FrameWriter::new(write_half);
        writer
            .write_header(
                &ConnectionHeader::new()
                    .with_caller_id("/listener")
                    .with_topic("/chatter")
                    .with_type("std_msgs/String")
                    .with_md5sum(md5sum),
            )
            .await
            .unwrap();
        (FrameReader::new(read_half), writer)
    }

    fn message(d: &TypeDescriptor, text: &str) -> MessageInstance {
        d.instance_with([("data", text)]).unwrap()
    }

    #[tokio::test]
    async fn state_moves_to_listening() {
        let (publisher, mut events) = Publisher::new("/talker", "/chatter", descriptor(), config());
        assert_eq!(publisher.state(), PublisherState::Unbound);
        assert_eq!(publisher.endpoint(), None);

        let addr = publisher.start().await.unwrap();
        assert_eq!(publisher.state(), PublisherState::Listening(addr));
        assert_eq!(publisher.start().await.unwrap(), addr);
        assert_eq!(next_event(&mut events).await, PublisherEvent::Listening(addr));

        publisher.shutdown();
        assert_eq!(publisher.state(), PublisherState::Closed);
        assert!(matches!(publisher.start().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn answers_the_handshake_and_streams_messages() {
        let d = descriptor();
        let (publisher, mut events) = Publisher::new("/talker", "/chatter", d.clone(), config());
        let addr = publisher.start().await.unwrap();
        next_event(&mut events).await;

        let (mut reader, _writer) = handshake(addr, d.digest()).await;
        let header = reader.read_header().await.unwrap();
        assert_eq!(header.caller_id.as_deref(), Some("/talker"));
        assert_eq!(header.topic.as_deref(), Some("/chatter"));
        assert_eq!(header.type_name.as_deref(), Some("std_msgs/String"));
        assert_eq!(header.md5sum.as_deref(), Some(d.digest()));
        assert_eq!(header.latching, None);

        match next_event(&mut events).await {
            PublisherEvent::Connected { caller_id, .. } => assert_eq!(caller_id.as_deref(), Some("/listener")),
            other => panic!("unexpected event: {other:?}"),
        }

        assert_eq!(publisher.publish(&message(&d, "hello")).unwrap(), 1);
        let received = reader.read_message(&d).await.unwrap().unwrap();
        assert_eq!(received.get("data"), Some(&Value::String("hello".into())));
    }

    #[tokio::test]
    async fn fan_out_writes_one_identical_frame_per_link_in_registration_order() {
        let d = descriptor();
        let (publisher, mut events) = Publisher::new("/talker", "/chatter", d.clone(), config());
        let addr = publisher.start().await.unwrap();
        next_event(&mut events).await;

        let mut readers = Vec::new();
        let mut writers = Vec::new();
        let mut locals = Vec::new();
        for _ in 0..3 {
            let (mut reader, writer) = handshake(addr, d.digest()).await;
            reader.read_header().await.unwrap();
            assert!(matches!(next_event(&mut events).await, PublisherEvent::Connected { .. }));
            locals.push(reader.get_ref().local_addr().unwrap());
            readers.push(reader);
            writers.push(writer);
        }
        assert_eq!(publisher.peers(), locals);

        let msg = message(&d, "once");
        let expected = codec::encode(&msg, &d).unwrap();
        assert_eq!(publisher.publish(&msg).unwrap(), 3);

        for reader in &mut readers {
            let payload = reader.read_frame().await.unwrap().unwrap();
            assert_eq!(payload, expected[codec::LENGTH_PREFIX..]);
        }
        for reader in &mut readers {
            let second = tokio::time::timeout(Duration::from_millis(100), reader.read_frame()).await;
            assert!(second.is_err(), "unexpected second frame");
        }
    }

    #[tokio::test]
    async fn digest_mismatch_drops_the_link() {
        let d = descriptor();
        let (publisher, mut events) = Publisher::new("/talker", "/chatter", d.clone(), config());
        let addr = publisher.start().await.unwrap();
        next_event(&mut events).await;

        let (mut reader, _writer) = handshake(addr, "0000").await;
        match next_event(&mut events).await {
            PublisherEvent::Error { message, .. } => assert!(message.contains("digest mismatch")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(next_event(&mut events).await, PublisherEvent::Disconnected { .. }));
        assert!(reader.read_frame().await.unwrap().is_none());
        assert_eq!(publisher.link_count(), 0);
    }

    #[tokio::test]
    async fn wildcard_digest_is_accepted() {
        let d = descriptor();
        let (publisher, mut events) = Publisher::new("/talker", "/chatter", d, config());
        let addr = publisher.start().await.unwrap();
        next_event(&mut events).await;

        let (mut reader, _writer) = handshake(addr, "*").await;
        assert!(reader.read_header().await.is_ok());
        assert!(matches!(next_event(&mut events).await, PublisherEvent::Connected { .. }));
    }

    #[tokio::test]
    async fn silent_subscriber_times_out() {
        let config = config().with_handshake_timeout(Duration::from_millis(50));
        let (publisher, mut events) = Publisher::new("/talker", "/chatter", descriptor(), config);
        let addr = publisher.start().await.unwrap();
        next_event(&mut events).await;

        let _stream = TcpStream::connect(addr).await.unwrap();
        match next_event(&mut events).await {
            PublisherEvent::Error { message, .. } => assert!(message.contains("timeout")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn latched_message_is_replayed() {
        let d = descriptor();
        let config = config().with_latching(true);
        let (publisher, mut events) = Publisher::new("/talker", "/chatter", d.clone(), config);
        let addr = publisher.start().await.unwrap();
        next_event(&mut events).await;

        assert_eq!(publisher.publish(&message(&d, "first")).unwrap(), 0);
        assert_eq!(publisher.publish(&message(&d, "latest")).unwrap(), 0);

        let (mut reader, _writer) = handshake(addr, d.digest()).await;
        let header = reader.read_header().await.unwrap();
        assert!(header.is_latching());
        let replayed = reader.read_message(&d).await.unwrap().unwrap();
        assert_eq!(replayed.get("data"), Some(&Value::String("latest".into())));
    }

    #[tokio::test]
    async fn subscriber_leaving_is_reported() {
        let d = descriptor();
        let (publisher, mut events) = Publisher::new("/talker", "/chatter", d.clone(), config());
        let addr = publisher.start().await.unwrap();
        next_event(&mut events).await;

        let (mut reader, mut writer) = handshake(addr, d.digest()).await;
        reader.read_header().await.unwrap();
        assert!(matches!(next_event(&mut events).await, PublisherEvent::Connected { .. }));
        assert_eq!(publisher.link_count(), 1);

        writer.get_mut().shutdown().await.unwrap();
        assert!(matches!(next_event(&mut events).await, PublisherEvent::Disconnected { .. }));
        assert_eq!(publisher.link_count(), 0);
        assert_eq!(publisher.publish(&message(&d, "nobody")).unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_messages_are_rejected() {
        let d = descriptor();
        let (publisher, _events) = Publisher::new("/talker", "/chatter", d.clone(), config());
        let bad = MessageInstance::new("std_msgs/String").with("data", 5i32);
        assert!(matches!(publisher.publish(&bad), Err(TransportError::Codec(_))));
        let unknown = message(&d, "x").with("extra", true);
        assert!(publisher.publish(&unknown).is_err());
    }

    #[tokio::test]
    async fn overflow_policy_disconnect() {
        let d = descriptor();
        let config = config()
            .with_queue_capacity(1)
            .with_overflow(OverflowPolicy::Disconnect)
            .with_handshake_timeout(Duration::from_secs(5));
        let (publisher, mut events) = Publisher::new("/talker", "/chatter", d.clone(), config);
        let addr = publisher.start().await.unwrap();
        next_event(&mut events).await;

        // Connected but never completes the handshake, so nothing is drained.
        let _stream = TcpStream::connect(addr).await.unwrap();
        while publisher.link_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(publisher.publish(&message(&d, "a")).unwrap(), 1);
        assert_eq!(publisher.publish(&message(&d, "b")).unwrap(), 0);

        // The link is dropped without waiting for the handshake timeout.
        let mut seen = Vec::new();
        loop {
            let event = next_event(&mut events).await;
            let done = matches!(event, PublisherEvent::Disconnected { .. });
            seen.push(event);
            if done {
                break;
            }
        }
        assert!(matches!(
            &seen[..],
            [PublisherEvent::Error { message, .. }, PublisherEvent::Disconnected { .. }]
                if message.contains("overflowed")
        ));
        assert_eq!(publisher.link_count(), 0);
    }

    #[tokio::test]
    async fn stalled_reader_is_disconnected_on_overflow() {
        let d = descriptor();
        let config = config()
            .with_queue_capacity(1)
            .with_overflow(OverflowPolicy::Disconnect);
        let (publisher, mut events) = Publisher::new("/talker", "/chatter", d.clone(), config);
        let addr = publisher.start().await.unwrap();
        next_event(&mut events).await;

        // Handshakes, then never reads, so the link blocks writing once the
        // socket buffers fill.
        let (_reader, _writer) = handshake(addr, d.digest()).await;
        assert!(matches!(next_event(&mut events).await, PublisherEvent::Connected { .. }));

        let big = message(&d, &"x".repeat(1 << 20));
        let mut overflowed = false;
        for _ in 0..500 {
            if publisher.publish(&big).unwrap() == 0 {
                overflowed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(overflowed, "send queue never filled");

        loop {
            match next_event(&mut events).await {
                PublisherEvent::Disconnected { .. } => break,
                PublisherEvent::Error { message, .. } => assert!(message.contains("overflowed")),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(publisher.link_count(), 0);
        assert!(publisher.peers().is_empty());
    }

    #[tokio::test]
    async fn close_hook_runs_once() {
        let (publisher, _events) = Publisher::new("/talker", "/chatter", descriptor(), config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        publisher.on_close(move || {
            let _ = tx.send(());
        });
        publisher.shutdown();
        drop(publisher);
        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(rx.recv().await, None);
    }
}
