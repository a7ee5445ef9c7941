//! Publisher and subscriber sessions over TCP.
//!
//! This crate runs the session side of TCPROS:
//! - publishers bind the first free port, accept subscribers and fan out
//!   every published message through per-subscriber send queues
//! - subscribers connect, exchange headers and stream decoded messages
//! - a [`Node`] ties both to a caller id, a type loader and a session set
//!
//! # Example
//!
//! ```rust,no_run
//! use tcpros_transport::Node;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = Node::from_env("talker");
//!     let (publisher, _events) = node.advertise("chatter", "std_msgs/String").await?;
//!     let msg = publisher.descriptor().instance_with([("data", "hello")])?;
//!     publisher.publish(&msg)?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod node;
mod port;
mod publisher;
mod queue;
mod session;
mod signals;
mod subscriber;

pub use config::{DEFAULT_BASE_PORT, HOSTNAME_ENV, IP_ENV, OverflowPolicy, PublisherConfig, SubscriberConfig, default_host};
pub use error::{TransportError, TransportResult};
pub use node::{Node, normalize_name};
pub use port::bind_first_free;
pub use publisher::{Publisher, PublisherEvent, PublisherState};
pub use queue::{Frame, Push, SendQueue};
pub use session::{SessionInfo, SessionKind, SessionSet};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use subscriber::{Subscriber, SubscriberEvent, SubscriberState};
