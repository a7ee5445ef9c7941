//! The `tcpros` command-line tool.
//!
//! Inspects message types, publishes JSON messages, echoes topics and
//! decodes captured stream chunks.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

use std::sync::Arc;

use tcpros_core::{MessageLoader, TypeRegistry};
use tcpros_transport::Node;

pub use cli::Cli;
pub use config::CliConfig;
pub use error::{CliError, CliResult};

/// Builds the loader described by `config`, backed by the global registry.
pub fn loader(config: &CliConfig) -> MessageLoader {
    MessageLoader::new(TypeRegistry::global(), Arc::new(config.resolver()))
}

/// Builds the node described by `config`.
pub fn node(config: &CliConfig, loader: MessageLoader) -> Node {
    Node::new(&config.node_name, loader)
        .with_publisher_config(config.publisher_config())
        .with_subscriber_config(config.subscriber_config())
}
