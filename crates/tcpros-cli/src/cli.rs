//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// tcpros - publish, echo and inspect TCPROS topics
#[derive(Debug, Parser)]
#[command(name = "tcpros")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "TCPROS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show a message type: digest, fields and accessors
    Show {
        /// Message type, e.g. std_msgs/String
        type_id: String,
    },

    /// Advertise a topic and publish a JSON message on it
    #[command(name = "pub")]
    Publish {
        topic: String,

        type_id: String,

        /// Message as a JSON object; omitted fields keep their defaults
        #[arg(default_value = "{}")]
        message: String,

        /// Publish rate in Hz
        #[arg(long, short, default_value_t = 1.0)]
        rate: f64,

        /// Stop after this many messages
        #[arg(long, short = 'n')]
        count: Option<u64>,

        /// Latch the last message for late subscribers
        #[arg(long)]
        latch: bool,
    },

    /// Subscribe to a publisher and print messages as JSON
    Echo {
        topic: String,

        type_id: String,

        /// Publisher host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Publisher port
        #[arg(long, short)]
        port: u16,

        /// Stop after this many messages
        #[arg(long, short = 'n')]
        count: Option<u64>,
    },

    /// Decode a captured chunk of a TCPROS stream
    Decode {
        type_id: String,

        /// File holding the raw bytes
        file: PathBuf,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_pub() {
        let cli = Cli::try_parse_from([
            "tcpros", "pub", "/chatter", "std_msgs/String", r#"{"data":"hi"}"#, "--rate", "10", "-n", "3",
        ])
        .unwrap();
        match cli.command {
            Command::Publish {
                topic,
                message,
                rate,
                count,
                latch,
                ..
            } => {
                assert_eq!(topic, "/chatter");
                assert_eq!(message, r#"{"data":"hi"}"#);
                assert_eq!(rate, 10.0);
                assert_eq!(count, Some(3));
                assert!(!latch);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn echo_requires_a_port() {
        assert!(Cli::try_parse_from(["tcpros", "echo", "/chatter", "std_msgs/String"]).is_err());
        let cli = Cli::try_parse_from(["tcpros", "echo", "/chatter", "std_msgs/String", "-p", "9000"]).unwrap();
        assert!(matches!(cli.command, Command::Echo { port: 9000, ref host, .. } if host == "127.0.0.1"));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tcpros", "config", "path", "--debug"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Command::Config { action: ConfigAction::Path }));
    }
}
