//! Subcommand implementations.

pub mod config;
pub mod decode;
pub mod echo;
pub mod publish;
pub mod show;
