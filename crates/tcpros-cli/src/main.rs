//! tcpros CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tcpros_core::{TracingConfig, TracingOutputFormat, init_tracing};
use tcpros_transport::SignalHandler;

use tcpros_cli::cli::{Cli, Command, ConfigAction};
use tcpros_cli::commands::echo::EchoOptions;
use tcpros_cli::commands::publish::PublishOptions;
use tcpros_cli::commands::{config, decode, echo, publish, show};
use tcpros_cli::{CliConfig, CliResult};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(tracing_config(&cli)) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn tracing_config(cli: &Cli) -> TracingConfig {
    let config = if cli.debug {
        let config = TracingConfig::cli_debug();
        let directive = config.default_directive();
        config.with_env_filter(directive)
    } else {
        TracingConfig::default()
    };
    if cli.json_logs {
        config.with_format(TracingOutputFormat::Json)
    } else {
        config
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(CliConfig::default_path);
    let config = match &cli.config {
        Some(path) => CliConfig::load_from(path)?,
        None => CliConfig::load()?,
    };

    let loader = tcpros_cli::loader(&config);
    let signals = SignalHandler::new();

    match cli.command {
        Command::Show { type_id } => show::run(&loader, &type_id).await,
        Command::Decode { type_id, file } => decode::run(&loader, &type_id, &file).await,
        Command::Publish {
            topic,
            type_id,
            message,
            rate,
            count,
            latch,
        } => {
            signals.spawn_listener()?;
            let mut config = config;
            config.publisher.latching |= latch;
            let node = tcpros_cli::node(&config, loader);
            let options = PublishOptions {
                topic,
                type_id,
                message,
                rate,
                count,
            };
            publish::run(&node, &options, signals.shutdown_handle()).await?;
            Ok(())
        }
        Command::Echo {
            topic,
            type_id,
            host,
            port,
            count,
        } => {
            signals.spawn_listener()?;
            let node = tcpros_cli::node(&config, loader);
            let options = EchoOptions {
                topic,
                type_id,
                host,
                port,
                count,
            };
            echo::run(&node, &options, signals.shutdown_handle(), &mut std::io::stdout().lock()).await?;
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => config::dump(&config, &config_path),
            ConfigAction::Path => config::path(&config_path),
        },
    }
}
