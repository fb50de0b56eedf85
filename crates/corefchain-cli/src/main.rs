//! Corefchain CLI - Category-chained coreference resolution for legal narratives.

use clap::Parser;
use corefchain_cli::commands;
use corefchain_cli::cli::CliFormat;
use corefchain_cli::config::OutputFormat;
use corefchain_cli::{Cli, Command, Config, Formatter};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> corefchain_cli::Result<()> {
    let Cli {
        format,
        no_color,
        config,
        verbose,
        command,
    } = Cli::parse();
    init_tracing(verbose);
    let config = config.as_deref();

    match command {
        Command::Run(args) => {
            let (config, formatter) = configured(config, format, no_color)?;
            commands::execute_run(args, &config, &formatter).await
        }
        Command::Chain(args) => {
            let (config, formatter) = configured(config, format, no_color)?;
            commands::execute_chain(args, &config, &formatter).await
        }
        Command::Status(args) => {
            let (config, formatter) = configured(config, format, no_color)?;
            commands::execute_status(args, &config, &formatter)
        }
        Command::Tokens(args) => {
            let (config, formatter) = configured(config, format, no_color)?;
            commands::execute_tokens(args, &config, &formatter)
        }
        // These two never touch the pipeline configuration.
        Command::InitConfig(args) => {
            commands::execute_init_config(args, &Formatter::new(cli_format(format), !no_color))
        }
        Command::Lengths(args) => {
            commands::execute_lengths(args, &Formatter::new(cli_format(format), !no_color))
        }
    }
}

/// Load the configuration and build a formatter from its `[output]` settings.
fn configured(
    path: Option<&Path>,
    format: Option<CliFormat>,
    no_color: bool,
) -> corefchain_cli::Result<(Config, Formatter)> {
    let config = Config::load(path)?;
    let format = format.map(Into::into).unwrap_or(config.settings.format);
    let formatter = Formatter::new(format, !no_color && config.settings.color);
    Ok((config, formatter))
}

fn cli_format(format: Option<CliFormat>) -> OutputFormat {
    format.map(Into::into).unwrap_or(OutputFormat::Table)
}

/// Log to stderr; `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
