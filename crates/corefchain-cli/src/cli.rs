//! CLI command definitions and argument parsing.

use crate::config::OutputFormat;
use clap::{ArgAction, Parser, Subcommand};
use corefchain_domain::{EntityCategory, Stage};
use std::path::PathBuf;

/// Corefchain - Resolve entity coreferences in legal narratives, one category at a time.
#[derive(Debug, Parser)]
#[command(name = "corefchain")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "COREFCHAIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
    /// Quiet format (one line per run)
    Quiet,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run stages of one category pass over a document
    Run(RunArgs),

    /// Run the whole category chain over a document
    Chain(ChainArgs),

    /// Show the run state of every category of a document
    Status(StatusArgs),

    /// Count the tokens of a file with the configured tokenizer
    Tokens(TokensArgs),

    /// Print the character length of every .txt file in a directory
    Lengths(LengthsArgs),

    /// Write a configuration file with every default spelled out
    InitConfig(InitConfigArgs),
}

/// Arguments for the run command.
#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Input text file (read only when the chunk stage runs)
    pub input: Option<PathBuf>,

    /// Entity category of the pass
    #[arg(long, value_parser = parse_category)]
    pub category: EntityCategory,

    /// Document identifier (defaults to the input file stem)
    #[arg(short = 'd', long)]
    pub document_id: Option<String>,

    /// Stages to run, comma separated
    #[arg(
        short,
        long,
        value_delimiter = ',',
        value_parser = parse_stage,
        default_value = "chunk,ner,coref,resolve"
    )]
    pub stages: Vec<Stage>,

    /// Write the rewritten document here once the resolve stage is committed
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the chain command.
#[derive(Debug, Parser)]
pub struct ChainArgs {
    /// Input text file
    pub input: PathBuf,

    /// Document identifier (defaults to the input file stem)
    #[arg(short = 'd', long)]
    pub document_id: Option<String>,

    /// Stages to run in every category, comma separated (must include resolve)
    #[arg(
        short,
        long,
        value_delimiter = ',',
        value_parser = parse_stage,
        default_value = "chunk,ner,coref,resolve"
    )]
    pub stages: Vec<Stage>,

    /// Output file for the final rewritten document
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the status command.
#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Document identifier
    #[arg(short = 'd', long)]
    pub document_id: String,
}

/// Arguments for the tokens command.
#[derive(Debug, Parser)]
pub struct TokensArgs {
    /// Text file to measure
    pub file: PathBuf,
}

/// Arguments for the lengths command.
#[derive(Debug, Parser)]
pub struct LengthsArgs {
    /// Directory holding .txt files
    pub dir: PathBuf,
}

/// Arguments for the init-config command.
#[derive(Debug, Parser)]
pub struct InitConfigArgs {
    /// Where to write the file (defaults to the configuration path)
    pub path: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

impl From<CliFormat> for OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => OutputFormat::Table,
            CliFormat::Json => OutputFormat::Json,
            CliFormat::Quiet => OutputFormat::Quiet,
        }
    }
}

fn parse_category(s: &str) -> Result<EntityCategory, String> {
    s.parse()
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    Stage::parse(s).ok_or_else(|| {
        format!(
            "unknown stage '{}' (expected one of chunk, ner, coref, resolve)",
            s
        )
    })
}
