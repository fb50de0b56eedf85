//! Tokens command implementation.

use crate::cli::TokensArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::{Formatter, TokenCount};
use corefchain_pipeline::counter_from_config;

/// Execute the tokens command.
pub fn execute_tokens(args: TokensArgs, config: &Config, formatter: &Formatter) -> Result<()> {
    let counter = counter_from_config(&config.pipeline.chunking.tokenizer, &config.base_dir)?;
    let text = std::fs::read_to_string(&args.file)?;

    let count = TokenCount {
        file: args.file.display().to_string(),
        count: counter.count(&text)?,
        unit: counter.unit(),
    };
    println!("{}", formatter.format_token_count(&count)?);
    Ok(())
}
