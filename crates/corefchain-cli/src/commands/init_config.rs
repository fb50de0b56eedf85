//! Init-config command implementation.

use crate::cli::InitConfigArgs;
use crate::config::{write_default, Config};
use crate::error::Result;
use crate::output::Formatter;

/// Execute the init-config command.
pub fn execute_init_config(args: InitConfigArgs, formatter: &Formatter) -> Result<()> {
    let path = match args.path {
        Some(path) => path,
        None => Config::path()?,
    };
    write_default(&path, args.force)?;
    println!(
        "{}",
        formatter.success(&format!("Configuration written to {}", path.display()))
    );
    Ok(())
}
