//! Status command implementation.

use super::build_orchestrator;
use crate::cli::StatusArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::Formatter;

/// Execute the status command.
pub fn execute_status(args: StatusArgs, config: &Config, formatter: &Formatter) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let states = orchestrator.status(&args.document_id)?;
    println!("{}", formatter.format_states(&states)?);
    Ok(())
}
