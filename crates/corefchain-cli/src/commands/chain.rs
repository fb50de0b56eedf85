//! Chain command implementation.

use super::{build_orchestrator, document_id, write_output};
use crate::cli::ChainArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::Formatter;

/// Execute the chain command.
pub async fn execute_chain(args: ChainArgs, config: &Config, formatter: &Formatter) -> Result<()> {
    let document_id = document_id(args.document_id.as_deref(), Some(&args.input))?;
    let text = std::fs::read_to_string(&args.input)?;

    let orchestrator = build_orchestrator(config)?;
    let report = orchestrator
        .run_chain(&document_id, &text, &args.stages)
        .await?;
    println!("{}", formatter.format_chain_report(&report)?);

    match &args.output {
        Some(path) => {
            write_output(path, &report.output)?;
            eprintln!(
                "{}",
                formatter.success(&format!("Final document written to {}", path.display()))
            );
        }
        None => eprintln!(
            "{}",
            formatter.info("Final document kept in the run store (use --output to export it)")
        ),
    }

    Ok(())
}
