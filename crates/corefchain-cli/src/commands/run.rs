//! Run command implementation.

use super::{build_orchestrator, document_id, write_output};
use crate::cli::RunArgs;
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use corefchain_domain::{ArtifactKind, Document, RunKey, Stage};
use tracing::info;

/// Execute the run command.
pub async fn execute_run(args: RunArgs, config: &Config, formatter: &Formatter) -> Result<()> {
    let document_id = document_id(args.document_id.as_deref(), args.input.as_deref())?;

    // Later stages read the committed source, so the input is optional
    // unless the pass starts from scratch.
    let text = match &args.input {
        Some(path) => std::fs::read_to_string(path)?,
        None if args.stages.contains(&Stage::Chunk) => {
            return Err(CliError::InvalidInput(
                "the chunk stage needs an input file".to_string(),
            ))
        }
        None => String::new(),
    };

    let orchestrator = build_orchestrator(config)?;
    let document = Document::new(document_id.clone(), args.category, text);
    let report = orchestrator.run_category(&document, &args.stages).await?;
    println!("{}", formatter.format_category_report(&report)?);
    if report.failed_segments > 0 || report.failed_clusters > 0 {
        eprintln!(
            "{}",
            formatter.warning(&format!(
                "{} segment(s) and {} cluster(s) failed; their mentions keep their surface text",
                report.failed_segments, report.failed_clusters
            ))
        );
    }

    if let Some(path) = &args.output {
        let key = RunKey::new(document_id, args.category);
        let rewritten = orchestrator
            .artifact(&key, ArtifactKind::Rewritten)?
            .ok_or_else(|| {
                CliError::InvalidInput(format!(
                    "{} has no committed resolve stage to write to {}",
                    key,
                    path.display()
                ))
            })?;
        write_output(path, &rewritten)?;
        info!("Wrote {} bytes to {}", rewritten.len(), path.display());
        eprintln!(
            "{}",
            formatter.success(&format!("Rewritten document written to {}", path.display()))
        );
    }

    Ok(())
}
