//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use colored::*;
use corefchain_domain::RunState;
use corefchain_pipeline::{CategoryReport, ChainReport};
use serde::Serialize;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Character length of one file, as printed by `lengths`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLength {
    /// File name
    pub file: String,

    /// Length in characters
    pub chars: usize,
}

/// Size of one file in tokenizer units, as printed by `tokens`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenCount {
    /// File path
    pub file: String,

    /// Count
    pub count: usize,

    /// Unit of the count ("words", "tokens")
    pub unit: &'static str,
}

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Active output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Format the report of one category pass.
    pub fn format_category_report(&self, report: &CategoryReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            OutputFormat::Table => Ok(self.reports_table(std::slice::from_ref(report))),
            OutputFormat::Quiet => Ok(report_line(report)),
        }
    }

    /// Format the report of a category chain.
    pub fn format_chain_report(&self, report: &ChainReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            OutputFormat::Table => {
                let summary = format!(
                    "{}: {} mention(s) resolved, {} left unresolved",
                    report.document_id,
                    report.resolved(),
                    report.unresolved()
                );
                Ok(format!(
                    "{}\n{}",
                    self.reports_table(&report.categories),
                    self.info(&summary)
                ))
            }
            OutputFormat::Quiet => Ok(report
                .categories
                .iter()
                .map(report_line)
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    /// Format the run states of a document.
    pub fn format_states(&self, states: &[RunState]) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(states)?),
            OutputFormat::Table => Ok(self.states_table(states)),
            OutputFormat::Quiet => Ok(states
                .iter()
                .map(|s| format!("{}\t{}", s.key, s.status))
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    /// Format a token count.
    pub fn format_token_count(&self, count: &TokenCount) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(count)?),
            OutputFormat::Table => Ok(format!("{}: {} {}", count.file, count.count, count.unit)),
            OutputFormat::Quiet => Ok(count.count.to_string()),
        }
    }

    /// Format file lengths.
    pub fn format_lengths(&self, lengths: &[FileLength]) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(lengths)?),
            OutputFormat::Table => {
                if lengths.is_empty() {
                    return Ok(self.colorize("No .txt files found.", "yellow"));
                }
                let mut builder = Builder::default();
                builder.push_record(["File", "Characters"]);
                for entry in lengths {
                    builder.push_record([entry.file.clone(), entry.chars.to_string()]);
                }
                Ok(styled(builder))
            }
            OutputFormat::Quiet => Ok(lengths
                .iter()
                .map(|l| format!("{}\t{}", l.file, l.chars))
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    fn reports_table(&self, reports: &[CategoryReport]) -> String {
        if reports.is_empty() {
            return self.colorize("No categories ran.", "yellow");
        }

        let mut builder = Builder::default();
        builder.push_record([
            "Category",
            "Status",
            "Segments",
            "Mentions",
            "Resolved",
            "Unresolved",
            "Singleton",
            "Clusters (ok/rejected/failed)",
            "Time",
        ]);

        for report in reports {
            let segments = if report.failed_segments > 0 {
                format!("{} ({} failed)", report.segments, report.failed_segments)
            } else {
                report.segments.to_string()
            };
            let clusters = format!(
                "{}/{}/{}",
                report.confirmed, report.rejected, report.failed_clusters
            );
            builder.push_record([
                report.key.category.to_string(),
                report.status.to_string(),
                segments,
                report.mentions.to_string(),
                report.resolved.to_string(),
                report.unresolved.to_string(),
                report.singleton.to_string(),
                clusters,
                timings(report),
            ]);
        }

        styled(builder)
    }

    fn states_table(&self, states: &[RunState]) -> String {
        if states.is_empty() {
            return self.colorize("No runs recorded for this document.", "yellow");
        }

        let mut builder = Builder::default();
        builder.push_record(["Category", "Status", "Committed stages", "Updated"]);

        for state in states {
            let stages = state
                .stages
                .keys()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            builder.push_record([
                state.key.category.to_string(),
                state.status.to_string(),
                stages,
                state.updated_at.to_string(),
            ]);
        }

        styled(builder)
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.to_string(),
        }
    }
}

fn styled(builder: Builder) -> String {
    let mut table = builder.build();
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    table.to_string()
}

fn report_line(report: &CategoryReport) -> String {
    format!("{}\t{}", report.key, report.status)
}

fn timings(report: &CategoryReport) -> String {
    if report.timings.is_empty() {
        return "-".to_string();
    }
    let stages = report
        .timings
        .iter()
        .map(|t| format!("{} {}ms", t.stage, t.elapsed_ms))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} (total {}ms)", stages, report.total_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corefchain_domain::{EntityCategory, RunKey, RunStatus, Stage};
    use corefchain_pipeline::StageTiming;

    fn create_test_report(category: EntityCategory) -> CategoryReport {
        let mut report = CategoryReport::new(RunKey::new("case-1", category), RunStatus::Resolved);
        report.segments = 3;
        report.failed_segments = 1;
        report.mentions = 12;
        report.resolved = 9;
        report.unresolved = 2;
        report.singleton = 1;
        report.confirmed = 2;
        report.timings = vec![
            StageTiming {
                stage: Stage::Chunk,
                elapsed_ms: 4,
            },
            StageTiming {
                stage: Stage::Ner,
                elapsed_ms: 1200,
            },
        ];
        report.total_ms = 1204;
        report
    }

    #[test]
    fn test_table_format() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let output = formatter
            .format_category_report(&create_test_report(EntityCategory::Person))
            .unwrap();
        assert!(output.contains("Resolved"));
        assert!(output.contains("person"));
        assert!(output.contains("3 (1 failed)"));
        assert!(output.contains("ner 1200ms"));
    }

    #[test]
    fn test_json_format() {
        let formatter = Formatter::new(OutputFormat::Json, false);
        let output = formatter
            .format_category_report(&create_test_report(EntityCategory::Person))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["resolved"], 9);
        assert_eq!(value["key"]["document_id"], "case-1");
    }

    #[test]
    fn test_quiet_chain_format() {
        let formatter = Formatter::new(OutputFormat::Quiet, false);
        let report = ChainReport {
            document_id: "case-1".to_string(),
            categories: vec![
                create_test_report(EntityCategory::Person),
                create_test_report(EntityCategory::Location),
            ],
            output: "rewritten".to_string(),
        };
        let output = formatter.format_chain_report(&report).unwrap();
        assert_eq!(output.lines().count(), 2);
        assert!(output.starts_with("case-1/person\tresolved"));
        assert!(!output.contains("rewritten"));
    }

    #[test]
    fn test_empty_states() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let output = formatter.format_states(&[]).unwrap();
        assert!(output.contains("No runs recorded"));
    }

    #[test]
    fn test_token_count_formats() {
        let count = TokenCount {
            file: "case.txt".to_string(),
            count: 42,
            unit: "words",
        };
        let quiet = Formatter::new(OutputFormat::Quiet, false);
        assert_eq!(quiet.format_token_count(&count).unwrap(), "42");
        let table = Formatter::new(OutputFormat::Table, false);
        assert_eq!(table.format_token_count(&count).unwrap(), "case.txt: 42 words");
    }

    #[test]
    fn test_colorize_disabled() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let msg = formatter.success("test");
        assert_eq!(msg, "✓ test");
    }
}
