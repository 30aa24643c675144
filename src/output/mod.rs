//! Output formatting for command reports.

pub mod json;
pub mod plain;

use crate::run::CommandReport;

/// Output format options.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Each command's stdout, concatenated in input order (default).
    #[default]
    Plain,
    /// JSON array of reports.
    Json,
}

/// Format and print command reports.
pub fn print_reports(reports: &[CommandReport], format: OutputFormat) {
    match format {
        OutputFormat::Plain => plain::print_plain(reports),
        OutputFormat::Json => json::print_json(reports),
    }
}
