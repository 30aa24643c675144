//! JSON output for command reports.

use crate::run::CommandReport;

/// Print command reports as a JSON array.
pub fn print_json(reports: &[CommandReport]) {
    let json = serde_json::to_string_pretty(reports).unwrap_or_else(|_| "[]".to_string());
    println!("{}", json);
}
