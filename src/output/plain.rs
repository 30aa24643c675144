//! Plain text output for command reports.

use crate::run::CommandReport;
use std::io::{self, Write};

/// Print each command's stdout in input order.
pub fn print_plain(reports: &[CommandReport]) {
    let stdout = io::stdout();
    let _ = write_plain(&mut stdout.lock(), reports);
}

/// Write each command's stdout, adding a newline where one is missing so
/// outputs from consecutive commands never run together.
pub fn write_plain(out: &mut impl Write, reports: &[CommandReport]) -> io::Result<()> {
    for report in reports {
        out.write_all(report.stdout.as_bytes())?;
        if !report.stdout.is_empty() && !report.stdout.ends_with('\n') {
            out.write_all(b"\n")?;
        }
    }
    out.flush()
}
