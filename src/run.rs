//! The `run` command: shell commands mapped over forked workers.

use anyhow::{Context, Result};
use forkpool::map::{MapOptions, map};
use forkpool::pool::JobFailure;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::process::Command;
use std::time::Instant;

/// Longest stderr excerpt carried in a failure payload.
const STDERR_EXCERPT: usize = 2048;

/// What one command produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReport {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Run every command in its own worker and return reports in input order.
pub fn run_commands(
    commands: Vec<String>,
    shell: &str,
    options: &MapOptions,
) -> forkpool::error::Result<Vec<CommandReport>> {
    map(commands, |command| run_one(shell, &command), options)
}

/// Runs inside a worker. A non-zero exit becomes a designated failure
/// `["exit", code, command, stderr]`.
fn run_one(shell: &str, command: &str) -> anyhow::Result<CommandReport> {
    let start = Instant::now();
    let output = Command::new(shell)
        .arg("-c")
        .arg(command)
        .output()
        .with_context(|| format!("failed to start {} for '{}'", shell, command))?;

    // Killed by a signal: no exit code, report it like the shell would
    let exit_code = output.status.code().unwrap_or(-1);
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(JobFailure::new([
            "exit".to_string(),
            exit_code.to_string(),
            command.to_string(),
            excerpt(&stderr, STDERR_EXCERPT).to_string(),
        ])
        .into());
    }

    Ok(CommandReport {
        command: command.to_string(),
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Read commands from `reader`, one per line, skipping blank lines.
pub fn read_commands(reader: impl BufRead) -> Result<Vec<String>> {
    let mut commands = Vec::new();
    for line in reader.lines() {
        let line = line.context("failed to read commands from stdin")?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            commands.push(trimmed.to_string());
        }
    }
    Ok(commands)
}

/// Last `max` bytes of `text`, cut on a char boundary.
fn excerpt(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
