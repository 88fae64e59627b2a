//! Tabular-text decoder for `netstat` output
//!
//! # Example Output
//!
//! ```text
//! Active Internet connections (w/o servers)
//! Proto Recv-Q Send-Q Local Address           Foreign Address         State
//! tcp        0      0 192.168.21.201:22       192.168.18.160:55584    ESTABLISHED
//! tcp6       0      0 ::1:631                 ::1:50112               TIME_WAIT
//! ```
//!
//! # Why Not split_whitespace() on the Header?
//!
//! Header labels contain spaces ("Local Address"), so the header is split
//! by column position instead: a space in the header only ends a label if
//! the same column is blank in every data row too.

use crate::error::{ConnstatError, Result};
use crate::{NETSTAT_ARGS, NETSTAT_LOCALE};
use serde::Serialize;
use std::process::{Command, Stdio};
use tracing::debug;

/// Header of the protocol column
pub const PROTO_COLUMN: &str = "Proto";

/// Header of the state column
pub const STATE_COLUMN: &str = "State";

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// One data row of netstat output, keyed by header label
///
/// Columns keep their header order. The `Proto` value is already
/// normalized (see [`normalize_protocol`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetstatRow {
    columns: Vec<(String, String)>,
}

impl NetstatRow {
    #[must_use]
    pub fn new(columns: Vec<(String, String)>) -> Self {
        Self { columns }
    }

    /// Value of the column with the given header label
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn protocol_label(&self) -> Option<&str> {
        self.get(PROTO_COLUMN)
    }

    #[must_use]
    pub fn state_label(&self) -> Option<&str> {
        self.get(STATE_COLUMN)
    }

    /// `(header, value)` pairs in header order
    #[must_use]
    pub fn columns(&self) -> &[(String, String)] {
        &self.columns
    }
}

// ============================================================================
// INVOCATION
// ============================================================================

/// Run the connection-listing program and capture its output
///
/// The child gets numeric addresses, wide columns and both address
/// families, under the C locale so the header is always in English.
///
/// # Errors
///
/// `CommandExecution` if the program cannot be started or exits non-zero.
pub fn run_netstat(program: &str) -> Result<String> {
    let output = Command::new(program)
        .args(NETSTAT_ARGS)
        .env("LC_ALL", NETSTAT_LOCALE)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| ConnstatError::CommandExecution {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ConnstatError::CommandExecution {
            program: program.to_string(),
            reason: format!("{} ({})", output.status, stderr.trim()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ============================================================================
// PARSING
// ============================================================================

/// Map netstat's generic protocol labels onto the versioned ones
///
/// netstat prints `tcp`/`udp` for IPv4 sockets. This is an approximation:
/// the label does not strictly guarantee the family, and it is kept as is.
#[inline]
#[must_use]
pub fn normalize_protocol(label: &str) -> &str {
    match label {
        "tcp" => "tcp4",
        "udp" => "udp4",
        other => other,
    }
}

/// True if column `index` holds whitespace (or nothing) in every row
fn is_gutter(index: usize, rows: &[&str]) -> bool {
    rows.iter().all(|row| {
        row.chars()
            .nth(index)
            .is_none_or(char::is_whitespace)
    })
}

/// Split the header row into labels using the data rows' column gutters
///
/// === WHAT THIS DOES ===
/// Scans the header one character at a time. Whitespace ends the current
/// label only when that column is whitespace in every data row as well;
/// otherwise it belongs to the label.
///
/// ```text
/// Proto Recv-Q Send-Q Local Address           Foreign Address         State
/// tcp        0      0 192.168.21.201:22       192.168.18.160:55584    ESTABLISHED
/// ```
///
/// The space inside "Local Address" sits over the address digits of the
/// row, so it stays part of the label.
///
/// === PARAMETERS ===
/// * `header` - the trimmed header line
/// * `rows` - the trimmed data lines; rows shorter than a column count as
///   blank there
///
/// === RETURN TYPE ===
/// Labels in column order, trimmed, never empty. With no data rows every
/// space is a gutter.
#[must_use]
pub fn tokenize_header(header: &str, rows: &[&str]) -> Vec<String> {
    let mut labels = Vec::new();
    let mut current = String::new();

    for (index, c) in header.chars().enumerate() {
        if c.is_whitespace() && is_gutter(index, rows) {
            let label = current.trim();
            if !label.is_empty() {
                labels.push(label.to_string());
            }
            current.clear();
        } else {
            current.push(c);
        }
    }

    let label = current.trim();
    if !label.is_empty() {
        labels.push(label.to_string());
    }
    labels
}

/// Split a data row on spaces, dropping empty tokens
fn tokenize_row(row: &str) -> Vec<&str> {
    row.split(' ').filter(|token| !token.is_empty()).collect()
}

/// Parse the captured output of [`run_netstat`] into rows
///
/// 1. Keep trimmed, non-empty lines
/// 2. Drop the banner line; the next line is the header
/// 3. Tokenize the header against the data rows' gutters
/// 4. Zip every data row with the header labels
/// 5. Normalize the protocol column
///
/// # Errors
///
/// - `TooFewLines` if there is no header line
/// - `ColumnCountMismatch` if any row has a different column count than
///   the header; the column model is then wrong for the whole output
pub fn parse_netstat_output(output: &str) -> Result<Vec<NetstatRow>> {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() < 2 {
        return Err(ConnstatError::TooFewLines(lines.len()));
    }

    let header = lines[1];
    let data = &lines[2..];
    let labels = tokenize_header(header, data);
    debug!(columns = ?labels, rows = data.len(), "parsed netstat header");

    let mut rows = Vec::with_capacity(data.len());
    for line in data {
        let tokens = tokenize_row(line);
        if tokens.len() != labels.len() {
            return Err(ConnstatError::ColumnCountMismatch {
                expected: labels.len(),
                found: tokens.len(),
                row: (*line).to_string(),
            });
        }

        let columns = labels
            .iter()
            .zip(tokens)
            .map(|(label, value)| {
                let value = if label == PROTO_COLUMN {
                    normalize_protocol(value)
                } else {
                    value
                };
                (label.clone(), value.to_string())
            })
            .collect();
        rows.push(NetstatRow::new(columns));
    }

    Ok(rows)
}
