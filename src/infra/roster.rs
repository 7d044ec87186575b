//! Roster file loading.
//!
//! One account per line: `identifier credential`, separated by whitespace.
//! Blank lines and lines starting with `#` are ignored.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::core::{Account, SchedulerError};

/// Parse roster text.
///
/// # Errors
///
/// Returns `SchedulerError::Roster` for a line without a credential or a
/// duplicated identifier.
pub fn parse_roster(text: &str) -> Result<Vec<Account>, SchedulerError> {
    let mut seen = HashSet::new();
    let mut accounts = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(identifier), Some(credential)) = (parts.next(), parts.next()) else {
            return Err(SchedulerError::Roster(format!(
                "line {}: expected `identifier credential`",
                number + 1
            )));
        };
        if parts.next().is_some() {
            warn!(line = number + 1, "extra fields on roster line ignored");
        }
        if !seen.insert(identifier.to_string()) {
            return Err(SchedulerError::Roster(format!(
                "line {}: duplicate account {identifier}",
                number + 1
            )));
        }
        accounts.push(Account::new(identifier, credential));
    }
    Ok(accounts)
}

/// Read and parse a roster file.
///
/// # Errors
///
/// Returns `SchedulerError::Roster` when the file cannot be read, is
/// malformed, or holds no accounts.
pub fn load_roster(path: &Path) -> Result<Vec<Account>, SchedulerError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SchedulerError::Roster(format!("{}: {e}", path.display())))?;
    let accounts = parse_roster(&text)?;
    if accounts.is_empty() {
        return Err(SchedulerError::Roster(format!("{}: no accounts", path.display())));
    }
    info!(path = %path.display(), accounts = accounts.len(), "roster loaded");
    Ok(accounts)
}
