use crate::error::{ChatMatchError, Result};
use crate::reconciler::EntryFailure;
use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct PlaceholderOutcome {
    pub written: Vec<PathBuf>,
    pub failures: Vec<EntryFailure>,
    /// Rows whose file name had already been written in this run.
    pub overwritten: usize,
}

/// `<agent>_<customer_id>_<account_name>.xlsx`, made safe for the filesystem.
pub fn placeholder_file_name(agent: &str, customer_id: &str, account_name: &str) -> String {
    let stem = sanitize_filename(&format!("{}_{}_{}", agent, customer_id, account_name));
    format!("{}.xlsx", stem)
}

pub fn sanitize_filename(name: &str) -> String {
    let mut sanitized = String::new();

    for ch in name.chars() {
        match ch {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => sanitized.push('_'),
            '/' | '\\' => sanitized.push('_'),
            c if c.is_control() => sanitized.push('_'),
            c => sanitized.push(c),
        }
    }

    let sanitized = sanitized.trim_end_matches(&['.', ' '][..]).to_string();

    if sanitized.is_empty() {
        "unnamed_file".to_string()
    } else {
        sanitized
    }
}

/// Write one workbook with a single empty sheet.
pub fn write_placeholder(directory: &Path, file_name: &str) -> Result<PathBuf> {
    let path = directory.join(file_name);

    let mut workbook = Workbook::new();
    workbook.add_worksheet();
    workbook
        .save(&path)
        .map_err(|e| ChatMatchError::WriteFailure {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    Ok(path)
}

/// Write a placeholder per name. Failures are recorded and the batch continues.
pub fn write_placeholders<I>(
    directory: &Path,
    file_names: I,
    cancel: Option<&dyn Fn() -> bool>,
) -> Result<PlaceholderOutcome>
where
    I: IntoIterator<Item = String>,
{
    if !directory.is_dir() {
        return Err(ChatMatchError::InvalidOutputPath {
            path: directory.display().to_string(),
        });
    }

    let mut outcome = PlaceholderOutcome::default();
    let mut seen = std::collections::HashSet::new();

    for name in file_names {
        if cancel.is_some_and(|should_stop| should_stop()) {
            return Err(ChatMatchError::Cancelled);
        }

        if !seen.insert(name.clone()) {
            outcome.overwritten += 1;
        }

        match write_placeholder(directory, &name) {
            Ok(path) => {
                if !outcome.written.contains(&path) {
                    outcome.written.push(path);
                }
            }
            Err(error) => match EntryFailure::from_error(&error) {
                Some(failure) => outcome.failures.push(failure),
                None => return Err(error),
            },
        }
    }

    Ok(outcome)
}
