use crate::archive::ArchiveEntry;
use crate::error::{ChatMatchError, Result};
use crate::matcher::KeySet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

/// Run-scoped match counters. `matched + unmatched == total_considered`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTally {
    pub matched: usize,
    pub unmatched: usize,
    pub total_considered: usize,
    /// Entries whose output name was already written earlier in the run.
    pub overwritten: usize,
}

impl MatchTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_match(&mut self) {
        self.matched += 1;
        self.total_considered += 1;
    }

    pub fn record_miss(&mut self) {
        self.unmatched += 1;
        self.total_considered += 1;
    }

    pub fn is_consistent(&self) -> bool {
        self.matched + self.unmatched == self.total_considered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ArchiveCorrupt,
    WriteFailure,
}

/// One archive entry or output record that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFailure {
    pub kind: FailureKind,
    pub subject: String,
    pub message: String,
}

impl EntryFailure {
    /// `None` for errors that must abort the run instead.
    pub fn from_error(error: &ChatMatchError) -> Option<Self> {
        match error {
            ChatMatchError::ArchiveCorrupt { archive, message } => Some(Self {
                kind: FailureKind::ArchiveCorrupt,
                subject: archive.clone(),
                message: message.clone(),
            }),
            ChatMatchError::WriteFailure { path, message } => Some(Self {
                kind: FailureKind::WriteFailure,
                subject: path.clone(),
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            FailureKind::ArchiveCorrupt => "corrupt archive",
            FailureKind::WriteFailure => "write failed",
        };
        write!(f, "{} ({}): {}", self.subject, kind, self.message)
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileProgress {
    pub entries_processed: usize,
    pub bytes_written: u64,
    pub current_entry: Option<String>,
    pub start_time: Instant,
    pub errors: usize,
}

impl ReconcileProgress {
    pub fn new() -> Self {
        Self {
            entries_processed: 0,
            bytes_written: 0,
            current_entry: None,
            start_time: Instant::now(),
            errors: 0,
        }
    }

    pub fn update_entry(&mut self, name: String, bytes: u64) {
        self.entries_processed += 1;
        self.bytes_written += bytes;
        self.current_entry = Some(name);
    }

    pub fn add_error(&mut self) {
        self.entries_processed += 1;
        self.errors += 1;
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for ReconcileProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub failures: Vec<EntryFailure>,
    /// Distinct output files, in first-write order.
    pub written: Vec<PathBuf>,
    pub bytes_written: u64,
    pub elapsed: Duration,
}

pub struct Reconciler<'a> {
    keys: &'a KeySet,
    destination: PathBuf,
    content_extension: String,
    match_stem: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new<P: Into<PathBuf>>(keys: &'a KeySet, destination: P, content_extension: &str) -> Self {
        Self {
            keys,
            destination: destination.into(),
            content_extension: content_extension.trim().trim_start_matches('.').to_string(),
            match_stem: false,
        }
    }

    /// Compare the nested archive's stem instead of the output name. Used when
    /// keys are derived without a suffix.
    pub fn with_stem_matching(mut self, match_stem: bool) -> Self {
        self.match_stem = match_stem;
        self
    }

    /// Write every entry under its derived name and tally it against the key set.
    ///
    /// Entry-level failures are collected and processing continues. `cancel`
    /// is polled before each entry; files already written are kept.
    pub fn reconcile<I>(
        &self,
        entries: I,
        tally: &mut MatchTally,
        progress_callback: Option<&dyn Fn(&ReconcileProgress)>,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<ReconcileOutcome>
    where
        I: IntoIterator<Item = Result<ArchiveEntry>>,
    {
        if !self.destination.is_dir() {
            return Err(ChatMatchError::InvalidOutputPath {
                path: self.destination.display().to_string(),
            });
        }

        let mut progress = ReconcileProgress::new();
        let mut outcome = ReconcileOutcome::default();
        let mut written_names: HashSet<String> = HashSet::new();
        let mut matched_names: HashSet<String> = HashSet::new();

        for item in entries {
            if cancel.is_some_and(|should_stop| should_stop()) {
                return Err(ChatMatchError::Cancelled);
            }

            let entry = match item {
                Ok(entry) => entry,
                Err(error) => {
                    let failure = EntryFailure::from_error(&error).ok_or(error)?;
                    tally.record_miss();
                    progress.add_error();
                    outcome.failures.push(failure);
                    if let Some(callback) = progress_callback {
                        callback(&progress);
                    }
                    continue;
                }
            };

            let output_name = entry.output_name(&self.content_extension);

            if written_names.contains(&output_name) {
                tally.overwritten += 1;
            }

            match self.write_entry(&entry, &output_name) {
                Ok(path) => {
                    outcome.bytes_written += entry.size();
                    progress.update_entry(output_name.clone(), entry.size());
                    if written_names.insert(output_name.clone()) {
                        outcome.written.push(path);
                    }
                }
                Err(error) => {
                    progress.add_error();
                    outcome.failures.push(EntryFailure::from_error(&error).unwrap_or(
                        EntryFailure {
                            kind: FailureKind::WriteFailure,
                            subject: output_name.clone(),
                            message: error.to_string(),
                        },
                    ));
                }
            }

            let in_key_set = if self.match_stem {
                self.keys.contains(&entry.archive_name)
            } else {
                self.keys.contains(&output_name)
            };
            if in_key_set && matched_names.insert(output_name) {
                tally.record_match();
            } else {
                tally.record_miss();
            }

            if let Some(callback) = progress_callback {
                callback(&progress);
            }
        }

        outcome.elapsed = progress.elapsed();
        Ok(outcome)
    }

    fn write_entry(&self, entry: &ArchiveEntry, output_name: &str) -> Result<PathBuf> {
        let dest = self.destination.join(output_name);
        let display = dest.display().to_string();

        validate_output_name(output_name).map_err(|message| ChatMatchError::WriteFailure {
            path: display.clone(),
            message,
        })?;

        let write = || -> std::io::Result<()> {
            let file = fs::File::create(&dest)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&entry.contents)?;
            writer.flush()
        };

        write().map_err(|e| ChatMatchError::WriteFailure {
            path: display,
            message: e.to_string(),
        })?;

        Ok(dest)
    }
}

/// Rejects names that would leave the destination or are invalid on common filesystems.
pub fn validate_output_name(name: &str) -> std::result::Result<(), String> {
    let path = Path::new(name);

    if path.components().count() != 1
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(format!("Output name must be a plain file name: {}", name));
    }

    let invalid_chars = ['<', '>', ':', '"', '|', '?', '*', '/', '\\'];
    if name
        .chars()
        .any(|c| invalid_chars.contains(&c) || c.is_control())
    {
        return Err(format!("Output name contains invalid characters: {}", name));
    }

    if name.ends_with(' ') || name.ends_with('.') {
        return Err(format!("Output name cannot end with space or dot: {}", name));
    }

    Ok(())
}
