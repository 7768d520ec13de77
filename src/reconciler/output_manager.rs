use crate::error::{ChatMatchError, Result};
use crate::pipeline::RunSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const METADATA_DIR: &str = ".chatmatch";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub workflow: String,
    pub folder_date: String,
    pub table: String,
    pub archive: Option<String>,
    pub key_format: String,
    pub summary: RunSummary,
    pub duration: Duration,
    pub generated_at: DateTime<Utc>,
}

/// Owns the dated output folder under an existing root.
pub struct OutputManager {
    folder_date: String,
    output_directory: PathBuf,
}

impl OutputManager {
    /// Fails with `InvalidOutputPath` unless `root` is an existing directory.
    /// Nothing is created until [`OutputManager::initialize`].
    pub fn new<P: Into<PathBuf>>(root: P, folder_date: &str) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ChatMatchError::InvalidOutputPath {
                path: root.display().to_string(),
            });
        }

        let output_directory = root.join(folder_date);
        Ok(Self {
            folder_date: folder_date.to_string(),
            output_directory,
        })
    }

    /// Create the dated folder. Safe to call when it already exists.
    pub fn initialize(&self) -> Result<()> {
        if self.output_directory.exists() && !self.output_directory.is_dir() {
            return Err(ChatMatchError::InvalidOutputPath {
                path: self.output_directory.display().to_string(),
            });
        }

        fs::create_dir_all(&self.output_directory).map_err(|e| ChatMatchError::WriteFailure {
            path: self.output_directory.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(())
    }

    pub fn folder_date(&self) -> &str {
        &self.folder_date
    }

    pub fn get_output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn get_metadata_dir(&self) -> PathBuf {
        self.output_directory.join(METADATA_DIR)
    }

    pub fn write_run_report(&self, report: &RunReport) -> Result<()> {
        fs::create_dir_all(self.get_metadata_dir())?;
        self.save_report_json(report)?;
        self.save_report_text(report)?;
        Ok(())
    }

    fn save_report_json(&self, report: &RunReport) -> Result<()> {
        let report_path = self.get_metadata_dir().join("run_report.json");
        let json_content =
            serde_json::to_string_pretty(report).map_err(|e| ChatMatchError::Config {
                message: format!("Failed to serialize report to JSON: {}", e),
            })?;

        fs::write(&report_path, json_content)?;

        Ok(())
    }

    fn save_report_text(&self, report: &RunReport) -> Result<()> {
        let report_path = self.get_metadata_dir().join("run_report.txt");
        let mut file = fs::File::create(&report_path)?;
        let summary = &report.summary;

        writeln!(file, "chatmatch Run Report")?;
        writeln!(file, "====================")?;
        writeln!(file)?;

        writeln!(file, "Workflow: {}", report.workflow)?;
        writeln!(file, "Table: {}", report.table)?;
        if let Some(ref archive) = report.archive {
            writeln!(file, "Archive: {}", archive)?;
        }
        writeln!(file, "Folder date: {}", report.folder_date)?;
        writeln!(file, "Key format: {}", report.key_format)?;
        writeln!(
            file,
            "Generated at: {}",
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(file, "Duration: {:?}", report.duration)?;
        writeln!(file)?;

        writeln!(file, "Rows:")?;
        writeln!(file, "  Processed: {}", summary.processed)?;
        writeln!(file, "  Unprocessed: {}", summary.unprocessed)?;
        writeln!(file)?;

        writeln!(file, "Entries:")?;
        writeln!(file, "  Matched: {}", summary.matched)?;
        writeln!(file, "  Unmatched: {}", summary.unmatched)?;
        writeln!(file, "  Total considered: {}", summary.total_considered)?;
        writeln!(file, "  Overwritten: {}", summary.overwritten)?;
        writeln!(file)?;

        if !summary.failures.is_empty() {
            writeln!(file, "Failures:")?;
            for failure in &summary.failures {
                writeln!(file, "  - {}", failure)?;
            }
            writeln!(file)?;
        }

        writeln!(file, "Output directory: {}", summary.output_directory.display())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{EntryFailure, FailureKind};
    use tempfile::TempDir;

    fn sample_report(output_directory: PathBuf) -> RunReport {
        RunReport {
            workflow: "transcripts".to_string(),
            folder_date: "2024-05-01".to_string(),
            table: "log.csv".to_string(),
            archive: Some("chats.zip".to_string()),
            key_format: "chat_<date>_<time>_<session>.html".to_string(),
            summary: RunSummary {
                processed: 2,
                unprocessed: 1,
                matched: 1,
                unmatched: 1,
                total_considered: 2,
                overwritten: 0,
                failures: vec![EntryFailure {
                    kind: FailureKind::ArchiveCorrupt,
                    subject: "bad.zip".to_string(),
                    message: "invalid header".to_string(),
                }],
                output_directory,
            },
            duration: Duration::from_millis(12),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_root_must_exist() {
        let temp_dir = TempDir::new().unwrap();
        let result = OutputManager::new(temp_dir.path().join("missing"), "2024-05-01");
        assert!(matches!(result, Err(ChatMatchError::InvalidOutputPath { .. })));
    }

    #[test]
    fn test_root_must_be_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(OutputManager::new(file, "2024-05-01").is_err());
    }

    #[test]
    fn test_new_does_not_create_anything() {
        let temp_dir = TempDir::new().unwrap();
        let manager = OutputManager::new(temp_dir.path(), "2024-05-01").unwrap();
        assert!(!manager.get_output_directory().exists());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let manager = OutputManager::new(temp_dir.path(), "2024-05-01").unwrap();

        manager.initialize().unwrap();
        fs::write(manager.get_output_directory().join("keep.html"), "x").unwrap();
        manager.initialize().unwrap();

        assert_eq!(
            manager.get_output_directory(),
            temp_dir.path().join("2024-05-01")
        );
        assert!(manager.get_output_directory().join("keep.html").exists());
    }

    #[test]
    fn test_run_report_files() {
        let temp_dir = TempDir::new().unwrap();
        let manager = OutputManager::new(temp_dir.path(), "2024-05-01").unwrap();
        manager.initialize().unwrap();

        let report = sample_report(manager.get_output_directory().to_path_buf());
        manager.write_run_report(&report).unwrap();

        let json = fs::read_to_string(manager.get_metadata_dir().join("run_report.json")).unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.summary, report.summary);

        let text = fs::read_to_string(manager.get_metadata_dir().join("run_report.txt")).unwrap();
        assert!(text.contains("Matched: 1"));
        assert!(text.contains("bad.zip"));
    }
}
