use crate::archive::{ArchiveEntry, ArchiveWalk, ArchiveWalker};
use crate::config::Config;
use crate::error::{ChatMatchError, Result};
use crate::matcher::{derive_key, resolve_folder_date, KeyFormat, KeySet};
use crate::reconciler::{
    placeholder_file_name, write_placeholders, EntryFailure, MatchTally, OutputManager,
    ReconcileProgress, Reconciler,
};
use crate::table::{annotate_match_names, Row, Table};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    KeysReady,
    Reconciled,
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::KeysReady => "KeysReady",
            PipelineState::Reconciled => "Reconciled",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Rows that produced a key or an output record.
    pub processed: usize,
    /// Rows skipped by the placeholder and chat-time filters.
    pub unprocessed: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub total_considered: usize,
    pub overwritten: usize,
    pub failures: Vec<EntryFailure>,
    pub output_directory: PathBuf,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Which rows take part in a run.
pub struct RowFilter<'a> {
    identity_columns: Vec<&'a str>,
    chat_time_column: Option<&'a str>,
    placeholder: &'a str,
    zero_duration: &'a str,
}

impl<'a> RowFilter<'a> {
    /// The chat-time check only applies when the table carries that column.
    pub fn new(table: &Table, config: &'a Config, identity_columns: Vec<&'a str>) -> Self {
        let chat_time = config.columns.chat_time.as_str();
        let chat_time_column = (config.matching.chat_time_filter && table.has_column(chat_time))
            .then_some(chat_time);

        Self {
            identity_columns,
            chat_time_column,
            placeholder: config.matching.placeholder.as_str(),
            zero_duration: config.matching.zero_duration.as_str(),
        }
    }

    pub fn accepts(&self, row: &Row<'_>) -> bool {
        let all_placeholder = self
            .identity_columns
            .iter()
            .all(|column| row.field_or(column, self.placeholder) == self.placeholder);
        if all_placeholder {
            return false;
        }

        match self.chat_time_column {
            Some(column) => {
                let chat_time = row.field_or(column, self.placeholder);
                chat_time != self.zero_duration && chat_time != self.placeholder
            }
            None => true,
        }
    }
}

/// Explicit run state: keys must be derived before anything is reconciled.
#[derive(Debug)]
pub struct Pipeline {
    state: PipelineState,
    keys: KeySet,
    processed: usize,
    unprocessed: usize,
    tally: MatchTally,
    failures: Vec<EntryFailure>,
    match_stem: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            keys: KeySet::new(),
            processed: 0,
            unprocessed: 0,
            tally: MatchTally::new(),
            failures: Vec::new(),
            match_stem: false,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    pub fn tally(&self) -> &MatchTally {
        &self.tally
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn unprocessed(&self) -> usize {
        self.unprocessed
    }

    fn expect_state(&self, expected: PipelineState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ChatMatchError::InvalidPipelineState {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }

    /// Idle → KeysReady.
    pub fn prepare_keys(&mut self, table: &Table, config: &Config, format: &KeyFormat) -> Result<()> {
        self.expect_state(PipelineState::Idle)?;

        let columns = &config.columns;
        table.require_columns(&[
            columns.date.as_str(),
            columns.time.as_str(),
            columns.session_id.as_str(),
        ])?;

        let placeholder = config.matching.placeholder.as_str();
        let filter = RowFilter::new(
            table,
            config,
            vec![
                columns.date.as_str(),
                columns.time.as_str(),
                columns.session_id.as_str(),
            ],
        );

        for row in table.rows() {
            if !filter.accepts(&row) {
                self.unprocessed += 1;
                continue;
            }

            self.processed += 1;
            self.keys.insert(derive_key(
                row.field_or(&columns.date, placeholder),
                row.field_or(&columns.time, placeholder),
                row.field_or(&columns.session_id, placeholder),
                format,
            ));
        }

        self.match_stem = format.suffix.is_none();
        self.state = PipelineState::KeysReady;
        Ok(())
    }

    /// KeysReady → Reconciled.
    pub fn reconcile<I>(
        &mut self,
        entries: I,
        destination: &Path,
        content_extension: &str,
        progress_callback: Option<&dyn Fn(&ReconcileProgress)>,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Result<ArchiveEntry>>,
    {
        self.expect_state(PipelineState::KeysReady)?;

        let reconciler = Reconciler::new(&self.keys, destination, content_extension)
            .with_stem_matching(self.match_stem);
        let outcome = reconciler.reconcile(entries, &mut self.tally, progress_callback, cancel)?;
        self.failures.extend(outcome.failures);

        self.state = PipelineState::Reconciled;
        Ok(())
    }

    pub fn summary(&self, output_directory: &Path) -> Result<RunSummary> {
        self.expect_state(PipelineState::Reconciled)?;

        Ok(RunSummary {
            processed: self.processed,
            unprocessed: self.unprocessed,
            matched: self.tally.matched,
            unmatched: self.tally.unmatched,
            total_considered: self.tally.total_considered,
            overwritten: self.tally.overwritten,
            failures: self.failures.clone(),
            output_directory: output_directory.to_path_buf(),
        })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything validated before the first write.
pub struct RunPlan {
    pub folder_date: String,
    pub key_format: KeyFormat,
    pub output: OutputManager,
    pub pipeline: Pipeline,
}

impl RunPlan {
    pub fn output_directory(&self) -> &Path {
        self.output.get_output_directory()
    }
}

pub struct BatchOrchestrator<'a> {
    config: &'a Config,
    today: NaiveDate,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            today: Local::now().date_naive(),
        }
    }

    /// Fixes the date used when no folder date is requested.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Derive the key set (which checks the columns), then validate date and output root.
    pub fn plan(&self, table: &Table, output_root: &Path, date: Option<&str>) -> Result<RunPlan> {
        let key_format = self
            .config
            .matching
            .transcript_key_format(&self.config.archive.content_extension);
        let mut pipeline = Pipeline::new();
        pipeline.prepare_keys(table, self.config, &key_format)?;

        let folder_date = resolve_folder_date(date, self.today)?;
        let output = OutputManager::new(output_root, &folder_date)?;

        Ok(RunPlan {
            folder_date,
            key_format,
            output,
            pipeline,
        })
    }

    pub fn open_archive(&self, archive: &Path) -> Result<ArchiveWalk> {
        ArchiveWalker::new(&self.config.archive)?.open(archive)
    }

    /// Create the dated folder and reconcile an already opened archive.
    pub fn execute(
        &self,
        plan: &mut RunPlan,
        walk: ArchiveWalk,
        progress_callback: Option<&dyn Fn(&ReconcileProgress)>,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<RunSummary> {
        plan.output.initialize()?;

        let destination = plan.output.get_output_directory().to_path_buf();
        plan.pipeline.reconcile(
            walk,
            &destination,
            &self.config.archive.content_extension,
            progress_callback,
            cancel,
        )?;

        plan.pipeline.summary(&destination)
    }

    pub fn run(
        &self,
        table: &Table,
        archive: &Path,
        output_root: &Path,
        date: Option<&str>,
    ) -> Result<RunSummary> {
        let mut plan = self.plan(table, output_root, date)?;
        let walk = self.open_archive(archive)?;
        self.execute(&mut plan, walk, None, None)
    }

    /// Validate the placeholder inputs and collect one file name per usable row.
    pub fn plan_placeholders(
        &self,
        table: &Table,
        output_root: &Path,
        date: Option<&str>,
    ) -> Result<PlaceholderPlan> {
        let columns = &self.config.columns;
        let identity = vec![
            columns.agent.as_str(),
            columns.customer_id.as_str(),
            columns.account_name.as_str(),
        ];
        table.require_columns(&identity)?;

        let folder_date = resolve_folder_date(date, self.today)?;
        let output = OutputManager::new(output_root, &folder_date)?;

        let placeholder = self.config.matching.placeholder.as_str();
        let filter = RowFilter::new(table, self.config, identity);
        let mut file_names = Vec::new();
        let mut unprocessed = 0;

        for row in table.rows() {
            if !filter.accepts(&row) {
                unprocessed += 1;
                continue;
            }
            file_names.push(placeholder_file_name(
                row.field_or(&columns.agent, placeholder),
                row.field_or(&columns.customer_id, placeholder),
                row.field_or(&columns.account_name, placeholder),
            ));
        }

        Ok(PlaceholderPlan {
            folder_date,
            output,
            file_names,
            unprocessed,
        })
    }

    /// Create the dated folder and write the planned workbooks.
    pub fn execute_placeholders(
        &self,
        plan: &PlaceholderPlan,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<RunSummary> {
        plan.output.initialize()?;

        let outcome = write_placeholders(
            plan.output.get_output_directory(),
            plan.file_names.iter().cloned(),
            cancel,
        )?;

        Ok(RunSummary {
            processed: plan.file_names.len(),
            unprocessed: plan.unprocessed,
            overwritten: outcome.overwritten,
            failures: outcome.failures,
            output_directory: plan.output.get_output_directory().to_path_buf(),
            ..RunSummary::default()
        })
    }

    /// One empty workbook per usable row, named after agent, customer and account.
    pub fn run_placeholders(
        &self,
        table: &Table,
        output_root: &Path,
        date: Option<&str>,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<RunSummary> {
        let plan = self.plan_placeholders(table, output_root, date)?;
        self.execute_placeholders(&plan, cancel)
    }
}

pub struct PlaceholderPlan {
    pub folder_date: String,
    pub output: OutputManager,
    pub file_names: Vec<String>,
    pub unprocessed: usize,
}

/// What a run would do, reported by `--dry-run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPreview {
    pub workflow: String,
    pub table: String,
    pub rows: usize,
    pub archive: Option<String>,
    pub required_columns: Vec<String>,
    pub key_format: String,
    pub output_directory: PathBuf,
    pub processed: usize,
    pub unprocessed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotateSummary {
    pub rows: usize,
    pub column: String,
    pub saved_to: PathBuf,
}

/// Append the key column and save the table in place or to `destination`.
pub fn run_annotate(
    table: &mut Table,
    config: &Config,
    format: &KeyFormat,
    destination: Option<&Path>,
) -> Result<AnnotateSummary> {
    let keys = annotate_match_names(table, config, format)?;

    let saved_to = match destination {
        Some(path) => {
            table.save_to(path)?;
            path.to_path_buf()
        }
        None => table.save()?,
    };

    Ok(AnnotateSummary {
        rows: keys.len(),
        column: config.columns.match_name.clone(),
        saved_to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options: FileOptions<'_, ()> = FileOptions::default();
            for (name, contents) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(contents).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    fn chat_log() -> Table {
        Table::new(
            vec![
                "DATE".into(),
                "TIME".into(),
                "SESSION GUID".into(),
                "chat time".into(),
            ],
            vec![
                vec!["2024/05/01".into(), "12:30:00".into(), "A".into(), "00:04:10".into()],
                vec!["2024/05/01".into(), "13:00:00".into(), "B".into(), "00:01:00".into()],
                vec!["2024/05/01".into(), "14:00:00".into(), "C".into(), "00:00:00".into()],
            ],
        )
    }

    fn transcripts_archive(dir: &Path) -> PathBuf {
        let a = zip_bytes(&[("transcript.html", b"<p>a</p>".as_slice())]);
        let b = zip_bytes(&[("transcript.html", b"<p>b</p>".as_slice())]);
        let path = dir.join("chats.zip");
        fs::write(
            &path,
            zip_bytes(&[
                ("chat_2024-05-01_123000_A.zip", a.as_slice()),
                ("chat_2024-05-01_130000_B.zip", b.as_slice()),
            ]),
        )
        .unwrap();
        path
    }

    fn html_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.ends_with(".html"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_reconcile_from_idle_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut pipeline = Pipeline::new();

        let result = pipeline.reconcile(Vec::new(), temp_dir.path(), "html", None, None);
        assert!(matches!(
            result,
            Err(ChatMatchError::InvalidPipelineState {
                expected: "KeysReady",
                actual: "Idle"
            })
        ));
    }

    #[test]
    fn test_summary_requires_reconciled_state() {
        let mut pipeline = Pipeline::new();
        pipeline
            .prepare_keys(&chat_log(), &Config::default(), &KeyFormat::transcript())
            .unwrap();
        assert_eq!(pipeline.state(), PipelineState::KeysReady);
        assert!(pipeline.summary(Path::new(".")).is_err());
        assert!(pipeline
            .prepare_keys(&chat_log(), &Config::default(), &KeyFormat::transcript())
            .is_err());
    }

    #[test]
    fn test_zero_chat_time_rows_are_unprocessed() {
        let mut pipeline = Pipeline::new();
        pipeline
            .prepare_keys(&chat_log(), &Config::default(), &KeyFormat::transcript())
            .unwrap();

        assert_eq!(pipeline.processed(), 2);
        assert_eq!(pipeline.unprocessed(), 1);
        assert!(pipeline.keys().contains("chat_2024-05-01_123000_A.html"));
        assert!(!pipeline.keys().contains("chat_2024-05-01_140000_C.html"));
    }

    #[test]
    fn test_chat_time_filter_can_be_disabled() {
        let mut config = Config::default();
        config.matching.chat_time_filter = false;

        let mut pipeline = Pipeline::new();
        pipeline
            .prepare_keys(&chat_log(), &config, &KeyFormat::transcript())
            .unwrap();
        assert_eq!(pipeline.processed(), 3);
    }

    #[test]
    fn test_placeholder_only_rows_are_skipped() {
        let table = Table::new(
            vec!["DATE".into(), "TIME".into(), "SESSION GUID".into()],
            vec![
                vec!["".into(), " ".into(), "".into()],
                vec!["2024/05/01".into(), "".into(), "Z".into()],
            ],
        );
        let mut pipeline = Pipeline::new();
        pipeline
            .prepare_keys(&table, &Config::default(), &KeyFormat::transcript())
            .unwrap();

        assert_eq!(pipeline.processed(), 1);
        assert_eq!(pipeline.unprocessed(), 1);
        assert!(pipeline.keys().contains("chat_2024-05-01_[None]_Z.html"));
    }

    #[test]
    fn test_end_to_end_run() {
        let temp_dir = TempDir::new().unwrap();
        let archive = transcripts_archive(temp_dir.path());
        let output_root = temp_dir.path().join("out");
        fs::create_dir(&output_root).unwrap();

        let config = Config::default();
        let summary = BatchOrchestrator::new(&config)
            .run(&chat_log(), &archive, &output_root, Some("2024-05-01"))
            .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.unprocessed, 1);
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.unmatched, 0);
        assert_eq!(summary.total_considered, 2);
        assert!(!summary.has_failures());
        assert_eq!(summary.output_directory, output_root.join("2024-05-01"));
        assert_eq!(
            html_files(&summary.output_directory),
            vec![
                "chat_2024-05-01_123000_A.html".to_string(),
                "chat_2024-05-01_130000_B.html".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_columns_fail_before_output_exists() {
        let temp_dir = TempDir::new().unwrap();
        let archive = transcripts_archive(temp_dir.path());
        let table = Table::new(vec!["DATE".into()], vec![vec!["2024/05/01".into()]]);

        let config = Config::default();
        let result = BatchOrchestrator::new(&config).run(
            &table,
            &archive,
            temp_dir.path(),
            Some("2024-05-01"),
        );

        match result {
            Err(ChatMatchError::MissingColumns { missing }) => {
                assert_eq!(missing, vec!["TIME".to_string(), "SESSION GUID".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert!(!temp_dir.path().join("2024-05-01").exists());
    }

    #[test]
    fn test_missing_columns_are_reported_before_a_bad_date() {
        let temp_dir = TempDir::new().unwrap();
        let table = Table::new(vec!["DATE".into()], vec![vec!["2024/05/01".into()]]);

        let config = Config::default();
        let result = BatchOrchestrator::new(&config).plan(&table, temp_dir.path(), Some("May 1st"));
        assert!(matches!(result, Err(ChatMatchError::MissingColumns { .. })));
    }

    #[test]
    fn test_archive_named_like_a_transcript_file_is_not_matched() {
        let temp_dir = TempDir::new().unwrap();
        let inner = zip_bytes(&[("t.html", b"x".as_slice())]);
        let archive = temp_dir.path().join("odd.zip");
        fs::write(
            &archive,
            zip_bytes(&[("chat_2024-05-01_123000_A.html.zip", inner.as_slice())]),
        )
        .unwrap();

        let config = Config::default();
        let summary = BatchOrchestrator::new(&config)
            .run(&chat_log(), &archive, temp_dir.path(), Some("2024-05-01"))
            .unwrap();

        assert_eq!(summary.matched, 0);
        assert_eq!(summary.unmatched, 1);
        assert_eq!(
            html_files(&summary.output_directory),
            vec!["chat_2024-05-01_123000_A.html.html".to_string()]
        );
    }

    #[test]
    fn test_keys_follow_the_configured_content_extension() {
        let temp_dir = TempDir::new().unwrap();
        let inner = zip_bytes(&[("t.htm", b"x".as_slice())]);
        let archive = temp_dir.path().join("htm.zip");
        fs::write(
            &archive,
            zip_bytes(&[("chat_2024-05-01_123000_A.zip", inner.as_slice())]),
        )
        .unwrap();

        let mut config = Config::default();
        config.archive.content_extension = "htm".to_string();
        let orchestrator = BatchOrchestrator::new(&config);
        let plan = orchestrator
            .plan(&chat_log(), temp_dir.path(), Some("2024-05-01"))
            .unwrap();
        assert_eq!(plan.key_format.suffix.as_deref(), Some(".htm"));

        let summary = orchestrator
            .run(&chat_log(), &archive, temp_dir.path(), Some("2024-05-01"))
            .unwrap();
        assert_eq!(summary.matched, 1);
    }

    #[test]
    fn test_suffixless_keys_match_by_archive_stem() {
        let temp_dir = TempDir::new().unwrap();
        let archive = transcripts_archive(temp_dir.path());

        let mut config = Config::default();
        config.matching.html_suffix = false;
        let summary = BatchOrchestrator::new(&config)
            .run(&chat_log(), &archive, temp_dir.path(), Some("2024-05-01"))
            .unwrap();

        assert_eq!(summary.matched, 2);
        assert_eq!(summary.unmatched, 0);
    }

    #[test]
    fn test_invalid_date_fails_closed() {
        let temp_dir = TempDir::new().unwrap();
        let archive = transcripts_archive(temp_dir.path());
        let config = Config::default();

        let result = BatchOrchestrator::new(&config).run(
            &chat_log(),
            &archive,
            temp_dir.path(),
            Some("May 1st"),
        );
        assert!(matches!(result, Err(ChatMatchError::InvalidDateFormat { .. })));
    }

    #[test]
    fn test_corrupt_outer_archive_creates_no_folder() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("broken.zip");
        fs::write(&archive, b"not a zip").unwrap();

        let config = Config::default();
        let result = BatchOrchestrator::new(&config).run(
            &chat_log(),
            &archive,
            temp_dir.path(),
            Some("2024-05-01"),
        );

        assert!(matches!(result, Err(ChatMatchError::ArchiveCorrupt { .. })));
        assert!(!temp_dir.path().join("2024-05-01").exists());
    }

    #[test]
    fn test_default_folder_date_is_today() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::default();
        let today = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();

        let plan = BatchOrchestrator::new(&config)
            .with_today(today)
            .plan(&chat_log(), temp_dir.path(), None)
            .unwrap();

        assert_eq!(plan.folder_date, "2024-02-29");
        assert_eq!(plan.output_directory(), temp_dir.path().join("2024-02-29"));
        assert_eq!(plan.pipeline.state(), PipelineState::KeysReady);
    }

    #[test]
    fn test_placeholders_workflow() {
        let temp_dir = TempDir::new().unwrap();
        let table = Table::new(
            vec![
                "Agent".into(),
                "Customer ID".into(),
                "Account Name".into(),
                "Chat Time".into(),
            ],
            vec![
                vec!["alice".into(), "42".into(), "Acme".into(), "00:03:00".into()],
                vec!["bob".into(), "43".into(), "Globex".into(), "00:00:00".into()],
                vec!["".into(), "".into(), "".into(), "00:02:00".into()],
                vec!["carol".into(), "".into(), "Initech".into(), "".into()],
            ],
        );

        let config = Config::default();
        let summary = BatchOrchestrator::new(&config)
            .run_placeholders(&table, temp_dir.path(), Some("01/05/2024"), None)
            .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.unprocessed, 3);
        assert!(temp_dir
            .path()
            .join("2024-05-01")
            .join("alice_42_Acme.xlsx")
            .exists());
    }

    #[test]
    fn test_annotate_to_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut table = chat_log();
        let destination = temp_dir.path().join("annotated.csv");
        let config = Config::default();

        let summary = run_annotate(
            &mut table,
            &config,
            &config.matching.column_key_format(),
            Some(&destination),
        )
        .unwrap();

        assert_eq!(summary.rows, 3);
        assert_eq!(summary.saved_to, destination);

        let reloaded = Table::load(&destination).unwrap();
        let names: Vec<String> = reloaded
            .rows()
            .map(|r| r.get("MATCH NAME").unwrap_or_default().to_string())
            .collect();
        assert_eq!(names[2], "chat_2024-05-01_140000_C");
    }
}
