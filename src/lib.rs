pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod reconciler;
pub mod table;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat, Workflow};
pub use config::{ArchiveConfig, CliOverrides, ColumnConfig, Config, MatchConfig, OutputConfig};
pub use error::{ChatMatchError, Result, UserFriendlyError};

// Core functionality re-exports
pub use archive::{ArchiveEntry, ArchiveWalk, ArchiveWalker};
pub use matcher::{derive_key, normalize_date, KeyFormat, KeySet, MatchKey};
pub use pipeline::{
    run_annotate, AnnotateSummary, BatchOrchestrator, Pipeline, PipelineState, PlanPreview,
    RunSummary,
};
pub use reconciler::{EntryFailure, MatchTally, OutputManager, Reconciler, RunReport};
pub use table::{Row, Table};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use chrono::Utc;
use reconciler::ReconcileProgress;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::task;

/// Main library interface for the chatmatch workflows
pub struct ChatMatch {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
}

impl ChatMatch {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);
        let shutdown = GracefulShutdown::new()?;

        Ok(Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
        })
    }

    /// Create an instance for testing (no signal handler conflicts)
    #[cfg(test)]
    pub fn new_for_test(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self {
            config,
            output_formatter: OutputFormatter::new(output_mode, verbose, quiet),
            progress_manager: ProgressManager::new(false),
            shutdown: GracefulShutdown::new_for_test(),
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Self::new(config, output_mode, cli_args.verbose, cli_args.quiet)
    }

    /// Match the transcripts in `archive_path` against the chat log at `table_path`.
    ///
    /// With `annotate`, the transcript keys are written into the table (or to
    /// `annotated_output`) once every input has been validated.
    pub async fn match_transcripts(
        &self,
        table_path: &Path,
        archive_path: Option<&Path>,
        date: Option<&str>,
        annotate: bool,
        annotated_output: Option<&Path>,
    ) -> Result<RunSummary> {
        let start_time = Instant::now();
        let archive_path = archive_path.ok_or(ChatMatchError::NoArchiveProvided)?;

        self.shutdown.check_shutdown()?;
        self.output_formatter.start_operation("Matching chat transcripts");

        // Step 1: Load the chat log and validate everything before writing
        let mut table = self.load_table(table_path)?;
        let orchestrator = BatchOrchestrator::new(&self.config);
        let mut plan = orchestrator.plan(&table, &self.config.output.base_directory, date)?;
        self.output_formatter.info(&format!(
            "Derived {} match keys from {} rows ({} skipped)",
            plan.pipeline.keys().len(),
            plan.pipeline.processed(),
            plan.pipeline.unprocessed()
        ));
        self.output_formatter
            .debug(&format!("Key format: {}", plan.key_format.describe()));
        self.shutdown.check_shutdown()?;

        // Step 2: Unpack the outer archive
        let walk = self.open_archive(archive_path).await?;
        self.shutdown.check_shutdown()?;

        // Step 3: Optionally write the keys back into the table
        if annotate {
            let summary = run_annotate(&mut table, &self.config, &plan.key_format, annotated_output)?;
            self.output_formatter.print_annotate_summary(&summary);
        }

        // Step 4: Reconcile into the dated folder
        self.output_formatter.start_operation(&format!(
            "Reconciling into {}",
            plan.output_directory().display()
        ));
        let entry_progress = self.progress_manager.create_entry_progress();
        let progress_callback = {
            let pb = entry_progress.clone();
            move |progress: &ReconcileProgress| {
                ui::progress::update_entry_progress(&pb, progress);
            }
        };
        let cancel = self.shutdown.cancel_probe();

        let result = orchestrator.execute(&mut plan, walk, Some(&progress_callback), Some(&cancel));
        let mut summary = match result {
            Ok(summary) => summary,
            Err(error) => {
                entry_progress.abandon();
                return Err(error);
            }
        };
        ui::progress::finish_progress_with_summary(
            &entry_progress,
            &format!("Considered {} transcripts", summary.total_considered),
            entry_progress.elapsed(),
        );

        // Step 5: Report
        let duration = start_time.elapsed();
        if self.config.output.generate_report {
            self.write_report(
                &plan.output,
                Workflow::Transcripts,
                table_path,
                Some(archive_path),
                plan.key_format.describe(),
                &mut summary,
                duration,
            );
        }

        self.output_formatter
            .print_run_summary(Workflow::Transcripts.title(), &summary, duration);

        Ok(summary)
    }

    /// Append the `MATCH NAME` column and save the table.
    pub fn annotate_table(&self, table_path: &Path, destination: Option<&Path>) -> Result<AnnotateSummary> {
        self.shutdown.check_shutdown()?;
        self.output_formatter.start_operation("Annotating chat log");

        let mut table = self.load_table(table_path)?;
        let format = self.config.matching.column_key_format();
        self.output_formatter
            .debug(&format!("Key format: {}", format.describe()));

        let summary = run_annotate(&mut table, &self.config, &format, destination)?;
        self.output_formatter.print_annotate_summary(&summary);

        Ok(summary)
    }

    /// One empty workbook per account row in the dated folder.
    pub fn create_placeholders(&self, table_path: &Path, date: Option<&str>) -> Result<RunSummary> {
        let start_time = Instant::now();

        self.shutdown.check_shutdown()?;
        self.output_formatter.start_operation("Creating placeholder workbooks");

        let table = self.load_table(table_path)?;
        let orchestrator = BatchOrchestrator::new(&self.config);
        let plan =
            orchestrator.plan_placeholders(&table, &self.config.output.base_directory, date)?;
        self.output_formatter.info(&format!(
            "{} workbooks to create ({} rows skipped)",
            plan.file_names.len(),
            plan.unprocessed
        ));

        let spinner = self.progress_manager.create_spinner("Writing workbooks...");
        let cancel = self.shutdown.cancel_probe();
        let summary = orchestrator.execute_placeholders(&plan, Some(&cancel));
        spinner.finish_and_clear();
        let mut summary = summary?;

        let duration = start_time.elapsed();
        if self.config.output.generate_report {
            self.write_report(
                &plan.output,
                Workflow::Placeholders,
                table_path,
                None,
                "<agent>_<customer_id>_<account_name>.xlsx".to_string(),
                &mut summary,
                duration,
            );
        }

        self.output_formatter
            .print_run_summary(Workflow::Placeholders.title(), &summary, duration);

        Ok(summary)
    }

    /// Validate the inputs of `workflow` and describe the run without writing anything.
    pub fn preview(
        &self,
        workflow: Workflow,
        table_path: &Path,
        archive_path: Option<&Path>,
        date: Option<&str>,
        annotated_output: Option<&Path>,
    ) -> Result<PlanPreview> {
        let table = self.load_table(table_path)?;
        let orchestrator = BatchOrchestrator::new(&self.config);
        let root = &self.config.output.base_directory;
        let columns = &self.config.columns;
        let transcript_columns = vec![
            columns.date.clone(),
            columns.time.clone(),
            columns.session_id.clone(),
        ];

        let preview = match workflow {
            Workflow::Transcripts => {
                let archive_path = archive_path.ok_or(ChatMatchError::NoArchiveProvided)?;
                let plan = orchestrator.plan(&table, root, date)?;
                if !archive_path.is_file() {
                    return Err(ChatMatchError::archive_corrupt(
                        archive_path.display().to_string(),
                        "file not found",
                    ));
                }

                PlanPreview {
                    workflow: workflow.name().to_string(),
                    table: table_path.display().to_string(),
                    rows: table.len(),
                    archive: Some(archive_path.display().to_string()),
                    required_columns: transcript_columns,
                    key_format: plan.key_format.describe(),
                    output_directory: plan.output_directory().to_path_buf(),
                    processed: plan.pipeline.processed(),
                    unprocessed: plan.pipeline.unprocessed(),
                }
            }
            Workflow::Annotate => {
                let required: Vec<&str> = transcript_columns.iter().map(String::as_str).collect();
                table.require_columns(&required)?;

                PlanPreview {
                    workflow: workflow.name().to_string(),
                    table: table_path.display().to_string(),
                    rows: table.len(),
                    archive: None,
                    required_columns: transcript_columns,
                    key_format: self.config.matching.column_key_format().describe(),
                    output_directory: annotated_output.unwrap_or(table_path).to_path_buf(),
                    processed: table.len(),
                    unprocessed: 0,
                }
            }
            Workflow::Placeholders => {
                let plan = orchestrator.plan_placeholders(&table, root, date)?;

                PlanPreview {
                    workflow: workflow.name().to_string(),
                    table: table_path.display().to_string(),
                    rows: table.len(),
                    archive: None,
                    required_columns: vec![
                        columns.agent.clone(),
                        columns.customer_id.clone(),
                        columns.account_name.clone(),
                    ],
                    key_format: "<agent>_<customer_id>_<account_name>.xlsx".to_string(),
                    output_directory: plan.output.get_output_directory().to_path_buf(),
                    processed: plan.file_names.len(),
                    unprocessed: plan.unprocessed,
                }
            }
        };

        Ok(preview)
    }

    fn load_table(&self, table_path: &Path) -> Result<Table> {
        let table = Table::load(table_path)?;
        self.output_formatter.debug(&format!(
            "Loaded {} rows and {} columns from {}",
            table.len(),
            table.headers().len(),
            table_path.display()
        ));
        Ok(table)
    }

    /// Unpack the outer archive off the async runtime
    async fn open_archive(&self, archive_path: &Path) -> Result<ArchiveWalk> {
        let spinner = self.progress_manager.create_spinner("Unpacking archive...");

        let archive_config = self.config.archive.clone();
        let archive_path = archive_path.to_path_buf();
        let walk = task::spawn_blocking(move || {
            ArchiveWalker::new(&archive_config).and_then(|walker| walker.open(&archive_path))
        })
            .await
            .map_err(|e| ChatMatchError::Config {
                message: format!("Archive task failed: {}", e),
            })?;

        let walk = match walk {
            Ok(walk) => walk,
            Err(error) => {
                spinner.abandon();
                return Err(error);
            }
        };

        ui::progress::finish_progress_with_summary(
            &spinner,
            &format!("Found {} nested archives", walk.nested_archive_count()),
            spinner.elapsed(),
        );
        self.output_formatter
            .debug(&walk.statistics().display_summary());

        Ok(walk)
    }

    /// The files are already written at this point, so a failed report is
    /// recorded in `summary` instead of aborting the run.
    #[allow(clippy::too_many_arguments)]
    fn write_report(
        &self,
        output: &OutputManager,
        workflow: Workflow,
        table_path: &Path,
        archive_path: Option<&Path>,
        key_format: String,
        summary: &mut RunSummary,
        duration: Duration,
    ) {
        let report = RunReport {
            workflow: workflow.name().to_string(),
            folder_date: output.folder_date().to_string(),
            table: table_path.display().to_string(),
            archive: archive_path.map(|p| p.display().to_string()),
            key_format,
            summary: summary.clone(),
            duration,
            generated_at: Utc::now(),
        };

        match output.write_run_report(&report) {
            Ok(()) => self.output_formatter.debug(&format!(
                "Run report written to {}",
                output.get_metadata_dir().display()
            )),
            Err(error) => {
                self.output_formatter
                    .warning(&format!("Could not write the run report: {}", error));
                summary.failures.push(EntryFailure {
                    kind: reconciler::FailureKind::WriteFailure,
                    subject: output.get_metadata_dir().display().to_string(),
                    message: error.to_string(),
                });
            }
        }
    }

    /// Write a sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    pub fn handle_error(&self, error: &ChatMatchError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        target: std::env::consts::ARCH.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_date: &'static str,
    pub target: String,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "chatmatch {} ({}) built on {} for {}",
            self.version, self.git_hash, self.build_date, self.target
        )
    }
}
