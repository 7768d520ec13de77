use chatmatch::{
    ChatMatch, ChatMatchError, Cli, OutputFormatter, OutputMode, RunSummary, UserFriendlyError,
    Workflow,
};
use clap::Parser;
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let chatmatch = match ChatMatch::from_cli(&cli) {
        Ok(chatmatch) => chatmatch,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for(&e);
        }
    };

    let Some(table) = cli.table.as_deref() else {
        chatmatch.output_formatter().error("No chat log table was given");
        return 1;
    };

    if cli.dry_run {
        return handle_dry_run(&cli, &chatmatch, table);
    }

    let result = match cli.workflow {
        Workflow::Transcripts => chatmatch
            .match_transcripts(
                table,
                cli.archive.as_deref(),
                cli.date.as_deref(),
                cli.annotate,
                cli.annotated_output.as_deref(),
            )
            .await
            .map(|summary| summary_exit_code(&summary)),
        Workflow::Annotate => chatmatch
            .annotate_table(table, cli.annotated_output.as_deref())
            .map(|_| 0),
        Workflow::Placeholders => chatmatch
            .create_placeholders(table, cli.date.as_deref())
            .map(|summary| summary_exit_code(&summary)),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            chatmatch.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

/// A completed run with per-entry failures still exits non-zero.
fn summary_exit_code(summary: &RunSummary) -> i32 {
    if summary.has_failures() {
        2
    } else {
        0
    }
}

fn exit_code_for(error: &ChatMatchError) -> i32 {
    match error {
        ChatMatchError::Cancelled => 130,
        ChatMatchError::MissingColumns { .. } => 3,
        ChatMatchError::InvalidDateFormat { .. } => 4,
        ChatMatchError::InvalidOutputPath { .. } => 5,
        ChatMatchError::ArchiveCorrupt { .. } | ChatMatchError::NoArchiveProvided => 6,
        ChatMatchError::Spreadsheet { .. } | ChatMatchError::UnsupportedTable { .. } => 7,
        _ => 1,
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "chatmatch.toml".to_string());

    match ChatMatch::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path);
            println!("\nTo use this configuration:");
            println!("  chatmatch <table> --archive <archive.zip> --config {}", config_path);
            println!("\nEdit the file to map your column names and key format.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_dry_run(cli: &Cli, chatmatch: &ChatMatch, table: &Path) -> i32 {
    let formatter = chatmatch.output_formatter();

    formatter.info("DRY RUN MODE - No files will be written");

    match chatmatch.preview(
        cli.workflow,
        table,
        cli.archive.as_deref(),
        cli.date.as_deref(),
        cli.annotated_output.as_deref(),
    ) {
        Ok(plan) => {
            formatter.print_plan(&plan);
            0
        }
        Err(e) => {
            chatmatch.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

fn print_startup_error(error: &ChatMatchError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}
