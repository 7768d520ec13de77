use crate::config::{CliOverrides, Config};
use crate::error::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chatmatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Match chat transcripts in nested ZIP archives against a chat log")]
#[command(
    long_about = "chatmatch derives a match key for every row of a chat log, unpacks the \
                  transcript archive and copies each transcript into a dated output folder \
                  under the name of the archive that contained it, reporting how many \
                  transcripts matched the log."
)]
#[command(before_help = "🔎 chatmatch - Chat Transcript Matcher")]
#[command(after_help = "EXAMPLES:\n  \
    chatmatch chats.xlsx --archive transcripts.zip --output ./matched\n  \
    chatmatch chats.csv -a transcripts.zip -d 01/05/2024 --annotate\n  \
    chatmatch chats.xlsx --workflow annotate --annotated-output chats_named.xlsx\n  \
    chatmatch accounts.xlsx --workflow placeholders --output ./accounts\n  \
    chatmatch --generate-config --config chatmatch.toml")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Chat log table (.csv, .tsv, .xlsx, .xlsm, .xls, .xlsb)
    #[arg(required_unless_present = "generate_config")]
    pub table: Option<PathBuf>,

    /// Workflow to run
    #[arg(long, value_enum, default_value_t = Workflow::Transcripts)]
    pub workflow: Workflow,

    /// Outer ZIP archive holding one ZIP per transcript
    #[arg(short, long)]
    pub archive: Option<PathBuf>,

    /// Existing directory that receives the dated output folder
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output folder date (YYYY-MM-DD, DD/MM/YYYY, DD-MM-YYYY or YYYYMMDD; defaults to today)
    #[arg(short, long)]
    pub date: Option<String>,

    /// Separator placed between date, time and session id in match keys
    #[arg(long, allow_hyphen_values = true)]
    pub separator: Option<String>,

    /// Derive transcript keys without the .html suffix
    #[arg(long)]
    pub no_html_suffix: bool,

    /// Token substituted for empty identity cells
    #[arg(long)]
    pub placeholder: Option<String>,

    /// Write the MATCH NAME column into the table before matching
    #[arg(long)]
    pub annotate: bool,

    /// Save the annotated table here instead of overwriting the input
    #[arg(long)]
    pub annotated_output: Option<PathBuf>,

    /// Skip writing the run report into the output folder
    #[arg(long)]
    pub no_report: bool,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Dry run (validate inputs and show the plan without writing anything)
    #[arg(long)]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Write a sample configuration file (to --config or chatmatch.toml)")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Workflow {
    /// Match transcripts from an archive against the chat log
    Transcripts,
    /// Append the MATCH NAME column to the chat log
    Annotate,
    /// Create one empty workbook per account row
    Placeholders,
}

impl Workflow {
    pub fn title(&self) -> &'static str {
        match self {
            Workflow::Transcripts => "Transcript matching",
            Workflow::Annotate => "Annotate",
            Workflow::Placeholders => "Placeholder creation",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Workflow::Transcripts => "transcripts",
            Workflow::Annotate => "annotate",
            Workflow::Placeholders => "placeholders",
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_separator(self.separator.clone())
            .with_html_suffix(self.no_html_suffix.then_some(false))
            .with_placeholder(self.placeholder.clone())
            .with_output_dir(self.output.clone())
            .with_generate_report(self.no_report.then_some(false))
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}
