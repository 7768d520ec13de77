use crate::error::{ChatMatchError, UserFriendlyError};
use crate::pipeline::{AnnotateSummary, PlanPreview, RunSummary};
use console::{style, Emoji, Term};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

// Emojis with text fallbacks
static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static ROCKET: Emoji = Emoji("🚀 ", "> ");
static SPARKLES: Emoji = Emoji("✨ ", "* ");

pub struct OutputFormatter {
    #[allow(dead_code)]
    term: Term,
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let term = Term::stdout();
        let use_colors = match mode {
            OutputMode::Human => term.features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            term,
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Success, message),
            OutputMode::Json => self.print_json_message("success", message),
            OutputMode::Plain => println!("SUCCESS: {}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn debug(&self, message: &str) {
        if self.should_show_message(2) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("  {}", style(message).dim());
                    } else {
                        println!("  DEBUG: {}", message);
                    }
                }
                OutputMode::Json => self.print_json_message("debug", message),
                OutputMode::Plain => println!("DEBUG: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("{}{}", ROCKET, style(operation).bold());
                    } else {
                        println!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => println!("STARTING: {}", operation),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &ChatMatchError) {
        let user_message = error.user_message();
        self.error(&user_message);

        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    eprintln!();
                    if self.use_colors {
                        eprintln!(
                            "{}{}",
                            INFO,
                            style(&format!("Suggestion: {}", suggestion)).cyan()
                        );
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => {
                    eprintln!("SUGGESTION: {}", suggestion);
                }
            }
        }
    }

    /// The final tally. JSON output is printed even in quiet mode.
    pub fn print_run_summary(&self, title: &str, summary: &RunSummary, duration: Duration) {
        match self.mode {
            OutputMode::Json => {
                let value = serde_json::json!({
                    "type": "summary",
                    "workflow": title,
                    "summary": summary,
                    "duration_ms": duration.as_millis(),
                    "timestamp": chrono::Utc::now().to_rfc3339()
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
                );
            }
            _ if self.quiet => {}
            OutputMode::Human => self.print_human_summary(title, summary, duration),
            OutputMode::Plain => self.print_plain_summary(title, summary, duration),
        }
    }

    pub fn print_annotate_summary(&self, summary: &AnnotateSummary) {
        match self.mode {
            OutputMode::Json => self.print_json_object(&serde_json::json!({
                "type": "annotate",
                "summary": summary
            })),
            _ if self.quiet => {}
            OutputMode::Human => self.success(&format!(
                "Wrote {} '{}' values to {}",
                summary.rows,
                summary.column,
                summary.saved_to.display()
            )),
            OutputMode::Plain => {
                println!("COMPLETED: Annotate");
                println!("Rows: {}", summary.rows);
                println!("Column: {}", summary.column);
                println!("Saved to: {}", summary.saved_to.display());
            }
        }
    }

    pub fn print_plan(&self, plan: &PlanPreview) {
        match self.mode {
            OutputMode::Json => self.print_json_object(&serde_json::json!({
                "type": "dry_run",
                "plan": plan
            })),
            OutputMode::Human | OutputMode::Plain => {
                self.print_header("Dry run");
                println!("Workflow:         {}", plan.workflow);
                println!("Table:            {} ({} rows)", plan.table, plan.rows);
                if let Some(ref archive) = plan.archive {
                    println!("Archive:          {}", archive);
                }
                println!("Required columns: {}", plan.required_columns.join(", "));
                println!("Key format:       {}", plan.key_format);
                println!("Output directory: {}", plan.output_directory.display());
                println!(
                    "Rows to process:  {} ({} skipped)",
                    plan.processed, plan.unprocessed
                );
                println!();
                println!("No files were written.");
            }
        }
    }

    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                println!();
                if self.use_colors {
                    println!("{} {}", SPARKLES, style(title).bold().cyan());
                } else {
                    println!("=== {} ===", title);
                }
                println!();
            }
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "header",
                    "title": title
                }));
            }
            OutputMode::Plain => {
                println!("=== {} ===", title);
            }
        }
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                if self.use_colors {
                    println!("{}", style("─".repeat(60)).dim());
                } else {
                    println!("{}", "-".repeat(60));
                }
            }
            OutputMode::Plain => {
                println!("{}", "-".repeat(60));
            }
            OutputMode::Json => {}
        }
    }

    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        #[allow(clippy::type_complexity)]
        let (emoji, color_fn): (Emoji, Box<dyn Fn(&str) -> console::StyledObject<&str>>) =
            match msg_type {
                MessageType::Success => (CHECKMARK, Box::new(|msg| style(msg).green().bold())),
                MessageType::Error => (CROSS, Box::new(|msg| style(msg).red().bold())),
                MessageType::Warning => (WARNING, Box::new(|msg| style(msg).yellow().bold())),
                MessageType::Info => (INFO, Box::new(|msg| style(msg).cyan())),
            };

        if self.use_colors {
            match msg_type {
                MessageType::Error => eprintln!("{}{}", emoji, color_fn(message)),
                _ => println!("{}{}", emoji, color_fn(message)),
            }
        } else {
            let prefix = match msg_type {
                MessageType::Success => "✓",
                MessageType::Error => "✗",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };

            match msg_type {
                MessageType::Error => eprintln!("{} {}", prefix, message),
                _ => println!("{} {}", prefix, message),
            }
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string())
        );
    }

    fn highlight(&self, value: impl ToString) -> String {
        if self.use_colors {
            style(value.to_string()).cyan().bold().to_string()
        } else {
            value.to_string()
        }
    }

    fn print_human_summary(&self, title: &str, summary: &RunSummary, duration: Duration) {
        println!();
        self.print_separator();

        let headline = format!("{} completed", title);
        if self.use_colors {
            println!("{} {}", style(headline).green().bold(), CHECKMARK);
        } else {
            println!("✓ {}", headline);
        }

        println!();
        println!("  Rows processed:   {}", self.highlight(summary.processed));
        println!("  Rows skipped:     {}", self.highlight(summary.unprocessed));
        if summary.total_considered > 0 {
            println!("  Matched:          {}", self.highlight(summary.matched));
            println!("  Unmatched:        {}", self.highlight(summary.unmatched));
            println!("  Total considered: {}", self.highlight(summary.total_considered));
        }
        if summary.overwritten > 0 {
            println!("  Overwritten:      {}", self.highlight(summary.overwritten));
        }
        println!("  Time taken:       {}", self.highlight(format_duration(duration)));
        println!(
            "  Output:           {}",
            self.highlight(summary.output_directory.display())
        );

        if summary.has_failures() {
            println!();
            println!("  Failures ({}):", summary.failures.len());
            for failure in &summary.failures {
                println!("    - {}", failure);
            }
        }

        self.print_separator();
    }

    fn print_plain_summary(&self, title: &str, summary: &RunSummary, duration: Duration) {
        println!("COMPLETED: {}", title);
        println!("Processed: {}", summary.processed);
        println!("Unprocessed: {}", summary.unprocessed);
        println!("Matched: {}", summary.matched);
        println!("Unmatched: {}", summary.unmatched);
        println!("Total considered: {}", summary.total_considered);
        println!("Overwritten: {}", summary.overwritten);
        println!("Duration: {:?}", duration);
        println!("Output: {}", summary.output_directory.display());
        for failure in &summary.failures {
            println!("FAILURE: {}", failure);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}

fn format_duration(duration: Duration) -> String {
    crate::ui::progress::format_duration(duration)
}
