use crate::error::{ChatMatchError, Result};
use crate::matcher::KeyFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub matching: MatchConfig,
    pub columns: ColumnConfig,
    pub archive: ArchiveConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatchConfig {
    pub prefix: String,
    pub separator: String,
    pub html_suffix: bool,
    pub placeholder: String,
    pub zero_duration: String,
    pub chat_time_filter: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnConfig {
    pub date: String,
    pub time: String,
    pub session_id: String,
    pub agent: String,
    pub customer_id: String,
    pub account_name: String,
    pub chat_time: String,
    pub match_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    pub archive_extension: String,
    pub content_extension: String,
    pub exclude_patterns: Vec<String>,
    pub max_entry_size: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub base_directory: PathBuf,
    pub generate_report: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            prefix: "chat_".to_string(),
            separator: "_".to_string(),
            html_suffix: true,
            placeholder: "[None]".to_string(),
            zero_duration: "00:00:00".to_string(),
            chat_time_filter: true,
        }
    }
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            date: "DATE".to_string(),
            time: "TIME".to_string(),
            session_id: "SESSION GUID".to_string(),
            agent: "agent".to_string(),
            customer_id: "customer id".to_string(),
            account_name: "account name".to_string(),
            chat_time: "chat time".to_string(),
            match_name: "MATCH NAME".to_string(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            archive_extension: "zip".to_string(),
            content_extension: "html".to_string(),
            exclude_patterns: vec![r"(^|/)__MACOSX/".to_string(), r"(^|/)\._".to_string()],
            max_entry_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            generate_report: true,
        }
    }
}

impl MatchConfig {
    /// Key format used to match transcript file names written with `content_extension`.
    pub fn transcript_key_format(&self, content_extension: &str) -> KeyFormat {
        let extension = content_extension.trim().trim_start_matches('.');
        KeyFormat {
            prefix: self.prefix.clone(),
            separator: self.separator.clone(),
            suffix: self.html_suffix.then(|| format!(".{}", extension)),
        }
    }

    /// Key format written into the `MATCH NAME` column by the annotate workflow.
    pub fn column_key_format(&self) -> KeyFormat {
        KeyFormat {
            prefix: self.prefix.clone(),
            separator: self.separator.clone(),
            suffix: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ChatMatchError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ChatMatchError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ChatMatchError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["chatmatch.toml", "chatmatch.config.toml", ".chatmatch.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref separator) = cli_args.separator {
            self.matching.separator = separator.clone();
        }

        if let Some(html_suffix) = cli_args.html_suffix {
            self.matching.html_suffix = html_suffix;
        }

        if let Some(ref placeholder) = cli_args.placeholder {
            self.matching.placeholder = placeholder.clone();
        }

        if let Some(ref output_dir) = cli_args.output_dir {
            self.output.base_directory = output_dir.clone();
        }

        if let Some(generate_report) = cli_args.generate_report {
            self.output.generate_report = generate_report;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| ChatMatchError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| ChatMatchError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.matching.placeholder.is_empty() {
            return Err(ChatMatchError::Config {
                message: "The placeholder token must not be empty".to_string(),
            });
        }

        if self.archive.archive_extension.trim().is_empty()
            || self.archive.content_extension.trim().is_empty()
        {
            return Err(ChatMatchError::Config {
                message: "Archive and content extensions must be specified".to_string(),
            });
        }

        if self.archive.max_entry_size == 0 {
            return Err(ChatMatchError::Config {
                message: "Maximum entry size must be greater than 0".to_string(),
            });
        }

        for pattern in &self.archive.exclude_patterns {
            regex::Regex::new(pattern).map_err(|e| ChatMatchError::Config {
                message: format!("Invalid exclude pattern '{}': {}", pattern, e),
            })?;
        }

        let columns = [
            &self.columns.date,
            &self.columns.time,
            &self.columns.session_id,
            &self.columns.agent,
            &self.columns.customer_id,
            &self.columns.account_name,
            &self.columns.chat_time,
            &self.columns.match_name,
        ];
        if columns.iter().any(|c| c.trim().is_empty()) {
            return Err(ChatMatchError::Config {
                message: "Column names must not be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn create_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub separator: Option<String>,
    pub html_suffix: Option<bool>,
    pub placeholder: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub generate_report: Option<bool>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_separator(mut self, separator: Option<String>) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_html_suffix(mut self, html_suffix: Option<bool>) -> Self {
        self.html_suffix = html_suffix;
        self
    }

    pub fn with_placeholder(mut self, placeholder: Option<String>) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_generate_report(mut self, generate_report: Option<bool>) -> Self {
        self.generate_report = generate_report;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.matching.separator, "_");
        assert_eq!(config.matching.placeholder, "[None]");
        assert_eq!(config.columns.session_id, "SESSION GUID");
        assert_eq!(config.archive.content_extension, "html");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.archive.exclude_patterns.push("([unclosed".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.columns.time = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.matching.separator = String::new();
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();

        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded_config.matching.separator, "");
        assert_eq!(loaded_config.columns.date, "DATE");
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();

        let overrides = CliOverrides::new()
            .with_separator(Some(String::new()))
            .with_html_suffix(Some(false))
            .with_placeholder(Some("N/A".to_string()));

        config.merge_with_cli_args(&overrides);

        assert_eq!(config.matching.separator, "");
        assert!(!config.matching.html_suffix);
        assert_eq!(config.matching.placeholder, "N/A");
    }

    #[test]
    fn test_key_formats_follow_matching_config() {
        let config = MatchConfig::default();
        assert_eq!(config.transcript_key_format("html").suffix.as_deref(), Some(".html"));
        assert_eq!(config.transcript_key_format(".htm").suffix.as_deref(), Some(".htm"));
        assert_eq!(config.column_key_format().suffix, None);

        let config = MatchConfig {
            html_suffix: false,
            ..MatchConfig::default()
        };
        assert_eq!(config.transcript_key_format("html").suffix, None);
    }

    #[test]
    fn test_sample_config_generation() {
        let sample = Config::create_sample_config();
        assert!(sample.contains("[matching]"));
        assert!(sample.contains("[columns]"));
        assert!(sample.contains("[archive]"));
        assert!(sample.contains("[output]"));
    }
}
