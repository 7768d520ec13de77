use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatMatchError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table is missing required columns: {}", missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("Invalid date format: {input}")]
    InvalidDateFormat { input: String },

    #[error("Output path is not an existing directory: {path}")]
    InvalidOutputPath { path: String },

    #[error("Archive could not be read: {archive}: {message}")]
    ArchiveCorrupt { archive: String, message: String },

    #[error("Failed to write {path}: {message}")]
    WriteFailure { path: String, message: String },

    #[error("Spreadsheet error in {path}: {message}")]
    Spreadsheet { path: String, message: String },

    #[error("Unsupported table file: {path}")]
    UnsupportedTable { path: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Pipeline step requires state {expected}, but pipeline is {actual}")]
    InvalidPipelineState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("No archive was provided for the transcripts workflow")]
    NoArchiveProvided,

    #[error("Operation was cancelled by user")]
    Cancelled,
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for ChatMatchError {
    fn user_message(&self) -> String {
        match self {
            ChatMatchError::MissingColumns { missing } => {
                format!(
                    "The table does not contain the required columns: {}",
                    missing.join(", ")
                )
            }
            ChatMatchError::InvalidDateFormat { input } => {
                format!("The date '{}' is not in a supported format", input)
            }
            ChatMatchError::InvalidOutputPath { path } => {
                format!("The output path is not a valid directory: {}", path)
            }
            ChatMatchError::ArchiveCorrupt { archive, message } => {
                format!("Could not read archive {}: {}", archive, message)
            }
            ChatMatchError::WriteFailure { path, message } => {
                format!("Could not write {}: {}", path, message)
            }
            ChatMatchError::Spreadsheet { path, message } => {
                format!("Could not process spreadsheet {}: {}", path, message)
            }
            ChatMatchError::UnsupportedTable { path } => {
                format!("Unsupported table file type: {}", path)
            }
            ChatMatchError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            ChatMatchError::Cancelled => "Operation was cancelled by user".to_string(),
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            ChatMatchError::MissingColumns { .. } => Some(
                "Check the header row of the table, or map your column names in the [columns] section of the configuration file.".to_string()
            ),
            ChatMatchError::InvalidDateFormat { .. } => Some(
                "Use one of the formats 'YYYY-MM-DD', 'DD/MM/YYYY', 'DD-MM-YYYY' or 'YYYYMMDD'.".to_string()
            ),
            ChatMatchError::InvalidOutputPath { .. } => Some(
                "Create the output directory first, or pass an existing directory with --output.".to_string()
            ),
            ChatMatchError::ArchiveCorrupt { .. } => Some(
                "Make sure the file is a complete ZIP archive. Re-download it if the transfer may have been interrupted.".to_string()
            ),
            ChatMatchError::WriteFailure { .. } => Some(
                "Ensure you have write permission for the output directory and enough free disk space.".to_string()
            ),
            ChatMatchError::UnsupportedTable { .. } => Some(
                "Provide the chat log as .csv, .tsv, .xlsx, .xlsm, .xls or .xlsb.".to_string()
            ),
            ChatMatchError::Config { .. } => Some(
                "Check your configuration file syntax and ensure all required fields are present.".to_string()
            ),
            ChatMatchError::NoArchiveProvided => Some(
                "Pass the transcript archive with --archive <file.zip>.".to_string()
            ),
            _ => None,
        }
    }
}

impl ChatMatchError {
    pub fn archive_corrupt(archive: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ChatMatchError::ArchiveCorrupt {
            archive: archive.into(),
            message: message.to_string(),
        }
    }

    pub fn spreadsheet(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ChatMatchError::Spreadsheet {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for ChatMatchError {
    fn from(error: zip::result::ZipError) -> Self {
        ChatMatchError::ArchiveCorrupt {
            archive: "archive".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for ChatMatchError {
    fn from(error: csv::Error) -> Self {
        ChatMatchError::Spreadsheet {
            path: "csv table".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<calamine::Error> for ChatMatchError {
    fn from(error: calamine::Error) -> Self {
        ChatMatchError::Spreadsheet {
            path: "workbook".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for ChatMatchError {
    fn from(error: rust_xlsxwriter::XlsxError) -> Self {
        ChatMatchError::Spreadsheet {
            path: "workbook".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for ChatMatchError {
    fn from(error: toml::de::Error) -> Self {
        ChatMatchError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatMatchError>;
