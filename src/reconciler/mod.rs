pub mod output_manager;
pub mod placeholder;
pub mod reconciler;

pub use output_manager::{OutputManager, RunReport, METADATA_DIR};
pub use placeholder::{placeholder_file_name, sanitize_filename, write_placeholders, PlaceholderOutcome};
pub use reconciler::{
    EntryFailure, FailureKind, MatchTally, ReconcileOutcome, ReconcileProgress, Reconciler,
};
