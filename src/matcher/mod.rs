pub mod date_normalizer;
pub mod key_deriver;

pub use date_normalizer::{normalize_date, resolve_folder_date, ACCEPTED_DATE_FORMATS};
pub use key_deriver::{derive_key, KeyFormat, KeySet, MatchKey};
