pub mod annotator;
pub mod row_source;

pub use annotator::annotate_match_names;
pub use row_source::{Row, Table, TableFormat};
