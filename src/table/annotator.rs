use crate::config::Config;
use crate::error::Result;
use crate::matcher::{derive_key, KeyFormat, MatchKey};
use crate::table::Table;

/// Derive a key for every row and store it in the `MATCH NAME` column.
///
/// Unlike the transcripts pipeline, no row is skipped here: the column must
/// line up with the table, so empty identity cells become the placeholder.
pub fn annotate_match_names(
    table: &mut Table,
    config: &Config,
    format: &KeyFormat,
) -> Result<Vec<MatchKey>> {
    let columns = &config.columns;
    let placeholder = config.matching.placeholder.as_str();

    table.require_columns(&[
        columns.date.as_str(),
        columns.time.as_str(),
        columns.session_id.as_str(),
    ])?;

    let keys: Vec<MatchKey> = table
        .rows()
        .map(|row| {
            derive_key(
                row.field_or(&columns.date, placeholder),
                row.field_or(&columns.time, placeholder),
                row.field_or(&columns.session_id, placeholder),
                format,
            )
        })
        .collect();

    table.set_column(
        &columns.match_name,
        keys.iter().map(|key| key.as_str().to_string()).collect(),
    )?;

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatMatchError;

    fn log_table() -> Table {
        Table::new(
            vec!["DATE".into(), "TIME".into(), "SESSION GUID".into(), "NOTES".into()],
            vec![
                vec!["2024/05/01".into(), "12:30:00".into(), "ABC123".into(), "x".into()],
                vec!["2024/05/01".into(), "".into(), "DEF456".into(), "".into()],
            ],
        )
    }

    #[test]
    fn test_column_is_appended_last() {
        let mut table = log_table();
        let keys = annotate_match_names(&mut table, &Config::default(), &KeyFormat::column()).unwrap();

        assert_eq!(keys[0].as_str(), "chat_2024-05-01_123000_ABC123");
        assert_eq!(keys[1].as_str(), "chat_2024-05-01_[None]_DEF456");
        assert_eq!(table.headers().last().map(String::as_str), Some("MATCH NAME"));
        assert_eq!(table.headers().len(), 5);

        let notes: Vec<_> = table.rows().map(|r| r.get("NOTES").unwrap()).collect();
        assert_eq!(notes, vec!["x", ""]);
    }

    #[test]
    fn test_missing_columns_abort_before_mutation() {
        let mut table = Table::new(
            vec!["DATE".into(), "TIME".into()],
            vec![vec!["2024/05/01".into(), "10:00".into()]],
        );

        let result = annotate_match_names(&mut table, &Config::default(), &KeyFormat::column());
        assert!(matches!(result, Err(ChatMatchError::MissingColumns { .. })));
        assert_eq!(table.headers().len(), 2);
    }

    #[test]
    fn test_reannotating_overwrites_existing_column() {
        let mut table = log_table();
        let config = Config::default();
        annotate_match_names(&mut table, &config, &KeyFormat::column()).unwrap();
        annotate_match_names(&mut table, &config, &KeyFormat::concatenated()).unwrap();

        assert_eq!(table.headers().len(), 5);
        let first = table.rows().next().unwrap();
        assert_eq!(first.get("MATCH NAME"), Some("chat_2024-05-01123000ABC123"));
    }
}
