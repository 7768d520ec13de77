use crate::error::{ChatMatchError, Result};
use chrono::NaiveDate;

/// Accepted input formats, in priority order. Ambiguous inputs such as
/// `01/02/2024` resolve to the first format that parses.
pub const ACCEPTED_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y%m%d"];

const CANONICAL_FORMAT: &str = "%Y-%m-%d";

/// Parse `input` against [`ACCEPTED_DATE_FORMATS`] and return it as `YYYY-MM-DD`.
pub fn normalize_date(input: &str) -> Result<String> {
    let candidate = input.trim();

    // chrono skips whitespace before numeric fields; an exact match must not.
    if candidate.is_empty() || candidate.chars().any(char::is_whitespace) {
        return Err(ChatMatchError::InvalidDateFormat {
            input: input.to_string(),
        });
    }

    ACCEPTED_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(candidate, format).ok())
        .map(|date| date.format(CANONICAL_FORMAT).to_string())
        .ok_or_else(|| ChatMatchError::InvalidDateFormat {
            input: input.to_string(),
        })
}

/// Folder date for a run: the normalized `requested` date, or `today` when none was given.
pub fn resolve_folder_date(requested: Option<&str>, today: NaiveDate) -> Result<String> {
    match requested {
        Some(date) => normalize_date(date),
        None => Ok(today.format(CANONICAL_FORMAT).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_accepted_format() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        for format in ACCEPTED_DATE_FORMATS {
            let rendered = date.format(format).to_string();
            assert_eq!(normalize_date(&rendered).unwrap(), "2024-05-17", "{}", rendered);
        }
    }

    #[test]
    fn test_fixed_try_order_resolves_ambiguity() {
        // Day first, never locale dependent.
        assert_eq!(normalize_date("01/02/2024").unwrap(), "2024-02-01");
        assert_eq!(normalize_date("01-02-2024").unwrap(), "2024-02-01");
    }

    #[test]
    fn test_compact_format() {
        assert_eq!(normalize_date("20241231").unwrap(), "2024-12-31");
    }

    #[test]
    fn test_rejects_unsupported_inputs() {
        for input in [
            "",
            "2024/05/01",
            "05/17/2024",
            "2024-13-01",
            "31-02-2024",
            "17 May 2024",
            "2024-05- 01",
            "yesterday",
        ] {
            let result = normalize_date(input);
            assert!(
                matches!(result, Err(ChatMatchError::InvalidDateFormat { .. })),
                "should reject {:?}",
                input
            );
        }
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        assert_eq!(normalize_date(" 2024-05-01 ").unwrap(), "2024-05-01");
    }

    #[test]
    fn test_resolve_folder_date() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 9).unwrap();
        assert_eq!(resolve_folder_date(None, today).unwrap(), "2026-01-09");
        assert_eq!(resolve_folder_date(Some("09/01/2025"), today).unwrap(), "2025-01-09");
        assert!(resolve_folder_date(Some("not a date"), today).is_err());
    }
}
