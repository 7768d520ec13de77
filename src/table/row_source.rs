use crate::error::{ChatMatchError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::Timelike;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb"];
const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

#[derive(Debug, Clone, PartialEq)]
pub enum TableFormat {
    Delimited { delimiter: u8 },
    Workbook { sheet: String },
    InMemory,
}

/// A header row plus string cells, loaded from a CSV file or the first
/// worksheet of a workbook.
#[derive(Debug, Clone)]
pub struct Table {
    source: Option<PathBuf>,
    format: TableFormat,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// One record of a [`Table`], addressed by column name.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    index: usize,
    cells: &'a [String],
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut table = Self {
            source: None,
            format: TableFormat::InMemory,
            headers,
            rows,
        };
        table.align_row_lengths();
        table
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.is_file() {
            return Err(ChatMatchError::spreadsheet(
                path.display().to_string(),
                "file does not exist",
            ));
        }

        let extension = table_extension(path);
        let (format, headers, rows) = if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
            read_workbook(path)?
        } else if DELIMITED_EXTENSIONS.contains(&extension.as_str()) {
            read_delimited(path)?
        } else {
            return Err(ChatMatchError::UnsupportedTable {
                path: path.display().to_string(),
            });
        };

        let mut table = Self {
            source: Some(path.to_path_buf()),
            format,
            headers,
            rows,
        };
        table.align_row_lengths();
        Ok(table)
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn format(&self) -> &TableFormat {
        &self.format
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column lookup ignores case and surrounding whitespace.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = normalize_column_name(name);
        self.headers
            .iter()
            .position(|header| normalize_column_name(header) == wanted)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Fails with every absent column named, not just the first.
    pub fn require_columns(&self, names: &[&str]) -> Result<()> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !self.has_column(name))
            .map(|name| name.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ChatMatchError::MissingColumns { missing })
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().enumerate().map(move |(index, cells)| Row {
            table: self,
            index,
            cells,
        })
    }

    /// Set `name` to `values`, row for row. An existing column with the same
    /// name is overwritten; otherwise the column is appended last.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(ChatMatchError::Config {
                message: format!(
                    "Column '{}' has {} values for {} rows",
                    name,
                    values.len(),
                    self.rows.len()
                ),
            });
        }

        let column = match self.column_index(name) {
            Some(index) => index,
            None => {
                self.headers.push(name.to_string());
                for row in self.rows.iter_mut() {
                    row.push(String::new());
                }
                self.headers.len() - 1
            }
        };

        for (row, value) in self.rows.iter_mut().zip(values) {
            row[column] = value;
        }

        Ok(())
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = self.source.clone().ok_or_else(|| ChatMatchError::Config {
            message: "Table was not loaded from a file; pass an explicit destination".to_string(),
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let extension = table_extension(path);

        match extension.as_str() {
            "xlsx" => self.write_workbook(path),
            "csv" | "tsv" | "txt" => {
                let delimiter = match (&self.format, extension.as_str()) {
                    (_, "tsv") => b'\t',
                    (TableFormat::Delimited { delimiter }, _) => *delimiter,
                    _ => b',',
                };
                self.write_delimited(path, delimiter)
            }
            _ => Err(ChatMatchError::UnsupportedTable {
                path: format!("{} (only .xlsx, .csv, .tsv and .txt can be written)", path.display()),
            }),
        }
    }

    fn write_delimited(&self, path: &Path, delimiter: u8) -> Result<()> {
        let display = path.display().to_string();
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)
            .map_err(|e| ChatMatchError::spreadsheet(display.clone(), e))?;

        writer
            .write_record(&self.headers)
            .map_err(|e| ChatMatchError::spreadsheet(display.clone(), e))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| ChatMatchError::spreadsheet(display.clone(), e))?;
        }
        writer.flush()?;

        Ok(())
    }

    fn write_workbook(&self, path: &Path) -> Result<()> {
        let display = path.display().to_string();
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let worksheet = workbook.add_worksheet();

        if let TableFormat::Workbook { ref sheet } = self.format {
            worksheet
                .set_name(sheet)
                .map_err(|e| ChatMatchError::spreadsheet(display.clone(), e))?;
        }

        for (col, header) in self.headers.iter().enumerate() {
            worksheet
                .write_string(0, col as u16, header)
                .map_err(|e| ChatMatchError::spreadsheet(display.clone(), e))?;
        }

        for (row_index, row) in self.rows.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                worksheet
                    .write_string((row_index + 1) as u32, col as u16, value)
                    .map_err(|e| ChatMatchError::spreadsheet(display.clone(), e))?;
            }
        }

        workbook
            .save(path)
            .map_err(|e| ChatMatchError::spreadsheet(display, e))?;

        Ok(())
    }

    fn align_row_lengths(&mut self) {
        let column_count = self
            .rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0);

        if self.headers.len() < column_count {
            self.headers.resize(column_count, String::new());
        }

        for row in self.rows.iter_mut() {
            row.resize(column_count, String::new());
        }
    }
}

impl<'a> Row<'a> {
    /// Zero-based position among the data rows (the header is not counted).
    pub fn index(&self) -> usize {
        self.index
    }

    /// Raw cell text, `None` when the column does not exist.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.table
            .column_index(column)
            .and_then(|index| self.cells.get(index))
            .map(String::as_str)
    }

    /// Trimmed cell text, or `placeholder` when the cell is empty or the
    /// column is absent.
    pub fn field_or<'p>(&self, column: &str, placeholder: &'p str) -> &'p str
    where
        'a: 'p,
    {
        match self.get(column).map(str::trim) {
            Some(value) if !value.is_empty() => value,
            _ => placeholder,
        }
    }
}

fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn table_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}

type RawTable = (TableFormat, Vec<String>, Vec<Vec<String>>);

fn read_delimited(path: &Path) -> Result<RawTable> {
    let display = path.display().to_string();
    let delimiter = detect_delimiter(path)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| ChatMatchError::spreadsheet(display.clone(), e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ChatMatchError::spreadsheet(display.clone(), e))?
        .iter()
        .map(|value| value.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ChatMatchError::spreadsheet(display.clone(), e))?;
        let values: Vec<String> = record.iter().map(|value| value.trim().to_string()).collect();
        if values.iter().all(|value| value.is_empty()) {
            continue;
        }
        rows.push(values);
    }

    Ok((TableFormat::Delimited { delimiter }, headers, rows))
}

fn detect_delimiter(path: &Path) -> Result<u8> {
    if table_extension(path) == "tsv" {
        return Ok(b'\t');
    }

    let file = File::open(path)?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line)?;

    let tabs = first_line.matches('\t').count();
    let commas = first_line.matches(',').count();
    let semicolons = first_line.matches(';').count();

    Ok(if tabs > commas && tabs >= semicolons {
        b'\t'
    } else if semicolons > commas {
        b';'
    } else {
        b','
    })
}

fn read_workbook(path: &Path) -> Result<RawTable> {
    let display = path.display().to_string();
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ChatMatchError::spreadsheet(display.clone(), e))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ChatMatchError::spreadsheet(display.clone(), "workbook has no worksheets"))?;

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| ChatMatchError::spreadsheet(display.clone(), e))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = rows_iter
        .next()
        .ok_or_else(|| ChatMatchError::spreadsheet(display.clone(), "worksheet is empty"))?
        .iter()
        .map(cell_to_string)
        .collect();

    let rows = rows_iter
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
        .filter(|values| values.iter().any(|value| !value.is_empty()))
        .collect();

    Ok((TableFormat::Workbook { sheet }, headers, rows))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(value) => {
            let serial = value.as_f64();
            match value.as_datetime() {
                Some(dt) if value.is_datetime() => {
                    if serial < 1.0 {
                        dt.format("%H:%M:%S").to_string()
                    } else if dt.num_seconds_from_midnight() == 0 {
                        dt.format("%Y-%m-%d").to_string()
                    } else {
                        dt.format("%Y-%m-%d %H:%M:%S").to_string()
                    }
                }
                _ => serial.to_string(),
            }
        }
        _ => cell.to_string().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_table() -> Table {
        Table::new(
            vec![" Date ".to_string(), "TIME".to_string(), "Session GUID".to_string()],
            vec![
                vec!["2024/05/01".to_string(), "12:30:00".to_string(), "A1".to_string()],
                vec!["2024/05/02".to_string(), "".to_string()],
            ],
        )
    }

    #[test]
    fn test_column_lookup_is_case_and_space_insensitive() {
        let table = sample_table();
        assert_eq!(table.column_index("DATE"), Some(0));
        assert_eq!(table.column_index("session guid"), Some(2));
        assert_eq!(table.column_index("agent"), None);
    }

    #[test]
    fn test_require_columns_names_all_missing() {
        let table = sample_table();
        assert!(table.require_columns(&["DATE", "TIME"]).is_ok());

        match table.require_columns(&["DATE", "agent", "customer id"]) {
            Err(ChatMatchError::MissingColumns { missing }) => {
                assert_eq!(missing, vec!["agent", "customer id"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_short_rows_are_padded_and_placeholders_apply() {
        let table = sample_table();
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("time"), Some("12:30:00"));
        assert_eq!(rows[1].get("session guid"), Some(""));
        assert_eq!(rows[1].field_or("session guid", "[None]"), "[None]");
        assert_eq!(rows[1].field_or("agent", "[None]"), "[None]");
    }

    #[test]
    fn test_set_column_appends_then_overwrites() {
        let mut table = sample_table();
        table
            .set_column("MATCH NAME", vec!["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(table.headers().last().map(String::as_str), Some("MATCH NAME"));

        table
            .set_column("match name", vec!["c".to_string(), "d".to_string()])
            .unwrap();
        assert_eq!(table.headers().len(), 4);
        let last: Vec<_> = table.rows().map(|r| r.get("MATCH NAME").unwrap()).collect();
        assert_eq!(last, vec!["c", "d"]);

        assert!(table.set_column("X", vec!["only one".to_string()]).is_err());
    }

    #[test]
    fn test_csv_load_and_save() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.csv");
        fs::write(
            &path,
            "DATE,TIME,SESSION GUID\n2024/05/01,12:30:00,A1\n,,\n2024/05/02,08:00:00,B2\n",
        )
        .unwrap();

        let mut table = Table::load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.format(), &TableFormat::Delimited { delimiter: b',' });

        table
            .set_column("MATCH NAME", vec!["k1".to_string(), "k2".to_string()])
            .unwrap();
        table.save().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("DATE,TIME,SESSION GUID,MATCH NAME"));
        assert!(content.contains("2024/05/02,08:00:00,B2,k2"));
    }

    #[test]
    fn test_semicolon_delimiter_detection() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.txt");
        fs::write(&path, "DATE;TIME;SESSION GUID\n01/05/2024;10:00;Z\n").unwrap();

        let table = Table::load(&path).unwrap();
        let row = table.rows().next().unwrap();
        assert_eq!(row.get("SESSION GUID"), Some("Z"));
    }

    #[test]
    fn test_workbook_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.xlsx");

        let mut table = sample_table();
        table
            .set_column("MATCH NAME", vec!["k1".to_string(), "k2".to_string()])
            .unwrap();
        table.save_to(&path).unwrap();

        let loaded = Table::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(matches!(loaded.format(), TableFormat::Workbook { .. }));
        let first = loaded.rows().next().unwrap();
        assert_eq!(first.get("MATCH NAME"), Some("k1"));
        assert_eq!(first.get("DATE"), Some("2024/05/01"));
    }

    #[test]
    fn test_excel_dates_and_times_render_as_text() {
        use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("typed.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let time_format = Format::new().set_num_format("hh:mm:ss");
        sheet.write_string(0, 0, "DATE").unwrap();
        sheet.write_string(0, 1, "TIME").unwrap();
        sheet.write_string(0, 2, "chat time").unwrap();
        let date = ExcelDateTime::from_ymd(2024, 5, 1).unwrap();
        let time = ExcelDateTime::from_hms(12, 30, 0).unwrap();
        let zero = ExcelDateTime::from_hms(0, 0, 0).unwrap();
        sheet.write_datetime_with_format(1, 0, &date, &date_format).unwrap();
        sheet.write_datetime_with_format(1, 1, &time, &time_format).unwrap();
        sheet.write_datetime_with_format(1, 2, &zero, &time_format).unwrap();
        workbook.save(&path).unwrap();

        let loaded = Table::load(&path).unwrap();
        let row = loaded.rows().next().unwrap();
        assert_eq!(row.get("DATE"), Some("2024-05-01"));
        assert_eq!(row.get("TIME"), Some("12:30:00"));
        assert_eq!(row.get("chat time"), Some("00:00:00"));
    }

    #[test]
    fn test_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.json");
        fs::write(&path, "{}").unwrap();

        assert!(matches!(
            Table::load(&path),
            Err(ChatMatchError::UnsupportedTable { .. })
        ));
    }
}
