//! Worksheet reader for assessment workbooks and roster files.
//!
//! Spreadsheets are decoded with `calamine` and copied into an in-memory
//! [`Grid`], so the rest of the pipeline only sees [`CellValue`]s addressed by
//! 0-based `(row, col)`.

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::error::{IngestError, Result};

/// Extensions accepted as assessment workbooks.
pub const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Blank,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

static BLANK: CellValue = CellValue::Blank;

impl CellValue {
    /// Blank cells and whitespace-only text are both treated as blank.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Blank => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed text rendering of the cell, `None` when blank.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Blank => None,
            CellValue::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::Date(d) => Some(d.format("%d.%m.%Y").to_string()),
        }
    }

    /// Integer value of a numeric cell or of text holding an integer.
    /// Fractional numbers are rejected.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(*n as i64),
            CellValue::Text(s) => {
                let t = s.trim();
                if let Ok(v) = t.parse::<i64>() {
                    return Some(v);
                }
                let f = t.replace(',', ".").parse::<f64>().ok()?;
                (f.fract() == 0.0 && f.abs() < 1e15).then_some(f as i64)
            }
            _ => None,
        }
    }

    /// Date value of a date cell, an Excel serial number, or a date string.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            CellValue::Number(n) if *n > 0.0 => excel_serial_to_date(*n),
            CellValue::Text(s) => parse_date_text(s.trim()),
            _ => None,
        }
    }
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::try_days(serial.trunc() as i64)?)
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    // "12.03.2025 00:00:00" style exports carry a time part
    let s = s.split_whitespace().next()?;
    ["%d.%m.%Y", "%Y-%m-%d", "%d/%m/%Y", "%d.%m.%y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

impl From<&Data> for CellValue {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty => CellValue::Blank,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(d) => CellValue::Date(d.date()),
                None => CellValue::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) => parse_date_text(s)
                .or_else(|| s.get(..10).and_then(parse_date_text))
                .map(CellValue::Date)
                .unwrap_or_else(|| CellValue::Text(s.clone())),
            Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(e) => CellValue::Text(format!("#{e:?}")),
        }
    }
}

/// Read access to a rectangular sheet of cells.
pub trait Worksheet {
    /// The cell at `(row, col)`; out-of-range cells are blank.
    fn cell(&self, row: usize, col: usize) -> &CellValue;

    /// Number of rows that may hold non-blank cells.
    fn height(&self) -> usize;

    /// Number of columns that may hold non-blank cells.
    fn width(&self) -> usize;
}

/// Dense in-memory worksheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<CellValue>>,
    width: usize,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a grid from rows of cells; rows may have different lengths.
    pub fn from_rows(rows: Vec<Vec<CellValue>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self { rows, width }
    }

    pub fn set(&mut self, row: usize, col: usize, value: CellValue) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, CellValue::Blank);
        }
        cells[col] = value;
        self.width = self.width.max(col + 1);
    }

    /// Text cells of one row, as used for header rows.
    pub fn row_texts(&self, row: usize) -> Vec<String> {
        (0..self.width)
            .map(|col| self.cell(row, col).as_text().unwrap_or_default())
            .collect()
    }
}

impl Worksheet for Grid {
    fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .unwrap_or(&BLANK)
    }

    fn height(&self) -> usize {
        self.rows.len()
    }

    fn width(&self) -> usize {
        self.width
    }
}

/// All sheets of one workbook, in workbook order.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<(String, Grid)>,
}

impl Workbook {
    pub fn from_sheets(sheets: Vec<(String, Grid)>) -> Self {
        Self { sheets }
    }

    /// Decodes every sheet of a spreadsheet file.
    ///
    /// # Errors
    ///
    /// Returns an I/O class error if the file cannot be opened or decoded.
    pub fn open(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)?;
        let mut sheets = Vec::new();

        for name in workbook.sheet_names() {
            let range = workbook.worksheet_range(&name)?;
            let (row0, col0) = range.start().unwrap_or((0, 0));
            let mut grid = Grid::new();
            for (row, col, value) in range.cells() {
                if matches!(value, Data::Empty) {
                    continue;
                }
                grid.set(row0 as usize + row, col0 as usize + col, value.into());
            }
            debug!(sheet = %name, rows = grid.height(), cols = grid.width(), "Sheet decoded");
            sheets.push((name, grid));
        }

        Ok(Self { sheets })
    }

    /// Sheet by case-insensitive name.
    pub fn sheet(&self, name: &str) -> Option<&Grid> {
        let wanted = name.trim().to_lowercase();
        self.sheets
            .iter()
            .find(|(n, _)| n.trim().to_lowercase() == wanted)
            .map(|(_, grid)| grid)
    }

    pub fn sheet_at(&self, index: usize) -> Option<&Grid> {
        self.sheets.get(index).map(|(_, grid)| grid)
    }

    /// Sheet by name, falling back to the sheet at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MissingSheet`] when neither exists.
    pub fn sheet_or_position(&self, name: &str, index: usize) -> Result<&Grid> {
        self.sheet(name)
            .or_else(|| self.sheet_at(index))
            .ok_or_else(|| IngestError::MissingSheet(name.to_string()))
    }
}

/// Loads a roster table from `.csv` or from the first sheet of a workbook.
///
/// # Errors
///
/// Returns an I/O class error if the file cannot be read.
pub fn load_table(path: &Path) -> Result<Grid> {
    let ext = extension_of(path);
    if ext == "csv" {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|field| {
                        if field.trim().is_empty() {
                            CellValue::Blank
                        } else {
                            CellValue::Text(field.to_string())
                        }
                    })
                    .collect(),
            );
        }
        return Ok(Grid::from_rows(rows));
    }

    if !WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
        return Err(IngestError::UnsupportedFile(path.display().to_string()));
    }

    let workbook = Workbook::open(path)?;
    workbook
        .sheet_at(0)
        .cloned()
        .ok_or_else(|| IngestError::MissingSheet("0".to_string()))
}

/// Lowercased file extension, empty when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_out_of_range_cells_are_blank() {
        let grid = Grid::from_rows(vec![vec![text("a")]]);
        assert_eq!(grid.cell(0, 0), &text("a"));
        assert!(grid.cell(0, 5).is_blank());
        assert!(grid.cell(9, 0).is_blank());
    }

    #[test]
    fn test_set_grows_grid() {
        let mut grid = Grid::new();
        grid.set(2, 3, CellValue::Number(1.0));
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.width(), 4);
        assert!(grid.cell(1, 1).is_blank());
    }

    #[test]
    fn test_as_integer() {
        assert_eq!(CellValue::Number(3.0).as_integer(), Some(3));
        assert_eq!(CellValue::Number(2.5).as_integer(), None);
        assert_eq!(text(" 4 ").as_integer(), Some(4));
        assert_eq!(text("2,0").as_integer(), Some(2));
        assert_eq!(text("abc").as_integer(), None);
        assert_eq!(CellValue::Blank.as_integer(), None);
    }

    #[test]
    fn test_as_text_renders_whole_numbers_without_fraction() {
        assert_eq!(CellValue::Number(10.0).as_text().as_deref(), Some("10"));
        assert_eq!(text("  ").as_text(), None);
    }

    #[test]
    fn test_as_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        assert_eq!(text("12.03.2025").as_date(), Some(expected));
        assert_eq!(text("2025-03-12").as_date(), Some(expected));
        assert_eq!(text("12.03.2025 00:00:00").as_date(), Some(expected));
        assert_eq!(CellValue::Number(45728.0).as_date(), Some(expected));
        assert_eq!(text("вчера").as_date(), None);
    }

    #[test]
    fn test_huge_serial_is_not_a_date() {
        assert_eq!(CellValue::Number(1e14).as_date(), None);
        assert_eq!(CellValue::Number(1e300).as_date(), None);
    }

    #[test]
    fn test_sheet_lookup_falls_back_to_position() {
        let wb = Workbook::from_sheets(vec![
            ("Лист1".to_string(), Grid::new()),
            ("Data".to_string(), Grid::from_rows(vec![vec![text("x")]])),
        ]);
        assert!(wb.sheet("data").is_some());
        assert!(wb.sheet_or_position("metadata", 0).is_ok());
        assert!(wb.sheet_or_position("nothing", 5).is_err());
    }

    #[test]
    fn test_load_table_from_csv() {
        let path = env::temp_dir().join("assessment_ingest_sheet_table.csv");
        fs::write(&path, "ФИО,Класс\nИванов Иван,10 А\n,\n").unwrap();

        let grid = load_table(&path).unwrap();
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.cell(1, 1).as_text().as_deref(), Some("10 А"));
        assert!(grid.cell(2, 0).is_blank());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_table_rejects_unknown_extension() {
        let err = load_table(Path::new("roster.txt")).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFile(_)));
    }
}
