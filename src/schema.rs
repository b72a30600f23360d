//! Task column discovery for the data worksheet.

use tracing::debug;

use crate::sheet::Worksheet;

/// Row holding the task index markers (1, 2, 3, ...).
pub const TASK_INDEX_ROW: usize = 1;
/// Row holding the per-task max scores.
pub const MAX_SCORE_ROW: usize = 2;
/// First student row.
pub const FIRST_STUDENT_ROW: usize = 3;
/// Task columns start after sequence number, name, presence and variant.
pub const FIRST_TASK_COL: usize = 4;
/// Default upper bound on scanned task columns.
pub const DEFAULT_MAX_TASK_COLUMNS: usize = 100;

/// Where the task columns of a data sheet are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLayout {
    pub task_count: usize,
    pub first_task_col: usize,
}

impl TaskLayout {
    /// Column of 1-based task `task`.
    pub fn column_of(&self, task: u32) -> usize {
        self.first_task_col + task as usize - 1
    }

    pub fn is_empty(&self) -> bool {
        self.task_count == 0
    }
}

/// Counts task markers on `row` starting at `start_col`.
///
/// A marker is any cell holding a non-negative integer; the scan stops at the
/// first blank or non-numeric cell, or after `max_columns` cells.
pub fn discover_tasks<W: Worksheet + ?Sized>(
    sheet: &W,
    row: usize,
    start_col: usize,
    max_columns: usize,
) -> TaskLayout {
    let task_count = (start_col..start_col + max_columns)
        .take_while(|&col| matches!(sheet.cell(row, col).as_integer(), Some(v) if v >= 0))
        .count();

    debug!(task_count, start_col, "Task columns discovered");

    TaskLayout {
        task_count,
        first_task_col: start_col,
    }
}

/// [`discover_tasks`] with the standard data sheet coordinates.
pub fn discover_layout<W: Worksheet + ?Sized>(sheet: &W, max_columns: usize) -> TaskLayout {
    discover_tasks(sheet, TASK_INDEX_ROW, FIRST_TASK_COL, max_columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::{CellValue, Grid};

    fn index_row(cells: Vec<CellValue>) -> Grid {
        let mut row = vec![CellValue::Blank; FIRST_TASK_COL];
        row.extend(cells);
        Grid::from_rows(vec![vec![], row])
    }

    #[test]
    fn test_counts_until_blank() {
        let grid = index_row(vec![
            CellValue::Number(1.0),
            CellValue::Number(2.0),
            CellValue::Number(3.0),
            CellValue::Number(4.0),
            CellValue::Text(String::new()),
            CellValue::Number(6.0),
        ]);
        let layout = discover_layout(&grid, DEFAULT_MAX_TASK_COLUMNS);
        assert_eq!(layout.task_count, 4);
        assert_eq!(layout.first_task_col, FIRST_TASK_COL);
    }

    #[test]
    fn test_stops_at_non_numeric() {
        let grid = index_row(vec![
            CellValue::Text("1".into()),
            CellValue::Text("2".into()),
            CellValue::Text("Итого".into()),
        ]);
        assert_eq!(discover_layout(&grid, DEFAULT_MAX_TASK_COLUMNS).task_count, 2);
    }

    #[test]
    fn test_rejects_negative_and_fractional_markers() {
        let grid = index_row(vec![CellValue::Number(1.0), CellValue::Number(-2.0)]);
        assert_eq!(discover_layout(&grid, DEFAULT_MAX_TASK_COLUMNS).task_count, 1);

        let grid = index_row(vec![CellValue::Number(1.5)]);
        assert!(discover_layout(&grid, DEFAULT_MAX_TASK_COLUMNS).is_empty());
    }

    #[test]
    fn test_scan_is_capped() {
        let grid = index_row((1..=300).map(|n| CellValue::Number(n as f64)).collect());
        assert_eq!(discover_layout(&grid, 100).task_count, 100);
    }

    #[test]
    fn test_column_of() {
        let layout = TaskLayout {
            task_count: 3,
            first_task_col: 4,
        };
        assert_eq!(layout.column_of(1), 4);
        assert_eq!(layout.column_of(3), 6);
    }
}
