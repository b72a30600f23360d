//! Fuzzy header-to-column resolution.

use crate::sheet::{Grid, Worksheet};

/// Keywords whose presence marks a roster header row.
pub const HEADER_KEYWORDS: &[&str] = &["фио", "класс", "учитель", "предмет", "ученик"];

/// Minimum keyword hits for a row to count as the header.
pub const MIN_HEADER_HITS: usize = 2;

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Header cells of one row, searchable by candidate names.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    cells: Vec<String>,
}

impl HeaderIndex {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    pub fn from_row(grid: &Grid, row: usize) -> Self {
        Self::new(grid.row_texts(row))
    }

    /// Column of the first candidate that resolves.
    ///
    /// Each candidate is tried as an exact (trimmed) match first, then as a
    /// substring of a header cell or vice versa, ignoring case and whitespace.
    pub fn resolve(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|candidate| self.resolve_one(candidate))
    }

    fn resolve_one(&self, candidate: &str) -> Option<usize> {
        let wanted = candidate.trim();
        if wanted.is_empty() {
            return None;
        }
        if let Some(col) = self.cells.iter().position(|c| c.trim() == wanted) {
            return Some(col);
        }

        let wanted = squash(wanted);
        self.cells.iter().position(|cell| {
            let cell = squash(cell);
            !cell.is_empty() && (cell.contains(&wanted) || wanted.contains(&cell))
        })
    }
}

/// Row among the first `scan_rows` with the most header keywords, if it has
/// at least [`MIN_HEADER_HITS`]. Ties go to the earliest row.
pub fn find_header_row(grid: &Grid, scan_rows: usize) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;

    for row in 0..scan_rows.min(grid.height()) {
        let hits = (0..grid.width())
            .filter_map(|col| grid.cell(row, col).as_text())
            .map(|text| {
                let lowered = text.to_lowercase();
                HEADER_KEYWORDS
                    .iter()
                    .filter(|k| lowered.contains(*k))
                    .count()
            })
            .sum::<usize>();

        if hits >= MIN_HEADER_HITS && best.is_none_or(|(_, top)| hits > top) {
            best = Some((row, hits));
        }
    }

    best.map(|(row, _)| row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::CellValue;

    fn header(cells: &[&str]) -> HeaderIndex {
        HeaderIndex::new(cells.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_exact_match_wins_over_substring() {
        let index = header(&["ФИО учителя", "ФИО", "Класс"]);
        assert_eq!(index.resolve(&["ФИО"]), Some(1));
    }

    #[test]
    fn test_substring_both_directions() {
        let index = header(&["№", "Фамилия Имя", "Класс ученика", "Учитель"]);
        assert_eq!(index.resolve(&["класс"]), Some(2));
        assert_eq!(index.resolve(&["Учитель (ФИО)", "Учитель"]), Some(3));
        assert_eq!(index.resolve(&["учительфио"]), Some(3));
    }

    #[test]
    fn test_first_resolvable_candidate_wins() {
        let index = header(&["Группа", "Подгруппа"]);
        assert_eq!(index.resolve(&["Профиль", "Подгруппа", "Группа"]), Some(1));
        assert_eq!(index.resolve(&["Предмет"]), None);
    }

    #[test]
    fn test_blank_cells_never_match() {
        let index = header(&["", "Класс"]);
        assert_eq!(index.resolve(&["Класс"]), Some(1));
        assert_eq!(index.resolve(&["  "]), None);
    }

    #[test]
    fn test_find_header_row() {
        let t = |s: &str| CellValue::Text(s.to_string());
        let grid = Grid::from_rows(vec![
            vec![t("Список учеников школы №5")],
            vec![],
            vec![t("ФИО ученика"), t("Класс"), t("Предмет"), t("Учитель")],
            vec![t("Иванов Иван"), t("10 А"), t("Физика"), t("Сидорова")],
        ]);
        assert_eq!(find_header_row(&grid, 20), Some(2));
        assert_eq!(find_header_row(&grid, 2), None);
    }
}
