//! Composite-key lookup table built from a roster sheet.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::normalize::{FieldNormalizer, collapse_whitespace};
use crate::roster::header::{HeaderIndex, find_header_row};
use crate::sheet::{Grid, Worksheet};

/// Teacher values that mean "no teacher".
pub const TEACHER_SENTINELS: &[&str] = &[
    "",
    "нет",
    "не указан",
    "неизвестно",
    "-",
    "—",
    "отсутствует",
    "null",
];

const NAME_HEADERS: &[&str] = &["ФИО ученика", "ФИО обучающегося", "Ученик", "Обучающийся", "ФИО"];
const CLASS_HEADERS: &[&str] = &["Класс"];
const SUBJECT_HEADERS: &[&str] = &["Предмет", "Дисциплина"];
const TEACHER_HEADERS: &[&str] = &["Учитель", "ФИО учителя", "Преподаватель", "Педагог", "Учител"];
const GROUP_HEADERS: &[&str] = &["Группа", "Подгруппа"];

/// Whether a teacher value names an actual teacher.
pub fn is_valid_teacher(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    !TEACHER_SENTINELS.contains(&value.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub teacher: String,
    pub group: Option<String>,
}

/// Column positions of the roster fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterColumns {
    pub name: usize,
    pub class: usize,
    pub subject: usize,
    pub teacher: usize,
    pub group: Option<usize>,
}

impl RosterColumns {
    /// # Errors
    ///
    /// [`IngestError::RosterColumnMissing`] for any required field.
    pub fn resolve(header: &HeaderIndex) -> Result<Self> {
        let required = |field: &'static str, candidates: &[&str]| {
            header
                .resolve(candidates)
                .ok_or(IngestError::RosterColumnMissing(field))
        };

        Ok(Self {
            name: required("name", NAME_HEADERS)?,
            class: required("class", CLASS_HEADERS)?,
            subject: required("subject", SUBJECT_HEADERS)?,
            teacher: required("teacher", TEACHER_HEADERS)?,
            group: header.resolve(GROUP_HEADERS),
        })
    }
}

/// Counts gathered while indexing a roster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RosterStats {
    pub rows_seen: usize,
    pub rows_indexed: usize,
    pub rows_without_teacher: usize,
    pub rows_without_name: usize,
    pub duplicate_keys: usize,
}

/// Read-only roster lookup keyed by `name|class|subject`.
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    entries: HashMap<String, RosterEntry>,
}

impl RosterIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every usable row below the discovered header row.
    ///
    /// # Errors
    ///
    /// Schema errors when the header row or a required column is missing.
    pub fn build(
        grid: &Grid,
        normalizer: &FieldNormalizer,
        scan_rows: usize,
    ) -> Result<(Self, RosterStats)> {
        let header_row =
            find_header_row(grid, scan_rows).ok_or(IngestError::RosterHeaderNotFound {
                scanned: scan_rows,
            })?;
        let columns = RosterColumns::resolve(&HeaderIndex::from_row(grid, header_row))?;
        debug!(header_row, ?columns, "Roster columns resolved");

        let mut index = Self::new();
        let mut stats = RosterStats::default();

        for row in header_row + 1..grid.height() {
            let text = |col: usize| grid.cell(row, col).as_text().unwrap_or_default();
            let name = text(columns.name);
            let teacher = collapse_whitespace(&text(columns.teacher));

            if (0..grid.width()).all(|col| grid.cell(row, col).is_blank()) {
                continue;
            }
            stats.rows_seen += 1;

            if name.is_empty() {
                stats.rows_without_name += 1;
                continue;
            }
            if !is_valid_teacher(&teacher) {
                stats.rows_without_teacher += 1;
                continue;
            }

            let key = normalizer.composite_key(&name, &text(columns.class), &text(columns.subject));
            let group = columns
                .group
                .map(|col| collapse_whitespace(&text(col)))
                .filter(|g| !g.is_empty());

            if index.insert(key, RosterEntry { teacher, group }).is_some() {
                stats.duplicate_keys += 1;
            }
            stats.rows_indexed += 1;
        }

        info!(
            entries = index.len(),
            rows_seen = stats.rows_seen,
            without_teacher = stats.rows_without_teacher,
            duplicates = stats.duplicate_keys,
            "Roster index built"
        );

        Ok((index, stats))
    }

    /// Inserts an entry; a later entry for the same key replaces the earlier.
    pub fn insert(&mut self, key: String, entry: RosterEntry) -> Option<RosterEntry> {
        self.entries.insert(key, entry)
    }

    pub fn get(&self, key: &str) -> Option<&RosterEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::CellValue;

    fn t(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn roster() -> Grid {
        Grid::from_rows(vec![
            vec![t("Распределение по группам")],
            vec![t("№"), t("ФИО ученика"), t("Класс"), t("Предмет"), t("ФИО учителя"), t("Группа")],
            vec![t("1"), t("Иванов Иван Иванович"), t("10 А"), t("Математика (профиль)"), t("Сидорова А. В."), t("10А-1")],
            vec![t("2"), t("Петров Пётр"), t("10А"), t("Физика"), t("нет"), t("10А-2")],
            vec![t("3"), CellValue::Blank, t("10А"), t("Физика"), t("Кузнецов"), CellValue::Blank],
            vec![],
            vec![t("4"), t("иванов  иван иванович"), t("10-а"), t("математика профильная"), t("Орлова Е. П."), CellValue::Blank],
        ])
    }

    #[test]
    fn test_sentinels() {
        assert!(!is_valid_teacher("  НЕТ "));
        assert!(!is_valid_teacher("—"));
        assert!(!is_valid_teacher("Null"));
        assert!(is_valid_teacher("Сидорова А. В."));
    }

    #[test]
    fn test_build_indexes_usable_rows_last_write_wins() {
        let (index, stats) = RosterIndex::build(&roster(), &FieldNormalizer::default(), 20).unwrap();

        assert_eq!(index.len(), 1);
        let entry = index
            .get("иванов иван иванович|10-а|математика профильная")
            .unwrap();
        assert_eq!(entry.teacher, "Орлова Е. П.");
        assert_eq!(entry.group, None);

        assert_eq!(stats.rows_seen, 4);
        assert_eq!(stats.rows_indexed, 2);
        assert_eq!(stats.rows_without_teacher, 1);
        assert_eq!(stats.rows_without_name, 1);
        assert_eq!(stats.duplicate_keys, 1);
    }

    #[test]
    fn test_name_column_does_not_steal_teacher_column() {
        let header = HeaderIndex::new(
            ["ФИО ученика", "Класс", "Предмет", "ФИО учителя"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        let columns = RosterColumns::resolve(&header).unwrap();
        assert_eq!(columns.name, 0);
        assert_eq!(columns.teacher, 3);
        assert_eq!(columns.group, None);
    }

    #[test]
    fn test_missing_subject_column() {
        let grid = Grid::from_rows(vec![vec![t("ФИО"), t("Класс"), t("Учитель")]]);
        let err = RosterIndex::build(&grid, &FieldNormalizer::default(), 20).unwrap_err();
        assert!(matches!(err, IngestError::RosterColumnMissing("subject")));
    }

    #[test]
    fn test_missing_header_row() {
        let grid = Grid::from_rows(vec![vec![t("a"), t("b")]]);
        let err = RosterIndex::build(&grid, &FieldNormalizer::default(), 20).unwrap_err();
        assert!(matches!(err, IngestError::RosterHeaderNotFound { scanned: 20 }));
    }
}
