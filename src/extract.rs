//! Turns one assessment workbook into [`TestMetadata`] and [`StudentRecord`]s.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IngestError, Result};
use crate::model::{Presence, StudentRecord, TestMetadata};
use crate::normalize::{FieldNormalizer, collapse_whitespace};
use crate::schema::{self, TaskLayout};
use crate::sheet::{Workbook, Worksheet};

// Metadata sheet cells, (row, col).
const TEACHER_CELL: (usize, usize) = (0, 1);
const DATE_CELL: (usize, usize) = (1, 1);
const SUBJECT_CELL: (usize, usize) = (2, 1);
const CLASS_CELL: (usize, usize) = (3, 1);
const TEST_TYPE_CELL: (usize, usize) = (4, 1);
const MAX_SCORES_CELL: (usize, usize) = (5, 1);

// Data sheet columns.
const NAME_COL: usize = 1;
const PRESENCE_COL: usize = 2;
const VARIANT_COL: usize = 3;

const PRESENT_TOKENS: &[&str] = &[
    "присутствовал",
    "присутствовала",
    "присутствует",
    "был",
    "была",
    "да",
    "+",
    "п",
];

const ABSENT_TOKENS: &[&str] = &[
    "отсутствовал",
    "отсутствовала",
    "отсутствует",
    "не был",
    "не была",
    "нет",
    "н",
    "отс",
];

/// What a single invalid student row does to its file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFailurePolicy {
    /// Any invalid row invalidates the whole file.
    #[default]
    RejectFile,
    /// Invalid rows are dropped and counted; the rest of the file is kept.
    RejectRow,
}

/// How presence cells outside the recognized tokens are read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresencePolicy {
    /// Unrecognized text counts as present.
    #[default]
    Lenient,
    /// Unrecognized text is a row validation error.
    Strict,
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub metadata_sheet: String,
    pub data_sheet: String,
    pub row_policy: RowFailurePolicy,
    pub presence_policy: PresencePolicy,
    pub default_task_count: Option<usize>,
    pub max_task_columns: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            metadata_sheet: "metadata".to_string(),
            data_sheet: "data".to_string(),
            row_policy: RowFailurePolicy::default(),
            presence_policy: PresencePolicy::default(),
            default_task_count: None,
            max_task_columns: schema::DEFAULT_MAX_TASK_COLUMNS,
        }
    }
}

/// A student row dropped under [`RowFailurePolicy::RejectRow`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    pub row: usize,
    pub reason: String,
}

/// Everything extracted from one source file.
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub source: String,
    pub metadata: TestMetadata,
    pub records: Vec<StudentRecord>,
    pub rejected_rows: Vec<RejectedRow>,
}

impl ExtractedFile {
    /// Canonical subject, used to file the source away.
    pub fn subject(&self) -> &str {
        &self.metadata.subject
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordExtractor {
    options: ExtractOptions,
    normalizer: FieldNormalizer,
}

impl RecordExtractor {
    pub fn new(options: ExtractOptions, normalizer: FieldNormalizer) -> Self {
        Self {
            options,
            normalizer,
        }
    }

    /// Opens and extracts a workbook file.
    ///
    /// # Errors
    ///
    /// Any [`IngestError`]; the file then contributes no records.
    pub fn extract_path(&self, path: &Path) -> Result<ExtractedFile> {
        let workbook = Workbook::open(path)?;
        self.extract_workbook(&path.display().to_string(), &workbook)
    }

    /// Extracts an already loaded workbook.
    ///
    /// # Errors
    ///
    /// Schema errors for missing sheets or metadata; validation errors for bad
    /// rows under [`RowFailurePolicy::RejectFile`].
    pub fn extract_workbook(&self, source: &str, workbook: &Workbook) -> Result<ExtractedFile> {
        let meta_sheet = workbook.sheet_or_position(&self.options.metadata_sheet, 0)?;
        let data_sheet = workbook.sheet_or_position(&self.options.data_sheet, 1)?;
        self.extract_sheets(source, meta_sheet, data_sheet)
    }

    pub fn extract_sheets<M, D>(&self, source: &str, meta: &M, data: &D) -> Result<ExtractedFile>
    where
        M: Worksheet + ?Sized,
        D: Worksheet + ?Sized,
    {
        let summary = meta
            .cell(MAX_SCORES_CELL.0, MAX_SCORES_CELL.1)
            .as_text()
            .map(|s| parse_max_score_summary(&s))
            .unwrap_or_default();

        let layout = self.resolve_layout(data, &summary)?;
        let max_scores = resolve_max_scores(data, &layout, &summary)?;
        let metadata = self.read_metadata(meta, max_scores)?;

        let mut records = Vec::new();
        let mut rejected_rows = Vec::new();

        for row in schema::FIRST_STUDENT_ROW..data.height() {
            match self.parse_row(data, row, &layout, &metadata) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => match self.options.row_policy {
                    RowFailurePolicy::RejectFile => return Err(e),
                    RowFailurePolicy::RejectRow => {
                        warn!(source, row = row + 1, error = %e, "Student row rejected");
                        rejected_rows.push(RejectedRow {
                            row: row + 1,
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }

        debug!(
            source,
            subject = %metadata.subject,
            class = %metadata.class_name,
            records = records.len(),
            rejected = rejected_rows.len(),
            "File extracted"
        );

        Ok(ExtractedFile {
            source: source.to_string(),
            metadata,
            records,
            rejected_rows,
        })
    }

    fn resolve_layout<D: Worksheet + ?Sized>(
        &self,
        data: &D,
        summary: &BTreeMap<u32, u32>,
    ) -> Result<TaskLayout> {
        let layout = schema::discover_layout(data, self.options.max_task_columns);
        if !layout.is_empty() {
            return Ok(layout);
        }

        // Tasks are numbered from 1, so the highest summary entry is the count.
        let fallback = match summary.keys().next_back() {
            Some(&last) => Some(last as usize),
            None => self.options.default_task_count,
        };

        match fallback {
            Some(task_count) if task_count > 0 => {
                warn!(task_count, "No task index row, using fallback task count");
                Ok(TaskLayout {
                    task_count,
                    first_task_col: schema::FIRST_TASK_COL,
                })
            }
            _ => Err(IngestError::NoTaskStructure),
        }
    }

    fn read_metadata<M: Worksheet + ?Sized>(
        &self,
        meta: &M,
        max_scores: BTreeMap<u32, u32>,
    ) -> Result<TestMetadata> {
        let required_text = |field: &'static str, (row, col): (usize, usize)| {
            meta.cell(row, col)
                .as_text()
                .ok_or(IngestError::MissingMetadata { field, row, col })
        };

        let subject = self.normalizer.subject(&required_text("subject", SUBJECT_CELL)?);
        let class_name = self.normalizer.class(&required_text("class", CLASS_CELL)?);
        let test_date = meta
            .cell(DATE_CELL.0, DATE_CELL.1)
            .as_date()
            .ok_or(IngestError::MissingMetadata {
                field: "test_date",
                row: DATE_CELL.0,
                col: DATE_CELL.1,
            })?;
        let teacher = meta
            .cell(TEACHER_CELL.0, TEACHER_CELL.1)
            .as_text()
            .map(|t| collapse_whitespace(&t));
        let test_type = meta
            .cell(TEST_TYPE_CELL.0, TEST_TYPE_CELL.1)
            .as_text()
            .map(|t| collapse_whitespace(&t))
            .unwrap_or_default();

        Ok(TestMetadata {
            subject,
            class_name,
            test_date,
            teacher,
            test_type,
            max_scores,
        })
    }

    fn parse_row<D: Worksheet + ?Sized>(
        &self,
        data: &D,
        row: usize,
        layout: &TaskLayout,
        metadata: &TestMetadata,
    ) -> Result<Option<StudentRecord>> {
        let Some(name) = data.cell(row, NAME_COL).as_text() else {
            return Ok(None);
        };
        let line = row + 1;

        let presence = match data.cell(row, PRESENCE_COL).as_text() {
            Some(text) => parse_presence(&text, self.options.presence_policy, line)?,
            None => Presence::Present,
        };

        let mut record = StudentRecord::new(collapse_whitespace(&name), presence, metadata);
        record.variant = data.cell(row, VARIANT_COL).as_text();

        if !presence.is_present() {
            return Ok(Some(record));
        }

        for task in 1..=layout.task_count as u32 {
            let cell = data.cell(row, layout.column_of(task));
            if cell.is_blank() {
                continue;
            }
            let max = metadata.max_scores.get(&task).copied().ok_or_else(|| {
                IngestError::validation(line, format!("task {task} is not declared"))
            })?;
            let score = cell.as_integer().ok_or_else(|| {
                IngestError::validation(
                    line,
                    format!(
                        "task {task}: `{}` is not an integer score",
                        cell.as_text().unwrap_or_default()
                    ),
                )
            })?;
            if score < 0 {
                return Err(IngestError::validation(
                    line,
                    format!("task {task}: negative score {score}"),
                ));
            }
            let score = u32::try_from(score).map_err(|_| {
                IngestError::validation(line, format!("task {task}: score {score} is out of range"))
            })?;
            if score > max {
                return Err(IngestError::validation(
                    line,
                    format!("task {task}: score {score} exceeds max {max}"),
                ));
            }
            record.task_scores.insert(task, score);
        }

        Ok(Some(record))
    }
}

/// Parses a `"1=2, 2=3, 3=1"` summary into task → max score.
/// Malformed pairs are skipped.
pub fn parse_max_score_summary(text: &str) -> BTreeMap<u32, u32> {
    text.split([',', ';'])
        .filter_map(|pair| {
            let (task, max) = pair.split_once('=')?;
            let task = task.trim().parse::<u32>().ok()?;
            let max = max.trim().parse::<u32>().ok()?;
            (task > 0).then_some((task, max))
        })
        .collect()
}

/// Per-task max scores from the max-score row, filling blanks from `summary`.
///
/// # Errors
///
/// [`IngestError::MissingMaxScore`] for a task with neither source.
pub fn resolve_max_scores<D: Worksheet + ?Sized>(
    data: &D,
    layout: &TaskLayout,
    summary: &BTreeMap<u32, u32>,
) -> Result<BTreeMap<u32, u32>> {
    let mut max_scores = BTreeMap::new();

    for task in 1..=layout.task_count as u32 {
        let from_row = data
            .cell(schema::MAX_SCORE_ROW, layout.column_of(task))
            .as_integer()
            .and_then(|v| u32::try_from(v).ok());
        let from_summary = summary.get(&task).copied();

        let max = match (from_row, from_summary) {
            (Some(row), Some(sum)) if row != sum => {
                warn!(task, row, summary = sum, "Max score row disagrees with summary");
                row
            }
            (Some(row), _) => row,
            (None, Some(sum)) => sum,
            (None, None) => return Err(IngestError::MissingMaxScore { task }),
        };
        max_scores.insert(task, max);
    }

    Ok(max_scores)
}

/// Reads a presence cell.
///
/// # Errors
///
/// Only under [`PresencePolicy::Strict`], for unrecognized text.
pub fn parse_presence(text: &str, policy: PresencePolicy, row: usize) -> Result<Presence> {
    let token = collapse_whitespace(text).to_lowercase();
    if ABSENT_TOKENS.contains(&token.as_str()) {
        return Ok(Presence::Absent);
    }
    if PRESENT_TOKENS.contains(&token.as_str()) {
        return Ok(Presence::Present);
    }
    match policy {
        PresencePolicy::Lenient => {
            warn!(row, value = %text, "Unrecognized presence value, counted as present");
            Ok(Presence::Present)
        }
        PresencePolicy::Strict => Err(IngestError::validation(
            row,
            format!("unrecognized presence value `{text}`"),
        )),
    }
}
