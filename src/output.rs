//! Output formatting and persistence for canonical records and summaries.
//!
//! Supports JSON printing and files, and CSV append.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::model::{Presence, StudentRecord, TestMetadata};
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Flat CSV shape of one [`StudentRecord`].
#[derive(Debug, Serialize)]
pub struct StudentRow<'a> {
    pub school: &'a str,
    pub source: &'a str,
    pub test_date: String,
    pub test_type: &'a str,
    pub subject: &'a str,
    pub class_name: &'a str,
    pub full_name: &'a str,
    pub presence: Presence,
    pub variant: &'a str,
    pub task_scores: String,
    pub total_score: u64,
    pub percentage: f64,
    pub teacher: &'a str,
    pub group: &'a str,
}

impl<'a> StudentRow<'a> {
    pub fn new(
        school: &'a str,
        source: &'a str,
        metadata: &'a TestMetadata,
        record: &'a StudentRecord,
    ) -> Self {
        Self {
            school,
            source,
            test_date: metadata.test_date.format("%Y-%m-%d").to_string(),
            test_type: &metadata.test_type,
            subject: &record.subject,
            class_name: &record.class_name,
            full_name: &record.full_name,
            presence: record.presence,
            variant: record.variant.as_deref().unwrap_or(""),
            task_scores: format_task_scores(record),
            total_score: record.total_score,
            percentage: record.percentage,
            teacher: record.attributed_teacher.as_deref().unwrap_or(""),
            group: record.attributed_group.as_deref().unwrap_or(""),
        }
    }
}

/// `"1=2;2=0"`, in task order.
pub fn format_task_scores(record: &StudentRecord) -> String {
    record
        .task_scores
        .iter()
        .map(|(task, score)| format!("{task}={score}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Pretty-printed JSON of `value`.
pub fn to_json_pretty(value: &impl Serialize) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Prints a value as pretty-printed JSON on stdout.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", to_json_pretty(value)?);
    Ok(())
}

/// Writes a value as pretty-printed JSON, replacing any existing file.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}

/// Appends rows to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_records<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, rows = rows.len(), "Appending CSV records");

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn metadata() -> TestMetadata {
        TestMetadata {
            subject: "Физика".into(),
            class_name: "9-Б".into(),
            test_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            teacher: None,
            test_type: "ВПР".into(),
            max_scores: BTreeMap::from([(1, 2), (2, 3)]),
        }
    }

    fn record(meta: &TestMetadata) -> StudentRecord {
        let mut r = StudentRecord::new("Петров Пётр", Presence::Present, meta);
        r.task_scores = BTreeMap::from([(1, 2), (2, 0)]);
        r.total_score = 2;
        r.percentage = 40.0;
        r
    }

    #[test]
    fn test_format_task_scores() {
        let meta = metadata();
        assert_eq!(format_task_scores(&record(&meta)), "1=2;2=0");
    }

    #[test]
    fn test_json_pretty_is_plain_json() {
        let body = to_json_pretty(&metadata()).unwrap();
        assert!(body.starts_with('{'));
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["class_name"], "9-Б");
        assert_eq!(parsed["max_scores"]["2"], 3);
    }

    #[test]
    fn test_append_records_writes_header_once() {
        let path = temp_path("assessment_ingest_test_header.csv");
        let _ = fs::remove_file(&path);

        let meta = metadata();
        let rec = record(&meta);
        let rows = [StudentRow::new("s1", "a.xlsx", &meta, &rec)];
        append_records(&path, &rows).unwrap();
        append_records(&path, &rows).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.starts_with("school,")).count();
        assert_eq!(header_count, 1);
        // 1 header + 2 data rows
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains("1=2;2=0"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_json_creates_parent_dirs() {
        let dir = temp_path("assessment_ingest_test_json");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("nested/meta.json");

        write_json(&path, &metadata()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"subject\": \"Физика\""));

        fs::remove_dir_all(&dir).unwrap();
    }
}
