//! Canonical records produced by extraction and enriched by matching and
//! aggregation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whether a student sat the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Present,
    Absent,
}

impl Presence {
    pub fn is_present(self) -> bool {
        self == Presence::Present
    }
}

/// Header information of one assessment file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestMetadata {
    pub subject: String,
    pub class_name: String,
    pub test_date: NaiveDate,
    pub teacher: Option<String>,
    pub test_type: String,
    pub max_scores: BTreeMap<u32, u32>,
}

impl TestMetadata {
    pub fn total_max_score(&self) -> u64 {
        self.max_scores.values().map(|&v| u64::from(v)).sum()
    }

    pub fn key(&self) -> TestKey {
        TestKey {
            subject: self.subject.clone(),
            class_name: self.class_name.clone(),
            test_date: self.test_date,
        }
    }
}

/// Records sharing subject, class and date belong to one test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TestKey {
    pub subject: String,
    pub class_name: String,
    pub test_date: NaiveDate,
}

impl std::fmt::Display for TestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.subject, self.class_name, self.test_date)
    }
}

/// One student row of one test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRecord {
    pub full_name: String,
    pub presence: Presence,
    pub variant: Option<String>,
    pub task_scores: BTreeMap<u32, u32>,
    pub total_score: u64,
    pub percentage: f64,
    pub subject: String,
    pub class_name: String,
    pub attributed_teacher: Option<String>,
    pub attributed_group: Option<String>,
}

impl StudentRecord {
    pub fn new(full_name: impl Into<String>, presence: Presence, metadata: &TestMetadata) -> Self {
        Self {
            full_name: full_name.into(),
            presence,
            variant: None,
            task_scores: BTreeMap::new(),
            total_score: 0,
            percentage: 0.0,
            subject: metadata.subject.clone(),
            class_name: metadata.class_name.clone(),
            attributed_teacher: None,
            attributed_group: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.presence.is_present()
    }

    /// Score of `task`; blank cells of present students count as zero.
    pub fn score_for(&self, task: u32) -> u32 {
        self.task_scores.get(&task).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_total_max_score() {
        assert_eq!(metadata().total_max_score(), 5);
    }

    #[test]
    fn test_record_copies_identity_from_metadata() {
        let record = StudentRecord::new("Петров Пётр", Presence::Present, &metadata());
        assert_eq!(record.subject, "Физика");
        assert_eq!(record.class_name, "9-Б");
        assert_eq!(record.score_for(1), 0);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(metadata().key().to_string(), "Физика 9-Б 2025-04-01");
    }
}
