//! Data types produced by score aggregation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{StudentRecord, TestMetadata};

/// How completely a student solved one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Full,
    Partial,
    NotCompleted,
}

impl Completion {
    pub fn classify(score: u32, max_score: u32) -> Self {
        if score == max_score {
            Completion::Full
        } else if score == 0 {
            Completion::NotCompleted
        } else {
            Completion::Partial
        }
    }
}

/// Completion counts and score distribution of one task over present students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatistic {
    pub task_number: u32,
    pub max_score: u32,
    pub fully_completed: usize,
    pub partially_completed: usize,
    pub not_completed: usize,
    pub score_distribution: BTreeMap<u32, usize>,
}

impl TaskStatistic {
    pub fn new(task_number: u32, max_score: u32) -> Self {
        Self {
            task_number,
            max_score,
            fully_completed: 0,
            partially_completed: 0,
            not_completed: 0,
            score_distribution: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, score: u32) {
        match Completion::classify(score, self.max_score) {
            Completion::Full => self.fully_completed += 1,
            Completion::Partial => self.partially_completed += 1,
            Completion::NotCompleted => self.not_completed += 1,
        }
        *self.score_distribution.entry(score).or_default() += 1;
    }

    pub fn total(&self) -> usize {
        self.fully_completed + self.partially_completed + self.not_completed
    }
}

/// Statistics of the students attributed to one teacher and group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub teacher: String,
    pub group: String,
    pub student_count: usize,
    pub present_count: usize,
    pub absent_count: usize,
    pub average_score: f64,
    pub average_percentage: f64,
    pub tasks: BTreeMap<u32, TaskStatistic>,
}

/// Aggregated result of one test, consumed by reporting and persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestSummary {
    pub metadata: TestMetadata,
    pub sources: Vec<String>,
    pub total_max_score: u64,
    pub present_count: usize,
    pub absent_count: usize,
    pub average_score: f64,
    pub average_percentage: f64,
    pub score_stddev: f64,
    pub tasks: BTreeMap<u32, TaskStatistic>,
    pub groups: Vec<GroupSummary>,
    pub students: Vec<StudentRecord>,
}
