use crate::analyzers::types::{GroupSummary, TaskStatistic, TestSummary};
use crate::analyzers::utility::{mean, pct, round2, stddev};
use crate::model::{StudentRecord, TestMetadata};
use std::collections::BTreeMap;

/// Fills `total_score` and `percentage` of one record.
///
/// Absent students keep a zero total; a zero total max score yields 0 %.
pub fn score_record(record: &mut StudentRecord, max_scores: &BTreeMap<u32, u32>) {
    if !record.is_present() {
        record.task_scores.clear();
        record.total_score = 0;
        record.percentage = 0.0;
        return;
    }

    let total_max: u64 = max_scores.values().map(|&v| u64::from(v)).sum();
    record.total_score = record.task_scores.values().map(|&v| u64::from(v)).sum();
    record.percentage = pct(record.total_score as f64, total_max as f64);
}

pub fn score_records(records: &mut [StudentRecord], max_scores: &BTreeMap<u32, u32>) {
    for record in records {
        score_record(record, max_scores);
    }
}

/// Per-task completion statistics over the present students in `records`.
pub fn task_statistics<'a, I>(records: I, max_scores: &BTreeMap<u32, u32>) -> BTreeMap<u32, TaskStatistic>
where
    I: IntoIterator<Item = &'a StudentRecord>,
{
    let mut tasks: BTreeMap<u32, TaskStatistic> = max_scores
        .iter()
        .map(|(&task, &max)| (task, TaskStatistic::new(task, max)))
        .collect();

    for record in records.into_iter().filter(|r| r.is_present()) {
        for (task, stat) in tasks.iter_mut() {
            stat.record(record.score_for(*task));
        }
    }

    tasks
}

/// Mean total score of the present students; 0.0 when nobody was present.
pub fn average_score<'a, I>(records: I) -> f64
where
    I: IntoIterator<Item = &'a StudentRecord>,
{
    let totals: Vec<f64> = records
        .into_iter()
        .filter(|r| r.is_present())
        .map(|r| r.total_score as f64)
        .collect();
    mean(&totals)
}

fn average_percentage(records: &[&StudentRecord]) -> f64 {
    let values: Vec<f64> = records
        .iter()
        .filter(|r| r.is_present())
        .map(|r| r.percentage)
        .collect();
    round2(mean(&values))
}

/// Aggregates one test: derived scores, task statistics and per-group
/// summaries. Records must already be attributed; unattributed records are
/// grouped under empty teacher and group names.
pub fn summarize_test(
    metadata: TestMetadata,
    sources: Vec<String>,
    mut records: Vec<StudentRecord>,
) -> TestSummary {
    score_records(&mut records, &metadata.max_scores);

    let all: Vec<&StudentRecord> = records.iter().collect();
    let present_count = all.iter().filter(|r| r.is_present()).count();

    let totals: Vec<f64> = all
        .iter()
        .filter(|r| r.is_present())
        .map(|r| r.total_score as f64)
        .collect();
    let avg = mean(&totals);

    let mut by_group: BTreeMap<(String, String), Vec<&StudentRecord>> = BTreeMap::new();
    for record in &records {
        let key = (
            record.attributed_teacher.clone().unwrap_or_default(),
            record.attributed_group.clone().unwrap_or_default(),
        );
        by_group.entry(key).or_default().push(record);
    }

    let groups = by_group
        .into_iter()
        .map(|((teacher, group), members)| {
            let present = members.iter().filter(|r| r.is_present()).count();
            GroupSummary {
                teacher,
                group,
                student_count: members.len(),
                present_count: present,
                absent_count: members.len() - present,
                average_score: round2(average_score(members.iter().copied())),
                average_percentage: average_percentage(&members),
                tasks: task_statistics(members.iter().copied(), &metadata.max_scores),
            }
        })
        .collect();

    TestSummary {
        total_max_score: metadata.total_max_score(),
        present_count,
        absent_count: records.len() - present_count,
        average_score: round2(avg),
        average_percentage: average_percentage(&all),
        score_stddev: round2(stddev(&totals, avg)),
        tasks: task_statistics(records.iter(), &metadata.max_scores),
        groups,
        sources,
        metadata,
        students: records,
    }
}
