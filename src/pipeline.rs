//! Per-school ingestion: discover files, extract them concurrently in
//! batches, attribute records to the roster, and aggregate tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::analyzers::aggregate::{score_records, summarize_test};
use crate::analyzers::types::TestSummary;
use crate::config::{PipelineConfig, SchoolConfig};
use crate::error::{ErrorKind, IngestError};
use crate::extract::{ExtractedFile, RecordExtractor};
use crate::model::{StudentRecord, TestMetadata};
use crate::normalize::FieldNormalizer;
use crate::output::{self, StudentRow};
use crate::roster::{RosterIndex, RosterMatcher, RosterStats, load_roster};
use crate::sheet::{WORKBOOK_EXTENSIONS, extension_of};

/// A file that produced no records, and why.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub source: String,
    pub kind: ErrorKind,
    pub error: String,
}

/// What happened to the school's roster.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RosterStatus {
    #[default]
    NotConfigured,
    Loaded {
        stats: RosterStats,
    },
    Failed {
        path: String,
        kind: ErrorKind,
        error: String,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchoolSummary {
    pub school: String,
    pub files_found: usize,
    pub files_parsed: usize,
    pub files_failed: usize,
    pub failures_by_kind: BTreeMap<ErrorKind, usize>,
    pub rows_rejected: usize,
    pub records: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub tests: usize,
    pub roster: RosterStatus,
    pub failures: Vec<FileFailure>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub schools: Vec<SchoolSummary>,
}

#[derive(Debug)]
pub struct SchoolOutcome {
    pub summary: SchoolSummary,
    pub tests: Vec<TestSummary>,
}

struct PendingTest {
    metadata: TestMetadata,
    sources: Vec<String>,
    records: Vec<StudentRecord>,
}

/// Groups extracted files into tests by subject, class and date.
#[derive(Default)]
pub struct TestCollector {
    pending: Vec<PendingTest>,
}

impl TestCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file to the test it belongs to. Files of the same test with
    /// different max scores are kept as separate tests.
    pub fn add(&mut self, file: ExtractedFile) {
        let key = file.metadata.key();
        let existing = self
            .pending
            .iter_mut()
            .find(|t| t.metadata.key() == key && t.metadata.max_scores == file.metadata.max_scores);

        match existing {
            Some(test) => {
                test.sources.push(file.source);
                test.records.extend(file.records);
            }
            None => {
                if self.pending.iter().any(|t| t.metadata.key() == key) {
                    warn!(test = %key, source = %file.source, "Max scores differ from an earlier file of the same test");
                }
                self.pending.push(PendingTest {
                    metadata: file.metadata,
                    sources: vec![file.source],
                    records: file.records,
                });
            }
        }
    }

    /// Aggregates every collected test, ordered by test key.
    pub fn finish(self) -> Vec<TestSummary> {
        let mut tests: Vec<TestSummary> = self
            .pending
            .into_iter()
            .map(|t| summarize_test(t.metadata, t.sources, t.records))
            .collect();
        tests.sort_by(|a, b| a.metadata.key().cmp(&b.metadata.key()));
        tests
    }
}

/// State of one school while its files are processed.
pub struct SchoolRun<'a> {
    matcher: &'a RosterMatcher,
    tests: TestCollector,
    summary: SchoolSummary,
}

impl<'a> SchoolRun<'a> {
    pub fn new(school: &str, matcher: &'a RosterMatcher) -> Self {
        Self {
            matcher,
            tests: TestCollector::new(),
            summary: SchoolSummary {
                school: school.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn summary_mut(&mut self) -> &mut SchoolSummary {
        &mut self.summary
    }

    /// Attributes and scores the records of a freshly extracted file.
    pub fn prepare(&self, file: &mut ExtractedFile) {
        self.matcher.attribute_all(&mut file.records);
        score_records(&mut file.records, &file.metadata.max_scores);
    }

    pub fn accept(&mut self, file: ExtractedFile) {
        self.summary.files_parsed += 1;
        self.summary.rows_rejected += file.rejected_rows.len();
        self.summary.records += file.records.len();
        self.tests.add(file);
    }

    pub fn reject(&mut self, source: &str, err: &IngestError) {
        error!(file = source, kind = ?err.kind(), error = %err, "File failed, no records kept");
        self.summary.files_failed += 1;
        *self.summary.failures_by_kind.entry(err.kind()).or_default() += 1;
        self.summary.failures.push(FileFailure {
            source: source.to_string(),
            kind: err.kind(),
            error: err.to_string(),
        });
    }

    pub fn finish(mut self) -> SchoolOutcome {
        let counts = self.matcher.counts();
        self.summary.matched = counts.matched;
        self.summary.unmatched = counts.unmatched;

        let tests = self.tests.finish();
        self.summary.tests = tests.len();
        SchoolOutcome {
            summary: self.summary,
            tests,
        }
    }
}

/// Workbook files directly inside `dir`, sorted by path.
///
/// Editor lock files (`~$...`) and hidden files are skipped.
pub fn discover_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("~$") || name.starts_with('.') {
            continue;
        }
        if WORKBOOK_EXTENSIONS.contains(&extension_of(&path).as_str()) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Builds the school's roster index. A missing or unreadable roster yields an
/// empty index, so every record falls back.
pub fn load_school_roster(
    config: &PipelineConfig,
    school: &SchoolConfig,
    normalizer: &FieldNormalizer,
) -> (RosterIndex, RosterStatus) {
    let Some(path) = &school.roster else {
        warn!(school = %school.name, "No roster configured, all records fall back");
        return (RosterIndex::new(), RosterStatus::NotConfigured);
    };

    match load_roster(path, normalizer, config.roster_header_scan_rows) {
        Ok((index, stats)) => (index, RosterStatus::Loaded { stats }),
        Err(e) => {
            error!(
                school = %school.name,
                roster = %path.display(),
                error = %e,
                "Roster unusable, all records fall back"
            );
            let status = RosterStatus::Failed {
                path: path.display().to_string(),
                kind: e.kind(),
                error: e.to_string(),
            };
            (RosterIndex::new(), status)
        }
    }
}

/// Extracts `files` on the blocking pool, at most `semaphore` permits at a
/// time. Results come back in input order.
pub async fn extract_batch(
    extractor: &Arc<RecordExtractor>,
    files: &[PathBuf],
    semaphore: &Arc<Semaphore>,
) -> Result<Vec<(String, Result<ExtractedFile, IngestError>)>> {
    let mut tasks = Vec::with_capacity(files.len());

    for path in files {
        let permit = Arc::clone(semaphore)
            .acquire_owned()
            .await
            .context("extraction semaphore closed")?;
        let extractor = Arc::clone(extractor);
        let path = path.clone();
        let source = path.display().to_string();
        let span = tracing::info_span!("extract_file", source = %source);

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            span.in_scope(|| extractor.extract_path(&path))
        });
        tasks.push((source, task));
    }

    let mut results = Vec::with_capacity(tasks.len());
    for (source, task) in tasks {
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(IngestError::Io(std::io::Error::other(format!(
                "extraction task failed: {e}"
            )))),
        };
        results.push((source, result));
    }

    Ok(results)
}

/// Processes every file of one school and writes its outputs under
/// `<output_dir>/<school>/`.
#[tracing::instrument(skip(config, school), fields(school = %school.name))]
pub async fn process_school(config: &PipelineConfig, school: &SchoolConfig) -> Result<SchoolOutcome> {
    let normalizer = config.normalizer();
    let (index, roster_status) = load_school_roster(config, school, &normalizer);
    let matcher = RosterMatcher::new(Arc::new(index), normalizer.clone(), config.fallback.clone());
    let extractor = Arc::new(RecordExtractor::new(config.extract_options(), normalizer));

    let files = discover_files(&school.input_dir)
        .with_context(|| format!("failed to list '{}'", school.input_dir.display()))?;
    info!(files = files.len(), "Files discovered");

    let school_dir = config.output_dir.join(&school.name);
    let students_csv = school_dir.join("students.csv");
    if students_csv.exists() {
        debug!(path = %students_csv.display(), "Replacing previous student rows");
        std::fs::remove_file(&students_csv)?;
    }

    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let mut run = SchoolRun::new(&school.name, &matcher);
    run.summary_mut().files_found = files.len();
    run.summary_mut().roster = roster_status;

    for (batch_no, batch) in files.chunks(config.batch_size).enumerate() {
        info!(batch = batch_no + 1, size = batch.len(), "Processing batch");
        let results = extract_batch(&extractor, batch, &semaphore).await?;

        for (source, result) in results {
            match result {
                Ok(mut file) => {
                    run.prepare(&mut file);
                    let rows: Vec<StudentRow<'_>> = file
                        .records
                        .iter()
                        .map(|r| StudentRow::new(&school.name, &file.source, &file.metadata, r))
                        .collect();
                    output::append_records(&students_csv, &rows)?;
                    run.accept(file);
                }
                Err(e) => run.reject(&source, &e),
            }
        }
    }

    let outcome = run.finish();
    output::write_json(&school_dir.join("tests.json"), &outcome.tests)?;

    let s = &outcome.summary;
    info!(
        found = s.files_found,
        parsed = s.files_parsed,
        failed = s.files_failed,
        records = s.records,
        matched = s.matched,
        unmatched = s.unmatched,
        tests = s.tests,
        "School processed"
    );

    Ok(outcome)
}

/// Processes all configured schools in order and writes `summary.json`.
#[tracing::instrument(skip(config), fields(schools = config.schools.len()))]
pub async fn run(config: &PipelineConfig) -> Result<RunSummary> {
    let started_at = Utc::now();
    let mut schools = Vec::with_capacity(config.schools.len());

    for school in &config.schools {
        match process_school(config, school).await {
            Ok(outcome) => schools.push(outcome.summary),
            Err(e) => {
                error!(school = %school.name, error = %e, "School processing failed");
                schools.push(SchoolSummary {
                    school: school.name.clone(),
                    error: Some(format!("{e:#}")),
                    ..Default::default()
                });
            }
        }
    }

    let summary = RunSummary {
        started_at,
        finished_at: Utc::now(),
        schools,
    };
    output::write_json(&config.output_dir.join("summary.json"), &summary)?;
    Ok(summary)
}

/// Extracts, attributes and aggregates a single workbook.
pub fn inspect_file(config: &PipelineConfig, path: &Path, roster: Option<&Path>) -> Result<TestSummary> {
    let normalizer = config.normalizer();
    let index = match roster {
        Some(roster) => {
            load_roster(roster, &normalizer, config.roster_header_scan_rows)
                .with_context(|| format!("failed to load roster '{}'", roster.display()))?
                .0
        }
        None => RosterIndex::new(),
    };
    let matcher = RosterMatcher::new(Arc::new(index), normalizer.clone(), config.fallback.clone());
    let extractor = RecordExtractor::new(config.extract_options(), normalizer);

    let mut file = extractor
        .extract_path(path)
        .with_context(|| format!("failed to extract '{}'", path.display()))?;
    matcher.attribute_all(&mut file.records);

    let counts = matcher.counts();
    info!(matched = counts.matched, unmatched = counts.unmatched, "Records attributed");

    Ok(summarize_test(file.metadata, vec![file.source], file.records))
}
