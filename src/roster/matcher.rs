//! Attribution of student records to roster teachers and groups.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::model::StudentRecord;
use crate::normalize::FieldNormalizer;
use crate::roster::index::{RosterIndex, is_valid_teacher};

/// Attribution used when a record has no usable roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackBucket {
    pub teacher: String,
    pub group: String,
}

impl Default for FallbackBucket {
    fn default() -> Self {
        Self {
            teacher: "Без учителя".to_string(),
            group: "Без группы".to_string(),
        }
    }
}

/// Outcome of one lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched,
    Unmatched,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchCounts {
    pub matched: usize,
    pub unmatched: usize,
}

/// Joins records against a shared, read-only [`RosterIndex`].
///
/// Counters are atomic so one matcher can serve concurrent callers.
#[derive(Debug)]
pub struct RosterMatcher {
    index: Arc<RosterIndex>,
    normalizer: FieldNormalizer,
    fallback: FallbackBucket,
    matched: AtomicUsize,
    unmatched: AtomicUsize,
}

impl RosterMatcher {
    pub fn new(index: Arc<RosterIndex>, normalizer: FieldNormalizer, fallback: FallbackBucket) -> Self {
        Self {
            index,
            normalizer,
            fallback,
            matched: AtomicUsize::new(0),
            unmatched: AtomicUsize::new(0),
        }
    }

    /// Sets the record's teacher and group, or the fallback bucket.
    pub fn attribute(&self, record: &mut StudentRecord) -> MatchOutcome {
        let key = self
            .normalizer
            .composite_key(&record.full_name, &record.class_name, &record.subject);

        match self.index.get(&key) {
            Some(entry) if is_valid_teacher(&entry.teacher) => {
                record.attributed_teacher = Some(entry.teacher.clone());
                record.attributed_group = Some(
                    entry
                        .group
                        .clone()
                        .unwrap_or_else(|| self.fallback.group.clone()),
                );
                self.matched.fetch_add(1, Ordering::Relaxed);
                MatchOutcome::Matched
            }
            _ => {
                record.attributed_teacher = Some(self.fallback.teacher.clone());
                record.attributed_group = Some(self.fallback.group.clone());
                self.unmatched.fetch_add(1, Ordering::Relaxed);
                MatchOutcome::Unmatched
            }
        }
    }

    pub fn attribute_all(&self, records: &mut [StudentRecord]) {
        for record in records {
            self.attribute(record);
        }
    }

    pub fn counts(&self) -> MatchCounts {
        MatchCounts {
            matched: self.matched.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
        }
    }
}
