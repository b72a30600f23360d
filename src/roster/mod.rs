//! Roster loading and roster-based attribution.
//!
//! [`HeaderIndex`] resolves roster columns from loosely named headers,
//! [`RosterIndex`] maps composite keys to teacher and group, and
//! [`RosterMatcher`] attributes extracted records with a fallback bucket.

pub mod header;
pub mod index;
pub mod matcher;

pub use header::{HeaderIndex, find_header_row};
pub use index::{RosterEntry, RosterIndex, RosterStats, is_valid_teacher};
pub use matcher::{FallbackBucket, MatchCounts, MatchOutcome, RosterMatcher};

use std::path::Path;

use crate::error::Result;
use crate::normalize::FieldNormalizer;
use crate::sheet::load_table;

/// Loads a roster file (`.csv` or spreadsheet) and indexes it.
///
/// # Errors
///
/// I/O errors for unreadable files, schema errors for unresolvable headers.
pub fn load_roster(
    path: &Path,
    normalizer: &FieldNormalizer,
    scan_rows: usize,
) -> Result<(RosterIndex, RosterStats)> {
    let grid = load_table(path)?;
    RosterIndex::build(&grid, normalizer, scan_rows)
}
