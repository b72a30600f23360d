//! Score aggregation and statistics.
//!
//! This module derives per-student totals and percentages, classifies every
//! task of a test into completion buckets, and rolls the results up per test
//! and per teacher group.

pub mod aggregate;
pub mod types;
pub mod utility;
