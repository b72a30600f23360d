//! Run configuration, loaded once and passed into [`crate::pipeline::run`].
//!
//! Stored as JSON on disk:
//! ```json
//! {
//!   "output_dir": "out",
//!   "schools": [
//!     { "name": "school-5", "input_dir": "in/school-5", "roster": "in/school-5/roster.csv" }
//!   ],
//!   "row_policy": "reject_file",
//!   "subject_rules": [
//!     { "keywords": ["родн"], "canonical": "Родной язык" }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::extract::{ExtractOptions, PresencePolicy, RowFailurePolicy};
use crate::normalize::{FieldNormalizer, SubjectRule, SubjectRules};
use crate::roster::FallbackBucket;
use crate::schema::DEFAULT_MAX_TASK_COLUMNS;

/// One source school: a directory of assessment workbooks and its roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolConfig {
    pub name: String,
    pub input_dir: PathBuf,
    #[serde(default)]
    pub roster: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetNames {
    pub metadata: String,
    pub data: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            metadata: "metadata".to_string(),
            data: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub schools: Vec<SchoolConfig>,
    pub output_dir: PathBuf,
    pub batch_size: usize,
    pub concurrency: usize,
    pub sheets: SheetNames,
    pub row_policy: RowFailurePolicy,
    pub presence_policy: PresencePolicy,
    pub fallback: FallbackBucket,
    pub default_task_count: Option<usize>,
    pub max_task_columns: usize,
    pub roster_header_scan_rows: usize,
    pub subject_rules: Vec<SubjectRule>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schools: Vec::new(),
            output_dir: PathBuf::from("out"),
            batch_size: 50,
            concurrency: 4,
            sheets: SheetNames::default(),
            row_policy: RowFailurePolicy::default(),
            presence_policy: PresencePolicy::default(),
            fallback: FallbackBucket::default(),
            default_task_count: None,
            max_task_columns: DEFAULT_MAX_TASK_COLUMNS,
            roster_header_scan_rows: 20,
            subject_rules: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Loads and validates the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("invalid config '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.max_task_columns == 0 {
            bail!("max_task_columns must be at least 1");
        }

        let mut seen = HashSet::new();
        for school in &self.schools {
            if !seen.insert(school.name.as_str()) {
                bail!("duplicate school name '{}'", school.name);
            }
        }
        Ok(())
    }

    pub fn normalizer(&self) -> FieldNormalizer {
        FieldNormalizer::new(SubjectRules::with_overrides(&self.subject_rules))
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            metadata_sheet: self.sheets.metadata.clone(),
            data_sheet: self.sheets.data.clone(),
            row_policy: self.row_policy,
            presence_policy: self.presence_policy,
            default_task_count: self.default_task_count,
            max_task_columns: self.max_task_columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"schools": [{"name": "s1", "input_dir": "in/s1"}], "row_policy": "reject_row"}"#,
        )
        .unwrap();

        assert_eq!(config.batch_size, 50);
        assert_eq!(config.row_policy, RowFailurePolicy::RejectRow);
        assert_eq!(config.presence_policy, PresencePolicy::Lenient);
        assert_eq!(config.fallback.teacher, "Без учителя");
        assert_eq!(config.schools[0].roster, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_zero_sizes() {
        let mut config = PipelineConfig {
            schools: vec![
                SchoolConfig {
                    name: "s".into(),
                    input_dir: "a".into(),
                    roster: None,
                },
                SchoolConfig {
                    name: "s".into(),
                    input_dir: "b".into(),
                    roster: None,
                },
            ],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.schools.pop();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_subject_rules_extend_builtins() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"subject_rules": [{"keywords": ["родн"], "canonical": "Родной язык"}]}"#,
        )
        .unwrap();
        let normalizer = config.normalizer();
        assert_eq!(normalizer.subject("родной русский"), "Родной язык");
        assert_eq!(normalizer.subject("русский язык"), "Русский язык");
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = PipelineConfig::load(Path::new("/nonexistent/assessment.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
