//! File-arrival notifications to job configurations.
//!
//! A storage notification names a bucket and an object. If the object is a CSV under the raw
//! prefix, [`TriggerConfig::job_for`] produces the [`JobConfig`] that a `sales-reconcile` run
//! needs; anything else is ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingestion::SourceFilter;
use crate::load::TableId;

/// Environment variable names read by [`TriggerConfig::from_env`].
pub const RAW_PREFIX_VAR: &str = "RAW_PREFIX";
pub const PROJECT_ID_VAR: &str = "PROJECT_ID";
pub const BQ_DATASET_VAR: &str = "BQ_DATASET";
pub const BQ_TABLE_VAR: &str = "BQ_TABLE";
pub const TEMP_GCS_BUCKET_VAR: &str = "TEMP_GCS_BUCKET";

/// Prefix used when `RAW_PREFIX` is unset.
pub const DEFAULT_RAW_PREFIX: &str = "raw/";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("missing required environment variable(s): {}", names.join(", "))]
    MissingConfig { names: Vec<&'static str> },
}

/// A file-arrival notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub bucket: String,
    pub name: String,
}

impl FileEvent {
    /// `gs://<bucket>/<name>`
    pub fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.name)
    }
}

/// Everything a single pipeline run needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub input_path: String,
    pub destination_project: String,
    pub destination_dataset: String,
    pub destination_table: String,
    pub staging_location: String,
}

impl JobConfig {
    pub fn destination(&self) -> TableId {
        TableId::new(
            &self.destination_project,
            &self.destination_dataset,
            &self.destination_table,
        )
    }

    /// Command-line arguments for `sales-reconcile`, program name excluded.
    pub fn args(&self) -> Vec<String> {
        vec![
            self.input_path.clone(),
            "--temp_gcs_bucket".to_string(),
            self.staging_location.clone(),
            "--project_id".to_string(),
            self.destination_project.clone(),
            "--bq_dataset".to_string(),
            self.destination_dataset.clone(),
            "--bq_table".to_string(),
            self.destination_table.clone(),
        ]
    }
}

/// Trigger settings, normally taken from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    pub raw_prefix: String,
    pub project_id: String,
    pub dataset: String,
    pub table: String,
    pub staging_location: String,
}

impl TriggerConfig {
    pub fn from_env() -> Result<Self, TriggerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TriggerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let mut missing = Vec::new();
        let mut required = |name: &'static str| {
            get(name).unwrap_or_else(|| {
                missing.push(name);
                String::new()
            })
        };
        let project_id = required(PROJECT_ID_VAR);
        let dataset = required(BQ_DATASET_VAR);
        let table = required(BQ_TABLE_VAR);
        let staging_location = required(TEMP_GCS_BUCKET_VAR);
        if !missing.is_empty() {
            return Err(TriggerError::MissingConfig { names: missing });
        }

        Ok(Self {
            raw_prefix: lookup(RAW_PREFIX_VAR).unwrap_or_else(|| DEFAULT_RAW_PREFIX.to_string()),
            project_id,
            dataset,
            table,
            staging_location,
        })
    }

    pub fn filter(&self) -> SourceFilter {
        SourceFilter::with_prefix(&self.raw_prefix)
    }

    /// The job for `event`, or `None` when the object is not a raw CSV batch.
    pub fn job_for(&self, event: &FileEvent) -> Option<JobConfig> {
        if !self.filter().matches(&event.name) {
            tracing::info!(
                file = %event.name,
                prefix = %self.raw_prefix,
                "ignored file: not a CSV or outside the raw prefix"
            );
            return None;
        }
        Some(JobConfig {
            input_path: event.uri(),
            destination_project: self.project_id.clone(),
            destination_dataset: self.dataset.clone(),
            destination_table: self.table.clone(),
            staging_location: self.staging_location.clone(),
        })
    }
}
