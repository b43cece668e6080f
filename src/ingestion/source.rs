//! Batch sources: resolving an input reference into files and reading one file as a batch.
//!
//! - [`discover_sources`] turns a file path, a directory, or a glob pattern into an ordered list of
//!   [`BatchSource`]s, keeping only names that pass a [`SourceFilter`].
//! - [`ingest_batch`] reads one source with the sales schema and reports the outcome to an
//!   optional [`IngestionObserver`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::error::{IngestionError, IngestionResult};
use crate::schema::raw_sales_schema;

use super::csv::{IngestedBatch, ingest_csv_from_path};
use super::observability::{
    IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats, severity_for_error,
};

/// A file holding exactly one batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchSource {
    pub path: PathBuf,
}

impl BatchSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl fmt::Display for BatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Name filter applied to candidate batch files.
///
/// A file qualifies when its path relative to the search root starts with `prefix` and it ends
/// with `suffix`. The trigger applies the same rule to object names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFilter {
    pub prefix: String,
    pub suffix: String,
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: ".csv".to_string(),
        }
    }
}

impl SourceFilter {
    /// Filter with the given prefix and the default `.csv` suffix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Whether `name` (a `/`-separated relative name) qualifies.
    pub fn matches(&self, name: &str) -> bool {
        name.starts_with(&self.prefix) && name.ends_with(&self.suffix)
    }
}

/// Resolve `input` into batch sources, sorted by path.
///
/// - An existing file is returned as-is, as long as it passes the filter's suffix check.
/// - A directory is walked recursively; names are matched relative to it.
/// - Anything else is treated as a glob pattern; matched names are checked against the suffix.
pub fn discover_sources(input: &str, filter: &SourceFilter) -> IngestionResult<Vec<BatchSource>> {
    let path = Path::new(input);
    let mut out = if path.is_file() {
        if !path.to_string_lossy().ends_with(&filter.suffix) {
            return Err(IngestionError::InvalidSource {
                input: input.to_string(),
                message: format!("expected a '{}' file", filter.suffix),
            });
        }
        vec![BatchSource::new(path)]
    } else if path.is_dir() {
        walk_dir(path, filter)?
    } else {
        glob_sources(input, filter)?
    };
    out.sort();
    Ok(out)
}

fn walk_dir(root: &Path, filter: &SourceFilter) -> IngestionResult<Vec<BatchSource>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| IngestionError::InvalidSource {
            input: root.display().to_string(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if filter.matches(&name) {
            out.push(BatchSource::new(entry.path()));
        }
    }
    Ok(out)
}

fn glob_sources(pattern: &str, filter: &SourceFilter) -> IngestionResult<Vec<BatchSource>> {
    let paths = glob::glob(pattern).map_err(|e| IngestionError::InvalidSource {
        input: pattern.to_string(),
        message: e.to_string(),
    })?;
    let mut out = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| IngestionError::Io(e.into()))?;
        if path.is_file() && path.to_string_lossy().ends_with(&filter.suffix) {
            out.push(BatchSource::new(path));
        }
    }
    if out.is_empty() {
        return Err(IngestionError::InvalidSource {
            input: pattern.to_string(),
            message: "no matching batch files".to_string(),
        });
    }
    Ok(out)
}

/// Options controlling batch ingestion.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct IngestionOptions {
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// Read one batch source against the sales schema.
///
/// When an observer is configured, this function reports:
///
/// - `on_success` on success, with row and reject counts
/// - `on_failure` on failure, with a computed severity
/// - `on_alert` on failure when the computed severity is >= `options.alert_at_or_above`
pub fn ingest_batch(source: &BatchSource, options: &IngestionOptions) -> IngestionResult<IngestedBatch> {
    let ctx = IngestionContext {
        path: source.path.clone(),
    };

    let result = ingest_csv_from_path(&source.path, &raw_sales_schema());

    if let Some(obs) = options.observer.as_ref() {
        match &result {
            Ok(batch) => obs.on_success(
                &ctx,
                IngestionStats {
                    rows: batch.dataset.row_count(),
                    rejected: batch.rejected.len(),
                },
            ),
            Err(e) => {
                let sev = severity_for_error(e);
                obs.on_failure(&ctx, sev, e);
                if sev >= options.alert_at_or_above {
                    obs.on_alert(&ctx, sev, e);
                }
            }
        }
    }

    result
}
