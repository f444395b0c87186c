//! Report export: JSON, Prometheus text and CSV.
//!
//! Rendering is pure (`render_*` return strings). [`ReportExporter`] writes
//! the renderings to disk; a failure in one format is logged and recorded
//! and never stops the others.

pub mod csv;
pub mod prometheus;
pub mod report;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ExportConfig, ExportFormat};
use crate::error::MonitorResult;

pub use self::csv::{
    escape_field, render_cross_platform_csv, render_metrics_csv, render_provider_csv,
};
pub use self::prometheus::{render_prometheus, sanitize_metric_name, METRIC_PREFIX};
pub use self::report::{parse_json, render_json, MonitoringReport, RealTimeMetric, ReportSummary};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportFailure {
    pub format: ExportFormat,
    pub path: PathBuf,
    pub reason: String,
}

/// What an export wrote and what failed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub written: Vec<PathBuf>,
    pub failures: Vec<ExportFailure>,
}

impl ExportSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Writes reports to an output directory.
#[derive(Clone, Debug)]
pub struct ReportExporter {
    output_dir: PathBuf,
    file_stem: String,
    formats: Vec<ExportFormat>,
}

impl ReportExporter {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            file_stem: config.file_stem.clone(),
            formats: config.formats.clone(),
        }
    }

    /// Exporter for every format into `output_dir`.
    pub fn to_dir(output_dir: impl Into<PathBuf>) -> Self {
        Self::new(&ExportConfig {
            output_dir: output_dir.into(),
            ..ExportConfig::default()
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Files produced for one format.
    fn renderings(
        &self,
        format: ExportFormat,
        report: &MonitoringReport,
    ) -> Vec<(PathBuf, MonitorResult<String>)> {
        let path = |suffix: &str| self.output_dir.join(format!("{}{suffix}", self.file_stem));
        match format {
            ExportFormat::Json => vec![(path(".json"), render_json(report))],
            ExportFormat::Prometheus => vec![(path(".prom"), render_prometheus(report))],
            ExportFormat::Csv => vec![
                (path("_metrics.csv"), Ok(render_metrics_csv(report))),
                (path("_cross_platform.csv"), Ok(render_cross_platform_csv(report))),
                (path("_providers.csv"), Ok(render_provider_csv(report))),
            ],
        }
    }

    /// Write every configured format, creating the directory if needed.
    pub async fn export(&self, report: &MonitoringReport) -> ExportSummary {
        let mut summary = ExportSummary::default();

        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            warn!(dir = %self.output_dir.display(), error = %e, "cannot create export directory");
        }

        for format in &self.formats {
            for (path, rendered) in self.renderings(*format, report) {
                let result: MonitorResult<()> = match rendered {
                    Ok(body) => tokio::fs::write(&path, body).await.map_err(Into::into),
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => {
                        info!(format = %format, path = %path.display(), "report exported");
                        summary.written.push(path);
                    }
                    Err(e) => {
                        warn!(format = %format, path = %path.display(), error = %e, "report export failed");
                        summary.failures.push(ExportFailure {
                            format: *format,
                            path,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        summary
    }
}
