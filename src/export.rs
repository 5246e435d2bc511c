/*!
 * Export of analytics artifacts
 *
 * Writes each analyzer's output table to its own JSON document. Analyzers
 * that had nothing to compute or that failed are skipped without touching
 * the other artifacts.
 */

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::{info, warn};

use crate::{Result, ClaimsError, ExportFormat};
use crate::analytics::AnalyticsReport;
use crate::config::AnalyticsConfig;
use crate::error::Analyzer;

/// Trait for implementing analytics report exporters
pub trait ReportExporter {
    /// Export every available artifact of the report
    fn export(&self, report: &AnalyticsReport, config: &AnalyticsConfig) -> Result<ExportSummary>;

    /// Get the export format
    fn format(&self) -> ExportFormat;
}

/// What happened to each artifact during an export
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Files written
    pub written: Vec<PathBuf>,
    /// Analyzers with nothing to compute
    pub skipped: Vec<Analyzer>,
    /// Analyzers whose computation failed
    pub failed: Vec<Analyzer>,
}

impl ExportSummary {
    /// True when no analyzer failed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// JSON exporter for analytics artifacts
pub struct JsonExporter {
    /// Indentation width; 0 writes compact JSON
    pub indent: usize,
    /// Whether to export as JSON Lines (one record per line)
    pub json_lines: bool,
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self {
            indent: 4,
            json_lines: false,
        }
    }
}

impl JsonExporter {
    /// Create a new JSON exporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an exporter using the configured indentation
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self::new().with_indent(config.json_indent)
    }

    /// Set indentation width
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    /// Set JSON Lines format
    pub fn as_json_lines(mut self) -> Self {
        self.json_lines = true;
        self.indent = 0; // JSON Lines shouldn't be pretty printed
        self
    }

    /// Write records to `path`
    ///
    /// The document is written to a sibling temporary file first and then
    /// renamed, so a failed write never leaves a truncated artifact behind.
    pub fn write_records<T: Serialize>(&self, path: &Path, records: &[T]) -> Result<()> {
        let tmp_path = path.with_extension("json.tmp");
        let result = self.write_to(&tmp_path, records)
            .and_then(|_| fs::rename(&tmp_path, path).map_err(ClaimsError::from));

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(ClaimsError::Export {
                message: format!("failed to write '{}': {}", path.display(), e),
                format: self.format(),
                suggestion: Some("Check that the output directory is writable".to_string()),
            });
        }
        Ok(())
    }

    fn write_to<T: Serialize>(&self, path: &Path, records: &[T]) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        if self.json_lines {
            for record in records {
                serde_json::to_writer(&mut writer, record)?;
                writeln!(writer)?;
            }
        } else if self.indent == 0 {
            serde_json::to_writer(&mut writer, records)?;
            writeln!(writer)?;
        } else {
            let indent = vec![b' '; self.indent];
            let mut serializer = Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(&indent));
            records.serialize(&mut serializer)?;
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Write one analyzer's artifact and record the outcome
    fn export_artifact<T: Serialize>(
        &self,
        analyzer: Analyzer,
        outcome: &Result<Option<Vec<T>>>,
        path: PathBuf,
        summary: &mut ExportSummary,
    ) -> Result<()> {
        match outcome {
            Ok(Some(records)) => {
                self.write_records(&path, records)?;
                info!(%analyzer, rows = records.len(), path = %path.display(), "wrote artifact");
                summary.written.push(path);
            }
            Ok(None) => {
                warn!(%analyzer, "nothing computed, skipping artifact");
                summary.skipped.push(analyzer);
            }
            Err(e) => {
                warn!(%analyzer, error = %e, path = %path.display(), "analyzer failed, artifact not written");
                summary.failed.push(analyzer);
            }
        }
        Ok(())
    }
}

impl ReportExporter for JsonExporter {
    fn export(&self, report: &AnalyticsReport, config: &AnalyticsConfig) -> Result<ExportSummary> {
        fs::create_dir_all(&config.output_dir)?;

        let mut summary = ExportSummary::default();
        self.export_artifact(Analyzer::CoreMetrics, &report.metrics, config.metrics_path(), &mut summary)?;
        self.export_artifact(Analyzer::ChainRanking, &report.top_chains, config.top_chains_path(), &mut summary)?;
        self.export_artifact(Analyzer::QuantityRanking, &report.common_quantities, config.common_quantity_path(), &mut summary)?;

        Ok(summary)
    }

    fn format(&self) -> ExportFormat {
        if self.json_lines {
            ExportFormat::JsonLines
        } else {
            ExportFormat::Json
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::data_types::*;
    use tempfile::TempDir;

    fn report() -> AnalyticsReport {
        AnalyticsReport {
            metrics: Ok(Some(vec![MetricRecord {
                npi: "1".into(),
                ndc: "d1".into(),
                fills: 2,
                reverted: 1,
                avg_price: 5.0,
                total_price: 10.0,
            }])),
            top_chains: Err(ClaimsError::computation(Analyzer::ChainRanking, "join unavailable")),
            common_quantities: Ok(None),
        }
    }

    #[test]
    fn test_export_writes_only_computed_artifacts() {
        let dir = TempDir::new().unwrap();
        let config = ConfigBuilder::new().output_dir(dir.path().join("out")).build();

        let summary = JsonExporter::new().export(&report(), &config).unwrap();

        assert_eq!(summary.written, vec![config.metrics_path()]);
        assert_eq!(summary.skipped, vec![Analyzer::QuantityRanking]);
        assert_eq!(summary.failed, vec![Analyzer::ChainRanking]);
        assert!(!summary.is_complete());
        assert!(!config.top_chains_path().exists());
        assert!(!config.common_quantity_path().exists());

        let text = fs::read_to_string(config.metrics_path()).unwrap();
        assert!(text.starts_with("[\n    {\n        \"npi\": \"1\""));
        let parsed: Vec<MetricRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0].total_price, 10.0);
    }

    #[test]
    fn test_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("q.json");
        let rows = vec![
            QuantityRankingEntry { ndc: "a".into(), most_prescribed_quantity: vec![30.0] },
            QuantityRankingEntry { ndc: "b".into(), most_prescribed_quantity: vec![] },
        ];
        let exporter = JsonExporter::new().as_json_lines();
        exporter.write_records(&path, &rows).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, vec![
            r#"{"ndc":"a","most_prescribed_quantity":[30]}"#,
            r#"{"ndc":"b","most_prescribed_quantity":[]}"#,
        ]);
        assert_eq!(exporter.format(), ExportFormat::JsonLines);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_write_failure_reports_export_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("m.json");
        let err = JsonExporter::new().write_records(&path, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ClaimsError::Export { .. }));
    }
}
