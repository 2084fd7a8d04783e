//! Result artifacts: raw per-run CSV, per-policy summary CSV, narrative report

use crate::error::{Error, Result};
use crate::evaluation::harness::EvaluationReport;
use crate::evaluation::stats::PolicyStatistics;
use crate::evaluation::types::RunRecord;
use crate::scheduler::PolicyKind;
use chrono::SecondsFormat;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const RAW_METRICS_FILE: &str = "evaluation_raw_metrics.csv";
pub const POLICY_SUMMARY_FILE: &str = "evaluation_policy_summary.csv";
pub const RESEARCH_SUMMARY_FILE: &str = "evaluation_research_summary.txt";

const RAW_METRICS_HEADER: &str = "timestamp,run_id,policy,total_cloudlets,finished_cloudlets,\
completion_rate_pct,avg_cpu_time_s,makespan_s,energy_kwh,carbon_kg_co2";

const POLICY_SUMMARY_HEADER: &str = "policy,runs,completion_mean_pct,completion_std_pct,\
makespan_mean_s,makespan_std_s,energy_mean_kwh,energy_std_kwh,carbon_mean_kg,carbon_std_kg";

/// Paths of the written artifacts
#[derive(Clone, Debug, PartialEq)]
pub struct ExportedArtifacts {
    pub raw_metrics: PathBuf,
    pub policy_summary: PathBuf,
    pub research_summary: PathBuf,
}

/// Writes evaluation results under a results directory
#[derive(Clone, Debug)]
pub struct ResultsExporter {
    dir: PathBuf,
}

impl ResultsExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn render_raw_metrics(records: &[RunRecord]) -> String {
        let mut out = String::from(RAW_METRICS_HEADER);
        out.push('\n');
        for r in records {
            out.push_str(&format!(
                "{},{},{},{},{},{:.2},{:.2},{:.2},{:.6},{:.6}\n",
                r.timestamp,
                r.run_id,
                r.policy,
                r.total_workloads,
                r.finished_workloads,
                r.completion_rate,
                r.avg_cpu_time,
                r.makespan,
                r.energy_kwh,
                r.carbon_kg
            ));
        }
        out
    }

    pub fn render_policy_summary(statistics: &[PolicyStatistics]) -> String {
        let mut out = String::from(POLICY_SUMMARY_HEADER);
        out.push('\n');
        for s in statistics {
            out.push_str(&format!(
                "{},{},{:.4},{:.4},{:.4},{:.4},{:.6},{:.6},{:.6},{:.6}\n",
                s.policy,
                s.runs,
                s.completion_rate.mean,
                s.completion_rate.std_dev,
                s.makespan.mean,
                s.makespan.std_dev,
                s.energy_kwh.mean,
                s.energy_kwh.std_dev,
                s.carbon_kg.mean,
                s.carbon_kg.std_dev
            ));
        }
        out
    }

    pub fn render_report(report: &EvaluationReport) -> String {
        let ctx = &report.context;
        let mut out = String::new();

        out.push_str("Research Evaluation Summary\n");
        out.push_str("===========================\n");
        out.push_str(&format!(
            "Generated At: {}\nRuns Per Policy: {}\nHosts: {}\nVMs: {}\nCloudlets: {}\n\n",
            ctx.generated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ctx.runs,
            ctx.host_count,
            ctx.vm_count,
            ctx.workload_count
        ));

        out.push_str("Policy Statistics (mean +- std)\n");
        out.push_str("--------------------------------\n");
        for s in &report.statistics {
            out.push_str(&format!(
                "{} | completion: {:.2} +- {:.2} % | makespan: {:.2} +- {:.2} s | \
                 energy: {:.4} +- {:.4} kWh | carbon: {:.4} +- {:.4} kg CO2\n",
                s.policy,
                s.completion_rate.mean,
                s.completion_rate.std_dev,
                s.makespan.mean,
                s.makespan.std_dev,
                s.energy_kwh.mean,
                s.energy_kwh.std_dev,
                s.carbon_kg.mean,
                s.carbon_kg.std_dev
            ));
        }

        if report.statistics_for(PolicyKind::CarbonAware.name()).is_some() {
            out.push('\n');
            out.push_str(&format!(
                "{} Relative Improvements\n",
                PolicyKind::CarbonAware.name()
            ));
            out.push_str("-----------------------------\n");
            for imp in report.improvements() {
                out.push_str(&format!(
                    "vs {} -> energy: {:.2}%, carbon: {:.2}%, makespan: {:.2}%\n",
                    imp.baseline, imp.energy_pct, imp.carbon_pct, imp.makespan_pct
                ));
            }
        }

        out
    }

    /// Render all artifacts, then write them atomically
    ///
    /// Contents go to hidden temporary files first and are renamed into
    /// place only once all three were written, so a failed export leaves no
    /// partial artifact behind. A target occupied by a directory fails the
    /// export before anything is renamed.
    pub async fn export(&self, report: &EvaluationReport) -> Result<ExportedArtifacts> {
        let artifacts = [
            (RAW_METRICS_FILE, Self::render_raw_metrics(&report.records)),
            (
                POLICY_SUMMARY_FILE,
                Self::render_policy_summary(&report.statistics),
            ),
            (RESEARCH_SUMMARY_FILE, Self::render_report(report)),
        ];

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::io(&self.dir, e))?;

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(artifacts.len());
        for (name, contents) in &artifacts {
            let tmp = self.dir.join(format!(".{name}.tmp"));
            if let Err(e) = tokio::fs::write(&tmp, contents).await {
                discard(&staged).await;
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(Error::io(tmp, e));
            }
            debug!("Staged {}", tmp.display());
            staged.push((tmp, self.dir.join(name)));
        }

        for (_, target) in &staged {
            if is_directory(target).await {
                discard(&staged).await;
                let e = io::Error::other("artifact path is a directory");
                return Err(Error::io(target, e));
            }
        }

        for (i, (tmp, target)) in staged.iter().enumerate() {
            if let Err(e) = tokio::fs::rename(tmp, target).await {
                discard(&staged[i..]).await;
                return Err(Error::io(target, e));
            }
        }

        let exported = ExportedArtifacts {
            raw_metrics: self.dir.join(RAW_METRICS_FILE),
            policy_summary: self.dir.join(POLICY_SUMMARY_FILE),
            research_summary: self.dir.join(RESEARCH_SUMMARY_FILE),
        };
        info!(
            "Wrote {} run records and {} policy summaries to {}",
            report.records.len(),
            report.statistics.len(),
            self.dir.display()
        );
        Ok(exported)
    }
}

async fn is_directory(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

async fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = tokio::fs::remove_file(tmp).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::harness::ReportContext;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(run_id: u32, policy: &str, energy: f64, carbon: f64) -> RunRecord {
        RunRecord {
            timestamp: "2025-03-01T12:00:00.000Z".to_string(),
            run_id,
            policy: policy.to_string(),
            total_workloads: 100,
            finished_workloads: 100,
            completion_rate: 100.0,
            avg_cpu_time: 10.0,
            makespan: 20.0,
            energy_kwh: energy,
            carbon_kg: carbon,
        }
    }

    fn report() -> EvaluationReport {
        let context = ReportContext {
            generated_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            runs: 2,
            host_count: 50,
            vm_count: 100,
            workload_count: 100,
        };
        EvaluationReport::new(
            context,
            vec![
                record(1, "FIRST_FIT", 0.1, 0.05),
                record(1, "ENERGY_AWARE", 0.08, 0.04),
                record(1, "CIAVMP", 0.08, 0.02),
                record(2, "FIRST_FIT", 0.1, 0.05),
                record(2, "ENERGY_AWARE", 0.08, 0.04),
                record(2, "CIAVMP", 0.08, 0.02),
            ],
        )
    }

    #[test]
    fn test_raw_metrics_rows() {
        let csv = ResultsExporter::render_raw_metrics(&report().records);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 1 + 6);
        assert_eq!(lines[0], RAW_METRICS_HEADER);
        assert_eq!(
            lines[1],
            "2025-03-01T12:00:00.000Z,1,FIRST_FIT,100,100,100.00,10.00,20.00,0.100000,0.050000"
        );
    }

    #[test]
    fn test_policy_summary_rows() {
        let csv = ResultsExporter::render_policy_summary(&report().statistics);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 1 + 3);
        assert_eq!(lines[0], POLICY_SUMMARY_HEADER);
        assert_eq!(
            lines[3],
            "CIAVMP,2,100.0000,0.0000,20.0000,0.0000,0.080000,0.000000,0.020000,0.000000"
        );
    }

    #[test]
    fn test_report_contents() {
        let text = ResultsExporter::render_report(&report());

        assert!(text.starts_with("Research Evaluation Summary\n"));
        assert!(text.contains("Generated At: 2025-03-01T12:00:00.000Z\n"));
        assert!(text.contains("Runs Per Policy: 2\n"));
        assert!(text.contains("Cloudlets: 100\n"));
        assert!(text.contains(
            "FIRST_FIT | completion: 100.00 +- 0.00 % | makespan: 20.00 +- 0.00 s | \
             energy: 0.1000 +- 0.0000 kWh | carbon: 0.0500 +- 0.0000 kg CO2"
        ));
        assert!(text.contains("CIAVMP Relative Improvements\n"));
        assert!(text.contains("vs FIRST_FIT -> energy: 20.00%, carbon: 60.00%, makespan: 0.00%\n"));
        assert!(
            text.contains("vs ENERGY_AWARE -> energy: 0.00%, carbon: 50.00%, makespan: 0.00%\n")
        );
    }

    #[test]
    fn test_report_without_carbon_policy_has_no_improvements() {
        let context = report().context;
        let only_baseline =
            EvaluationReport::new(context, vec![record(1, "FIRST_FIT", 0.1, 0.05)]);
        let text = ResultsExporter::render_report(&only_baseline);
        assert!(!text.contains("Relative Improvements"));
    }

    #[tokio::test]
    async fn test_export_writes_three_artifacts() {
        let tmp = TempDir::new().unwrap();
        let exporter = ResultsExporter::new(tmp.path().join("results"));

        let exported = exporter.export(&report()).await.unwrap();

        let raw = std::fs::read_to_string(&exported.raw_metrics).unwrap();
        let summary = std::fs::read_to_string(&exported.policy_summary).unwrap();
        let text = std::fs::read_to_string(&exported.research_summary).unwrap();
        assert_eq!(raw.lines().count(), 7);
        assert_eq!(summary.lines().count(), 4);
        assert!(text.contains("Policy Statistics (mean +- std)"));

        let leftovers: Vec<_> = std::fs::read_dir(exporter.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_export_fails_when_directory_cannot_be_created() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("results");
        std::fs::write(&blocker, "not a directory").unwrap();

        let exporter = ResultsExporter::new(&blocker);
        let err = exporter.export(&report()).await.unwrap_err();
        assert!(matches!(err, Error::IoError { .. }));
        assert!(blocker.is_file());
    }

    #[tokio::test]
    async fn test_export_blocked_artifact_leaves_previous_results() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("results");
        std::fs::create_dir_all(dir.join(POLICY_SUMMARY_FILE)).unwrap();
        std::fs::write(dir.join(RAW_METRICS_FILE), "previous").unwrap();

        let exporter = ResultsExporter::new(&dir);
        let err = exporter.export(&report()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::IoError { ref path, .. } if path.ends_with(POLICY_SUMMARY_FILE)
        ));

        assert_eq!(
            std::fs::read_to_string(dir.join(RAW_METRICS_FILE)).unwrap(),
            "previous"
        );
        assert!(!dir.join(RESEARCH_SUMMARY_FILE).exists());

        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
