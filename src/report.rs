// ==========================================
// KML 批量导入 - 汇总报告输出
// ==========================================
// 职责: 批次汇总 → JSON 文档 / 终端文本
// ==========================================

use crate::domain::BatchSummary;
use crate::importer::error::{ImportError, ImportResult};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

// ==========================================
// ReportSink Trait
// ==========================================
// 用途: 汇总报告输出接口
// 实现者: JsonReportSink
pub trait ReportSink {
    fn write_summary(&self, summary: &BatchSummary) -> ImportResult<()>;
}

// ==========================================
// JsonReportSink - JSON 文件输出
// ==========================================
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for JsonReportSink {
    /// 写入格式化 JSON（父目录不存在时创建）
    fn write_summary(&self, summary: &BatchSummary) -> ImportResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ImportError::ReportWriteError(format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(summary)?;
        std::fs::write(&self.path, json)
            .map_err(|e| ImportError::ReportWriteError(format!("{}: {}", self.path.display(), e)))?;

        info!(path = %self.path.display(), "汇总报告已写入");
        Ok(())
    }
}

/// 终端文本汇总
pub fn render_summary_text(summary: &BatchSummary) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "KML 批量导入汇总");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "成功文件: {}", summary.successful);
    let _ = writeln!(out, "跳过文件: {}", summary.skipped);
    let _ = writeln!(out, "失败文件: {}", summary.failed);
    let _ = writeln!(out, "文件总数: {}", summary.total_files);
    let _ = writeln!(out, "导入要素: {}", summary.total_features);
    let _ = writeln!(out, "总面积:   {:.2} ha", summary.total_area_ha);

    let failed: Vec<_> = summary
        .metrics
        .iter()
        .filter(|m| !m.errors.is_empty())
        .collect();
    if !failed.is_empty() {
        let _ = writeln!(out, "{}", "-".repeat(60));
        for metrics in failed {
            let _ = writeln!(
                out,
                "{} [{}] 错误 {} 条",
                metrics.file_name,
                metrics.status,
                metrics.errors.len()
            );
        }
    }
    let _ = write!(out, "{}", rule);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ImportMetrics, ImportStatus};

    fn sample_summary() -> BatchSummary {
        let mut summary = BatchSummary::new(2);

        let mut ok = ImportMetrics::new("PIVO_01.kml");
        ok.record_imported(1.25);
        ok.record_imported(0.75);
        ok.mark_success();
        summary.absorb(ok);

        let mut bad = ImportMetrics::new("quebrado.kml");
        bad.mark_error("KML 读取失败: syntax error");
        summary.absorb(bad);

        summary.finish();
        summary
    }

    #[test]
    fn test_render_summary_text() {
        let text = render_summary_text(&sample_summary());
        assert!(text.contains("成功文件: 1"));
        assert!(text.contains("失败文件: 1"));
        assert!(text.contains("文件总数: 2"));
        assert!(text.contains("导入要素: 2"));
        assert!(text.contains("2.00 ha"));
        assert!(text.contains("quebrado.kml [ERROR]"));
    }

    #[test]
    fn test_json_sink_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reports/2024/resumo.json");
        let sink = JsonReportSink::new(&path);

        sink.write_summary(&sample_summary()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["total_files"], 2);
        assert_eq!(value["successful"], 1);
        assert_eq!(value["failed"], 1);
        assert_eq!(value["files"][1]["name"], "quebrado.kml");
        assert_eq!(value["files"][1]["status"], "ERROR");
        assert!(value["finished_at"].is_string());
        assert_eq!(
            serde_json::from_value::<ImportStatus>(value["files"][0]["status"].clone()).unwrap(),
            ImportStatus::Success
        );
    }
}
