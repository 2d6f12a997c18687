// ==========================================
// KML 批量导入 - 导入指标与批次汇总
// ==========================================
// 职责: 单文件导入指标（ImportMetrics）、批次汇总（BatchSummary）
// 说明: 仅存在于内存，不落库；批次汇总交给报告输出
// ==========================================

use crate::domain::types::ImportStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ImportMetrics - 单文件导入指标
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportMetrics {
    pub file_name: String,       // 文件名
    pub features_imported: usize, // 成功入库要素数
    pub features_skipped: usize, // 入库失败被跳过的要素数
    pub total_area_ha: f64,      // 成功入库要素面积合计（公顷）
    pub errors: Vec<String>,     // 错误信息（按发生顺序）
    pub status: ImportStatus,    // 文件状态
}

impl ImportMetrics {
    /// 文件开始处理时创建（状态 PROCESSING）
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            features_imported: 0,
            features_skipped: 0,
            total_area_ha: 0.0,
            errors: Vec::new(),
            status: ImportStatus::Processing,
        }
    }

    /// 记录一个成功入库的要素（面积按入库精度取 4 位小数）
    pub fn record_imported(&mut self, area_ha: f64) {
        self.features_imported += 1;
        self.total_area_ha += round_to_column_scale(area_ha);
    }

    /// 文件事务已回滚：作废已入库计数
    pub fn discard_imported(&mut self) {
        self.features_imported = 0;
        self.total_area_ha = 0.0;
    }

    /// 记录一个入库失败的要素
    pub fn record_skipped(&mut self, feature_name: &str, reason: impl std::fmt::Display) {
        self.features_skipped += 1;
        self.errors
            .push(format!("要素 '{}': {}", feature_name, reason));
    }

    pub fn mark_success(&mut self) {
        self.status = ImportStatus::Success;
    }

    pub fn mark_skipped(&mut self) {
        self.status = ImportStatus::Skipped;
    }

    /// 文件级失败：记录原因并置为 ERROR
    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.status = ImportStatus::Error;
    }
}

/// 与 features.area_ha 列的 ROUND(x, 4) 保持一致
fn round_to_column_scale(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

// ==========================================
// FileStatusEntry - 批次汇总中的单文件条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStatusEntry {
    pub name: String,
    pub status: ImportStatus,
    pub features: usize,
}

// ==========================================
// BatchSummary - 批次汇总
// ==========================================
// 由导入编排器逐文件累加，结束后交给报告输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_files: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_features: usize,
    pub total_area_ha: f64,
    pub files: Vec<FileStatusEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    // 单文件完整指标（含要素级错误明细），不写入报告
    #[serde(skip)]
    pub metrics: Vec<ImportMetrics>,
}

impl BatchSummary {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            successful: 0,
            skipped: 0,
            failed: 0,
            total_features: 0,
            total_area_ha: 0.0,
            files: Vec::with_capacity(total_files),
            started_at: Utc::now(),
            finished_at: None,
            metrics: Vec::with_capacity(total_files),
        }
    }

    /// 累加一个文件的导入指标
    ///
    /// # 规则
    /// - 按状态累加 successful / skipped / failed
    /// - 要素数与面积只累加 SUCCESS 文件
    /// - PROCESSING（未终结）按失败计
    pub fn absorb(&mut self, metrics: ImportMetrics) {
        self.files.push(FileStatusEntry {
            name: metrics.file_name.clone(),
            status: metrics.status,
            features: metrics.features_imported,
        });

        match metrics.status {
            ImportStatus::Success => {
                self.successful += 1;
                self.total_features += metrics.features_imported;
                self.total_area_ha += metrics.total_area_ha;
            }
            ImportStatus::Skipped => self.skipped += 1,
            ImportStatus::Error | ImportStatus::Processing => self.failed += 1,
        }

        self.metrics.push(metrics);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// 所有文件均已计入
    pub fn is_complete(&self) -> bool {
        self.successful + self.skipped + self.failed == self.total_files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_with(status: ImportStatus, imported: usize, area: f64) -> ImportMetrics {
        let mut m = ImportMetrics::new(format!("{}.kml", status));
        for _ in 0..imported {
            m.record_imported(area / imported as f64);
        }
        m.status = status;
        m
    }

    #[test]
    fn test_absorb_counts_by_status() {
        let mut summary = BatchSummary::new(3);
        summary.absorb(metrics_with(ImportStatus::Success, 5, 2.0));
        summary.absorb(metrics_with(ImportStatus::Skipped, 0, 0.0));
        summary.absorb(metrics_with(ImportStatus::Error, 0, 0.0));

        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_features, 5);
        assert!((summary.total_area_ha - 2.0).abs() < 1e-9);
        assert!(summary.is_complete());
        assert_eq!(summary.files.len(), 3);
        assert_eq!(summary.files[0].status, ImportStatus::Success);
        assert_eq!(summary.files[0].features, 5);
    }

    #[test]
    fn test_absorb_ignores_counts_of_failed_file() {
        // ERROR 文件即使有部分计数，也不计入总要素数/面积
        let mut summary = BatchSummary::new(1);
        summary.absorb(metrics_with(ImportStatus::Error, 3, 1.5));

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_features, 0);
        assert_eq!(summary.total_area_ha, 0.0);
        assert_eq!(summary.files[0].features, 3);
    }

    #[test]
    fn test_record_imported_rounds_like_column() {
        let mut m = ImportMetrics::new("pivo.kml");
        m.record_imported(0.123_456);
        m.record_imported(1.000_04);

        assert!((m.total_area_ha - 1.1235).abs() < 1e-12);
    }

    #[test]
    fn test_discard_imported_clears_counts() {
        let mut m = ImportMetrics::new("pivo.kml");
        m.record_imported(1.0);
        m.record_skipped("Pivô 2", "CHECK constraint failed");
        m.discard_imported();
        m.mark_error("数据库事务失败");

        assert_eq!(m.features_imported, 0);
        assert_eq!(m.total_area_ha, 0.0);
        assert_eq!(m.features_skipped, 1);
        assert_eq!(m.status, ImportStatus::Error);
    }

    #[test]
    fn test_record_skipped_message_contains_feature_name() {
        let mut m = ImportMetrics::new("cerca.kml");
        m.record_skipped("Cerca 07", "geometry requires more points");

        assert_eq!(m.features_skipped, 1);
        assert_eq!(m.errors.len(), 1);
        assert!(m.errors[0].contains("Cerca 07"));
        assert!(m.errors[0].contains("geometry requires more points"));
    }

    #[test]
    fn test_summary_json_keys() {
        let mut summary = BatchSummary::new(1);
        summary.absorb(metrics_with(ImportStatus::Success, 2, 1.0));
        summary.finish();

        let value = serde_json::to_value(&summary).unwrap();
        for key in [
            "total_files",
            "successful",
            "skipped",
            "failed",
            "total_features",
            "total_area_ha",
            "files",
        ] {
            assert!(value.get(key).is_some(), "缺少字段: {}", key);
        }
        assert!(value.get("metrics").is_none());
        assert_eq!(value["files"][0]["status"], "SUCCESS");
    }
}
