// ==========================================
// KML 批量导入 - 核心库
// ==========================================
// 技术栈: Rust + SQLite（GeoPackage 几何 + R*Tree + FTS5）
// 用途: 庄园资产目录的 KML 空间数据批量入库
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 外部数据
pub mod importer;

// 配置层
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// SQL 性能统计
pub mod perf;

// 汇总报告输出
pub mod report;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ImportStatus, LayerCategory};

// 领域实体
pub use domain::{
    BatchSummary, FeatureDraft, FeatureEntity, FieldValue, GeometryRecord, ImportMetrics,
    LayerEntity, LayerRecord,
};

// 导入
pub use importer::{
    GeometrySource, ImportError, ImportResult, KmlBatchImporter, KmlImporter, KmlParser,
};

// 配置
pub use config::ImportConfig;

// 报告
pub use report::{render_summary_text, JsonReportSink, ReportSink};

// ==========================================
// 常量定义
// ==========================================

// 版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 名称
pub const APP_NAME: &str = "KML 批量导入工具";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
