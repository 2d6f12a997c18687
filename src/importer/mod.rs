// ==========================================
// KML 批量导入 - 导入层
// ==========================================
// 职责: 外部 KML 数据导入，生成图层与要素
// 流程: 发现 → 读取 → 分类 → 量算 → 规范化 → 落库 → 汇总
// ==========================================

// 模块声明
pub mod category_classifier;
pub mod error;
pub mod feature_normalizer;
pub mod file_discovery;
pub mod geometry_measurer;
pub mod kml_importer_impl;
pub mod kml_importer_trait;
pub mod kml_parser;

// 重导出核心类型
pub use category_classifier::CategoryClassifier as CategoryClassifierImpl;
pub use error::{ImportError, ImportResult};
pub use feature_normalizer::FeatureNormalizer as FeatureNormalizerImpl;
pub use file_discovery::discover_source_files;
pub use geometry_measurer::GeometryMeasurer as GeometryMeasurerImpl;
pub use kml_importer_impl::KmlBatchImporter;
pub use kml_parser::KmlParser;

// 重导出 Trait 接口
pub use kml_importer_trait::{
    CategoryClassifier, FeatureNormalizer, GeometryMeasurer, GeometrySource, KmlImporter,
};
