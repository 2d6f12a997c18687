// ==========================================
// KML 批量导入 - 导入管道 Trait
// ==========================================
// 职责: 定义导入管道各阶段接口（不包含实现）
// ==========================================

use crate::domain::{
    BatchSummary, FeatureDraft, GeometryRecord, ImportMetrics, LayerCategory,
};
use crate::importer::error::ImportResult;
use geo::Geometry;
use std::path::Path;

// ==========================================
// KmlImporter Trait
// ==========================================
// 用途: 导入主接口
// 实现者: KmlBatchImporter
pub trait KmlImporter {
    /// 导入单个文件
    ///
    /// # 返回
    /// - ImportMetrics: 终态为 SUCCESS / SKIPPED / ERROR
    ///
    /// # 说明
    /// - 文件级错误记录在指标中，不向上抛出
    fn import_one(&self, file_path: &Path) -> ImportMetrics;

    /// 批量导入目录下全部源文件
    ///
    /// # 返回
    /// - Ok(BatchSummary): 批次汇总
    /// - Err: 目录不存在 / 无可导入文件 / 数据库结构初始化失败（不产出汇总）
    fn import_batch(&self, dir: &Path) -> ImportResult<BatchSummary>;
}

// ==========================================
// GeometrySource Trait
// ==========================================
// 用途: 几何源读取接口（阶段 0）
// 实现者: KmlParser
pub trait GeometrySource {
    /// 读取文件为几何记录序列
    ///
    /// # 返回
    /// - Ok(Vec<GeometryRecord>): 记录列表（空列表合法）
    /// - Err: 文件不可读、格式错误
    fn read_records(&self, file_path: &Path) -> ImportResult<Vec<GeometryRecord>>;
}

// ==========================================
// CategoryClassifier Trait
// ==========================================
// 用途: 图层分类接口（阶段 1）
// 实现者: CategoryClassifierImpl
pub trait CategoryClassifier {
    /// 图层名 → 大类/子类（无匹配时返回默认分类）
    fn classify(&self, layer_name: &str) -> LayerCategory;
}

// ==========================================
// GeometryMeasurer Trait
// ==========================================
// 用途: 几何量算接口（阶段 2）
// 实现者: GeometryMeasurerImpl
pub trait GeometryMeasurer {
    /// 计算面积（公顷）与周长/长度（公里）
    ///
    /// # 返回
    /// - (area_ha, perimeter_km)
    fn measure(&self, geometry: &Geometry<f64>) -> (f64, f64);
}

// ==========================================
// FeatureNormalizer Trait
// ==========================================
// 用途: 要素规范化接口（阶段 3）
// 实现者: FeatureNormalizerImpl
pub trait FeatureNormalizer {
    /// 原始几何记录 → 待入库要素
    ///
    /// # 参数
    /// - record: 原始几何记录
    /// - layer_name: 图层名（文件名去扩展名）
    /// - category: 图层分类
    /// - source_kml: 来源文件名
    fn normalize(
        &self,
        record: GeometryRecord,
        layer_name: &str,
        category: &LayerCategory,
        source_kml: &str,
    ) -> FeatureDraft;
}
