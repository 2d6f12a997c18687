// ==========================================
// KML 批量导入 - 领域模型层
// ==========================================
// 职责: 定义图层/要素实体、导入指标、值类型
// 红线: 不含数据访问逻辑，不含导入流程逻辑
// ==========================================

pub mod feature;
pub mod layer;
pub mod report;
pub mod types;

// 重导出核心类型
pub use feature::{FeatureDraft, FeatureEntity, FieldValue, GeometryRecord};
pub use layer::{LayerEntity, LayerRecord, LayerRegistration};
pub use report::{BatchSummary, FileStatusEntry, ImportMetrics};
pub use types::{ImportStatus, LayerCategory};
