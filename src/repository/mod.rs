// ==========================================
// KML 批量导入 - 数据仓储层
// ==========================================
// 职责: 数据库结构、空间函数、图层/要素读写
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

pub mod error;
pub mod feature_repo;
pub mod schema_manager;
pub mod sql_functions;

// 重导出核心类型
pub use error::{RepositoryError, RepositoryResult};
pub use feature_repo::{FeatureRepository, FileImportSession};
pub use schema_manager::{SchemaManager, SchemaSetupReport, DEFAULT_SCHEMA, DEFAULT_SRID};
pub use sql_functions::register_spatial_functions;
