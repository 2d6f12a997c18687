// ==========================================
// KML 批量导入 - 配置层
// ==========================================
// 职责: 导入配置，支持默认值 / 配置文件 / 环境变量多级覆写
// ==========================================

pub mod import_config;

// 重导出核心配置
pub use import_config::{config_keys, default_db_path, ImportConfig, LogFormat};
