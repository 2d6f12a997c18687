// ==========================================
// KML 批量导入 - 导入配置
// ==========================================
// 职责: 配置加载（默认值 → JSON 文件 → 环境变量）与校验
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::repository::schema_manager::{is_valid_schema_name, DEFAULT_SCHEMA, DEFAULT_SRID};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 配置键 / 环境变量名
pub mod config_keys {
    pub const ENV_DB_PATH: &str = "KML_GIS_IMPORT_DB_PATH";
    pub const ENV_SCHEMA: &str = "KML_GIS_IMPORT_SCHEMA";
    pub const ENV_SRID: &str = "KML_GIS_IMPORT_SRID";
    pub const ENV_REPORT: &str = "KML_GIS_IMPORT_REPORT";
}

pub const DEFAULT_EXTENSION: &str = "kml";

// ==========================================
// LogFormat - 日志输出格式
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

// ==========================================
// ImportConfig
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub db_path: PathBuf,             // 主库路径
    pub schema_name: String,          // 命名空间（默认 gis_data）
    pub srid: i32,                    // 空间参考（默认 4326）
    pub source_extension: String,     // 源文件扩展名（默认 kml）
    pub report_path: Option<PathBuf>, // JSON 汇总报告输出路径
    pub log_format: LogFormat,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            schema_name: DEFAULT_SCHEMA.to_string(),
            srid: DEFAULT_SRID,
            source_extension: DEFAULT_EXTENSION.to_string(),
            report_path: None,
            log_format: LogFormat::Plain,
        }
    }
}

/// 获取默认数据库路径
///
/// # 返回
/// - 用户数据目录/kml-gis-import/gis.db
/// - 无法获取数据目录时: ./kml_gis_import.db
pub fn default_db_path() -> PathBuf {
    match dirs::data_dir() {
        Some(data_dir) => data_dir.join("kml-gis-import").join("gis.db"),
        None => PathBuf::from("./kml_gis_import.db"),
    }
}

impl ImportConfig {
    /// 从 JSON 文件加载（缺失键取默认值）
    pub fn from_file(path: &Path) -> ImportResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ImportError::ConfigError {
            key: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ImportError::ConfigError {
            key: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// 应用环境变量覆写
    pub fn apply_env_overrides(&mut self) -> ImportResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// 应用覆写（lookup: 键 → 值）
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ImportResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(path) = non_empty(config_keys::ENV_DB_PATH) {
            self.db_path = PathBuf::from(path);
        }
        if let Some(schema) = non_empty(config_keys::ENV_SCHEMA) {
            self.schema_name = schema;
        }
        if let Some(srid) = non_empty(config_keys::ENV_SRID) {
            self.srid = srid.parse().map_err(|_| ImportError::ConfigError {
                key: config_keys::ENV_SRID.to_string(),
                message: format!("无法解析为整数: '{}'", srid),
            })?;
        }
        if let Some(report) = non_empty(config_keys::ENV_REPORT) {
            self.report_path = Some(PathBuf::from(report));
        }
        Ok(())
    }

    /// 加载: 默认值 → 配置文件（可选）→ 环境变量，最后校验
    pub fn load(config_file: Option<&Path>) -> ImportResult<Self> {
        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 配置校验
    pub fn validate(&self) -> ImportResult<()> {
        if !is_valid_schema_name(&self.schema_name) {
            return Err(ImportError::ConfigError {
                key: "schema_name".to_string(),
                message: format!("命名空间名称非法: '{}'", self.schema_name),
            });
        }
        if self.srid <= 0 {
            return Err(ImportError::ConfigError {
                key: "srid".to_string(),
                message: format!("SRID 必须为正整数，实际 {}", self.srid),
            });
        }
        if self.source_extension.trim_start_matches('.').trim().is_empty() {
            return Err(ImportError::ConfigError {
                key: "source_extension".to_string(),
                message: "扩展名不能为空".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ImportConfig::default();
        assert_eq!(config.schema_name, "gis_data");
        assert_eq!(config.srid, 4326);
        assert_eq!(config.source_extension, "kml");
        assert!(config.report_path.is_none());
        assert!(config.db_path.ends_with("gis.db") || config.db_path.ends_with("kml_gis_import.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"schema_name": "fazenda", "log_format": "json"}"#).unwrap();

        let config = ImportConfig::from_file(&path).unwrap();
        assert_eq!(config.schema_name, "fazenda");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.srid, 4326);
    }

    #[test]
    fn test_from_file_invalid_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = ImportConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ImportError::ConfigError { .. }));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (config_keys::ENV_DB_PATH, "/tmp/x.db"),
            (config_keys::ENV_SCHEMA, "staging"),
            (config_keys::ENV_SRID, "4674"),
            (config_keys::ENV_REPORT, "  "),
        ]);
        let mut config = ImportConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.schema_name, "staging");
        assert_eq!(config.srid, 4674);
        assert!(config.report_path.is_none());
    }

    #[test]
    fn test_bad_srid_override() {
        let mut config = ImportConfig::default();
        let err = config
            .apply_overrides(|k| (k == config_keys::ENV_SRID).then(|| "wgs84".to_string()))
            .unwrap_err();
        assert!(matches!(err, ImportError::ConfigError { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ImportConfig::default();
        config.schema_name = "gis-data".to_string();
        assert!(config.validate().is_err());

        let mut config = ImportConfig::default();
        config.srid = 0;
        assert!(config.validate().is_err());

        let mut config = ImportConfig::default();
        config.source_extension = ".".to_string();
        assert!(config.validate().is_err());
    }
}
