// ==========================================
// KML 批量导入 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 批次级错误（中止整个批次） =====
    #[error("输入目录不存在: {0}")]
    DirectoryNotFound(String),

    #[error("未找到可导入文件: {dir}（扩展名 .{extension}）")]
    NoInputFiles { dir: String, extension: String },

    #[error("数据库结构初始化失败: {0}")]
    SchemaSetupFailed(String),

    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 KML）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("KML 解析失败: {0}")]
    KmlParseError(String),

    #[error("坐标格式错误: {0}")]
    InvalidCoordinates(String),

    // ===== 输出错误 =====
    #[error("报告写入失败: {0}")]
    ReportWriteError(String),

    // ===== 配置错误 =====
    #[error("配置错误 (key: {key}): {message}")]
    ConfigError { key: String, message: String },

    // ===== 仓储错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 批次级致命错误（不产出汇总）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ImportError::DirectoryNotFound(_)
                | ImportError::NoInputFiles { .. }
                | ImportError::SchemaSetupFailed(_)
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ImportError::FileNotFound(err.to_string()),
            _ => ImportError::FileReadError(err.to_string()),
        }
    }
}

// 实现 From<quick_xml::Error>
impl From<quick_xml::Error> for ImportError {
    fn from(err: quick_xml::Error) -> Self {
        ImportError::KmlParseError(err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::ReportWriteError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
