// ==========================================
// KML 批量导入 - 领域类型定义
// ==========================================
// 职责: 导入状态、图层分类等值类型
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 文件导入状态 (Import Status)
// ==========================================
// 状态机: PROCESSING → {SUCCESS, SKIPPED, ERROR}
// 序列化格式: SCREAMING_SNAKE_CASE (与汇总报告一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Processing, // 处理中
    Success,    // 文件已处理（可能存在被跳过的要素）
    Skipped,    // 空文件
    Error,      // 文件级失败
}

impl ImportStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ImportStatus::Processing)
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStatus::Processing => write!(f, "PROCESSING"),
            ImportStatus::Success => write!(f, "SUCCESS"),
            ImportStatus::Skipped => write!(f, "SKIPPED"),
            ImportStatus::Error => write!(f, "ERROR"),
        }
    }
}

// ==========================================
// 图层分类 (Layer Category)
// ==========================================
// 由图层名确定性派生，不单独持久化
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerCategory {
    pub category: String,    // 大类
    pub subcategory: String, // 子类
}

impl LayerCategory {
    pub fn new(category: impl Into<String>, subcategory: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.into(),
        }
    }
}

impl fmt::Display for LayerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.subcategory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_status_serialization() {
        let json = serde_json::to_string(&ImportStatus::Success).unwrap();
        assert_eq!(json, "\"SUCCESS\"");

        let parsed: ImportStatus = serde_json::from_str("\"SKIPPED\"").unwrap();
        assert_eq!(parsed, ImportStatus::Skipped);
    }

    #[test]
    fn test_import_status_terminal() {
        assert!(!ImportStatus::Processing.is_terminal());
        assert!(ImportStatus::Success.is_terminal());
        assert!(ImportStatus::Skipped.is_terminal());
        assert!(ImportStatus::Error.is_terminal());
    }
}
