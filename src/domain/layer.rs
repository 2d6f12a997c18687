// ==========================================
// KML 批量导入 - 图层领域模型
// ==========================================
// 对齐: layers 表
// 规则: 同名图层首次导入生效，后续导入不覆盖
// ==========================================

use crate::domain::types::LayerCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// LayerRecord - 待注册图层
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub name: String,                           // 图层名（唯一键）
    pub display_name: String,                   // 显示名（下划线替换为空格）
    pub description: Option<String>,            // 描述
    pub category: String,                       // 大类
    pub style_config: Option<serde_json::Value>, // 样式配置
    pub is_visible: bool,                       // 是否可见（默认 true）
    pub z_index: i32,                           // 绘制层级（默认 0）
}

impl LayerRecord {
    /// 由图层名与分类构造图层记录
    pub fn from_layer_name(layer_name: &str, category: &LayerCategory) -> Self {
        Self {
            name: layer_name.to_string(),
            display_name: layer_name.replace('_', " "),
            description: None,
            category: category.category.clone(),
            style_config: None,
            is_visible: true,
            z_index: 0,
        }
    }
}

// ==========================================
// LayerRegistration - 图层注册结果
// ==========================================
// insert-if-absent: 已存在不是错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerRegistration {
    Inserted,      // 新建
    AlreadyExists, // 已存在（保持原记录）
}

// ==========================================
// LayerEntity - 图层读模型
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerEntity {
    pub id: String,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub style_config: Option<serde_json::Value>,
    pub is_visible: bool,
    pub z_index: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_layer_name_display_name() {
        let category = LayerCategory::new("Ambiental", "Reserva Legal");
        let layer = LayerRecord::from_layer_name("RESERVA_LEGAL_NORTE", &category);

        assert_eq!(layer.name, "RESERVA_LEGAL_NORTE");
        assert_eq!(layer.display_name, "RESERVA LEGAL NORTE");
        assert_eq!(layer.category, "Ambiental");
        assert!(layer.is_visible);
        assert_eq!(layer.z_index, 0);
        assert!(layer.style_config.is_none());
    }
}
