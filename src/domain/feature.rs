// ==========================================
// KML 批量导入 - 要素领域模型
// ==========================================
// 职责: 原始几何记录、待入库要素草稿、要素读模型
// 对齐: features 表
// ==========================================

use chrono::{DateTime, Utc};
use geo::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// FieldValue - 源记录字段值
// ==========================================
// 用途: 几何源读取器产出的动态字段值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Real(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Real(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

// ==========================================
// GeometryRecord - 源几何记录
// ==========================================
// 用途: 几何源读取器输出（一条 Placemark 一条记录）
// 说明: geometry 为 None 表示源要素无几何，入库时由 NOT NULL 约束拒绝
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryRecord {
    pub geometry: Option<Geometry<f64>>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl GeometryRecord {
    pub fn new(geometry: Option<Geometry<f64>>) -> Self {
        Self {
            geometry,
            fields: BTreeMap::new(),
        }
    }

    /// 追加字段（链式构造，测试与读取器共用）
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

// ==========================================
// FeatureDraft - 待入库要素
// ==========================================
// 用途: 要素规范化输出，直接映射为 features 表一行
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDraft {
    pub name: String,                        // 要素名称（缺失时为 "Unnamed"）
    pub category: String,                    // 大类
    pub subcategory: String,                 // 子类
    pub layer_name: String,                  // 图层名（文件名去扩展名）
    pub geometry: Option<Geometry<f64>>,     // 几何（地理坐标系）
    pub area_ha: f64,                        // 面积（公顷）
    pub perimeter_km: f64,                   // 周长/长度（公里）
    pub attributes: BTreeMap<String, String>, // 扩展属性
    pub source_kml: String,                  // 来源文件名
}

impl FeatureDraft {
    /// 扩展属性序列化为 JSON 对象文本（无属性时为 "{}"）
    pub fn attributes_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.attributes)
    }
}

// ==========================================
// FeatureEntity - 要素读模型
// ==========================================
// 对齐: features 表（geometry 以 WKT 返回）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEntity {
    pub id: String,
    pub name: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub layer_name: String,
    pub geometry_wkt: Option<String>,
    pub area_ha: Option<f64>,
    pub perimeter_km: Option<f64>,
    pub attributes: BTreeMap<String, String>,
    pub source_kml: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Integer(42).to_string(), "42");
        assert_eq!(FieldValue::Real(1.5).to_string(), "1.5");
        assert_eq!(FieldValue::Bool(true).to_string(), "true");
        assert_eq!(FieldValue::from("cerca").to_string(), "cerca");
        assert!(FieldValue::Null.is_null());
    }

    #[test]
    fn test_attributes_json_empty_object() {
        let draft = FeatureDraft {
            name: "Unnamed".to_string(),
            category: "Outros".to_string(),
            subcategory: "Geral".to_string(),
            layer_name: "misc".to_string(),
            geometry: None,
            area_ha: 0.0,
            perimeter_km: 0.0,
            attributes: BTreeMap::new(),
            source_kml: "misc.kml".to_string(),
        };

        assert_eq!(draft.attributes_json().unwrap(), "{}");
    }
}
