// ==========================================
// KML 批量导入 - 要素规范化
// ==========================================
// 职责: 原始几何记录 → 待入库要素（名称/分类/量算/扩展属性/来源）
// ==========================================

use crate::domain::{FeatureDraft, FieldValue, GeometryRecord, LayerCategory};
use crate::importer::geometry_measurer::GeometryMeasurer as GeometryMeasurerImpl;
use crate::importer::kml_importer_trait::{
    FeatureNormalizer as FeatureNormalizerTrait, GeometryMeasurer,
};
use std::collections::BTreeMap;

/// 保留字段：由规范化过程显式产出，不进入扩展属性
pub const RESERVED_FIELDS: &[&str] = &[
    "geometry",
    "layer_name",
    "category",
    "subcategory",
    "area_ha",
    "perimeter_km",
    "name",
    "description",
    "source_kml",
];

/// 缺失名称时的默认值
pub const UNNAMED: &str = "Unnamed";

pub struct FeatureNormalizer<M = GeometryMeasurerImpl> {
    measurer: M,
}

impl FeatureNormalizer {
    pub fn new() -> Self {
        Self {
            measurer: GeometryMeasurerImpl::new(),
        }
    }
}

impl Default for FeatureNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: GeometryMeasurer> FeatureNormalizer<M> {
    pub fn with_measurer(measurer: M) -> Self {
        Self { measurer }
    }
}

/// 源字段名统一: Name → name, Description → description
fn canonical_key(key: String) -> String {
    match key.as_str() {
        "Name" => "name".to_string(),
        "Description" => "description".to_string(),
        _ => key,
    }
}

impl<M: GeometryMeasurer> FeatureNormalizerTrait for FeatureNormalizer<M> {
    /// 要素规范化
    ///
    /// # 规则
    /// - name: 非空名称字段，否则 "Unnamed"
    /// - 分类、图层名、来源文件由调用方提供
    /// - 量算: 无几何时为 0
    /// - attributes: 非保留字段中的非空值，统一转为字符串
    fn normalize(
        &self,
        record: GeometryRecord,
        layer_name: &str,
        category: &LayerCategory,
        source_kml: &str,
    ) -> FeatureDraft {
        let mut name: Option<String> = None;
        let mut attributes = BTreeMap::new();

        for (key, value) in record.fields {
            let key = canonical_key(key);

            if key == "name" {
                if let FieldValue::Text(text) = &value {
                    if !text.trim().is_empty() && name.is_none() {
                        name = Some(text.clone());
                    }
                } else if !value.is_null() && name.is_none() {
                    name = Some(value.to_string());
                }
                continue;
            }

            if RESERVED_FIELDS.contains(&key.as_str()) || value.is_null() {
                continue;
            }
            attributes.insert(key, value.to_string());
        }

        let (area_ha, perimeter_km) = record
            .geometry
            .as_ref()
            .map(|g| self.measurer.measure(g))
            .unwrap_or((0.0, 0.0));

        FeatureDraft {
            name: name.unwrap_or_else(|| UNNAMED.to_string()),
            category: category.category.clone(),
            subcategory: category.subcategory.clone(),
            layer_name: layer_name.to_string(),
            geometry: record.geometry,
            area_ha,
            perimeter_km,
            attributes,
            source_kml: source_kml.to_string(),
        }
    }
}
