// ==========================================
// KML 批量导入 - 图层分类器
// ==========================================
// 职责: 图层名 → 大类/子类（关键字子串匹配）
// 规则: 按关键字表声明顺序匹配，首个命中生效
// ==========================================

use crate::domain::types::LayerCategory;
use crate::importer::kml_importer_trait::CategoryClassifier as CategoryClassifierTrait;

/// 关键字表（keyword, 大类, 子类）
///
/// 顺序即优先级：关键字之间可能互为子串，不可换成无序映射
pub const CATEGORY_KEYWORDS: &[(&str, &str, &str)] = &[
    ("PIVO", "Infraestrutura", "Irrigação"),
    ("POCO", "Infraestrutura", "Abastecimento"),
    ("CERCA", "Limite", "Divisão"),
    ("MATA", "Ambiental", "Mata Nativa"),
    ("APP", "Ambiental", "Preservação"),
    ("RESERVA_LEGAL", "Ambiental", "Reserva Legal"),
    ("CASA_COLONO", "Edificação", "Residencial"),
    ("SEDE", "Edificação", "Administrativo"),
    ("PISTA_VAQUEIJADA", "Lazer", "Eventos"),
    ("CONFINAMENTO", "Infraestrutura", "Produtiva"),
    ("CURRAL", "Infraestrutura", "Produtiva"),
    ("SILO", "Infraestrutura", "Armazenamento"),
    ("FABRICA_RACAO", "Infraestrutura", "Produtiva"),
    ("BREJO", "Ambiental", "Hídrico"),
    ("LAGOA", "Ambiental", "Hídrico"),
    ("CORREGO", "Ambiental", "Hídrico"),
    ("ESTRADA", "Transporte", "Rodoviário"),
    ("FERROVIA", "Transporte", "Ferroviário"),
    ("AERODROMO", "Transporte", "Aéreo"),
    ("TALHAO", "Produtiva", "Manejo"),
];

pub const DEFAULT_CATEGORY: &str = "Outros";
pub const DEFAULT_SUBCATEGORY: &str = "Geral";

#[derive(Debug, Default, Clone, Copy)]
pub struct CategoryClassifier;

impl CategoryClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl CategoryClassifierTrait for CategoryClassifier {
    /// 图层分类
    ///
    /// # 规则
    /// - 图层名转大写后按表顺序做子串匹配
    /// - 无匹配 → Outros / Geral
    fn classify(&self, layer_name: &str) -> LayerCategory {
        let upper = layer_name.to_uppercase();

        CATEGORY_KEYWORDS
            .iter()
            .find(|(keyword, _, _)| upper.contains(keyword))
            .map(|(_, category, subcategory)| LayerCategory::new(*category, *subcategory))
            .unwrap_or_else(|| LayerCategory::new(DEFAULT_CATEGORY, DEFAULT_SUBCATEGORY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_keyword_classifies() {
        let classifier = CategoryClassifier::new();
        for (keyword, category, subcategory) in CATEGORY_KEYWORDS {
            let name = format!("fazenda_{}_norte", keyword.to_lowercase());
            let result = classifier.classify(&name);

            // 前序关键字可能是当前关键字的子串，以首个命中者为准
            let expected = CATEGORY_KEYWORDS
                .iter()
                .find(|(k, _, _)| name.to_uppercase().contains(k))
                .unwrap();
            assert_eq!(result.category, expected.1, "关键字 {}", keyword);
            assert_eq!(result.subcategory, expected.2, "关键字 {}", keyword);

            if expected.0 == *keyword {
                assert_eq!(result.category, *category);
                assert_eq!(result.subcategory, *subcategory);
            }
        }
    }

    #[test]
    fn test_case_insensitive_match() {
        let classifier = CategoryClassifier::new();
        let result = classifier.classify("Cerca_Perimetro");
        assert_eq!(result, LayerCategory::new("Limite", "Divisão"));

        let result = classifier.classify("pivo_central_03");
        assert_eq!(result, LayerCategory::new("Infraestrutura", "Irrigação"));
    }

    #[test]
    fn test_declaration_order_wins() {
        let classifier = CategoryClassifier::new();
        // MATA 在 RESERVA_LEGAL 之前声明
        let result = classifier.classify("RESERVA_LEGAL_MATA");
        assert_eq!(result, LayerCategory::new("Ambiental", "Mata Nativa"));

        // POCO 在 CURRAL 之前声明
        let result = classifier.classify("CURRAL_POCO");
        assert_eq!(result, LayerCategory::new("Infraestrutura", "Abastecimento"));
    }

    #[test]
    fn test_default_category() {
        let classifier = CategoryClassifier::new();
        let result = classifier.classify("limites_diversos");
        assert_eq!(result, LayerCategory::new("Outros", "Geral"));

        let result = classifier.classify("");
        assert_eq!(result, LayerCategory::new("Outros", "Geral"));
    }

    #[test]
    fn test_classification_is_pure() {
        let classifier = CategoryClassifier::new();
        let first = classifier.classify("SILO_GRAOS");
        for _ in 0..5 {
            assert_eq!(classifier.classify("SILO_GRAOS"), first);
        }
    }
}
