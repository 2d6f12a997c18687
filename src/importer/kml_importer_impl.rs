// ==========================================
// KML 批量导入 - 导入编排器实现
// ==========================================
// 职责: 整合导入流程，从目录到数据库
// 流程: 发现文件 → 初始化结构 → 逐文件（读取 → 分类 → 注册图层 → 逐要素入库）→ 汇总
// ==========================================
// 失败隔离:
// - 要素级失败: 记为跳过，继续下一要素
// - 文件级失败: 记为 ERROR，继续下一文件
// - 批次级失败: 目录不存在 / 无文件 / 结构初始化失败，不产出汇总
// ==========================================

use crate::config::ImportConfig;
use crate::domain::{
    BatchSummary, GeometryRecord, ImportMetrics, LayerCategory, LayerRecord, LayerRegistration,
};
use crate::importer::category_classifier::CategoryClassifier as CategoryClassifierImpl;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::feature_normalizer::FeatureNormalizer as FeatureNormalizerImpl;
use crate::importer::file_discovery::discover_source_files;
use crate::importer::kml_importer_trait::{
    CategoryClassifier, FeatureNormalizer, GeometrySource, KmlImporter,
};
use crate::importer::kml_parser::KmlParser;
use crate::perf::PerfGuard;
use crate::repository::error::RepositoryResult;
use crate::repository::feature_repo::{FeatureRepository, FileImportSession};
use crate::repository::schema_manager::{SchemaManager, SchemaSetupReport};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, instrument, warn};

// ==========================================
// KmlBatchImporter - 导入编排器
// ==========================================
pub struct KmlBatchImporter<S = KmlParser>
where
    S: GeometrySource,
{
    // 几何源读取器
    source: S,

    // 数据访问层
    schema_manager: SchemaManager,
    feature_repo: FeatureRepository,

    // 导入组件
    classifier: Box<dyn CategoryClassifier>,
    normalizer: Box<dyn FeatureNormalizer>,

    // 源文件扩展名
    extension: String,
}

impl KmlBatchImporter<KmlParser> {
    /// 创建使用 KML 解析器的导入器
    ///
    /// # 参数
    /// - conn: 共享连接（整个批次只打开一次）
    /// - config: 导入配置
    pub fn new(conn: Arc<Mutex<Connection>>, config: &ImportConfig) -> Self {
        Self::with_source(KmlParser::new(), conn, config)
    }
}

impl<S: GeometrySource> KmlBatchImporter<S> {
    /// 使用自定义几何源创建导入器
    pub fn with_source(source: S, conn: Arc<Mutex<Connection>>, config: &ImportConfig) -> Self {
        Self {
            source,
            schema_manager: SchemaManager::new(conn.clone(), &config.schema_name, config.srid),
            feature_repo: FeatureRepository::new(conn, &config.schema_name, config.srid),
            classifier: Box::new(CategoryClassifierImpl::new()),
            normalizer: Box::new(FeatureNormalizerImpl::new()),
            extension: config.source_extension.clone(),
        }
    }

    pub fn feature_repository(&self) -> &FeatureRepository {
        &self.feature_repo
    }

    /// 初始化数据库结构（失败即 SchemaSetupFailed）
    pub fn ensure_schema(&self) -> ImportResult<SchemaSetupReport> {
        self.schema_manager.ensure_schema().map_err(|e| {
            error!(schema = %self.schema_manager.schema(), error = %e, "数据库结构初始化失败");
            ImportError::SchemaSetupFailed(e.to_string())
        })
    }

    /// 按给定顺序导入文件并汇总（调用方负责结构初始化）
    pub fn import_files(&self, files: &[PathBuf]) -> BatchSummary {
        let mut summary = BatchSummary::new(files.len());

        for path in files {
            let metrics = self.import_one(path);
            summary.absorb(metrics);
        }
        summary.finish();

        info!(
            total_files = summary.total_files,
            successful = summary.successful,
            skipped = summary.skipped,
            failed = summary.failed,
            total_features = summary.total_features,
            total_area_ha = %format!("{:.2}", summary.total_area_ha),
            "批次导入完成"
        );
        summary
    }

    /// 单文件事务内: 注册图层 + 逐要素入库
    ///
    /// # 返回
    /// - Err: 仅事务/保存点或图层注册失败（文件级）
    fn import_records(
        &self,
        session: &FileImportSession<'_>,
        metrics: &mut ImportMetrics,
        records: Vec<GeometryRecord>,
        layer_name: &str,
        category: &LayerCategory,
        source_kml: &str,
    ) -> RepositoryResult<()> {
        let layer = LayerRecord::from_layer_name(layer_name, category);
        match session.register_layer(&layer)? {
            LayerRegistration::Inserted => {
                debug!(layer = %layer_name, category = %category, "图层已注册");
            }
            LayerRegistration::AlreadyExists => {
                debug!(layer = %layer_name, "图层已存在，保持原记录");
            }
        }

        for record in records {
            let draft = self
                .normalizer
                .normalize(record, layer_name, category, source_kml);

            match session.insert_feature(&draft) {
                Ok(()) => metrics.record_imported(draft.area_ha),
                Err(e) if e.is_transaction_failure() => return Err(e),
                Err(e) => {
                    warn!(
                        layer = %layer_name,
                        feature = %draft.name,
                        error = %e,
                        "要素入库失败，已跳过"
                    );
                    metrics.record_skipped(&draft.name, &e);
                }
            }
        }
        Ok(())
    }
}

/// 文件名与图层名（文件名去扩展名）
fn file_identity(path: &Path) -> (String, String) {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let layer_name = path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.clone());
    (file_name, layer_name)
}

impl<S: GeometrySource> KmlImporter for KmlBatchImporter<S> {
    #[instrument(skip(self, file_path), fields(file = %file_path.display()))]
    fn import_one(&self, file_path: &Path) -> ImportMetrics {
        let _perf = PerfGuard::new("import_kml_file");
        let (file_name, layer_name) = file_identity(file_path);
        let mut metrics = ImportMetrics::new(&file_name);

        info!(file = %file_name, "开始导入文件");

        // 阶段 0: 读取
        let records = match self.source.read_records(file_path) {
            Ok(records) => records,
            Err(e) => {
                error!(file = %file_name, error = %e, "KML 读取失败");
                metrics.mark_error(format!("KML 读取失败: {}", e));
                return metrics;
            }
        };

        if records.is_empty() {
            warn!(file = %file_name, "文件无要素，已跳过");
            metrics.mark_skipped();
            return metrics;
        }

        // 阶段 1: 分类
        let category = self.classifier.classify(&layer_name);
        debug!(layer = %layer_name, category = %category, records = records.len(), "图层分类完成");

        // 阶段 2: 单文件事务内入库
        let result = self.feature_repo.with_file_transaction(|session| {
            self.import_records(
                session,
                &mut metrics,
                records,
                &layer_name,
                &category,
                &file_name,
            )
        });

        match result {
            Ok(()) => {
                metrics.mark_success();
                info!(
                    file = %file_name,
                    layer = %layer_name,
                    imported = metrics.features_imported,
                    skipped = metrics.features_skipped,
                    area_ha = %format!("{:.2}", metrics.total_area_ha),
                    status = %metrics.status,
                    "文件导入完成"
                );
            }
            Err(e) => {
                error!(file = %file_name, error = %e, "文件导入失败，事务已回滚");
                metrics.discard_imported();
                metrics.mark_error(e.to_string());
            }
        }

        metrics
    }

    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    fn import_batch(&self, dir: &Path) -> ImportResult<BatchSummary> {
        let files = discover_source_files(dir, &self.extension)?;
        if files.is_empty() {
            return Err(ImportError::NoInputFiles {
                dir: dir.display().to_string(),
                extension: self.extension.clone(),
            });
        }
        info!(count = files.len(), "发现待导入文件");

        self.ensure_schema()?;

        Ok(self.import_files(&files))
    }
}
