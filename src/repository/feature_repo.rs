// ==========================================
// KML 批量导入 - 图层/要素 Repository
// ==========================================
// 职责: 单文件事务、图层注册（insert-if-absent）、要素逐条插入、查询
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================
// 事务模型:
// - 每个文件一个事务，所有要素尝试完后提交一次
// - 每个要素一个 SAVEPOINT，失败只回滚该要素
// ==========================================

use crate::domain::{FeatureDraft, FeatureEntity, LayerEntity, LayerRecord, LayerRegistration};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::types::Type;
use rusqlite::{named_params, params, Connection, OptionalExtension, Row, Transaction};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use wkt::ToWkt;

const FEATURE_SAVEPOINT: &str = "feature_insert";

// ==========================================
// FeatureRepository
// ==========================================
pub struct FeatureRepository {
    conn: Arc<Mutex<Connection>>,
    schema: String,
    srid: i32,
}

impl FeatureRepository {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - conn: 共享连接（与 SchemaManager 共用）
    /// - schema: 命名空间
    /// - srid: 几何空间参考
    pub fn new(conn: Arc<Mutex<Connection>>, schema: impl Into<String>, srid: i32) -> Self {
        Self {
            conn,
            schema: schema.into(),
            srid,
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// 在单文件事务中执行
    ///
    /// # 规则
    /// - 闭包返回 Ok → 提交
    /// - 闭包返回 Err → 整体回滚（文件级失败）
    pub fn with_file_transaction<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        F: FnOnce(&FileImportSession<'_>) -> RepositoryResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(format!("锁获取失败: {}", e)))?;

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let session = FileImportSession {
            tx: &tx,
            schema: &self.schema,
            srid: self.srid,
        };
        let value = f(&session)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(value)
    }

    /// 统计图层要素数
    pub fn count_features(&self, layer_name: &str) -> RepositoryResult<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(format!("锁获取失败: {}", e)))?;

        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM \"{}\".features WHERE layer_name = ?1",
                self.schema
            ),
            params![layer_name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// 按名称查询图层
    pub fn find_layer(&self, name: &str) -> RepositoryResult<Option<LayerEntity>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(format!("锁获取失败: {}", e)))?;

        let layer = conn
            .query_row(
                &format!(
                    r#"
                    SELECT id, name, display_name, description, category,
                           style_config, is_visible, z_index, created_at
                    FROM "{}".layers
                    WHERE name = ?1
                    "#,
                    self.schema
                ),
                params![name],
                map_layer_row,
            )
            .optional()?;
        Ok(layer)
    }

    /// 查询图层全部要素（几何以 WKT 返回，按插入顺序）
    pub fn list_features(&self, layer_name: &str) -> RepositoryResult<Vec<FeatureEntity>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(format!("锁获取失败: {}", e)))?;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT id, name, category, subcategory, layer_name, ST_AsText(geometry),
                   area_ha, perimeter_km, attributes, source_kml, created_at, updated_at
            FROM "{}".features
            WHERE layer_name = ?1
            ORDER BY rowid
            "#,
            self.schema
        ))?;

        let features = stmt
            .query_map(params![layer_name], map_feature_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(features)
    }
}

// ==========================================
// FileImportSession - 单文件事务内的写操作
// ==========================================
pub struct FileImportSession<'a> {
    tx: &'a Transaction<'a>,
    schema: &'a str,
    srid: i32,
}

impl FileImportSession<'_> {
    /// 注册图层（已存在则保持原记录）
    ///
    /// # 返回
    /// - Inserted: 新建
    /// - AlreadyExists: 同名图层已存在（唯一键冲突被吞掉）
    pub fn register_layer(&self, layer: &LayerRecord) -> RepositoryResult<LayerRegistration> {
        let style_config = layer
            .style_config
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = self.tx.execute(
            &format!(
                r#"
                INSERT INTO "{}".layers (
                    id, name, display_name, description, category,
                    style_config, is_visible, z_index
                ) VALUES (
                    uuid_generate_v4(), :name, :display_name, :description, :category,
                    :style_config, :is_visible, :z_index
                )
                ON CONFLICT(name) DO NOTHING
                "#,
                self.schema
            ),
            named_params! {
                ":name": layer.name,
                ":display_name": layer.display_name,
                ":description": layer.description,
                ":category": layer.category,
                ":style_config": style_config,
                ":is_visible": layer.is_visible,
                ":z_index": layer.z_index,
            },
        );

        match result.map_err(RepositoryError::from) {
            Ok(0) => Ok(LayerRegistration::AlreadyExists),
            Ok(_) => Ok(LayerRegistration::Inserted),
            Err(RepositoryError::UniqueConstraintViolation(_)) => {
                Ok(LayerRegistration::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }

    /// 插入单个要素（独立 SAVEPOINT）
    ///
    /// # 返回
    /// - Err(DatabaseTransactionError): 保存点本身失败，文件级错误
    /// - Err(其他): 该要素入库失败，已回滚到保存点
    pub fn insert_feature(&self, draft: &FeatureDraft) -> RepositoryResult<()> {
        self.tx
            .execute_batch(&format!("SAVEPOINT {}", FEATURE_SAVEPOINT))
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        match self.insert_feature_row(draft) {
            Ok(()) => {
                self.tx
                    .execute_batch(&format!("RELEASE {}", FEATURE_SAVEPOINT))
                    .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
                Ok(())
            }
            Err(e) => {
                // 保存点回滚失败时保留原始错误
                if let Err(re) = self.tx.execute_batch(&format!(
                    "ROLLBACK TO {sp}; RELEASE {sp};",
                    sp = FEATURE_SAVEPOINT
                )) {
                    return Err(RepositoryError::DatabaseTransactionError(format!(
                        "{}; rollback: {}",
                        e, re
                    )));
                }
                Err(e)
            }
        }
    }

    fn insert_feature_row(&self, draft: &FeatureDraft) -> RepositoryResult<()> {
        let geometry_wkt = draft.geometry.as_ref().map(|g| g.wkt_string());
        let attributes = draft.attributes_json()?;

        self.tx.execute(
            &format!(
                r#"
                INSERT INTO "{}".features (
                    id, name, category, subcategory, layer_name, geometry,
                    area_ha, perimeter_km, attributes, source_kml
                ) VALUES (
                    uuid_generate_v4(), :name, :category, :subcategory, :layer_name,
                    ST_GeomFromText(:geometry, :srid),
                    ROUND(:area_ha, 4), ROUND(:perimeter_km, 4), :attributes, :source_kml
                )
                "#,
                self.schema
            ),
            named_params! {
                ":name": draft.name,
                ":category": draft.category,
                ":subcategory": draft.subcategory,
                ":layer_name": draft.layer_name,
                ":geometry": geometry_wkt,
                ":srid": self.srid,
                ":area_ha": draft.area_ha,
                ":perimeter_km": draft.perimeter_km,
                ":attributes": attributes,
                ":source_kml": draft.source_kml,
            },
        )?;
        Ok(())
    }
}

// ==========================================
// 行映射
// ==========================================

fn json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn map_layer_row(row: &Row<'_>) -> rusqlite::Result<LayerEntity> {
    Ok(LayerEntity {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        style_config: json_column(row, 5)?,
        is_visible: row.get(6)?,
        z_index: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn map_feature_row(row: &Row<'_>) -> rusqlite::Result<FeatureEntity> {
    let attributes: BTreeMap<String, String> = json_column(row, 8)?.unwrap_or_default();
    Ok(FeatureEntity {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        subcategory: row.get(3)?,
        layer_name: row.get(4)?,
        geometry_wkt: row.get(5)?,
        area_ha: row.get(6)?,
        perimeter_km: row.get(7)?,
        attributes,
        source_kml: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
