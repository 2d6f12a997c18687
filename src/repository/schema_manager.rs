// ==========================================
// KML 批量导入 - 数据库结构管理
// ==========================================
// 职责: 幂等地建立命名空间、空间函数、layers/features 表与索引
// 规则:
// - 步骤 1~4 任一失败即为致命错误（整批中止）
// - 索引逐个在 SAVEPOINT 中尝试，失败只记告警
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_functions::register_spatial_functions;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// 默认命名空间
pub const DEFAULT_SCHEMA: &str = "gis_data";

/// 默认空间参考（WGS 84）
pub const DEFAULT_SRID: i32 = 4326;

/// 命名空间名校验: [A-Za-z_][A-Za-z0-9_]*
pub fn is_valid_schema_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ==========================================
// SchemaSetupReport - 结构初始化结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSetupReport {
    pub schema: String,
    pub attached: bool,               // 本次是否新挂载了命名空间
    pub indexes_ready: Vec<String>,   // 已就绪的索引
    pub index_warnings: Vec<String>,  // 创建失败的索引（非致命）
}

// ==========================================
// SchemaManager
// ==========================================
pub struct SchemaManager {
    conn: Arc<Mutex<Connection>>,
    schema: String,
    srid: i32,
}

impl SchemaManager {
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

    /// 幂等初始化数据库结构（每次运行都可调用）
    ///
    /// # 步骤
    /// 1. 挂载命名空间
    /// 2. 注册空间函数
    /// 3. layers 表
    /// 4. features 表 + 几何列登记
    /// 5. 索引（失败不致命）
    pub fn ensure_schema(&self) -> RepositoryResult<SchemaSetupReport> {
        if !is_valid_schema_name(&self.schema) {
            return Err(RepositoryError::ValidationError(format!(
                "命名空间名称非法: '{}'",
                self.schema
            )));
        }
        if self.srid <= 0 {
            return Err(RepositoryError::ValidationError(format!(
                "SRID 非法: {}",
                self.srid
            )));
        }

        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(format!("锁获取失败: {}", e)))?;

        let mut report = SchemaSetupReport {
            schema: self.schema.clone(),
            ..Default::default()
        };

        // 1. 命名空间
        report.attached = self.ensure_namespace(&conn)?;

        // 2. 扩展能力
        register_spatial_functions(&conn)?;
        conn.query_row("SELECT uuid_generate_v4()", [], |row| row.get::<_, String>(0))?;

        // 3~4. 表结构
        conn.execute_batch(&self.tables_sql())?;
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO \"{s}\".geometry_columns \
                 (table_name, column_name, geometry_type_name, srs_id) \
                 VALUES ('features', 'geometry', 'GEOMETRY', ?1)",
                s = self.schema
            ),
            [self.srid],
        )?;

        // 5. 索引
        for (index_name, sql) in self.index_statements() {
            match try_in_savepoint(&conn, index_name, &sql) {
                Ok(()) => {
                    debug!(schema = %self.schema, index = index_name, "索引就绪");
                    report.indexes_ready.push(index_name.to_string());
                }
                Err(e) => {
                    warn!(schema = %self.schema, index = index_name, error = %e, "索引创建失败，已跳过");
                    report
                        .index_warnings
                        .push(format!("{}: {}", index_name, e));
                }
            }
        }

        info!(
            schema = %self.schema,
            srid = self.srid,
            attached = report.attached,
            indexes = report.indexes_ready.len(),
            warnings = report.index_warnings.len(),
            "数据库结构就绪"
        );

        Ok(report)
    }

    /// 挂载命名空间（已挂载则跳过）
    ///
    /// # 返回
    /// - true: 本次新挂载
    fn ensure_namespace(&self, conn: &Connection) -> RepositoryResult<bool> {
        if self.schema == "main" {
            return Ok(false);
        }

        let mut main_file = String::new();
        let mut already_attached = false;
        {
            let mut stmt = conn.prepare("PRAGMA database_list")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(1)?;
                let file: Option<String> = row.get(2)?;
                if name == "main" {
                    main_file = file.unwrap_or_default();
                }
                if name == self.schema {
                    already_attached = true;
                }
            }
        }

        if already_attached {
            return Ok(false);
        }

        let target = attached_file_path(&main_file, &self.schema);
        conn.execute("ATTACH DATABASE ?1 AS ?2", [target.as_str(), self.schema.as_str()])?;
        info!(schema = %self.schema, file = %target, "命名空间已挂载");
        Ok(true)
    }

    fn tables_sql(&self) -> String {
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{s}".layers (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL UNIQUE,
                display_name TEXT,
                description TEXT,
                category TEXT,
                style_config TEXT CHECK (style_config IS NULL OR json_valid(style_config)),
                is_visible INTEGER NOT NULL DEFAULT 1,
                z_index INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS "{s}".features (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                subcategory TEXT,
                layer_name TEXT NOT NULL REFERENCES layers(name),
                geometry BLOB NOT NULL,
                area_ha REAL CHECK (area_ha IS NULL OR abs(area_ha) < 1000000),
                perimeter_km REAL CHECK (perimeter_km IS NULL OR abs(perimeter_km) < 1000000),
                attributes TEXT NOT NULL DEFAULT '{{}}' CHECK (json_valid(attributes)),
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                source_kml TEXT
            );

            CREATE TABLE IF NOT EXISTS "{s}".geometry_columns (
                table_name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                geometry_type_name TEXT NOT NULL,
                srs_id INTEGER NOT NULL,
                PRIMARY KEY (table_name, column_name)
            );
            "#,
            s = self.schema
        )
    }

    /// 索引语句（名称, SQL）
    fn index_statements(&self) -> Vec<(&'static str, String)> {
        let s = &self.schema;
        vec![
            (
                "idx_features_geometry",
                format!(
                    r#"
                    CREATE VIRTUAL TABLE IF NOT EXISTS "{s}".rtree_features_geometry
                        USING rtree(id, minx, maxx, miny, maxy);

                    CREATE TRIGGER IF NOT EXISTS "{s}".rtree_features_geometry_insert
                    AFTER INSERT ON features
                    WHEN (NEW.geometry NOT NULL AND NOT ST_IsEmpty(NEW.geometry))
                    BEGIN
                        INSERT OR REPLACE INTO rtree_features_geometry VALUES (
                            NEW.rowid,
                            ST_MinX(NEW.geometry), ST_MaxX(NEW.geometry),
                            ST_MinY(NEW.geometry), ST_MaxY(NEW.geometry)
                        );
                    END;

                    CREATE TRIGGER IF NOT EXISTS "{s}".rtree_features_geometry_delete
                    AFTER DELETE ON features
                    BEGIN
                        DELETE FROM rtree_features_geometry WHERE id = OLD.rowid;
                    END;
                    "#
                ),
            ),
            (
                "idx_features_category",
                format!(r#"CREATE INDEX IF NOT EXISTS "{s}".idx_features_category ON features(category);"#),
            ),
            (
                "idx_features_name",
                format!(
                    r#"
                    CREATE VIRTUAL TABLE IF NOT EXISTS "{s}".idx_features_name
                        USING fts5(name, content='features', content_rowid='rowid', tokenize='trigram');

                    CREATE TRIGGER IF NOT EXISTS "{s}".idx_features_name_insert
                    AFTER INSERT ON features
                    BEGIN
                        INSERT INTO idx_features_name(rowid, name) VALUES (NEW.rowid, NEW.name);
                    END;
                    "#
                ),
            ),
        ]
    }
}

/// 在独立 SAVEPOINT 中执行；失败则回滚该保存点
fn try_in_savepoint(conn: &Connection, name: &str, sql: &str) -> rusqlite::Result<()> {
    conn.execute_batch(&format!("SAVEPOINT {}", name))?;
    match conn.execute_batch(sql) {
        Ok(()) => conn.execute_batch(&format!("RELEASE {}", name)),
        Err(e) => {
            conn.execute_batch(&format!("ROLLBACK TO {n}; RELEASE {n};", n = name))?;
            Err(e)
        }
    }
}

/// 挂载库文件路径: 主库同目录 `<主库名>.<schema>.db`；内存主库挂载内存库
fn attached_file_path(main_file: &str, schema: &str) -> String {
    if main_file.is_empty() {
        return ":memory:".to_string();
    }

    let main_path = Path::new(main_file);
    let stem = main_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gis".to_string());
    let file_name = format!("{}.{}.db", stem, schema);

    match main_path.parent() {
        Some(parent) => parent.join(file_name).to_string_lossy().into_owned(),
        None => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_name_validation() {
        assert!(is_valid_schema_name("gis_data"));
        assert!(is_valid_schema_name("_staging2"));
        assert!(!is_valid_schema_name(""));
        assert!(!is_valid_schema_name("2gis"));
        assert!(!is_valid_schema_name("gis-data"));
        assert!(!is_valid_schema_name("gis data"));
        assert!(!is_valid_schema_name("x\";DROP"));
    }

    #[test]
    fn test_attached_file_path() {
        assert_eq!(attached_file_path("", "gis_data"), ":memory:");

        let path = attached_file_path("/var/lib/fazenda/gis.db", "gis_data");
        assert_eq!(
            Path::new(&path),
            Path::new("/var/lib/fazenda/gis.gis_data.db")
        );
    }
}
