// ==========================================
// 数据库结构管理集成测试
// ==========================================
// 测试目标: 命名空间挂载、建表、索引、幂等性
// ==========================================


use kml_gis_import::importer::{KmlBatchImporter, KmlImporter};
use kml_gis_import::repository::{FeatureRepository, RepositoryError, SchemaManager};
use kml_gis_import::{FeatureDraft, ImportStatus, LayerCategory, LayerRecord};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;
use test_helpers::{
    create_file_db, create_memory_db, point_placemark, test_config, write_kml,
};

fn schema_objects(conn: &rusqlite::Connection, schema: &str) -> Vec<(String, String)> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT type, name FROM \"{}\".sqlite_master ORDER BY type, name",
            schema
        ))
        .unwrap();
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn test_ensure_schema_creates_tables_and_indexes() {
    let conn = create_memory_db();
    let manager = SchemaManager::new(conn.clone(), "gis_data", 4326);

    let report = manager.ensure_schema().unwrap();

    assert_eq!(report.schema, "gis_data");
    assert!(report.attached);
    assert!(report.index_warnings.is_empty(), "{:?}", report.index_warnings);
    assert_eq!(report.indexes_ready.len(), 3);

    let guard = conn.lock().unwrap();
    let objects = schema_objects(&guard, "gis_data");
    let names: Vec<&str> = objects.iter().map(|(_, n)| n.as_str()).collect();
    for expected in [
        "layers",
        "features",
        "geometry_columns",
        "rtree_features_geometry",
        "idx_features_category",
        "idx_features_name",
    ] {
        assert!(names.contains(&expected), "缺少对象 {}: {:?}", expected, names);
    }
}

#[test]
fn test_ensure_schema_is_idempotent() {
    let conn = create_memory_db();
    let manager = SchemaManager::new(conn.clone(), "gis_data", 4326);

    manager.ensure_schema().unwrap();
    let before = schema_objects(&conn.lock().unwrap(), "gis_data");

    let second = manager.ensure_schema().unwrap();
    let after = schema_objects(&conn.lock().unwrap(), "gis_data");

    assert!(!second.attached, "第二次不应重复挂载");
    assert!(second.index_warnings.is_empty());
    assert_eq!(before, after);

    let registered: i64 = conn
        .lock()
        .unwrap()
        .query_row(
            "SELECT COUNT(*) FROM gis_data.geometry_columns WHERE table_name = 'features'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(registered, 1);
}

#[test]
fn test_geometry_column_registration_uses_srid() {
    let conn = create_memory_db();
    SchemaManager::new(conn.clone(), "gis_data", 31982)
        .ensure_schema()
        .unwrap();

    let (column, srid): (String, i64) = conn
        .lock()
        .unwrap()
        .query_row(
            "SELECT column_name, srs_id FROM gis_data.geometry_columns WHERE table_name = 'features'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(column, "geometry");
    assert_eq!(srid, 31982);
}

#[test]
fn test_invalid_schema_name_rejected() {
    let conn = create_memory_db();
    let err = SchemaManager::new(conn, "gis-data", 4326)
        .ensure_schema()
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ValidationError(_)));
}

#[test]
fn test_invalid_srid_rejected() {
    let conn = create_memory_db();
    let err = SchemaManager::new(conn, "gis_data", 0)
        .ensure_schema()
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ValidationError(_)));
}

#[test]
fn test_main_schema_needs_no_attach() {
    let conn = create_memory_db();
    let report = SchemaManager::new(conn.clone(), "main", 4326)
        .ensure_schema()
        .unwrap();

    assert!(!report.attached);
    let objects = schema_objects(&conn.lock().unwrap(), "main");
    assert!(objects.iter().any(|(t, n)| t == "table" && n == "features"));
}

#[test]
fn test_file_database_attaches_sibling_file() {
    let dir = TempDir::new().unwrap();
    let (conn, db_path) = create_file_db(dir.path());

    SchemaManager::new(conn, "gis_data", 4326)
        .ensure_schema()
        .unwrap();

    assert!(db_path.exists());
    assert!(dir.path().join("gis.gis_data.db").exists());
}

#[test]
fn test_feature_requires_registered_layer() {
    let conn = create_memory_db();
    SchemaManager::new(conn.clone(), "gis_data", 4326)
        .ensure_schema()
        .unwrap();
    let repo = FeatureRepository::new(conn, "gis_data", 4326);

    let draft = FeatureDraft {
        name: "Poço 1".to_string(),
        category: "Infraestrutura".to_string(),
        subcategory: "Abastecimento".to_string(),
        layer_name: "POCOS".to_string(),
        geometry: Some(geo::Geometry::Point(geo::Point::new(-47.1, -21.3))),
        area_ha: 0.0,
        perimeter_km: 0.0,
        attributes: BTreeMap::new(),
        source_kml: "POCOS.kml".to_string(),
    };

    // 图层未注册 → 外键拒绝
    let err = repo
        .with_file_transaction(|session| session.insert_feature(&draft))
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ForeignKeyViolation(_)), "{:?}", err);

    // 注册后可入库
    repo.with_file_transaction(|session| {
        let layer = LayerRecord::from_layer_name(
            "POCOS",
            &LayerCategory::new("Infraestrutura", "Abastecimento"),
        );
        session.register_layer(&layer)?;
        session.insert_feature(&draft)
    })
    .unwrap();
    assert_eq!(repo.count_features("POCOS").unwrap(), 1);
}

#[test]
fn test_index_failure_does_not_block_setup() {
    let conn = create_memory_db();
    // 预先占用索引名，使该索引创建失败
    conn.lock()
        .unwrap()
        .execute_batch(
            "ATTACH DATABASE ':memory:' AS gis_data; \
             CREATE TABLE gis_data.idx_features_category (x INTEGER);",
        )
        .unwrap();

    let report = SchemaManager::new(conn.clone(), "gis_data", 4326)
        .ensure_schema()
        .unwrap();

    assert!(!report.attached);
    assert_eq!(report.index_warnings.len(), 1, "{:?}", report.index_warnings);
    assert!(report.index_warnings[0].contains("idx_features_category"));
    assert_eq!(report.indexes_ready.len(), 2);
    assert!(!report
        .indexes_ready
        .iter()
        .any(|name| name == "idx_features_category"));

    // 表仍可用，导入照常完成
    let dir = TempDir::new().unwrap();
    let path = write_kml(dir.path(), "POCOS.kml", &[point_placemark("Poço 1", 0.0, 0.0)]);
    let importer = KmlBatchImporter::new(conn, &test_config(Path::new(":memory:")));
    let metrics = importer.import_one(&path);

    assert_eq!(metrics.status, ImportStatus::Success);
    assert_eq!(metrics.features_imported, 1);
    assert_eq!(importer.feature_repository().count_features("POCOS").unwrap(), 1);
}
