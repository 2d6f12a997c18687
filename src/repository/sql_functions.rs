// ==========================================
// KML 批量导入 - SQLite 空间函数
// ==========================================
// 职责: 在连接上注册空间 SQL 函数与 UUID 生成函数
// 存储格式: GeoPackage 二进制几何（GP 头 + srs_id + WKB，无包络）
// ==========================================

use crate::repository::error::RepositoryError;
use geo_traits::{
    CoordTrait, GeometryCollectionTrait, GeometryTrait, LineStringTrait, MultiLineStringTrait,
    MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Error};
use std::str::FromStr;
use wkb::reader::Wkb;
use wkt::Wkt;

const GPKG_HEADER_LEN: usize = 8;

#[derive(Clone, Copy)]
struct Bounds {
    minx: f64,
    maxx: f64,
    miny: f64,
    maxy: f64,
}

/// 注册全部 SQL 函数
///
/// # 函数清单
/// - ST_GeomFromText(wkt, srid) -> BLOB（结构非法的几何报错）
/// - ST_AsText / ST_SRID / ST_MinX / ST_MaxX / ST_MinY / ST_MaxY / ST_IsEmpty
/// - uuid_generate_v4() -> TEXT
pub fn register_spatial_functions(conn: &Connection) -> rusqlite::Result<()> {
    register_st_geomfromtext(conn)?;
    register_st_astext(conn)?;
    register_st_srid(conn)?;
    register_bounds_component(conn, "ST_MinX", |b| b.minx)?;
    register_bounds_component(conn, "ST_MaxX", |b| b.maxx)?;
    register_bounds_component(conn, "ST_MinY", |b| b.miny)?;
    register_bounds_component(conn, "ST_MaxY", |b| b.maxy)?;
    register_st_isempty(conn)?;
    register_uuid_generate_v4(conn)?;
    Ok(())
}

// ==========================================
// GeoPackage 二进制几何编解码
// ==========================================

/// WKB → GeoPackage 几何（小端 srs_id，无包络）
pub fn wkb_to_gpkg_geometry(wkb: &[u8], srs_id: u32) -> Vec<u8> {
    let mut geom = Vec::with_capacity(wkb.len() + GPKG_HEADER_LEN);
    geom.extend_from_slice(&[
        0x47u8, // 'G'
        0x50u8, // 'P'
        0x00u8, // version
        0x01u8, // flags: little endian, no envelope
    ]);
    geom.extend_from_slice(&srs_id.to_le_bytes());
    geom.extend_from_slice(wkb);
    geom
}

/// 剥离 GeoPackage 头与包络，得到 WKB
pub fn gpkg_geometry_to_wkb(blob: &[u8]) -> Result<Wkb<'_>, RepositoryError> {
    if blob.len() < GPKG_HEADER_LEN || blob[0] != 0x47 || blob[1] != 0x50 {
        return Err(RepositoryError::ValidationError(
            "不是 GeoPackage 几何数据".to_string(),
        ));
    }

    let flags = blob[3];
    let envelope_size: usize = match flags & 0b0000_1110 {
        0b0000_0000 => 0,
        0b0000_0010 => 32,
        0b0000_0100 | 0b0000_0110 => 48,
        0b0000_1000 => 64,
        _ => {
            return Err(RepositoryError::ValidationError(format!(
                "GeoPackage 几何标志位非法: {:#04x}",
                flags
            )))
        }
    };
    let offset = GPKG_HEADER_LEN + envelope_size;
    if blob.len() < offset {
        return Err(RepositoryError::ValidationError(
            "GeoPackage 几何数据被截断".to_string(),
        ));
    }

    Wkb::try_new(&blob[offset..])
        .map_err(|e| RepositoryError::ValidationError(format!("WKB 解析失败: {}", e)))
}

/// 读取 GeoPackage 头中的 srs_id
pub fn gpkg_srs_id(blob: &[u8]) -> Result<i32, RepositoryError> {
    if blob.len() < GPKG_HEADER_LEN {
        return Err(RepositoryError::ValidationError(
            "GeoPackage 几何数据被截断".to_string(),
        ));
    }
    let raw = [blob[4], blob[5], blob[6], blob[7]];
    // flags bit0: 1 = 小端
    let srs_id = if blob[3] & 0x01 == 1 {
        i32::from_le_bytes(raw)
    } else {
        i32::from_be_bytes(raw)
    };
    Ok(srs_id)
}

/// WKT → GeoPackage 几何
///
/// # 校验
/// - 线串至少 2 个点
/// - 多边形环至少 4 个点且首尾闭合
/// - 坐标必须为有限值
pub fn geometry_blob_from_wkt(wkt_text: &str, srs_id: u32) -> Result<Vec<u8>, RepositoryError> {
    let geometry = Wkt::<f64>::from_str(wkt_text)
        .map_err(|e| RepositoryError::ValidationError(format!("WKT 解析失败: {}", e)))?;

    validate_geometry(&geometry)?;

    let mut wkb = Vec::new();
    wkb::writer::write_geometry(&mut wkb, &geometry, &Default::default())
        .map_err(|e| RepositoryError::ValidationError(format!("WKB 编码失败: {}", e)))?;

    Ok(wkb_to_gpkg_geometry(&wkb, srs_id))
}

/// GeoPackage 几何 → WKT
pub fn wkt_from_geometry_blob(blob: &[u8]) -> Result<String, RepositoryError> {
    let wkb = gpkg_geometry_to_wkb(blob)?;
    let mut out = String::new();
    wkt::to_wkt::write_geometry(&mut out, &wkb)
        .map_err(|e| RepositoryError::ValidationError(format!("WKT 输出失败: {}", e)))?;
    Ok(out)
}

// ==========================================
// 几何结构校验
// ==========================================

fn validate_geometry<G: GeometryTrait<T = f64>>(geom: &G) -> Result<(), RepositoryError> {
    use geo_traits::GeometryType as GeoType;

    match geom.as_type() {
        GeoType::Point(point) => {
            if let Some(coord) = point.coord() {
                validate_coord(&coord)?;
            }
        }
        GeoType::LineString(line) => validate_line_string(line)?,
        GeoType::Polygon(poly) => validate_polygon(poly)?,
        GeoType::MultiPoint(multi) => {
            for point in multi.points() {
                if let Some(coord) = point.coord() {
                    validate_coord(&coord)?;
                }
            }
        }
        GeoType::MultiLineString(multi) => {
            for line in multi.line_strings() {
                validate_line_string(&line)?;
            }
        }
        GeoType::MultiPolygon(multi) => {
            for poly in multi.polygons() {
                validate_polygon(&poly)?;
            }
        }
        GeoType::GeometryCollection(collection) => {
            for sub_geom in collection.geometries() {
                validate_geometry(&sub_geom)?;
            }
        }
        GeoType::Rect(_) | GeoType::Triangle(_) | GeoType::Line(_) => {
            return Err(RepositoryError::ValidationError(
                "不支持的几何类型".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_coord<C: CoordTrait<T = f64>>(coord: &C) -> Result<(), RepositoryError> {
    let (x, y) = coord.x_y();
    if !x.is_finite() || !y.is_finite() {
        return Err(RepositoryError::ValidationError(format!(
            "坐标非有限值: ({}, {})",
            x, y
        )));
    }
    Ok(())
}

fn validate_line_string<L: LineStringTrait<T = f64>>(line: &L) -> Result<(), RepositoryError> {
    if line.num_coords() == 0 {
        // 空线串（LINESTRING EMPTY）合法
        return Ok(());
    }
    if line.num_coords() < 2 {
        return Err(RepositoryError::ValidationError(format!(
            "线串至少需要 2 个点，实际 {}",
            line.num_coords()
        )));
    }
    for coord in line.coords() {
        validate_coord(&coord)?;
    }
    Ok(())
}

fn validate_ring<L: LineStringTrait<T = f64>>(ring: &L) -> Result<(), RepositoryError> {
    let n = ring.num_coords();
    if n < 4 {
        return Err(RepositoryError::ValidationError(format!(
            "多边形环至少需要 4 个点，实际 {}",
            n
        )));
    }
    for coord in ring.coords() {
        validate_coord(&coord)?;
    }

    let first = ring.coord(0).map(|c| c.x_y());
    let last = ring.coord(n - 1).map(|c| c.x_y());
    if first != last {
        return Err(RepositoryError::ValidationError(
            "多边形环未闭合".to_string(),
        ));
    }
    Ok(())
}

fn validate_polygon<P: PolygonTrait<T = f64>>(poly: &P) -> Result<(), RepositoryError> {
    if let Some(ring) = poly.exterior() {
        validate_ring(&ring)?;
    }
    for ring in poly.interiors() {
        validate_ring(&ring)?;
    }
    Ok(())
}

// ==========================================
// 函数注册
// ==========================================

fn user_error(err: RepositoryError) -> Error {
    Error::UserFunctionError(Box::new(err))
}

fn register_st_geomfromtext(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "ST_GeomFromText",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let wkt_text = match ctx.get_raw(0) {
                ValueRef::Null => return Ok(None),
                ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                    .map_err(|e| Error::UserFunctionError(Box::new(e)))?,
                _ => return Err(Error::InvalidFunctionParameterType(0, Type::Text)),
            };
            let srid: i64 = ctx.get(1)?;
            let srs_id = u32::try_from(srid).map_err(|_| {
                user_error(RepositoryError::ValidationError(format!(
                    "SRID 非法: {}",
                    srid
                )))
            })?;

            geometry_blob_from_wkt(wkt_text, srs_id)
                .map(Some)
                .map_err(user_error)
        },
    )
}

fn register_st_astext(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "ST_AsText",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| match blob_from_ctx(ctx)? {
            Some(blob) => wkt_from_geometry_blob(blob).map(Some).map_err(user_error),
            None => Ok(None),
        },
    )
}

fn register_st_srid(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "ST_SRID",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| match blob_from_ctx(ctx)? {
            Some(blob) => gpkg_srs_id(blob).map(Some).map_err(user_error),
            None => Ok(None),
        },
    )
}

fn register_st_isempty(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "ST_IsEmpty",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let blob = match blob_from_ctx(ctx)? {
                Some(blob) => blob,
                None => return Ok(None),
            };
            let wkb = gpkg_geometry_to_wkb(blob).map_err(user_error)?;
            Ok(Some(i64::from(bounds_from_geometry(&wkb).is_none())))
        },
    )
}

fn register_bounds_component<F>(conn: &Connection, name: &str, f: F) -> rusqlite::Result<()>
where
    F: Fn(Bounds) -> f64 + Copy + Send + Sync + 'static,
{
    conn.create_scalar_function(
        name,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            let blob = match blob_from_ctx(ctx)? {
                Some(blob) => blob,
                None => return Ok(None),
            };
            let wkb = gpkg_geometry_to_wkb(blob).map_err(user_error)?;
            Ok(bounds_from_geometry(&wkb).map(f))
        },
    )
}

fn register_uuid_generate_v4(conn: &Connection) -> rusqlite::Result<()> {
    // 非确定性函数，不能标记 DETERMINISTIC
    conn.create_scalar_function("uuid_generate_v4", 0, FunctionFlags::SQLITE_UTF8, |_ctx| {
        Ok(uuid::Uuid::new_v4().to_string())
    })
}

fn blob_from_ctx<'a>(ctx: &'a Context<'a>) -> rusqlite::Result<Option<&'a [u8]>> {
    match ctx.get_raw(0) {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(blob) => Ok(Some(blob)),
        _ => Err(Error::InvalidFunctionParameterType(0, Type::Blob)),
    }
}

// ==========================================
// 包络计算（R*Tree 触发器使用）
// ==========================================

fn bounds_from_geometry<G: GeometryTrait<T = f64>>(geom: &G) -> Option<Bounds> {
    use geo_traits::GeometryType as GeoType;

    let mut bounds: Option<Bounds> = None;
    match geom.as_type() {
        GeoType::Point(point) => {
            if let Some(coord) = point.coord() {
                add_coord(&mut bounds, &coord);
            }
        }
        GeoType::LineString(line) => add_line_string(&mut bounds, line),
        GeoType::Polygon(poly) => {
            if let Some(ring) = poly.exterior() {
                add_line_string(&mut bounds, &ring);
            }
        }
        GeoType::MultiPoint(multi) => {
            for point in multi.points() {
                if let Some(coord) = point.coord() {
                    add_coord(&mut bounds, &coord);
                }
            }
        }
        GeoType::MultiLineString(multi) => {
            for line in multi.line_strings() {
                add_line_string(&mut bounds, &line);
            }
        }
        GeoType::MultiPolygon(multi) => {
            for poly in multi.polygons() {
                if let Some(ring) = poly.exterior() {
                    add_line_string(&mut bounds, &ring);
                }
            }
        }
        GeoType::GeometryCollection(collection) => {
            for sub_geom in collection.geometries() {
                if let Some(sub) = bounds_from_geometry(&sub_geom) {
                    merge_bounds(&mut bounds, sub);
                }
            }
        }
        GeoType::Rect(_) | GeoType::Triangle(_) | GeoType::Line(_) => {}
    }
    bounds
}

fn add_line_string<L: LineStringTrait<T = f64>>(bounds: &mut Option<Bounds>, line: &L) {
    for coord in line.coords() {
        add_coord(bounds, &coord);
    }
}

fn add_coord<C: CoordTrait<T = f64>>(bounds: &mut Option<Bounds>, coord: &C) {
    let (x, y) = coord.x_y();
    merge_bounds(
        bounds,
        Bounds {
            minx: x,
            maxx: x,
            miny: y,
            maxy: y,
        },
    );
}

fn merge_bounds(bounds: &mut Option<Bounds>, other: Bounds) {
    match bounds {
        Some(existing) => {
            existing.minx = existing.minx.min(other.minx);
            existing.maxx = existing.maxx.max(other.maxx);
            existing.miny = existing.miny.min(other.miny);
            existing.maxy = existing.maxy.max(other.maxy);
        }
        None => *bounds = Some(other),
    }
}
