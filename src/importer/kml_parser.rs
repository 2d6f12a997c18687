// ==========================================
// KML 批量导入 - KML 解析器
// ==========================================
// 职责: KML 文件 → 几何记录序列（一条 Placemark 一条记录）
// 工具: quick-xml 流式解析
// ==========================================
// 支持:
// - Placemark 任意层级（Document / Folder 嵌套）
// - name / description / ExtendedData (Data + SchemaData)
// - Point / LineString / LinearRing / Polygon / MultiGeometry
// ==========================================

use crate::domain::{FieldValue, GeometryRecord};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::kml_importer_trait::GeometrySource;
use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

// ==========================================
// 解析中间结构
// ==========================================

/// 几何构造帧（支持 MultiGeometry 嵌套）
enum GeometryFrame {
    Point(Vec<Coord<f64>>),
    LineString(Vec<Coord<f64>>),
    LinearRing(Vec<Coord<f64>>),
    Polygon {
        exterior: Option<LineString<f64>>,
        interiors: Vec<LineString<f64>>,
    },
    Multi(Vec<Geometry<f64>>),
}

/// SchemaData 中待定类型的字段
struct PendingSimpleData {
    schema_ref: Option<String>,
    name: String,
    raw: Option<String>,
}

#[derive(Default)]
struct PlacemarkBuilder {
    name: Option<String>,
    description: Option<String>,
    data: Vec<(String, Option<String>)>,
    simple_data: Vec<PendingSimpleData>,
    geometry: Option<Geometry<f64>>,
}

#[derive(Default)]
struct ParseState {
    path: Vec<String>, // 元素栈（local name）
    text: String,      // 当前元素文本
    root_seen: bool,

    // Schema 声明: schema id → (字段名 → 类型)
    schemas: HashMap<String, HashMap<String, String>>,
    current_schema: Option<String>,

    placemark: Option<PlacemarkBuilder>,
    frames: Vec<GeometryFrame>,
    data_name: Option<String>,
    data_value: Option<String>,
    schema_ref: Option<String>,
    simple_data_name: Option<String>,

    finished: Vec<PlacemarkBuilder>,
}

impl ParseState {
    fn parent(&self) -> Option<&str> {
        // path 末尾为当前元素，倒数第二为父元素
        self.path.iter().rev().nth(1).map(String::as_str)
    }

    fn take_text(&mut self) -> Option<String> {
        let text = std::mem::take(&mut self.text);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn handle_start(&mut self, e: &BytesStart<'_>) -> ImportResult<()> {
        let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

        if !self.root_seen {
            if local != "kml" {
                return Err(ImportError::UnsupportedFormat(format!(
                    "根元素应为 <kml>，实际为 <{}>",
                    local
                )));
            }
            self.root_seen = true;
        }

        self.text.clear();

        match local.as_str() {
            "Schema" => {
                let id = attr(e, "id")?.or(attr(e, "name")?).unwrap_or_default();
                self.schemas.entry(id.clone()).or_default();
                self.current_schema = Some(id);
            }
            "SimpleField" => {
                if let (Some(schema), Some(name)) = (self.current_schema.clone(), attr(e, "name")?) {
                    let field_type = attr(e, "type")?.unwrap_or_else(|| "string".to_string());
                    self.schemas
                        .entry(schema)
                        .or_default()
                        .insert(name, field_type.to_ascii_lowercase());
                }
            }
            "Placemark" => {
                self.placemark = Some(PlacemarkBuilder::default());
                self.frames.clear();
            }
            _ if self.placemark.is_none() => {}
            "Data" => {
                self.data_name = attr(e, "name")?;
                self.data_value = None;
            }
            "SchemaData" => {
                self.schema_ref = attr(e, "schemaUrl")?
                    .map(|url| url.trim_start_matches('#').to_string());
            }
            "SimpleData" => {
                self.simple_data_name = attr(e, "name")?;
            }
            "Point" => self.frames.push(GeometryFrame::Point(Vec::new())),
            "LineString" => self.frames.push(GeometryFrame::LineString(Vec::new())),
            "LinearRing" => self.frames.push(GeometryFrame::LinearRing(Vec::new())),
            "Polygon" => self.frames.push(GeometryFrame::Polygon {
                exterior: None,
                interiors: Vec::new(),
            }),
            "MultiGeometry" => self.frames.push(GeometryFrame::Multi(Vec::new())),
            _ => {}
        }

        self.path.push(local);
        Ok(())
    }

    fn handle_end(&mut self) -> ImportResult<()> {
        let parent = self.parent().map(str::to_string);
        let local = self.path.last().cloned().unwrap_or_default();
        let text = self.take_text();

        match local.as_str() {
            "Schema" => self.current_schema = None,
            "Placemark" => {
                if let Some(placemark) = self.placemark.take() {
                    self.finished.push(placemark);
                }
                self.frames.clear();
            }
            _ if self.placemark.is_none() => {}
            "name" if parent.as_deref() == Some("Placemark") => {
                if let Some(p) = self.placemark.as_mut() {
                    p.name = text;
                }
            }
            "description" if parent.as_deref() == Some("Placemark") => {
                if let Some(p) = self.placemark.as_mut() {
                    p.description = text;
                }
            }
            "value" if parent.as_deref() == Some("Data") => self.data_value = text,
            "Data" => {
                if let (Some(name), Some(p)) = (self.data_name.take(), self.placemark.as_mut()) {
                    p.data.push((name, self.data_value.take()));
                }
            }
            "SimpleData" => {
                if let (Some(name), Some(p)) =
                    (self.simple_data_name.take(), self.placemark.as_mut())
                {
                    p.simple_data.push(PendingSimpleData {
                        schema_ref: self.schema_ref.clone(),
                        name,
                        raw: text,
                    });
                }
            }
            "SchemaData" => self.schema_ref = None,
            "coordinates" => {
                let coords = parse_coordinates(text.as_deref().unwrap_or_default())?;
                match self.frames.last_mut() {
                    Some(GeometryFrame::Point(c))
                    | Some(GeometryFrame::LineString(c))
                    | Some(GeometryFrame::LinearRing(c)) => *c = coords,
                    _ => {}
                }
            }
            "Point" | "LineString" | "LinearRing" | "Polygon" | "MultiGeometry" => {
                self.close_geometry(&local, parent.as_deref())?;
            }
            _ => {}
        }

        self.path.pop();
        Ok(())
    }

    /// 几何元素结束：出栈并挂到父帧或 Placemark
    fn close_geometry(&mut self, local: &str, parent: Option<&str>) -> ImportResult<()> {
        let frame = match self.frames.pop() {
            Some(frame) => frame,
            None => return Ok(()),
        };

        // LinearRing 位于 Polygon 边界内
        if let GeometryFrame::LinearRing(coords) = &frame {
            if let Some(GeometryFrame::Polygon {
                exterior,
                interiors,
            }) = self.frames.last_mut()
            {
                let ring = LineString::new(coords.clone());
                match parent {
                    Some("outerBoundaryIs") => *exterior = Some(ring),
                    Some("innerBoundaryIs") => interiors.push(ring),
                    _ => {}
                }
                return Ok(());
            }
        }

        let geometry = match frame {
            GeometryFrame::Point(coords) => match coords.first() {
                Some(c) => Some(Geometry::Point(Point(*c))),
                None => None,
            },
            GeometryFrame::LineString(coords) | GeometryFrame::LinearRing(coords) => {
                Some(Geometry::LineString(LineString::new(coords)))
            }
            GeometryFrame::Polygon {
                exterior,
                interiors,
            } => Some(Geometry::Polygon(Polygon::new(
                exterior.unwrap_or_else(|| LineString::new(Vec::new())),
                interiors,
            ))),
            GeometryFrame::Multi(children) => Some(collapse_multi(children)),
        };

        let geometry = match geometry {
            Some(g) => g,
            None => {
                debug!(element = local, "几何元素无坐标，已忽略");
                return Ok(());
            }
        };

        match self.frames.last_mut() {
            Some(GeometryFrame::Multi(children)) => children.push(geometry),
            _ => {
                if let Some(p) = self.placemark.as_mut() {
                    // 同一 Placemark 多个几何：首个生效
                    if p.geometry.is_none() {
                        p.geometry = Some(geometry);
                    }
                }
            }
        }
        Ok(())
    }

    /// 汇总为几何记录（SchemaData 按 Schema 声明定型）
    fn into_records(self) -> Vec<GeometryRecord> {
        let schemas = self.schemas;
        self.finished
            .into_iter()
            .map(|p| {
                let mut record = GeometryRecord::new(p.geometry)
                    .with_field("Name", text_or_null(p.name))
                    .with_field("Description", text_or_null(p.description));

                for (name, value) in p.data {
                    record.fields.insert(name, text_or_null(value));
                }

                for field in p.simple_data {
                    let declared = field
                        .schema_ref
                        .as_ref()
                        .and_then(|id| schemas.get(id))
                        .and_then(|fields| fields.get(&field.name))
                        .map(String::as_str);
                    let value = typed_value(field.raw, declared);
                    record.fields.insert(field.name, value);
                }
                record
            })
            .collect()
    }
}

fn text_or_null(value: Option<String>) -> FieldValue {
    value.map(FieldValue::Text).unwrap_or(FieldValue::Null)
}

/// 按 SimpleField 类型转换（无法解析时保留文本）
fn typed_value(raw: Option<String>, declared: Option<&str>) -> FieldValue {
    let raw = match raw {
        Some(raw) => raw,
        None => return FieldValue::Null,
    };

    match declared {
        Some("int") | Some("uint") | Some("short") | Some("ushort") => raw
            .parse::<i64>()
            .map(FieldValue::Integer)
            .unwrap_or(FieldValue::Text(raw)),
        Some("float") | Some("double") => raw
            .parse::<f64>()
            .map(FieldValue::Real)
            .unwrap_or(FieldValue::Text(raw)),
        Some("bool") => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" => FieldValue::Bool(true),
            "0" | "false" => FieldValue::Bool(false),
            _ => FieldValue::Text(raw),
        },
        _ => FieldValue::Text(raw),
    }
}

/// MultiGeometry 子几何同质时合并为 Multi*，否则为 GeometryCollection
fn collapse_multi(children: Vec<Geometry<f64>>) -> Geometry<f64> {
    if !children.is_empty() && children.iter().all(|g| matches!(g, Geometry::Point(_))) {
        let points = children
            .into_iter()
            .filter_map(|g| match g {
                Geometry::Point(p) => Some(p),
                _ => None,
            })
            .collect::<Vec<_>>();
        return Geometry::MultiPoint(MultiPoint(points));
    }
    if !children.is_empty() && children.iter().all(|g| matches!(g, Geometry::LineString(_))) {
        let lines = children
            .into_iter()
            .filter_map(|g| match g {
                Geometry::LineString(l) => Some(l),
                _ => None,
            })
            .collect::<Vec<_>>();
        return Geometry::MultiLineString(MultiLineString(lines));
    }
    if !children.is_empty() && children.iter().all(|g| matches!(g, Geometry::Polygon(_))) {
        let polygons = children
            .into_iter()
            .filter_map(|g| match g {
                Geometry::Polygon(p) => Some(p),
                _ => None,
            })
            .collect::<Vec<_>>();
        return Geometry::MultiPolygon(MultiPolygon(polygons));
    }
    Geometry::GeometryCollection(GeometryCollection(children))
}

/// 解析 `lon,lat[,alt]` 坐标序列（高程丢弃）
pub fn parse_coordinates(text: &str) -> ImportResult<Vec<Coord<f64>>> {
    text.split_whitespace()
        .map(|tuple| {
            let parts: Vec<&str> = tuple.split(',').collect();
            if parts.len() < 2 || parts.len() > 3 {
                return Err(ImportError::InvalidCoordinates(tuple.to_string()));
            }
            let x = parts[0]
                .trim()
                .parse::<f64>()
                .map_err(|_| ImportError::InvalidCoordinates(tuple.to_string()))?;
            let y = parts[1]
                .trim()
                .parse::<f64>()
                .map_err(|_| ImportError::InvalidCoordinates(tuple.to_string()))?;
            Ok(Coord { x, y })
        })
        .collect()
}

fn attr(e: &BytesStart<'_>, key: &str) -> ImportResult<Option<String>> {
    for attribute in e.attributes() {
        let attribute = attribute.map_err(|err| ImportError::KmlParseError(err.to_string()))?;
        if attribute.key.local_name().as_ref() == key.as_bytes() {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

// ==========================================
// KmlParser
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct KmlParser;

impl KmlParser {
    pub fn new() -> Self {
        Self
    }

    /// 解析 KML 文本
    pub fn parse_str(&self, xml: &str) -> ImportResult<Vec<GeometryRecord>> {
        self.parse_reader(xml.as_bytes())
    }

    fn parse_reader<R: BufRead>(&self, source: R) -> ImportResult<Vec<GeometryRecord>> {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);

        let mut state = ParseState::default();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => state.handle_start(&e)?,
                Event::Empty(e) => {
                    state.handle_start(&e)?;
                    state.handle_end()?;
                }
                Event::End(_) => state.handle_end()?,
                Event::Text(e) => state.text.push_str(&e.unescape()?),
                Event::CData(e) => state.text.push_str(&String::from_utf8_lossy(&e.into_inner())),
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !state.root_seen {
            return Err(ImportError::KmlParseError("文档为空或缺少根元素".to_string()));
        }
        if !state.path.is_empty() {
            return Err(ImportError::KmlParseError(format!(
                "文档意外结束，未闭合元素: <{}>",
                state.path.join("/")
            )));
        }

        Ok(state.into_records())
    }
}

impl GeometrySource for KmlParser {
    fn read_records(&self, file_path: &Path) -> ImportResult<Vec<GeometryRecord>> {
        if !file_path.is_file() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        let file = File::open(file_path)?;
        let records = self.parse_reader(BufReader::new(file))?;

        debug!(file = %file_path.display(), records = records.len(), "KML 解析完成");
        Ok(records)
    }
}
