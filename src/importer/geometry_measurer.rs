// ==========================================
// KML 批量导入 - 几何量算
// ==========================================
// 职责: 面积（公顷）、周长/长度（公里）
// 说明: 直接在坐标原值上做平面量算，不做投影变换
// ==========================================

use crate::importer::kml_importer_trait::GeometryMeasurer as GeometryMeasurerTrait;
use geo::{Area, EuclideanLength, Geometry, Polygon};

const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;
const METERS_PER_KILOMETER: f64 = 1_000.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct GeometryMeasurer;

impl GeometryMeasurer {
    pub fn new() -> Self {
        Self
    }
}

/// 多边形边界长度（外环 + 内环）
fn boundary_length(polygon: &Polygon<f64>) -> f64 {
    polygon.exterior().euclidean_length()
        + polygon
            .interiors()
            .iter()
            .map(|ring| ring.euclidean_length())
            .sum::<f64>()
}

impl GeometryMeasurerTrait for GeometryMeasurer {
    /// 几何量算
    ///
    /// # 规则
    /// - Polygon / MultiPolygon: 面积/10000，边界长度/1000
    /// - LineString: 面积 0，长度/1000
    /// - 其他: 均为 0
    fn measure(&self, geometry: &Geometry<f64>) -> (f64, f64) {
        match geometry {
            Geometry::Polygon(polygon) => (
                polygon.unsigned_area() / SQUARE_METERS_PER_HECTARE,
                boundary_length(polygon) / METERS_PER_KILOMETER,
            ),
            Geometry::MultiPolygon(multi) => (
                multi.unsigned_area() / SQUARE_METERS_PER_HECTARE,
                multi.0.iter().map(boundary_length).sum::<f64>() / METERS_PER_KILOMETER,
            ),
            Geometry::LineString(line) => (0.0, line.euclidean_length() / METERS_PER_KILOMETER),
            _ => (0.0, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon, MultiPoint, MultiPolygon};

    const EPS: f64 = 1e-12;

    fn unit_square() -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]
    }

    #[test]
    fn test_unit_square() {
        let measurer = GeometryMeasurer::new();
        let (area, perimeter) = measurer.measure(&Geometry::Polygon(unit_square()));

        assert!((area - 1.0 / 10_000.0).abs() < EPS);
        assert!((perimeter - 4.0 / 1_000.0).abs() < EPS);
    }

    #[test]
    fn test_polygon_with_hole() {
        let measurer = GeometryMeasurer::new();
        let shape = polygon!(
            exterior: [
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
                (x: 0.0, y: 0.0),
            ],
            interiors: [
                [
                    (x: 2.0, y: 2.0),
                    (x: 4.0, y: 2.0),
                    (x: 4.0, y: 4.0),
                    (x: 2.0, y: 4.0),
                    (x: 2.0, y: 2.0),
                ],
            ],
        );
        let (area, perimeter) = measurer.measure(&Geometry::Polygon(shape));

        assert!((area - 96.0 / 10_000.0).abs() < EPS);
        assert!((perimeter - 48.0 / 1_000.0).abs() < EPS);
    }

    #[test]
    fn test_multi_polygon() {
        let measurer = GeometryMeasurer::new();
        let multi = MultiPolygon(vec![unit_square(), unit_square()]);
        let (area, perimeter) = measurer.measure(&Geometry::MultiPolygon(multi));

        assert!((area - 2.0 / 10_000.0).abs() < EPS);
        assert!((perimeter - 8.0 / 1_000.0).abs() < EPS);
    }

    #[test]
    fn test_line_string() {
        let measurer = GeometryMeasurer::new();
        let line = line_string![(x: 0.0, y: 0.0), (x: 3.0, y: 4.0), (x: 3.0, y: 10.0)];
        let (area, length) = measurer.measure(&Geometry::LineString(line));

        assert_eq!(area, 0.0);
        assert!((length - 11.0 / 1_000.0).abs() < EPS);
    }

    #[test]
    fn test_points_measure_zero() {
        let measurer = GeometryMeasurer::new();
        assert_eq!(
            measurer.measure(&Geometry::Point(point!(x: -47.9, y: -15.8))),
            (0.0, 0.0)
        );

        let multi = MultiPoint::from(vec![(0.0, 0.0), (5.0, 5.0)]);
        assert_eq!(measurer.measure(&Geometry::MultiPoint(multi)), (0.0, 0.0));
    }
}
