//! Bounding box reprojection and GeoJSON geometries
use crate::error::GeometryError;
use geojson::{Geometry, Value};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

pub const WGS84: u32 = 4326;

/// Points sampled along each edge of a bounding box before it is transformed
const DENSIFY_POINTS: usize = 21;

/// `[minx, miny, maxx, maxy]`
pub type Bounds = [f64; 4];

pub struct Crs {
    epsg: u32,
    proj: Proj,
}

impl Crs {
    pub fn from_epsg(epsg: u32) -> Result<Self, GeometryError> {
        let definition = proj_definition(epsg).ok_or(GeometryError::UnsupportedEpsg(epsg))?;
        let proj = Proj::from_proj_string(&definition)
            .map_err(|e| GeometryError::Projection(format!("EPSG:{epsg}: {e:?}")))?;
        Ok(Self { epsg, proj })
    }

    fn is_geographic(self: &Self) -> bool {
        self.epsg == WGS84
    }
}

/// proj4 definitions of the coordinate systems Sentinel-2 tiles are delivered in.
fn proj_definition(epsg: u32) -> Option<String> {
    match epsg {
        WGS84 => Some("+proj=longlat +datum=WGS84 +no_defs".to_string()),
        32601..=32660 => Some(format!(
            "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
            epsg - 32600
        )),
        32701..=32760 => Some(format!(
            "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
            epsg - 32700
        )),
        // ETRS89 / UTM zones 28N - 38N
        25828..=25838 => Some(format!(
            "+proj=utm +zone={} +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
            epsg - 25800
        )),
        // ETRS89 / TM35FIN(E,N)
        3067 => Some(
            "+proj=utm +zone=35 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs".to_string(),
        ),
        _ => None,
    }
}

pub fn reproject_point(
    point: (f64, f64),
    src: &Crs,
    dst: &Crs,
) -> Result<(f64, f64), GeometryError> {
    // proj4rs works in radians for geographic systems
    let (x, y) = if src.is_geographic() {
        (point.0.to_radians(), point.1.to_radians())
    } else {
        point
    };

    let mut coords = (x, y, 0.0);
    transform(&src.proj, &dst.proj, &mut coords).map_err(|e| {
        GeometryError::Projection(format!(
            "({}, {}) from EPSG:{} to EPSG:{}: {e:?}",
            point.0, point.1, src.epsg, dst.epsg
        ))
    })?;

    let (x, y) = if dst.is_geographic() {
        (coords.0.to_degrees(), coords.1.to_degrees())
    } else {
        (coords.0, coords.1)
    };

    if !x.is_finite() || !y.is_finite() {
        return Err(GeometryError::Projection(format!(
            "({}, {}) has no finite image in EPSG:{}",
            point.0, point.1, dst.epsg
        )));
    }
    Ok((x, y))
}

/// Transforms a bounding box between coordinate systems. The edges are densified so the output
/// covers the curved outline of the box, not just its corners.
pub fn reproject_bounds(
    bounds: Bounds,
    from_epsg: u32,
    to_epsg: u32,
) -> Result<Bounds, GeometryError> {
    let [minx, miny, maxx, maxy] = bounds;
    if !(minx < maxx && miny < maxy) {
        return Err(GeometryError::DegenerateBounds(bounds));
    }

    let src = Crs::from_epsg(from_epsg)?;
    let dst = Crs::from_epsg(to_epsg)?;

    let mut output = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for point in densify(bounds) {
        let (x, y) = reproject_point(point, &src, &dst)?;
        output = [
            output[0].min(x),
            output[1].min(y),
            output[2].max(x),
            output[3].max(y),
        ];
    }
    Ok(output)
}

pub fn to_wgs84(bounds: Bounds, epsg: u32) -> Result<Bounds, GeometryError> {
    reproject_bounds(bounds, epsg, WGS84)
}

fn densify(bounds: Bounds) -> Vec<(f64, f64)> {
    let [minx, miny, maxx, maxy] = bounds;
    let steps = (DENSIFY_POINTS - 1) as f64;

    (0..DENSIFY_POINTS)
        .flat_map(|i| {
            let t = i as f64 / steps;
            let x = minx + t * (maxx - minx);
            let y = miny + t * (maxy - miny);
            [(x, miny), (x, maxy), (minx, y), (maxx, y)]
        })
        .collect()
}

/// Rectangular polygon over a bounding box. The ring runs
/// `(maxx, miny) (maxx, maxy) (minx, maxy) (minx, miny)` and closes on its first point.
pub fn bbox_polygon(bounds: &Bounds) -> Geometry {
    let [minx, miny, maxx, maxy] = *bounds;
    Geometry::new(Value::Polygon(vec![vec![
        vec![maxx, miny],
        vec![maxx, maxy],
        vec![minx, maxy],
        vec![minx, miny],
        vec![maxx, miny],
    ]]))
}

/// Bounds over every position of the geometry, whatever its nesting depth.
pub fn geometry_bounds(geometry: &Geometry) -> Option<Bounds> {
    let mut positions = vec![];
    collect_positions(&geometry.value, &mut positions);
    union_bounds(positions.into_iter().map(|(x, y)| [x, y, x, y]))
}

fn collect_positions(value: &Value, positions: &mut Vec<(f64, f64)>) {
    let found: Vec<&Vec<f64>> = match value {
        Value::Point(point) => vec![point],
        Value::MultiPoint(points) | Value::LineString(points) => points.iter().collect(),
        Value::MultiLineString(lines) | Value::Polygon(lines) => lines.iter().flatten().collect(),
        Value::MultiPolygon(polygons) => polygons.iter().flatten().flatten().collect(),
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_positions(&geometry.value, positions);
            }
            return;
        }
    };
    positions.extend(found.into_iter().filter_map(|position| match position.as_slice() {
        [x, y, ..] => Some((*x, *y)),
        _ => None,
    }));
}

pub fn to_bbox(bounds: Bounds) -> stac::Bbox {
    let [minx, miny, maxx, maxy] = bounds;
    stac::Bbox::new(minx, miny, maxx, maxy)
}

/// Horizontal bounds of a 2D or 3D bbox
pub fn from_bbox(bbox: &stac::Bbox) -> Bounds {
    [bbox.xmin(), bbox.ymin(), bbox.xmax(), bbox.ymax()]
}

pub fn union_bounds(boxes: impl IntoIterator<Item = Bounds>) -> Option<Bounds> {
    boxes.into_iter().reduce(|a, b| {
        [
            a[0].min(b[0]),
            a[1].min(b[1]),
            a[2].max(b[2]),
            a[3].max(b[3]),
        ]
    })
}
