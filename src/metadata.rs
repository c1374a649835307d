//! Scene-level (`MTD_MSIL2A.xml`) and tile-level (`MTD_TL.xml`) metadata documents
use crate::error::MetadataError;
use crate::inventory::SceneFiles;
use crate::s3::S3ObjOps;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct SceneMetadata {
    pub cloud_cover: u8,
    pub data_cover: u8,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub orbit: u32,
    pub baseline: String,
}

impl SceneMetadata {
    pub fn parse(content: &str) -> Result<Self> {
        let doc = Document::parse(content)?;
        let root = doc.root_element();

        let cloud_cover = parse_value::<f64>(root, "Cloud_Coverage_Assessment")?;
        let nodata = parse_value::<f64>(root, "NODATA_PIXEL_PERCENTAGE")?;

        Ok(Self {
            cloud_cover: cloud_cover.trunc() as u8,
            data_cover: (100.0 - nodata).trunc() as u8,
            start_time: parse_time(root, "PRODUCT_START_TIME")?,
            stop_time: parse_time(root, "PRODUCT_STOP_TIME")?,
            orbit: parse_value(root, "SENSING_ORBIT_NUMBER")?,
            baseline: first_text(root, "PROCESSING_BASELINE")?.to_string(),
        })
    }
}

/// Upper-left corner and pixel size of the grid at one resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geoposition {
    pub ulx: f64,
    pub uly: f64,
    pub xdim: f64,
    pub ydim: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileMetadata {
    pub epsg: u32,
    /// Resolution label (e.g. "10") to (rows, columns)
    pub shapes: BTreeMap<String, (u32, u32)>,
    pub geopositions: BTreeMap<String, Geoposition>,
}

impl TileMetadata {
    pub fn parse(content: &str) -> Result<Self> {
        let doc = Document::parse(content)?;
        let root = doc.root_element();

        let cs_code = first_text(root, "HORIZONTAL_CS_CODE")?;
        let epsg = epsg_from_urn(cs_code)?;

        let mut shapes = BTreeMap::new();
        for size in root.descendants().filter(|n| n.has_tag_name("Size")) {
            let resolution = resolution_of(size)?;
            let rows = parse_value(size, "NROWS")?;
            let cols = parse_value(size, "NCOLS")?;
            shapes.insert(resolution, (rows, cols));
        }

        let mut geopositions = BTreeMap::new();
        for position in root.descendants().filter(|n| n.has_tag_name("Geoposition")) {
            let resolution = resolution_of(position)?;
            let geoposition = Geoposition {
                ulx: parse_value(position, "ULX")?,
                uly: parse_value(position, "ULY")?,
                xdim: parse_value(position, "XDIM")?,
                ydim: parse_value(position, "YDIM")?,
            };
            geopositions.insert(resolution, geoposition);
        }

        Ok(Self {
            epsg,
            shapes,
            geopositions,
        })
    }

    pub fn shape(self: &Self, resolution: &str) -> Result<(u32, u32), MetadataError> {
        self.shapes
            .get(resolution)
            .copied()
            .ok_or_else(|| MetadataError::MissingResolution(resolution.to_string()))
    }

    /// The finest resolution described by both a `Size` and a `Geoposition` element.
    fn finest_grid(self: &Self) -> Result<((u32, u32), Geoposition), MetadataError> {
        self.geopositions
            .iter()
            .filter_map(|(resolution, position)| {
                let shape = self.shapes.get(resolution)?;
                let meters = resolution.parse::<f64>().ok()?;
                Some((meters, *shape, *position))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, shape, position)| (shape, position))
            .ok_or_else(|| MetadataError::MissingTag("Geoposition".to_string()))
    }

    /// `[minx, miny, maxx, maxy]` of the tile in its own coordinate system
    pub fn native_bounds(self: &Self) -> Result<[f64; 4], MetadataError> {
        let ((rows, cols), position) = self.finest_grid()?;
        let x_end = position.ulx + cols as f64 * position.xdim;
        let y_end = position.uly + rows as f64 * position.ydim;
        Ok([
            position.ulx.min(x_end),
            position.uly.min(y_end),
            position.ulx.max(x_end),
            position.uly.max(y_end),
        ])
    }

    /// Affine transform of the finest grid, in `proj:transform` order
    pub fn transform(self: &Self) -> Result<[f64; 6], MetadataError> {
        let (_, position) = self.finest_grid()?;
        Ok([
            position.xdim,
            0.0,
            position.ulx,
            0.0,
            position.ydim,
            position.uly,
        ])
    }
}

/// Downloads and parses both metadata documents of a scene.
pub async fn fetch_metadata(
    store: &impl S3ObjOps,
    bucket: &str,
    files: &SceneFiles<'_>,
) -> Result<(SceneMetadata, TileMetadata)> {
    let tile_content = fetch_document(store, bucket, files.tile_metadata).await?;
    let tile = TileMetadata::parse(&tile_content)
        .with_context(|| format!("Unable to parse {}", files.tile_metadata))?;

    let scene_content = fetch_document(store, bucket, files.scene_metadata).await?;
    let scene = SceneMetadata::parse(&scene_content)
        .with_context(|| format!("Unable to parse {}", files.scene_metadata))?;

    Ok((scene, tile))
}

async fn fetch_document(store: &impl S3ObjOps, bucket: &str, key: &str) -> Result<String> {
    let data = store.get_object(bucket, key).await?;
    let content = String::from_utf8(data)?;
    Ok(content)
}

fn first_text<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Result<&'a str, MetadataError> {
    node.descendants()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(str::trim)
        .ok_or_else(|| MetadataError::MissingTag(tag.to_string()))
}

fn parse_value<T: FromStr>(node: Node, tag: &str) -> Result<T, MetadataError> {
    let text = first_text(node, tag)?;
    text.parse().map_err(|_| MetadataError::InvalidValue {
        tag: tag.to_string(),
        value: text.to_string(),
    })
}

fn parse_time(node: Node, tag: &str) -> Result<DateTime<Utc>, MetadataError> {
    let text = first_text(node, tag)?;
    DateTime::parse_from_rfc3339(text)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|_| MetadataError::InvalidValue {
            tag: tag.to_string(),
            value: text.to_string(),
        })
}

fn resolution_of(node: Node) -> Result<String, MetadataError> {
    node.attribute("resolution")
        .map(String::from)
        .ok_or_else(|| MetadataError::MissingTag(format!("{}@resolution", node.tag_name().name())))
}

/// "EPSG:32635" -> 32635
fn epsg_from_urn(urn: &str) -> Result<u32, MetadataError> {
    let code = urn.rsplit(':').next().unwrap_or(urn);
    code.parse().map_err(|_| MetadataError::InvalidValue {
        tag: "HORIZONTAL_CS_CODE".to_string(),
        value: urn.to_string(),
    })
}
