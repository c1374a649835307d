//! Builds STAC items for Sentinel-2 scenes and attaches their image assets
use crate::bands::{self, EoBand};
use crate::catalog::{
    BASELINE, DATA_COVER, EO_BANDS, EO_CLOUD_COVER, EO_EXTENSION, GSD, JP2_MEDIA_TYPE, ORBIT,
    PROJECTION_EXTENSION, PROJ_EPSG, PROJ_SHAPE, PROJ_TRANSFORM,
};
use crate::error::RecordError;
use crate::geometry::{self, bbox_polygon, to_bbox};
use crate::inventory::product_name;
use crate::metadata::{SceneMetadata, TileMetadata};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use stac::{Asset, Item};
use url::Url;

const PLATFORM: &str = "sentinel-2";
const INSTRUMENT: &str = "msi";
const CONSTELLATION: &str = "sentinel-2";
const MISSION: &str = "copernicus";
const ITEM_GSD: u32 = 10;

pub const THUMBNAIL_KEY: &str = "thumbnail";
const ALTERNATE_SUFFIX: &str = "geo.jp2";
const SAFE_SUFFIX: &str = ".SAFE";

/// Scene id of an image URL: the name of the `<product>.SAFE` folder in its path. Without such a
/// folder the path is read as `/<bucket>/[<year>/]<product>/...`. Both layouts give the same id
/// for the same product.
pub fn scene_id_from_url(url: &str) -> Result<String, RecordError> {
    let invalid = || RecordError::InvalidSceneUrl(url.to_string());

    let parsed = Url::parse(url).map_err(|_| invalid())?;
    let segments = parsed
        .path_segments()
        .map(|segments| segments.collect::<Vec<_>>())
        .ok_or_else(invalid)?;

    if let Some(safe) = segments.iter().find(|segment| segment.ends_with(SAFE_SUFFIX)) {
        return Ok(product_name(safe).to_string());
    }

    let index = match segments.get(1) {
        Some(segment) if is_year(segment) => 2,
        _ => 1,
    };

    segments
        .get(index)
        .filter(|segment| !segment.is_empty())
        .map(|segment| product_name(segment).to_string())
        .ok_or_else(invalid)
}

fn is_year(segment: &str) -> bool {
    segment.len() == 4 && segment.chars().all(|c| c.is_ascii_digit())
}

/// The capture date embedded in a product name, e.g. `S2A_MSIL2A_20210615T094041_...`
pub fn capture_datetime(product: &str) -> Result<DateTime<Utc>, RecordError> {
    let invalid = || RecordError::InvalidCaptureDate(product.to_string());

    let date = product
        .split('_')
        .nth(2)
        .and_then(|token| token.get(0..8))
        .ok_or_else(invalid)?;
    let date = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| invalid())?;
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;

    Ok(Utc.from_utc_datetime(&midnight))
}

pub fn build_item(
    url: &str,
    scene: &SceneMetadata,
    tile: &TileMetadata,
    collection_id: &str,
) -> Result<Item> {
    let id = scene_id_from_url(url)?;
    let datetime = capture_datetime(&id)?;
    let bounds = geometry::to_wgs84(tile.native_bounds()?, tile.epsg)?;
    let transform = tile.transform()?;

    let mut item = Item::new(id).collection(collection_id);
    item.extensions = vec![EO_EXTENSION.to_string(), PROJECTION_EXTENSION.to_string()];
    item.geometry = Some(bbox_polygon(&bounds));
    item.bbox = Some(to_bbox(bounds));

    let properties = &mut item.properties;
    properties.datetime = Some(datetime);
    properties.start_datetime = Some(scene.start_time);
    properties.end_datetime = Some(scene.stop_time);

    let fields = &mut properties.additional_fields;
    fields.insert(EO_CLOUD_COVER.to_string(), json!(scene.cloud_cover));
    fields.insert(DATA_COVER.to_string(), json!(scene.data_cover));
    fields.insert(ORBIT.to_string(), json!(scene.orbit));
    fields.insert(BASELINE.to_string(), json!(scene.baseline));
    fields.insert("platform".to_string(), json!(PLATFORM));
    fields.insert("instrument".to_string(), json!(INSTRUMENT));
    fields.insert("constellation".to_string(), json!(CONSTELLATION));
    fields.insert("mission".to_string(), json!(MISSION));
    fields.insert(PROJ_EPSG.to_string(), json!(tile.epsg));
    fields.insert(PROJ_TRANSFORM.to_string(), json!(transform));
    fields.insert(GSD.to_string(), json!(ITEM_GSD));
    fields.insert(EO_BANDS.to_string(), json!(bands::all_eo_bands()));

    Ok(item)
}

/// Band and resolution of an image file
#[derive(Debug, PartialEq)]
pub struct AssetName {
    pub band: String,
    /// Resolution label as used by the tile metadata, e.g. "10"
    pub resolution: String,
    pub gsd: u32,
}

impl AssetName {
    /// `T35VLG_20210615T094041_B02_10m.jp2` names band B02 at 10m. Files ending in `geo.jp2`
    /// carry one more token after the resolution.
    pub fn parse(url: &str) -> Result<Self, RecordError> {
        let invalid = || RecordError::InvalidAssetName(url.to_string());

        let file_name = url.rsplit('/').next().unwrap_or(url);
        let stem = file_name.split('.').next().unwrap_or(file_name);
        let tokens = stem.split('_').collect::<Vec<_>>();

        let skip = if file_name.ends_with(ALTERNATE_SUFFIX) { 1 } else { 0 };
        if tokens.len() < 2 + skip {
            return Err(invalid());
        }
        let band = tokens[tokens.len() - 2 - skip];
        let resolution = tokens[tokens.len() - 1 - skip]
            .split('m')
            .next()
            .unwrap_or_default();
        let gsd = resolution.parse::<u32>().map_err(|_| invalid())?;

        Ok(Self {
            band: band.to_string(),
            resolution: resolution.to_string(),
            gsd,
        })
    }

    pub fn key(self: &Self) -> String {
        format!("{}_{}m", self.band, self.resolution)
    }
}

fn image_asset(url: &str, title: &str, role: &str, shape: (u32, u32)) -> Asset {
    let mut asset = Asset::new(url).role(role);
    asset.title = Some(title.to_string());
    asset.r#type = Some(JP2_MEDIA_TYPE.to_string());
    asset
        .additional_fields
        .insert(PROJ_SHAPE.to_string(), json!([shape.0, shape.1]));
    asset
}

pub fn add_band_asset(item: &mut Item, url: &str, tile: &TileMetadata) -> Result<()> {
    let name = AssetName::parse(url)?;
    let shape = tile.shape(&name.resolution)?;
    let key = name.key();

    let mut asset = image_asset(url, &key, "data", shape);
    asset.additional_fields.insert(GSD.to_string(), json!(name.gsd));
    if let Some(band) = bands::lookup(&name.band) {
        asset
            .additional_fields
            .insert(EO_BANDS.to_string(), json!([EoBand::from(band)]));
    }

    item.assets.insert(key, asset);
    Ok(())
}

pub fn add_thumbnail_asset(item: &mut Item, url: &str, shape: (u32, u32)) {
    let asset = image_asset(url, "Thumbnail image", "thumbnail", shape);
    item.assets.insert(THUMBNAIL_KEY.to_string(), asset);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{cloud_cover, epsg, shape};
    use crate::geometry::{from_bbox, geometry_bounds};
    use crate::metadata::tests::{scene_xml, TILE_XML};

    const PRODUCT: &str = "S2A_MSIL2A_20210615T094041_N0300_R036_T35VLG_20210615T120350";

    fn image_url(band: &str) -> String {
        format!(
            "https://a3s.fi/Sentinel2-bucket/{PRODUCT}.SAFE/GRANULE/\
             L2A_T35VLG_A031179_20210615T094041/IMG_DATA/R10m/T35VLG_20210615T094041_{band}.jp2"
        )
    }

    #[test]
    fn test_scene_id_in_both_layouts() {
        let flat = format!("https://a3s.fi/Sentinel2-bucket/{PRODUCT}.SAFE/GRANULE/x.jp2");
        let yearly = format!("https://a3s.fi/Sentinel2-bucket/2021/{PRODUCT}.SAFE/GRANULE/x.jp2");
        assert_eq!(scene_id_from_url(&flat).unwrap(), PRODUCT);
        assert_eq!(scene_id_from_url(&yearly).unwrap(), PRODUCT);
    }

    #[test]
    fn test_scene_id_below_prefixed_base() {
        let url =
            format!("https://objects.example.org/s3/Sentinel2-x/{PRODUCT}.SAFE/GRANULE/x.jp2");
        assert_eq!(scene_id_from_url(&url).unwrap(), PRODUCT);
    }

    #[test]
    fn test_scene_id_without_safe_folder() {
        let url = format!("https://a3s.fi/Sentinel2-bucket/2021/{PRODUCT}/x.jp2");
        assert_eq!(scene_id_from_url(&url).unwrap(), PRODUCT);
    }

    #[test]
    fn test_scene_id_invalid() {
        assert!(scene_id_from_url("https://a3s.fi/Sentinel2-bucket").is_err());
        assert!(scene_id_from_url("not a url").is_err());
    }

    #[test]
    fn test_capture_datetime() {
        let datetime = capture_datetime(PRODUCT).unwrap();
        assert_eq!(datetime.to_rfc3339(), "2021-06-15T00:00:00+00:00");
        assert_eq!(
            capture_datetime("S2A_MSIL2A"),
            Err(RecordError::InvalidCaptureDate("S2A_MSIL2A".to_string()))
        );
    }

    #[test]
    fn test_asset_name() {
        let name = AssetName::parse(&image_url("B02_10m")).unwrap();
        assert_eq!(
            name,
            AssetName {
                band: "B02".to_string(),
                resolution: "10".to_string(),
                gsd: 10
            }
        );
        assert_eq!(name.key(), "B02_10m");
    }

    #[test]
    fn test_alternate_asset_name() {
        let name = AssetName::parse(&image_url("B8A_20m_geo")).unwrap();
        assert_eq!(name.band, "B8A");
        assert_eq!(name.resolution, "20");
        assert_eq!(name.key(), "B8A_20m");
    }

    #[test]
    fn test_build_item() {
        let scene = SceneMetadata::parse(&scene_xml("12.7", "5.2")).unwrap();
        let tile = TileMetadata::parse(TILE_XML).unwrap();
        let item = build_item(&image_url("B02_10m"), &scene, &tile, "sentinel2-l2a").unwrap();

        assert_eq!(item.id, PRODUCT);
        assert_eq!(item.collection.as_deref(), Some("sentinel2-l2a"));
        assert_eq!(cloud_cover(&item), Some(12));
        assert_eq!(epsg(&item), Some(32635));

        let fields = &item.properties.additional_fields;
        assert_eq!(fields["platform"], "sentinel-2");
        assert_eq!(fields[EO_BANDS].as_array().unwrap().len(), 13);
        assert_eq!(
            item.properties.datetime.unwrap().to_rfc3339(),
            "2021-06-15T00:00:00+00:00"
        );

        let bounds = from_bbox(&item.bbox.unwrap());
        assert!(bounds[0] > 23.0 && bounds[2] < 27.0);
        assert_eq!(geometry_bounds(item.geometry.as_ref().unwrap()), Some(bounds));
    }

    #[test]
    fn test_percentages_serialize_as_integers() {
        let scene = SceneMetadata::parse(&scene_xml("12.7", "5.2")).unwrap();
        let tile = TileMetadata::parse(TILE_XML).unwrap();
        let item = build_item(&image_url("B02_10m"), &scene, &tile, "sentinel2-l2a").unwrap();

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["properties"][EO_CLOUD_COVER].to_string(), "12");
        assert_eq!(value["properties"][DATA_COVER].to_string(), "94");
        assert_eq!(value["properties"][ORBIT].to_string(), "36");
    }

    #[test]
    fn test_add_assets() {
        let scene = SceneMetadata::parse(&scene_xml("12.7", "5.2")).unwrap();
        let tile = TileMetadata::parse(TILE_XML).unwrap();
        let mut item = build_item(&image_url("B02_10m"), &scene, &tile, "sentinel2-l2a").unwrap();

        add_band_asset(&mut item, &image_url("B02_10m"), &tile).unwrap();
        add_band_asset(&mut item, &image_url("TCI_60m"), &tile).unwrap();
        add_thumbnail_asset(&mut item, &image_url("PVI"), (343, 343));

        let blue = &item.assets["B02_10m"];
        assert_eq!(shape(blue), Some([10980, 10980]));
        assert_eq!(blue.additional_fields[GSD], 10);
        assert_eq!(blue.roles, vec!["data"]);
        assert_eq!(blue.r#type.as_deref(), Some(JP2_MEDIA_TYPE));
        assert_eq!(blue.additional_fields[EO_BANDS][0]["common_name"], "blue");

        let true_color = &item.assets["TCI_60m"];
        assert_eq!(shape(true_color), Some([1830, 1830]));
        assert!(true_color.additional_fields.get(EO_BANDS).is_none());

        let thumbnail = &item.assets[THUMBNAIL_KEY];
        assert_eq!(thumbnail.roles, vec!["thumbnail"]);
        assert_eq!(thumbnail.title.as_deref(), Some("Thumbnail image"));
        assert_eq!(shape(thumbnail), Some([343, 343]));
    }

    #[test]
    fn test_missing_resolution() {
        let scene = SceneMetadata::parse(&scene_xml("12.7", "5.2")).unwrap();
        let tile = TileMetadata::parse(TILE_XML).unwrap();
        let mut item = build_item(&image_url("B02_10m"), &scene, &tile, "sentinel2-l2a").unwrap();
        assert!(add_band_asset(&mut item, &image_url("B02_30m"), &tile).is_err());
    }
}
