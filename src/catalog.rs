//! Extension fields carried on the `stac` records and the parts of an item the collection
//! extent is computed from
use crate::geometry::{from_bbox, geometry_bounds, Bounds};
use chrono::{DateTime, Utc};
use stac::{Asset, Item};

pub const EO_EXTENSION: &str = "https://stac-extensions.github.io/eo/v1.0.0/schema.json";
pub const PROJECTION_EXTENSION: &str =
    "https://stac-extensions.github.io/projection/v1.0.0/schema.json";
pub const JP2_MEDIA_TYPE: &str = "image/jp2";

pub const EO_BANDS: &str = "eo:bands";
pub const EO_CLOUD_COVER: &str = "eo:cloud_cover";
pub const PROJ_EPSG: &str = "proj:epsg";
pub const PROJ_TRANSFORM: &str = "proj:transform";
pub const PROJ_SHAPE: &str = "proj:shape";
pub const DATA_COVER: &str = "data_cover";
pub const ORBIT: &str = "orbit";
pub const BASELINE: &str = "baseline";
pub const GSD: &str = "gsd";

pub fn cloud_cover(item: &Item) -> Option<i64> {
    item.properties
        .additional_fields
        .get(EO_CLOUD_COVER)?
        .as_f64()
        .map(|cover| cover.trunc() as i64)
}

pub fn epsg(item: &Item) -> Option<u32> {
    let epsg = item.properties.additional_fields.get(PROJ_EPSG)?.as_u64()?;
    u32::try_from(epsg).ok()
}

/// `[rows, columns]` of an image asset
pub fn shape(asset: &Asset) -> Option<[u64; 2]> {
    let shape = asset.additional_fields.get(PROJ_SHAPE)?.as_array()?;
    match shape.as_slice() {
        [rows, cols] => Some([rows.as_u64()?, cols.as_u64()?]),
        _ => None,
    }
}

/// The parts of an item that feed the collection extent
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    pub id: String,
    pub bbox: Option<Bounds>,
    pub datetime: Option<DateTime<Utc>>,
}

impl From<&Item> for Footprint {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            bbox: item
                .bbox
                .as_ref()
                .map(from_bbox)
                .or_else(|| item.geometry.as_ref().and_then(geometry_bounds)),
            datetime: item.properties.datetime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extension_fields() {
        let mut item = Item::new("S2A_MSIL2A_20210615T094041_N0300_R036_T35VLG_20210615T120350");
        let fields = &mut item.properties.additional_fields;
        fields.insert(EO_CLOUD_COVER.to_string(), json!(12));
        fields.insert(PROJ_EPSG.to_string(), json!(32635));
        assert_eq!(cloud_cover(&item), Some(12));
        assert_eq!(epsg(&item), Some(32635));

        // Records from other writers may carry fractional covers
        item.properties
            .additional_fields
            .insert(EO_CLOUD_COVER.to_string(), json!(12.7));
        assert_eq!(cloud_cover(&item), Some(12));

        let mut asset = Asset::new("https://a3s.fi/bucket/preview.jp2");
        assert_eq!(shape(&asset), None);
        asset.additional_fields.insert(PROJ_SHAPE.to_string(), json!([343, 343]));
        assert_eq!(shape(&asset), Some([343, 343]));
    }

    #[test]
    fn test_remote_item_footprint() {
        let item: Item = serde_json::from_value(json!({
            "type": "Feature",
            "stac_version": "1.0.0",
            "id": "S2B_MSIL2A_20210620T094029_N0300_R036_T35VLH_20210620T113528",
            "geometry": null,
            "bbox": [24.0, 60.0, 0.0, 26.0, 61.0, 0.0],
            "properties": {"datetime": "2021-06-20T00:00:00Z", "orbit": "36"},
            "links": [],
            "assets": {}
        }))
        .unwrap();
        let footprint = Footprint::from(&item);
        assert_eq!(footprint.bbox, Some([24.0, 60.0, 26.0, 61.0]));
        assert_eq!(
            footprint.datetime.unwrap().to_rfc3339(),
            "2021-06-20T00:00:00+00:00"
        );
    }

    #[test]
    fn test_remote_item_footprint_from_geometry() {
        let item: Item = serde_json::from_value(json!({
            "type": "Feature",
            "stac_version": "1.0.0",
            "id": "scene",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [26.0, 60.0], [26.0, 61.0], [24.0, 61.0], [24.0, 60.0], [26.0, 60.0]
                ]]
            },
            "properties": {"datetime": null},
            "links": [],
            "assets": {}
        }))
        .unwrap();
        assert_eq!(Footprint::from(&item).bbox, Some([24.0, 60.0, 26.0, 61.0]));
    }
}
