//! Translation of STAC records into the feature layout of the GeoServer OpenSearch-EO REST API
use crate::catalog::{cloud_cover, epsg};
use crate::error::RecordError;
use crate::geometry::{bbox_polygon, from_bbox};
use anyhow::Result;
use chrono::{DateTime, Utc};
use geojson::Geometry;
use serde::Serialize;
use serde_json::{Map, Value};
use stac::{Asset, Collection, Item, Link, Links, Provider};
use std::collections::{BTreeMap, HashMap};

const QUERYABLES: [&str; 2] = ["eo:identifier", "eo:cloud_cover"];

#[derive(Debug, Clone, PartialEq)]
pub enum StacRecord {
    Collection(Collection),
    Item(Item),
}

impl StacRecord {
    /// Dispatches on the `type` member; anything but a collection or a feature is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value.get("type").and_then(Value::as_str) {
            Some("Collection") => Ok(Self::Collection(serde_json::from_value(value)?)),
            Some("Feature") => Ok(Self::Item(serde_json::from_value(value)?)),
            other => {
                let kind = other.unwrap_or("<none>").to_string();
                Err(RecordError::UnsupportedType(kind).into())
            }
        }
    }

    pub fn id(self: &Self) -> &str {
        match self {
            Self::Collection(collection) => &collection.id,
            Self::Item(item) => &item.id,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OseoFeature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Option<Geometry>,
    pub properties: OseoProperties,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum OseoProperties {
    Collection(CollectionProperties),
    Product(ProductProperties),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OseoLink {
    pub href: String,
    pub rel: String,
    #[serde(rename = "type")]
    pub media_type: String,
}

impl OseoLink {
    fn from_link(link: &Link, rel: &str) -> Self {
        Self {
            href: link.href.clone(),
            rel: rel.to_string(),
            media_type: "application/json".to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CollectionProperties {
    pub name: String,
    pub title: Option<String>,
    #[serde(rename = "eo:identifier")]
    pub identifier: String,
    pub description: String,
    #[serde(rename = "timeStart")]
    pub time_start: Option<DateTime<Utc>>,
    #[serde(rename = "timeEnd")]
    pub time_end: Option<DateTime<Utc>>,
    pub primary: bool,
    pub license: String,
    #[serde(rename = "licenseLink", skip_serializing_if = "Option::is_none")]
    pub license_link: Option<OseoLink>,
    #[serde(rename = "derivedFrom", skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<OseoLink>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, Asset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summaries: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<Provider>>,
    pub queryables: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ProductProperties {
    #[serde(rename = "eop:identifier")]
    pub identifier: String,
    #[serde(rename = "eop:parentIdentifier")]
    pub parent_identifier: Option<String>,
    #[serde(rename = "timeStart")]
    pub time_start: Option<DateTime<Utc>>,
    #[serde(rename = "timeEnd")]
    pub time_end: Option<DateTime<Utc>>,
    #[serde(rename = "opt:cloudCover", skip_serializing_if = "Option::is_none")]
    pub cloud_cover: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crs: Option<u32>,
    pub assets: BTreeMap<String, Asset>,
}

fn sorted_assets(assets: &HashMap<String, Asset>) -> BTreeMap<String, Asset> {
    assets
        .iter()
        .map(|(key, asset)| (key.clone(), asset.clone()))
        .collect()
}

pub fn translate(record: &StacRecord) -> Result<OseoFeature> {
    match record {
        StacRecord::Collection(collection) => translate_collection(collection),
        StacRecord::Item(item) => Ok(translate_item(item)),
    }
}

pub fn translate_collection(collection: &Collection) -> Result<OseoFeature> {
    let bbox = collection
        .extent
        .spatial
        .bbox
        .first()
        .ok_or_else(|| RecordError::MissingExtent(collection.id.clone()))?;
    let [time_start, time_end] = collection
        .extent
        .temporal
        .interval
        .first()
        .copied()
        .unwrap_or([None, None]);

    let properties = CollectionProperties {
        name: collection.id.clone(),
        title: collection.title.clone(),
        identifier: collection.id.clone(),
        description: collection.description.clone(),
        time_start,
        time_end,
        primary: true,
        license: collection.license.clone(),
        license_link: collection
            .link("license")
            .map(|link| OseoLink::from_link(link, "license")),
        derived_from: collection
            .link("derived_from")
            .map(|link| OseoLink::from_link(link, "derived_from")),
        assets: sorted_assets(&collection.assets),
        summaries: collection.summaries.clone(),
        providers: collection.providers.clone(),
        queryables: QUERYABLES.iter().map(|q| q.to_string()).collect(),
    };

    Ok(OseoFeature {
        kind: "Feature".to_string(),
        geometry: Some(bbox_polygon(&from_bbox(bbox))),
        properties: OseoProperties::Collection(properties),
    })
}

pub fn translate_item(item: &Item) -> OseoFeature {
    let properties = ProductProperties {
        identifier: item.id.clone(),
        parent_identifier: item.collection.clone(),
        time_start: item.properties.datetime,
        time_end: item.properties.datetime,
        cloud_cover: cloud_cover(item),
        crs: epsg(item),
        assets: sorted_assets(&item.assets),
    };

    OseoFeature {
        kind: "Feature".to_string(),
        geometry: item.geometry.clone(),
        properties: OseoProperties::Product(properties),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EO_CLOUD_COVER, PROJ_EPSG};
    use crate::collection::{root_collection, COLLECTION_ID};
    use crate::geometry::to_bbox;
    use serde_json::json;

    const COLLECTION_ONLY_KEYS: [&str; 9] = [
        "name",
        "title",
        "eo:identifier",
        "description",
        "primary",
        "license",
        "licenseLink",
        "queryables",
        "summaries",
    ];

    fn item() -> Item {
        let mut item = Item::new("S2A_MSIL2A_20210615T094041_N0300_R036_T35VLG_20210615T120350")
            .collection(COLLECTION_ID);
        item.geometry = Some(bbox_polygon(&[24.0, 60.0, 26.0, 61.0]));
        item.properties.datetime = "2021-06-15T00:00:00Z".parse().ok();
        let fields = &mut item.properties.additional_fields;
        fields.insert(EO_CLOUD_COVER.to_string(), json!(12));
        fields.insert(PROJ_EPSG.to_string(), json!(32635));
        item.assets.insert(
            "thumbnail".to_string(),
            Asset::new("https://a3s.fi/bucket/preview.jp2"),
        );
        item
    }

    #[test]
    fn test_from_value_dispatches_on_type() {
        let collection = serde_json::to_value(root_collection(COLLECTION_ID)).unwrap();
        assert!(matches!(
            StacRecord::from_value(collection).unwrap(),
            StacRecord::Collection(_)
        ));

        let item = serde_json::to_value(item()).unwrap();
        let record = StacRecord::from_value(item).unwrap();
        assert!(matches!(record, StacRecord::Item(_)));
        assert_eq!(
            record.id(),
            "S2A_MSIL2A_20210615T094041_N0300_R036_T35VLG_20210615T120350"
        );
    }

    #[test]
    fn test_from_value_rejects_unknown_type() {
        let error = StacRecord::from_value(json!({"type": "Catalog", "id": "root"})).unwrap_err();
        assert_eq!(
            error.downcast_ref::<RecordError>(),
            Some(&RecordError::UnsupportedType("Catalog".to_string()))
        );
        assert!(StacRecord::from_value(json!({"id": "root"})).is_err());
    }

    #[test]
    fn test_translate_collection() {
        let mut collection = root_collection(COLLECTION_ID);
        collection.extent.spatial.bbox = vec![to_bbox([20.0, 59.0, 26.0, 63.0])];
        collection
            .links
            .push(Link::new("https://paituli.csc.fi/source", "derived_from"));

        let value = serde_json::to_value(
            translate(&StacRecord::Collection(collection)).unwrap(),
        )
        .unwrap();

        assert_eq!(value["type"], "Feature");
        assert_eq!(
            value["geometry"]["coordinates"],
            json!([[[26.0, 59.0], [26.0, 63.0], [20.0, 63.0], [20.0, 59.0], [26.0, 59.0]]])
        );
        let properties = &value["properties"];
        assert_eq!(properties["name"], "sentinel2-l2a");
        assert_eq!(properties["eo:identifier"], "sentinel2-l2a");
        assert_eq!(properties["primary"], true);
        assert_eq!(properties["queryables"], json!(["eo:identifier", "eo:cloud_cover"]));
        assert_eq!(
            properties["licenseLink"],
            json!({
                "href": "https://sentinel.esa.int/documents/247904/690755/Sentinel_Data_Legal_Notice",
                "rel": "license",
                "type": "application/json"
            })
        );
        assert_eq!(properties["derivedFrom"]["rel"], "derived_from");
        assert_eq!(properties["assets"]["metadata"]["roles"], json!(["metadata"]));
        assert_eq!(properties["providers"][0]["name"], "CSC Finland");
    }

    #[test]
    fn test_license_link_omitted_without_link() {
        let mut collection = root_collection(COLLECTION_ID);
        collection.links.clear();
        let value = serde_json::to_value(translate_collection(&collection).unwrap()).unwrap();
        assert!(value["properties"].get("licenseLink").is_none());
        assert!(value["properties"].get("derivedFrom").is_none());
    }

    #[test]
    fn test_collection_without_extent() {
        let mut collection = root_collection(COLLECTION_ID);
        collection.extent.spatial.bbox.clear();
        assert!(translate_collection(&collection).is_err());
    }

    #[test]
    fn test_translate_item() {
        let value = serde_json::to_value(translate_item(&item())).unwrap();
        let properties = value["properties"].as_object().unwrap();

        assert_eq!(
            properties["eop:identifier"],
            "S2A_MSIL2A_20210615T094041_N0300_R036_T35VLG_20210615T120350"
        );
        assert_eq!(properties["eop:parentIdentifier"], "sentinel2-l2a");
        assert_eq!(properties["timeStart"], "2021-06-15T00:00:00Z");
        assert_eq!(properties["timeEnd"], properties["timeStart"]);
        assert_eq!(properties["opt:cloudCover"], 12);
        assert_eq!(properties["crs"], 32635);
        assert_eq!(
            properties["assets"]["thumbnail"]["href"],
            "https://a3s.fi/bucket/preview.jp2"
        );
        assert_eq!(value["geometry"]["type"], "Polygon");

        for key in COLLECTION_ONLY_KEYS {
            assert!(!properties.contains_key(key), "{key} in item translation");
        }
    }

    #[test]
    fn test_translation_is_idempotent() {
        let record = StacRecord::Item(item());
        assert_eq!(translate(&record).unwrap(), translate(&record).unwrap());

        let collection = StacRecord::Collection(root_collection(COLLECTION_ID));
        let first = serde_json::to_value(translate(&collection).unwrap()).unwrap();
        let second = serde_json::to_value(translate(&collection).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
