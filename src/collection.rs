//! The Sentinel-2 L2A collection and the items gathered under it
use crate::bands;
use crate::catalog::{Footprint, EO_BANDS, EO_EXTENSION, GSD, PROJECTION_EXTENSION};
use crate::geometry::{to_bbox, union_bounds};
use chrono::{TimeZone, Utc};
use serde_json::{json, Map};
use stac::{Asset, Bbox, Collection, Extent, Item, Link, Provider, SpatialExtent, TemporalExtent};
use std::collections::HashSet;

pub const COLLECTION_ID: &str = "sentinel2-l2a";
const TITLE: &str = "Sentinel-2 L2A";
const DESCRIPTION: &str = "Sentinel-2 products, processed to Level-2A (Surface Reflectance), \
a selection of mostly cloud-free products from Finland. \
More information: https://a3s.fi/sentinel-readme/README.txt";
const LICENSE: &str = "CC-BY-3.0-IGO";
const LICENSE_URL: &str =
    "https://sentinel.esa.int/documents/247904/690755/Sentinel_Data_Legal_Notice";
const README_URL: &str = "https://a3s.fi/sentinel-readme/README.txt";

/// The collection every scene is filed under. The extent is a placeholder until
/// [`CollectionAggregator::update_extent`] runs.
pub fn root_collection(id: &str) -> Collection {
    // First Sentinel-2 data
    let mission_start = Utc.with_ymd_and_hms(2015, 6, 29, 0, 0, 0).single();

    let mut summaries = Map::new();
    summaries.insert(EO_BANDS.to_string(), json!(bands::all_eo_bands()));
    summaries.insert(GSD.to_string(), json!([10, 20, 60]));

    let mut provider = Provider::new("CSC Finland");
    provider.roles = Some(vec!["host".to_string()]);
    provider.url = Some("https://www.csc.fi/".to_string());

    let mut collection = Collection::new(id, DESCRIPTION);
    collection.extensions = vec![EO_EXTENSION.to_string(), PROJECTION_EXTENSION.to_string()];
    collection.title = Some(TITLE.to_string());
    collection.license = LICENSE.to_string();
    collection.providers = Some(vec![provider]);
    collection.extent = Extent {
        spatial: SpatialExtent {
            bbox: vec![Bbox::new(0.0, 0.0, 0.0, 0.0)],
        },
        temporal: TemporalExtent {
            interval: vec![[mission_start, Some(Utc::now())]],
        },
        ..Default::default()
    };
    collection.summaries = Some(summaries);
    collection.links = vec![Link::new(LICENSE_URL, "license")];
    collection.assets.insert(
        "metadata".to_string(),
        Asset::new(README_URL).role("metadata"),
    );
    collection
}

/// Holds a collection together with the items of one run. Items already in the remote catalog
/// are only known by their footprints; they count towards the extent but are never rewritten.
pub struct CollectionAggregator {
    collection: Collection,
    footprints: Vec<Footprint>,
    items: Vec<Item>,
    ids: HashSet<String>,
}

impl CollectionAggregator {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            footprints: vec![],
            items: vec![],
            ids: HashSet::new(),
        }
    }

    pub fn with_footprints(
        collection: Collection,
        footprints: impl IntoIterator<Item = Footprint>,
    ) -> Self {
        let mut aggregator = Self::new(collection);
        for footprint in footprints {
            if aggregator.ids.insert(footprint.id.clone()) {
                aggregator.footprints.push(footprint);
            }
        }
        aggregator
    }

    pub fn collection(self: &Self) -> &Collection {
        &self.collection
    }

    pub fn contains(self: &Self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Adds an item unless one with the same id is already a member. Returns whether it was added.
    pub fn insert(self: &mut Self, mut item: Item) -> bool {
        if !self.ids.insert(item.id.clone()) {
            return false;
        }
        item.collection = Some(self.collection.id.clone());
        self.items.push(item);
        true
    }

    pub fn item_mut(self: &mut Self, id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Items inserted during this run, in insertion order
    pub fn new_items(self: &Self) -> &[Item] {
        &self.items
    }

    /// Recomputes the extent from every member. Nothing is patched incrementally; members
    /// without a bbox or datetime are left out of the respective union.
    pub fn update_extent(self: &mut Self) {
        let footprints = self
            .footprints
            .iter()
            .cloned()
            .chain(self.items.iter().map(Footprint::from))
            .collect::<Vec<_>>();

        if let Some(bbox) = union_bounds(footprints.iter().filter_map(|f| f.bbox)) {
            self.collection.extent.spatial.bbox = vec![to_bbox(bbox)];
        }

        let datetimes = footprints.iter().filter_map(|f| f.datetime);
        let start = datetimes.clone().min();
        let end = datetimes.max();
        if start.is_some() {
            self.collection.extent.temporal.interval = vec![[start, end]];
        }
    }

    pub fn into_parts(self) -> (Collection, Vec<Item>) {
        (self.collection, self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::bbox_polygon;
    use chrono::DateTime;
    use stac::Links;

    fn item(id: &str, bbox: [f64; 4], datetime: &str) -> Item {
        let mut item = Item::new(id);
        item.bbox = Some(to_bbox(bbox));
        item.geometry = Some(bbox_polygon(&bbox));
        item.properties.datetime = Some(datetime.parse::<DateTime<Utc>>().unwrap());
        item
    }

    #[test]
    fn test_root_collection() {
        let collection = root_collection(COLLECTION_ID);
        assert_eq!(collection.id, "sentinel2-l2a");
        assert_eq!(collection.license, "CC-BY-3.0-IGO");
        assert_eq!(collection.link("license").unwrap().href, LICENSE_URL);
        assert_eq!(collection.assets["metadata"].roles, vec!["metadata"]);
        assert_eq!(collection.providers.as_ref().unwrap()[0].name, "CSC Finland");

        let summaries = collection.summaries.unwrap();
        assert_eq!(summaries[EO_BANDS].as_array().unwrap().len(), 13);
        assert_eq!(summaries[GSD], json!([10, 20, 60]));
    }

    #[test]
    fn test_root_collection_serializes_as_collection() {
        let value = serde_json::to_value(root_collection(COLLECTION_ID)).unwrap();
        assert_eq!(value["type"], "Collection");
        assert_eq!(value["stac_version"], "1.0.0");
        assert_eq!(value["extent"]["spatial"]["bbox"], json!([[0.0, 0.0, 0.0, 0.0]]));
    }

    #[test]
    fn test_insert_is_unique() {
        let mut aggregator = CollectionAggregator::new(root_collection(COLLECTION_ID));
        assert!(aggregator.insert(item("a", [0.0, 0.0, 1.0, 1.0], "2021-06-15T00:00:00Z")));
        assert!(!aggregator.insert(item("a", [5.0, 5.0, 6.0, 6.0], "2021-06-16T00:00:00Z")));
        assert_eq!(aggregator.new_items().len(), 1);
        assert_eq!(
            aggregator.new_items()[0].collection.as_deref(),
            Some(COLLECTION_ID)
        );
        assert!(aggregator.item_mut("a").is_some());
        assert!(aggregator.item_mut("b").is_none());
    }

    #[test]
    fn test_update_extent_covers_all_members() {
        let remote = Footprint {
            id: "remote".to_string(),
            bbox: Some([20.0, 59.0, 22.0, 60.0]),
            datetime: "2020-05-01T00:00:00Z".parse().ok(),
        };
        let mut aggregator =
            CollectionAggregator::with_footprints(root_collection(COLLECTION_ID), [remote]);
        assert!(aggregator.contains("remote"));
        assert!(!aggregator.insert(item("remote", [0.0, 0.0, 1.0, 1.0], "2021-06-15T00:00:00Z")));

        aggregator.insert(item("a", [24.0, 60.0, 26.0, 61.0], "2021-06-15T00:00:00Z"));
        aggregator.insert(item("b", [21.0, 62.0, 23.0, 63.0], "2021-07-01T00:00:00Z"));
        aggregator.update_extent();

        let extent = &aggregator.collection().extent;
        assert_eq!(extent.spatial.bbox, vec![Bbox::new(20.0, 59.0, 26.0, 63.0)]);
        let [start, end] = extent.temporal.interval[0];
        assert_eq!(start.unwrap().to_rfc3339(), "2020-05-01T00:00:00+00:00");
        assert_eq!(end.unwrap().to_rfc3339(), "2021-07-01T00:00:00+00:00");
    }

    #[test]
    fn test_update_extent_without_members_keeps_placeholder() {
        let mut aggregator = CollectionAggregator::new(root_collection(COLLECTION_ID));
        aggregator.update_extent();
        assert_eq!(
            aggregator.collection().extent.spatial.bbox,
            vec![Bbox::new(0.0, 0.0, 0.0, 0.0)]
        );
    }
}
