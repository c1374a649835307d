//! A self-contained STAC catalog on disk with relative links:
//! `catalog.json`, `<collection>/collection.json` and `<collection>/<item>/<item>.json`
use crate::sync::push_items;
use crate::target::{CatalogTarget, UpsertOutcome};
use crate::translate::StacRecord;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use stac::{Catalog, Collection, Item, Link, Links};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const CATALOG_FILE: &str = "catalog.json";
const COLLECTION_FILE: &str = "collection.json";

fn root_catalog(collection_id: &str) -> Catalog {
    let mut catalog = Catalog::new("Sentinel-2 catalog", "Sentinel 2 catalog.");
    catalog.links = vec![
        Link::new(format!("./{CATALOG_FILE}"), "root").json(),
        Link::new(format!("./{collection_id}/{COLLECTION_FILE}"), "child").json(),
    ];
    catalog
}

fn write_json<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).with_context(|| format!("Unable to write {}", path.display()))?;
    Ok(())
}

fn read_record(path: &Path) -> Result<StacRecord> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Unable to read {}", path.display()))?;
    StacRecord::from_value(serde_json::from_str(&content)?)
        .with_context(|| format!("Invalid record in {}", path.display()))
}

fn collection_path(dir: &Path, collection_id: &str) -> PathBuf {
    dir.join(collection_id).join(COLLECTION_FILE)
}

/// Writes the catalog, the collection and every item below `dir`. Layout links on the records
/// are replaced by relative ones.
pub fn write_catalog(dir: &Path, collection: &Collection, items: &[Item]) -> Result<()> {
    write_json(dir.join(CATALOG_FILE), &root_catalog(&collection.id))?;

    let mut collection = without_layout_links(collection.clone());
    collection.links.extend([
        Link::new(format!("../{CATALOG_FILE}"), "root").json(),
        Link::new(format!("../{CATALOG_FILE}"), "parent").json(),
    ]);
    for item in items {
        collection
            .links
            .push(Link::new(format!("./{0}/{0}.json", item.id), "item").json());

        let mut item = item.clone();
        item.remove_structural_links();
        item.links.extend([
            Link::new(format!("../../{CATALOG_FILE}"), "root").json(),
            Link::new(format!("../{COLLECTION_FILE}"), "parent").json(),
            Link::new(format!("../{COLLECTION_FILE}"), "collection").json(),
        ]);
        let path = dir.join(&collection.id).join(&item.id).join(format!("{}.json", item.id));
        write_json(path, &item)?;
    }
    write_json(collection_path(dir, &collection.id), &collection)?;

    info!(dir = %dir.display(), items = items.len(), "Catalog saved");
    Ok(())
}

/// Reads back a catalog written by [`write_catalog`]: the collection and each item it links to.
pub fn read_catalog(dir: &Path, collection_id: &str) -> Result<(Collection, Vec<Item>)> {
    let path = collection_path(dir, collection_id);
    let StacRecord::Collection(collection) = read_record(&path)? else {
        return Err(anyhow!("{} does not hold a collection", path.display()));
    };

    let collection_dir = dir.join(collection_id);
    let mut items = vec![];
    for link in collection.iter_item_links() {
        let path = collection_dir.join(&link.href);
        match read_record(&path)? {
            StacRecord::Item(item) => items.push(item),
            StacRecord::Collection(_) => {
                return Err(anyhow!("{} does not hold an item", path.display()))
            }
        }
    }
    Ok((collection, items))
}

/// Upserts a catalog from disk: the collection first so the items have somewhere to go.
pub async fn push_catalog(
    target: &impl CatalogTarget,
    dir: &Path,
    collection_id: &str,
    concurrency: usize,
) -> Result<Vec<UpsertOutcome>> {
    let (collection, items) = read_catalog(dir, collection_id)?;
    let items = items
        .into_iter()
        .map(|mut item| {
            item.remove_structural_links();
            item
        })
        .collect::<Vec<_>>();

    target
        .upsert_collection(&without_layout_links(collection))
        .await?;
    let outcomes = push_items(target, &items, concurrency).await?;
    info!(items = outcomes.len(), "Pushed catalog");
    Ok(outcomes)
}

fn without_layout_links(mut collection: Collection) -> Collection {
    collection.remove_structural_links();
    collection
}
