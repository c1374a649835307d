//! Walks the Sentinel-2 buckets, assembles items for the scenes the catalog does not know yet and
//! pushes them to a catalog target
use crate::catalog::Footprint;
use crate::collection::{root_collection, CollectionAggregator};
use crate::config::{read_bucket_list, BucketConfig, SyncConfig};
use crate::error::{RasterError, RecordError};
use crate::inventory::{product_name, BucketInventory, SceneFiles};
use crate::item::{add_band_asset, add_thumbnail_asset, build_item};
use crate::jp2;
use crate::metadata::fetch_metadata;
use crate::s3::S3ObjOps;
use crate::sync_state::SyncState;
use crate::target::{CatalogTarget, UpsertOutcome};
use anyhow::{Context, Result};
use futures_util::{stream, StreamExt, TryStreamExt};
use regex::Regex;
use stac::{Collection, Item};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncReport {
    pub buckets_scanned: usize,
    /// Scenes skipped because the catalog already holds them
    pub scenes_known: usize,
    /// Scenes skipped for lack of metadata, images or a readable preview
    pub scenes_incomplete: usize,
    pub added: Vec<String>,
    pub collection_pushed: bool,
}

/// Buckets matching the include pattern but not the exclude pattern, followed by the names read
/// from the list files. Each name appears once, in the order first seen.
pub fn select_buckets(available: &[String], config: &BucketConfig) -> Result<Vec<String>> {
    let include = Regex::new(&config.include_pattern)?;
    let exclude = config
        .exclude_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()?;

    let mut listed = vec![];
    for path in &config.list_files {
        let names = read_bucket_list(path)
            .with_context(|| format!("Unable to read bucket list {}", path.display()))?;
        listed.extend(names);
    }

    let matching = available.iter().filter(|name| {
        include.is_match(name) && !exclude.as_ref().is_some_and(|exclude| exclude.is_match(name))
    });

    let mut seen = HashSet::new();
    let selected = matching
        .chain(listed.iter())
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect();
    Ok(selected)
}

/// Upserts every item, at most `concurrency` requests at a time.
pub async fn push_items(
    target: &impl CatalogTarget,
    items: &[Item],
    concurrency: usize,
) -> Result<Vec<UpsertOutcome>> {
    stream::iter(items)
        .map(|item| async move {
            let outcome = target
                .upsert_item(item)
                .await
                .with_context(|| format!("Unable to push item {}", item.id))?;
            debug!(item = %item.id, ?outcome, "Pushed item");
            Ok::<_, anyhow::Error>(outcome)
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await
}

pub struct SyncDriver<'a, S: S3ObjOps> {
    store: &'a S,
    config: &'a SyncConfig,
}

impl<'a, S: S3ObjOps> SyncDriver<'a, S> {
    pub fn new(store: &'a S, config: &'a SyncConfig) -> Self {
        Self { store, config }
    }

    pub async fn buckets(self: &Self) -> Result<Vec<String>> {
        let available = self.store.list_buckets().await?;
        let buckets = select_buckets(&available, &self.config.buckets)?;
        info!(buckets = buckets.len(), "Selected buckets");
        Ok(buckets)
    }

    /// Incremental run against a catalog: scenes the catalog already lists are skipped, new items
    /// are pushed and the collection extent is recomputed over old and new items alike.
    pub async fn update(self: &Self, target: &impl CatalogTarget) -> Result<SyncReport> {
        let collection_id = &self.config.catalog.collection_id;

        let existing = target.fetch_collection(collection_id).await?;
        let (collection, remote_items, is_new) = match existing {
            Some(collection) => {
                let items = target.fetch_items(collection_id).await?;
                (collection, items, false)
            }
            None => {
                info!(collection = %collection_id, "Collection not found, creating it");
                (root_collection(collection_id), vec![], true)
            }
        };

        let state = SyncState::reconcile(&remote_items);
        info!(known = state.len(), "Collected items from the catalog");

        let mut aggregator = CollectionAggregator::with_footprints(
            collection,
            remote_items.iter().map(Footprint::from),
        );
        let mut report = SyncReport::default();
        let buckets = self.buckets().await?;
        self.ingest(&buckets, &state, &mut aggregator, &mut report)
            .await?;

        if aggregator.new_items().is_empty() {
            info!("All items present");
            return Ok(report);
        }

        aggregator.update_extent();
        // Items can only be filed under a collection the catalog already has
        if is_new {
            target.upsert_collection(aggregator.collection()).await?;
        }
        push_items(
            target,
            aggregator.new_items(),
            self.config.catalog.push_concurrency,
        )
        .await?;
        info!(added = report.added.len(), "Pushed new items");

        if !is_new {
            target.upsert_collection(aggregator.collection()).await?;
        }
        report.collection_pushed = true;
        info!("Updated collection extent");

        Ok(report)
    }

    /// Assembles the collection and all items from scratch, without consulting any catalog.
    pub async fn build(self: &Self) -> Result<(Collection, Vec<Item>, SyncReport)> {
        let mut aggregator =
            CollectionAggregator::new(root_collection(&self.config.catalog.collection_id));
        let mut report = SyncReport::default();
        let buckets = self.buckets().await?;
        self.ingest(&buckets, &SyncState::default(), &mut aggregator, &mut report)
            .await?;

        aggregator.update_extent();
        let (collection, items) = aggregator.into_parts();
        Ok((collection, items, report))
    }

    pub async fn ingest(
        self: &Self,
        buckets: &[String],
        state: &SyncState,
        aggregator: &mut CollectionAggregator,
        report: &mut SyncReport,
    ) -> Result<()> {
        for bucket in buckets {
            self.ingest_bucket(bucket, state, aggregator, report)
                .await
                .with_context(|| format!("Unable to ingest bucket {bucket}"))?;
            report.buckets_scanned += 1;
        }
        Ok(())
    }

    async fn ingest_bucket(
        self: &Self,
        bucket: &str,
        state: &SyncState,
        aggregator: &mut CollectionAggregator,
        report: &mut SyncReport,
    ) -> Result<()> {
        let keys = self.store.list_keys(bucket).await?;
        let inventory = BucketInventory::from_keys(&keys);
        info!(bucket, scenes = inventory.scenes.len(), "Scanning bucket");

        for folder in &inventory.scenes {
            let product = product_name(folder);
            if state.contains(product) {
                report.scenes_known += 1;
                continue;
            }

            let Some(files) = inventory.scene_files(product, &self.config.scenes) else {
                debug!(bucket, scene = product, "No metadata documents, skipping");
                report.scenes_incomplete += 1;
                continue;
            };
            if files.images.is_empty() {
                warn!(bucket, scene = product, "No image files, skipping");
                report.scenes_incomplete += 1;
                continue;
            }

            if aggregator.item_mut(product).is_some() {
                // The same scene delivered through another bucket contributes its images
                self.extend_item(bucket, product, &files, aggregator).await?;
                continue;
            }

            let Some(preview) = files.preview else {
                warn!(bucket, scene = product, "No preview image, skipping");
                report.scenes_incomplete += 1;
                continue;
            };

            let shape = match jp2::fetch_shape(self.store, bucket, preview).await {
                Ok(shape) => shape,
                Err(err) if err.downcast_ref::<RasterError>().is_some() => {
                    warn!(bucket, scene = product, error = %err, "Unreadable preview, skipping");
                    report.scenes_incomplete += 1;
                    continue;
                }
                Err(err) => {
                    return Err(err.context(format!("Unable to read preview header {preview}")))
                }
            };

            let item = self.assemble_item(bucket, &files, preview, shape).await?;
            if item.id != product {
                return Err(RecordError::SceneMismatch {
                    id: item.id,
                    product: product.to_string(),
                }
                .into());
            }
            let id = item.id.clone();
            let assets = item.assets.len();
            if !aggregator.insert(item) {
                return Err(RecordError::DuplicateItem(id).into());
            }
            info!(bucket, scene = %id, assets, "Added item");
            report.added.push(id);
        }
        Ok(())
    }

    async fn assemble_item(
        self: &Self,
        bucket: &str,
        files: &SceneFiles<'_>,
        preview: &str,
        preview_shape: (u32, u32),
    ) -> Result<Item> {
        let (scene, tile) = fetch_metadata(self.store, bucket, files).await?;
        let object_store = &self.config.object_store;

        let first_url = object_store.public_url(bucket, files.images[0]);
        let mut item = build_item(
            &first_url,
            &scene,
            &tile,
            &self.config.catalog.collection_id,
        )?;

        add_thumbnail_asset(&mut item, &object_store.public_url(bucket, preview), preview_shape);

        for image in &files.images {
            add_band_asset(&mut item, &object_store.public_url(bucket, image), &tile)?;
        }
        Ok(item)
    }

    async fn extend_item(
        self: &Self,
        bucket: &str,
        product: &str,
        files: &SceneFiles<'_>,
        aggregator: &mut CollectionAggregator,
    ) -> Result<()> {
        let (_, tile) = fetch_metadata(self.store, bucket, files).await?;
        if let Some(item) = aggregator.item_mut(product) {
            for image in &files.images {
                let url = self.config.object_store.public_url(bucket, image);
                add_band_asset(item, &url, &tile)?;
            }
        }
        Ok(())
    }
}
