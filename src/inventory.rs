//! Bucket listings partitioned into the files a scene is assembled from
use crate::config::SceneConfig;
use regex::Regex;
use std::collections::BTreeSet;

pub const SCENE_METADATA_SUFFIX: &str = "MTD_MSIL2A.xml";
pub const TILE_METADATA_SUFFIX: &str = "MTD_TL.xml";
const IMAGE_SUFFIX: &str = "jp2";
const EXCLUDED_FOLDERS: [&str; 1] = ["index.html"];

#[derive(Debug, Default)]
pub struct BucketInventory {
    pub images: Vec<String>,
    pub scene_metadata: Vec<String>,
    pub tile_metadata: Vec<String>,
    pub scenes: Vec<String>,
}

/// The keys belonging to one scene
#[derive(Debug, PartialEq)]
pub struct SceneFiles<'a> {
    pub scene_metadata: &'a str,
    pub tile_metadata: &'a str,
    pub images: Vec<&'a str>,
    pub preview: Option<&'a str>,
}

impl BucketInventory {
    pub fn from_keys(keys: &[String]) -> Self {
        let select = |suffix: &str| {
            keys.iter()
                .filter(|key| key.ends_with(suffix))
                .cloned()
                .collect::<Vec<_>>()
        };

        Self {
            images: select(IMAGE_SUFFIX),
            scene_metadata: select(SCENE_METADATA_SUFFIX),
            tile_metadata: select(TILE_METADATA_SUFFIX),
            scenes: scene_folders(keys),
        }
    }

    /// Looks up the files of a scene by its product name. `None` when either metadata document is
    /// missing, in which case the scene holds nothing to ingest.
    pub fn scene_files(
        self: &Self,
        product: &str,
        markers: &SceneConfig,
    ) -> Option<SceneFiles<'_>> {
        let scene_metadata = first_containing(&self.scene_metadata, product)?;
        let tile_metadata = first_containing(&self.tile_metadata, product)?;

        let images = self
            .images
            .iter()
            .filter(|key| key.contains(product) && key.contains(&markers.image_marker))
            .map(String::as_str)
            .collect();
        let preview = self
            .images
            .iter()
            .find(|key| key.contains(product) && key.contains(&markers.preview_marker))
            .map(String::as_str);

        Some(SceneFiles {
            scene_metadata,
            tile_metadata,
            images,
            preview,
        })
    }
}

fn first_containing<'a>(keys: &'a [String], product: &str) -> Option<&'a str> {
    keys.iter()
        .find(|key| key.contains(product))
        .map(String::as_str)
}

/// Distinct SAFE folders of a bucket. Some buckets group the SAFEs in year pseudo-folders, in
/// which case the SAFEs sit one segment deeper.
pub fn scene_folders(keys: &[String]) -> Vec<String> {
    let year = Regex::new(r"^\d{4}").expect("Regex pattern should always compile");

    let top_level = folders_at(keys, 0);
    let folders = if top_level.iter().any(|folder| year.is_match(folder)) {
        folders_at(keys, 1)
    } else {
        top_level
    };

    folders.into_iter().collect()
}

fn folders_at(keys: &[String], depth: usize) -> BTreeSet<String> {
    keys.iter()
        .filter_map(|key| key.split('/').nth(depth))
        .filter(|folder| !folder.is_empty() && !EXCLUDED_FOLDERS.contains(folder))
        .map(String::from)
        .collect()
}

/// SAFE folder name without the `.SAFE` suffix
pub fn product_name(folder: &str) -> &str {
    folder.split('.').next().unwrap_or(folder)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT: &str = "S2A_MSIL2A_20210615T094041_N0300_R036_T35VLG_20210615T120350";

    fn flat_keys() -> Vec<String> {
        let safe = format!("{PRODUCT}.SAFE");
        vec![
            "index.html".to_string(),
            format!("{safe}/{SCENE_METADATA_SUFFIX}"),
            format!("{safe}/GRANULE/L2A_T35VLG/{TILE_METADATA_SUFFIX}"),
            format!("{safe}/GRANULE/L2A_T35VLG/IMG_DATA/R10m/T35VLG_20210615T094041_B02_10m.jp2"),
            format!("{safe}/GRANULE/L2A_T35VLG/IMG_DATA/R10m/T35VLG_20210615T094041_B03_10m.jp2"),
            format!("{safe}/GRANULE/L2A_T35VLG/QI_DATA/T35VLG_20210615T094041_PVI.jp2"),
            "S2B_MSIL2A_20210620T094029_N0300_R036_T35VLH_20210620T113528.SAFE/manifest.safe"
                .to_string(),
        ]
    }

    #[test]
    fn test_partition_by_suffix() {
        let inventory = BucketInventory::from_keys(&flat_keys());
        assert_eq!(inventory.images.len(), 3);
        assert_eq!(inventory.scene_metadata.len(), 1);
        assert_eq!(inventory.tile_metadata.len(), 1);
    }

    #[test]
    fn test_flat_scene_folders() {
        let folders = scene_folders(&flat_keys());
        assert_eq!(
            folders,
            vec![
                format!("{PRODUCT}.SAFE"),
                "S2B_MSIL2A_20210620T094029_N0300_R036_T35VLH_20210620T113528.SAFE".to_string()
            ]
        );
    }

    #[test]
    fn test_year_scene_folders() {
        let keys = flat_keys()
            .into_iter()
            .map(|key| format!("2021/{key}"))
            .collect::<Vec<_>>();
        let folders = scene_folders(&keys);
        // 'index.html' one level down is still excluded
        assert_eq!(folders.len(), 2);
        assert!(folders.contains(&format!("{PRODUCT}.SAFE")));
    }

    #[test]
    fn test_scene_files() {
        let inventory = BucketInventory::from_keys(&flat_keys());
        let files = inventory
            .scene_files(PRODUCT, &SceneConfig::default())
            .unwrap();
        assert!(files.scene_metadata.ends_with(SCENE_METADATA_SUFFIX));
        assert!(files.tile_metadata.ends_with(TILE_METADATA_SUFFIX));
        assert_eq!(files.images.len(), 2);
        assert!(files.preview.unwrap().ends_with("PVI.jp2"));
    }

    #[test]
    fn test_scene_without_sidecar() {
        let inventory = BucketInventory::from_keys(&flat_keys());
        let files = inventory.scene_files(
            "S2B_MSIL2A_20210620T094029_N0300_R036_T35VLH_20210620T113528",
            &SceneConfig::default(),
        );
        assert_eq!(files, None);
    }

    #[test]
    fn test_product_name() {
        assert_eq!(product_name(&format!("{PRODUCT}.SAFE")), PRODUCT);
        assert_eq!(product_name(PRODUCT), PRODUCT);
    }
}
