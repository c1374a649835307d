use crate::collection::COLLECTION_ID;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use toml;

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub object_store: ObjectStoreConfig,
    pub buckets: BucketConfig,
    pub catalog: CatalogConfig,
    pub scenes: SceneConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ObjectStoreConfig {
    pub endpoint_url: String,
    pub region: String,
    pub profile: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub force_path_style: bool,
    pub strip_x_id: bool,
    /// Prefix for the public https URLs of bucket objects
    pub public_url_base: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "https://a3s.fi".to_string(),
            region: "regionOne".to_string(),
            profile: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: true,
            strip_x_id: false,
            public_url_base: "https://a3s.fi".to_string(),
        }
    }
}

impl ObjectStoreConfig {
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_url_base.trim_end_matches('/'),
            bucket,
            key
        )
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BucketConfig {
    pub include_pattern: String,
    pub exclude_pattern: Option<String>,
    /// Files listing extra bucket names, one per line
    pub list_files: Vec<PathBuf>,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            include_pattern: "^Sentinel2".to_string(),
            exclude_pattern: Some("segments".to_string()),
            list_files: vec![],
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    pub collection_id: String,
    pub oseo_path: String,
    pub stac_path: String,
    pub username: String,
    pub password_file: PathBuf,
    pub user_agent: String,
    pub page_limit: usize,
    pub push_concurrency: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            collection_id: COLLECTION_ID.to_string(),
            oseo_path: "geoserver/rest/oseo/".to_string(),
            stac_path: "geoserver/ogc/stac/v1/".to_string(),
            username: "admin".to_string(),
            password_file: PathBuf::from("passwords.txt"),
            user_agent: "update-script".to_string(),
            page_limit: 100,
            push_concurrency: 1,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    pub preview_marker: String,
    pub image_marker: String,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            preview_marker: "PVI".to_string(),
            image_marker: "IMG_DATA".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn write<P: AsRef<Path>>(self: &Self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reads the config file when one is given, otherwise falls back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path)
                .with_context(|| format!("Unable to read config from {}", path.display())),
            None => Ok(Self::default()),
        }
    }

    /// Builds a config from an inline table; missing keys take their defaults.
    pub fn from_template(table: &toml::Table) -> Result<Self> {
        let config: Self = toml::from_str(&table.to_string())?;
        Ok(config)
    }
}

/// Reads bucket names from a list file. Blank lines are ignored.
pub fn read_bucket_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    let names = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    Ok(names)
}

/// The first field of the first line of the password file, or an interactive prompt when the file
/// does not exist.
pub fn resolve_password<P: AsRef<Path>>(password_file: P) -> Result<String> {
    let path = password_file.as_ref();
    if path.exists() {
        return read_password_file(path);
    }

    println!("No password file found at {}", path.display());
    let password = rpassword::prompt_password("Password: ")
        .context("Unable to read password from the terminal")?;
    Ok(password)
}

fn read_password_file(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)?;
    let first_line = content.lines().next().unwrap_or_default();
    let password = first_line.split(',').next().unwrap_or_default().trim();
    Ok(password.to_string())
}
