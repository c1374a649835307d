//! Catalog services records are written to: a STAC API with transactions, or the GeoServer
//! OpenSearch-EO REST API
use crate::config::CatalogConfig;
use crate::translate::{translate_collection, translate_item};
use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use stac::{Collection, Item, ItemCollection};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// The record was reported as existing but could not be replaced
    Unchanged,
}

pub trait CatalogTarget {
    async fn fetch_collection(self: &Self, id: &str) -> Result<Option<Collection>>;
    async fn fetch_items(self: &Self, collection_id: &str) -> Result<Vec<Item>>;
    async fn upsert_collection(self: &Self, collection: &Collection) -> Result<UpsertOutcome>;
    async fn upsert_item(self: &Self, item: &Item) -> Result<UpsertOutcome>;
}

/// `url` with a trailing slash, so relative paths join below it instead of replacing its last
/// segment.
pub fn directory_url(url: &str) -> Result<Url> {
    let mut parsed = Url::parse(url).with_context(|| format!("Invalid URL: {url}"))?;
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    Ok(parsed)
}

/// Resolves a `next` link against the page it was found on. Servers behind a TLS terminating
/// proxy advertise plain http links; these are rewritten to https when `force_https` is set.
pub fn resolve_next(page: &Url, href: &str, force_https: bool) -> Result<Url> {
    let mut next = page.join(href)?;
    if force_https && next.scheme() == "http" {
        next.set_scheme("https")
            .map_err(|_| anyhow!("Unable to switch {next} to https"))?;
    }
    Ok(next)
}

#[derive(Clone)]
struct HttpSession {
    client: Client,
    credentials: Option<(String, String)>,
}

impl HttpSession {
    fn new(user_agent: &str, credentials: Option<(String, String)>) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            credentials,
        })
    }

    fn request(self: &Self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some((username, password)) => builder.basic_auth(username, Some(password)),
            None => builder,
        }
    }

    /// POST to `create_url`; when the record already exists (409) PUT to `record_url` instead.
    /// A 404 on the PUT leaves the record as it is.
    async fn upsert<T: Serialize>(
        self: &Self,
        create_url: Url,
        record_url: Url,
        body: &T,
    ) -> Result<UpsertOutcome> {
        let response = self
            .request(Method::POST, create_url.clone())
            .json(body)
            .send()
            .await?;

        if response.status() != StatusCode::CONFLICT {
            response
                .error_for_status()
                .with_context(|| format!("POST {create_url}"))?;
            return Ok(UpsertOutcome::Created);
        }

        debug!(url = %record_url, "Record exists, replacing");
        let response = self
            .request(Method::PUT, record_url.clone())
            .json(body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(url = %record_url, "Record could not be replaced, leaving it unchanged");
            return Ok(UpsertOutcome::Unchanged);
        }
        response
            .error_for_status()
            .with_context(|| format!("PUT {record_url}"))?;
        Ok(UpsertOutcome::Updated)
    }
}

/// Read access to a STAC API
#[derive(Clone)]
struct StacReader {
    session: HttpSession,
    root: Url,
    page_limit: usize,
    force_https: bool,
}

impl StacReader {
    async fn fetch_collection(self: &Self, id: &str) -> Result<Option<Collection>> {
        let url = self.root.join(&format!("collections/{id}"))?;
        let response = self.session.request(Method::GET, url.clone()).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let collection = response
            .error_for_status()
            .with_context(|| format!("GET {url}"))?
            .json::<Collection>()
            .await?;
        Ok(Some(collection))
    }

    async fn fetch_items(self: &Self, collection_id: &str) -> Result<Vec<Item>> {
        let mut url = self.root.join(&format!("collections/{collection_id}/items"))?;
        url.query_pairs_mut()
            .append_pair("limit", &self.page_limit.to_string());

        let mut items = vec![];
        let mut next = Some(url);
        while let Some(url) = next.take() {
            debug!(%url, "Fetching items");
            let page = self
                .session
                .request(Method::GET, url.clone())
                .send()
                .await?
                .error_for_status()
                .with_context(|| format!("GET {url}"))?
                .json::<ItemCollection>()
                .await?;

            items.extend(page.items);

            next = match page.links.iter().find(|link| link.rel == "next") {
                Some(link) => {
                    let candidate = resolve_next(&url, &link.href, self.force_https)?;
                    // A server pointing back at the same page would never terminate
                    (candidate != url).then_some(candidate)
                }
                None => None,
            };
        }
        Ok(items)
    }
}

/// A STAC API implementing the transaction extension
pub struct StacTransactions {
    session: HttpSession,
    reader: StacReader,
    root: Url,
}

impl StacTransactions {
    pub fn new(root: &str, config: &CatalogConfig, password: Option<String>) -> Result<Self> {
        let root = directory_url(root)?;
        let credentials = password.map(|password| (config.username.clone(), password));
        let session = HttpSession::new(&config.user_agent, credentials)?;
        let reader = StacReader {
            session: session.clone(),
            root: root.clone(),
            page_limit: config.page_limit,
            force_https: root.scheme() == "https",
        };
        Ok(Self {
            session,
            reader,
            root,
        })
    }
}

impl CatalogTarget for StacTransactions {
    async fn fetch_collection(self: &Self, id: &str) -> Result<Option<Collection>> {
        self.reader.fetch_collection(id).await
    }

    async fn fetch_items(self: &Self, collection_id: &str) -> Result<Vec<Item>> {
        self.reader.fetch_items(collection_id).await
    }

    async fn upsert_collection(self: &Self, collection: &Collection) -> Result<UpsertOutcome> {
        let create_url = self.root.join("collections")?;
        let record_url = self.root.join(&format!("collections/{}", collection.id))?;
        self.session
            .upsert(create_url, record_url, collection)
            .await
    }

    async fn upsert_item(self: &Self, item: &Item) -> Result<UpsertOutcome> {
        let collection_id = item
            .collection
            .as_deref()
            .ok_or_else(|| anyhow!("Item {} has no collection", item.id))?;
        let create_url = self
            .root
            .join(&format!("collections/{collection_id}/items"))?;
        let record_url = self
            .root
            .join(&format!("collections/{collection_id}/items/{}", item.id))?;
        self.session.upsert(create_url, record_url, item).await
    }
}

/// The GeoServer OpenSearch-EO REST API. Records are written in the OSEO layout and read back
/// through the STAC API the same GeoServer publishes.
pub struct OseoCatalog {
    session: HttpSession,
    reader: StacReader,
    root: Url,
}

impl OseoCatalog {
    pub fn new(host: &str, config: &CatalogConfig, password: String) -> Result<Self> {
        let host = directory_url(host)?;
        let session = HttpSession::new(
            &config.user_agent,
            Some((config.username.clone(), password)),
        )?;
        let reader = StacReader {
            session: session.clone(),
            root: directory_url(host.join(&config.stac_path)?.as_str())?,
            page_limit: config.page_limit,
            force_https: host.scheme() == "https",
        };
        let root = directory_url(host.join(&config.oseo_path)?.as_str())?;
        Ok(Self {
            session,
            reader,
            root,
        })
    }
}

impl CatalogTarget for OseoCatalog {
    async fn fetch_collection(self: &Self, id: &str) -> Result<Option<Collection>> {
        self.reader.fetch_collection(id).await
    }

    async fn fetch_items(self: &Self, collection_id: &str) -> Result<Vec<Item>> {
        self.reader.fetch_items(collection_id).await
    }

    async fn upsert_collection(self: &Self, collection: &Collection) -> Result<UpsertOutcome> {
        let feature = translate_collection(collection)?;
        let create_url = self.root.join("collections/")?;
        let record_url = self.root.join(&format!("collections/{}", collection.id))?;
        self.session.upsert(create_url, record_url, &feature).await
    }

    async fn upsert_item(self: &Self, item: &Item) -> Result<UpsertOutcome> {
        let collection_id = item
            .collection
            .as_deref()
            .ok_or_else(|| anyhow!("Item {} has no collection", item.id))?;
        let feature = translate_item(item);
        let create_url = self
            .root
            .join(&format!("collections/{collection_id}/products"))?;
        let record_url = self
            .root
            .join(&format!("collections/{collection_id}/products/{}", item.id))?;
        self.session.upsert(create_url, record_url, &feature).await
    }
}
