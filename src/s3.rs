//! Utility functions for creating s3 clients and reading bucket contents
use crate::config::ObjectStoreConfig;
use crate::error::MapError;
use anyhow::Result;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::Client;
use aws_smithy_runtime_api::client::orchestrator::HttpRequest;
use tracing::debug;

pub async fn client_from_config(config: &ObjectStoreConfig) -> Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .endpoint_url(&config.endpoint_url);

    if let Some(profile_name) = &config.profile {
        loader = loader.profile_name(profile_name);
    }

    if let (Some(access_key_id), Some(secret_access_key)) =
        (&config.access_key_id, &config.secret_access_key)
    {
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "sync-config",
        );
        loader = loader.credentials_provider(credentials);
    }

    let base_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&base_config)
        .force_path_style(config.force_path_style)
        .build();

    Client::from_conf(s3_config)
}

pub trait S3ObjOps {
    async fn list_buckets(self: &Self) -> Result<Vec<String>>;

    /// Every key in the bucket, following continuation tokens.
    async fn list_keys(self: &Self, bucket: &str) -> Result<Vec<String>>;

    async fn get_object(self: &Self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    async fn get_object_range(
        self: &Self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<Vec<u8>>;
}

pub struct ObjectStore {
    client: Client,
    strip_x_id: bool,
}

impl ObjectStore {
    pub async fn from_config(config: &ObjectStoreConfig) -> Self {
        let client = client_from_config(config).await;
        Self {
            client,
            strip_x_id: config.strip_x_id,
        }
    }
}

impl S3ObjOps for ObjectStore {
    async fn list_buckets(self: &Self) -> Result<Vec<String>> {
        let output = self.client.list_buckets().send().await?;
        let names = output
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name())
            .map(String::from)
            .collect();
        Ok(names)
    }

    async fn list_keys(self: &Self, bucket: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }
            let output = request.send().await?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match output.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(bucket, keys = keys.len(), "Listed bucket");
        Ok(keys)
    }

    async fn get_object(self: &Self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let request = self.client.get_object().bucket(bucket).key(key);
        let object = if self.strip_x_id {
            request
                .customize()
                .map_request(strip_x_id_get_object_param_from_uri)
                .send()
                .await?
        } else {
            request.send().await?
        };

        let data = object.body.collect().await?.to_vec();
        Ok(data)
    }

    async fn get_object_range(
        self: &Self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<Vec<u8>> {
        let range = format!("bytes={}-{}", start_byte, end_byte);
        let request = self.client.get_object().bucket(bucket).key(key).range(range);
        let object = if self.strip_x_id {
            request
                .customize()
                .map_request(strip_x_id_get_object_param_from_uri)
                .send()
                .await?
        } else {
            request.send().await?
        };

        let data = object.body.collect().await?.to_vec();
        Ok(data)
    }
}

/// Some S3-compatible APIs reject requests carrying the 'x-id=GetObject' param. This function can
/// be passed to the `GetObjectFluentBuilder::map_request()` method to strip the offending param
/// from the generated uri.
fn strip_x_id_get_object_param_from_uri(
    req: HttpRequest,
) -> std::result::Result<HttpRequest, MapError> {
    let mut r = req.try_clone().ok_or(MapError::Clone)?;
    let _ = r.set_uri(r.uri().replace("x-id=GetObject", ""));
    Ok(r)
}
