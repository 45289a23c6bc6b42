//! S3-compatible artifact store (AWS S3, Cloudflare R2, MinIO).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::{join_url, ArtifactStore, KeyLayout, PANEL_CACHE_CONTROL};

/// Configuration for the S3 store.
#[derive(Debug, Clone)]
pub struct S3StoreConfig {
    /// Custom endpoint (R2/MinIO). `None` uses AWS.
    pub endpoint_url: Option<String>,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region
    pub region: String,
    /// Key prefix inside the bucket
    pub path_prefix: String,
    /// Public URL base. Defaults to the S3 virtual-host URL.
    pub public_base_url: Option<String>,
}

impl S3StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty()),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET")
                .map_err(|_| StorageError::config("S3_BUCKET not set"))?,
            region: std::env::var("S3_REGION")
                .map_err(|_| StorageError::config("S3_REGION not set"))?,
            path_prefix: std::env::var("S3_PATH").unwrap_or_default(),
            public_base_url: std::env::var("BASE_URL").ok().filter(|s| !s.is_empty()),
        })
    }

    /// Key layout derived from the configured prefix.
    pub fn key_layout(&self) -> KeyLayout {
        KeyLayout::new(&self.path_prefix)
    }

    /// Base URL objects are publicly served from.
    pub fn resolved_base_url(&self) -> String {
        match &self.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.s3.{}.amazonaws.com",
                self.bucket_name, self.region
            ),
        }
    }
}

/// S3 artifact store.
#[derive(Clone)]
pub struct S3ArtifactStore {
    client: Client,
    bucket: String,
    base_url: String,
}

impl S3ArtifactStore {
    /// Create a new store from configuration.
    pub async fn new(config: S3StoreConfig) -> StorageResult<Self> {
        if config.bucket_name.is_empty() {
            return Err(StorageError::config("bucket name is empty"));
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "comics",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());
        let base_url = config.resolved_base_url();

        info!(bucket = %config.bucket_name, base_url = %base_url, "S3 artifact store ready");

        Ok(Self {
            client,
            bucket: config.bucket_name,
            base_url,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = S3StoreConfig::from_env()?;
        Self::new(config).await
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Unreachable(format!("{}: {}", self.bucket, e)))?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false)
                    || e.raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);
                if not_found {
                    Ok(false)
                } else {
                    Err(StorageError::head(key, e))
                }
            }
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<String> {
        debug!("Uploading {} bytes to {}", bytes.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .cache_control(PANEL_CACHE_CONTROL)
            .send()
            .await
            .map_err(|e| StorageError::upload(key, e))?;

        Ok(self.public_url(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete(key, e))?;

        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.base_url, key)
    }

    async fn check(&self) -> StorageResult<()> {
        self.check_connectivity().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3StoreConfig {
        S3StoreConfig {
            endpoint_url: None,
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
            bucket_name: "panels".into(),
            region: "us-east-1".into(),
            path_prefix: "comics/".into(),
            public_base_url: None,
        }
    }

    #[test]
    fn test_default_public_url_is_virtual_host() {
        assert_eq!(
            config().resolved_base_url(),
            "https://panels.s3.us-east-1.amazonaws.com"
        );
    }

    #[test]
    fn test_base_url_override() {
        let mut cfg = config();
        cfg.public_base_url = Some("https://cdn.example.com/".into());
        assert_eq!(cfg.resolved_base_url(), "https://cdn.example.com");
    }

    #[tokio::test]
    async fn test_public_url_for_key() {
        let store = S3ArtifactStore::new(config()).await.unwrap();
        assert_eq!(
            store.public_url("comics/bbb/noir/00-30.jpg"),
            "https://panels.s3.us-east-1.amazonaws.com/comics/bbb/noir/00-30.jpg"
        );
    }

    /// Round trip against a real bucket.
    #[tokio::test]
    #[ignore = "requires S3 credentials"]
    async fn test_put_exists_delete_cycle() {
        dotenvy::dotenv().ok();

        let store = S3ArtifactStore::from_env().await.expect("Failed to create S3 store");
        store.check_connectivity().await.expect("Bucket not reachable");

        let key = "integration/test/00-00.jpg";
        let url = store.put(key, b"jpeg".to_vec(), "image/jpeg").await.unwrap();
        assert!(url.ends_with(key));
        assert!(store.exists(key).await.unwrap());

        store.delete(key).await.unwrap();
        assert!(!store.exists(key).await.unwrap());
        store.delete(key).await.expect("delete must be idempotent");
    }
}
