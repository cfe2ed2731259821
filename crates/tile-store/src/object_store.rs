//! Bulk tile store on object storage (MinIO/S3 compatible).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::{aws::AmazonS3Builder, path::Path, ObjectStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use tam_common::{StoreError, StoreResult, Tile, TileDescriptor};

use crate::fetch::TileFetcher;
use crate::payload::TilePayload;

/// Configuration for the object storage connection and key layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileObjectConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
    /// Key prefix under which `{dataset}/{tile_id}.json` payloads live
    pub prefix: String,
    /// Maximum number of payload reads in flight per fetch
    pub max_concurrent_reads: usize,
}

impl Default for TileObjectConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            bucket: "tiles".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
            prefix: "tiles".to_string(),
            max_concurrent_reads: 16,
        }
    }
}

/// Reads JSON tile payloads from an object store.
///
/// Payloads that do not exist are left out of the result rather than
/// failing the fetch, so callers can report exactly which tiles are missing.
pub struct ObjectStoreTileFetcher {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    max_concurrent_reads: usize,
}

impl ObjectStoreTileFetcher {
    /// Wrap an existing object store.
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            max_concurrent_reads: TileObjectConfig::default().max_concurrent_reads,
        }
    }

    /// Connect to an S3-compatible endpoint.
    pub fn s3(config: &TileObjectConfig) -> StoreResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| StoreError::Fetch(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            prefix: config.prefix.clone(),
            max_concurrent_reads: config.max_concurrent_reads.max(1),
        })
    }

    /// Object key of a tile payload.
    pub fn payload_path(&self, dataset: &str, tile_id: &str) -> String {
        format!("{}/{}/{}.json", self.prefix, dataset, tile_id)
    }

    /// Store a tile's bulk payload.
    #[instrument(skip(self, tile), fields(tile_id = %tile.id()))]
    pub async fn put_tile(&self, tile: &Tile) -> StoreResult<()> {
        let path = self.payload_path(&tile.descriptor.dataset, tile.id());
        let body = TilePayload::from_tile(tile).to_json_bytes()?;
        debug!(size = body.len(), path = %path, "Writing tile payload");

        self.store
            .put(&Path::from(path.as_str()), Bytes::from(body))
            .await
            .map_err(|e| StoreError::Fetch(format!("Failed to write {}: {}", path, e)))?;

        Ok(())
    }

    async fn read_tile(&self, descriptor: &TileDescriptor) -> StoreResult<Option<Tile>> {
        let path = self.payload_path(&descriptor.dataset, &descriptor.tile_id);
        let location = Path::from(path.as_str());

        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                warn!(path = %path, "Tile payload not found");
                return Ok(None);
            }
            Err(e) => {
                return Err(StoreError::Fetch(format!("Failed to read {}: {}", path, e)));
            }
        };

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StoreError::Fetch(format!("Failed to read bytes of {}: {}", path, e)))?;

        let tile = TilePayload::from_json_bytes(&bytes)?.into_tile(descriptor.clone())?;
        Ok(Some(tile))
    }
}

#[async_trait]
impl TileFetcher for ObjectStoreTileFetcher {
    #[instrument(skip(self, descriptors), fields(count = descriptors.len()))]
    async fn fetch(&self, descriptors: &[TileDescriptor]) -> StoreResult<Vec<Tile>> {
        let tiles: Vec<Option<Tile>> = futures::stream::iter(descriptors.iter().cloned())
            .map(|d| async move { self.read_tile(&d).await })
            .buffered(self.max_concurrent_reads)
            .try_collect()
            .await?;

        Ok(tiles.into_iter().flatten().collect())
    }
}
