//! Shared storage backed by a JetStream KV bucket.
//!
//! Lets independent processes act as contexts of one origin: every
//! coordinator bound to the same namespace reads and writes the same bucket.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::keys::StorageKeys;
use crate::storage::SharedStorage;

/// [`SharedStorage`] over `grantauth-v1-{namespace}-session`.
#[derive(Debug, Clone)]
pub struct JetStreamStorage {
    kv_store: async_nats::jetstream::kv::Store,
}

impl JetStreamStorage {
    /// Create or bind to the KV bucket for `namespace`.
    pub async fn open(client: async_nats::Client, namespace: &str) -> Result<Self, StorageError> {
        let js = async_nats::jetstream::new(client);
        let bucket_name = StorageKeys::kv_bucket(namespace);
        let config = async_nats::jetstream::kv::Config {
            bucket: bucket_name.clone(),
            history: 1,
            ..Default::default()
        };
        let kv_store = match js.create_key_value(config).await {
            Ok(store) => {
                info!(bucket = %bucket_name, "session KV bucket created");
                store
            }
            Err(_) => {
                debug!(bucket = %bucket_name, "bucket exists, binding");
                js.get_key_value(&bucket_name)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))?
            }
        };
        Ok(Self { kv_store })
    }
}

#[async_trait]
impl SharedStorage for JetStreamStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.kv_store
            .get(StorageKeys::kv_key(key))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .map(|content| {
                String::from_utf8(content.to_vec())
                    .map_err(|e| StorageError::Backend(format!("non-UTF-8 value at {key}: {e}")))
            })
            .transpose()
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.kv_store
            .put(StorageKeys::kv_key(key), value.to_owned().into())
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.kv_store
            .delete(StorageKeys::kv_key(key))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}
