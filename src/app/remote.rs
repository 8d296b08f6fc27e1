use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use time::OffsetDateTime;

use crate::app::photos;
use crate::domain::post::{NewPost, PhotoFile, Post, StoredPost};
use crate::error::BackendError;

/// Fields written for a new remote post. The backend stamps `id` and
/// `created_at` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub name: String,
    pub message: String,
    pub photo_url: Option<String>,
    pub photo_path: Option<String>,
}

/// The hosted post collection.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    async fn insert(&self, record: PostRecord) -> Result<StoredPost, BackendError>;

    /// Every post, newest first.
    async fn list(&self) -> Result<Vec<StoredPost>, BackendError>;

    /// Deleting an id that does not exist succeeds.
    async fn delete(&self, id: &str) -> Result<(), BackendError>;

    /// Live query: the full list (newest first) now and after every change.
    fn watch(&self) -> BoxStream<'static, Result<Vec<StoredPost>, BackendError>>;
}

/// Keyed binary object storage.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Stores `bytes` under `key` and returns a durable download URL.
    async fn upload(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<String, BackendError>;

    async fn delete(&self, key: &str) -> Result<(), BackendError>;
}

pub struct RemoteBackend {
    collection: Arc<dyn DocumentCollection>,
    storage: Option<Arc<dyn BlobStorage>>,
    photo_key_prefix: String,
}

impl RemoteBackend {
    /// `storage` is `None` when object storage is disabled; photos are then
    /// inlined as data URLs.
    pub fn new(
        collection: Arc<dyn DocumentCollection>,
        storage: Option<Arc<dyn BlobStorage>>,
        photo_key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            collection,
            storage,
            photo_key_prefix: photo_key_prefix.into(),
        }
    }

    pub async fn create(&self, input: &NewPost, file: Option<&PhotoFile>) -> Result<Post, BackendError> {
        let (photo_url, photo_path) = match (file, &self.storage) {
            (None, _) => (Some(String::new()), None),
            (Some(file), Some(storage)) => {
                let epoch_ms = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
                let key = photos::storage_key(&self.photo_key_prefix, epoch_ms, &file.file_name);
                tracing::info!(key = %key, file_name = %file.file_name, "uploading photo");
                let url = storage
                    .upload(&key, &photos::content_type(file), file.bytes.clone())
                    .await?;
                (Some(url), Some(key))
            }
            (Some(file), None) => {
                tracing::debug!(file_name = %file.file_name, "object storage disabled, inlining photo");
                (Some(photos::to_data_url(file)), None)
            }
        };

        let stored = self
            .collection
            .insert(PostRecord {
                name: input.name.clone(),
                message: input.message.clone(),
                photo_url,
                photo_path,
            })
            .await?;

        Ok(stored.with_defaults())
    }

    pub async fn list(&self) -> Result<Vec<Post>, BackendError> {
        let posts = self.collection.list().await?;
        Ok(posts.into_iter().map(StoredPost::with_defaults).collect())
    }

    /// Removes the stored photo (best effort) and then the post itself.
    pub async fn delete(&self, id: &str, photo_path: Option<&str>) -> Result<(), BackendError> {
        let photo_path = photo_path.filter(|path| !path.trim().is_empty());
        if let (Some(storage), Some(path)) = (&self.storage, photo_path) {
            if let Err(err) = storage.delete(path).await {
                tracing::warn!(photo_path = %path, error = %err, "photo not found or not deleted");
            }
        }

        self.collection.delete(id).await
    }

    pub fn watch(&self) -> BoxStream<'static, Result<Vec<Post>, BackendError>> {
        self.collection
            .watch()
            .map(|update| update.map(|posts| posts.into_iter().map(StoredPost::with_defaults).collect()))
            .boxed()
    }
}
