pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;

use anyhow::Result;
use std::sync::Arc;

use crate::app::admin::AdminGate;
use crate::app::posts::PostStore;
use crate::app::remote::{BlobStorage, RemoteBackend};
use crate::app::stickers::StickerShelf;
use crate::config::AppConfig;
use crate::infra::{collection::PgPostCollection, db::Db, kv::FileKeyValue, storage::ObjectStorage};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub store: PostStore,
    pub admin: AdminGate,
    pub stickers: StickerShelf,
}

impl AppState {
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let db = Db::connect_lazy(config)?;

        let storage: Option<Arc<dyn BlobStorage>> = if config.use_object_storage() {
            Some(Arc::new(ObjectStorage::new(config).await?))
        } else {
            None
        };
        let remote = RemoteBackend::new(
            Arc::new(PgPostCollection::new(db.clone())),
            storage,
            config.photo_key_prefix.clone(),
        );
        let local = Arc::new(FileKeyValue::open(&config.local_store_dir)?);

        Ok(Self {
            db,
            store: PostStore::new(remote, local),
            admin: AdminGate::new(config.admin_code.clone()),
            stickers: StickerShelf::new(config.sticker_dir.clone()),
        })
    }
}
