#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use uuid::Uuid;

use mural::app::posts::PostStore;
use mural::app::remote::{BlobStorage, DocumentCollection, PostRecord, RemoteBackend};
use mural::domain::post::{Post, StoredPost};
use mural::error::{BackendError, ErrorCode};
use mural::app::local::LOCAL_POSTS_KEY;
use mural::infra::kv::{KeyValueStore, MemoryKeyValue};

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

// ---------------------------------------------------------------------------
// In-memory post collection with switchable outages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Insert,
    List,
    Delete,
}

pub struct FakeCollection {
    posts: Mutex<Vec<StoredPost>>,
    updates: watch::Sender<Option<Result<Vec<StoredPost>, BackendError>>>,
    outages: Mutex<HashMap<Op, ErrorCode>>,
    calls: AtomicUsize,
    ticks: AtomicUsize,
}

impl FakeCollection {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(Some(Ok(Vec::new())));
        Self {
            posts: Mutex::new(Vec::new()),
            updates,
            outages: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            ticks: AtomicUsize::new(0),
        }
    }

    /// Every later call of `op` fails with `code` until `recover`.
    pub fn fail(&self, op: Op, code: ErrorCode) {
        self.outages.lock().unwrap().insert(op, code);
    }

    pub fn recover(&self) {
        self.outages.lock().unwrap().clear();
    }

    /// Pushes an error through every open live query.
    pub fn break_live_query(&self, code: ErrorCode) {
        self.updates
            .send_replace(Some(Err(BackendError::new(code, "live query failed"))));
    }

    /// Ends every open live query without an error.
    pub fn end_live_query(&self) {
        self.updates.send_replace(None);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    fn check(&self, op: Op) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outages.lock().unwrap().get(&op) {
            Some(code) => Err(BackendError::new(*code, format!("{:?} rejected", op))),
            None => Ok(()),
        }
    }

    fn publish(&self, posts: &[StoredPost]) {
        self.updates.send_replace(Some(Ok(posts.to_vec())));
    }
}

#[async_trait]
impl DocumentCollection for FakeCollection {
    async fn insert(&self, record: PostRecord) -> Result<StoredPost, BackendError> {
        self.check(Op::Insert)?;
        // Strictly increasing timestamps keep the ordering deterministic.
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) as i64;
        let stored = StoredPost {
            id: Some(Uuid::new_v4().to_string()),
            name: Some(record.name),
            message: Some(record.message),
            photo_url: record.photo_url,
            photo_path: record.photo_path,
            created_at: Some(
                OffsetDateTime::from_unix_timestamp(1_700_000_000 + tick).unwrap(),
            ),
        };

        let mut posts = self.posts.lock().unwrap();
        posts.insert(0, stored.clone());
        self.publish(&posts);
        Ok(stored)
    }

    async fn list(&self) -> Result<Vec<StoredPost>, BackendError> {
        self.check(Op::List)?;
        Ok(self.posts.lock().unwrap().clone())
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        self.check(Op::Delete)?;
        let mut posts = self.posts.lock().unwrap();
        posts.retain(|post| post.id.as_deref() != Some(id));
        self.publish(&posts);
        Ok(())
    }

    fn watch(&self) -> BoxStream<'static, Result<Vec<StoredPost>, BackendError>> {
        let rx = self.updates.subscribe();
        stream::unfold((rx, true), |(mut rx, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let update = rx.borrow_and_update().clone()?;
            Some((update, (rx, false)))
        })
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// In-memory object storage
// ---------------------------------------------------------------------------

pub struct FakeBlobs {
    objects: Mutex<HashMap<String, Bytes>>,
    upload_outage: Mutex<Option<ErrorCode>>,
    delete_outage: Mutex<Option<ErrorCode>>,
}

impl FakeBlobs {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            upload_outage: Mutex::new(None),
            delete_outage: Mutex::new(None),
        }
    }

    pub fn fail_uploads(&self, code: ErrorCode) {
        *self.upload_outage.lock().unwrap() = Some(code);
    }

    pub fn fail_deletes(&self, code: ErrorCode) {
        *self.delete_outage.lock().unwrap() = Some(code);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Drops an object behind the store's back.
    pub fn forget(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
    }
}

#[async_trait]
impl BlobStorage for FakeBlobs {
    async fn upload(&self, key: &str, _content_type: &str, bytes: Bytes) -> Result<String, BackendError> {
        if let Some(code) = *self.upload_outage.lock().unwrap() {
            return Err(BackendError::new(code, "upload rejected"));
        }
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(format!("https://blobs.test/mural/{}", key))
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        if let Some(code) = *self.delete_outage.lock().unwrap() {
            return Err(BackendError::new(code, "delete rejected"));
        }
        match self.objects.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(BackendError::not_found(format!("no object {}", key))),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: PostStore,
    pub collection: Arc<FakeCollection>,
    pub blobs: Arc<FakeBlobs>,
    pub kv: Arc<MemoryKeyValue>,
    with_storage: bool,
}

impl Harness {
    /// A fresh store in remote mode with object storage enabled.
    pub fn new() -> Self {
        Self::build(true, Arc::new(MemoryKeyValue::new()))
    }

    /// A fresh store in remote mode that inlines photos as data URLs.
    pub fn without_storage() -> Self {
        Self::build(false, Arc::new(MemoryKeyValue::new()))
    }

    fn build(with_storage: bool, kv: Arc<MemoryKeyValue>) -> Self {
        let collection = Arc::new(FakeCollection::new());
        let blobs = Arc::new(FakeBlobs::new());
        let storage: Option<Arc<dyn BlobStorage>> = if with_storage {
            Some(blobs.clone())
        } else {
            None
        };
        let remote = RemoteBackend::new(collection.clone(), storage, "posts");
        let store = PostStore::new(remote, kv.clone());

        Self {
            store,
            collection,
            blobs,
            kv,
            with_storage,
        }
    }

    /// Simulates a restart: new process state, same local key-value storage.
    pub fn restart(&self) -> Self {
        Self::build(self.with_storage, self.kv.clone())
    }

    /// Simulates a restart whose local storage already holds `json`.
    pub fn restart_with_local(&self, json: &str) -> Self {
        self.kv.set(LOCAL_POSTS_KEY, json).unwrap();
        self.restart()
    }

    /// Puts the store in local mode through a rejected create.
    pub async fn force_local(&self) {
        self.collection.fail(Op::Insert, ErrorCode::PermissionDenied);
        self.store
            .create(&mural::domain::post::NewPost::new("Placeholder", "placeholder"), None)
            .await
            .expect("local create after permission error");
        self.collection.recover();
        let posts = first_snapshot(&self.store).await;
        let placeholder = posts
            .iter()
            .find(|post| post.name == "Placeholder")
            .expect("placeholder post in local list")
            .id
            .clone();
        self.store.delete_by_id(&placeholder, None).await.unwrap();
    }
}

// ---------------------------------------------------------------------------
// Stream helpers
// ---------------------------------------------------------------------------

const STREAM_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn next_snapshot(stream: &mut BoxStream<'static, Vec<Post>>) -> Vec<Post> {
    tokio::time::timeout(STREAM_TIMEOUT, stream.next())
        .await
        .expect("timed out waiting for the mural")
        .expect("mural stream ended")
}

/// Reads emissions until one satisfies `predicate`.
pub async fn snapshot_where<F>(stream: &mut BoxStream<'static, Vec<Post>>, predicate: F) -> Vec<Post>
where
    F: Fn(&[Post]) -> bool,
{
    loop {
        let posts = next_snapshot(stream).await;
        if predicate(&posts) {
            return posts;
        }
    }
}

pub async fn first_snapshot(store: &PostStore) -> Vec<Post> {
    let mut stream = store.stream();
    next_snapshot(&mut stream).await
}
