use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::app::photos;
use crate::domain::post::{NewPost, PhotoFile, Post, StoredPost};
use crate::infra::kv::KeyValueStore;

pub const LOCAL_POSTS_KEY: &str = "gratitude-mural-posts";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 6;

/// The local fallback store: an in-memory list mirrored to a key-value blob.
///
/// Every mutation replaces the whole list in one step and then rewrites the
/// blob, newest post first.
pub struct LocalBackend {
    kv: Arc<dyn KeyValueStore>,
    posts: watch::Sender<Vec<Post>>,
}

impl LocalBackend {
    pub fn load(kv: Arc<dyn KeyValueStore>) -> Self {
        let posts = load_posts(kv.as_ref());
        let (posts, _) = watch::channel(posts);
        Self { kv, posts }
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Post>> {
        self.posts.subscribe()
    }

    pub fn create(&self, input: &NewPost, file: Option<&PhotoFile>) -> Post {
        let now = OffsetDateTime::now_utc();
        let post = Post {
            id: local_id(now),
            name: input.name.clone(),
            message: input.message.clone(),
            photo_url: file.map(photos::to_data_url),
            photo_path: None,
            created_at: now,
        };

        let entry = post.clone();
        self.posts.send_modify(move |posts| posts.insert(0, entry));
        self.persist();
        tracing::info!(post_id = %post.id, "post saved locally");
        post
    }

    pub fn remove(&self, id: &str) {
        self.posts.send_modify(|posts| posts.retain(|post| post.id != id));
        self.persist();
        tracing::info!(post_id = %id, "post removed locally");
    }

    pub fn clear(&self) {
        self.posts.send_modify(|posts| posts.clear());
        self.persist();
        tracing::info!("local mural cleared");
    }

    fn persist(&self) {
        let posts = self.posts.borrow().clone();
        let serialized = match serde_json::to_string(&posts) {
            Ok(serialized) => serialized,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize local mural");
                return;
            }
        };

        if let Err(err) = self.kv.set(LOCAL_POSTS_KEY, &serialized) {
            tracing::warn!(error = ?err, "failed to persist local mural");
        }
    }
}

fn load_posts(kv: &dyn KeyValueStore) -> Vec<Post> {
    let raw = match kv.get(LOCAL_POSTS_KEY) {
        Ok(Some(raw)) if !raw.trim().is_empty() => raw,
        Ok(_) => return Vec::new(),
        Err(err) => {
            tracing::warn!(error = ?err, "failed to read local mural");
            return Vec::new();
        }
    };

    let items = match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            tracing::warn!("local mural is not a list, starting empty");
            return Vec::new();
        }
        Err(err) => {
            tracing::warn!(error = %err, "local mural is corrupt, starting empty");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<StoredPost>(item).ok())
        .map(StoredPost::with_defaults)
        .collect()
}

fn local_id(now: OffsetDateTime) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("local-{}-{}", now.unix_timestamp_nanos() / 1_000_000, suffix)
}
