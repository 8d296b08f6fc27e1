//! Local Store Tests
//!
//! Covers persistence of the local mural across restarts and how damaged
//! local data is handled.

mod common;

use common::{first_snapshot, next_snapshot, Harness, PNG_BYTES};
use mural::app::local::LOCAL_POSTS_KEY;
use mural::domain::post::{NewPost, PhotoFile};
use mural::infra::kv::{FileKeyValue, KeyValueStore};

#[tokio::test]
async fn local_posts_survive_a_restart() {
    let h = Harness::new();
    h.force_local().await;
    let photo = PhotoFile::new("img.png", PNG_BYTES.to_vec());
    h.store
        .create(&NewPost::new("Ana", "Gracias!"), Some(&photo))
        .await
        .unwrap();
    h.store
        .create(&NewPost::new("Luis", "Thanks!"), None)
        .await
        .unwrap();
    let before = first_snapshot(&h.store).await;

    let restarted = h.restart();
    restarted.force_local().await;
    let after = first_snapshot(&restarted.store).await;

    assert_eq!(after, before);
    assert_eq!(after[0].name, "Luis");
    assert_eq!(after[0].photo_url, None);
    assert!(after[1].photo_url.as_deref().unwrap().starts_with("data:"));
    assert_eq!(after[1].photo_path, None);
}

#[tokio::test]
async fn partial_records_load_with_defaults() {
    let h = Harness::new();
    h.kv
        .set(
            LOCAL_POSTS_KEY,
            r#"[{"id":"local-1-abcdef","name":"Ana"},{"message":"sin nombre"}]"#,
        )
        .unwrap();

    let restarted = h.restart();
    restarted.force_local().await;
    let posts = first_snapshot(&restarted.store).await;

    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].id, "local-1-abcdef");
    assert_eq!(posts[0].message, "");
    assert_eq!(posts[1].id, "");
    assert_eq!(posts[1].name, "");
    assert_eq!(posts[1].message, "sin nombre");
}

#[tokio::test]
async fn browser_format_posts_are_kept() {
    let h = Harness::new();
    h.kv
        .set(
            LOCAL_POSTS_KEY,
            r#"[{"id":"local-1700000000000-abcdef","name":"Ana","country":"MX","message":"Gracias!","photoUrl":"data:image/png;base64,iVBORw0KGgo=","photoPath":null,"createdAt":1700000000000},{"id":7,"name":"Luis","message":"Thanks!","createdAt":{"seconds":1}}]"#,
        )
        .unwrap();

    let restarted = h.restart();
    restarted.force_local().await;
    let posts = first_snapshot(&restarted.store).await;

    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].name, "Ana");
    assert_eq!(posts[0].created_at.unix_timestamp(), 1_700_000_000);
    assert!(posts[0].photo_url.as_deref().unwrap().starts_with("data:image/png"));
    assert_eq!(posts[0].photo_path, None);
    assert_eq!(posts[1].id, "7");
    assert_eq!(posts[1].name, "Luis");
    assert_eq!(posts[1].created_at, time::OffsetDateTime::UNIX_EPOCH);
}

#[tokio::test]
async fn corrupt_local_data_starts_empty() {
    let h = Harness::new();
    h.kv.set(LOCAL_POSTS_KEY, "{{{ not json").unwrap();

    let restarted = h.restart();
    restarted.force_local().await;

    assert!(first_snapshot(&restarted.store).await.is_empty());
}

#[tokio::test]
async fn local_delete_is_idempotent_and_persisted() {
    let h = Harness::new();
    h.force_local().await;
    let keep = h
        .store
        .create(&NewPost::new("Ana", "Gracias!"), None)
        .await
        .unwrap();
    let gone = h
        .store
        .create(&NewPost::new("Luis", "Thanks!"), None)
        .await
        .unwrap();

    let mut mural = h.store.stream();
    assert_eq!(next_snapshot(&mut mural).await.len(), 2);

    h.store.delete_by_id(&gone.id, None).await.unwrap();
    assert_eq!(next_snapshot(&mut mural).await, vec![keep.clone()]);
    h.store.delete_by_id(&gone.id, None).await.unwrap();

    let persisted = h.kv.get(LOCAL_POSTS_KEY).unwrap().unwrap();
    assert!(persisted.contains(&keep.id));
    assert!(!persisted.contains(&gone.id));
}

#[test]
fn file_store_keeps_the_blob_between_instances() {
    let dir = tempfile::tempdir().unwrap();
    let first = FileKeyValue::open(dir.path()).unwrap();
    first.set(LOCAL_POSTS_KEY, r#"[{"id":"local-1-abcdef"}]"#).unwrap();

    let second = FileKeyValue::open(dir.path()).unwrap();
    assert_eq!(
        second.get(LOCAL_POSTS_KEY).unwrap().as_deref(),
        Some(r#"[{"id":"local-1-abcdef"}]"#)
    );
}
