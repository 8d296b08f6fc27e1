use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::postgres::{PgListener, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::app::remote::{DocumentCollection, PostRecord};
use crate::domain::post::StoredPost;
use crate::error::{BackendError, ErrorCode};
use crate::infra::db::Db;

pub const POSTS_CHANNEL: &str = "posts_changed";

const SELECT_POSTS: &str = "SELECT id::text AS id, name, message, photo_url, photo_path, created_at \
                            FROM posts \
                            ORDER BY created_at DESC, id DESC";

/// The `posts` table. Live updates come from the `posts_changed`
/// notification raised by the table trigger; each one triggers a full re-read.
#[derive(Clone)]
pub struct PgPostCollection {
    db: Db,
}

impl PgPostCollection {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentCollection for PgPostCollection {
    async fn insert(&self, record: PostRecord) -> Result<StoredPost, BackendError> {
        let row = sqlx::query(
            "INSERT INTO posts (name, message, photo_url, photo_path) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id::text AS id, name, message, photo_url, photo_path, created_at",
        )
        .bind(record.name)
        .bind(record.message)
        .bind(record.photo_url)
        .bind(record.photo_path)
        .fetch_one(self.db.pool())
        .await
        .map_err(map_db_error)?;

        stored_post(&row)
    }

    async fn list(&self) -> Result<Vec<StoredPost>, BackendError> {
        fetch_posts(self.db.pool()).await
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        // Local ids and other non-UUID ids cannot exist remotely.
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(());
        };

        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    fn watch(&self) -> BoxStream<'static, Result<Vec<StoredPost>, BackendError>> {
        stream::unfold(WatchState::Start(self.db.pool().clone()), |state| async move {
            match state {
                WatchState::Start(pool) => {
                    // Listen before the first read so no change slips in between.
                    let listener = match listen(&pool).await {
                        Ok(listener) => listener,
                        Err(err) => return Some((Err(err), WatchState::Done)),
                    };
                    match fetch_posts(&pool).await {
                        Ok(posts) => Some((Ok(posts), WatchState::Listening(pool, listener))),
                        Err(err) => Some((Err(err), WatchState::Done)),
                    }
                }
                WatchState::Listening(pool, mut listener) => {
                    if let Err(err) = listener.recv().await {
                        return Some((Err(map_db_error(err)), WatchState::Done));
                    }
                    match fetch_posts(&pool).await {
                        Ok(posts) => Some((Ok(posts), WatchState::Listening(pool, listener))),
                        Err(err) => Some((Err(err), WatchState::Done)),
                    }
                }
                WatchState::Done => None,
            }
        })
        .boxed()
    }
}

enum WatchState {
    Start(PgPool),
    Listening(PgPool, PgListener),
    Done,
}

async fn listen(pool: &PgPool) -> Result<PgListener, BackendError> {
    let mut listener = PgListener::connect_with(pool).await.map_err(map_db_error)?;
    listener.listen(POSTS_CHANNEL).await.map_err(map_db_error)?;
    Ok(listener)
}

async fn fetch_posts(pool: &PgPool) -> Result<Vec<StoredPost>, BackendError> {
    let rows = sqlx::query(SELECT_POSTS)
        .fetch_all(pool)
        .await
        .map_err(map_db_error)?;

    rows.iter().map(stored_post).collect()
}

fn stored_post(row: &PgRow) -> Result<StoredPost, BackendError> {
    Ok(StoredPost {
        id: row.try_get("id").map_err(map_db_error)?,
        name: row.try_get("name").map_err(map_db_error)?,
        message: row.try_get("message").map_err(map_db_error)?,
        photo_url: row.try_get("photo_url").map_err(map_db_error)?,
        photo_path: row.try_get("photo_path").map_err(map_db_error)?,
        created_at: row.try_get("created_at").map_err(map_db_error)?,
    })
}

/// Maps Postgres failures onto the shared error codes.
///
/// Privilege (`42501`) and authentication (class `28`) failures, a missing
/// table (`42P01`) and a server that refuses work (`55000`, `57P03`) are the
/// cases the store can recover from by going local.
pub fn map_db_error(err: sqlx::Error) -> BackendError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let sqlstate = db_err.code().map(|code| code.into_owned()).unwrap_or_default();
            BackendError::new(sqlstate_code(&sqlstate), db_err.message())
        }
        sqlx::Error::RowNotFound => BackendError::not_found(err.to_string()),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => BackendError::unavailable(err.to_string()),
        _ => BackendError::internal(err.to_string()),
    }
}

fn sqlstate_code(sqlstate: &str) -> ErrorCode {
    match sqlstate {
        "42501" => ErrorCode::PermissionDenied,
        "42P01" | "55000" | "57P03" => ErrorCode::FailedPrecondition,
        code if code.starts_with("28") => ErrorCode::Unauthenticated,
        _ => ErrorCode::Internal,
    }
}
