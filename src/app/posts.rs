use futures::future::join_all;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;

use crate::app::fallback;
use crate::app::local::LocalBackend;
use crate::app::remote::RemoteBackend;
use crate::domain::post::{NewPost, PhotoFile, Post};
use crate::error::{BackendError, CreateError, DeleteError};
use crate::infra::kv::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Remote,
    Local,
}

/// Owns the mural's posts across the remote backend and the local fallback.
///
/// The store starts in [`Mode::Remote`]. The first permission or availability
/// failure moves it to [`Mode::Local`] for the rest of the process; the remote
/// backend is never tried again after that.
#[derive(Clone)]
pub struct PostStore {
    inner: Arc<Inner>,
}

struct Inner {
    remote: RemoteBackend,
    local: LocalBackend,
    mode: watch::Sender<Mode>,
}

impl PostStore {
    pub fn new(remote: RemoteBackend, kv: Arc<dyn KeyValueStore>) -> Self {
        let (mode, _) = watch::channel(Mode::Remote);
        Self {
            inner: Arc::new(Inner {
                remote,
                local: LocalBackend::load(kv),
                mode,
            }),
        }
    }

    pub fn mode(&self) -> Mode {
        *self.inner.mode.borrow()
    }

    pub async fn create(&self, input: &NewPost, file: Option<&PhotoFile>) -> Result<Post, CreateError> {
        if self.mode() == Mode::Local {
            return Ok(self.inner.local.create(input, file));
        }

        match self.inner.remote.create(input, file).await {
            Ok(post) => {
                tracing::info!(post_id = %post.id, "post saved");
                Ok(post)
            }
            Err(err) if fallback::is_eligible(&err) => {
                tracing::warn!(error = %err, "could not create post remotely, continuing locally");
                self.activate_local_fallback(&err);
                Ok(self.inner.local.create(input, file))
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to create post");
                Err(err.into())
            }
        }
    }

    /// Live view of the mural, newest first. Never ends on its own.
    ///
    /// A remote subscription moves over to the local list as soon as the store
    /// falls back, whichever operation caused it.
    pub fn stream(&self) -> BoxStream<'static, Vec<Post>> {
        let mut mode = self.inner.mode.subscribe();
        let current = *mode.borrow_and_update();
        let phase = match current {
            Mode::Local => Phase::local(&self.inner.local),
            Mode::Remote => Phase::Remote {
                updates: self.inner.remote.watch(),
                mode,
            },
        };

        stream::unfold((phase, self.clone()), |(mut phase, store)| async move {
            loop {
                match phase {
                    Phase::Remote { mut updates, mut mode } => {
                        let update = tokio::select! {
                            update = updates.next() => Some(update),
                            _ = mode.changed() => None,
                        };

                        match update {
                            Some(Some(Ok(posts))) => {
                                return Some((posts, (Phase::Remote { updates, mode }, store)));
                            }
                            Some(Some(Err(err))) => store.activate_local_fallback(&err),
                            Some(None) => {
                                store.activate_local_fallback(&BackendError::unavailable("live query ended"))
                            }
                            None => {}
                        }
                        phase = Phase::local(&store.inner.local);
                    }
                    Phase::Local { mut posts, first } => {
                        if !first && posts.changed().await.is_err() {
                            return None;
                        }
                        let current = posts.borrow_and_update().clone();
                        return Some((current, (Phase::Local { posts, first: false }, store)));
                    }
                }
            }
        })
        .boxed()
    }

    pub async fn delete_by_id(&self, id: &str, photo_path: Option<&str>) -> Result<(), DeleteError> {
        if self.mode() == Mode::Local {
            self.inner.local.remove(id);
            return Ok(());
        }

        match self.inner.remote.delete(id, photo_path).await {
            Ok(()) => {
                tracing::info!(post_id = %id, "post deleted");
                Ok(())
            }
            Err(err) if fallback::is_eligible(&err) => {
                tracing::warn!(post_id = %id, error = %err, "permission error while deleting, continuing locally");
                self.activate_local_fallback(&err);
                self.inner.local.remove(id);
                Ok(())
            }
            Err(err) => {
                tracing::error!(post_id = %id, error = %err, "failed to delete post");
                Err(err.into())
            }
        }
    }

    /// Clears the mural. Remote deletes run concurrently; one failing does not
    /// stop the rest, and the first non-recoverable failure is returned once
    /// all of them have finished.
    pub async fn delete_all(&self) -> Result<(), DeleteError> {
        if self.mode() == Mode::Local {
            self.inner.local.clear();
            return Ok(());
        }

        let posts = match self.inner.remote.list().await {
            Ok(posts) => posts,
            Err(err) if fallback::is_eligible(&err) => {
                tracing::warn!(error = %err, "could not list posts remotely, clearing locally");
                self.activate_local_fallback(&err);
                self.inner.local.clear();
                return Ok(());
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to list posts for clearing");
                return Err(err.into());
            }
        };

        let count = posts.len();
        let deletes = posts
            .iter()
            .map(|post| self.delete_by_id(&post.id, post.photo_path.as_deref()));
        let outcome = join_all(deletes).await.into_iter().collect::<Result<Vec<()>, _>>();

        // A branch may have flipped the store; the local list then holds posts
        // from earlier sessions that the fan-out never saw.
        if self.mode() == Mode::Local {
            self.inner.local.clear();
        }
        outcome?;

        tracing::info!(count, "mural cleared");
        Ok(())
    }

    fn activate_local_fallback(&self, err: &BackendError) {
        let activated = self.inner.mode.send_if_modified(|mode| {
            if *mode == Mode::Local {
                return false;
            }
            *mode = Mode::Local;
            true
        });

        if activated {
            tracing::warn!(
                error = %err,
                "switching the mural to local mode, posts are only kept on this machine"
            );
        }
    }
}

enum Phase {
    Remote {
        updates: BoxStream<'static, Result<Vec<Post>, BackendError>>,
        mode: watch::Receiver<Mode>,
    },
    Local {
        posts: watch::Receiver<Vec<Post>>,
        first: bool,
    },
}

impl Phase {
    fn local(local: &LocalBackend) -> Self {
        Phase::Local {
            posts: local.subscribe(),
            first: true,
        }
    }
}
