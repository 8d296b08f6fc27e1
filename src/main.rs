use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mural::app::validation::validate_submission;
use mural::config::AppConfig;
use mural::domain::post::{NewPost, PhotoFile, Post};
use mural::AppState;

#[derive(Parser)]
#[command(name = "mural", about = "Community gratitude wall")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the posts table and its change trigger.
    Migrate,
    /// Publish a message with a photo or a sticker.
    Post {
        #[arg(long)]
        name: String,
        #[arg(long)]
        message: String,
        #[arg(long, conflicts_with = "sticker")]
        photo: Option<PathBuf>,
        #[arg(long)]
        sticker: Option<String>,
    },
    /// Print the mural once.
    List,
    /// Print the mural every time it changes.
    Watch,
    /// Delete one post (admin).
    Delete {
        id: String,
        #[arg(long, env = "MURAL_ADMIN_CODE")]
        admin_code: String,
        /// Storage key of the photo; looked up from the mural when omitted.
        #[arg(long)]
        photo_path: Option<String>,
    },
    /// Delete every post (admin).
    Clear {
        #[arg(long, env = "MURAL_ADMIN_CODE")]
        admin_code: String,
    },
    /// List the available stickers.
    Stickers,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let state = AppState::build(&config).await?;

    match cli.command {
        Command::Migrate => {
            state.db.migrate().await?;
            tracing::info!("posts schema is up to date");
        }
        Command::Post {
            name,
            message,
            photo,
            sticker,
        } => {
            let file = match (photo, sticker) {
                (Some(path), _) => Some(read_photo(&path)?),
                (None, Some(sticker)) => Some(state.stickers.load(&sticker)?),
                (None, None) => None,
            };
            let input = validate_submission(&NewPost::new(name, message), file.is_some())?;

            let post = state.store.create(&input, file.as_ref()).await?;
            println!("published {}", post.id);
        }
        Command::List => {
            let posts = first_snapshot(&state).await?;
            print_mural(&posts);
        }
        Command::Watch => {
            let mut mural = state.store.stream();
            let shutdown = shutdown_signal();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    posts = mural.next() => match posts {
                        Some(posts) => print_mural(&posts),
                        None => break,
                    },
                    _ = &mut shutdown => break,
                }
            }
        }
        Command::Delete {
            id,
            admin_code,
            photo_path,
        } => {
            unlock(&state, &admin_code)?;
            let photo_path = match photo_path {
                Some(path) => Some(path),
                None => first_snapshot(&state)
                    .await?
                    .into_iter()
                    .find(|post| post.id == id)
                    .and_then(|post| post.photo_path),
            };
            state.store.delete_by_id(&id, photo_path.as_deref()).await?;
            println!("deleted {}", id);
        }
        Command::Clear { admin_code } => {
            unlock(&state, &admin_code)?;
            state.store.delete_all().await?;
            println!("mural cleared");
        }
        Command::Stickers => {
            for name in state.stickers.names()? {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

fn unlock(state: &AppState, admin_code: &str) -> Result<()> {
    if state.admin.unlock(admin_code) {
        tracing::info!("admin mode unlocked");
        Ok(())
    } else {
        Err(anyhow!("incorrect admin code"))
    }
}

fn read_photo(path: &Path) -> Result<PhotoFile> {
    let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("photo")
        .to_string();
    Ok(PhotoFile::new(file_name, bytes))
}

async fn first_snapshot(state: &AppState) -> Result<Vec<Post>> {
    state
        .store
        .stream()
        .next()
        .await
        .ok_or_else(|| anyhow!("mural stream closed"))
}

fn print_mural(posts: &[Post]) {
    println!("{} post(s)", posts.len());
    for post in posts {
        let created_at = post
            .created_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "-".to_string());
        let photo = match (&post.photo_path, &post.photo_url) {
            (Some(path), _) => path.as_str(),
            (None, Some(url)) if url.starts_with("data:") => "inline photo",
            (None, Some(url)) if !url.is_empty() => url.as_str(),
            _ => "no photo",
        };
        println!("{}  {}  {}: {}  [{}]", created_at, post.id, post.name, post.message, photo);
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
