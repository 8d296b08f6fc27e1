use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use crate::domain::post::PhotoFile;

/// Predefined PNG stickers offered instead of a photo, one file per sticker.
#[derive(Debug, Clone)]
pub struct StickerShelf {
    dir: PathBuf,
}

impl StickerShelf {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Sticker names, sorted. A missing directory means no stickers.
    pub fn names(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("cannot read {}", self.dir.display()))
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "png"))
            .filter_map(|path| path.file_stem().and_then(|stem| stem.to_str()).map(String::from))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn load(&self, name: &str) -> Result<PhotoFile> {
        if !self.names()?.iter().any(|known| known == name) {
            return Err(anyhow!("unknown sticker: {}", name));
        }

        let file_name = format!("{}.png", name);
        let bytes = std::fs::read(self.dir.join(&file_name))
            .with_context(|| format!("cannot read sticker {}", name))?;
        Ok(PhotoFile::new(file_name, bytes).with_content_type("image/png"))
    }
}
