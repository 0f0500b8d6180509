use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use genimg_contracts::config::LocalStorage;
use genimg_contracts::tools::{LIST_LIMIT_MAX, LIST_LIMIT_MIN};
use image::ImageFormat;

use crate::delivery::ImageStore;
use crate::error::DeliveryError;

const LISTED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];

/// Filesystem-backed image store rooted at the configured output directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    storage: LocalStorage,
}

impl LocalStore {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    pub fn is_ready(&self) -> bool {
        self.storage.ready_dir().is_some()
    }

    fn dir(&self) -> Result<&Path, DeliveryError> {
        match &self.storage {
            LocalStorage::Ready(dir) => Ok(dir.as_path()),
            LocalStorage::Unavailable { dir, reason } => Err(DeliveryError::Configuration(format!(
                "local output directory {} could not be created: {reason}",
                dir.display()
            ))),
            LocalStorage::Disabled => Err(DeliveryError::Configuration(
                "local storage is disabled".to_string(),
            )),
        }
    }

    /// Decode `bytes`, then write them as PNG to `<dir>/<filename>`,
    /// replacing any existing file.
    pub fn save(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, DeliveryError> {
        let dir = self.dir()?;
        let decoded = image::load_from_memory(bytes).map_err(DeliveryError::Decode)?;
        let mut encoded = Cursor::new(Vec::with_capacity(bytes.len()));
        decoded
            .write_to(&mut encoded, ImageFormat::Png)
            .map_err(DeliveryError::Decode)?;

        let path = dir.join(filename);
        fs::write(&path, encoded.into_inner()).map_err(|source| DeliveryError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "image saved");
        Ok(path)
    }

    /// Image files in the output directory.
    ///
    /// Without a limit every entry is returned, sorted by name. With a limit
    /// (which must lie in `10..=100`) the newest entries come first.
    pub fn list(&self, limit: Option<u32>) -> Result<Vec<PathBuf>> {
        if let Some(limit) = limit {
            if !(LIST_LIMIT_MIN..=LIST_LIMIT_MAX).contains(&limit) {
                bail!("limit must be between {LIST_LIMIT_MIN} and {LIST_LIMIT_MAX}, got {limit}");
            }
        }
        let dir = self.dir()?;

        let mut entries: Vec<(PathBuf, SystemTime)> = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("failed reading {}", dir.display()))? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || !has_listed_extension(&path) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((path, modified));
        }

        match limit {
            Some(limit) => {
                entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                entries.truncate(limit as usize);
            }
            None => entries.sort_by(|a, b| a.0.cmp(&b.0)),
        }
        Ok(entries.into_iter().map(|(path, _)| path).collect())
    }
}

impl ImageStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    fn store(&self, bytes: &[u8], filename: &str) -> Result<String, DeliveryError> {
        self.save(bytes, filename)
            .map(|path| path.to_string_lossy().into_owned())
    }
}

fn has_listed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            LISTED_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
