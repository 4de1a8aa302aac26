use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use uuid::Uuid;

/// Kept through every sweep so the directory survives in version control
pub const PLACEHOLDER: &str = ".gitkeep";
pub const RASTER_PREFIX: &str = "satellite_";
pub const RASTER_EXTENSION: &str = ".tif";
/// Raw detection output, overwritten by every detection
pub const RESULT_FILE: &str = "building_regularized.geojson";
pub const CLEAN_EXPORT_FILE: &str = "building_detection_clean.geojson";
pub const OSM_EXPORT_FILE: &str = "buildings_for_osm.geojson";

/// Temporary files live next to their target until renamed into place
const PARTIAL_PREFIX: &str = ".partial-";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file in the upload directory as seen by a listing
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub name: String,
    pub created: SystemTime,
}

/// The flat upload directory shared by every request.
///
/// Writes go through a `.partial-*` sibling that is renamed into place, so
/// readers only ever see complete files and the sweeps leave in-flight
/// writes alone.
pub struct StorageService {
    root: PathBuf,
}

impl StorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn raster_name(image_id: &Uuid) -> String {
        format!("{}{}{}", RASTER_PREFIX, image_id, RASTER_EXTENSION)
    }

    /// Creates the directory and the placeholder if either is missing
    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let placeholder = self.path_for(PLACEHOLDER);
        if !tokio::fs::try_exists(&placeholder).await? {
            tokio::fs::write(&placeholder, b"").await?;
        }
        Ok(())
    }

    /// Writes `data` under `name`, replacing any previous file atomically
    pub async fn write_atomic(
        &self,
        name: &str,
        data: impl Into<Bytes>,
    ) -> Result<PathBuf, StorageError> {
        let data: Bytes = data.into();
        let dir = self.root.clone();
        let target = self.path_for(name);
        let persisted = target.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::Builder::new()
                .prefix(PARTIAL_PREFIX)
                .tempfile_in(&dir)?;
            tmp.write_all(&data)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&persisted).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;

        tracing::debug!("Stored {}", target.display());
        Ok(target)
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(self.path_for(name)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.path_for(name)).await?)
    }

    /// Lists complete regular files, skipping in-flight partial writes
    pub async fn list(&self) -> Result<Vec<StoredFile>, StorageError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(PARTIAL_PREFIX) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                // Removed between the listing and the stat
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }
            let created = metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push(StoredFile {
                name,
                created,
            });
        }

        Ok(files)
    }

    /// Name of the raster with the newest creation time, if any
    pub async fn latest_raster(&self) -> Result<Option<String>, StorageError> {
        let mut rasters: Vec<StoredFile> = self
            .list()
            .await?
            .into_iter()
            .filter(|f| f.name.starts_with(RASTER_PREFIX))
            .collect();

        rasters.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(rasters.into_iter().next().map(|f| f.name))
    }

    /// Name of the raster for an explicit image id, if it is still stored
    pub async fn raster_for(&self, image_id: &Uuid) -> Result<Option<String>, StorageError> {
        let name = Self::raster_name(image_id);
        if self.exists(&name).await? {
            Ok(Some(name))
        } else {
            Ok(None)
        }
    }

    /// Removes every complete file except the placeholder. Returns the number
    /// of files removed.
    pub async fn sweep(&self) -> Result<usize, StorageError> {
        let mut removed = 0;
        for file in self.list().await? {
            if file.name == PLACEHOLDER {
                continue;
            }
            if self.remove_quietly(&file.name).await? {
                removed += 1;
            }
        }
        self.init().await?;
        Ok(removed)
    }

    /// Removes files, including abandoned partial writes, whose modification
    /// time is older than `ttl`. The placeholder is always kept.
    pub async fn expire_older_than(&self, ttl: Duration) -> Result<usize, StorageError> {
        let cutoff = SystemTime::now()
            .checked_sub(ttl)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == PLACEHOLDER {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if modified < cutoff && self.remove_quietly(&name).await? {
                tracing::info!("Expired stored file: {}", name);
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn remove_quietly(&self, name: &str) -> Result<bool, StorageError> {
        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
