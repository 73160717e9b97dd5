use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{RetrievalCache, RetrievedDocument};
use crate::error::{CoreError, CoreResult};
use crate::util::{sha256_hex, write_json_pretty};

/// One JSON file per query under `dir`, named by the SHA-256 of the query.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sha256_hex(key)))
    }
}

impl RetrievalCache for FileCache {
    fn get(&self, key: &str) -> CoreResult<Option<Vec<RetrievedDocument>>> {
        let path = self.entry_path(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(CoreError::Backend(format!(
                    "failed to read cache entry {}: {err}",
                    path.display()
                )));
            }
        };

        let documents = serde_json::from_slice(&raw).map_err(|err| {
            CoreError::Backend(format!(
                "failed to parse cache entry {}: {err}",
                path.display()
            ))
        })?;
        Ok(Some(documents))
    }

    fn put(&mut self, key: &str, documents: &[RetrievedDocument]) -> CoreResult<()> {
        let path = self.entry_path(key);
        write_json_pretty(&path, &documents)
            .map_err(|err| CoreError::Backend(format!("{err:#}")))
    }
}
