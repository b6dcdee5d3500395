//! Output directory layout for checkpoints and locally stored assets.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::constants::{CATALOG_FILE, RESUME_STATE_FILE};

#[derive(Debug, Error)]
pub enum PathError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("output location `{path}` exists and is not a directory")]
    NotADirectory { path: PathBuf },
}

/// Paths rooted at the run's output directory. The directory holds the resume
/// cursor and the working catalog, plus the assets when storing locally.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    base_dir: PathBuf,
}

impl OutputPaths {
    /// Construct paths rooted under the provided directory, ensuring it exists.
    pub fn new<P: AsRef<Path>>(base: P) -> Result<Self, PathError> {
        let base = base.as_ref().to_path_buf();
        if base.exists() && !base.is_dir() {
            return Err(PathError::NotADirectory { path: base });
        }
        ensure_dir(&base)?;
        Ok(Self { base_dir: base })
    }

    /// Construct paths without touching the filesystem.
    pub fn unchecked<P: AsRef<Path>>(base: P) -> Self {
        Self {
            base_dir: base.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resume cursor file (`.../.resume_state`).
    pub fn cursor_path(&self) -> PathBuf {
        self.base_dir.join(RESUME_STATE_FILE)
    }

    /// Working and final catalog (`.../icon_map.json`).
    pub fn catalog_path(&self) -> PathBuf {
        self.base_dir.join(CATALOG_FILE)
    }

    /// Location of a stored asset or any other named object.
    pub fn object_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }
}

pub(crate) fn ensure_dir(path: &Path) -> Result<PathBuf, PathError> {
    if let Err(err) = fs::create_dir_all(path) {
        if err.kind() != io::ErrorKind::AlreadyExists {
            return Err(PathError::CreateDir {
                path: path.to_path_buf(),
                source: err,
            });
        }
    }
    Ok(path.to_path_buf())
}
