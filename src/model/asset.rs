//! Locating the model file on local storage.

use std::path::{Path, PathBuf};

use crate::config::DigestSettings;
use crate::{Error, Result};

/// A model file identified by name and extension, searched across
/// directories in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAsset {
    name: String,
    extension: String,
    search_dirs: Vec<PathBuf>,
}

impl ModelAsset {
    pub fn new(name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            search_dirs: Vec::new(),
        }
    }

    pub fn from_settings(settings: &DigestSettings) -> Self {
        Self::new(&settings.model_name, &settings.model_extension)
            .search_dirs(settings.search_dirs.iter().cloned())
    }

    /// An asset at an exact path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::new(name, extension).search_dir(dir)
    }

    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    pub fn search_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_dirs.extend(dirs);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.extension)
        }
    }

    /// First existing file across the search directories.
    pub fn resolve(&self) -> Result<PathBuf> {
        let file_name = self.file_name();
        for dir in &self.search_dirs {
            let candidate = dir.join(&file_name);
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "model asset found");
                return Ok(candidate);
            }
        }
        Err(Error::load_failed(format!(
            "model asset {} not found in {} search director{}",
            file_name,
            self.search_dirs.len(),
            if self.search_dirs.len() == 1 { "y" } else { "ies" }
        )))
    }
}
