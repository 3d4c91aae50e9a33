use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::config::StagingConfig;

/// Copies bundled assets into a cache directory the runtime can open by path.
///
/// Absolute paths are taken as already staged. Relative paths resolve against the asset
/// root and land in the cache under the same relative path; an existing cached copy is
/// reused.
#[derive(Debug, Clone, Default)]
pub struct AssetStager {
    asset_root: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
}

impl AssetStager {
    pub fn new(asset_root: Option<PathBuf>, cache_dir: Option<PathBuf>) -> Self {
        Self {
            asset_root,
            cache_dir,
        }
    }

    pub fn from_config(config: &StagingConfig) -> Self {
        Self::new(config.asset_root.clone(), config.cache_dir.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.cache_dir.is_some()
    }

    /// Path the runtime should open for `path`
    pub fn stage(&self, path: &Path) -> Result<PathBuf> {
        let cache_dir = match &self.cache_dir {
            Some(dir) if path.is_relative() => dir,
            _ => return Ok(path.to_path_buf()),
        };

        if path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("asset path {} leaves the asset root", path.display());
        }
        let file_name = path
            .file_name()
            .with_context(|| format!("asset path {} has no file name", path.display()))?;

        let cached = cache_dir.join(path);
        if cached.is_file() {
            debug!("Using cached asset {}", cached.display());
            return Ok(cached);
        }

        let source = match &self.asset_root {
            Some(root) => root.join(path),
            None => path.to_path_buf(),
        };

        let parent = cached.parent().unwrap_or(cache_dir.as_path());
        fs::create_dir_all(parent)
            .with_context(|| format!("creating cache directory {}", parent.display()))?;

        // a cut-short copy must never sit at the cached path
        let mut partial_name = file_name.to_os_string();
        partial_name.push(".partial");
        let partial = parent.join(partial_name);
        let bytes = match fs::copy(&source, &partial) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e).with_context(|| {
                    format!("copying {} to {}", source.display(), partial.display())
                });
            }
        };
        fs::rename(&partial, &cached).with_context(|| {
            format!("moving {} into place at {}", partial.display(), cached.display())
        })?;

        info!("Staged {} ({} bytes) at {}", source.display(), bytes, cached.display());
        Ok(cached)
    }
}
