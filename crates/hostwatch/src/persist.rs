//! Writes the declarative config back to its file after mutations.

use crate::config::{Config, ConfigFormat};
use common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persists a [`Config`] to a bound path. Unbound persisters do nothing.
#[derive(Debug, Clone, Default)]
pub struct ConfigPersister {
    path: Option<PathBuf>,
}

impl ConfigPersister {
    pub fn unbound() -> Self {
        Self { path: None }
    }

    /// Bind to `path`, made absolute against the working directory.
    pub fn bound(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Self { path: Some(path) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Encode by extension, write a sibling temp file and rename it over the
    /// target. A failed rename falls back to overwriting the target.
    pub fn save(&self, config: &Config) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::persistence(format!("unsupported config extension: {}", path.display()))
        })?;
        let contents = config
            .encode(format)
            .map_err(|e| Error::persistence(format!("encode {}: {}", format, e)))?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, &contents)
            .map_err(|e| Error::persistence(format!("write {}: {}", tmp.display(), e)))?;

        if let Err(e) = std::fs::rename(&tmp, path) {
            warn!(path = %path.display(), error = %e, "Rename failed, overwriting config in place");
            let _ = std::fs::remove_file(&tmp);
            std::fs::write(path, &contents)
                .map_err(|e| Error::persistence(format!("write {}: {}", path.display(), e)))?;
        }

        debug!(path = %path.display(), %format, "Persisted monitor config");
        Ok(())
    }
}
