//! Configuration loading with an embedded fallback
//!
//! - If CONFIG_FILE is NOT set: use the embedded halftone.yaml only
//! - If CONFIG_FILE IS set and the file exists: use it
//! - If CONFIG_FILE IS set and the file is missing: fall back to embedded
//!   (and `seed_if_configured` writes the embedded copy there)

use rust_embed::RustEmbed;
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CONFIG_NAME: &str = "halftone.yaml";

/// Embedded default config
#[derive(RustEmbed)]
#[folder = "."]
#[include = "halftone.yaml"]
struct EmbeddedConfig;

/// Report of init (extraction) operations
#[derive(Debug, Default)]
pub struct InitReport {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
}

/// Config loader with optional filesystem override
#[derive(Debug, Clone, Default)]
pub struct AssetLoader {
    /// External config file path (from CONFIG_FILE or --config)
    config_file: Option<PathBuf>,
}

impl AssetLoader {
    /// `config_file` should be `Some` only if a path was given.
    pub fn new(config_file: Option<PathBuf>) -> Self {
        Self { config_file }
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Read the config file
    ///
    /// If an external path is configured and exists, uses that.
    /// Otherwise falls back to embedded config.
    pub fn read_config(&self) -> io::Result<Cow<'static, [u8]>> {
        if let Some(ref path) = self.config_file {
            if path.exists() {
                tracing::trace!(path = %path.display(), "Loading config from filesystem");
                return Ok(Cow::Owned(fs::read(path)?));
            }
            tracing::debug!(path = %path.display(), "Config file missing, using embedded");
        }

        EmbeddedConfig::get(CONFIG_NAME)
            .map(|f| {
                tracing::trace!("Loading config from embedded assets");
                f.data
            })
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Embedded halftone.yaml not found"))
    }

    /// Read config as a UTF-8 string
    pub fn read_config_string(&self) -> io::Result<String> {
        let bytes = self.read_config()?;
        String::from_utf8(bytes.into_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Write the embedded config to a configured path that does not exist yet.
    pub fn seed_if_configured(&self) -> io::Result<bool> {
        let Some(ref path) = self.config_file else {
            return Ok(false);
        };
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        match EmbeddedConfig::get(CONFIG_NAME) {
            Some(data) => {
                fs::write(path, &*data.data)?;
                tracing::info!(path = %path.display(), "Seeded config file with embedded default");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Extract the embedded config (init command)
    ///
    /// Uses the configured path, or `./halftone.yaml`.
    pub fn init(&self, force: bool) -> io::Result<InitReport> {
        let mut report = InitReport::default();
        let path = self
            .config_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_NAME));

        if !force && path.exists() {
            report.skipped.push(path.display().to_string());
            return Ok(report);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Some(data) = EmbeddedConfig::get(CONFIG_NAME) {
            fs::write(&path, &*data.data)?;
            report.written.push(path.display().to_string());
        }
        Ok(report)
    }

    /// List embedded assets (for display)
    pub fn list_embedded() -> Vec<String> {
        EmbeddedConfig::iter().map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_present() {
        assert_eq!(AssetLoader::list_embedded(), vec![CONFIG_NAME.to_string()]);
        let text = AssetLoader::default().read_config_string().unwrap();
        assert!(text.contains("screens:"));
    }

    #[test]
    fn test_external_overrides_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        fs::write(&path, "default_screen: fine\n").unwrap();
        let loader = AssetLoader::new(Some(path));
        assert_eq!(loader.read_config_string().unwrap(), "default_screen: fine\n");
    }

    #[test]
    fn test_missing_external_falls_back_and_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("halftone.yaml");
        let loader = AssetLoader::new(Some(path.clone()));
        let embedded = AssetLoader::default().read_config_string().unwrap();
        assert_eq!(loader.read_config_string().unwrap(), embedded);

        assert!(loader.seed_if_configured().unwrap());
        assert!(path.exists());
        assert!(!loader.seed_if_configured().unwrap());
    }

    #[test]
    fn test_init_skips_existing_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("halftone.yaml");
        fs::write(&path, "x: 1\n").unwrap();
        let loader = AssetLoader::new(Some(path.clone()));

        let report = loader.init(false).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert!(report.written.is_empty());

        let report = loader.init(true).unwrap();
        assert_eq!(report.written.len(), 1);
        assert_ne!(fs::read_to_string(&path).unwrap(), "x: 1\n");
    }
}
