use std::path::{Path, PathBuf};

use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    persist,
};

/// Framebuffer size and slot counts, fixed for the lifetime of an engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub width: usize,
    pub height: usize,
    pub layers: usize,
    pub sprites: usize,
    pub animations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 400,
            height: 240,
            layers: 4,
            sprites: 64,
            animations: 16,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::WrongSize(format!(
                "framebuffer {}x{}",
                self.width, self.height
            )));
        }
        if self.sprites > u16::MAX as usize {
            return Err(Error::WrongSize(format!("{} sprites", self.sprites)));
        }
        Ok(())
    }
}

/// Per-user tool settings.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct GlobalConfig {
    #[serde(skip_serializing, skip_deserializing)]
    pub modified: bool,
    pub project_dir: Option<PathBuf>,
    /// Base directory for relative resource paths.
    pub load_path: Option<PathBuf>,
}

pub fn get_global_config_path() -> anyhow::Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("", "", "RetroRaster")
        .context("Unable to open global config directory.")?;
    Ok(project_dirs.config_dir().join("config.json"))
}

impl GlobalConfig {
    /// Loads the config at `path`, falling back to defaults when it does not exist yet.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match persist::load_json(path) {
            Ok(config) => Ok(config),
            Err(Error::FileNotFound(_)) => {
                info!("No global config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).context("Unable to load global config"),
        }
    }

    pub fn save(&mut self, path: &Path) -> anyhow::Result<()> {
        if self.modified {
            persist::save_json(path, self).context("Unable to save global config")?;
            self.modified = false;
        }
        Ok(())
    }

    pub fn set_project_dir(&mut self, dir: PathBuf) {
        self.project_dir = Some(dir);
        self.modified = true;
    }

    /// Resolves `path` against the load path unless it is absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.load_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"layers": 2}"#).unwrap();
        assert_eq!(config.width, 400);
        assert_eq!(config.height, 240);
        assert_eq!(config.layers, 2);
        assert!(config.validate().is_ok());

        let zero = EngineConfig {
            width: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_global_config_saved_only_when_modified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = GlobalConfig::load(&path).unwrap();
        config.save(&path).unwrap();
        assert!(!path.exists());

        config.set_project_dir(dir.path().to_path_buf());
        config.save(&path).unwrap();
        assert!(!config.modified);

        let loaded = GlobalConfig::load(&path).unwrap();
        assert_eq!(loaded.project_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_resolve_relative_paths() {
        let config = GlobalConfig {
            load_path: Some(PathBuf::from("/assets")),
            ..Default::default()
        };
        assert_eq!(config.resolve(Path::new("a.png")), PathBuf::from("/assets/a.png"));
        assert_eq!(config.resolve(Path::new("/b.png")), PathBuf::from("/b.png"));
    }
}
