//! Configuration loading utilities
//!
//! Resolves editor settings and the on-disk location of each
//! configuration kind, then loads stores from there.

use crate::kind::ConfigKind;
use crate::reader::{collect_config_files, StoreReader};
use crate::settings::FlagSettings;
use crate::store::ConfigStore;
use crate::{ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings loader
pub struct ConfigLoader {
    /// Path of the settings file
    path: PathBuf,
    /// Whether to use default values when the file is missing
    use_defaults: bool,
    /// Whether environment overrides apply
    use_env: bool,
}

impl ConfigLoader {
    /// Create a loader for a settings file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            use_defaults: true,
            use_env: true,
        }
    }

    /// Create a loader for the system settings file
    pub fn system() -> Self {
        Self::new(paths::settings_file())
    }

    /// Set whether to use defaults for a missing settings file
    pub fn use_defaults(mut self, use_defaults: bool) -> Self {
        self.use_defaults = use_defaults;
        self
    }

    /// Set whether environment variables override the file
    pub fn use_env(mut self, use_env: bool) -> Self {
        self.use_env = use_env;
        self
    }

    /// Load the settings
    pub fn load(&self) -> Result<FlagSettings> {
        let mut settings = if self.path.exists() {
            debug!("Loading settings from {}", self.path.display());
            FlagSettings::load(&self.path)?
        } else if self.use_defaults {
            FlagSettings::default()
        } else {
            return Err(ConfigError::NotFound(self.path.clone()));
        };

        if self.use_env {
            if let Some(root) = config_root_override() {
                debug!("Config root overridden to {}", root.display());
                settings.config_root = root;
            }
        }

        Ok(settings)
    }

    /// Get the settings file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Where a kind's files are read from and where new entries go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    /// Files in read order
    pub sources: Vec<PathBuf>,
    pub default_target: PathBuf,
}

/// Resolve the files backing `kind`.
///
/// A directory contributes its visible files; new entries go to the last
/// of them, or to `default_file` inside it when empty. A plain file is
/// its own single source. When nothing exists the kind is laid out as a
/// directory holding `default_file`.
pub fn locate(settings: &FlagSettings, kind: ConfigKind) -> Result<StoreLocation> {
    let path = settings.kind_path(kind);

    let meta = match std::fs::metadata(&path) {
        Ok(meta) => Some(meta),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(ConfigError::read(&path, e)),
    };

    let location = match meta {
        Some(meta) if meta.is_dir() => {
            let sources = collect_config_files(&path)?;
            let default_target = sources
                .last()
                .cloned()
                .unwrap_or_else(|| path.join(&settings.default_file));
            StoreLocation {
                sources,
                default_target,
            }
        }
        Some(_) => StoreLocation {
            sources: vec![path.clone()],
            default_target: path,
        },
        None => StoreLocation {
            sources: Vec::new(),
            default_target: path.join(&settings.default_file),
        },
    };

    Ok(location)
}

/// Load the store for `kind`
pub fn load_store(settings: &FlagSettings, kind: ConfigKind) -> Result<ConfigStore> {
    let location = locate(settings, kind)?;
    StoreReader::new(kind).read_files(&location.sources, &location.default_target)
}

/// Default configuration paths
pub mod paths {
    use std::path::PathBuf;

    /// System configuration root
    pub fn system_config() -> PathBuf {
        PathBuf::from("/etc/buckos")
    }

    /// Editor settings file
    pub fn settings_file() -> PathBuf {
        system_config().join("flags.toml")
    }
}

/// Environment variable names used by the configuration system
pub mod env_vars {
    /// Configuration root override
    pub const CONFIG_ROOT: &str = "BUCKOS_CONFIG_ROOT";
    /// Portage compatibility variable
    pub const PORTAGE_CONFIGROOT: &str = "PORTAGE_CONFIGROOT";
}

/// Configuration root from the environment, if set
pub fn config_root_override() -> Option<PathBuf> {
    std::env::var(env_vars::CONFIG_ROOT)
        .or_else(|_| std::env::var(env_vars::PORTAGE_CONFIGROOT))
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Load the system settings
pub fn load_system_settings() -> Result<FlagSettings> {
    ConfigLoader::system().load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn settings(root: &Path) -> FlagSettings {
        FlagSettings::with_root(root)
    }

    #[test]
    fn test_loader_defaults() {
        let settings = ConfigLoader::new("/nonexistent/flags.toml")
            .use_env(false)
            .load()
            .unwrap();
        assert_eq!(settings, FlagSettings::default());
    }

    #[test]
    fn test_loader_no_defaults() {
        let result = ConfigLoader::new("/nonexistent/flags.toml")
            .use_defaults(false)
            .load();
        assert_matches!(result, Err(ConfigError::NotFound(_)));
    }

    #[test]
    fn test_loader_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("flags.toml");
        std::fs::write(&path, "config_root = \"/srv/root\"\n").unwrap();

        let settings = ConfigLoader::new(&path).use_env(false).load().unwrap();
        assert_eq!(settings.config_root, PathBuf::from("/srv/root"));
    }

    #[test]
    fn test_paths() {
        assert_eq!(paths::settings_file(), PathBuf::from("/etc/buckos/flags.toml"));
    }

    #[test]
    fn test_locate_missing() {
        let tmp = TempDir::new().unwrap();
        let location = locate(&settings(tmp.path()), ConfigKind::UseFlag).unwrap();
        assert!(location.sources.is_empty());
        assert_eq!(
            location.default_target,
            tmp.path().join("etc/portage/package.use/99local.conf")
        );
    }

    #[test]
    fn test_locate_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("etc/portage/package.accept_keywords");
        std::fs::create_dir_all(dir.join("sub")).unwrap();
        std::fs::write(dir.join("b"), "").unwrap();
        std::fs::write(dir.join("a"), "").unwrap();
        std::fs::write(dir.join("sub/c"), "").unwrap();
        std::fs::write(dir.join("a~"), "").unwrap();
        std::fs::write(dir.join(".hidden"), "").unwrap();

        let location = locate(&settings(tmp.path()), ConfigKind::Keyword).unwrap();
        assert_eq!(
            location.sources,
            vec![dir.join("a"), dir.join("b"), dir.join("sub/c")]
        );
        assert_eq!(location.default_target, dir.join("sub/c"));
    }

    #[test]
    fn test_locate_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("etc/portage/package.license");
        std::fs::create_dir_all(&dir).unwrap();

        let mut settings = settings(tmp.path());
        settings.default_file = "zz-flags".to_string();
        let location = locate(&settings, ConfigKind::License).unwrap();
        assert!(location.sources.is_empty());
        assert_eq!(location.default_target, dir.join("zz-flags"));
    }

    #[test]
    fn test_locate_plain_file() {
        let tmp = TempDir::new().unwrap();
        let portage = tmp.path().join("etc/portage");
        std::fs::create_dir_all(&portage).unwrap();
        std::fs::write(portage.join("package.use"), "pkg/x doc\n").unwrap();

        let location = locate(&settings(tmp.path()), ConfigKind::UseFlag).unwrap();
        assert_eq!(location.sources, vec![portage.join("package.use")]);
        assert_eq!(location.default_target, portage.join("package.use"));

        let store = load_store(&settings(tmp.path()), ConfigKind::UseFlag).unwrap();
        assert_eq!(store.flag_count(), 1);
    }
}
