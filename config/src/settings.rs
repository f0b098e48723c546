//! Editor settings (`flags.toml`)
//!
//! ```toml
//! config_root = "/"
//! portage_dir = "etc/portage"
//! default_file = "99local.conf"
//! drop_ineffective = false
//! sort_flags = false
//! ```

use crate::kind::ConfigKind;
use crate::reader::DEFAULT_FILE_NAME;
use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings controlling where stores live and which cleanups run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagSettings {
    /// Root the configuration tree is relative to
    pub config_root: PathBuf,
    /// Portage configuration directory below `config_root`
    pub portage_dir: PathBuf,
    /// File created for new entries when a kind has no files yet
    pub default_file: String,
    /// Remove shadowed entries after every edit
    pub drop_ineffective: bool,
    /// Sort flags on every entry line after every edit
    pub sort_flags: bool,
}

impl Default for FlagSettings {
    fn default() -> Self {
        Self {
            config_root: PathBuf::from("/"),
            portage_dir: PathBuf::from("etc/portage"),
            default_file: DEFAULT_FILE_NAME.to_string(),
            drop_ineffective: false,
            sort_flags: false,
        }
    }
}

impl FlagSettings {
    /// Settings rooted at `config_root`, defaults otherwise
    pub fn with_root(config_root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: config_root.into(),
            ..Self::default()
        }
    }

    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.portage_dir.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "portage_dir must be relative to config_root: {}",
                self.portage_dir.display()
            )));
        }
        if self.default_file.is_empty()
            || self.default_file.contains('/')
            || self.default_file.starts_with('.')
        {
            return Err(ConfigError::Invalid(format!(
                "default_file must be a plain visible file name: {:?}",
                self.default_file
            )));
        }
        Ok(())
    }

    /// The portage configuration directory
    pub fn portage_root(&self) -> PathBuf {
        self.config_root.join(&self.portage_dir)
    }

    /// Path of the file or directory holding `kind`
    pub fn kind_path(&self, kind: ConfigKind) -> PathBuf {
        self.portage_root().join(kind.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let settings = FlagSettings::default();
        assert_eq!(
            settings.kind_path(ConfigKind::UseFlag),
            PathBuf::from("/etc/portage/package.use")
        );
        assert_eq!(
            settings.kind_path(ConfigKind::UseMask),
            PathBuf::from("/etc/portage/profile/package.use.mask")
        );
    }

    #[test]
    fn test_partial_toml() {
        let settings =
            FlagSettings::from_toml("config_root = \"/mnt/gentoo\"\nsort_flags = true\n").unwrap();
        assert_eq!(settings.config_root, PathBuf::from("/mnt/gentoo"));
        assert!(settings.sort_flags);
        assert!(!settings.drop_ineffective);
        assert_eq!(settings.default_file, "99local.conf");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert_matches!(
            FlagSettings::from_toml("portage_dir = \"/etc/portage\""),
            Err(ConfigError::Invalid(_))
        );
        assert_matches!(
            FlagSettings::from_toml("default_file = \"../x\""),
            Err(ConfigError::Invalid(_))
        );
        assert_matches!(
            FlagSettings::from_toml("sort_flags = \"yes\""),
            Err(ConfigError::TomlParse(_))
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let settings = FlagSettings {
            drop_ineffective: true,
            ..FlagSettings::with_root("/tmp/root")
        };
        let text = settings.to_toml().unwrap();
        assert_eq!(FlagSettings::from_toml(&text).unwrap(), settings);
    }
}
