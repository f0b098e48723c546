//! Configuration kinds and flag signs
//!
//! Every `package.*` file family stores flags with its own marker syntax:
//! - polarity files (`package.use`, `package.accept_keywords`, ...):
//!   `flag` is enabled, `-flag` is disabled
//! - mask files (`package.use.mask`): `flag` masks, `-flag` unmasks
//! - `package.env`: plain file names, no negation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested or stored state of a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sign {
    /// Explicitly enabled
    Enabled,
    /// Explicitly disabled
    Disabled,
    /// Masked (forced off)
    Masked,
    /// Unmasked
    Unmasked,
    /// Remove any explicit entry so the package manager default applies
    Reset,
}

impl Sign {
    /// Marker used on the command line for this sign
    pub fn op_marker(self) -> char {
        match self {
            Sign::Enabled => '+',
            Sign::Disabled => '-',
            Sign::Masked => '!',
            Sign::Unmasked => '^',
            Sign::Reset => '%',
        }
    }

    /// Sign for a command line marker
    pub fn from_op_marker(c: char) -> Option<Self> {
        match c {
            '+' => Some(Sign::Enabled),
            '-' => Some(Sign::Disabled),
            '!' => Some(Sign::Masked),
            '^' => Some(Sign::Unmasked),
            '%' => Some(Sign::Reset),
            _ => None,
        }
    }

    /// Whether this sign belongs to the mask family
    pub fn is_mask(self) -> bool {
        matches!(self, Sign::Masked | Sign::Unmasked)
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sign::Enabled => "enabled",
            Sign::Disabled => "disabled",
            Sign::Masked => "masked",
            Sign::Unmasked => "unmasked",
            Sign::Reset => "reset",
        };
        f.write_str(s)
    }
}

/// Marker syntax of a configuration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagSyntax {
    /// `flag` enabled, `-flag` disabled
    Polarity,
    /// `flag` masked, `-flag` unmasked
    Mask,
    /// `flag` only
    Plain,
}

impl FlagSyntax {
    /// Sign of an unprefixed token
    pub fn positive(self) -> Sign {
        match self {
            FlagSyntax::Polarity | FlagSyntax::Plain => Sign::Enabled,
            FlagSyntax::Mask => Sign::Masked,
        }
    }

    /// Sign of a `-` prefixed token
    pub fn negative(self) -> Option<Sign> {
        match self {
            FlagSyntax::Polarity => Some(Sign::Disabled),
            FlagSyntax::Mask => Some(Sign::Unmasked),
            FlagSyntax::Plain => None,
        }
    }
}

/// Family of per-package configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigKind {
    /// package.use
    UseFlag,
    /// package.accept_keywords
    Keyword,
    /// package.license
    License,
    /// package.properties
    Property,
    /// package.accept_restrict
    Restrict,
    /// package.env
    EnvFile,
    /// profile/package.use.mask
    UseMask,
}

impl ConfigKind {
    /// All kinds, in the order they are processed
    pub const ALL: [ConfigKind; 7] = [
        ConfigKind::UseFlag,
        ConfigKind::Keyword,
        ConfigKind::License,
        ConfigKind::Property,
        ConfigKind::Restrict,
        ConfigKind::EnvFile,
        ConfigKind::UseMask,
    ];

    /// Path of the file or directory relative to the portage config dir
    pub fn file_name(self) -> &'static str {
        match self {
            ConfigKind::UseFlag => "package.use",
            ConfigKind::Keyword => "package.accept_keywords",
            ConfigKind::License => "package.license",
            ConfigKind::Property => "package.properties",
            ConfigKind::Restrict => "package.accept_restrict",
            ConfigKind::EnvFile => "package.env",
            ConfigKind::UseMask => "profile/package.use.mask",
        }
    }

    /// Namespace used in `ns::flag` specifiers
    pub fn namespace(self) -> &'static str {
        match self {
            ConfigKind::UseFlag => "use",
            ConfigKind::Keyword => "kw",
            ConfigKind::License => "lic",
            ConfigKind::Property => "prop",
            ConfigKind::Restrict => "restrict",
            ConfigKind::EnvFile => "env",
            ConfigKind::UseMask => "mask",
        }
    }

    /// Look up a kind by its namespace
    pub fn from_namespace(ns: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.namespace() == ns)
    }

    /// Human readable description
    pub fn description(self) -> &'static str {
        match self {
            ConfigKind::UseFlag => "USE flag",
            ConfigKind::Keyword => "keyword",
            ConfigKind::License => "license",
            ConfigKind::Property => "property",
            ConfigKind::Restrict => "restrict tag",
            ConfigKind::EnvFile => "environment file",
            ConfigKind::UseMask => "USE mask",
        }
    }

    /// Marker syntax used in files of this kind
    pub fn syntax(self) -> FlagSyntax {
        match self {
            ConfigKind::EnvFile => FlagSyntax::Plain,
            ConfigKind::UseMask => FlagSyntax::Mask,
            _ => FlagSyntax::Polarity,
        }
    }

    /// Whether `NAME:` USE_EXPAND group headers may appear
    pub fn supports_groups(self) -> bool {
        matches!(self, ConfigKind::UseFlag | ConfigKind::UseMask)
    }

    /// Whether operations with this sign can be stored in this kind
    pub fn supports(self, sign: Sign) -> bool {
        let syntax = self.syntax();
        sign == Sign::Reset || sign == syntax.positive() || syntax.negative() == Some(sign)
    }

    /// Split a file token into its sign and bare name.
    pub fn parse_token(self, token: &str) -> Result<(Sign, &str), String> {
        let syntax = self.syntax();
        let (sign, name) = if let Some(rest) = token.strip_prefix('-') {
            let sign = syntax
                .negative()
                .ok_or_else(|| format!("'-' is not valid in {} entries", self.file_name()))?;
            (sign, rest)
        } else if let Some(rest) = token
            .strip_prefix('+')
            .filter(|_| syntax == FlagSyntax::Polarity)
        {
            (Sign::Enabled, rest)
        } else {
            (syntax.positive(), token)
        };

        if name.is_empty() {
            return Err(format!("empty flag in token '{}'", token));
        }
        Ok((sign, name))
    }

    /// Render a bare name with the marker for `sign`.
    ///
    /// Returns `None` for signs this kind cannot store.
    pub fn render_token(self, sign: Sign, name: &str) -> Option<String> {
        let syntax = self.syntax();
        if sign == syntax.positive() {
            Some(name.to_string())
        } else if syntax.negative() == Some(sign) {
            Some(format!("-{}", name))
        } else {
            None
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polarity_tokens() {
        let kind = ConfigKind::UseFlag;
        assert_eq!(kind.parse_token("ssl"), Ok((Sign::Enabled, "ssl")));
        assert_eq!(kind.parse_token("-ssl"), Ok((Sign::Disabled, "ssl")));
        assert_eq!(kind.parse_token("+ssl"), Ok((Sign::Enabled, "ssl")));
        assert!(kind.parse_token("-").is_err());
        assert_eq!(kind.render_token(Sign::Disabled, "ssl"), Some("-ssl".into()));
        assert_eq!(kind.render_token(Sign::Masked, "ssl"), None);
    }

    #[test]
    fn test_keyword_tokens() {
        let kind = ConfigKind::Keyword;
        assert_eq!(kind.parse_token("~amd64"), Ok((Sign::Enabled, "~amd64")));
        assert_eq!(kind.parse_token("-*"), Ok((Sign::Disabled, "*")));
        assert_eq!(kind.parse_token("**"), Ok((Sign::Enabled, "**")));
    }

    #[test]
    fn test_mask_tokens() {
        let kind = ConfigKind::UseMask;
        assert_eq!(kind.parse_token("debug"), Ok((Sign::Masked, "debug")));
        assert_eq!(kind.parse_token("-debug"), Ok((Sign::Unmasked, "debug")));
        assert!(kind.supports(Sign::Unmasked));
        assert!(!kind.supports(Sign::Enabled));
    }

    #[test]
    fn test_env_tokens() {
        let kind = ConfigKind::EnvFile;
        assert_eq!(kind.parse_token("no-lto.conf"), Ok((Sign::Enabled, "no-lto.conf")));
        assert!(kind.parse_token("-no-lto.conf").is_err());
        assert!(!kind.supports(Sign::Disabled));
        assert!(kind.supports(Sign::Reset));
    }

    #[test]
    fn test_namespaces() {
        for kind in ConfigKind::ALL {
            assert_eq!(ConfigKind::from_namespace(kind.namespace()), Some(kind));
        }
        assert_eq!(ConfigKind::from_namespace("PYTHON_TARGETS"), None);
    }

    #[test]
    fn test_op_markers() {
        for sign in [Sign::Enabled, Sign::Disabled, Sign::Masked, Sign::Unmasked, Sign::Reset] {
            assert_eq!(Sign::from_op_marker(sign.op_marker()), Some(sign));
        }
        assert_eq!(Sign::from_op_marker('?'), None);
    }
}
