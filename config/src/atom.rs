//! Package atom parsing
//!
//! Atoms are the leading token of every `package.*` line and the grouping key
//! for flag entries. Supported forms:
//! - `category/package`
//! - `>=category/package-1.0`, `=category/package-1.2*`, `~category/package-3`
//! - `category/package:slot/subslot::repository`
//! - wildcards: `*/*`, `category/*`, `*/package`

use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VersionOp {
    /// No version constraint
    Any,
    /// Exact version match (=)
    Equal,
    /// Greater than (>)
    Greater,
    /// Greater than or equal (>=)
    GreaterEqual,
    /// Less than (<)
    Less,
    /// Less than or equal (<=)
    LessEqual,
    /// Version glob match (=*), e.g., =category/package-1.0*
    GlobEqual,
    /// Revision bump match (~)
    RevisionBump,
}

impl Default for VersionOp {
    fn default() -> Self {
        Self::Any
    }
}

/// A package atom as written at the start of a configuration line
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageAtom {
    /// Package category (e.g., "sys-apps"), `*` for any
    pub category: String,
    /// Package name (e.g., "systemd"), `*` for any
    pub name: String,
    /// Version operator
    pub operator: VersionOp,
    /// Version string (optional)
    pub version: Option<String>,
    /// Slot specification (optional)
    pub slot: Option<String>,
    /// Sub-slot specification (optional)
    pub subslot: Option<String>,
    /// Repository restriction (optional)
    pub repository: Option<String>,
}

impl PackageAtom {
    /// Create a new package atom with just category and name
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            operator: VersionOp::Any,
            version: None,
            slot: None,
            subslot: None,
            repository: None,
        }
    }

    /// The `*/*` atom holding flags that apply to every package
    pub fn default_atom() -> Self {
        Self::new("*", "*")
    }

    /// Set the version operator
    pub fn with_operator(mut self, op: VersionOp) -> Self {
        self.operator = op;
        self
    }

    /// Set the version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the slot
    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Check if this is a wildcard match (e.g., */package or category/*)
    pub fn is_wildcard(&self) -> bool {
        self.category == "*" || self.name == "*"
    }

    /// Check if this is the `*/*` atom
    pub fn is_default(&self) -> bool {
        self.operator == VersionOp::Any
            && self.category == "*"
            && self.name == "*"
            && self.slot.is_none()
            && self.repository.is_none()
    }
}

impl FromStr for PackageAtom {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConfigError::InvalidAtom("empty atom".to_string()));
        }
        if s.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidAtom(format!("whitespace in atom: {}", s)));
        }
        if s.contains('[') || s.contains(']') {
            return Err(ConfigError::InvalidAtom(format!(
                "USE dependencies are not allowed here: {}",
                s
            )));
        }

        let mut remaining = s;

        // Parse operator
        let operator = if let Some(rest) = remaining.strip_prefix(">=") {
            remaining = rest;
            VersionOp::GreaterEqual
        } else if let Some(rest) = remaining.strip_prefix("<=") {
            remaining = rest;
            VersionOp::LessEqual
        } else if let Some(rest) = remaining.strip_prefix('>') {
            remaining = rest;
            VersionOp::Greater
        } else if let Some(rest) = remaining.strip_prefix('<') {
            remaining = rest;
            VersionOp::Less
        } else if let Some(rest) = remaining.strip_prefix('~') {
            remaining = rest;
            VersionOp::RevisionBump
        } else if let Some(rest) = remaining.strip_prefix('=') {
            remaining = rest;
            VersionOp::Equal
        } else {
            VersionOp::Any
        };

        // Extract repository ::repo
        let mut repository = None;
        if let Some(idx) = remaining.find("::") {
            let repo = &remaining[idx + 2..];
            if repo.is_empty() {
                return Err(ConfigError::InvalidAtom(format!("empty repository: {}", s)));
            }
            repository = Some(repo.to_string());
            remaining = &remaining[..idx];
        }

        // Extract slot :slot/subslot
        let mut slot = None;
        let mut subslot = None;
        if let Some(idx) = remaining.find(':') {
            let slot_str = &remaining[idx + 1..];
            if let Some((s_slot, s_sub)) = slot_str.split_once('/') {
                slot = Some(s_slot.to_string());
                subslot = Some(s_sub.to_string());
            } else {
                slot = Some(slot_str.to_string());
            }
            if slot.as_deref() == Some("") {
                return Err(ConfigError::InvalidAtom(format!("empty slot: {}", s)));
            }
            remaining = &remaining[..idx];
        }

        // =cat/pkg-1.2* is a glob match; the star belongs to the operator
        let operator = match remaining.strip_suffix('*') {
            Some(rest) if operator == VersionOp::Equal => {
                remaining = rest;
                VersionOp::GlobEqual
            }
            _ => operator,
        };

        // Parse category/name-version
        let (category, name_version) = remaining
            .split_once('/')
            .ok_or_else(|| ConfigError::InvalidAtom(format!("missing category: {}", s)))?;

        if name_version.contains('/') {
            return Err(ConfigError::InvalidAtom(format!("too many slashes: {}", s)));
        }

        // Try to extract version from name
        let (name, version) = if operator != VersionOp::Any {
            // Find the last occurrence of -<digit> which starts the version
            let bytes = name_version.as_bytes();
            let version_start = (0..bytes.len().saturating_sub(1))
                .rev()
                .find(|&i| bytes[i] == b'-' && bytes[i + 1].is_ascii_digit());

            match version_start {
                Some(idx) => (
                    name_version[..idx].to_string(),
                    Some(name_version[idx + 1..].to_string()),
                ),
                None => {
                    return Err(ConfigError::InvalidAtom(format!(
                        "version operator without version: {}",
                        s
                    )))
                }
            }
        } else {
            (name_version.to_string(), None)
        };

        if category.is_empty() || name.is_empty() {
            return Err(ConfigError::InvalidAtom(format!("invalid atom: {}", s)));
        }

        Ok(PackageAtom {
            category: category.to_string(),
            name,
            operator,
            version,
            slot,
            subslot,
            repository,
        })
    }
}

impl fmt::Display for PackageAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            VersionOp::Any => {}
            VersionOp::Equal | VersionOp::GlobEqual => write!(f, "=")?,
            VersionOp::Greater => write!(f, ">")?,
            VersionOp::GreaterEqual => write!(f, ">=")?,
            VersionOp::Less => write!(f, "<")?,
            VersionOp::LessEqual => write!(f, "<=")?,
            VersionOp::RevisionBump => write!(f, "~")?,
        }

        write!(f, "{}/{}", self.category, self.name)?;

        if let Some(ref ver) = self.version {
            write!(f, "-{}", ver)?;
        }

        if self.operator == VersionOp::GlobEqual {
            write!(f, "*")?;
        }

        if let Some(ref slot) = self.slot {
            write!(f, ":{}", slot)?;
            if let Some(ref subslot) = self.subslot {
                write!(f, "/{}", subslot)?;
            }
        }

        if let Some(ref repo) = self.repository {
            write!(f, "::{}", repo)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_atom() {
        let atom: PackageAtom = "sys-apps/systemd".parse().unwrap();
        assert_eq!(atom.category, "sys-apps");
        assert_eq!(atom.name, "systemd");
        assert_eq!(atom.operator, VersionOp::Any);
    }

    #[test]
    fn test_parse_versioned_atom() {
        let atom: PackageAtom = ">=sys-apps/systemd-250".parse().unwrap();
        assert_eq!(atom.name, "systemd");
        assert_eq!(atom.version, Some("250".to_string()));
        assert_eq!(atom.operator, VersionOp::GreaterEqual);

        let atom: PackageAtom = ">=dev-foo/bar-11-r1".parse().unwrap();
        assert_eq!(atom.name, "bar");
        assert_eq!(atom.version, Some("11-r1".to_string()));
    }

    #[test]
    fn test_parse_glob_atom() {
        let atom: PackageAtom = "=dev-foo/bar-14*".parse().unwrap();
        assert_eq!(atom.operator, VersionOp::GlobEqual);
        assert_eq!(atom.version, Some("14".to_string()));
        assert_eq!(atom.to_string(), "=dev-foo/bar-14*");
    }

    #[test]
    fn test_parse_slotted_atom() {
        let atom: PackageAtom = "dev-lang/python:3.11::gentoo".parse().unwrap();
        assert_eq!(atom.name, "python");
        assert_eq!(atom.slot, Some("3.11".to_string()));
        assert_eq!(atom.repository, Some("gentoo".to_string()));
    }

    #[test]
    fn test_parse_wildcards() {
        let atom: PackageAtom = "*/*".parse().unwrap();
        assert!(atom.is_default());
        assert!(atom.is_wildcard());

        let atom: PackageAtom = "dev-foo/*".parse().unwrap();
        assert!(atom.is_wildcard());
        assert!(!atom.is_default());
    }

    #[test]
    fn test_reject_invalid_atoms() {
        assert!("".parse::<PackageAtom>().is_err());
        assert!("systemd".parse::<PackageAtom>().is_err());
        assert!(">=sys-apps/systemd".parse::<PackageAtom>().is_err());
        assert!("a/b/c".parse::<PackageAtom>().is_err());
        assert!("sys-apps/systemd[foo]".parse::<PackageAtom>().is_err());
    }

    #[test]
    fn test_atom_display() {
        let atom = PackageAtom::new("sys-apps", "systemd")
            .with_operator(VersionOp::GreaterEqual)
            .with_version("250")
            .with_slot("0");
        assert_eq!(atom.to_string(), ">=sys-apps/systemd-250:0");
    }

    #[test]
    fn test_atom_ordering_groups_by_name() {
        let a: PackageAtom = "app-misc/bar".parse().unwrap();
        let b: PackageAtom = "app-misc/baz".parse().unwrap();
        let c: PackageAtom = "app-misc/bar".parse().unwrap();
        assert!(a < b);
        assert_eq!(a, c);
    }
}
