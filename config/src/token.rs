//! Flag specifier parsing
//!
//! A specifier is `<marker>[<namespace>::]<flag>`:
//!
//! ```text
//! +ssl            enable USE flag "ssl"
//! -kw::~amd64     disable keyword "~amd64"
//! %doc            reset "doc" to the package manager default
//! !mask::debug    mask "debug"
//! ^debug          unmask "debug" (mask namespace is implied)
//! +PYTHON_TARGETS::python3_12   USE flag "python_targets_python3_12"
//! ?ssl            query the current state of "ssl"
//! +\%weird        enable a flag literally named "%weird"
//! ```

use crate::kind::{ConfigKind, Sign};
use crate::{ConfigError, PackageAtom, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker that turns a specifier into a read-only query
pub const QUERY_MARKER: char = '?';

/// Characters that may not start a flag name unless escaped
pub const RESERVED_MARKERS: [char; 6] = ['+', '-', '%', '!', '^', QUERY_MARKER];

const ESCAPE: char = '\\';

/// Which packages an operation applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageScope {
    /// Every atom present in the store, plus the `*/*` entry
    All,
    /// A single atom
    Atom(PackageAtom),
}

impl PackageScope {
    /// Parse a scope token; `*` or an empty token is the wildcard scope
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() || token == "*" {
            return Ok(PackageScope::All);
        }
        token
            .parse::<PackageAtom>()
            .map(PackageScope::Atom)
            .map_err(|e| ConfigError::malformed(token, e.to_string()))
    }
}

impl fmt::Display for PackageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageScope::All => f.write_str("*"),
            PackageScope::Atom(atom) => write!(f, "{}", atom),
        }
    }
}

/// What a specifier asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecAction {
    /// Store the given sign
    Set(Sign),
    /// Report the current state
    Query,
}

/// A parsed specifier, not yet bound to a package scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSpec {
    pub action: SpecAction,
    pub kind: ConfigKind,
    /// Effective flag name; `None` only for a bare `?` query
    pub name: Option<String>,
}

impl FlagSpec {
    /// Parse a specifier string
    pub fn parse(spec: &str) -> Result<Self> {
        let mut chars = spec.chars();
        let (action, rest) = match chars.next() {
            Some(QUERY_MARKER) => (SpecAction::Query, chars.as_str()),
            Some(c) => match Sign::from_op_marker(c) {
                Some(sign) => (SpecAction::Set(sign), chars.as_str()),
                None => (SpecAction::Set(Sign::Enabled), spec),
            },
            None => return Err(ConfigError::malformed(spec, "empty specifier")),
        };

        if action == SpecAction::Query && rest.is_empty() {
            return Ok(FlagSpec {
                action,
                kind: ConfigKind::UseFlag,
                name: None,
            });
        }

        let implied_kind = match action {
            SpecAction::Set(sign) if sign.is_mask() => ConfigKind::UseMask,
            _ => ConfigKind::UseFlag,
        };

        let (kind, prefix, raw_name) = match rest.split_once("::") {
            Some(("", _)) => return Err(ConfigError::malformed(spec, "empty namespace")),
            Some((ns, flag)) => match ConfigKind::from_namespace(ns) {
                Some(kind) => (kind, None, flag),
                None if is_group_name(ns) => {
                    (implied_kind, Some(format!("{}_", ns.to_lowercase())), flag)
                }
                None => {
                    return Err(ConfigError::malformed(
                        spec,
                        format!("unknown namespace '{}'", ns),
                    ))
                }
            },
            None => (implied_kind, None, rest),
        };

        let name = unescape_name(spec, raw_name)?;
        let name = match prefix {
            Some(prefix) => format!("{}{}", prefix, name),
            None => name,
        };

        if let SpecAction::Set(sign) = action {
            check_storable(spec, kind, sign, &name)?;
        }

        Ok(FlagSpec {
            action,
            kind,
            name: Some(name),
        })
    }

    /// Bind this specifier to a scope as a mutation.
    ///
    /// Returns `None` for queries.
    pub fn into_operation(self, scope: PackageScope) -> Option<Operation> {
        match (self.action, self.name) {
            (SpecAction::Set(sign), Some(name)) => Some(Operation {
                scope,
                kind: self.kind,
                name,
                sign,
            }),
            _ => None,
        }
    }

    /// Bind this specifier to a scope as a query
    pub fn into_query(self, scope: PackageScope) -> FlagQuery {
        FlagQuery {
            scope,
            kind: self.kind,
            name: self.name,
        }
    }
}

/// A requested mutation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    pub scope: PackageScope,
    pub kind: ConfigKind,
    pub name: String,
    pub sign: Sign,
}

impl Operation {
    /// Create an operation without going through the specifier syntax.
    ///
    /// Fails when `kind` has no way to store `sign`, or when `name` would
    /// read back as a different flag.
    pub fn new(
        scope: PackageScope,
        kind: ConfigKind,
        name: impl Into<String>,
        sign: Sign,
    ) -> Result<Self> {
        let op = Self {
            scope,
            kind,
            name: name.into(),
            sign,
        };
        op.validate()?;
        Ok(op)
    }

    /// Check that the operation can be written to its kind's files
    pub fn validate(&self) -> Result<()> {
        let spec = self.to_string();
        check_name(&spec, &self.name)?;
        check_storable(&spec, self.kind, self.sign, &self.name)
    }

    /// Parse a scope token and a specifier into an operation
    pub fn parse(scope: &str, spec: &str) -> Result<Self> {
        let scope = PackageScope::parse(scope)?;
        FlagSpec::parse(spec)?
            .into_operation(scope)
            .ok_or_else(|| ConfigError::malformed(spec, "queries do not modify configuration"))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}::{}",
            self.scope,
            self.sign.op_marker(),
            self.kind.namespace(),
            self.name
        )
    }
}

/// A read-only request for the current flag state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagQuery {
    pub scope: PackageScope,
    pub kind: ConfigKind,
    /// `None` lists every flag set for the scope
    pub name: Option<String>,
}

/// Whether a command line argument looks like a specifier rather than a package
pub fn is_specifier(arg: &str) -> bool {
    arg.chars()
        .next()
        .map(|c| RESERVED_MARKERS.contains(&c))
        .unwrap_or(false)
}

fn is_group_name(ns: &str) -> bool {
    ns.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unescape_name(spec: &str, raw: &str) -> Result<String> {
    let name = if let Some(escaped) = raw.strip_prefix(ESCAPE) {
        escaped
    } else {
        if let Some(c) = raw.chars().next().filter(|c| RESERVED_MARKERS.contains(c)) {
            return Err(ConfigError::malformed(
                spec,
                format!("flag name starts with reserved marker '{}' (escape it with '\\')", c),
            ));
        }
        raw
    };

    check_name(spec, name)?;
    Ok(name.to_string())
}

fn check_name(spec: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ConfigError::malformed(spec, "empty flag name"));
    }
    if name.contains(char::is_whitespace) {
        return Err(ConfigError::malformed(spec, "flag name contains whitespace"));
    }
    if name.contains('#') {
        return Err(ConfigError::malformed(spec, "flag name contains '#'"));
    }
    Ok(())
}

fn check_storable(spec: &str, kind: ConfigKind, sign: Sign, name: &str) -> Result<()> {
    if !kind.supports(sign) {
        return Err(ConfigError::malformed(
            spec,
            format!("{} entries cannot be {}", kind.file_name(), sign),
        ));
    }
    if sign != Sign::Reset && !round_trips(kind, sign, name) {
        return Err(ConfigError::malformed(
            spec,
            format!("'{}' cannot be stored in {}", name, kind.file_name()),
        ));
    }
    Ok(())
}

// A name like "-foo" would be read back from a file as the negation of "foo".
fn round_trips(kind: ConfigKind, sign: Sign, name: &str) -> bool {
    kind.render_token(sign, name)
        .map(|token| kind.parse_token(&token) == Ok((sign, name)))
        .unwrap_or(false)
}
