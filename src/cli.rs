//! Command line argument handling
//!
//! Positional arguments form sets of packages followed by actions:
//!
//! ```text
//! buckos-flags +doc  app-misc/foo app-misc/bar -ssl  dev-lang/rust +kw::~amd64
//! ```
//!
//! Actions before the first package apply to `*/*`.

use anyhow::{bail, Result};
use clap::Parser;
use config::token::is_specifier;
use config::{FlagQuery, FlagSpec, Operation, PackageAtom, PackageScope, SpecAction};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "buckos-flags",
    about = "Edit per-package USE flags, keywords, licenses and masks",
    version,
    author,
    arg_required_else_help = true,
    after_help = "Actions:\n  \
        +flag            enable flag\n  \
        -flag            disable flag\n  \
        %flag            reset flag (remove it from the configuration)\n  \
        !flag            mask flag (profile/package.use.mask)\n  \
        ^flag            unmask flag\n  \
        ?flag            print the state of flag\n  \
        ?                print every flag set for the package\n\n\
        Namespaces: use:: kw:: lic:: prop:: restrict:: env:: mask::\n\
        Any other namespace is a USE_EXPAND group, e.g. +PYTHON_TARGETS::python3_12\n\n\
        An action spelled like bundled short options (-pq, -vq) is read as options;\n\
        put such actions after `--`, e.g. buckos-flags -- app-misc/foo -pq"
)]
pub struct Cli {
    /// Settings file (default: /etc/buckos/flags.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Root directory containing etc/portage
    #[arg(long = "config-root", env = "BUCKOS_CONFIG_ROOT")]
    pub config_root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet output
    #[arg(short, long)]
    pub quiet: bool,

    /// Pretend mode (show changes without writing them)
    #[arg(short, long)]
    pub pretend: bool,

    /// Remove flag entries shadowed by later ones
    #[arg(long = "drop-ineffective")]
    pub drop_ineffective: bool,

    /// Sort flags within each entry line
    #[arg(long = "sort-flags")]
    pub sort_flags: bool,

    /// Print a JSON report instead of text
    #[arg(long)]
    pub json: bool,

    /// [<global actions>...] [<package>... <actions>...]...
    ///
    /// Arguments after `--` are never read as options.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

/// Packages sharing a list of actions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgSet {
    pub packages: Vec<String>,
    pub actions: Vec<String>,
}

/// Group positional arguments into package/action sets
pub fn split_arg_sets(args: &[String]) -> Result<Vec<ArgSet>> {
    let mut sets = Vec::new();
    let mut current = ArgSet::default();

    for (i, arg) in args.iter().enumerate() {
        if arg.is_empty() {
            bail!("argument {} is empty", i + 1);
        }
        if is_specifier(arg) {
            current.actions.push(arg.clone());
            continue;
        }
        if !current.actions.is_empty() {
            sets.push(std::mem::take(&mut current));
        }
        current.packages.push(arg.clone());
    }

    if current.actions.is_empty() {
        if !current.packages.is_empty() {
            bail!("no actions given for {}", current.packages.join(" "));
        }
    } else {
        sets.push(current);
    }

    Ok(sets)
}

/// Requests built from the command line
#[derive(Debug, Default)]
pub struct Requests {
    pub operations: Vec<Operation>,
    pub queries: Vec<FlagQuery>,
    /// Rejected packages or actions
    pub errors: Vec<config::ConfigError>,
}

impl Requests {
    /// Parse every set, keeping going past malformed arguments
    pub fn build(sets: &[ArgSet]) -> Self {
        let mut requests = Requests::default();

        for set in sets {
            let mut scopes = Vec::new();
            if set.packages.is_empty() {
                scopes.push(PackageScope::Atom(PackageAtom::default_atom()));
            }
            for package in &set.packages {
                match PackageScope::parse(package) {
                    Ok(scope) => scopes.push(scope),
                    Err(e) => requests.errors.push(e),
                }
            }

            for action in &set.actions {
                let spec = match FlagSpec::parse(action) {
                    Ok(spec) => spec,
                    Err(e) => {
                        requests.errors.push(e);
                        continue;
                    }
                };
                for scope in &scopes {
                    let spec = spec.clone();
                    match spec.action {
                        SpecAction::Query => {
                            requests.queries.push(spec.into_query(scope.clone()))
                        }
                        SpecAction::Set(_) => {
                            requests.operations.extend(spec.into_operation(scope.clone()))
                        }
                    }
                }
            }
        }

        requests
    }
}
