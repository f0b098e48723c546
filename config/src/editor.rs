//! Load, merge and write across configuration kinds
//!
//! Every store an edit needs is read before anything is changed, so a
//! read failure leaves the filesystem untouched. Write failures are
//! collected per file and reported together.

use crate::cleanup;
use crate::kind::{ConfigKind, Sign};
use crate::loader::load_store;
use crate::merge::{MergeEngine, MergeReport};
use crate::reader::ReadWarning;
use crate::settings::FlagSettings;
use crate::store::{ConfigStore, Provenance};
use crate::token::{FlagQuery, Operation, PackageScope};
use crate::writer::{StoreWriter, WriteReport};
use crate::{PackageAtom, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// What happened to one configuration kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub kind: ConfigKind,
    pub merge: MergeReport,
    /// Entries removed by the ineffective-entry cleanup
    pub dropped: usize,
    /// Lines reordered by flag sorting
    pub sorted: usize,
}

/// Outcome of [`FlagEditor::edit`]
#[derive(Debug, Default)]
pub struct EditReport {
    pub kinds: Vec<KindReport>,
    /// Malformed lines met while reading
    pub warnings: Vec<ReadWarning>,
    pub write: WriteReport,
    pub pretend: bool,
}

impl EditReport {
    /// Whether every file was written
    pub fn is_success(&self) -> bool {
        self.write.is_success()
    }

    /// Merge counts summed over all kinds
    pub fn totals(&self) -> MergeReport {
        let mut total = MergeReport::default();
        for kind in &self.kinds {
            total.absorb(&kind.merge);
        }
        total
    }
}

/// A flag found by [`FlagEditor::lookup`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryMatch {
    pub atom: PackageAtom,
    pub kind: ConfigKind,
    pub name: String,
    pub sign: Sign,
    /// File and 1-based line the effective entry was read from
    pub path: Option<PathBuf>,
    pub line: Option<usize>,
}

/// Applies operation batches to the configuration tree
#[derive(Debug, Clone)]
pub struct FlagEditor {
    settings: FlagSettings,
    pretend: bool,
}

impl FlagEditor {
    pub fn new(settings: FlagSettings) -> Self {
        Self {
            settings,
            pretend: false,
        }
    }

    /// Compute changes without writing
    pub fn pretend(mut self, pretend: bool) -> Self {
        self.pretend = pretend;
        self
    }

    pub fn settings(&self) -> &FlagSettings {
        &self.settings
    }

    /// Load the store for one kind
    pub fn load(&self, kind: ConfigKind) -> Result<ConfigStore> {
        load_store(&self.settings, kind)
    }

    /// Apply `operations`, grouped by kind, and persist the result
    pub fn edit(&self, operations: &[Operation]) -> Result<EditReport> {
        let kinds = kinds_for(operations);

        let mut stores = Vec::with_capacity(kinds.len());
        for kind in kinds {
            stores.push(self.load(kind)?);
        }

        let mut report = EditReport {
            pretend: self.pretend,
            ..EditReport::default()
        };
        let writer = StoreWriter::new().pretend(self.pretend);

        for mut store in stores {
            let kind = store.kind();
            report.warnings.extend(store.warnings().iter().cloned());

            let merge = MergeEngine::new(&mut store).apply(operations);
            let dropped = if self.settings.drop_ineffective {
                cleanup::drop_ineffective(&mut store)
            } else {
                0
            };
            let sorted = if self.settings.sort_flags {
                cleanup::sort_flags(&mut store)
            } else {
                0
            };

            debug!(
                "{}s: +{} ~{} -{} (deduplicated {})",
                kind.description(),
                merge.added,
                merge.updated,
                merge.removed,
                merge.deduplicated
            );

            report.write.absorb(writer.write(&mut store));
            report.kinds.push(KindReport {
                kind,
                merge,
                dropped,
                sorted,
            });
        }

        info!(
            "{} file(s) {}, {} failed",
            report.write.changed.len(),
            if self.pretend { "would change" } else { "changed" },
            report.write.failed.len()
        );
        Ok(report)
    }

    /// Effective sign of `flag` for `atom`, `None` when not set
    pub fn query(
        &self,
        atom: &PackageAtom,
        kind: ConfigKind,
        flag: &str,
    ) -> Result<Option<Sign>> {
        let store = self.load(kind)?;
        Ok(store.effective(atom, flag).map(|entry| entry.sign))
    }

    /// Every effective entry matching a query
    pub fn lookup(&self, query: &FlagQuery) -> Result<Vec<QueryMatch>> {
        let store = self.load(query.kind)?;
        let atoms: Vec<PackageAtom> = match &query.scope {
            PackageScope::All => store.atoms().cloned().collect(),
            PackageScope::Atom(atom) => vec![atom.clone()],
        };

        let mut matches = Vec::new();
        for atom in atoms {
            let names: Vec<String> = match &query.name {
                Some(name) => vec![name.clone()],
                None => {
                    let mut names: Vec<String> = Vec::new();
                    for entry in store.entries(&atom) {
                        if !names.contains(&entry.name) {
                            names.push(entry.name.clone());
                        }
                    }
                    names
                }
            };

            for name in names {
                if let Some(entry) = store.effective(&atom, &name) {
                    let (path, line) = match entry.provenance {
                        Provenance::Loaded { file, line } => (
                            store.files().get(file).map(|f| f.path().to_path_buf()),
                            Some(line + 1),
                        ),
                        Provenance::New => (None, None),
                    };
                    matches.push(QueryMatch {
                        atom: atom.clone(),
                        kind: query.kind,
                        name,
                        sign: entry.sign,
                        path,
                        line,
                    });
                }
            }
        }
        Ok(matches)
    }
}

/// Kinds touched by a batch, in a fixed order
fn kinds_for(operations: &[Operation]) -> Vec<ConfigKind> {
    ConfigKind::ALL
        .iter()
        .copied()
        .filter(|kind| operations.iter().any(|op| op.kind == *kind))
        .collect()
}
