//! Applying flag operations to a loaded store
//!
//! For every (atom, flag) touched by an operation the last-read entry is the
//! canonical one; earlier duplicates anywhere in the store are removed. The
//! canonical entry then takes the requested sign, or disappears on reset.
//! Flags without an entry are appended to the atom's last line, or to a new
//! line in the store's default target file.

use crate::kind::Sign;
use crate::store::{ConfigStore, FlagEntry, LineRef};
use crate::token::{Operation, PackageScope};
use crate::PackageAtom;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Counts of what a merge did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// New entries created
    pub added: usize,
    /// Existing entries whose sign changed
    pub updated: usize,
    /// Entries removed by reset operations
    pub removed: usize,
    /// Earlier duplicates removed in favour of the canonical entry
    pub deduplicated: usize,
    /// Entries that already had the requested sign
    pub unchanged: usize,
    /// Reset operations with nothing to reset
    pub noop_resets: usize,
    /// Operations overridden by a later one in the same batch
    pub superseded: usize,
    /// Operations that cannot be stored in this kind
    pub rejected: usize,
}

impl MergeReport {
    /// Whether the merge touched any entry
    pub fn has_changes(&self) -> bool {
        self.added + self.updated + self.removed + self.deduplicated > 0
    }

    pub(crate) fn absorb(&mut self, other: &MergeReport) {
        self.added += other.added;
        self.updated += other.updated;
        self.removed += other.removed;
        self.deduplicated += other.deduplicated;
        self.unchanged += other.unchanged;
        self.noop_resets += other.noop_resets;
        self.superseded += other.superseded;
        self.rejected += other.rejected;
    }
}

/// Drop operations overridden by a later one for the same kind, scope and flag.
///
/// Survivors keep request order, each at the position of its last occurrence.
pub fn coalesce(operations: &[Operation]) -> Vec<&Operation> {
    let mut latest = IndexMap::new();
    for op in operations {
        let key = (op.kind, &op.scope, op.name.as_str());
        latest.shift_remove(&key);
        latest.insert(key, op);
    }
    latest.into_values().collect()
}

/// Applies operations to one store
pub struct MergeEngine<'a> {
    store: &'a mut ConfigStore,
    report: MergeReport,
}

impl<'a> MergeEngine<'a> {
    pub fn new(store: &'a mut ConfigStore) -> Self {
        Self {
            store,
            report: MergeReport::default(),
        }
    }

    /// Apply a batch in request order. Operations for other kinds are ignored.
    pub fn apply(mut self, operations: &[Operation]) -> MergeReport {
        let kind = self.store.kind();
        let mut relevant: Vec<Operation> = Vec::new();
        for op in operations.iter().filter(|op| op.kind == kind) {
            match op.validate() {
                Ok(()) => relevant.push(op.clone()),
                Err(e) => {
                    warn!("Skipping {}", e);
                    self.report.rejected += 1;
                }
            }
        }

        let batch = coalesce(&relevant);
        self.report.superseded = relevant.len() - batch.len();

        for op in batch {
            debug!("Applying {}", op);
            for atom in self.resolve(&op.scope) {
                self.apply_to_atom(&atom, &op.name, op.sign);
            }
        }

        self.report
    }

    fn resolve(&self, scope: &PackageScope) -> Vec<PackageAtom> {
        match scope {
            PackageScope::Atom(atom) => vec![atom.clone()],
            PackageScope::All => {
                let mut atoms: Vec<PackageAtom> = self.store.atoms().cloned().collect();
                let default = PackageAtom::default_atom();
                if !self.store.contains_atom(&default) {
                    atoms.push(default);
                }
                atoms
            }
        }
    }

    fn apply_to_atom(&mut self, atom: &PackageAtom, name: &str, sign: Sign) {
        let occurrences = self.store.occurrences(atom, name);

        let Some((&(canonical_at, canonical_idx), earlier)) = occurrences.split_last() else {
            if sign == Sign::Reset {
                trace!("{} has no entry for {}, nothing to reset", atom, name);
                self.report.noop_resets += 1;
            } else {
                let at = self.store.append_flag(atom, FlagEntry::new(name, sign));
                trace!("Added {} {} at {:?}", atom, name, at);
                self.report.added += 1;
            }
            return;
        };

        let mut removals: BTreeMap<LineRef, Vec<usize>> = BTreeMap::new();
        for &(at, idx) in earlier {
            removals.entry(at).or_default().push(idx);
        }
        self.report.deduplicated += earlier.len();

        if sign == Sign::Reset {
            removals.entry(canonical_at).or_default().push(canonical_idx);
            self.report.removed += 1;
        } else if let Some(line) = self.store.entry_line_mut(canonical_at) {
            let changed = line
                .flag_mut(canonical_idx)
                .map(|flag| flag.set_sign(sign))
                .unwrap_or(false);
            if changed {
                line.mark_modified();
                self.report.updated += 1;
            } else {
                self.report.unchanged += 1;
            }
        }

        for (at, indices) in removals {
            if let Some(line) = self.store.entry_line_mut(at) {
                line.remove_tokens(&indices);
            }
            self.store.prune_line(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ConfigKind;
    use crate::reader::parse_content;
    use crate::store::Provenance;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn store(files: &[(&str, &str)]) -> ConfigStore {
        let default = files
            .last()
            .map(|(p, _)| *p)
            .unwrap_or("/etc/portage/package.use/99local.conf");
        let mut store = ConfigStore::new(ConfigKind::UseFlag, default);
        for (path, content) in files {
            let (file, _) = parse_content(
                PathBuf::from(path),
                ConfigKind::UseFlag,
                content.to_string(),
                store.files().len(),
            );
            store.push_file(file);
        }
        store
    }

    fn op(scope: &str, spec: &str) -> Operation {
        Operation::parse(scope, spec).unwrap()
    }

    fn rendered(store: &ConfigStore) -> Vec<String> {
        store.files().iter().map(|f| f.render()).collect()
    }

    fn atom(s: &str) -> PackageAtom {
        s.parse().unwrap()
    }

    #[test]
    fn test_append_after_existing_entry() {
        let mut store = store(&[("/p/foo", "app-misc/bar flagA\n# comment\n")]);
        let report = MergeEngine::new(&mut store).apply(&[op("app-misc/bar", "+flagB")]);
        assert_eq!(rendered(&store), vec!["app-misc/bar flagA flagB\n# comment\n"]);
        assert_eq!(report.added, 1);
        assert_eq!(
            store.effective(&atom("app-misc/bar"), "flagB").unwrap().provenance,
            Provenance::New
        );
    }

    #[test]
    fn test_reset_last_flag_drops_line() {
        let mut store = store(&[("/p/foo", "app-misc/bar flagA\n# comment\n")]);
        let report = MergeEngine::new(&mut store).apply(&[op("app-misc/bar", "%flagA")]);
        assert_eq!(rendered(&store), vec!["# comment\n"]);
        assert_eq!(report.removed, 1);
        assert!(!store.contains_atom(&atom("app-misc/bar")));
    }

    #[test]
    fn test_reset_one_of_several_flags() {
        let mut store = store(&[("/p/foo", "app-misc/bar  flagA   flagB\n")]);
        MergeEngine::new(&mut store).apply(&[op("app-misc/bar", "%flagA")]);
        assert_eq!(rendered(&store), vec!["app-misc/bar flagB\n"]);
    }

    #[test]
    fn test_last_read_wins_across_files() {
        let files = [("/p/a", "pkg/x flag\n"), ("/p/b", "pkg/x -flag\n")];

        let mut s = store(&files);
        let report = MergeEngine::new(&mut s).apply(&[op("pkg/x", "+flag")]);
        assert_eq!(rendered(&s), vec!["", "pkg/x flag\n"]);
        assert_eq!(report.deduplicated, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(s.occurrences(&atom("pkg/x"), "flag").len(), 1);

        let mut s = store(&files);
        MergeEngine::new(&mut s).apply(&[op("pkg/x", "-flag")]);
        assert_eq!(rendered(&s), vec!["", "pkg/x -flag\n"]);

        let mut s = store(&files);
        MergeEngine::new(&mut s).apply(&[op("pkg/x", "%flag")]);
        assert_eq!(rendered(&s), vec!["", ""]);
    }

    #[test]
    fn test_duplicates_within_one_line() {
        let mut store = store(&[("/p/a", "pkg/x flag other -flag\n")]);
        MergeEngine::new(&mut store).apply(&[op("pkg/x", "+flag")]);
        assert_eq!(rendered(&store), vec!["pkg/x other flag\n"]);
    }

    #[test]
    fn test_later_operation_wins() {
        let mut store = store(&[("/p/a", "pkg/x other\n")]);
        let report = MergeEngine::new(&mut store).apply(&[
            op("pkg/x", "+flag"),
            op("pkg/x", "-flag"),
        ]);
        assert_eq!(rendered(&store), vec!["pkg/x other -flag\n"]);
        assert_eq!(report.superseded, 1);
        assert_eq!(report.added, 1);
    }

    #[test]
    fn test_skips_unstorable_operations() {
        let mut store = store(&[("/p/a", "pkg/x other\n")]);
        let scope = PackageScope::Atom(atom("pkg/x"));
        let masked = Operation {
            scope: scope.clone(),
            kind: ConfigKind::UseFlag,
            name: "debug".into(),
            sign: Sign::Masked,
        };
        let negated_name = Operation {
            scope,
            kind: ConfigKind::UseFlag,
            name: "-foo".into(),
            sign: Sign::Enabled,
        };

        let batch = [masked, negated_name, op("pkg/x", "+a")];
        let report = MergeEngine::new(&mut store).apply(&batch);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.added, 1);
        assert_eq!(rendered(&store), vec!["pkg/x other a\n"]);
    }

    #[test]
    fn test_coalesce_keeps_last_position() {
        let ops = vec![op("pkg/x", "+a"), op("pkg/x", "+b"), op("pkg/x", "-a")];
        let batch = coalesce(&ops);
        let names: Vec<_> = batch.iter().map(|o| (o.name.as_str(), o.sign)).collect();
        assert_eq!(names, vec![("b", Sign::Enabled), ("a", Sign::Disabled)]);
    }

    #[test]
    fn test_new_atom_goes_to_default_target() {
        let mut store = store(&[("/p/a", "pkg/x flag\n"), ("/p/b", "# local\n")]);
        MergeEngine::new(&mut store).apply(&[op("pkg/y", "-doc")]);
        assert_eq!(rendered(&store), vec!["pkg/x flag\n", "# local\npkg/y -doc\n"]);
    }

    #[test]
    fn test_new_atom_in_empty_store_creates_target_file() {
        let mut store = store(&[]);
        MergeEngine::new(&mut store).apply(&[op("pkg/y", "+doc"), op("pkg/y", "+X")]);
        assert_eq!(store.files().len(), 1);
        assert_eq!(
            store.files()[0].path(),
            PathBuf::from("/etc/portage/package.use/99local.conf")
        );
        assert_eq!(rendered(&store), vec!["pkg/y doc X\n"]);
        assert!(store.is_changed());
    }

    #[test]
    fn test_reset_without_entry_is_noop() {
        let mut store = store(&[("/p/a", "pkg/x flag\n")]);
        let report = MergeEngine::new(&mut store).apply(&[
            op("pkg/x", "%other"),
            op("pkg/missing", "%flag"),
        ]);
        assert_eq!(report.noop_resets, 2);
        assert!(!report.has_changes());
        assert!(!store.is_changed());
    }

    #[test]
    fn test_same_sign_is_unchanged() {
        let mut store = store(&[("/p/a", "pkg/x  +flag\n")]);
        let report = MergeEngine::new(&mut store).apply(&[op("pkg/x", "+flag")]);
        assert_eq!(report.unchanged, 1);
        assert!(!store.is_changed());
    }

    #[test]
    fn test_wildcard_scope_expands_to_all_atoms() {
        let mut store = store(&[("/p/a", "pkg/x doc\npkg/y -doc X\n")]);
        MergeEngine::new(&mut store).apply(&[op("*", "%doc")]);
        assert_eq!(rendered(&store), vec!["pkg/y X\n"]);

        let mut store = store_with_default();
        MergeEngine::new(&mut store).apply(&[op("*", "-doc")]);
        assert_eq!(rendered(&store), vec!["pkg/x -doc\n*/* -doc\n"]);
    }

    fn store_with_default() -> ConfigStore {
        store(&[("/p/a", "pkg/x doc\n")])
    }

    #[test]
    fn test_grouped_flag_updated_in_place() {
        let mut store = store(&[("/p/a", "dev-lang/foo PYTHON_TARGETS: python3_12 -python3_11\n")]);
        MergeEngine::new(&mut store).apply(&[
            op("dev-lang/foo", "+PYTHON_TARGETS::python3_11"),
            op("dev-lang/foo", "+ssl"),
        ]);
        assert_eq!(
            rendered(&store),
            vec!["dev-lang/foo ssl PYTHON_TARGETS: python3_12 python3_11\n"]
        );
    }

    #[test]
    fn test_other_kinds_are_ignored() {
        let mut store = store(&[("/p/a", "pkg/x flag\n")]);
        let report = MergeEngine::new(&mut store).apply(&[op("pkg/x", "-kw::~amd64")]);
        assert_eq!(report, MergeReport::default());
        assert!(!store.is_changed());
    }
}
