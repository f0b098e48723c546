//! Whole-store cleanup passes

use crate::store::{ConfigStore, LineRef, LineToken};
use crate::PackageAtom;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Remove every flag entry shadowed by a later one for the same atom.
///
/// Returns the number of entries removed.
pub fn drop_ineffective(store: &mut ConfigStore) -> usize {
    let atoms: Vec<PackageAtom> = store.atoms().cloned().collect();
    let mut dropped = 0;

    for atom in &atoms {
        let refs = store.lines_for(atom).to_vec();
        let mut seen = HashSet::new();
        let mut removals: BTreeMap<LineRef, Vec<usize>> = BTreeMap::new();

        // walk backwards so the first sighting is the effective entry
        for &at in refs.iter().rev() {
            let Some(line) = store.entry_line(at) else {
                continue;
            };
            for (idx, token) in line.tokens().iter().enumerate().rev() {
                if let LineToken::Flag(flag) = token {
                    if !seen.insert(flag.name.clone()) {
                        removals.entry(at).or_default().push(idx);
                    }
                }
            }
        }

        for (at, indices) in removals {
            dropped += indices.len();
            if let Some(line) = store.entry_line_mut(at) {
                line.remove_tokens(&indices);
            }
            store.prune_line(at);
        }
    }

    if dropped > 0 {
        debug!("Dropped {} ineffective {} entries", dropped, store.kind());
    }
    dropped
}

/// Sort the flags of every entry line by name.
///
/// Ungrouped flags are sorted among themselves; each group section keeps its
/// place and is sorted internally. Returns the number of lines reordered.
pub fn sort_flags(store: &mut ConfigStore) -> usize {
    let refs: Vec<LineRef> = store
        .atoms()
        .flat_map(|atom| store.lines_for(atom).iter().copied())
        .collect();
    let mut sorted = 0;

    for at in refs {
        let Some(line) = store.entry_line_mut(at) else {
            continue;
        };
        let tokens = sorted_tokens(line.tokens());
        if tokens.as_slice() != line.tokens() {
            line.replace_tokens(tokens);
            sorted += 1;
        }
    }

    if sorted > 0 {
        debug!("Sorted flags on {} {} lines", sorted, store.kind());
    }
    sorted
}

fn sorted_tokens(tokens: &[LineToken]) -> Vec<LineToken> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut section: Vec<LineToken> = Vec::new();

    for token in tokens {
        match token {
            LineToken::Flag(_) => section.push(token.clone()),
            LineToken::Group(_) => {
                flush_section(&mut out, &mut section);
                out.push(token.clone());
            }
        }
    }
    flush_section(&mut out, &mut section);
    out
}

fn flush_section(out: &mut Vec<LineToken>, section: &mut Vec<LineToken>) {
    section.sort_by(|a, b| match (a, b) {
        (LineToken::Flag(a), LineToken::Flag(b)) => a.short.cmp(&b.short),
        _ => std::cmp::Ordering::Equal,
    });
    out.append(section);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ConfigKind;
    use crate::reader::parse_content;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn store(files: &[(&str, &str)]) -> ConfigStore {
        let mut store = ConfigStore::new(ConfigKind::UseFlag, "/p/local");
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

    fn rendered(store: &ConfigStore) -> Vec<String> {
        store.files().iter().map(|f| f.render()).collect()
    }

    #[test]
    fn test_drop_ineffective_keeps_last_read() {
        let mut s = store(&[
            ("/p/a", "pkg/x foo bar\n# keep\npkg/y foo\n"),
            ("/p/b", "pkg/x -foo\n"),
        ]);
        assert_eq!(drop_ineffective(&mut s), 1);
        assert_eq!(
            rendered(&s),
            vec!["pkg/x bar\n# keep\npkg/y foo\n", "pkg/x -foo\n"]
        );
    }

    #[test]
    fn test_drop_ineffective_prunes_emptied_lines() {
        let mut s = store(&[("/p/a", "pkg/x foo\npkg/x -foo\n")]);
        assert_eq!(drop_ineffective(&mut s), 1);
        assert_eq!(rendered(&s), vec!["pkg/x -foo\n"]);
    }

    #[test]
    fn test_drop_ineffective_without_duplicates() {
        let mut s = store(&[("/p/a", "pkg/x  foo   bar\n")]);
        assert_eq!(drop_ineffective(&mut s), 0);
        assert!(!s.is_changed());
    }

    #[test]
    fn test_sort_flags() {
        let mut s = store(&[(
            "/p/a",
            "pkg/x zed -abc PYTHON_TARGETS: python3_12 python3_11\npkg/y a b\n",
        )]);
        assert_eq!(sort_flags(&mut s), 1);
        assert_eq!(
            rendered(&s),
            vec!["pkg/x -abc zed PYTHON_TARGETS: python3_11 python3_12\npkg/y a b\n"]
        );
    }
}
