//! In-memory model of a `package.*` configuration family
//!
//! Each file is an arena of lines indexed by position. Lines are never
//! physically removed while a store is alive; dropped entries become
//! tombstones so that `(file, line)` provenance stays valid.

use crate::kind::{ConfigKind, Sign};
use crate::reader::ReadWarning;
use crate::PackageAtom;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where a flag entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Read from disk at this position
    Loaded { file: usize, line: usize },
    /// Created in this run
    New,
}

/// A single flag mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagEntry {
    /// Effective flag name (group members carry the group prefix)
    pub name: String,
    /// Name as written in the file, without marker or group prefix
    pub short: String,
    /// Stored state
    pub sign: Sign,
    /// Origin of this entry
    pub provenance: Provenance,
    #[serde(skip)]
    raw: Option<String>,
}

impl FlagEntry {
    /// Create a fresh entry
    pub fn new(name: impl Into<String>, sign: Sign) -> Self {
        let name = name.into();
        Self {
            short: name.clone(),
            name,
            sign,
            provenance: Provenance::New,
            raw: None,
        }
    }

    pub(crate) fn loaded(
        name: String,
        short: String,
        sign: Sign,
        raw: &str,
        file: usize,
        line: usize,
    ) -> Self {
        Self {
            name,
            short,
            sign,
            provenance: Provenance::Loaded { file, line },
            raw: Some(raw.to_string()),
        }
    }

    /// Token text for this entry
    pub fn token(&self, kind: ConfigKind) -> Cow<'_, str> {
        match &self.raw {
            Some(raw) => Cow::Borrowed(raw),
            None => Cow::Owned(
                kind.render_token(self.sign, &self.short)
                    .unwrap_or_else(|| self.short.clone()),
            ),
        }
    }

    /// Change the sign; returns whether anything changed
    pub fn set_sign(&mut self, sign: Sign) -> bool {
        if self.sign == sign {
            return false;
        }
        self.sign = sign;
        self.raw = None;
        true
    }
}

/// A token on an entry line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineToken {
    Flag(FlagEntry),
    /// USE_EXPAND group header as written, e.g. `PYTHON_TARGETS:`
    Group(String),
}

/// A line starting with a package atom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryLine {
    pub atom: PackageAtom,
    atom_text: String,
    tokens: Vec<LineToken>,
    comment: Option<String>,
    raw: String,
    modified: bool,
}

impl EntryLine {
    pub(crate) fn parsed(
        atom: PackageAtom,
        atom_text: &str,
        tokens: Vec<LineToken>,
        comment: Option<&str>,
        raw: &str,
    ) -> Self {
        Self {
            atom,
            atom_text: atom_text.to_string(),
            tokens,
            comment: comment.map(str::to_string),
            raw: raw.to_string(),
            modified: false,
        }
    }

    pub(crate) fn new(atom: PackageAtom) -> Self {
        let atom_text = atom.to_string();
        Self {
            atom,
            raw: atom_text.clone(),
            atom_text,
            tokens: Vec::new(),
            comment: None,
            modified: true,
        }
    }

    /// Flags on this line, in order
    pub fn flags(&self) -> impl Iterator<Item = &FlagEntry> {
        self.tokens.iter().filter_map(|t| match t {
            LineToken::Flag(f) => Some(f),
            LineToken::Group(_) => None,
        })
    }

    pub fn tokens(&self) -> &[LineToken] {
        &self.tokens
    }

    pub fn flag_count(&self) -> usize {
        self.flags().count()
    }

    /// Trailing `# ...` comment, if any
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Token indices of flags named `name`
    pub fn positions(&self, name: &str) -> Vec<usize> {
        self.tokens
            .iter()
            .enumerate()
            .filter_map(|(i, t)| match t {
                LineToken::Flag(f) if f.name == name => Some(i),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn flag_mut(&mut self, index: usize) -> Option<&mut FlagEntry> {
        match self.tokens.get_mut(index) {
            Some(LineToken::Flag(f)) => Some(f),
            _ => None,
        }
    }

    pub(crate) fn mark_modified(&mut self) {
        self.modified = true;
    }

    /// Remove tokens by index; group headers left without members go too
    pub(crate) fn remove_tokens(&mut self, indices: &[usize]) {
        if indices.is_empty() {
            return;
        }
        let mut i = 0;
        self.tokens.retain(|_| {
            let keep = !indices.contains(&i);
            i += 1;
            keep
        });

        let mut kept = Vec::with_capacity(self.tokens.len());
        let mut tokens = std::mem::take(&mut self.tokens).into_iter().peekable();
        while let Some(token) = tokens.next() {
            let dangling = matches!(token, LineToken::Group(_))
                && !matches!(tokens.peek(), Some(LineToken::Flag(_)));
            if !dangling {
                kept.push(token);
            }
        }
        self.tokens = kept;
        self.modified = true;
    }

    /// Append an ungrouped flag, ahead of any group section
    pub(crate) fn push_flag(&mut self, entry: FlagEntry) {
        let at = self
            .tokens
            .iter()
            .position(|t| matches!(t, LineToken::Group(_)))
            .unwrap_or(self.tokens.len());
        self.tokens.insert(at, LineToken::Flag(entry));
        self.modified = true;
    }

    pub(crate) fn replace_tokens(&mut self, tokens: Vec<LineToken>) {
        if tokens != self.tokens {
            self.tokens = tokens;
            self.modified = true;
        }
    }

    /// Line text without the line ending
    pub fn text(&self, kind: ConfigKind) -> Cow<'_, str> {
        if !self.modified {
            return Cow::Borrowed(&self.raw);
        }
        let mut out = self.atom_text.clone();
        for token in &self.tokens {
            out.push(' ');
            match token {
                LineToken::Flag(f) => out.push_str(&f.token(kind)),
                LineToken::Group(g) => out.push_str(g),
            }
        }
        if let Some(ref comment) = self.comment {
            out.push(' ');
            out.push_str(comment);
        }
        Cow::Owned(out)
    }
}

/// Content of a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineContent {
    /// Kept verbatim: comment, blank or unparsable line
    Passthrough(String),
    Entry(EntryLine),
    /// Dropped during this run
    Removed,
}

/// A line plus its original terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLine {
    pub content: LineContent,
    pub eol: String,
}

/// One configuration file
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    kind: ConfigKind,
    original: Option<String>,
    lines: Vec<ConfigLine>,
}

impl ConfigFile {
    pub(crate) fn new(
        path: PathBuf,
        kind: ConfigKind,
        original: Option<String>,
        lines: Vec<ConfigLine>,
    ) -> Self {
        Self {
            path,
            kind,
            original,
            lines,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> &[ConfigLine] {
        &self.lines
    }

    /// Content as read from disk; `None` for files created in this run
    pub fn original(&self) -> Option<&str> {
        self.original.as_deref()
    }

    /// Serialize the current lines
    pub fn render(&self) -> String {
        let visible: Vec<(Cow<'_, str>, &str)> = self
            .lines
            .iter()
            .filter_map(|line| match &line.content {
                LineContent::Passthrough(text) => {
                    Some((Cow::Borrowed(text.as_str()), line.eol.as_str()))
                }
                LineContent::Entry(entry) => Some((entry.text(self.kind), line.eol.as_str())),
                LineContent::Removed => None,
            })
            .collect();

        let mut out = String::new();
        let last = visible.len().saturating_sub(1);
        for (i, (text, eol)) in visible.iter().enumerate() {
            out.push_str(text);
            if eol.is_empty() && i < last {
                out.push('\n');
            } else {
                out.push_str(eol);
            }
        }
        out
    }

    /// Whether the rendered content differs from what is on disk
    pub fn is_changed(&self) -> bool {
        let rendered = self.render();
        match &self.original {
            Some(original) => *original != rendered,
            None => !rendered.is_empty(),
        }
    }

    pub(crate) fn mark_written(&mut self, content: String) {
        self.original = Some(content);
    }
}

/// Position of a line within a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LineRef {
    pub file: usize,
    pub line: usize,
}

/// All files of one configuration kind
#[derive(Debug, Clone)]
pub struct ConfigStore {
    kind: ConfigKind,
    files: Vec<ConfigFile>,
    index: BTreeMap<PackageAtom, Vec<LineRef>>,
    default_target: PathBuf,
    warnings: Vec<ReadWarning>,
}

impl ConfigStore {
    /// Create an empty store that will put new entries in `default_target`
    pub fn new(kind: ConfigKind, default_target: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            files: Vec::new(),
            index: BTreeMap::new(),
            default_target: default_target.into(),
            warnings: Vec::new(),
        }
    }

    pub fn kind(&self) -> ConfigKind {
        self.kind
    }

    pub fn files(&self) -> &[ConfigFile] {
        &self.files
    }

    pub(crate) fn files_mut(&mut self) -> &mut [ConfigFile] {
        &mut self.files
    }

    pub fn default_target(&self) -> &Path {
        &self.default_target
    }

    /// Malformed lines found while reading
    pub fn warnings(&self) -> &[ReadWarning] {
        &self.warnings
    }

    pub(crate) fn push_warning(&mut self, warning: ReadWarning) {
        self.warnings.push(warning);
    }

    /// Add a file in read order and index its entry lines
    pub(crate) fn push_file(&mut self, file: ConfigFile) -> usize {
        let file_idx = self.files.len();
        for (line_idx, line) in file.lines.iter().enumerate() {
            if let LineContent::Entry(entry) = &line.content {
                self.index
                    .entry(entry.atom.clone())
                    .or_default()
                    .push(LineRef {
                        file: file_idx,
                        line: line_idx,
                    });
            }
        }
        self.files.push(file);
        file_idx
    }

    /// Atoms with at least one line, in key order
    pub fn atoms(&self) -> impl Iterator<Item = &PackageAtom> {
        self.index.keys()
    }

    pub fn contains_atom(&self, atom: &PackageAtom) -> bool {
        self.index.contains_key(atom)
    }

    /// Lines mentioning `atom`, in read order
    pub fn lines_for(&self, atom: &PackageAtom) -> &[LineRef] {
        self.index.get(atom).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entry_line(&self, at: LineRef) -> Option<&EntryLine> {
        match self.files.get(at.file)?.lines.get(at.line)?.content {
            LineContent::Entry(ref entry) => Some(entry),
            _ => None,
        }
    }

    pub(crate) fn entry_line_mut(&mut self, at: LineRef) -> Option<&mut EntryLine> {
        match self.files.get_mut(at.file)?.lines.get_mut(at.line)?.content {
            LineContent::Entry(ref mut entry) => Some(entry),
            _ => None,
        }
    }

    /// All flag entries for `atom`, in read order
    pub fn entries(&self, atom: &PackageAtom) -> Vec<&FlagEntry> {
        self.lines_for(atom)
            .iter()
            .filter_map(|&at| self.entry_line(at))
            .flat_map(|line| line.flags())
            .collect()
    }

    /// Every `(line, token index)` holding `name` for `atom`, in read order
    pub fn occurrences(&self, atom: &PackageAtom, name: &str) -> Vec<(LineRef, usize)> {
        self.lines_for(atom)
            .iter()
            .filter_map(|&at| self.entry_line(at).map(|line| (at, line)))
            .flat_map(|(at, line)| line.positions(name).into_iter().map(move |i| (at, i)))
            .collect()
    }

    /// The entry that takes effect: the last one read
    pub fn effective(&self, atom: &PackageAtom, name: &str) -> Option<&FlagEntry> {
        let (at, index) = *self.occurrences(atom, name).last()?;
        match self.entry_line(at)?.tokens.get(index)? {
            LineToken::Flag(f) => Some(f),
            LineToken::Group(_) => None,
        }
    }

    /// Number of flag entries across all files
    pub fn flag_count(&self) -> usize {
        self.files
            .iter()
            .flat_map(|f| f.lines.iter())
            .map(|l| match &l.content {
                LineContent::Entry(e) => e.flag_count(),
                _ => 0,
            })
            .sum()
    }

    /// Whether any file would be written
    pub fn is_changed(&self) -> bool {
        self.files.iter().any(ConfigFile::is_changed)
    }

    /// Append a flag for `atom`: to its last line when there is one,
    /// otherwise to a new line at the end of the default target.
    pub(crate) fn append_flag(&mut self, atom: &PackageAtom, entry: FlagEntry) -> LineRef {
        let last = self.lines_for(atom).last().copied();
        if let Some(at) = last {
            if let Some(line) = self.entry_line_mut(at) {
                line.push_flag(entry);
                return at;
            }
        }

        let file = self.target_file();
        let mut line = EntryLine::new(atom.clone());
        line.push_flag(entry);
        let lines = &mut self.files[file].lines;
        lines.push(ConfigLine {
            content: LineContent::Entry(line),
            eol: "\n".to_string(),
        });
        let at = LineRef {
            file,
            line: lines.len() - 1,
        };
        let refs = self.index.entry(atom.clone()).or_default();
        let pos = refs.binary_search(&at).unwrap_or_else(|p| p);
        refs.insert(pos, at);
        at
    }

    /// Drop a modified line that has no flags left
    pub(crate) fn prune_line(&mut self, at: LineRef) {
        let line = match self.files.get_mut(at.file).and_then(|f| f.lines.get_mut(at.line)) {
            Some(line) => line,
            None => return,
        };
        let (atom, comment) = match &line.content {
            LineContent::Entry(entry) if entry.modified && entry.flag_count() == 0 => {
                (entry.atom.clone(), entry.comment.clone())
            }
            _ => return,
        };

        line.content = match comment {
            Some(comment) => LineContent::Passthrough(comment),
            None => LineContent::Removed,
        };

        if let Some(refs) = self.index.get_mut(&atom) {
            refs.retain(|r| *r != at);
            if refs.is_empty() {
                self.index.remove(&atom);
            }
        }
    }

    fn target_file(&mut self) -> usize {
        if let Some(idx) = self.files.iter().position(|f| f.path == self.default_target) {
            return idx;
        }
        self.files.push(ConfigFile::new(
            self.default_target.clone(),
            self.kind,
            None,
            Vec::new(),
        ));
        self.files.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::parse_content;

    fn store(content: &str) -> ConfigStore {
        let mut store = ConfigStore::new(ConfigKind::UseFlag, "/tmp/package.use/local");
        let (file, _) = parse_content(
            PathBuf::from("/tmp/package.use/local"),
            ConfigKind::UseFlag,
            content.to_string(),
            0,
        );
        store.push_file(file);
        store
    }

    #[test]
    fn test_untouched_file_renders_verbatim() {
        let content = "app-misc/bar  flagA   -flagB\r\n# comment\n\n=dev-foo/baz-1* +x";
        let store = store(content);
        assert_eq!(store.files()[0].render(), content);
        assert!(!store.is_changed());
    }

    #[test]
    fn test_effective_is_last_read() {
        let store = store("app-misc/bar foo\napp-misc/bar -foo bar\n");
        let atom: PackageAtom = "app-misc/bar".parse().unwrap();
        assert_eq!(store.effective(&atom, "foo").unwrap().sign, Sign::Disabled);
        assert_eq!(store.occurrences(&atom, "foo").len(), 2);
        assert_eq!(store.entries(&atom).len(), 3);
    }

    #[test]
    fn test_append_to_existing_line() {
        let mut store = store("app-misc/bar flagA\n# comment\n");
        let atom: PackageAtom = "app-misc/bar".parse().unwrap();
        let at = store.append_flag(&atom, FlagEntry::new("flagB", Sign::Enabled));
        assert!(store.entry_line(at).unwrap().is_modified());
        assert_eq!(store.files()[0].render(), "app-misc/bar flagA flagB\n# comment\n");
    }

    #[test]
    fn test_append_new_line_after_missing_newline() {
        let mut store = store("app-misc/bar flagA");
        let atom: PackageAtom = "dev-foo/baz".parse().unwrap();
        store.append_flag(&atom, FlagEntry::new("x", Sign::Disabled));
        assert_eq!(store.files()[0].render(), "app-misc/bar flagA\ndev-foo/baz -x\n");
        assert!(store.contains_atom(&atom));
    }

    #[test]
    fn test_prune_keeps_trailing_comment() {
        let mut store = store("app-misc/bar flagA # keep me\nother/pkg x\n");
        let atom: PackageAtom = "app-misc/bar".parse().unwrap();
        let at = store.lines_for(&atom)[0];
        store.entry_line_mut(at).unwrap().remove_tokens(&[0]);
        store.prune_line(at);
        assert_eq!(store.files()[0].render(), "# keep me\nother/pkg x\n");
        assert!(!store.contains_atom(&atom));
    }

    #[test]
    fn test_group_header_removed_with_last_member() {
        let mut store =
            store("dev-lang/foo PYTHON_TARGETS: python3_12 -python3_11 RUBY_TARGETS: ruby33\n");
        let atom: PackageAtom = "dev-lang/foo".parse().unwrap();
        let at = store.lines_for(&atom)[0];
        let idx = store.entry_line(at).unwrap().positions("ruby_targets_ruby33");
        assert_eq!(idx, vec![4]);
        store.entry_line_mut(at).unwrap().remove_tokens(&idx);
        assert_eq!(
            store.files()[0].render(),
            "dev-lang/foo PYTHON_TARGETS: python3_12 -python3_11\n"
        );
    }
}
