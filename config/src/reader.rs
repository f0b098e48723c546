//! Loading `package.*` files into a [`ConfigStore`]
//!
//! Files are read in the same order the package manager reads them:
//! recursively, sorted by name at each directory level, skipping hidden
//! entries and editor backups. Lines that cannot be understood are kept
//! verbatim and reported as [`ReadWarning`]s.

use crate::kind::ConfigKind;
use crate::store::{
    ConfigFile, ConfigLine, ConfigStore, EntryLine, FlagEntry, LineContent, LineToken,
};
use crate::{ConfigError, PackageAtom, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File used for new entries in an empty configuration directory
pub const DEFAULT_FILE_NAME: &str = "99local.conf";

/// A line kept as passthrough because it could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadWarning {
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    pub text: String,
    pub reason: String,
}

impl fmt::Display for ReadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} (kept as-is: {:?})",
            self.path.display(),
            self.line,
            self.reason,
            self.text
        )
    }
}

/// Reader for one configuration kind
#[derive(Debug, Clone, Copy)]
pub struct StoreReader {
    kind: ConfigKind,
}

impl StoreReader {
    pub fn new(kind: ConfigKind) -> Self {
        Self { kind }
    }

    /// Read every visible file below `dir`.
    ///
    /// New entries go to the last file read, or to [`DEFAULT_FILE_NAME`]
    /// inside `dir` when it holds no files.
    pub fn read_dir(&self, dir: &Path) -> Result<ConfigStore> {
        let files = collect_config_files(dir)?;
        let default_target = files
            .last()
            .cloned()
            .unwrap_or_else(|| dir.join(DEFAULT_FILE_NAME));
        self.read_files(&files, &default_target)
    }

    /// Read the given files in order
    pub fn read_files(&self, paths: &[PathBuf], default_target: &Path) -> Result<ConfigStore> {
        let mut store = ConfigStore::new(self.kind, default_target);

        for path in paths {
            let content = read_file(path)?;
            let (file, warnings) =
                parse_content(path.clone(), self.kind, content, store.files().len());
            store.push_file(file);
            for warning in warnings {
                warn!("{}", warning);
                store.push_warning(warning);
            }
        }

        debug!(
            "Loaded {} file(s) with {} flag entries for {}",
            store.files().len(),
            store.flag_count(),
            self.kind
        );
        Ok(store)
    }
}

/// Visible regular files below `dir`, in read order
pub fn collect_config_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let meta = std::fs::metadata(dir).map_err(|e| ConfigError::read(dir, e))?;
    if !meta.is_dir() {
        return Err(ConfigError::read(
            dir,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || is_visible(&e.file_name().to_string_lossy()));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            ConfigError::read(path, e.into())
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn is_visible(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with('~')
}

fn read_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| ConfigError::read(path, e))?;
    String::from_utf8(bytes).map_err(|e| {
        ConfigError::read(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.utf8_error()),
        )
    })
}

/// Split file content into classified lines
pub(crate) fn parse_content(
    path: PathBuf,
    kind: ConfigKind,
    content: String,
    file_idx: usize,
) -> (ConfigFile, Vec<ReadWarning>) {
    let mut lines = Vec::new();
    let mut warnings = Vec::new();

    for (line_idx, chunk) in content.split_inclusive('\n').enumerate() {
        let (text, eol) = if let Some(text) = chunk.strip_suffix("\r\n") {
            (text, "\r\n")
        } else if let Some(text) = chunk.strip_suffix('\n') {
            (text, "\n")
        } else {
            (chunk, "")
        };

        let content = match parse_line(kind, text, file_idx, line_idx) {
            Ok(Some(entry)) => LineContent::Entry(entry),
            Ok(None) => LineContent::Passthrough(text.to_string()),
            Err(reason) => {
                warnings.push(ReadWarning {
                    path: path.clone(),
                    line: line_idx + 1,
                    text: text.to_string(),
                    reason,
                });
                LineContent::Passthrough(text.to_string())
            }
        };

        lines.push(ConfigLine {
            content,
            eol: eol.to_string(),
        });
    }

    (ConfigFile::new(path, kind, Some(content), lines), warnings)
}

/// Parse one line; `Ok(None)` for blank and comment lines
fn parse_line(
    kind: ConfigKind,
    text: &str,
    file: usize,
    line: usize,
) -> std::result::Result<Option<EntryLine>, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let words = split_words(text);
    let (_, atom_text) = words[0];
    let atom: PackageAtom = atom_text.parse().map_err(|e: ConfigError| e.to_string())?;

    let mut tokens = Vec::new();
    let mut comment = None;
    let mut group: Option<String> = None;
    let mut open_header: Option<&str> = None;

    for &(offset, word) in &words[1..] {
        if word.starts_with('#') {
            comment = Some(&text[offset..]);
            break;
        }

        if kind.supports_groups() && word.len() > 1 && word.ends_with(':') {
            if let Some(header) = open_header {
                return Err(format!("group {} has no flags", header));
            }
            group = Some(word[..word.len() - 1].to_lowercase());
            open_header = Some(word);
            tokens.push(LineToken::Group(word.to_string()));
            continue;
        }

        let (sign, short) = kind.parse_token(word)?;
        let name = match &group {
            Some(group) => format!("{}_{}", group, short),
            None => short.to_string(),
        };
        tokens.push(LineToken::Flag(FlagEntry::loaded(
            name,
            short.to_string(),
            sign,
            word,
            file,
            line,
        )));
        open_header = None;
    }

    if let Some(header) = open_header {
        return Err(format!("group {} has no flags", header));
    }

    Ok(Some(EntryLine::parsed(atom, atom_text, tokens, comment, text)))
}

/// Whitespace separated words with their byte offsets
fn split_words(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                words.push((s, &text[s..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        words.push((s, &text[s..]));
    }
    words
}
