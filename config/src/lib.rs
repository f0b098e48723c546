//! Buckos Package Flag Configuration
//!
//! This crate edits the per-package flag files under `/etc/portage`
//! (`package.use`, `package.accept_keywords`, ...) while keeping every
//! line it does not need to touch exactly as it was.
//!
//! # Overview
//!
//! - [`token`]: Parsing `+flag`, `-kw::~amd64`, `%doc` style specifiers
//! - [`kind`]: Configuration kinds and their on-disk token syntax
//! - [`atom`]: Package atoms
//! - [`reader`]: Loading a directory of files into a [`ConfigStore`]
//! - [`store`]: The line-preserving in-memory model
//! - [`merge`]: Applying operations to a store
//! - [`cleanup`]: Optional maintenance passes
//! - [`writer`]: Atomic per-file persistence
//! - [`loader`]: Settings loading and store location
//! - [`editor`]: Load, merge and write in one call
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use buckos_config::{ConfigLoader, FlagEditor, Operation};
//!
//! let settings = ConfigLoader::system().load().unwrap();
//! let editor = FlagEditor::new(settings);
//!
//! let ops = vec![
//!     Operation::parse("app-editors/vim", "+python").unwrap(),
//!     Operation::parse("app-editors/vim", "+kw::~amd64").unwrap(),
//! ];
//! let report = editor.edit(&ops).unwrap();
//! for change in &report.write.changed {
//!     println!("updated {}", change.path.display());
//! }
//! ```
//!
//! # Working With a Single Store
//!
//! ```rust
//! use buckos_config::{ConfigKind, ConfigStore, MergeEngine, Operation};
//!
//! let mut store = ConfigStore::new(ConfigKind::UseFlag, "/etc/portage/package.use/99local.conf");
//! let report = MergeEngine::new(&mut store)
//!     .apply(&[Operation::parse("dev-lang/rust", "+doc").unwrap()]);
//!
//! assert_eq!(report.added, 1);
//! assert_eq!(store.files()[0].render(), "dev-lang/rust doc\n");
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! /etc/portage/
//! ├── package.use/               # USE flags          (use::)
//! ├── package.accept_keywords/   # Keywords           (kw::)
//! ├── package.license/           # Licenses           (lic::)
//! ├── package.properties/        # Properties         (prop::)
//! ├── package.accept_restrict/   # Restrict tags      (restrict::)
//! ├── package.env/               # Environment files  (env::)
//! └── profile/
//!     └── package.use.mask/      # USE masks          (mask::)
//! ```

// Core modules
pub mod atom;
pub mod error;
pub mod kind;
pub mod token;

// Store modules
pub mod cleanup;
pub mod merge;
pub mod reader;
pub mod store;
pub mod writer;

// Configuration modules
pub mod editor;
pub mod loader;
pub mod settings;

// Re-exports for convenience
pub use atom::{PackageAtom, VersionOp};
pub use editor::{EditReport, FlagEditor, KindReport, QueryMatch};
pub use error::{ConfigError, Result};
pub use kind::{ConfigKind, FlagSyntax, Sign};
pub use loader::{load_store, load_system_settings, locate, paths, ConfigLoader, StoreLocation};
pub use merge::{MergeEngine, MergeReport};
pub use reader::{ReadWarning, StoreReader};
pub use settings::FlagSettings;
pub use store::{ConfigFile, ConfigStore, FlagEntry, Provenance};
pub use token::{FlagQuery, FlagSpec, Operation, PackageScope, SpecAction};
pub use writer::{FileChange, StoreWriter, WriteReport};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ConfigError, ConfigKind, ConfigLoader, ConfigStore, EditReport, FlagEditor, FlagSettings,
        FlagSpec, MergeEngine, Operation, PackageAtom, PackageScope, Result, Sign, StoreReader,
        StoreWriter,
    };
}
