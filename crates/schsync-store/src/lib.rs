//! Store adapter between the canonical circuit model and persisted schematic
//! files.
//!
//! The engine talks to a [`SchematicStore`]; [`FileStore`] is the
//! s-expression file-tree implementation used everywhere outside of tests
//! that fake the seam. One file per sheet, loaded recursively from the root
//! sheet file.
//!
//! Two guarantees matter to callers:
//!
//! * **Stable identity.** `save` assigns a fresh v4 uuid to every entity that
//!   lacks one and reports the assignment; it never rewrites an existing
//!   uuid.
//! * **Deterministic emission.** Symbols are written in natural reference
//!   order, labels by `(net, anchor)`, sheets by name, so saving a loaded
//!   circuit reproduces the file byte for byte.

mod doc;
mod file;

pub use file::FileStore;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use schsync_model::Circuit;
use uuid::Uuid;

/// Store-level failures. Everything here aborts a run before any target file
/// is touched.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error in {file}: {source}")]
    Parse {
        file: PathBuf,
        #[source]
        source: schsync_sexpr::ParseError,
    },
    #[error("Not a schematic document: {0}")]
    NotASchematic(PathBuf),
    #[error("Sheet file cycle through {0}")]
    SheetCycle(PathBuf),
    #[error("Missing sheet file {0}")]
    MissingSheet(PathBuf),
    #[error("Reference designator '{0}' appears on more than one sheet")]
    DuplicateReference(String),
}

/// One sheet file as loaded from disk: its path relative to the store root
/// and its exact bytes. `source` is empty for sheets that do not exist yet.
#[derive(Debug, Clone)]
pub struct LoadedSheet {
    pub file: PathBuf,
    pub source: String,
    /// The sheet file's own identity node, when present.
    pub uuid: Option<Uuid>,
}

impl LoadedSheet {
    pub fn exists(&self) -> bool {
        !self.source.is_empty()
    }
}

/// Result of loading a target directory: the unified circuit view plus the
/// raw per-file state needed for idempotency checks and surgical patching.
#[derive(Debug, Clone)]
pub struct Existing {
    pub circuit: Circuit,
    pub sheets: BTreeMap<PathBuf, LoadedSheet>,
    pub root_file: PathBuf,
}

impl Existing {
    /// A target with no files yet.
    pub fn empty(root_file: PathBuf) -> Self {
        Self {
            circuit: Circuit::new(),
            sheets: BTreeMap::new(),
            root_file,
        }
    }
}

/// One file written (or skipped) by a save.
#[derive(Debug, Clone)]
pub struct SavedFile {
    pub file: PathBuf,
    /// Whether the emitted bytes differ from what the target held at load.
    pub changed: bool,
}

/// A uuid minted during save for an entity that had none.
#[derive(Debug, Clone)]
pub struct AssignedUuid {
    pub file: PathBuf,
    /// Human-readable entity key, e.g. `symbol R1` or `label VCC@R1.1`.
    pub entity: String,
    pub uuid: Uuid,
}

/// What a save did: every emitted file with its changed flag, files that the
/// circuit no longer references, and the identities minted along the way.
#[derive(Debug, Clone, Default)]
pub struct SaveOutcome {
    pub files: Vec<SavedFile>,
    pub deleted: Vec<PathBuf>,
    pub assigned: Vec<AssignedUuid>,
}

impl SaveOutcome {
    /// Files whose bytes changed relative to the loaded state.
    pub fn changed_files(&self) -> Vec<&PathBuf> {
        self.files
            .iter()
            .filter(|f| f.changed)
            .map(|f| &f.file)
            .collect()
    }

    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty() && self.files.iter().all(|f| !f.changed)
    }
}

/// The seam the engine consumes. Implementations translate between the
/// canonical model and whatever the persisted representation is.
pub trait SchematicStore {
    /// Load the target directory into a unified circuit. A missing root file
    /// yields an empty [`Existing`], not an error.
    fn load(&self, dir: &Path) -> Result<Existing, StoreError>;

    /// Emit every sheet of `circuit` into `dir`, reusing identity and layout
    /// from `prior` where entities survive.
    fn save(&self, circuit: &Circuit, prior: &Existing, dir: &Path)
    -> Result<SaveOutcome, StoreError>;

    /// Apply a pure net-rename set to one sheet without re-emitting it,
    /// returning the patched bytes. `None` means the store has no surgical
    /// path and the caller should fall back to a full save.
    fn rename_nets(
        &self,
        sheet: &LoadedSheet,
        renames: &BTreeMap<String, String>,
    ) -> Result<Option<String>, StoreError> {
        let _ = (sheet, renames);
        Ok(None)
    }
}
