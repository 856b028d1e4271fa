//! What a run did, in a shape callers can print or serialize.

use std::path::PathBuf;

use schsync_model::NetNode;
use serde::{Deserialize, Serialize};

/// The pass that paired a desired component with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Uuid,
    Reference,
    Position,
    SignatureGroup,
    Topology,
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MatchStrategy::Uuid => "uuid",
            MatchStrategy::Reference => "reference",
            MatchStrategy::Position => "position",
            MatchStrategy::SignatureGroup => "signature group",
            MatchStrategy::Topology => "topology",
        };
        f.write_str(name)
    }
}

/// A component that kept its identity under a new reference designator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRename {
    pub from: String,
    pub to: String,
    pub strategy: MatchStrategy,
}

/// A pin gaining or losing its net label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetBinding {
    pub net: String,
    pub node: NetNode,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetRename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetMerge {
    pub survivor: String,
    pub absorbed: String,
}

/// A boundary port added to or removed from one sheet. The single name
/// covers both persisted halves: the hierarchical label in the child file
/// and the pin on the parent's sheet symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortChange {
    /// Path of the sheet from the root.
    pub sheet: Vec<String>,
    pub port: String,
}

/// Every net-level edit of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NetChanges {
    pub attached: Vec<NetBinding>,
    pub detached: Vec<NetBinding>,
    pub renamed: Vec<NetRename>,
    pub merged: Vec<NetMerge>,
    pub ports_added: Vec<PortChange>,
    pub ports_removed: Vec<PortChange>,
}

impl NetChanges {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
            && self.detached.is_empty()
            && self.renamed.is_empty()
            && self.merged.is_empty()
            && self.ports_added.is_empty()
            && self.ports_removed.is_empty()
    }
}

/// A place where desired and the target disagreed. None of these stop the
/// run; they record what the run decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    /// A declarative field differed between desired and the file. Desired
    /// won; the file's old value is kept here.
    FieldOverride {
        reference: String,
        field: String,
        existing: String,
        desired: String,
    },
    /// A fallback pass found more than one equally good pairing. Nothing was
    /// guessed; the component is treated as an add.
    AmbiguousMatch {
        desired: String,
        candidates: Vec<String>,
    },
    /// A pin carrying more than one label in the target. Left exactly as
    /// found.
    FrozenPin { node: NetNode, nets: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Everything applied, no disagreements.
    Applied,
    /// Applied, with conflicts recorded.
    AppliedWithConflicts,
    /// Nothing was written; the report is a preview.
    DryRun,
}

/// The full account of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// References of components created in the target.
    pub added: Vec<String>,
    /// References of generated components deleted from the target.
    pub removed: Vec<String>,
    pub renamed: Vec<ComponentRename>,
    /// References of target-only components left untouched.
    pub preserved: Vec<String>,
    pub net_changes: NetChanges,
    pub conflicts: Vec<Conflict>,
    /// Files whose bytes changed (or were deleted), relative to the target.
    pub touched_files: Vec<PathBuf>,
    pub status: SyncStatus,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.renamed.is_empty()
            && self.net_changes.is_empty()
            && self.touched_files.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
