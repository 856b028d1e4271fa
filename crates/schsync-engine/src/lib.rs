//! Reconciliation engine between a desired circuit and a schematic file
//! tree.
//!
//! [`sync`] is the whole pipeline: load the target through a
//! [`SchematicStore`], pair desired components with existing symbols
//! ([`matcher`]), decide which sheets live and die ([`sheets`]), reconcile
//! connectivity ([`nets`]), assemble the output circuit ([`apply::merge`]),
//! stage the resulting bytes in a scratch directory and finally write them
//! atomically. The run produces a [`SyncReport`] of every edit and every
//! disagreement; with [`SyncOptions::dry_run`] the report is produced and
//! nothing is written.
//!
//! The engine is conservative by construction: components the user drew stay
//! untouched, files without a semantic edit keep their bytes verbatim, and a
//! matching fallback that cannot decide between candidates adds instead of
//! guessing.

pub mod apply;
pub mod matcher;
pub mod nets;
pub mod placement;
pub mod report;
pub mod sheets;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::info;
use schsync_model::{Circuit, ModelError, PowerNetTable};
use schsync_store::{SchematicStore, StoreError};

pub use crate::matcher::MatchTuning;
pub use crate::placement::{GridPlacer, PlacementProvider, SheetContext};
pub use crate::report::{
    ComponentRename, Conflict, MatchStrategy, NetChanges, SyncReport, SyncStatus,
};
pub use crate::sheets::SHEET_EXTENSION;

/// Failures that abort a run. Everything except [`SyncError::PartialApply`]
/// happens before any target file is touched.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The commit failed partway through. `committed` files had been written
    /// when it failed and `restored` of them were rolled back to their prior
    /// bytes.
    #[error("apply failed after {committed} file(s), {restored} restored: {source}")]
    PartialApply {
        committed: usize,
        restored: usize,
        #[source]
        source: anyhow::Error,
    },
}

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Compute and report everything, write nothing.
    pub dry_run: bool,
    pub tuning: MatchTuning,
    /// Names treated as power rails when the desired design does not say.
    pub power: PowerNetTable,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            tuning: MatchTuning::default(),
            power: PowerNetTable::builtin(),
        }
    }
}

/// Reconcile `desired` into the schematic tree at `target`.
///
/// The desired circuit is validated up front; a malformed design (duplicate
/// references, bindings to unknown pins) aborts before the target is read.
/// All decisions are made against an in-memory snapshot and staged to a
/// scratch directory first, so a failure anywhere up to the final commit
/// leaves the target exactly as it was.
pub fn sync(
    desired: &Circuit,
    target: &Path,
    store: &dyn SchematicStore,
    placer: &dyn PlacementProvider,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    desired.validate()?;
    let mut desired = desired.clone();
    desired.classify_power(&options.power);

    let prior = store.load(target)?;
    info!(
        "Syncing {} desired component(s) against {}",
        desired.components().len(),
        target.display()
    );

    let matches = matcher::match_components(&desired, &prior.circuit, &options.tuning);
    let plan = sheets::plan(&desired, &prior.circuit, &prior.root_file);
    let nets = nets::derive(&desired, &prior.circuit, &matches, &plan);
    let merged = apply::merge(&desired, &prior.circuit, &matches, &plan, &nets, placer);
    merged.circuit.validate_references()?;

    let dirty_files = files_of(&merged.dirty, &plan);
    let staged = apply::stage(&merged.circuit, &prior, store, &dirty_files, &nets.renames)?;

    let mut conflicts = merged.conflicts;
    for ambiguity in &matches.ambiguous {
        conflicts.push(Conflict::AmbiguousMatch {
            desired: ambiguity.desired.clone(),
            candidates: ambiguity.candidates.clone(),
        });
    }
    conflicts.extend(nets.frozen.iter().cloned());

    let mut touched: Vec<PathBuf> = staged.changed.iter().map(|(file, _)| file.clone()).collect();
    touched.extend(staged.deleted.iter().cloned());
    touched.sort();

    let mut report = SyncReport {
        added: merged.added,
        removed: merged.removed,
        renamed: merged.renamed,
        preserved: merged.preserved,
        net_changes: NetChanges {
            attached: nets.attached.clone(),
            detached: nets.detached.clone(),
            renamed: nets.rename_pairs(),
            merged: nets.merged.clone(),
            ports_added: nets.ports_added.clone(),
            ports_removed: nets.ports_removed.clone(),
        },
        conflicts,
        touched_files: touched,
        status: SyncStatus::DryRun,
    };

    if options.dry_run {
        info!(
            "Dry run: {} file(s) would change",
            report.touched_files.len()
        );
        return Ok(report);
    }

    if let Err(failure) = apply::commit(&staged, &prior, target) {
        return Err(SyncError::PartialApply {
            committed: failure.committed,
            restored: failure.restored,
            source: failure.source,
        });
    }

    report.status = if report.conflicts.is_empty() {
        SyncStatus::Applied
    } else {
        SyncStatus::AppliedWithConflicts
    };
    info!(
        "Applied: {} added, {} removed, {} renamed, {} file(s) written",
        report.added.len(),
        report.removed.len(),
        report.renamed.len(),
        report.touched_files.len()
    );
    Ok(report)
}

/// Map dirty sheet paths to the files that back them.
fn files_of(dirty: &BTreeSet<Vec<String>>, plan: &sheets::SheetPlan) -> BTreeSet<PathBuf> {
    dirty
        .iter()
        .filter_map(|path| plan.file(path).cloned())
        .collect()
}
