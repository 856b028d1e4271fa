//! Assembly and application of the merged circuit.
//!
//! [`merge`] folds the match, sheet and net decisions into one output
//! [`Circuit`]: declarative fields come from the desired design, layout and
//! identity from the target files, and user-owned entities ride along
//! untouched. [`stage`] emits that circuit into a scratch directory, decides
//! file by file whether the target gets new bytes, a surgical patch or its
//! prior bytes verbatim, and parses the result back as a final sanity check.
//! [`commit`] moves the staged bytes into the target atomically and rolls
//! back to the prior bytes if any write fails.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use log::{debug, error, info, warn};
use schsync_model::{Circuit, Component, Origin, Position, Subcircuit, natural};
use schsync_store::{AssignedUuid, Existing, SchematicStore, StoreError};

use crate::matcher::MatchResult;
use crate::nets::{NetSync, RenameOp};
use crate::placement::{PlacementProvider, SheetContext};
use crate::report::{ComponentRename, Conflict, MatchStrategy};
use crate::sheets::SheetPlan;

/// Sheet symbols that have never been placed stack in a column to the right
/// of the component grid.
const SHEET_COLUMN_X: f64 = 152.4;
const SHEET_COLUMN_Y: f64 = 25.4;
const SHEET_COLUMN_PITCH: f64 = 25.4;

/// The merged circuit plus everything the report needs to describe how it
/// came about. `dirty` collects the sheet paths whose semantics changed;
/// files outside it may only be touched by surgical net-rename patches.
#[derive(Debug)]
pub struct Merge {
    pub circuit: Circuit,
    pub conflicts: Vec<Conflict>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub renamed: Vec<ComponentRename>,
    pub preserved: Vec<String>,
    pub dirty: BTreeSet<Vec<String>>,
}

/// Build the output circuit from the desired design, the loaded target and
/// the decisions made by the matcher, sheet planner and net reconciler.
///
/// Field precedence for a matched component: reference, lib id, value,
/// footprint, properties and pins come from the desired side; position and
/// uuid come from the target. Differing declarative fields are overwritten
/// and reported as [`Conflict::FieldOverride`].
pub fn merge(
    desired: &Circuit,
    existing: &Circuit,
    matches: &MatchResult<'_>,
    plan: &SheetPlan,
    nets: &NetSync,
    placer: &dyn PlacementProvider,
) -> Merge {
    let mut existing_sheets: BTreeMap<Vec<String>, &Subcircuit> = BTreeMap::new();
    let mut existing_scope: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    existing.walk_sheets(|path, sheet| {
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        for component in &sheet.components {
            existing_scope.insert(component.reference.as_str(), path.clone());
        }
        existing_sheets.insert(path, sheet);
    });

    let mut desired_sheets: BTreeMap<Vec<String>, &Subcircuit> = BTreeMap::new();
    desired.walk_sheets(|path, sheet| {
        desired_sheets.insert(path.iter().map(|s| s.to_string()).collect(), sheet);
    });

    let mut counterpart: BTreeMap<&str, (&Component, MatchStrategy)> = BTreeMap::new();
    for pair in &matches.pairs {
        let wanted = matches.desired_component(pair.desired);
        let found = matches.existing_component(pair.existing);
        counterpart.insert(wanted.reference.as_str(), (found, pair.strategy));
    }

    let mut out = Merge {
        circuit: Circuit::new(),
        conflicts: Vec::new(),
        added: Vec::new(),
        removed: Vec::new(),
        renamed: Vec::new(),
        preserved: Vec::new(),
        dirty: nets.dirty.clone(),
    };

    // One skeleton node per surviving sheet. Identity and placement of the
    // sheet symbol come from the target where the sheet already exists.
    let mut nodes: BTreeMap<Vec<String>, Subcircuit> = BTreeMap::new();
    let mut column: BTreeMap<Vec<String>, usize> = BTreeMap::new();
    for (path, file) in &plan.files {
        let prior = existing_sheets.get(path).copied();
        let declared = desired_sheets.get(path).copied();
        let mut sub = Subcircuit::new(path.last().cloned().unwrap_or_default());
        if !path.is_empty() {
            sub.file = Some(file.clone());
        }
        sub.uuid = prior
            .and_then(|s| s.uuid)
            .or_else(|| declared.and_then(|s| s.uuid));
        sub.position = prior
            .and_then(|s| s.position)
            .or_else(|| declared.and_then(|s| s.position));
        sub.origin = match prior {
            Some(s) => s.origin,
            None => Origin::Generated,
        };
        if sub.position.is_none() && !path.is_empty() {
            let parent = path[..path.len() - 1].to_vec();
            let slot = column.entry(parent.clone()).or_insert(0);
            sub.position = Some(Position::new(
                SHEET_COLUMN_X,
                SHEET_COLUMN_Y + *slot as f64 * SHEET_COLUMN_PITCH,
            ));
            *slot += 1;
            if prior.is_some() {
                // The sheet existed without a placement; its parent file
                // gains one now.
                out.dirty.insert(parent);
            }
        }

        let mut annotations = prior.map(|s| s.annotations.clone()).unwrap_or_default();
        if let Some(declared) = declared {
            let have: BTreeSet<String> = annotations.iter().map(|a| a.text.clone()).collect();
            for note in &declared.annotations {
                if !have.contains(&note.text) {
                    annotations.push(note.clone());
                    out.dirty.insert(path.clone());
                }
            }
        }
        sub.annotations = annotations;
        sub.ports = nets.ports.get(path).cloned().unwrap_or_default();
        sub.nets = nets.nets.get(path).cloned().unwrap_or_default();
        nodes.insert(path.clone(), sub);
    }

    // Matched and added components, on the sheet the desired design puts
    // them.
    for (path, sheet) in &desired_sheets {
        for component in &sheet.components {
            let Some(node) = nodes.get_mut(path) else {
                continue;
            };
            match counterpart.get(component.reference.as_str()) {
                Some(&(prior, strategy)) => {
                    let merged =
                        reconcile(component, prior, strategy, path, &existing_scope, &mut out);
                    node.components.push(merged);
                }
                None => {
                    debug!("Adding {} to sheet /{}", component.reference, path.join("/"));
                    let mut fresh = component.clone();
                    fresh.origin = Origin::Generated;
                    out.added.push(component.reference.clone());
                    out.dirty.insert(path.clone());
                    node.components.push(fresh);
                }
            }
        }
    }

    // User symbols and contested candidates stay where the target has them.
    for component in matches.preserved() {
        let Some(path) = existing_scope.get(component.reference.as_str()) else {
            continue;
        };
        if let Some(node) = nodes.get_mut(path) {
            out.preserved.push(component.reference.clone());
            node.components.push(component.clone());
        } else {
            warn!("Preserved symbol {} lost its sheet", component.reference);
        }
    }

    for component in matches.removal_candidates() {
        info!("Removing {}", component.reference);
        out.removed.push(component.reference.clone());
        if let Some(path) = existing_scope.get(component.reference.as_str()) {
            out.dirty.insert(path.clone());
        }
    }

    // Place whatever still has no position, sheet by sheet, feeding each
    // placement back into the occupied set.
    let paths: Vec<Vec<String>> = nodes.keys().cloned().collect();
    for path in &paths {
        let mut occupied: Vec<Position> = Vec::new();
        for other in &paths {
            if other.len() == path.len() + 1 && other.starts_with(path.as_slice()) {
                if let Some(position) = nodes.get(other).and_then(|n| n.position) {
                    occupied.push(position);
                }
            }
        }
        let Some(node) = nodes.get_mut(path) else {
            continue;
        };
        occupied.extend(node.components.iter().filter_map(|c| c.position));
        for index in 0..node.components.len() {
            if node.components[index].position.is_some() {
                continue;
            }
            let context = SheetContext {
                path: path.as_slice(),
                occupied: &occupied,
            };
            let position = placer.place(&node.components[index], &context);
            node.components[index].position = Some(position);
            occupied.push(position);
            out.dirty.insert(path.clone());
        }
    }

    for (path, _) in &plan.added {
        out.dirty.insert(path.clone());
        if !path.is_empty() {
            out.dirty.insert(path[..path.len() - 1].to_vec());
        }
    }
    for (path, _) in &plan.removed {
        if !path.is_empty() {
            out.dirty.insert(path[..path.len() - 1].to_vec());
        }
    }

    // Stitch the nodes into a tree, deepest paths first so every child is
    // complete before its parent absorbs it.
    for path in paths.iter().rev() {
        if path.is_empty() {
            continue;
        }
        if let Some(node) = nodes.remove(path) {
            let parent = &path[..path.len() - 1];
            match nodes.get_mut(parent) {
                Some(holder) => holder.children.push(node),
                None => warn!("Sheet /{} has no parent node", path.join("/")),
            }
        }
    }
    let root = nodes.remove(&Vec::new()).unwrap_or_default();
    out.circuit = Circuit::with_root(root);

    out.added.sort_by(|a, b| natural::compare(a, b));
    out.removed.sort_by(|a, b| natural::compare(a, b));
    out.preserved.sort_by(|a, b| natural::compare(a, b));
    out.renamed.sort_by(|a, b| natural::compare(&a.to, &b.to));
    out
}

/// Fold one matched pair into an output component, recording renames,
/// overrides and dirt along the way.
fn reconcile(
    wanted: &Component,
    prior: &Component,
    strategy: MatchStrategy,
    path: &[String],
    existing_scope: &BTreeMap<&str, Vec<String>>,
    out: &mut Merge,
) -> Component {
    let mut merged = wanted.clone();
    merged.position = prior.position.or(wanted.position);
    merged.uuid = prior.uuid.or(wanted.uuid);
    merged.origin = Origin::Generated;

    if prior.reference != wanted.reference {
        info!(
            "Renaming {} -> {} ({strategy})",
            prior.reference, wanted.reference
        );
        out.renamed.push(ComponentRename {
            from: prior.reference.clone(),
            to: wanted.reference.clone(),
            strategy,
        });
    }

    if prior.lib_id != wanted.lib_id {
        out.conflicts.push(Conflict::FieldOverride {
            reference: wanted.reference.clone(),
            field: "lib_id".to_string(),
            existing: prior.lib_id.clone(),
            desired: wanted.lib_id.clone(),
        });
    }
    if !prior.value.is_empty() && prior.value != wanted.value {
        out.conflicts.push(Conflict::FieldOverride {
            reference: wanted.reference.clone(),
            field: "value".to_string(),
            existing: prior.value.clone(),
            desired: wanted.value.clone(),
        });
    }
    if let Some(footprint) = &prior.footprint {
        if wanted.footprint.as_deref() != Some(footprint.as_str()) {
            out.conflicts.push(Conflict::FieldOverride {
                reference: wanted.reference.clone(),
                field: "footprint".to_string(),
                existing: footprint.clone(),
                desired: wanted.footprint.clone().unwrap_or_default(),
            });
        }
    }

    let home = existing_scope.get(prior.reference.as_str());
    let moved = home.map(|h| h.as_slice() != path).unwrap_or(false);
    let edited = prior.reference != wanted.reference
        || prior.lib_id != wanted.lib_id
        || prior.value != wanted.value
        || prior.footprint != wanted.footprint
        || prior.properties != wanted.properties
        || prior.pins != wanted.pins
        || !prior.origin.is_generated();
    if edited || moved || prior.position.is_none() {
        out.dirty.insert(path.to_vec());
    }
    if moved {
        if let Some(home) = home {
            out.dirty.insert(home.clone());
        }
    }
    merged
}

/// The final per-file byte decisions. `changed` holds exactly the files the
/// commit will write, with their complete new contents.
#[derive(Debug)]
pub struct Staged {
    pub changed: Vec<(PathBuf, String)>,
    pub deleted: Vec<PathBuf>,
    pub assigned: Vec<AssignedUuid>,
}

/// Emit the merged circuit into a scratch directory and decide, file by
/// file, what the target should end up holding.
///
/// A file outside `dirty_files` has no recorded semantic edit, so its
/// re-emission can only differ by canonicalization; it keeps its prior bytes
/// verbatim, unless a net rename applies, in which case the rename is
/// patched into the prior bytes surgically. The finished scratch tree is
/// loaded back once so a malformed emission aborts before the target is
/// touched.
pub fn stage(
    merged: &Circuit,
    prior: &Existing,
    store: &dyn SchematicStore,
    dirty_files: &BTreeSet<PathBuf>,
    renames: &[RenameOp],
) -> Result<Staged, StoreError> {
    let workdir = tempfile::tempdir()?;
    let dir = workdir.path();

    let outcome = store.save(merged, prior, dir)?;
    if !outcome.assigned.is_empty() {
        debug!("Assigned {} fresh uuid(s)", outcome.assigned.len());
    }

    let mut changed: Vec<(PathBuf, String)> = Vec::new();
    for saved in &outcome.files {
        if !saved.changed {
            continue;
        }
        let text = finalize_file(&saved.file, dir, prior, store, dirty_files, renames)?;
        let unchanged = prior
            .sheets
            .get(&saved.file)
            .is_some_and(|s| s.source == text);
        if !unchanged {
            changed.push((saved.file.clone(), text));
        }
    }

    let reloaded = store.load(dir)?;
    debug!(
        "Staging copy verified: {} sheet file(s)",
        reloaded.sheets.len()
    );

    Ok(Staged {
        changed,
        deleted: outcome.deleted,
        assigned: outcome.assigned,
    })
}

fn finalize_file(
    file: &Path,
    dir: &Path,
    prior: &Existing,
    store: &dyn SchematicStore,
    dirty_files: &BTreeSet<PathBuf>,
    renames: &[RenameOp],
) -> Result<String, StoreError> {
    let emitted = fs::read_to_string(dir.join(file))?;
    if dirty_files.contains(file) {
        return Ok(emitted);
    }
    let Some(sheet) = prior.sheets.get(file).filter(|s| s.exists()) else {
        return Ok(emitted);
    };
    let map: BTreeMap<String, String> = renames
        .iter()
        .filter(|op| op.applies_to(file))
        .map(|op| (op.from.clone(), op.to.clone()))
        .collect();
    let text = if map.is_empty() {
        // Canonicalization-only difference; the user's layout wins.
        debug!("Keeping prior bytes of {}", file.display());
        sheet.source.clone()
    } else {
        match store.rename_nets(sheet, &map)? {
            Some(patched) => patched,
            None => return Ok(emitted),
        }
    };
    fs::write(dir.join(file), &text)?;
    Ok(text)
}

/// A commit that could not complete. `committed` counts the files written
/// before the failure, `restored` how many of those the rollback recovered.
#[derive(Debug)]
pub struct ApplyFailure {
    pub committed: usize,
    pub restored: usize,
    pub source: anyhow::Error,
}

/// Write the staged files into the target directory. Each file lands
/// atomically; if any write or deletion fails, every file touched so far is
/// restored to its prior bytes.
pub fn commit(staged: &Staged, prior: &Existing, dir: &Path) -> Result<(), ApplyFailure> {
    let mut written: Vec<PathBuf> = Vec::new();
    if let Err(source) = push_files(staged, dir, &mut written) {
        error!("Apply failed after {} file(s): {source:#}", written.len());
        let restored = roll_back(&written, prior, dir);
        return Err(ApplyFailure {
            committed: written.len(),
            restored,
            source,
        });
    }
    Ok(())
}

fn push_files(staged: &Staged, dir: &Path, written: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for (file, text) in &staged.changed {
        let path = dir.join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
            .write(|f| {
                f.write_all(text.as_bytes())?;
                f.flush()
            })
            .map_err(|err| anyhow!("Failed to write {}: {err}", path.display()))?;
        written.push(file.clone());
        info!("Wrote {}", path.display());
    }
    for file in &staged.deleted {
        let path = dir.join(file);
        match fs::remove_file(&path) {
            Ok(()) => {
                written.push(file.clone());
                info!("Deleted {}", path.display());
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(anyhow!("Failed to delete {}: {err}", path.display())),
        }
    }
    Ok(())
}

fn roll_back(written: &[PathBuf], prior: &Existing, dir: &Path) -> usize {
    let mut restored = 0;
    for file in written {
        let path = dir.join(file);
        let result = match prior.sheets.get(file).filter(|s| s.exists()) {
            Some(sheet) => fs::write(&path, &sheet.source),
            None => match fs::remove_file(&path) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
                _ => Ok(()),
            },
        };
        match result {
            Ok(()) => restored += 1,
            Err(err) => error!("Could not restore {}: {err}", path.display()),
        }
    }
    if restored > 0 {
        warn!("Rolled back {restored} of {} file(s)", written.len());
    }
    restored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{MatchTuning, match_components};
    use crate::placement::GridPlacer;
    use crate::{nets, sheets};
    use schsync_model::{Annotation, Pin, Subcircuit};
    use uuid::Uuid;

    fn run(desired: &Circuit, existing: &Circuit) -> Merge {
        let matches = match_components(desired, existing, &MatchTuning::default());
        let plan = sheets::plan(desired, existing, Path::new("main.schsync_sch"));
        let nets = nets::derive(desired, existing, &matches, &plan);
        merge(
            desired,
            existing,
            &matches,
            &plan,
            &nets,
            &GridPlacer::default(),
        )
    }

    fn resistor(reference: &str, value: &str) -> Component {
        Component::new(reference, "Device:R")
            .with_value(value)
            .with_pins(vec![Pin::new("1"), Pin::new("2")])
    }

    #[test]
    fn desired_fields_override_the_file() {
        let desired = Circuit::with_root(Subcircuit::new("").with_component(resistor("R1", "10k")));
        let existing = Circuit::with_root(
            Subcircuit::new("").with_component(
                resistor("R1", "22k")
                    .with_position(Position::new(50.8, 25.4))
                    .with_origin(Origin::Generated),
            ),
        );

        let merge = run(&desired, &existing);

        let r1 = merge.circuit.component("R1").unwrap();
        assert_eq!(r1.value, "10k");
        assert!(matches!(
            merge.conflicts.as_slice(),
            [Conflict::FieldOverride { field, existing, desired, .. }]
                if field == "value" && existing == "22k" && desired == "10k"
        ));
    }

    #[test]
    fn layout_survives_declarative_updates() {
        let uuid = Uuid::new_v4();
        let desired = Circuit::with_root(Subcircuit::new("").with_component(resistor("R1", "10k")));
        let existing = Circuit::with_root(
            Subcircuit::new("").with_component(
                resistor("R1", "10k")
                    .with_position(Position::new(77.47, 40.64))
                    .with_uuid(uuid)
                    .with_origin(Origin::Generated),
            ),
        );

        let merge = run(&desired, &existing);

        let r1 = merge.circuit.component("R1").unwrap();
        assert_eq!(r1.position, Some(Position::new(77.47, 40.64)));
        assert_eq!(r1.uuid, Some(uuid));
        assert!(merge.conflicts.is_empty());
        assert!(merge.dirty.is_empty(), "nothing changed: {:?}", merge.dirty);
    }

    #[test]
    fn new_components_take_free_grid_slots() {
        let desired = Circuit::with_root(
            Subcircuit::new("")
                .with_component(resistor("R1", "10k"))
                .with_component(resistor("R2", "22k")),
        );
        let existing = Circuit::with_root(
            Subcircuit::new("").with_component(
                resistor("R1", "10k")
                    .with_position(Position::new(25.4, 25.4))
                    .with_origin(Origin::Generated),
            ),
        );

        let merge = run(&desired, &existing);

        assert_eq!(merge.added, vec!["R2"]);
        let r2 = merge.circuit.component("R2").unwrap();
        assert_eq!(r2.position, Some(Position::new(38.1, 25.4)));
        assert_eq!(r2.origin, Origin::Generated);
    }

    #[test]
    fn user_symbols_ride_along() {
        let desired = Circuit::with_root(Subcircuit::new("").with_component(resistor("R1", "10k")));
        let existing = Circuit::with_root(
            Subcircuit::new("")
                .with_component(
                    resistor("R1", "10k")
                        .with_position(Position::new(25.4, 25.4))
                        .with_origin(Origin::Generated),
                )
                .with_component(resistor("R9", "1k").with_position(Position::new(100.0, 100.0))),
        );

        let merge = run(&desired, &existing);

        assert_eq!(merge.preserved, vec!["R9"]);
        let r9 = merge.circuit.component("R9").unwrap();
        assert_eq!(r9.origin, Origin::User);
        assert_eq!(r9.position, Some(Position::new(100.0, 100.0)));
    }

    #[test]
    fn stale_generated_symbols_drop_out() {
        let desired = Circuit::with_root(Subcircuit::new("").with_component(resistor("R1", "10k")));
        let existing = Circuit::with_root(
            Subcircuit::new("")
                .with_component(
                    resistor("R1", "10k")
                        .with_position(Position::new(25.4, 25.4))
                        .with_origin(Origin::Generated),
                )
                .with_component(
                    resistor("R2", "22k")
                        .with_position(Position::new(38.1, 25.4))
                        .with_origin(Origin::Generated),
                ),
        );

        let merge = run(&desired, &existing);

        assert_eq!(merge.removed, vec!["R2"]);
        assert!(merge.circuit.component("R2").is_none());
        assert!(merge.dirty.contains(&Vec::<String>::new()));
    }

    #[test]
    fn sheet_notes_merge_without_duplicates() {
        let desired = Circuit::with_root(
            Subcircuit::new("")
                .with_component(resistor("R1", "10k"))
                .with_annotation(Annotation::new("rev A"))
                .with_annotation(Annotation::new("fit DNP")),
        );
        let existing = Circuit::with_root(
            Subcircuit::new("")
                .with_component(
                    resistor("R1", "10k")
                        .with_position(Position::new(25.4, 25.4))
                        .with_origin(Origin::Generated),
                )
                .with_annotation(Annotation::new("rev A").with_position(Position::new(5.0, 5.0))),
        );

        let merge = run(&desired, &existing);

        let notes: Vec<&str> = merge
            .circuit
            .subcircuit(&[])
            .map(|s| s.annotations.iter().map(|a| a.text.as_str()).collect())
            .unwrap_or_default();
        assert_eq!(notes, vec!["rev A", "fit DNP"]);
        // The note the file already held keeps its placement.
        let root = merge.circuit.subcircuit(&[]).unwrap();
        assert_eq!(root.annotations[0].position, Some(Position::new(5.0, 5.0)));
    }

    #[test]
    fn renames_carry_the_match_strategy() {
        let uuid = Uuid::new_v4();
        let desired = Circuit::with_root(
            Subcircuit::new("").with_component(resistor("R5", "10k").with_uuid(uuid)),
        );
        let existing = Circuit::with_root(
            Subcircuit::new("").with_component(
                resistor("R1", "10k")
                    .with_uuid(uuid)
                    .with_position(Position::new(25.4, 25.4))
                    .with_origin(Origin::Generated),
            ),
        );

        let merge = run(&desired, &existing);

        assert_eq!(merge.renamed.len(), 1);
        assert_eq!(merge.renamed[0].from, "R1");
        assert_eq!(merge.renamed[0].to, "R5");
        assert_eq!(merge.renamed[0].strategy, MatchStrategy::Uuid);
        assert!(merge.circuit.component("R1").is_none());
        assert!(merge.circuit.component("R5").is_some());
    }
}
