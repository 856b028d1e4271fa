//! Sheet planning: which backing file each subcircuit lives in, which
//! generated sheets can go, and which user sheets must stay.
//!
//! File assignment, in order of precedence:
//!
//! 1. an explicit `file` on the desired subcircuit (this is also how two
//!    instantiations declare that they share one definition),
//! 2. the file already backing the same path in the target,
//! 3. a name derived from the sheet name, deduplicated against every file
//!    the plan has handed out and everything present in the target.
//!
//! Removal follows the component origin guard, recursively: a generated
//! sheet is removable only if every component in its subtree is generated
//! and every child sheet is itself removable.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use log::info;
use schsync_model::{Circuit, Subcircuit};

/// Sheet extension shared with the store format.
pub const SHEET_EXTENSION: &str = "schsync_sch";

#[derive(Debug, Default)]
pub struct SheetPlan {
    /// Desired paths with no counterpart in the target.
    pub added: Vec<(Vec<String>, PathBuf)>,
    /// Generated target sheets absent from desired, cleared for removal.
    pub removed: Vec<(Vec<String>, PathBuf)>,
    /// Target sheets absent from desired that must survive untouched.
    pub preserved: Vec<Vec<String>>,
    /// Backing file for every surviving path, the root included.
    pub files: BTreeMap<Vec<String>, PathBuf>,
    /// First surviving path for each file, in desired walk order. Shared
    /// definitions normalize their ports to the owner's.
    pub owners: BTreeMap<PathBuf, Vec<String>>,
}

impl SheetPlan {
    pub fn file(&self, path: &[String]) -> Option<&PathBuf> {
        self.files.get(path)
    }

    pub fn is_owner(&self, path: &[String]) -> bool {
        self.file(path)
            .and_then(|file| self.owners.get(file))
            .is_some_and(|owner| owner.as_slice() == path)
    }
}

pub fn plan(desired: &Circuit, existing: &Circuit, root_file: &Path) -> SheetPlan {
    let mut existing_sheets: BTreeMap<Vec<String>, &Subcircuit> = BTreeMap::new();
    existing.walk_sheets(|path, sheet| {
        existing_sheets.insert(owned(path), sheet);
    });

    let mut desired_sheets: Vec<(Vec<String>, &Subcircuit)> = Vec::new();
    desired.walk_sheets(|path, sheet| {
        desired_sheets.push((owned(path), sheet));
    });
    let desired_paths: BTreeSet<&[String]> = desired_sheets
        .iter()
        .map(|(path, _)| path.as_slice())
        .collect();

    // Derived names must dodge every file the target knows about, removals
    // included, so a new sheet never squats on a file mid-deletion.
    let mut used: BTreeSet<PathBuf> = existing_sheets
        .values()
        .filter_map(|sheet| sheet.file.clone())
        .collect();
    used.insert(root_file.to_path_buf());

    let mut plan = SheetPlan::default();
    for (path, sheet) in &desired_sheets {
        let file = if path.is_empty() {
            root_file.to_path_buf()
        } else if let Some(file) = &sheet.file {
            file.clone()
        } else if let Some(file) = existing_sheets.get(path).and_then(|s| s.file.clone()) {
            file
        } else {
            derive_file_name(&sheet.name, &mut used)
        };
        used.insert(file.clone());

        if !path.is_empty() && !existing_sheets.contains_key(path) {
            info!("New sheet '{}' backed by {}", path.join("/"), file.display());
            plan.added.push((path.clone(), file.clone()));
        }
        plan.owners.entry(file.clone()).or_insert_with(|| path.clone());
        plan.files.insert(path.clone(), file);
    }

    for (path, sheet) in &existing_sheets {
        if path.is_empty() || desired_paths.contains(path.as_slice()) {
            continue;
        }
        // A sheet nested under another handled sheet is covered by the
        // decision made for its topmost absent ancestor.
        if covered_by_absent_ancestor(path, &desired_paths) {
            continue;
        }
        let file = sheet.file.clone().unwrap_or_default();
        if removable(sheet) {
            info!(
                "Generated sheet '{}' is no longer declared; removing",
                path.join("/")
            );
            plan.removed.push((path.clone(), file));
        } else {
            info!("Preserving hand-drawn sheet '{}'", path.join("/"));
            plan.preserved.push(path.clone());
            plan.owners.entry(file.clone()).or_insert_with(|| path.clone());
            plan.files.insert(path.clone(), file);
            // Its children survive with it.
            for (child_path, child) in &existing_sheets {
                if child_path.len() > path.len() && child_path.starts_with(path) {
                    if let Some(child_file) = child.file.clone() {
                        plan.owners
                            .entry(child_file.clone())
                            .or_insert_with(|| child_path.clone());
                        plan.files.insert(child_path.clone(), child_file);
                    }
                }
            }
        }
    }

    plan
}

/// True when `path` sits under an ancestor that is itself absent from
/// desired, so the ancestor's removal/preservation decision covers it.
fn covered_by_absent_ancestor(path: &[String], desired_paths: &BTreeSet<&[String]>) -> bool {
    (1..path.len()).any(|len| !desired_paths.contains(&path[..len]))
}

fn removable(sheet: &Subcircuit) -> bool {
    sheet.origin.is_generated()
        && sheet.components.iter().all(|c| c.origin.is_generated())
        && sheet.children.iter().all(removable)
}

fn derive_file_name(name: &str, used: &BTreeSet<PathBuf>) -> PathBuf {
    let mut stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        stem = "sheet".to_string();
    }

    let first = PathBuf::from(format!("{stem}.{SHEET_EXTENSION}"));
    if !used.contains(&first) {
        return first;
    }
    let mut counter = 2;
    loop {
        let candidate = PathBuf::from(format!("{stem}_{counter}.{SHEET_EXTENSION}"));
        if !used.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

fn owned(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use schsync_model::{Component, Origin};

    fn root_file() -> PathBuf {
        PathBuf::from("main.schsync_sch")
    }

    fn sheet(name: &str) -> Subcircuit {
        Subcircuit::new(name)
    }

    #[test]
    fn every_desired_sheet_gets_a_file() {
        let desired = Circuit::with_root(
            Subcircuit::new("")
                .with_child(sheet("supply"))
                .with_child(sheet("io")),
        );
        let existing = Circuit::new();

        let plan = plan(&desired, &existing, &root_file());
        assert_eq!(plan.added.len(), 2);
        assert_eq!(
            plan.file(&["supply".to_string()]),
            Some(&PathBuf::from("supply.schsync_sch"))
        );
        assert_eq!(
            plan.file(&["io".to_string()]),
            Some(&PathBuf::from("io.schsync_sch"))
        );
        assert_eq!(plan.file(&[]), Some(&root_file()));
    }

    #[test]
    fn existing_files_are_reused_for_matching_paths() {
        let desired = Circuit::with_root(Subcircuit::new("").with_child(sheet("supply")));
        let existing = Circuit::with_root(
            Subcircuit::new("")
                .with_child(sheet("supply").with_file("power_stage.schsync_sch")),
        );

        let plan = plan(&desired, &existing, &root_file());
        assert!(plan.added.is_empty());
        assert_eq!(
            plan.file(&["supply".to_string()]),
            Some(&PathBuf::from("power_stage.schsync_sch"))
        );
    }

    #[test]
    fn sibling_name_collisions_are_deduplicated() {
        let desired = Circuit::with_root(
            Subcircuit::new("")
                .with_child(sheet("left").with_child(sheet("supply")))
                .with_child(sheet("right").with_child(sheet("supply"))),
        );
        let existing = Circuit::new();

        let plan = plan(&desired, &existing, &root_file());
        let first = plan.file(&["left".to_string(), "supply".to_string()]);
        let second = plan.file(&["right".to_string(), "supply".to_string()]);
        assert_eq!(first, Some(&PathBuf::from("supply.schsync_sch")));
        assert_eq!(second, Some(&PathBuf::from("supply_2.schsync_sch")));
    }

    #[test]
    fn explicit_shared_file_has_one_owner() {
        let desired = Circuit::with_root(
            Subcircuit::new("")
                .with_child(sheet("ldo_a").with_file("ldo.schsync_sch"))
                .with_child(sheet("ldo_b").with_file("ldo.schsync_sch")),
        );
        let existing = Circuit::new();

        let plan = plan(&desired, &existing, &root_file());
        assert!(plan.is_owner(&["ldo_a".to_string()]));
        assert!(!plan.is_owner(&["ldo_b".to_string()]));
        assert_eq!(
            plan.owners.get(Path::new("ldo.schsync_sch")),
            Some(&vec!["ldo_a".to_string()])
        );
    }

    #[test]
    fn generated_empty_sheet_is_removed() {
        let desired = Circuit::new();
        let existing = Circuit::with_root(
            Subcircuit::new("").with_child(
                sheet("old")
                    .with_file("old.schsync_sch")
                    .with_origin(Origin::Generated),
            ),
        );

        let plan = plan(&desired, &existing, &root_file());
        assert_eq!(
            plan.removed,
            vec![(vec!["old".to_string()], PathBuf::from("old.schsync_sch"))]
        );
        assert!(plan.preserved.is_empty());
        assert_eq!(plan.file(&["old".to_string()]), None);
    }

    #[test]
    fn generated_sheet_with_user_component_survives() {
        let mut old = sheet("old")
            .with_file("old.schsync_sch")
            .with_origin(Origin::Generated);
        old.components
            .push(Component::new("R99", "Device:R").with_origin(Origin::User));
        let desired = Circuit::new();
        let existing = Circuit::with_root(Subcircuit::new("").with_child(old));

        let plan = plan(&desired, &existing, &root_file());
        assert!(plan.removed.is_empty());
        assert_eq!(plan.preserved, vec![vec!["old".to_string()]]);
        assert_eq!(
            plan.file(&["old".to_string()]),
            Some(&PathBuf::from("old.schsync_sch"))
        );
    }

    #[test]
    fn user_sheet_keeps_its_children() {
        let child = sheet("notes_inner").with_file("notes_inner.schsync_sch");
        let user = sheet("notes")
            .with_file("notes.schsync_sch")
            .with_origin(Origin::User)
            .with_child(child);
        let desired = Circuit::new();
        let existing = Circuit::with_root(Subcircuit::new("").with_child(user));

        let plan = plan(&desired, &existing, &root_file());
        assert_eq!(plan.preserved, vec![vec!["notes".to_string()]]);
        assert_eq!(
            plan.file(&["notes".to_string(), "notes_inner".to_string()]),
            Some(&PathBuf::from("notes_inner.schsync_sch"))
        );
    }

    #[test]
    fn derived_names_dodge_files_already_in_the_target() {
        let desired = Circuit::with_root(Subcircuit::new("").with_child(sheet("supply")));
        let existing = Circuit::with_root(
            Subcircuit::new("").with_child(
                sheet("legacy")
                    .with_file("supply.schsync_sch")
                    .with_origin(Origin::User),
            ),
        );

        let plan = plan(&desired, &existing, &root_file());
        assert_eq!(
            plan.file(&["supply".to_string()]),
            Some(&PathBuf::from("supply_2.schsync_sch"))
        );
    }
}
