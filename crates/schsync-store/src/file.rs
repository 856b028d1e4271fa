//! The s-expression file-tree store.
//!
//! A target directory holds one document per sheet, rooted at
//! [`ROOT_SHEET`]. Loading walks the sheet tree recursively, assembles the
//! unified circuit, and keeps every file's exact bytes for idempotency
//! checks and surgical patching. Saving emits every sheet the circuit
//! references; a file referenced by several sheet symbols is written once.
//!
//! Net assembly is where most of the work is. Labels group per sheet by
//! name; hierarchical ports stitch same-named groups across parent/child
//! boundaries into one net, owned by the topmost sheet it touches. Global
//! labels and power rails unify by name alone.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use schsync_model::{
    Circuit, HierPort, Net, NetNode, PowerNetTable, Subcircuit, natural,
};

use crate::doc::{self, DocError, EmitInput, LabelEntry, PowerEntry};
use crate::{Existing, LoadedSheet, SaveOutcome, SavedFile, SchematicStore, StoreError};

/// Name of the root sheet file inside a target directory.
pub const ROOT_SHEET: &str = "main.schsync_sch";

/// File-tree implementation of [`SchematicStore`].
#[derive(Debug, Clone)]
pub struct FileStore {
    power: PowerNetTable,
}

impl FileStore {
    pub fn new() -> Self {
        Self {
            power: PowerNetTable::builtin(),
        }
    }

    /// Use a custom power classification table instead of the builtin one.
    pub fn with_power_table(power: PowerNetTable) -> Self {
        Self { power }
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SchematicStore for FileStore {
    fn load(&self, dir: &Path) -> Result<Existing, StoreError> {
        let root_file = PathBuf::from(ROOT_SHEET);
        if !dir.join(&root_file).is_file() {
            log::debug!(
                "No root sheet at {}; loading as empty target",
                dir.join(&root_file).display()
            );
            return Ok(Existing::empty(root_file));
        }

        let mut loader = Loader {
            dir,
            sheets: BTreeMap::new(),
            definitions: BTreeMap::new(),
            labels: Vec::new(),
            power_marks: Vec::new(),
            stack: Vec::new(),
        };
        let root = loader.load_sheet(&root_file, String::new(), &[])?;
        let mut circuit = Circuit::with_root(root);
        check_unique_references(&circuit)?;
        loader.assemble_nets(&mut circuit, &self.power);
        circuit.classify_power(&self.power);

        log::debug!(
            "Loaded {} sheet file(s), {} component(s) from {}",
            loader.sheets.len(),
            circuit.components().len(),
            dir.display()
        );
        Ok(Existing {
            circuit,
            sheets: loader.sheets,
            root_file,
        })
    }

    fn save(
        &self,
        circuit: &Circuit,
        prior: &Existing,
        dir: &Path,
    ) -> Result<SaveOutcome, StoreError> {
        fs::create_dir_all(dir)?;

        let mut scopes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut entries: Vec<(Vec<String>, &Subcircuit)> = Vec::new();
        circuit.walk_sheets(|path, sheet| {
            let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
            for component in &sheet.components {
                scopes.insert(component.reference.clone(), path.clone());
            }
            entries.push((path, sheet));
        });

        let mut outcome = SaveOutcome::default();
        let mut emitted: BTreeSet<PathBuf> = BTreeSet::new();
        for (path, sub) in entries {
            let file = match &sub.file {
                Some(file) => relativize(file, dir),
                // The root sheet falls back to the file it was loaded from.
                None if path.is_empty() => prior.root_file.clone(),
                None => {
                    log::warn!("Sheet '{}' has no backing file; not saved", sub.name);
                    continue;
                }
            };
            if !emitted.insert(file.clone()) {
                // Shared definition: the first instance already wrote it.
                continue;
            }
            let prior_source = prior
                .sheets
                .get(&file)
                .map(|s| s.source.as_str())
                .unwrap_or("");
            let (text, assigned) = doc::emit(&EmitInput {
                circuit,
                path,
                sub,
                file: &file,
                prior_source,
                scopes: &scopes,
            });
            let changed = text != prior_source;
            write_sheet(dir, &file, &text)?;
            outcome.files.push(SavedFile { file, changed });
            outcome.assigned.extend(assigned);
        }

        for file in prior.sheets.keys() {
            if !emitted.contains(file) {
                outcome.deleted.push(file.clone());
            }
        }
        Ok(outcome)
    }

    fn rename_nets(
        &self,
        sheet: &LoadedSheet,
        renames: &BTreeMap<String, String>,
    ) -> Result<Option<String>, StoreError> {
        let patches =
            doc::rename_patches(&sheet.source, renames).map_err(|source| StoreError::Parse {
                file: sheet.file.clone(),
                source,
            })?;
        if patches.is_empty() {
            return Ok(Some(sheet.source.clone()));
        }
        log::debug!(
            "Patched {} net-name site(s) in {}",
            patches.len(),
            sheet.file.display()
        );
        Ok(Some(patches.apply_to_string(&sheet.source)))
    }
}

fn write_sheet(dir: &Path, file: &Path, text: &str) -> Result<(), StoreError> {
    if let Some(parent) = file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(dir.join(parent))?;
        }
    }
    fs::write(dir.join(file), text)?;
    Ok(())
}

fn relativize(file: &Path, dir: &Path) -> PathBuf {
    if file.is_absolute() {
        pathdiff::diff_paths(file, dir).unwrap_or_else(|| file.to_path_buf())
    } else {
        file.to_path_buf()
    }
}

fn check_unique_references(circuit: &Circuit) -> Result<(), StoreError> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for component in circuit.components() {
        if !seen.insert(component.reference.as_str()) {
            return Err(StoreError::DuplicateReference(component.reference.clone()));
        }
    }
    Ok(())
}

struct Loader<'a> {
    dir: &'a Path,
    sheets: BTreeMap<PathBuf, LoadedSheet>,
    /// File -> the hier ports of its definition, registered by the first
    /// instance so later instances of a shared file can reuse them.
    definitions: BTreeMap<PathBuf, Vec<HierPort>>,
    /// `(owning sheet path, entry)` for every label seen, across all files.
    labels: Vec<(Vec<String>, LabelEntry)>,
    power_marks: Vec<(Vec<String>, PowerEntry)>,
    /// Files on the current recursion path, for cycle detection.
    stack: Vec<PathBuf>,
}

impl Loader<'_> {
    fn load_sheet(
        &mut self,
        file: &Path,
        name: String,
        path: &[String],
    ) -> Result<Subcircuit, StoreError> {
        if self.stack.iter().any(|f| f == file) {
            return Err(StoreError::SheetCycle(file.to_path_buf()));
        }

        // A file already loaded through another sheet symbol is a shared
        // definition. The first instance owns the contents; this one is a
        // reference carrying only its own symbol-level state.
        if let Some(ports) = self.definitions.get(file) {
            log::debug!(
                "Sheet file {} is shared; contents stay with its first instance",
                file.display()
            );
            let mut sub = Subcircuit::new(name);
            sub.file = Some(file.to_path_buf());
            sub.ports = ports.clone();
            return Ok(sub);
        }

        let source = match fs::read_to_string(self.dir.join(file)) {
            Ok(source) => source,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::MissingSheet(file.to_path_buf()));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        let doc = doc::read_doc(&source).map_err(|e| match e {
            DocError::Parse(source) => StoreError::Parse {
                file: file.to_path_buf(),
                source,
            },
            DocError::NotASchematic => StoreError::NotASchematic(file.to_path_buf()),
        })?;
        self.sheets.insert(
            file.to_path_buf(),
            LoadedSheet {
                file: file.to_path_buf(),
                source,
                uuid: doc.uuid,
            },
        );
        self.definitions
            .insert(file.to_path_buf(), doc.hier_ports.clone());

        for entry in &doc.labels {
            self.labels.push((path.to_vec(), entry.clone()));
        }
        for mark in &doc.power_symbols {
            self.power_marks.push((path.to_vec(), mark.clone()));
        }

        let mut sub = Subcircuit::new(name);
        sub.file = Some(file.to_path_buf());
        sub.components = doc.components;
        sub.annotations = doc.annotations;
        sub.ports = doc.hier_ports;
        if path.is_empty() {
            sub.uuid = doc.uuid;
        }

        self.stack.push(file.to_path_buf());
        for entry in doc.sheets {
            let mut child_path = path.to_vec();
            child_path.push(entry.name.clone());
            let mut child = self.load_sheet(&entry.file, entry.name, &child_path)?;
            child.position = entry.position;
            child.uuid = entry.uuid;
            child.origin = entry.origin;
            merge_port_halves(&mut child.ports, entry.pins);
            sub.children.push(child);
        }
        self.stack.pop();

        Ok(sub)
    }

    /// Turn the label entries collected per file into circuit nets.
    fn assemble_nets(&self, circuit: &mut Circuit, power: &PowerNetTable) {
        // Explicit rail markers from the files.
        let mut rails: BTreeMap<String, String> = BTreeMap::new();
        for (_, mark) in &self.power_marks {
            rails
                .entry(mark.net.clone())
                .or_insert_with(|| mark.rail.clone());
        }

        // Names that unify by name alone: anything labelled globally
        // anywhere, every marked rail, and everything the table classifies.
        let mut global_names: BTreeSet<String> = rails.keys().cloned().collect();
        for (_, entry) in &self.labels {
            if entry.global || power.classify(&entry.net).is_some() {
                global_names.insert(entry.net.clone());
            }
        }

        let known: BTreeSet<String> = circuit
            .components()
            .iter()
            .map(|c| c.reference.clone())
            .collect();

        let mut global: BTreeMap<String, BTreeSet<NetNode>> = BTreeMap::new();
        let mut local: BTreeMap<(Vec<String>, String), BTreeSet<NetNode>> = BTreeMap::new();
        for (path, entry) in &self.labels {
            if !known.contains(&entry.node.reference) {
                log::warn!(
                    "Label '{}' anchors to unknown component {}; keeping the membership",
                    entry.net,
                    entry.node
                );
            }
            let nodes = if global_names.contains(&entry.net) {
                global.entry(entry.net.clone()).or_default()
            } else {
                local.entry((path.clone(), entry.net.clone())).or_default()
            };
            nodes.insert(entry.node.clone());
        }
        // Memberless rails survive so their markers stay in the file.
        for name in rails.keys() {
            global.entry(name.clone()).or_default();
        }

        // Stitch local groups across sheet boundaries: a hier port carries
        // its name from the child sheet into the parent.
        let mut keys: Vec<(Vec<String>, String)> = local.keys().cloned().collect();
        let mut links: Vec<((Vec<String>, String), (Vec<String>, String))> = Vec::new();
        circuit.walk_sheets(|path, sheet| {
            if path.is_empty() {
                return;
            }
            let child: Vec<String> = path.iter().map(|s| s.to_string()).collect();
            let parent: Vec<String> = child[..child.len() - 1].to_vec();
            for port in &sheet.ports {
                if global_names.contains(&port.name) {
                    continue;
                }
                links.push((
                    (child.clone(), port.name.clone()),
                    (parent.clone(), port.name.clone()),
                ));
            }
        });
        for (a, b) in &links {
            for key in [a, b] {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        let index: BTreeMap<&(Vec<String>, String), usize> =
            keys.iter().enumerate().map(|(i, k)| (k, i)).collect();
        let mut unify = UnionFind::new(keys.len());
        for (a, b) in &links {
            unify.union(index[a], index[b]);
        }

        // One net per union group, owned by the topmost sheet in the group.
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..keys.len() {
            groups.entry(unify.find(i)).or_default().push(i);
        }
        for members in groups.values() {
            let mut nodes: BTreeSet<NetNode> = BTreeSet::new();
            let mut owner: Option<&(Vec<String>, String)> = None;
            for &i in members {
                let key = &keys[i];
                if let Some(group_nodes) = local.get(key) {
                    nodes.extend(group_nodes.iter().cloned());
                }
                let better = match owner {
                    None => true,
                    Some(current) => {
                        (key.0.len(), &key.0) < (current.0.len(), &current.0)
                    }
                };
                if better {
                    owner = Some(key);
                }
            }
            let Some((scope_path, name)) = owner else {
                continue;
            };
            if nodes.is_empty() {
                log::debug!("Net '{name}' has ports but no members; dropped");
                continue;
            }
            let net = Net::local(name.clone(), scope_path.clone()).with_nodes(nodes);
            if let Some(sheet) = circuit.subcircuit_mut(scope_path) {
                sheet.nets.push(net);
            }
        }

        for (name, nodes) in global {
            let mut net = Net::global(name.clone()).with_nodes(nodes);
            if let Some(rail) = rails.get(&name) {
                net.power = Some(rail.clone());
            }
            circuit.root.nets.push(net);
        }

        sort_nets(&mut circuit.root);
    }
}

/// Merge the parent half of a port set (sheet pins) into the child half
/// (hier labels). A pin with no matching label is kept so a half-broken file
/// heals on the next save.
fn merge_port_halves(ports: &mut Vec<HierPort>, parent_half: Vec<HierPort>) {
    for pin in parent_half {
        match ports.iter().find(|p| p.name == pin.name) {
            Some(label) => {
                if label.direction != pin.direction {
                    log::warn!(
                        "Port '{}' direction differs between sheet pin and hier label; keeping the label's",
                        pin.name
                    );
                }
            }
            None => {
                log::warn!(
                    "Sheet pin '{}' has no hier label in the child sheet; keeping it",
                    pin.name
                );
                ports.push(pin);
            }
        }
    }
}

fn sort_nets(sheet: &mut Subcircuit) {
    sheet.nets.sort_by(|a, b| natural::compare(&a.name, &b.name));
    for child in &mut sheet.children {
        sort_nets(child);
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parent[a] = b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schsync_model::{Component, NetScope, Origin, Pin, Position};
    use tempfile::TempDir;

    fn two_pin(reference: &str, value: &str) -> Component {
        Component::new(reference, "Device:R")
            .with_value(value)
            .with_footprint("Resistor_SMD:R_0603")
            .with_position(Position::new(25.4, 25.4))
            .with_pins([Pin::new("1"), Pin::new("2")])
            .with_origin(Origin::Generated)
    }

    fn hierarchical_circuit() -> Circuit {
        let supply = Subcircuit::new("supply")
            .with_file("supply.schsync_sch")
            .with_position(Position::new(76.2, 25.4))
            .with_origin(Origin::Generated)
            .with_component(two_pin("R2", "4.7k"))
            .with_port(HierPort::new("VIN"))
            .with_net(
                Net::local("VIN", vec!["supply".into()])
                    .with_nodes([NetNode::new("R2", "1")]),
            );

        let mut root = Subcircuit::new(String::new())
            .with_component(two_pin("R1", "10k"))
            .with_child(supply);
        root.nets.push(
            Net::local("VIN", vec![]).with_nodes([NetNode::new("R1", "2")]),
        );
        root.nets
            .push(Net::global("GND").with_power("power:GND").with_nodes([
                NetNode::new("R1", "1"),
                NetNode::new("R2", "2"),
            ]));
        Circuit::with_root(root)
    }

    #[test]
    fn missing_root_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();
        let existing = store.load(dir.path()).unwrap();
        assert!(existing.sheets.is_empty());
        assert!(existing.circuit.components().is_empty());
        assert_eq!(existing.root_file, PathBuf::from(ROOT_SHEET));
    }

    #[test]
    fn save_then_load_round_trips_the_hierarchy() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();
        let circuit = hierarchical_circuit();

        let outcome = store
            .save(&circuit, &Existing::empty(ROOT_SHEET.into()), dir.path())
            .unwrap();
        assert_eq!(outcome.files.len(), 2);
        assert!(outcome.files.iter().all(|f| f.changed));

        let loaded = store.load(dir.path()).unwrap();
        assert_eq!(loaded.circuit.components().len(), 2);
        assert!(loaded.circuit.component("R1").is_some());
        assert_eq!(
            loaded.circuit.scope_of("R2"),
            Some(vec!["supply".to_string()])
        );

        // VIN crosses the boundary: one net, owned by the root sheet.
        let nets = loaded.circuit.nets();
        let vin: Vec<_> = nets.iter().filter(|(_, n)| n.name == "VIN").collect();
        assert_eq!(vin.len(), 1);
        assert_eq!(vin[0].0, Vec::<String>::new());
        assert_eq!(vin[0].1.nodes.len(), 2);
        assert_eq!(vin[0].1.scope, NetScope::Local(vec![]));

        let gnd: Vec<_> = nets.iter().filter(|(_, n)| n.name == "GND").collect();
        assert_eq!(gnd.len(), 1);
        assert!(gnd[0].1.scope.is_global());
        assert_eq!(gnd[0].1.power.as_deref(), Some("power:GND"));

        let supply = loaded.circuit.subcircuit(&["supply".to_string()]).unwrap();
        assert_eq!(supply.ports, vec![HierPort::new("VIN")]);
        assert_eq!(supply.origin, Origin::Generated);
    }

    #[test]
    fn second_save_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();
        let circuit = hierarchical_circuit();

        store
            .save(&circuit, &Existing::empty(ROOT_SHEET.into()), dir.path())
            .unwrap();
        let loaded = store.load(dir.path()).unwrap();

        // Re-save the loaded circuit against its own prior state.
        let outcome = store.save(&loaded.circuit, &loaded, dir.path()).unwrap();
        assert!(outcome.is_noop(), "{:?}", outcome.changed_files());
    }

    #[test]
    fn sheet_cycles_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(ROOT_SHEET),
            "(schsync_sch (version 1) (sheet (name \"a\") (file \"a.schsync_sch\")))",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.schsync_sch"),
            format!("(schsync_sch (version 1) (sheet (name \"back\") (file \"{ROOT_SHEET}\")))"),
        )
        .unwrap();

        let store = FileStore::new();
        match store.load(dir.path()) {
            Err(StoreError::SheetCycle(file)) => assert_eq!(file, PathBuf::from(ROOT_SHEET)),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn missing_child_sheet_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(ROOT_SHEET),
            "(schsync_sch (version 1) (sheet (name \"a\") (file \"a.schsync_sch\")))",
        )
        .unwrap();

        let store = FileStore::new();
        assert!(matches!(
            store.load(dir.path()),
            Err(StoreError::MissingSheet(_))
        ));
    }

    #[test]
    fn duplicate_references_across_sheets_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(ROOT_SHEET),
            "(schsync_sch (version 1)\n\
             (symbol (lib_id \"Device:R\") (reference \"R1\") (value \"1k\") (pin \"1\") (pin \"2\"))\n\
             (sheet (name \"a\") (file \"a.schsync_sch\")))",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.schsync_sch"),
            "(schsync_sch (version 1)\n\
             (symbol (lib_id \"Device:R\") (reference \"R1\") (value \"2k\") (pin \"1\") (pin \"2\")))",
        )
        .unwrap();

        let store = FileStore::new();
        match store.load(dir.path()) {
            Err(StoreError::DuplicateReference(reference)) => assert_eq!(reference, "R1"),
            other => panic!("expected duplicate reference error, got {other:?}"),
        }
    }

    #[test]
    fn shared_sheet_file_loads_once() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(ROOT_SHEET),
            "(schsync_sch (version 1)\n\
             (sheet (name \"left\") (file \"half.schsync_sch\"))\n\
             (sheet (name \"right\") (file \"half.schsync_sch\")))",
        )
        .unwrap();
        fs::write(
            dir.path().join("half.schsync_sch"),
            "(schsync_sch (version 1)\n\
             (symbol (lib_id \"Device:C\") (reference \"C1\") (value \"100n\") (pin \"1\") (pin \"2\")))",
        )
        .unwrap();

        let store = FileStore::new();
        let loaded = store.load(dir.path()).unwrap();

        // One definition, one component; both instances share the file.
        assert_eq!(loaded.circuit.components().len(), 1);
        assert_eq!(loaded.sheets.len(), 2);
        let left = loaded.circuit.subcircuit(&["left".to_string()]).unwrap();
        let right = loaded.circuit.subcircuit(&["right".to_string()]).unwrap();
        assert_eq!(left.file, right.file);
        assert_eq!(left.components.len(), 1);
        assert!(right.components.is_empty());

        // Saving writes the shared file exactly once.
        let outcome = store.save(&loaded.circuit, &loaded, dir.path()).unwrap();
        assert_eq!(outcome.files.len(), 2);
        assert!(outcome.deleted.is_empty());
    }

    #[test]
    fn power_labels_unify_across_sheets() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(ROOT_SHEET),
            "(schsync_sch (version 1)\n\
             (symbol (lib_id \"Device:R\") (reference \"R1\") (value \"1k\") (pin \"1\") (pin \"2\"))\n\
             (label \"GND\" (anchor \"R1\" \"2\") (at 0 0 0) (uuid \"a\"))\n\
             (sheet (name \"a\") (file \"a.schsync_sch\")))",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.schsync_sch"),
            "(schsync_sch (version 1)\n\
             (symbol (lib_id \"Device:R\") (reference \"R2\") (value \"1k\") (pin \"1\") (pin \"2\"))\n\
             (label \"GND\" (anchor \"R2\" \"2\") (at 0 0 0) (uuid \"b\")))",
        )
        .unwrap();

        let store = FileStore::new();
        let loaded = store.load(dir.path()).unwrap();
        let nets = loaded.circuit.nets();
        let gnd: Vec<_> = nets.iter().filter(|(_, n)| n.name == "GND").collect();
        assert_eq!(gnd.len(), 1);
        assert!(gnd[0].1.scope.is_global());
        assert_eq!(gnd[0].1.nodes.len(), 2);
        assert_eq!(gnd[0].1.power.as_deref(), Some("power:GND"));
    }

    #[test]
    fn local_names_on_different_sheets_stay_separate() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(ROOT_SHEET),
            "(schsync_sch (version 1)\n\
             (symbol (lib_id \"Device:R\") (reference \"R1\") (value \"1k\") (pin \"1\") (pin \"2\"))\n\
             (label \"SENSE\" (anchor \"R1\" \"1\") (at 0 0 0) (uuid \"a\"))\n\
             (sheet (name \"a\") (file \"a.schsync_sch\")))",
        )
        .unwrap();
        // Same label name, no port carrying it through: a distinct net.
        fs::write(
            dir.path().join("a.schsync_sch"),
            "(schsync_sch (version 1)\n\
             (symbol (lib_id \"Device:R\") (reference \"R2\") (value \"1k\") (pin \"1\") (pin \"2\"))\n\
             (label \"SENSE\" (anchor \"R2\" \"1\") (at 0 0 0) (uuid \"b\")))",
        )
        .unwrap();

        let store = FileStore::new();
        let loaded = store.load(dir.path()).unwrap();
        let nets = loaded.circuit.nets();
        let sense: Vec<_> = nets.iter().filter(|(_, n)| n.name == "SENSE").collect();
        assert_eq!(sense.len(), 2);
    }

    #[test]
    fn rename_patch_preserves_routing_bytes() {
        let dir = TempDir::new().unwrap();
        let source = "(schsync_sch\n\
             \t(version 1)\n\
             \t(symbol (lib_id \"Device:R\") (reference \"R1\") (value \"1k\") (pin \"1\"))\n\
             \t(label \"NET1\" (anchor \"R1\" \"1\") (at 1.27 2.54 0) (uuid \"a\"))\n\
             \t(wire (pts (xy 1.27 2.54) (xy 5.08 2.54)) (uuid \"w\"))\n\
             )\n";
        fs::write(dir.path().join(ROOT_SHEET), source).unwrap();

        let store = FileStore::new();
        let loaded = store.load(dir.path()).unwrap();
        let sheet = &loaded.sheets[&PathBuf::from(ROOT_SHEET)];

        let mut renames = BTreeMap::new();
        renames.insert("NET1".to_string(), "VCC".to_string());
        let patched = store.rename_nets(sheet, &renames).unwrap().unwrap();

        assert!(patched.contains("(label \"VCC\""));
        // Everything except the name string is byte-identical.
        assert!(patched.contains("(wire (pts (xy 1.27 2.54) (xy 5.08 2.54)) (uuid \"w\"))"));
        assert_eq!(patched.replace("\"VCC\"", "\"NET1\""), source);
    }
}
