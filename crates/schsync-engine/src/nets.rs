//! Net topology synchronization.
//!
//! Given the component correspondence, work out what has to happen to every
//! net: which pins gain or lose their label, which nets were renamed
//! wholesale (relabel in place, keep the routing), which were collapsed into
//! one (a merge), and which hierarchical ports each sheet needs so nets can
//! cross sheet boundaries.
//!
//! Desired connectivity wins on every matched pin, with one exception: a pin
//! carrying more than one label in the target is frozen. The run keeps its
//! memberships exactly as found and reports the pin instead of editing it.
//!
//! Rename detection is deliberately conservative, in the same spirit as the
//! component matcher: the translated member sets must be identical, the old
//! name must be gone from desired, the new name must be absent from the
//! target, and scope and power classification must agree. Anything less
//! decomposes into plain attach/detach, which is always safe.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use log::{debug, info, warn};
use schsync_model::{Circuit, HierPort, Net, NetNode, NetScope};

use crate::matcher::MatchResult;
use crate::report::{Conflict, NetBinding, NetMerge, NetRename, PortChange};
use crate::sheets::SheetPlan;

/// A whole-net rename, with the files whose label strings can be patched in
/// place. `files` is `None` for global and power nets, whose labels may
/// appear in any file.
#[derive(Debug, Clone)]
pub struct RenameOp {
    pub from: String,
    pub to: String,
    pub files: Option<BTreeSet<PathBuf>>,
}

impl RenameOp {
    pub fn applies_to(&self, file: &std::path::Path) -> bool {
        match &self.files {
            None => true,
            Some(files) => files.contains(file),
        }
    }
}

/// Everything the net pass decided: the report-ready edit lists, the final
/// net and port state per sheet, and the sheets whose files need re-emission.
#[derive(Debug, Default)]
pub struct NetSync {
    pub attached: Vec<NetBinding>,
    pub detached: Vec<NetBinding>,
    pub renames: Vec<RenameOp>,
    pub merged: Vec<NetMerge>,
    pub frozen: Vec<Conflict>,
    /// Final net lists keyed by owning sheet path.
    pub nets: BTreeMap<Vec<String>, Vec<Net>>,
    /// Final port set for every surviving sheet path.
    pub ports: BTreeMap<Vec<String>, Vec<HierPort>>,
    pub ports_added: Vec<PortChange>,
    pub ports_removed: Vec<PortChange>,
    /// Sheet paths whose files must be re-emitted for net-level edits.
    pub dirty: BTreeSet<Vec<String>>,
}

impl NetSync {
    pub fn rename_pairs(&self) -> Vec<NetRename> {
        self.renames
            .iter()
            .map(|op| NetRename {
                from: op.from.clone(),
                to: op.to.clone(),
            })
            .collect()
    }
}

/// One canonical net: cross-sheet pieces unified, members addressed by
/// hierarchy-unique references.
#[derive(Debug, Clone)]
struct NormalNet {
    name: String,
    owner: Vec<String>,
    power: Option<String>,
    global: bool,
    members: BTreeSet<NetNode>,
}

pub fn derive(
    desired: &Circuit,
    existing: &Circuit,
    matches: &MatchResult<'_>,
    plan: &SheetPlan,
) -> NetSync {
    let existing_to_desired = matches.existing_to_desired();
    let matched_desired: BTreeSet<&str> = matches.desired_to_existing().into_keys().collect();
    let preserved_refs: BTreeSet<&str> = matches
        .preserved()
        .iter()
        .map(|c| c.reference.as_str())
        .collect();
    let removed_refs: BTreeSet<&str> = matches
        .removal_candidates()
        .iter()
        .map(|c| c.reference.as_str())
        .collect();

    // Where every surviving component ends up: desired placement for
    // controlled components, current placement for preserved ones.
    let mut location: BTreeMap<String, Vec<String>> = BTreeMap::new();
    desired.walk_sheets(|path, sheet| {
        for component in &sheet.components {
            location.insert(component.reference.clone(), owned(path));
        }
    });
    existing.walk_sheets(|path, sheet| {
        for component in &sheet.components {
            if preserved_refs.contains(component.reference.as_str()) {
                location.insert(component.reference.clone(), owned(path));
            }
        }
    });

    let normals = normalize_desired(desired, &location);
    let existing_nets: Vec<(Vec<String>, &Net)> = existing.nets();

    // A pin under more than one existing label is frozen: its memberships
    // survive untouched and every algebra below works around it.
    let mut pin_owners: BTreeMap<&NetNode, Vec<&str>> = BTreeMap::new();
    for (_, net) in &existing_nets {
        for node in &net.nodes {
            pin_owners.entry(node).or_default().push(net.name.as_str());
        }
    }
    let frozen_raw: BTreeSet<&NetNode> = pin_owners
        .iter()
        .filter(|(_, nets)| nets.len() > 1)
        .map(|(node, _)| *node)
        .collect();

    let translate = |node: &NetNode| -> NetNode {
        match existing_to_desired.get(node.reference.as_str()) {
            Some(desired_ref) => NetNode::new(*desired_ref, node.pin.as_str()),
            None => node.clone(),
        }
    };

    let mut sync = NetSync::default();
    let mut frozen_translated: BTreeSet<NetNode> = BTreeSet::new();
    for node in &frozen_raw {
        let mut nets = pin_owners[*node].clone();
        nets.sort_unstable();
        let translated = translate(node);
        warn!(
            "Pin {} carries {} labels ({}); leaving it as found",
            translated,
            nets.len(),
            nets.join(", ")
        );
        sync.frozen.push(Conflict::FrozenPin {
            node: translated.clone(),
            nets: nets.into_iter().map(String::from).collect(),
        });
        frozen_translated.insert(translated);
    }

    // Matched, non-frozen member sets in desired reference space. These are
    // the only pins both sides can speak about, so rename and merge
    // detection compares nothing else.
    let d_restricted: Vec<BTreeSet<NetNode>> = normals
        .iter()
        .map(|net| {
            net.members
                .iter()
                .filter(|n| {
                    matched_desired.contains(n.reference.as_str())
                        && !frozen_translated.contains(n)
                })
                .cloned()
                .collect()
        })
        .collect();
    let e_restricted: Vec<BTreeSet<NetNode>> = existing_nets
        .iter()
        .map(|(_, net)| {
            net.nodes
                .iter()
                .filter(|n| !frozen_raw.contains(n))
                .filter(|n| existing_to_desired.contains_key(n.reference.as_str()))
                .map(&translate)
                .collect()
        })
        .collect();

    let desired_names: BTreeSet<&str> = normals.iter().map(|n| n.name.as_str()).collect();
    let existing_names: BTreeSet<&str> =
        existing_nets.iter().map(|(_, n)| n.name.as_str()).collect();

    // Member set -> unique net index on each side; a collision poisons the
    // entry so nothing ambiguous ever renames.
    let mut desired_by_set: BTreeMap<&BTreeSet<NetNode>, Option<usize>> = BTreeMap::new();
    for (index, set) in d_restricted.iter().enumerate() {
        if set.is_empty() {
            continue;
        }
        desired_by_set
            .entry(set)
            .and_modify(|slot| *slot = None)
            .or_insert(Some(index));
    }
    let mut existing_by_set: BTreeMap<&BTreeSet<NetNode>, Option<usize>> = BTreeMap::new();
    for (index, set) in e_restricted.iter().enumerate() {
        if set.is_empty() {
            continue;
        }
        existing_by_set
            .entry(set)
            .and_modify(|slot| *slot = None)
            .or_insert(Some(index));
    }

    // Existing net index -> final net index (into `finals`, normals first).
    let mut e_to_final: Vec<Option<usize>> = vec![None; existing_nets.len()];

    for (e_index, (e_owner, e_net)) in existing_nets.iter().enumerate() {
        let set = &e_restricted[e_index];
        if set.is_empty() || desired_names.contains(e_net.name.as_str()) {
            continue;
        }
        let Some(Some(d_index)) = desired_by_set.get(set).copied() else {
            continue;
        };
        if existing_by_set.get(set).copied() != Some(Some(e_index)) {
            continue;
        }
        let normal = &normals[d_index];
        if existing_names.contains(normal.name.as_str()) {
            continue;
        }
        let e_global = e_net.scope.is_global() || e_net.power.is_some();
        if normal.global != e_global
            || (!normal.global && normal.owner != *e_owner)
            || normal.power != e_net.power
        {
            debug!(
                "Net '{}' and '{}' share members but differ in scope or rail; \
                 falling back to relabeling",
                e_net.name, normal.name
            );
            continue;
        }

        info!(
            "Detected net rename: \"{}\" -> \"{}\" ({} member(s))",
            e_net.name,
            normal.name,
            set.len()
        );
        let files = if normal.global {
            None
        } else {
            Some(label_files(e_owner, e_net, existing, plan))
        };
        sync.renames.push(RenameOp {
            from: e_net.name.clone(),
            to: normal.name.clone(),
            files,
        });
        e_to_final[e_index] = Some(d_index);
    }

    // Merges: several existing nets whose members all land in one desired
    // net, covering it exactly. The desired name survives; every other part
    // is absorbed.
    for (d_index, d_set) in d_restricted.iter().enumerate() {
        if d_set.is_empty() {
            continue;
        }
        let parts: Vec<usize> = (0..existing_nets.len())
            .filter(|&e| {
                e_to_final[e].is_none()
                    && !e_restricted[e].is_empty()
                    && e_restricted[e].is_subset(d_set)
            })
            .collect();
        if parts.len() < 2 {
            continue;
        }
        let union: BTreeSet<&NetNode> = parts.iter().flat_map(|&e| &e_restricted[e]).collect();
        if union.len() != d_set.len() {
            continue;
        }

        let survivor = normals[d_index].name.as_str();
        for &e in &parts {
            e_to_final[e] = Some(d_index);
            let name = existing_nets[e].1.name.as_str();
            if name != survivor {
                info!("Merging net \"{name}\" into \"{survivor}\"");
                sync.merged.push(NetMerge {
                    survivor: survivor.to_string(),
                    absorbed: name.to_string(),
                });
            }
            for node in &existing_nets[e].1.nodes {
                let t = translate(node);
                if let Some(path) = location.get(t.reference.as_str()) {
                    sync.dirty.insert(path.clone());
                }
            }
        }
    }

    // Whatever is left maps by name within the same scope, or becomes a
    // target-only net the run preserves.
    let mut finals: Vec<NormalNet> = normals.clone();
    for normal in &mut finals {
        normal.members.retain(|n| !frozen_translated.contains(n));
    }
    for (e_index, (e_owner, e_net)) in existing_nets.iter().enumerate() {
        if e_to_final[e_index].is_some() {
            continue;
        }
        let e_global = e_net.scope.is_global() || e_net.power.is_some();
        let found = normals.iter().position(|normal| {
            normal.name == e_net.name
                && normal.global == e_global
                && (normal.global || normal.owner == *e_owner)
        });
        if let Some(d_index) = found {
            e_to_final[e_index] = Some(d_index);
            continue;
        }
        let owner = if e_global {
            Vec::new()
        } else {
            surviving_ancestor(e_owner, plan)
        };
        e_to_final[e_index] = Some(finals.len());
        finals.push(NormalNet {
            name: e_net.name.clone(),
            owner,
            power: e_net.power.clone(),
            global: e_global,
            members: BTreeSet::new(),
        });
    }

    // Frozen and preserved memberships ride along under the final name of
    // whatever net carried them.
    for (e_index, (_, e_net)) in existing_nets.iter().enumerate() {
        let final_index = e_to_final[e_index].unwrap_or_default();
        for node in &e_net.nodes {
            if removed_refs.contains(node.reference.as_str()) {
                continue;
            }
            let t = translate(node);
            if frozen_translated.contains(&t) || preserved_refs.contains(t.reference.as_str()) {
                finals[final_index].members.insert(t);
            }
        }
    }

    // Power classification changes relabel rails in place; the affected
    // sheets need fresh bytes.
    for (e_index, (_, e_net)) in existing_nets.iter().enumerate() {
        let final_index = e_to_final[e_index].unwrap_or_default();
        if finals[final_index].power != e_net.power && finals[final_index].name == e_net.name {
            for node in &e_net.nodes {
                let t = translate(node);
                if let Some(path) = location.get(t.reference.as_str()) {
                    sync.dirty.insert(path.clone());
                }
            }
        }
    }

    // Attach / detach on matched pins. The desired side owns them; frozen
    // pins sat this out above.
    let mut desired_binding: BTreeMap<&NetNode, usize> = BTreeMap::new();
    for (d_index, normal) in normals.iter().enumerate() {
        for node in &normal.members {
            desired_binding.insert(node, d_index);
        }
    }
    let mut existing_binding: BTreeMap<NetNode, usize> = BTreeMap::new();
    for (e_index, (_, e_net)) in existing_nets.iter().enumerate() {
        for node in &e_net.nodes {
            if frozen_raw.contains(node)
                || !existing_to_desired.contains_key(node.reference.as_str())
            {
                continue;
            }
            existing_binding.insert(translate(node), e_index);
        }
    }

    for (e_index, (_, e_net)) in existing_nets.iter().enumerate() {
        for node in &e_net.nodes {
            if frozen_raw.contains(node)
                || !existing_to_desired.contains_key(node.reference.as_str())
            {
                continue;
            }
            let t = translate(node);
            if desired_binding.get(&t).copied() != e_to_final[e_index] {
                debug!("Detaching {} from '{}'", t, e_net.name);
                if let Some(path) = location.get(t.reference.as_str()) {
                    sync.dirty.insert(path.clone());
                }
                sync.detached.push(NetBinding {
                    net: e_net.name.clone(),
                    node: t,
                });
            }
        }
    }
    for (d_index, normal) in normals.iter().enumerate() {
        for node in &normal.members {
            if frozen_translated.contains(node) {
                continue;
            }
            if existing_binding.get(node).map(|&e| e_to_final[e]) == Some(Some(d_index)) {
                continue;
            }
            debug!("Attaching {} to '{}'", node, normal.name);
            if let Some(path) = location.get(node.reference.as_str()) {
                sync.dirty.insert(path.clone());
            }
            sync.attached.push(NetBinding {
                net: normal.name.clone(),
                node: node.clone(),
            });
        }
    }

    derive_ports(&finals, desired, existing, plan, &location, &mut sync);

    // Final net state per sheet, deterministically ordered. Nets that lost
    // every member disappear unless a rail marker keeps them visible.
    for net in finals {
        if net.members.is_empty() && net.power.is_none() {
            continue;
        }
        let built = if net.global {
            Net::global(net.name)
        } else {
            Net::local(net.name, net.owner.clone())
        };
        let built = match net.power {
            Some(rail) => built.with_power(rail),
            None => built,
        };
        let owner = if net.global { Vec::new() } else { net.owner };
        sync.nets
            .entry(owner)
            .or_default()
            .push(built.with_nodes(net.members));
    }
    for nets in sync.nets.values_mut() {
        nets.sort_by(|a, b| schsync_model::natural::compare(&a.name, &b.name));
    }
    sync.attached.sort();
    sync.detached.sort();
    sync.merged.sort();
    sync.ports_added.sort();
    sync.ports_removed.sort();

    sync
}

/// Unify the desired model's declared nets across sheets. Pieces sharing a
/// global or power name fuse by name; local pieces fuse where a declared
/// port links them to the same name one sheet up. The owner is the topmost
/// sheet the net touches.
fn normalize_desired(desired: &Circuit, location: &BTreeMap<String, Vec<String>>) -> Vec<NormalNet> {
    let pieces: Vec<(Vec<String>, &Net)> = desired.nets();

    let global_names: BTreeSet<&str> = pieces
        .iter()
        .filter(|(_, net)| net.scope.is_global() || net.power.is_some())
        .map(|(_, net)| net.name.as_str())
        .collect();

    fn key_of(
        keys: &mut BTreeMap<(Vec<String>, String), usize>,
        uf: &mut UnionFind,
        path: Vec<String>,
        name: &str,
    ) -> usize {
        *keys
            .entry((path, name.to_string()))
            .or_insert_with(|| uf.push())
    }

    let mut keys: BTreeMap<(Vec<String>, String), usize> = BTreeMap::new();
    let mut uf = UnionFind::default();
    let mut piece_node = Vec::with_capacity(pieces.len());
    for (_, net) in &pieces {
        let path = if global_names.contains(net.name.as_str()) {
            Vec::new()
        } else {
            match &net.scope {
                NetScope::Local(path) => path.clone(),
                NetScope::Global => Vec::new(),
            }
        };
        piece_node.push(key_of(&mut keys, &mut uf, path, &net.name));
    }

    // Declared ports link a child-scope name to the same name in the parent.
    let mut links: Vec<((Vec<String>, String), (Vec<String>, String))> = Vec::new();
    desired.walk_sheets(|path, sheet| {
        if path.is_empty() {
            return;
        }
        let child = owned(path);
        let parent = owned(&path[..path.len() - 1]);
        for port in &sheet.ports {
            links.push((
                (child.clone(), port.name.clone()),
                (parent.clone(), port.name.clone()),
            ));
        }
    });
    for (a, b) in links {
        if global_names.contains(a.1.as_str()) {
            continue;
        }
        let a = key_of(&mut keys, &mut uf, a.0, &a.1);
        let b = key_of(&mut keys, &mut uf, b.0, &b.1);
        uf.union(a, b);
    }

    // Gather classes: members union, topmost touched sheet as owner.
    let mut classes: BTreeMap<usize, NormalNet> = BTreeMap::new();
    let mut touched: BTreeMap<usize, Vec<Vec<String>>> = BTreeMap::new();
    for ((path, _), &node) in &keys {
        touched.entry(uf.find(node)).or_default().push(path.clone());
    }
    for (index, (_, net)) in pieces.iter().enumerate() {
        let root = uf.find(piece_node[index]);
        let entry = classes.entry(root).or_insert_with(|| NormalNet {
            name: net.name.clone(),
            owner: Vec::new(),
            power: None,
            global: global_names.contains(net.name.as_str()),
            members: BTreeSet::new(),
        });
        if entry.power.is_none() {
            entry.power = net.power.clone();
        }
        for node in &net.nodes {
            entry.members.insert(node.clone());
            if let Some(path) = location.get(node.reference.as_str()) {
                touched.entry(root).or_default().push(path.clone());
            }
        }
    }

    let mut normals: Vec<NormalNet> = classes
        .into_iter()
        .map(|(root, mut net)| {
            if !net.global {
                net.owner = common_prefix(touched.get(&root).map(Vec::as_slice).unwrap_or(&[]));
            }
            net
        })
        .collect();
    normals.sort_by(|a, b| {
        a.owner
            .cmp(&b.owner)
            .then_with(|| schsync_model::natural::compare(&a.name, &b.name))
    });
    normals
}

/// Every file that can hold a label of this net: the sheets its members sit
/// on plus the chain of sheets linking each one back to the owner, where the
/// boundary-port halves live.
fn label_files(
    owner: &[String],
    net: &Net,
    existing: &Circuit,
    plan: &SheetPlan,
) -> BTreeSet<PathBuf> {
    let mut files = BTreeSet::new();
    let mut add = |path: &[String]| {
        let file = if path.is_empty() {
            plan.file(&[]).cloned()
        } else {
            existing.subcircuit(path).and_then(|s| s.file.clone())
        };
        if let Some(file) = file {
            files.insert(file);
        }
    };

    add(owner);
    for node in &net.nodes {
        if let Some(member) = existing.scope_of(&node.reference) {
            for len in owner.len()..=member.len() {
                add(&member[..len]);
            }
        }
    }
    files
}

fn derive_ports(
    finals: &[NormalNet],
    desired: &Circuit,
    existing: &Circuit,
    plan: &SheetPlan,
    location: &BTreeMap<String, Vec<String>>,
    sync: &mut NetSync,
) {
    // Direction hints: declared ports first, then whatever the target used.
    let mut hints: BTreeMap<(Vec<String>, String), HierPort> = BTreeMap::new();
    existing.walk_sheets(|path, sheet| {
        for port in &sheet.ports {
            hints.insert((owned(path), port.name.clone()), port.clone());
        }
    });
    let mut declared: BTreeMap<Vec<String>, Vec<&HierPort>> = BTreeMap::new();
    desired.walk_sheets(|path, sheet| {
        for port in &sheet.ports {
            hints.insert((owned(path), port.name.clone()), port.clone());
            declared.entry(owned(path)).or_default().push(port);
        }
    });

    // A local net crossing into a sheet needs a port on that sheet and on
    // every sheet between it and the owner.
    let mut derived: BTreeMap<Vec<String>, BTreeSet<String>> = BTreeMap::new();
    for net in finals {
        if net.global || net.power.is_some() {
            continue;
        }
        for node in &net.members {
            let Some(member) = location.get(node.reference.as_str()) else {
                continue;
            };
            if !member.starts_with(&net.owner) {
                continue;
            }
            for len in net.owner.len() + 1..=member.len() {
                derived
                    .entry(member[..len].to_vec())
                    .or_default()
                    .insert(net.name.clone());
            }
        }
    }

    let preserved_paths: BTreeSet<&Vec<String>> = plan.preserved.iter().collect();
    let mut per_path: BTreeMap<Vec<String>, Vec<HierPort>> = BTreeMap::new();
    for path in plan.files.keys() {
        if path.is_empty() {
            per_path.insert(Vec::new(), Vec::new());
            continue;
        }
        let mut names: BTreeSet<String> = derived.get(path).cloned().unwrap_or_default();
        for port in declared.get(path).into_iter().flatten() {
            names.insert(port.name.clone());
        }
        let preserved_here = preserved_paths.contains(path)
            || preserved_paths.iter().any(|p| path.starts_with(p.as_slice()));
        if preserved_here {
            // Hand-drawn sheets keep every port they already have.
            if let Some(sheet) = existing.subcircuit(path) {
                for port in &sheet.ports {
                    names.insert(port.name.clone());
                }
            }
        }
        let ports = names
            .into_iter()
            .map(|name| match hints.get(&(path.clone(), name.clone())) {
                Some(port) => port.clone(),
                None => HierPort::new(name),
            })
            .collect();
        per_path.insert(path.clone(), ports);
    }

    // Instances sharing one backing file carry one set of labels, so they
    // must agree on ports: assign each instance the union.
    let mut by_file: BTreeMap<&PathBuf, Vec<&Vec<String>>> = BTreeMap::new();
    for (path, file) in &plan.files {
        by_file.entry(file).or_default().push(path);
    }
    for paths in by_file.values().filter(|paths| paths.len() > 1) {
        let mut union: BTreeMap<String, HierPort> = BTreeMap::new();
        for path in paths {
            for port in per_path.get(*path).into_iter().flatten() {
                union.entry(port.name.clone()).or_insert_with(|| port.clone());
            }
        }
        for path in paths {
            if path.is_empty() {
                continue;
            }
            per_path.insert((*path).clone(), union.values().cloned().collect());
        }
    }

    // Diff against the target and mark both halves' files for re-emission.
    for (path, ports) in &per_path {
        if path.is_empty() {
            continue;
        }
        let before: BTreeSet<&str> = existing
            .subcircuit(path)
            .map(|sheet| sheet.ports.iter().map(|p| p.name.as_str()).collect())
            .unwrap_or_default();
        let after: BTreeSet<&str> = ports.iter().map(|p| p.name.as_str()).collect();
        for port in after.difference(&before) {
            sync.ports_added.push(PortChange {
                sheet: path.clone(),
                port: port.to_string(),
            });
        }
        for port in before.difference(&after) {
            sync.ports_removed.push(PortChange {
                sheet: path.clone(),
                port: port.to_string(),
            });
        }
        if before != after {
            sync.dirty.insert(path.clone());
            sync.dirty.insert(path[..path.len() - 1].to_vec());
        }
    }

    sync.ports = per_path;
}

fn surviving_ancestor(path: &[String], plan: &SheetPlan) -> Vec<String> {
    let mut candidate = path;
    while !candidate.is_empty() && !plan.files.contains_key(candidate) {
        candidate = &candidate[..candidate.len() - 1];
    }
    candidate.to_vec()
}

fn common_prefix(paths: &[Vec<String>]) -> Vec<String> {
    let Some(first) = paths.first() else {
        return Vec::new();
    };
    let mut prefix = first.as_slice();
    for path in &paths[1..] {
        let shared = prefix
            .iter()
            .zip(path.iter())
            .take_while(|(a, b)| a == b)
            .count();
        prefix = &prefix[..shared];
    }
    prefix.to_vec()
}

fn owned(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

#[derive(Default)]
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn push(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        id
    }

    fn find(&mut self, mut id: usize) -> usize {
        while self.parent[id] != id {
            self.parent[id] = self.parent[self.parent[id]];
            id = self.parent[id];
        }
        id
    }

    fn union(&mut self, a: usize, b: usize) {
        let a = self.find(a);
        let b = self.find(b);
        if a != b {
            self.parent[a.max(b)] = a.min(b);
        }
    }
}
