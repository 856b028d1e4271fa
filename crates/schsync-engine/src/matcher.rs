//! Component identity matching between the desired circuit and the target.
//!
//! Five passes, most reliable first:
//!
//! 1. uuid equality
//! 2. reference designator equality
//! 3. same position (within one grid unit per axis) and same
//!    `(lib_id, value, footprint)` signature
//! 4. signature groups of equal size, zipped in natural reference order
//! 5. net-name topology similarity (Jaccard) above a threshold
//!
//! Each pass only sees what earlier passes left unmatched. A fallback pass
//! that cannot decide between equally good candidates pairs nothing and
//! records the ambiguity; false negatives are fine, false positives are not.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use log::{debug, info};
use schsync_model::{Circuit, Component, GRID_UNIT_MM, natural};
use uuid::Uuid;

use crate::report::MatchStrategy;

/// Dense index into the desired-side arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DesiredId(pub u32);

/// Dense index into the existing-side arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExistingId(pub u32);

/// Thresholds for the fallback passes.
#[derive(Debug, Clone)]
pub struct MatchTuning {
    /// Per-axis position tolerance in millimetres for pass 3.
    pub grid_tolerance: f64,
    /// Minimum Jaccard similarity of net-name sets for pass 5.
    pub topology_threshold: f64,
}

impl Default for MatchTuning {
    fn default() -> Self {
        Self {
            grid_tolerance: GRID_UNIT_MM,
            topology_threshold: 0.5,
        }
    }
}

/// One side's components, flattened into a stable arena sorted by natural
/// reference order, with the net names attached to each component's pins.
pub struct Arena<'a> {
    components: Vec<&'a Component>,
    by_reference: BTreeMap<&'a str, usize>,
    net_names: Vec<BTreeSet<&'a str>>,
}

impl<'a> Arena<'a> {
    fn build(circuit: &'a Circuit) -> Self {
        let mut components = circuit.components();
        components.sort_by(|a, b| natural::compare(&a.reference, &b.reference));
        let by_reference: BTreeMap<&str, usize> = components
            .iter()
            .enumerate()
            .map(|(index, c)| (c.reference.as_str(), index))
            .collect();

        let mut net_names = vec![BTreeSet::new(); components.len()];
        for (_, net) in circuit.nets() {
            for node in &net.nodes {
                if let Some(&index) = by_reference.get(node.reference.as_str()) {
                    net_names[index].insert(net.name.as_str());
                }
            }
        }

        Self {
            components,
            by_reference,
            net_names,
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// A desired/existing pair and the pass that made it.
#[derive(Debug, Clone, Copy)]
pub struct MatchedPair {
    pub desired: DesiredId,
    pub existing: ExistingId,
    pub strategy: MatchStrategy,
}

/// A fallback pass that found several equally good candidates.
#[derive(Debug, Clone)]
pub struct Ambiguity {
    pub desired: String,
    pub candidates: Vec<String>,
}

/// The full matching result. Ids index into the arenas carried here.
pub struct MatchResult<'a> {
    pub desired: Arena<'a>,
    pub existing: Arena<'a>,
    pub pairs: Vec<MatchedPair>,
    pub unmatched_desired: Vec<DesiredId>,
    pub unmatched_existing: Vec<ExistingId>,
    pub ambiguous: Vec<Ambiguity>,
}

impl<'a> MatchResult<'a> {
    pub fn desired_component(&self, id: DesiredId) -> &'a Component {
        self.desired.components[id.0 as usize]
    }

    pub fn existing_component(&self, id: ExistingId) -> &'a Component {
        self.existing.components[id.0 as usize]
    }

    /// Existing reference -> desired reference for every matched pair.
    pub fn existing_to_desired(&self) -> BTreeMap<&'a str, &'a str> {
        self.pairs
            .iter()
            .map(|pair| {
                (
                    self.existing_component(pair.existing).reference.as_str(),
                    self.desired_component(pair.desired).reference.as_str(),
                )
            })
            .collect()
    }

    /// Desired reference -> existing reference for every matched pair.
    pub fn desired_to_existing(&self) -> BTreeMap<&'a str, &'a str> {
        self.pairs
            .iter()
            .map(|pair| {
                (
                    self.desired_component(pair.desired).reference.as_str(),
                    self.existing_component(pair.existing).reference.as_str(),
                )
            })
            .collect()
    }

    /// Desired components with no counterpart in the target.
    pub fn added(&self) -> Vec<&'a Component> {
        self.unmatched_desired
            .iter()
            .map(|&id| self.desired_component(id))
            .collect()
    }

    /// Unmatched existing components under declarative control: deleted.
    /// An ambiguity candidate is never deleted, whatever its origin; the
    /// desired twin lands as an add and both survive for the user to sort
    /// out.
    pub fn removal_candidates(&self) -> Vec<&'a Component> {
        let contested = self.contested();
        self.unmatched_existing
            .iter()
            .map(|&id| self.existing_component(id))
            .filter(|c| c.origin.is_generated() && !contested.contains(c.reference.as_str()))
            .collect()
    }

    /// Unmatched existing components the run must not touch.
    pub fn preserved(&self) -> Vec<&'a Component> {
        let contested = self.contested();
        self.unmatched_existing
            .iter()
            .map(|&id| self.existing_component(id))
            .filter(|c| !c.origin.is_generated() || contested.contains(c.reference.as_str()))
            .collect()
    }

    fn contested(&self) -> BTreeSet<&str> {
        self.ambiguous
            .iter()
            .flat_map(|a| a.candidates.iter().map(String::as_str))
            .collect()
    }
}

/// Run all five passes.
pub fn match_components<'a>(
    desired: &'a Circuit,
    existing: &'a Circuit,
    tuning: &MatchTuning,
) -> MatchResult<'a> {
    let desired = Arena::build(desired);
    let existing = Arena::build(existing);

    let mut state = State {
        pairs: Vec::new(),
        desired_taken: vec![false; desired.len()],
        existing_taken: vec![false; existing.len()],
        ambiguous: Vec::new(),
    };

    pass_uuid(&desired, &existing, &mut state);
    pass_reference(&desired, &existing, &mut state);
    pass_position(&desired, &existing, tuning, &mut state);
    pass_signature_groups(&desired, &existing, &mut state);
    pass_topology(&desired, &existing, tuning, &mut state);

    state.pairs.sort_by_key(|pair| pair.desired);
    let unmatched_desired = state
        .desired_taken
        .iter()
        .enumerate()
        .filter(|&(_, &taken)| !taken)
        .map(|(index, _)| DesiredId(index as u32))
        .collect();
    let unmatched_existing = state
        .existing_taken
        .iter()
        .enumerate()
        .filter(|&(_, &taken)| !taken)
        .map(|(index, _)| ExistingId(index as u32))
        .collect();

    debug!(
        "Matched {} pair(s); {} desired and {} existing left unmatched",
        state.pairs.len(),
        desired.len() - state.pairs.len(),
        existing.len() - state.pairs.len()
    );

    MatchResult {
        desired,
        existing,
        pairs: state.pairs,
        unmatched_desired,
        unmatched_existing,
        ambiguous: state.ambiguous,
    }
}

struct State {
    pairs: Vec<MatchedPair>,
    desired_taken: Vec<bool>,
    existing_taken: Vec<bool>,
    ambiguous: Vec<Ambiguity>,
}

impl State {
    fn pair(&mut self, desired: usize, existing: usize, strategy: MatchStrategy) {
        self.desired_taken[desired] = true;
        self.existing_taken[existing] = true;
        self.pairs.push(MatchedPair {
            desired: DesiredId(desired as u32),
            existing: ExistingId(existing as u32),
            strategy,
        });
    }
}

fn pass_uuid(desired: &Arena<'_>, existing: &Arena<'_>, state: &mut State) {
    // Collision means a hand-duplicated uuid: ambiguous, match neither.
    let mut by_uuid: BTreeMap<Uuid, Option<usize>> = BTreeMap::new();
    for (index, component) in existing.components.iter().enumerate() {
        if let Some(uuid) = component.uuid {
            by_uuid
                .entry(uuid)
                .and_modify(|slot| *slot = None)
                .or_insert(Some(index));
        }
    }

    for (index, component) in desired.components.iter().enumerate() {
        let Some(uuid) = component.uuid else {
            continue;
        };
        if let Some(Some(found)) = by_uuid.get(&uuid) {
            if !state.existing_taken[*found] {
                state.pair(index, *found, MatchStrategy::Uuid);
            }
        }
    }
}

fn pass_reference(desired: &Arena<'_>, existing: &Arena<'_>, state: &mut State) {
    for (index, component) in desired.components.iter().enumerate() {
        if state.desired_taken[index] {
            continue;
        }
        if let Some(&found) = existing.by_reference.get(component.reference.as_str()) {
            if !state.existing_taken[found] {
                state.pair(index, found, MatchStrategy::Reference);
            }
        }
    }
}

fn pass_position(
    desired: &Arena<'_>,
    existing: &Arena<'_>,
    tuning: &MatchTuning,
    state: &mut State,
) {
    for (index, component) in desired.components.iter().enumerate() {
        if state.desired_taken[index] {
            continue;
        }
        let Some(position) = component.position else {
            continue;
        };

        // Nearest same-signature candidate within tolerance; an exact
        // distance tie is ambiguous.
        let mut best: Vec<usize> = Vec::new();
        let mut best_key: Option<(f64, f64)> = None;
        for (candidate, other) in existing.components.iter().enumerate() {
            if state.existing_taken[candidate] {
                continue;
            }
            if other.signature() != component.signature() {
                continue;
            }
            let Some(other_position) = other.position else {
                continue;
            };
            if !other_position.within(&position, tuning.grid_tolerance) {
                continue;
            }
            let dx = (other_position.x - position.x).abs();
            let dy = (other_position.y - position.y).abs();
            let key = (dx.max(dy), dx + dy);
            match best_key {
                None => {
                    best_key = Some(key);
                    best.push(candidate);
                }
                Some(current) => match key.partial_cmp(&current) {
                    Some(std::cmp::Ordering::Less) => {
                        best_key = Some(key);
                        best.clear();
                        best.push(candidate);
                    }
                    Some(std::cmp::Ordering::Equal) => best.push(candidate),
                    _ => {}
                },
            }
        }

        match best.as_slice() {
            [] => {}
            [found] => {
                info!(
                    "Matched '{}' to '{}' by position",
                    component.reference, existing.components[*found].reference
                );
                state.pair(index, *found, MatchStrategy::Position);
            }
            several => {
                state.ambiguous.push(Ambiguity {
                    desired: component.reference.clone(),
                    candidates: several
                        .iter()
                        .map(|&c| existing.components[c].reference.clone())
                        .collect(),
                });
            }
        }
    }
}

fn pass_signature_groups(desired: &Arena<'_>, existing: &Arena<'_>, state: &mut State) {
    let desired_groups: BTreeMap<(&str, &str, &str), Vec<usize>> = desired
        .components
        .iter()
        .enumerate()
        .filter(|(index, _)| !state.desired_taken[*index])
        .map(|(index, c)| (c.signature(), index))
        .into_group_map()
        .into_iter()
        .collect();
    let existing_groups: BTreeMap<(&str, &str, &str), Vec<usize>> = existing
        .components
        .iter()
        .enumerate()
        .filter(|(index, _)| !state.existing_taken[*index])
        .map(|(index, c)| (c.signature(), index))
        .into_group_map()
        .into_iter()
        .collect();

    for (signature, desired_ids) in &desired_groups {
        let Some(existing_ids) = existing_groups.get(signature) else {
            continue;
        };
        if desired_ids.len() != existing_ids.len() {
            debug!(
                "Signature group {:?}: {} desired vs {} existing; leaving to topology",
                signature,
                desired_ids.len(),
                existing_ids.len()
            );
            continue;
        }
        // Both sides ascend in natural reference order already.
        for (&d, &e) in desired_ids.iter().zip(existing_ids) {
            info!(
                "Matched '{}' to '{}' by signature group",
                desired.components[d].reference, existing.components[e].reference
            );
            state.pair(d, e, MatchStrategy::SignatureGroup);
        }
    }
}

fn pass_topology(
    desired: &Arena<'_>,
    existing: &Arena<'_>,
    tuning: &MatchTuning,
    state: &mut State,
) {
    for (index, component) in desired.components.iter().enumerate() {
        if state.desired_taken[index] {
            continue;
        }
        let names = &desired.net_names[index];

        let mut best: Vec<usize> = Vec::new();
        let mut best_similarity = 0.0;
        for candidate in 0..existing.len() {
            if state.existing_taken[candidate] {
                continue;
            }
            let similarity = jaccard(names, &existing.net_names[candidate]);
            if similarity < tuning.topology_threshold {
                continue;
            }
            if similarity > best_similarity {
                best_similarity = similarity;
                best.clear();
                best.push(candidate);
            } else if similarity == best_similarity && !best.is_empty() {
                best.push(candidate);
            }
        }

        match best.as_slice() {
            [] => {}
            [found] => {
                info!(
                    "Matched '{}' to '{}' by topology (similarity {:.2})",
                    component.reference,
                    existing.components[*found].reference,
                    best_similarity
                );
                state.pair(index, *found, MatchStrategy::Topology);
            }
            several => {
                debug!(
                    "Topology tie for '{}': {} candidates at {:.2}",
                    component.reference,
                    several.len(),
                    best_similarity
                );
                state.ambiguous.push(Ambiguity {
                    desired: component.reference.clone(),
                    candidates: several
                        .iter()
                        .map(|&c| existing.components[c].reference.clone())
                        .collect(),
                });
            }
        }
    }
}

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
