//! Flattened netlist import.
//!
//! Parses a KiCad-style `(export ...)` netlist into a [`Circuit`], giving
//! callers without schematic files a way to bootstrap the existing side of a
//! reconciliation run. The import is equivalent to a store load as far as the
//! engine is concerned: components are scoped by their `sheetpath`, nets by
//! their name prefix, and `unconnected-...` markers become pins with no net
//! membership.
//!
//! Global nets land on the root sheet; local nets land on the sheet their
//! path names.

use std::collections::BTreeMap;

use schsync_sexpr::{Sexp, child_list, child_lists};
use uuid::Uuid;

use crate::{
    Circuit, Component, ModelError, Net, NetNode, NetScope, Pin, PinFunction, PowerNetTable,
    Subcircuit, natural,
};

/// Import failures.
#[derive(Debug, thiserror::Error)]
pub enum NetlistError {
    #[error("Netlist parse error: {0}")]
    Parse(#[from] schsync_sexpr::ParseError),
    #[error("Not a netlist export document")]
    NotAnExport,
    #[error("Component entry missing '{0}'")]
    MissingField(&'static str),
    #[error("Net '{net}' references unknown component '{reference}'")]
    UnknownNode { net: String, reference: String },
    #[error("Imported netlist violates model invariants: {0}")]
    Invalid(#[from] ModelError),
}

/// Parse `source` as a netlist export and build a circuit from it.
///
/// `power` classifies global rails the same way a store load would.
pub fn import_netlist(source: &str, power: &PowerNetTable) -> Result<Circuit, NetlistError> {
    let doc = schsync_sexpr::parse(source)?;
    let items = doc
        .as_list()
        .filter(|items| items.first().and_then(Sexp::as_sym) == Some("export"))
        .ok_or(NetlistError::NotAnExport)?;

    // First pass: component metadata keyed by reference, in netlist order.
    let mut comps: Vec<CompEntry> = Vec::new();
    let mut by_reference: BTreeMap<String, usize> = BTreeMap::new();
    if let Some(components) = child_list(items, "components") {
        for comp in child_lists(components, "comp") {
            let entry = CompEntry::read(comp)?;
            by_reference.insert(entry.reference.clone(), comps.len());
            comps.push(entry);
        }
    }
    log::debug!("netlist import: {} component(s)", comps.len());

    // Second pass: nets. Every node registers a pin on its component; only
    // real nets (not unconnected markers) produce memberships.
    let mut parsed_nets: Vec<(NetScope, String, Vec<NetNode>)> = Vec::new();
    if let Some(nets) = child_list(items, "nets") {
        for net_items in child_lists(nets, "net") {
            let raw_name = atom_field(net_items, "name")
                .ok_or(NetlistError::MissingField("name"))?
                .to_string();

            let mut nodes = Vec::new();
            for node in child_lists(net_items, "node") {
                let reference = atom_field(node, "ref")
                    .ok_or(NetlistError::MissingField("ref"))?
                    .to_string();
                let pin = atom_field(node, "pin")
                    .ok_or(NetlistError::MissingField("pin"))?
                    .to_string();
                let function = atom_field(node, "pintype")
                    .and_then(PinFunction::from_token)
                    .unwrap_or_default();

                let Some(&idx) = by_reference.get(&reference) else {
                    return Err(NetlistError::UnknownNode {
                        net: raw_name,
                        reference,
                    });
                };
                comps[idx].pins.entry(pin.clone()).or_insert(function);
                nodes.push(NetNode::new(reference, pin));
            }

            // KiCad writes one unconnected-(REF-PadN) net per isolated pin.
            // The pin registration above is all we keep from those.
            if raw_name.starts_with("unconnected-") {
                continue;
            }

            let (scope, name) = split_scoped_name(&raw_name);
            parsed_nets.push((scope, name, nodes));
        }
    }

    // Assemble the hierarchy.
    let mut circuit = Circuit::new();
    for entry in comps {
        let sheet = ensure_sheet(&mut circuit.root, &entry.sheet);
        sheet.add_component(entry.into_component());
    }
    for (scope, name, nodes) in parsed_nets {
        let sheet = match &scope {
            NetScope::Global => &mut circuit.root,
            NetScope::Local(path) => ensure_sheet(&mut circuit.root, path),
        };
        sheet.add_net(Net::new(name, scope.clone()).with_nodes(nodes));
    }

    circuit.classify_power(power);
    circuit.validate()?;
    Ok(circuit)
}

struct CompEntry {
    reference: String,
    lib_id: String,
    value: String,
    footprint: Option<String>,
    uuid: Option<Uuid>,
    sheet: Vec<String>,
    pins: BTreeMap<String, PinFunction>,
}

impl CompEntry {
    fn read(comp: &[Sexp]) -> Result<Self, NetlistError> {
        let reference = atom_field(comp, "ref")
            .ok_or(NetlistError::MissingField("ref"))?
            .to_string();
        let lib_id = child_list(comp, "libsource")
            .and_then(|libsource| {
                let lib = atom_field(libsource, "lib")?;
                let part = atom_field(libsource, "part")?;
                Some(format!("{lib}:{part}"))
            })
            .ok_or(NetlistError::MissingField("libsource"))?;

        Ok(Self {
            reference,
            lib_id,
            value: atom_field(comp, "value").unwrap_or_default().to_string(),
            footprint: atom_field(comp, "footprint").map(str::to_string),
            uuid: comp_uuid(comp),
            sheet: sheet_path(comp),
            pins: BTreeMap::new(),
        })
    }

    fn into_component(self) -> Component {
        let mut numbers: Vec<(String, PinFunction)> = self.pins.into_iter().collect();
        numbers.sort_by(|(a, _), (b, _)| natural::compare(a, b));

        let mut component = Component::new(self.reference, self.lib_id).with_value(self.value);
        component.footprint = self.footprint;
        component.uuid = self.uuid;
        component.pins = numbers
            .into_iter()
            .map(|(number, function)| Pin::new(number).with_function(function))
            .collect();
        component
    }
}

/// Read `(tag value)` where the value may be quoted or bare.
fn atom_field<'a>(items: &'a [Sexp], tag: &str) -> Option<&'a str> {
    child_list(items, tag)?.get(1)?.as_atom()
}

/// `(sheetpath (names "/supply/") ...)` -> `["supply"]`; root is empty.
fn sheet_path(comp: &[Sexp]) -> Vec<String> {
    child_list(comp, "sheetpath")
        .and_then(|sheetpath| atom_field(sheetpath, "names"))
        .map(|names| {
            names
                .split('/')
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Component `(tstamps "...")` values are path-shaped; the last segment is
/// the component's own identifier.
fn comp_uuid(comp: &[Sexp]) -> Option<Uuid> {
    let raw = atom_field(comp, "tstamps")?;
    raw.trim_matches('/').rsplit('/').next()?.parse().ok()
}

/// `/supply/VREG` -> local to `["supply"]`, named `VREG`; bare names are
/// global.
fn split_scoped_name(raw: &str) -> (NetScope, String) {
    match raw.strip_prefix('/') {
        Some(rest) => {
            let mut parts: Vec<String> = rest
                .split('/')
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect();
            let name = parts.pop().unwrap_or_default();
            (NetScope::Local(parts), name)
        }
        None => (NetScope::Global, raw.to_string()),
    }
}

fn ensure_sheet<'a>(root: &'a mut Subcircuit, path: &[String]) -> &'a mut Subcircuit {
    let mut sheet = root;
    for name in path {
        let exists = sheet.children.iter().any(|c| &c.name == name);
        if !exists {
            sheet.add_child(Subcircuit::new(name.clone()));
        }
        sheet = sheet
            .child_mut(name)
            .expect("child sheet exists after insertion");
    }
    sheet
}
