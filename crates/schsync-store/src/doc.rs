//! Sheet document reading and emission.
//!
//! A sheet file is a single `(schsync_sch ...)` document. Reading produces a
//! [`SheetDoc`] - the model-facing view plus everything the loader needs to
//! assemble the circuit. Emission rebuilds a document from the circuit,
//! reusing layout and identity from the prior bytes via [`Meta`], and mints
//! v4 uuids for entities that have none.
//!
//! Wires and unrecognized nodes are out-of-band state: they ride through
//! emission verbatim, in load order, after everything the model owns.

use std::path::{Path, PathBuf};

use schsync_sexpr::{ListBuilder, Sexp, child_list, child_lists};
use uuid::Uuid;

use schsync_model::{
    Annotation, Circuit, Component, HierPort, Net, NetNode, Origin, Pin, PinFunction,
    PortDirection, Position, PropValue, Subcircuit, natural,
};

use crate::AssignedUuid;

pub(crate) const ROOT_TAG: &str = "schsync_sch";
pub(crate) const FORMAT_VERSION: i64 = 1;
pub(crate) const GENERATOR: &str = "schsync";

/// Reading failures that abort a load. Anything softer (a malformed label,
/// an unparseable uuid) is logged and skipped instead.
#[derive(Debug)]
pub(crate) enum DocError {
    Parse(schsync_sexpr::ParseError),
    NotASchematic,
}

/// A membership record read from a `(label ...)` or `(global_label ...)`.
#[derive(Debug, Clone)]
pub(crate) struct LabelEntry {
    pub net: String,
    pub node: NetNode,
    pub global: bool,
}

/// A `(power_symbol "rail" (net "NAME") ...)` rail marker.
#[derive(Debug, Clone)]
pub(crate) struct PowerEntry {
    pub rail: String,
    pub net: String,
}

/// A `(sheet ...)` child reference on a parent sheet.
#[derive(Debug, Clone)]
pub(crate) struct SheetEntry {
    pub name: String,
    pub file: PathBuf,
    pub position: Option<Position>,
    pub uuid: Option<Uuid>,
    pub origin: Origin,
    pub pins: Vec<HierPort>,
}

/// Everything a single sheet file contains, in model terms.
#[derive(Debug, Default)]
pub(crate) struct SheetDoc {
    pub uuid: Option<Uuid>,
    pub components: Vec<Component>,
    pub labels: Vec<LabelEntry>,
    pub power_symbols: Vec<PowerEntry>,
    pub hier_ports: Vec<HierPort>,
    pub sheets: Vec<SheetEntry>,
    pub annotations: Vec<Annotation>,
}

/// Parse one sheet document.
pub(crate) fn read_doc(source: &str) -> Result<SheetDoc, DocError> {
    let root = schsync_sexpr::parse(source).map_err(DocError::Parse)?;
    let items = root
        .as_list()
        .filter(|items| items.first().and_then(Sexp::as_sym) == Some(ROOT_TAG))
        .ok_or(DocError::NotASchematic)?;

    let mut doc = SheetDoc::default();
    for item in items.iter().skip(1) {
        let Some(list) = item.as_list() else {
            continue;
        };
        match list.first().and_then(Sexp::as_sym) {
            Some("uuid") => doc.uuid = read_uuid_value(list),
            Some("symbol") => {
                if let Some(component) = read_symbol(list) {
                    doc.components.push(component);
                } else {
                    log::warn!("Skipping malformed symbol node");
                }
            }
            Some("label") | Some("global_label") => {
                let global = list.first().and_then(Sexp::as_sym) == Some("global_label");
                if let Some(entry) = read_label(list, global) {
                    doc.labels.push(entry);
                } else {
                    log::warn!("Skipping label without name or anchor");
                }
            }
            Some("power_symbol") => {
                if let Some(entry) = read_power_symbol(list) {
                    doc.power_symbols.push(entry);
                } else {
                    log::warn!("Skipping malformed power_symbol node");
                }
            }
            Some("hier_label") => {
                if let Some(port) = read_hier_label(list) {
                    doc.hier_ports.push(port);
                } else {
                    log::warn!("Skipping hier_label without a name");
                }
            }
            Some("sheet") => {
                if let Some(entry) = read_sheet_entry(list) {
                    doc.sheets.push(entry);
                } else {
                    log::warn!("Skipping sheet node without name or file");
                }
            }
            Some("text") => {
                if let Some(annotation) = read_text(list) {
                    doc.annotations.push(annotation);
                }
            }
            // version, generator, wire, and anything unknown: not model state.
            _ => {}
        }
    }
    Ok(doc)
}

fn read_symbol(list: &[Sexp]) -> Option<Component> {
    let reference = schsync_sexpr::string_field(list, "reference")?;
    let lib_id = schsync_sexpr::string_field(list, "lib_id")?;

    let mut component = Component::new(reference, lib_id);
    component.value = schsync_sexpr::string_field(list, "value")
        .unwrap_or_default()
        .to_string();
    component.footprint = schsync_sexpr::string_field(list, "footprint").map(str::to_string);
    component.position = read_at(list);
    component.uuid = read_uuid(list);
    component.origin = read_origin(list);

    for property in child_lists(list, "property") {
        let Some(key) = property.get(1).and_then(Sexp::as_str) else {
            continue;
        };
        let value = property.get(2).and_then(Sexp::as_str).unwrap_or_default();
        component.add_property(key, value);
    }

    for pin in child_lists(list, "pin") {
        let Some(number) = pin.get(1).and_then(Sexp::as_str) else {
            continue;
        };
        let function = schsync_sexpr::sym_field(pin, "function")
            .and_then(PinFunction::from_token)
            .unwrap_or_default();
        component.add_pin(Pin::new(number).with_function(function));
    }

    Some(component)
}

fn read_label(list: &[Sexp], global: bool) -> Option<LabelEntry> {
    let net = list.get(1)?.as_str()?.to_string();
    let anchor = child_list(list, "anchor")?;
    let reference = anchor.get(1)?.as_str()?;
    let pin = anchor.get(2)?.as_str()?;
    Some(LabelEntry {
        net,
        node: NetNode::new(reference, pin),
        global,
    })
}

fn read_power_symbol(list: &[Sexp]) -> Option<PowerEntry> {
    let rail = list.get(1)?.as_str()?.to_string();
    let net = schsync_sexpr::string_field(list, "net")?.to_string();
    Some(PowerEntry { rail, net })
}

fn read_hier_label(list: &[Sexp]) -> Option<HierPort> {
    let name = list.get(1)?.as_str()?;
    let direction = schsync_sexpr::sym_field(list, "shape")
        .and_then(PortDirection::from_token)
        .unwrap_or_default();
    Some(HierPort::new(name).with_direction(direction))
}

fn read_sheet_entry(list: &[Sexp]) -> Option<SheetEntry> {
    let name = schsync_sexpr::string_field(list, "name")?.to_string();
    let file = PathBuf::from(schsync_sexpr::string_field(list, "file")?);

    let pins = child_lists(list, "pin")
        .into_iter()
        .filter_map(|pin| {
            let port_name = pin.get(1)?.as_str()?;
            let direction = schsync_sexpr::sym_field(pin, "shape")
                .and_then(PortDirection::from_token)
                .unwrap_or_default();
            Some(HierPort::new(port_name).with_direction(direction))
        })
        .collect();

    Some(SheetEntry {
        name,
        file,
        position: read_at(list),
        uuid: read_uuid(list),
        origin: read_origin(list),
        pins,
    })
}

fn read_text(list: &[Sexp]) -> Option<Annotation> {
    let text = list.get(1)?.as_str()?;
    let mut annotation = Annotation::new(text);
    annotation.position = read_at(list);
    annotation.uuid = read_uuid(list);
    Some(annotation)
}

fn read_at(list: &[Sexp]) -> Option<Position> {
    let at = child_list(list, "at")?;
    let x = at.get(1)?.as_number()?;
    let y = at.get(2)?.as_number()?;
    let rotation = at.get(3).and_then(Sexp::as_number).unwrap_or(0.0);
    Some(Position::new(x, y).with_rotation(rotation))
}

fn read_uuid(list: &[Sexp]) -> Option<Uuid> {
    read_uuid_value(child_list(list, "uuid")?)
}

fn read_uuid_value(uuid_list: &[Sexp]) -> Option<Uuid> {
    let raw = uuid_list.get(1)?.as_str()?;
    match raw.parse() {
        Ok(uuid) => Some(uuid),
        Err(_) => {
            log::warn!("Ignoring unparseable uuid '{raw}'");
            None
        }
    }
}

fn read_origin(list: &[Sexp]) -> Origin {
    schsync_sexpr::sym_field(list, "origin")
        .and_then(Origin::from_token)
        .unwrap_or_default()
}

/// Layout and identity recovered from a sheet's prior bytes, so surviving
/// entities keep their place and their uuid across a re-emission.
#[derive(Debug, Default)]
pub(crate) struct Meta {
    file_uuid: Option<Uuid>,
    labels: Vec<LabelMeta>,
    power: Vec<(String, Option<Position>, Option<Uuid>)>,
    hier: Vec<(String, Option<Position>, Option<Uuid>)>,
    sheet_pins: Vec<(String, String, Option<Position>)>,
    /// Wire and unknown nodes, verbatim, in load order.
    keep: Vec<Sexp>,
}

#[derive(Debug)]
struct LabelMeta {
    net: String,
    reference: String,
    pin: String,
    at: Option<Position>,
    uuid: Option<Uuid>,
}

impl Meta {
    pub(crate) fn collect(prior_source: &str) -> Self {
        if prior_source.is_empty() {
            return Self::default();
        }
        let Ok(root) = schsync_sexpr::parse(prior_source) else {
            log::warn!("Prior sheet bytes no longer parse; emitting without layout reuse");
            return Self::default();
        };
        let Some(items) = root.as_list() else {
            return Self::default();
        };

        let mut meta = Self::default();
        for item in items.iter().skip(1) {
            let Some(list) = item.as_list() else {
                continue;
            };
            match list.first().and_then(Sexp::as_sym) {
                Some("uuid") => meta.file_uuid = read_uuid_value(list),
                Some("label") | Some("global_label") => {
                    if let Some(entry) = read_label(list, false) {
                        meta.labels.push(LabelMeta {
                            net: entry.net,
                            reference: entry.node.reference,
                            pin: entry.node.pin,
                            at: read_at(list),
                            uuid: read_uuid(list),
                        });
                    }
                }
                Some("power_symbol") => {
                    if let Some(entry) = read_power_symbol(list) {
                        meta.power.push((entry.net, read_at(list), read_uuid(list)));
                    }
                }
                Some("hier_label") => {
                    if let Some(name) = list.get(1).and_then(Sexp::as_str) {
                        meta.hier
                            .push((name.to_string(), read_at(list), read_uuid(list)));
                    }
                }
                Some("sheet") => {
                    let sheet_name = schsync_sexpr::string_field(list, "name").unwrap_or_default();
                    for pin in child_lists(list, "pin") {
                        if let Some(pin_name) = pin.get(1).and_then(Sexp::as_str) {
                            meta.sheet_pins.push((
                                sheet_name.to_string(),
                                pin_name.to_string(),
                                read_at(pin),
                            ));
                        }
                    }
                }
                Some("wire") => meta.keep.push(item.clone()),
                Some("version") | Some("generator") | Some("symbol") | Some("text") => {}
                // Forward compatibility: nodes this version does not know
                // survive round trips untouched.
                _ => meta.keep.push(item.clone()),
            }
        }
        meta
    }

    fn label(&self, net: &str, node: &NetNode) -> (Option<Position>, Option<Uuid>) {
        let exact = self.labels.iter().find(|l| {
            l.net == net && l.reference == node.reference && l.pin == node.pin
        });
        let found = exact.or_else(|| {
            self.labels
                .iter()
                .find(|l| l.reference == node.reference && l.pin == node.pin)
        });
        found.map(|l| (l.at, l.uuid)).unwrap_or((None, None))
    }

    fn power(&self, net: &str) -> (Option<Position>, Option<Uuid>) {
        self.power
            .iter()
            .find(|(name, _, _)| name == net)
            .map(|(_, at, uuid)| (*at, *uuid))
            .unwrap_or((None, None))
    }

    fn had_power_symbol(&self, net: &str) -> bool {
        self.power.iter().any(|(name, _, _)| name == net)
    }

    fn hier(&self, name: &str) -> (Option<Position>, Option<Uuid>) {
        self.hier
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, at, uuid)| (*at, *uuid))
            .unwrap_or((None, None))
    }

    fn sheet_pin(&self, sheet: &str, pin: &str) -> Option<Position> {
        self.sheet_pins
            .iter()
            .find(|(s, p, _)| s == sheet && p == pin)
            .and_then(|(_, _, at)| *at)
    }
}

/// Everything emission needs about one sheet.
pub(crate) struct EmitInput<'a> {
    pub circuit: &'a Circuit,
    /// Path of this sheet from the root (empty for the root sheet).
    pub path: Vec<String>,
    pub sub: &'a Subcircuit,
    pub file: &'a Path,
    pub prior_source: &'a str,
    /// Reference -> owning sheet path for the whole circuit.
    pub scopes: &'a std::collections::BTreeMap<String, Vec<String>>,
}

/// Emit a sheet document as canonical text, minting uuids as needed.
pub(crate) fn emit(input: &EmitInput<'_>) -> (String, Vec<AssignedUuid>) {
    let meta = Meta::collect(input.prior_source);
    let mut minted = Minted {
        file: input.file,
        assigned: Vec::new(),
    };

    let mut builder = ListBuilder::node(ROOT_TAG);
    builder.push(schsync_sexpr::kv("version", Sexp::int(FORMAT_VERSION)));
    builder.push(schsync_sexpr::kv("generator", Sexp::string(GENERATOR)));

    let file_uuid = input
        .sub
        .uuid
        .filter(|_| input.path.is_empty())
        .or(meta.file_uuid)
        .unwrap_or_else(|| minted.mint("sheet file"));
    builder.push(uuid_node(file_uuid));

    // Symbols, natural reference order.
    let mut components: Vec<&Component> = input.sub.components.iter().collect();
    components.sort_by(|a, b| natural::compare(&a.reference, &b.reference));
    for component in components {
        builder.push(symbol_node(component, &mut minted));
    }

    // Labels: every member of every net that lives on this sheet, ordered by
    // (net, reference, pin).
    let mut members: Vec<(&Net, &NetNode)> = Vec::new();
    for (_, net) in input.circuit.nets() {
        for node in &net.nodes {
            if input.scopes.get(&node.reference) == Some(&input.path) {
                members.push((net, node));
            }
        }
    }
    members.sort_by(|(a_net, a), (b_net, b)| {
        natural::compare(&a_net.name, &b_net.name)
            .then_with(|| natural::compare(&a.reference, &b.reference))
            .then_with(|| natural::compare(&a.pin, &b.pin))
    });
    for (net, node) in &members {
        builder.push(label_node(net, node, input, &meta, &mut minted));
    }

    // Power rail markers: one per power net present on this sheet, plus any
    // marker the sheet already carried (memberless rails stay put).
    let mut power_nets: Vec<&Net> = Vec::new();
    for (_, net) in input.circuit.nets() {
        if net.power.is_none() {
            continue;
        }
        let present = members.iter().any(|(m, _)| m.name == net.name)
            || meta.had_power_symbol(&net.name);
        if present && !power_nets.iter().any(|n| n.name == net.name) {
            power_nets.push(net);
        }
    }
    power_nets.sort_by(|a, b| natural::compare(&a.name, &b.name));
    for net in power_nets {
        builder.push(power_node(net, &meta, &mut minted));
    }

    // Hierarchical ports: the child half.
    let mut ports: Vec<&HierPort> = input.sub.ports.iter().collect();
    ports.sort_by(|a, b| natural::compare(&a.name, &b.name));
    for (index, port) in ports.iter().enumerate() {
        builder.push(hier_label_node(port, index, &meta, &mut minted));
    }

    // Child sheets, with the parent half of each port.
    let mut children: Vec<&Subcircuit> = input.sub.children.iter().collect();
    children.sort_by(|a, b| natural::compare(&a.name, &b.name));
    for child in children {
        builder.push(sheet_node(child, &meta, &mut minted));
    }

    for (index, annotation) in input.sub.annotations.iter().enumerate() {
        builder.push(text_node(annotation, index, &mut minted));
    }

    for kept in &meta.keep {
        builder.push(kept.clone());
    }

    let tree = builder.build();
    (schsync_sexpr::format::format_tree(&tree), minted.assigned)
}

struct Minted<'a> {
    file: &'a Path,
    assigned: Vec<AssignedUuid>,
}

impl Minted<'_> {
    fn mint(&mut self, entity: impl Into<String>) -> Uuid {
        let uuid = Uuid::new_v4();
        let entity = entity.into();
        log::debug!("Assigned uuid {uuid} to {entity} in {}", self.file.display());
        self.assigned.push(AssignedUuid {
            file: self.file.to_path_buf(),
            entity,
            uuid,
        });
        uuid
    }
}

fn uuid_node(uuid: Uuid) -> Sexp {
    schsync_sexpr::kv("uuid", Sexp::string(uuid.to_string()))
}

fn at_node(position: &Position) -> Sexp {
    Sexp::list(vec![
        Sexp::symbol("at"),
        Sexp::float(position.x),
        Sexp::float(position.y),
        Sexp::float(position.rotation),
    ])
}

fn symbol_node(component: &Component, minted: &mut Minted<'_>) -> Sexp {
    let mut b = ListBuilder::node("symbol");
    b.push(schsync_sexpr::kv("lib_id", Sexp::string(&component.lib_id)));
    b.push(schsync_sexpr::kv(
        "reference",
        Sexp::string(&component.reference),
    ));
    b.push(schsync_sexpr::kv("value", Sexp::string(&component.value)));
    if let Some(footprint) = &component.footprint {
        b.push(schsync_sexpr::kv("footprint", Sexp::string(footprint)));
    }
    if let Some(position) = &component.position {
        b.push(at_node(position));
    }
    let uuid = component
        .uuid
        .unwrap_or_else(|| minted.mint(format!("symbol {}", component.reference)));
    b.push(uuid_node(uuid));
    if component.origin.is_generated() {
        b.push(schsync_sexpr::kv("origin", Sexp::symbol("generated")));
    }
    for (key, value) in &component.properties {
        b.push(Sexp::list(vec![
            Sexp::symbol("property"),
            Sexp::string(key),
            Sexp::string(value.to_text()),
        ]));
    }
    let mut pins: Vec<&Pin> = component.pins.iter().collect();
    pins.sort_by(|a, b| natural::compare(&a.number, &b.number));
    for pin in pins {
        let mut pb = ListBuilder::node("pin");
        pb.push(Sexp::string(&pin.number));
        if pin.function != PinFunction::Passive {
            pb.push(schsync_sexpr::kv(
                "function",
                Sexp::symbol(pin.function.as_token()),
            ));
        }
        b.push(pb.build());
    }
    b.build()
}

fn label_node(
    net: &Net,
    node: &NetNode,
    input: &EmitInput<'_>,
    meta: &Meta,
    minted: &mut Minted<'_>,
) -> Sexp {
    let tag = if net.power.is_none() && net.scope.is_global() {
        "global_label"
    } else {
        "label"
    };

    let (prior_at, prior_uuid) = meta.label(&net.name, node);
    let at = prior_at.unwrap_or_else(|| default_label_position(node, input));
    let uuid =
        prior_uuid.unwrap_or_else(|| minted.mint(format!("label {}@{}", net.name, node)));

    let mut b = ListBuilder::node(tag);
    b.push(Sexp::string(&net.name));
    b.push(Sexp::list(vec![
        Sexp::symbol("anchor"),
        Sexp::string(&node.reference),
        Sexp::string(&node.pin),
    ]));
    b.push(at_node(&at));
    b.push(uuid_node(uuid));
    b.build()
}

/// New labels land next to their component, stacked one grid unit apart per
/// pin so two fresh labels never coincide.
fn default_label_position(node: &NetNode, input: &EmitInput<'_>) -> Position {
    let base = input
        .circuit
        .component(&node.reference)
        .and_then(|c| c.position)
        .unwrap_or(Position::new(0.0, 0.0));
    let pin_index = input
        .circuit
        .component(&node.reference)
        .and_then(|c| c.pins.iter().position(|p| p.number == node.pin))
        .unwrap_or(0);
    Position::new(
        base.x,
        base.y - schsync_model::GRID_UNIT_MM * (1.0 + pin_index as f64),
    )
}

fn power_node(net: &Net, meta: &Meta, minted: &mut Minted<'_>) -> Sexp {
    let rail = net.power.as_deref().unwrap_or_default();
    let (prior_at, prior_uuid) = meta.power(&net.name);
    let at = prior_at.unwrap_or(Position::new(0.0, 0.0));
    let uuid = prior_uuid.unwrap_or_else(|| minted.mint(format!("power {}", net.name)));

    let mut b = ListBuilder::node("power_symbol");
    b.push(Sexp::string(rail));
    b.push(schsync_sexpr::kv("net", Sexp::string(&net.name)));
    b.push(at_node(&at));
    b.push(uuid_node(uuid));
    b.build()
}

fn hier_label_node(
    port: &HierPort,
    index: usize,
    meta: &Meta,
    minted: &mut Minted<'_>,
) -> Sexp {
    let (prior_at, prior_uuid) = meta.hier(&port.name);
    let at = prior_at.unwrap_or(Position::new(
        0.0,
        schsync_model::GRID_UNIT_MM * 2.0 * index as f64,
    ));
    let uuid = prior_uuid.unwrap_or_else(|| minted.mint(format!("port {}", port.name)));

    let mut b = ListBuilder::node("hier_label");
    b.push(Sexp::string(&port.name));
    b.push(schsync_sexpr::kv(
        "shape",
        Sexp::symbol(port.direction.as_token()),
    ));
    b.push(at_node(&at));
    b.push(uuid_node(uuid));
    b.build()
}

fn sheet_node(child: &Subcircuit, meta: &Meta, minted: &mut Minted<'_>) -> Sexp {
    let mut b = ListBuilder::node("sheet");
    b.push(schsync_sexpr::kv("name", Sexp::string(&child.name)));
    let file = child
        .file
        .as_deref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    b.push(schsync_sexpr::kv("file", Sexp::string(file)));
    if let Some(position) = &child.position {
        b.push(at_node(position));
    }
    let uuid = child
        .uuid
        .unwrap_or_else(|| minted.mint(format!("sheet {}", child.name)));
    b.push(uuid_node(uuid));
    if child.origin.is_generated() {
        b.push(schsync_sexpr::kv("origin", Sexp::symbol("generated")));
    }

    let mut ports: Vec<&HierPort> = child.ports.iter().collect();
    ports.sort_by(|a, b| natural::compare(&a.name, &b.name));
    for (index, port) in ports.iter().enumerate() {
        let at = meta.sheet_pin(&child.name, &port.name).unwrap_or_else(|| {
            let base = child.position.unwrap_or(Position::new(0.0, 0.0));
            Position::new(
                base.x,
                base.y + schsync_model::GRID_UNIT_MM * 2.0 * index as f64,
            )
        });
        let mut pb = ListBuilder::node("pin");
        pb.push(Sexp::string(&port.name));
        pb.push(schsync_sexpr::kv(
            "shape",
            Sexp::symbol(port.direction.as_token()),
        ));
        pb.push(at_node(&at));
        b.push(pb.build());
    }
    b.build()
}

fn text_node(annotation: &Annotation, index: usize, minted: &mut Minted<'_>) -> Sexp {
    let mut b = ListBuilder::node("text");
    b.push(Sexp::string(&annotation.text));
    if let Some(position) = &annotation.position {
        b.push(at_node(position));
    }
    let uuid = annotation
        .uuid
        .unwrap_or_else(|| minted.mint(format!("text #{index}")));
    b.push(uuid_node(uuid));
    b.build()
}

/// Collect the net-name string patches for a pure-rename edit, covering
/// labels, power markers, hierarchical labels, and sheet pins.
pub(crate) fn rename_patches(
    source: &str,
    renames: &std::collections::BTreeMap<String, String>,
) -> Result<schsync_sexpr::PatchSet, schsync_sexpr::ParseError> {
    let root = schsync_sexpr::parse(source)?;
    let mut patches = schsync_sexpr::PatchSet::new();

    root.walk_strings(|value, span, ctx| {
        let Some(new_name) = renames.get(value) else {
            return;
        };
        let named_position = ctx.index_in_parent == Some(1);
        let hit = match ctx.parent_tag() {
            Some("label") | Some("global_label") | Some("hier_label") => named_position,
            Some("net") => ctx.grandparent_tag() == Some("power_symbol") && named_position,
            Some("pin") => ctx.grandparent_tag() == Some("sheet") && named_position,
            _ => false,
        };
        if hit {
            patches.replace_string(span, new_name);
        }
    });

    Ok(patches)
}
