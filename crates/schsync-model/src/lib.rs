//! Canonical circuit model for schsync.
//!
//! Both sides of a reconciliation run speak this vocabulary: the *desired*
//! circuit produced by an upstream evaluator, and the *existing* circuit
//! loaded from the schematic store or imported from a netlist. The structures
//! are serialisable with `serde` so they can be stored or transferred as
//! JSON.
//!
//! The central structure is [`Circuit`], a tree of [`Subcircuit`] sheets
//! owning components, nets, ports and annotations. [`Circuit::validate`]
//! enforces the invariants the rest of the pipeline assumes:
//!
//! * reference designators are unique across the entire hierarchy;
//! * every net node names a pin that exists on its component;
//! * each `(component, pin)` belongs to at most one net.

pub mod natural;
pub mod netlist;
pub mod position;
pub mod power;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::position::{GRID_UNIT_MM, Position};
pub use crate::power::PowerNetTable;

/// Helper type alias - a power rail is identified by its library symbol,
/// e.g. `power:GND`.
pub type PowerRail = String;

/// Where a persisted entity came from.
///
/// Generated entities may be removed when they disappear from the desired
/// circuit; user entities are always preserved. Anything loaded without an
/// explicit marker counts as user-made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Generated,
    #[default]
    User,
}

impl Origin {
    pub fn as_token(self) -> &'static str {
        match self {
            Origin::Generated => "generated",
            Origin::User => "user",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "generated" => Some(Origin::Generated),
            "user" => Some(Origin::User),
            _ => None,
        }
    }

    pub fn is_generated(self) -> bool {
        self == Origin::Generated
    }
}

/// Electrical function of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PinFunction {
    Input,
    Output,
    Bidirectional,
    #[default]
    Passive,
    Power,
    NoConnect,
    Free,
}

impl PinFunction {
    pub fn as_token(self) -> &'static str {
        match self {
            PinFunction::Input => "input",
            PinFunction::Output => "output",
            PinFunction::Bidirectional => "bidirectional",
            PinFunction::Passive => "passive",
            PinFunction::Power => "power",
            PinFunction::NoConnect => "no_connect",
            PinFunction::Free => "free",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "input" => Some(PinFunction::Input),
            "output" => Some(PinFunction::Output),
            "bidirectional" => Some(PinFunction::Bidirectional),
            "passive" => Some(PinFunction::Passive),
            // KiCad netlists split power pins by direction; the model does not.
            "power" | "power_in" | "power_out" => Some(PinFunction::Power),
            "no_connect" => Some(PinFunction::NoConnect),
            "free" => Some(PinFunction::Free),
            _ => None,
        }
    }
}

/// A pin on a component. `number` is the pad designator, which for many parts
/// is a name rather than a number ("A1", "GND", "EP").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pin {
    pub number: String,
    #[serde(default)]
    pub function: PinFunction,
}

impl Pin {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            function: PinFunction::default(),
        }
    }

    pub fn with_function(mut self, function: PinFunction) -> Self {
        self.function = function;
        self
    }
}

/// An extra component property value.
///
/// Values round-trip through the store as text; [`PropValue::to_text`] is the
/// canonical serialization used both when writing and when comparing a
/// desired value against whatever the file currently holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PropValue {
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<PropValue>),
    Dict(BTreeMap<String, PropValue>),
}

impl PropValue {
    /// Canonical text form. Strings pass through verbatim; numbers drop
    /// trailing zeros; lists and dicts serialize as compact JSON.
    pub fn to_text(&self) -> String {
        match self {
            PropValue::String(s) => s.clone(),
            PropValue::Number(n) => trim_number(*n),
            PropValue::Bool(b) => b.to_string(),
            PropValue::List(_) | PropValue::Dict(_) => self.to_json().to_string(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            PropValue::String(s) => serde_json::Value::String(s.clone()),
            PropValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PropValue::Bool(b) => serde_json::Value::Bool(*b),
            PropValue::List(items) => {
                serde_json::Value::Array(items.iter().map(PropValue::to_json).collect())
            }
            PropValue::Dict(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::String(s)
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::String(s.to_string())
    }
}

impl From<f64> for PropValue {
    fn from(n: f64) -> Self {
        PropValue::Number(n)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

/// A schematic component instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Reference designator, unique across the whole circuit ("R1", "U3").
    pub reference: String,
    /// Library symbol identifier ("Device:R").
    pub lib_id: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footprint: Option<String>,
    /// Placement on the owning sheet. `None` until placed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Stable identity assigned by the store on first save. The model never
    /// mints or rewrites this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    pub pins: Vec<Pin>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropValue>,
    #[serde(default)]
    pub origin: Origin,
}

impl Component {
    pub fn new(reference: impl Into<String>, lib_id: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            lib_id: lib_id.into(),
            value: String::new(),
            footprint: None,
            position: None,
            uuid: None,
            pins: Vec::new(),
            properties: BTreeMap::new(),
            origin: Origin::default(),
        }
    }

    // Builder-style setters that consume `self` ------------------------------
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_footprint(mut self, footprint: impl Into<String>) -> Self {
        self.footprint = Some(footprint.into());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn with_pins<I: IntoIterator<Item = Pin>>(mut self, pins: I) -> Self {
        self.pins = pins.into_iter().collect();
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Add (or replace) a property and return a mutable reference for
    /// further chaining.
    pub fn add_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropValue>,
    ) -> &mut Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn add_pin(&mut self, pin: Pin) -> &mut Self {
        self.pins.push(pin);
        self
    }

    pub fn pin(&self, number: &str) -> Option<&Pin> {
        self.pins.iter().find(|p| p.number == number)
    }

    /// Identity-free description used by the fallback matching passes:
    /// `(lib_id, value, footprint)`.
    pub fn signature(&self) -> (&str, &str, &str) {
        (
            &self.lib_id,
            &self.value,
            self.footprint.as_deref().unwrap_or(""),
        )
    }
}

/// Visibility scope of a net.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetScope {
    /// Visible everywhere; power rails and global labels.
    Global,
    /// Visible only inside the named subcircuit (path from the root sheet).
    Local(Vec<String>),
}

impl NetScope {
    pub fn is_global(&self) -> bool {
        matches!(self, NetScope::Global)
    }
}

/// One endpoint of a net: a `(reference, pin)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetNode {
    pub reference: String,
    pub pin: String,
}

impl NetNode {
    pub fn new(reference: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            pin: pin.into(),
        }
    }
}

impl std::fmt::Display for NetNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.reference, self.pin)
    }
}

/// An electrical net.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Net {
    pub name: String,
    pub scope: NetScope,
    /// Power-rail symbol when the net is classified as a supply rail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerRail>,
    pub nodes: Vec<NetNode>,
}

impl Net {
    pub fn new(name: impl Into<String>, scope: NetScope) -> Self {
        Self {
            name: name.into(),
            scope,
            power: None,
            nodes: Vec::new(),
        }
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self::new(name, NetScope::Global)
    }

    pub fn local(name: impl Into<String>, path: Vec<String>) -> Self {
        Self::new(name, NetScope::Local(path))
    }

    pub fn with_power(mut self, rail: impl Into<PowerRail>) -> Self {
        self.power = Some(rail.into());
        self
    }

    pub fn with_nodes<I: IntoIterator<Item = NetNode>>(mut self, nodes: I) -> Self {
        self.nodes = nodes.into_iter().collect();
        self
    }

    pub fn add_node(&mut self, node: NetNode) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn contains(&self, reference: &str, pin: &str) -> bool {
        self.nodes
            .iter()
            .any(|n| n.reference == reference && n.pin == pin)
    }
}

/// Direction of a hierarchical port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
    #[default]
    Bidirectional,
}

impl PortDirection {
    pub fn as_token(self) -> &'static str {
        match self {
            PortDirection::Input => "input",
            PortDirection::Output => "output",
            PortDirection::Bidirectional => "bidirectional",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "input" => Some(PortDirection::Input),
            "output" => Some(PortDirection::Output),
            "bidirectional" => Some(PortDirection::Bidirectional),
            _ => None,
        }
    }
}

/// A named connection through a subcircuit boundary.
///
/// One name serves both persisted halves - the hierarchical label inside the
/// child sheet and the pin on the parent's sheet symbol - so the two cannot
/// disagree by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierPort {
    pub name: String,
    #[serde(default)]
    pub direction: PortDirection,
}

impl HierPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::default(),
        }
    }

    pub fn with_direction(mut self, direction: PortDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// Free-standing sheet text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
}

impl Annotation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            position: None,
            uuid: None,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

/// One sheet in the circuit hierarchy.
///
/// A subcircuit owns its components, the nets scoped to it, its boundary
/// ports and its child subcircuits. `file` is the backing schematic file;
/// two subcircuits sharing a `file` are instances of the same definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Subcircuit {
    pub name: String,
    pub components: Vec<Component>,
    pub nets: Vec<Net>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<HierPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Subcircuit>,
    /// Backing file, relative to the store root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Placement of this sheet's symbol on its parent sheet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub origin: Origin,
}

impl Subcircuit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_net(mut self, net: Net) -> Self {
        self.nets.push(net);
        self
    }

    pub fn with_port(mut self, port: HierPort) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_child(mut self, child: Subcircuit) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn add_component(&mut self, component: Component) -> &mut Self {
        self.components.push(component);
        self
    }

    pub fn add_net(&mut self, net: Net) -> &mut Self {
        self.nets.push(net);
        self
    }

    pub fn add_child(&mut self, child: Subcircuit) -> &mut Self {
        self.children.push(child);
        self
    }

    pub fn child(&self, name: &str) -> Option<&Subcircuit> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Subcircuit> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn component(&self, reference: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.reference == reference)
    }

    pub fn port(&self, name: &str) -> Option<&HierPort> {
        self.ports.iter().find(|p| p.name == name)
    }
}

/// A complete circuit: the root sheet plus everything below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Circuit {
    pub root: Subcircuit,
}

impl Circuit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: Subcircuit) -> Self {
        Self { root }
    }

    /// Check that reference designators are unique across the whole
    /// hierarchy. The weaker check used on reconciliation output, where a
    /// hand-edited file may legitimately hold pins the full validation would
    /// reject.
    pub fn validate_references(&self) -> Result<(), ModelError> {
        let mut seen: BTreeMap<&str, ()> = BTreeMap::new();
        let mut duplicate: Option<String> = None;
        self.walk_sheets(|_path, sheet| {
            for component in &sheet.components {
                if seen.insert(component.reference.as_str(), ()).is_some() && duplicate.is_none() {
                    duplicate = Some(component.reference.clone());
                }
            }
        });
        match duplicate {
            Some(reference) => Err(ModelError::DuplicateReference(reference)),
            None => Ok(()),
        }
    }

    /// Check the model invariants. Call this on a desired circuit before
    /// matching; a violation here means the input is malformed, not that the
    /// target needs work.
    pub fn validate(&self) -> Result<(), ModelError> {
        self.validate_references()?;

        let mut by_reference: BTreeMap<&str, &Component> = BTreeMap::new();
        self.walk_sheets(|_path, sheet| {
            for component in &sheet.components {
                by_reference.insert(component.reference.as_str(), component);
            }
        });

        // (reference, pin) -> owning net name
        let mut owners: BTreeMap<(&str, &str), &str> = BTreeMap::new();
        let mut nets: Vec<&Net> = Vec::new();
        self.walk_sheets(|_path, sheet| nets.extend(sheet.nets.iter()));

        for net in nets {
            for node in &net.nodes {
                let Some(component) = by_reference.get(node.reference.as_str()) else {
                    return Err(ModelError::UnknownComponent {
                        net: net.name.clone(),
                        reference: node.reference.clone(),
                    });
                };
                if component.pin(&node.pin).is_none() {
                    return Err(ModelError::UnknownPin {
                        net: net.name.clone(),
                        reference: node.reference.clone(),
                        pin: node.pin.clone(),
                    });
                }
                if let Some(first) =
                    owners.insert((node.reference.as_str(), node.pin.as_str()), &net.name)
                {
                    return Err(ModelError::MultiOwnerPin {
                        reference: node.reference.clone(),
                        pin: node.pin.clone(),
                        first: first.to_string(),
                        second: net.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Visit every sheet depth-first, parents before children. The callback
    /// receives the path from the root (root itself has an empty path).
    pub fn walk_sheets<'a, F>(&'a self, mut f: F)
    where
        F: FnMut(&[&'a str], &'a Subcircuit),
    {
        fn recurse<'a, F>(sheet: &'a Subcircuit, path: &mut Vec<&'a str>, f: &mut F)
        where
            F: FnMut(&[&'a str], &'a Subcircuit),
        {
            f(path, sheet);
            for child in &sheet.children {
                path.push(child.name.as_str());
                recurse(child, path, f);
                path.pop();
            }
        }

        let mut path = Vec::new();
        recurse(&self.root, &mut path, &mut f);
    }

    /// All components in the hierarchy, sheet by sheet.
    pub fn components(&self) -> Vec<&Component> {
        let mut out = Vec::new();
        self.walk_sheets(|_path, sheet| out.extend(sheet.components.iter()));
        out
    }

    /// All nets in the hierarchy with the path of their owning sheet.
    pub fn nets(&self) -> Vec<(Vec<String>, &Net)> {
        let mut out = Vec::new();
        self.walk_sheets(|path, sheet| {
            let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
            out.extend(sheet.nets.iter().map(|net| (path.clone(), net)));
        });
        out
    }

    /// Look up a component anywhere in the hierarchy.
    pub fn component(&self, reference: &str) -> Option<&Component> {
        let mut found = None;
        self.walk_sheets(|_path, sheet| {
            if found.is_none() {
                found = sheet.component(reference);
            }
        });
        found
    }

    pub fn component_mut(&mut self, reference: &str) -> Option<&mut Component> {
        fn recurse<'a>(sheet: &'a mut Subcircuit, reference: &str) -> Option<&'a mut Component> {
            if let Some(idx) = sheet
                .components
                .iter()
                .position(|c| c.reference == reference)
            {
                return Some(&mut sheet.components[idx]);
            }
            sheet
                .children
                .iter_mut()
                .find_map(|child| recurse(child, reference))
        }
        recurse(&mut self.root, reference)
    }

    /// Path of the sheet owning `reference`, empty for the root sheet.
    pub fn scope_of(&self, reference: &str) -> Option<Vec<String>> {
        let mut found = None;
        self.walk_sheets(|path, sheet| {
            if found.is_none() && sheet.component(reference).is_some() {
                found = Some(path.iter().map(|s| s.to_string()).collect());
            }
        });
        found
    }

    pub fn subcircuit(&self, path: &[String]) -> Option<&Subcircuit> {
        let mut sheet = &self.root;
        for name in path {
            sheet = sheet.child(name)?;
        }
        Some(sheet)
    }

    pub fn subcircuit_mut(&mut self, path: &[String]) -> Option<&mut Subcircuit> {
        let mut sheet = &mut self.root;
        for name in path {
            sheet = sheet.child_mut(name)?;
        }
        Some(sheet)
    }

    /// Classify power rails across all nets using `table`. Nets carrying an
    /// explicit rail override keep it.
    pub fn classify_power(&mut self, table: &PowerNetTable) {
        fn recurse(sheet: &mut Subcircuit, table: &PowerNetTable) {
            for net in &mut sheet.nets {
                if net.power.is_none() {
                    if let Some(rail) = table.classify(&net.name) {
                        log::debug!("net '{}' classified as power rail {}", net.name, rail);
                        net.power = Some(rail.to_string());
                    }
                }
            }
            for child in &mut sheet.children {
                recurse(child, table);
            }
        }
        recurse(&mut self.root, table);
    }
}

fn trim_number(n: f64) -> String {
    let mut s = format!("{n}");
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

/// Model invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Duplicate reference designator '{0}'")]
    DuplicateReference(String),
    #[error("Net '{net}' connects to unknown component '{reference}'")]
    UnknownComponent { net: String, reference: String },
    #[error("Net '{net}' connects to '{reference}' pin '{pin}', which does not exist")]
    UnknownPin {
        net: String,
        reference: String,
        pin: String,
    },
    #[error("Pin {reference}.{pin} is a member of both '{first}' and '{second}'")]
    MultiOwnerPin {
        reference: String,
        pin: String,
        first: String,
        second: String,
    },
}
