//! Power-rail classification.
//!
//! Whether "VCC" is a supply rail is project policy, not a global truth, so
//! classification goes through an injected, versioned table rather than a
//! hard-coded name check. The built-in table covers the common rails; callers
//! with exotic supplies extend it or replace it entirely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Maps net names to power-rail symbols (`GND` -> `power:GND`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerNetTable {
    /// Bumped whenever the built-in rail set changes, so stores can record
    /// which table classified their contents.
    pub version: u32,
    rails: BTreeMap<String, String>,
}

impl PowerNetTable {
    /// An empty table: nothing classifies as power.
    pub fn empty() -> Self {
        Self {
            version: 0,
            rails: BTreeMap::new(),
        }
    }

    /// The built-in rail set.
    pub fn builtin() -> Self {
        let names = [
            "GND", "AGND", "DGND", "PGND", "GNDA", "GNDD", "EARTH", "VCC", "VDD", "VDDA", "VSS",
            "VSSA", "VEE", "VBUS", "VBAT", "+1V2", "+1V8", "+2V5", "+3V3", "+5V", "+12V", "+24V",
            "-5V", "-12V",
        ];
        let rails = names
            .iter()
            .map(|name| (name.to_string(), format!("power:{name}")))
            .collect();
        Self { version: 1, rails }
    }

    /// Rail symbol for `net_name`, if the table classifies it as power.
    pub fn classify(&self, net_name: &str) -> Option<&str> {
        self.rails.get(net_name).map(String::as_str)
    }

    pub fn is_power(&self, net_name: &str) -> bool {
        self.rails.contains_key(net_name)
    }

    /// Add (or replace) a rail mapping and return a mutable reference for
    /// further chaining.
    pub fn add_rail(&mut self, net_name: impl Into<String>, rail: impl Into<String>) -> &mut Self {
        self.rails.insert(net_name.into(), rail.into());
        self
    }

    pub fn with_rail(mut self, net_name: impl Into<String>, rail: impl Into<String>) -> Self {
        self.rails.insert(net_name.into(), rail.into());
        self
    }
}

impl Default for PowerNetTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_common_rails() {
        let table = PowerNetTable::builtin();
        assert_eq!(table.classify("GND"), Some("power:GND"));
        assert_eq!(table.classify("+3V3"), Some("power:+3V3"));
        assert_eq!(table.classify("SDA"), None);
        assert!(table.is_power("VBUS"));
    }

    #[test]
    fn custom_rails_extend_the_table() {
        let table = PowerNetTable::builtin().with_rail("VCORE", "power:VCORE");
        assert_eq!(table.classify("VCORE"), Some("power:VCORE"));
        // Built-ins still present.
        assert_eq!(table.classify("GND"), Some("power:GND"));
    }

    #[test]
    fn empty_table_classifies_nothing() {
        assert_eq!(PowerNetTable::empty().classify("GND"), None);
    }
}
