use serde::{Deserialize, Serialize};

/// Schematic grid pitch in millimetres. Coordinates snap to this pitch, and
/// the spatial matching pass tolerates one unit of drift per axis.
pub const GRID_UNIT_MM: f64 = 1.27;

/// Placement on a sheet: millimetre coordinates plus rotation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            rotation: 0.0,
        }
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    /// True when `other` lies within `tolerance` millimetres on each axis.
    /// Rotation does not participate; a nudged-and-rotated part still counts
    /// as the same placement.
    pub fn within(&self, other: &Position, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }

    /// Snap both axes to the schematic grid.
    pub fn snapped(&self) -> Self {
        Self {
            x: (self.x / GRID_UNIT_MM).round() * GRID_UNIT_MM,
            y: (self.y / GRID_UNIT_MM).round() * GRID_UNIT_MM,
            rotation: self.rotation,
        }
    }
}
