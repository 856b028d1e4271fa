//! Initial placement for components with no counterpart in the target.
//!
//! Matched components keep whatever position the file has; only brand-new
//! symbols consult a [`PlacementProvider`]. The default provider walks a
//! coarse grid row by row and takes the first slot that is not within half
//! a pitch of anything already on the sheet, so hand-placed symbols block
//! their neighborhood and repeated runs fill predictable rows.

use log::debug;
use schsync_model::{Component, GRID_UNIT_MM, Position};

/// What a provider can see of the sheet it is placing onto.
pub struct SheetContext<'a> {
    /// Path of the sheet from the root.
    pub path: &'a [String],
    /// Positions of every symbol already on the sheet, earlier placements
    /// from this run included.
    pub occupied: &'a [Position],
}

impl SheetContext<'_> {
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::of(self.occupied)
    }
}

/// Extent of a set of positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn of(positions: &[Position]) -> Option<Self> {
        let first = positions.first()?;
        let mut bounds = Bounds {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for position in &positions[1..] {
            bounds.min_x = bounds.min_x.min(position.x);
            bounds.min_y = bounds.min_y.min(position.y);
            bounds.max_x = bounds.max_x.max(position.x);
            bounds.max_y = bounds.max_y.max(position.y);
        }
        Some(bounds)
    }
}

/// Chooses where a new component lands. Implementations must be
/// deterministic for a given context, or repeated runs stop being
/// idempotent.
pub trait PlacementProvider {
    fn place(&self, component: &Component, context: &SheetContext<'_>) -> Position;
}

/// Row-major first-free-slot placement on a fixed grid.
#[derive(Debug, Clone)]
pub struct GridPlacer {
    pub origin: Position,
    pub pitch: f64,
    pub columns: usize,
}

impl Default for GridPlacer {
    fn default() -> Self {
        Self {
            origin: Position::new(25.4, 25.4),
            pitch: GRID_UNIT_MM * 10.0,
            columns: 8,
        }
    }
}

impl PlacementProvider for GridPlacer {
    fn place(&self, component: &Component, context: &SheetContext<'_>) -> Position {
        let mut slot = 0usize;
        let position = loop {
            let candidate = Position::new(
                self.origin.x + (slot % self.columns) as f64 * self.pitch,
                self.origin.y + (slot / self.columns) as f64 * self.pitch,
            );
            let taken = context
                .occupied
                .iter()
                .any(|p| p.within(&candidate, self.pitch / 2.0));
            if !taken {
                break candidate.snapped();
            }
            slot += 1;
        };
        debug!(
            "Placing {} at ({}, {}) on sheet '{}'",
            component.reference,
            position.x,
            position.y,
            context.path.join("/")
        );
        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> Component {
        Component::new("R1", "Device:R")
    }

    fn place(occupied: &[Position]) -> Position {
        GridPlacer::default().place(
            &subject(),
            &SheetContext {
                path: &[],
                occupied,
            },
        )
    }

    #[test]
    fn empty_sheet_starts_at_the_origin() {
        assert_eq!(place(&[]), Position::new(25.4, 25.4));
    }

    #[test]
    fn taken_slots_are_skipped() {
        let pitch = GridPlacer::default().pitch;
        let occupied = [Position::new(25.4, 25.4)];
        assert_eq!(place(&occupied), Position::new(25.4 + pitch, 25.4));
    }

    #[test]
    fn off_grid_symbols_block_their_neighborhood() {
        let pitch = GridPlacer::default().pitch;
        // Close enough to the first slot to shadow it.
        let occupied = [Position::new(27.0, 26.5)];
        assert_eq!(place(&occupied), Position::new(25.4 + pitch, 25.4));
    }

    #[test]
    fn rows_wrap_after_the_column_limit() {
        let placer = GridPlacer::default();
        let occupied: Vec<Position> = (0..placer.columns)
            .map(|c| Position::new(25.4 + c as f64 * placer.pitch, 25.4))
            .collect();
        let position = placer.place(
            &subject(),
            &SheetContext {
                path: &[],
                occupied: &occupied,
            },
        );
        assert_eq!(position, Position::new(25.4, 25.4 + placer.pitch));
    }

    #[test]
    fn bounds_cover_the_extremes() {
        let bounds = Bounds::of(&[
            Position::new(10.0, 40.0),
            Position::new(30.0, 20.0),
        ])
        .unwrap();
        assert_eq!(bounds.min_x, 10.0);
        assert_eq!(bounds.min_y, 20.0);
        assert_eq!(bounds.max_x, 30.0);
        assert_eq!(bounds.max_y, 40.0);
    }
}
