use std::collections::{HashMap, HashSet};

use crate::geometry::{Point, Rect};
use crate::place::Place;
use crate::places::Places;

const MIN_CELL: f64 = 1.0;

// Float to int casts saturate, so far-off coordinates pin to the edge cells.
fn cell_of(x: f64, cell: f64) -> i64 {
    (x / cell).floor() as i64
}

fn cell_range(rect: &Rect, cell: f64) -> (i64, i64, i64, i64) {
    (
        cell_of(rect.x, cell),
        cell_of(rect.y, cell),
        cell_of(rect.max_x(), cell),
        cell_of(rect.max_y(), cell),
    )
}

/// The mask footprint contains every shape a place can take, so two places
/// whose current shapes overlap always share a cell.
#[derive(Debug)]
pub struct FootprintIndex {
    cell: f64,
    places: Vec<Place>,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl FootprintIndex {
    pub fn new(cell_size: f64) -> Self {
        let cell = if cell_size.is_finite() {
            cell_size.max(MIN_CELL)
        } else {
            MIN_CELL
        };
        Self {
            cell,
            places: Vec::new(),
            cells: HashMap::new(),
        }
    }

    pub fn add(&mut self, place: &Place) {
        let idx = self.places.len();
        let (x0, y0, x1, y1) = cell_range(&place.mask_footprint().bounds(), self.cell);
        for ix in x0..=x1 {
            for iy in y0..=y1 {
                self.cells.entry((ix, iy)).or_default().push(idx);
            }
        }
        self.places.push(place.clone());
    }

    /// Lookups never create cells.
    pub fn blocks(&self, place: &Place) -> Option<&Place> {
        let (x0, y0, x1, y1) = cell_range(&place.mask_footprint().bounds(), self.cell);
        let mut seen = HashSet::new();
        let mut candidates: Vec<usize> = (x0..=x1)
            .flat_map(|ix| (y0..=y1).map(move |iy| (ix, iy)))
            .filter_map(|key| self.cells.get(&key))
            .flatten()
            .copied()
            .filter(|idx| seen.insert(*idx))
            .collect();
        // Earlier registrations win regardless of which cell found them.
        candidates.sort_unstable();
        candidates
            .into_iter()
            .map(|idx| &self.places[idx])
            .find(|indexed| indexed.overlaps(place))
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPoint {
    pub point: Point,
    pub name: String,
}

// Cells are `spacing` wide, so a neighbour within `spacing` is always in the
// 3x3 block around a point.
#[derive(Debug)]
pub struct PointIndex {
    spacing: f64,
    points: Vec<IndexedPoint>,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl PointIndex {
    pub fn new(spacing: f64) -> Self {
        Self {
            spacing,
            points: Vec::new(),
            cells: HashMap::new(),
        }
    }

    fn cell_of(&self, point: Point) -> (i64, i64) {
        (cell_of(point.x, self.spacing), cell_of(point.y, self.spacing))
    }

    pub fn add(&mut self, point: Point, name: impl Into<String>) {
        let idx = self.points.len();
        self.points.push(IndexedPoint {
            point,
            name: name.into(),
        });
        if self.spacing > 0.0 && self.spacing.is_finite() {
            let key = self.cell_of(point);
            self.cells.entry(key).or_default().push(idx);
        }
    }

    /// First registered point within `spacing` of `point`.
    pub fn blocks(&self, point: Point) -> Option<&IndexedPoint> {
        if !(self.spacing > 0.0 && self.spacing.is_finite()) {
            return None;
        }
        let (cx, cy) = self.cell_of(point);
        (cx.saturating_sub(1)..=cx.saturating_add(1))
            .flat_map(|ix| (cy.saturating_sub(1)..=cy.saturating_add(1)).map(move |iy| (ix, iy)))
            .filter_map(|key| self.cells.get(&key))
            .flatten()
            .copied()
            .filter(|&idx| self.points[idx].point.distance(point) <= self.spacing)
            .min()
            .map(|idx| &self.points[idx])
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub index: usize,
    pub blocked_by: Option<String>,
}

impl Resolution {
    pub fn is_kept(&self) -> bool {
        self.blocked_by.is_none()
    }
}

/// A blocked place is not indexed, so it cannot block anything after it.
pub fn resolve(places: &Places, cell_size: f64) -> Vec<Resolution> {
    let mut index = FootprintIndex::new(cell_size);
    let mut resolutions = Vec::with_capacity(places.len());
    for (i, place) in places.iter().enumerate() {
        let blocked_by = index.blocks(place).map(|blocker| blocker.name().to_string());
        if blocked_by.is_none() {
            index.add(place);
        }
        resolutions.push(Resolution {
            index: i,
            blocked_by,
        });
    }
    let dropped = resolutions.iter().filter(|r| !r.is_kept()).count();
    log::info!(
        "kept {} of {} labels, {dropped} blocked",
        resolutions.len() - dropped,
        resolutions.len()
    );
    resolutions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::place::Placement;
    use crate::place::tests::place;

    #[test]
    fn higher_priority_place_wins() {
        let places: Places = [
            place("Capital", 100.0, 100.0),
            place("Suburb", 102.0, 101.0),
            place("Remote", 900.0, 900.0),
        ]
        .into_iter()
        .collect();
        let resolutions = resolve(&places, 64.0);
        assert_eq!(resolutions.len(), 3);
        assert!(resolutions[0].is_kept());
        assert_eq!(resolutions[1].blocked_by.as_deref(), Some("Capital"));
        assert!(resolutions[2].is_kept());
    }

    #[test]
    fn blocked_place_does_not_block_later_ones() {
        // B collides with A and C, but A and C are clear of each other.
        let a = place("A", 0.0, 0.0);
        let b = place("B", 30.0, 0.0);
        let c = place("C", 60.0, 0.0).with_placement(Placement::NorthEast);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&c));
        assert!(!a.overlaps(&c));
        let places: Places = [a, b, c].into_iter().collect();
        let kept: Vec<bool> = resolve(&places, 64.0).iter().map(Resolution::is_kept).collect();
        assert_eq!(kept, [true, false, true]);
    }

    #[test]
    fn blocks_only_on_current_shapes() {
        let mut index = FootprintIndex::new(32.0);
        let a = place("A", 0.0, 0.0);
        index.add(&a);
        // Close enough that some placements collide, but not these ones.
        let b = place("B", 50.0, 30.0).with_placement(Placement::SouthEast);
        assert!(b.can_overlap(&a));
        assert!(index.blocks(&b).is_none());
        let c = place("C", 5.0, 2.0);
        assert_eq!(index.blocks(&c).map(Place::name), Some("A"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn lookup_does_not_create_cells() {
        let index = FootprintIndex::new(16.0);
        assert!(index.blocks(&place("A", 0.0, 0.0)).is_none());
        assert!(index.cells.is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn point_index_respects_spacing() {
        let mut index = PointIndex::new(10.0);
        index.add(Point::new(0.0, 0.0), "first");
        index.add(Point::new(100.0, 0.0), "second");
        assert_eq!(index.blocks(Point::new(6.0, 8.0)).map(|p| p.name.as_str()), Some("first"));
        assert!(index.blocks(Point::new(7.5, 7.5)).is_none());
        assert!(index.blocks(Point::new(-12.0, 0.0)).is_none());
        assert_eq!(index.blocks(Point::new(95.0, 1.0)).map(|p| p.name.as_str()), Some("second"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn point_index_prefers_earliest_registration() {
        let mut index = PointIndex::new(10.0);
        index.add(Point::new(9.0, 0.0), "first");
        index.add(Point::new(-1.0, 0.0), "second");
        let hit = index.blocks(Point::new(4.0, 0.0)).map(|p| p.name.as_str());
        assert_eq!(hit, Some("first"));
    }

    #[test]
    fn point_index_handles_cells_beyond_i32() {
        let mut index = PointIndex::new(0.001);
        index.add(Point::new(3e6, 0.0), "far");
        let hit = index.blocks(Point::new(3e6, 0.0)).map(|p| p.name.as_str());
        assert_eq!(hit, Some("far"));
        assert!(index.blocks(Point::new(3e6 + 0.01, 0.0)).is_none());
    }

    #[test]
    fn point_index_saturates_at_the_grid_edge() {
        let mut index = PointIndex::new(0.001);
        index.add(Point::new(1e300, -1e300), "edge");
        let hit = index.blocks(Point::new(1e300, -1e300)).map(|p| p.name.as_str());
        assert_eq!(hit, Some("edge"));
    }

    #[test]
    fn footprint_index_accepts_distant_places() {
        let mut index = FootprintIndex::new(1.0);
        index.add(&place("Far", 3e9, 3e9));
        assert_eq!(index.blocks(&place("Near", 3e9 + 2.0, 3e9)).map(Place::name), Some("Far"));
    }

    #[test]
    fn zero_spacing_never_blocks() {
        let mut index = PointIndex::new(0.0);
        index.add(Point::new(0.0, 0.0), "a");
        assert!(index.blocks(Point::new(0.0, 0.0)).is_none());
    }
}
