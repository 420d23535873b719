use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::PlacementConfig;
use crate::error::PlaceError;
use crate::geometry::{Blob, Point, Rect, Shape};
use crate::projection::Location;
use crate::text_metrics::LabelSize;

const LONGITUDE_LIMIT: f64 = 360.0;
const LATITUDE_LIMIT: f64 = 90.0;
const BUMPED_NEIGHBOR_COST: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Placement {
    #[serde(rename = "NE")]
    NorthEast,
    #[serde(rename = "ENE")]
    EastNorthEast,
    #[serde(rename = "ESE")]
    EastSouthEast,
    #[serde(rename = "SE")]
    SouthEast,
    #[serde(rename = "SSE")]
    SouthSouthEast,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "SSW")]
    SouthSouthWest,
    #[serde(rename = "SW")]
    SouthWest,
    #[serde(rename = "WSW")]
    WestSouthWest,
    #[serde(rename = "WNW")]
    WestNorthWest,
    #[serde(rename = "NW")]
    NorthWest,
    #[serde(rename = "NNW")]
    NorthNorthWest,
    #[serde(rename = "N")]
    North,
    #[serde(rename = "NNE")]
    NorthNorthEast,
}

pub const PLACEMENT_COUNT: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Justification {
    Left,
    Center,
    Right,
}

impl Placement {
    pub const ALL: [Placement; PLACEMENT_COUNT] = [
        Placement::NorthEast,
        Placement::EastNorthEast,
        Placement::EastSouthEast,
        Placement::SouthEast,
        Placement::SouthSouthEast,
        Placement::South,
        Placement::SouthSouthWest,
        Placement::SouthWest,
        Placement::WestSouthWest,
        Placement::WestNorthWest,
        Placement::NorthWest,
        Placement::NorthNorthWest,
        Placement::North,
        Placement::NorthNorthEast,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            Placement::NorthEast => "NE",
            Placement::EastNorthEast => "ENE",
            Placement::EastSouthEast => "ESE",
            Placement::SouthEast => "SE",
            Placement::SouthSouthEast => "SSE",
            Placement::South => "S",
            Placement::SouthSouthWest => "SSW",
            Placement::SouthWest => "SW",
            Placement::WestSouthWest => "WSW",
            Placement::WestNorthWest => "WNW",
            Placement::NorthWest => "NW",
            Placement::NorthNorthWest => "NNW",
            Placement::North => "N",
            Placement::NorthNorthEast => "NNE",
        }
    }

    pub fn justification(self) -> Justification {
        match self {
            Placement::NorthNorthEast
            | Placement::NorthEast
            | Placement::EastNorthEast
            | Placement::EastSouthEast
            | Placement::SouthEast
            | Placement::SouthSouthEast => Justification::Left,
            Placement::North | Placement::South => Justification::Center,
            Placement::SouthSouthWest
            | Placement::SouthWest
            | Placement::WestSouthWest
            | Placement::WestNorthWest
            | Placement::NorthWest
            | Placement::NorthNorthWest => Justification::Right,
        }
    }

    /// Top-left corner relative to the anchor.
    pub fn label_offset(self, width: f64, height: f64, radius: f64) -> (f64, f64) {
        let c = radius * FRAC_1_SQRT_2;
        let nudge = height / 4.0;
        let (w, h, r) = (width, height, radius);
        match self {
            Placement::North => (-w / 2.0, -r - h),
            Placement::NorthNorthEast => (-c, -c - h - nudge),
            Placement::NorthEast => (c, -c - h),
            Placement::EastNorthEast => (r, -h / 2.0 - nudge),
            Placement::EastSouthEast => (r, -h / 2.0 + nudge),
            Placement::SouthEast => (c, c),
            Placement::SouthSouthEast => (-c, c + nudge),
            Placement::South => (-w / 2.0, r),
            Placement::SouthSouthWest => (c - w, c + nudge),
            Placement::SouthWest => (-c - w, c),
            Placement::WestSouthWest => (-r - w, -h / 2.0 + nudge),
            Placement::WestNorthWest => (-r - w, -h / 2.0 - nudge),
            Placement::NorthWest => (-c - w, -c - h),
            Placement::NorthNorthWest => (c - w, -c - h - nudge),
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

impl FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Placement::ALL
            .into_iter()
            .find(|p| p.abbreviation() == upper)
            .ok_or_else(|| format!("unknown placement \"{s}\""))
    }
}

/// Indexed by [`Placement::index`]; lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementCosts(pub [f64; PLACEMENT_COUNT]);

impl Default for PlacementCosts {
    fn default() -> Self {
        let mut costs = [0.0; PLACEMENT_COUNT];
        for (placement, cost) in [
            (Placement::NorthEast, 0.000),
            (Placement::EastNorthEast, 0.070),
            (Placement::NorthNorthEast, 0.080),
            (Placement::EastSouthEast, 0.100),
            (Placement::SouthEast, 0.175),
            (Placement::SouthSouthEast, 0.200),
            (Placement::North, 0.300),
            (Placement::NorthWest, 0.400),
            (Placement::WestNorthWest, 0.470),
            (Placement::WestSouthWest, 0.500),
            (Placement::NorthNorthWest, 0.575),
            (Placement::SouthWest, 0.600),
            (Placement::South, 0.900),
            (Placement::SouthSouthWest, 1.000),
        ] {
            costs[placement.index()] = cost;
        }
        Self(costs)
    }
}

impl PlacementCosts {
    pub fn cost(&self, placement: Placement) -> f64 {
        self.0[placement.index()]
    }

    /// Cheapest placement; ties go to the earlier entry of [`Placement::ALL`].
    pub fn cheapest(&self) -> Placement {
        Placement::ALL
            .into_iter()
            .fold(Placement::NorthEast, |best, p| {
                if self.cost(p) < self.cost(best) { p } else { best }
            })
    }

    pub fn preferring(&self, side: PreferredSide) -> (PlacementCosts, Placement) {
        let Some([best, first, second]) = side.bumped() else {
            return (*self, self.cheapest());
        };
        let mut costs = self.0.map(|cost| 0.4 + cost * 0.6);
        costs[best.index()] = 0.0;
        costs[first.index()] = BUMPED_NEIGHBOR_COST;
        costs[second.index()] = BUMPED_NEIGHBOR_COST;
        (PlacementCosts(costs), best)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreferredSide {
    #[default]
    TopRight,
    Top,
    TopLeft,
    Bottom,
    BottomRight,
    BottomLeft,
}

impl PreferredSide {
    /// Best placement first, then its two neighbours.
    fn bumped(self) -> Option<[Placement; 3]> {
        match self {
            PreferredSide::TopRight => None,
            PreferredSide::Top => Some([
                Placement::North,
                Placement::NorthNorthEast,
                Placement::NorthNorthWest,
            ]),
            PreferredSide::TopLeft => Some([
                Placement::NorthWest,
                Placement::NorthNorthWest,
                Placement::WestNorthWest,
            ]),
            PreferredSide::Bottom => Some([
                Placement::South,
                Placement::SouthSouthEast,
                Placement::SouthSouthWest,
            ]),
            PreferredSide::BottomRight => Some([
                Placement::SouthEast,
                Placement::SouthSouthEast,
                Placement::EastSouthEast,
            ]),
            PreferredSide::BottomLeft => Some([
                Placement::SouthWest,
                Placement::SouthSouthWest,
                Placement::WestSouthWest,
            ]),
        }
    }
}

impl FromStr for PreferredSide {
    type Err = PlaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top right" => Ok(PreferredSide::TopRight),
            "top" => Ok(PreferredSide::Top),
            "top left" => Ok(PreferredSide::TopLeft),
            "bottom" => Ok(PreferredSide::Bottom),
            "bottom right" => Ok(PreferredSide::BottomRight),
            "bottom left" => Ok(PreferredSide::BottomLeft),
            other => Err(PlaceError::UnknownPreference(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceSeed {
    pub name: String,
    pub location: Location,
    pub position: Point,
    pub radius: f64,
    pub rank: u32,
    pub size: LabelSize,
    pub preferred: Option<PreferredSide>,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

// Never changes during search; clones share it.
#[derive(Debug)]
pub struct PlaceGeometry {
    pub name: String,
    pub location: Location,
    pub position: Point,
    pub radius: f64,
    pub rank: u32,
    pub size: LabelSize,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub costs: PlacementCosts,
    pub overlap_weight: f64,
    pub labels: [Rect; PLACEMENT_COUNT],
    pub label_shapes: Vec<Shape>,
    pub mask_shapes: Vec<Shape>,
    pub label_footprint: Shape,
    pub mask_footprint: Shape,
}

#[derive(Debug, Clone)]
pub struct Place {
    geometry: Arc<PlaceGeometry>,
    placement: Placement,
}

impl Place {
    pub fn new(seed: PlaceSeed, config: &PlacementConfig) -> Result<Self, PlaceError> {
        validate_location(&seed.name, seed.location)?;
        let LabelSize { width, height } = seed.size;
        if !(width.is_finite() && height.is_finite() && width >= 0.0 && height > 0.0) {
            return Err(PlaceError::InvalidLabelSize {
                name: seed.name,
                width,
                height,
            });
        }
        if !(seed.radius.is_finite() && seed.radius >= 0.0) {
            return Err(PlaceError::InvalidRadius {
                name: seed.name,
                radius: seed.radius,
            });
        }

        let (costs, initial) = config
            .costs
            .preferring(seed.preferred.unwrap_or_default());

        let dot = Blob::dot(seed.position, seed.radius + config.buffer);
        let labels = Placement::ALL.map(|placement| {
            let (dx, dy) = placement.label_offset(width, height, seed.radius);
            Rect::new(seed.position.x + dx, seed.position.y + dy, width, height)
        });
        let label_shapes: Vec<Shape> = labels.iter().map(|rect| Shape::rect(*rect)).collect();
        let mask_shapes: Vec<Shape> = labels
            .iter()
            .map(|rect| Shape::new(vec![Blob::buffered(*rect, config.buffer), dot]))
            .collect();
        let label_footprint = Shape::union(&label_shapes);
        let mask_footprint = Shape::union(&mask_shapes);

        let geometry = PlaceGeometry {
            name: seed.name,
            location: seed.location,
            position: seed.position,
            radius: seed.radius,
            rank: seed.rank,
            size: seed.size,
            properties: seed.properties,
            costs,
            overlap_weight: config.overlap_weight,
            labels,
            label_shapes,
            mask_shapes,
            label_footprint,
            mask_footprint,
        };
        Ok(Self::from_parts(Arc::new(geometry), initial))
    }

    pub fn from_parts(geometry: Arc<PlaceGeometry>, placement: Placement) -> Self {
        Self {
            geometry,
            placement,
        }
    }

    pub fn with_placement(&self, placement: Placement) -> Self {
        Self::from_parts(Arc::clone(&self.geometry), placement)
    }

    pub fn geometry(&self) -> &Arc<PlaceGeometry> {
        &self.geometry
    }

    pub fn name(&self) -> &str {
        &self.geometry.name
    }

    pub fn location(&self) -> Location {
        self.geometry.location
    }

    pub fn position(&self) -> Point {
        self.geometry.position
    }

    pub fn radius(&self) -> f64 {
        self.geometry.radius
    }

    pub fn rank(&self) -> u32 {
        self.geometry.rank
    }

    pub fn size(&self) -> LabelSize {
        self.geometry.size
    }

    pub fn properties(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.geometry.properties
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn set_placement(&mut self, placement: Placement) {
        self.placement = placement;
    }

    pub fn costs(&self) -> &PlacementCosts {
        &self.geometry.costs
    }

    pub fn label_rect(&self) -> Rect {
        self.geometry.labels[self.placement.index()]
    }

    pub fn label_shape(&self) -> &Shape {
        &self.geometry.label_shapes[self.placement.index()]
    }

    pub fn mask_shape(&self) -> &Shape {
        &self.geometry.mask_shapes[self.placement.index()]
    }

    pub fn label_footprint(&self) -> &Shape {
        &self.geometry.label_footprint
    }

    pub fn mask_footprint(&self) -> &Shape {
        &self.geometry.mask_footprint
    }

    pub fn placement_energy(&self) -> f64 {
        self.geometry.costs.cost(self.placement)
    }

    /// Costs do not bias the choice.
    pub fn move_label<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.placement = Placement::ALL[rng.random_range(0..PLACEMENT_COUNT)];
    }

    pub fn overlaps(&self, other: &Place) -> bool {
        self.mask_shape().intersects(other.label_shape())
            || other.mask_shape().intersects(self.label_shape())
    }

    pub fn can_overlap(&self, other: &Place) -> bool {
        self.mask_footprint().intersects(other.label_footprint())
            || other.mask_footprint().intersects(self.label_footprint())
    }

    pub fn overlap_energy(&self, other: &Place) -> f64 {
        if !self.overlaps(other) {
            return 0.0;
        }
        let rank = self.rank().min(other.rank()).max(1);
        self.geometry.overlap_weight / f64::from(rank)
    }

    /// Point and alignment a renderer should anchor the label text to.
    pub fn registration(&self) -> (Point, Justification) {
        let rect = self.label_rect();
        let y = rect.y + rect.height / 2.0;
        let justification = self.placement.justification();
        let x = match justification {
            Justification::Left => rect.x,
            Justification::Center => rect.x + rect.width / 2.0,
            Justification::Right => rect.max_x(),
        };
        (Point::new(x, y), justification)
    }
}

// Longitude accepts [-360, 360] so already-wrapped coordinates pass through.
fn validate_location(name: &str, location: Location) -> Result<(), PlaceError> {
    if !(location.lon.is_finite() && location.lon.abs() <= LONGITUDE_LIMIT) {
        return Err(PlaceError::InvalidLongitude {
            name: name.to_string(),
            lon: location.lon,
        });
    }
    if !(location.lat.is_finite() && location.lat.abs() <= LATITUDE_LIMIT) {
        return Err(PlaceError::InvalidLatitude {
            name: name.to_string(),
            lat: location.lat,
        });
    }
    Ok(())
}
