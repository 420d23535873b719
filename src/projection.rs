use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::geometry::Point;

const TILE_SIZE: f64 = 256.0;
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lon: f64,
    pub lat: f64,
}

impl Location {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Spherical mercator with 256px tiles, as used by slippy maps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mercator {
    zoom: f64,
    world: f64,
}

impl Mercator {
    pub fn new(zoom: f64) -> Self {
        Self {
            zoom,
            world: TILE_SIZE * 2f64.powf(zoom),
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn project(&self, location: Location) -> Point {
        let lat = location.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
        let x = (location.lon + 180.0) / 360.0 * self.world;
        let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * self.world;
        Point::new(x, y)
    }

    pub fn unproject(&self, point: Point) -> Location {
        let lon = point.x / self.world * 360.0 - 180.0;
        let n = PI * (1.0 - 2.0 * point.y / self.world);
        let lat = n.sinh().atan().to_degrees();
        Location::new(lon, lat)
    }
}
