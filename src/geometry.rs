// Pixel-space geometry for label collision tests. y grows downward.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_point(point: Point) -> Self {
        Self::new(point.x, point.y, 0.0, 0.0)
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn inflate(&self, pad: f64) -> Rect {
        Rect::new(
            self.x - pad,
            self.y - pad,
            self.width + 2.0 * pad,
            self.height + 2.0 * pad,
        )
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.max_x().max(other.max_x());
        let y1 = self.max_y().max(other.max_y());
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Closed-set intersection: rectangles sharing an edge intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.max_x()
            && other.x <= self.max_x()
            && self.y <= other.max_y()
            && other.y <= self.max_y()
    }

    pub fn distance(&self, other: &Rect) -> f64 {
        let dx = (self.x - other.max_x()).max(other.x - self.max_x()).max(0.0);
        let dy = (self.y - other.max_y()).max(other.y - self.max_y()).max(0.0);
        dx.hypot(dy)
    }

    /// Corners clockwise from top-left, closed (first corner repeated).
    pub fn ring(&self) -> [Point; 5] {
        [
            Point::new(self.x, self.y),
            Point::new(self.max_x(), self.y),
            Point::new(self.max_x(), self.max_y()),
            Point::new(self.x, self.max_y()),
            Point::new(self.x, self.y),
        ]
    }
}

/// All points within `pad` of `core`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    pub core: Rect,
    pub pad: f64,
}

impl Blob {
    pub const fn rect(core: Rect) -> Self {
        Self { core, pad: 0.0 }
    }

    pub fn dot(center: Point, radius: f64) -> Self {
        Self {
            core: Rect::from_point(center),
            pad: radius,
        }
    }

    pub fn buffered(core: Rect, pad: f64) -> Self {
        Self { core, pad }
    }

    pub fn bounds(&self) -> Rect {
        self.core.inflate(self.pad)
    }

    pub fn intersects(&self, other: &Blob) -> bool {
        self.core.distance(&other.core) <= self.pad + other.pad
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    parts: Vec<Blob>,
    bounds: Rect,
}

impl Shape {
    pub fn new(parts: Vec<Blob>) -> Self {
        let bounds = parts
            .iter()
            .map(Blob::bounds)
            .reduce(|acc, r| acc.union(&r))
            .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));
        Self { parts, bounds }
    }

    pub fn rect(rect: Rect) -> Self {
        Self::new(vec![Blob::rect(rect)])
    }

    pub fn union<'a>(shapes: impl IntoIterator<Item = &'a Shape>) -> Self {
        let parts = shapes
            .into_iter()
            .flat_map(|shape| shape.parts.iter().copied())
            .collect();
        Self::new(parts)
    }

    pub fn parts(&self) -> &[Blob] {
        &self.parts
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn intersects(&self, other: &Shape) -> bool {
        if self.is_empty() || other.is_empty() || !self.bounds.intersects(&other.bounds) {
            return false;
        }
        self.parts
            .iter()
            .any(|a| other.parts.iter().any(|b| a.intersects(b)))
    }
}
