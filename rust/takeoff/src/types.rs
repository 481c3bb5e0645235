// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pixel-space primitives and page input

use image::GrayImage;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const MM_PER_INCH: f64 = 25.4;

/// A 2D point in pixel coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Point at `along` units on `dir` and `across` units on `normal` from the origin
    pub fn from_frame(dir: Vector2<f64>, normal: Vector2<f64>, along: f64, across: f64) -> Self {
        let v = dir * along + normal * across;
        Self::new(v.x, v.y)
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

/// Which side of a boundary segment the dark (inked) pixels lie on.
///
/// Measured against the segment's left normal `(-dy, dx)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DarkSide {
    Positive,
    Negative,
    Unknown,
}

impl DarkSide {
    pub fn flipped(self) -> Self {
        match self {
            DarkSide::Positive => DarkSide::Negative,
            DarkSide::Negative => DarkSide::Positive,
            DarkSide::Unknown => DarkSide::Unknown,
        }
    }
}

/// Line segment extracted from the raster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LineSegment {
    pub start: Point2D,
    pub end: Point2D,
    pub dark_side: DarkSide,
}

impl LineSegment {
    pub fn new(start: Point2D, end: Point2D) -> Self {
        Self {
            start,
            end,
            dark_side: DarkSide::Unknown,
        }
    }

    pub fn with_dark_side(start: Point2D, end: Point2D, dark_side: DarkSide) -> Self {
        Self {
            start,
            end,
            dark_side,
        }
    }

    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    pub fn angle(&self) -> f64 {
        (self.end.y - self.start.y).atan2(self.end.x - self.start.x)
    }

    /// Orientation folded into `[0, PI)`
    pub fn orientation(&self) -> f64 {
        normalize_orientation(self.angle())
    }

    pub fn midpoint(&self) -> Point2D {
        Point2D::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }

    /// Unit direction from start to end; zero for degenerate segments
    pub fn direction(&self) -> Vector2<f64> {
        let v = self.end.to_vector() - self.start.to_vector();
        let len = v.norm();
        if len < 1e-12 {
            Vector2::zeros()
        } else {
            v / len
        }
    }
}

/// Fold an angle into `[0, PI)`
pub fn normalize_orientation(angle: f64) -> f64 {
    let mut a = angle % PI;
    if a < 0.0 {
        a += PI;
    }
    if a >= PI {
        a -= PI;
    }
    a
}

/// Smallest difference between two orientations, in `[0, PI/2]`
pub fn orientation_difference(a: f64, b: f64) -> f64 {
    let d = (normalize_orientation(a) - normalize_orientation(b)).abs();
    d.min(PI - d)
}

/// Axis-aligned bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn from_points(points: &[Point2D]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &points[1..] {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, p: &Point2D) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    /// Area of the intersection with another box (zero when disjoint)
    pub fn intersection_area(&self, other: &BoundingBox) -> f64 {
        let w = self.max_x.min(other.max_x) - self.min_x.max(other.min_x);
        let h = self.max_y.min(other.max_y) - self.min_y.max(other.min_y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }
}

/// Closed sequence of points bounding a region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contour {
    pub points: Vec<Point2D>,
}

impl Contour {
    pub fn new(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    /// Polygon area via the shoelace formula (pixel²)
    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.points)
    }

    pub fn perimeter(&self) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| self.points[i].distance_to(&self.points[(i + 1) % n]))
            .sum()
    }
}

/// Shoelace polygon area
pub fn polygon_area(points: &[Point2D]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let mut area = 0.0;
    let n = points.len();
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y;
        area -= points[j].x * points[i].y;
    }
    (area / 2.0).abs()
}

/// One preprocessed plan page handed to the analyzer
#[derive(Debug, Clone)]
pub struct PageRaster {
    /// Grayscale or binary bitmap; dark pixels are ink
    pub image: GrayImage,
    /// Resolution embedded in the raster, if known
    pub dpi: Option<f64>,
    /// Physical page size in millimetres (width, height), if known
    pub page_size_mm: Option<(f64, f64)>,
    /// Page explicitly denotes a foundation plan
    pub foundation: bool,
}

impl PageRaster {
    pub fn new(image: GrayImage) -> Self {
        Self {
            image,
            dpi: None,
            page_size_mm: None,
            foundation: false,
        }
    }

    pub fn with_dpi(mut self, dpi: f64) -> Self {
        self.dpi = Some(dpi);
        self
    }

    pub fn with_page_size_mm(mut self, width_mm: f64, height_mm: f64) -> Self {
        self.page_size_mm = Some((width_mm, height_mm));
        self
    }

    pub fn foundation_plan(mut self) -> Self {
        self.foundation = true;
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Resolution derived from the raster itself: embedded DPI first, then
    /// the physical page width.
    pub fn embedded_dpi(&self) -> Option<f64> {
        if let Some(dpi) = self.dpi.filter(|d| d.is_finite() && *d > 0.0) {
            return Some(dpi);
        }
        let (width_mm, _) = self.page_size_mm?;
        if !(width_mm.is_finite() && width_mm > 0.0) || self.image.width() == 0 {
            return None;
        }
        Some(self.image.width() as f64 / (width_mm / MM_PER_INCH))
    }
}

/// Recognised dimension text anchored on a page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DimensionAnnotation {
    pub page: usize,
    pub text: String,
    /// Pixel position of the text
    pub anchor: Point2D,
}

impl DimensionAnnotation {
    pub fn new(page: usize, text: impl Into<String>, anchor: Point2D) -> Self {
        Self {
            page,
            text: text.into(),
            anchor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_orientation_folding() {
        let right = LineSegment::new(Point2D::new(0.0, 0.0), Point2D::new(10.0, 0.0));
        let left = LineSegment::new(Point2D::new(10.0, 0.0), Point2D::new(0.0, 0.0));
        assert_relative_eq!(right.orientation(), 0.0);
        assert!(left.orientation() < 1e-9 || (PI - left.orientation()) < 1e-9);
        assert!(orientation_difference(0.01, PI - 0.01) < 0.021);
    }

    #[test]
    fn test_polygon_area() {
        let square = Contour::new(vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(10.0, 0.0),
            Point2D::new(10.0, 10.0),
            Point2D::new(0.0, 10.0),
        ]);
        assert_relative_eq!(square.area(), 100.0);
        assert_relative_eq!(square.perimeter(), 40.0);
    }

    #[test]
    fn test_bbox_intersection() {
        let a = BoundingBox { min_x: 0.0, min_y: 0.0, max_x: 10.0, max_y: 10.0 };
        let b = BoundingBox { min_x: 5.0, min_y: 5.0, max_x: 20.0, max_y: 20.0 };
        let c = BoundingBox { min_x: 11.0, min_y: 0.0, max_x: 20.0, max_y: 4.0 };
        assert_relative_eq!(a.intersection_area(&b), 25.0);
        assert_eq!(a.intersection_area(&c), 0.0);
    }

    #[test]
    fn test_embedded_dpi_from_page_size() {
        // Ten inch wide page rendered 1000 px wide
        let raster = PageRaster::new(GrayImage::new(1000, 10)).with_page_size_mm(254.0, 1.0);
        assert_relative_eq!(raster.embedded_dpi().unwrap(), 100.0);

        let raster = raster.with_dpi(150.0);
        assert_relative_eq!(raster.embedded_dpi().unwrap(), 150.0);

        assert!(PageRaster::new(GrayImage::new(10, 10)).embedded_dpi().is_none());
    }
}
