// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Region extraction via contour finding

use crate::types::{polygon_area, BoundingBox, Contour, Point2D};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::region_labelling::{connected_components, Connectivity};
use nalgebra::{Matrix2, Vector2};

/// Per-pixel component labels (0 is background)
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Minimum-area rectangle estimate of a region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub center: Point2D,
    /// Unit vector along the long side
    pub axis: Vector2<f64>,
    pub length: f64,
    pub width: f64,
}

impl OrientedBox {
    pub fn aspect_ratio(&self) -> f64 {
        self.length / self.width.max(1.0)
    }

    pub fn area(&self) -> f64 {
        self.length * self.width
    }

    /// Points where the major axis leaves the box
    pub fn axis_endpoints(&self) -> (Point2D, Point2D) {
        let half = self.axis * (self.length / 2.0);
        let c = self.center.to_vector();
        let a = c - half;
        let b = c + half;
        (Point2D::new(a.x, a.y), Point2D::new(b.x, b.y))
    }
}

/// A connected ink (or background) component described by its outer border
#[derive(Debug, Clone)]
pub struct Region {
    pub label: u32,
    pub contour: Contour,
    pub bbox: BoundingBox,
    /// Pixels enclosed by the outer border, holes included
    pub area_px: f64,
    /// Pixels that belong to the component itself
    pub pixel_count: u32,
    pub oriented: OrientedBox,
    pub touches_border: bool,
}

impl Region {
    /// Share of the enclosed area covered by the component
    pub fn fill_ratio(&self) -> f64 {
        if self.area_px <= 0.0 {
            return 0.0;
        }
        (self.pixel_count as f64 / self.area_px).min(1.0)
    }

    /// Enclosed area relative to the oriented bounding rectangle
    pub fn rectangularity(&self) -> f64 {
        let rect = self.oriented.area();
        if rect <= 0.0 {
            return 0.0;
        }
        (self.area_px / rect).min(1.0)
    }
}

/// Label 8-connected foreground components
pub fn label_components(mask: &GrayImage) -> LabelImage {
    connected_components(mask, Connectivity::Eight, Luma([0u8]))
}

/// Outer borders of every foreground component, with per-component statistics
pub fn extract_regions(mask: &GrayImage, labels: &LabelImage) -> Vec<Region> {
    let width = mask.width();
    let height = mask.height();

    let max_label = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut pixel_counts = vec![0u32; max_label + 1];
    for p in labels.pixels() {
        pixel_counts[p.0[0] as usize] += 1;
    }

    find_contours::<u32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && !c.points.is_empty())
        .filter_map(|c| {
            let first = c.points[0];
            let label = labels.get_pixel(first.x, first.y).0[0];
            if label == 0 {
                return None;
            }

            let points: Vec<Point2D> = c
                .points
                .iter()
                .map(|p| Point2D::new(p.x as f64, p.y as f64))
                .collect();
            let bbox = BoundingBox::from_points(&points)?;
            let area_px = pixel_area(&points);
            let oriented = oriented_box(&points);
            let touches_border = bbox.min_x <= 0.0
                || bbox.min_y <= 0.0
                || bbox.max_x >= (width - 1) as f64
                || bbox.max_y >= (height - 1) as f64;

            Some(Region {
                label,
                contour: Contour::new(points),
                bbox,
                area_px,
                pixel_count: pixel_counts[label as usize],
                oriented,
                touches_border,
            })
        })
        .collect()
}

/// Number of pixels enclosed by a traced border chain.
///
/// The chain runs through pixel centres, so Pick's theorem recovers the
/// pixel count: shoelace area + boundary points / 2 + 1.
pub fn pixel_area(chain: &[Point2D]) -> f64 {
    match chain.len() {
        0 => 0.0,
        1 => 1.0,
        n => polygon_area(chain) + n as f64 / 2.0 + 1.0,
    }
}

/// Rectangle fit: principal axes or image axes, whichever is tighter
pub fn oriented_box(points: &[Point2D]) -> OrientedBox {
    let axis_aligned = axis_aligned_box(points);
    if points.len() < 3 {
        return axis_aligned;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let dx = p.x - mean_x;
        let dy = p.y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    let eigen = Matrix2::new(sxx, sxy, sxy, syy).symmetric_eigen();
    let major_idx = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] { 0 } else { 1 };
    let major: Vector2<f64> = eigen.eigenvectors.column(major_idx).into_owned();
    let norm = major.norm();
    if norm < 1e-12 {
        return axis_aligned;
    }
    let principal = box_along(points, major / norm);

    if principal.area() + 1e-9 < axis_aligned.area() {
        principal
    } else {
        axis_aligned
    }
}

fn axis_aligned_box(points: &[Point2D]) -> OrientedBox {
    let x_box = box_along(points, Vector2::new(1.0, 0.0));
    if x_box.length >= x_box.width {
        x_box
    } else {
        box_along(points, Vector2::new(0.0, 1.0))
    }
}

/// Extents along `axis` and its normal; pixel centres widen each side by half a pixel
fn box_along(points: &[Point2D], axis: Vector2<f64>) -> OrientedBox {
    let normal = Vector2::new(-axis.y, axis.x);
    let (mut min_a, mut max_a) = (f64::MAX, f64::MIN);
    let (mut min_n, mut max_n) = (f64::MAX, f64::MIN);
    for p in points {
        let v = p.to_vector();
        let a = v.dot(&axis);
        let b = v.dot(&normal);
        min_a = min_a.min(a);
        max_a = max_a.max(a);
        min_n = min_n.min(b);
        max_n = max_n.max(b);
    }
    if points.is_empty() {
        return OrientedBox {
            center: Point2D::new(0.0, 0.0),
            axis,
            length: 0.0,
            width: 0.0,
        };
    }

    let along = max_a - min_a + 1.0;
    let across = max_n - min_n + 1.0;
    let center = Point2D::from_frame(axis, normal, (min_a + max_a) / 2.0, (min_n + max_n) / 2.0);

    if along >= across {
        OrientedBox {
            center,
            axis,
            length: along,
            width: across,
        }
    } else {
        OrientedBox {
            center,
            axis: normal,
            length: across,
            width: along,
        }
    }
}

/// Douglas-Peucker line simplification
pub fn douglas_peucker(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let first = &points[0];
    let last = &points[points.len() - 1];

    let mut max_dist = 0.0;
    let mut max_idx = 0;
    for (i, point) in points.iter().enumerate().take(points.len() - 1).skip(1) {
        let dist = perpendicular_distance(point, first, last);
        if dist > max_dist {
            max_dist = dist;
            max_idx = i;
        }
    }

    if max_dist > epsilon {
        let left = douglas_peucker(&points[..=max_idx], epsilon);
        let right = douglas_peucker(&points[max_idx..], epsilon);

        let mut result = left;
        result.extend_from_slice(&right[1..]);
        result
    } else {
        vec![*first, *last]
    }
}

/// Simplify a closed chain, splitting it at its farthest point first
pub fn simplify_closed(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    if points.len() < 4 {
        return points.to_vec();
    }
    let start = points[0];
    let split = points
        .iter()
        .enumerate()
        .max_by(|a, b| start.distance_to(a.1).total_cmp(&start.distance_to(b.1)))
        .map(|(i, _)| i)
        .unwrap_or(points.len() / 2);
    if split == 0 {
        return points.to_vec();
    }

    let mut first_half = douglas_peucker(&points[..=split], epsilon);
    let mut second: Vec<Point2D> = points[split..].to_vec();
    second.push(start);
    let second_half = douglas_peucker(&second, epsilon);

    first_half.pop();
    first_half.extend_from_slice(&second_half[..second_half.len() - 1]);
    first_half
}

/// Perpendicular distance from point to the infinite line through two points
fn perpendicular_distance(point: &Point2D, line_start: &Point2D, line_end: &Point2D) -> f64 {
    let dx = line_end.x - line_start.x;
    let dy = line_end.y - line_start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-10 {
        return point.distance_to(line_start);
    }

    let length = length_sq.sqrt();
    ((point.x - line_start.x) * dy - (point.y - line_start.y) * dx).abs() / length
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_ops::INK;
    use approx::assert_relative_eq;

    fn mask_with(rects: &[(u32, u32, u32, u32)]) -> GrayImage {
        let mut mask = GrayImage::new(100, 100);
        for &(x0, y0, x1, y1) in rects {
            for y in y0..y1 {
                for x in x0..x1 {
                    mask.put_pixel(x, y, Luma([INK]));
                }
            }
        }
        mask
    }

    #[test]
    fn test_filled_square_region() {
        let mask = mask_with(&[(20, 20, 60, 60)]);
        let labels = label_components(&mask);
        let regions = extract_regions(&mask, &labels);

        assert_eq!(regions.len(), 1);
        let square = &regions[0];
        assert_relative_eq!(square.area_px, 1600.0, epsilon = 1e-9);
        assert_eq!(square.pixel_count, 1600);
        assert_relative_eq!(square.oriented.length, 40.0, epsilon = 1e-9);
        assert_relative_eq!(square.oriented.width, 40.0, epsilon = 1e-9);
        assert_relative_eq!(square.fill_ratio(), 1.0);
        assert_relative_eq!(square.rectangularity(), 1.0);
        assert!(!square.touches_border);
    }

    #[test]
    fn test_ring_has_low_fill() {
        // 40x40 outline, 2 px thick
        let mask = mask_with(&[(20, 20, 60, 22), (20, 58, 60, 60), (20, 22, 22, 58), (58, 22, 60, 58)]);
        let labels = label_components(&mask);
        let regions = extract_regions(&mask, &labels);

        assert_eq!(regions.len(), 1);
        assert_relative_eq!(regions[0].area_px, 1600.0, epsilon = 1e-9);
        assert!(regions[0].fill_ratio() < 0.25);
    }

    #[test]
    fn test_elongated_region_axis() {
        let mask = mask_with(&[(10, 40, 90, 50)]);
        let labels = label_components(&mask);
        let region = &extract_regions(&mask, &labels)[0];

        assert_relative_eq!(region.oriented.length, 80.0, epsilon = 1e-9);
        assert_relative_eq!(region.oriented.width, 10.0, epsilon = 1e-9);
        assert_relative_eq!(region.oriented.aspect_ratio(), 8.0, epsilon = 1e-9);
        assert!(region.oriented.axis.x.abs() > 0.99);
    }

    #[test]
    fn test_pixel_area_degenerate_chains() {
        assert_eq!(pixel_area(&[]), 0.0);
        assert_eq!(pixel_area(&[Point2D::new(3.0, 3.0)]), 1.0);
        let line = [
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 0.0),
            Point2D::new(2.0, 0.0),
            Point2D::new(1.0, 0.0),
        ];
        assert_eq!(pixel_area(&line), 3.0);
    }

    #[test]
    fn test_douglas_peucker() {
        let points = vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 0.1),
            Point2D::new(2.0, -0.1),
            Point2D::new(3.0, 0.0),
            Point2D::new(4.0, 0.0),
        ];

        let simplified = douglas_peucker(&points, 0.5);
        assert_eq!(simplified.len(), 2);
    }

    #[test]
    fn test_simplify_closed_square_chain() {
        let mut chain = Vec::new();
        for x in 0..10 {
            chain.push(Point2D::new(x as f64, 0.0));
        }
        for y in 0..10 {
            chain.push(Point2D::new(10.0, y as f64));
        }
        for x in (1..=10).rev() {
            chain.push(Point2D::new(x as f64, 10.0));
        }
        for y in (1..=10).rev() {
            chain.push(Point2D::new(0.0, y as f64));
        }

        let simplified = simplify_closed(&chain, 0.5);
        assert_eq!(simplified.len(), 4);
        assert_relative_eq!(polygon_area(&simplified), 100.0);
    }
}
