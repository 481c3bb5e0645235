// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line segment extraction and processing operations

use crate::image_ops::{is_ink, is_ink_at};
use crate::types::{DarkSide, LineSegment, Point2D};
use image::GrayImage;
use std::f64::consts::{FRAC_PI_2, PI};

/// Side offset used when probing the mask on either side of a segment
const SIDE_SAMPLE_PX: f64 = 1.5;

/// Extract horizontal and vertical ink boundaries from a binary mask.
///
/// Every transition between an ink pixel and a background pixel lies on a
/// pixel edge; consecutive transitions with the same polarity form one
/// segment. Horizontal segments run towards +x (left normal +y), vertical
/// segments run towards +y (left normal -x).
pub fn extract_axis_segments(mask: &GrayImage, min_length: f64) -> Vec<LineSegment> {
    let width = mask.width() as i64;
    let height = mask.height() as i64;
    let mut segments = Vec::new();

    for y in 0..=height {
        let mut run: Option<(i64, DarkSide)> = None;
        for x in 0..=width {
            let side = if x < width {
                boundary_side(is_ink(mask, x, y - 1), is_ink(mask, x, y))
            } else {
                None
            };
            if let Some((x0, s)) = run {
                if side == Some(s) {
                    continue;
                }
                if (x - x0) as f64 >= min_length {
                    segments.push(LineSegment::with_dark_side(
                        Point2D::new(x0 as f64, y as f64),
                        Point2D::new(x as f64, y as f64),
                        s,
                    ));
                }
            }
            run = side.map(|s| (x, s));
        }
    }

    for x in 0..=width {
        let mut run: Option<(i64, DarkSide)> = None;
        for y in 0..=height {
            let side = if y < height {
                boundary_side(is_ink(mask, x, y), is_ink(mask, x - 1, y))
            } else {
                None
            };
            if let Some((y0, s)) = run {
                if side == Some(s) {
                    continue;
                }
                if (y - y0) as f64 >= min_length {
                    segments.push(LineSegment::with_dark_side(
                        Point2D::new(x as f64, y0 as f64),
                        Point2D::new(x as f64, y as f64),
                        s,
                    ));
                }
            }
            run = side.map(|s| (y, s));
        }
    }

    segments
}

/// Polarity of a pixel edge given ink on the negative and positive side
fn boundary_side(negative_ink: bool, positive_ink: bool) -> Option<DarkSide> {
    match (negative_ink, positive_ink) {
        (false, true) => Some(DarkSide::Positive),
        (true, false) => Some(DarkSide::Negative),
        _ => None,
    }
}

/// Hough pipeline: edges → segments → snapped, merged, with polarity from the mask
pub fn extract_hough_segments(
    edges: &GrayImage,
    mask: &GrayImage,
    threshold: u32,
    min_line_length: f64,
    max_line_gap: f64,
    angle_tolerance: f64,
    distance_tolerance: f64,
) -> Vec<LineSegment> {
    let raw = detect_lines(edges, threshold, min_line_length, max_line_gap);
    let snapped = snap_to_axes(&raw, angle_tolerance);
    let merged = merge_collinear_lines(&snapped, angle_tolerance, distance_tolerance);

    merged
        .into_iter()
        .filter(|seg| seg.length() >= min_line_length)
        .map(|seg| LineSegment {
            dark_side: dark_side_of(&seg, mask),
            ..seg
        })
        .collect()
}

/// Peaks examined per image; later peaks rarely hold unclaimed points
const MAX_HOUGH_PEAKS: usize = 500;

/// Half-width of the band around a peak line that claims edge points
const HOUGH_BAND_PX: f64 = 2.0;

/// Vote table over one-degree angle bins and one-pixel distance bins
struct HoughSpace {
    trig: Vec<(f64, f64)>,
    rho_offset: f64,
    rho_bins: usize,
    votes: Vec<u32>,
}

impl HoughSpace {
    fn new(width: u32, height: u32) -> Self {
        let trig: Vec<(f64, f64)> = (0..180)
            .map(|deg| {
                let theta = f64::from(deg).to_radians();
                (theta.cos(), theta.sin())
            })
            .collect();
        let rho_offset = f64::from(width).hypot(f64::from(height));
        let rho_bins = (2.0 * rho_offset) as usize + 1;
        let votes = vec![0; trig.len() * rho_bins];
        Self {
            trig,
            rho_offset,
            rho_bins,
            votes,
        }
    }

    fn vote(&mut self, p: &Point2D) {
        for (theta, &(c, s)) in self.trig.iter().enumerate() {
            let bin = (p.x * c + p.y * s + self.rho_offset) as usize;
            if bin < self.rho_bins {
                self.votes[theta * self.rho_bins + bin] += 1;
            }
        }
    }

    /// Bins with at least `threshold` votes, strongest first, ties by position
    fn peaks(&self, threshold: u32) -> Vec<(usize, usize, u32)> {
        let mut peaks: Vec<(usize, usize, u32)> = self
            .votes
            .iter()
            .enumerate()
            .filter(|(_, v)| **v >= threshold)
            .map(|(i, v)| (i / self.rho_bins, i % self.rho_bins, *v))
            .collect();
        peaks.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));
        peaks
    }

    /// Normal `(cos, sin)` and distance of a bin's line
    fn line(&self, theta: usize, rho_bin: usize) -> (f64, f64, f64) {
        let (c, s) = self.trig[theta];
        (c, s, rho_bin as f64 - self.rho_offset)
    }
}

/// Probabilistic Hough transform over an edge map.
///
/// Each peak claims the unclaimed edge points near its line; runs of those
/// points without a gap above `max_line_gap` become segments.
pub fn detect_lines(
    edges: &GrayImage,
    threshold: u32,
    min_line_length: f64,
    max_line_gap: f64,
) -> Vec<LineSegment> {
    let points: Vec<Point2D> = edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 128)
        .map(|(x, y, _)| Point2D::new(f64::from(x), f64::from(y)))
        .collect();

    let mut space = HoughSpace::new(edges.width(), edges.height());
    for p in &points {
        space.vote(p);
    }

    let mut claimed = vec![false; points.len()];
    let mut lines = Vec::new();
    for (theta, rho_bin, _) in space.peaks(threshold).into_iter().take(MAX_HOUGH_PEAKS) {
        let (c, s, rho) = space.line(theta, rho_bin);
        let mut band: Vec<(f64, usize)> = points
            .iter()
            .enumerate()
            .filter(|(i, p)| !claimed[*i] && (p.x * c + p.y * s - rho).abs() < HOUGH_BAND_PX)
            .map(|(i, p)| (p.y * c - p.x * s, i))
            .collect();
        band.sort_by(|a, b| a.0.total_cmp(&b.0));

        for run in split_at_gaps(&band, &points, max_line_gap) {
            let (Some(first), Some(last)) = (run.first(), run.last()) else {
                continue;
            };
            if run.len() < 2 {
                continue;
            }
            let segment = LineSegment::new(points[first.1], points[last.1]);
            if segment.length() >= min_line_length {
                lines.push(segment);
                for &(_, i) in run {
                    claimed[i] = true;
                }
            }
        }
    }

    lines
}

/// Cut a sorted band wherever consecutive points are further apart than `max_gap`
fn split_at_gaps<'a>(
    band: &'a [(f64, usize)],
    points: &[Point2D],
    max_gap: f64,
) -> Vec<&'a [(f64, usize)]> {
    let mut runs = Vec::new();
    let mut from = 0;
    for i in 1..=band.len() {
        if i == band.len() || points[band[i].1].distance_to(&points[band[i - 1].1]) > max_gap {
            runs.push(&band[from..i]);
            from = i;
        }
    }
    runs
}

/// Merge collinear fragments into one segment per group.
///
/// Groups are seeded in input order; a fragment joins the first seed it is
/// collinear with.
pub fn merge_collinear_lines(
    lines: &[LineSegment],
    angle_tolerance: f64,
    distance_tolerance: f64,
) -> Vec<LineSegment> {
    let mut remaining: Vec<LineSegment> = lines.to_vec();
    let mut merged = Vec::new();

    while !remaining.is_empty() {
        let seed = remaining.remove(0);
        let (group, rest): (Vec<LineSegment>, Vec<LineSegment>) = remaining
            .into_iter()
            .partition(|l| are_collinear(&seed, l, angle_tolerance, distance_tolerance));
        remaining = rest;
        merged.push(span_of(seed, &group));
    }

    merged
}

fn are_collinear(a: &LineSegment, b: &LineSegment, angle_tolerance: f64, distance_tolerance: f64) -> bool {
    // Undirected angle between the two, folded into [0, π/2]
    let diff = (a.angle() - b.angle()).rem_euclid(PI);
    diff.min(PI - diff) <= angle_tolerance
        && point_to_line_distance(&b.midpoint(), &a.start, &a.end) <= distance_tolerance
}

/// Segment between the extreme endpoints of a group, measured along the seed
fn span_of(seed: LineSegment, group: &[LineSegment]) -> LineSegment {
    if group.is_empty() {
        return seed;
    }

    let dir = seed.direction();
    let along = |p: &&Point2D| p.x * dir.x + p.y * dir.y;
    let ends: Vec<Point2D> = std::iter::once(&seed)
        .chain(group)
        .flat_map(|l| [l.start, l.end])
        .collect();
    let lo = ends.iter().min_by(|a, b| along(a).total_cmp(&along(b)));
    let hi = ends.iter().max_by(|a, b| along(a).total_cmp(&along(b)));

    match (lo, hi) {
        (Some(lo), Some(hi)) => LineSegment::new(*lo, *hi),
        _ => seed,
    }
}

/// Distance from a point to the closest point of a segment
pub fn point_to_line_distance(point: &Point2D, line_start: &Point2D, line_end: &Point2D) -> f64 {
    let a = line_start.to_vector();
    let seg = line_end.to_vector() - a;
    let length_sq = seg.norm_squared();
    if length_sq < 1e-10 {
        return point.distance_to(line_start);
    }

    let p = point.to_vector();
    let t = ((p - a).dot(&seg) / length_sq).clamp(0.0, 1.0);
    (a + seg * t - p).norm()
}

/// Flatten near-horizontal and near-vertical segments onto their axis
pub fn snap_to_axes(lines: &[LineSegment], angle_threshold: f64) -> Vec<LineSegment> {
    lines.iter().map(|l| snap_line(*l, angle_threshold)).collect()
}

fn snap_line(line: LineSegment, tolerance: f64) -> LineSegment {
    let angle = line.angle().abs();
    let (a, b) = (line.start, line.end);

    if angle.min(PI - angle) < tolerance {
        let y = (a.y + b.y) / 2.0;
        LineSegment {
            start: Point2D::new(a.x, y),
            end: Point2D::new(b.x, y),
            ..line
        }
    } else if (angle - FRAC_PI_2).abs() < tolerance {
        let x = (a.x + b.x) / 2.0;
        LineSegment {
            start: Point2D::new(x, a.y),
            end: Point2D::new(x, b.y),
            ..line
        }
    } else {
        line
    }
}

/// Decide the dark side of a segment by probing the mask along both normals
pub fn dark_side_of(segment: &LineSegment, mask: &GrayImage) -> DarkSide {
    let dir = segment.direction();
    if dir.norm() == 0.0 {
        return DarkSide::Unknown;
    }
    let (nx, ny) = (-dir.y, dir.x);

    let mut positive = 0;
    let mut negative = 0;
    let samples = 9;
    for k in 1..=samples {
        let t = k as f64 / (samples + 1) as f64;
        let x = segment.start.x + (segment.end.x - segment.start.x) * t;
        let y = segment.start.y + (segment.end.y - segment.start.y) * t;
        if is_ink_at(mask, x + nx * SIDE_SAMPLE_PX, y + ny * SIDE_SAMPLE_PX) {
            positive += 1;
        }
        if is_ink_at(mask, x - nx * SIDE_SAMPLE_PX, y - ny * SIDE_SAMPLE_PX) {
            negative += 1;
        }
    }

    let majority = samples / 2 + 1;
    if positive >= majority && negative < majority {
        DarkSide::Positive
    } else if negative >= majority && positive < majority {
        DarkSide::Negative
    } else {
        DarkSide::Unknown
    }
}
