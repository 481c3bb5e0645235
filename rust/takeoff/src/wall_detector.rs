// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall detection from paired boundary segments
//!
//! 1. Group segments by orientation and express them in a per-group frame
//!    (`direction` along the group, `normal` across it).
//! 2. Fuse collinear segments with the same polarity into edge lines.
//! 3. Pair an edge with ink on its +normal side against the nearest edge
//!    with ink on its -normal side, within the thickness bounds.
//! 4. Chain collinear pieces of equal thickness into wall runs and snap run
//!    ends to the centerlines of perpendicular runs. A free end within one
//!    opening width of a perpendicular run is extended to it.
//! 5. Record where perpendicular runs meet each run; those stretches are
//!    never face gaps.
//! 6. Classify runs as exterior when open space is visible beside them.

use crate::config::TakeoffConfig;
use crate::intervals::{self, Interval};
use crate::scale::ScaleFactor;
use crate::types::{orientation_difference, DarkSide, LineSegment, Point2D};
use nalgebra::Vector2;
use std::f64::consts::{FRAC_PI_4, PI};

/// Sample positions along a run used for the visibility test
const VISIBILITY_SAMPLES: [f64; 3] = [0.25, 0.5, 0.75];

/// A chained wall in its orientation frame (pixel units)
#[derive(Debug, Clone, PartialEq)]
pub struct WallRun {
    pub direction: Vector2<f64>,
    pub normal: Vector2<f64>,
    /// Centerline position along `normal`
    pub offset: f64,
    pub thickness: f64,
    /// Extent along `direction`
    pub start: f64,
    pub end: f64,
    /// Ink boundary coverage of the face at `offset - thickness / 2`
    pub low_face: Vec<Interval>,
    /// Ink boundary coverage of the face at `offset + thickness / 2`
    pub high_face: Vec<Interval>,
    /// Length actually backed by paired faces
    pub paired_length: f64,
    /// Stretches occupied by the band of a perpendicular run meeting this one
    pub junctions: Vec<Interval>,
    pub exterior: bool,
}

impl WallRun {
    pub fn length(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn point_at(&self, along: f64) -> Point2D {
        Point2D::from_frame(self.direction, self.normal, along, self.offset)
    }

    /// Point at `along`, shifted `across` from the centerline
    pub fn point_beside(&self, along: f64, across: f64) -> Point2D {
        Point2D::from_frame(self.direction, self.normal, along, self.offset + across)
    }

    pub fn centerline(&self) -> (Point2D, Point2D) {
        (self.point_at(self.start), self.point_at(self.end))
    }

    pub fn project(&self, p: &Point2D) -> (f64, f64) {
        let v = p.to_vector();
        (v.dot(&self.direction), v.dot(&self.normal) - self.offset)
    }

    pub fn orientation(&self) -> f64 {
        self.direction.y.atan2(self.direction.x)
    }

    /// Share of the run backed by paired faces
    pub fn coverage_ratio(&self) -> f64 {
        let len = self.length();
        if len <= 0.0 {
            0.0
        } else {
            (self.paired_length / len).min(1.0)
        }
    }

    pub fn confidence(&self) -> f64 {
        0.55 + 0.4 * self.coverage_ratio()
    }

    /// Intervals along the run where neither face has ink boundary.
    ///
    /// Junction bands are removed first, so a crossing wall is not a gap
    /// and a gap running into a corner ends at the corner wall's face.
    pub fn face_gaps(&self) -> Vec<Interval> {
        let mut both = self.low_face.clone();
        both.extend_from_slice(&self.high_face);
        let covered = intervals::merge_intervals(both, 0.0);
        let open = intervals::complement(&covered, self.start, self.end);
        intervals::subtract(&open, &self.junctions)
            .into_iter()
            .filter(|&(s, e)| e - s > 1e-6 && s > self.start + 1e-6 && e < self.end - 1e-6)
            .collect()
    }
}

/// Result of wall detection for one page
#[derive(Debug, Clone, Default)]
pub struct WallDetection {
    pub runs: Vec<WallRun>,
    /// Boundary pieces that could not be paired into a wall
    pub unresolved: Vec<LineSegment>,
    pub paired_pieces: usize,
}

impl WallDetection {
    pub fn unresolved_length(&self) -> f64 {
        self.unresolved.iter().map(|s| s.length()).sum()
    }
}

/// Pixel-space thresholds derived from the configuration
#[derive(Debug, Clone, Copy)]
struct WallParams {
    angle_tolerance: f64,
    offset_tolerance: f64,
    min_thickness: f64,
    max_thickness: f64,
    min_overlap_fraction: f64,
    min_piece_length: f64,
    min_wall_length: f64,
    merge_gap: f64,
    /// Widest opening; bounds both chaining and end extension
    chain_gap: f64,
    junction_tolerance: f64,
}

impl WallParams {
    fn new(scale: &ScaleFactor, config: &TakeoffConfig) -> Self {
        Self {
            angle_tolerance: config.angle_tolerance_rad,
            offset_tolerance: config.collinear_offset_tolerance_px,
            min_thickness: scale.m_to_px(config.min_wall_thickness_m),
            max_thickness: scale.m_to_px(config.max_wall_thickness_m),
            min_overlap_fraction: config.min_overlap_fraction,
            min_piece_length: scale.m_to_px(config.min_segment_length_m).max(2.0),
            min_wall_length: scale.m_to_px(config.min_wall_length_m),
            merge_gap: scale.m_to_px(config.wall_merge_gap_m),
            chain_gap: scale.m_to_px(config.max_opening_width_m),
            junction_tolerance: scale.m_to_px(config.junction_tolerance_m).max(1.0),
        }
    }
}

/// Segments sharing an orientation, expressed in a common frame
#[derive(Debug, Clone)]
struct OrientationGroup {
    direction: Vector2<f64>,
    normal: Vector2<f64>,
    members: Vec<usize>,
}

/// Collinear segments with the same polarity
#[derive(Debug, Clone)]
struct EdgeLine {
    offset: f64,
    side: DarkSide,
    coverage: Vec<Interval>,
}

/// One paired stretch of two edge lines
#[derive(Debug, Clone, Copy)]
struct Piece {
    low_line: usize,
    high_line: usize,
    low_offset: f64,
    high_offset: f64,
    start: f64,
    end: f64,
}

impl Piece {
    fn center(&self) -> f64 {
        (self.low_offset + self.high_offset) / 2.0
    }

    fn thickness(&self) -> f64 {
        self.high_offset - self.low_offset
    }
}

#[derive(Debug, Clone)]
struct RunBuilder {
    weighted_offset: f64,
    weighted_thickness: f64,
    weight: f64,
    start: f64,
    end: f64,
    low_lines: Vec<usize>,
    high_lines: Vec<usize>,
    paired: Vec<Interval>,
}

impl RunBuilder {
    fn from_piece(piece: &Piece) -> Self {
        let w = piece.end - piece.start;
        Self {
            weighted_offset: piece.center() * w,
            weighted_thickness: piece.thickness() * w,
            weight: w,
            start: piece.start,
            end: piece.end,
            low_lines: vec![piece.low_line],
            high_lines: vec![piece.high_line],
            paired: vec![(piece.start, piece.end)],
        }
    }

    fn offset(&self) -> f64 {
        self.weighted_offset / self.weight
    }

    fn thickness(&self) -> f64 {
        self.weighted_thickness / self.weight
    }

    fn gap_to(&self, piece: &Piece) -> f64 {
        (piece.start - self.end).max(self.start - piece.end).max(0.0)
    }

    fn absorb(&mut self, piece: &Piece) {
        let w = piece.end - piece.start;
        self.weighted_offset += piece.center() * w;
        self.weighted_thickness += piece.thickness() * w;
        self.weight += w;
        self.start = self.start.min(piece.start);
        self.end = self.end.max(piece.end);
        if !self.low_lines.contains(&piece.low_line) {
            self.low_lines.push(piece.low_line);
        }
        if !self.high_lines.contains(&piece.high_line) {
            self.high_lines.push(piece.high_line);
        }
        self.paired.push((piece.start, piece.end));
    }
}

/// Detect walls from extracted line segments
pub fn detect_walls(
    segments: &[LineSegment],
    image_width: u32,
    image_height: u32,
    scale: &ScaleFactor,
    config: &TakeoffConfig,
) -> WallDetection {
    let params = WallParams::new(scale, config);
    let groups = group_by_orientation(segments, params.angle_tolerance);

    let mut runs = Vec::new();
    let mut unresolved = Vec::new();
    let mut paired_pieces = 0;

    for group in &groups {
        let lines = build_edge_lines(group, segments, &params);
        let (pieces, remaining) = pair_edge_lines(&lines, &params);
        paired_pieces += pieces.len();

        for (line, rest) in lines.iter().zip(&remaining) {
            for &(s, e) in rest {
                if e - s >= params.min_piece_length {
                    unresolved.push(frame_segment(group, line.offset, s, e, line.side));
                }
            }
        }

        for builder in chain_pieces(&pieces, &params) {
            let offset = builder.offset();
            let thickness = builder.thickness();
            let low_face = faces_of(&lines, &builder.low_lines, params.merge_gap);
            let high_face = faces_of(&lines, &builder.high_lines, params.merge_gap);
            let paired = intervals::merge_intervals(builder.paired, params.merge_gap);
            runs.push(WallRun {
                direction: group.direction,
                normal: group.normal,
                offset,
                thickness,
                start: builder.start,
                end: builder.end,
                low_face,
                high_face,
                paired_length: intervals::total_length(&paired),
                junctions: Vec::new(),
                exterior: false,
            });
        }
    }

    // A run extended in the first pass can then be met by the runs it reaches
    for _ in 0..2 {
        snap_junctions(&mut runs, params.junction_tolerance, params.chain_gap);
    }

    // Clip face coverage to the final extents
    for run in &mut runs {
        run.low_face = intervals::clip(&run.low_face, run.start, run.end);
        run.high_face = intervals::clip(&run.high_face, run.start, run.end);
    }

    let (kept, short): (Vec<WallRun>, Vec<WallRun>) = runs
        .into_iter()
        .partition(|r| r.length() >= params.min_wall_length);
    for run in &short {
        let (a, b) = run.centerline();
        unresolved.push(LineSegment::new(a, b));
    }
    let mut runs = kept;

    mark_junctions(&mut runs, params.junction_tolerance);
    classify_exterior(&mut runs, image_width, image_height);

    runs.sort_by(|a, b| {
        a.orientation()
            .total_cmp(&b.orientation())
            .then(a.offset.total_cmp(&b.offset))
            .then(a.start.total_cmp(&b.start))
    });

    tracing::debug!(
        groups = groups.len(),
        pieces = paired_pieces,
        walls = runs.len(),
        unresolved = unresolved.len(),
        "Wall detection complete"
    );

    WallDetection {
        runs,
        unresolved,
        paired_pieces,
    }
}

/// Cluster segment orientations, folding across 0/PI
fn group_by_orientation(segments: &[LineSegment], tolerance: f64) -> Vec<OrientationGroup> {
    let mut items: Vec<(usize, f64)> = segments
        .iter()
        .enumerate()
        .filter(|(_, s)| s.length() > 0.0)
        .map(|(i, s)| (i, s.orientation()))
        .collect();
    items.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut clusters: Vec<Vec<(usize, f64)>> = Vec::new();
    for item in items {
        match clusters.last_mut() {
            Some(cluster) if item.1 - cluster[cluster.len() - 1].1 <= tolerance => {
                cluster.push(item)
            }
            _ => clusters.push(vec![item]),
        }
    }

    if clusters.len() > 1 {
        let first_angle = clusters[0][0].1;
        let last = &clusters[clusters.len() - 1];
        if first_angle + PI - last[last.len() - 1].1 <= tolerance {
            if let Some(tail) = clusters.pop() {
                clusters[0].extend(tail);
            }
        }
    }

    clusters
        .into_iter()
        .map(|cluster| {
            let reference = cluster
                .iter()
                .max_by(|a, b| {
                    segments[a.0]
                        .length()
                        .total_cmp(&segments[b.0].length())
                        .then(b.0.cmp(&a.0))
                })
                .map(|&(_, angle)| angle)
                .unwrap_or(0.0);
            let direction = Vector2::new(reference.cos(), reference.sin());
            OrientationGroup {
                direction,
                normal: Vector2::new(-direction.y, direction.x),
                members: cluster.into_iter().map(|(i, _)| i).collect(),
            }
        })
        .collect()
}

fn build_edge_lines(
    group: &OrientationGroup,
    segments: &[LineSegment],
    params: &WallParams,
) -> Vec<EdgeLine> {
    let mut projected: Vec<(DarkSide, f64, Interval)> = group
        .members
        .iter()
        .map(|&i| {
            let seg = &segments[i];
            let a = seg.start.to_vector().dot(&group.direction);
            let b = seg.end.to_vector().dot(&group.direction);
            let offset = seg.midpoint().to_vector().dot(&group.normal);
            let side = if seg.direction().dot(&group.direction) < 0.0 {
                seg.dark_side.flipped()
            } else {
                seg.dark_side
            };
            (side, offset, (a.min(b), a.max(b)))
        })
        .collect();
    projected.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.total_cmp(&b.1))
            .then(a.2 .0.total_cmp(&b.2 .0))
    });

    let mut lines = Vec::new();
    let mut bucket: Vec<(f64, Interval)> = Vec::new();
    let mut bucket_side = DarkSide::Unknown;

    let flush = |bucket: &mut Vec<(f64, Interval)>, side: DarkSide, lines: &mut Vec<EdgeLine>| {
        if bucket.is_empty() {
            return;
        }
        let total: f64 = bucket.iter().map(|(_, (s, e))| e - s).sum();
        let offset = if total > 0.0 {
            bucket.iter().map(|(o, (s, e))| o * (e - s)).sum::<f64>() / total
        } else {
            bucket[0].0
        };
        let coverage =
            intervals::merge_intervals(bucket.iter().map(|(_, iv)| *iv).collect(), params.merge_gap);
        lines.push(EdgeLine {
            offset,
            side,
            coverage,
        });
        bucket.clear();
    };

    for (side, offset, interval) in projected {
        let continues = bucket
            .last()
            .map_or(false, |(last, _)| side == bucket_side && offset - last <= params.offset_tolerance);
        if !continues {
            flush(&mut bucket, bucket_side, &mut lines);
            bucket_side = side;
        }
        bucket.push((offset, interval));
    }
    flush(&mut bucket, bucket_side, &mut lines);

    lines.sort_by(|a, b| a.offset.total_cmp(&b.offset).then(a.side.cmp(&b.side)));
    lines
}

/// Greedy nearest-first pairing; returns pieces and the unpaired coverage per line
fn pair_edge_lines(lines: &[EdgeLine], params: &WallParams) -> (Vec<Piece>, Vec<Vec<Interval>>) {
    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for (i, low) in lines.iter().enumerate() {
        if low.side == DarkSide::Negative {
            continue;
        }
        for (j, high) in lines.iter().enumerate() {
            if high.side == DarkSide::Positive {
                continue;
            }
            let separation = high.offset - low.offset;
            if separation >= params.min_thickness && separation <= params.max_thickness {
                candidates.push((separation, i, j));
            }
        }
    }
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut remaining: Vec<Vec<Interval>> = lines.iter().map(|l| l.coverage.clone()).collect();
    let mut pieces = Vec::new();

    for (_, i, j) in candidates {
        let common = intervals::intersect(&remaining[i], &remaining[j]);
        let mut consumed = Vec::new();
        for (s, e) in common {
            let len = e - s;
            if len < params.min_piece_length {
                continue;
            }
            let shorter = containing_length(&remaining[i], s).min(containing_length(&remaining[j], s));
            if len < params.min_overlap_fraction * shorter {
                continue;
            }
            consumed.push((s, e));
            pieces.push(Piece {
                low_line: i,
                high_line: j,
                low_offset: lines[i].offset,
                high_offset: lines[j].offset,
                start: s,
                end: e,
            });
        }
        if !consumed.is_empty() {
            remaining[i] = intervals::subtract(&remaining[i], &consumed);
            remaining[j] = intervals::subtract(&remaining[j], &consumed);
        }
    }

    (pieces, remaining)
}

/// Length of the member interval that contains `at`
fn containing_length(set: &[Interval], at: f64) -> f64 {
    set.iter()
        .find(|(s, e)| *s <= at && at < *e)
        .map_or(0.0, |(s, e)| e - s)
}

/// Chain collinear pieces of similar thickness separated by at most one opening
fn chain_pieces(pieces: &[Piece], params: &WallParams) -> Vec<RunBuilder> {
    let mut order: Vec<&Piece> = pieces.iter().collect();
    order.sort_by(|a, b| {
        a.center()
            .total_cmp(&b.center())
            .then(a.start.total_cmp(&b.start))
    });

    let mut runs: Vec<RunBuilder> = Vec::new();
    for piece in order {
        let thickness_tolerance = (0.2 * piece.thickness()).max(2.0);
        let best = runs
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                (r.offset() - piece.center()).abs() <= params.offset_tolerance + 0.5
                    && (r.thickness() - piece.thickness()).abs() <= thickness_tolerance
                    && r.gap_to(piece) <= params.chain_gap
            })
            .min_by(|a, b| a.1.gap_to(piece).total_cmp(&b.1.gap_to(piece)))
            .map(|(i, _)| i);

        match best {
            Some(i) => runs[i].absorb(piece),
            None => runs.push(RunBuilder::from_piece(piece)),
        }
    }
    runs
}

fn faces_of(lines: &[EdgeLine], members: &[usize], merge_gap: f64) -> Vec<Interval> {
    let all = members
        .iter()
        .flat_map(|&i| lines[i].coverage.iter().copied())
        .collect();
    intervals::merge_intervals(all, merge_gap)
}

fn frame_segment(group: &OrientationGroup, offset: f64, s: f64, e: f64, side: DarkSide) -> LineSegment {
    LineSegment::with_dark_side(
        Point2D::from_frame(group.direction, group.normal, s, offset),
        Point2D::from_frame(group.direction, group.normal, e, offset),
        side,
    )
}

/// Move run ends onto the centerline of a perpendicular run they meet.
///
/// An end stopping short of a perpendicular run by at most `extend_gap` is
/// extended to it; the missing stretch then shows up as a face gap.
fn snap_junctions(runs: &mut [WallRun], tolerance: f64, extend_gap: f64) {
    let snapshot: Vec<WallRun> = runs.to_vec();

    for (ri, run) in runs.iter_mut().enumerate() {
        let (start, end) = (snapshot[ri].start, snapshot[ri].end);
        let mut best_start: Option<(f64, f64)> = None;
        let mut best_end: Option<(f64, f64)> = None;

        for (pi, other) in snapshot.iter().enumerate() {
            if pi == ri || !meets(&snapshot[ri], other, other.thickness / 2.0 + tolerance) {
                continue;
            }
            let Some(along) = junction_along(&snapshot[ri], other) else {
                continue;
            };

            let reach = other.thickness / 2.0 + tolerance;
            let start_reach = if along < start { reach.max(extend_gap) } else { reach };
            let end_reach = if along > end { reach.max(extend_gap) } else { reach };
            let d_start = (along - start).abs();
            let d_end = (along - end).abs();
            if d_start <= start_reach && best_start.map_or(true, |(d, _)| d_start < d) {
                best_start = Some((d_start, along));
            }
            if d_end <= end_reach && best_end.map_or(true, |(d, _)| d_end < d) {
                best_end = Some((d_end, along));
            }
        }

        if let Some((_, s)) = best_start {
            run.start = s;
        }
        if let Some((_, e)) = best_end {
            run.end = e;
        }
    }
}

/// Whether `other` is perpendicular to `run` and reaches its centerline
fn meets(run: &WallRun, other: &WallRun, reach: f64) -> bool {
    if orientation_difference(run.orientation(), other.orientation()) < FRAC_PI_4 {
        return false;
    }
    centerline_intersection(run, other).map_or(false, |x| {
        let along_other = x.to_vector().dot(&other.direction);
        along_other >= other.start - reach && along_other <= other.end + reach
    })
}

/// Position along `run` where the centerline of `other` crosses it
fn junction_along(run: &WallRun, other: &WallRun) -> Option<f64> {
    centerline_intersection(run, other).map(|x| x.to_vector().dot(&run.direction))
}

/// Record the band of every perpendicular run that meets or crosses a run
fn mark_junctions(runs: &mut [WallRun], tolerance: f64) {
    let bands: Vec<Vec<Interval>> = runs
        .iter()
        .enumerate()
        .map(|(ri, run)| {
            let reach = run.thickness / 2.0 + tolerance;
            let found = runs
                .iter()
                .enumerate()
                .filter(|&(oi, other)| oi != ri && meets(run, other, reach))
                .filter_map(|(_, other)| {
                    let along = junction_along(run, other)?;
                    // Band width across an oblique crossing grows with 1/sin
                    let sin = run.direction.perp(&other.direction).abs();
                    let half = other.thickness / 2.0 / sin;
                    let band = (along - half, along + half);
                    (band.1 > run.start && band.0 < run.end).then_some(band)
                })
                .collect();
            intervals::merge_intervals(found, 0.0)
        })
        .collect();

    for (run, junctions) in runs.iter_mut().zip(bands) {
        run.junctions = junctions;
    }
}

fn centerline_intersection(a: &WallRun, b: &WallRun) -> Option<Point2D> {
    let det = a.normal.x * b.normal.y - a.normal.y * b.normal.x;
    if det.abs() < 1e-9 {
        return None;
    }
    let x = (a.offset * b.normal.y - b.offset * a.normal.y) / det;
    let y = (a.normal.x * b.offset - b.normal.x * a.offset) / det;
    Some(Point2D::new(x, y))
}

/// Exterior when most sample points see the page edge on one side
fn classify_exterior(runs: &mut [WallRun], width: u32, height: u32) {
    let reach = (width as f64 + height as f64) * 2.0;
    let centerlines: Vec<(Point2D, Point2D)> = runs.iter().map(|r| r.centerline()).collect();

    let flags: Vec<bool> = runs
        .iter()
        .enumerate()
        .map(|(ri, run)| {
            let open_samples = VISIBILITY_SAMPLES
                .iter()
                .filter(|&&t| {
                    let along = run.start + run.length() * t;
                    [1.0, -1.0].iter().any(|&sign| {
                        let from = run.point_beside(along, sign * run.thickness / 2.0);
                        let to = run.point_beside(along, sign * reach);
                        !centerlines
                            .iter()
                            .enumerate()
                            .any(|(oi, (a, b))| oi != ri && segments_intersect(&from, &to, a, b))
                    })
                })
                .count();
            open_samples * 2 > VISIBILITY_SAMPLES.len()
        })
        .collect();

    for (run, exterior) in runs.iter_mut().zip(flags) {
        run.exterior = exterior;
    }
}

fn cross(o: &Point2D, a: &Point2D, b: &Point2D) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Proper or touching intersection of segments p1-p2 and q1-q2
fn segments_intersect(p1: &Point2D, p2: &Point2D, q1: &Point2D, q2: &Point2D) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);
    (d1 * d2 <= 0.0) && (d3 * d4 <= 0.0) && !(d1 == 0.0 && d2 == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_ops::extract_axis_segments;
    use crate::image_ops::INK;
    use approx::assert_relative_eq;
    use image::{GrayImage, Luma};

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, Luma([INK]));
            }
        }
    }

    /// Closed 12 px ring from 50 to 562 on a 612 px page
    fn ring_mask() -> GrayImage {
        let mut mask = GrayImage::new(612, 612);
        fill(&mut mask, 50, 50, 562, 62);
        fill(&mut mask, 50, 550, 562, 562);
        fill(&mut mask, 50, 62, 62, 550);
        fill(&mut mask, 550, 62, 562, 550);
        mask
    }

    fn detect(mask: &GrayImage) -> WallDetection {
        let scale = ScaleFactor::new(50.0).unwrap();
        let config = TakeoffConfig::default();
        let segments = extract_axis_segments(mask, scale.m_to_px(config.min_segment_length_m));
        detect_walls(&segments, mask.width(), mask.height(), &scale, &config)
    }

    #[test]
    fn test_ring_yields_four_exterior_walls() {
        let result = detect(&ring_mask());

        assert_eq!(result.runs.len(), 4);
        for run in &result.runs {
            assert_relative_eq!(run.thickness, 12.0, epsilon = 1e-9);
            assert_relative_eq!(run.length(), 500.0, epsilon = 1e-9);
            assert!(run.exterior);
            assert!(run.face_gaps().is_empty());
        }
        let total: f64 = result.runs.iter().map(|r| r.length()).sum();
        assert_relative_eq!(total, 2000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_partition_wall_is_interior() {
        let mut mask = ring_mask();
        fill(&mut mask, 62, 294, 550, 306);
        let result = detect(&mask);

        assert_eq!(result.runs.len(), 5);
        let interior: Vec<_> = result.runs.iter().filter(|r| !r.exterior).collect();
        assert_eq!(interior.len(), 1);
        assert_relative_eq!(interior[0].offset, 300.0, epsilon = 1e-9);
        assert_relative_eq!(interior[0].length(), 500.0, epsilon = 1e-9);
        // T-junctions do not break the exterior walls
        assert!(result.runs.iter().all(|r| r.face_gaps().is_empty()));
    }

    #[test]
    fn test_gap_is_chained_and_reported() {
        let mut mask = ring_mask();
        // 45 px door gap in the bottom wall
        for y in 550..562 {
            for x in 180..225 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        let result = detect(&mask);

        assert_eq!(result.runs.len(), 4);
        let bottom = result
            .runs
            .iter()
            .find(|r| (r.offset - 556.0).abs() < 1e-6)
            .unwrap();
        assert_relative_eq!(bottom.length(), 500.0, epsilon = 1e-9);
        assert_eq!(bottom.face_gaps(), vec![(180.0, 225.0)]);
        assert!(bottom.coverage_ratio() < 1.0);
    }

    #[test]
    fn test_thick_crossing_is_not_a_gap() {
        // 25 px ring split into four rooms by a 25 px cross
        let mut mask = GrayImage::new(600, 600);
        fill(&mut mask, 50, 50, 550, 75);
        fill(&mut mask, 50, 525, 550, 550);
        fill(&mut mask, 50, 75, 75, 525);
        fill(&mut mask, 525, 75, 550, 525);
        fill(&mut mask, 75, 288, 525, 313);
        fill(&mut mask, 288, 75, 313, 525);
        let result = detect(&mask);

        assert_eq!(result.runs.len(), 6);
        for run in &result.runs {
            assert!(run.face_gaps().is_empty(), "gaps {:?}", run.face_gaps());
        }
        let middle: Vec<_> = result
            .runs
            .iter()
            .filter(|r| (r.offset.abs() - 300.5).abs() < 1e-6)
            .collect();
        assert_eq!(middle.len(), 2);
        for run in middle {
            assert_eq!(run.junctions.len(), 3);
            assert!(!run.exterior);
        }
    }

    #[test]
    fn test_gap_against_corner_extends_the_run() {
        let mut mask = ring_mask();
        // 45 px gap starting at the inner face of the west wall
        for y in 550..562 {
            for x in 62..107 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        let result = detect(&mask);

        assert_eq!(result.runs.len(), 4);
        for run in &result.runs {
            assert_relative_eq!(run.length(), 500.0, epsilon = 1e-9);
        }
        let bottom = result
            .runs
            .iter()
            .find(|r| (r.offset - 556.0).abs() < 1e-6)
            .unwrap();
        let gaps = bottom.face_gaps();
        assert_eq!(gaps.len(), 1);
        assert_relative_eq!(gaps[0].0, 62.0, epsilon = 1e-9);
        assert_relative_eq!(gaps[0].1, 107.0, epsilon = 1e-9);
    }

    #[test]
    fn test_outer_ring_shields_inner_ring() {
        let mut mask = ring_mask();
        fill(&mut mask, 200, 200, 412, 212);
        fill(&mut mask, 200, 400, 412, 412);
        fill(&mut mask, 200, 212, 212, 400);
        fill(&mut mask, 400, 212, 412, 400);
        let result = detect(&mask);

        assert_eq!(result.runs.len(), 8);
        for run in &result.runs {
            let outer = run.offset.abs() < 60.0 || run.offset.abs() > 550.0;
            assert_eq!(run.exterior, outer, "run at offset {}", run.offset);
        }
        assert_eq!(result.runs.iter().filter(|r| r.exterior).count(), 4);
    }

    #[test]
    fn test_thin_and_thick_bands_are_unresolved() {
        let mut mask = GrayImage::new(400, 400);
        // 2 px stroke: too thin
        fill(&mut mask, 20, 20, 300, 22);
        // 40 px block: too thick at 50 px/m
        fill(&mut mask, 20, 100, 300, 140);
        let result = detect(&mask);

        assert!(result.runs.is_empty());
        assert!(!result.unresolved.is_empty());
        assert!(result.unresolved_length() > 0.0);
    }

    #[test]
    fn test_light_space_between_bands_is_not_a_wall() {
        let mut mask = GrayImage::new(400, 200);
        fill(&mut mask, 0, 50, 100, 60);
        fill(&mut mask, 80, 70, 200, 80);
        let result = detect(&mask);

        let mut offsets: Vec<f64> = result.runs.iter().map(|r| r.offset).collect();
        offsets.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(offsets, vec![55.0, 75.0]);
    }

    #[test]
    fn test_orientation_groups_fold_across_pi() {
        let segments = vec![
            LineSegment::new(Point2D::new(0.0, 0.0), Point2D::new(100.0, 0.5)),
            LineSegment::new(Point2D::new(100.0, 10.0), Point2D::new(0.0, 10.5)),
            LineSegment::new(Point2D::new(0.0, 0.0), Point2D::new(0.0, 100.0)),
        ];
        let groups = group_by_orientation(&segments, 0.035);
        assert_eq!(groups.len(), 2);
    }
}
