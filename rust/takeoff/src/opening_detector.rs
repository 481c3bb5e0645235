// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Opening detection: gaps in wall runs, classified by their symbols
//!
//! A gap is a stretch of a run where neither face has an ink boundary. Its
//! ends are moved onto the jambs found in the mask, so the width does not
//! depend on how precisely the segments were traced. Doors are recognised
//! by a swing arc or leaf drawn from a jamb, windows by glazing strokes
//! inside the wall band. Anything else is kept as an unclassified opening
//! with low confidence.

use crate::config::TakeoffConfig;
use crate::element::Warning;
use crate::image_ops::is_ink_at;
use crate::primitives::PagePrimitives;
use crate::scale::ScaleFactor;
use crate::wall_detector::WallRun;
use image::GrayImage;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

const ARC_BINS: usize = 10;
const LEAF_ANGLE_STEP_DEG: f64 = 3.0;
const UNCLASSIFIED_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OpeningKind {
    Door,
    Window,
    Unclassified,
}

/// An opening found in a wall run (pixel units along the run)
#[derive(Debug, Clone, PartialEq)]
pub struct OpeningCandidate {
    /// Index of the hosting run
    pub wall_index: usize,
    pub start: f64,
    pub end: f64,
    pub kind: OpeningKind,
    pub confidence: f64,
}

impl OpeningCandidate {
    pub fn width(&self) -> f64 {
        self.end - self.start
    }

    pub fn center(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// Door symbol evidence for one gap
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DoorEvidence {
    /// Share of angular bins with ink on the swing arc
    pub arc_coverage: f64,
    /// Share of the leaf length with ink
    pub leaf_span: f64,
}

/// Find and classify openings in every wall run
pub fn detect_openings(
    runs: &[WallRun],
    primitives: &PagePrimitives,
    scale: &ScaleFactor,
    config: &TakeoffConfig,
) -> Vec<OpeningCandidate> {
    let min_width = scale.m_to_px(config.min_opening_width_m);
    let max_width = scale.m_to_px(config.max_opening_width_m);

    let mut openings = Vec::new();
    for (wall_index, run) in runs.iter().enumerate() {
        for (start, end) in run.face_gaps() {
            let (start, end) = snap_to_jambs(run, start, end, &primitives.mask);
            let width = end - start;
            if width < min_width || width > max_width {
                continue;
            }
            let (kind, confidence) = classify_gap(run, start, end, primitives, config);
            openings.push(OpeningCandidate {
                wall_index,
                start,
                end,
                kind,
                confidence,
            });
        }
    }

    tracing::debug!(
        doors = openings.iter().filter(|o| o.kind == OpeningKind::Door).count(),
        windows = openings.iter().filter(|o| o.kind == OpeningKind::Window).count(),
        unclassified = openings.iter().filter(|o| o.kind == OpeningKind::Unclassified).count(),
        "Opening detection complete"
    );

    openings
}

/// Door first, then window, otherwise unclassified
pub fn classify_gap(
    run: &WallRun,
    start: f64,
    end: f64,
    primitives: &PagePrimitives,
    config: &TakeoffConfig,
) -> (OpeningKind, f64) {
    let door = door_evidence(run, start, end, &primitives.mask, config);
    let arc_hit = door.arc_coverage >= config.door_arc_min_coverage;
    let leaf_hit = door.leaf_span >= config.door_leaf_min_span;
    if arc_hit || leaf_hit {
        let strength = match (arc_hit, leaf_hit) {
            (true, true) => 1.0,
            (true, false) => door.arc_coverage,
            _ => door.leaf_span,
        };
        return (OpeningKind::Door, 0.6 + 0.3 * strength);
    }

    let span = window_span(run, start, end, &primitives.mask);
    if span >= config.window_symbol_min_span {
        return (OpeningKind::Window, 0.6 + 0.3 * span.min(1.0));
    }

    (OpeningKind::Unclassified, UNCLASSIFIED_CONFIDENCE)
}

/// Best swing evidence over both jambs and both wall faces
pub fn door_evidence(
    run: &WallRun,
    start: f64,
    end: f64,
    mask: &GrayImage,
    config: &TakeoffConfig,
) -> DoorEvidence {
    let radius = end - start;
    let mut best = DoorEvidence::default();

    for (hinge, toward) in [(start, run.direction), (end, -run.direction)] {
        for side in [1.0, -1.0] {
            let origin = run.point_beside(hinge, side * run.thickness / 2.0).to_vector();
            let away = run.normal * side;

            let arc = arc_coverage(mask, origin, toward, away, radius, config);
            let leaf = leaf_span(mask, origin, toward, away, radius, config.door_leaf_min_angle_deg);
            best.arc_coverage = best.arc_coverage.max(arc);
            best.leaf_span = best.leaf_span.max(leaf);
        }
    }

    best
}

/// Quarter arc from the closed to the open leaf position, sampled in angular bins
fn arc_coverage(
    mask: &GrayImage,
    origin: Vector2<f64>,
    toward: Vector2<f64>,
    away: Vector2<f64>,
    radius: f64,
    config: &TakeoffConfig,
) -> f64 {
    let r_min = radius * (1.0 - config.door_arc_radius_tolerance);
    let r_max = radius * (1.0 + config.door_arc_radius_tolerance);
    let first_deg = config.door_arc_start_deg;
    let bin_width = (config.door_arc_end_deg - first_deg) / ARC_BINS as f64;

    let hits = (0..ARC_BINS)
        .filter(|&bin| {
            let lo = first_deg + bin as f64 * bin_width;
            let steps = bin_width.ceil().max(1.0) as usize;
            (0..steps).any(|k| {
                let phi = (lo + k as f64 * bin_width / steps as f64).to_radians();
                let dir = toward * phi.cos() + away * phi.sin();
                let mut r = r_min;
                while r <= r_max {
                    let p = origin + dir * r;
                    if is_ink_at(mask, p.x, p.y) {
                        return true;
                    }
                    r += 1.0;
                }
                false
            })
        })
        .count();

    hits as f64 / ARC_BINS as f64
}

/// Longest inked radial line from the hinge, as a share of the radius
fn leaf_span(
    mask: &GrayImage,
    origin: Vector2<f64>,
    toward: Vector2<f64>,
    away: Vector2<f64>,
    radius: f64,
    min_angle_deg: f64,
) -> f64 {
    let first = 0.15 * radius;
    let samples = ((radius - first).max(1.0)).ceil() as usize;

    let mut best: f64 = 0.0;
    let mut deg = min_angle_deg;
    while deg <= 90.0 {
        let phi = deg.to_radians();
        let dir = toward * phi.cos() + away * phi.sin();
        let inked = (0..samples)
            .filter(|&k| {
                let p = origin + dir * (first + k as f64);
                is_ink_at(mask, p.x, p.y)
            })
            .count();
        best = best.max(inked as f64 / samples as f64);
        deg += LEAF_ANGLE_STEP_DEG;
    }
    best
}

/// Longest stretch of the gap with ink inside the wall band, as a share of the gap
pub fn window_span(run: &WallRun, start: f64, end: f64, mask: &GrayImage) -> f64 {
    let width = end - start;
    if width <= 0.0 {
        return 0.0;
    }
    let band = (run.thickness / 2.0 - 1.0).max(0.5);
    let rows = (2.0 * band).floor() as usize;
    let columns = width.round().max(1.0) as usize;

    // Glazing strokes run along the gap; the best single stretch counts
    let mut longest = 0usize;
    let mut current = 0usize;
    for k in 0..columns {
        let along = start + (k as f64 + 0.5) * width / columns as f64;
        let inked = (0..=rows).any(|j| {
            let p = run.point_beside(along, -band + j as f64);
            is_ink_at(mask, p.x, p.y)
        });
        current = if inked { current + 1 } else { 0 };
        longest = longest.max(current);
    }
    longest as f64 / columns as f64
}

/// Move both gap ends onto the nearest jamb, where the wall band is solid ink
pub fn snap_to_jambs(run: &WallRun, start: f64, end: f64, mask: &GrayImage) -> (f64, f64) {
    let depth = (run.thickness / 4.0).max(0.5);
    let solid = |along: f64| {
        [depth, -depth].iter().all(|&across| {
            let p = run.point_beside(along, across);
            is_ink_at(mask, p.x, p.y)
        })
    };
    let search = run.thickness.ceil().max(1.0) as usize;
    let inward_limit = ((end - start) / 2.0).floor().max(0.0) as usize;

    let jamb = |bound: f64, outward: f64| -> f64 {
        let mut b = bound.round();
        if solid(b + 0.5 * outward) {
            // Bound sits inside the jamb: walk into the gap until it opens
            for _ in 0..inward_limit {
                if !solid(b - 0.5 * outward) {
                    return b;
                }
                b -= outward;
            }
            bound
        } else {
            for _ in 0..search {
                b += outward;
                if solid(b + 0.5 * outward) {
                    return b;
                }
            }
            bound
        }
    };

    let snapped_start = jamb(start, -1.0).max(run.start);
    let snapped_end = jamb(end, 1.0).min(run.end);
    if snapped_end > snapped_start {
        (snapped_start, snapped_end)
    } else {
        (start, end)
    }
}

/// Flag a wall whose hosted openings are wider in total than the wall is long.
///
/// Callers pass door and window widths only; unclassified openings are not
/// elements and never count towards the warning.
pub fn hosted_width_warning(wall_length_m: f64, opening_widths_m: &[f64]) -> Option<Warning> {
    let mut widths = opening_widths_m.to_vec();
    widths.sort_by(|a, b| a.total_cmp(b));
    let total: f64 = widths.iter().sum();
    (total > wall_length_m + 1e-9).then_some(Warning::OpeningsExceedWallLength {
        openings_width_m: total,
        wall_length_m,
    })
}
