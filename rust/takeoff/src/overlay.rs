// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Optional dimension overlay
//!
//! Recognised dimension texts are matched to the nearest wall on their page
//! and compared against the measured length. Detection never depends on
//! annotations; the overlay only adds warnings or, when enabled, replaces
//! lengths, and always returns a new element set.

use crate::config::TakeoffConfig;
use crate::element::{DetectedElement, ElementGeometry, ElementId, ElementSet, Warning};
use crate::line_ops::point_to_line_distance;
use crate::opening_detector::hosted_width_warning;
use crate::types::DimensionAnnotation;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

const DIMENSION_PATTERN: &str = r"^\s*(\d+(?:[.,]\d+)?)\s*(mm|cm|m)?\s*$";

fn dimension_regex() -> Option<&'static Regex> {
    static DIMENSION: OnceLock<Option<Regex>> = OnceLock::new();
    DIMENSION.get_or_init(|| Regex::new(DIMENSION_PATTERN).ok()).as_ref()
}

/// Parse a dimension text into metres.
///
/// Accepts `m`, `cm` and `mm` suffixes with either decimal separator.
/// Without a unit, a value with a decimal part is read as metres and an
/// integer as centimetres ("3,50" → 3.5 m, "350" → 3.5 m).
pub fn parse_dimension(text: &str) -> Option<f64> {
    let caps = dimension_regex()?.captures(text)?;
    let number = caps.get(1)?.as_str();
    let value: f64 = number.replace(',', ".").parse().ok()?;
    let metres = match caps.get(2).map(|m| m.as_str()) {
        Some("m") => value,
        Some("cm") => value / 100.0,
        Some("mm") => value / 1000.0,
        _ if number.contains(['.', ',']) => value,
        _ => value / 100.0,
    };
    (metres > 0.0).then_some(metres)
}

/// Apply dimension annotations to an element set.
///
/// `pixels_per_meter` maps page index to that page's scale factor; pages
/// without an entry are skipped.
pub fn apply_overlay(
    elements: &ElementSet,
    annotations: &[DimensionAnnotation],
    pixels_per_meter: &FxHashMap<usize, f64>,
    config: &TakeoffConfig,
) -> ElementSet {
    // Nearest annotation per wall: (distance px, annotated metres)
    let mut matches: FxHashMap<ElementId, (f64, f64)> = FxHashMap::default();

    for annotation in annotations {
        let Some(value_m) = parse_dimension(&annotation.text) else {
            tracing::debug!(text = %annotation.text, "Skipping unparseable dimension");
            continue;
        };
        let Some(&ppm) = pixels_per_meter.get(&annotation.page) else {
            continue;
        };
        let radius = config.dimension_search_radius_m * ppm;

        let nearest = elements
            .walls()
            .filter(|w| w.source_page == annotation.page)
            .filter_map(|w| match w.geometry {
                ElementGeometry::Centerline { start, end } => {
                    Some((w.id, point_to_line_distance(&annotation.anchor, &start, &end)))
                }
                _ => None,
            })
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        if let Some((wall, distance)) = nearest {
            let better = matches.get(&wall).map_or(true, |(d, _)| distance < *d);
            if better {
                matches.insert(wall, (distance, value_m));
            }
        }
    }

    let mut updated: Vec<DetectedElement> = elements
        .iter()
        .map(|e| match matches.get(&e.id) {
            Some(&(_, annotated)) => reconcile_wall(e, annotated, config),
            None => e.clone(),
        })
        .collect();

    if config.dimension_override {
        recheck_hosted_widths(&mut updated, &matches);
    }

    ElementSet::new(updated)
}

fn reconcile_wall(wall: &DetectedElement, annotated_m: f64, config: &TakeoffConfig) -> DetectedElement {
    let Some(measured_m) = wall.measurements.length_m else {
        return wall.clone();
    };
    let deviation = (annotated_m - measured_m).abs() / measured_m.max(f64::EPSILON);
    if deviation <= config.dimension_tolerance {
        return wall.clone();
    }

    let mut wall = wall.clone();
    if config.dimension_override {
        wall.measurements.length_m = Some(annotated_m);
        if let Some(t) = wall.measurements.thickness_m {
            wall.measurements.area_m2 = Some(annotated_m * t);
        }
        wall.warnings.push(Warning::DimensionOverridden {
            annotated_m,
            measured_m,
        });
    } else {
        tracing::warn!(
            wall = %wall.id,
            annotated_m,
            measured_m,
            "Dimension annotation disagrees with measured length"
        );
        wall.warnings.push(Warning::DimensionMismatch {
            annotated_m,
            measured_m,
        });
    }
    wall
}

/// Re-evaluate the hosted-width warning of walls whose length changed.
///
/// Hosted elements are doors and windows, the same set the page pass checks.
fn recheck_hosted_widths(elements: &mut [DetectedElement], changed: &FxHashMap<ElementId, (f64, f64)>) {
    let mut widths: FxHashMap<ElementId, Vec<f64>> = FxHashMap::default();
    for e in elements.iter() {
        if let (Some(host), Some(w)) = (e.parent_wall, e.measurements.width_m) {
            widths.entry(host).or_default().push(w);
        }
    }

    for wall in elements.iter_mut().filter(|e| changed.contains_key(&e.id)) {
        let Some(length) = wall.measurements.length_m else {
            continue;
        };
        wall.warnings
            .retain(|w| !matches!(w, Warning::OpeningsExceedWallLength { .. }));
        let hosted = widths.get(&wall.id).map(Vec::as_slice).unwrap_or(&[]);
        if let Some(warning) = hosted_width_warning(length, hosted) {
            wall.warnings.push(warning);
        }
    }
}
