// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structural element detection from filled and hatched regions
//!
//! Dark components are reduced to shape features and passed through a pure
//! classifier ([`classify_region`]). Slabs come from the light side instead:
//! room-like regions enclosed by ink once small gaps are sealed.

use crate::config::TakeoffConfig;
use crate::contour_ops::{extract_regions, label_components, simplify_closed, Region};
use crate::element::{ElementCategory, ElementGeometry, Measurements, UnclassifiedDetection, UnclassifiedKind};
use crate::image_ops::{invert, morphological_close};
use crate::primitives::PagePrimitives;
use crate::scale::ScaleFactor;
use crate::types::{BoundingBox, Point2D};

const SIMPLIFY_EPSILON_PX: f64 = 1.5;
const UNCLASSIFIED_CONFIDENCE: f64 = 0.3;

/// Shape features of one dark region, in real-world units where it matters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionFeatures {
    pub area_m2: f64,
    pub fill_ratio: f64,
    pub rectangularity: f64,
    pub aspect_ratio: f64,
    /// Region reaches the outer extent of the drawn plan
    pub touches_boundary: bool,
    /// Other ink lies just beyond both ends of the major axis
    pub supported_ends: bool,
}

/// Outcome of region classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionClass {
    /// Below the area floor
    Noise,
    /// Outlines, text and symbol strokes rather than a solid member
    Linework,
    Column,
    Beam,
    Footing,
    Unclassified,
}

/// Map region features to a class. Rules are applied in order; the first
/// match wins.
pub fn classify_region(features: &RegionFeatures, config: &TakeoffConfig, foundation: bool) -> RegionClass {
    if features.area_m2 < config.min_region_area_m2 {
        return RegionClass::Noise;
    }
    if features.fill_ratio < config.hatched_ratio_min || features.rectangularity < config.rectangularity_min {
        return RegionClass::Linework;
    }
    if features.area_m2 <= config.column_area_threshold && features.aspect_ratio <= config.column_aspect_max {
        return RegionClass::Column;
    }
    if foundation {
        return RegionClass::Footing;
    }
    if features.aspect_ratio >= config.beam_aspect_ratio_min
        && !features.touches_boundary
        && features.supported_ends
    {
        return RegionClass::Beam;
    }
    if features.touches_boundary {
        return RegionClass::Footing;
    }
    RegionClass::Unclassified
}

/// A classified structural element before ids are assigned
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralCandidate {
    pub category: ElementCategory,
    pub geometry: ElementGeometry,
    pub measurements: Measurements,
    pub confidence: f64,
    /// Footprint in pixel coordinates
    pub footprint: BoundingBox,
    /// Oriented extents in pixels: (length, width)
    pub extents: (f64, f64),
    /// Indices of other candidates whose footprint overlaps this one
    pub overlaps: Vec<usize>,
}

/// Structural detection result for one page
#[derive(Debug, Clone, Default)]
pub struct StructuralDetection {
    pub candidates: Vec<StructuralCandidate>,
    pub unclassified: Vec<UnclassifiedDetection>,
    pub linework_skipped: usize,
    pub noise_skipped: usize,
}

/// Detect columns, beams, footings and slabs on one page
pub fn detect_structural(
    primitives: &PagePrimitives,
    scale: &ScaleFactor,
    config: &TakeoffConfig,
    foundation: bool,
    page: usize,
) -> StructuralDetection {
    let mut result = StructuralDetection::default();
    let plan = plan_extent(&primitives.regions);
    let support_gap = scale.m_to_px(config.beam_support_gap_m).max(1.0);

    for region in &primitives.regions {
        let features = RegionFeatures {
            area_m2: scale.px2_to_m2(region.area_px),
            fill_ratio: region.fill_ratio(),
            rectangularity: region.rectangularity(),
            aspect_ratio: region.oriented.aspect_ratio(),
            touches_boundary: plan.map_or(false, |p| touches(&region.bbox, &p)),
            supported_ends: supported_at_both_ends(region, primitives, support_gap),
        };

        match classify_region(&features, config, foundation) {
            RegionClass::Noise => result.noise_skipped += 1,
            RegionClass::Linework => result.linework_skipped += 1,
            RegionClass::Column => {
                let confidence = if features.fill_ratio >= config.filled_ratio_min { 0.75 } else { 0.6 };
                result.candidates.push(column(region, scale, config, confidence));
            }
            RegionClass::Beam => result.candidates.push(beam(region, scale, config)),
            RegionClass::Footing => {
                let confidence = if foundation { 0.75 } else { 0.6 };
                result.candidates.push(footing(region, scale, config, confidence));
            }
            RegionClass::Unclassified => result.unclassified.push(UnclassifiedDetection {
                kind: UnclassifiedKind::Region,
                source_page: page,
                geometry: polygon_of(region),
                confidence: UNCLASSIFIED_CONFIDENCE,
                width_m: Some(scale.px_to_m(region.oriented.width)),
                area_m2: Some(features.area_m2),
                parent_wall: None,
                offset_along_wall_m: None,
            }),
        }
    }

    flag_overlaps(&mut result.candidates, config.overlap_warning_share);

    if !foundation {
        result.candidates.extend(detect_slabs(primitives, scale, config));
    }

    tracing::debug!(
        candidates = result.candidates.len(),
        unclassified = result.unclassified.len(),
        linework = result.linework_skipped,
        noise = result.noise_skipped,
        "Structural detection complete"
    );

    result
}

/// Light regions enclosed by ink after sealing openings narrower than the seal width
pub fn detect_slabs(
    primitives: &PagePrimitives,
    scale: &ScaleFactor,
    config: &TakeoffConfig,
) -> Vec<StructuralCandidate> {
    let radius = (scale.m_to_px(config.slab_gap_seal_m) / 2.0).ceil().clamp(1.0, u8::MAX as f64) as u8;
    let sealed = morphological_close(&primitives.mask, radius);
    let rooms = invert(&sealed);
    let labels = label_components(&rooms);

    extract_regions(&rooms, &labels)
        .into_iter()
        .filter(|r| !r.touches_border)
        .filter_map(|r| {
            let area_m2 = scale.px2_to_m2(r.area_px);
            let dark_share = 1.0 - r.fill_ratio();
            if area_m2 < config.slab_min_area_m2 || dark_share > config.slab_fill_max {
                return None;
            }
            Some(StructuralCandidate {
                category: ElementCategory::Slab,
                geometry: polygon_of(&r),
                measurements: Measurements {
                    area_m2: Some(area_m2),
                    volume_m3: Some(area_m2 * config.slab_thickness),
                    thickness_m: Some(config.slab_thickness),
                    ..Default::default()
                },
                confidence: 0.6,
                footprint: r.bbox,
                extents: (r.oriented.length, r.oriented.width),
                overlaps: Vec::new(),
            })
        })
        .collect()
}

fn column(region: &Region, scale: &ScaleFactor, config: &TakeoffConfig, confidence: f64) -> StructuralCandidate {
    let area_m2 = scale.px2_to_m2(region.area_px);
    StructuralCandidate {
        category: ElementCategory::Column,
        geometry: polygon_of(region),
        measurements: Measurements {
            area_m2: Some(area_m2),
            volume_m3: Some(area_m2 * config.wall_height),
            count: Some(1),
            width_m: Some(scale.px_to_m(region.oriented.length)),
            thickness_m: Some(scale.px_to_m(region.oriented.width)),
            ..Default::default()
        },
        confidence,
        footprint: region.bbox,
        extents: (region.oriented.length, region.oriented.width),
        overlaps: Vec::new(),
    }
}

fn beam(region: &Region, scale: &ScaleFactor, config: &TakeoffConfig) -> StructuralCandidate {
    let length_m = scale.px_to_m(region.oriented.length);
    let width_m = scale.px_to_m(region.oriented.width);
    let (start, end) = region.oriented.axis_endpoints();
    StructuralCandidate {
        category: ElementCategory::Beam,
        geometry: ElementGeometry::Centerline { start, end },
        measurements: Measurements {
            length_m: Some(length_m),
            area_m2: Some(length_m * width_m),
            volume_m3: Some(width_m * config.beam_depth * length_m),
            width_m: Some(width_m),
            thickness_m: Some(config.beam_depth),
            ..Default::default()
        },
        confidence: 0.65,
        footprint: region.bbox,
        extents: (region.oriented.length, region.oriented.width),
        overlaps: Vec::new(),
    }
}

fn footing(region: &Region, scale: &ScaleFactor, config: &TakeoffConfig, confidence: f64) -> StructuralCandidate {
    let area_m2 = scale.px2_to_m2(region.area_px);
    StructuralCandidate {
        category: ElementCategory::Footing,
        geometry: polygon_of(region),
        measurements: Measurements {
            area_m2: Some(area_m2),
            volume_m3: Some(area_m2 * config.footing_thickness),
            width_m: Some(scale.px_to_m(region.oriented.width)),
            thickness_m: Some(config.footing_thickness),
            ..Default::default()
        },
        confidence,
        footprint: region.bbox,
        extents: (region.oriented.length, region.oriented.width),
        overlaps: Vec::new(),
    }
}

fn polygon_of(region: &Region) -> ElementGeometry {
    ElementGeometry::Polygon {
        points: simplify_closed(&region.contour.points, SIMPLIFY_EPSILON_PX),
    }
}

/// Union of all region boxes
fn plan_extent(regions: &[Region]) -> Option<BoundingBox> {
    let mut iter = regions.iter().map(|r| r.bbox);
    let first = iter.next()?;
    Some(iter.fold(first, |acc, b| BoundingBox {
        min_x: acc.min_x.min(b.min_x),
        min_y: acc.min_y.min(b.min_y),
        max_x: acc.max_x.max(b.max_x),
        max_y: acc.max_y.max(b.max_y),
    }))
}

fn touches(bbox: &BoundingBox, plan: &BoundingBox) -> bool {
    bbox.min_x <= plan.min_x + 1.0
        || bbox.min_y <= plan.min_y + 1.0
        || bbox.max_x >= plan.max_x - 1.0
        || bbox.max_y >= plan.max_y - 1.0
}

/// Whether ink of another component lies within `gap` beyond each axis end
fn supported_at_both_ends(region: &Region, primitives: &PagePrimitives, gap: f64) -> bool {
    let oriented = &region.oriented;
    let (a, b) = oriented.axis_endpoints();
    let across = nalgebra::Vector2::new(-oriented.axis.y, oriented.axis.x);
    let lateral = [-oriented.width / 4.0, 0.0, oriented.width / 4.0];

    let supported = |end: Point2D, outward: nalgebra::Vector2<f64>| {
        // Axis endpoints are pixel centres; shift to pixel-corner coordinates
        let origin = end.to_vector() + nalgebra::Vector2::new(0.5, 0.5);
        let steps = gap.ceil() as usize;
        lateral.iter().any(|&side| {
            (0..steps).any(|k| {
                let p = origin + outward * (k as f64 + 0.5) + across * side;
                let label = primitives.label_at(p.x.floor() as i64, p.y.floor() as i64);
                label != 0 && label != region.label
            })
        })
    };

    supported(a, -oriented.axis) && supported(b, oriented.axis)
}

/// Record pairwise footprint overlaps above `share` of the smaller footprint
fn flag_overlaps(candidates: &mut [StructuralCandidate], share: f64) {
    let n = candidates.len();
    let mut pairs = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let a = &candidates[i].footprint;
            let b = &candidates[j].footprint;
            let shared = a.intersection_area(b);
            let smaller = a.area().min(b.area());
            if smaller > 0.0 && shared > share * smaller {
                pairs.push((i, j));
            }
        }
    }
    for (i, j) in pairs {
        candidates[i].overlaps.push(j);
        candidates[j].overlaps.push(i);
    }
}
