// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Detected building elements and the read-only element table

use crate::types::{BoundingBox, Point2D};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fixed set of element categories
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum ElementCategory {
    ExteriorWall,
    InteriorWall,
    Window,
    Door,
    Column,
    Beam,
    Slab,
    Footing,
}

impl ElementCategory {
    pub const ALL: [ElementCategory; 8] = [
        ElementCategory::ExteriorWall,
        ElementCategory::InteriorWall,
        ElementCategory::Window,
        ElementCategory::Door,
        ElementCategory::Column,
        ElementCategory::Beam,
        ElementCategory::Slab,
        ElementCategory::Footing,
    ];

    /// Ledger group: both wall kinds roll up into "Wall"
    pub fn group(&self) -> &'static str {
        match self {
            ElementCategory::ExteriorWall | ElementCategory::InteriorWall => "Wall",
            ElementCategory::Window => "Window",
            ElementCategory::Door => "Door",
            ElementCategory::Column => "Column",
            ElementCategory::Beam => "Beam",
            ElementCategory::Slab => "Slab",
            ElementCategory::Footing => "Footing",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ElementCategory::ExteriorWall => "Exterior wall",
            ElementCategory::InteriorWall => "Interior wall",
            ElementCategory::Window => "Window",
            ElementCategory::Door => "Door",
            ElementCategory::Column => "Column",
            ElementCategory::Beam => "Beam",
            ElementCategory::Slab => "Slab",
            ElementCategory::Footing => "Footing",
        }
    }

    pub fn is_wall(&self) -> bool {
        matches!(self, ElementCategory::ExteriorWall | ElementCategory::InteriorWall)
    }

    pub fn is_opening(&self) -> bool {
        matches!(self, ElementCategory::Window | ElementCategory::Door)
    }

    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ElementCategory::Column
                | ElementCategory::Beam
                | ElementCategory::Slab
                | ElementCategory::Footing
        )
    }
}

impl fmt::Display for ElementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Stable element identifier: page index plus a per-page sequence number
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct ElementId {
    pub page: usize,
    pub seq: u32,
}

impl ElementId {
    pub fn new(page: usize, seq: u32) -> Self {
        Self { page, seq }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}-{}", self.page, self.seq)
    }
}

/// Element geometry in pixel coordinates of its source page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementGeometry {
    /// Walls and beams
    Centerline { start: Point2D, end: Point2D },
    /// Columns, slabs and footings
    Polygon { points: Vec<Point2D> },
    /// Openings: centre of the gap on the wall centerline
    PointWidth { position: Point2D, width_px: f64 },
}

impl ElementGeometry {
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            ElementGeometry::Centerline { start, end } => BoundingBox::from_points(&[*start, *end]),
            ElementGeometry::Polygon { points } => BoundingBox::from_points(points),
            ElementGeometry::PointWidth { position, width_px } => {
                Some(BoundingBox::from_points(&[*position])?.expanded(width_px / 2.0))
            }
        }
    }
}

/// Real-world measurements; only the subset meaningful for the category is set
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Measurements {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_m2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_m3: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thickness_m: Option<f64>,
}

/// Non-fatal consistency problem attached to an element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Openings hosted by this wall are wider in total than the wall is long
    OpeningsExceedWallLength {
        openings_width_m: f64,
        wall_length_m: f64,
    },
    /// Footprint overlaps another solid element
    OverlappingFootprint { other: ElementId },
    /// A dimension annotation disagrees with the measured length
    DimensionMismatch { annotated_m: f64, measured_m: f64 },
    /// Length was replaced by an annotated dimension
    DimensionOverridden { annotated_m: f64, measured_m: f64 },
}

/// A classified, measured building element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedElement {
    pub id: ElementId,
    pub category: ElementCategory,
    pub geometry: ElementGeometry,
    pub measurements: Measurements,
    /// Detection certainty in `[0, 1]`
    pub confidence: f64,
    pub source_page: usize,
    /// Wall interrupted by this opening
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_wall: Option<ElementId>,
    /// Distance from the parent wall's start point to the opening's near edge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_along_wall_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl DetectedElement {
    pub fn new(
        id: ElementId,
        category: ElementCategory,
        geometry: ElementGeometry,
        measurements: Measurements,
        confidence: f64,
    ) -> Self {
        Self {
            id,
            category,
            geometry,
            measurements,
            confidence: confidence.clamp(0.0, 1.0),
            source_page: id.page,
            parent_wall: None,
            offset_along_wall_m: None,
            warnings: Vec::new(),
        }
    }

    pub fn hosted_by(mut self, wall: ElementId, offset_m: f64) -> Self {
        self.parent_wall = Some(wall);
        self.offset_along_wall_m = Some(offset_m);
        self
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = Warning>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// What kind of candidate could not be classified
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnclassifiedKind {
    Opening,
    Region,
}

/// Low-confidence detection kept for review, outside the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnclassifiedDetection {
    pub kind: UnclassifiedKind,
    pub source_page: usize,
    pub geometry: ElementGeometry,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_m2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_wall: Option<ElementId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_along_wall_m: Option<f64>,
}

/// Read-only, id-indexed collection of detected elements.
///
/// Built once from a detection pass; filters and merges return new sets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ElementSet {
    elements: Vec<DetectedElement>,
    #[serde(skip)]
    index: FxHashMap<ElementId, usize>,
}

impl ElementSet {
    pub fn new(elements: Vec<DetectedElement>) -> Self {
        let index = elements
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();
        Self { elements, index }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Concatenate sets in the given order
    pub fn merge(sets: impl IntoIterator<Item = ElementSet>) -> Self {
        let elements = sets.into_iter().flat_map(|s| s.elements).collect();
        Self::new(elements)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectedElement> {
        self.elements.iter()
    }

    pub fn as_slice(&self) -> &[DetectedElement] {
        &self.elements
    }

    pub fn get(&self, id: ElementId) -> Option<&DetectedElement> {
        self.index.get(&id).map(|&i| &self.elements[i])
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn by_category(&self, category: ElementCategory) -> impl Iterator<Item = &DetectedElement> {
        self.elements.iter().filter(move |e| e.category == category)
    }

    pub fn walls(&self) -> impl Iterator<Item = &DetectedElement> {
        self.elements.iter().filter(|e| e.category.is_wall())
    }

    pub fn openings_of(&self, wall: ElementId) -> impl Iterator<Item = &DetectedElement> {
        self.elements
            .iter()
            .filter(move |e| e.category.is_opening() && e.parent_wall == Some(wall))
    }

    pub fn for_page(&self, page: usize) -> ElementSet {
        self.filtered(|e| e.source_page == page)
    }

    /// Keep elements with confidence at or above `min_confidence`
    pub fn filter_by_confidence(&self, min_confidence: f64) -> ElementSet {
        self.filtered(|e| e.confidence >= min_confidence)
    }

    pub fn filter_by_categories(&self, categories: &[ElementCategory]) -> ElementSet {
        self.filtered(|e| categories.contains(&e.category))
    }

    pub fn filtered(&self, keep: impl Fn(&DetectedElement) -> bool) -> ElementSet {
        ElementSet::new(self.elements.iter().filter(|e| keep(e)).cloned().collect())
    }

    /// Element count per category, every category present
    pub fn counts(&self) -> BTreeMap<ElementCategory, usize> {
        let mut counts: BTreeMap<ElementCategory, usize> =
            ElementCategory::ALL.iter().map(|c| (*c, 0)).collect();
        for e in &self.elements {
            *counts.entry(e.category).or_default() += 1;
        }
        counts
    }
}

impl<'a> IntoIterator for &'a ElementSet {
    type Item = &'a DetectedElement;
    type IntoIter = std::slice::Iter<'a, DetectedElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall(seq: u32, confidence: f64) -> DetectedElement {
        DetectedElement::new(
            ElementId::new(0, seq),
            ElementCategory::ExteriorWall,
            ElementGeometry::Centerline {
                start: Point2D::new(0.0, 0.0),
                end: Point2D::new(100.0, 0.0),
            },
            Measurements {
                length_m: Some(2.0),
                ..Default::default()
            },
            confidence,
        )
    }

    fn door(seq: u32, host: ElementId) -> DetectedElement {
        DetectedElement::new(
            ElementId::new(0, seq),
            ElementCategory::Door,
            ElementGeometry::PointWidth {
                position: Point2D::new(50.0, 0.0),
                width_px: 45.0,
            },
            Measurements {
                count: Some(1),
                width_m: Some(0.9),
                ..Default::default()
            },
            0.7,
        )
        .hosted_by(host, 0.5)
    }

    #[test]
    fn test_lookup_and_openings() {
        let set = ElementSet::new(vec![wall(0, 0.9), door(1, ElementId::new(0, 0))]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(ElementId::new(0, 1)).unwrap().category, ElementCategory::Door);
        assert!(set.get(ElementId::new(1, 0)).is_none());
        assert_eq!(set.openings_of(ElementId::new(0, 0)).count(), 1);
        assert_eq!(set.walls().count(), 1);
    }

    #[test]
    fn test_filters_return_new_sets() {
        let set = ElementSet::new(vec![wall(0, 0.9), wall(1, 0.2)]);
        let confident = set.filter_by_confidence(0.5);

        assert_eq!(confident.len(), 1);
        assert_eq!(set.len(), 2);
        assert!(confident.get(ElementId::new(0, 1)).is_none());

        let doors = set.filter_by_categories(&[ElementCategory::Door]);
        assert!(doors.is_empty());
    }

    #[test]
    fn test_counts_include_every_category() {
        let counts = ElementSet::empty().counts();
        assert_eq!(counts.len(), ElementCategory::ALL.len());
        assert!(counts.values().all(|&c| c == 0));
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(wall(0, 1.7).confidence, 1.0);
        assert_eq!(wall(0, -0.2).confidence, 0.0);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(ElementId::new(3, 12).to_string(), "p3-12");
    }
}
