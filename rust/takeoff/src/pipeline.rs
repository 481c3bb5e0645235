// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Page analysis and multi-page runs
//!
//! Every page is a pure function of its raster, scale factor and the shared
//! configuration. Pages run on rayon's pool; within a page the
//! wall → opening chain runs alongside structural detection. Results are
//! merged in page order and the ledger is built only after all pages finish.

use crate::config::TakeoffConfig;
use crate::element::{
    DetectedElement, ElementCategory, ElementGeometry, ElementId, ElementSet, Measurements,
    UnclassifiedDetection, UnclassifiedKind, Warning,
};
use crate::error::{Result, TakeoffError};
use crate::opening_detector::{detect_openings, hosted_width_warning, OpeningCandidate, OpeningKind};
use crate::overlay::apply_overlay;
use crate::primitives::extract_primitives;
use crate::quantity::QuantityLedger;
use crate::scale::{resolve_for_raster, DrawingScale, ScaleFactor};
use crate::structural_detector::{detect_structural, StructuralCandidate, StructuralDetection};
use crate::types::{BoundingBox, DimensionAnnotation, PageRaster, Point2D};
use crate::wall_detector::{detect_walls, WallDetection, WallRun};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Per-page counters for everything that did not become an element
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PageDiagnostics {
    pub segments: usize,
    pub unresolved_segments: usize,
    pub unresolved_length_m: f64,
    pub paired_pieces: usize,
    pub linework_skipped: usize,
    pub noise_skipped: usize,
    /// Wall runs that turned out to be the edges of a solid member
    pub walls_superseded: usize,
    /// Openings dropped because their host run was superseded
    pub orphaned_openings: usize,
    /// Zero-width or zero-height raster; the page has no elements
    pub empty_raster: bool,
    pub timed_out: bool,
}

/// Result of one page pass
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub page: usize,
    pub pixels_per_meter: f64,
    pub elements: ElementSet,
    pub unclassified: Vec<UnclassifiedDetection>,
    pub diagnostics: PageDiagnostics,
}

impl PageResult {
    /// A page that contributes nothing but its diagnostics
    fn without_elements(page: usize, pixels_per_meter: f64, diagnostics: PageDiagnostics) -> Self {
        Self {
            page,
            pixels_per_meter,
            elements: ElementSet::empty(),
            unclassified: Vec::new(),
            diagnostics,
        }
    }
}

/// Result of a complete run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub pages: Vec<PageResult>,
    /// All pages merged in page order
    pub elements: ElementSet,
    pub ledger: QuantityLedger,
}

impl AnalysisReport {
    /// Cross-check wall lengths against dimension annotations.
    ///
    /// Returns a new report; the ledger is rebuilt when lengths may change.
    pub fn with_overlay(&self, annotations: &[DimensionAnnotation], config: &TakeoffConfig) -> Self {
        let scales: FxHashMap<usize, f64> = self
            .pages
            .iter()
            .map(|p| (p.page, p.pixels_per_meter))
            .collect();
        let elements = apply_overlay(&self.elements, annotations, &scales, config);
        let pages = self
            .pages
            .iter()
            .map(|p| PageResult {
                elements: elements.for_page(p.page),
                ..p.clone()
            })
            .collect();
        let ledger = QuantityLedger::from_elements(&elements, config);
        Self {
            pages,
            elements,
            ledger,
        }
    }

    pub fn unclassified(&self) -> impl Iterator<Item = &UnclassifiedDetection> {
        self.pages.iter().flat_map(|p| p.unclassified.iter())
    }
}

/// Configured analyzer for a drawing set
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: TakeoffConfig,
    scale: Option<DrawingScale>,
}

impl Analyzer {
    /// Validates the configuration up front
    pub fn new(config: TakeoffConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, scale: None })
    }

    pub fn with_scale(mut self, scale: &str) -> Result<Self> {
        self.scale = Some(DrawingScale::parse(scale)?);
        Ok(self)
    }

    pub fn set_scale(&mut self, scale: DrawingScale) {
        self.scale = Some(scale);
    }

    pub fn config(&self) -> &TakeoffConfig {
        &self.config
    }

    pub fn scale(&self) -> Option<&DrawingScale> {
        self.scale.as_ref()
    }

    /// Analyze the selected pages.
    ///
    /// Scale and resolution problems fail the run before any page work.
    pub fn analyze(&self, pages: &[PageRaster]) -> Result<AnalysisReport> {
        let scale = self
            .scale
            .as_ref()
            .ok_or_else(|| TakeoffError::InvalidScale("no drawing scale set".into()))?;

        let mut jobs: Vec<(usize, &PageRaster, ScaleFactor)> = Vec::new();
        for (index, raster) in pages.iter().enumerate() {
            if !self.config.includes_page(index) {
                continue;
            }
            jobs.push((index, raster, resolve_for_raster(scale, raster, &self.config)?));
        }

        let start = Instant::now();
        tracing::info!(pages = jobs.len(), scale = %scale, "Starting analysis");

        let results: Vec<PageResult> = jobs
            .par_iter()
            .map(|(index, raster, factor)| analyze_page(*index, raster, factor, &self.config))
            .collect();

        let elements = ElementSet::merge(results.iter().map(|r| r.elements.clone()));
        let ledger = QuantityLedger::from_elements(&elements, &self.config);

        tracing::info!(
            pages = results.len(),
            elements = elements.len(),
            timed_out = results.iter().filter(|r| r.diagnostics.timed_out).count(),
            elapsed_ms = start.elapsed().as_millis(),
            "Analysis complete"
        );

        Ok(AnalysisReport {
            pages: results,
            elements,
            ledger,
        })
    }
}

/// Convenience entry: scale string, rasters and configuration in one call
pub fn analyze_pages(pages: &[PageRaster], scale: &str, config: TakeoffConfig) -> Result<AnalysisReport> {
    Analyzer::new(config)?.with_scale(scale)?.analyze(pages)
}

/// Run every detector on one page.
///
/// A page that uses up `page_timeout_ms` is discarded as a whole. The budget
/// is checked once primitives are extracted and again when the page is
/// assembled, so a zero budget always discards. An empty raster yields an
/// empty page.
pub fn analyze_page(
    page: usize,
    raster: &PageRaster,
    scale: &ScaleFactor,
    config: &TakeoffConfig,
) -> PageResult {
    let start = Instant::now();
    if raster.is_empty() {
        tracing::warn!(page, "Page raster is empty, no elements");
        let diagnostics = PageDiagnostics {
            empty_raster: true,
            ..Default::default()
        };
        return PageResult::without_elements(page, scale.pixels_per_meter(), diagnostics);
    }
    let expired = || {
        config
            .page_timeout_ms
            .map_or(false, |budget| start.elapsed() >= Duration::from_millis(budget))
    };

    tracing::info!(
        page,
        width = raster.width(),
        height = raster.height(),
        pixels_per_meter = scale.pixels_per_meter(),
        foundation = raster.foundation,
        "Analyzing page"
    );

    let primitives = extract_primitives(raster, scale, config);
    if expired() {
        return timed_out(page, scale, config, start);
    }

    let ((walls, openings), structural) = rayon::join(
        || {
            let walls = detect_walls(
                &primitives.segments,
                primitives.width(),
                primitives.height(),
                scale,
                config,
            );
            let openings = detect_openings(&walls.runs, &primitives, scale, config);
            (walls, openings)
        },
        || detect_structural(&primitives, scale, config, raster.foundation, page),
    );

    let mut result = assemble_page(page, scale, config, walls, openings, structural);
    result.diagnostics.segments = primitives.segments.len();

    if expired() {
        return timed_out(page, scale, config, start);
    }
    let elapsed_ms = start.elapsed().as_millis();

    let counts = result.elements.counts();
    tracing::info!(
        page,
        walls = counts[&ElementCategory::ExteriorWall] + counts[&ElementCategory::InteriorWall],
        doors = counts[&ElementCategory::Door],
        windows = counts[&ElementCategory::Window],
        structural = result.elements.iter().filter(|e| e.category.is_structural()).count(),
        unclassified = result.unclassified.len(),
        elapsed_ms,
        "Page complete"
    );

    result
}

fn timed_out(page: usize, scale: &ScaleFactor, config: &TakeoffConfig, start: Instant) -> PageResult {
    tracing::warn!(
        page,
        elapsed_ms = start.elapsed().as_millis(),
        budget_ms = ?config.page_timeout_ms,
        "Page exceeded its time budget, discarding results"
    );
    let diagnostics = PageDiagnostics {
        timed_out: true,
        ..Default::default()
    };
    PageResult::without_elements(page, scale.pixels_per_meter(), diagnostics)
}

/// Reconcile detector outputs and assign element ids
fn assemble_page(
    page: usize,
    scale: &ScaleFactor,
    config: &TakeoffConfig,
    walls: WallDetection,
    openings: Vec<OpeningCandidate>,
    structural: StructuralDetection,
) -> PageResult {
    let StructuralDetection {
        candidates,
        unclassified: unclassified_regions,
        linework_skipped,
        noise_skipped,
    } = structural;

    // Filled wall pieces between openings are walls, not members
    let kept_candidates: Vec<usize> = (0..candidates.len())
        .filter(|&i| !is_wall_piece(&candidates[i], &walls.runs))
        .collect();
    // Runs traced along the edges of a solid member belong to that member
    let kept_runs: Vec<usize> = (0..walls.runs.len())
        .filter(|&r| {
            let (a, b) = walls.runs[r].centerline();
            let mid = Point2D::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
            !kept_candidates.iter().any(|&i| {
                candidates[i].category != ElementCategory::Slab
                    && candidates[i].footprint.expanded(1.0).contains(&mid)
            })
        })
        .collect();

    let mut elements = Vec::new();
    let mut unclassified = Vec::new();
    let mut seq = 0u32;
    let mut next_id = || {
        let id = ElementId::new(page, seq);
        seq += 1;
        id
    };

    let mut wall_ids: FxHashMap<usize, ElementId> = FxHashMap::default();
    for &r in &kept_runs {
        let run = &walls.runs[r];
        let id = next_id();
        wall_ids.insert(r, id);

        let length_m = scale.px_to_m(run.length());
        let thickness_m = scale.px_to_m(run.thickness);
        // Unclassified openings stay out of the element set and out of this check
        let hosted: Vec<f64> = openings
            .iter()
            .filter(|o| o.wall_index == r && o.kind != OpeningKind::Unclassified)
            .map(|o| scale.px_to_m(o.width()))
            .collect();
        let warnings = hosted_width_warning(length_m, &hosted);
        if warnings.is_some() {
            tracing::warn!(page, wall = %id, length_m, "Openings wider than their wall");
        }

        let (start, end) = run.centerline();
        let category = if run.exterior {
            ElementCategory::ExteriorWall
        } else {
            ElementCategory::InteriorWall
        };
        elements.push(
            DetectedElement::new(
                id,
                category,
                ElementGeometry::Centerline { start, end },
                Measurements {
                    length_m: Some(length_m),
                    area_m2: Some(length_m * thickness_m),
                    thickness_m: Some(thickness_m),
                    ..Default::default()
                },
                run.confidence(),
            )
            .with_warnings(warnings),
        );
    }

    let mut orphaned_openings = 0;
    for opening in &openings {
        let Some(&wall_id) = wall_ids.get(&opening.wall_index) else {
            orphaned_openings += 1;
            continue;
        };
        let run = &walls.runs[opening.wall_index];
        let width_m = scale.px_to_m(opening.width());
        let offset_m = scale.px_to_m(opening.start - run.start);
        let geometry = ElementGeometry::PointWidth {
            position: run.point_at(opening.center()),
            width_px: opening.width(),
        };

        let (category, height) = match opening.kind {
            OpeningKind::Door => (ElementCategory::Door, config.door_height),
            OpeningKind::Window => (ElementCategory::Window, config.window_height),
            OpeningKind::Unclassified => {
                unclassified.push(UnclassifiedDetection {
                    kind: UnclassifiedKind::Opening,
                    source_page: page,
                    geometry,
                    confidence: opening.confidence,
                    width_m: Some(width_m),
                    area_m2: None,
                    parent_wall: Some(wall_id),
                    offset_along_wall_m: Some(offset_m),
                });
                continue;
            }
        };

        elements.push(
            DetectedElement::new(
                next_id(),
                category,
                geometry,
                Measurements {
                    width_m: Some(width_m),
                    count: Some(1),
                    area_m2: Some(width_m * height),
                    thickness_m: Some(scale.px_to_m(run.thickness)),
                    ..Default::default()
                },
                opening.confidence,
            )
            .hosted_by(wall_id, offset_m),
        );
    }

    let structural_ids: FxHashMap<usize, ElementId> =
        kept_candidates.iter().map(|&i| (i, next_id())).collect();
    for &i in &kept_candidates {
        let candidate = &candidates[i];
        let warnings: Vec<Warning> = candidate
            .overlaps
            .iter()
            .filter_map(|other| structural_ids.get(other))
            .map(|&other| Warning::OverlappingFootprint { other })
            .collect();
        if !warnings.is_empty() {
            tracing::warn!(page, element = %structural_ids[&i], overlaps = warnings.len(), "Overlapping structural footprints");
        }
        elements.push(
            DetectedElement::new(
                structural_ids[&i],
                candidate.category,
                candidate.geometry.clone(),
                candidate.measurements.clone(),
                candidate.confidence,
            )
            .with_warnings(warnings),
        );
    }

    unclassified.extend(
        unclassified_regions
            .into_iter()
            .filter(|u| !lies_on_wall(u, &walls.runs)),
    );

    PageResult {
        page,
        pixels_per_meter: scale.pixels_per_meter(),
        elements: ElementSet::new(elements),
        unclassified,
        diagnostics: PageDiagnostics {
            segments: 0,
            unresolved_segments: walls.unresolved.len(),
            unresolved_length_m: scale.px_to_m(walls.unresolved_length()),
            paired_pieces: walls.paired_pieces,
            linework_skipped,
            noise_skipped,
            walls_superseded: walls.runs.len() - kept_runs.len(),
            orphaned_openings,
            empty_raster: false,
            timed_out: false,
        },
    }
}

/// Where a box centre sits relative to a run: on its centerline and within its extent
fn centred_on(run: &WallRun, bbox: &BoundingBox) -> bool {
    let center = Point2D::new((bbox.min_x + bbox.max_x) / 2.0, (bbox.min_y + bbox.max_y) / 2.0);
    let (along, across) = run.project(&center);
    across.abs() <= (0.25 * run.thickness).max(1.0) && along >= run.start && along <= run.end
}

/// A solid bar that is one stretch of a longer wall run
fn is_wall_piece(candidate: &StructuralCandidate, runs: &[WallRun]) -> bool {
    if matches!(candidate.category, ElementCategory::Column | ElementCategory::Slab) {
        return false;
    }
    let (length, width) = candidate.extents;
    runs.iter().any(|run| {
        (width - run.thickness).abs() <= (0.2 * run.thickness).max(2.0)
            && run.length() > length + run.thickness
            && centred_on(run, &candidate.footprint)
    })
}

fn lies_on_wall(detection: &UnclassifiedDetection, runs: &[WallRun]) -> bool {
    detection
        .geometry
        .bounding_box()
        .map_or(false, |bbox| runs.iter().any(|run| centred_on(run, &bbox)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use nalgebra::Vector2;

    #[test]
    fn test_missing_scale_fails_before_work() {
        let analyzer = Analyzer::new(TakeoffConfig::default()).unwrap();
        let pages = vec![PageRaster::new(GrayImage::from_pixel(10, 10, Luma([255])))];

        assert!(matches!(analyzer.analyze(&pages), Err(TakeoffError::InvalidScale(_))));
    }

    #[test]
    fn test_scale_can_be_set_after_construction() {
        let mut analyzer = Analyzer::new(TakeoffConfig::default()).unwrap();
        analyzer.set_scale(DrawingScale::new(1.0, 100.0).unwrap());
        let pages = vec![PageRaster::new(GrayImage::from_pixel(10, 10, Luma([255]))).with_dpi(127.0)];

        let report = analyzer.analyze(&pages).unwrap();
        assert!((report.pages[0].pixels_per_meter - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_raster_yields_empty_page() {
        let analyzer = Analyzer::new(TakeoffConfig::default())
            .unwrap()
            .with_scale("1:100")
            .unwrap();
        let pages = vec![
            PageRaster::new(GrayImage::new(0, 0)),
            PageRaster::new(GrayImage::new(40, 0)),
        ];
        let report = analyzer.analyze(&pages).unwrap();

        assert_eq!(report.pages.len(), 2);
        for page in &report.pages {
            assert!(page.diagnostics.empty_raster);
            assert!(!page.diagnostics.timed_out);
            assert!(page.elements.is_empty());
        }
        assert_eq!(report.ledger.summary.total_elements, 0);
    }

    #[test]
    fn test_missing_resolution_is_an_error() {
        let config = TakeoffConfig {
            dpi: None,
            ..Default::default()
        };
        let pages = vec![PageRaster::new(GrayImage::from_pixel(10, 10, Luma([255])))];

        assert!(matches!(
            analyze_pages(&pages, "1:100", config),
            Err(TakeoffError::MissingResolution)
        ));
    }

    #[test]
    fn test_blank_page_yields_empty_set() {
        let pages = vec![PageRaster::new(GrayImage::from_pixel(100, 100, Luma([255]))).with_dpi(127.0)];
        let report = analyze_pages(&pages, "1:100", TakeoffConfig::default()).unwrap();

        assert!(report.elements.is_empty());
        assert_eq!(report.ledger.summary.total_elements, 0);
        assert!(!report.pages[0].diagnostics.timed_out);
    }

    #[test]
    fn test_page_selection_skips_pages() {
        let blank = PageRaster::new(GrayImage::from_pixel(50, 50, Luma([255]))).with_dpi(127.0);
        let config = TakeoffConfig {
            pages: Some(vec![1]),
            ..Default::default()
        };
        // Only page 1 is analyzed
        let pages = vec![PageRaster::new(GrayImage::new(0, 0)), blank];
        let report = analyze_pages(&pages, "1:100", config).unwrap();

        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.pages[0].page, 1);
    }

    #[test]
    fn test_zero_timeout_discards_page() {
        let mut image = GrayImage::from_pixel(200, 200, Luma([255]));
        for y in 50..62 {
            for x in 20..180 {
                image.put_pixel(x, y, Luma([0]));
            }
        }
        let raster = PageRaster::new(image).with_dpi(127.0);
        let scale = ScaleFactor::new(50.0).unwrap();

        let zero = TakeoffConfig {
            page_timeout_ms: Some(0),
            ..Default::default()
        };
        let result = analyze_page(0, &raster, &scale, &zero);
        assert!(result.diagnostics.timed_out);
        assert!(result.elements.is_empty());
        assert!(result.unclassified.is_empty());
        assert_eq!(result.diagnostics.segments, 0);

        let generous = TakeoffConfig {
            page_timeout_ms: Some(600_000),
            ..Default::default()
        };
        let result = analyze_page(0, &raster, &scale, &generous);
        assert!(!result.diagnostics.timed_out);
        assert!(result.diagnostics.segments > 0);
    }

    fn run(start: f64, end: f64) -> WallRun {
        WallRun {
            direction: Vector2::new(1.0, 0.0),
            normal: Vector2::new(0.0, 1.0),
            offset: 100.0,
            thickness: 12.0,
            start,
            end,
            low_face: vec![(start, end)],
            high_face: vec![(start, end)],
            paired_length: end - start,
            junctions: Vec::new(),
            exterior: true,
        }
    }

    fn opening(start: f64, end: f64, kind: OpeningKind) -> OpeningCandidate {
        OpeningCandidate {
            wall_index: 0,
            start,
            end,
            kind,
            confidence: 0.9,
        }
    }

    fn walls(runs: Vec<WallRun>) -> WallDetection {
        WallDetection {
            runs,
            unresolved: Vec::new(),
            paired_pieces: 0,
        }
    }

    #[test]
    fn test_openings_of_superseded_runs_are_counted() {
        let column = StructuralCandidate {
            category: ElementCategory::Column,
            geometry: ElementGeometry::Polygon { points: Vec::new() },
            measurements: Measurements::default(),
            confidence: 0.75,
            footprint: BoundingBox { min_x: 20.0, min_y: 85.0, max_x: 55.0, max_y: 115.0 },
            extents: (35.0, 30.0),
            overlaps: Vec::new(),
        };
        let structural = StructuralDetection {
            candidates: vec![column],
            ..Default::default()
        };
        let scale = ScaleFactor::new(50.0).unwrap();
        let result = assemble_page(
            0,
            &scale,
            &TakeoffConfig::default(),
            walls(vec![run(0.0, 75.0)]),
            vec![opening(30.0, 50.0, OpeningKind::Door)],
            structural,
        );

        assert_eq!(result.diagnostics.walls_superseded, 1);
        assert_eq!(result.diagnostics.orphaned_openings, 1);
        assert_eq!(result.elements.len(), 1);
        assert_eq!(result.elements.as_slice()[0].category, ElementCategory::Column);
    }

    #[test]
    fn test_hosted_width_check_counts_doors_and_windows_only() {
        let scale = ScaleFactor::new(50.0).unwrap();
        // 1.5 m wall: a 1.0 m door plus a 0.6 m unclassified gap
        let result = assemble_page(
            0,
            &scale,
            &TakeoffConfig::default(),
            walls(vec![run(0.0, 75.0)]),
            vec![
                opening(2.0, 52.0, OpeningKind::Door),
                opening(45.0, 75.0, OpeningKind::Unclassified),
            ],
            StructuralDetection::default(),
        );

        let wall = result.elements.walls().next().unwrap();
        assert!(wall.warnings.is_empty());
        assert_eq!(result.unclassified.len(), 1);
        assert_eq!(result.unclassified[0].parent_wall, Some(wall.id));
        assert_eq!(result.diagnostics.orphaned_openings, 0);
    }
}
