// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Element detection and quantity take-off from floor plan rasters
//!
//! This crate turns preprocessed plan pages into measured building elements
//! and aggregated quantities:
//! 1. Resolving the drawing scale into pixels per metre
//! 2. Extracting boundary segments and filled regions from the raster
//! 3. Detecting walls from paired boundaries, then openings in those walls
//! 4. Detecting columns, beams, slabs and footings from regions
//! 5. Aggregating everything into a quantity ledger
//!
//! # Usage
//!
//! ```rust,ignore
//! use plan_takeoff::{Analyzer, ElementCategory, PageRaster, TakeoffConfig, Unit};
//!
//! let analyzer = Analyzer::new(TakeoffConfig::default())?.with_scale("1:100")?;
//! let report = analyzer.analyze(&[PageRaster::new(grayscale).with_dpi(300.0)])?;
//!
//! let wall_length = report.ledger.group_total("Wall", Unit::LengthM);
//! for door in report.elements.by_category(ElementCategory::Door) {
//!     println!("{} {:?}", door.id, door.measurements.width_m);
//! }
//! ```

pub mod config;
pub mod contour_ops;
pub mod element;
pub mod error;
pub mod image_ops;
pub mod intervals;
pub mod line_ops;
pub mod opening_detector;
pub mod overlay;
pub mod pipeline;
pub mod primitives;
pub mod quantity;
pub mod scale;
pub mod structural_detector;
pub mod types;
pub mod wall_detector;

// Re-export commonly used types and functions
pub use config::{SegmentMode, TakeoffConfig};
pub use element::{
    DetectedElement, ElementCategory, ElementGeometry, ElementId, ElementSet, Measurements,
    UnclassifiedDetection, UnclassifiedKind, Warning,
};
pub use error::{Result, TakeoffError};
pub use overlay::{apply_overlay, parse_dimension};
pub use pipeline::{analyze_page, analyze_pages, AnalysisReport, Analyzer, PageDiagnostics, PageResult};
pub use quantity::{concrete_volume, line_items, net_wall_area, QuantityItem, QuantityLedger, Unit};
pub use scale::{pixels_per_meter, DrawingScale, ScaleFactor};
pub use structural_detector::{classify_region, RegionClass, RegionFeatures};
pub use types::{DimensionAnnotation, LineSegment, PageRaster, Point2D};
