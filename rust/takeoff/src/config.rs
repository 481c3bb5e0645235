// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Analysis configuration
//!
//! One immutable value carries every default and detection threshold. It is
//! passed by reference into each detector so pages can run in parallel.
//! Lengths are in metres and converted to pixels per page.

use crate::error::{Result, TakeoffError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Primitive extraction strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentMode {
    /// Exact horizontal/vertical ink boundaries
    #[default]
    AxisRuns,
    /// Canny edges + probabilistic Hough transform, any orientation
    Hough,
}

impl FromStr for SegmentMode {
    type Err = TakeoffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "axis_runs" | "axis" => Ok(SegmentMode::AxisRuns),
            "hough" => Ok(SegmentMode::Hough),
            other => Err(TakeoffError::config(
                "segment_mode",
                format!("unknown mode '{other}'"),
            )),
        }
    }
}

/// Configuration for one analysis run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TakeoffConfig {
    /// Resolution assumed when the raster carries none
    pub dpi: Option<f64>,
    /// Restrict processing to these page indices
    pub pages: Option<Vec<usize>>,

    // Primitive extraction
    /// Gray level below which a pixel is ink; `None` selects Otsu
    pub binarize_threshold: Option<u8>,
    pub segment_mode: SegmentMode,
    pub min_segment_length_m: f64,
    pub canny_low: f32,
    pub canny_high: f32,
    pub hough_threshold: u32,
    pub max_line_gap_px: f64,

    // Wall detection
    pub angle_tolerance_rad: f64,
    pub collinear_offset_tolerance_px: f64,
    pub min_wall_thickness_m: f64,
    pub max_wall_thickness_m: f64,
    pub min_overlap_fraction: f64,
    pub min_wall_length_m: f64,
    pub wall_merge_gap_m: f64,
    pub junction_tolerance_m: f64,

    // Opening detection
    pub min_opening_width_m: f64,
    pub max_opening_width_m: f64,
    pub door_arc_radius_tolerance: f64,
    pub door_arc_min_coverage: f64,
    /// Swing angles sampled for the arc, from the closed leaf position
    pub door_arc_start_deg: f64,
    pub door_arc_end_deg: f64,
    pub door_leaf_min_span: f64,
    /// Shallowest open leaf angle searched
    pub door_leaf_min_angle_deg: f64,
    pub window_symbol_min_span: f64,

    // Structural detection
    pub column_area_threshold: f64,
    pub column_aspect_max: f64,
    pub beam_aspect_ratio_min: f64,
    pub beam_support_gap_m: f64,
    pub filled_ratio_min: f64,
    pub hatched_ratio_min: f64,
    pub rectangularity_min: f64,
    pub min_region_area_m2: f64,
    pub slab_min_area_m2: f64,
    pub slab_fill_max: f64,
    pub slab_gap_seal_m: f64,
    /// Share of the smaller footprint two members may share without a warning
    pub overlap_warning_share: f64,

    // Quantity defaults
    pub wall_height: f64,
    pub slab_thickness: f64,
    pub footing_thickness: f64,
    pub beam_depth: f64,
    pub window_height: f64,
    pub door_height: f64,
    /// Add wall elevation area (length × height) to the ledger
    pub ledger_wall_area: bool,

    // Dimension overlay
    pub dimension_tolerance: f64,
    pub dimension_search_radius_m: f64,
    pub dimension_override: bool,

    /// Whole-page time budget; a page that exceeds it is discarded
    pub page_timeout_ms: Option<u64>,
}

impl Default for TakeoffConfig {
    fn default() -> Self {
        Self {
            dpi: Some(300.0),
            pages: None,

            binarize_threshold: Some(128),
            segment_mode: SegmentMode::AxisRuns,
            min_segment_length_m: 0.30,
            canny_low: 50.0,
            canny_high: 150.0,
            hough_threshold: 50,
            max_line_gap_px: 5.0,

            angle_tolerance_rad: 0.035,
            collinear_offset_tolerance_px: 1.5,
            min_wall_thickness_m: 0.05,
            max_wall_thickness_m: 0.60,
            min_overlap_fraction: 0.60,
            min_wall_length_m: 0.50,
            wall_merge_gap_m: 0.05,
            junction_tolerance_m: 0.05,

            min_opening_width_m: 0.40,
            max_opening_width_m: 3.00,
            door_arc_radius_tolerance: 0.15,
            door_arc_min_coverage: 0.60,
            door_arc_start_deg: 5.0,
            door_arc_end_deg: 85.0,
            door_leaf_min_span: 0.60,
            door_leaf_min_angle_deg: 15.0,
            window_symbol_min_span: 0.60,

            column_area_threshold: 1.0,
            column_aspect_max: 2.0,
            beam_aspect_ratio_min: 4.0,
            beam_support_gap_m: 0.10,
            filled_ratio_min: 0.60,
            hatched_ratio_min: 0.25,
            rectangularity_min: 0.60,
            min_region_area_m2: 0.01,
            slab_min_area_m2: 2.0,
            slab_fill_max: 0.35,
            slab_gap_seal_m: 1.20,
            overlap_warning_share: 0.10,

            wall_height: 2.75,
            slab_thickness: 0.20,
            footing_thickness: 0.40,
            beam_depth: 0.50,
            window_height: 1.20,
            door_height: 2.01,
            ledger_wall_area: true,

            dimension_tolerance: 0.05,
            dimension_search_radius_m: 1.0,
            dimension_override: false,

            page_timeout_ms: None,
        }
    }
}

impl TakeoffConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TakeoffConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TAKEOFF_*` environment variables on top of this configuration
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (`TAKEOFF_*` names)
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("TAKEOFF_DPI") {
            self.dpi = Some(parse_value("dpi", &v)?);
        }
        if let Some(v) = lookup("TAKEOFF_PAGES") {
            let pages = v
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| parse_value::<usize>("pages", s))
                .collect::<Result<Vec<_>>>()?;
            self.pages = Some(pages);
        }
        if let Some(v) = lookup("TAKEOFF_SEGMENT_MODE") {
            self.segment_mode = v.parse()?;
        }
        if let Some(v) = lookup("TAKEOFF_BINARIZE_THRESHOLD") {
            self.binarize_threshold = if v.trim().eq_ignore_ascii_case("otsu") {
                None
            } else {
                Some(parse_value("binarize_threshold", &v)?)
            };
        }
        override_f64(&lookup, "TAKEOFF_WALL_HEIGHT", "wall_height", &mut self.wall_height)?;
        override_f64(&lookup, "TAKEOFF_SLAB_THICKNESS", "slab_thickness", &mut self.slab_thickness)?;
        override_f64(
            &lookup,
            "TAKEOFF_FOOTING_THICKNESS",
            "footing_thickness",
            &mut self.footing_thickness,
        )?;
        override_f64(
            &lookup,
            "TAKEOFF_COLUMN_AREA_THRESHOLD",
            "column_area_threshold",
            &mut self.column_area_threshold,
        )?;
        override_f64(
            &lookup,
            "TAKEOFF_BEAM_ASPECT_RATIO_MIN",
            "beam_aspect_ratio_min",
            &mut self.beam_aspect_ratio_min,
        )?;
        override_f64(
            &lookup,
            "TAKEOFF_MIN_WALL_THICKNESS",
            "min_wall_thickness_m",
            &mut self.min_wall_thickness_m,
        )?;
        override_f64(
            &lookup,
            "TAKEOFF_MAX_WALL_THICKNESS",
            "max_wall_thickness_m",
            &mut self.max_wall_thickness_m,
        )?;
        override_f64(
            &lookup,
            "TAKEOFF_MIN_OVERLAP_FRACTION",
            "min_overlap_fraction",
            &mut self.min_overlap_fraction,
        )?;
        if let Some(v) = lookup("TAKEOFF_PAGE_TIMEOUT_MS") {
            self.page_timeout_ms = Some(parse_value("page_timeout_ms", &v)?);
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values that would make measurements meaningless
    pub fn validate(&self) -> Result<()> {
        if let Some(dpi) = self.dpi {
            ensure_positive("dpi", dpi)?;
        }

        ensure_positive("wall_height", self.wall_height)?;
        ensure_positive("slab_thickness", self.slab_thickness)?;
        ensure_positive("footing_thickness", self.footing_thickness)?;
        ensure_positive("beam_depth", self.beam_depth)?;
        ensure_positive("window_height", self.window_height)?;
        ensure_positive("door_height", self.door_height)?;

        ensure_positive("min_wall_thickness_m", self.min_wall_thickness_m)?;
        ensure_positive("max_wall_thickness_m", self.max_wall_thickness_m)?;
        if self.min_wall_thickness_m >= self.max_wall_thickness_m {
            return Err(TakeoffError::config(
                "min_wall_thickness_m",
                "must be smaller than max_wall_thickness_m",
            ));
        }
        ensure_positive("min_opening_width_m", self.min_opening_width_m)?;
        if self.min_opening_width_m >= self.max_opening_width_m {
            return Err(TakeoffError::config(
                "min_opening_width_m",
                "must be smaller than max_opening_width_m",
            ));
        }

        ensure_positive("angle_tolerance_rad", self.angle_tolerance_rad)?;
        ensure_positive("min_segment_length_m", self.min_segment_length_m)?;
        ensure_positive("min_wall_length_m", self.min_wall_length_m)?;
        ensure_positive("column_area_threshold", self.column_area_threshold)?;
        ensure_positive("beam_aspect_ratio_min", self.beam_aspect_ratio_min)?;
        ensure_positive("column_aspect_max", self.column_aspect_max)?;
        ensure_positive("slab_gap_seal_m", self.slab_gap_seal_m)?;
        ensure_positive("slab_min_area_m2", self.slab_min_area_m2)?;
        ensure_positive("beam_support_gap_m", self.beam_support_gap_m)?;
        ensure_positive("dimension_search_radius_m", self.dimension_search_radius_m)?;
        ensure_non_negative("max_line_gap_px", self.max_line_gap_px)?;

        ensure_positive("canny_low", f64::from(self.canny_low))?;
        if self.canny_low > self.canny_high {
            return Err(TakeoffError::config("canny_low", "must not exceed canny_high"));
        }
        if self.hough_threshold == 0 {
            return Err(TakeoffError::config("hough_threshold", "must be at least 1"));
        }

        ensure_angle("door_arc_start_deg", self.door_arc_start_deg)?;
        ensure_angle("door_arc_end_deg", self.door_arc_end_deg)?;
        if self.door_arc_start_deg >= self.door_arc_end_deg {
            return Err(TakeoffError::config(
                "door_arc_start_deg",
                "must be smaller than door_arc_end_deg",
            ));
        }
        ensure_angle("door_leaf_min_angle_deg", self.door_leaf_min_angle_deg)?;
        ensure_non_negative("wall_merge_gap_m", self.wall_merge_gap_m)?;
        ensure_non_negative("junction_tolerance_m", self.junction_tolerance_m)?;
        ensure_non_negative("collinear_offset_tolerance_px", self.collinear_offset_tolerance_px)?;
        ensure_non_negative("min_region_area_m2", self.min_region_area_m2)?;

        ensure_fraction("min_overlap_fraction", self.min_overlap_fraction)?;
        ensure_fraction("door_arc_radius_tolerance", self.door_arc_radius_tolerance)?;
        ensure_fraction("door_arc_min_coverage", self.door_arc_min_coverage)?;
        ensure_fraction("door_leaf_min_span", self.door_leaf_min_span)?;
        ensure_fraction("window_symbol_min_span", self.window_symbol_min_span)?;
        ensure_fraction("filled_ratio_min", self.filled_ratio_min)?;
        ensure_fraction("hatched_ratio_min", self.hatched_ratio_min)?;
        ensure_fraction("rectangularity_min", self.rectangularity_min)?;
        ensure_fraction("slab_fill_max", self.slab_fill_max)?;
        ensure_fraction("dimension_tolerance", self.dimension_tolerance)?;
        ensure_fraction("overlap_warning_share", self.overlap_warning_share)?;

        if self.hatched_ratio_min > self.filled_ratio_min {
            return Err(TakeoffError::config(
                "hatched_ratio_min",
                "must not exceed filled_ratio_min",
            ));
        }

        Ok(())
    }

    /// Whether the page index is selected by `pages`
    pub fn includes_page(&self, page: usize) -> bool {
        self.pages.as_ref().map_or(true, |pages| pages.contains(&page))
    }
}

fn ensure_positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TakeoffError::config(field, format!("must be positive, got {value}")))
    }
}

fn ensure_non_negative(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(TakeoffError::config(field, format!("must not be negative, got {value}")))
    }
}

fn ensure_fraction(field: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TakeoffError::config(field, format!("must lie in [0, 1], got {value}")))
    }
}

fn ensure_angle(field: &'static str, value: f64) -> Result<()> {
    if (0.0..=90.0).contains(&value) {
        Ok(())
    } else {
        Err(TakeoffError::config(field, format!("must lie in [0, 90] degrees, got {value}")))
    }
}

fn parse_value<T: FromStr>(field: &'static str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| TakeoffError::config(field, format!("cannot parse '{raw}'")))
}

fn override_f64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &'static str,
    target: &mut f64,
) -> Result<()> {
    if let Some(v) = lookup(key) {
        *target = parse_value(field, &v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = TakeoffConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.wall_height, 2.75);
        assert_eq!(config.slab_thickness, 0.20);
    }

    #[test]
    fn test_json_keeps_defaults_for_missing_fields() {
        let config = TakeoffConfig::from_json_str(r#"{"wall_height": 3.0, "pages": [1]}"#).unwrap();
        assert_eq!(config.wall_height, 3.0);
        assert_eq!(config.slab_thickness, 0.20);
        assert!(config.includes_page(1));
        assert!(!config.includes_page(0));
    }

    #[test]
    fn test_rejects_non_positive_defaults() {
        let err = TakeoffConfig::from_json_str(r#"{"slab_thickness": 0.0}"#).unwrap_err();
        assert!(matches!(
            err,
            TakeoffError::InvalidConfig { field: "slab_thickness", .. }
        ));

        let config = TakeoffConfig {
            min_wall_thickness_m: 0.7,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_broken_detector_settings() {
        let cases: Vec<(TakeoffConfig, &str)> = vec![
            (TakeoffConfig { canny_low: 200.0, ..Default::default() }, "canny_low"),
            (TakeoffConfig { canny_low: 0.0, ..Default::default() }, "canny_low"),
            (TakeoffConfig { hough_threshold: 0, ..Default::default() }, "hough_threshold"),
            (TakeoffConfig { max_line_gap_px: -1.0, ..Default::default() }, "max_line_gap_px"),
            (TakeoffConfig { beam_support_gap_m: 0.0, ..Default::default() }, "beam_support_gap_m"),
            (TakeoffConfig { slab_min_area_m2: -2.0, ..Default::default() }, "slab_min_area_m2"),
            (
                TakeoffConfig { dimension_search_radius_m: 0.0, ..Default::default() },
                "dimension_search_radius_m",
            ),
            (TakeoffConfig { door_arc_end_deg: 120.0, ..Default::default() }, "door_arc_end_deg"),
            (
                TakeoffConfig { door_arc_start_deg: 85.0, door_arc_end_deg: 5.0, ..Default::default() },
                "door_arc_start_deg",
            ),
            (
                TakeoffConfig { door_leaf_min_angle_deg: -10.0, ..Default::default() },
                "door_leaf_min_angle_deg",
            ),
            (
                TakeoffConfig { overlap_warning_share: 1.5, ..Default::default() },
                "overlap_warning_share",
            ),
        ];

        for (config, expected) in cases {
            match config.validate() {
                Err(TakeoffError::InvalidConfig { field, .. }) => assert_eq!(field, expected),
                other => panic!("{expected}: expected a config error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = TakeoffConfig::default()
            .with_overrides_from(|key| match key {
                "TAKEOFF_WALL_HEIGHT" => Some("3.1".into()),
                "TAKEOFF_PAGES" => Some("0, 2".into()),
                "TAKEOFF_BINARIZE_THRESHOLD" => Some("otsu".into()),
                "TAKEOFF_SEGMENT_MODE" => Some("hough".into()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.wall_height, 3.1);
        assert_eq!(config.pages, Some(vec![0, 2]));
        assert_eq!(config.binarize_threshold, None);
        assert_eq!(config.segment_mode, SegmentMode::Hough);
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let err = TakeoffConfig::default()
            .with_overrides_from(|key| (key == "TAKEOFF_DPI").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, TakeoffError::InvalidConfig { field: "dpi", .. }));
    }
}
