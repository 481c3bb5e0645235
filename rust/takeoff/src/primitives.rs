// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometric primitive extraction
//!
//! Reduces a page raster to the data every detector works from: an ink
//! mask, boundary line segments, component labels and outer-border regions.

use crate::config::{SegmentMode, TakeoffConfig};
use crate::contour_ops::{extract_regions, label_components, LabelImage, Region};
use crate::image_ops::{canny_edges, ink_count, ink_mask};
use crate::line_ops::{extract_axis_segments, extract_hough_segments};
use crate::scale::ScaleFactor;
use crate::types::{LineSegment, PageRaster};
use image::GrayImage;

/// Primitive layer for one page
#[derive(Debug, Clone)]
pub struct PagePrimitives {
    /// 255 = ink
    pub mask: GrayImage,
    pub labels: LabelImage,
    pub segments: Vec<LineSegment>,
    pub regions: Vec<Region>,
}

impl PagePrimitives {
    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    /// Component label at a pixel (0 = background or outside)
    pub fn label_at(&self, x: i64, y: i64) -> u32 {
        if x < 0 || y < 0 || x >= self.labels.width() as i64 || y >= self.labels.height() as i64 {
            return 0;
        }
        self.labels.get_pixel(x as u32, y as u32).0[0]
    }
}

/// Extract primitives from a raster at the page's scale
pub fn extract_primitives(
    raster: &PageRaster,
    scale: &ScaleFactor,
    config: &TakeoffConfig,
) -> PagePrimitives {
    let mask = ink_mask(&raster.image, config.binarize_threshold);
    let min_length = scale.m_to_px(config.min_segment_length_m).max(2.0);

    let segments = match config.segment_mode {
        SegmentMode::AxisRuns => extract_axis_segments(&mask, min_length),
        SegmentMode::Hough => {
            let edges = canny_edges(&raster.image, config.canny_low, config.canny_high);
            extract_hough_segments(
                &edges,
                &mask,
                config.hough_threshold,
                min_length,
                config.max_line_gap_px,
                config.angle_tolerance_rad,
                config.collinear_offset_tolerance_px,
            )
        }
    };

    let labels = label_components(&mask);
    let regions = extract_regions(&mask, &labels);

    tracing::debug!(
        ink_pixels = ink_count(&mask),
        segments = segments.len(),
        regions = regions.len(),
        mode = ?config.segment_mode,
        "Extracted primitives"
    );

    PagePrimitives {
        mask,
        labels,
        segments,
        regions,
    }
}
