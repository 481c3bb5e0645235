// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scale resolution: drawing ratio + raster resolution → pixels per metre

use crate::config::TakeoffConfig;
use crate::error::{Result, TakeoffError};
use crate::types::PageRaster;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const METERS_PER_INCH: f64 = 0.0254;

/// Declared drawing scale `A:B` (A drawing units represent B real units)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DrawingScale {
    pub drawing: f64,
    pub real: f64,
}

impl DrawingScale {
    pub fn new(drawing: f64, real: f64) -> Result<Self> {
        if !(drawing.is_finite() && drawing > 0.0) {
            return Err(TakeoffError::InvalidScale(format!(
                "drawing units must be positive, got {drawing}"
            )));
        }
        if !(real.is_finite() && real > 0.0) {
            return Err(TakeoffError::InvalidScale(format!(
                "real units must be positive, got {real}"
            )));
        }
        Ok(Self { drawing, real })
    }

    /// Parse `"A:B"`; a comma is accepted as decimal separator
    pub fn parse(s: &str) -> Result<Self> {
        let (a, b) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| TakeoffError::InvalidScale(format!("expected 'A:B', got '{s}'")))?;
        let drawing = parse_number(a)
            .ok_or_else(|| TakeoffError::InvalidScale(format!("'{a}' is not a number")))?;
        let real = parse_number(b)
            .ok_or_else(|| TakeoffError::InvalidScale(format!("'{b}' is not a number")))?;
        Self::new(drawing, real)
    }

    /// Drawing length per real length (1:100 → 0.01)
    pub fn ratio(&self) -> f64 {
        self.drawing / self.real
    }

    /// Pixels per real-world metre at the given raster resolution
    pub fn pixels_per_meter(&self, dpi: f64) -> Result<ScaleFactor> {
        if !(dpi.is_finite() && dpi > 0.0) {
            return Err(TakeoffError::InvalidScale(format!(
                "resolution must be positive, got {dpi} dpi"
            )));
        }
        ScaleFactor::new(dpi / METERS_PER_INCH * self.ratio())
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().replace(',', ".").parse::<f64>().ok()
}

impl FromStr for DrawingScale {
    type Err = TakeoffError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for DrawingScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.drawing, self.real)
    }
}

/// Conversion between pixel and real-world measurements for one page
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScaleFactor {
    pixels_per_meter: f64,
}

impl ScaleFactor {
    pub fn new(pixels_per_meter: f64) -> Result<Self> {
        if pixels_per_meter.is_finite() && pixels_per_meter > 0.0 {
            Ok(Self { pixels_per_meter })
        } else {
            Err(TakeoffError::InvalidScale(format!(
                "pixels per metre must be positive, got {pixels_per_meter}"
            )))
        }
    }

    pub fn pixels_per_meter(&self) -> f64 {
        self.pixels_per_meter
    }

    pub fn px_to_m(&self, px: f64) -> f64 {
        px / self.pixels_per_meter
    }

    pub fn px2_to_m2(&self, px2: f64) -> f64 {
        px2 / (self.pixels_per_meter * self.pixels_per_meter)
    }

    pub fn m_to_px(&self, m: f64) -> f64 {
        m * self.pixels_per_meter
    }

    pub fn m2_to_px2(&self, m2: f64) -> f64 {
        m2 * self.pixels_per_meter * self.pixels_per_meter
    }
}

/// Resolve the scale factor for one page.
///
/// Resolution comes from the raster (embedded DPI, then physical page
/// size) and falls back to the configured `dpi`.
pub fn resolve_for_raster(
    scale: &DrawingScale,
    raster: &PageRaster,
    config: &TakeoffConfig,
) -> Result<ScaleFactor> {
    let dpi = raster
        .embedded_dpi()
        .or(config.dpi)
        .ok_or(TakeoffError::MissingResolution)?;
    scale.pixels_per_meter(dpi)
}

/// Convenience: `"A:B"` + DPI → pixels per metre
pub fn pixels_per_meter(scale: &str, dpi: f64) -> Result<f64> {
    Ok(DrawingScale::parse(scale)?.pixels_per_meter(dpi)?.pixels_per_meter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::GrayImage;

    #[test]
    fn test_parse_scale() {
        let scale = DrawingScale::parse("1:100").unwrap();
        assert_relative_eq!(scale.ratio(), 0.01);

        let scale: DrawingScale = " 1 : 2,5 ".parse().unwrap();
        assert_relative_eq!(scale.ratio(), 0.4);
        assert_eq!(DrawingScale::new(1.0, 50.0).unwrap().to_string(), "1:50");
    }

    #[test]
    fn test_invalid_scales() {
        for bad in ["", "100", "1:", ":100", "a:b", "1:0", "1:-50", "0:100", "1:inf"] {
            assert!(
                matches!(DrawingScale::parse(bad), Err(TakeoffError::InvalidScale(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_pixels_per_meter() {
        // 127 dpi = 5000 px per metre of paper; at 1:100 one real metre is 1 cm of paper
        assert_relative_eq!(pixels_per_meter("1:100", 127.0).unwrap(), 50.0, epsilon = 1e-9);
        assert_relative_eq!(
            pixels_per_meter("1:50", 75.0).unwrap(),
            75.0 / 0.0254 / 50.0,
            epsilon = 1e-9
        );
        assert!(pixels_per_meter("1:100", 0.0).is_err());
    }

    #[test]
    fn test_conversions() {
        let factor = ScaleFactor::new(50.0).unwrap();
        assert_relative_eq!(factor.px_to_m(500.0), 10.0);
        assert_relative_eq!(factor.px2_to_m2(2500.0), 1.0);
        assert_relative_eq!(factor.m_to_px(factor.px_to_m(123.4)), 123.4);
    }

    #[test]
    fn test_resolution_precedence() {
        let scale = DrawingScale::parse("1:100").unwrap();
        let config = TakeoffConfig {
            dpi: Some(254.0),
            ..Default::default()
        };

        let plain = PageRaster::new(GrayImage::new(10, 10));
        let factor = resolve_for_raster(&scale, &plain, &config).unwrap();
        assert_relative_eq!(factor.pixels_per_meter(), 100.0, epsilon = 1e-9);

        let tagged = plain.clone().with_dpi(127.0);
        let factor = resolve_for_raster(&scale, &tagged, &config).unwrap();
        assert_relative_eq!(factor.pixels_per_meter(), 50.0, epsilon = 1e-9);

        let no_dpi = TakeoffConfig {
            dpi: None,
            ..Default::default()
        };
        assert!(matches!(
            resolve_for_raster(&scale, &plain, &no_dpi),
            Err(TakeoffError::MissingResolution)
        ));
    }
}
