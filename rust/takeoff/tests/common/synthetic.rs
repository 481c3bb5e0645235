// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthetic plan rasters drawn with exact pixel geometry

use image::{GrayImage, Luma};
use plan_takeoff::PageRaster;

const PAPER: u8 = 255;
const INK: u8 = 0;

/// Draws black shapes on a white page
pub struct PlanBuilder {
    image: GrayImage,
}

impl PlanBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, Luma([PAPER])),
        }
    }

    /// Fill `[x0, x1) × [y0, y1)` with ink
    pub fn fill(mut self, x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        self.paint(x0, y0, x1, y1, INK);
        self
    }

    /// Erase `[x0, x1) × [y0, y1)` back to paper
    pub fn clear(mut self, x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        self.paint(x0, y0, x1, y1, PAPER);
        self
    }

    /// Rectangular wall ring with outer corners at `(x0, y0)` and `(x1, y1)`
    pub fn ring(self, x0: u32, y0: u32, x1: u32, y1: u32, thickness: u32) -> Self {
        self.fill(x0, y0, x1, y0 + thickness)
            .fill(x0, y1 - thickness, x1, y1)
            .fill(x0, y0 + thickness, x0 + thickness, y1 - thickness)
            .fill(x1 - thickness, y0 + thickness, x1, y1 - thickness)
    }

    /// One-pixel arc around `(cx, cy)`, angles in degrees measured from +x
    /// towards -y (up on the page)
    pub fn arc(mut self, cx: f64, cy: f64, radius: f64, from_deg: f64, to_deg: f64) -> Self {
        let steps = ((to_deg - from_deg).abs() * 10.0).ceil() as usize;
        for k in 0..=steps {
            let deg = from_deg + (to_deg - from_deg) * k as f64 / steps.max(1) as f64;
            let phi = deg.to_radians();
            let x = cx + radius * phi.cos();
            let y = cy - radius * phi.sin();
            if x >= 0.0 && y >= 0.0 && (x as u32) < self.image.width() && (y as u32) < self.image.height() {
                self.image.put_pixel(x as u32, y as u32, Luma([INK]));
            }
        }
        self
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn build(self, dpi: f64) -> PageRaster {
        PageRaster::new(self.image).with_dpi(dpi)
    }

    fn paint(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, value: u8) {
        for y in y0..y1.min(self.image.height()) {
            for x in x0..x1.min(self.image.width()) {
                self.image.put_pixel(x, y, Luma([value]));
            }
        }
    }
}

/// Resolution that gives exactly 50 px/m at 1:100
pub const ROOM_DPI: f64 = 127.0;
pub const ROOM_SCALE: &str = "1:100";

/// One 10 m × 10 m room (outer faces), walls 0.24 m thick, a 0.9 m door in
/// the south wall and a 1.2 m window in the north wall.
pub fn single_room() -> PlanBuilder {
    PlanBuilder::new(612, 612)
        .ring(50, 50, 562, 562, 12)
        // South wall door: gap, open leaf on the hinge jamb and swing arc
        .clear(180, 550, 225, 562)
        .fill(180, 505, 182, 550)
        .arc(180.0, 550.0, 45.0, 0.0, 90.0)
        // North wall window: gap crossed by a glazing stroke
        .clear(280, 50, 340, 62)
        .fill(280, 55, 340, 57)
}

/// Two 30 px columns joined by a 20 px beam, at 1:50 and 75 dpi
pub fn beam_between_columns() -> PlanBuilder {
    PlanBuilder::new(400, 400)
        .fill(100, 200, 130, 230)
        .fill(300, 200, 330, 230)
        .fill(132, 205, 298, 225)
}
