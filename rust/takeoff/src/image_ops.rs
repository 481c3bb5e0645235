// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raster operations on plan pages
//!
//! Masks use 255 for ink and 0 for background, which is what
//! `imageproc`'s contour and labelling functions treat as foreground.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;

pub const INK: u8 = 255;

/// Binary ink mask: pixels darker than the threshold become 255.
///
/// With `None` the threshold is chosen with Otsu's method.
pub fn ink_mask(image: &GrayImage, threshold: Option<u8>) -> GrayImage {
    let level = match threshold {
        Some(t) => t,
        None => otsu_level(image).saturating_add(1),
    };

    let mut mask = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[0] < level {
            mask.put_pixel(x, y, Luma([INK]));
        }
    }
    mask
}

/// Whether the mask has ink at the given signed coordinate (outside is background)
#[inline]
pub fn is_ink(mask: &GrayImage, x: i64, y: i64) -> bool {
    if x < 0 || y < 0 || x >= mask.width() as i64 || y >= mask.height() as i64 {
        return false;
    }
    mask.get_pixel(x as u32, y as u32).0[0] > 127
}

/// Ink test at a sub-pixel position
#[inline]
pub fn is_ink_at(mask: &GrayImage, x: f64, y: f64) -> bool {
    is_ink(mask, x.floor() as i64, y.floor() as i64)
}

/// Canny edge map of the original grayscale page
pub fn canny_edges(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    imageproc::edges::canny(image, low_threshold, high_threshold)
}

/// Grow ink by `radius` (L1 distance)
pub fn dilate(mask: &GrayImage, radius: u8) -> GrayImage {
    imageproc::morphology::dilate(mask, Norm::L1, radius)
}

/// Shrink ink by `radius` (L1 distance)
pub fn erode(mask: &GrayImage, radius: u8) -> GrayImage {
    imageproc::morphology::erode(mask, Norm::L1, radius)
}

/// Dilate then erode; gaps narrower than twice the radius are sealed
pub fn morphological_close(mask: &GrayImage, radius: u8) -> GrayImage {
    erode(&dilate(mask, radius), radius)
}

/// Swap ink and background
pub fn invert(mask: &GrayImage) -> GrayImage {
    let mut inverted = mask.clone();
    image::imageops::invert(&mut inverted);
    inverted
}

/// Number of ink pixels in the mask
pub fn ink_count(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p.0[0] > 127).count()
}

/// Otsu level of the page; pixels at or below it are the dark class
pub fn otsu_level(image: &GrayImage) -> u8 {
    imageproc::contrast::otsu_level(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tone() -> GrayImage {
        let mut img = GrayImage::new(10, 10);
        for x in 0..10 {
            for y in 0..10 {
                let value = if x < 5 { 40 } else { 220 };
                img.put_pixel(x, y, Luma([value]));
            }
        }
        img
    }

    #[test]
    fn test_ink_mask_fixed_threshold() {
        let mask = ink_mask(&two_tone(), Some(128));

        assert_eq!(mask.get_pixel(0, 0).0[0], INK);
        assert_eq!(mask.get_pixel(9, 0).0[0], 0);
        assert_eq!(ink_count(&mask), 50);
    }

    #[test]
    fn test_ink_mask_otsu_matches_fixed() {
        let fixed = ink_mask(&two_tone(), Some(128));
        let otsu = ink_mask(&two_tone(), None);
        assert_eq!(fixed, otsu);
    }

    #[test]
    fn test_is_ink_outside_is_background() {
        let mask = ink_mask(&two_tone(), Some(128));
        assert!(is_ink(&mask, 0, 0));
        assert!(!is_ink(&mask, -1, 0));
        assert!(!is_ink(&mask, 0, 10));
        assert!(is_ink_at(&mask, 4.9, 3.2));
    }

    #[test]
    fn test_close_seals_gap() {
        let mut mask = GrayImage::new(20, 9);
        for x in (0..8).chain(11..20) {
            for y in 0..9 {
                mask.put_pixel(x, y, Luma([INK]));
            }
        }
        assert!(!is_ink(&mask, 9, 4));

        let closed = morphological_close(&mask, 2);
        assert!(is_ink(&closed, 9, 4));
    }

    #[test]
    fn test_invert() {
        let mut img = GrayImage::new(2, 2);
        img.put_pixel(0, 0, Luma([0]));
        img.put_pixel(1, 1, Luma([255]));

        let inverted = invert(&img);

        assert_eq!(inverted.get_pixel(0, 0).0[0], 255);
        assert_eq!(inverted.get_pixel(1, 1).0[0], 0);
    }
}
