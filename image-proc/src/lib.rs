//! Pixel-level building blocks for glyph segmentation.
//!
//! Everything here works on 8-bit single-channel images (`GrayImage`) where a
//! binary mask uses 255 for ink and 0 for background.

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage, imageops};
use imageproc::contours::{BorderType, find_contours};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::integral_image::{integral_image, sum_image_pixels};
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};
use imageproc::rect::Rect;

/// Value written for foreground pixels in every mask produced by this crate.
pub const INK: u8 = 255;

/// Largest structuring element side accepted by [`open_rect`].
pub const MAX_KERNEL_SIDE: u32 = 256;

/// Reduces a decoded image to one intensity channel.
///
/// # Arguments
/// - `image`: decoded source in any colour layout.
///
/// # Returns
/// - 8-bit luminance of the same size.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Inverted adaptive mean threshold.
///
/// A pixel becomes ink when its value is at or below the rounded mean of the
/// `block_size x block_size` window centred on it, minus `offset`. Window
/// samples falling outside the image repeat the nearest edge pixel, so uniform
/// regions of any brightness stay background.
///
/// # Arguments
/// - `gray`: source intensities.
/// - `block_size`: odd window side length (15 for manuscript fragments).
/// - `offset`: constant subtracted from the local mean before comparing.
///
/// # Returns
/// - A mask of the same size with ink = [`INK`], background = 0.
pub fn adaptive_threshold_inv(gray: &GrayImage, block_size: u32, offset: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut mask = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return mask;
    }

    let radius = block_size / 2;
    let side = 2 * radius + 1;
    let area = u64::from(side) * u64::from(side);

    // Edge-replicated border so every window lies inside the padded copy.
    let padded = GrayImage::from_fn(width + 2 * radius, height + 2 * radius, |x, y| {
        let sx = x.saturating_sub(radius).min(width - 1);
        let sy = y.saturating_sub(radius).min(height - 1);
        *gray.get_pixel(sx, sy)
    });
    let integral: ImageBuffer<Luma<u64>, Vec<u64>> = integral_image(&padded);

    for (x, y, pixel) in mask.enumerate_pixels_mut() {
        let sum = sum_image_pixels(&integral, x, y, x + side - 1, y + side - 1)[0];
        let mean = ((sum + area / 2) / area) as i32;
        let value = i32::from(gray.get_pixel(x, y)[0]);
        if value - mean <= -offset {
            *pixel = Luma([INK]);
        }
    }

    mask
}

/// Morphological opening with a `kernel_width x kernel_height` rectangle.
///
/// Erosion uses the element anchored at its centre, dilation uses the
/// reflected element, so any ink region that contains a full kernel-sized
/// block is restored exactly while smaller specks disappear. Neighbours
/// outside the image are ignored by both passes.
///
/// # Arguments
/// - `mask`: binary mask to clean.
/// - `kernel_width`, `kernel_height`: element size, clamped to
///   `1..=MAX_KERNEL_SIDE`.
///
/// # Returns
/// - The opened mask, same size as the input.
pub fn open_rect(mask: &GrayImage, kernel_width: u32, kernel_height: u32) -> GrayImage {
    let kw = kernel_width.clamp(1, MAX_KERNEL_SIDE);
    let kh = kernel_height.clamp(1, MAX_KERNEL_SIDE);
    if kw == 1 && kh == 1 {
        return mask.clone();
    }
    let (ax, ay) = (kw / 2, kh / 2);
    let element = GrayImage::from_pixel(kw, kh, Luma([INK]));

    // Anchors are below MAX_KERNEL_SIDE, so they fit in a u8.
    let erode = Mask::from_image(&element, ax as u8, ay as u8);
    let dilate = Mask::from_image(&element, (kw - 1 - ax) as u8, (kh - 1 - ay) as u8);
    grayscale_dilate(&grayscale_erode(mask, &erode), &dilate)
}

/// Bounding rectangles of the outer borders of top-level ink components.
///
/// Holes and anything drawn inside a hole are ignored, so a glyph with an
/// enclosed counter yields a single rectangle. Rectangles are returned in
/// contour discovery order (raster order of each component's first pixel).
///
/// # Arguments
/// - `mask`: binary mask; any non-zero pixel counts as ink.
///
/// # Returns
/// - One rectangle per outer border, in discovery order.
pub fn external_boxes(mask: &GrayImage) -> Vec<Rect> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| {
            matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none()
        })
        .filter_map(|contour| {
            let mut points = contour.points.iter();
            let first = points.next()?;
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
            for p in points {
                min_x = min_x.min(p.x);
                min_y = min_y.min(p.y);
                max_x = max_x.max(p.x);
                max_y = max_y.max(p.y);
            }
            Some(
                Rect::at(min_x, min_y)
                    .of_size((max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32),
            )
        })
        .collect()
}

/// Copies `rect` out of `mask`, clipped to the image bounds.
///
/// # Returns
/// - The clipped crop; empty when `rect` lies outside the mask.
pub fn crop_region(mask: &GrayImage, rect: Rect) -> GrayImage {
    let x = rect.left().max(0) as u32;
    let y = rect.top().max(0) as u32;
    imageops::crop_imm(mask, x, y, rect.width(), rect.height()).to_image()
}

/// Renders `rects` as hollow rectangles over a colour copy of `image`.
///
/// Used for the box-annotated debug view; strokes are one pixel wide.
///
/// # Arguments
/// - `image`: background, converted to RGB.
/// - `rects`: outlines to draw.
/// - `color`: stroke colour.
pub fn draw_boxes(image: &DynamicImage, rects: &[Rect], color: [u8; 3]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for rect in rects {
        draw_hollow_rect_mut(&mut canvas, *rect, Rgb(color));
    }
    canvas
}
