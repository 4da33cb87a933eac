use crate::config::SegmenterConfig;
use crate::result::{BoundingBox, GlyphSequence, Segmentation};
use image::DynamicImage;
use tracing::debug;

/// Turns a manuscript image into glyph boxes and a cleaned ink mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Runs grayscale -> adaptive threshold -> opening -> external contours
    /// -> size filter -> left-to-right ordering.
    ///
    /// An image without ink yields an empty sequence, which is not an error.
    pub fn segment(&self, image: &DynamicImage) -> Segmentation {
        let cfg = &self.config;
        let gray = image_proc::to_grayscale(image);
        let binary = image_proc::adaptive_threshold_inv(&gray, cfg.block_size, cfg.offset);
        let mask = image_proc::open_rect(&binary, cfg.open_kernel, cfg.open_kernel);

        let detected: Vec<BoundingBox> = image_proc::external_boxes(&mask)
            .into_iter()
            .map(BoundingBox::from)
            .collect();
        let contour_count = detected.len();
        let kept = detected
            .into_iter()
            .filter(|b| b.height > cfg.min_height && b.width > cfg.min_width)
            .collect();

        let boxes = GlyphSequence::from_detected(kept);
        debug!(
            width = image.width(),
            height = image.height(),
            contours = contour_count,
            glyphs = boxes.len(),
            "segmented image"
        );
        Segmentation { boxes, mask }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn page_with_blocks(
        width: u32,
        height: u32,
        blocks: &[(u32, u32, u32, u32)],
    ) -> DynamicImage {
        let mut gray = GrayImage::from_pixel(width, height, Luma([255]));
        for &(x, y, w, h) in blocks {
            for yy in y..y + h {
                for xx in x..x + w {
                    gray.put_pixel(xx, yy, Luma([0]));
                }
            }
        }
        DynamicImage::ImageLuma8(gray)
    }

    #[test]
    fn blank_page_has_no_glyphs() {
        let seg = Segmenter::default().segment(&page_with_blocks(120, 60, &[]));
        assert!(seg.boxes.is_empty());
        assert_eq!(seg.mask.dimensions(), (120, 60));
        assert!(seg.mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn boxes_follow_block_extents_in_x_order() {
        let image = page_with_blocks(
            200,
            60,
            &[(120, 8, 12, 30), (20, 20, 10, 18), (70, 5, 20, 40)],
        );
        let seg = Segmenter::default().segment(&image);

        assert_eq!(
            seg.boxes.as_slice(),
            &[
                BoundingBox::new(20, 20, 10, 18),
                BoundingBox::new(70, 5, 20, 40),
                BoundingBox::new(120, 8, 12, 30),
            ]
        );
    }

    #[test]
    fn size_filter_is_strict() {
        let image = page_with_blocks(
            220,
            60,
            &[
                (10, 10, 9, 16),  // kept
                (50, 10, 8, 30),  // too narrow
                (90, 10, 12, 15), // too short
                (130, 10, 20, 1), // removed by opening
                (170, 10, 9, 16), // kept
            ],
        );
        let seg = Segmenter::default().segment(&image);

        let xs: Vec<u32> = seg.boxes.iter().map(|b| b.x).collect();
        assert_eq!(xs, vec![10, 170]);
        assert!(seg.boxes.iter().all(|b| b.height > 15 && b.width > 8));
    }

    #[test]
    fn boxes_stay_inside_the_mask() {
        let image = page_with_blocks(60, 40, &[(0, 0, 12, 20), (45, 18, 15, 22)]);
        let seg = Segmenter::default().segment(&image);
        let (w, h) = seg.mask.dimensions();

        assert_eq!(seg.boxes.len(), 2);
        for b in &seg.boxes {
            assert!(b.x + b.width <= w && b.y + b.height <= h);
        }
    }

    #[test]
    fn thresholds_are_configurable() {
        let image = page_with_blocks(100, 60, &[(10, 10, 9, 16), (50, 10, 12, 30)]);
        let segmenter = Segmenter::new(SegmenterConfig {
            min_height: 20,
            ..SegmenterConfig::default()
        });
        let seg = segmenter.segment(&image);
        assert_eq!(seg.boxes.as_slice(), &[BoundingBox::new(50, 10, 12, 30)]);
    }

    #[test]
    fn segmentation_is_deterministic() {
        let image = page_with_blocks(
            150,
            50,
            &[(10, 10, 20, 30), (40, 10, 20, 30), (100, 10, 20, 30)],
        );
        let first = Segmenter::default().segment(&image);
        let second = Segmenter::default().segment(&image);
        assert_eq!(first.boxes, second.boxes);
        assert_eq!(first.mask, second.mask);
    }
}
