use image::{DynamicImage, GrayImage, RgbImage};
use imageproc::rect::Rect;
use ml::Prediction;
use serde::Serialize;
use std::fmt;

/// Axis-aligned box around one glyph, in mask pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// First column to the right of the box.
    pub fn right_edge(&self) -> u32 {
        self.x + self.width
    }

    /// Horizontal distance from `previous`'s right edge to this box's left
    /// edge. Negative when the boxes overlap.
    pub fn gap_after(&self, previous: &BoundingBox) -> i64 {
        self.x as i64 - previous.right_edge() as i64
    }

    pub(crate) fn to_rect(self) -> Rect {
        Rect::at(self.x as i32, self.y as i32).of_size(self.width, self.height)
    }
}

impl From<Rect> for BoundingBox {
    fn from(rect: Rect) -> Self {
        let x = rect.left().max(0) as u32;
        let y = rect.top().max(0) as u32;
        Self {
            x,
            y,
            width: rect.width(),
            height: rect.height(),
        }
    }
}

/// Glyph boxes in reading order: ascending `x`, ties kept in detection order.
///
/// Lines are not separated; a multi-line fragment interleaves its rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GlyphSequence {
    boxes: Vec<BoundingBox>,
}

impl GlyphSequence {
    /// Sorts `boxes` (given in detection order) into reading order.
    pub fn from_detected(mut boxes: Vec<BoundingBox>) -> Self {
        boxes.sort_by_key(|b| b.x);
        Self { boxes }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BoundingBox> {
        self.boxes.iter()
    }

    pub fn as_slice(&self) -> &[BoundingBox] {
        &self.boxes
    }
}

impl<'a> IntoIterator for &'a GlyphSequence {
    type Item = &'a BoundingBox;
    type IntoIter = std::slice::Iter<'a, BoundingBox>;

    fn into_iter(self) -> Self::IntoIter {
        self.boxes.iter()
    }
}

/// Output of the segmentation stage.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub boxes: GlyphSequence,
    /// Cleaned binary mask (ink = 255) the boxes were taken from.
    pub mask: GrayImage,
}

impl Segmentation {
    /// Debug view: the source image with every glyph box outlined.
    pub fn annotate(&self, image: &DynamicImage) -> RgbImage {
        let rects: Vec<Rect> = self.boxes.iter().map(|b| b.to_rect()).collect();
        image_proc::draw_boxes(image, &rects, [255, 64, 64])
    }
}

/// One classified glyph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlyphReading {
    pub bbox: BoundingBox,
    pub prediction: Prediction,
}

/// Element of a transcription.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Token {
    Glyph(GlyphReading),
    Space,
}

/// Ordered glyph labels with word spaces, built once per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcription {
    tokens: Vec<Token>,
}

impl Transcription {
    pub(crate) fn from_tokens(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Total tokens: glyphs plus inserted spaces.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn glyphs(&self) -> impl Iterator<Item = &GlyphReading> {
        self.tokens.iter().filter_map(|token| match token {
            Token::Glyph(reading) => Some(reading),
            Token::Space => None,
        })
    }

    pub fn space_count(&self) -> usize {
        self.tokens
            .iter()
            .filter(|token| matches!(token, Token::Space))
            .count()
    }

    /// Labels concatenated, one `' '` per space token.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Transcription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            match token {
                Token::Glyph(reading) => f.write_str(&reading.prediction.label)?,
                Token::Space => f.write_str(" ")?,
            }
        }
        Ok(())
    }
}

/// Everything produced for one image.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub transcription: Transcription,
    pub segmentation: Segmentation,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(x: u32, label: &str) -> Token {
        Token::Glyph(GlyphReading {
            bbox: BoundingBox::new(x, 0, 10, 20),
            prediction: Prediction {
                class_index: 0,
                label: label.to_string(),
                probability: 1.0,
                ranked: vec![(label.to_string(), 1.0)],
            },
        })
    }

    #[test]
    fn bounding_box_converts_from_rect() {
        let rect = Rect::at(5, 10).of_size(20, 30);
        let bbox: BoundingBox = rect.into();
        assert_eq!(bbox, BoundingBox::new(5, 10, 20, 30));
        assert_eq!(bbox.to_rect(), rect);
    }

    #[test]
    fn gap_is_measured_from_right_edge() {
        let first = BoundingBox::new(10, 0, 20, 20);
        assert_eq!(BoundingBox::new(40, 0, 5, 5).gap_after(&first), 10);
        assert_eq!(BoundingBox::new(25, 0, 5, 5).gap_after(&first), -5);
    }

    #[test]
    fn sequence_sorts_by_x_keeping_detection_order_on_ties() {
        let a = BoundingBox::new(50, 0, 9, 16);
        let b = BoundingBox::new(10, 40, 9, 16);
        let c = BoundingBox::new(10, 2, 12, 18);
        let seq = GlyphSequence::from_detected(vec![a, b, c]);
        assert_eq!(seq.as_slice(), &[b, c, a]);
    }

    #[test]
    fn transcription_renders_labels_and_spaces() {
        let t = Transcription::from_tokens(vec![
            reading(0, "Ka"),
            reading(12, "Ma"),
            Token::Space,
            reading(60, "Dha"),
        ]);
        assert_eq!(t.text(), "KaMa Dha");
        assert_eq!(t.len(), 4);
        assert_eq!(t.space_count(), 1);
        assert_eq!(t.glyphs().count(), 3);
        assert!(Transcription::default().text().is_empty());
    }

    #[test]
    fn transcription_serialises_tagged_tokens() -> anyhow::Result<()> {
        let t = Transcription::from_tokens(vec![reading(0, "Ka"), Token::Space]);
        let json = serde_json::to_value(&t)?;
        assert_eq!(json["tokens"][0]["type"], "glyph");
        assert_eq!(json["tokens"][0]["prediction"]["label"], "Ka");
        assert_eq!(json["tokens"][1]["type"], "space");
        Ok(())
    }
}
