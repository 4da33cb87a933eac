use crate::config::TranscriberConfig;
use crate::error::{OcrError, OcrResult};
use crate::result::{BoundingBox, GlyphReading, GlyphSequence, Token, Transcription};
use image::GrayImage;
use ml::{GlyphClassifier, GlyphInput, LabelMap};
use tracing::{debug, trace};

/// Classifies ordered glyph boxes and joins their labels into text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transcriber {
    config: TranscriberConfig,
}

impl Transcriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranscriberConfig {
        &self.config
    }

    /// Reads `glyphs` left to right, classifying each mask crop.
    ///
    /// A space token precedes a glyph whose left edge lies more than
    /// `word_gap` pixels right of the previous glyph's right edge. The first
    /// failing glyph aborts the whole call; no partial text is returned. A box
    /// that is empty or reaches outside `mask` counts as a failing glyph.
    pub fn transcribe<C>(
        &self,
        glyphs: &GlyphSequence,
        mask: &GrayImage,
        classifier: &C,
        labels: &LabelMap,
    ) -> OcrResult<Transcription>
    where
        C: GlyphClassifier + ?Sized,
    {
        let mut tokens = Vec::with_capacity(glyphs.len() * 2);
        let mut previous: Option<&BoundingBox> = None;

        for (index, bbox) in glyphs.iter().enumerate() {
            if let Some(prev) = previous {
                if bbox.gap_after(prev) > self.config.word_gap as i64 {
                    tokens.push(Token::Space);
                }
            }

            let fits = bbox.width > 0
                && bbox.height > 0
                && bbox.x.checked_add(bbox.width).is_some_and(|r| r <= mask.width())
                && bbox.y.checked_add(bbox.height).is_some_and(|b| b <= mask.height());
            if !fits {
                return Err(OcrError::Classification {
                    glyph: index,
                    reason: format!(
                        "box {}x{} at ({}, {}) does not fit inside the {}x{} mask",
                        bbox.width,
                        bbox.height,
                        bbox.x,
                        bbox.y,
                        mask.width(),
                        mask.height()
                    ),
                });
            }
            let crop = image_proc::crop_region(mask, bbox.to_rect());
            let input = GlyphInput::from_luma(&crop, self.config.crop_size);
            let prediction = classifier
                .classify(&input)
                .and_then(|scores| labels.resolve(&scores, self.config.top_k))
                .map_err(|err| OcrError::Classification {
                    glyph: index,
                    reason: format!("{err:#}"),
                })?;

            trace!(
                glyph = index,
                x = bbox.x,
                label = %prediction.label,
                probability = prediction.probability,
                "classified glyph"
            );
            tokens.push(Token::Glyph(GlyphReading {
                bbox: *bbox,
                prediction,
            }));
            previous = Some(bbox);
        }

        let transcription = Transcription::from_tokens(tokens);
        debug!(
            glyphs = glyphs.len(),
            spaces = transcription.space_count(),
            "transcribed sequence"
        );
        Ok(transcription)
    }
}
