use crate::config::EngineConfig;
use crate::error::{OcrError, OcrResult};
use crate::result::Recognition;
use crate::segment::Segmenter;
use crate::transcribe::Transcriber;
use image::DynamicImage;
use ml::{CnnClassifier, GlyphClassifier, LabelMap};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Segmentation + transcription service.
///
/// Holds the classifier and label map so they are loaded once and reused
/// across requests. The engine is never mutated after construction; every
/// call allocates its own mask, boxes, and transcription.
pub struct TranscriptionEngine<C = CnnClassifier> {
    classifier: C,
    labels: LabelMap,
    segmenter: Segmenter,
    transcriber: Transcriber,
    max_image_side: u32,
}

impl TranscriptionEngine<CnnClassifier> {
    /// Load the label map and trained weights described by `config`.
    ///
    /// Any failure here is fatal for the service: no request can be served
    /// without a working classifier.
    pub fn load(config: &EngineConfig) -> OcrResult<Self> {
        config.validate()?;

        let labels_path = config.model.labels();
        let labels = LabelMap::load(labels_path).map_err(|err| OcrError::LabelMap {
            path: labels_path.to_path_buf(),
            reason: format!("{err:#}"),
        })?;

        let weights = config.model.weights();
        let classifier = CnnClassifier::load(&ml::ModelConfig {
            weight_path: weights.to_path_buf(),
            input_size: config.model.input_size(),
            num_classes: labels.len(),
        })
        .map_err(|err| OcrError::ModelLoad {
            path: weights.to_path_buf(),
            reason: format!("{err:#}"),
        })?;

        Self::new(classifier, labels, config)
    }
}

impl<C: GlyphClassifier> TranscriptionEngine<C> {
    /// Build an engine around an already constructed classifier.
    ///
    /// Fails when the configuration is invalid or when the classifier's
    /// declared input size or class count disagrees with the configuration
    /// and label map.
    pub fn new(classifier: C, labels: LabelMap, config: &EngineConfig) -> OcrResult<Self> {
        config.validate()?;

        let crop_size = config.transcriber.crop_size;
        if let Some(model_input) = classifier.input_size() {
            if model_input != crop_size {
                return Err(OcrError::InputShapeMismatch {
                    crop_size,
                    model_input,
                });
            }
        }
        if let Some(classes) = classifier.num_classes() {
            if classes != labels.len() {
                return Err(OcrError::ClassCountMismatch {
                    labels: labels.len(),
                    classes,
                });
            }
        }

        info!(
            classes = labels.len(),
            crop_size,
            word_gap = config.transcriber.word_gap,
            "transcription engine ready"
        );

        Ok(Self {
            classifier,
            labels,
            segmenter: Segmenter::new(config.segmenter),
            transcriber: Transcriber::new(config.transcriber),
            max_image_side: config.max_image_side,
        })
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Decode an image file and run the full pipeline on it.
    pub fn recognize_path(&self, image_path: impl AsRef<Path>) -> OcrResult<Recognition> {
        let path = image_path.as_ref();
        let image = image::open(path).map_err(|source| OcrError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        self.recognize_image(&image)
    }

    /// Run segmentation and transcription on an already decoded image.
    pub fn recognize_image(&self, image: &DynamicImage) -> OcrResult<Recognition> {
        let (width, height) = (image.width(), image.height());
        if width.max(height) > self.max_image_side {
            return Err(OcrError::ImageTooLarge {
                width,
                height,
                limit: self.max_image_side,
            });
        }

        let start = Instant::now();
        let segmentation = self.segmenter.segment(image);
        let transcription = self.transcriber.transcribe(
            &segmentation.boxes,
            &segmentation.mask,
            &self.classifier,
            &self.labels,
        )?;
        debug!(
            glyphs = segmentation.boxes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "recognized image"
        );

        Ok(Recognition {
            transcription,
            segmentation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::error::ErrorKind;
    use anyhow::Result;
    use ml::{ClassScores, GlyphInput};

    struct Fixed {
        size: Option<u32>,
        classes: Option<usize>,
    }

    impl GlyphClassifier for Fixed {
        fn classify(&self, _: &GlyphInput) -> Result<ClassScores> {
            Ok(ClassScores::new(vec![1.0, 0.0]))
        }

        fn input_size(&self) -> Option<u32> {
            self.size
        }

        fn num_classes(&self) -> Option<usize> {
            self.classes
        }
    }

    fn labels() -> LabelMap {
        LabelMap::new(vec!["a".into(), "i".into()]).unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig::new(ModelConfig::new("unused", "unused.json"))
    }

    #[test]
    fn new_checks_declared_input_size() {
        let ok = TranscriptionEngine::new(
            Fixed {
                size: Some(64),
                classes: Some(2),
            },
            labels(),
            &config(),
        );
        assert!(ok.is_ok());

        let err = TranscriptionEngine::new(
            Fixed {
                size: Some(48),
                classes: None,
            },
            labels(),
            &config(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            OcrError::InputShapeMismatch {
                crop_size: 64,
                model_input: 48
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Initialization);
    }

    #[test]
    fn new_checks_class_count() {
        let err = TranscriptionEngine::new(
            Fixed {
                size: None,
                classes: Some(11),
            },
            labels(),
            &config(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            OcrError::ClassCountMismatch {
                labels: 2,
                classes: 11
            }
        ));
    }

    #[test]
    fn oversized_images_are_rejected_before_segmentation() {
        let mut cfg = config();
        cfg.max_image_side = 32;
        let engine = TranscriptionEngine::new(
            Fixed {
                size: None,
                classes: None,
            },
            labels(),
            &cfg,
        )
        .unwrap();
        let err = engine
            .recognize_image(&DynamicImage::new_luma8(40, 10))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn load_fails_on_missing_labels() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let err = TranscriptionEngine::load(&EngineConfig::new(ModelConfig::from_dir(dir.path())))
            .err()
            .unwrap();
        assert!(matches!(err, OcrError::LabelMap { .. }));
        assert_eq!(err.kind(), ErrorKind::Initialization);
        Ok(())
    }

    #[test]
    fn load_fails_on_missing_weights() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("index_to_label.json"), r#"{"0": "a"}"#)?;
        let err = TranscriptionEngine::load(&EngineConfig::new(ModelConfig::from_dir(dir.path())))
            .err()
            .unwrap();
        assert!(matches!(err, OcrError::ModelLoad { .. }));
        Ok(())
    }
}
