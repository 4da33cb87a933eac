use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use image::DynamicImage;
use ocr::{
    EngineConfig, GlyphClassifier, ModelConfig, OcrError, OcrResult, Recognition,
    TranscriptionEngine,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line arguments: model location, optional tuning, and the images
/// to transcribe.
#[derive(Parser, Debug)]
#[command(
    name = "brahmi-lens",
    version,
    about = "Segment and transcribe Brahmi manuscript images"
)]
struct Args {
    /// Model directory (contains glyph_net.mpk and index_to_label.json)
    #[arg(long)]
    model_dir: PathBuf,

    /// JSON engine configuration; its model paths are replaced by --model-dir
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write `<stem>_mask.png` and `<stem>_boxes.png` for every image here
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Print each recognition as JSON instead of plain text
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Images to transcribe
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    run(args)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the engine once, then transcribes every image in order.
///
/// A failing image is reported and skipped; the exit status reflects whether
/// any image failed.
fn run(args: Args) -> Result<()> {
    let config = engine_config(&args)?;
    let engine = TranscriptionEngine::load(&config).context("failed to start engine")?;

    if let Some(dir) = &args.debug_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create debug dir {}", dir.display()))?;
    }

    let mut failed = 0usize;
    for path in &args.images {
        match recognize(&engine, path) {
            Ok((image, recognition)) => {
                report(path, &recognition, args.json)?;
                if let Some(dir) = &args.debug_dir {
                    write_debug_images(dir, path, &image, &recognition)?;
                }
            }
            Err(err) => {
                failed += 1;
                error!(image = %path.display(), kind = err.kind().as_str(), "{err}");
                println!("{}: {} error", path.display(), err.kind().as_str());
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} images failed", args.images.len());
    }
    Ok(())
}

/// Decodes `path` once so the same bitmap feeds recognition and the debug
/// overlay.
fn recognize<C: GlyphClassifier>(
    engine: &TranscriptionEngine<C>,
    path: &Path,
) -> OcrResult<(DynamicImage, Recognition)> {
    let image = image::open(path).map_err(|source| OcrError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let recognition = engine.recognize_image(&image)?;
    Ok((image, recognition))
}

fn engine_config(args: &Args) -> Result<EngineConfig> {
    let model = ModelConfig::from_dir(&args.model_dir);
    match &args.config {
        Some(path) => {
            let mut config = EngineConfig::from_json_file(path)?;
            config.model = model.with_input_size(config.model.input_size());
            Ok(config)
        }
        None => Ok(EngineConfig::new(model)),
    }
}

fn report(path: &Path, recognition: &Recognition, json: bool) -> Result<()> {
    let transcription = &recognition.transcription;
    if json {
        let value = serde_json::json!({
            "image": path.display().to_string(),
            "text": transcription.text(),
            "boxes": &recognition.segmentation.boxes,
            "tokens": transcription.tokens(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}: {}", path.display(), transcription);
    }
    Ok(())
}

fn write_debug_images(
    dir: &Path,
    path: &Path,
    image: &DynamicImage,
    recognition: &Recognition,
) -> Result<()> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    let mask_path = dir.join(format!("{stem}_mask.png"));
    recognition
        .segmentation
        .mask
        .save(&mask_path)
        .with_context(|| format!("failed to write {}", mask_path.display()))?;

    let boxes_path = dir.join(format!("{stem}_boxes.png"));
    recognition
        .segmentation
        .annotate(image)
        .save(&boxes_path)
        .with_context(|| format!("failed to write {}", boxes_path.display()))?;

    info!(mask = %mask_path.display(), boxes = %boxes_path.display(), "wrote debug images");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use ocr::{ClassScores, ErrorKind, GlyphInput, LabelMap};

    fn engine() -> Result<TranscriptionEngine<impl GlyphClassifier>> {
        let constant =
            |_: &GlyphInput| -> Result<ClassScores> { Ok(ClassScores::new(vec![1.0, 0.0])) };
        let labels = LabelMap::new(vec!["Ka".into(), "Ma".into()])?;
        let config = EngineConfig::new(ModelConfig::new("unused", "unused.json"));
        Ok(TranscriptionEngine::new(constant, labels, &config)?)
    }

    fn fragment() -> DynamicImage {
        let mut gray = GrayImage::from_pixel(60, 40, Luma([255]));
        for y in 5..35 {
            for x in 10..30 {
                gray.put_pixel(x, y, Luma([0]));
            }
        }
        DynamicImage::ImageLuma8(gray)
    }

    #[test]
    fn undecodable_input_is_reported_as_decode_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.png");
        fs::write(&path, b"\x89PNG truncated")?;

        let err = recognize(&engine()?, &path)
            .err()
            .ok_or_else(|| anyhow::anyhow!("broken file was decoded"))?;
        assert_eq!(err.kind(), ErrorKind::Decode);
        Ok(())
    }

    #[test]
    fn debug_images_reuse_the_decoded_bitmap() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("fragment.png");
        fragment().save(&path)?;

        let (image, recognition) = recognize(&engine()?, &path)?;
        assert_eq!(recognition.transcription.text(), "Ka");
        assert_eq!((image.width(), image.height()), (60, 40));

        let out = dir.path().join("debug");
        fs::create_dir_all(&out)?;
        write_debug_images(&out, &path, &image, &recognition)?;

        let mask = image::open(out.join("fragment_mask.png"))?;
        let boxes = image::open(out.join("fragment_boxes.png"))?.to_rgb8();
        assert_eq!((mask.width(), mask.height()), (60, 40));
        assert_eq!(boxes.get_pixel(10, 5), &image::Rgb([255, 64, 64]));
        Ok(())
    }
}
