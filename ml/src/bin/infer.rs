#![recursion_limit = "256"]

use anyhow::{Context, Result};
use clap::Parser;
use ml::{CnnClassifier, GlyphClassifier, GlyphInput, LabelMap, ModelConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ml-infer",
    about = "Classify a single Brahmi glyph image with a trained model"
)]
struct Args {
    /// Model directory (contains glyph_net.mpk and index_to_label.json)
    #[arg(long)]
    model_dir: PathBuf,

    /// Image holding one glyph
    #[arg(long)]
    image: PathBuf,

    /// Input side length the model was trained with
    #[arg(long, default_value_t = 64)]
    input_size: u32,

    /// How many ranked alternatives to print
    #[arg(long, default_value_t = 4)]
    top: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let labels = LabelMap::load(args.model_dir.join("index_to_label.json"))?;
    let classifier = CnnClassifier::load(&ModelConfig {
        weight_path: args.model_dir.join("glyph_net"),
        input_size: args.input_size,
        num_classes: labels.len(),
    })?;

    let image = image::open(&args.image)
        .with_context(|| format!("failed to read image {}", args.image.display()))?;
    let input = GlyphInput::from_dynamic(&image, args.input_size);

    let scores = classifier.classify(&input)?;
    let prediction = labels.resolve(&scores, args.top)?;

    println!(
        "Identified glyph: {} (#{}) {:.2}% match probability\n",
        prediction.label,
        prediction.class_index,
        prediction.confidence_percent()
    );

    for (rank, (label, prob)) in prediction.ranked.iter().enumerate() {
        println!("  {:>3}: {:<20} {:.4}", rank + 1, label, prob);
    }

    Ok(())
}
