//! Command line entry points
//!
//! ```text
//! capstack                                  open the GUI
//! capstack shot1.png shot2.png              open the GUI with these images imported
//! capstack compose -i "shots/*.png" --rect 0,75,100,25 -o strip.png
//! ```
//!
//! `compose` runs headless: crop every input with one rectangle, stack the
//! crops and write a PNG. No window is created.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

use crate::error::{Error, Result};
use crate::pipeline::batch::{apply_to_all, BatchOutcome};
use crate::pipeline::compose::{compose, ComposeItem, CompositionResult, MAX_OUTPUT_WIDTH, MAX_PADDING};
use crate::pipeline::text::find_font;
use crate::state::data::ImageId;
use crate::state::edit::CropRectangle;
use crate::state::presets::{PresetStore, Settings};

/// Crop screenshots to a shared region and stack them into one image.
#[derive(Parser, Debug)]
#[command(name = "capstack", version, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Images to import when the GUI opens
    pub files: Vec<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crop and compose images without opening a window
    Compose(ComposeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ComposeArgs {
    /// Input files in composition order. Glob patterns accepted (e.g. "shots/*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Crop rectangle as x,y,width,height in percent of each image
    #[arg(long, value_parser = parse_rect, default_value = "0,75,100,25")]
    pub rect: CropRectangle,

    /// Comment for the image at the same position. Repeat once per image.
    #[arg(short, long)]
    pub comment: Vec<String>,

    /// Output PNG path. Defaults to composed-<unix-millis>.png
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Width of the composed image in pixels
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=MAX_OUTPUT_WIDTH as i64))]
    pub max_width: Option<u32>,

    /// Gap between stacked items in pixels
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=MAX_PADDING as i64))]
    pub padding: Option<u32>,

    /// JPEG quality for the intermediate crops (1-100)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Font file for comments
    #[arg(long, value_name = "FILE")]
    pub font: Option<PathBuf>,
}

/// Parse "x,y,width,height". The result is clamped into a valid rectangle.
pub fn parse_rect(text: &str) -> std::result::Result<CropRectangle, String> {
    let parts: Vec<f64> = text
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid number in '{text}': {e}"))?;

    match parts.as_slice() {
        [x, y, width, height] => Ok(CropRectangle::new(*x, *y, *width, *height)),
        _ => Err(format!("expected x,y,width,height, got '{text}'")),
    }
}

/// Outcome of a headless compose
#[derive(Debug)]
pub struct ComposeSummary {
    pub output: PathBuf,
    pub composition: CompositionResult,
    /// Inputs that could not be read or decoded
    pub failed: Vec<PathBuf>,
}

/// Run the `compose` subcommand and return the process exit code.
/// `0` when every input made it into the output, `1` otherwise.
pub fn run_compose(args: ComposeArgs) -> ExitCode {
    let start = Instant::now();

    match compose_files(&args, stored_settings()) {
        Ok(summary) => {
            for path in &summary.failed {
                eprintln!("warning: skipped {}", path.display());
            }
            println!(
                "{} ({}x{}, {} images) in {:.2}s",
                summary.output.display(),
                summary.composition.width,
                summary.composition.height,
                summary.composition.entries.len(),
                start.elapsed().as_secs_f64()
            );
            if summary.failed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn stored_settings() -> Settings {
    match PresetStore::open_default().and_then(|store| store.load_settings()) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("⚠️  Using default settings: {}", e);
            Settings::default()
        }
    }
}

/// Crop, compose and write. Flags override `settings`.
pub fn compose_files(args: &ComposeArgs, settings: Settings) -> Result<ComposeSummary> {
    let paths = resolve_inputs(&args.input);
    let max_width = args.max_width.unwrap_or(settings.max_width);
    let padding = args.padding.unwrap_or(settings.padding);
    let quality = args.quality.unwrap_or(settings.jpeg_quality);

    let mut failed = Vec::new();
    let mut items: Vec<(ImageId, Arc<[u8]>)> = Vec::new();
    let mut comments: Vec<String> = Vec::new();

    for (index, path) in paths.iter().enumerate() {
        match std::fs::read(path) {
            Ok(bytes) => {
                items.push((ImageId(index as u64), bytes.into()));
                comments.push(args.comment.get(index).cloned().unwrap_or_default());
            }
            Err(e) => {
                log::warn!("⚠️  Could not read {}: {}", path.display(), e);
                failed.push(path.clone());
            }
        }
    }

    let report = apply_to_all(&items, args.rect, quality, |progress| {
        log::debug!("{}/{} {}", progress.completed, progress.total, progress.id);
    });

    let mut compose_items = Vec::new();
    for (outcome, comment) in report.outcomes.into_iter().zip(comments) {
        match outcome {
            BatchOutcome::Cropped(_, crop) => compose_items.push(ComposeItem { crop, comment }),
            BatchOutcome::Failed(id, _) => failed.push(paths[id.0 as usize].clone()),
        }
    }

    if compose_items.is_empty() {
        return Err(Error::NothingToCompose);
    }

    let font = if compose_items.iter().any(|item| !item.comment.is_empty()) {
        find_font(args.font.as_deref().or(settings.font_path.as_deref()))
    } else {
        None
    };

    let composition = compose(&compose_items, max_width, padding, font.as_ref())?;
    let output = args.output.clone().unwrap_or_else(default_output_name);
    std::fs::write(&output, &composition.png)?;
    log::info!("💾 Wrote {}", output.display());

    Ok(ComposeSummary {
        output,
        composition,
        failed,
    })
}

/// `composed-<unix-millis>.png` in the working directory
pub fn default_output_name() -> PathBuf {
    PathBuf::from(format!("composed-{}.png", chrono::Utc::now().timestamp_millis()))
}

/// Expand literal paths and glob patterns, dropping duplicates and keeping order
pub fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    log::warn!("⚠️  Pattern '{}' matched no files", pattern);
                }
            }
            Err(e) => {
                log::warn!("⚠️  Invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}
