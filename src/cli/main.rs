//! Background Removal CLI Tool
//!
//! Command-line interface for removing backgrounds from images with the segmentation pipeline.

use super::config::{CliConfigBuilder, GeometryPlan};
use crate::{
    batch::{run_in_order, BatchReport, CancellationToken},
    geometry::{crop, crop_and_resample, crop_to_aspect, rotate_quarter_turns, BatchCropSpec},
    processor::SegmentationPipeline,
    services::{ImageCodec, ProgressTracker},
    tracing_config::{events, init_cli_tracing, spans},
    types::Bitmap,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif"];

/// Background removal CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "nobg")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories (use "-" for stdin)
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<String>,

    /// Output file (single input) or directory (multiple inputs). Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Segmentation method [default: edge-detect]
    #[arg(short, long, value_enum)]
    pub method: Option<CliMethod>,

    /// Sensitivity 0-100, higher removes more [default: 30]
    #[arg(short, long)]
    pub threshold: Option<u8>,

    /// Feather radius 0-10, 0 disables [default: 2]
    #[arg(long)]
    pub feather: Option<u8>,

    /// Colour-key background as hex (e.g. "#FFFFFF") or "auto" to detect from corners
    #[arg(long, value_name = "HEX|auto")]
    pub bg_color: Option<String>,

    /// Smooth the cutout rim with this radius 1-5, 0 disables
    #[arg(long)]
    pub refine: Option<u8>,

    /// Rotate clockwise before processing, in degrees (multiple of 90)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub rotate: i32,

    /// Centered aspect-ratio crop: 1:1, 3:2 or 4:3
    #[arg(long, value_name = "RATIO")]
    pub crop_ratio: Option<String>,

    /// Crop region "x,y,width,height"; with several inputs it is a batch crop
    #[arg(long, value_name = "X,Y,W,H")]
    pub crop: Option<String>,

    /// Input index the batch crop region is drawn against
    #[arg(long, default_value_t = 0)]
    pub crop_reference: usize,

    /// Input indices receiving the batch crop [default: all]
    #[arg(long, value_delimiter = ',')]
    pub crop_include: Option<Vec<usize>>,

    /// Process directory recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Pattern for batch processing (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// JSON configuration file; flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write a JSON batch report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Also write the opacity mask as `<stem>_mask.png`
    #[arg(long)]
    pub save_mask: bool,

    /// Show per-stage progress for each image
    #[arg(long)]
    pub progress: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Segmentation method names accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliMethod {
    EdgeDetect,
    ColorKey,
    Luminance,
}

/// Crop applied after rotation
enum CropMode {
    None,
    Aspect(crate::config::AspectRatio),
    Single(crate::types::CropRegion),
    Batch(BatchCropSpec),
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let geometry = CliConfigBuilder::geometry_from_cli(&cli)?;

    info!("Starting background removal CLI");
    info!("Input(s): {}", cli.input.join(", "));
    info!(
        "Method: {}, threshold: {}, feather: {}",
        config.method,
        config.threshold.value(),
        config.feather_radius
    );

    let mut pipeline =
        SegmentationPipeline::new(config).context("Failed to create segmentation pipeline")?;
    if cli.progress {
        pipeline.set_progress_tracker(Some(ProgressTracker::console(cli.verbose > 0)));
    }

    let cancellation = CancellationToken::new();
    let interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current image");
            interrupt.cancel();
        }
    });

    let session = spans::session(&session_id, pipeline.config().method.as_str());
    let start_time = Instant::now();
    let processed_count =
        session.in_scope(|| process_inputs(&cli, &geometry, &mut pipeline, &cancellation))?;

    info!(
        "Processed {} image(s) in {:.2}s",
        processed_count,
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

fn process_inputs(
    cli: &Cli,
    geometry: &GeometryPlan,
    pipeline: &mut SegmentationPipeline,
    cancellation: &CancellationToken,
) -> Result<usize> {
    if cli.input.len() == 1 && cli.input.first().is_some_and(|s| s == "-") {
        return process_stdin(cli.output.as_deref(), geometry, pipeline);
    }

    let all_files = collect_input_files(cli)?;
    if all_files.is_empty() {
        events::warning_with_recommendation(
            "No supported image files found in the provided inputs",
            &format!("pass files or directories with one of: {}", IMAGE_EXTENSIONS.join(", ")),
        );
        return Ok(0);
    }

    events::progress(&format!("Found {} image file(s) to process", all_files.len()), "🔍");

    let file_count = all_files.len();
    let crop_mode = resolve_crop_mode(geometry, &all_files)?;
    let output_dir = prepare_output_dir(cli.output.as_deref(), file_count)?;

    let indicatif_progress = if !cli.progress && file_count > 1 {
        let pb = ProgressBar::new(file_count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let batch_span = spans::batch_processing(file_count);
    let _batch_guard = batch_span.enter();

    let report = run_in_order(
        all_files.as_slice(),
        cancellation,
        |path| path.display().to_string(),
        |position, input_file| {
            if let Some(ref pb) = indicatif_progress {
                pb.set_message(format!("Processing {}", input_file.display()));
            }

            let output_path = match (&output_dir, cli.output.as_deref()) {
                (Some(dir), _) => generate_output_path_with_dir(input_file, dir),
                (None, Some(target)) if file_count == 1 => PathBuf::from(target),
                _ => generate_output_path(input_file),
            };

            let file_span = spans::file_processing(input_file);
            let outcome = file_span.in_scope(|| {
                process_single_file(
                    pipeline,
                    position.index,
                    input_file,
                    geometry,
                    &crop_mode,
                    &output_path,
                    cli.save_mask,
                )
            });

            if let Some(ref pb) = indicatif_progress {
                pb.inc(1);
            }

            match outcome {
                Ok(()) => {
                    debug!("Processed: {}", input_file.display());
                    // Written to disk; the PNG payload is not retained for the report
                    Ok(Vec::new())
                },
                Err(e) => {
                    error!("❌ Failed to process {}: {:#}", input_file.display(), e);
                    Err(format!("{:#}", e))
                },
            }
        },
    );
    let processed_count = report.succeeded().count();
    let failed_count = report.failed().count();

    if let Some(pb) = indicatif_progress {
        pb.finish_with_message(format!(
            "Completed! Processed: {processed_count}, Failed: {failed_count}"
        ));
    }

    let batch_total_time = Duration::from_millis(report.total_ms);
    if report.cancelled {
        warn!(
            "Batch cancelled: {} image(s) skipped",
            report.skipped().count()
        );
    }
    if failed_count > 0 {
        warn!("Some files failed to process. Processed: {processed_count}, Failed: {failed_count}");
    }

    if file_count > 1 {
        info!("📊 Batch processing summary:");
        info!("  ├─ Files processed: {}", processed_count);
        info!("  ├─ Files failed: {}", failed_count);
        info!("  ├─ Total time: {:.2}s", batch_total_time.as_secs_f64());
        info!(
            "  └─ Average per file: {:.2}s",
            if processed_count > 0 {
                batch_total_time.as_secs_f64() / (processed_count as f64)
            } else {
                0.0
            }
        );
    }
    events::performance_metric("batch", report.total_ms, Some(file_count));

    if let Some(report_path) = &cli.report {
        write_report(&report, report_path)?;
    }

    Ok(processed_count)
}

/// Load, transform, segment and save one input file
fn process_single_file(
    pipeline: &mut SegmentationPipeline,
    index: usize,
    input_path: &Path,
    geometry: &GeometryPlan,
    crop_mode: &CropMode,
    output_path: &Path,
    save_mask: bool,
) -> Result<()> {
    let bitmap = ImageCodec::load(input_path)
        .with_context(|| format!("Failed to load {}", input_path.display()))?;
    let bitmap = if geometry.is_identity() {
        bitmap
    } else {
        apply_geometry(bitmap, index, geometry.quarter_turns, crop_mode)?
    };

    let mut result = pipeline
        .process_bitmap(&bitmap)
        .context("Failed to remove background")?;
    let png = result.to_png_bytes_timed()?;

    if output_path == Path::new("-") {
        write_stdout(&png)?;
    } else {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(output_path, &png)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
    }

    if save_mask && output_path != Path::new("-") {
        let mask_path = mask_path_for(output_path);
        result
            .mask
            .save_png(&mask_path)
            .with_context(|| format!("Failed to write mask {}", mask_path.display()))?;
    }

    let stats = result.mask.statistics();
    info!("📊 {} → {}", input_path.display(), output_path.display());
    info!(
        "  ├─ Removed: {:.1}% of {} pixels",
        stats.transparent_ratio * 100.0,
        stats.total_pixels
    );
    info!("  └─ {}", result.timing_summary());

    Ok(())
}

/// Rotate, then crop according to the resolved crop mode
fn apply_geometry(
    bitmap: Bitmap,
    index: usize,
    quarter_turns: i32,
    crop_mode: &CropMode,
) -> Result<Bitmap> {
    let bitmap = if quarter_turns.rem_euclid(4) == 0 {
        bitmap
    } else {
        let _span = spans::geometry("rotate", bitmap.dimensions()).entered();
        rotate_quarter_turns(&bitmap, quarter_turns)?
    };

    let _span = spans::geometry("crop", bitmap.dimensions()).entered();
    let cropped = match crop_mode {
        CropMode::None => bitmap,
        CropMode::Aspect(ratio) => crop_to_aspect(&bitmap, *ratio)?,
        CropMode::Single(region) => {
            let clamped = region.clamped_to(bitmap.width(), bitmap.height());
            if clamped != *region {
                warn!("Crop {} clamped to {} to fit the image", region, clamped);
            }
            crop(&bitmap, clamped)?
        },
        CropMode::Batch(spec) if spec.includes(index) => crop_and_resample(spec, &bitmap)?,
        CropMode::Batch(_) => bitmap,
    };

    Ok(cropped)
}

fn resolve_crop_mode(geometry: &GeometryPlan, files: &[PathBuf]) -> Result<CropMode> {
    if let Some(ratio) = geometry.aspect {
        return Ok(CropMode::Aspect(ratio));
    }

    let Some(region) = geometry.region else {
        return Ok(CropMode::None);
    };

    if files.len() == 1 {
        return Ok(CropMode::Single(region));
    }

    let reference_path = files.get(geometry.crop_reference).with_context(|| {
        format!(
            "Crop reference index {} is out of range for {} input(s)",
            geometry.crop_reference,
            files.len()
        )
    })?;

    let reference = ImageCodec::load(reference_path)
        .with_context(|| format!("Failed to load crop reference {}", reference_path.display()))?;
    let reference = if geometry.quarter_turns.rem_euclid(4) == 0 {
        reference
    } else {
        rotate_quarter_turns(&reference, geometry.quarter_turns)?
    };

    let spec = BatchCropSpec::new(
        region,
        reference.dimensions(),
        geometry.included_members(files.len()),
    )
    .context("Invalid batch crop")?;

    info!(
        "Batch crop {} against {} ({}x{}), {} member(s)",
        region,
        reference_path.display(),
        reference.width(),
        reference.height(),
        spec.members().count()
    );
    Ok(CropMode::Batch(spec))
}

/// Process image from stdin
fn process_stdin(
    output_target: Option<&str>,
    geometry: &GeometryPlan,
    pipeline: &mut SegmentationPipeline,
) -> Result<usize> {
    info!("Reading image from stdin");

    let image_data = read_stdin()?;
    let bitmap = ImageCodec::decode(&image_data).context("Failed to decode stdin image")?;

    let crop_mode = match (geometry.aspect, geometry.region) {
        (Some(ratio), _) => CropMode::Aspect(ratio),
        (None, Some(region)) => CropMode::Single(region),
        (None, None) => CropMode::None,
    };
    let bitmap = apply_geometry(bitmap, 0, geometry.quarter_turns, &crop_mode)?;

    let (result, png) = pipeline
        .process_bitmap(&bitmap)
        .and_then(|result| {
            let png = result.to_png_bytes()?;
            Ok((result, png))
        })
        .context("Failed to remove background")?;

    match output_target {
        Some(target) if target != "-" => {
            std::fs::write(target, &png).with_context(|| format!("Failed to write {target}"))?;
            info!("Saved {} ({})", target, result.timing_summary());
        },
        _ => write_stdout(&png)?,
    }

    Ok(1)
}

fn prepare_output_dir(output: Option<&str>, file_count: usize) -> Result<Option<PathBuf>> {
    if file_count <= 1 {
        return Ok(None);
    }

    let Some(output) = output else {
        return Ok(None);
    };

    if output == "-" {
        anyhow::bail!("Cannot use stdout (-) as output when processing multiple files");
    }

    let output_path = PathBuf::from(output);
    if !output_path.exists() {
        std::fs::create_dir_all(&output_path).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;
    } else if output_path.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output_path.display()
        );
    }

    Ok(Some(output_path))
}

fn write_report(report: &BatchReport, path: &Path) -> Result<()> {
    let json = report.to_json()?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    info!("Report written to {}", path.display());
    Ok(())
}

/// Collect image files from file and directory inputs, sorted
fn collect_input_files(cli: &Cli) -> Result<Vec<PathBuf>> {
    let mut all_files = Vec::new();

    for input in &cli.input {
        let path = PathBuf::from(input);

        if path.is_file() {
            if is_image_file(&path) {
                all_files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            all_files.extend(find_image_files(
                &path,
                cli.recursive,
                cli.pattern.as_deref(),
            )?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    all_files.sort();
    Ok(all_files)
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read from stdin")?;

    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }

    Ok(buffer)
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(data)
        .context("Failed to write to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let path = entry.path();
                if is_image_file(path) && matches_pattern(path, pattern) {
                    files.push(path.to_path_buf());
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if is_image_file(&path) && matches_pattern(&path, pattern) {
                    files.push(path);
                }
            }
        }
    }

    Ok(files)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            }),
        None => true,
    }
}

fn output_file_name(input_path: &Path) -> String {
    let stem = input_path.file_stem().unwrap_or_default();
    format!("{}_bg_removed.png", stem.to_string_lossy())
}

/// `<stem>_bg_removed.png` next to the input
fn generate_output_path(input_path: &Path) -> PathBuf {
    let dir = input_path.parent().unwrap_or(Path::new("."));
    dir.join(output_file_name(input_path))
}

fn generate_output_path_with_dir(input_path: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(output_file_name(input_path))
}

fn mask_path_for(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .trim_end_matches("_bg_removed")
        .to_string();
    output_path.with_file_name(format!("{stem}_mask.png"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AspectRatio, RemovalConfig};
    use crate::types::CropRegion;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let mut bitmap = Bitmap::filled(width, height, [255, 255, 255, 255]).unwrap();
        for y in height / 4..height * 3 / 4 {
            for x in width / 4..width * 3 / 4 {
                bitmap.set_pixel(x, y, [30, 60, 150, 255]);
            }
        }
        let path = dir.join(name);
        ImageCodec::save_png(&bitmap, &path).unwrap();
        path
    }

    #[test]
    fn test_output_paths() {
        let input = Path::new("/photos/cat.jpg");
        assert_eq!(
            generate_output_path(input),
            PathBuf::from("/photos/cat_bg_removed.png")
        );
        assert_eq!(
            generate_output_path_with_dir(input, Path::new("/out")),
            PathBuf::from("/out/cat_bg_removed.png")
        );
        assert_eq!(
            mask_path_for(Path::new("/out/cat_bg_removed.png")),
            PathBuf::from("/out/cat_mask.png")
        );
    }

    #[test]
    fn test_pattern_and_extension_filters() {
        assert!(is_image_file(Path::new("a.PNG")));
        assert!(is_image_file(Path::new("b.webp")));
        assert!(!is_image_file(Path::new("notes.txt")));

        assert!(matches_pattern(Path::new("dir/shot.jpg"), Some("*.jpg")));
        assert!(!matches_pattern(Path::new("dir/shot.png"), Some("*.jpg")));
        assert!(matches_pattern(Path::new("dir/shot.png"), None));
    }

    #[test]
    fn test_find_image_files_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        write_png(dir.path(), "b.png", 8, 8);
        write_png(&nested, "a.png", 8, 8);
        std::fs::write(dir.path().join("readme.txt"), "x").unwrap();

        let flat = find_image_files(dir.path(), false, None).unwrap();
        assert_eq!(flat.len(), 1);

        let mut deep = find_image_files(dir.path(), true, Some("*.png")).unwrap();
        deep.sort();
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_apply_geometry_rotate_then_crop() {
        let bitmap = Bitmap::filled(40, 20, [1, 2, 3, 255]).unwrap();

        let rotated = apply_geometry(bitmap.clone(), 0, 1, &CropMode::None).unwrap();
        assert_eq!(rotated.dimensions(), (20, 40));

        let squared = apply_geometry(bitmap.clone(), 0, 0, &CropMode::Aspect(AspectRatio::Square)).unwrap();
        assert_eq!(squared.dimensions(), (20, 20));

        // Out-of-range explicit crop is clamped on the command line
        let clamped = apply_geometry(
            bitmap,
            0,
            0,
            &CropMode::Single(CropRegion::new(30, 0, 20, 10)),
        )
        .unwrap();
        assert_eq!(clamped.dimensions(), (20, 10));
    }

    #[test]
    fn test_batch_crop_mode_and_processing() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_png(dir.path(), "a.png", 40, 32),
            write_png(dir.path(), "b.png", 80, 64),
        ];
        let geometry = GeometryPlan {
            region: Some(CropRegion::new(4, 4, 20, 16)),
            ..GeometryPlan::default()
        };

        let mode = resolve_crop_mode(&geometry, &files).unwrap();
        assert!(matches!(mode, CropMode::Batch(_)));

        let mut pipeline = SegmentationPipeline::new(RemovalConfig::default()).unwrap();
        let out_dir = dir.path().join("out");
        for (index, file) in files.iter().enumerate() {
            let output = generate_output_path_with_dir(file, &out_dir);
            process_single_file(&mut pipeline, index, file, &geometry, &mode, &output, true).unwrap();
            let written = ImageCodec::load(&output).unwrap();
            assert_eq!(written.dimensions(), (20, 16));
        }
        assert!(out_dir.join("a_mask.png").exists());
    }

    #[test]
    fn test_crop_reference_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_png(dir.path(), "a.png", 10, 10),
            write_png(dir.path(), "b.png", 10, 10),
        ];
        let geometry = GeometryPlan {
            region: Some(CropRegion::new(0, 0, 5, 5)),
            crop_reference: 5,
            ..GeometryPlan::default()
        };
        assert!(resolve_crop_mode(&geometry, &files).is_err());
    }

    #[test]
    fn test_prepare_output_dir() {
        assert!(prepare_output_dir(Some("out"), 1).unwrap().is_none());
        assert!(prepare_output_dir(Some("-"), 2).is_err());

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("results");
        let target_arg = target.to_string_lossy().to_string();
        assert_eq!(prepare_output_dir(Some(&target_arg), 3).unwrap(), Some(target.clone()));
        assert!(target.is_dir());
    }
}
