//! Behavioural properties of the mask generators and the full pipeline
//!
//! Fixtures are synthesized in code so every expected value can be derived by hand.

use nobg::{
    config::{BackgroundColor, RemovalConfig, SegmentationMethod, Threshold},
    error::Result,
    mask::{ColorKeyGenerator, EdgeDetectGenerator, LuminanceGenerator, MaskGenerator},
    services::{
        CallbackProgressReporter, ImageCodec, ProcessingStage, ProgressTracker, ProgressUpdate,
    },
    types::Bitmap,
    SegmentationPipeline,
};
use std::sync::{Arc, Mutex};

/// Deterministic pseudo-random bitmap (64-bit LCG)
fn noise_bitmap(width: u32, height: u32, seed: u64) -> Bitmap {
    let mut state = seed;
    let pixels = (0..width * height * 4)
        .map(|i| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            if i % 4 == 3 {
                255
            } else {
                (state >> 56) as u8
            }
        })
        .collect();
    Bitmap::new(width, height, pixels).unwrap()
}

fn subject_on_background(size: u32, margin: u32, subject: [u8; 4], background: [u8; 4]) -> Bitmap {
    let mut bitmap = Bitmap::filled(size, size, background).unwrap();
    for y in margin..size - margin {
        for x in margin..size - margin {
            bitmap.set_pixel(x, y, subject);
        }
    }
    bitmap
}

#[test]
fn test_color_key_clears_exact_background_match() -> Result<()> {
    let bitmap = noise_bitmap(32, 24, 7);
    let tolerance = Threshold::new(1).tolerance();

    for (x, y) in [(0, 0), (7, 3), (31, 23), (16, 12)] {
        let [r, g, b, _] = bitmap.pixel(x, y).unwrap();
        let generator = ColorKeyGenerator::new(Some(BackgroundColor::new(r, g, b)));
        let mask = generator.generate(&bitmap, tolerance)?;
        assert_eq!(mask.value(x, y), Some(0), "pixel ({x},{y}) should be keyed out");
    }

    Ok(())
}

#[test]
fn test_luminance_removal_is_monotonic_in_threshold() -> Result<()> {
    let bitmap = noise_bitmap(40, 40, 99);
    let generator = LuminanceGenerator::new();

    let mut previous = 0;
    for threshold in 0..=100 {
        let mask = generator.generate(&bitmap, Threshold::new(threshold).tolerance())?;
        let removed = mask.statistics().transparent_pixels;
        assert!(
            removed >= previous,
            "threshold {threshold} removed {removed}, fewer than {previous}"
        );
        previous = removed;
    }

    Ok(())
}

#[test]
fn test_edge_detect_end_to_end_white_corner_square() -> Result<()> {
    // Red field with a white 10x10 square in the top-left corner
    let mut bitmap = Bitmap::filled(100, 100, [255, 0, 0, 255])?;
    for y in 0..10 {
        for x in 0..10 {
            bitmap.set_pixel(x, y, [255, 255, 255, 255]);
        }
    }

    let tolerance = Threshold::new(50).tolerance();
    assert_eq!(tolerance, 128);
    let mask = EdgeDetectGenerator::new().generate(&bitmap, tolerance)?;

    for y in 0..10 {
        for x in 0..10 {
            assert_eq!(mask.value(x, y), Some(0));
        }
    }

    // The red field touches the other three corner seeds, so it is border
    // background too; only a subject enclosed by background survives.
    assert_eq!(mask.value(99, 99), Some(0));
    Ok(())
}

#[test]
fn test_edge_detect_keeps_enclosed_subject() -> Result<()> {
    let bitmap = subject_on_background(100, 30, [255, 0, 0, 255], [255, 255, 255, 255]);
    let mask = EdgeDetectGenerator::new().generate(&bitmap, Threshold::new(50).tolerance())?;

    assert_eq!(mask.value(0, 0), Some(0));
    assert_eq!(mask.value(29, 50), Some(0));
    assert_eq!(mask.value(30, 30), Some(255));
    assert_eq!(mask.value(50, 50), Some(255));

    let stats = mask.statistics();
    assert_eq!(stats.opaque_pixels, 40 * 40);
    assert_eq!(stats.transparent_pixels, 100 * 100 - 40 * 40);
    assert_eq!(stats.partial_pixels, 0);
    Ok(())
}

#[test]
fn test_pipeline_output_preserves_rgb_and_source() -> Result<()> {
    let source = subject_on_background(40, 10, [20, 120, 60, 255], [250, 250, 250, 255]);
    let config = RemovalConfig::builder()
        .method(SegmentationMethod::ColorKey)
        .background_hex("FAFAFA")
        .threshold(10)
        .feather_radius(0)
        .build()?;

    let result = SegmentationPipeline::new(config)?.process_bitmap(&source)?;

    assert_eq!(result.image.pixel(0, 0), Some([250, 250, 250, 0]));
    assert_eq!(result.image.pixel(20, 20), Some([20, 120, 60, 255]));
    assert_eq!(source.pixel(0, 0), Some([250, 250, 250, 255]));
    assert_eq!(result.metadata.method, "color-key");
    Ok(())
}

#[test]
fn test_feathering_softens_only_the_boundary() -> Result<()> {
    let source = subject_on_background(60, 15, [10, 10, 10, 255], [255, 255, 255, 255]);
    let hard = RemovalConfig::builder().feather_radius(0).build()?;
    let soft = RemovalConfig::builder().feather_radius(3).build()?;

    let hard = SegmentationPipeline::new(hard)?.process_bitmap(&source)?;
    let soft = SegmentationPipeline::new(soft)?.process_bitmap(&source)?;

    // Interior and far background agree
    assert_eq!(soft.mask.value(30, 30), Some(255));
    assert_eq!(soft.mask.value(2, 2), Some(0));
    assert_eq!(hard.mask.value(30, 30), soft.mask.value(30, 30));

    // The rim is pulled below fully opaque
    let rim = soft.mask.value(15, 30).unwrap();
    assert!(rim > 0 && rim < 255, "rim value {rim}");
    assert!(soft.mask.statistics().partial_pixels > 0);
    assert_eq!(hard.mask.statistics().partial_pixels, 0);
    Ok(())
}

#[test]
fn test_pipeline_progress_is_monotonic_and_completes() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let reporter = CallbackProgressReporter::new(move |update: &ProgressUpdate| {
        sink.lock().unwrap().push((update.stage, update.progress));
    });

    let png = ImageCodec::encode_png(&subject_on_background(
        24,
        6,
        [0, 0, 0, 255],
        [255, 255, 255, 255],
    ))?;

    let config = RemovalConfig::builder().refine_radius(1).build()?;
    let mut pipeline = SegmentationPipeline::new(config)?
        .with_progress_tracker(ProgressTracker::new(Box::new(reporter)));
    pipeline.process_bytes(&png)?;

    let seen = seen.lock().unwrap();
    let stages: Vec<_> = seen.iter().map(|(stage, _)| *stage).collect();
    assert_eq!(
        stages,
        vec![
            ProcessingStage::ImageLoading,
            ProcessingStage::MaskGeneration,
            ProcessingStage::CornerSeedFill,
            ProcessingStage::EdgeSeedFill,
            ProcessingStage::Feathering,
            ProcessingStage::Compositing,
            ProcessingStage::EdgeRefinement,
            ProcessingStage::Completed,
        ]
    );
    assert!(seen.windows(2).all(|pair| pair[0].1 < pair[1].1));
    assert_eq!(seen.last().map(|(_, p)| *p), Some(100));
    Ok(())
}

#[test]
fn test_pipeline_is_repeatable() -> Result<()> {
    let source = noise_bitmap(30, 30, 3);
    let mut pipeline = SegmentationPipeline::new(RemovalConfig::default())?;

    let first = pipeline.process_bitmap(&source)?;
    let second = pipeline.process_bitmap(&source)?;
    assert_eq!(first.mask, second.mask);
    assert_eq!(first.image, second.image);
    Ok(())
}
