//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliMethod};
use crate::{
    config::{AspectRatio, BackgroundColor, RemovalConfig, SegmentationMethod},
    types::CropRegion,
};
use anyhow::{Context, Result};

impl From<CliMethod> for SegmentationMethod {
    fn from(method: CliMethod) -> Self {
        match method {
            CliMethod::EdgeDetect => Self::EdgeDetect,
            CliMethod::ColorKey => Self::ColorKey,
            CliMethod::Luminance => Self::Luminance,
        }
    }
}

/// Rotation and crop applied to each input before segmentation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct GeometryPlan {
    pub(crate) quarter_turns: i32,
    pub(crate) aspect: Option<AspectRatio>,
    pub(crate) region: Option<CropRegion>,
    pub(crate) crop_reference: usize,
    /// Members receiving the batch crop (None = all)
    pub(crate) crop_include: Option<Vec<usize>>,
}

impl GeometryPlan {
    /// Whether any geometry work is requested
    pub(crate) fn is_identity(&self) -> bool {
        self.quarter_turns.rem_euclid(4) == 0 && self.aspect.is_none() && self.region.is_none()
    }

    /// Members of an `input_count`-long batch that receive the crop
    pub(crate) fn included_members(&self, input_count: usize) -> Vec<usize> {
        match &self.crop_include {
            Some(members) => members.iter().copied().filter(|i| *i < input_count).collect(),
            None => (0..input_count).collect(),
        }
    }
}

/// Convert CLI arguments to library configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the removal configuration; flags override values from `--config`
    pub(crate) fn from_cli(cli: &Cli) -> Result<RemovalConfig> {
        let base = match &cli.config {
            Some(path) => RemovalConfig::from_json_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => RemovalConfig::default(),
        };

        let mut builder = base.into_builder();

        if let Some(method) = cli.method {
            builder = builder.method(method.into());
        }
        if let Some(threshold) = cli.threshold {
            builder = builder.threshold(threshold);
        }
        if let Some(feather) = cli.feather {
            builder = builder.feather_radius(feather);
        }
        if let Some(hex) = &cli.bg_color {
            builder = if hex.eq_ignore_ascii_case("auto") {
                builder.background_color(None)
            } else {
                builder.background_color(Some(BackgroundColor::from_hex_or_default(hex)))
            };
        }
        if let Some(refine) = cli.refine {
            builder = builder.refine_radius(refine);
        }
        if cli.verbose >= 2 {
            builder = builder.debug(true);
        }

        builder.build().context("Invalid configuration")
    }

    /// Parse the rotation and crop flags
    pub(crate) fn geometry_from_cli(cli: &Cli) -> Result<GeometryPlan> {
        if cli.rotate % 90 != 0 {
            anyhow::bail!(
                "Rotation must be a multiple of 90 degrees, got {}",
                cli.rotate
            );
        }

        let aspect = cli
            .crop_ratio
            .as_deref()
            .map(str::parse::<AspectRatio>)
            .transpose()
            .context("Invalid --crop-ratio")?;

        let region = cli
            .crop
            .as_deref()
            .map(str::parse::<CropRegion>)
            .transpose()
            .context("Invalid --crop")?;

        Ok(GeometryPlan {
            quarter_turns: cli.rotate / 90,
            aspect,
            region,
            crop_reference: cli.crop_reference,
            crop_include: cli.crop_include.clone(),
        })
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.crop.is_some() && cli.crop_ratio.is_some() {
            anyhow::bail!("--crop and --crop-ratio cannot be combined");
        }

        if cli.crop.is_none() && (cli.crop_include.is_some() || cli.crop_reference != 0) {
            anyhow::bail!("--crop-reference and --crop-include require --crop");
        }

        if let Some(hex) = &cli.bg_color {
            if !hex.eq_ignore_ascii_case("auto") && BackgroundColor::from_hex(hex).is_err() {
                log::warn!("Background colour '{}' is not valid hex, using white", hex);
            }
        }

        Self::geometry_from_cli(cli)?;
        Ok(())
    }
}
