//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Segmentation strategy used to build the opacity mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentationMethod {
    /// Flood fill from the image border, comparing against each seed's colour
    #[default]
    EdgeDetect,
    /// Per-pixel distance to a single background colour
    ColorKey,
    /// Per-pixel brightness cutoff
    Luminance,
}

impl SegmentationMethod {
    /// Stable identifier used in metadata and reports
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EdgeDetect => "edge-detect",
            Self::ColorKey => "color-key",
            Self::Luminance => "luminance",
        }
    }
}

impl std::fmt::Display for SegmentationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentationMethod {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to edge detection
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "color-key" | "colorkey" | "color" => Self::ColorKey,
            "luminance" | "luma" | "brightness" => Self::Luminance,
            _ => Self::EdgeDetect,
        })
    }
}

/// User-facing sensitivity, clamped to `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Threshold(u8);

impl Threshold {
    pub const MAX: u8 = 100;

    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.min(Self::MAX))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Rescaled tolerance in `[0, 255]`: `round(threshold / 100 * 255)`
    #[must_use]
    pub fn tolerance(self) -> u8 {
        (f64::from(self.0) / 100.0 * 255.0).round() as u8
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(30)
    }
}

impl From<u8> for Threshold {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<Threshold> for u8 {
    fn from(threshold: Threshold) -> Self {
        threshold.0
    }
}

/// Gaussian feather radius, clamped to `[1, 10]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatherRadius(u8);

impl FeatherRadius {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    /// `None` for 0, which disables feathering
    #[must_use]
    pub fn enabled(value: u8) -> Option<Self> {
        (value > 0).then(|| Self::new(value))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        u32::from(self.0)
    }
}

/// Edge refinement radius, clamped to `[1, 5]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct RefineRadius(u8);

impl RefineRadius {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        u32::from(self.0)
    }
}

impl From<u8> for RefineRadius {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<RefineRadius> for u8 {
    fn from(radius: RefineRadius) -> Self {
        radius.0
    }
}

/// Target ratio for centered crops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:2")]
    ThreeTwo,
    #[serde(rename = "4:3")]
    FourThree,
}

impl AspectRatio {
    /// Width divided by height
    #[must_use]
    pub fn ratio(self) -> f64 {
        match self {
            Self::Square => 1.0,
            Self::ThreeTwo => 3.0 / 2.0,
            Self::FourThree => 4.0 / 3.0,
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Square => write!(f, "1:1"),
            Self::ThreeTwo => write!(f, "3:2"),
            Self::FourThree => write!(f, "4:3"),
        }
    }
}

impl FromStr for AspectRatio {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().replace(['x', '/'], ":").as_str() {
            "1:1" => Ok(Self::Square),
            "3:2" => Ok(Self::ThreeTwo),
            "4:3" => Ok(Self::FourThree),
            _ => Err(BgRemovalError::config_value_error(
                "aspect ratio",
                s,
                "1:1, 3:2, 4:3",
                None,
            )),
        }
    }
}

/// Background colour for colour keying, exchanged as six hex digits
///
/// Deserializing a malformed value yields white, like [`from_hex_or_default`](Self::from_hex_or_default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BackgroundColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl BackgroundColor {
    pub const WHITE: Self = Self::new(255, 255, 255);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `RRGGBB`, with or without a leading `#`
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BgRemovalError::config_value_error(
                "background color",
                hex,
                "six hex digits",
                Some("FFFFFF"),
            ));
        }
        let channel = |range: std::ops::Range<usize>| {
            digits
                .get(range)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .unwrap_or(255)
        };
        Ok(Self::new(channel(0..2), channel(2..4), channel(4..6)))
    }

    /// Parse, falling back to white on malformed input
    #[must_use]
    pub fn from_hex_or_default(hex: &str) -> Self {
        Self::from_hex(hex).unwrap_or_else(|e| {
            log::warn!("{}, using white", e);
            Self::WHITE
        })
    }

    #[must_use]
    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    #[must_use]
    pub fn rgb(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<String> for BackgroundColor {
    fn from(value: String) -> Self {
        Self::from_hex_or_default(&value)
    }
}

impl From<BackgroundColor> for String {
    fn from(color: BackgroundColor) -> Self {
        color.to_hex()
    }
}

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Mask generation strategy
    pub method: SegmentationMethod,

    /// Sensitivity (0-100)
    pub threshold: Threshold,

    /// Feather radius in pixels (0 disables feathering, clamped to 10)
    #[serde(deserialize_with = "deserialize_feather_radius")]
    pub feather_radius: u8,

    /// Colour-key background (None = median of the four corners)
    pub background_color: Option<BackgroundColor>,

    /// Optional edge refinement pass after compositing
    pub refine_radius: Option<RefineRadius>,

    /// Enable debug mode (mask statistics are logged per stage)
    pub debug: bool,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            method: SegmentationMethod::default(),
            threshold: Threshold::default(),
            feather_radius: 2,
            background_color: None,
            refine_radius: None,
            debug: false,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// ```rust
    /// use nobg::{RemovalConfig, SegmentationMethod};
    ///
    /// let config = RemovalConfig::builder()
    ///     .method(SegmentationMethod::Luminance)
    ///     .threshold(40)
    ///     .feather_radius(3)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.threshold.value(), 40);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Builder seeded with this configuration, for layering overrides
    #[must_use]
    pub fn into_builder(self) -> RemovalConfigBuilder {
        RemovalConfigBuilder { config: self }
    }

    /// Feather radius, or `None` when feathering is disabled
    #[must_use]
    pub fn feather(&self) -> Option<FeatherRadius> {
        FeatherRadius::enabled(self.feather_radius)
    }

    /// Clamp out-of-range fields into their valid ranges
    ///
    /// Fields set directly on the struct bypass the builder's clamping; the
    /// pipeline normalizes every configuration it receives.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.feather_radius > FeatherRadius::MAX {
            log::debug!(
                "Feather radius {} clamped to {}",
                self.feather_radius,
                FeatherRadius::MAX
            );
            self.feather_radius = FeatherRadius::MAX;
        }
        self
    }

    /// Parse a JSON configuration document
    ///
    /// Missing fields take their defaults and numeric fields are clamped.
    ///
    /// # Errors
    /// - `InvalidConfig` when the document is not valid JSON or a field has the wrong type
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BgRemovalError::invalid_config(format!("Malformed configuration: {}", e)))?;
        Ok(config.normalized())
    }

    /// Load a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read configuration", path, &e))?;
        Self::from_json_str(&json)
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Set segmentation method
    #[must_use]
    pub fn method(mut self, method: SegmentationMethod) -> Self {
        self.config.method = method;
        self
    }

    /// Set threshold, clamped to 100
    #[must_use]
    pub fn threshold(mut self, threshold: u8) -> Self {
        self.config.threshold = Threshold::new(threshold);
        self
    }

    /// Set feather radius, clamped to 10 (0 disables)
    #[must_use]
    pub fn feather_radius(mut self, radius: u8) -> Self {
        self.config.feather_radius = radius.min(FeatherRadius::MAX);
        self
    }

    /// Set an explicit colour-key background
    #[must_use]
    pub fn background_color(mut self, color: Option<BackgroundColor>) -> Self {
        self.config.background_color = color;
        self
    }

    /// Set the colour-key background from a hex string (white if malformed)
    #[must_use]
    pub fn background_hex(mut self, hex: &str) -> Self {
        self.config.background_color = Some(BackgroundColor::from_hex_or_default(hex));
        self
    }

    /// Enable edge refinement with the given radius (0 disables)
    #[must_use]
    pub fn refine_radius(mut self, radius: u8) -> Self {
        self.config.refine_radius = (radius > 0).then(|| RefineRadius::new(radius));
        self
    }

    /// Enable debug mode
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<RemovalConfig> {
        Ok(self.config.normalized())
    }
}

fn deserialize_feather_radius<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let radius = u64::deserialize(deserializer)?;
    Ok(radius.min(u64::from(FeatherRadius::MAX)) as u8)
}
