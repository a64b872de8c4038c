//! Border-seeded flood fill segmentation
//!
//! Background is whatever is reachable from the image border through pixels
//! similar to the seed colour. Every fill compares against its own seed's
//! colour, never the neighbour it came from, so regions cannot drift across
//! slow gradients. Fills accumulate: a pixel cleared once stays cleared.

use super::{rgb_distance, MaskGenerator};
use crate::{
    error::Result,
    services::ProcessingStage,
    types::{Bitmap, OpacityMask, CHANNELS},
};
use tracing::instrument;

/// Default number of seeds sampled along each edge
pub const SEEDS_PER_EDGE: u32 = 20;

/// Flood fill from the four corners, then from points along the edges
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetectGenerator {
    seeds_per_edge: u32,
}

impl Default for EdgeDetectGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeDetectGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            seeds_per_edge: SEEDS_PER_EDGE,
        }
    }

    /// Override the edge sampling density (at least one seed per edge)
    #[must_use]
    pub fn with_seeds_per_edge(mut self, seeds: u32) -> Self {
        self.seeds_per_edge = seeds.max(1);
        self
    }

    /// The four corners, top-left first, clockwise
    #[must_use]
    pub fn corner_seeds(width: u32, height: u32) -> Vec<(u32, u32)> {
        let (right, bottom) = (width.saturating_sub(1), height.saturating_sub(1));
        vec![(0, 0), (right, 0), (right, bottom), (0, bottom)]
    }

    /// Evenly spaced points along all four edges, `step = max(1, dimension / seeds_per_edge)`
    #[must_use]
    pub fn edge_seeds(&self, width: u32, height: u32) -> Vec<(u32, u32)> {
        let (right, bottom) = (width.saturating_sub(1), height.saturating_sub(1));
        let step_x = (width / self.seeds_per_edge).max(1) as usize;
        let step_y = (height / self.seeds_per_edge).max(1) as usize;

        let mut seeds = Vec::new();
        for x in (0..width).step_by(step_x) {
            seeds.push((x, 0));
            seeds.push((x, bottom));
        }
        for y in (0..height).step_by(step_y) {
            seeds.push((0, y));
            seeds.push((right, y));
        }
        seeds
    }
}

impl MaskGenerator for EdgeDetectGenerator {
    fn name(&self) -> &'static str {
        "edge-detect"
    }

    fn generate(&self, bitmap: &Bitmap, tolerance: u8) -> Result<OpacityMask> {
        self.generate_with_progress(bitmap, tolerance, &mut |_| {})
    }

    #[instrument(level = "debug", skip(self, bitmap, on_stage), fields(width = bitmap.width(), height = bitmap.height()))]
    fn generate_with_progress(
        &self,
        bitmap: &Bitmap,
        tolerance: u8,
        on_stage: &mut dyn FnMut(ProcessingStage),
    ) -> Result<OpacityMask> {
        on_stage(ProcessingStage::MaskGeneration);
        let mut fill = RegionFill::new(bitmap, tolerance);

        on_stage(ProcessingStage::CornerSeedFill);
        let corner_cleared: usize = Self::corner_seeds(bitmap.width(), bitmap.height())
            .into_iter()
            .map(|(x, y)| fill.fill_from(x, y))
            .sum();

        on_stage(ProcessingStage::EdgeSeedFill);
        let edge_seeds = self.edge_seeds(bitmap.width(), bitmap.height());
        let seed_count = edge_seeds.len();
        let edge_cleared: usize = edge_seeds
            .into_iter()
            .map(|(x, y)| fill.fill_from(x, y))
            .sum();

        tracing::debug!(
            corner_cleared,
            edge_cleared,
            edge_seeds = seed_count,
            fills_run = fill.fills_run,
            "Flood fill finished"
        );

        fill.into_mask()
    }
}

/// One bit per pixel, reused across fills
struct VisitedSet {
    words: Vec<u64>,
}

impl VisitedSet {
    fn with_len(len: usize) -> Self {
        Self {
            words: vec![0; (len + 63) / 64],
        }
    }

    /// Returns true if `index` was not yet visited
    fn insert(&mut self, index: usize) -> bool {
        let bit = 1u64 << (index % 64);
        match self.words.get_mut(index / 64) {
            Some(word) if *word & bit == 0 => {
                *word |= bit;
                true
            },
            _ => false,
        }
    }

    fn clear(&mut self) {
        self.words.fill(0);
    }
}

/// Accumulated state of a multi-seed flood fill
///
/// `labels` remembers which reference colour first cleared each pixel. A seed
/// already cleared by a fill with the same reference colour lies in that
/// fill's region, so filling from it again would clear nothing new.
struct RegionFill<'a> {
    bitmap: &'a Bitmap,
    limit: u32,
    mask: Vec<u8>,
    visited: VisitedSet,
    stack: Vec<usize>,
    labels: Vec<u8>,
    reference_colors: Vec<[u8; 3]>,
    fills_run: usize,
}

impl<'a> RegionFill<'a> {
    fn new(bitmap: &'a Bitmap, tolerance: u8) -> Self {
        let len = bitmap.pixel_count();
        Self {
            bitmap,
            limit: u32::from(tolerance) * 3,
            mask: vec![255; len],
            visited: VisitedSet::with_len(len),
            stack: Vec::new(),
            labels: vec![0; len],
            reference_colors: Vec::new(),
            fills_run: 0,
        }
    }

    /// Label for a reference colour, 0 once the label space is exhausted
    fn label_for(&mut self, reference: [u8; 3]) -> u8 {
        if let Some(position) = self.reference_colors.iter().position(|&c| c == reference) {
            return (position + 1) as u8;
        }
        if self.reference_colors.len() < usize::from(u8::MAX) {
            self.reference_colors.push(reference);
            self.reference_colors.len() as u8
        } else {
            0
        }
    }

    fn visit(&mut self, index: usize) {
        if self.visited.insert(index) {
            self.stack.push(index);
        }
    }

    /// Flood fill from (x, y); returns the number of newly cleared pixels
    fn fill_from(&mut self, x: u32, y: u32) -> usize {
        let bitmap = self.bitmap;
        let width = bitmap.width() as usize;
        let height = bitmap.height() as usize;

        let Some(seed_pixel) = bitmap.pixel(x, y) else {
            return 0;
        };
        let reference = [seed_pixel[0], seed_pixel[1], seed_pixel[2]];
        let seed = y as usize * width + x as usize;

        if let Some(label) = self.labels.get(seed).copied().filter(|&l| l > 0) {
            if self.reference_colors.get(usize::from(label - 1)) == Some(&reference) {
                return 0;
            }
        }

        let label = self.label_for(reference);
        self.fills_run += 1;
        self.visited.clear();
        self.stack.clear();
        self.visit(seed);

        let pixels = bitmap.pixels();
        let mut cleared = 0;

        while let Some(index) = self.stack.pop() {
            let offset = index * CHANNELS;
            let Some(pixel) = pixels.get(offset..offset + 3) else {
                continue;
            };
            if rgb_distance(pixel, reference) > self.limit {
                continue;
            }

            if let Some(value) = self.mask.get_mut(index) {
                if *value != 0 {
                    *value = 0;
                    cleared += 1;
                }
            }
            if let Some(slot) = self.labels.get_mut(index) {
                if *slot == 0 {
                    *slot = label;
                }
            }

            let (px, py) = (index % width, index / width);
            if px > 0 {
                self.visit(index - 1);
            }
            if px + 1 < width {
                self.visit(index + 1);
            }
            if py > 0 {
                self.visit(index - width);
            }
            if py + 1 < height {
                self.visit(index + width);
            }
        }

        cleared
    }

    fn into_mask(self) -> Result<OpacityMask> {
        OpacityMask::new(self.bitmap.width(), self.bitmap.height(), self.mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(width: u32, height: u32, border: u32) -> Bitmap {
        let mut bitmap = Bitmap::filled(width, height, [255, 255, 255, 255]).unwrap();
        for y in border..height - border {
            for x in border..width - border {
                bitmap.set_pixel(x, y, [200, 0, 0, 255]);
            }
        }
        bitmap
    }

    #[test]
    fn test_seed_layout() {
        assert_eq!(
            EdgeDetectGenerator::corner_seeds(100, 50),
            vec![(0, 0), (99, 0), (99, 49), (0, 49)]
        );

        let seeds = EdgeDetectGenerator::new().edge_seeds(100, 50);
        // step_x = 5 -> 20 columns, step_y = 2 -> 25 rows, each on two edges
        assert_eq!(seeds.len(), 90);
        assert!(seeds.contains(&(95, 49)));
        assert!(seeds.contains(&(99, 48)));

        // Tiny images fall back to a step of one
        assert_eq!(EdgeDetectGenerator::new().edge_seeds(3, 2).len(), 10);
    }

    #[test]
    fn test_uniform_image_fully_cleared() {
        let bitmap = Bitmap::filled(30, 20, [12, 34, 56, 255]).unwrap();
        let mask = EdgeDetectGenerator::new().generate(&bitmap, 0).unwrap();
        assert_eq!(mask.statistics().transparent_pixels, 600);
    }

    #[test]
    fn test_enclosed_subject_kept() {
        let bitmap = framed(40, 40, 10);
        let mask = EdgeDetectGenerator::new().generate(&bitmap, 128).unwrap();

        assert_eq!(mask.value(0, 0), Some(0));
        assert_eq!(mask.value(9, 20), Some(0));
        assert_eq!(mask.value(10, 10), Some(255));
        assert_eq!(mask.value(29, 29), Some(255));
        assert_eq!(mask.statistics().opaque_pixels, 400);
    }

    #[test]
    fn test_fill_compares_against_seed_colour() {
        // Each step is 30 apart in RGB distance, within the limit, but the
        // fill must stop once the distance to the seed exceeds it.
        let pixels = (0..10u8).flat_map(|i| [i * 10, i * 10, i * 10, 255]).collect();
        let bitmap = Bitmap::new(10, 1, pixels).unwrap();

        let mut fill = RegionFill::new(&bitmap, 10);
        assert_eq!(fill.fill_from(0, 0), 2);
        let mask = fill.into_mask().unwrap();
        assert_eq!(&mask.values()[..3], &[0, 0, 255]);
    }

    #[test]
    fn test_cleared_pixels_stay_cleared() {
        // Left half dark, right half slightly lighter; second seed would not
        // clear the left half by itself.
        let mut bitmap = Bitmap::filled(4, 1, [0, 0, 0, 255]).unwrap();
        bitmap.set_pixel(2, 0, [100, 100, 100, 255]);
        bitmap.set_pixel(3, 0, [100, 100, 100, 255]);

        let mut fill = RegionFill::new(&bitmap, 0);
        assert_eq!(fill.fill_from(0, 0), 2);
        assert_eq!(fill.fill_from(3, 0), 2);
        assert_eq!(fill.into_mask().unwrap().values(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_same_colour_seed_is_skipped() {
        let bitmap = Bitmap::filled(8, 8, [90, 90, 90, 255]).unwrap();
        let mut fill = RegionFill::new(&bitmap, 5);
        fill.fill_from(0, 0);
        fill.fill_from(7, 7);
        fill.fill_from(3, 0);
        assert_eq!(fill.fills_run, 1);
    }

    #[test]
    fn test_phase_order_does_not_change_mask() {
        let mut bitmap = framed(41, 33, 6);
        // A second background tone reachable only from part of the border
        for y in 0..33 {
            bitmap.set_pixel(40, y, [255, 255, 180, 255]);
        }
        let generator = EdgeDetectGenerator::new();
        let corners = EdgeDetectGenerator::corner_seeds(41, 33);
        let edges = generator.edge_seeds(41, 33);

        let mut forward = RegionFill::new(&bitmap, 20);
        for &(x, y) in corners.iter().chain(edges.iter()) {
            forward.fill_from(x, y);
        }
        let mut backward = RegionFill::new(&bitmap, 20);
        for &(x, y) in edges.iter().chain(corners.iter()) {
            backward.fill_from(x, y);
        }

        assert_eq!(forward.into_mask().unwrap(), backward.into_mask().unwrap());
    }

    #[test]
    fn test_progress_phases_in_order() {
        let bitmap = framed(20, 20, 5);
        let mut stages = Vec::new();
        EdgeDetectGenerator::new()
            .generate_with_progress(&bitmap, 50, &mut |stage| stages.push(stage))
            .unwrap();
        assert_eq!(
            stages,
            vec![
                ProcessingStage::MaskGeneration,
                ProcessingStage::CornerSeedFill,
                ProcessingStage::EdgeSeedFill,
            ]
        );
    }

    #[test]
    fn test_large_uniform_region_without_recursion() {
        let bitmap = Bitmap::filled(1000, 1000, [1, 2, 3, 255]).unwrap();
        let mask = EdgeDetectGenerator::new().generate(&bitmap, 1).unwrap();
        assert!(mask.values().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_visited_set() {
        let mut visited = VisitedSet::with_len(130);
        assert!(visited.insert(129));
        assert!(!visited.insert(129));
        assert!(!visited.insert(500));
        visited.clear();
        assert!(visited.insert(129));
    }
}
