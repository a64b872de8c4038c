//! Boundary filters applied after segmentation
//!
//! Both filters only touch the rim of the cutout: opaque pixels with at least
//! one fully transparent 4-neighbour. Pixels within `radius` of the image
//! border are never modified.

pub mod feather;
pub mod refine;

pub use feather::feather_mask;
pub use refine::refine_edges;

/// Whether the pixel at `index` is opaque and 4-adjacent to a transparent pixel
///
/// `index` must not lie on the outermost row or column.
#[inline]
pub(crate) fn is_rim(opacity: impl Fn(usize) -> u8, index: usize, width: usize) -> bool {
    opacity(index) > 0
        && (opacity(index - 1) == 0
            || opacity(index + 1) == 0
            || opacity(index - width) == 0
            || opacity(index + width) == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rim_detection() {
        #[rustfmt::skip]
        let values = [
            0,   0,   0,
            255, 255, 255,
            255, 255, 255,
            255, 255, 255,
        ];
        let at = |i: usize| values[i];
        assert!(is_rim(at, 4, 3));
        assert!(!is_rim(at, 7, 3));
    }

    #[test]
    fn test_transparent_pixel_is_not_rim() {
        let values = [255, 0, 255, 0, 0, 0, 255, 0, 255];
        assert!(!is_rim(|i: usize| values[i], 4, 3));
    }
}
