//! Quarter-turn rotations

use crate::{error::Result, types::Bitmap};
use image::imageops;

/// Rotate 90 degrees clockwise: `(x, y)` moves to `(height - 1 - y, x)`
pub fn rotate90_clockwise(bitmap: &Bitmap) -> Result<Bitmap> {
    Bitmap::from_rgba_image(imageops::rotate90(&bitmap.to_rgba_image()))
}

/// Rotate clockwise by `turns` quarter turns; negative turns rotate counter-clockwise
pub fn rotate_quarter_turns(bitmap: &Bitmap, turns: i32) -> Result<Bitmap> {
    let image = bitmap.to_rgba_image();
    let rotated = match turns.rem_euclid(4) {
        1 => imageops::rotate90(&image),
        2 => imageops::rotate180(&image),
        3 => imageops::rotate270(&image),
        _ => image,
    };
    Bitmap::from_rgba_image(rotated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(width: u32, height: u32) -> Bitmap {
        let pixels = (0..width * height)
            .flat_map(|i| [(i % width) as u8, (i / width) as u8, 7, 255])
            .collect();
        Bitmap::new(width, height, pixels).unwrap()
    }

    #[test]
    fn test_clockwise_mapping() {
        let bitmap = numbered(4, 3);
        let rotated = rotate90_clockwise(&bitmap).unwrap();
        assert_eq!(rotated.dimensions(), (3, 4));

        for y in 0..3 {
            for x in 0..4 {
                assert_eq!(rotated.pixel(3 - 1 - y, x), bitmap.pixel(x, y));
            }
        }
    }

    #[test]
    fn test_four_turns_is_identity() {
        let bitmap = numbered(5, 2);
        let mut current = bitmap.clone();
        for _ in 0..4 {
            current = rotate90_clockwise(&current).unwrap();
        }
        assert_eq!(current, bitmap);
    }

    #[test]
    fn test_two_turns_is_half_turn() {
        let bitmap = numbered(5, 3);
        let twice = rotate90_clockwise(&rotate90_clockwise(&bitmap).unwrap()).unwrap();
        for y in 0..3 {
            for x in 0..5 {
                assert_eq!(twice.pixel(5 - 1 - x, 3 - 1 - y), bitmap.pixel(x, y));
            }
        }
        assert_eq!(rotate_quarter_turns(&bitmap, 2).unwrap(), twice);
    }

    #[test]
    fn test_quarter_turn_normalization() {
        let bitmap = numbered(3, 2);
        assert_eq!(rotate_quarter_turns(&bitmap, 0).unwrap(), bitmap);
        assert_eq!(rotate_quarter_turns(&bitmap, 4).unwrap(), bitmap);
        assert_eq!(
            rotate_quarter_turns(&bitmap, -1).unwrap(),
            rotate_quarter_turns(&bitmap, 3).unwrap()
        );
        assert_eq!(
            rotate_quarter_turns(&bitmap, 5).unwrap(),
            rotate90_clockwise(&bitmap).unwrap()
        );
    }
}
