use crate::color::Color32;
use crate::image::Image;

/// One 4x4 tile of BGRA texels in row-major order.
///
/// Tiles that straddle the right or bottom image edge replicate the last
/// valid row/column, so no caller ever reads out of bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorBlock {
    colors: [Color32; 16],
}

impl ColorBlock {
    pub fn new(colors: [Color32; 16]) -> Self {
        Self { colors }
    }

    /// Extract the tile whose top-left texel is `(x, y)`, clamping to the
    /// image edges.
    pub fn from_image(image: &Image, x: u32, y: u32) -> Self {
        let w = image.width();
        let h = image.height();

        let mut colors = [Color32::default(); 16];
        for row in 0..4 {
            let sy = (y + row).min(h - 1);
            for col in 0..4 {
                let sx = (x + col).min(w - 1);
                colors[(row * 4 + col) as usize] = image.pixel(sx, sy);
            }
        }
        Self { colors }
    }

    pub fn color(&self, i: usize) -> Color32 {
        self.colors[i]
    }

    pub fn colors(&self) -> &[Color32; 16] {
        &self.colors
    }

    pub fn set_color(&mut self, i: usize, c: Color32) {
        self.colors[i] = c;
    }

    /// True when every texel has the same RGB value. Alpha is not compared.
    pub fn is_single_color(&self) -> bool {
        let first = self.colors[0];
        self.colors[1..]
            .iter()
            .all(|c| c.r == first.r && c.g == first.g && c.b == first.b)
    }

    /// True when any texel is not fully opaque.
    pub fn has_alpha(&self) -> bool {
        self.colors.iter().any(|c| c.a != 255)
    }

    /// Axis-aligned RGB bounding box, shrunk by 1/16 of its extent on each
    /// side to compensate for endpoint extrapolation under the 1/3-2/3
    /// interpolation rule. Returns `(max_corner, min_corner)`.
    pub fn bounds_range(&self) -> (Color32, Color32) {
        let mut min = [255u8; 3];
        let mut max = [0u8; 3];

        for c in &self.colors {
            let rgb = [c.r, c.g, c.b];
            for i in 0..3 {
                min[i] = min[i].min(rgb[i]);
                max[i] = max[i].max(rgb[i]);
            }
        }

        for i in 0..3 {
            let inset = (max[i] - min[i]) >> 4;
            max[i] -= inset;
            min[i] += inset;
        }

        (
            Color32::new(max[0], max[1], max[2], 255),
            Color32::new(min[0], min[1], min[2], 255),
        )
    }

    /// Bounding range over all four channels, used by the fast DXT5 path.
    pub fn bounds_range_alpha(&self) -> (Color32, Color32) {
        let (mut max, mut min) = self.bounds_range();

        let mut min_a = 255u8;
        let mut max_a = 0u8;
        for c in &self.colors {
            min_a = min_a.min(c.a);
            max_a = max_a.max(c.a);
        }
        max.a = max_a;
        min.a = min_a;

        (max, min)
    }

    /// Move the X coordinate into alpha and the Y coordinate into green,
    /// zeroing red and blue. This is the layout the DXT5n decoder expects.
    pub fn swizzle_dxt5n(&mut self) {
        for c in &mut self.colors {
            *c = Color32::new(0, c.g, 0, c.r);
        }
    }

    /// Broadcast the red channel into every channel, so the alpha
    /// compressors see it.
    pub fn splat_x(&mut self) {
        for c in &mut self.colors {
            *c = Color32::new(c.r, c.r, c.r, c.r);
        }
    }

    /// Broadcast the green channel into every channel.
    pub fn splat_y(&mut self) {
        for c in &mut self.colors {
            *c = Color32::new(c.g, c.g, c.g, c.g);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;

    fn gradient_image(w: u32, h: u32) -> Image {
        let mut img = Image::new(w, h);
        for y in 0..h {
            for x in 0..w {
                img.set_pixel(x, y, Color32::new((x * 40) as u8, (y * 40) as u8, 0, 255));
            }
        }
        img
    }

    #[test]
    fn edge_tiles_clamp_instead_of_reading_out_of_bounds() {
        // 6x6 image: the tile at (4, 4) only has a 2x2 valid region.
        let img = gradient_image(6, 6);
        let block = ColorBlock::from_image(&img, 4, 4);

        // Rightmost valid column is x=5, bottom row is y=5.
        assert_eq!(block.color(0), img.pixel(4, 4));
        assert_eq!(block.color(2), img.pixel(5, 4));
        assert_eq!(block.color(3), img.pixel(5, 4));
        assert_eq!(block.color(15), img.pixel(5, 5));
    }

    #[test]
    fn single_color_ignores_alpha() {
        let mut colors = [Color32::new(10, 20, 30, 255); 16];
        colors[7].a = 0;
        assert!(ColorBlock::new(colors).is_single_color());
        colors[7].g = 21;
        assert!(!ColorBlock::new(colors).is_single_color());
    }

    #[test]
    fn bounds_range_insets_by_a_sixteenth() {
        let mut colors = [Color32::new(0, 0, 0, 255); 16];
        colors[0] = Color32::new(255, 255, 255, 255);
        let (max, min) = ColorBlock::new(colors).bounds_range();
        assert_eq!((max.r, max.g, max.b), (240, 240, 240));
        assert_eq!((min.r, min.g, min.b), (15, 15, 15));
    }

    #[test]
    fn dxt5n_swizzle_moves_x_to_alpha_and_zeroes_red_blue() {
        let mut block = ColorBlock::new([Color32::new(200, 100, 50, 25); 16]);
        block.swizzle_dxt5n();
        assert_eq!(block.color(0), Color32::new(0, 100, 0, 200));
    }
}
