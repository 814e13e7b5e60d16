//! RMS error metrics used by callers to score compressed output against
//! the source.

use crate::image::FloatImage;

/// Root-mean-square color error between two images. With `alpha_weight`,
/// each squared term is scaled by the reference alpha, so fully
/// transparent texels do not count.
pub fn rms_color_error(image: &FloatImage, reference: &FloatImage, alpha_weight: bool) -> f32 {
    if image.width() != reference.width() || image.height() != reference.height() {
        return f32::MAX;
    }
    debug_assert!(image.channel_count() == 4 && reference.channel_count() == 4);

    let count = (image.width() * image.height()) as usize;
    let mut mse = 0.0f64;
    for i in 0..count {
        let r = image.pixel_index(0, i) - reference.pixel_index(0, i);
        let g = image.pixel_index(1, i) - reference.pixel_index(1, i);
        let b = image.pixel_index(2, i) - reference.pixel_index(2, i);

        let weight = if alpha_weight {
            reference.pixel_index(3, i) as f64
        } else {
            1.0
        };
        mse += (r * r) as f64 * weight;
        mse += (g * g) as f64 * weight;
        mse += (b * b) as f64 * weight;
    }

    (mse / count as f64).sqrt() as f32
}

/// Root-mean-square error of the alpha channel alone.
pub fn rms_alpha_error(image: &FloatImage, reference: &FloatImage) -> f32 {
    if image.width() != reference.width() || image.height() != reference.height() {
        return f32::MAX;
    }

    let count = (image.width() * image.height()) as usize;
    let mut mse = 0.0f64;
    for i in 0..count {
        let a = image.pixel_index(3, i) - reference.pixel_index(3, i);
        mse += (a * a) as f64;
    }

    (mse / count as f64).sqrt() as f32
}
