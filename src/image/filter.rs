//! Resampling filter kernels: box, triangle, and the Kaiser-windowed sinc,
//! plus the polyphase kernel that tabulates per-column weights for a
//! resample pass.

use std::f32::consts::PI;

/// A 1D reconstruction filter with finite support.
pub trait Filter {
    /// Half-width of the filter support.
    fn width(&self) -> f32;

    fn evaluate(&self, x: f32) -> f32;

    /// Supersampled evaluation over the pixel footprint.
    fn sample(&self, x: f32, scale: f32, samples: u32) -> f32 {
        let mut sum = 0.0;
        let inv = 1.0 / samples as f32;
        for s in 0..samples {
            let p = (x + (s as f32 + 0.5) * inv) * scale;
            sum += self.evaluate(p);
        }
        sum * inv
    }
}

pub struct BoxFilter {
    width: f32,
}

impl BoxFilter {
    pub fn new() -> Self {
        Self { width: 0.5 }
    }

    pub fn with_width(width: f32) -> Self {
        Self { width }
    }
}

impl Default for BoxFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for BoxFilter {
    fn width(&self) -> f32 {
        self.width
    }

    fn evaluate(&self, x: f32) -> f32 {
        if x.abs() <= self.width {
            1.0
        } else {
            0.0
        }
    }
}

pub struct TriangleFilter {
    width: f32,
}

impl TriangleFilter {
    pub fn new() -> Self {
        Self { width: 1.0 }
    }
}

impl Default for TriangleFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for TriangleFilter {
    fn width(&self) -> f32 {
        self.width
    }

    fn evaluate(&self, x: f32) -> f32 {
        let x = x.abs();
        if x < self.width {
            self.width - x
        } else {
            0.0
        }
    }
}

fn sinc(x: f32) -> f32 {
    if x.abs() < 1e-4 {
        // Series expansion near zero.
        1.0 + x * x * (-1.0 / 6.0 + x * x / 120.0)
    } else {
        x.sin() / x
    }
}

/// Zeroth-order modified Bessel function of the first kind.
fn bessel0(x: f32) -> f32 {
    const EPSILON_RATIO: f32 = 1e-6;
    let xh = 0.5 * x;
    let mut sum = 1.0;
    let mut pow = 1.0;
    let mut ds = 1.0;
    let mut k = 0;

    while ds > sum * EPSILON_RATIO && k < 100 {
        k += 1;
        pow *= xh / k as f32;
        ds = pow * pow;
        sum += ds;
    }
    sum
}

fn kaiser_window(x: f32, alpha: f32, half_width: f32) -> f32 {
    let ratio = x / half_width;
    let t = 1.0 - ratio * ratio;
    if t < 0.0 {
        return 0.0;
    }
    bessel0(alpha * t.sqrt()) / bessel0(alpha)
}

/// Kaiser-windowed sinc, the best of the mipmap filters.
pub struct KaiserFilter {
    width: f32,
    alpha: f32,
    stretch: f32,
}

impl KaiserFilter {
    pub fn new(width: f32) -> Self {
        Self {
            width,
            alpha: 4.0,
            stretch: 1.0,
        }
    }

    pub fn set_parameters(&mut self, alpha: f32, stretch: f32) {
        self.alpha = alpha;
        self.stretch = stretch;
    }
}

impl Filter for KaiserFilter {
    fn width(&self) -> f32 {
        self.width
    }

    fn evaluate(&self, x: f32) -> f32 {
        sinc(PI * x * self.stretch) * kaiser_window(x, self.alpha, self.width)
    }
}

/// Per-output-column filter weights for a 1D resample, normalized so each
/// column sums to one.
pub struct PolyphaseKernel {
    window_size: usize,
    length: usize,
    width: f32,
    iscale: f32,
    data: Vec<f32>,
}

impl PolyphaseKernel {
    pub fn new(filter: &dyn Filter, src_length: u32, dst_length: u32, samples: u32) -> Self {
        let scale = dst_length as f32 / src_length as f32;
        let iscale = 1.0 / scale;

        // When upsampling, the filter footprint stays one source pixel.
        let (scale, width) = if scale > 1.0 {
            (1.0, filter.width())
        } else {
            (scale, filter.width() * iscale)
        };

        let window_size = (width * 2.0).ceil() as usize + 1;
        let length = dst_length as usize;
        let mut data = vec![0.0f32; window_size * length];

        for i in 0..length {
            let center = (0.5 + i as f32) * iscale;
            let left = (center - width).floor();

            let mut total = 0.0;
            for j in 0..window_size {
                let sample = filter.sample(left + j as f32 - center, scale, samples);
                data[i * window_size + j] = sample;
                total += sample;
            }

            if total != 0.0 {
                for j in 0..window_size {
                    data[i * window_size + j] /= total;
                }
            }
        }

        Self {
            window_size,
            length,
            width,
            iscale,
            data,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    /// First source column covered by output column `i`; the stored
    /// weights start there.
    pub fn left(&self, i: usize) -> i32 {
        let center = (0.5 + i as f32) * self.iscale;
        (center - self.width).floor() as i32
    }

    pub fn value_at(&self, column: usize, x: usize) -> f32 {
        self.data[column * self.window_size + x]
    }
}
