use cgmath::{InnerSpace, Vector3};

use crate::color::Color32;
use crate::config::WrapMode;
use crate::image::{Filter, Image, PolyphaseKernel};

/// A planar multi-channel float image: one contiguous `width * height`
/// array per channel. The canonical representation for color-space
/// conversions, resampling, and normalization.
#[derive(Clone, Debug)]
pub struct FloatImage {
    width: u32,
    height: u32,
    channels: u32,
    data: Vec<f32>,
}

impl FloatImage {
    pub fn new(channels: u32, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0.0; (channels * width * height) as usize],
        }
    }

    pub fn from_image(image: &Image) -> Self {
        let mut result = Self::new(4, image.width(), image.height());
        let count = (image.width() * image.height()) as usize;
        for i in 0..count {
            let c = image.pixel_index(i);
            result.set_pixel_index(0, i, c.r as f32 / 255.0);
            result.set_pixel_index(1, i, c.g as f32 / 255.0);
            result.set_pixel_index(2, i, c.b as f32 / 255.0);
            result.set_pixel_index(3, i, c.a as f32 / 255.0);
        }
        result
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channel_count(&self) -> u32 {
        self.channels
    }

    pub fn channel(&self, c: u32) -> &[f32] {
        let size = (self.width * self.height) as usize;
        &self.data[c as usize * size..(c as usize + 1) * size]
    }

    pub fn channel_mut(&mut self, c: u32) -> &mut [f32] {
        let size = (self.width * self.height) as usize;
        &mut self.data[c as usize * size..(c as usize + 1) * size]
    }

    pub fn pixel(&self, c: u32, x: u32, y: u32) -> f32 {
        self.channel(c)[(y * self.width + x) as usize]
    }

    pub fn set_pixel(&mut self, c: u32, x: u32, y: u32, value: f32) {
        let w = self.width;
        self.channel_mut(c)[(y * w + x) as usize] = value;
    }

    pub fn pixel_index(&self, c: u32, i: usize) -> f32 {
        self.channel(c)[i]
    }

    pub fn set_pixel_index(&mut self, c: u32, i: usize, value: f32) {
        self.channel_mut(c)[i] = value;
    }

    fn wrap(coord: i32, extent: i32, mode: WrapMode) -> i32 {
        match mode {
            WrapMode::Clamp => coord.clamp(0, extent - 1),
            WrapMode::Repeat => coord.rem_euclid(extent),
            WrapMode::Mirror => {
                let period = 2 * extent;
                let m = coord.rem_euclid(period);
                if m < extent {
                    m
                } else {
                    period - 1 - m
                }
            }
        }
    }

    /// Sample with the given wrap mode applied to out-of-range
    /// coordinates.
    pub fn sample(&self, c: u32, x: i32, y: i32, wrap_mode: WrapMode) -> f32 {
        let sx = Self::wrap(x, self.width as i32, wrap_mode);
        let sy = Self::wrap(y, self.height as i32, wrap_mode);
        self.pixel(c, sx as u32, sy as u32)
    }

    /// Convert to 8-bit fixed point. Out-of-range and non-finite values
    /// clamp into the byte range.
    pub fn to_image(&self) -> Image {
        let mut image = Image::new(self.width, self.height);
        let count = (self.width * self.height) as usize;
        for i in 0..count {
            let quantize = |c: u32| -> u8 {
                if c < self.channels {
                    (255.0 * self.pixel_index(c, i)).clamp(0.0, 255.0) as u8
                } else if c == 3 {
                    255
                } else {
                    0
                }
            };
            image.set_pixel_index(
                i,
                Color32::new(quantize(0), quantize(1), quantize(2), quantize(3)),
            );
        }
        image
    }

    /// Convert to 8-bit fixed point, gamma-correcting the color channels
    /// but not alpha.
    pub fn to_image_gamma_correct(&self, gamma: f32) -> Image {
        let mut image = Image::new(self.width, self.height);
        let count = (self.width * self.height) as usize;
        let inv_gamma = 1.0 / gamma;
        for i in 0..count {
            let correct = |c: u32| -> u8 {
                let v = self.pixel_index(c, i).max(0.0).powf(inv_gamma);
                (255.0 * v).clamp(0.0, 255.0) as u8
            };
            let a = (255.0 * self.pixel_index(3, i)).clamp(0.0, 255.0) as u8;
            image.set_pixel_index(i, Color32::new(correct(0), correct(1), correct(2), a));
        }
        image
    }

    fn exponentiate(&mut self, base: u32, count: u32, power: f32) {
        for c in base..base + count {
            for v in self.channel_mut(c) {
                *v = v.max(0.0).powf(power);
            }
        }
    }

    /// From gamma space to linear space.
    pub fn to_linear(&mut self, gamma: f32) {
        self.exponentiate(0, self.channels.min(3), gamma);
    }

    /// From linear space to gamma space.
    pub fn to_gamma(&mut self, gamma: f32) {
        self.exponentiate(0, self.channels.min(3), 1.0 / gamma);
    }

    /// Renormalize the XYZ channels of a packed normal map to unit length.
    pub fn normalize_normals(&mut self) {
        let count = (self.width * self.height) as usize;
        for i in 0..count {
            let expand = |v: f32| 2.0 * v - 1.0;
            let pack = |v: f32| (v + 1.0) / 2.0;

            let n = Vector3::new(
                expand(self.pixel_index(0, i)),
                expand(self.pixel_index(1, i)),
                expand(self.pixel_index(2, i)),
            );
            let n = if n.magnitude2() > 0.0 {
                n.normalize()
            } else {
                Vector3::new(0.0, 0.0, 1.0)
            };
            self.set_pixel_index(0, i, pack(n.x));
            self.set_pixel_index(1, i, pack(n.y));
            self.set_pixel_index(2, i, pack(n.z));
        }
    }

    /// Halve the extents with a box filter. Odd extents use the polyphase
    /// weighting so the result stays centered.
    pub fn fast_down_sample(&self) -> FloatImage {
        debug_assert!(self.width > 1 || self.height > 1);

        let w = (self.width / 2).max(1);
        let h = (self.height / 2).max(1);
        let mut dst = FloatImage::new(self.channels, w, h);

        let src_w = self.width as usize;

        if self.width == 1 || self.height == 1 {
            let src_len = (self.width * self.height) as usize;
            let dst_len = (w * h) as usize;

            if src_len & 1 != 0 {
                let scale = 1.0 / (2.0 * dst_len as f32 + 1.0);
                for c in 0..self.channels {
                    let src = self.channel(c);
                    let out = dst.channel_mut(c);
                    for (x, v) in out.iter_mut().enumerate() {
                        let w0 = (dst_len - x) as f32;
                        let w1 = dst_len as f32;
                        let w2 = (1 + x) as f32;
                        *v = scale * (w0 * src[2 * x] + w1 * src[2 * x + 1] + w2 * src[2 * x + 2]);
                    }
                }
            } else {
                for c in 0..self.channels {
                    let src = self.channel(c);
                    let out = dst.channel_mut(c);
                    for (x, v) in out.iter_mut().enumerate() {
                        *v = 0.5 * (src[2 * x] + src[2 * x + 1]);
                    }
                }
            }
        } else if self.width & 1 == 0 && self.height & 1 == 0 {
            for c in 0..self.channels {
                let src = self.channel(c);
                let out = dst.channel_mut(c);
                for y in 0..h as usize {
                    for x in 0..w as usize {
                        let base = 2 * y * src_w + 2 * x;
                        out[y * w as usize + x] = 0.25
                            * (src[base] + src[base + 1] + src[base + src_w] + src[base + src_w + 1]);
                    }
                }
            }
        } else {
            // One or both extents odd: polyphase box weights keep the
            // result centered.
            for c in 0..self.channels {
                for y in 0..h {
                    for x in 0..w {
                        let mut total = 0.0f32;
                        let mut value = 0.0f32;

                        let x_taps: &[(i64, f32)] = &if self.width & 1 != 0 {
                            [
                                (2 * x as i64, (w - x) as f32),
                                (2 * x as i64 + 1, w as f32),
                                (2 * x as i64 + 2, (1 + x) as f32),
                            ]
                        } else {
                            [(2 * x as i64, 1.0), (2 * x as i64 + 1, 1.0), (-1, 0.0)]
                        };
                        let y_taps: &[(i64, f32)] = &if self.height & 1 != 0 {
                            [
                                (2 * y as i64, (h - y) as f32),
                                (2 * y as i64 + 1, h as f32),
                                (2 * y as i64 + 2, (1 + y) as f32),
                            ]
                        } else {
                            [(2 * y as i64, 1.0), (2 * y as i64 + 1, 1.0), (-1, 0.0)]
                        };

                        for &(sy, wy) in y_taps {
                            if sy < 0 || wy == 0.0 {
                                continue;
                            }
                            for &(sx, wx) in x_taps {
                                if sx < 0 || wx == 0.0 {
                                    continue;
                                }
                                let weight = wx * wy;
                                total += weight;
                                value += weight * self.pixel(c, sx as u32, sy as u32);
                            }
                        }

                        dst.set_pixel(c, x, y, value / total);
                    }
                }
            }
        }

        dst
    }

    /// Resample to the given extents through a polyphase kernel,
    /// horizontal then vertical.
    pub fn resize(&self, filter: &dyn Filter, w: u32, h: u32, wrap_mode: WrapMode) -> FloatImage {
        let x_kernel = PolyphaseKernel::new(filter, self.width, w, 32);
        let y_kernel = PolyphaseKernel::new(filter, self.height, h, 32);

        let mut horizontal = FloatImage::new(self.channels, w, self.height);
        for c in 0..self.channels {
            for y in 0..self.height {
                for x in 0..w {
                    let left = x_kernel.left(x as usize);
                    let mut sum = 0.0;
                    for j in 0..x_kernel.window_size() {
                        sum += x_kernel.value_at(x as usize, j)
                            * self.sample(c, left + j as i32, y as i32, wrap_mode);
                    }
                    horizontal.set_pixel(c, x, y, sum);
                }
            }
        }

        let mut dst = FloatImage::new(self.channels, w, h);
        for c in 0..self.channels {
            for y in 0..h {
                for x in 0..w {
                    let left = y_kernel.left(y as usize);
                    let mut sum = 0.0;
                    for j in 0..y_kernel.window_size() {
                        sum += y_kernel.value_at(y as usize, j)
                            * horizontal.sample(c, x as i32, left + j as i32, wrap_mode);
                    }
                    dst.set_pixel(c, x, y, sum);
                }
            }
        }

        dst
    }

    /// Halve the extents through the given filter.
    pub fn down_sample(&self, filter: &dyn Filter, wrap_mode: WrapMode) -> FloatImage {
        let w = (self.width / 2).max(1);
        let h = (self.height / 2).max(1);
        self.resize(filter, w, h, wrap_mode)
    }

    /// Downsample weighting the color channels by the alpha channel, so
    /// transparent texels do not bleed their color into the result.
    pub fn down_sample_alpha_weighted(
        &self,
        filter: &dyn Filter,
        wrap_mode: WrapMode,
    ) -> FloatImage {
        let w = (self.width / 2).max(1);
        let h = (self.height / 2).max(1);
        self.resize_alpha_weighted(filter, w, h, wrap_mode)
    }

    /// As [`resize`](Self::resize), weighting color by alpha.
    pub fn resize_alpha_weighted(
        &self,
        filter: &dyn Filter,
        w: u32,
        h: u32,
        wrap_mode: WrapMode,
    ) -> FloatImage {
        debug_assert_eq!(self.channels, 4);

        // Premultiply, filter, then divide the weight back out.
        let mut premultiplied = self.clone();
        let count = (self.width * self.height) as usize;
        for c in 0..3 {
            for i in 0..count {
                let a = self.pixel_index(3, i);
                let v = premultiplied.pixel_index(c, i);
                premultiplied.set_pixel_index(c, i, v * a);
            }
        }

        let mut dst = premultiplied.resize(filter, w, h, wrap_mode);
        let count = (dst.width * dst.height) as usize;
        for i in 0..count {
            let a = dst.pixel_index(3, i);
            if a > 1e-6 {
                for c in 0..3 {
                    let v = dst.pixel_index(c, i);
                    dst.set_pixel_index(c, i, v / a);
                }
            }
        }
        dst
    }
}
