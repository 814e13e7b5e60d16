//! The three immutable option records driving a compression call, and
//! every enum of the public surface.

use anyhow::{ensure, Result};
use cgmath::Matrix4;
use half::f16;

use crate::image::{FloatImage, Image};

/// Output compression formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// Uncompressed pixels through the mask-based converter.
    Rgba,
    Bc1,
    /// BC1 with one-bit punch-through alpha.
    Bc1a,
    /// Reserved; no CPU encoder is wired.
    Bc1n,
    Bc2,
    Bc3,
    /// BC3 with the X coordinate in alpha and Y in green, for normal maps.
    Bc3n,
    Bc4,
    Bc5,
    /// Reserved; no CPU encoder is wired.
    Ctx1,
    /// Shared-exponent radiance encoding.
    Rgbe,
}

/// Quality/speed dial for the block encoders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Quality {
    Fastest,
    Normal,
    Production,
    Highest,
}

/// How the output pixels should be interpreted. Only unsigned-normalized
/// and float outputs have writers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelType {
    UnsignedNorm,
    SignedNorm,
    UnsignedInt,
    SignedInt,
    Float,
    UnsignedFloat,
}

/// Decoder flavor assumed when scoring compressed output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decoder {
    D3d10,
    D3d9,
    Nv5x,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapMode {
    Clamp,
    Repeat,
    Mirror,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureType {
    D2,
    Cube,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputFormat {
    /// 8-bit fixed point, BGRA byte order.
    Bgra8,
    /// 16-bit floating point, RGBA channel order.
    Rgba16f,
    /// 32-bit floating point, RGBA channel order.
    Rgba32f,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MipmapFilter {
    Box,
    Triangle,
    Kaiser,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundMode {
    None,
    ToNextPowerOfTwo,
    ToNearestPowerOfTwo,
    ToPreviousPowerOfTwo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlphaMode {
    None,
    Transparency,
    Premultiplied,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorTransform {
    None,
    /// Multiply each pixel by a 4x4 matrix in linear space.
    Linear,
    /// Reorder channels.
    Swizzle,
    YCoCg,
    /// Reserved; behaves as `YCoCg`.
    ScaledYCoCg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Dds,
    Dds10,
}

/// One input surface. The pipeline converts to its internal representation
/// on demand.
#[derive(Clone, Debug)]
pub(crate) enum InputPixels {
    Fixed(Image),
    Float(FloatImage),
}

#[derive(Clone, Debug)]
pub(crate) struct InputSurface {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub pixels: InputPixels,
}

/// Format and layout of the input texture, plus every preprocessing knob.
#[derive(Clone, Debug)]
pub struct InputOptions {
    pub(crate) texture_type: TextureType,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) depth: u32,
    pub(crate) face_count: u32,
    pub(crate) mipmap_slots: u32,
    pub(crate) surfaces: Vec<Option<InputSurface>>,

    pub(crate) input_format: InputFormat,
    pub(crate) alpha_mode: AlphaMode,
    pub(crate) input_gamma: f32,
    pub(crate) output_gamma: f32,
    pub(crate) wrap_mode: WrapMode,

    pub(crate) generate_mipmaps: bool,
    pub(crate) mipmap_filter: MipmapFilter,
    pub(crate) kaiser_width: f32,
    pub(crate) kaiser_alpha: f32,
    pub(crate) kaiser_stretch: f32,
    pub(crate) max_level: i32,

    pub(crate) is_normal_map: bool,
    pub(crate) normalize_mipmaps: bool,
    pub(crate) convert_to_normal_map: bool,
    pub(crate) height_factors: [f32; 4],
    pub(crate) bump_frequency_scale: [f32; 4],

    pub(crate) color_transform: ColorTransform,
    pub(crate) linear_transform: Matrix4<f32>,
    pub(crate) swizzle_transform: [usize; 4],

    pub(crate) premultiply_alpha: bool,
    pub(crate) max_extent: u32,
    pub(crate) round_mode: RoundMode,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self {
            texture_type: TextureType::D2,
            width: 0,
            height: 0,
            depth: 1,
            face_count: 1,
            mipmap_slots: 0,
            surfaces: Vec::new(),

            input_format: InputFormat::Bgra8,
            alpha_mode: AlphaMode::None,
            input_gamma: 2.2,
            output_gamma: 2.2,
            wrap_mode: WrapMode::Mirror,

            generate_mipmaps: true,
            mipmap_filter: MipmapFilter::Box,
            kaiser_width: 3.0,
            kaiser_alpha: 4.0,
            kaiser_stretch: 1.0,
            max_level: -1,

            is_normal_map: false,
            normalize_mipmaps: true,
            convert_to_normal_map: false,
            height_factors: [0.0, 0.0, 0.0, 1.0],
            bump_frequency_scale: [1.0, 0.5, 0.25, 0.125],

            color_transform: ColorTransform::None,
            linear_transform: Matrix4::from_scale(1.0),
            swizzle_transform: [0, 1, 2, 3],

            premultiply_alpha: false,
            max_extent: 0,
            round_mode: RoundMode::None,
        }
    }
}

fn mipmap_count_for(w: u32, h: u32, d: u32) -> u32 {
    let mut max = w.max(h).max(d).max(1);
    let mut count = 1;
    while max > 1 {
        max /= 2;
        count += 1;
    }
    count
}

impl InputOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the texture layout. Resets any surfaces set so far.
    pub fn set_texture_layout(&mut self, texture_type: TextureType, w: u32, h: u32, d: u32) {
        self.texture_type = texture_type;
        self.width = w;
        self.height = h;
        self.depth = d;
        self.face_count = match texture_type {
            TextureType::D2 => 1,
            TextureType::Cube => 6,
        };
        self.mipmap_slots = mipmap_count_for(w, h, d);
        self.surfaces = vec![None; (self.face_count * self.mipmap_slots) as usize];
    }

    pub fn reset_texture_layout(&mut self) {
        self.width = 0;
        self.height = 0;
        self.depth = 1;
        self.face_count = 1;
        self.mipmap_slots = 0;
        self.surfaces.clear();
    }

    pub fn set_format(&mut self, format: InputFormat) {
        self.input_format = format;
    }

    /// Copy one mip surface of one face. The extents must match the
    /// declared layout for that level.
    pub fn set_mipmap_data(
        &mut self,
        data: &[u8],
        w: u32,
        h: u32,
        d: u32,
        face: u32,
        mipmap: u32,
    ) -> Result<()> {
        ensure!(face < self.face_count, "face {} out of range", face);
        ensure!(mipmap < self.mipmap_slots, "mipmap {} out of range", mipmap);

        let expected_w = (self.width >> mipmap).max(1);
        let expected_h = (self.height >> mipmap).max(1);
        let expected_d = (self.depth >> mipmap).max(1);
        ensure!(
            w == expected_w && h == expected_h && d == expected_d,
            "mipmap extents {}x{}x{} do not match the declared layout",
            w,
            h,
            d
        );

        let pixel_count = (w * h * d) as usize;
        let pixels = match self.input_format {
            InputFormat::Bgra8 => {
                ensure!(data.len() >= pixel_count * 4, "input buffer too small");
                let mut image = Image::new(w, h);
                for i in 0..pixel_count {
                    let p = &data[i * 4..i * 4 + 4];
                    image.set_pixel_index(
                        i,
                        crate::color::Color32 { b: p[0], g: p[1], r: p[2], a: p[3] },
                    );
                }
                InputPixels::Fixed(image)
            }
            InputFormat::Rgba16f => {
                ensure!(data.len() >= pixel_count * 8, "input buffer too small");
                let mut float = FloatImage::new(4, w, h);
                for i in 0..pixel_count {
                    for c in 0..4 {
                        let offset = (i * 4 + c) * 2;
                        let bits = u16::from_le_bytes([data[offset], data[offset + 1]]);
                        float.set_pixel_index(c as u32, i, f16::from_bits(bits).to_f32());
                    }
                }
                InputPixels::Float(float)
            }
            InputFormat::Rgba32f => {
                ensure!(data.len() >= pixel_count * 16, "input buffer too small");
                let mut float = FloatImage::new(4, w, h);
                for i in 0..pixel_count {
                    for c in 0..4 {
                        let offset = (i * 4 + c) * 4;
                        let bits = u32::from_le_bytes([
                            data[offset],
                            data[offset + 1],
                            data[offset + 2],
                            data[offset + 3],
                        ]);
                        float.set_pixel_index(c as u32, i, f32::from_bits(bits));
                    }
                }
                InputPixels::Float(float)
            }
        };

        let idx = (face * self.mipmap_slots + mipmap) as usize;
        self.surfaces[idx] = Some(InputSurface { width: w, height: h, depth: d, pixels });
        Ok(())
    }

    pub(crate) fn surface(&self, face: u32, mipmap: u32) -> Option<&InputSurface> {
        self.surfaces
            .get((face * self.mipmap_slots + mipmap) as usize)
            .and_then(|s| s.as_ref())
    }

    pub fn set_alpha_mode(&mut self, alpha_mode: AlphaMode) {
        self.alpha_mode = alpha_mode;
    }

    pub fn set_gamma(&mut self, input_gamma: f32, output_gamma: f32) {
        self.input_gamma = input_gamma;
        self.output_gamma = output_gamma;
    }

    pub fn set_wrap_mode(&mut self, mode: WrapMode) {
        self.wrap_mode = mode;
    }

    pub fn set_mipmap_filter(&mut self, filter: MipmapFilter) {
        self.mipmap_filter = filter;
    }

    pub fn set_mipmap_generation(&mut self, enabled: bool, max_level: i32) {
        self.generate_mipmaps = enabled;
        self.max_level = max_level;
    }

    pub fn set_kaiser_parameters(&mut self, width: f32, alpha: f32, stretch: f32) {
        self.kaiser_width = width;
        self.kaiser_alpha = alpha;
        self.kaiser_stretch = stretch;
    }

    pub fn set_normal_map(&mut self, is_normal_map: bool) {
        self.is_normal_map = is_normal_map;
    }

    pub fn set_convert_to_normal_map(&mut self, convert: bool) {
        self.convert_to_normal_map = convert;
    }

    pub fn set_height_evaluation(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.height_factors = [red, green, blue, alpha];
    }

    pub fn set_normal_filter(&mut self, small: f32, medium: f32, big: f32, large: f32) {
        self.bump_frequency_scale = [small, medium, big, large];
    }

    pub fn set_normalize_mipmaps(&mut self, normalize: bool) {
        self.normalize_mipmaps = normalize;
    }

    pub fn set_color_transform(&mut self, transform: ColorTransform) {
        self.color_transform = transform;
    }

    pub fn set_linear_transform(&mut self, matrix: Matrix4<f32>) {
        self.linear_transform = matrix;
    }

    pub fn set_swizzle_transform(&mut self, r: usize, g: usize, b: usize, a: usize) {
        self.swizzle_transform = [r & 3, g & 3, b & 3, a & 3];
    }

    pub fn set_premultiply_alpha(&mut self, premultiply: bool) {
        self.premultiply_alpha = premultiply;
    }

    pub fn set_max_extents(&mut self, max_extent: u32) {
        self.max_extent = max_extent;
    }

    pub fn set_round_mode(&mut self, mode: RoundMode) {
        self.round_mode = mode;
    }
}

/// Desired compression format and the knobs of the per-block searches.
#[derive(Clone, Debug)]
pub struct CompressionOptions {
    pub(crate) format: Format,
    pub(crate) quality: Quality,
    pub(crate) color_weights: [f32; 4],
    pub(crate) pixel_type: PixelType,

    pub(crate) bitcount: u32,
    pub(crate) rmask: u32,
    pub(crate) gmask: u32,
    pub(crate) bmask: u32,
    pub(crate) amask: u32,
    pub(crate) rsize: u32,
    pub(crate) gsize: u32,
    pub(crate) bsize: u32,
    pub(crate) asize: u32,

    pub(crate) pitch_alignment: u32,

    pub(crate) color_dithering: bool,
    pub(crate) alpha_dithering: bool,
    pub(crate) binary_alpha: bool,
    pub(crate) alpha_threshold: u8,

    pub(crate) target_decoder: Decoder,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            format: Format::Bc1,
            quality: Quality::Normal,
            color_weights: [1.0, 1.0, 1.0, 1.0],
            pixel_type: PixelType::UnsignedNorm,

            bitcount: 32,
            rmask: 0x00ff_0000,
            gmask: 0x0000_ff00,
            bmask: 0x0000_00ff,
            amask: 0xff00_0000,
            rsize: 8,
            gsize: 8,
            bsize: 8,
            asize: 8,

            pitch_alignment: 1,

            color_dithering: false,
            alpha_dithering: false,
            binary_alpha: false,
            alpha_threshold: 127,

            target_decoder: Decoder::D3d10,
        }
    }
}

impl CompressionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.quality = quality;
    }

    pub fn set_color_weights(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.color_weights = [red, green, blue, alpha];
    }

    /// Describe an uncompressed format by total bit count and channel
    /// masks.
    pub fn set_pixel_format_masks(
        &mut self,
        bitcount: u32,
        rmask: u32,
        gmask: u32,
        bmask: u32,
        amask: u32,
    ) {
        self.bitcount = bitcount;
        self.rmask = rmask;
        self.gmask = gmask;
        self.bmask = bmask;
        self.amask = amask;
        self.rsize = rmask.count_ones();
        self.gsize = gmask.count_ones();
        self.bsize = bmask.count_ones();
        self.asize = amask.count_ones();
    }

    /// Describe an uncompressed format by per-channel sizes; the masks are
    /// derived with alpha in the least significant bits.
    pub fn set_pixel_format_sizes(&mut self, rsize: u32, gsize: u32, bsize: u32, asize: u32) {
        self.rsize = rsize;
        self.gsize = gsize;
        self.bsize = bsize;
        self.asize = asize;
        self.bitcount = 0;

        let ashift = 0;
        let bshift = ashift + asize;
        let gshift = bshift + bsize;
        let rshift = gshift + gsize;
        self.amask = (1u32.checked_shl(asize).unwrap_or(0).wrapping_sub(1)) << ashift;
        self.bmask = (1u32.checked_shl(bsize).unwrap_or(0).wrapping_sub(1)) << bshift;
        self.gmask = (1u32.checked_shl(gsize).unwrap_or(0).wrapping_sub(1)) << gshift;
        self.rmask = (1u32.checked_shl(rsize).unwrap_or(0).wrapping_sub(1)) << rshift;
    }

    pub fn set_pixel_type(&mut self, pixel_type: PixelType) {
        self.pixel_type = pixel_type;
    }

    pub fn set_pitch_alignment(&mut self, alignment: u32) {
        self.pitch_alignment = alignment.max(1);
    }

    pub fn set_quantization(
        &mut self,
        color_dithering: bool,
        alpha_dithering: bool,
        binary_alpha: bool,
        alpha_threshold: u8,
    ) {
        self.color_dithering = color_dithering;
        self.alpha_dithering = alpha_dithering;
        self.binary_alpha = binary_alpha;
        self.alpha_threshold = alpha_threshold;
    }

    pub fn set_target_decoder(&mut self, decoder: Decoder) {
        self.target_decoder = decoder;
    }

    /// Total output bits per pixel for uncompressed formats.
    pub(crate) fn bit_count(&self) -> u32 {
        if self.bitcount != 0 {
            self.bitcount
        } else {
            self.rsize + self.gsize + self.bsize + self.asize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_allocates_full_mip_chains_per_face() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::Cube, 8, 8, 1);
        assert_eq!(input.face_count, 6);
        assert_eq!(input.mipmap_slots, 4);
        assert_eq!(input.surfaces.len(), 24);
    }

    #[test]
    fn mipmap_data_validates_extents() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 8, 4, 1);

        let pixels = vec![0u8; 8 * 4 * 4];
        assert!(input.set_mipmap_data(&pixels, 8, 4, 1, 0, 0).is_ok());
        assert!(input.set_mipmap_data(&pixels, 4, 4, 1, 0, 0).is_err());
        assert!(input.set_mipmap_data(&pixels[..64], 4, 2, 1, 0, 1).is_ok());
        assert!(input.set_mipmap_data(&pixels, 8, 4, 1, 1, 0).is_err());
    }

    #[test]
    fn half_float_input_decodes_through_half() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 1, 1, 1);
        input.set_format(InputFormat::Rgba16f);

        let mut data = Vec::new();
        for value in [1.0f32, 0.5, 0.25, 1.0] {
            data.extend_from_slice(&f16::from_f32(value).to_bits().to_le_bytes());
        }
        input.set_mipmap_data(&data, 1, 1, 1, 0, 0).unwrap();

        match &input.surface(0, 0).unwrap().pixels {
            InputPixels::Float(float) => {
                assert_eq!(float.pixel(0, 0, 0), 1.0);
                assert_eq!(float.pixel(1, 0, 0), 0.5);
            }
            _ => panic!("expected float surface"),
        }
    }

    #[test]
    fn mask_sizes_are_derived_both_ways() {
        let mut options = CompressionOptions::new();
        options.set_pixel_format_sizes(5, 6, 5, 0);
        assert_eq!(options.bit_count(), 16);
        assert_eq!(options.rmask, 0xf800);
        assert_eq!(options.gmask, 0x07e0);
        assert_eq!(options.bmask, 0x001f);
        assert_eq!(options.amask, 0);

        options.set_pixel_format_masks(32, 0x00ff_0000, 0x0000_ff00, 0x0000_00ff, 0xff00_0000);
        assert_eq!(options.rsize, 8);
        assert_eq!(options.bit_count(), 32);
    }
}
