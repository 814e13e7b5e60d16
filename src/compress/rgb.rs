//! Uncompressed output paths: the mask-based pixel-format converter and
//! the shared-exponent RGBE encoding.

use anyhow::{bail, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use half::f16;

use crate::color::Color32;
use crate::config::{CompressionOptions, PixelType};
use crate::image::{FloatImage, Image};

/// Row pitch in bytes, aligned to the configured boundary (and at least to
/// 32 bits, as the container expects).
pub(crate) fn compute_pitch(width: u32, bits_per_pixel: u32, alignment: u32) -> u32 {
    let bytes = width * ((bits_per_pixel + 7) / 8);
    let aligned = ((bytes + 3) / 4) * 4;
    let alignment = alignment.max(1);
    ((aligned + alignment - 1) / alignment) * alignment
}

fn mask_shift_and_size(mask: u32) -> (u32, u32) {
    if mask == 0 {
        return (0, 0);
    }
    let shift = mask.trailing_zeros();
    let size = (mask >> shift).trailing_ones();
    (shift, size)
}

/// Requantize an 8-bit value to `size` bits.
fn convert_channel(value: u8, size: u32) -> u32 {
    if size == 0 {
        return 0;
    }
    if size >= 8 {
        return (value as u32) << (size - 8);
    }
    (value as u32) >> (8 - size)
}

/// Convert a fixed image to the masked pixel format described by the
/// compression options, one padded row at a time.
pub(crate) fn convert_to_masked_rgba(image: &Image, options: &CompressionOptions) -> Result<Vec<u8>> {
    let bit_count = options.bit_count();
    if bit_count == 0 || bit_count > 32 {
        bail!("unsupported rgba bit count {}", bit_count);
    }

    let (rshift, rsize) = mask_shift_and_size(options.rmask);
    let (gshift, gsize) = mask_shift_and_size(options.gmask);
    let (bshift, bsize) = mask_shift_and_size(options.bmask);
    let (ashift, asize) = mask_shift_and_size(options.amask);

    let bytes_per_pixel = (bit_count + 7) / 8;
    let pitch = compute_pitch(image.width(), bit_count, options.pitch_alignment);
    let mut out = Vec::with_capacity((pitch * image.height()) as usize);

    for y in 0..image.height() {
        let row_start = out.len();
        for x in 0..image.width() {
            let c = image.pixel(x, y);
            let packed = (convert_channel(c.r, rsize) << rshift)
                | (convert_channel(c.g, gsize) << gshift)
                | (convert_channel(c.b, bsize) << bshift)
                | (convert_channel(c.a, asize) << ashift);
            out.extend_from_slice(&packed.to_le_bytes()[..bytes_per_pixel as usize]);
        }
        out.resize(row_start + pitch as usize, 0);
    }
    Ok(out)
}

/// Convert a float image to a raw float layout. Only the full-width RGBA
/// layouts are supported; everything else is rejected as an unsupported
/// output format.
pub(crate) fn convert_to_float_rgba(image: &FloatImage, options: &CompressionOptions) -> Result<Vec<u8>> {
    debug_assert_eq!(options.pixel_type, PixelType::Float);

    let sizes = (options.rsize, options.gsize, options.bsize, options.asize);
    let count = (image.width() * image.height()) as usize;
    let mut out = Vec::new();

    match sizes {
        (16, 16, 16, 16) => {
            for i in 0..count {
                for c in 0..4 {
                    let v = if c < image.channel_count() {
                        image.pixel_index(c, i)
                    } else {
                        1.0
                    };
                    out.write_u16::<LittleEndian>(f16::from_f32(v).to_bits())?;
                }
            }
        }
        (32, 32, 32, 32) => {
            for i in 0..count {
                for c in 0..4 {
                    let v = if c < image.channel_count() {
                        image.pixel_index(c, i)
                    } else {
                        1.0
                    };
                    out.write_f32::<LittleEndian>(v)?;
                }
            }
        }
        _ => bail!("unsupported float pixel layout {:?}", sizes),
    }
    Ok(out)
}

/// Shared-exponent radiance encoding of one color.
fn to_rgbe8(r: f32, g: f32, b: f32) -> Color32 {
    let v = r.max(g).max(b);
    if v < 1e-32 {
        return Color32::new(0, 0, 0, 0);
    }

    // frexp: v = m * 2^e with m in [0.5, 1).
    let e = v.log2().floor() as i32 + 1;
    let m = v / (e as f32).exp2();
    let scale = m * 256.0 / v;

    Color32::new(
        (r * scale).clamp(0.0, 255.0) as u8,
        (g * scale).clamp(0.0, 255.0) as u8,
        (b * scale).clamp(0.0, 255.0) as u8,
        (e + 128) as u8,
    )
}

/// Encode a float image as RGBE, 32 bits per pixel.
pub(crate) fn convert_to_rgbe(image: &FloatImage) -> Vec<u8> {
    let count = (image.width() * image.height()) as usize;
    let mut out = Vec::with_capacity(count * 4);
    for i in 0..count {
        let c = to_rgbe8(
            image.pixel_index(0, i),
            image.pixel_index(1, i),
            image.pixel_index(2, i),
        );
        out.extend_from_slice(&[c.r, c.g, c.b, c.a]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_is_dword_aligned() {
        assert_eq!(compute_pitch(5, 24, 1), 16);
        assert_eq!(compute_pitch(4, 32, 1), 16);
        assert_eq!(compute_pitch(4, 16, 1), 8);
        assert_eq!(compute_pitch(4, 32, 64), 64);
    }

    #[test]
    fn masked_conversion_packs_565() {
        let mut options = CompressionOptions::new();
        options.set_pixel_format_masks(16, 0xf800, 0x07e0, 0x001f, 0);

        let mut image = Image::new(2, 1);
        image.set_pixel(0, 0, Color32::new(255, 0, 0, 255));
        image.set_pixel(1, 0, Color32::new(0, 255, 0, 255));

        let bytes = convert_to_masked_rgba(&image, &options).unwrap();
        // Two 16-bit pixels padded to a 4-byte row.
        assert_eq!(bytes.len(), 4);
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), 0xf800);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 0x07e0);
    }

    #[test]
    fn rgbe_encodes_unit_red() {
        let mut image = FloatImage::new(4, 1, 1);
        image.set_pixel_index(0, 0, 1.0);
        let bytes = convert_to_rgbe(&image);
        assert_eq!(bytes, vec![128, 0, 0, 129]);
    }

    #[test]
    fn rgbe_zero_is_all_zero() {
        let image = FloatImage::new(4, 1, 1);
        let bytes = convert_to_rgbe(&image);
        assert_eq!(bytes, vec![0, 0, 0, 0]);
    }

    #[test]
    fn half_float_output_round_trips() {
        let mut options = CompressionOptions::new();
        options.set_pixel_type(PixelType::Float);
        options.set_pixel_format_sizes(16, 16, 16, 16);

        let mut image = FloatImage::new(4, 1, 1);
        image.set_pixel_index(0, 0, 0.5);
        image.set_pixel_index(3, 0, 1.0);

        let bytes = convert_to_float_rgba(&image, &options).unwrap();
        assert_eq!(bytes.len(), 8);
        let r = f16::from_bits(u16::from_le_bytes([bytes[0], bytes[1]]));
        assert_eq!(r.to_f32(), 0.5);
    }
}
