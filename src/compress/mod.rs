//! Per-format block encoders. Each format decomposes a tile into its
//! color and alpha sub-problems, runs the searches at the configured
//! quality tier, and emits the format's byte layout.

pub mod alpha;
pub mod cluster;
pub mod fast;
pub mod refine;
pub mod rgb;

use cgmath::Vector3;

use crate::block::{AlphaBlockDxt5, BlockAti2, BlockDxt1, BlockDxt3, BlockDxt5, ColorBlock};
use crate::compress::cluster::{ClusterParams, ColorMode};
use crate::config::{AlphaMode, CompressionOptions, Format, Quality};

/// The block encoder for one compression format: its block size and its
/// per-tile encoding routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BlockEncoder {
    Bc1,
    Bc1a,
    Bc2,
    Bc3,
    Bc3n,
    Bc4,
    Bc5,
}

impl BlockEncoder {
    /// The encoder for a format, or `None` when the format has no
    /// block encoder (uncompressed formats and the reserved ones).
    pub fn for_format(format: Format) -> Option<Self> {
        match format {
            Format::Bc1 => Some(Self::Bc1),
            Format::Bc1a => Some(Self::Bc1a),
            Format::Bc2 => Some(Self::Bc2),
            Format::Bc3 => Some(Self::Bc3),
            Format::Bc3n => Some(Self::Bc3n),
            Format::Bc4 => Some(Self::Bc4),
            Format::Bc5 => Some(Self::Bc5),
            Format::Rgba | Format::Rgbe | Format::Bc1n | Format::Ctx1 => None,
        }
    }

    pub fn block_size(self) -> usize {
        match self {
            Self::Bc1 | Self::Bc1a | Self::Bc4 => 8,
            Self::Bc2 | Self::Bc3 | Self::Bc3n | Self::Bc5 => 16,
        }
    }

    pub fn compress_block(
        self,
        tile: &ColorBlock,
        alpha_mode: AlphaMode,
        options: &CompressionOptions,
        out: &mut [u8],
    ) {
        debug_assert_eq!(out.len(), self.block_size());
        match self {
            Self::Bc1 => compress_bc1(tile, alpha_mode, options, out),
            Self::Bc1a => compress_bc1a(tile, alpha_mode, options, out),
            Self::Bc2 => compress_bc2(tile, alpha_mode, options, out),
            Self::Bc3 => compress_bc3(tile, alpha_mode, options, out),
            Self::Bc3n => {
                let mut swizzled = *tile;
                swizzled.swizzle_dxt5n();
                compress_bc3(&swizzled, alpha_mode, options, out);
            }
            Self::Bc4 => {
                let mut red = *tile;
                red.splat_x();
                compress_alpha_tiered(&red, options.quality).write_to(out);
            }
            Self::Bc5 => {
                let mut x = *tile;
                x.splat_x();
                let mut y = *tile;
                y.splat_y();
                let block = BlockAti2 {
                    x: compress_alpha_tiered(&x, options.quality),
                    y: compress_alpha_tiered(&y, options.quality),
                };
                block.write_to(out);
            }
        }
    }
}

fn metric(options: &CompressionOptions) -> Vector3<f32> {
    Vector3::new(
        options.color_weights[0],
        options.color_weights[1],
        options.color_weights[2],
    )
}

fn integer_weights(options: &CompressionOptions) -> [u32; 3] {
    // The integer refinement error wants whole weights; fractional channel
    // weights round up so no channel drops out entirely.
    [
        (options.color_weights[0].max(0.0).ceil() as u32).max(1),
        (options.color_weights[1].max(0.0).ceil() as u32).max(1),
        (options.color_weights[2].max(0.0).ceil() as u32).max(1),
    ]
}

/// Cluster fit plus the refinement passes the quality tier pays for.
fn compress_color_tiered(
    tile: &ColorBlock,
    mode: ColorMode,
    alpha_mode: AlphaMode,
    options: &CompressionOptions,
) -> BlockDxt1 {
    let params = ClusterParams {
        mode,
        metric: metric(options),
        weight_by_alpha: alpha_mode == AlphaMode::Transparency,
    };
    let mut block = cluster::compress_cluster(tile, &params);

    let four_only = mode == ColorMode::FourOnly;
    let weights = integer_weights(options);

    // The bounding-box block costs nothing to evaluate; keep it whenever
    // the quantized cluster solution fails to beat it.
    if !matches!(mode, ColorMode::PunchThrough(_)) {
        let bounds = fast::compress_dxt1_bounds(tile);
        if (!four_only || bounds.is_four_color_mode())
            && bounds.error_weighted(tile, weights) < block.error_weighted(tile, weights)
        {
            block = bounds;
        }
    }

    // The refinement passes reassign every index, which would lose the
    // punch-through entries; transparent blocks keep the cluster result.
    if matches!(mode, ColorMode::PunchThrough(_)) {
        return block;
    }

    match options.quality {
        Quality::Fastest | Quality::Normal => {}
        Quality::Production => {
            while refine::optimize_endpoints(tile, &mut block, four_only, weights) {}
            refine::refine_1d_search(tile, &mut block, four_only, weights);
        }
        Quality::Highest => {
            while refine::optimize_endpoints(tile, &mut block, four_only, weights) {}
            refine::refine_1d_search(tile, &mut block, four_only, weights);
            refine::refine_3d_search(tile, &mut block, four_only, weights);
            refine::refine_6d_search(tile, &mut block, four_only, weights);
        }
    }
    block
}

fn compress_bc1(
    tile: &ColorBlock,
    alpha_mode: AlphaMode,
    options: &CompressionOptions,
    out: &mut [u8],
) {
    let block = if tile.is_single_color() {
        fast::compress_single_color(tile.color(0))
    } else if options.quality == Quality::Fastest {
        fast::compress_dxt1_bounds(tile)
    } else {
        compress_color_tiered(tile, ColorMode::Any, alpha_mode, options)
    };
    block.write_to(out);
}

fn compress_bc1a(
    tile: &ColorBlock,
    alpha_mode: AlphaMode,
    options: &CompressionOptions,
    out: &mut [u8],
) {
    let threshold = options.alpha_threshold;
    let has_transparency = (0..16).any(|i| tile.color(i).a < threshold);

    let block = if options.quality == Quality::Fastest {
        fast::compress_dxt1a_bounds(tile)
    } else if has_transparency {
        compress_color_tiered(tile, ColorMode::PunchThrough(threshold), alpha_mode, options)
    } else if tile.is_single_color() {
        fast::compress_single_color(tile.color(0))
    } else {
        compress_color_tiered(tile, ColorMode::Any, alpha_mode, options)
    };
    block.write_to(out);
}

/// The shared BC2/BC3 color path: four-color mode is mandatory there.
fn compress_color_four(
    tile: &ColorBlock,
    alpha_mode: AlphaMode,
    options: &CompressionOptions,
) -> BlockDxt1 {
    if options.quality == Quality::Fastest {
        let block = fast::compress_dxt1_bounds(tile);
        if block.is_four_color_mode() {
            return block;
        }
        // Near-flat tile collapsed to equal endpoints; the cluster path
        // separates them.
    }
    compress_color_tiered(tile, ColorMode::FourOnly, alpha_mode, options)
}

fn compress_bc2(
    tile: &ColorBlock,
    alpha_mode: AlphaMode,
    options: &CompressionOptions,
    out: &mut [u8],
) {
    let block = BlockDxt3 {
        alpha: alpha::compress_dxt3a(tile),
        color: compress_color_four(tile, alpha_mode, options),
    };
    block.write_to(out);
}

fn compress_alpha_tiered(tile: &ColorBlock, quality: Quality) -> AlphaBlockDxt5 {
    let (block, _) = match quality {
        Quality::Fastest => alpha::compress_alpha_fast(tile),
        Quality::Highest => alpha::compress_alpha_brute_force(tile),
        _ => alpha::compress_alpha_iterative(tile),
    };
    block
}

fn compress_bc3(
    tile: &ColorBlock,
    alpha_mode: AlphaMode,
    options: &CompressionOptions,
    out: &mut [u8],
) {
    let block = BlockDxt5 {
        alpha: compress_alpha_tiered(tile, options.quality),
        color: compress_color_four(tile, alpha_mode, options),
    };
    block.write_to(out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{AlphaBlockDxt5, BlockDxt1};
    use crate::color::Color32;

    fn options_with(format: Format, quality: Quality) -> CompressionOptions {
        let mut options = CompressionOptions::new();
        options.set_format(format);
        options.set_quality(quality);
        options
    }

    fn checkerboard(a: Color32, b: Color32) -> ColorBlock {
        let mut colors = [a; 16];
        for (i, c) in colors.iter_mut().enumerate() {
            if (i + i / 4) % 2 == 1 {
                *c = b;
            }
        }
        ColorBlock::new(colors)
    }

    #[test]
    fn bc2_and_bc3_color_blocks_are_four_color_mode() {
        let tiles = [
            checkerboard(Color32::new(255, 0, 0, 255), Color32::new(0, 0, 255, 255)),
            ColorBlock::new([Color32::new(0, 0, 0, 255); 16]),
            ColorBlock::new([Color32::new(13, 13, 13, 200); 16]),
        ];

        for quality in [Quality::Fastest, Quality::Normal, Quality::Highest] {
            for tile in &tiles {
                let mut out = [0u8; 16];
                BlockEncoder::Bc3.compress_block(
                    tile,
                    AlphaMode::Transparency,
                    &options_with(Format::Bc3, quality),
                    &mut out,
                );
                let color = BlockDxt1::from_bytes(out[8..16].try_into().unwrap());
                assert!(
                    color.col0.bits() > color.col1.bits(),
                    "{:?} {:?}",
                    quality,
                    color
                );
            }
        }
    }

    #[test]
    fn bc3_alpha_of_opaque_checkerboard_is_constant() {
        let tile = checkerboard(Color32::new(255, 0, 0, 255), Color32::new(0, 0, 255, 255));
        let mut out = [0u8; 16];
        BlockEncoder::Bc3.compress_block(
            &tile,
            AlphaMode::None,
            &options_with(Format::Bc3, Quality::Highest),
            &mut out,
        );

        let alpha = AlphaBlockDxt5::from_bytes(out[0..8].try_into().unwrap());
        let palette = alpha.evaluate_palette();
        for i in 0..16 {
            assert_eq!(palette[alpha.index(i)], 255);
        }

        let color = BlockDxt1::from_bytes(out[8..16].try_into().unwrap());
        let color_palette = color.evaluate_palette();
        let endpoints = [color_palette[0], color_palette[1]];
        assert!(endpoints.contains(&Color32::new(255, 0, 0, 255)));
        assert!(endpoints.contains(&Color32::new(0, 0, 255, 255)));
    }

    #[test]
    fn bc1a_marks_transparent_texels() {
        let mut colors = [Color32::new(90, 150, 20, 255); 16];
        colors[2] = Color32::new(90, 150, 20, 5);
        let tile = ColorBlock::new(colors);

        for quality in [Quality::Normal, Quality::Production, Quality::Highest] {
            let mut out = [0u8; 8];
            BlockEncoder::Bc1a.compress_block(
                &tile,
                AlphaMode::Transparency,
                &options_with(Format::Bc1a, quality),
                &mut out,
            );
            let block = BlockDxt1::from_bytes(&out);
            assert!(!block.is_four_color_mode(), "{:?}", quality);
            assert_eq!(block.index(2), 3, "{:?}", quality);
            assert_ne!(block.index(0), 3, "{:?}", quality);
        }
    }

    #[test]
    fn bc3n_moves_x_into_alpha() {
        let mut colors = [Color32::default(); 16];
        for (i, c) in colors.iter_mut().enumerate() {
            *c = Color32::new((i * 16) as u8, 128, 7, 255);
        }
        let tile = ColorBlock::new(colors);

        let mut out = [0u8; 16];
        BlockEncoder::Bc3n.compress_block(
            &tile,
            AlphaMode::None,
            &options_with(Format::Bc3n, Quality::Normal),
            &mut out,
        );

        let alpha = AlphaBlockDxt5::from_bytes(out[0..8].try_into().unwrap());
        // The alpha block now spans the red gradient, not the constant 255.
        assert!(alpha.alpha0 > 200);
        assert!(alpha.alpha1 < 32);
        let palette = alpha.evaluate_palette();
        let lo = palette.iter().min().unwrap();
        assert!(*lo < 64);
    }

    #[test]
    fn bc5_encodes_channels_independently() {
        let mut colors = [Color32::default(); 16];
        for (i, c) in colors.iter_mut().enumerate() {
            *c = Color32::new(200, (i * 17) as u8, 0, 255);
        }
        let tile = ColorBlock::new(colors);

        let mut out = [0u8; 16];
        BlockEncoder::Bc5.compress_block(
            &tile,
            AlphaMode::None,
            &options_with(Format::Bc5, Quality::Normal),
            &mut out,
        );

        let x = AlphaBlockDxt5::from_bytes(out[0..8].try_into().unwrap());
        let y = AlphaBlockDxt5::from_bytes(out[8..16].try_into().unwrap());

        // Constant X channel reconstructs exactly; Y spans the gradient.
        let x_palette = x.evaluate_palette();
        for i in 0..16 {
            assert_eq!(x_palette[x.index(i)], 200);
        }
        assert!(y.alpha0 > y.alpha1);
    }

    #[test]
    fn higher_quality_never_loses_to_fastest() {
        let mut colors = [Color32::default(); 16];
        let mut state = 77u32;
        for c in colors.iter_mut() {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            *c = Color32::new((state >> 24) as u8, (state >> 15) as u8, (state >> 7) as u8, 255);
        }
        let tile = ColorBlock::new(colors);

        let mut errors = Vec::new();
        for quality in [Quality::Fastest, Quality::Normal, Quality::Production, Quality::Highest] {
            let mut out = [0u8; 8];
            BlockEncoder::Bc1.compress_block(
                &tile,
                AlphaMode::None,
                &options_with(Format::Bc1, quality),
                &mut out,
            );
            errors.push(BlockDxt1::from_bytes(&out).error(&tile));
        }

        assert!(errors[1] <= errors[0], "normal {} > fastest {}", errors[1], errors[0]);
        assert!(errors[2] <= errors[1]);
        assert!(errors[3] <= errors[2]);
    }
}
