//! Fast-tier DXT1 color compression: bounding-box endpoints plus the
//! branchless nearest-palette index network, and the single-color
//! lookup-table path.

use std::sync::OnceLock;

use crate::block::{BlockDxt1, ColorBlock};
use crate::color::{expand5, expand6, to_color16, Color16, Color32};

static SINGLE_COLOR_5: OnceLock<[[u8; 2]; 256]> = OnceLock::new();
static SINGLE_COLOR_6: OnceLock<[[u8; 2]; 256]> = OnceLock::new();

/// Find, for every 8-bit target, the endpoint pair whose two-thirds
/// interpolant reconstructs it best. Equal pairs are preferred on ties so
/// that exactly representable values keep `col0 == col1` and decode through
/// palette entry 0.
fn build_single_color_table(bits: u32) -> [[u8; 2]; 256] {
    let levels = 1u32 << bits;
    let expand = |x: u32| -> i32 {
        if bits == 5 {
            expand5(x as u8) as i32
        } else {
            expand6(x as u8) as i32
        }
    };

    let mut table = [[0u8; 2]; 256];
    for (target, entry) in table.iter_mut().enumerate() {
        let target = target as i32;

        let mut best_error = i32::MAX;
        for e in 0..levels {
            let interp = (2 * expand(e) + expand(e) + 1) / 3;
            let error = (interp - target).pow(2);
            if error < best_error {
                best_error = error;
                *entry = [e as u8, e as u8];
            }
        }
        for e0 in 0..levels {
            for e1 in 0..levels {
                let interp = (2 * expand(e0) + expand(e1) + 1) / 3;
                let error = (interp - target).pow(2);
                if error < best_error {
                    best_error = error;
                    *entry = [e0 as u8, e1 as u8];
                }
            }
        }
    }
    table
}

fn single_color_table_5() -> &'static [[u8; 2]; 256] {
    SINGLE_COLOR_5.get_or_init(|| build_single_color_table(5))
}

fn single_color_table_6() -> &'static [[u8; 2]; 256] {
    SINGLE_COLOR_6.get_or_init(|| build_single_color_table(6))
}

/// Force initialization of the lazily-built lookup tables, so the first
/// compression call does not pay for them.
pub fn precompute_tables() {
    single_color_table_5();
    single_color_table_6();
    crate::compress::cluster::partition_tables();
}

/// Encode a constant-color tile through the lookup tables.
pub fn compress_single_color(c: Color32) -> BlockDxt1 {
    let t5 = single_color_table_5();
    let t6 = single_color_table_6();

    let col0 = Color16::new(t5[c.r as usize][0], t6[c.g as usize][0], t5[c.b as usize][0]);
    let col1 = Color16::new(t5[c.r as usize][1], t6[c.g as usize][1], t5[c.b as usize][1]);

    let mut block = BlockDxt1 { col0, col1, indices: 0xaaaa_aaaa };
    if block.col0.bits() == block.col1.bits() {
        // Endpoint 0 already reconstructs the color exactly.
        block.indices = 0;
    } else if block.col0.bits() < block.col1.bits() {
        std::mem::swap(&mut block.col0, &mut block.col1);
        block.indices ^= 0x5555_5555;
    }
    block
}

/// Nearest-palette-entry selection for all 16 texels using the branchless
/// comparison network.
pub fn compute_indices(tile: &ColorBlock, palette: &[Color32; 4]) -> u32 {
    let mut indices = 0u32;
    for i in 0..16 {
        let c = tile.color(i);

        let d0 = c.distance_squared(palette[0]);
        let d1 = c.distance_squared(palette[1]);
        let d2 = c.distance_squared(palette[2]);
        let d3 = c.distance_squared(palette[3]);

        let b0 = (d0 > d3) as u32;
        let b1 = (d1 > d2) as u32;
        let b2 = (d0 > d2) as u32;
        let b3 = (d1 > d3) as u32;
        let b4 = (d2 > d3) as u32;

        let x0 = b1 & b2;
        let x1 = b0 & b3;
        let x2 = b0 & b4;

        indices |= (x2 | ((x0 | x1) << 1)) << (2 * i);
    }
    indices
}

/// Index selection that weights each texel's color by its alpha before the
/// comparison, so transparent texels gravitate to the punch-through entry.
pub fn compute_indices_alpha(tile: &ColorBlock, palette: &[Color32; 4]) -> u32 {
    let premultiply = |c: Color32| {
        Color32::new(
            ((c.r as u32 * c.a as u32) >> 8) as u8,
            ((c.g as u32 * c.a as u32) >> 8) as u8,
            ((c.b as u32 * c.a as u32) >> 8) as u8,
            c.a,
        )
    };

    let mut indices = 0u32;
    for i in 0..16 {
        let c = premultiply(tile.color(i));

        let d0 = c.distance_squared(palette[0]);
        let d1 = c.distance_squared(palette[1]);
        let d2 = c.distance_squared(palette[2]);
        let d3 = c.distance_squared(palette[3]);

        let b0 = (d0 > d3) as u32;
        let b1 = (d1 > d2) as u32;
        let b2 = (d0 > d2) as u32;
        let b3 = (d1 > d3) as u32;
        let b4 = (d2 > d3) as u32;

        let x0 = b1 & b2;
        let x1 = b0 & b3;
        let x2 = b0 & b4;

        indices |= (x2 | ((x0 | x1) << 1)) << (2 * i);
    }
    indices
}

/// Fast tier: inset bounding-box corners as endpoints, four-color mode
/// forced.
pub fn compress_dxt1_bounds(tile: &ColorBlock) -> BlockDxt1 {
    let (c0, c1) = tile.bounds_range();

    let mut block = BlockDxt1 {
        col0: to_color16(c0),
        col1: to_color16(c1),
        indices: 0,
    };
    if block.col0.bits() < block.col1.bits() {
        std::mem::swap(&mut block.col0, &mut block.col1);
    }

    let palette = block.evaluate_palette4();
    block.indices = compute_indices(tile, &palette);
    block
}

/// Fast tier for DXT1a: endpoint order selects three-color mode when the
/// tile carries transparency.
pub fn compress_dxt1a_bounds(tile: &ColorBlock) -> BlockDxt1 {
    let (c0, c1) = tile.bounds_range();

    let mut block = BlockDxt1 {
        col0: to_color16(c0),
        col1: to_color16(c1),
        indices: 0,
    };
    if tile.has_alpha() {
        std::mem::swap(&mut block.col0, &mut block.col1);
    } else if block.col0.bits() < block.col1.bits() {
        std::mem::swap(&mut block.col0, &mut block.col1);
    }

    let palette = block.evaluate_palette();
    block.indices = compute_indices_alpha(tile, &palette);
    block
}
