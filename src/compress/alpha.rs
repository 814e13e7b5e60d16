//! Alpha-endpoint search for the DXT5 8-byte alpha block, plus the
//! explicit 4-bit DXT3 quantization. The compressors read the alpha
//! channel of the tile, so single-channel formats splat their channel into
//! alpha first.

use crate::block::{AlphaBlockDxt3, AlphaBlockDxt5, ColorBlock};

/// Explicit 4-bit alpha, no dithering.
pub fn compress_dxt3a(tile: &ColorBlock) -> AlphaBlockDxt3 {
    let mut alphas = [0u8; 16];
    for (i, a) in alphas.iter_mut().enumerate() {
        *a = tile.color(i).a >> 4;
    }
    AlphaBlockDxt3 { alphas }
}

/// Assign every texel its nearest palette entry and return the total
/// squared error.
pub fn compute_alpha_indices(tile: &ColorBlock, block: &mut AlphaBlockDxt5) -> u32 {
    let palette = block.evaluate_palette();

    let mut total = 0;
    for i in 0..16 {
        let alpha = tile.color(i).a as i32;

        let mut best_error = u32::MAX;
        let mut best = 0;
        for (p, &entry) in palette.iter().enumerate() {
            let d = entry as i32 - alpha;
            let error = (d * d) as u32;
            if error < best_error {
                best_error = error;
                best = p;
            }
        }

        total += best_error;
        block.set_index(i, best as u64);
    }
    total
}

fn compute_alpha_error(tile: &ColorBlock, block: &AlphaBlockDxt5) -> u32 {
    let palette = block.evaluate_palette();

    let mut total = 0;
    for i in 0..16 {
        let alpha = tile.color(i).a as i32;
        total += palette
            .iter()
            .map(|&entry| {
                let d = entry as i32 - alpha;
                (d * d) as u32
            })
            .min()
            .unwrap_or(0);
    }
    total
}

fn alpha_range(tile: &ColorBlock) -> (u8, u8) {
    let mut min = 255u8;
    let mut max = 0u8;
    for i in 0..16 {
        let a = tile.color(i).a;
        min = min.min(a);
        max = max.max(a);
    }
    (min, max)
}

/// Fast tier: range endpoints nudged inward by 1/32 of the range, eight
/// interpolated levels.
pub fn compress_alpha_fast(tile: &ColorBlock) -> (AlphaBlockDxt5, u32) {
    let (min, max) = alpha_range(tile);
    let inset = (max - min) / 32;

    let mut block = AlphaBlockDxt5 {
        alpha0: max - inset,
        alpha1: min + inset,
        indices: 0,
    };
    let error = compute_alpha_indices(tile, &mut block);
    (block, error)
}

/// Brute-force tier: try every ordered endpoint pair spanning the range,
/// pruning pairs whose endpoint-side penalties already exceed the best
/// error seen.
pub fn compress_alpha_brute_force(tile: &ColorBlock) -> (AlphaBlockDxt5, u32) {
    let (min, max) = alpha_range(tile);

    let mut block = AlphaBlockDxt5 {
        alpha0: max,
        alpha1: min,
        indices: 0,
    };

    if max - min > 8 {
        let mut best_error = compute_alpha_error(tile, &block);
        let mut best = (max, min);

        for a0 in (min as u32 + 9)..max as u32 {
            for a1 in min as u32..(a0 - 8) {
                if (max as u32 - a0) + (a1 - min as u32) > best_error {
                    continue;
                }

                block.alpha0 = a0 as u8;
                block.alpha1 = a1 as u8;
                let error = compute_alpha_error(tile, &block);
                if error < best_error {
                    best_error = error;
                    best = (block.alpha0, block.alpha1);
                }
            }
        }

        block.alpha0 = best.0;
        block.alpha1 = best.1;
    }

    let error = compute_alpha_indices(tile, &mut block);
    (block, error)
}

/// One least-squares refinement step for the eight-level palette, given the
/// currently assigned indices. Flips endpoints and remaps indices when the
/// solve inverts them; collapses the indices when they coincide.
fn optimize_alpha8(tile: &ColorBlock, block: &mut AlphaBlockDxt5) {
    let mut alpha2_sum = 0.0f32;
    let mut beta2_sum = 0.0f32;
    let mut alphabeta_sum = 0.0f32;
    let mut alphax_sum = 0.0f32;
    let mut betax_sum = 0.0f32;

    for i in 0..16 {
        let idx = block.index(i);
        let alpha = if idx < 2 {
            1.0 - idx as f32
        } else {
            (8.0 - idx as f32) / 7.0
        };
        let beta = 1.0 - alpha;
        let x = tile.color(i).a as f32;

        alpha2_sum += alpha * alpha;
        beta2_sum += beta * beta;
        alphabeta_sum += alpha * beta;
        alphax_sum += alpha * x;
        betax_sum += beta * x;
    }

    let denominator = alpha2_sum * beta2_sum - alphabeta_sum * alphabeta_sum;
    if denominator == 0.0 {
        return;
    }
    let factor = 1.0 / denominator;

    let a = (alphax_sum * beta2_sum - betax_sum * alphabeta_sum) * factor;
    let b = (betax_sum * alpha2_sum - alphax_sum * alphabeta_sum) * factor;

    let mut alpha0 = a.clamp(0.0, 255.0) as u32;
    let mut alpha1 = b.clamp(0.0, 255.0) as u32;

    if alpha0 < alpha1 {
        std::mem::swap(&mut alpha0, &mut alpha1);
        for i in 0..16 {
            let idx = block.index(i) as u64;
            if idx < 2 {
                block.set_index(i, 1 - idx);
            } else {
                block.set_index(i, 9 - idx);
            }
        }
    } else if alpha0 == alpha1 {
        for i in 0..16 {
            block.set_index(i, 0);
        }
    }

    block.alpha0 = alpha0 as u8;
    block.alpha1 = alpha1 as u8;
}

/// Iterative tier: fast seed, then alternate least-squares endpoint
/// refinement and index reassignment until a local minimum or a fixed
/// point of the index word.
pub fn compress_alpha_iterative(tile: &ColorBlock) -> (AlphaBlockDxt5, u32) {
    let (min, max) = alpha_range(tile);
    let inset = (max - min) / 34;

    let mut block = AlphaBlockDxt5 {
        alpha0: max - inset,
        alpha1: min + inset,
        indices: 0,
    };
    let mut best_error = compute_alpha_indices(tile, &mut block);
    let mut best_block = block;

    loop {
        optimize_alpha8(tile, &mut block);
        let error = compute_alpha_indices(tile, &mut block);

        if error >= best_error {
            break;
        }
        if block.indices == best_block.indices {
            best_block = block;
            best_error = error;
            break;
        }

        best_error = error;
        best_block = block;
    }

    (best_block, best_error)
}
