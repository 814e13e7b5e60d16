//! Highest-tier endpoint refinement: a continuous least-squares re-solve of
//! the endpoints for the currently assigned indices, and integer local
//! searches around the endpoints in 5:6:5 space.

use cgmath::Vector3;

use crate::block::{BlockDxt1, ColorBlock};
use crate::color::{Color16, Color32};

/// Weighted squared distance of a texel to a palette entry.
fn entry_error(c: Color32, p: Color32, weights: [u32; 3]) -> u32 {
    c.distance_squared_weighted(p, weights)
}

/// Error of the best achievable index assignment for this palette.
fn palette_error(tile: &ColorBlock, palette: &[Color32; 4], entries: usize, weights: [u32; 3]) -> u32 {
    let mut total = 0;
    for i in 0..16 {
        let c = tile.color(i);
        total += palette[..entries]
            .iter()
            .map(|&p| entry_error(c, p, weights))
            .min()
            .unwrap_or(0);
    }
    total
}

fn candidate_palette(block: &BlockDxt1, four_color_only: bool) -> ([Color32; 4], usize) {
    if four_color_only {
        (block.evaluate_palette4(), 4)
    } else if block.is_four_color_mode() {
        (block.evaluate_palette(), 4)
    } else {
        // Never hand out the transparent entry during refinement.
        (block.evaluate_palette(), 3)
    }
}

fn assign_best_indices(tile: &ColorBlock, block: &mut BlockDxt1, four_color_only: bool, weights: [u32; 3]) -> u32 {
    let (palette, entries) = candidate_palette(block, four_color_only);

    let mut total = 0;
    block.indices = 0;
    for i in 0..16 {
        let c = tile.color(i);
        let mut best = 0;
        let mut best_error = u32::MAX;
        for (p, &entry) in palette.iter().enumerate().take(entries) {
            let error = entry_error(c, entry, weights);
            if error < best_error {
                best_error = error;
                best = p;
            }
        }
        total += best_error;
        block.set_index(i, best as u32);
    }
    total
}

fn block_error(tile: &ColorBlock, block: &BlockDxt1, weights: [u32; 3]) -> u32 {
    block.error_weighted(tile, weights)
}

/// Solve the 2x2 normal equations for the endpoints implied by the current
/// index assignment, requantize, and keep the result when it improves the
/// block. Returns whether the block changed.
pub fn optimize_endpoints(
    tile: &ColorBlock,
    block: &mut BlockDxt1,
    four_color_only: bool,
    weights: [u32; 3],
) -> bool {
    let mut alpha2_sum = 0.0f32;
    let mut beta2_sum = 0.0f32;
    let mut alphabeta_sum = 0.0f32;
    let mut alphax_sum = Vector3::new(0.0f32, 0.0, 0.0);
    let mut betax_sum = Vector3::new(0.0f32, 0.0, 0.0);

    for i in 0..16 {
        let bits = block.indices >> (2 * i);
        let mut beta = (bits & 1) as f32;
        if bits & 2 != 0 {
            beta = (1.0 + beta) / 3.0;
        }
        let alpha = 1.0 - beta;

        let c = tile.color(i);
        let x = Vector3::new(c.r as f32 / 255.0, c.g as f32 / 255.0, c.b as f32 / 255.0);

        alpha2_sum += alpha * alpha;
        beta2_sum += beta * beta;
        alphabeta_sum += alpha * beta;
        alphax_sum += x * alpha;
        betax_sum += x * beta;
    }

    let denominator = alpha2_sum * beta2_sum - alphabeta_sum * alphabeta_sum;
    if denominator.abs() <= f32::EPSILON {
        return false;
    }
    let factor = 1.0 / denominator;

    let clamp01 = |v: f32| v.clamp(0.0, 1.0);
    let a = (alphax_sum * beta2_sum - betax_sum * alphabeta_sum) * factor;
    let b = (betax_sum * alpha2_sum - alphax_sum * alphabeta_sum) * factor;

    let mut candidate = BlockDxt1 {
        col0: Color16::new(
            (clamp01(a.x) * 31.0) as u8,
            (clamp01(a.y) * 63.0) as u8,
            (clamp01(a.z) * 31.0) as u8,
        ),
        col1: Color16::new(
            (clamp01(b.x) * 31.0) as u8,
            (clamp01(b.y) * 63.0) as u8,
            (clamp01(b.z) * 31.0) as u8,
        ),
        indices: 0,
    };

    if candidate.col0.bits() < candidate.col1.bits() {
        std::mem::swap(&mut candidate.col0, &mut candidate.col1);
    }
    if four_color_only && candidate.col0.bits() == candidate.col1.bits() {
        if candidate.col1.bits() > 0 {
            candidate.col1 = Color16::from_bits(candidate.col1.bits() - 1);
        } else {
            candidate.col0 = Color16::from_bits(1);
        }
    }

    let candidate_error = assign_best_indices(tile, &mut candidate, four_color_only, weights);
    if candidate_error < block_error(tile, block, weights) {
        *block = candidate;
        true
    } else {
        false
    }
}

/// Search one channel of one endpoint at a time, window of radius 4.
pub fn refine_1d_search(
    tile: &ColorBlock,
    block: &mut BlockDxt1,
    four_color_only: bool,
    weights: [u32; 3],
) {
    const W: i32 = 4;

    let mut best = *block;
    let mut best_error = best_palette_error(tile, &best, four_color_only, weights);

    loop {
        let mut changed = false;
        let base0 = best.col0;
        let base1 = best.col1;

        for channel in 0..3 {
            for endpoint in 0..2 {
                let base = if endpoint == 0 { base0 } else { base1 };
                for step in -W..=W {
                    if step == 0 {
                        continue;
                    }
                    let mut candidate = best;
                    let target = if endpoint == 0 {
                        &mut candidate.col0
                    } else {
                        &mut candidate.col1
                    };
                    *target = step_channel(base, channel, step);

                    if let Some(error) =
                        try_candidate(tile, &candidate, four_color_only, weights)
                    {
                        if error < best_error {
                            best_error = error;
                            best = candidate;
                            changed = true;
                        }
                    }
                }
            }
        }

        if !changed {
            break;
        }
    }

    finish_search(tile, block, best, four_color_only, weights);
}

/// Search all three channels of one endpoint jointly, window of radius 2.
pub fn refine_3d_search(
    tile: &ColorBlock,
    block: &mut BlockDxt1,
    four_color_only: bool,
    weights: [u32; 3],
) {
    const W: i32 = 2;

    let mut best = *block;
    let mut best_error = best_palette_error(tile, &best, four_color_only, weights);

    loop {
        let mut changed = false;

        for endpoint in 0..2 {
            let base = if endpoint == 0 { best.col0 } else { best.col1 };
            for z in -W..=W {
                for y in -W..=W {
                    for x in -W..=W {
                        if x == 0 && y == 0 && z == 0 {
                            continue;
                        }
                        let mut candidate = best;
                        let stepped = Color16::saturate(
                            base.r as i32 + x,
                            base.g as i32 + y,
                            base.b as i32 + z,
                        );
                        if endpoint == 0 {
                            candidate.col0 = stepped;
                        } else {
                            candidate.col1 = stepped;
                        }

                        if let Some(error) =
                            try_candidate(tile, &candidate, four_color_only, weights)
                        {
                            if error < best_error {
                                best_error = error;
                                best = candidate;
                                changed = true;
                            }
                        }
                    }
                }
            }
        }

        if !changed {
            break;
        }
    }

    finish_search(tile, block, best, four_color_only, weights);
}

/// Search both endpoints jointly, window of radius 1.
pub fn refine_6d_search(
    tile: &ColorBlock,
    block: &mut BlockDxt1,
    four_color_only: bool,
    weights: [u32; 3],
) {
    const W: i32 = 1;

    let mut best = *block;
    let mut best_error = best_palette_error(tile, &best, four_color_only, weights);

    loop {
        let mut changed = false;
        let base0 = best.col0;
        let base1 = best.col1;

        for z0 in -W..=W {
            for y0 in -W..=W {
                for x0 in -W..=W {
                    for z1 in -W..=W {
                        for y1 in -W..=W {
                            for x1 in -W..=W {
                                let mut candidate = best;
                                candidate.col0 = Color16::saturate(
                                    base0.r as i32 + x0,
                                    base0.g as i32 + y0,
                                    base0.b as i32 + z0,
                                );
                                candidate.col1 = Color16::saturate(
                                    base1.r as i32 + x1,
                                    base1.g as i32 + y1,
                                    base1.b as i32 + z1,
                                );

                                if let Some(error) =
                                    try_candidate(tile, &candidate, four_color_only, weights)
                                {
                                    if error < best_error {
                                        best_error = error;
                                        best = candidate;
                                        changed = true;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        if !changed {
            break;
        }
    }

    finish_search(tile, block, best, four_color_only, weights);
}

fn step_channel(c: Color16, channel: usize, step: i32) -> Color16 {
    match channel {
        0 => Color16::saturate(c.r as i32 + step, c.g as i32, c.b as i32),
        1 => Color16::saturate(c.r as i32, c.g as i32 + step, c.b as i32),
        _ => Color16::saturate(c.r as i32, c.g as i32, c.b as i32 + step),
    }
}

/// Palette error of a candidate, or `None` when the candidate would leave
/// the required four-color mode.
fn try_candidate(
    tile: &ColorBlock,
    candidate: &BlockDxt1,
    four_color_only: bool,
    weights: [u32; 3],
) -> Option<u32> {
    if four_color_only && candidate.col0.bits() <= candidate.col1.bits() {
        return None;
    }
    Some(best_palette_error(tile, candidate, four_color_only, weights))
}

fn best_palette_error(
    tile: &ColorBlock,
    block: &BlockDxt1,
    four_color_only: bool,
    weights: [u32; 3],
) -> u32 {
    let (palette, entries) = candidate_palette(block, four_color_only);
    palette_error(tile, &palette, entries, weights)
}

fn finish_search(
    tile: &ColorBlock,
    block: &mut BlockDxt1,
    best: BlockDxt1,
    four_color_only: bool,
    weights: [u32; 3],
) {
    let mut result = best;
    assign_best_indices(tile, &mut result, four_color_only, weights);
    if block_error(tile, &result, weights) <= block_error(tile, block, weights) {
        *block = result;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::cluster::{self, ClusterParams, ColorMode};
    use crate::compress::fast;

    const UNIFORM: [u32; 3] = [1, 1, 1];

    fn noisy_tile() -> ColorBlock {
        let mut colors = [Color32::default(); 16];
        let mut state = 0x1234_5678u32;
        for c in colors.iter_mut() {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            *c = Color32::new((state >> 24) as u8, (state >> 13) as u8, (state >> 5) as u8, 255);
        }
        ColorBlock::new(colors)
    }

    #[test]
    fn least_squares_step_never_regresses() {
        let tile = noisy_tile();
        let mut block = fast::compress_dxt1_bounds(&tile);
        let before = block.error_weighted(&tile, UNIFORM);
        optimize_endpoints(&tile, &mut block, true, UNIFORM);
        assert!(block.error_weighted(&tile, UNIFORM) <= before);
        assert!(block.col0.bits() > block.col1.bits());
    }

    #[test]
    fn local_searches_never_regress() {
        let tile = noisy_tile();
        let params = ClusterParams {
            mode: ColorMode::FourOnly,
            metric: cgmath::Vector3::new(1.0, 1.0, 1.0),
            weight_by_alpha: false,
        };
        let mut block = cluster::compress_cluster(&tile, &params);
        let start = block.error_weighted(&tile, UNIFORM);

        refine_1d_search(&tile, &mut block, true, UNIFORM);
        let after_1d = block.error_weighted(&tile, UNIFORM);
        assert!(after_1d <= start);

        refine_3d_search(&tile, &mut block, true, UNIFORM);
        let after_3d = block.error_weighted(&tile, UNIFORM);
        assert!(after_3d <= after_1d);

        refine_6d_search(&tile, &mut block, true, UNIFORM);
        assert!(block.error_weighted(&tile, UNIFORM) <= after_3d);
        assert!(block.col0.bits() > block.col1.bits());
    }
}
