//! Cluster-fit color compression: sort the tile's colors along the
//! principal axis, sweep every contiguous partition into palette clusters,
//! solve the least-squares endpoints per partition, and keep the best.

use std::sync::OnceLock;

use cgmath::Vector3;

use crate::block::{BlockDxt1, ColorBlock};
use crate::color::Color16;
use crate::fit;

/// How the final block may encode its palette.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorMode {
    /// Four-color mode only (`col0 > col1`), required for the color block
    /// inside DXT3/DXT5.
    FourOnly,
    /// Four-color or three-color, whichever fits better. The transparent
    /// entry is never assigned.
    Any,
    /// Three-color mode with punch-through: texels below the threshold get
    /// index 3 and contribute nothing to the fit.
    PunchThrough(u8),
}

pub struct ClusterParams {
    pub mode: ColorMode,
    /// Per-channel error weights (R, G, B).
    pub metric: Vector3<f32>,
    /// Weight each texel by its alpha, so translucent texels matter less.
    pub weight_by_alpha: bool,
}

/// Number of three-cluster partition words.
pub const THREE_CLUSTER_COUNT: usize = 151;
/// The three-cluster section is padded to this offset, where the
/// four-cluster words begin.
pub const FOUR_CLUSTER_START: usize = 160;
/// End of the four-cluster words; the rest of the table is padding.
pub const FOUR_CLUSTER_END: usize = 975;
/// Total size of the partition-bitmap table.
pub const PARTITION_TABLE_SIZE: usize = 1024;

const THREE_CLUSTER_PAD: u32 = 0x000a_a555;
const FOUR_CLUSTER_PAD: u32 = 0x00aa_ff55;

/// The precomputed partition table over 16 projection-sorted colors.
///
/// `bitmaps` holds one word per partition, two bits of palette slot per
/// texel: 151 three-cluster words (slots 0, 2, 1 for the start, middle and
/// end runs), padded to 160, then the four-cluster words (slots 0, 2, 3, 1)
/// up to 975, padded to 1024. The boundary lists are decoded from the
/// non-padding sections: `(i, j)` splits into interpolation weights
/// 1, 1/2, 0 and `(i, j, k)` into 1, 2/3, 1/3, 0.
pub struct PartitionTables {
    pub bitmaps: Vec<u32>,
    pub three: Vec<(u8, u8)>,
    pub four: Vec<(u8, u8, u8)>,
}

static PARTITIONS: OnceLock<PartitionTables> = OnceLock::new();

fn pack_bitmap(indices: &[u32; 16]) -> u32 {
    let mut bitmap = 0u32;
    for (p, &slot) in indices.iter().enumerate() {
        bitmap |= slot << (2 * p);
    }
    bitmap
}

/// Recover the run boundaries from a partition word. The runs are
/// contiguous over the sorted order, so counting the texels per slot is
/// enough.
fn boundaries_from_bitmap(bitmap: u32) -> (u8, u8, u8) {
    let mut counts = [0u8; 4];
    for p in 0..16 {
        counts[((bitmap >> (2 * p)) & 3) as usize] += 1;
    }
    let i = counts[0];
    let j = i + counts[2];
    let k = j + counts[3];
    (i, j, k)
}

fn build_partition_bitmaps() -> Vec<u32> {
    let mut bitmaps = Vec::with_capacity(PARTITION_TABLE_SIZE);
    let mut indices = [0u32; 16];

    // Three clusters: [0,i) at the start, [i,j) half along, [j,16) at the
    // end.
    for i in (0..=15u8).rev() {
        for m in i..16 {
            indices[m as usize] = 2;
        }
        let jmax = if i == 0 { 15 } else { 16 };
        for j in (i..=jmax).rev() {
            if j < 16 {
                indices[j as usize] = 1;
            }
            bitmaps.push(pack_bitmap(&indices));
        }
    }
    debug_assert_eq!(bitmaps.len(), THREE_CLUSTER_COUNT);
    bitmaps.resize(FOUR_CLUSTER_START, THREE_CLUSTER_PAD);

    // Four clusters: [0,i), then [i,j) one third along, [j,k) two thirds
    // along, [k,16) at the end. Partitions without a third segment
    // duplicate a three-cluster word and are skipped.
    indices = [0; 16];
    for i in (0..=15u8).rev() {
        for m in i..16 {
            indices[m as usize] = 2;
        }
        let jmax = if i == 0 { 15 } else { 16 };
        for j in (i..=jmax).rev() {
            for m in j..16 {
                indices[m as usize] = 3;
            }
            let kmax = if j == 0 { 15 } else { 16 };
            for k in (j..=kmax).rev() {
                if k < 16 {
                    indices[k as usize] = 1;
                }
                if indices.iter().any(|&slot| slot == 3) {
                    bitmaps.push(pack_bitmap(&indices));
                }
            }
        }
    }
    debug_assert_eq!(bitmaps.len(), FOUR_CLUSTER_END);
    bitmaps.resize(PARTITION_TABLE_SIZE, FOUR_CLUSTER_PAD);

    bitmaps
}

pub fn partition_tables() -> &'static PartitionTables {
    PARTITIONS.get_or_init(|| {
        let bitmaps = build_partition_bitmaps();

        let three = bitmaps[..THREE_CLUSTER_COUNT]
            .iter()
            .map(|&bitmap| {
                let (i, j, _) = boundaries_from_bitmap(bitmap);
                (i, j)
            })
            .collect();
        let four = bitmaps[FOUR_CLUSTER_START..FOUR_CLUSTER_END]
            .iter()
            .map(|&bitmap| boundaries_from_bitmap(bitmap))
            .collect();

        PartitionTables { bitmaps, three, four }
    })
}

struct SortedColors {
    points: [Vector3<f32>; 16],
    weights: [f32; 16],
}

fn sort_along_principal_axis(tile: &ColorBlock, params: &ClusterParams) -> SortedColors {
    let mut points = [Vector3::new(0.0, 0.0, 0.0); 16];
    let mut weights = [0.0f32; 16];

    for i in 0..16 {
        let c = tile.color(i);
        points[i] = Vector3::new(
            c.r as f32 / 255.0,
            c.g as f32 / 255.0,
            c.b as f32 / 255.0,
        );
        weights[i] = match params.mode {
            ColorMode::PunchThrough(threshold) if c.a < threshold => 0.0,
            _ if params.weight_by_alpha => c.a as f32 / 255.0,
            _ => 1.0,
        };
    }

    // A fully weightless tile (all texels transparent) still needs a
    // defined axis and solvable sums.
    if weights.iter().all(|&w| w == 0.0) {
        weights = [1.0; 16];
    }

    let axis = fit::compute_principal_component(&points, &weights, params.metric);

    let mut order: [usize; 16] = core::array::from_fn(|i| i);
    let mut projections = [0.0f32; 16];
    for i in 0..16 {
        projections[i] = cgmath::dot(points[i], axis);
    }
    order.sort_by(|&a, &b| {
        projections[a]
            .partial_cmp(&projections[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut sorted = SortedColors {
        points: [Vector3::new(0.0, 0.0, 0.0); 16],
        weights: [0.0; 16],
    };
    for (dst, &src) in order.iter().enumerate() {
        sorted.points[dst] = points[src];
        sorted.weights[dst] = weights[src];
    }
    sorted
}

struct PrefixSums {
    w: [f32; 17],
    x: [Vector3<f32>; 17],
}

fn prefix_sums(sorted: &SortedColors) -> PrefixSums {
    let mut sums = PrefixSums {
        w: [0.0; 17],
        x: [Vector3::new(0.0, 0.0, 0.0); 17],
    };
    for i in 0..16 {
        sums.w[i + 1] = sums.w[i] + sorted.weights[i];
        sums.x[i + 1] = sums.x[i] + sorted.points[i] * sorted.weights[i];
    }
    sums
}

struct Candidate {
    a: Vector3<f32>,
    b: Vector3<f32>,
    error: f32,
}

/// Solve the 2x2 normal equations for the given interpolation-weight sums
/// and return the candidate with its relative error (the constant data
/// term is omitted, it is identical for every partition).
#[allow(clippy::too_many_arguments)]
fn solve(
    alpha2_sum: f32,
    beta2_sum: f32,
    alphabeta_sum: f32,
    alphax_sum: Vector3<f32>,
    betax_sum: Vector3<f32>,
    metric_sqr: Vector3<f32>,
) -> Option<Candidate> {
    let denominator = alpha2_sum * beta2_sum - alphabeta_sum * alphabeta_sum;
    if denominator.abs() <= f32::EPSILON {
        return None;
    }
    let factor = 1.0 / denominator;

    let clamp01 = |v: f32| v.clamp(0.0, 1.0);
    let a = Vector3::new(
        clamp01((alphax_sum.x * beta2_sum - betax_sum.x * alphabeta_sum) * factor),
        clamp01((alphax_sum.y * beta2_sum - betax_sum.y * alphabeta_sum) * factor),
        clamp01((alphax_sum.z * beta2_sum - betax_sum.z * alphabeta_sum) * factor),
    );
    let b = Vector3::new(
        clamp01((betax_sum.x * alpha2_sum - alphax_sum.x * alphabeta_sum) * factor),
        clamp01((betax_sum.y * alpha2_sum - alphax_sum.y * alphabeta_sum) * factor),
        clamp01((betax_sum.z * alpha2_sum - alphax_sum.z * alphabeta_sum) * factor),
    );

    let channel_error = |a: f32, b: f32, ax: f32, bx: f32| {
        a * a * alpha2_sum + b * b * beta2_sum + 2.0 * (a * b * alphabeta_sum - a * ax - b * bx)
    };
    let error = metric_sqr.x * channel_error(a.x, b.x, alphax_sum.x, betax_sum.x)
        + metric_sqr.y * channel_error(a.y, b.y, alphax_sum.y, betax_sum.y)
        + metric_sqr.z * channel_error(a.z, b.z, alphax_sum.z, betax_sum.z);

    Some(Candidate { a, b, error })
}

fn best_candidate_four(sums: &PrefixSums, metric_sqr: Vector3<f32>) -> Option<Candidate> {
    let tables = partition_tables();
    let seg_w = |from: u8, to: u8| sums.w[to as usize] - sums.w[from as usize];
    let seg_x = |from: u8, to: u8| sums.x[to as usize] - sums.x[from as usize];

    let mut best: Option<Candidate> = None;
    for &(i, j, k) in &tables.four {
        let wa = seg_w(0, i);
        let wb = seg_w(i, j);
        let wc = seg_w(j, k);
        let wd = seg_w(k, 16);
        let xa = seg_x(0, i);
        let xb = seg_x(i, j);
        let xc = seg_x(j, k);
        let xd = seg_x(k, 16);

        let alpha2_sum = wa + wb * (4.0 / 9.0) + wc * (1.0 / 9.0);
        let beta2_sum = wd + wc * (4.0 / 9.0) + wb * (1.0 / 9.0);
        let alphabeta_sum = (wb + wc) * (2.0 / 9.0);
        let alphax_sum = xa + xb * (2.0 / 3.0) + xc * (1.0 / 3.0);
        let betax_sum = xd + xc * (2.0 / 3.0) + xb * (1.0 / 3.0);

        if let Some(candidate) = solve(
            alpha2_sum,
            beta2_sum,
            alphabeta_sum,
            alphax_sum,
            betax_sum,
            metric_sqr,
        ) {
            if best.as_ref().map_or(true, |b| candidate.error < b.error) {
                best = Some(candidate);
            }
        }
    }

    // The two-cluster splits [0,i) vs [i,16) live in the table as the
    // empty-middle three-cluster words. Their interpolation weights are
    // mode-independent, so they are valid endpoint-only partitions of the
    // four-color subspace as well.
    for &(i, j) in &tables.three {
        if i != j {
            continue;
        }
        let wa = seg_w(0, i);
        let wd = seg_w(i, 16);
        let xa = seg_x(0, i);
        let xd = seg_x(i, 16);

        if let Some(candidate) = solve(wa, wd, 0.0, xa, xd, metric_sqr) {
            if best.as_ref().map_or(true, |b| candidate.error < b.error) {
                best = Some(candidate);
            }
        }
    }

    best
}

fn best_candidate_three(sums: &PrefixSums, metric_sqr: Vector3<f32>) -> Option<Candidate> {
    let tables = partition_tables();
    let seg_w = |from: u8, to: u8| sums.w[to as usize] - sums.w[from as usize];
    let seg_x = |from: u8, to: u8| sums.x[to as usize] - sums.x[from as usize];

    let mut best: Option<Candidate> = None;
    for &(i, j) in &tables.three {
        let wa = seg_w(0, i);
        let wb = seg_w(i, j);
        let wc = seg_w(j, 16);
        let xa = seg_x(0, i);
        let xb = seg_x(i, j);
        let xc = seg_x(j, 16);

        let alpha2_sum = wa + wb * 0.25;
        let beta2_sum = wc + wb * 0.25;
        let alphabeta_sum = wb * 0.25;
        let alphax_sum = xa + xb * 0.5;
        let betax_sum = xc + xb * 0.5;

        if let Some(candidate) = solve(
            alpha2_sum,
            beta2_sum,
            alphabeta_sum,
            alphax_sum,
            betax_sum,
            metric_sqr,
        ) {
            if best.as_ref().map_or(true, |b| candidate.error < b.error) {
                best = Some(candidate);
            }
        }
    }
    best
}

/// Quantize a continuous endpoint to 5:6:5, searching the floor/ceil
/// neighborhood of every channel for the best metric-weighted rounding.
fn snap_to_565(v: Vector3<f32>, metric_sqr: Vector3<f32>) -> Color16 {
    let channel = |value: f32, levels: f32| -> (u8, u8) {
        let scaled = value * levels;
        let lo = scaled.floor().clamp(0.0, levels) as u8;
        let hi = scaled.ceil().clamp(0.0, levels) as u8;
        (lo, hi)
    };
    let expand = |c: Color16| {
        let e = c.expand();
        Vector3::new(e.r as f32 / 255.0, e.g as f32 / 255.0, e.b as f32 / 255.0)
    };

    let (r_lo, r_hi) = channel(v.x, 31.0);
    let (g_lo, g_hi) = channel(v.y, 63.0);
    let (b_lo, b_hi) = channel(v.z, 31.0);

    let mut best = Color16::new(r_lo, g_lo, b_lo);
    let mut best_error = f32::MAX;
    for &r in &[r_lo, r_hi] {
        for &g in &[g_lo, g_hi] {
            for &b in &[b_lo, b_hi] {
                let candidate = Color16::new(r, g, b);
                let e = expand(candidate) - v;
                let error =
                    metric_sqr.x * e.x * e.x + metric_sqr.y * e.y * e.y + metric_sqr.z * e.z * e.z;
                if error < best_error {
                    best_error = error;
                    best = candidate;
                }
            }
        }
    }
    best
}

fn weighted_block_error(tile: &ColorBlock, block: &BlockDxt1, params: &ClusterParams) -> f32 {
    let palette = block.evaluate_palette();
    let metric = params.metric;

    let mut total = 0.0;
    for i in 0..16 {
        let c = tile.color(i);
        if let ColorMode::PunchThrough(threshold) = params.mode {
            if c.a < threshold {
                continue;
            }
        }
        let p = palette[block.index(i)];
        let dr = (c.r as f32 - p.r as f32) * metric.x;
        let dg = (c.g as f32 - p.g as f32) * metric.y;
        let db = (c.b as f32 - p.b as f32) * metric.z;
        total += dr * dr + dg * dg + db * db;
    }
    total
}

/// Assign indices by metric-weighted nearest entry. `entries` restricts the
/// palette slots in play; punch-through texels go straight to index 3.
fn assign_indices(tile: &ColorBlock, block: &mut BlockDxt1, params: &ClusterParams, entries: usize) {
    let palette = block.evaluate_palette();
    let metric = params.metric;

    block.indices = 0;
    for i in 0..16 {
        let c = tile.color(i);
        if let ColorMode::PunchThrough(threshold) = params.mode {
            if c.a < threshold {
                block.set_index(i, 3);
                continue;
            }
        }

        let mut best = 0;
        let mut best_error = f32::MAX;
        for (p, entry) in palette.iter().enumerate().take(entries) {
            let dr = (c.r as f32 - entry.r as f32) * metric.x;
            let dg = (c.g as f32 - entry.g as f32) * metric.y;
            let db = (c.b as f32 - entry.b as f32) * metric.z;
            let error = dr * dr + dg * dg + db * db;
            if error < best_error {
                best_error = error;
                best = p;
            }
        }
        block.set_index(i, best as u32);
    }
}

fn build_four_color_block(
    tile: &ColorBlock,
    candidate: &Candidate,
    params: &ClusterParams,
    metric_sqr: Vector3<f32>,
) -> BlockDxt1 {
    let mut col0 = snap_to_565(candidate.a, metric_sqr);
    let mut col1 = snap_to_565(candidate.b, metric_sqr);

    if col0.bits() < col1.bits() {
        std::mem::swap(&mut col0, &mut col1);
    }
    if col0.bits() == col1.bits() {
        // Both endpoints rounded to the same cell; separate them so the
        // block stays in four-color mode. Entry 0 still reconstructs the
        // color exactly.
        if col1.bits() > 0 {
            col1 = Color16::from_bits(col1.bits() - 1);
        } else {
            col0 = Color16::from_bits(1);
        }
    }

    let mut block = BlockDxt1 { col0, col1, indices: 0 };
    assign_indices(tile, &mut block, params, 4);
    block
}

fn build_three_color_block(
    tile: &ColorBlock,
    candidate: &Candidate,
    params: &ClusterParams,
    metric_sqr: Vector3<f32>,
) -> BlockDxt1 {
    let mut col0 = snap_to_565(candidate.a, metric_sqr);
    let mut col1 = snap_to_565(candidate.b, metric_sqr);

    // Three-color mode requires col0 <= col1.
    if col0.bits() > col1.bits() {
        std::mem::swap(&mut col0, &mut col1);
    }

    let mut block = BlockDxt1 { col0, col1, indices: 0 };
    assign_indices(tile, &mut block, params, 3);
    block
}

/// Normal-tier compression of one tile.
pub fn compress_cluster(tile: &ColorBlock, params: &ClusterParams) -> BlockDxt1 {
    let metric_sqr = Vector3::new(
        params.metric.x * params.metric.x,
        params.metric.y * params.metric.y,
        params.metric.z * params.metric.z,
    );

    let sorted = sort_along_principal_axis(tile, params);
    let sums = prefix_sums(&sorted);

    let four = match params.mode {
        ColorMode::PunchThrough(_) => None,
        _ => best_candidate_four(&sums, metric_sqr)
            .map(|c| build_four_color_block(tile, &c, params, metric_sqr)),
    };
    let three = match params.mode {
        ColorMode::FourOnly => None,
        _ => best_candidate_three(&sums, metric_sqr)
            .map(|c| build_three_color_block(tile, &c, params, metric_sqr)),
    };

    match (four, three) {
        (Some(four), Some(three)) => {
            // Prefer four-color mode on ties; the punch-through case never
            // reaches here.
            if weighted_block_error(tile, &three, params) < weighted_block_error(tile, &four, params)
            {
                three
            } else {
                four
            }
        }
        (Some(block), None) | (None, Some(block)) => block,
        (None, None) => {
            // Degenerate fit (all weights on one point); the bounding-box
            // path always produces a valid block.
            super::fast::compress_dxt1_bounds(tile)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color32;
    use crate::compress::fast;

    fn default_params(mode: ColorMode) -> ClusterParams {
        ClusterParams {
            mode,
            metric: Vector3::new(1.0, 1.0, 1.0),
            weight_by_alpha: false,
        }
    }

    fn gradient_tile() -> ColorBlock {
        let mut colors = [Color32::default(); 16];
        for (i, c) in colors.iter_mut().enumerate() {
            let v = (i * 16) as u8;
            *c = Color32::new(v, v / 2, 255 - v, 255);
        }
        ColorBlock::new(colors)
    }

    #[test]
    fn partition_table_matches_the_tabulated_layout() {
        let tables = partition_tables();

        assert_eq!(tables.bitmaps.len(), PARTITION_TABLE_SIZE);
        assert_eq!(tables.three.len(), THREE_CLUSTER_COUNT);
        assert_eq!(tables.four.len(), FOUR_CLUSTER_END - FOUR_CLUSTER_START);

        // The sections are padded with the fixed filler words.
        assert!(tables.bitmaps[THREE_CLUSTER_COUNT..FOUR_CLUSTER_START]
            .iter()
            .all(|&bitmap| bitmap == 0x000a_a555));
        assert!(tables.bitmaps[FOUR_CLUSTER_END..]
            .iter()
            .all(|&bitmap| bitmap == 0x00aa_ff55));

        // Every three-cluster split is ordered; every four-cluster split
        // carries a non-empty third segment.
        assert!(tables.three.iter().all(|&(i, j)| i <= j && j <= 16));
        assert!(tables.four.iter().all(|&(i, j, k)| i <= j && j < k && k <= 16));

        // No partition word repeats within the real sections.
        let mut seen = std::collections::HashSet::new();
        for &bitmap in tables.bitmaps[..THREE_CLUSTER_COUNT]
            .iter()
            .chain(&tables.bitmaps[FOUR_CLUSTER_START..FOUR_CLUSTER_END])
        {
            assert!(seen.insert(bitmap), "duplicate partition {:#010x}", bitmap);
        }
    }

    #[test]
    fn two_color_tile_recovers_exact_endpoints() {
        let red = Color32::new(255, 0, 0, 255);
        let blue = Color32::new(0, 0, 255, 255);
        let mut colors = [red; 16];
        for (i, c) in colors.iter_mut().enumerate() {
            if i % 2 == 1 {
                *c = blue;
            }
        }
        let tile = ColorBlock::new(colors);
        let block = compress_cluster(&tile, &default_params(ColorMode::FourOnly));

        assert!(block.is_four_color_mode());
        assert_eq!(block.error(&tile), 0);
        let palette = block.evaluate_palette();
        let endpoints = [palette[0], palette[1]];
        assert!(endpoints.contains(&red));
        assert!(endpoints.contains(&blue));
    }

    #[test]
    fn cluster_fit_is_no_worse_than_the_fast_tier() {
        let tile = gradient_tile();
        let fast_block = fast::compress_dxt1_bounds(&tile);
        let cluster_block = compress_cluster(&tile, &default_params(ColorMode::Any));
        assert!(cluster_block.error(&tile) <= fast_block.error(&tile));
    }

    #[test]
    fn four_only_mode_always_wins_the_ordering_contract() {
        for seed in 0..32u32 {
            let mut colors = [Color32::default(); 16];
            let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
            for c in colors.iter_mut() {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                *c = Color32::new(
                    (state >> 24) as u8,
                    (state >> 16) as u8,
                    (state >> 8) as u8,
                    255,
                );
            }
            let block =
                compress_cluster(&ColorBlock::new(colors), &default_params(ColorMode::FourOnly));
            assert!(
                block.col0.bits() > block.col1.bits(),
                "seed {}: {:?}",
                seed,
                block
            );
        }
    }

    #[test]
    fn punch_through_texels_get_the_transparent_index() {
        let mut colors = [Color32::new(200, 50, 25, 255); 16];
        colors[5].a = 0;
        colors[9].a = 10;
        let tile = ColorBlock::new(colors);
        let block = compress_cluster(&tile, &default_params(ColorMode::PunchThrough(128)));

        assert!(!block.is_four_color_mode());
        assert_eq!(block.index(5), 3);
        assert_eq!(block.index(9), 3);
        assert_ne!(block.index(0), 3);
    }
}
