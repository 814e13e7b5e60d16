//! The task-dispatcher abstraction and the tile driver that cuts a surface
//! into 4x4 blocks and compresses them through it.

use rayon::prelude::*;

use crate::block::ColorBlock;
use crate::compress::BlockEncoder;
use crate::config::{AlphaMode, CompressionOptions};
use crate::image::Image;

/// Runs one task per fixed-size chunk of the output buffer. Chunks are
/// disjoint, so implementations may invoke the tasks in any order and in
/// parallel; the caller relies on nothing but "each index runs exactly
/// once".
pub trait TaskDispatcher: Sync {
    fn dispatch(&self, out: &mut [u8], chunk_size: usize, task: &(dyn Fn(usize, &mut [u8]) + Sync));
}

/// Runs every task on the calling thread, in index order.
pub struct SequentialDispatcher;

impl TaskDispatcher for SequentialDispatcher {
    fn dispatch(&self, out: &mut [u8], chunk_size: usize, task: &(dyn Fn(usize, &mut [u8]) + Sync)) {
        for (i, chunk) in out.chunks_mut(chunk_size).enumerate() {
            task(i, chunk);
        }
    }
}

/// Worker-pool dispatcher over the rayon thread pool.
pub struct ParallelDispatcher {
    threads: usize,
}

impl ParallelDispatcher {
    pub fn new() -> Self {
        Self { threads: num_cpus::get() }
    }
}

impl Default for ParallelDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskDispatcher for ParallelDispatcher {
    fn dispatch(&self, out: &mut [u8], chunk_size: usize, task: &(dyn Fn(usize, &mut [u8]) + Sync)) {
        let count = out.len() / chunk_size.max(1);
        let min_len = (count / (4 * self.threads.max(1))).max(1);
        out.par_chunks_mut(chunk_size)
            .enumerate()
            .with_min_len(min_len)
            .for_each(|(i, chunk)| task(i, chunk));
    }
}

/// Compress a surface into a contiguous buffer of blocks, numbered
/// left-to-right, top-to-bottom. Surfaces smaller than four blocks run on
/// the calling thread regardless of the dispatcher.
pub(crate) fn compress_surface(
    encoder: BlockEncoder,
    image: &Image,
    alpha_mode: AlphaMode,
    options: &CompressionOptions,
    dispatcher: &dyn TaskDispatcher,
) -> Vec<u8> {
    let w = image.width();
    let h = image.height();
    let bw = (w + 3) / 4;
    let bh = (h + 3) / 4;
    let count = (bw * bh) as usize;
    let block_size = encoder.block_size();

    let mut out = vec![0u8; count * block_size];
    if count == 0 {
        return out;
    }

    let task = |i: usize, chunk: &mut [u8]| {
        let x = (i as u32 % bw) * 4;
        let y = (i as u32 / bw) * 4;
        let tile = ColorBlock::from_image(image, x, y);
        encoder.compress_block(&tile, alpha_mode, options, chunk);
    };

    let sequential = SequentialDispatcher;
    let dispatcher: &dyn TaskDispatcher = if count < 4 { &sequential } else { dispatcher };

    log::debug!(
        "compressing {}x{} surface: {} blocks of {} bytes",
        w,
        h,
        count,
        block_size
    );
    dispatcher.dispatch(&mut out, block_size, &task);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color32;
    use crate::config::Format;

    fn noise_image(w: u32, h: u32) -> Image {
        let mut image = Image::new(w, h);
        let mut state = 0xdead_beefu32;
        for y in 0..h {
            for x in 0..w {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                image.set_pixel(
                    x,
                    y,
                    Color32::new((state >> 24) as u8, (state >> 16) as u8, (state >> 8) as u8, state as u8),
                );
            }
        }
        image
    }

    #[test]
    fn parallel_and_sequential_output_are_identical() {
        let image = noise_image(32, 24);
        let options = CompressionOptions::new();

        for encoder in [BlockEncoder::Bc1, BlockEncoder::Bc3, BlockEncoder::Bc5] {
            let sequential = compress_surface(
                encoder,
                &image,
                AlphaMode::Transparency,
                &options,
                &SequentialDispatcher,
            );
            let parallel = compress_surface(
                encoder,
                &image,
                AlphaMode::Transparency,
                &options,
                &ParallelDispatcher::new(),
            );
            assert_eq!(sequential, parallel);
        }
    }

    #[test]
    fn non_multiple_of_four_extents_round_up_to_whole_blocks() {
        let image = noise_image(9, 6);
        let options = CompressionOptions::new();
        let bytes = compress_surface(
            BlockEncoder::Bc1,
            &image,
            AlphaMode::None,
            &options,
            &SequentialDispatcher,
        );
        // 3x2 blocks of 8 bytes.
        assert_eq!(bytes.len(), 3 * 2 * 8);
    }

    #[test]
    fn one_by_one_image_produces_one_block() {
        let image = noise_image(1, 1);
        let options = CompressionOptions::new();
        for (encoder, size) in [(BlockEncoder::Bc1, 8), (BlockEncoder::Bc2, 16), (BlockEncoder::Bc4, 8)] {
            let bytes = compress_surface(
                encoder,
                &image,
                AlphaMode::None,
                &options,
                &SequentialDispatcher,
            );
            assert_eq!(bytes.len(), size);
        }
    }

    #[test]
    fn zero_area_surface_writes_nothing() {
        let image = Image::new(0, 0);
        let options = CompressionOptions::new();
        let bytes = compress_surface(
            BlockEncoder::Bc1,
            &image,
            AlphaMode::None,
            &options,
            &SequentialDispatcher,
        );
        assert!(bytes.is_empty());
    }

    #[test]
    fn block_order_is_row_major() {
        // Left half red, right half blue; the first block must encode red.
        let mut image = Image::new(8, 4);
        for y in 0..4 {
            for x in 0..8 {
                let c = if x < 4 {
                    Color32::new(255, 0, 0, 255)
                } else {
                    Color32::new(0, 0, 255, 255)
                };
                image.set_pixel(x, y, c);
            }
        }
        let options = CompressionOptions::new();
        let bytes = compress_surface(
            BlockEncoder::Bc1,
            &image,
            AlphaMode::None,
            &options,
            &SequentialDispatcher,
        );
        assert_eq!(bytes.len(), 16);

        let first = crate::block::BlockDxt1::from_bytes(bytes[0..8].try_into().unwrap());
        let second = crate::block::BlockDxt1::from_bytes(bytes[8..16].try_into().unwrap());
        assert_eq!(first.evaluate_palette()[first.index(0)], Color32::new(255, 0, 0, 255));
        assert_eq!(second.evaluate_palette()[second.index(0)], Color32::new(0, 0, 255, 255));
    }

    #[test]
    fn only_block_formats_resolve_to_an_encoder() {
        assert_eq!(BlockEncoder::for_format(Format::Rgba), None);
        assert_eq!(BlockEncoder::for_format(Format::Ctx1), None);
        assert_eq!(BlockEncoder::for_format(Format::Bc1), Some(BlockEncoder::Bc1));
    }
}
