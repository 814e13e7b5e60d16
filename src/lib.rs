//! Texture compression for the BC/DXT family of GPU block formats.
//!
//! The crate converts uncompressed RGBA rasters into BC1/BC1a/BC2/BC3/
//! BC3n/BC4/BC5 blocks, writes them into the DirectDraw Surface (DDS)
//! container, and optionally synthesizes a mipmap pyramid and applies
//! color-space conversions along the way.
//!
//! The entry point is [`Context::process`], driven by three option
//! records: [`InputOptions`] (layout and preprocessing of the source
//! pixels), [`CompressionOptions`] (format, quality and per-block search
//! knobs), and [`OutputOptions`] (where the stream goes and how errors are
//! reported).
//!
//! ```no_run
//! use texcomp::{CompressionOptions, Context, Format, InputOptions, OutputOptions, Quality, TextureType};
//!
//! # fn main() -> anyhow::Result<()> {
//! let pixels = vec![0u8; 256 * 256 * 4]; // BGRA
//!
//! let mut input = InputOptions::new();
//! input.set_texture_layout(TextureType::D2, 256, 256, 1);
//! input.set_mipmap_data(&pixels, 256, 256, 1, 0, 0)?;
//!
//! let mut compression = CompressionOptions::new();
//! compression.set_format(Format::Bc3);
//! compression.set_quality(Quality::Production);
//!
//! let mut output = OutputOptions::new();
//! output.set_file_name("out.dds");
//!
//! Context::new().process(&input, &compression, &mut output)?;
//! # Ok(())
//! # }
//! ```

mod block;
mod color;
mod compress;
mod config;
mod dds;
mod dispatch;
mod error;
mod fit;
mod image;
mod output;
mod pipeline;

pub use block::{AlphaBlockDxt3, AlphaBlockDxt5, BlockAti2, BlockDxt1, BlockDxt3, BlockDxt5, ColorBlock};
pub use color::{Color16, Color32};
pub use config::{
    AlphaMode, ColorTransform, CompressionOptions, Container, Decoder, Format, InputFormat,
    InputOptions, MipmapFilter, PixelType, Quality, RoundMode, TextureType, WrapMode,
};
pub use dds::{DdsHeader, DdsHeader10};
pub use dispatch::{ParallelDispatcher, SequentialDispatcher, TaskDispatcher};
pub use error::{ErrorHandler, ErrorKind};
pub use image::{rms_alpha_error, rms_color_error, FloatImage, Image, PixelOrder};
pub use output::{FileOutputHandler, MemoryOutputHandler, OutputHandler, OutputOptions};
pub use pipeline::Context;

/// Build the lazily-initialized lookup tables now, so the first
/// compression call does not pay the one-time cost.
pub fn precompute() {
    compress::fast::precompute_tables();
}
