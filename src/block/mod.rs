//! The 4x4 tile type and the five on-disk block layouts of the BC/DXT
//! family.

mod color_block;
mod dxt;

pub use color_block::ColorBlock;
pub use dxt::{
    AlphaBlockDxt3, AlphaBlockDxt5, BlockAti2, BlockDxt1, BlockDxt3, BlockDxt5,
};
