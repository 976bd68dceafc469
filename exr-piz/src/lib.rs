//! PIZ compressed-block codec for EXR images.
//!
//! PIZ stores a block of 16-bit samples as a value-occupancy bitmap, a 2-D
//! Haar wavelet transform of the remapped samples, and a canonical-Huffman
//! coded payload with run-length acceleration. Decompressing runs the same
//! pipeline backwards:
//!
//! compressed bytes -> bitmap -> Huffman decode -> per-channel inverse
//! wavelet -> reverse lookup table -> raw samples
//!
//! The container parser is a separate concern: it hands this crate a
//! [`BlockInfo`] describing one block plus the compressed bytes, and gets the
//! decoded sample buffer back. Blocks are fully independent, so a host may
//! decode many of them in parallel with one `BlockInfo` and input slice each.
//!
//! # Example
//!
//! ```
//! use exr_core::channel::Channel;
//! use exr_core::compression::Compression;
//! use exr_piz::{compress, decompress, BlockInfo};
//!
//! let block = BlockInfo::new(Compression::Piz, vec![Channel::half("Y")], 8, 8);
//! let raw: Vec<u16> = (0..64).collect();
//! let compressed = compress(&raw, &block).unwrap();
//! assert_eq!(decompress(&compressed, &block).unwrap(), raw);
//! ```

pub mod bitmap;
pub mod codec;
pub mod error;
pub mod huffman;
pub mod types;
pub mod wavelet;

pub use codec::{compress, decompress};
pub use error::{PizError, Result};
pub use types::BlockInfo;
