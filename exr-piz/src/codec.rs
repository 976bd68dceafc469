//! The PIZ block codec: bitmap/LUT, wavelet, and Huffman glued into the
//! on-disk block layout.
//!
//! A compressed block looks like this, all integers little-endian:
//!
//! | offset | width | field |
//! |--------|-------|-------|
//! | 0      | u32   | bitmap min byte index |
//! | 4      | u32   | bitmap max byte index |
//! | 8      | N     | bitmap bytes, N = max - min + 1 (absent when min > max) |
//! | 8+N    | u32   | Huffman block byte length L |
//! | 12+N   | L     | framed Huffman block |
//!
//! Each block is coded independently; nothing is shared between blocks, so a
//! corrupt block surfaces as an error without affecting its siblings.

use exr_core::byteio::{ByteReader, ByteWriter, Endian};

use crate::bitmap::{self, Bitmap, BITMAP_SIZE};
use crate::error::{PizError, Result};
use crate::huffman;
use crate::types::BlockInfo;
use crate::wavelet;

/// Compress one block of raw samples.
///
/// `raw` is the block's planar sample buffer; its length must equal
/// `block.total_samples()` (anything else is a caller bug and panics).
pub fn compress(raw: &[u16], block: &BlockInfo) -> Result<Vec<u8>> {
    assert_eq!(
        raw.len(),
        block.total_samples(),
        "sample buffer does not match block description"
    );

    let mut samples = raw.to_vec();
    let bitmap = Bitmap::from_samples(&samples);
    let (lut, max_value) = bitmap::forward_lut(&bitmap);
    bitmap::apply_lut(&mut samples, &lut);

    wavelet_channels(&mut samples, block, max_value, wavelet::encode);

    let payload = huffman::compress(&samples)?;

    let min_nonzero = bitmap.min_byte_index();
    let max_nonzero = bitmap.max_byte_index();
    let nbitmap = if min_nonzero <= max_nonzero {
        max_nonzero - min_nonzero + 1
    } else {
        0
    };

    let mut out = vec![0u8; 8 + nbitmap + 4 + payload.len()];
    let mut w = ByteWriter::new(Endian::Little, &mut out);
    w.u32(min_nonzero as u32);
    w.u32(max_nonzero as u32);
    if nbitmap > 0 {
        w.bytes(&bitmap.as_bytes()[min_nonzero..=max_nonzero]);
    }
    w.u32(payload.len() as u32);
    w.bytes(&payload);
    Ok(out)
}

/// Decompress one block back into its planar sample buffer.
pub fn decompress(data: &[u8], block: &BlockInfo) -> Result<Vec<u16>> {
    let expected = block.total_samples();
    if data.len() < 12 {
        return Err(PizError::TruncatedBlock {
            needed: 12,
            available: data.len(),
        });
    }

    let mut r = ByteReader::new(Endian::Little, data);
    let min_nonzero = r.u32() as usize;
    let max_nonzero = r.u32() as usize;

    let mut bitmap = Bitmap::full_range();
    if min_nonzero <= max_nonzero {
        if max_nonzero >= BITMAP_SIZE {
            return Err(PizError::InvalidBitmapRange {
                min: min_nonzero,
                max: max_nonzero,
            });
        }
        let nbitmap = max_nonzero - min_nonzero + 1;
        if r.remain() < nbitmap + 4 {
            return Err(PizError::TruncatedBlock {
                needed: 12 + nbitmap,
                available: data.len(),
            });
        }
        bitmap.as_bytes_mut()[min_nonzero..=max_nonzero].copy_from_slice(r.bytes(nbitmap));
    }

    let payload_len = r.u32() as usize;
    if payload_len > r.remain() {
        return Err(PizError::TruncatedBlock {
            needed: data.len() - r.remain() + payload_len,
            available: data.len(),
        });
    }
    let payload = r.bytes(payload_len);

    let (lut, max_value) = bitmap::reverse_lut(&bitmap);
    let mut samples = huffman::decompress(payload, expected)?;

    wavelet_channels(&mut samples, block, max_value, wavelet::decode);

    bitmap::apply_lut(&mut samples, &lut);
    Ok(samples)
}

/// Run the wavelet transform over every channel plane of a block.
///
/// A channel whose pixels span `s` 16-bit units is `s` interleaved planes,
/// each transformed independently with an x-stride of `s`.
fn wavelet_channels(
    samples: &mut [u16],
    block: &BlockInfo,
    max_value: u16,
    transform: fn(&mut [u16], usize, usize, usize, usize, u16),
) {
    let mut start = 0;
    for ch in &block.channels {
        let size = ch.pixel_type.size_in_u16s();
        let plane = block.width * block.height * size;
        let slice = &mut samples[start..start + plane];
        for j in 0..size {
            transform(
                &mut slice[j..],
                block.width,
                size,
                block.height,
                block.width * size,
                max_value,
            );
        }
        start += plane;
    }
}
