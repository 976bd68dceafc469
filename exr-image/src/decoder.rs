//! Scanline image decoding: chunk offset table and block routing.
//!
//! After the header comes one 8-byte offset per scanline block, each an
//! absolute byte position of that block's chunk. A chunk is
//! `(y: i32, byte_count: u32, bytes)`; the bytes go to the block codec
//! selected by the header's compression attribute.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use exr_core::channel::PixelType;
use exr_core::compression::Compression;
use exr_piz::BlockInfo;

use crate::error::{ExrError, Result};
use crate::half::Half;
use crate::header::Header;

/// One decoded scanline block.
#[derive(Debug, Clone)]
pub struct ScanlineBlock {
    /// Absolute y coordinate of the block's first scanline.
    pub y_start: i32,
    /// Scanlines in this block; the file's last block may hold fewer than
    /// the compression's nominal count.
    pub height: usize,
    /// Planar sample buffer, laid out per [`BlockInfo`].
    pub samples: Vec<u16>,
}

/// A decoded scanline image: the header plus every block's samples.
#[derive(Debug, Clone)]
pub struct ScanlineImage {
    pub header: Header,
    pub blocks: Vec<ScanlineBlock>,
}

impl ScanlineImage {
    /// Collect one HALF channel across all blocks as f32, top to bottom.
    ///
    /// Returns `None` if the channel is absent or not HALF.
    pub fn channel_f32(&self, name: &str) -> Option<Vec<f32>> {
        let channel = self.header.channels().get(name)?;
        if channel.pixel_type != PixelType::Half {
            return None;
        }
        let width = self.header.width() as usize;
        let mut out = Vec::with_capacity(width * self.header.height() as usize);
        for block in &self.blocks {
            // Planar layout: skip the channels sorted before this one.
            let mut start = 0;
            for ch in self.header.channels().iter() {
                if ch.name == name {
                    break;
                }
                start += width * block.height * ch.pixel_type.size_in_u16s();
            }
            let plane = &block.samples[start..start + width * block.height];
            out.extend(plane.iter().map(|&bits| Half::from_bits(bits).to_f32()));
        }
        Some(out)
    }
}

/// Scanline EXR decoder.
///
/// Tiled, deep, and multi-part layouts are recognised in the version field
/// but not decoded. Of the block compressions, PIZ is implemented.
#[derive(Debug, Default)]
pub struct ExrDecoder {}

impl ExrDecoder {
    pub fn new() -> Self {
        ExrDecoder {}
    }

    /// Check whether `data` starts like an EXR file.
    pub fn is_exr(data: &[u8]) -> bool {
        data.len() >= 4 && u32::from_le_bytes([data[0], data[1], data[2], data[3]]) == crate::MAGIC
    }

    /// Parse the header only.
    pub fn probe(data: &[u8]) -> Result<Header> {
        Ok(Header::parse(data)?.0)
    }

    /// Decode a scanline EXR byte stream.
    pub fn decode(&self, data: &[u8]) -> Result<ScanlineImage> {
        let (header, header_size) = Header::parse(data)?;

        let version = header.version();
        if version.deep {
            return Err(ExrError::Unsupported("deep data".into()));
        }
        if version.multi_part {
            return Err(ExrError::Unsupported("multi-part files".into()));
        }
        if version.tiled {
            return Err(ExrError::Unsupported("tiled images".into()));
        }

        let offsets = read_offset_table(&data[header_size..], &header)?;

        let mut blocks = Vec::with_capacity(offsets.len());
        for (index, &offset) in offsets.iter().enumerate() {
            if offset == 0 {
                log::warn!("scanline block {index} has a zero offset, skipping");
                continue;
            }
            blocks.push(decode_chunk(data, offset as usize, &header)?);
        }

        Ok(ScanlineImage { header, blocks })
    }
}

/// Read the chunk offset table that follows the header.
fn read_offset_table(data: &[u8], header: &Header) -> Result<Vec<u64>> {
    let count = header.block_count();
    if data.len() < count * 8 {
        return Err(ExrError::InsufficientData {
            needed: count * 8,
            available: data.len(),
        });
    }
    let mut cursor = Cursor::new(data);
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(cursor.read_u64::<LittleEndian>()?);
    }
    Ok(offsets)
}

/// Decode the chunk at an absolute file offset.
fn decode_chunk(data: &[u8], offset: usize, header: &Header) -> Result<ScanlineBlock> {
    if offset + 8 > data.len() {
        return Err(ExrError::InsufficientData {
            needed: offset + 8,
            available: data.len(),
        });
    }
    let mut cursor = Cursor::new(&data[offset..]);
    let y_start = cursor.read_i32::<LittleEndian>()?;
    let byte_count = cursor.read_u32::<LittleEndian>()? as usize;
    if offset + 8 + byte_count > data.len() {
        return Err(ExrError::InsufficientData {
            needed: offset + 8 + byte_count,
            available: data.len(),
        });
    }
    let block_bytes = &data[offset + 8..offset + 8 + byte_count];

    let window = header.data_window();
    if y_start < window.min.y || y_start > window.max.y {
        return Err(ExrError::InvalidFormat(format!(
            "block y {y_start} outside data window {window}"
        )));
    }
    let nominal = header.compression().scanlines_per_block();
    let height = nominal.min((window.max.y - y_start + 1) as usize);

    let block = BlockInfo::new(
        header.compression(),
        header.channels().as_slice().to_vec(),
        header.width() as usize,
        height,
    );

    let samples = match header.compression() {
        Compression::Piz => exr_piz::decompress(block_bytes, &block)?,
        other => {
            return Err(ExrError::Unsupported(format!(
                "{} block decoding",
                other.name()
            )));
        }
    };

    Ok(ScanlineBlock {
        y_start,
        height,
        samples,
    })
}

/// Decode an EXR file from disk.
pub fn open(path: impl AsRef<std::path::Path>) -> Result<ScanlineImage> {
    let data = std::fs::read(path)?;
    ExrDecoder::new().decode(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::tests::minimal_header_bytes;
    use byteorder::WriteBytesExt;
    use exr_core::channel::Channel;

    /// Build a complete single-part scanline PIZ file around raw samples.
    fn synthesize_piz_file(
        width: usize,
        height: usize,
        channels: &[(&str, u32)],
        raw_blocks: &[Vec<u16>],
    ) -> Vec<u8> {
        let mut out = minimal_header_bytes(width as i32, height as i32, channels, 4);

        let lines_per_block = Compression::Piz.scanlines_per_block();
        let channel_vec: Vec<Channel> = {
            // Sorted like the header stores them.
            let mut list = exr_core::channel::ChannelList::new();
            for (name, pt) in channels {
                list.add(Channel::new(
                    name,
                    exr_core::channel::PixelType::from_u32(*pt).unwrap(),
                ));
            }
            list.into_iter().collect()
        };

        // Compress each block first so the offset table can be exact.
        let mut chunks = Vec::new();
        for (i, raw) in raw_blocks.iter().enumerate() {
            let block_height = lines_per_block.min(height - i * lines_per_block);
            let info = BlockInfo::new(
                Compression::Piz,
                channel_vec.clone(),
                width,
                block_height,
            );
            let compressed = exr_piz::compress(raw, &info).unwrap();
            let mut chunk = Vec::new();
            chunk
                .write_i32::<LittleEndian>((i * lines_per_block) as i32)
                .unwrap();
            chunk
                .write_u32::<LittleEndian>(compressed.len() as u32)
                .unwrap();
            chunk.extend_from_slice(&compressed);
            chunks.push(chunk);
        }

        let table_start = out.len();
        let mut offset = table_start + chunks.len() * 8;
        for chunk in &chunks {
            out.write_u64::<LittleEndian>(offset as u64).unwrap();
            offset += chunk.len();
        }
        for chunk in &chunks {
            out.extend_from_slice(chunk);
        }
        out
    }

    #[test]
    fn test_decode_single_block_file() {
        let width = 64;
        let height = 20;
        let mut raw = vec![0u16; width * height];
        for y in 0..height {
            for x in 0..width {
                raw[y * width + x] = ((x * y) % 521) as u16;
            }
        }
        let file = synthesize_piz_file(width, height, &[("Y", 1)], &[raw.clone()]);

        assert!(ExrDecoder::is_exr(&file));
        let image = ExrDecoder::new().decode(&file).unwrap();
        assert_eq!(image.blocks.len(), 1);
        assert_eq!(image.blocks[0].y_start, 0);
        assert_eq!(image.blocks[0].height, height);
        assert_eq!(image.blocks[0].samples, raw);
    }

    #[test]
    fn test_decode_multi_block_file_with_short_tail() {
        // 40 lines of PIZ data: one full 32-line block and one 8-line block.
        let width = 16;
        let height = 40;
        let full: Vec<u16> = (0..width as u16 * 32).map(|v| v % 300).collect();
        let tail: Vec<u16> = (0..width as u16 * 8).map(|v| (v * 7) % 300).collect();
        let file = synthesize_piz_file(width, height, &[("Y", 1)], &[full.clone(), tail.clone()]);

        let image = ExrDecoder::new().decode(&file).unwrap();
        assert_eq!(image.blocks.len(), 2);
        assert_eq!(image.blocks[0].height, 32);
        assert_eq!(image.blocks[1].y_start, 32);
        assert_eq!(image.blocks[1].height, 8);
        assert_eq!(image.blocks[0].samples, full);
        assert_eq!(image.blocks[1].samples, tail);
    }

    #[test]
    fn test_channel_f32_extraction() {
        let width = 8;
        let height = 4;
        // Channels sort to [G, R]; G holds 1.0, R holds 0.5.
        let one = Half::from_f32(1.0).to_bits();
        let half = Half::from_f32(0.5).to_bits();
        let mut raw = vec![one; width * height];
        raw.extend(vec![half; width * height]);
        let file = synthesize_piz_file(width, height, &[("G", 1), ("R", 1)], &[raw]);

        let image = ExrDecoder::new().decode(&file).unwrap();
        let g = image.channel_f32("G").unwrap();
        let r = image.channel_f32("R").unwrap();
        assert_eq!(g.len(), width * height);
        assert!(g.iter().all(|&v| v == 1.0));
        assert!(r.iter().all(|&v| v == 0.5));
        assert!(image.channel_f32("B").is_none());
    }

    #[test]
    fn test_unsupported_compression_rejected() {
        let width = 4;
        let height = 1;
        let mut file = minimal_header_bytes(width, height, &[("Y", 1)], 6); // B44
        let table_start = file.len();
        file.extend_from_slice(&((table_start + 8) as u64).to_le_bytes());
        file.extend_from_slice(&0i32.to_le_bytes());
        file.extend_from_slice(&0u32.to_le_bytes());
        let err = ExrDecoder::new().decode(&file).unwrap_err();
        assert!(matches!(err, ExrError::Unsupported(_)));
    }

    #[test]
    fn test_corrupt_block_surfaces_as_piz_error() {
        let width = 8usize;
        let height = 8usize;
        let raw: Vec<u16> = (0..(width * height) as u16).collect();
        let mut file = synthesize_piz_file(width, height, &[("Y", 1)], &[raw]);
        // Stomp on the block's bitmap max byte index, which sits 4 bytes
        // into the PIZ data: header, one offset table entry, chunk header.
        let header_len = minimal_header_bytes(width as i32, height as i32, &[("Y", 1)], 4).len();
        let piz_start = header_len + 8 + 8;
        file[piz_start + 4..piz_start + 8].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = ExrDecoder::new().decode(&file).unwrap_err();
        assert!(matches!(err, ExrError::Piz(_)));
    }

    #[test]
    fn test_truncated_offset_table_rejected() {
        let file = minimal_header_bytes(8, 8, &[("Y", 1)], 4);
        // No offset table at all.
        let err = ExrDecoder::new().decode(&file).unwrap_err();
        assert!(matches!(err, ExrError::InsufficientData { .. }));
    }
}
