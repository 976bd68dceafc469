//! Block description handed to the codec by the container parser.

use exr_core::channel::Channel;
use exr_core::compression::Compression;

/// Everything the block codec needs to know about one compressed block.
///
/// The sample buffer that goes with a block is planar: all of channel 0's
/// `width * height` pixels (each `size_in_u16s()` units wide), then channel
/// 1's, and so on, channels in the order they appear here.
#[derive(Debug, Clone)]
pub struct BlockInfo {
    pub compression: Compression,
    pub channels: Vec<Channel>,
    /// Pixels per scanline.
    pub width: usize,
    /// Scanlines in this block.
    pub height: usize,
}

impl BlockInfo {
    pub fn new(
        compression: Compression,
        channels: Vec<Channel>,
        width: usize,
        height: usize,
    ) -> Self {
        BlockInfo {
            compression,
            channels,
            width,
            height,
        }
    }

    /// 16-bit units per pixel, summed over channels.
    pub fn samples_per_pixel(&self) -> usize {
        self.channels
            .iter()
            .map(|c| c.pixel_type.size_in_u16s())
            .sum()
    }

    /// Total 16-bit samples in this block's raw buffer.
    pub fn total_samples(&self) -> usize {
        self.width * self.height * self.samples_per_pixel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exr_core::channel::Channel;

    #[test]
    fn test_sample_counts() {
        let block = BlockInfo::new(
            Compression::Piz,
            vec![Channel::half("G"), Channel::float("Z")],
            16,
            32,
        );
        assert_eq!(block.samples_per_pixel(), 3);
        assert_eq!(block.total_samples(), 16 * 32 * 3);
    }
}
