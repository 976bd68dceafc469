//! Compression methods defined by the EXR container.

/// Compression applied to scanline blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression
    None,
    /// Run-length encoding
    Rle,
    /// Per-scanline ZIP
    Zips,
    /// Multi-scanline ZIP
    #[default]
    Zip,
    /// Wavelet + Huffman, lossless
    Piz,
    /// 24-bit float precision, lossy for FLOAT
    Pxr24,
    /// Lossy 4x4 block
    B44,
    /// B44 with flat-area optimization
    B44a,
}

impl Compression {
    /// Create from the u8 stored in the compression attribute.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Compression::None),
            1 => Some(Compression::Rle),
            2 => Some(Compression::Zips),
            3 => Some(Compression::Zip),
            4 => Some(Compression::Piz),
            5 => Some(Compression::Pxr24),
            6 => Some(Compression::B44),
            7 => Some(Compression::B44a),
            _ => None,
        }
    }

    /// Convert to the u8 stored in the compression attribute.
    pub fn to_u8(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Rle => 1,
            Compression::Zips => 2,
            Compression::Zip => 3,
            Compression::Piz => 4,
            Compression::Pxr24 => 5,
            Compression::B44 => 6,
            Compression::B44a => 7,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Compression::None => "NONE",
            Compression::Rle => "RLE",
            Compression::Zips => "ZIPS",
            Compression::Zip => "ZIP",
            Compression::Piz => "PIZ",
            Compression::Pxr24 => "PXR24",
            Compression::B44 => "B44",
            Compression::B44a => "B44A",
        }
    }

    /// Number of scanlines grouped into one compressed block.
    pub fn scanlines_per_block(self) -> usize {
        match self {
            Compression::None | Compression::Rle | Compression::Zips => 1,
            Compression::Zip | Compression::Pxr24 => 16,
            Compression::Piz | Compression::B44 | Compression::B44a => 32,
        }
    }

    /// Whether decompressing recovers the input exactly.
    pub fn is_lossless(self) -> bool {
        matches!(
            self,
            Compression::None
                | Compression::Rle
                | Compression::Zips
                | Compression::Zip
                | Compression::Piz
        )
    }
}
