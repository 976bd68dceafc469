//! Error types for PIZ block coding.

use thiserror::Error;

/// Result type for PIZ operations.
pub type Result<T> = std::result::Result<T, PizError>;

/// Errors raised while coding a PIZ block.
///
/// All of these indicate malformed input data for the block at hand; sibling
/// blocks of the same file are unaffected. Precondition violations by callers
/// (for example handing a sample buffer whose length does not match the block
/// description) panic instead.
#[derive(Error, Debug)]
pub enum PizError {
    /// Compressed block shorter than its fixed-layout fields require.
    #[error("compressed block too short: need {needed} bytes, have {available}")]
    TruncatedBlock { needed: usize, available: usize },

    /// Bitmap byte range does not fit the 8 KiB bitmap.
    #[error("bitmap byte range {min}..={max} out of bounds")]
    InvalidBitmapRange { min: usize, max: usize },

    /// Huffman symbol range in the block header is inconsistent.
    #[error("huffman symbol range {min}..={max} is invalid")]
    InvalidSymbolRange { min: usize, max: usize },

    /// A code length grew past the 58 bits a pack can hold.
    #[error("huffman code length for symbol {symbol} exceeds 58 bits")]
    CodeTooLong { symbol: usize },

    /// Packed code-length table ended before covering its symbol range.
    #[error("packed huffman table is truncated")]
    TruncatedTable,

    /// A zero run in the packed table runs past the declared symbol range.
    #[error("zero run in packed huffman table overflows the symbol range")]
    TableRunOverflow,

    /// A pack carries bits above its declared code length.
    #[error("huffman code for symbol {symbol} is wider than its length")]
    InvalidTableEntry { symbol: usize },

    /// Two codes claimed the same decoding-table slot.
    #[error("huffman decoding table collision at index {index}")]
    TableCollision { index: usize },

    /// The payload contains a bit pattern that is not a known code.
    #[error("invalid huffman code in compressed data")]
    InvalidCode,

    /// Payload decoding produced more samples than the block holds.
    #[error("compressed data produced more than {expected} samples")]
    TooMuchData { expected: usize },

    /// Payload ended early.
    #[error("compressed data ended after {produced} of {expected} samples")]
    NotEnoughData { produced: usize, expected: usize },

    /// A run-length repeat appeared before any symbol was decoded.
    #[error("run-length repeat has no preceding symbol")]
    RunWithoutSymbol,

    /// Declared payload bit count exceeds the bytes that follow the table.
    #[error("huffman payload claims {bits} bits but only {available} bytes follow the table")]
    PayloadOverrun { bits: usize, available: usize },
}
