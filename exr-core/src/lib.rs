//! # EXR Core
//!
//! Core types and utilities shared by the EXR codec crates.
//!
//! This crate provides the fundamental building blocks used across all EXR components:
//! - Bit-granular stream reading/writing
//! - Fixed-endian byte cursors
//! - Channel and compression vocabulary

pub mod bitstream;
pub mod byteio;
pub mod channel;
pub mod compression;

pub use bitstream::{BitReader, BitWriter};
pub use byteio::{ByteReader, ByteWriter, Endian};
pub use channel::{Channel, ChannelList, PixelType};
pub use compression::Compression;
