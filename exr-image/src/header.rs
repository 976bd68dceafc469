//! EXR header parsing: magic number, version field, attribute dictionary.
//!
//! A header is a sequence of attributes, each `name\0 type\0 size value`,
//! terminated by an empty name. Attribute values are decoded by their
//! declared type; unknown types are kept as raw bytes so that files carrying
//! custom attributes still parse.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use exr_core::channel::{Channel, ChannelList, PixelType};
use exr_core::compression::Compression;

use crate::error::{ExrError, Result};
use crate::types::{
    Box2f, Box2i, Chromaticities, KeyCode, LineOrder, M33f, M44f, Preview, Rational,
    TileDescription, TimeCode, V2f, V2i, V3f, V3i,
};

/// Longest attribute or channel name a conforming file may carry when the
/// long-name flag is set; 31 otherwise.
const MAX_NAME_LEN: usize = 255;

/// The version field's flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionField {
    /// Format version number, from the low byte.
    pub version: u8,
    /// Single-part tiled image.
    pub tiled: bool,
    /// Names may be up to 255 bytes instead of 31.
    pub long_name: bool,
    /// Deep data.
    pub deep: bool,
    /// Multiple parts.
    pub multi_part: bool,
}

impl VersionField {
    /// Decode the 4-byte version field.
    ///
    /// The tiled bit describes the single-part layout, so a file that also
    /// claims deep or multi-part layout is malformed.
    pub fn parse(raw: u32) -> Result<Self> {
        let vf = VersionField {
            version: (raw & 0xFF) as u8,
            tiled: raw & 0x200 != 0,
            long_name: raw & 0x400 != 0,
            deep: raw & 0x800 != 0,
            multi_part: raw & 0x1000 != 0,
        };
        if vf.tiled && vf.deep {
            return Err(ExrError::InvalidFormat(
                "single tile bit is on, non-image bit should be off".into(),
            ));
        }
        if vf.tiled && vf.multi_part {
            return Err(ExrError::InvalidFormat(
                "single tile bit is on, multi-part bit should be off".into(),
            ));
        }
        Ok(vf)
    }
}

/// A decoded attribute value.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    Box2i(Box2i),
    Box2f(Box2f),
    ChannelList(ChannelList),
    Chromaticities(Chromaticities),
    Compression(Compression),
    Float(f32),
    Int(i32),
    KeyCode(KeyCode),
    LineOrder(LineOrder),
    M33f(M33f),
    M44f(M44f),
    Preview(Preview),
    Rational(Rational),
    String(String),
    TileDescription(TileDescription),
    TimeCode(TimeCode),
    V2i(V2i),
    V2f(V2f),
    V3i(V3i),
    V3f(V3f),
    /// Unknown attribute type, kept verbatim.
    Raw(Vec<u8>),
}

/// A parsed EXR header: the attribute dictionary plus cached accessors for
/// the attributes every decode needs.
#[derive(Debug, Clone)]
pub struct Header {
    version: VersionField,
    attributes: HashMap<String, AttributeValue>,
    channels: ChannelList,
    data_window: Box2i,
    display_window: Box2i,
    compression: Compression,
    line_order: LineOrder,
}

impl Header {
    /// Parse a header from the start of an EXR byte stream.
    ///
    /// Returns the header and the number of bytes consumed; the chunk offset
    /// table follows immediately after.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let mut cursor = Cursor::new(data);

        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != crate::MAGIC {
            return Err(ExrError::InvalidMagic);
        }

        let version = VersionField::parse(cursor.read_u32::<LittleEndian>()?)?;
        log::debug!(
            "exr version {} tiled={} longName={} deep={} multiPart={}",
            version.version,
            version.tiled,
            version.long_name,
            version.deep,
            version.multi_part
        );

        let mut attributes = HashMap::new();
        let mut channels = None;
        let mut data_window = None;
        let mut display_window = None;
        let mut compression = None;
        let mut line_order = LineOrder::IncreasingY;

        loop {
            let name = read_string(&mut cursor)?;
            if name.is_empty() {
                break;
            }
            if name.len() > MAX_NAME_LEN {
                return Err(ExrError::InvalidFormat("attribute name too long".into()));
            }
            let type_name = read_string(&mut cursor)?;
            let size = cursor.read_u32::<LittleEndian>()? as usize;
            let value_start = cursor.position() as usize;
            if value_start + size > data.len() {
                return Err(ExrError::InsufficientData {
                    needed: value_start + size,
                    available: data.len(),
                });
            }

            let value = parse_value(&mut cursor, &type_name, size)?;

            match (&name[..], &value) {
                ("channels", AttributeValue::ChannelList(list)) => {
                    channels = Some(list.clone());
                }
                ("dataWindow", AttributeValue::Box2i(b)) => data_window = Some(*b),
                ("displayWindow", AttributeValue::Box2i(b)) => display_window = Some(*b),
                ("compression", AttributeValue::Compression(c)) => compression = Some(*c),
                ("lineOrder", AttributeValue::LineOrder(lo)) => line_order = *lo,
                _ => {}
            }
            attributes.insert(name, value);

            // Typed decoders must consume exactly the declared size.
            cursor.set_position((value_start + size) as u64);
        }

        let channels = channels.ok_or_else(|| ExrError::MissingAttribute("channels".into()))?;
        let data_window =
            data_window.ok_or_else(|| ExrError::MissingAttribute("dataWindow".into()))?;
        let compression =
            compression.ok_or_else(|| ExrError::MissingAttribute("compression".into()))?;
        if !data_window.is_valid() {
            return Err(ExrError::InvalidFormat(format!(
                "data window {data_window} is inverted"
            )));
        }

        let header = Header {
            version,
            attributes,
            channels,
            data_window,
            display_window: display_window.unwrap_or(data_window),
            compression,
            line_order,
        };
        Ok((header, cursor.position() as usize))
    }

    pub fn version(&self) -> VersionField {
        self.version
    }

    pub fn channels(&self) -> &ChannelList {
        &self.channels
    }

    pub fn data_window(&self) -> &Box2i {
        &self.data_window
    }

    pub fn display_window(&self) -> &Box2i {
        &self.display_window
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn line_order(&self) -> LineOrder {
        self.line_order
    }

    /// Width of the data window.
    pub fn width(&self) -> i32 {
        self.data_window.width()
    }

    /// Height of the data window.
    pub fn height(&self) -> i32 {
        self.data_window.height()
    }

    /// Look up any attribute by name.
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Number of scanline blocks in the file.
    pub fn block_count(&self) -> usize {
        let lines = self.height() as usize;
        lines.div_ceil(self.compression.scanlines_per_block())
    }
}

/// Read a null-terminated string.
fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = cursor.read_u8()?;
        if b == 0 {
            break;
        }
        bytes.push(b);
        if bytes.len() > MAX_NAME_LEN {
            return Err(ExrError::InvalidFormat("unterminated name".into()));
        }
    }
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Decode one attribute value by its declared type.
fn parse_value(
    cursor: &mut Cursor<&[u8]>,
    type_name: &str,
    size: usize,
) -> Result<AttributeValue> {
    let value = match type_name {
        "box2i" => AttributeValue::Box2i(Box2i::new(
            V2i::new(
                cursor.read_i32::<LittleEndian>()?,
                cursor.read_i32::<LittleEndian>()?,
            ),
            V2i::new(
                cursor.read_i32::<LittleEndian>()?,
                cursor.read_i32::<LittleEndian>()?,
            ),
        )),
        "box2f" => AttributeValue::Box2f(Box2f {
            min: V2f::new(
                cursor.read_f32::<LittleEndian>()?,
                cursor.read_f32::<LittleEndian>()?,
            ),
            max: V2f::new(
                cursor.read_f32::<LittleEndian>()?,
                cursor.read_f32::<LittleEndian>()?,
            ),
        }),
        "chlist" => AttributeValue::ChannelList(parse_channel_list(cursor, size)?),
        "chromaticities" => {
            let mut xy = [0f32; 8];
            for v in xy.iter_mut() {
                *v = cursor.read_f32::<LittleEndian>()?;
            }
            AttributeValue::Chromaticities(Chromaticities {
                red: V2f::new(xy[0], xy[1]),
                green: V2f::new(xy[2], xy[3]),
                blue: V2f::new(xy[4], xy[5]),
                white: V2f::new(xy[6], xy[7]),
            })
        }
        "compression" => {
            let raw = cursor.read_u8()?;
            AttributeValue::Compression(
                Compression::from_u8(raw).ok_or(ExrError::UnsupportedCompression(raw))?,
            )
        }
        "float" => AttributeValue::Float(cursor.read_f32::<LittleEndian>()?),
        "int" => AttributeValue::Int(cursor.read_i32::<LittleEndian>()?),
        "keycode" => {
            let mut k = [0i32; 7];
            for v in k.iter_mut() {
                *v = cursor.read_i32::<LittleEndian>()?;
            }
            AttributeValue::KeyCode(KeyCode {
                film_mfc_code: k[0],
                film_type: k[1],
                prefix: k[2],
                count: k[3],
                perf_offset: k[4],
                perfs_per_frame: k[5],
                perfs_per_count: k[6],
            })
        }
        "lineOrder" => {
            let raw = cursor.read_u8()?;
            AttributeValue::LineOrder(LineOrder::from_u8(raw).ok_or_else(|| {
                ExrError::InvalidFormat(format!("invalid line order {raw}"))
            })?)
        }
        "m33f" => {
            let mut m: M33f = [0f32; 9];
            for v in m.iter_mut() {
                *v = cursor.read_f32::<LittleEndian>()?;
            }
            AttributeValue::M33f(m)
        }
        "m44f" => {
            let mut m: M44f = [0f32; 16];
            for v in m.iter_mut() {
                *v = cursor.read_f32::<LittleEndian>()?;
            }
            AttributeValue::M44f(m)
        }
        "preview" => {
            let width = cursor.read_u32::<LittleEndian>()?;
            let height = cursor.read_u32::<LittleEndian>()?;
            let npixels = (width as usize) * (height as usize) * 4;
            if size != 8 + npixels {
                return Err(ExrError::InvalidFormat("preview size mismatch".into()));
            }
            let mut data = vec![0u8; npixels];
            cursor.read_exact(&mut data)?;
            AttributeValue::Preview(Preview {
                width,
                height,
                data,
            })
        }
        "rational" => AttributeValue::Rational(Rational::new(
            cursor.read_i32::<LittleEndian>()?,
            cursor.read_u32::<LittleEndian>()?,
        )),
        "string" => {
            let mut bytes = vec![0u8; size];
            cursor.read_exact(&mut bytes)?;
            AttributeValue::String(String::from_utf8_lossy(&bytes).to_string())
        }
        "tiledesc" => AttributeValue::TileDescription(TileDescription {
            x_size: cursor.read_u32::<LittleEndian>()?,
            y_size: cursor.read_u32::<LittleEndian>()?,
            mode: cursor.read_u8()?,
        }),
        "timecode" => AttributeValue::TimeCode(TimeCode {
            time_and_flags: cursor.read_u32::<LittleEndian>()?,
            user_data: cursor.read_u32::<LittleEndian>()?,
        }),
        "v2i" => AttributeValue::V2i(V2i::new(
            cursor.read_i32::<LittleEndian>()?,
            cursor.read_i32::<LittleEndian>()?,
        )),
        "v2f" => AttributeValue::V2f(V2f::new(
            cursor.read_f32::<LittleEndian>()?,
            cursor.read_f32::<LittleEndian>()?,
        )),
        "v3i" => {
            let mut v: V3i = [0i32; 3];
            for x in v.iter_mut() {
                *x = cursor.read_i32::<LittleEndian>()?;
            }
            AttributeValue::V3i(v)
        }
        "v3f" => {
            let mut v: V3f = [0f32; 3];
            for x in v.iter_mut() {
                *x = cursor.read_f32::<LittleEndian>()?;
            }
            AttributeValue::V3f(v)
        }
        _ => {
            let mut raw = vec![0u8; size];
            cursor.read_exact(&mut raw)?;
            AttributeValue::Raw(raw)
        }
    };
    Ok(value)
}

/// Decode a channel list: channels `name\0 pixelType pLinear reserved[3]
/// xSampling ySampling`, terminated by a null byte.
fn parse_channel_list(cursor: &mut Cursor<&[u8]>, size: usize) -> Result<ChannelList> {
    let end = cursor.position() as usize + size;
    let mut channels = ChannelList::new();

    loop {
        if cursor.position() as usize + 1 > end {
            return Err(ExrError::InvalidFormat(
                "channel list is not null-terminated".into(),
            ));
        }
        let name = read_string(cursor)?;
        if name.is_empty() {
            break;
        }
        if cursor.position() as usize + 16 > end {
            return Err(ExrError::InvalidFormat("truncated channel entry".into()));
        }

        let pixel_type_raw = cursor.read_u32::<LittleEndian>()?;
        let pixel_type = PixelType::from_u32(pixel_type_raw)
            .ok_or(ExrError::InvalidPixelType(pixel_type_raw))?;
        let p_linear = cursor.read_u8()? != 0;
        let mut reserved = [0u8; 3];
        cursor.read_exact(&mut reserved)?;
        let x_sampling = cursor.read_i32::<LittleEndian>()?;
        let y_sampling = cursor.read_i32::<LittleEndian>()?;

        let mut channel = Channel::new(&name, pixel_type);
        channel.p_linear = p_linear;
        channel.x_sampling = x_sampling;
        channel.y_sampling = y_sampling;
        channels.add(channel);
    }

    if channels.is_empty() {
        return Err(ExrError::InvalidFormat("empty channel list".into()));
    }
    Ok(channels)
}
