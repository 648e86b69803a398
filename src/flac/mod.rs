// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling a FLAC file's metadata blocks
//!
//! ```text
//! ┌──────┬────────────┬──────────┬────────────────┬─────────┬─────────┬───────────────╮
//! │ fLaC │ STREAMINFO │ (others) │ VORBIS_COMMENT │ PICTURE │ PADDING │ audio frames… │
//! └──────┴────────────┴──────────┴────────────────┴─────────┴─────────┴───────────────╯
//! ```
//!
//! STREAMINFO must come first.
//! SEEKTABLE, APPLICATION, CUESHEET and reserved blocks
//! are carried through unchanged, while all PADDING blocks
//! are merged into a single one at the end.

use crate::Error;
use crate::entry::{EntryValue, TagEntry};
use crate::persist::{Decoded, ExistingTag, TagFormat, TagOptions};
use crate::picture::{Picture, PictureType};
use crate::record::MetadataRecord;
use crate::settings::{Padding, SettingInfo, Settings};
use crate::telemetry::Telemetry;
use bitstream_io::{
    BigEndian, BitRead, BitReader, BitWrite, BitWriter, FromBitStream, LittleEndian, ToBitStream,
};
use std::io::{Read, Write};
use std::num::NonZero;

mod adapter;

/// A FLAC metadata block header
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 1    | `last` | final metadata block in file |
/// | 7    | `block_type` | type of block |
/// | 24   | `size` | block size, in bytes |
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use tag_splice::flac::{BlockHeader, BlockType, BlockSize};
///
/// let data: &[u8] = &[0b1_0000000, 0x00, 0x00, 0x22];
/// let mut r = BitReader::endian(data, BigEndian);
/// assert_eq!(
///     r.parse::<BlockHeader>().unwrap(),
///     BlockHeader {
///         last: true,
///         block_type: BlockType::Streaminfo,
///         size: BlockSize::try_from(0x22u64).unwrap(),
///     },
/// );
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    /// Whether we are the final block
    pub last: bool,
    /// Our block type
    pub block_type: BlockType,
    /// Our block size, in bytes
    pub size: BlockSize,
}

impl BlockHeader {
    /// Size of a block header, in bytes
    pub const SIZE: u64 = 4;
}

impl FromBitStream for BlockHeader {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        Ok(Self {
            last: r.read::<1, _>()?,
            block_type: r.parse()?,
            size: r.parse()?,
        })
    }
}

impl ToBitStream for BlockHeader {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write::<1, _>(self.last)?;
        w.build(&self.block_type)?;
        w.build(&self.size)?;
        Ok(())
    }
}

/// A FLAC metadata block type
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlockType {
    /// The STREAMINFO block
    Streaminfo,
    /// The PADDING block
    Padding,
    /// The APPLICATION block
    Application,
    /// The SEEKTABLE block
    SeekTable,
    /// The VORBIS_COMMENT block
    VorbisComment,
    /// The CUESHEET block
    Cuesheet,
    /// The PICTURE block
    Picture,
    /// A block type reserved for future use
    Reserved(u8),
}

impl FromBitStream for BlockType {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        match r.read::<7, u8>()? {
            0 => Ok(Self::Streaminfo),
            1 => Ok(Self::Padding),
            2 => Ok(Self::Application),
            3 => Ok(Self::SeekTable),
            4 => Ok(Self::VorbisComment),
            5 => Ok(Self::Cuesheet),
            6 => Ok(Self::Picture),
            reserved @ 7..=126 => Ok(Self::Reserved(reserved)),
            _ => Err(Error::TagCorrupt("invalid metadata block type")),
        }
    }
}

impl ToBitStream for BlockType {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write::<7, u8>(match self {
            Self::Streaminfo => 0,
            Self::Padding => 1,
            Self::Application => 2,
            Self::SeekTable => 3,
            Self::VorbisComment => 4,
            Self::Cuesheet => 5,
            Self::Picture => 6,
            Self::Reserved(reserved @ 7..=126) => *reserved,
            Self::Reserved(_) => return Err(Error::TagCorrupt("invalid metadata block type")),
        })
        .map_err(Error::Io)
    }
}

/// A 24-bit block size value, with safeguards against overflow
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct BlockSize(u32);

impl BlockSize {
    /// The largest possible block size, in bytes
    pub const MAX: u32 = (1 << 24) - 1;

    /// Our current value as a u32
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl FromBitStream for BlockSize {
    type Error = std::io::Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        r.read::<24, _>().map(Self)
    }
}

impl ToBitStream for BlockSize {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write::<24, _>(self.0)
    }
}

impl TryFrom<usize> for BlockSize {
    type Error = Error;

    fn try_from(u: usize) -> Result<Self, Self::Error> {
        u32::try_from(u)
            .ok()
            .filter(|s| *s <= Self::MAX)
            .map(Self)
            .ok_or(Error::ExcessiveTagSize)
    }
}

impl TryFrom<u64> for BlockSize {
    type Error = Error;

    fn try_from(u: u64) -> Result<Self, Self::Error> {
        u32::try_from(u)
            .ok()
            .filter(|s| *s <= Self::MAX)
            .map(Self)
            .ok_or(Error::ExcessiveTagSize)
    }
}

/// A metadata block carried through without interpretation
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawBlock {
    /// The block's type
    pub block_type: BlockType,
    /// The block's contents, excluding its header
    pub data: Vec<u8>,
}

/// A VORBIS_COMMENT metadata block
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 32   | vendor string len | length of vendor string, in bytes, little-endian
/// | `vendor string len`×8 | `vendor_string` | vendor string, in UTF-8
/// | 32   | field count | number of vendor string fields, little-endian
/// | 32   | field₀ len | length of field₀, in bytes, little-endian
/// | `field₀ len`×8 | `fields₀` | first field value, in UTF-8
/// | | | ⋮
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use tag_splice::flac::VorbisComment;
///
/// let data: &[u8] = &[
///     0x04, 0x00, 0x00, 0x00, b't', b'e', b's', b't',
///     0x01, 0x00, 0x00, 0x00,
///     0x07, 0x00, 0x00, 0x00, b'A', b'R', b'T', b'I', b'S', b'T', b'=',
/// ];
/// let mut r = BitReader::endian(data, BigEndian);
/// let comment = r.parse::<VorbisComment>().unwrap();
/// assert_eq!(comment.vendor_string, "test");
/// assert_eq!(comment.field("artist"), Some(""));
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VorbisComment {
    /// The vendor string
    pub vendor_string: String,
    /// The individual metadata comment strings
    pub fields: Vec<String>,
}

impl Default for VorbisComment {
    fn default() -> Self {
        Self {
            vendor_string: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
                .to_owned(),
            fields: vec![],
        }
    }
}

impl VorbisComment {
    /// Given a field name, returns first matching value, if any
    ///
    /// Fields are matched case-insensitively
    pub fn field(&self, field: &str) -> Option<&str> {
        self.field_values(field).next()
    }

    /// Given a field name, iterates over any matching values
    ///
    /// Fields are matched case-insensitively
    pub fn field_values(&self, field: &str) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|f| {
            f.split_once('=')
                .and_then(|(key, value)| key.eq_ignore_ascii_case(field).then_some(value))
        })
    }
}

impl FromBitStream for VorbisComment {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        fn read_string<R: BitRead + ?Sized>(r: &mut R) -> Result<String, Error> {
            let size = r.read_as_to::<LittleEndian, u32>()?;
            Ok(String::from_utf8(r.read_to_vec(size as usize)?)?)
        }

        Ok(Self {
            vendor_string: read_string(r)?,
            fields: (0..(r.read_as_to::<LittleEndian, u32>()?))
                .map(|_| read_string(r))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

impl ToBitStream for VorbisComment {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        fn write_string<W: BitWrite + ?Sized>(w: &mut W, s: &str) -> Result<(), Error> {
            w.write_as_from::<LittleEndian, u32>(
                s.len().try_into().map_err(|_| Error::ExcessiveTagSize)?,
            )?;
            w.write_bytes(s.as_bytes())?;
            Ok(())
        }

        write_string(w, &self.vendor_string)?;
        w.write_as_from::<LittleEndian, u32>(
            self.fields
                .len()
                .try_into()
                .map_err(|_| Error::ExcessiveTagSize)?,
        )?;
        self.fields.iter().try_for_each(|s| write_string(w, s))
    }
}

/// A PICTURE metadata block
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 32   | `picture_type` | picture type |
/// | 32   | media type len | media type length, in bytes |
/// | `media type len`×8 | `media_type` | picture's MIME type |
/// | 32   | description len | description length, in bytes |
/// | `description len`×8 | `description` | description of picture, in UTF-8 |
/// | 32   | `width` | width of picture, in pixels |
/// | 32   | `height`| height of picture, in pixels |
/// | 32   | `color_depth` | color depth of picture in bits-per-pixel |
/// | 32   | `colors_used` | for indexed-color pictures, number of colors used |
/// | 32   | data len | length of picture data, in bytes |
/// | `data len`×8 | `data` | raw picture data |
impl FromBitStream for Picture {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Error> {
        fn prefixed_field<R: BitRead + ?Sized>(r: &mut R) -> std::io::Result<Vec<u8>> {
            let size = r.read_to::<u32>()?;
            r.read_to_vec(size as usize)
        }

        Ok(Self {
            picture_type: PictureType::from_code(r.read_to()?)
                .ok_or(Error::TagCorrupt("invalid picture type"))?,
            media_type: String::from_utf8(prefixed_field(r)?)?,
            description: String::from_utf8(prefixed_field(r)?)?,
            width: r.read_to()?,
            height: r.read_to()?,
            color_depth: r.read_to()?,
            colors_used: NonZero::new(r.read_to()?),
            data: prefixed_field(r)?,
        })
    }
}

impl ToBitStream for Picture {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Error> {
        fn prefixed_field<W: BitWrite + ?Sized>(w: &mut W, field: &[u8]) -> Result<(), Error> {
            w.write_from::<u32>(field.len().try_into().map_err(|_| Error::ExcessiveTagSize)?)?;
            w.write_bytes(field).map_err(Error::Io)
        }

        w.write_from::<u32>(self.picture_type.code().into())?;
        prefixed_field(w, self.media_type.as_bytes())?;
        prefixed_field(w, self.description.as_bytes())?;
        w.write_from(self.width)?;
        w.write_from(self.height)?;
        w.write_from(self.color_depth)?;
        w.write_from(self.colors_used.map_or(0, NonZero::get))?;
        prefixed_field(w, &self.data)
    }
}

/// Parses a whole block's contents, which must be consumed entirely
fn parse_block<T: FromBitStream<Error = Error>>(
    data: &[u8],
    invalid: &'static str,
) -> Result<T, Error> {
    let mut remaining = data;
    let parsed = BitReader::endian(&mut remaining, BigEndian)
        .parse()
        .map_err(|err| match err {
            Error::Io(_) => Error::TagCorrupt(invalid),
            err => err,
        })?;
    match remaining.is_empty() {
        true => Ok(parsed),
        false => Err(Error::TagCorrupt(invalid)),
    }
}

/// Serializes a block's contents to bytes
fn serialize_block<T: ToBitStream<Error = Error>>(block: &T) -> Result<Vec<u8>, Error> {
    let mut w = BitWriter::endian(vec![], BigEndian);
    w.build(block)?;
    Ok(w.into_writer())
}

/// The metadata blocks of a FLAC file
///
/// Comment fields and pictures are held as entries
/// whose keys are the comment field names,
/// and `PICTURE` for pictures.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FlacTag {
    /// The STREAMINFO block's contents
    pub streaminfo: Vec<u8>,
    /// Blocks preserved as-is, in their original order
    pub blocks: Vec<RawBlock>,
    /// The VORBIS_COMMENT block's vendor string
    pub vendor_string: String,
    /// Comment fields and pictures
    pub entries: Vec<TagEntry>,
}

impl FlacTag {
    /// Key of picture entries
    pub const PICTURE: &'static str = "PICTURE";

    /// Returns the first comment value with the given key
    ///
    /// Keys are matched case-insensitively.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|e| e.is(key))
            .find_map(|e| e.as_text())
    }

    /// Reads metadata blocks from the start of the reader
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingFlacTag`] if the reader doesn't start
    /// with the FLAC stream marker, [`Error::MissingStreaminfo`] or
    /// [`Error::MultipleStreaminfo`] if STREAMINFO is misplaced,
    /// or [`Error::TagCorrupt`] if any block's size is inconsistent
    /// with its contents.
    pub fn read<R: Read>(mut r: R) -> Result<Decoded<Self>, Error> {
        let mut marker = [0; 4];
        if !crate::stream::read_fully(&mut r, &mut marker)? || &marker != b"fLaC" {
            return Err(Error::MissingFlacTag);
        }

        let mut existing = ExistingTag {
            length: marker.len() as u64,
            padding: 0,
        };
        let mut streaminfo = None;
        let mut blocks = vec![];
        let mut comment: Option<VorbisComment> = None;
        let mut pictures = vec![];

        loop {
            let mut raw = [0; BlockHeader::SIZE as usize];
            if !crate::stream::read_fully(&mut r, &mut raw)? {
                return Err(Error::TagCorrupt("truncated metadata block header"));
            }
            let header: BlockHeader = BitReader::endian(raw.as_slice(), BigEndian).parse()?;

            let mut data = vec![0; header.size.get() as usize];
            if !crate::stream::read_fully(&mut r, &mut data)? {
                return Err(Error::TagCorrupt("metadata block size exceeds stream"));
            }
            existing.length += BlockHeader::SIZE + u64::from(header.size.get());

            match header.block_type {
                BlockType::Streaminfo if streaminfo.is_some() => {
                    return Err(Error::MultipleStreaminfo);
                }
                BlockType::Streaminfo => streaminfo = Some(data),
                _ if streaminfo.is_none() => return Err(Error::MissingStreaminfo),
                BlockType::Padding => {
                    existing.padding += BlockHeader::SIZE + u64::from(header.size.get());
                }
                BlockType::VorbisComment => {
                    let block: VorbisComment =
                        parse_block(&data, "invalid VORBIS_COMMENT block")?;
                    match comment.as_mut() {
                        Some(comment) => comment.fields.extend(block.fields),
                        None => comment = Some(block),
                    }
                }
                BlockType::Picture => {
                    pictures.push(parse_block::<Picture>(&data, "invalid PICTURE block")?);
                }
                block_type => blocks.push(RawBlock { block_type, data }),
            }

            if header.last {
                break;
            }
        }

        let comment = comment.unwrap_or_default();

        Ok(Decoded {
            tag: Self {
                streaminfo: streaminfo.ok_or(Error::MissingStreaminfo)?,
                blocks,
                entries: comment
                    .fields
                    .iter()
                    .filter_map(|field| field.split_once('='))
                    .map(|(key, value)| TagEntry::text(key, value))
                    .chain(
                        pictures
                            .into_iter()
                            .map(|picture| TagEntry::picture(Self::PICTURE, picture)),
                    )
                    .collect(),
                vendor_string: comment.vendor_string,
            },
            existing,
        })
    }

    /// Writes the metadata blocks followed by
    /// an optional PADDING block of the given size
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExcessiveTagSize`] if any block is too large,
    /// or [`Error::InvalidEntryKey`] if a comment key is not
    /// a valid field name.
    pub fn write<W: Write>(&self, padding: Option<BlockSize>, mut w: W) -> Result<(), Error> {
        let comment = VorbisComment {
            vendor_string: self.vendor_string.clone(),
            fields: self
                .entries
                .iter()
                .filter_map(|entry| match &entry.value {
                    EntryValue::Text(value) => Some(
                        valid_field_name(&entry.key)
                            .then(|| format!("{}={value}", entry.key))
                            .ok_or_else(|| Error::InvalidEntryKey(entry.key.clone())),
                    ),
                    _ => None,
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        let mut blocks = vec![(BlockType::Streaminfo, self.streaminfo.clone())];
        blocks.extend(self.blocks.iter().map(|b| (b.block_type, b.data.clone())));
        if !comment.fields.is_empty() {
            blocks.push((BlockType::VorbisComment, serialize_block(&comment)?));
        }
        for entry in &self.entries {
            if let EntryValue::Picture(picture) = &entry.value {
                blocks.push((BlockType::Picture, serialize_block(picture)?));
            }
        }

        w.write_all(b"fLaC")?;

        let count = blocks.len();
        for (i, (block_type, data)) in blocks.into_iter().enumerate() {
            BitWriter::endian(&mut w, BigEndian).build(&BlockHeader {
                last: i + 1 == count && padding.is_none(),
                block_type,
                size: BlockSize::try_from(data.len())?,
            })?;
            w.write_all(&data)?;
        }

        if let Some(size) = padding {
            BitWriter::endian(&mut w, BigEndian).build(&BlockHeader {
                last: true,
                block_type: BlockType::Padding,
                size,
            })?;
            std::io::copy(
                &mut std::io::repeat(0).take(size.get().into()),
                &mut w,
            )?;
        }

        Ok(())
    }
}

/// Whether a comment field name contains only
/// printable ASCII other than `=`
fn valid_field_name(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| (0x20..=0x7D).contains(&b) && b != b'=')
}

/// Options for writing FLAC metadata
///
/// # Example
///
/// ```
/// use tag_splice::flac::FlacOptions;
/// use tag_splice::settings::{Padding, Settings};
///
/// let options = FlacOptions::try_from(&Settings::default().with("Padding", 8192)).unwrap();
/// assert_eq!(options, FlacOptions::default().padding(8192));
/// assert_eq!(options.padding, Padding::Exact(8192));
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FlacOptions {
    /// Padding policy, counting only the PADDING block's contents
    pub padding: Padding,
}

impl FlacOptions {
    /// Requests a PADDING block with exactly
    /// the given number of bytes of contents
    pub fn padding(self, padding: u32) -> Self {
        Self {
            padding: Padding::Exact(padding),
        }
    }

    /// Requests no PADDING block at all
    pub fn no_padding(self) -> Self {
        self.padding(0)
    }
}

impl TryFrom<&Settings> for FlacOptions {
    type Error = Error;

    fn try_from(settings: &Settings) -> Result<Self, Error> {
        settings.validate(Flac::SETTINGS)?;

        Ok(Self {
            padding: match settings.int("Padding") {
                Some(padding) => Padding::Exact(padding.try_into().map_err(|_| {
                    Error::InvalidSetting {
                        key: "Padding".to_owned(),
                        reason: "value out of range",
                    }
                })?),
                None => Padding::Reuse,
            },
        })
    }
}

impl TagOptions for FlacOptions {
    /// Padding counting the PADDING block's header
    fn padding(&self) -> Padding {
        match self.padding {
            Padding::Exact(0) | Padding::Reuse => self.padding,
            Padding::Exact(contents) => {
                Padding::Exact(contents.saturating_add(BlockHeader::SIZE as u32))
            }
        }
    }
}

/// The FLAC tag dialect
#[derive(Copy, Clone, Debug, Default)]
pub struct Flac;

impl TagFormat for Flac {
    type Tag = FlacTag;
    type Options = FlacOptions;

    const NAME: &'static str = "FLAC";
    const EXTENSIONS: &'static [&'static str] = &["flac"];
    const SETTINGS: &'static [(&'static str, SettingInfo)] = &[(
        "Padding",
        SettingInfo::Int {
            min: 0,
            max: BlockSize::MAX as i64,
        },
    )];
    const DEFAULT_PADDING: u64 = BlockHeader::SIZE + 4096;

    fn decode_existing<R: Read>(&self, r: R) -> Result<Option<Decoded<FlacTag>>, Error> {
        FlacTag::read(r).map(Some)
    }

    fn build_entries(
        &self,
        record: &MetadataRecord,
        _options: &FlacOptions,
        existing: Option<&FlacTag>,
        _telemetry: &dyn Telemetry,
    ) -> Result<Option<FlacTag>, Error> {
        let existing = existing.ok_or(Error::MissingFlacTag)?;
        Ok(Some(FlacTag {
            streaminfo: existing.streaminfo.clone(),
            blocks: existing.blocks.clone(),
            vendor_string: existing.vendor_string.clone(),
            entries: adapter::build(record),
        }))
    }

    fn to_record(&self, tag: &FlacTag, telemetry: &dyn Telemetry) -> MetadataRecord {
        adapter::to_record(tag, telemetry)
    }

    fn entry_count(&self, tag: &FlacTag) -> usize {
        tag.entries.len()
    }

    /// `padding` counts the PADDING block's header as well as its contents
    fn encode_block<W: Write>(&self, tag: &FlacTag, padding: u64, w: W) -> Result<(), Error> {
        tag.write(
            match padding {
                0 => None,
                padding => Some(BlockSize::try_from(
                    padding
                        .checked_sub(BlockHeader::SIZE)
                        .ok_or(Error::ExcessiveTagSize)?,
                )?),
            },
            w,
        )
    }

    fn padding_fits(&self, free: u64) -> bool {
        free == 0 || (BlockHeader::SIZE..=BlockHeader::SIZE + u64::from(BlockSize::MAX)).contains(&free)
    }
}
