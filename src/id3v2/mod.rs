// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling ID3v2 tags at the start of MP3 files
//!
//! ```text
//! ┌────────┬─────────┬─────────┬─────┬─────────┬┄┄┄┄┄┄┄┄╮
//! │ header │ frame₀  │ frame₁  │  …  │ padding ┆ footer ┆
//! └────────┴─────────┴─────────┴─────┴─────────┴┄┄┄┄┄┄┄┄╯
//! ```
//!
//! Versions 2.2 through 2.4 are read.
//! Versions 2.3 and 2.4 are written, without unsynchronisation,
//! extended header or footer.

use crate::Error;
use crate::entry::{TagEntry, TextEncoding};
use crate::persist::{Decoded, ExistingTag, TagFormat, TagOptions};
use crate::picture::LossyConverter;
use crate::record::MetadataRecord;
use crate::settings::{Padding, SettingInfo, Settings};
use crate::telemetry::Telemetry;
use arrayvec::ArrayString;
use bitstream_io::{
    BigEndian, BitRead, BitReader, BitWrite, BitWriter, FromBitStream, FromBitStreamUsing,
    ToBitStream, ToBitStreamUsing,
};
use std::io::{Read, Write};

mod adapter;
mod frames;

/// A version of the ID3v2 format
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Version {
    /// ID3v2.2, with 3 character frame identifiers
    V2_2,
    /// ID3v2.3
    V2_3,
    /// ID3v2.4
    V2_4,
}

impl Version {
    /// The version's major number as stored in the tag header
    pub fn major(self) -> u8 {
        match self {
            Self::V2_2 => 2,
            Self::V2_3 => 3,
            Self::V2_4 => 4,
        }
    }

    fn frame_header_len(self) -> usize {
        match self {
            Self::V2_2 => 6,
            Self::V2_3 | Self::V2_4 => 10,
        }
    }

    fn id_len(self) -> usize {
        match self {
            Self::V2_2 => 3,
            Self::V2_3 | Self::V2_4 => 4,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "2.{}", self.major())
    }
}

/// A 28-bit integer stored in 4 bytes whose high bits are always 0
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use tag_splice::id3v2::Synchsafe;
///
/// let data: &[u8] = &[0x00, 0x00, 0x02, 0x01];
/// let mut r = BitReader::endian(data, BigEndian);
/// assert_eq!(r.parse::<Synchsafe>().unwrap(), Synchsafe(257));
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Synchsafe(pub u32);

impl Synchsafe {
    /// The largest value that can be stored
    pub const MAX: u32 = (1 << 28) - 1;
}

impl FromBitStream for Synchsafe {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let mut value = 0;
        for _ in 0..4 {
            if r.read_bit()? {
                return Err(Error::TagCorrupt("invalid synchsafe integer"));
            }
            value = (value << 7) | r.read::<7, u32>()?;
        }
        Ok(Self(value))
    }
}

impl ToBitStream for Synchsafe {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Error> {
        if self.0 > Self::MAX {
            return Err(Error::ExcessiveTagSize);
        }
        for shift in [21, 14, 7, 0] {
            w.write_bit(false)?;
            w.write::<7, u32>((self.0 >> shift) & 0x7F)?;
        }
        Ok(())
    }
}

/// An ID3v2 tag header
///
/// | Bytes | Field | Meaning |
/// |------:|------:|---------|
/// | 3 | marker | `ID3` |
/// | 1 | `version` | major version |
/// | 1 | `revision` | minor version |
/// | 1 | `flags` | tag-wide flags |
/// | 4 | `size` | synchsafe tag size, excluding header and footer |
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use tag_splice::id3v2::{Header, HeaderFlags, Version};
///
/// let data: &[u8] = b"ID3\x03\x00\x00\x00\x00\x10\x00";
/// let mut r = BitReader::endian(data, BigEndian);
/// assert_eq!(
///     r.parse::<Header>().unwrap(),
///     Header {
///         version: Version::V2_3,
///         revision: 0,
///         flags: HeaderFlags::default(),
///         size: 2048,
///     },
/// );
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Header {
    /// The tag's version
    pub version: Version,
    /// The tag's revision
    pub revision: u8,
    /// Tag-wide flags
    pub flags: HeaderFlags,
    /// Size of everything following the header, excluding any footer
    pub size: u32,
}

impl Header {
    /// Size of the header, in bytes
    pub const SIZE: u64 = 10;

    /// Total bytes occupied by the tag, including header and footer
    pub fn tag_length(&self) -> u64 {
        Self::SIZE
            + u64::from(self.size)
            + if self.has_footer() { Self::SIZE } else { 0 }
    }

    fn has_footer(&self) -> bool {
        self.version == Version::V2_4 && self.flags.footer
    }
}

impl FromBitStream for Header {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Error> {
        if &r.read_to::<[u8; 3]>()? != b"ID3" {
            return Err(Error::TagCorrupt("missing ID3 marker"));
        }

        let version = match r.read_to::<u8>()? {
            2 => Version::V2_2,
            3 => Version::V2_3,
            4 => Version::V2_4,
            _ => return Err(Error::TagCorrupt("unsupported ID3v2 version")),
        };
        let revision = r.read_to()?;
        let flags = HeaderFlags {
            unsynchronisation: r.read_bit()?,
            extended_header: r.read_bit()?,
            experimental: r.read_bit()?,
            footer: r.read_bit()?,
        };
        r.skip(4)?;

        Ok(Self {
            version,
            revision,
            flags,
            size: r.parse::<Synchsafe>()?.0,
        })
    }
}

impl ToBitStream for Header {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Error> {
        w.write_bytes(b"ID3")?;
        w.write_from(self.version.major())?;
        w.write_from(self.revision)?;
        w.write_bit(self.flags.unsynchronisation)?;
        w.write_bit(self.flags.extended_header)?;
        w.write_bit(self.flags.experimental)?;
        w.write_bit(self.flags.footer)?;
        w.write::<4, u8>(0)?;
        w.build(&Synchsafe(self.size))
    }
}

/// Flags applying to the whole tag
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HeaderFlags {
    /// Whether the tag's contents are unsynchronised
    pub unsynchronisation: bool,
    /// Whether an extended header follows
    ///
    /// In ID3v2.2, this indicates compression instead.
    pub extended_header: bool,
    /// Whether the tag is experimental
    pub experimental: bool,
    /// Whether a footer follows the tag
    pub footer: bool,
}

/// Status and format flags of a single frame
///
/// Bit positions differ between ID3v2.3 and ID3v2.4.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FrameFlags(pub u16);

impl FrameFlags {
    const FILE_ALTER_V23: Self = Self(0x4000);
    const COMPRESSION_V23: Self = Self(0x0080);
    const ENCRYPTION_V23: Self = Self(0x0040);
    const GROUPING_V23: Self = Self(0x0020);

    const FILE_ALTER_V24: Self = Self(0x2000);
    const GROUPING_V24: Self = Self(0x0040);
    const COMPRESSION_V24: Self = Self(0x0008);
    const ENCRYPTION_V24: Self = Self(0x0004);
    const UNSYNCHRONISATION_V24: Self = Self(0x0002);
    const DATA_LENGTH_V24: Self = Self(0x0001);

    /// The flag marking a frame to be discarded
    /// if the audio payload is altered
    pub fn file_alter(version: Version) -> Self {
        match version {
            Version::V2_2 => Self(0),
            Version::V2_3 => Self::FILE_ALTER_V23,
            Version::V2_4 => Self::FILE_ALTER_V24,
        }
    }

    fn contains(self, Self(other): Self) -> bool {
        self.0 & other == other
    }

    fn remove(&mut self, Self(other): Self) {
        self.0 &= !other;
    }

    /// Whether a frame's body can only be preserved as-is
    fn is_opaque(self, version: Version) -> bool {
        let opaque = match version {
            Version::V2_2 => 0,
            Version::V2_3 => {
                Self::COMPRESSION_V23.0 | Self::ENCRYPTION_V23.0 | Self::GROUPING_V23.0
            }
            Version::V2_4 => {
                Self::COMPRESSION_V24.0 | Self::ENCRYPTION_V24.0 | Self::GROUPING_V24.0
            }
        };
        self.0 & opaque != 0
    }
}

/// A frame header, whose layout depends on the tag version
///
/// | Version | Identifier | Size | Flags |
/// |--------:|-----------:|-----:|------:|
/// | 2.2 | 3 bytes | 24 bits | none |
/// | 2.3 | 4 bytes | 32 bits | 16 bits |
/// | 2.4 | 4 bytes | 28-bit synchsafe | 16 bits |
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrameHeader {
    /// The frame's identifier
    pub id: ArrayString<4>,
    /// The frame's body size, in bytes
    pub size: u32,
    /// The frame's flags
    pub flags: FrameFlags,
}

impl FrameHeader {
    fn id(bytes: &[u8], version: Version) -> Result<ArrayString<4>, Error> {
        if bytes.len() == version.id_len()
            && bytes
                .iter()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            std::str::from_utf8(bytes)
                .ok()
                .and_then(|id| ArrayString::from(id).ok())
                .ok_or(Error::TagCorrupt("invalid frame identifier"))
        } else {
            Err(Error::TagCorrupt("invalid frame identifier"))
        }
    }
}

impl FromBitStreamUsing for FrameHeader {
    type Context = Version;
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R, version: Version) -> Result<Self, Error> {
        match version {
            Version::V2_2 => Ok(Self {
                id: Self::id(&r.read_to::<[u8; 3]>()?, version)?,
                size: r.read::<24, u32>()?,
                flags: FrameFlags::default(),
            }),
            Version::V2_3 => Ok(Self {
                id: Self::id(&r.read_to::<[u8; 4]>()?, version)?,
                size: r.read_to()?,
                flags: FrameFlags(r.read_to()?),
            }),
            Version::V2_4 => Ok(Self {
                id: Self::id(&r.read_to::<[u8; 4]>()?, version)?,
                size: r.parse::<Synchsafe>()?.0,
                flags: FrameFlags(r.read_to()?),
            }),
        }
    }
}

impl ToBitStreamUsing for FrameHeader {
    type Context = Version;
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W, version: Version) -> Result<(), Error> {
        if self.id.len() != version.id_len() {
            return Err(Error::InvalidEntryKey(self.id.to_string()));
        }
        w.write_bytes(self.id.as_bytes())?;
        match version {
            Version::V2_2 => {
                if self.size >= 1 << 24 {
                    return Err(Error::ExcessiveTagSize);
                }
                w.write::<24, u32>(self.size)?;
            }
            Version::V2_3 => {
                w.write_from(self.size)?;
                w.write_from(self.flags.0)?;
            }
            Version::V2_4 => {
                w.build(&Synchsafe(self.size))?;
                w.write_from(self.flags.0)?;
            }
        }
        Ok(())
    }
}

/// A complete ID3v2 tag
///
/// # Example
///
/// ```
/// use tag_splice::id3v2::{Id3v2Tag, Version};
/// use tag_splice::entry::{TagEntry, TextEncoding};
///
/// let mut tag = Id3v2Tag::new(Version::V2_3);
/// tag.entries.push(TagEntry::text("TIT2", "Title").encoding(TextEncoding::Latin1));
///
/// let mut data = vec![];
/// tag.write(16, &mut data).unwrap();
/// assert_eq!(data.len(), 10 + 10 + 6 + 16);
///
/// let decoded = Id3v2Tag::read(data.as_slice()).unwrap().unwrap();
/// assert_eq!(decoded.tag, tag);
/// assert_eq!(decoded.existing.length, 42);
/// assert_eq!(decoded.existing.padding, 16);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Id3v2Tag {
    /// The tag's version
    pub version: Version,
    /// The tag's frames, in order
    pub entries: Vec<TagEntry>,
}

impl Id3v2Tag {
    /// Creates an empty tag of the given version
    pub fn new(version: Version) -> Self {
        Self {
            version,
            entries: vec![],
        }
    }

    /// Returns the first entry with the given key
    pub fn get(&self, key: &str) -> Option<&TagEntry> {
        self.entries.iter().find(|e| e.is(key))
    }

    /// Reads a tag from the start of the reader
    ///
    /// Returns `Ok(None)` if the reader doesn't start with a tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TagCorrupt`] if the declared tag size
    /// exceeds the stream or any frame exceeds the tag.
    pub fn read<R: Read>(mut r: R) -> Result<Option<Decoded<Self>>, Error> {
        let mut raw = [0; Header::SIZE as usize];
        if !crate::stream::read_fully(&mut r, &mut raw)? || &raw[0..3] != b"ID3" {
            return Ok(None);
        }
        let header: Header = BitReader::endian(raw.as_slice(), BigEndian).parse()?;

        let mut body = Vec::new();
        r.by_ref()
            .take(u64::from(header.size))
            .read_to_end(&mut body)?;
        if body.len() < header.size as usize {
            return Err(Error::TagCorrupt("declared tag size exceeds stream"));
        }

        if header.has_footer() {
            let mut footer = [0; Header::SIZE as usize];
            if !crate::stream::read_fully(&mut r, &mut footer)? || &footer[0..3] != b"3DI" {
                return Err(Error::TagCorrupt("missing tag footer"));
            }
        }

        let (entries, padding) = match header.version {
            // compression scheme never defined, so frames are unreadable
            Version::V2_2 if header.flags.extended_header => (vec![], 0),
            _ => Self::read_frames(&header, body)?,
        };

        Ok(Some(Decoded {
            tag: Self {
                version: header.version,
                entries,
            },
            existing: ExistingTag {
                length: header.tag_length(),
                padding,
            },
        }))
    }

    /// Reads frames from the tag's body, returning them
    /// along with the number of padding bytes that follow them
    fn read_frames(header: &Header, mut body: Vec<u8>) -> Result<(Vec<TagEntry>, u64), Error> {
        let version = header.version;

        if header.flags.unsynchronisation && version != Version::V2_4 {
            body = frames::resync(&body);
        }

        let mut rest = body.as_slice();

        if header.flags.extended_header {
            let skip = match version {
                Version::V2_2 => Some(0),
                Version::V2_3 => rest
                    .first_chunk::<4>()
                    .map(|size| u32::from_be_bytes(*size) as usize + 4),
                Version::V2_4 => rest
                    .first_chunk::<4>()
                    .map(|size| {
                        BitReader::endian(size.as_slice(), BigEndian)
                            .parse::<Synchsafe>()
                            .map(|s| s.0 as usize)
                    })
                    .transpose()?,
            };
            rest = skip
                .and_then(|skip| rest.get(skip..))
                .ok_or(Error::TagCorrupt("extended header exceeds tag size"))?;
        }

        let mut entries = vec![];
        while let Some(&first) = rest.first() {
            if first == 0 {
                break;
            }

            let header_len = version.frame_header_len();
            let frame_header: FrameHeader = match rest.get(..header_len) {
                Some(bytes) => BitReader::endian(bytes, BigEndian).parse_using(version)?,
                None => return Err(Error::TagCorrupt("truncated frame header")),
            };
            rest = &rest[header_len..];

            if frame_header.size as usize > rest.len() {
                return Err(Error::TagCorrupt("frame size exceeds tag size"));
            }
            let (data, tail) = rest.split_at(frame_header.size as usize);
            entries.push(frames::decode_frame(&frame_header, data, version));
            rest = tail;
        }

        Ok((entries, rest.len() as u64))
    }

    /// Writes the tag followed by the given number of padding bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExcessiveTagSize`] if the tag is too large
    /// for its size field, [`Error::InvalidEntryKey`] if a key
    /// is not a valid frame identifier, or
    /// [`Error::UnencodableText`] if text is not representable
    /// in its entry's encoding.
    pub fn write<W: Write>(&self, padding: u64, mut w: W) -> Result<(), Error> {
        let mut encoded = BitWriter::endian(vec![], BigEndian);
        for entry in &self.entries {
            let id = FrameHeader::id(entry.key.as_bytes(), self.version)
                .map_err(|_| Error::InvalidEntryKey(entry.key.clone()))?;
            let body = frames::encode_body(entry, self.version)?;
            encoded.build_using(
                &FrameHeader {
                    id,
                    size: body
                        .len()
                        .try_into()
                        .map_err(|_| Error::ExcessiveTagSize)?,
                    flags: FrameFlags(entry.flags.raw),
                },
                self.version,
            )?;
            encoded.write_bytes(&body)?;
        }
        let encoded = encoded.into_writer();

        BitWriter::endian(&mut w, BigEndian).build(&Header {
            version: self.version,
            revision: 0,
            flags: HeaderFlags::default(),
            size: (encoded.len() as u64 + padding)
                .try_into()
                .map_err(|_| Error::ExcessiveTagSize)?,
        })?;
        w.write_all(&encoded)?;
        std::io::copy(&mut std::io::repeat(0).take(padding), &mut w)?;
        Ok(())
    }
}

/// Options for writing ID3v2 tags
///
/// # Example
///
/// ```
/// use tag_splice::id3v2::{Id3v2Options, Version};
/// use tag_splice::entry::TextEncoding;
/// use tag_splice::settings::{Padding, Settings};
///
/// let from_settings = Id3v2Options::try_from(
///     &Settings::default()
///         .with("TagVersion", "2.4")
///         .with("TagEncoding", "UTF16")
///         .with("TagPadding", 0),
/// ).unwrap();
///
/// let built = Id3v2Options::default()
///     .version(Version::V2_4)
///     .encoding(TextEncoding::Utf16)
///     .no_padding();
///
/// assert_eq!(from_settings, built);
/// assert_eq!(built.padding, Padding::Exact(0));
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Id3v2Options {
    /// Version of newly written tags
    ///
    /// ID3v2.2 is never written and is treated as ID3v2.3.
    pub version: Version,
    /// Text encoding of ordinary text frames
    pub encoding: TextEncoding,
    /// Padding policy
    pub padding: Padding,
}

impl Default for Id3v2Options {
    fn default() -> Self {
        Self {
            version: Version::V2_3,
            encoding: TextEncoding::Latin1,
            padding: Padding::Reuse,
        }
    }
}

impl Id3v2Options {
    /// Sets the version of newly written tags
    pub fn version(self, version: Version) -> Self {
        Self { version, ..self }
    }

    /// Sets the text encoding of ordinary text frames
    pub fn encoding(self, encoding: TextEncoding) -> Self {
        Self { encoding, ..self }
    }

    /// Requests exactly the given number of padding bytes
    pub fn padding(self, padding: u32) -> Self {
        Self {
            padding: Padding::Exact(padding),
            ..self
        }
    }

    /// Requests no padding at all
    pub fn no_padding(self) -> Self {
        self.padding(0)
    }
}

impl TryFrom<&Settings> for Id3v2Options {
    type Error = Error;

    fn try_from(settings: &Settings) -> Result<Self, Error> {
        settings.validate(Id3v2::SETTINGS)?;

        Ok(Self {
            version: match settings.text("TagVersion") {
                Some("2.4") => Version::V2_4,
                _ => Version::V2_3,
            },
            encoding: match settings.text("TagEncoding") {
                Some("UTF16") => TextEncoding::Utf16,
                _ => TextEncoding::Latin1,
            },
            padding: match settings.int("TagPadding") {
                Some(padding) => Padding::Exact(padding.try_into().map_err(|_| {
                    Error::InvalidSetting {
                        key: "TagPadding".to_owned(),
                        reason: "value out of range",
                    }
                })?),
                None => Padding::Reuse,
            },
        })
    }
}

impl TagOptions for Id3v2Options {
    fn padding(&self) -> Padding {
        self.padding
    }
}

/// The ID3v2 tag dialect
///
/// Cover art is passed through a [`LossyConverter`]
/// before embedding, since MP3 is itself lossy.
pub struct Id3v2 {
    converter: Box<dyn LossyConverter>,
}

impl Id3v2 {
    /// Uses the given converter for embedded cover art
    pub fn with_converter(converter: Box<dyn LossyConverter>) -> Self {
        Self { converter }
    }
}

impl Default for Id3v2 {
    fn default() -> Self {
        Self::with_converter(crate::picture::default_converter())
    }
}

impl std::fmt::Debug for Id3v2 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Id3v2").finish_non_exhaustive()
    }
}

impl TagFormat for Id3v2 {
    type Tag = Id3v2Tag;
    type Options = Id3v2Options;

    const NAME: &'static str = "ID3v2";
    const EXTENSIONS: &'static [&'static str] = &["mp3"];
    const SETTINGS: &'static [(&'static str, SettingInfo)] = &[
        ("TagVersion", SettingInfo::Text(&["2.3", "2.4"])),
        ("TagEncoding", SettingInfo::Text(&["Latin1", "UTF16"])),
        (
            "TagPadding",
            SettingInfo::Int {
                min: 0,
                max: 1 << 28,
            },
        ),
    ];
    const DEFAULT_PADDING: u64 = 2048;
    const LEGACY_TRAILER: bool = true;

    fn decode_existing<R: Read>(&self, r: R) -> Result<Option<Decoded<Id3v2Tag>>, Error> {
        Id3v2Tag::read(r)
    }

    fn build_entries(
        &self,
        record: &MetadataRecord,
        options: &Id3v2Options,
        _existing: Option<&Id3v2Tag>,
        _telemetry: &dyn Telemetry,
    ) -> Result<Option<Id3v2Tag>, Error> {
        adapter::build(record, options, self.converter.as_ref())
    }

    fn to_record(&self, tag: &Id3v2Tag, telemetry: &dyn Telemetry) -> MetadataRecord {
        adapter::to_record(tag, telemetry)
    }

    fn entry_count(&self, tag: &Id3v2Tag) -> usize {
        tag.entries.len()
    }

    fn encode_block<W: Write>(&self, tag: &Id3v2Tag, padding: u64, w: W) -> Result<(), Error> {
        tag.write(padding, w)
    }
}
