// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling embedded cover art

use bitstream_io::{BigEndian, BitRead, BitReader, ByteRead, ByteReader, LittleEndian};
use std::num::NonZero;

/// An image suitable for embedding as cover art
///
/// The image's dimensions, color depth and MIME type
/// are taken from the image data itself.
///
/// # Example
///
/// ```
/// use tag_splice::picture::CoverArt;
///
/// // a 1x1 pixel, 24-bit BMP image
/// let bmp: &[u8] = &[
///     0x42, 0x4d, 0x3a, 0x00, 0x00, 0x00, 0x00, 0x00,
///     0x00, 0x00, 0x36, 0x00, 0x00, 0x00, 0x28, 0x00,
///     0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00,
///     0x00, 0x00, 0x01, 0x00, 0x18, 0x00, 0x00, 0x00,
///     0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00,
///     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
///     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x00,
///     0x00, 0x00,
/// ];
///
/// let art = CoverArt::new(bmp).unwrap();
/// assert_eq!(art.media_type(), "image/bmp");
/// assert_eq!((art.width(), art.height()), (1, 1));
/// assert_eq!(art.color_depth(), 24);
/// assert!(art.lossless());
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoverArt {
    media_type: &'static str,
    width: u32,
    height: u32,
    color_depth: u32,
    colors_used: Option<NonZero<u32>>,
    lossless: bool,
    data: Vec<u8>,
}

impl CoverArt {
    /// Attempts to build cover art from raw image data
    ///
    /// # Errors
    ///
    /// Returns an error if the image format is unsupported
    /// or its header cannot be parsed.
    pub fn new<V>(data: V) -> Result<Self, InvalidPicture>
    where
        V: Into<Vec<u8>> + AsRef<[u8]>,
    {
        let metrics = PictureMetrics::try_new(data.as_ref())?;
        Ok(Self {
            media_type: metrics.media_type,
            width: metrics.width,
            height: metrics.height,
            color_depth: metrics.color_depth,
            colors_used: metrics.colors_used,
            lossless: metrics.lossless,
            data: data.into(),
        })
    }

    /// The image's MIME type
    pub fn media_type(&self) -> &'static str {
        self.media_type
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Color depth in bits per pixel, or 0 for indexed images
    pub fn color_depth(&self) -> u32 {
        self.color_depth
    }

    /// For indexed-color images, the number of colors used
    pub fn colors_used(&self) -> Option<NonZero<u32>> {
        self.colors_used
    }

    /// Whether the image is stored losslessly
    pub fn lossless(&self) -> bool {
        self.lossless
    }

    /// The raw image data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the cover art, returning its raw image data
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Wraps the image as an embeddable picture of the given type
    pub fn to_picture(&self, picture_type: PictureType) -> Picture {
        Picture {
            picture_type,
            media_type: self.media_type.to_owned(),
            description: String::new(),
            width: self.width,
            height: self.height,
            color_depth: self.color_depth,
            colors_used: self.colors_used,
            data: self.data.clone(),
        }
    }
}

impl TryFrom<&Picture> for CoverArt {
    type Error = InvalidPicture;

    fn try_from(picture: &Picture) -> Result<Self, InvalidPicture> {
        Self::new(picture.data.as_slice())
    }
}

/// An image embedded in a tag
///
/// Both ID3v2 `APIC` frames and FLAC `PICTURE` blocks
/// carry an image along with this information,
/// although ID3v2 only stores the type, MIME type,
/// description and data.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Picture {
    /// The picture type
    pub picture_type: PictureType,
    /// The media type string as specified by RFC2046
    pub media_type: String,
    /// The description of the picture
    pub description: String,
    /// The width of the picture in pixels
    pub width: u32,
    /// The height of the picture in pixels
    pub height: u32,
    /// The color depth of the picture in bits per pixel
    pub color_depth: u32,
    /// For indexed-color pictures, the number of colors used
    pub colors_used: Option<NonZero<u32>>,
    /// The binary picture data
    pub data: Vec<u8>,
}

/// Defined variants of picture type
///
/// ID3v2 and FLAC share the same numbering.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PictureType {
    /// Other
    Other = 0,
    /// PNG file icon of 32x32 pixels
    Png32x32 = 1,
    /// General file icon
    GeneralFileIcon = 2,
    /// Front cover
    FrontCover = 3,
    /// Back cover
    BackCover = 4,
    /// Liner notes page
    LinerNotes = 5,
    /// Media label (e.g., CD, Vinyl or Cassette label)
    MediaLabel = 6,
    /// Lead artist, lead performer, or soloist
    LeadArtist = 7,
    /// Artist or performer
    Artist = 8,
    /// Conductor
    Conductor = 9,
    /// Band or orchestra
    Band = 10,
    /// Composer
    Composer = 11,
    /// Lyricist or text writer
    Lyricist = 12,
    /// Recording location
    RecordingLocation = 13,
    /// During recording
    DuringRecording = 14,
    /// During performance
    DuringPerformance = 15,
    /// Movie or video screen capture
    ScreenCapture = 16,
    /// A bright colored fish
    Fish = 17,
    /// Illustration
    Illustration = 18,
    /// Band or artist logotype
    BandLogo = 19,
    /// Publisher or studio logotype
    PublisherLogo = 20,
}

impl PictureType {
    /// Returns the type for a stored numeric code, if defined
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Other,
            1 => Self::Png32x32,
            2 => Self::GeneralFileIcon,
            3 => Self::FrontCover,
            4 => Self::BackCover,
            5 => Self::LinerNotes,
            6 => Self::MediaLabel,
            7 => Self::LeadArtist,
            8 => Self::Artist,
            9 => Self::Conductor,
            10 => Self::Band,
            11 => Self::Composer,
            12 => Self::Lyricist,
            13 => Self::RecordingLocation,
            14 => Self::DuringRecording,
            15 => Self::DuringPerformance,
            16 => Self::ScreenCapture,
            17 => Self::Fish,
            18 => Self::Illustration,
            19 => Self::BandLogo,
            20 => Self::PublisherLogo,
            _ => return None,
        })
    }

    /// The type's stored numeric code
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// An error attempting to use an image as cover art
#[derive(Debug, thiserror::Error)]
pub enum InvalidPicture {
    /// An I/O Error
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Unsupported Image Format
    #[error("unsupported image format")]
    Unsupported,
    /// Invalid PNG File
    #[error("PNG parsing error : {0}")]
    Png(&'static str),
    /// Invalid JPEG File
    #[error("JPEG parsing error : {0}")]
    Jpeg(&'static str),
    /// Invalid GIF File
    #[error("GIF parsing error : {0}")]
    Gif(&'static str),
    /// Invalid BMP File
    #[error("BMP parsing error : {0}")]
    Bmp(&'static str),
    /// The image could not be re-encoded
    #[error("image conversion error : {0}")]
    Conversion(String),
}

struct PictureMetrics {
    media_type: &'static str,
    width: u32,
    height: u32,
    color_depth: u32,
    colors_used: Option<NonZero<u32>>,
    lossless: bool,
}

impl PictureMetrics {
    fn try_new(data: &[u8]) -> Result<Self, InvalidPicture> {
        if data.starts_with(b"\x89\x50\x4E\x47\x0D\x0A\x1A\x0A") {
            Self::try_png(data)
        } else if data.starts_with(b"\xFF\xD8\xFF") {
            Self::try_jpeg(data)
        } else if data.starts_with(b"GIF") {
            Self::try_gif(data)
        } else if data.starts_with(b"BM") {
            Self::try_bmp(data)
        } else {
            Err(InvalidPicture::Unsupported)
        }
    }

    fn try_png(data: &[u8]) -> Result<Self, InvalidPicture> {
        // only enough of PNG to get at the IHDR and PLTE chunks,
        // chunk CRC32s are not validated

        fn plte_colors<R: ByteRead>(mut r: R) -> Result<u32, InvalidPicture> {
            loop {
                let chunk_len = r.read::<u32>()?;
                match r.read::<[u8; 4]>()?.as_slice() {
                    b"PLTE" => {
                        break match chunk_len % 3 {
                            0 => Ok(chunk_len / 3),
                            _ => Err(InvalidPicture::Png("invalid PLTE length")),
                        };
                    }
                    _ => {
                        r.skip(chunk_len)?;
                        let _crc = r.read::<u32>()?;
                    }
                }
            }
        }

        let mut r = ByteReader::endian(data, BigEndian);
        r.skip(8)?;

        // IHDR chunk must be first
        if r.read::<u32>()? != 0x0d {
            return Err(InvalidPicture::Png("invalid IHDR length"));
        }
        if &r.read::<[u8; 4]>()? != b"IHDR" {
            return Err(InvalidPicture::Png("IHDR chunk not first"));
        }
        let width = r.read()?;
        let height = r.read()?;
        let bit_depth = r.read::<u8>()?;
        let color_type = r.read::<u8>()?;
        r.skip(3)?; // compression, filter and interlace methods
        let _crc = r.read::<u32>()?;

        let (color_depth, colors_used) = match color_type {
            0 => (bit_depth.into(), None),                               // grayscale
            2 => (u32::from(bit_depth) * 3, None),                       // RGB
            3 => (0, NonZero::new(plte_colors(r)?)),                     // palette
            4 => (u32::from(bit_depth) * 2, None),                       // grayscale + alpha
            6 => (u32::from(bit_depth) * 4, None),                       // RGB + alpha
            _ => return Err(InvalidPicture::Png("invalid color type")),
        };

        Ok(Self {
            media_type: "image/png",
            width,
            height,
            color_depth,
            colors_used,
            lossless: true,
        })
    }

    fn try_jpeg(data: &[u8]) -> Result<Self, InvalidPicture> {
        let mut r = ByteReader::endian(data, BigEndian);
        r.skip(2)?;

        loop {
            if r.read::<u8>()? != 0xFF {
                break Err(InvalidPicture::Jpeg("invalid JPEG marker"));
            }
            match r.read::<u8>()? {
                0xC0 | 0xC1 | 0xC2 | 0xC3 | 0xC5 | 0xC6 | 0xC7 | 0xC9 | 0xCA | 0xCB | 0xCD
                | 0xCE | 0xCF => {
                    let _len = r.read::<u16>()?;
                    let data_precision = r.read::<u8>()?;
                    let height = r.read::<u16>()?;
                    let width = r.read::<u16>()?;
                    let components = r.read::<u8>()?;
                    break Ok(Self {
                        media_type: "image/jpeg",
                        width: width.into(),
                        height: height.into(),
                        color_depth: u32::from(data_precision) * u32::from(components),
                        colors_used: None,
                        lossless: false,
                    });
                }
                _ => {
                    let segment_length = r
                        .read::<u16>()?
                        .checked_sub(2)
                        .ok_or(InvalidPicture::Jpeg("invalid segment length"))?;
                    r.skip(segment_length.into())?;
                }
            }
        }
    }

    fn try_gif(data: &[u8]) -> Result<Self, InvalidPicture> {
        let mut r = BitReader::endian(data, LittleEndian);

        if &r.read_to::<[u8; 3]>()? != b"GIF" {
            return Err(InvalidPicture::Gif("invalid GIF signature"));
        }

        r.skip(3 * 8)?; // ignore version bytes

        Ok(Self {
            media_type: "image/gif",
            width: r.read::<16, _>()?,
            height: r.read::<16, _>()?,
            colors_used: NonZero::new(1 << (r.read::<3, u32>()? + 1)),
            color_depth: 0,
            lossless: true,
        })
    }

    fn try_bmp(data: &[u8]) -> Result<Self, InvalidPicture> {
        let mut r = ByteReader::endian(data, LittleEndian);

        r.skip(2 + 4 + 4 + 4)?; // signature, file size, reserved, pixel offset
        if r.read::<u32>()? < 40 {
            return Err(InvalidPicture::Bmp("unsupported BMP header"));
        }
        let width = r.read::<i32>()?.unsigned_abs();
        let height = r.read::<i32>()?.unsigned_abs();
        let _planes = r.read::<u16>()?;
        let bits_per_pixel = r.read::<u16>()?;

        Ok(Self {
            media_type: "image/bmp",
            width,
            height,
            color_depth: bits_per_pixel.into(),
            colors_used: None,
            lossless: true,
        })
    }
}

/// Converts cover art into a lossy format
///
/// Lossy containers such as MP3 embed their cover art
/// in a lossy format as well.
pub trait LossyConverter: Send + Sync {
    /// Returns a lossy copy of the given art
    ///
    /// Art which is already lossy may be returned as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be re-encoded.
    fn to_lossy(&self, art: &CoverArt) -> Result<CoverArt, InvalidPicture>;
}

/// Embeds cover art unchanged
#[derive(Copy, Clone, Debug, Default)]
pub struct Passthrough;

impl LossyConverter for Passthrough {
    fn to_lossy(&self, art: &CoverArt) -> Result<CoverArt, InvalidPicture> {
        Ok(art.clone())
    }
}

/// Re-encodes lossless cover art as JPEG
#[cfg(feature = "image")]
#[derive(Copy, Clone, Debug)]
pub struct JpegConverter {
    /// JPEG quality from 1 to 100
    pub quality: u8,
}

#[cfg(feature = "image")]
impl Default for JpegConverter {
    fn default() -> Self {
        Self { quality: 90 }
    }
}

#[cfg(feature = "image")]
impl LossyConverter for JpegConverter {
    fn to_lossy(&self, art: &CoverArt) -> Result<CoverArt, InvalidPicture> {
        use image::codecs::jpeg::JpegEncoder;

        if !art.lossless() {
            return Ok(art.clone());
        }

        let conversion = |err: image::ImageError| InvalidPicture::Conversion(err.to_string());

        let image = image::load_from_memory(art.data()).map_err(conversion)?;
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(&image.to_rgb8())
            .map_err(conversion)?;
        CoverArt::new(jpeg)
    }
}

/// The converter used for lossy containers by default
///
/// This re-encodes lossless art as JPEG when the `image`
/// feature is enabled, and embeds art unchanged otherwise.
pub fn default_converter() -> Box<dyn LossyConverter> {
    #[cfg(feature = "image")]
    {
        Box::new(JpegConverter::default())
    }
    #[cfg(not(feature = "image"))]
    {
        Box::new(Passthrough)
    }
}
