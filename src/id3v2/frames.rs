// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Bodies of individual ID3v2 frames
//!
//! | Frame | Body |
//! |------:|------|
//! | `T***` | encoding, text |
//! | `TXXX` | encoding, description, text |
//! | `COMM` | encoding, language, description, text |
//! | `APIC` | encoding, MIME type, picture type, description, data |
//! | `PIC`  | encoding, image format, picture type, description, data |
//!
//! Anything else is preserved as opaque bytes.

use super::{FrameFlags, FrameHeader, Version};
use crate::Error;
use crate::entry::{EntryFlags, EntryValue, TagEntry, TextEncoding};
use crate::picture::{CoverArt, Picture, PictureType};
use std::borrow::Cow;

impl TextEncoding {
    fn from_id3(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Latin1),
            1 => Some(Self::Utf16),
            2 => Some(Self::Utf16Be),
            3 => Some(Self::Utf8),
            _ => None,
        }
    }

    fn to_id3(self) -> u8 {
        match self {
            Self::Latin1 => 0,
            Self::Utf16 => 1,
            Self::Utf16Be => 2,
            Self::Utf8 => 3,
        }
    }

    /// Encodings before ID3v2.4 are limited to Latin-1 and UTF-16
    fn for_version(self, version: Version) -> Self {
        match (self, version) {
            (Self::Utf16Be | Self::Utf8, Version::V2_2 | Version::V2_3) => Self::Utf16,
            (encoding, _) => encoding,
        }
    }

    fn terminator(self) -> &'static [u8] {
        if self.is_wide() { &[0, 0] } else { &[0] }
    }
}

/// Removes the unsynchronisation scheme's inserted bytes
///
/// Every `FF 00` sequence becomes `FF`.
pub(super) fn resync(data: &[u8]) -> Vec<u8> {
    let mut resynced = Vec::with_capacity(data.len());
    let mut previous = 0;
    for &byte in data {
        if !(previous == 0xFF && byte == 0x00) {
            resynced.push(byte);
        }
        previous = byte;
    }
    resynced
}

/// Splits a terminated string from the front of some data,
/// returning the string's bytes and the data following its terminator
fn split_terminated(data: &[u8], encoding: TextEncoding) -> Option<(&[u8], &[u8])> {
    if encoding.is_wide() {
        let end = data
            .chunks_exact(2)
            .position(|unit| unit == [0, 0])?
            * 2;
        Some((&data[..end], &data[end + 2..]))
    } else {
        let end = data.iter().position(|b| *b == 0)?;
        Some((&data[..end], &data[end + 1..]))
    }
}

/// Decodes a single string without terminator
///
/// A UTF-16 string without byte order mark is
/// assumed to have the given endianness,
/// which is updated by any mark that is found.
fn decode_string(bytes: &[u8], encoding: TextEncoding, big_endian: &mut bool) -> Option<String> {
    fn utf16(bytes: &[u8], big_endian: bool) -> Option<String> {
        if bytes.len() % 2 != 0 {
            return None;
        }
        char::decode_utf16(bytes.chunks_exact(2).map(|unit| match big_endian {
            true => u16::from_be_bytes([unit[0], unit[1]]),
            false => u16::from_le_bytes([unit[0], unit[1]]),
        }))
        .collect::<Result<String, _>>()
        .ok()
    }

    match encoding {
        TextEncoding::Latin1 => Some(bytes.iter().copied().map(char::from).collect()),
        TextEncoding::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
        TextEncoding::Utf16 | TextEncoding::Utf16Be => match bytes {
            [0xFF, 0xFE, rest @ ..] => {
                *big_endian = false;
                utf16(rest, false)
            }
            [0xFE, 0xFF, rest @ ..] => {
                *big_endian = true;
                utf16(rest, true)
            }
            bytes => utf16(bytes, *big_endian),
        },
    }
}

/// Decodes a terminated string from the front of some data
fn decode_terminated(data: &[u8], encoding: TextEncoding) -> Option<(String, &[u8])> {
    let (bytes, rest) = split_terminated(data, encoding)?;
    Some((decode_string(bytes, encoding, &mut true)?, rest))
}

/// Decodes the rest of a frame as one or more strings
///
/// Multiple values are joined with NUL characters
/// and trailing terminators are dropped.
fn decode_values(mut data: &[u8], encoding: TextEncoding) -> Option<String> {
    let mut big_endian = true;
    let mut values = Vec::new();
    while !data.is_empty() {
        match split_terminated(data, encoding) {
            Some((bytes, rest)) => {
                values.push(decode_string(bytes, encoding, &mut big_endian)?);
                data = rest;
            }
            None => {
                values.push(decode_string(data, encoding, &mut big_endian)?);
                data = &[];
            }
        }
    }
    while values.last().is_some_and(|v| v.is_empty()) {
        values.pop();
    }
    Some(values.join("\0"))
}

/// Encodes text without a trailing terminator
///
/// NUL characters separate multiple values.
fn encode_text(text: &str, encoding: TextEncoding, body: &mut Vec<u8>) -> Result<(), Error> {
    match encoding {
        TextEncoding::Latin1 => text.chars().try_for_each(|c| {
            u8::try_from(c)
                .map(|b| body.push(b))
                .map_err(|_| Error::UnencodableText)
        }),
        TextEncoding::Utf8 => {
            body.extend(text.as_bytes());
            Ok(())
        }
        TextEncoding::Utf16Be => {
            body.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
            Ok(())
        }
        TextEncoding::Utf16 => {
            for (i, value) in text.split('\0').enumerate() {
                if i > 0 {
                    body.extend([0, 0]);
                }
                body.extend([0xFF, 0xFE]);
                body.extend(value.encode_utf16().flat_map(u16::to_le_bytes));
            }
            Ok(())
        }
    }
}

fn encode_terminated(text: &str, encoding: TextEncoding, body: &mut Vec<u8>) -> Result<(), Error> {
    encode_text(text, encoding, body)?;
    body.extend(encoding.terminator());
    Ok(())
}

/// Decodes an entry from a frame's header and body
///
/// Frames which are compressed, encrypted, grouped,
/// unrecognized or malformed become opaque binary entries
/// which re-encode to exactly the same bytes.
pub(super) fn decode_frame(header: &FrameHeader, data: &[u8], version: Version) -> TagEntry {
    let opaque = || TagEntry {
        key: header.id.to_string(),
        value: EntryValue::Binary(data.to_vec()),
        flags: EntryFlags {
            raw: header.flags.0,
            ..EntryFlags::default()
        },
    };

    let mut flags = header.flags;
    if flags.is_opaque(version) {
        return opaque();
    }

    let mut body = Cow::Borrowed(data);
    if version == Version::V2_4 {
        if flags.contains(FrameFlags::DATA_LENGTH_V24) {
            match data.get(4..) {
                Some(rest) => body = Cow::Borrowed(rest),
                None => return opaque(),
            }
            flags.remove(FrameFlags::DATA_LENGTH_V24);
        }
        if flags.contains(FrameFlags::UNSYNCHRONISATION_V24) {
            body = Cow::Owned(resync(&body));
            flags.remove(FrameFlags::UNSYNCHRONISATION_V24);
        }
    }

    match decode_body(&header.id, &body) {
        Some((value, entry_flags)) => TagEntry {
            key: header.id.to_string(),
            value,
            flags: EntryFlags {
                raw: flags.0,
                ..entry_flags
            },
        },
        None => opaque(),
    }
}

fn decode_body(id: &str, body: &[u8]) -> Option<(EntryValue, EntryFlags)> {
    let (&encoding, rest) = body.split_first()?;
    let encoding = TextEncoding::from_id3(encoding);

    match id {
        "TXXX" | "TXX" => {
            let encoding = encoding?;
            let (description, rest) = decode_terminated(rest, encoding)?;
            Some((
                EntryValue::Text(decode_values(rest, encoding)?),
                EntryFlags {
                    encoding: Some(encoding),
                    description: Some(description),
                    ..EntryFlags::default()
                },
            ))
        }
        id if id.starts_with('T') => {
            let encoding = encoding?;
            Some((
                EntryValue::Text(decode_values(rest, encoding)?),
                EntryFlags {
                    encoding: Some(encoding),
                    ..EntryFlags::default()
                },
            ))
        }
        "COMM" | "COM" => {
            let encoding = encoding?;
            let (language, rest) = rest.split_first_chunk::<3>()?;
            let (description, rest) = decode_terminated(rest, encoding)?;
            Some((
                EntryValue::Text(decode_values(rest, encoding)?),
                EntryFlags {
                    encoding: Some(encoding),
                    language: Some(*language),
                    description: Some(description),
                    ..EntryFlags::default()
                },
            ))
        }
        "APIC" => {
            let encoding = encoding?;
            let (media_type, rest) = decode_terminated(rest, TextEncoding::Latin1)?;
            let (&picture_type, rest) = rest.split_first()?;
            let (description, data) = decode_terminated(rest, encoding)?;
            Some((
                EntryValue::Picture(picture(media_type, picture_type, description, data)?),
                EntryFlags {
                    encoding: Some(encoding),
                    ..EntryFlags::default()
                },
            ))
        }
        "PIC" => {
            let encoding = encoding?;
            let (format, rest) = rest.split_first_chunk::<3>()?;
            let (&picture_type, rest) = rest.split_first()?;
            let (description, data) = decode_terminated(rest, encoding)?;
            let media_type = match format {
                b"JPG" => "image/jpeg".to_owned(),
                format => format!(
                    "image/{}",
                    String::from_utf8_lossy(format).to_ascii_lowercase()
                ),
            };
            Some((
                EntryValue::Picture(picture(media_type, picture_type, description, data)?),
                EntryFlags {
                    encoding: Some(encoding),
                    ..EntryFlags::default()
                },
            ))
        }
        _ => None,
    }
}

fn picture(media_type: String, picture_type: u8, description: String, data: &[u8]) -> Option<Picture> {
    let metrics = CoverArt::new(data).ok();
    Some(Picture {
        picture_type: PictureType::from_code(picture_type.into())?,
        media_type,
        description,
        width: metrics.as_ref().map(|m| m.width()).unwrap_or(0),
        height: metrics.as_ref().map(|m| m.height()).unwrap_or(0),
        color_depth: metrics.as_ref().map(|m| m.color_depth()).unwrap_or(0),
        colors_used: metrics.as_ref().and_then(|m| m.colors_used()),
        data: data.to_vec(),
    })
}

/// Encodes an entry's frame body
///
/// Entries without an explicit encoding use Latin-1 if
/// their text allows it, and UTF-16 otherwise.
pub(super) fn encode_body(entry: &TagEntry, version: Version) -> Result<Vec<u8>, Error> {
    fn encoding_for(entry: &TagEntry, texts: &[&str], version: Version) -> TextEncoding {
        entry
            .flags
            .encoding
            .unwrap_or_else(|| {
                match texts.iter().all(|t| TextEncoding::Latin1.can_encode(t)) {
                    true => TextEncoding::Latin1,
                    false => TextEncoding::Utf16,
                }
            })
            .for_version(version)
    }

    let description = entry.flags.description.as_deref().unwrap_or_default();
    let mut body = Vec::new();

    match &entry.value {
        EntryValue::Binary(data) => body.extend(data),
        EntryValue::Text(text) if entry.is("TXXX") || entry.is("TXX") => {
            let encoding = encoding_for(entry, &[description, text.as_str()], version);
            body.push(encoding.to_id3());
            encode_terminated(description, encoding, &mut body)?;
            encode_text(text, encoding, &mut body)?;
        }
        EntryValue::Text(text) if entry.is("COMM") || entry.is("COM") => {
            let encoding = encoding_for(entry, &[description, text.as_str()], version);
            body.push(encoding.to_id3());
            body.extend(entry.flags.language.unwrap_or(*b"eng"));
            encode_terminated(description, encoding, &mut body)?;
            encode_text(text, encoding, &mut body)?;
        }
        EntryValue::Text(text) => {
            let encoding = encoding_for(entry, &[text.as_str()], version);
            body.push(encoding.to_id3());
            encode_text(text, encoding, &mut body)?;
        }
        EntryValue::Picture(picture) => {
            let encoding = encoding_for(entry, &[picture.description.as_str()], version);
            body.push(encoding.to_id3());
            match version {
                Version::V2_2 => body.extend(match picture.media_type.as_str() {
                    "image/jpeg" | "image/jpg" => *b"JPG",
                    "image/png" => *b"PNG",
                    "image/gif" => *b"GIF",
                    "image/bmp" => *b"BMP",
                    _ => return Err(Error::UnencodableText),
                }),
                Version::V2_3 | Version::V2_4 => {
                    encode_terminated(&picture.media_type, TextEncoding::Latin1, &mut body)?
                }
            }
            body.push(picture.picture_type.code());
            encode_terminated(&picture.description, encoding, &mut body)?;
            body.extend(&picture.data);
        }
    }

    Ok(body)
}
