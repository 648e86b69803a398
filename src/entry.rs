// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Format-agnostic tag entries
//!
//! An entry is a single named field inside a tag block,
//! such as an ID3v2 frame or a Vorbis comment.

use crate::picture::Picture;

/// A single (key, value, flags) field of a tag
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagEntry {
    /// The entry's identifier, such as `TIT2` or `TITLE`
    pub key: String,
    /// The entry's contents
    pub value: EntryValue,
    /// Format-specific markers
    pub flags: EntryFlags,
}

impl TagEntry {
    /// Builds a plain text entry
    pub fn text<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: EntryValue::Text(value.into()),
            flags: EntryFlags::default(),
        }
    }

    /// Builds a picture entry
    pub fn picture<K: Into<String>>(key: K, picture: Picture) -> Self {
        Self {
            key: key.into(),
            value: EntryValue::Picture(picture),
            flags: EntryFlags::default(),
        }
    }

    /// Replaces the entry's text encoding
    pub fn encoding(self, encoding: TextEncoding) -> Self {
        Self {
            flags: EntryFlags {
                encoding: Some(encoding),
                ..self.flags
            },
            ..self
        }
    }

    /// Replaces the entry's description
    pub fn description<S: Into<String>>(self, description: S) -> Self {
        Self {
            flags: EntryFlags {
                description: Some(description.into()),
                ..self.flags
            },
            ..self
        }
    }

    /// Replaces the entry's language
    pub fn language(self, language: [u8; 3]) -> Self {
        Self {
            flags: EntryFlags {
                language: Some(language),
                ..self.flags
            },
            ..self
        }
    }

    /// Returns the entry's text, if it is a text entry
    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            EntryValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the entry's picture, if it is a picture entry
    pub fn as_picture(&self) -> Option<&Picture> {
        match &self.value {
            EntryValue::Picture(picture) => Some(picture),
            _ => None,
        }
    }

    /// Whether the entry's key matches, ignoring ASCII case
    pub fn is(&self, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key)
    }
}

/// The contents of a tag entry
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntryValue {
    /// Textual content
    Text(String),
    /// An embedded image
    Picture(Picture),
    /// Content preserved byte-for-byte
    ///
    /// Unknown entries are kept this way so that
    /// decoding and re-encoding a tag loses nothing.
    Binary(Vec<u8>),
}

/// Format-specific markers attached to an entry
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EntryFlags {
    /// Text encoding, for formats supporting more than one
    pub encoding: Option<TextEncoding>,
    /// ISO-639-2 language code
    pub language: Option<[u8; 3]>,
    /// Descriptor of user-defined and comment entries
    pub description: Option<String>,
    /// Raw flag bits of the entry's header, if any
    pub raw: u16,
}

/// A text encoding used within a tag
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TextEncoding {
    /// ISO-8859-1
    Latin1,
    /// UTF-16 with byte order mark
    Utf16,
    /// UTF-16, big-endian without byte order mark
    Utf16Be,
    /// UTF-8
    Utf8,
}

impl TextEncoding {
    /// Whether the text can be stored in this encoding without loss
    pub fn can_encode(self, text: &str) -> bool {
        match self {
            Self::Latin1 => text.chars().all(|c| u32::from(c) <= 0xFF),
            Self::Utf16 | Self::Utf16Be | Self::Utf8 => true,
        }
    }

    /// Whether strings in this encoding use 2-byte units
    pub fn is_wide(self) -> bool {
        matches!(self, Self::Utf16 | Self::Utf16Be)
    }
}
