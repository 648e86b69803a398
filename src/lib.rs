// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A library for persisting audio metadata tags
//!
//! Given a validated [`record::MetadataRecord`] and an audio file
//! which may already contain an embedded tag of unknown size,
//! this crate writes an updated tag while touching as little
//! of the file as possible.
//!
//! | Dialect | Extensions | Tag location |
//! |--------:|-----------:|--------------|
//! | [ID3v2](`id3v2`) | `.mp3` | start of file, ID3v1 trailer stripped |
//! | [FLAC](`flac`) | `.flac` | metadata blocks following the `fLaC` marker |
//!
//! Whenever the new tag fits within the space of the old one,
//! it is overwritten in place and the leftover bytes become padding.
//! Otherwise, the audio payload is moved aside to a temporary buffer,
//! the file is resized and the payload is written back after
//! the new tag.
//!
//! # Example
//!
//! ```
//! use tag_splice::{
//!     persist::Action,
//!     record::{Field, MetadataRecord},
//!     registry::Registry,
//!     settings::Settings,
//!     telemetry::NoTelemetry,
//! };
//! use std::io::Cursor;
//!
//! // an MP3 file with no tag at all
//! let mut mp3 = Cursor::new(vec![0xFF, 0xFB, 0x90, 0x64, 0x00, 0x00]);
//!
//! let mut record = MetadataRecord::default();
//! record.set(Field::Title, "Track Title").unwrap();
//! record.set(Field::TrackNumber, "3").unwrap();
//!
//! let registry = Registry::default();
//! let outcome = registry
//!     .dialect("mp3")
//!     .unwrap()
//!     .write_metadata(&mut mp3, &record, &Settings::default(), &NoTelemetry)
//!     .unwrap();
//!
//! assert_eq!(outcome.action, Action::Rewritten);
//!
//! // the audio payload follows the new tag unchanged
//! let mp3 = mp3.into_inner();
//! assert!(mp3.starts_with(b"ID3"));
//! assert!(mp3.ends_with(&[0xFF, 0xFB, 0x90, 0x64, 0x00, 0x00]));
//! ```

#![warn(missing_docs)]

pub mod entry;
pub mod flac;
pub mod id3v2;
pub mod persist;
pub mod picture;
pub mod record;
pub mod registry;
pub mod settings;
pub mod stream;
pub mod telemetry;
pub mod trailer;

pub use registry::{read_metadata_file, write_metadata_file};

/// A unified error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error during operation
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A record field was given an invalid value
    #[error(transparent)]
    MetadataInvalid(#[from] record::MetadataInvalid),
    /// An existing tag's declared sizes disagree with its contents
    #[error("corrupt tag: {0}")]
    TagCorrupt(&'static str),
    /// No dialect is registered for the file's extension
    #[error("unsupported format \"{0}\"")]
    UnsupportedFormat(String),
    /// A configuration setting is unknown or out of range
    #[error("invalid setting \"{key}\": {reason}")]
    InvalidSetting {
        /// The offending setting's key
        key: String,
        /// Why it was rejected
        reason: &'static str,
    },
    /// An entry's key cannot be stored in the tag
    #[error("invalid entry key \"{0}\"")]
    InvalidEntryKey(String),
    /// Text cannot be represented in its mandatory encoding
    #[error("text not representable in the required encoding")]
    UnencodableText,
    /// A text field is not valid UTF-8
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    /// Cover art could not be embedded
    #[error(transparent)]
    InvalidPicture(#[from] picture::InvalidPicture),
    /// An entry or the tag itself is too large for its size field
    #[error("tag too large for its size field")]
    ExcessiveTagSize,
    /// The FLAC stream marker is missing
    #[error("missing FLAC tag")]
    MissingFlacTag,
    /// The STREAMINFO block is missing or not first
    #[error("STREAMINFO block not first in file")]
    MissingStreaminfo,
    /// More than one STREAMINFO block was found
    #[error("multiple STREAMINFO blocks found in file")]
    MultipleStreaminfo,
    /// An I/O error occurred after the file had already been resized
    ///
    /// The file's contents are indeterminate and no repair is attempted.
    #[error("write interrupted after resizing file: {0}")]
    Interrupted(#[source] std::io::Error),
}

/// Counts the bytes passing through a writer
///
/// Writing into a counted [`std::io::sink`] measures
/// a block's serialized size without performing any I/O.
pub(crate) struct Counter<S> {
    pub(crate) stream: S,
    pub(crate) count: u64,
}

impl<S> Counter<S> {
    pub(crate) fn new(stream: S) -> Self {
        Self { stream, count: 0 }
    }
}

impl<W: std::io::Write> std::io::Write for Counter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf).inspect(|written| {
            self.count += *written as u64;
        })
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}
