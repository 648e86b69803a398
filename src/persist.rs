// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For splicing a newly built tag into an existing file
//!
//! Every supported tag sits at the very start of its file,
//! followed by the audio payload.
//!
//! ```text
//! ┌─────────────────────┬─────────┬──────────────────────┬┄┄┄┄┄┄┄┄┄┄┄┄┄┄╮
//! │ Header and Entries  │ Padding │    Audio Payload     ┆ Legacy Trailer ┆
//! └─────────────────────┴─────────┴──────────────────────┴┄┄┄┄┄┄┄┄┄┄┄┄┄┄╯
//! ╰──────── existing tag length ──╯
//! ```
//!
//! When writing a new tag, one of four things happens:
//!
//! | Existing tag | New tag | Action |
//! |-------------:|--------:|--------|
//! | absent | empty | nothing, the file is untouched |
//! | present | empty | payload moved forward over the old tag |
//! | large enough | any | old tag overwritten in place, leftover space becomes padding |
//! | too small | any | payload moved aside, file resized, new tag written before it |
//!
//! A caller requesting an exact amount of padding always
//! gets a full rewrite, unless the old tag happens to have
//! exactly the requested layout already.

use crate::Counter;
use crate::Error;
use crate::record::MetadataRecord;
use crate::settings::{Padding, SettingInfo, Settings};
use crate::stream::Stream;
use crate::telemetry::{Event, Telemetry};
use std::io::{Read, Seek, SeekFrom, Write};

/// Audio payload up to this size is moved through memory,
/// anything larger spills into an anonymous temporary file
const SPOOL_LIMIT: usize = 16 * 1024 * 1024;

/// The size and layout of a tag already in a file
///
/// Tags handled here always start at offset 0.
/// A `length` of 0 indicates no tag is present.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ExistingTag {
    /// Total bytes occupied by the tag, including padding
    pub length: u64,
    /// Bytes of the tag available as padding
    pub padding: u64,
}

impl ExistingTag {
    /// The tag's offset from the start of the file
    pub const fn offset(&self) -> u64 {
        0
    }

    /// Whether a tag is present
    pub const fn is_present(&self) -> bool {
        self.length > 0
    }
}

/// A tag decoded from an existing file, along with its layout
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Decoded<T> {
    /// The decoded tag
    pub tag: T,
    /// Its size and padding on disk
    pub existing: ExistingTag,
}

/// Typed options for a tag format
pub trait TagOptions: for<'s> TryFrom<&'s Settings, Error = Error> + Default {
    /// The requested padding policy
    fn padding(&self) -> Padding;
}

/// The capabilities of a tag dialect
///
/// Implementations decode an existing tag, build a new tag
/// from a metadata record and encode tags to bytes.
/// Persistence itself is handled by [`write_tag`].
pub trait TagFormat {
    /// A decoded or newly built tag
    type Tag;

    /// Options recognized by the dialect
    type Options: TagOptions;

    /// The dialect's name
    const NAME: &'static str;

    /// File extensions the dialect handles, without leading dot
    const EXTENSIONS: &'static [&'static str];

    /// Settings the dialect recognizes
    const SETTINGS: &'static [(&'static str, SettingInfo)];

    /// Padding bytes written when rewriting without an explicit request
    const DEFAULT_PADDING: u64;

    /// Whether files of this dialect may end with an ID3v1 trailer
    const LEGACY_TRAILER: bool = false;

    /// Decodes the tag at the start of the reader
    ///
    /// Returns `Ok(None)` if no tag is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TagCorrupt`] if the tag's declared
    /// sizes are inconsistent with its contents,
    /// or passes along any I/O error.
    fn decode_existing<R: Read>(&self, r: R) -> Result<Option<Decoded<Self::Tag>>, Error>;

    /// Builds a new tag from the given record
    ///
    /// Returns `Ok(None)` if there is nothing to write.
    ///
    /// # Errors
    ///
    /// Returns an error if the record's contents cannot
    /// be represented in the dialect.
    fn build_entries(
        &self,
        record: &MetadataRecord,
        options: &Self::Options,
        existing: Option<&Self::Tag>,
        telemetry: &dyn Telemetry,
    ) -> Result<Option<Self::Tag>, Error>;

    /// Converts a decoded tag back to a metadata record
    fn to_record(&self, tag: &Self::Tag, telemetry: &dyn Telemetry) -> MetadataRecord;

    /// Number of entries in the tag
    fn entry_count(&self, tag: &Self::Tag) -> usize;

    /// Encodes the tag followed by the given padding bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the tag is too large for its
    /// size fields, or passes along any I/O error.
    fn encode_block<W: Write>(&self, tag: &Self::Tag, padding: u64, w: W) -> Result<(), Error>;

    /// Whether the given number of bytes can be expressed as padding
    fn padding_fits(&self, _free: u64) -> bool {
        true
    }

    /// The tag's size without padding, computed without any I/O
    ///
    /// # Errors
    ///
    /// Returns an error if the tag cannot be encoded.
    fn tag_size(&self, tag: &Self::Tag) -> Result<u64, Error> {
        let mut counter = Counter::new(std::io::sink());
        self.encode_block(tag, 0, &mut counter)?;
        Ok(counter.count)
    }
}

/// What persistence did to the file
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Action {
    /// Nothing was written
    ///
    /// Either no tag was present and none was needed,
    /// or the new tag was byte-identical to the old one.
    Unchanged,
    /// The old tag was removed and the payload moved forward
    Removed,
    /// The old tag was overwritten in place
    Overwritten,
    /// The payload was moved and the file rebuilt
    Rewritten,
}

/// A decision on how to write a new tag
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Plan {
    /// No tag exists and none is needed
    NoExistingTag,
    /// The new tag fits in the old tag's space
    TagFitsInPlace {
        /// Padding filling the rest of the old tag's space
        padding: u64,
    },
    /// The payload must be relocated
    ///
    /// With no new tag, the old one is simply removed.
    TagRequiresFullRewrite {
        /// Padding following the new tag
        padding: u64,
    },
}

/// Decides how a new tag of `size` bytes (excluding padding)
/// replaces an existing tag
///
/// `size` of `None` indicates there is nothing to write.
/// `padding_fits` indicates whether a number of leftover
/// bytes can be expressed as padding by the dialect.
///
/// # Example
///
/// ```
/// use tag_splice::persist::{plan, ExistingTag, Plan};
/// use tag_splice::settings::Padding;
///
/// let existing = ExistingTag { length: 1000, padding: 500 };
///
/// // reuse the old tag's space when the new tag fits
/// assert_eq!(
///     plan(existing, Some(900), Padding::Reuse, 2048, |_| true),
///     Plan::TagFitsInPlace { padding: 100 },
/// );
///
/// // or rewrite with default padding when it doesn't
/// assert_eq!(
///     plan(existing, Some(1001), Padding::Reuse, 2048, |_| true),
///     Plan::TagRequiresFullRewrite { padding: 2048 },
/// );
///
/// // exact padding requests are honored exactly
/// assert_eq!(
///     plan(existing, Some(900), Padding::Exact(0), 2048, |_| true),
///     Plan::TagRequiresFullRewrite { padding: 0 },
/// );
/// ```
pub fn plan(
    existing: ExistingTag,
    size: Option<u64>,
    padding: Padding,
    default_padding: u64,
    padding_fits: impl Fn(u64) -> bool,
) -> Plan {
    match (size, padding) {
        (None, _) if !existing.is_present() => Plan::NoExistingTag,
        (None, _) => Plan::TagRequiresFullRewrite { padding: 0 },
        (Some(size), Padding::Reuse) => match existing.length.checked_sub(size) {
            Some(free) if existing.is_present() && padding_fits(free) => {
                Plan::TagFitsInPlace { padding: free }
            }
            _ => Plan::TagRequiresFullRewrite {
                padding: default_padding,
            },
        },
        (Some(size), Padding::Exact(requested)) => {
            let requested = u64::from(requested);
            if existing.is_present() && size + requested == existing.length {
                Plan::TagFitsInPlace { padding: requested }
            } else {
                Plan::TagRequiresFullRewrite { padding: requested }
            }
        }
    }
}

/// The result of persisting a tag
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Outcome {
    /// What was done to the file
    pub action: Action,
    /// Total size of the tag now at the start of the file,
    /// including padding, which is where the payload begins
    pub tag_size: u64,
    /// Whether a legacy trailer was removed from the end
    pub trailer_removed: bool,
}

/// Writes the record as a new tag into the stream
///
/// The stream is probed for an existing tag, which is
/// then overwritten, replaced or removed as needed.
/// Afterward, the stream is positioned at the start of
/// the audio payload.
///
/// The stream must not be modified by anyone else
/// for the duration of the call.
///
/// # Errors
///
/// Errors which occur before the stream is first modified
/// leave it untouched.
/// I/O errors after the stream has been resized are returned
/// as [`Error::Interrupted`] and leave the stream's contents
/// indeterminate.
pub fn write_tag<F, S>(
    format: &F,
    mut stream: S,
    record: &MetadataRecord,
    options: &F::Options,
    telemetry: &dyn Telemetry,
) -> Result<Outcome, Error>
where
    F: TagFormat,
    S: Stream,
{
    stream.rewind()?;
    let decoded = format.decode_existing(std::io::BufReader::new(&mut stream))?;
    let existing = decoded.as_ref().map(|d| d.existing).unwrap_or_default();

    telemetry.record(Event::Probed {
        dialect: F::NAME,
        length: existing.length,
        padding: existing.padding,
    });

    let tag = format.build_entries(record, options, decoded.as_ref().map(|d| &d.tag), telemetry)?;

    let size = tag.as_ref().map(|t| format.tag_size(t)).transpose()?;

    if let (Some(tag), Some(size)) = (&tag, size) {
        telemetry.record(Event::Built {
            dialect: F::NAME,
            entries: format.entry_count(tag),
            size,
        });
    }

    let (action, tag_size) = match (
        plan(existing, size, options.padding(), F::DEFAULT_PADDING, |free| {
            format.padding_fits(free)
        }),
        tag,
    ) {
        (Plan::NoExistingTag, _) => (Action::Unchanged, 0),
        (_, None) => {
            telemetry.record(Event::Decided {
                action: Action::Removed,
                padding: 0,
            });
            relocate_payload(&mut stream, existing.length, &[], telemetry)?;
            (Action::Removed, 0)
        }
        (Plan::TagFitsInPlace { padding }, Some(tag)) => {
            let mut block = Vec::new();
            format.encode_block(&tag, padding, &mut block)?;
            debug_assert_eq!(block.len() as u64, existing.length);

            if region_matches(&mut stream, &block)? {
                (Action::Unchanged, existing.length)
            } else {
                telemetry.record(Event::Decided {
                    action: Action::Overwritten,
                    padding,
                });
                stream.rewind()?;
                stream.write_all(&block)?;
                stream.flush()?;
                (Action::Overwritten, existing.length)
            }
        }
        (Plan::TagRequiresFullRewrite { padding }, Some(tag)) => {
            let mut block = Vec::new();
            format.encode_block(&tag, padding, &mut block)?;
            telemetry.record(Event::Decided {
                action: Action::Rewritten,
                padding,
            });
            relocate_payload(&mut stream, existing.length, &block, telemetry)?;
            (Action::Rewritten, block.len() as u64)
        }
    };

    let trailer_removed = F::LEGACY_TRAILER && crate::trailer::strip(&mut stream, tag_size)?;
    if trailer_removed {
        telemetry.record(Event::TrailerStripped);
    }

    stream.seek(SeekFrom::Start(tag_size))?;

    Ok(Outcome {
        action,
        tag_size,
        trailer_removed,
    })
}

/// Reads the tag at the start of the stream as a metadata record
///
/// A stream without a tag yields an empty record.
///
/// # Errors
///
/// Returns an error if the existing tag is corrupt
/// or passes along any I/O error.
pub fn read_tag<F, S>(format: &F, mut stream: S, telemetry: &dyn Telemetry) -> Result<MetadataRecord, Error>
where
    F: TagFormat,
    S: Stream,
{
    stream.rewind()?;
    Ok(format
        .decode_existing(std::io::BufReader::new(&mut stream))?
        .map(|decoded| format.to_record(&decoded.tag, telemetry))
        .unwrap_or_default())
}

/// Probes the stream for an existing tag's layout
///
/// # Errors
///
/// Returns an error if the existing tag is corrupt
/// or passes along any I/O error.
pub fn probe_tag<F, S>(format: &F, mut stream: S) -> Result<ExistingTag, Error>
where
    F: TagFormat,
    S: Stream,
{
    stream.rewind()?;
    Ok(format
        .decode_existing(std::io::BufReader::new(&mut stream))?
        .map(|decoded| decoded.existing)
        .unwrap_or_default())
}

/// Whether the start of the stream already holds exactly `block`
fn region_matches<S: Stream>(stream: &mut S, block: &[u8]) -> Result<bool, Error> {
    let mut existing = vec![0; block.len()];
    stream.rewind()?;
    Ok(crate::stream::read_fully(stream, &mut existing)? && existing == block)
}

/// Replaces the first `old_length` bytes of the stream with `block`,
/// moving the rest of the stream through a temporary buffer
///
/// The buffer is released on every exit path.
fn relocate_payload<S: Stream>(
    stream: &mut S,
    old_length: u64,
    block: &[u8],
    telemetry: &dyn Telemetry,
) -> Result<(), Error> {
    let mut payload = tempfile::SpooledTempFile::new(SPOOL_LIMIT);

    // nothing destructive happens until the payload is safely copied
    stream.seek(SeekFrom::Start(old_length))?;
    let payload_len = std::io::copy(stream, &mut payload)?;
    payload.rewind()?;

    telemetry.record(Event::PayloadMoved { bytes: payload_len });

    let mut splice = || -> std::io::Result<()> {
        stream.set_len(block.len() as u64 + payload_len)?;
        stream.rewind()?;
        stream.write_all(block)?;
        std::io::copy(&mut payload, stream)?;
        stream.flush()
    };

    splice().map_err(Error::Interrupted)
}
