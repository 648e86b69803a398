// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The validated, mutable set of metadata fields
//!
//! Every field is stored as text and an empty string
//! always means the field is absent.
//! Numeric fields are validated when assigned and
//! normalized to their canonical form.
//!
//! | Field | Accepted | Stored as |
//! |------:|----------|-----------|
//! | `Day` | 1 to 31 | `"01"` to `"31"` |
//! | `Month` | 1 to 12 | `"01"` to `"12"` |
//! | `Year` | 1000 to 9999, exactly 4 digits | unchanged |
//! | `TrackNumber` | 1 to 99 | `"01"` to `"99"` |
//! | `TrackCount` | 1 to 99 | `"01"` to `"99"` |
//!
//! All other fields are free-form text.

use crate::picture::CoverArt;
use crate::telemetry::{Event, Telemetry};
use std::str::FromStr;

/// A single text field of a [`MetadataRecord`]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Field {
    /// Title of the track
    Title,
    /// Performing artist
    Artist,
    /// Album the track belongs to
    Album,
    /// Artist of the album as a whole
    AlbumArtist,
    /// Composer of the work
    Composer,
    /// Musical genre
    Genre,
    /// Free-form comment
    Comment,
    /// Day of release, 2 digits
    Day,
    /// Month of release, 2 digits
    Month,
    /// Year of release, 4 digits
    Year,
    /// Track number within the album, 2 digits
    TrackNumber,
    /// Total tracks in the album, 2 digits
    TrackCount,
    /// ReplayGain track peak
    TrackPeak,
    /// ReplayGain album peak
    AlbumPeak,
    /// ReplayGain track gain, in dB
    TrackGain,
    /// ReplayGain album gain, in dB
    AlbumGain,
}

impl Field {
    /// Every field, in display order
    pub const ALL: [Self; 16] = [
        Self::Title,
        Self::Artist,
        Self::Album,
        Self::AlbumArtist,
        Self::Composer,
        Self::Genre,
        Self::Comment,
        Self::Day,
        Self::Month,
        Self::Year,
        Self::TrackNumber,
        Self::TrackCount,
        Self::TrackPeak,
        Self::AlbumPeak,
        Self::TrackGain,
        Self::AlbumGain,
    ];

    /// The field's name
    pub fn name(self) -> &'static str {
        match self {
            Self::Title => "Title",
            Self::Artist => "Artist",
            Self::Album => "Album",
            Self::AlbumArtist => "AlbumArtist",
            Self::Composer => "Composer",
            Self::Genre => "Genre",
            Self::Comment => "Comment",
            Self::Day => "Day",
            Self::Month => "Month",
            Self::Year => "Year",
            Self::TrackNumber => "TrackNumber",
            Self::TrackCount => "TrackCount",
            Self::TrackPeak => "TrackPeak",
            Self::AlbumPeak => "AlbumPeak",
            Self::TrackGain => "TrackGain",
            Self::AlbumGain => "AlbumGain",
        }
    }

    /// Validates and normalizes a value for this field
    ///
    /// An empty value is always accepted.
    fn normalize(self, value: &str) -> Result<String, MetadataInvalid> {
        fn two_digits(
            field: Field,
            value: &str,
            max: u32,
            reason: &'static str,
        ) -> Result<String, MetadataInvalid> {
            value
                .bytes()
                .all(|b| b.is_ascii_digit())
                .then(|| value.parse::<u32>().ok())
                .flatten()
                .filter(|v| (1..=max).contains(v))
                .map(|v| format!("{v:02}"))
                .ok_or(MetadataInvalid { field, reason })
        }

        if value.is_empty() {
            return Ok(String::new());
        }

        match self {
            Self::Day => two_digits(self, value, 31, "must be between 1 and 31"),
            Self::Month => two_digits(self, value, 12, "must be between 1 and 12"),
            Self::TrackNumber | Self::TrackCount => {
                two_digits(self, value, 99, "must be between 1 and 99")
            }
            Self::Year => match value.as_bytes() {
                [b'1'..=b'9', rest @ ..]
                    if rest.len() == 3 && rest.iter().all(|b| b.is_ascii_digit()) =>
                {
                    Ok(value.to_owned())
                }
                _ => Err(MetadataInvalid {
                    field: self,
                    reason: "must be between 1000 and 9999",
                }),
            },
            _ => Ok(value.to_owned()),
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.name().fmt(f)
    }
}

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.name().eq_ignore_ascii_case(s))
            .ok_or(UnknownField)
    }
}

/// An error when parsing an unknown field name
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown metadata field")]
pub struct UnknownField;

/// A field was assigned a value violating its format
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{field} {reason}")]
pub struct MetadataInvalid {
    /// The field being assigned
    pub field: Field,
    /// Why the value was rejected
    pub reason: &'static str,
}

/// Mutable metadata about an audio file
///
/// # Example
///
/// ```
/// use tag_splice::record::{Field, MetadataRecord};
///
/// let mut record = MetadataRecord::default();
///
/// record.set(Field::Day, "1").unwrap();
/// assert_eq!(record.get(Field::Day), "01");
///
/// // invalid values are rejected and the old value is kept
/// assert!(record.set(Field::Day, "32").is_err());
/// assert_eq!(record.get(Field::Day), "01");
///
/// // an empty value clears the field
/// record.set(Field::Day, "").unwrap();
/// assert_eq!(record.get(Field::Day), "");
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MetadataRecord {
    title: String,
    artist: String,
    album: String,
    album_artist: String,
    composer: String,
    genre: String,
    comment: String,
    day: String,
    month: String,
    year: String,
    track_number: String,
    track_count: String,
    track_peak: String,
    album_peak: String,
    track_gain: String,
    album_gain: String,
    cover_art: Option<CoverArt>,
}

impl MetadataRecord {
    /// Returns the field's current value
    ///
    /// Absent fields are empty strings.
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::Artist => &self.artist,
            Field::Album => &self.album,
            Field::AlbumArtist => &self.album_artist,
            Field::Composer => &self.composer,
            Field::Genre => &self.genre,
            Field::Comment => &self.comment,
            Field::Day => &self.day,
            Field::Month => &self.month,
            Field::Year => &self.year,
            Field::TrackNumber => &self.track_number,
            Field::TrackCount => &self.track_count,
            Field::TrackPeak => &self.track_peak,
            Field::AlbumPeak => &self.album_peak,
            Field::TrackGain => &self.track_gain,
            Field::AlbumGain => &self.album_gain,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Artist => &mut self.artist,
            Field::Album => &mut self.album,
            Field::AlbumArtist => &mut self.album_artist,
            Field::Composer => &mut self.composer,
            Field::Genre => &mut self.genre,
            Field::Comment => &mut self.comment,
            Field::Day => &mut self.day,
            Field::Month => &mut self.month,
            Field::Year => &mut self.year,
            Field::TrackNumber => &mut self.track_number,
            Field::TrackCount => &mut self.track_count,
            Field::TrackPeak => &mut self.track_peak,
            Field::AlbumPeak => &mut self.album_peak,
            Field::TrackGain => &mut self.track_gain,
            Field::AlbumGain => &mut self.album_gain,
        }
    }

    /// Assigns a new value to the given field
    ///
    /// An empty value clears the field.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is out of range
    /// for a numeric field, leaving the field unchanged.
    pub fn set(&mut self, field: Field, value: &str) -> Result<(), MetadataInvalid> {
        *self.slot_mut(field) = field.normalize(value)?;
        Ok(())
    }

    /// Builder-style variant of [`MetadataRecord::set`]
    ///
    /// # Errors
    ///
    /// Returns an error if the value is invalid for the field.
    pub fn with(mut self, field: Field, value: &str) -> Result<Self, MetadataInvalid> {
        self.set(field, value).map(|()| self)
    }

    /// Returns embedded cover art, if any
    pub fn cover_art(&self) -> Option<&CoverArt> {
        self.cover_art.as_ref()
    }

    /// Replaces embedded cover art, returning the old image
    pub fn set_cover_art(&mut self, cover_art: Option<CoverArt>) -> Option<CoverArt> {
        std::mem::replace(&mut self.cover_art, cover_art)
    }

    /// Resets every field to absent, including cover art
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether every field is absent
    pub fn is_empty(&self) -> bool {
        self.cover_art.is_none() && Field::ALL.into_iter().all(|f| self.get(f).is_empty())
    }

    /// Assigns a value decoded from an existing tag,
    /// unless the field already holds one
    ///
    /// Stored tags may contain anything, so a value
    /// which fails validation leaves the field empty
    /// and is reported to telemetry.
    pub(crate) fn set_lenient(&mut self, field: Field, value: &str, key: &str, telemetry: &dyn Telemetry) {
        if self.get(field).is_empty() && self.set(field, value.trim()).is_err() {
            telemetry.record(Event::Skipped {
                key,
                reason: "invalid value",
            });
        }
    }
}

/// Removes a trailing decibel unit from a gain value
pub(crate) fn strip_decibels(gain: &str) -> &str {
    let gain = gain.trim();
    match gain.len().checked_sub(2).and_then(|i| gain.get(i..).map(|unit| (i, unit))) {
        Some((i, unit)) if unit.eq_ignore_ascii_case("dB") => gain[..i].trim_end(),
        _ => gain,
    }
}
