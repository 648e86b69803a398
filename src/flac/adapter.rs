// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Conversion between metadata records and Vorbis comment fields

use super::FlacTag;
use crate::entry::TagEntry;
use crate::picture::{CoverArt, PictureType};
use crate::record::{Field, MetadataRecord, strip_decibels};
use crate::telemetry::{Event, Telemetry};

const TEXT_FIELDS: [(&str, Field); 7] = [
    ("TITLE", Field::Title),
    ("ARTIST", Field::Artist),
    ("ALBUM", Field::Album),
    ("ALBUMARTIST", Field::AlbumArtist),
    ("COMPOSER", Field::Composer),
    ("GENRE", Field::Genre),
    ("DESCRIPTION", Field::Comment),
];

const REPLAY_GAIN: [(&str, Field); 4] = [
    ("REPLAYGAIN_TRACK_PEAK", Field::TrackPeak),
    ("REPLAYGAIN_ALBUM_PEAK", Field::AlbumPeak),
    ("REPLAYGAIN_TRACK_GAIN", Field::TrackGain),
    ("REPLAYGAIN_ALBUM_GAIN", Field::AlbumGain),
];

/// Builds comment and picture entries from the record's populated fields
pub(super) fn build(record: &MetadataRecord) -> Vec<TagEntry> {
    let mut entries = vec![];
    let mut field = |key: &str, value: &str| {
        if !value.is_empty() {
            entries.push(TagEntry::text(key, value));
        }
    };

    for (key, f) in TEXT_FIELDS {
        field(key, record.get(f));
    }

    match (
        record.get(Field::Year),
        record.get(Field::Month),
        record.get(Field::Day),
    ) {
        ("", _, _) => {}
        (year, "", _) | (year, _, "") => field("YEAR", year),
        (year, month, day) => field("DATE", &format!("{year}-{month}-{day}")),
    }

    match (record.get(Field::TrackNumber), record.get(Field::TrackCount)) {
        ("", "") => {}
        ("", count) => field("TRACKTOTAL", count),
        (number, "") => field("TRACKNUMBER", number),
        (number, count) => field("TRACKNUMBER", &format!("{number}/{count}")),
    }

    for (key, f) in REPLAY_GAIN {
        match record.get(f) {
            "" => {}
            gain if matches!(f, Field::TrackGain | Field::AlbumGain) => {
                field(key, &format!("{gain} dB"));
            }
            peak => field(key, peak),
        }
    }

    if let Some(art) = record.cover_art() {
        entries.push(TagEntry::picture(
            FlacTag::PICTURE,
            art.to_picture(PictureType::FrontCover),
        ));
    }

    entries
}

/// Reads the fields a record supports out of decoded metadata blocks
///
/// The first usable value for each field wins.
pub(super) fn to_record(tag: &FlacTag, telemetry: &dyn Telemetry) -> MetadataRecord {
    let mut record = MetadataRecord::default();

    for entry in &tag.entries {
        let Some(value) = entry.as_text() else {
            continue;
        };
        let key = entry.key.to_ascii_uppercase();

        if let Some((_, field)) = TEXT_FIELDS.iter().find(|(k, _)| *k == key) {
            record.set_lenient(*field, value, &entry.key, telemetry);
            continue;
        }
        if let Some((_, field)) = REPLAY_GAIN.iter().find(|(k, _)| *k == key) {
            record.set_lenient(*field, strip_decibels(value), &entry.key, telemetry);
            continue;
        }

        match key.as_str() {
            "COMMENT" => record.set_lenient(Field::Comment, value, &entry.key, telemetry),
            "DATE" => match full_date(value) {
                Some((year, month, day)) => {
                    record.set_lenient(Field::Year, year, &entry.key, telemetry);
                    record.set_lenient(Field::Month, month, &entry.key, telemetry);
                    record.set_lenient(Field::Day, day, &entry.key, telemetry);
                }
                None => record.set_lenient(Field::Year, value, &entry.key, telemetry),
            },
            "YEAR" => record.set_lenient(Field::Year, value, &entry.key, telemetry),
            "TRACKNUMBER" => match value.split_once('/') {
                Some((number, count)) => {
                    record.set_lenient(Field::TrackNumber, number, &entry.key, telemetry);
                    record.set_lenient(Field::TrackCount, count, &entry.key, telemetry);
                }
                None => record.set_lenient(Field::TrackNumber, value, &entry.key, telemetry),
            },
            "TRACKTOTAL" | "TRACKCOUNT" | "TOTALTRACKS" => {
                record.set_lenient(Field::TrackCount, value, &entry.key, telemetry)
            }
            _ => {}
        }
    }

    let pictures = tag.entries.iter().filter_map(|e| e.as_picture().map(|p| (e, p)));
    if let Some((entry, picture)) = pictures
        .clone()
        .find(|(_, p)| p.picture_type == PictureType::FrontCover)
        .or_else(|| pictures.clone().next())
    {
        match CoverArt::try_from(picture) {
            Ok(art) => {
                record.set_cover_art(Some(art));
            }
            Err(_) => telemetry.record(Event::Skipped {
                key: &entry.key,
                reason: "unrecognized image format",
            }),
        }
    }

    record
}

/// Splits a `YYYY-MM-DD` date into its parts
fn full_date(date: &str) -> Option<(&str, &str, &str)> {
    let date = date.get(..10)?;
    let (year, rest) = date.split_once('-')?;
    let (month, day) = rest.split_once('-')?;
    (year.len() == 4 && month.len() == 2 && day.len() == 2).then_some((year, month, day))
}
