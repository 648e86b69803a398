// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Conversion between metadata records and ID3v2 frames

use super::{FrameFlags, Id3v2Options, Id3v2Tag, Version};
use crate::Error;
use crate::entry::{TagEntry, TextEncoding};
use crate::picture::{CoverArt, LossyConverter, PictureType};
use crate::record::{Field, MetadataRecord, strip_decibels};
use crate::telemetry::{Event, Telemetry};

const TEXT_FRAMES: [(&str, Field); 6] = [
    ("TIT2", Field::Title),
    ("TPE1", Field::Artist),
    ("TALB", Field::Album),
    ("TPE2", Field::AlbumArtist),
    ("TCOM", Field::Composer),
    ("TCON", Field::Genre),
];

const REPLAY_GAIN: [(&str, Field); 4] = [
    ("REPLAYGAIN_TRACK_PEAK", Field::TrackPeak),
    ("REPLAYGAIN_ALBUM_PEAK", Field::AlbumPeak),
    ("REPLAYGAIN_TRACK_GAIN", Field::TrackGain),
    ("REPLAYGAIN_ALBUM_GAIN", Field::AlbumGain),
];

/// Builds a new tag from the record's populated fields
///
/// Returns `None` if the record has nothing to write.
pub(super) fn build(
    record: &MetadataRecord,
    options: &Id3v2Options,
    converter: &dyn LossyConverter,
) -> Result<Option<Id3v2Tag>, Error> {
    let version = match options.version {
        Version::V2_4 => Version::V2_4,
        Version::V2_2 | Version::V2_3 => Version::V2_3,
    };
    let encoding = options.encoding;
    let mut tag = Id3v2Tag::new(version);

    let mut text = |key: &str, value: &str| {
        if !value.is_empty() {
            tag.entries
                .push(TagEntry::text(key, value).encoding(encoding));
        }
    };

    for (key, field) in TEXT_FRAMES {
        text(key, record.get(field));
    }

    let year = record.get(Field::Year);
    let month = record.get(Field::Month);
    let day = record.get(Field::Day);
    let full_date = !year.is_empty() && !month.is_empty() && !day.is_empty();

    // day and month are only meaningful with a year
    match version {
        Version::V2_4 if full_date => text("TDRC", &format!("{year}-{month}-{day}")),
        Version::V2_4 => text("TDRC", year),
        _ => {
            if full_date {
                text("TDAT", &format!("{day}{month}"));
            }
            text("TYER", year);
        }
    }

    match (record.get(Field::TrackNumber), record.get(Field::TrackCount)) {
        ("", _) => {}
        (number, "") => text("TRCK", number),
        (number, count) => text("TRCK", &format!("{number}/{count}")),
    }

    let comment = record.get(Field::Comment);
    if !comment.is_empty() {
        tag.entries.push(
            TagEntry::text("COMM", comment)
                .encoding(encoding)
                .language(*b"eng")
                .description(""),
        );
    }

    for (description, field) in REPLAY_GAIN {
        let value = match record.get(field) {
            "" => continue,
            gain if matches!(field, Field::TrackGain | Field::AlbumGain) => format!("{gain} dB"),
            peak => peak.to_owned(),
        };

        let mut entry = TagEntry::text("TXXX", value)
            .encoding(TextEncoding::Latin1)
            .description(description);
        entry.flags.raw = FrameFlags::file_alter(version).0;
        tag.entries.push(entry);
    }

    if let Some(art) = record.cover_art() {
        tag.entries.push(
            TagEntry::picture("APIC", converter.to_lossy(art)?.to_picture(PictureType::FrontCover))
                .encoding(encoding),
        );
    }

    Ok((!tag.entries.is_empty()).then_some(tag))
}

/// Frame identifiers of ID3v2.2 and their later equivalents
fn canonical(key: &str) -> &str {
    match key {
        "TT2" => "TIT2",
        "TP1" => "TPE1",
        "TAL" => "TALB",
        "TP2" => "TPE2",
        "TCM" => "TCOM",
        "TCO" => "TCON",
        "COM" => "COMM",
        "TYE" => "TYER",
        "TDA" => "TDAT",
        "TRK" => "TRCK",
        "TXX" => "TXXX",
        "PIC" => "APIC",
        key => key,
    }
}

/// Reads the fields a record supports out of a decoded tag
///
/// The first usable value for each field wins.
pub(super) fn to_record(tag: &Id3v2Tag, telemetry: &dyn Telemetry) -> MetadataRecord {
    let mut record = MetadataRecord::default();

    let comments = tag
        .entries
        .iter()
        .filter(|e| canonical(&e.key) == "COMM");
    let comment = comments
        .clone()
        .find(|e| e.flags.description.as_deref().unwrap_or_default().is_empty())
        .or_else(|| comments.clone().next());
    if let Some(text) = comment.and_then(|e| e.as_text()) {
        record.set_lenient(Field::Comment, first_value(text), "COMM", telemetry);
    }

    for entry in &tag.entries {
        let key = canonical(&entry.key);
        let Some(text) = entry.as_text().map(first_value) else {
            continue;
        };

        if let Some((_, field)) = TEXT_FRAMES.iter().find(|(k, _)| *k == key) {
            record.set_lenient(*field, text, key, telemetry);
            continue;
        }

        match key {
            "TYER" => record.set_lenient(Field::Year, text, key, telemetry),
            "TDAT" => {
                if let (Some(day), Some(month)) = (text.get(0..2), text.get(2..4)) {
                    record.set_lenient(Field::Day, day, key, telemetry);
                    record.set_lenient(Field::Month, month, key, telemetry);
                }
            }
            "TDRC" => {
                let date = text.split('T').next().unwrap_or_default();
                let mut parts = date.split('-');
                for field in [Field::Year, Field::Month, Field::Day] {
                    if let Some(part) = parts.next() {
                        record.set_lenient(field, part, key, telemetry);
                    }
                }
            }
            "TRCK" => match text.split_once('/') {
                Some((number, count)) => {
                    record.set_lenient(Field::TrackNumber, number, key, telemetry);
                    record.set_lenient(Field::TrackCount, count, key, telemetry);
                }
                None => record.set_lenient(Field::TrackNumber, text, key, telemetry),
            },
            "TXXX" => {
                let description = entry.flags.description.as_deref().unwrap_or_default();
                if let Some((_, field)) = REPLAY_GAIN
                    .iter()
                    .find(|(d, _)| d.eq_ignore_ascii_case(description))
                {
                    record.set_lenient(*field, strip_decibels(text), description, telemetry);
                }
            }
            _ => {}
        }
    }

    let pictures = tag
        .entries
        .iter()
        .filter_map(|e| e.as_picture().map(|p| (e, p)));
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

/// The first of any NUL-separated values
fn first_value(text: &str) -> &str {
    text.split('\0').next().unwrap_or_default()
}
