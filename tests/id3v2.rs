// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod common;

use std::cell::RefCell;
use std::io::{Cursor, Seek};
use tag_splice::Error;
use tag_splice::entry::{EntryValue, TextEncoding};
use tag_splice::id3v2::{Id3v2, Id3v2Options, Id3v2Tag, Version};
use tag_splice::persist::{Action, Outcome, probe_tag, read_tag, write_tag};
use tag_splice::picture::{CoverArt, InvalidPicture, LossyConverter, Passthrough};
use tag_splice::record::{Field, MetadataRecord};
use tag_splice::telemetry::{Event, NoTelemetry, Telemetry};

fn id3v2() -> Id3v2 {
    Id3v2::with_converter(Box::new(Passthrough))
}

fn write(file: &mut Vec<u8>, record: &MetadataRecord, options: Id3v2Options) -> Result<Outcome, Error> {
    write_tag(&id3v2(), Cursor::new(file), record, &options, &NoTelemetry)
}

fn read(file: &mut Vec<u8>) -> MetadataRecord {
    read_tag(&id3v2(), Cursor::new(file), &NoTelemetry).unwrap()
}

fn decode(file: &[u8]) -> Id3v2Tag {
    Id3v2Tag::read(file).unwrap().unwrap().tag
}

/// Size of the record's tag without any padding
fn tag_size(record: &MetadataRecord, options: Id3v2Options) -> u64 {
    let mut file = vec![];
    write(&mut file, record, options.no_padding()).unwrap().tag_size
}

/// A file whose existing tag occupies exactly `length` bytes
fn file_with_tag_length(length: usize, payload: &[u8]) -> Vec<u8> {
    // a TIT2 frame holding "x" occupies 22 bytes with its header
    let mut file = common::id3v23(&[(b"TIT2", &b"\x00x"[..])], length - 22);
    assert_eq!(file.len(), length);
    file.extend(payload);
    file
}

#[derive(Default)]
struct Recorder(RefCell<Vec<Action>>);

impl Telemetry for Recorder {
    fn record(&self, event: Event<'_>) {
        if let Event::Decided { action, .. } = event {
            self.0.borrow_mut().push(action);
        }
    }
}

#[test]
fn test_round_trip() {
    let record = common::full_record();

    for options in [
        Id3v2Options::default(),
        Id3v2Options::default().version(Version::V2_4),
        Id3v2Options::default().encoding(TextEncoding::Utf16),
        Id3v2Options::default()
            .version(Version::V2_4)
            .encoding(TextEncoding::Utf16),
    ] {
        let payload = common::payload(1000);
        let mut file = payload.clone();

        let outcome = write(&mut file, &record, options).unwrap();
        assert_eq!(outcome.action, Action::Rewritten);
        assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());
        assert_eq!(read(&mut file), record);
    }
}

#[test]
fn test_wide_text() {
    let record = MetadataRecord::default()
        .with(Field::Artist, "Björk ☃")
        .unwrap()
        .with(Field::Title, "日本語")
        .unwrap();

    let mut file = common::payload(100);
    write(
        &mut file,
        &record,
        Id3v2Options::default().encoding(TextEncoding::Utf16),
    )
    .unwrap();
    assert_eq!(read(&mut file), record);

    // Latin-1 is never silently swapped for another encoding
    let mut file = common::payload(100);
    let original = file.clone();
    assert!(matches!(
        write(&mut file, &record, Id3v2Options::default()),
        Err(Error::UnencodableText)
    ));
    assert_eq!(file, original);
}

#[test]
fn test_replay_gain_always_latin1() {
    let record = MetadataRecord::default()
        .with(Field::TrackGain, "-6.5")
        .unwrap()
        .with(Field::TrackPeak, "0.988")
        .unwrap();

    let mut file = common::payload(100);
    write(
        &mut file,
        &record,
        Id3v2Options::default().encoding(TextEncoding::Utf16),
    )
    .unwrap();

    let tag = decode(&file);
    let gain = tag
        .entries
        .iter()
        .find(|e| e.flags.description.as_deref() == Some("REPLAYGAIN_TRACK_GAIN"))
        .unwrap();
    assert_eq!(gain.as_text(), Some("-6.5 dB"));
    assert_eq!(gain.flags.encoding, Some(TextEncoding::Latin1));

    let peak = tag
        .entries
        .iter()
        .find(|e| e.flags.description.as_deref() == Some("REPLAYGAIN_TRACK_PEAK"))
        .unwrap();
    assert_eq!(peak.as_text(), Some("0.988"));

    // the unit is stripped again on read
    assert_eq!(read(&mut file), record);

    // but a gain which can't be stored as Latin-1 is an error
    let record = MetadataRecord::default()
        .with(Field::AlbumGain, "−7.25")
        .unwrap();
    let mut file = common::payload(100);
    assert!(matches!(
        write(
            &mut file,
            &record,
            Id3v2Options::default().encoding(TextEncoding::Utf16)
        ),
        Err(Error::UnencodableText)
    ));
}

#[test]
fn test_date_frames() {
    let full = MetadataRecord::default()
        .with(Field::Year, "2004")
        .unwrap()
        .with(Field::Month, "5")
        .unwrap()
        .with(Field::Day, "7")
        .unwrap();

    let mut file = common::payload(100);
    write(&mut file, &full, Id3v2Options::default()).unwrap();
    let tag = decode(&file);
    assert_eq!(tag.get("TYER").and_then(|e| e.as_text()), Some("2004"));
    assert_eq!(tag.get("TDAT").and_then(|e| e.as_text()), Some("0705"));
    assert_eq!(read(&mut file), full);

    let mut file = common::payload(100);
    write(&mut file, &full, Id3v2Options::default().version(Version::V2_4)).unwrap();
    let tag = decode(&file);
    assert_eq!(tag.get("TDRC").and_then(|e| e.as_text()), Some("2004-05-07"));
    assert!(tag.get("TYER").is_none());
    assert_eq!(read(&mut file), full);
}

#[test]
fn test_partial_date_drops_month() {
    // documented behavior: a month without a day is only
    // stored when the full date is known
    let record = MetadataRecord::default()
        .with(Field::Year, "2004")
        .unwrap()
        .with(Field::Month, "5")
        .unwrap();

    for version in [Version::V2_3, Version::V2_4] {
        let mut file = common::payload(100);
        write(&mut file, &record, Id3v2Options::default().version(version)).unwrap();

        let read_back = read(&mut file);
        assert_eq!(read_back.get(Field::Year), "2004");
        assert_eq!(read_back.get(Field::Month), "");
    }
}

#[test]
fn test_cover_art() {
    let mut record = common::record_with(Field::Title, "Title");
    record.set_cover_art(Some(CoverArt::new(common::jpeg()).unwrap()));

    let mut file = common::payload(100);
    write(&mut file, &record, Id3v2Options::default()).unwrap();
    assert_eq!(read(&mut file), record);
    assert_eq!(
        read(&mut file).cover_art().map(|art| art.media_type()),
        Some("image/jpeg")
    );
}

#[test]
fn test_lossy_conversion() {
    struct AlwaysJpeg;

    impl LossyConverter for AlwaysJpeg {
        fn to_lossy(&self, _art: &CoverArt) -> Result<CoverArt, InvalidPicture> {
            CoverArt::new(common::jpeg())
        }
    }

    let mut record = MetadataRecord::default();
    record.set_cover_art(Some(CoverArt::new(common::bmp()).unwrap()));

    let mut file = common::payload(100);
    write_tag(
        &Id3v2::with_converter(Box::new(AlwaysJpeg)),
        Cursor::new(&mut file),
        &record,
        &Id3v2Options::default(),
        &NoTelemetry,
    )
    .unwrap();

    let art = read(&mut file).cover_art().cloned().unwrap();
    assert_eq!(art.media_type(), "image/jpeg");
    assert_eq!((art.width(), art.height()), (2, 1));
}

#[test]
fn test_in_place_boundaries() {
    let record = common::record_with(Field::Artist, "Artist");
    let required = tag_size(&record, Id3v2Options::default());
    assert_eq!(required, 27);

    let payload = common::payload(5000);

    // one byte too small
    let mut file = file_with_tag_length(required as usize - 1, &payload);
    let outcome = write(&mut file, &record, Id3v2Options::default()).unwrap();
    assert_eq!(outcome.action, Action::Rewritten);
    assert_eq!(outcome.tag_size, required + 2048);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());

    // exactly large enough
    let mut file = file_with_tag_length(required as usize, &payload);
    let outcome = write(&mut file, &record, Id3v2Options::default()).unwrap();
    assert_eq!(outcome.action, Action::Overwritten);
    assert_eq!(outcome.tag_size, required);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());

    // leftover space becomes padding
    let mut file = file_with_tag_length(required as usize + 100, &payload);
    let outcome = write(&mut file, &record, Id3v2Options::default()).unwrap();
    assert_eq!(outcome.action, Action::Overwritten);
    assert_eq!(outcome.tag_size, required + 100);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());
    let existing = probe_tag(&id3v2(), Cursor::new(&mut file)).unwrap();
    assert_eq!(existing.length, required + 100);
    assert_eq!(existing.padding, 100);
    assert_eq!(read(&mut file), record);
}

#[test]
fn test_exact_padding() {
    let record = common::full_record();
    let required = tag_size(&record, Id3v2Options::default());
    let payload = common::payload(3000);

    for padding in [0, 2048, 16_777_216] {
        let mut file = payload.clone();
        let outcome = write(&mut file, &record, Id3v2Options::default().padding(padding)).unwrap();
        assert_eq!(outcome.tag_size, required + u64::from(padding));
        assert_eq!(file.len() as u64, outcome.tag_size + payload.len() as u64);

        let existing = probe_tag(&id3v2(), Cursor::new(&mut file)).unwrap();
        assert_eq!(existing.padding, u64::from(padding));
        assert!(file[required as usize..outcome.tag_size as usize]
            .iter()
            .all(|b| *b == 0));
    }

    // exact padding rewrites even when the tag would fit
    let mut file = file_with_tag_length(required as usize + 500, &payload);
    let outcome = write(&mut file, &record, Id3v2Options::default().padding(10)).unwrap();
    assert_eq!(outcome.action, Action::Rewritten);
    assert_eq!(outcome.tag_size, required + 10);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());

    // unless the layout is already exactly what was asked for
    let outcome = write(&mut file, &record, Id3v2Options::default().padding(10)).unwrap();
    assert_eq!(outcome.action, Action::Unchanged);
}

#[test]
fn test_idempotent() {
    let record = common::full_record();
    let mut file = common::payload(10_000);

    assert_eq!(
        write(&mut file, &record, Id3v2Options::default()).unwrap().action,
        Action::Rewritten
    );
    let first = md5::compute(&file);

    let recorder = Recorder::default();
    let outcome = write_tag(
        &id3v2(),
        Cursor::new(&mut file),
        &record,
        &Id3v2Options::default(),
        &recorder,
    )
    .unwrap();
    assert_eq!(outcome.action, Action::Unchanged);
    assert!(recorder.0.borrow().is_empty());
    assert_eq!(md5::compute(&file), first);
}

#[test]
fn test_removal() {
    let payload = common::payload(2000);
    let mut file = payload.clone();
    write(&mut file, &common::full_record(), Id3v2Options::default()).unwrap();
    assert_ne!(file, payload);

    let outcome = write(&mut file, &MetadataRecord::default(), Id3v2Options::default()).unwrap();
    assert_eq!(outcome.action, Action::Removed);
    assert_eq!(outcome.tag_size, 0);
    assert_eq!(file, payload);

    // nothing to remove
    let outcome = write(&mut file, &MetadataRecord::default(), Id3v2Options::default()).unwrap();
    assert_eq!(outcome.action, Action::Unchanged);
    assert_eq!(file, payload);
}

#[test]
fn test_legacy_trailer() {
    let record = common::full_record();
    let payload = common::payload(4000);

    // stripped on rewrite
    let mut file = payload.clone();
    file.extend(common::trailer());
    let outcome = write(&mut file, &record, Id3v2Options::default()).unwrap();
    assert!(outcome.trailer_removed);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());

    // stripped on overwrite in place
    file.extend(common::trailer());
    let outcome = write(
        &mut file,
        &common::record_with(Field::Title, "T"),
        Id3v2Options::default(),
    )
    .unwrap();
    assert_eq!(outcome.action, Action::Overwritten);
    assert!(outcome.trailer_removed);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());

    // stripped even when there's no tag to write
    let mut file = payload.clone();
    file.extend(common::trailer());
    let outcome = write(&mut file, &MetadataRecord::default(), Id3v2Options::default()).unwrap();
    assert_eq!(outcome.action, Action::Unchanged);
    assert!(outcome.trailer_removed);
    assert_eq!(file, payload);

    // and absent trailers are left alone
    let outcome = write(&mut file, &record, Id3v2Options::default()).unwrap();
    assert!(!outcome.trailer_removed);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());
}

#[test]
fn test_removal_with_trailer() {
    let payload = common::payload(2000);
    let mut file = payload.clone();
    write(&mut file, &common::full_record(), Id3v2Options::default()).unwrap();
    file.extend(common::trailer());

    let existing = probe_tag(&id3v2(), Cursor::new(&mut file)).unwrap();
    let len_before = file.len() as u64;

    let outcome = write(&mut file, &MetadataRecord::default(), Id3v2Options::default()).unwrap();
    assert_eq!(outcome.action, Action::Removed);
    assert!(outcome.trailer_removed);
    assert_eq!(len_before - file.len() as u64, existing.length + 128);
    assert_eq!(file, payload);
}

#[test]
fn test_trailer_marker_inside_tag() {
    // the final 128 bytes of the file are the tail of a title
    // which happens to start with the trailer's marker
    let title = format!("TAG{}", "x".repeat(125));
    let record = common::record_with(Field::Title, &title);

    let mut file = vec![];
    let outcome = write(&mut file, &record, Id3v2Options::default().no_padding()).unwrap();
    assert_eq!(outcome.action, Action::Rewritten);
    assert!(!outcome.trailer_removed);
    assert_eq!(file.len() as u64, outcome.tag_size);
    assert_eq!(read(&mut file), record);

    // a genuine trailer after the tag is still removed
    file.extend(common::trailer());
    let outcome = write(&mut file, &record, Id3v2Options::default().no_padding()).unwrap();
    assert_eq!(outcome.action, Action::Unchanged);
    assert!(outcome.trailer_removed);
    assert_eq!(file.len() as u64, outcome.tag_size);
    assert_eq!(read(&mut file), record);
}

#[test]
fn test_excessive_padding() {
    let payload = common::payload(100);
    let mut file = payload.clone();
    assert!(matches!(
        write(
            &mut file,
            &common::full_record(),
            Id3v2Options::default().padding(1 << 28),
        ),
        Err(Error::ExcessiveTagSize)
    ));
    assert_eq!(file, payload);
}

#[test]
fn test_stream_position() {
    let mut cursor = Cursor::new(common::payload(500));
    let outcome = write_tag(
        &id3v2(),
        &mut cursor,
        &common::full_record(),
        &Id3v2Options::default(),
        &NoTelemetry,
    )
    .unwrap();
    assert_eq!(cursor.stream_position().unwrap(), outcome.tag_size);
}

#[test]
fn test_corrupt_tag() {
    let payload = common::payload(100);
    let record = common::full_record();

    // declared tag size runs past the end of the stream
    let mut file = b"ID3\x03\x00\x00".to_vec();
    file.extend(common::synchsafe(1000));
    file.extend(&payload);
    let original = file.clone();
    assert!(matches!(
        write(&mut file, &record, Id3v2Options::default()),
        Err(Error::TagCorrupt(_))
    ));
    assert_eq!(file, original);

    // frame size runs past the end of the tag
    let mut file = common::id3v23(&[(b"TIT2", &b"\x00Title"[..])], 0);
    file[17] = 0x7F;
    file.extend(&payload);
    let original = file.clone();
    assert!(matches!(
        write(&mut file, &record, Id3v2Options::default()),
        Err(Error::TagCorrupt(_))
    ));
    assert_eq!(file, original);

    // largest declared size on a stream holding nothing after the header
    let mut file = b"ID3\x03\x00\x00".to_vec();
    file.extend(common::synchsafe(tag_splice::id3v2::Synchsafe::MAX));
    assert!(matches!(
        Id3v2Tag::read(file.as_slice()),
        Err(Error::TagCorrupt(_))
    ));

    // size bytes with their high bit set aren't synchsafe
    let mut file = common::id3v23(&[(b"TIT2", &b"\x00Title"[..])], 10);
    file[9] |= 0x80;
    file.extend(&payload);
    assert!(matches!(
        read_tag(&id3v2(), Cursor::new(&mut file), &NoTelemetry),
        Err(Error::TagCorrupt(_))
    ));
}

#[test]
fn test_unknown_frames_preserved_by_codec() {
    let tag = common::id3v23(
        &[
            (b"PRIV", &b"owner\x00\x01\x02\x03"[..]),
            (b"TIT2", &b"\x00Title"[..]),
        ],
        32,
    );

    let decoded = Id3v2Tag::read(tag.as_slice()).unwrap().unwrap();
    assert_eq!(decoded.existing.length, tag.len() as u64);
    assert_eq!(decoded.existing.padding, 32);
    assert_eq!(
        decoded.tag.entries[0].value,
        EntryValue::Binary(b"owner\x00\x01\x02\x03".to_vec())
    );
    assert_eq!(decoded.tag.get("TIT2").and_then(|e| e.as_text()), Some("Title"));

    let mut encoded = vec![];
    decoded.tag.write(decoded.existing.padding, &mut encoded).unwrap();
    assert_eq!(encoded, tag);
}

#[test]
fn test_unsynchronised_tag() {
    // 0xFF 0x00 pairs in an unsynchronised tag lose their 0x00
    let mut tag = b"ID3\x03\x00\x80".to_vec();
    let mut body = b"TIT2\x00\x00\x00\x03\x00\x00\x00\xFF\x00\xE0".to_vec();
    body.resize(body.len() + 4, 0);
    tag.extend(common::synchsafe(body.len() as u32));
    tag.extend(body);

    let decoded = Id3v2Tag::read(tag.as_slice()).unwrap().unwrap();
    assert_eq!(decoded.existing.length, tag.len() as u64);
    assert_eq!(decoded.tag.get("TIT2").and_then(|e| e.as_text()), Some("\u{FF}\u{E0}"));
}

#[test]
fn test_ancient_tag() {
    // ID3v2.2 tags are read, but written as ID3v2.3
    let mut body = b"TT2\x00\x00\x06\x00Title".to_vec();
    body.extend(b"TP1\x00\x00\x07\x00Artist");
    body.resize(body.len() + 20, 0);
    let mut file = b"ID3\x02\x00\x00".to_vec();
    file.extend(common::synchsafe(body.len() as u32));
    file.extend(body);
    let payload = common::payload(300);
    file.extend(&payload);

    let record = read(&mut file);
    assert_eq!(record.get(Field::Title), "Title");
    assert_eq!(record.get(Field::Artist), "Artist");

    write(
        &mut file,
        &record.clone().with(Field::Album, "Album").unwrap(),
        Id3v2Options::default().version(Version::V2_2),
    )
    .unwrap();
    assert_eq!(decode(&file).version, Version::V2_3);
    assert_eq!(read(&mut file).get(Field::Album), "Album");
}

#[test]
fn test_telemetry() {
    let recorder = Recorder::default();
    let mut file = common::payload(100);
    write_tag(
        &id3v2(),
        Cursor::new(&mut file),
        &common::full_record(),
        &Id3v2Options::default(),
        &recorder,
    )
    .unwrap();
    assert_eq!(recorder.0.borrow().as_slice(), &[Action::Rewritten]);
}
