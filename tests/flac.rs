// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod common;

use std::io::Cursor;
use tag_splice::Error;
use tag_splice::flac::{BlockSize, BlockType, Flac, FlacOptions, FlacTag, RawBlock};
use tag_splice::persist::{Action, Outcome, probe_tag, read_tag, write_tag};
use tag_splice::picture::CoverArt;
use tag_splice::record::{Field, MetadataRecord};
use tag_splice::telemetry::NoTelemetry;

const STREAMINFO: u8 = 0;
const PADDING: u8 = 1;
const APPLICATION: u8 = 2;
const SEEKTABLE: u8 = 3;
const VORBIS_COMMENT: u8 = 4;

fn write(file: &mut Vec<u8>, record: &MetadataRecord, options: FlacOptions) -> Result<Outcome, Error> {
    write_tag(&Flac, Cursor::new(file), record, &options, &NoTelemetry)
}

fn read(file: &mut Vec<u8>) -> MetadataRecord {
    read_tag(&Flac, Cursor::new(file), &NoTelemetry).unwrap()
}

fn decode(file: &[u8]) -> FlacTag {
    FlacTag::read(file).unwrap().tag
}

/// STREAMINFO followed by a PADDING block of the given contents size
fn flac_with_padding(padding: usize, payload: &[u8]) -> Vec<u8> {
    common::flac(
        &[(STREAMINFO, common::streaminfo()), (PADDING, vec![0; padding])],
        payload,
    )
}

#[test]
fn test_round_trip() {
    let mut record = common::full_record();
    record.set_cover_art(Some(CoverArt::new(common::bmp()).unwrap()));

    let payload = common::payload(2000);
    let mut file = common::flac(&[(STREAMINFO, common::streaminfo())], &payload);

    let outcome = write(&mut file, &record, FlacOptions::default()).unwrap();
    assert_eq!(outcome.action, Action::Rewritten);
    assert!(!outcome.trailer_removed);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());
    assert_eq!(read(&mut file), record);

    let tag = decode(&file);
    assert_eq!(tag.field("ARTIST"), Some("Artist"));
    assert_eq!(tag.field("DATE"), Some("2004-05-07"));
    assert_eq!(tag.field("TRACKNUMBER"), Some("03/12"));
    assert_eq!(tag.field("TRACKTOTAL"), None);
    assert_eq!(tag.field("REPLAYGAIN_TRACK_GAIN"), Some("-6.5 dB"));
    assert_eq!(tag.field("REPLAYGAIN_TRACK_PEAK"), Some("0.988"));

    // lossless containers keep lossless art as-is
    let art = read(&mut file).cover_art().cloned().unwrap();
    assert_eq!(art.media_type(), "image/bmp");
}

#[test]
fn test_track_packing() {
    let payload = common::payload(100);

    for (number, count, expected_number, expected_total) in [
        ("3", "12", Some("03/12"), None),
        ("3", "", Some("03"), None),
        ("", "12", None, Some("12")),
    ] {
        let mut record = MetadataRecord::default();
        record.set(Field::TrackNumber, number).unwrap();
        record.set(Field::TrackCount, count).unwrap();

        let mut file = common::flac(&[(STREAMINFO, common::streaminfo())], &payload);
        write(&mut file, &record, FlacOptions::default()).unwrap();

        let tag = decode(&file);
        assert_eq!(tag.field("TRACKNUMBER"), expected_number);
        assert_eq!(tag.field("TRACKTOTAL"), expected_total);
        assert_eq!(read(&mut file), record);
    }
}

#[test]
fn test_common_field_spellings() {
    let payload = common::payload(100);
    let mut file = common::flac(
        &[
            (STREAMINFO, common::streaminfo()),
            (
                VORBIS_COMMENT,
                common::vorbis_comment(
                    "vendor",
                    &[
                        "title=Title",
                        "Comment=Comment",
                        "DATE=1999",
                        "TRACKNUMBER=4/10",
                        "REPLAYGAIN_ALBUM_GAIN=-3.00 dB",
                        "NOT A FIELD",
                    ],
                ),
            ),
        ],
        &payload,
    );

    let record = read(&mut file);
    assert_eq!(record.get(Field::Title), "Title");
    assert_eq!(record.get(Field::Comment), "Comment");
    assert_eq!(record.get(Field::Year), "1999");
    assert_eq!(record.get(Field::Month), "");
    assert_eq!(record.get(Field::TrackNumber), "04");
    assert_eq!(record.get(Field::TrackCount), "10");
    assert_eq!(record.get(Field::AlbumGain), "-3.00");
}

#[test]
fn test_blocks_preserved() {
    let streaminfo = common::streaminfo();
    let application = b"TEST\x01\x02\x03\x04".to_vec();
    let seektable = vec![0; 18];
    let payload = common::payload(1000);

    let mut file = common::flac(
        &[
            (STREAMINFO, streaminfo.clone()),
            (SEEKTABLE, seektable.clone()),
            (
                VORBIS_COMMENT,
                common::vorbis_comment("some encoder 1.0", &["TITLE=Old", "CUSTOM=kept?"]),
            ),
            (APPLICATION, application.clone()),
            (PADDING, vec![0; 10]),
        ],
        &payload,
    );

    write(
        &mut file,
        &common::record_with(Field::Title, "New"),
        FlacOptions::default(),
    )
    .unwrap();

    let tag = decode(&file);
    assert_eq!(tag.streaminfo, streaminfo);
    assert_eq!(
        tag.blocks,
        vec![
            RawBlock {
                block_type: BlockType::SeekTable,
                data: seektable
            },
            RawBlock {
                block_type: BlockType::Application,
                data: application
            },
        ]
    );
    assert_eq!(tag.vendor_string, "some encoder 1.0");
    assert_eq!(tag.field("TITLE"), Some("New"));
    // only fields a record holds are written
    assert_eq!(tag.field("CUSTOM"), None);
    assert!(file.ends_with(&payload));
}

#[test]
fn test_in_place_boundaries() {
    let record = common::record_with(Field::Artist, "Artist");
    let payload = common::payload(5000);

    let required = {
        let mut file = common::flac(&[(STREAMINFO, common::streaminfo())], &payload);
        write(&mut file, &record, FlacOptions::default().no_padding())
            .unwrap()
            .tag_size
    };

    // "fLaC", STREAMINFO and the PADDING block's header
    let overhead = 4 + 4 + 34 + 4;

    // one byte too small
    let mut file = flac_with_padding(required as usize - 1 - overhead, &payload);
    let outcome = write(&mut file, &record, FlacOptions::default()).unwrap();
    assert_eq!(outcome.action, Action::Rewritten);
    assert_eq!(outcome.tag_size, required + 4 + 4096);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());

    // exactly large enough, leaving no PADDING block
    let mut file = flac_with_padding(required as usize - overhead, &payload);
    let outcome = write(&mut file, &record, FlacOptions::default()).unwrap();
    assert_eq!(outcome.action, Action::Overwritten);
    assert_eq!(outcome.tag_size, required);
    assert_eq!(probe_tag(&Flac, Cursor::new(&mut file)).unwrap().padding, 0);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());

    // leftovers too small for a PADDING block header
    for leftover in 1..4 {
        let mut file = flac_with_padding(required as usize + leftover - overhead, &payload);
        let outcome = write(&mut file, &record, FlacOptions::default()).unwrap();
        assert_eq!(outcome.action, Action::Rewritten);
        assert_eq!(outcome.tag_size, required + 4 + 4096);
        assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());
    }

    // just enough for an empty PADDING block
    let mut file = flac_with_padding(required as usize + 4 - overhead, &payload);
    let outcome = write(&mut file, &record, FlacOptions::default()).unwrap();
    assert_eq!(outcome.action, Action::Overwritten);
    assert_eq!(outcome.tag_size, required + 4);
    assert_eq!(probe_tag(&Flac, Cursor::new(&mut file)).unwrap().padding, 4);

    // plenty of room
    let mut file = flac_with_padding(required as usize + 100 - overhead, &payload);
    let outcome = write(&mut file, &record, FlacOptions::default()).unwrap();
    assert_eq!(outcome.action, Action::Overwritten);
    assert_eq!(outcome.tag_size, required + 100);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());
    assert_eq!(read(&mut file), record);
}

#[test]
fn test_exact_padding() {
    let record = common::full_record();
    let payload = common::payload(3000);
    let streaminfo = common::streaminfo();

    let required = {
        let mut file = common::flac(&[(STREAMINFO, streaminfo.clone())], &payload);
        write(&mut file, &record, FlacOptions::default().no_padding())
            .unwrap()
            .tag_size
    };

    for padding in [0, 4096, BlockSize::MAX] {
        let mut file = flac_with_padding(10_000, &payload);
        let outcome = write(&mut file, &record, FlacOptions::default().padding(padding)).unwrap();
        assert_eq!(outcome.action, Action::Rewritten);

        let expected = match padding {
            0 => required,
            contents => required + 4 + u64::from(contents),
        };
        assert_eq!(outcome.tag_size, expected);
        assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());
        assert_eq!(
            probe_tag(&Flac, Cursor::new(&mut file)).unwrap().padding,
            expected - required
        );
    }

    let mut file = flac_with_padding(10, &payload);
    assert!(matches!(
        write(
            &mut file,
            &record,
            FlacOptions::default().padding(BlockSize::MAX + 1)
        ),
        Err(Error::ExcessiveTagSize)
    ));
}

#[test]
fn test_idempotent() {
    let record = common::full_record();
    let mut file = common::flac(&[(STREAMINFO, common::streaminfo())], &common::payload(10_000));

    write(&mut file, &record, FlacOptions::default()).unwrap();
    let first = md5::compute(&file);

    let outcome = write(&mut file, &record, FlacOptions::default()).unwrap();
    assert_eq!(outcome.action, Action::Unchanged);
    assert_eq!(md5::compute(&file), first);
}

#[test]
fn test_empty_record() {
    let payload = common::payload(500);
    let streaminfo = common::streaminfo();
    let mut file = common::flac(
        &[
            (STREAMINFO, streaminfo.clone()),
            (VORBIS_COMMENT, common::vorbis_comment("vendor", &["TITLE=Title"])),
        ],
        &payload,
    );

    // STREAMINFO is mandatory, so the tag is never removed outright
    let outcome = write(&mut file, &MetadataRecord::default(), FlacOptions::default()).unwrap();
    assert_ne!(outcome.action, Action::Removed);
    assert_eq!(read(&mut file), MetadataRecord::default());
    assert_eq!(decode(&file).streaminfo, streaminfo);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());
}

#[test]
fn test_trailer_untouched() {
    // ID3v1 trailers only belong to MP3 files
    let mut payload = common::payload(500);
    payload.extend(common::trailer());
    let mut file = common::flac(&[(STREAMINFO, common::streaminfo())], &payload);

    let outcome = write(&mut file, &common::full_record(), FlacOptions::default()).unwrap();
    assert!(!outcome.trailer_removed);
    assert_eq!(&file[outcome.tag_size as usize..], payload.as_slice());
}

#[test]
fn test_invalid_streams() {
    let record = common::full_record();
    let payload = common::payload(100);

    let mut file = payload.clone();
    assert!(matches!(
        write(&mut file, &record, FlacOptions::default()),
        Err(Error::MissingFlacTag)
    ));
    assert_eq!(file, payload);

    let mut file = common::flac(
        &[(PADDING, vec![0; 10]), (STREAMINFO, common::streaminfo())],
        &payload,
    );
    let original = file.clone();
    assert!(matches!(
        write(&mut file, &record, FlacOptions::default()),
        Err(Error::MissingStreaminfo)
    ));
    assert_eq!(file, original);

    let mut file = common::flac(
        &[
            (STREAMINFO, common::streaminfo()),
            (STREAMINFO, common::streaminfo()),
        ],
        &payload,
    );
    assert!(matches!(
        write(&mut file, &record, FlacOptions::default()),
        Err(Error::MultipleStreaminfo)
    ));

    // block size runs past the end of the stream
    let mut file = common::flac(&[(STREAMINFO, common::streaminfo())], &[]);
    file[4] = 0x80 | PADDING;
    file[5..8].copy_from_slice(&[0x01, 0x00, 0x00]);
    assert!(matches!(
        write(&mut file, &record, FlacOptions::default()),
        Err(Error::TagCorrupt(_))
    ));
}

#[test]
fn test_invalid_field_names() {
    let tag = FlacTag {
        streaminfo: common::streaminfo(),
        blocks: vec![],
        vendor_string: "vendor".to_owned(),
        entries: vec![tag_splice::entry::TagEntry::text("BAD=KEY", "value")],
    };
    assert!(matches!(
        tag.write(None, std::io::sink()),
        Err(Error::InvalidEntryKey(key)) if key == "BAD=KEY"
    ));
}
