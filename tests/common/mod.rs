// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// fixtures shared between integration tests

#![allow(dead_code)]

use tag_splice::record::{Field, MetadataRecord};

/// Random audio payload which can't be mistaken for a tag
pub fn payload(len: usize) -> Vec<u8> {
    let mut payload = vec![0xFF, 0xFB];
    payload.extend(std::iter::repeat_with(|| fastrand::u8(..)).take(len.saturating_sub(2)));
    payload.truncate(len);
    payload
}

/// A 128 byte ID3v1 trailer
pub fn trailer() -> Vec<u8> {
    let mut trailer = b"TAG".to_vec();
    trailer.extend(b"Old Title");
    trailer.resize(128, 0);
    trailer
}

/// A synchsafe integer's bytes
pub fn synchsafe(value: u32) -> [u8; 4] {
    [
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ]
}

/// A hand-built ID3v2.3 tag with the given raw frames and padding
pub fn id3v23(frames: &[(&[u8; 4], &[u8])], padding: usize) -> Vec<u8> {
    let mut body = vec![];
    for (id, data) in frames {
        body.extend(*id);
        body.extend((data.len() as u32).to_be_bytes());
        body.extend([0, 0]);
        body.extend(*data);
    }
    body.resize(body.len() + padding, 0);

    let mut tag = b"ID3\x03\x00\x00".to_vec();
    tag.extend(synchsafe(body.len() as u32));
    tag.extend(body);
    tag
}

/// A STREAMINFO block's contents
pub fn streaminfo() -> Vec<u8> {
    let mut streaminfo = vec![0x10, 0x00, 0x10, 0x00];
    streaminfo.extend([0x00, 0x00, 0x0E, 0x00, 0x00, 0x10]);
    // 44100 Hz, 2 channels, 16 bits per sample, 1000 samples
    streaminfo.extend([0x0A, 0xC4, 0x42, 0xF0, 0x00, 0x00, 0x03, 0xE8]);
    streaminfo.extend(std::iter::repeat_with(|| fastrand::u8(..)).take(16));
    assert_eq!(streaminfo.len(), 34);
    streaminfo
}

/// A FLAC stream with the given metadata blocks as
/// (block type, contents) pairs, followed by the payload
pub fn flac(blocks: &[(u8, Vec<u8>)], payload: &[u8]) -> Vec<u8> {
    let mut flac = b"fLaC".to_vec();
    for (i, (block_type, data)) in blocks.iter().enumerate() {
        let last = if i + 1 == blocks.len() { 0x80 } else { 0 };
        flac.push(last | block_type);
        flac.extend(&(data.len() as u32).to_be_bytes()[1..]);
        flac.extend(data);
    }
    flac.extend(payload);
    flac
}

/// A VORBIS_COMMENT block's contents
pub fn vorbis_comment(vendor: &str, fields: &[&str]) -> Vec<u8> {
    let mut block = (vendor.len() as u32).to_le_bytes().to_vec();
    block.extend(vendor.as_bytes());
    block.extend((fields.len() as u32).to_le_bytes());
    for field in fields {
        block.extend((field.len() as u32).to_le_bytes());
        block.extend(field.as_bytes());
    }
    block
}

/// A 1x1 pixel, 24-bit BMP image
pub fn bmp() -> Vec<u8> {
    vec![
        0x42, 0x4d, 0x3a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x36, 0x00, 0x00, 0x00, 0x28,
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x18, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x00, 0x00, 0x00,
    ]
}

/// A 2x1 pixel baseline JPEG header, enough for its dimensions to be read
pub fn jpeg() -> Vec<u8> {
    vec![
        0xFF, 0xD8, // SOI
        0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, // APP0, truncated
        0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x01, 0x00, 0x02, 0x03, // SOF0
        0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01, 0xFF, 0xD9,
    ]
}

/// A record with every text field populated
pub fn full_record() -> MetadataRecord {
    [
        (Field::Title, "Title"),
        (Field::Artist, "Artist"),
        (Field::Album, "Album"),
        (Field::AlbumArtist, "Album Artist"),
        (Field::Composer, "Composer"),
        (Field::Genre, "Genre"),
        (Field::Comment, "Comment"),
        (Field::Day, "7"),
        (Field::Month, "5"),
        (Field::Year, "2004"),
        (Field::TrackNumber, "3"),
        (Field::TrackCount, "12"),
        (Field::TrackPeak, "0.988"),
        (Field::AlbumPeak, "1.000"),
        (Field::TrackGain, "-6.5"),
        (Field::AlbumGain, "-7.25"),
    ]
    .into_iter()
    .try_fold(MetadataRecord::default(), |record, (field, value)| {
        record.with(field, value)
    })
    .unwrap()
}

/// A record with only the given field populated
pub fn record_with(field: Field, value: &str) -> MetadataRecord {
    MetadataRecord::default().with(field, value).unwrap()
}
