// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling the fixed-size ID3v1 trailer at the end of MP3 files
//!
//! | Bytes | Field |
//! |------:|-------|
//! | 3     | `TAG` marker |
//! | 30    | title |
//! | 30    | artist |
//! | 30    | album |
//! | 4     | year |
//! | 30    | comment |
//! | 1     | genre |
//!
//! Its contents are superseded by the ID3v2 tag
//! at the start of the file, so it is only ever removed.

use crate::stream::Stream;
use std::io::SeekFrom;

/// Size of the legacy trailer, in bytes
pub const TRAILER_SIZE: u64 = 128;

const MARKER: [u8; 3] = *b"TAG";

/// Whether the stream ends with a legacy trailer
///
/// `payload_start` is the number of leading bytes
/// (such as a primary tag) which can never belong to a trailer,
/// so the trailer must fit entirely after them.
/// The stream's position is restored afterward.
///
/// # Errors
///
/// Passes along any I/O error.
pub fn probe<S: Stream + ?Sized>(
    stream: &mut S,
    payload_start: u64,
) -> std::io::Result<bool> {
    let position = stream.stream_position()?;
    let len = stream.seek(SeekFrom::End(0))?;
    if len < payload_start.saturating_add(TRAILER_SIZE) {
        stream.seek(SeekFrom::Start(position))?;
        return Ok(false);
    }

    let mut marker = [0; 3];
    stream.seek(SeekFrom::Start(len - TRAILER_SIZE))?;
    let found = crate::stream::read_fully(stream, &mut marker)? && marker == MARKER;
    stream.seek(SeekFrom::Start(position))?;
    Ok(found)
}

/// Removes a legacy trailer from the end of the stream, if present
///
/// Bytes before `payload_start` are never truncated.
/// Returns whether a trailer was removed.
///
/// # Example
///
/// ```
/// use tag_splice::trailer::strip;
/// use std::io::Cursor;
///
/// let mut data = vec![0xFF; 1000];
/// let mut trailer = [0; 128];
/// trailer[0..3].copy_from_slice(b"TAG");
/// data.extend(trailer);
///
/// let mut stream = Cursor::new(data);
/// assert!(strip(&mut stream, 0).unwrap());
/// assert_eq!(stream.get_ref().len(), 1000);
///
/// // nothing left to remove
/// assert!(!strip(&mut stream, 0).unwrap());
/// ```
///
/// # Errors
///
/// Passes along any I/O error.
pub fn strip<S: Stream + ?Sized>(
    stream: &mut S,
    payload_start: u64,
) -> std::io::Result<bool> {
    if probe(stream, payload_start)? {
        let len = stream.len()?;
        stream.set_len(len - TRAILER_SIZE)?;
        Ok(true)
    } else {
        Ok(false)
    }
}
