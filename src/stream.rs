// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Seekable, resizable streams that tags are persisted into

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

/// A seekable stream whose length may be changed
///
/// Implemented for files and in-memory buffers.
pub trait Stream: Read + Write + Seek {
    /// Truncates or extends the stream to the given length
    ///
    /// Extended bytes are zero.
    /// The stream position is left unchanged.
    fn set_len(&mut self, len: u64) -> std::io::Result<()>;

    /// Returns the stream's total length
    fn len(&mut self) -> std::io::Result<u64> {
        let position = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;
        if position != len {
            self.seek(SeekFrom::Start(position))?;
        }
        Ok(len)
    }

    /// Whether the stream is empty
    fn is_empty(&mut self) -> std::io::Result<bool> {
        self.len().map(|len| len == 0)
    }
}

impl Stream for std::fs::File {
    fn set_len(&mut self, len: u64) -> std::io::Result<()> {
        std::fs::File::set_len(self, len)
    }
}

impl Stream for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> std::io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::OutOfMemory, "stream too large"))?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

impl Stream for Cursor<&mut Vec<u8>> {
    fn set_len(&mut self, len: u64) -> std::io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::OutOfMemory, "stream too large"))?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

impl<S: Stream + ?Sized> Stream for &mut S {
    fn set_len(&mut self, len: u64) -> std::io::Result<()> {
        S::set_len(self, len)
    }
}

/// Reads exactly enough bytes to fill the buffer,
/// returning `false` if the stream ended first
///
/// Bytes read before the end of the stream are left in the buffer.
pub(crate) fn read_fully<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(read) => filled += read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(true)
}
