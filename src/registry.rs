// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For selecting a tag dialect by file extension

use crate::Error;
use crate::flac::Flac;
use crate::id3v2::Id3v2;
use crate::persist::{ExistingTag, Outcome, TagFormat, probe_tag, read_tag, write_tag};
use crate::record::MetadataRecord;
use crate::settings::{SettingInfo, Settings};
use crate::stream::Stream;
use crate::telemetry::{NoTelemetry, Telemetry};
use std::path::Path;

/// A tag dialect usable through a trait object
///
/// Implemented for every [`TagFormat`].
pub trait TagDialect: Send + Sync {
    /// The dialect's name
    fn name(&self) -> &'static str;

    /// File extensions the dialect handles, without leading dot
    fn extensions(&self) -> &'static [&'static str];

    /// Settings the dialect recognizes, with their accepted values
    fn setting_info(&self) -> &'static [(&'static str, SettingInfo)];

    /// Probes the stream for an existing tag's layout
    ///
    /// # Errors
    ///
    /// Returns an error if the existing tag is corrupt
    /// or passes along any I/O error.
    fn probe(&self, stream: &mut dyn Stream) -> Result<ExistingTag, Error>;

    /// Reads the stream's tag as a metadata record
    ///
    /// # Errors
    ///
    /// Returns an error if the existing tag is corrupt
    /// or passes along any I/O error.
    fn read_metadata(
        &self,
        stream: &mut dyn Stream,
        telemetry: &dyn Telemetry,
    ) -> Result<MetadataRecord, Error>;

    /// Writes the record as the stream's tag
    ///
    /// Settings are validated before the stream is touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSetting`] for unrecognized settings
    /// and otherwise any error from [`write_tag`].
    fn write_metadata(
        &self,
        stream: &mut dyn Stream,
        record: &MetadataRecord,
        settings: &Settings,
        telemetry: &dyn Telemetry,
    ) -> Result<Outcome, Error>;
}

impl<F: TagFormat + Send + Sync> TagDialect for F {
    fn name(&self) -> &'static str {
        F::NAME
    }

    fn extensions(&self) -> &'static [&'static str] {
        F::EXTENSIONS
    }

    fn setting_info(&self) -> &'static [(&'static str, SettingInfo)] {
        F::SETTINGS
    }

    fn probe(&self, stream: &mut dyn Stream) -> Result<ExistingTag, Error> {
        probe_tag(self, stream)
    }

    fn read_metadata(
        &self,
        stream: &mut dyn Stream,
        telemetry: &dyn Telemetry,
    ) -> Result<MetadataRecord, Error> {
        read_tag(self, stream, telemetry)
    }

    fn write_metadata(
        &self,
        stream: &mut dyn Stream,
        record: &MetadataRecord,
        settings: &Settings,
        telemetry: &dyn Telemetry,
    ) -> Result<Outcome, Error> {
        let options = F::Options::try_from(settings)?;
        write_tag(self, stream, record, &options, telemetry)
    }
}

/// A collection of tag dialects, keyed by file extension
///
/// # Example
///
/// ```
/// use tag_splice::{registry::Registry, Error};
///
/// let registry = Registry::default();
/// assert_eq!(registry.dialect("MP3").unwrap().name(), "ID3v2");
/// assert_eq!(registry.dialect(".flac").unwrap().name(), "FLAC");
/// assert!(matches!(registry.dialect("ogg"), Err(Error::UnsupportedFormat(_))));
/// ```
pub struct Registry {
    dialects: Vec<Box<dyn TagDialect>>,
}

impl Registry {
    /// A registry with no dialects at all
    pub fn empty() -> Self {
        Self { dialects: vec![] }
    }

    /// Adds a dialect
    ///
    /// Dialects registered later take precedence
    /// for extensions handled by more than one.
    pub fn register(&mut self, dialect: Box<dyn TagDialect>) {
        self.dialects.insert(0, dialect);
    }

    /// Iterates over all registered dialects
    pub fn dialects(&self) -> impl Iterator<Item = &dyn TagDialect> {
        self.dialects.iter().map(|d| d.as_ref())
    }

    /// Returns the dialect for a file extension
    ///
    /// The extension is matched case-insensitively,
    /// with or without its leading dot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] if no dialect
    /// handles the extension.
    pub fn dialect(&self, extension: &str) -> Result<&dyn TagDialect, Error> {
        let bare = extension.strip_prefix('.').unwrap_or(extension);
        self.dialects()
            .find(|d| d.extensions().iter().any(|e| e.eq_ignore_ascii_case(bare)))
            .ok_or_else(|| Error::UnsupportedFormat(extension.to_owned()))
    }

    /// Returns the dialect for a file's path
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] if the path has
    /// no extension or no dialect handles it.
    pub fn dialect_for<P: AsRef<Path>>(&self, path: P) -> Result<&dyn TagDialect, Error> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some(extension) => self.dialect(extension),
            None => Err(Error::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Writes the record into the file at the given path
    ///
    /// The file must already exist and is never truncated
    /// beyond what rewriting its tag requires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for unknown extensions
    /// and otherwise any error from [`TagDialect::write_metadata`].
    pub fn write_file<P: AsRef<Path>>(
        &self,
        path: P,
        record: &MetadataRecord,
        settings: &Settings,
        telemetry: &dyn Telemetry,
    ) -> Result<Outcome, Error> {
        let dialect = self.dialect_for(path.as_ref())?;
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(false)
            .truncate(false)
            .open(path.as_ref())?;
        dialect.write_metadata(&mut file, record, settings, telemetry)
    }

    /// Reads a metadata record from the file at the given path
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for unknown extensions
    /// and otherwise any error from [`TagDialect::read_metadata`].
    pub fn read_file<P: AsRef<Path>>(
        &self,
        path: P,
        telemetry: &dyn Telemetry,
    ) -> Result<MetadataRecord, Error> {
        let dialect = self.dialect_for(path.as_ref())?;
        let mut file = std::fs::File::open(path.as_ref())?;
        dialect.read_metadata(&mut file, telemetry)
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(Flac));
        registry.register(Box::new(Id3v2::default()));
        registry
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_list()
            .entries(self.dialects().map(|d| d.name()))
            .finish()
    }
}

/// Writes the record into the file at the given path,
/// choosing the tag dialect by the file's extension
///
/// # Example
///
/// ```
/// use tag_splice::{write_metadata_file, read_metadata_file};
/// use tag_splice::record::{Field, MetadataRecord};
/// use tag_splice::settings::Settings;
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("track.mp3");
/// std::fs::write(&path, [0xFF, 0xFB, 0x90, 0x64]).unwrap();
///
/// let record = MetadataRecord::default()
///     .with(Field::Artist, "Artist").unwrap()
///     .with(Field::Year, "1999").unwrap();
///
/// write_metadata_file(&path, &record, &Settings::default()).unwrap();
/// assert_eq!(read_metadata_file(&path).unwrap(), record);
/// ```
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for unknown extensions
/// and otherwise any error from [`write_tag`].
pub fn write_metadata_file<P: AsRef<Path>>(
    path: P,
    record: &MetadataRecord,
    settings: &Settings,
) -> Result<Outcome, Error> {
    Registry::default().write_file(path, record, settings, &NoTelemetry)
}

/// Reads a metadata record from the file at the given path,
/// choosing the tag dialect by the file's extension
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for unknown extensions
/// and otherwise any error from [`read_tag`].
pub fn read_metadata_file<P: AsRef<Path>>(path: P) -> Result<MetadataRecord, Error> {
    Registry::default().read_file(path, &NoTelemetry)
}
