// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! An explicitly passed logging context
//!
//! Persistence reports what it does through a [`Telemetry`]
//! implementation handed in by the caller, so the engine itself
//! holds no global state.
//! [`NoTelemetry`] discards everything and [`LogTelemetry`]
//! forwards events to the [`log`] facade.

use crate::persist::Action;

/// Something noteworthy that happened during persistence
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event<'e> {
    /// An existing tag was probed
    Probed {
        /// Name of the tag dialect
        dialect: &'static str,
        /// Total length of the existing tag, 0 if absent
        length: u64,
        /// Bytes of the existing tag available as padding
        padding: u64,
    },
    /// A new tag was built from the record
    Built {
        /// Name of the tag dialect
        dialect: &'static str,
        /// Number of entries in the new tag
        entries: usize,
        /// Size of the new tag, excluding padding
        size: u64,
    },
    /// The persistence strategy was decided
    Decided {
        /// The action about to be performed
        action: Action,
        /// Padding bytes the new tag will carry
        padding: u64,
    },
    /// Audio payload was moved through the temporary buffer
    PayloadMoved {
        /// Bytes of payload copied
        bytes: u64,
    },
    /// A legacy trailer was removed from the end of the stream
    TrailerStripped,
    /// A stored value could not be decoded and was ignored
    Skipped {
        /// The entry's key
        key: &'e str,
        /// Why it was ignored
        reason: &'static str,
    },
}

/// Receives events from tag persistence
pub trait Telemetry {
    /// Records a single event
    fn record(&self, event: Event<'_>);
}

/// Telemetry which discards all events
#[derive(Copy, Clone, Debug, Default)]
pub struct NoTelemetry;

impl Telemetry for NoTelemetry {
    #[inline]
    fn record(&self, _event: Event<'_>) {}
}

/// Telemetry which forwards events to the `log` crate
#[derive(Copy, Clone, Debug)]
pub struct LogTelemetry {
    /// Level at which routine events are logged
    pub level: log::Level,
}

impl Default for LogTelemetry {
    fn default() -> Self {
        Self {
            level: log::Level::Debug,
        }
    }
}

impl Telemetry for LogTelemetry {
    fn record(&self, event: Event<'_>) {
        match event {
            Event::Probed {
                dialect,
                length,
                padding,
            } => log::log!(
                self.level,
                "Probed {dialect} tag: {length} bytes, {padding} bytes of padding"
            ),
            Event::Built {
                dialect,
                entries,
                size,
            } => log::log!(self.level, "Built {dialect} tag: {entries} entries in {size} bytes"),
            Event::Decided { action, padding } => {
                log::log!(self.level, "Persisting tag: {action:?} with {padding} bytes of padding");
            }
            Event::PayloadMoved { bytes } => {
                log::log!(self.level, "Moved {bytes} bytes of audio payload");
            }
            Event::TrailerStripped => log::log!(self.level, "Removed legacy trailer"),
            Event::Skipped { key, reason } => log::warn!("Skipped {key:?}: {reason}"),
        }
    }
}

impl<T: Telemetry + ?Sized> Telemetry for &T {
    fn record(&self, event: Event<'_>) {
        T::record(self, event);
    }
}
