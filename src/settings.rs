// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-dialect configuration
//!
//! Settings arrive as a string-keyed map, typically
//! deserialized from some configuration file.
//! Each dialect publishes the keys it recognizes along
//! with their accepted values, and rejects anything else
//! before touching the file.
//!
//! # Example
//!
//! ```
//! use tag_splice::settings::{Settings, SettingValue};
//!
//! let settings = Settings::default()
//!     .with("TagVersion", "2.4")
//!     .with("TagPadding", 0);
//!
//! assert_eq!(settings.text("TagVersion"), Some("2.4"));
//! assert_eq!(settings.int("TagPadding"), Some(0));
//! assert_eq!(settings.get("TagEncoding"), None);
//! ```

use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single setting's value
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// An integer value
    Int(i64),
    /// A textual value
    Text(String),
}

impl From<i64> for SettingValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for SettingValue {
    fn from(i: i32) -> Self {
        Self::Int(i.into())
    }
}

impl From<u32> for SettingValue {
    fn from(u: u32) -> Self {
        Self::Int(u.into())
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Int(i) => i.fmt(f),
            Self::Text(s) => s.fmt(f),
        }
    }
}

/// A collection of settings keyed by name
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(BTreeMap<String, SettingValue>);

impl Settings {
    /// Adds or replaces a setting, builder-style
    pub fn with<K: Into<String>, V: Into<SettingValue>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds or replaces a setting, returning the old value
    pub fn insert<K: Into<String>, V: Into<SettingValue>>(
        &mut self,
        key: K,
        value: V,
    ) -> Option<SettingValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes a setting, returning its value
    pub fn remove(&mut self, key: &str) -> Option<SettingValue> {
        self.0.remove(key)
    }

    /// Returns a setting's value, if present
    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.0.get(key)
    }

    /// Whether the setting is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns a setting's textual value, if present and textual
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            SettingValue::Text(s) => Some(s),
            SettingValue::Int(_) => None,
        }
    }

    /// Returns a setting's integer value, if present and an integer
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            SettingValue::Int(i) => Some(*i),
            SettingValue::Text(_) => None,
        }
    }

    /// Iterates over all settings in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether there are no settings
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks every setting against the recognized keys
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSetting`] for unknown keys,
    /// values of the wrong kind, or values out of range.
    pub fn validate(&self, recognized: &[(&str, SettingInfo)]) -> Result<(), Error> {
        self.iter().try_for_each(|(key, value)| {
            match recognized.iter().find(|(name, _)| *name == key) {
                Some((_, info)) => info.validate(value).map_err(|reason| Error::InvalidSetting {
                    key: key.to_owned(),
                    reason,
                }),
                None => Err(Error::InvalidSetting {
                    key: key.to_owned(),
                    reason: "unrecognized setting",
                }),
            }
        })
    }
}

impl<K: Into<String>, V: Into<SettingValue>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Describes the values a setting accepts
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SettingInfo {
    /// One of a fixed set of strings
    Text(&'static [&'static str]),
    /// An integer within an inclusive range
    Int {
        /// Smallest accepted value
        min: i64,
        /// Largest accepted value
        max: i64,
    },
}

impl SettingInfo {
    fn validate(&self, value: &SettingValue) -> Result<(), &'static str> {
        match (self, value) {
            (Self::Text(accepted), SettingValue::Text(s)) => accepted
                .iter()
                .any(|a| a == s)
                .then_some(())
                .ok_or("value not among accepted values"),
            (Self::Int { min, max }, SettingValue::Int(i)) => (*min..=*max)
                .contains(i)
                .then_some(())
                .ok_or("value out of range"),
            (Self::Text(_), SettingValue::Int(_)) => Err("expected text value"),
            (Self::Int { .. }, SettingValue::Text(_)) => Err("expected integer value"),
        }
    }
}

/// How much padding a newly written tag should carry
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Padding {
    /// Reuse an existing tag's space when the new tag fits,
    /// otherwise write the dialect's default padding
    #[default]
    Reuse,
    /// Exactly the given number of padding bytes,
    /// rewriting the whole file if necessary
    Exact(u32),
}
