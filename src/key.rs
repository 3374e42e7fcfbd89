//! Service keys.
//!
//! A [`Key`] identifies a service value by its type identity and an optional
//! qualifier. Keys are plain lookup identifiers: cheap to clone, hashable and
//! totally ordered so that derived sets iterate deterministically.

use crate::errors::ParseKeyError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Typed, optionally-qualified service identifier.
///
/// The textual form is `Type` or `Type@qualifier`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    type_name: Arc<str>,
    qualifier: Option<Arc<str>>,
}

impl Key {
    /// Unqualified key for the given type name
    pub fn named(type_name: impl Into<Arc<str>>) -> Self {
        Self {
            type_name: type_name.into(),
            qualifier: None,
        }
    }

    /// Qualified key
    pub fn qualified(type_name: impl Into<Arc<str>>, qualifier: impl Into<Arc<str>>) -> Self {
        Self {
            type_name: type_name.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    /// Key derived from a Rust type
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<Arc<str>>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn is_qualified(&self) -> bool {
        self.qualifier.is_some()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}@{}", self.type_name, qualifier),
            None => f.write_str(&self.type_name),
        }
    }
}

impl FromStr for Key {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('@') {
            Some((type_name, qualifier)) => {
                let type_name = type_name.trim();
                let qualifier = qualifier.trim();
                if type_name.is_empty() {
                    return Err(ParseKeyError::Empty);
                }
                if qualifier.is_empty() {
                    return Err(ParseKeyError::EmptyQualifier(s.to_string()));
                }
                Ok(Key::qualified(type_name, qualifier))
            }
            None if s.is_empty() => Err(ParseKeyError::Empty),
            None => Ok(Key::named(s)),
        }
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
