// ABOUTME: EC2 tag filter parsing for instance discovery.
// ABOUTME: Handles "key" (tag present) and "key=value" filters, comma-separated and ANDed.

use nonempty::NonEmpty;
use serde::{Deserialize, Deserializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagFilterError {
    #[error("tag filter cannot be empty")]
    Empty,

    #[error("tag filter entry has an empty key: '{0}'")]
    EmptyKey(String),

    #[error("invalid character in tag filter: '{0}'")]
    InvalidChar(char),
}

/// A single tag condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagFilter {
    key: String,
    value: Option<String>,
}

impl TagFilter {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `None` means "tag key present with any value".
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    fn parse(entry: &str) -> Result<Self, TagFilterError> {
        let (key, value) = match entry.split_once('=') {
            Some((key, value)) => (key.trim(), Some(value.trim().to_string())),
            None => (entry.trim(), None),
        };

        if key.is_empty() {
            return Err(TagFilterError::EmptyKey(entry.to_string()));
        }

        Ok(Self {
            key: key.to_string(),
            value,
        })
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.key, value),
            None => write!(f, "{}", self.key),
        }
    }
}

/// A non-empty set of tag conditions, all of which must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilters(NonEmpty<TagFilter>);

impl TagFilters {
    pub fn parse(input: &str) -> Result<Self, TagFilterError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TagFilterError::Empty);
        }

        if let Some(c) = input.chars().find(|c| c.is_control()) {
            return Err(TagFilterError::InvalidChar(c));
        }

        let filters = input
            .split(',')
            .map(TagFilter::parse)
            .collect::<Result<Vec<_>, _>>()?;

        NonEmpty::from_vec(filters)
            .map(Self)
            .ok_or(TagFilterError::Empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagFilter> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for TagFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&joined.join(","))
    }
}

impl<'de> Deserialize<'de> for TagFilters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TagFilters::parse(&s).map_err(serde::de::Error::custom)
    }
}
