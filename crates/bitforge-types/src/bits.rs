//! The mutable bit buffer every pipeline run operates on.
//!
//! A `BitBuffer` is an owned sequence of bits with the string form
//! `"11010010"` as its canonical representation — both `Display` and serde
//! use it, so buffers survive a round trip through any wire format
//! unchanged.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error produced when parsing a bit string fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitParseError {
    #[error("invalid bit character '{0}' at position {1}")]
    InvalidChar(char, usize),
}

/// An owned, mutable sequence of bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitBuffer {
    bits: Vec<bool>,
}

impl BitBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self { bits: Vec::new() }
    }

    /// Create a buffer of `len` zero bits.
    pub fn zeros(len: usize) -> Self {
        Self { bits: vec![false; len] }
    }

    /// Number of bits in the buffer.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True if the buffer holds no bits.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Get a single bit, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).copied()
    }

    /// Set a single bit. Returns false if `index` is out of range.
    pub fn set(&mut self, index: usize, value: bool) -> bool {
        match self.bits.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Borrow the underlying bits.
    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Copy out the half-open range `[start, end)`.
    ///
    /// Returns `None` when the range is inverted or exceeds the buffer.
    pub fn slice(&self, start: usize, end: usize) -> Option<BitBuffer> {
        if start > end || end > self.bits.len() {
            return None;
        }
        Some(BitBuffer { bits: self.bits[start..end].to_vec() })
    }

    /// Overwrite bits starting at `start` with `segment`.
    ///
    /// Returns false (buffer unchanged) if the segment would run past the
    /// end of the buffer.
    pub fn splice(&mut self, start: usize, segment: &BitBuffer) -> bool {
        let end = match start.checked_add(segment.len()) {
            Some(end) if end <= self.bits.len() => end,
            _ => return false,
        };
        self.bits[start..end].copy_from_slice(segment.as_slice());
        true
    }

    /// Count positions where `self` and `other` differ.
    ///
    /// A length difference counts every position past the shorter buffer.
    pub fn diff_count(&self, other: &BitBuffer) -> usize {
        let common = self.bits.len().min(other.bits.len());
        let changed = self.bits[..common]
            .iter()
            .zip(&other.bits[..common])
            .filter(|(a, b)| a != b)
            .count();
        changed + self.bits.len().max(other.bits.len()) - common
    }
}

impl FromStr for BitBuffer {
    type Err = BitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bits = Vec::with_capacity(s.len());
        for (i, c) in s.chars().enumerate() {
            match c {
                '0' => bits.push(false),
                '1' => bits.push(true),
                other => return Err(BitParseError::InvalidChar(other, i)),
            }
        }
        Ok(Self { bits })
    }
}

impl fmt::Display for BitBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.bits {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl From<Vec<bool>> for BitBuffer {
    fn from(bits: Vec<bool>) -> Self {
        Self { bits }
    }
}

impl Serialize for BitBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BitBuffer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BitVisitor;

        impl Visitor<'_> for BitVisitor {
            type Value = BitBuffer;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string of '0' and '1' characters")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<BitBuffer, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(BitVisitor)
    }
}
