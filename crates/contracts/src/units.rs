//! Byte size strings ("12g", "512m", "128MiB") and GB formatting.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::ContractError;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

/// Size in bytes, parsed from a human string with binary units.
///
/// A bare number is taken as bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ByteSize(u64);

impl ByteSize {
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn from_mib(mib: u64) -> Self {
        Self(mib * MIB)
    }

    pub const fn from_gib(gib: u64) -> Self {
        Self(gib * GIB)
    }

    pub const fn as_bytes(&self) -> u64 {
        self.0
    }

    pub fn as_gib(&self) -> f64 {
        to_gigabytes(self.0)
    }
}

impl FromStr for ByteSize {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);

        if digits.is_empty() {
            return Err(ContractError::invalid_byte_size(s, "missing numeric value"));
        }
        let value: u64 = digits
            .parse()
            .map_err(|e| ContractError::invalid_byte_size(s, format!("{e}")))?;

        let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" | "kb" | "kib" => KIB,
            "m" | "mb" | "mib" => MIB,
            "g" | "gb" | "gib" => GIB,
            "t" | "tb" | "tib" => TIB,
            other => {
                return Err(ContractError::invalid_byte_size(
                    s,
                    format!("unknown unit '{other}'"),
                ))
            }
        };

        value
            .checked_mul(multiplier)
            .map(Self)
            .ok_or_else(|| ContractError::invalid_byte_size(s, "value overflows u64"))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        if b != 0 && b % TIB == 0 {
            write!(f, "{}t", b / TIB)
        } else if b != 0 && b % GIB == 0 {
            write!(f, "{}g", b / GIB)
        } else if b != 0 && b % MIB == 0 {
            write!(f, "{}m", b / MIB)
        } else if b != 0 && b % KIB == 0 {
            write!(f, "{}k", b / KIB)
        } else {
            write!(f, "{}b", b)
        }
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Bytes to gigabytes (GiB), for log lines like "1.23 GB".
pub fn to_gigabytes(bytes: u64) -> f64 {
    bytes as f64 / GIB as f64
}
