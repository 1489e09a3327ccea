//! Byte quantities.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CapacityError, CapacityResult};

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// A non-negative byte count.
///
/// Values are capped at [`ResourceQuantity::MAX`] (`i64::MAX` bytes) so the
/// persisted form stays representable as a signed 64-bit integer for every
/// consumer of the replicated state. Larger values are rejected, never
/// wrapped or saturated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ResourceQuantity(u64);

impl ResourceQuantity {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(i64::MAX as u64);

    /// Build a quantity from a byte count, rejecting values above [`Self::MAX`].
    pub fn from_bytes(bytes: u64) -> CapacityResult<Self> {
        if bytes > Self::MAX.0 {
            return Err(CapacityError::QuantityOutOfRange(bytes));
        }
        Ok(Self(bytes))
    }

    pub const fn bytes(self) -> u64 {
        self.0
    }

    /// Sum two quantities, failing instead of exceeding [`Self::MAX`].
    pub fn checked_add(self, other: Self) -> CapacityResult<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Self::from_bytes(sum),
            None => Err(CapacityError::QuantityOutOfRange(u64::MAX)),
        }
    }
}

impl TryFrom<u64> for ResourceQuantity {
    type Error = CapacityError;

    fn try_from(bytes: u64) -> CapacityResult<Self> {
        Self::from_bytes(bytes)
    }
}

impl From<ResourceQuantity> for u64 {
    fn from(q: ResourceQuantity) -> u64 {
        q.0
    }
}

/// Renders the largest unit that divides the value exactly, e.g. `512mb`.
impl fmt::Display for ResourceQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes == 0 {
            return write!(f, "0b");
        }
        for (unit, suffix) in [(TB, "tb"), (GB, "gb"), (MB, "mb"), (KB, "kb")] {
            if bytes % unit == 0 {
                return write!(f, "{}{suffix}", bytes / unit);
            }
        }
        write!(f, "{bytes}b")
    }
}
