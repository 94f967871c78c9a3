//! Channel identifiers.
//!
//! Ids are non-negative integers no larger than 2^53 - 1, the largest
//! integer every peer can represent exactly in a double.

use std::fmt;

use bytes::Bytes;

use crate::varint;

/// Largest valid channel id.
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Widest encoding of any valid channel id. Bounds the id-parsing window.
pub const MAX_CHANNEL_ID_WIDTH: usize = varint::max_encoded_width(MAX_SAFE_INTEGER);

/// A validated channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

/// Rejected channel id. Holds the offending input as written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("channel id must be an integer in 0..={max}, got {value}", max = MAX_SAFE_INTEGER)]
pub struct InvalidChannelId {
    pub value: String,
}

impl InvalidChannelId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl ChannelId {
    /// Validate a raw id.
    pub const fn new(id: u64) -> Option<Self> {
        if id <= MAX_SAFE_INTEGER {
            Some(Self(id))
        } else {
            None
        }
    }

    /// The raw id.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Wire encoding of this id.
    pub fn encode(self) -> Bytes {
        varint::encode_to_bytes(self.0)
    }

    /// Number of bytes this id occupies on the wire.
    pub const fn encoded_len(self) -> usize {
        varint::encoded_len(self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for ChannelId {
    fn from(id: u32) -> Self {
        Self(u64::from(id))
    }
}

impl From<u16> for ChannelId {
    fn from(id: u16) -> Self {
        Self(u64::from(id))
    }
}

impl TryFrom<u64> for ChannelId {
    type Error = InvalidChannelId;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        Self::new(id).ok_or_else(|| InvalidChannelId::new(id.to_string()))
    }
}

impl TryFrom<i64> for ChannelId {
    type Error = InvalidChannelId;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        u64::try_from(id)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| InvalidChannelId::new(id.to_string()))
    }
}

impl TryFrom<i32> for ChannelId {
    type Error = InvalidChannelId;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(id))
    }
}

impl std::str::FromStr for ChannelId {
    type Err = InvalidChannelId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // `u64::from_str` accepts a leading '+', which is not an id.
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidChannelId::new(s));
        }
        trimmed
            .parse::<u64>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| InvalidChannelId::new(s))
    }
}

impl From<ChannelId> for u64 {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_full_safe_range() {
        assert_eq!(ChannelId::new(0).unwrap().get(), 0);
        assert_eq!(ChannelId::new(MAX_SAFE_INTEGER).unwrap().get(), MAX_SAFE_INTEGER);
        assert!(ChannelId::new(MAX_SAFE_INTEGER + 1).is_none());
    }

    #[test]
    fn rejects_negative_ids() {
        let err = ChannelId::try_from(-1i64).unwrap_err();
        assert_eq!(err.value, "-1");
        assert!(ChannelId::try_from(-7i32).is_err());
    }

    #[test]
    fn rejects_unsafe_ids() {
        assert!(ChannelId::try_from(u64::MAX).is_err());
        assert!(ChannelId::try_from(1u64 << 53).is_err());
    }

    #[test]
    fn parses_decimal_text() {
        assert_eq!("42".parse::<ChannelId>().unwrap().get(), 42);
        assert_eq!(" 7 ".parse::<ChannelId>().unwrap().get(), 7);
        assert!("".parse::<ChannelId>().is_err());
        assert!("-3".parse::<ChannelId>().is_err());
        assert!("+3".parse::<ChannelId>().is_err());
        assert!("1.5".parse::<ChannelId>().is_err());
        assert!("abc".parse::<ChannelId>().is_err());
        assert!("9007199254740992".parse::<ChannelId>().is_err());
    }

    #[test]
    fn id_window_covers_largest_id() {
        assert_eq!(MAX_CHANNEL_ID_WIDTH, 8);
        assert_eq!(
            ChannelId::new(MAX_SAFE_INTEGER).unwrap().encoded_len(),
            MAX_CHANNEL_ID_WIDTH
        );
        assert_eq!(ChannelId::from(5u16).encode().as_ref(), &[5]);
    }

    #[test]
    fn error_message_names_bound() {
        let err = InvalidChannelId::new("x");
        assert_eq!(
            err.to_string(),
            "channel id must be an integer in 0..=9007199254740991, got x"
        );
    }
}
