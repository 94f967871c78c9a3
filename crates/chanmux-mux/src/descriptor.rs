//! Channel descriptors and their validation.
//!
//! Typed callers build [`ChannelSpec`]s directly; ids are checked by
//! [`ChannelId`] and codecs are checked by the type system. Configuration
//! and command lines describe channels as text (`"0,1:json"`) or JSON
//! (`[0, {"id": 1, "encoding": "json"}]`); those entries are validated
//! into [`ChannelEntry`]s here.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chanmux_frame::{ChannelId, InvalidChannelId, MAX_SAFE_INTEGER};
use serde_json::Value;

use crate::codec::{RawCodec, ValueCodec};
use crate::error::{MuxError, Result};

/// One logical channel: its id and the codec for its values.
pub struct ChannelSpec<C = RawCodec> {
    id: ChannelId,
    codec: Arc<C>,
}

impl ChannelSpec<RawCodec> {
    /// A byte channel.
    pub fn raw(id: ChannelId) -> Self {
        Self::new(id, RawCodec)
    }
}

impl<C: ValueCodec> ChannelSpec<C> {
    /// A channel carrying values of `C::Value`.
    pub fn new(id: ChannelId, codec: C) -> Self {
        Self::with_shared_codec(id, Arc::new(codec))
    }

    /// A channel sharing a codec instance with other channels.
    pub fn with_shared_codec(id: ChannelId, codec: Arc<C>) -> Self {
        Self { id, codec }
    }
}

impl<C> ChannelSpec<C> {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub(crate) fn codec(&self) -> &Arc<C> {
        &self.codec
    }
}

impl<C> Clone for ChannelSpec<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            codec: Arc::clone(&self.codec),
        }
    }
}

impl<C> fmt::Debug for ChannelSpec<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSpec")
            .field("id", &self.id)
            .field("codec", &std::any::type_name::<C>())
            .finish()
    }
}

impl From<ChannelId> for ChannelSpec<RawCodec> {
    fn from(id: ChannelId) -> Self {
        Self::raw(id)
    }
}

impl From<u16> for ChannelSpec<RawCodec> {
    fn from(id: u16) -> Self {
        Self::raw(id.into())
    }
}

impl From<u32> for ChannelSpec<RawCodec> {
    fn from(id: u32) -> Self {
        Self::raw(id.into())
    }
}

impl TryFrom<u64> for ChannelSpec<RawCodec> {
    type Error = MuxError;

    fn try_from(id: u64) -> Result<Self> {
        Ok(Self::raw(ChannelId::try_from(id)?))
    }
}

impl TryFrom<i64> for ChannelSpec<RawCodec> {
    type Error = MuxError;

    fn try_from(id: i64) -> Result<Self> {
        Ok(Self::raw(ChannelId::try_from(id)?))
    }
}

/// Encodings that can be named in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EncodingKind {
    /// Bytes pass through unchanged.
    #[default]
    Raw,
    /// Payloads are JSON documents.
    Json,
}

impl EncodingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EncodingKind::Raw => "raw",
            EncodingKind::Json => "json",
        }
    }
}

impl fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncodingKind {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "raw" => Ok(EncodingKind::Raw),
            "json" => Ok(EncodingKind::Json),
            "" => Err(MuxError::InvalidEncoding("encoding name is empty".to_string())),
            other => Err(MuxError::InvalidEncoding(format!(
                "unknown encoding '{other}' (expected raw or json)"
            ))),
        }
    }
}

/// A validated channel entry from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEntry {
    pub id: ChannelId,
    pub encoding: EncodingKind,
}

impl ChannelEntry {
    /// Validate one JSON entry: a bare id or `{"id": .., "encoding": ..}`.
    pub fn from_json(entry: &Value) -> Result<Self> {
        match entry {
            Value::Null => Err(MuxError::InvalidChannelSpec(
                "channel entry cannot be null".to_string(),
            )),
            Value::Object(map) => {
                let id = match map.get("id") {
                    None | Some(Value::Null) => {
                        return Err(MuxError::InvalidChannelSpec(
                            "channel entry has no id".to_string(),
                        ))
                    }
                    Some(id) => json_channel_id(id)?,
                };
                let encoding = match map.get("encoding") {
                    None => EncodingKind::Raw,
                    Some(Value::String(name)) => name.parse()?,
                    Some(other) => {
                        return Err(MuxError::InvalidEncoding(format!(
                            "encoding must be a name, got {other}"
                        )))
                    }
                };
                Ok(Self { id, encoding })
            }
            other => Ok(Self {
                id: json_channel_id(other)?,
                encoding: EncodingKind::Raw,
            }),
        }
    }

    /// Build the channel spec this entry describes.
    pub fn into_spec(self) -> ChannelSpec<EncodingKind> {
        ChannelSpec::new(self.id, self.encoding)
    }
}

impl FromStr for ChannelEntry {
    type Err = MuxError;

    /// Parse `ID` or `ID:ENCODING`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MuxError::InvalidChannelSpec(
                "channel entry is empty".to_string(),
            ));
        }
        let (id, encoding) = match s.split_once(':') {
            Some((id, encoding)) => (id, encoding.parse()?),
            None => (s, EncodingKind::Raw),
        };
        Ok(Self {
            id: id.parse()?,
            encoding,
        })
    }
}

impl fmt::Display for ChannelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.encoding)
    }
}

/// Parse a channel list.
///
/// Accepts a JSON array (`[0, {"id": 1, "encoding": "json"}]`) or a
/// comma-separated list (`0,1:json`). The result is non-empty and free of
/// duplicate ids.
pub fn parse_channel_list(input: &str) -> Result<Vec<ChannelEntry>> {
    let trimmed = input.trim();
    let entries = if trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed).map_err(|err| {
            MuxError::InvalidChannelSpec(format!("channel list is not valid JSON: {err}"))
        })?;
        parse_channel_json(&value)?
    } else {
        trimmed
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<ChannelEntry>>>()?
    };
    validate_ids(entries.iter().map(|entry| entry.id))?;
    Ok(entries)
}

/// Validate a JSON channel list.
pub fn parse_channel_json(value: &Value) -> Result<Vec<ChannelEntry>> {
    let Value::Array(items) = value else {
        return Err(MuxError::InvalidChannelSpec(
            "channel list must be an array".to_string(),
        ));
    };
    items.iter().map(ChannelEntry::from_json).collect()
}

/// Check that a channel set is non-empty and has pairwise-distinct ids.
pub fn validate_ids(ids: impl IntoIterator<Item = ChannelId>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(MuxError::DuplicateChannelId(id));
        }
    }
    if seen.is_empty() {
        return Err(MuxError::InvalidChannelSpec(
            "at least one channel is required".to_string(),
        ));
    }
    Ok(())
}

/// JSON numbers are ids when they are whole and safe, so `2.0` is id 2.
fn json_channel_id(value: &Value) -> Result<ChannelId> {
    let Value::Number(n) = value else {
        return Err(InvalidChannelId::new(value.to_string()).into());
    };
    if let Some(id) = n.as_u64() {
        return Ok(ChannelId::try_from(id)?);
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && (0.0..=MAX_SAFE_INTEGER as f64).contains(&f) => {
            Ok(ChannelId::try_from(f as u64)?)
        }
        _ => Err(InvalidChannelId::new(n.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn id(n: u64) -> ChannelId {
        ChannelId::new(n).unwrap()
    }

    #[test]
    fn parses_bare_and_encoded_entries() {
        let entries = parse_channel_list("0, 1:json ,2:raw").unwrap();
        assert_eq!(
            entries,
            vec![
                ChannelEntry { id: id(0), encoding: EncodingKind::Raw },
                ChannelEntry { id: id(1), encoding: EncodingKind::Json },
                ChannelEntry { id: id(2), encoding: EncodingKind::Raw },
            ]
        );
    }

    #[test]
    fn parses_json_list() {
        let entries = parse_channel_list(r#"[0, {"id": 1, "encoding": "json"}, {"id": 7}]"#).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].encoding, EncodingKind::Json);
        assert_eq!(entries[2], ChannelEntry { id: id(7), encoding: EncodingKind::Raw });
    }

    #[test]
    fn whole_float_ids_are_accepted() {
        let entries = parse_channel_json(&json!([1.0, {"id": 2.0, "encoding": "json"}])).unwrap();
        assert_eq!(
            entries,
            vec![
                ChannelEntry { id: id(1), encoding: EncodingKind::Raw },
                ChannelEntry { id: id(2), encoding: EncodingKind::Json },
            ]
        );
        assert_eq!(ChannelEntry::from_json(&json!(0.0)).unwrap().id, id(0));
        assert_eq!(
            ChannelEntry::from_json(&json!(9_007_199_254_740_991.0)).unwrap().id,
            id(MAX_SAFE_INTEGER)
        );

        for bad in [json!(2.5), json!(-1.0), json!(9_007_199_254_740_992.0), json!(1e300)] {
            let err = ChannelEntry::from_json(&bad).unwrap_err();
            assert!(matches!(err, MuxError::InvalidChannelId(_)), "{bad} should be rejected");
        }
    }

    #[test]
    fn null_entry_is_invalid_spec() {
        let err = ChannelEntry::from_json(&Value::Null).unwrap_err();
        assert!(matches!(err, MuxError::InvalidChannelSpec(_)));
        let err = parse_channel_list("0,,1").unwrap_err();
        assert!(matches!(err, MuxError::InvalidChannelSpec(_)));
    }

    #[test]
    fn non_integer_ids_are_invalid() {
        for bad in [json!(1.5), json!(-1), json!("3"), json!(true), json!(9_007_199_254_740_992u64)] {
            let err = ChannelEntry::from_json(&bad).unwrap_err();
            assert!(matches!(err, MuxError::InvalidChannelId(_)), "{bad} should be rejected");
        }
        assert!(matches!(
            "x:json".parse::<ChannelEntry>(),
            Err(MuxError::InvalidChannelId(_))
        ));
        assert!(matches!(
            "-4".parse::<ChannelEntry>(),
            Err(MuxError::InvalidChannelId(_))
        ));
    }

    #[test]
    fn object_entry_requires_id() {
        let err = ChannelEntry::from_json(&json!({"encoding": "json"})).unwrap_err();
        assert!(matches!(err, MuxError::InvalidChannelSpec(_)));
    }

    #[test]
    fn unknown_encoding_is_invalid() {
        assert!(matches!(
            "1:msgpack".parse::<ChannelEntry>(),
            Err(MuxError::InvalidEncoding(_))
        ));
        assert!(matches!(
            "1:".parse::<ChannelEntry>(),
            Err(MuxError::InvalidEncoding(_))
        ));
        assert!(matches!(
            ChannelEntry::from_json(&json!({"id": 1, "encoding": 5})),
            Err(MuxError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = parse_channel_list("1,1").unwrap_err();
        assert!(matches!(err, MuxError::DuplicateChannelId(dup) if dup.get() == 1));
    }

    #[test]
    fn list_must_be_array_and_non_empty() {
        assert!(matches!(
            parse_channel_json(&json!({"id": 1})),
            Err(MuxError::InvalidChannelSpec(_))
        ));
        assert!(matches!(
            parse_channel_list("[]"),
            Err(MuxError::InvalidChannelSpec(_))
        ));
    }

    #[test]
    fn spec_conversions_validate_ids() {
        assert_eq!(ChannelSpec::<RawCodec>::from(3u16).id().get(), 3);
        assert!(ChannelSpec::<RawCodec>::try_from(-1i64).is_err());
        assert!(ChannelSpec::<RawCodec>::try_from(u64::MAX).is_err());
        assert_eq!(ChannelSpec::<RawCodec>::try_from(12u64).unwrap().id().get(), 12);
    }

    #[test]
    fn entry_display_roundtrips_through_parse() {
        let entry: ChannelEntry = "42:json".parse().unwrap();
        assert_eq!(entry.to_string(), "42:json");
        assert_eq!(entry.to_string().parse::<ChannelEntry>().unwrap(), entry);
    }
}
