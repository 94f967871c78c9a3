//! Value codecs: how a channel turns application values into payload bytes
//! and back.
//!
//! The multiplexer never looks inside payloads. Each channel carries one
//! [`ValueCodec`]; channels declared with a bare id use [`RawCodec`] and move
//! [`Bytes`] unchanged.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::descriptor::EncodingKind;
use crate::error::BoxError;

/// Encoding capability attached to a channel.
///
/// Both directions must be pure: the same value always yields the same
/// bytes, and decoding does not depend on earlier frames.
pub trait ValueCodec: Send + Sync + 'static {
    /// Application-level value carried by the channel.
    type Value: Send + 'static;

    /// Serialize one value into one frame payload.
    fn encode(&self, value: Self::Value) -> Result<Bytes, BoxError>;

    /// Deserialize one frame payload.
    fn decode(&self, payload: Bytes) -> Result<Self::Value, BoxError>;
}

/// Identity codec for byte channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCodec;

impl ValueCodec for RawCodec {
    type Value = Bytes;

    fn encode(&self, value: Bytes) -> Result<Bytes, BoxError> {
        Ok(value)
    }

    fn decode(&self, payload: Bytes) -> Result<Bytes, BoxError> {
        Ok(payload)
    }
}

/// JSON codec for any serde type.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> ValueCodec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    type Value = T;

    fn encode(&self, value: T) -> Result<Bytes, BoxError> {
        Ok(serde_json::to_vec(&value)?.into())
    }

    fn decode(&self, payload: Bytes) -> Result<T, BoxError> {
        Ok(serde_json::from_slice(&payload)?)
    }
}

/// Codec built from a pair of functions.
pub struct FnCodec<V, E, D> {
    encode: E,
    decode: D,
    _marker: PhantomData<fn() -> V>,
}

impl<V, E, D> FnCodec<V, E, D>
where
    E: Fn(V) -> Result<Bytes, BoxError>,
    D: Fn(Bytes) -> Result<V, BoxError>,
{
    pub fn new(encode: E, decode: D) -> Self {
        Self {
            encode,
            decode,
            _marker: PhantomData,
        }
    }
}

impl<V, E, D> ValueCodec for FnCodec<V, E, D>
where
    V: Send + 'static,
    E: Fn(V) -> Result<Bytes, BoxError> + Send + Sync + 'static,
    D: Fn(Bytes) -> Result<V, BoxError> + Send + Sync + 'static,
{
    type Value = V;

    fn encode(&self, value: V) -> Result<Bytes, BoxError> {
        (self.encode)(value)
    }

    fn decode(&self, payload: Bytes) -> Result<V, BoxError> {
        (self.decode)(payload)
    }
}

/// Value on a channel whose encoding is chosen at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Bytes(Bytes),
    Json(serde_json::Value),
}

impl Message {
    /// Payload bytes as they would travel on a raw channel.
    pub fn to_bytes(&self) -> Result<Bytes, BoxError> {
        match self {
            Message::Bytes(bytes) => Ok(bytes.clone()),
            Message::Json(value) => Ok(serde_json::to_vec(value)?.into()),
        }
    }
}

impl From<Bytes> for Message {
    fn from(bytes: Bytes) -> Self {
        Message::Bytes(bytes)
    }
}

impl From<serde_json::Value> for Message {
    fn from(value: serde_json::Value) -> Self {
        Message::Json(value)
    }
}

impl ValueCodec for EncodingKind {
    type Value = Message;

    fn encode(&self, value: Message) -> Result<Bytes, BoxError> {
        match (self, value) {
            (EncodingKind::Json, Message::Bytes(bytes)) => {
                // Bytes on a JSON channel must already be JSON text.
                serde_json::from_slice::<serde::de::IgnoredAny>(&bytes)?;
                Ok(bytes)
            }
            (_, value) => value.to_bytes(),
        }
    }

    fn decode(&self, payload: Bytes) -> Result<Message, BoxError> {
        match self {
            EncodingKind::Raw => Ok(Message::Bytes(payload)),
            EncodingKind::Json => Ok(Message::Json(serde_json::from_slice(&payload)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn raw_codec_is_identity() {
        let payload = Bytes::from_static(b"\x00\x01binary");
        assert_eq!(RawCodec.encode(payload.clone()).unwrap(), payload);
        assert_eq!(RawCodec.decode(payload.clone()).unwrap(), payload);
    }

    #[test]
    fn json_codec_roundtrip() {
        let codec = JsonCodec::<Point>::new();
        let bytes = codec.encode(Point { x: 1, y: -2 }).unwrap();
        assert_eq!(bytes.as_ref(), br#"{"x":1,"y":-2}"#);
        assert_eq!(codec.decode(bytes).unwrap(), Point { x: 1, y: -2 });
    }

    #[test]
    fn json_codec_rejects_garbage() {
        let codec = JsonCodec::<Point>::new();
        assert!(codec.decode(Bytes::from_static(b"{not json")).is_err());
    }

    #[test]
    fn fn_codec_uses_given_functions() {
        let codec = FnCodec::new(
            |n: u32| Ok(Bytes::copy_from_slice(&n.to_be_bytes())),
            |b: Bytes| {
                let arr: [u8; 4] = b.as_ref().try_into()?;
                Ok(u32::from_be_bytes(arr))
            },
        );
        let bytes = codec.encode(0xdead_beef).unwrap();
        assert_eq!(bytes.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(codec.decode(bytes).unwrap(), 0xdead_beef);
        assert!(codec.decode(Bytes::from_static(b"xy")).is_err());
    }

    #[test]
    fn encoding_kind_json_checks_bytes() {
        let ok = EncodingKind::Json
            .encode(Message::Bytes(Bytes::from_static(b"[1,2]")))
            .unwrap();
        assert_eq!(ok.as_ref(), b"[1,2]");
        assert!(EncodingKind::Json
            .encode(Message::Bytes(Bytes::from_static(b"nope")))
            .is_err());
    }

    #[test]
    fn encoding_kind_decodes_by_kind() {
        let payload = Bytes::from_static(br#"{"a":1}"#);
        assert_eq!(
            EncodingKind::Json.decode(payload.clone()).unwrap(),
            Message::Json(json!({"a": 1}))
        );
        assert_eq!(
            EncodingKind::Raw.decode(payload.clone()).unwrap(),
            Message::Bytes(payload)
        );
    }

    #[test]
    fn raw_kind_serializes_json_messages() {
        let bytes = EncodingKind::Raw.encode(json!({"a": 1}).into()).unwrap();
        assert_eq!(bytes.as_ref(), br#"{"a":1}"#);
    }
}
