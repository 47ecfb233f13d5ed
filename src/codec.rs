//! MessagePack wire codec for work items.
//!
//! Items are written as named-field maps so the schema is explicit and
//! optional fields fall back to declared defaults when absent. The lease is
//! never part of the wire form.

use crate::error::{Error, Result};
use crate::model::{DEFAULT_METHOD, DEFAULT_TIMEOUT_MS, WorkItem};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted form of a [`WorkItem`].
#[derive(Debug, Serialize, Deserialize)]
struct WireRequest {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    cookies: Option<BTreeMap<String, String>>,
    #[serde(default, with = "opt_bytes")]
    body: Option<Vec<u8>>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    retries: u32,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default)]
    proxy: Option<String>,
    #[serde(default)]
    meta: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    ts: i64,
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Encode a work item. Stamps the timestamp with the current time if unset.
pub fn encode(item: &WorkItem) -> Result<Vec<u8>> {
    if item.url.is_empty() {
        return Err(Error::InvalidInput("work item url is empty".to_string()));
    }

    let wire = WireRequest {
        url: item.url.clone(),
        method: item.method.clone(),
        headers: item.headers.clone(),
        cookies: item.cookies.clone(),
        body: item.body.clone(),
        priority: item.priority,
        retries: item.retries,
        timeout_ms: item.timeout_ms,
        proxy: item.proxy.clone(),
        meta: item.meta.clone(),
        ts: item
            .timestamp_ms
            .filter(|ts| *ts != 0)
            .unwrap_or_else(|| Utc::now().timestamp_millis()),
    };

    rmp_serde::to_vec_named(&wire).map_err(|e| Error::Other(format!("encode work item: {e}")))
}

/// Decode bytes produced by [`encode`].
///
/// An empty slice is not a payload at all and yields `InvalidInput`; bytes
/// that don't match the schema yield `Decode`.
pub fn decode(data: &[u8]) -> Result<WorkItem> {
    if data.is_empty() {
        return Err(Error::InvalidInput("decode expects a non-empty payload".to_string()));
    }

    let wire: WireRequest =
        rmp_serde::from_slice(data).map_err(|e| Error::Decode(e.to_string()))?;

    if wire.url.is_empty() {
        return Err(Error::Decode("url is empty".to_string()));
    }

    Ok(WorkItem {
        url: wire.url,
        method: wire.method,
        headers: wire.headers,
        cookies: wire.cookies,
        body: wire.body,
        priority: wire.priority,
        retries: wire.retries,
        timeout_ms: wire.timeout_ms,
        proxy: wire.proxy,
        meta: wire.meta,
        timestamp_ms: (wire.ts != 0).then_some(wire.ts),
        lease: None,
    })
}

/// Writes `Option<Vec<u8>>` as a MessagePack bin instead of an integer array.
mod opt_bytes {
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_bytes(bytes),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        d.deserialize_option(OptBytesVisitor)
    }

    struct OptBytesVisitor;

    impl<'de> Visitor<'de> for OptBytesVisitor {
        type Value = Option<Vec<u8>>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("binary data or nil")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_byte_buf(BytesVisitor).map(Some)
        }
    }

    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("binary data")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.as_bytes().to_vec())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(b) = seq.next_element::<u8>()? {
                out.push(b);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_preserves_every_field() {
        let item = WorkItem::new("https://example.com/complex")
            .method("POST")
            .header("User-Agent", "test")
            .header("X-Custom", "value")
            .cookie("sid", "42")
            .body(b"request body".to_vec())
            .priority(5)
            .retries(2)
            .timeout_ms(2_500)
            .proxy("http://proxy:8080")
            .meta("depth", json!(2))
            .meta("custom", json!({"nested": [1, 2, 3]}))
            .timestamp_ms(1_700_000_000_000);

        let bytes = encode(&item).unwrap();
        assert_eq!(decode(&bytes).unwrap(), item);
    }

    #[test]
    fn round_trip_keeps_absent_optionals_absent() {
        let item = WorkItem::new("https://example.com").timestamp_ms(1);
        let decoded = decode(&encode(&item).unwrap()).unwrap();

        assert_eq!(decoded, item);
        assert!(decoded.headers.is_none());
        assert!(decoded.cookies.is_none());
        assert!(decoded.body.is_none());
        assert!(decoded.proxy.is_none());
        assert!(decoded.meta.is_none());
    }

    #[test]
    fn encode_stamps_missing_timestamp() {
        let before = Utc::now().timestamp_millis();
        let decoded = decode(&encode(&WorkItem::new("https://example.com")).unwrap()).unwrap();
        let ts = decoded.timestamp_ms.expect("timestamp stamped");
        assert!(ts >= before);
    }

    #[test]
    fn body_is_written_as_binary() {
        let item = WorkItem::new("u").body(vec![0xde, 0xad]).timestamp_ms(1);
        let bytes = encode(&item).unwrap();
        // bin8 marker, length 2, then the raw bytes
        assert!(bytes.windows(4).any(|w| w == [0xc4, 0x02, 0xde, 0xad]));
    }

    #[test]
    fn missing_optional_fields_take_declared_defaults() {
        #[derive(Serialize)]
        struct Minimal<'a> {
            url: &'a str,
        }
        let bytes = rmp_serde::to_vec_named(&Minimal { url: "https://a" }).unwrap();
        let item = decode(&bytes).unwrap();

        assert_eq!(item.method, "GET");
        assert_eq!(item.priority, 0);
        assert_eq!(item.retries, 0);
        assert_eq!(item.timeout_ms, 10_000);
        assert!(item.timestamp_ms.is_none());
    }

    #[test]
    fn malformed_bytes_are_decode_errors() {
        let err = decode(b"this-is-not-valid-serialized-request").unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "got {err:?}");
    }

    #[test]
    fn empty_input_is_invalid_input() {
        let err = decode(&[]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "got {err:?}");
    }

    #[test]
    fn empty_url_is_rejected_on_encode() {
        let err = encode(&WorkItem::new("")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "got {err:?}");
    }
}
