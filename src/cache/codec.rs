//! Entry Codec Module
//!
//! Serializes result values and frames them for storage on disk.
//!
//! Frame layout:
//!
//! ```text
//! MAGIC (10) | key (64, ascii hex) | sha256(payload) (32) | len (8, LE) | payload
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::cache::key::{CacheKey, KEY_HEX_LEN};
use crate::cache::serializer;
use crate::error::{CacheError, Result};

const MAGIC: &[u8; 10] = b"DISKMEMO\x00\x01";
const CHECKSUM_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + KEY_HEX_LEN + CHECKSUM_LEN + 8;

// == Entry Serializer ==
/// Encodes a result value into payload bytes.
///
/// Values holding NaN or an infinity fail with [`CacheError::Encoding`]:
/// JSON would store them as `null` and read back a different answer.
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serializer::check_payload(value)?;
    Ok(serde_json::to_vec(value)?)
}

/// Decodes payload bytes produced by [`encode_value`].
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

// == Framing ==
/// Wraps `payload` in a self-validating frame bound to `key`.
pub fn frame(key: &CacheKey, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(key.as_str().as_bytes());
    out.extend_from_slice(&Sha256::digest(payload));
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validates a frame read back for `key` and returns its payload.
pub fn unframe(key: &CacheKey, bytes: &[u8]) -> Result<Vec<u8>> {
    let corrupt = |reason: &str| CacheError::corruption(key.as_str(), reason);

    if bytes.len() < HEADER_LEN {
        return Err(corrupt("truncated header"));
    }
    let (magic, rest) = bytes.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let (stored_key, rest) = rest.split_at(KEY_HEX_LEN);
    if stored_key != key.as_str().as_bytes() {
        return Err(corrupt("entry belongs to a different key"));
    }
    let (checksum, rest) = rest.split_at(CHECKSUM_LEN);
    let (len, payload) = rest.split_at(8);

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(len);
    if u64::from_le_bytes(len_bytes) != payload.len() as u64 {
        return Err(corrupt("payload length mismatch"));
    }
    if Sha256::digest(payload).as_slice() != checksum {
        return Err(corrupt("checksum mismatch"));
    }

    Ok(payload.to_vec())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::{fingerprint, Args};
    use std::collections::BTreeMap;

    fn key(n: i64) -> CacheKey {
        fingerprint(&Args::new().arg(n)).unwrap()
    }

    #[test]
    fn test_value_roundtrip_nested() {
        let mut value = BTreeMap::new();
        value.insert("user_id".to_string(), serde_json::json!(100));
        value.insert("data".to_string(), serde_json::json!(["a", 1.5, null]));

        let bytes = encode_value(&value).unwrap();
        let back: BTreeMap<String, serde_json::Value> = decode_value(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_float_roundtrip_is_bit_exact() {
        for v in [1.0715660391465826e-75, 0.1 + 0.2, f64::MIN_POSITIVE, -0.0, 5e-324] {
            let back: f64 = decode_value(&encode_value(&v).unwrap()).unwrap();
            assert_eq!(back.to_bits(), v.to_bits());
        }
    }

    #[test]
    fn test_non_finite_results_are_not_encodable() {
        assert!(matches!(
            encode_value(&f64::NAN),
            Err(CacheError::Encoding(_))
        ));
        assert!(matches!(
            encode_value(&Some(f64::NAN)),
            Err(CacheError::Encoding(_))
        ));
        assert!(matches!(
            encode_value(&vec![1.0f32, f32::INFINITY]),
            Err(CacheError::Encoding(_))
        ));
    }

    #[test]
    fn test_wide_integers_still_encode() {
        let back: u64 = decode_value(&encode_value(&u64::MAX).unwrap()).unwrap();
        assert_eq!(back, u64::MAX);
    }

    #[test]
    fn test_decode_wrong_type_fails() {
        let bytes = encode_value(&"text").unwrap();
        assert!(decode_value::<u32>(&bytes).is_err());
    }

    #[test]
    fn test_frame_unframe() {
        let k = key(1);
        let framed = frame(&k, b"payload");
        assert_eq!(unframe(&k, &framed).unwrap(), b"payload");
    }

    #[test]
    fn test_unframe_empty_payload() {
        let k = key(1);
        let framed = frame(&k, b"");
        assert!(unframe(&k, &framed).unwrap().is_empty());
    }

    #[test]
    fn test_unframe_detects_truncation() {
        let k = key(1);
        let framed = frame(&k, b"some longer payload");
        let cut = &framed[..framed.len() - 3];
        assert!(matches!(
            unframe(&k, cut),
            Err(CacheError::Corruption { .. })
        ));
        assert!(unframe(&k, &framed[..5]).is_err());
    }

    #[test]
    fn test_unframe_detects_bit_flip() {
        let k = key(1);
        let mut framed = frame(&k, b"payload");
        let last = framed.len() - 1;
        framed[last] ^= 0x01;
        assert!(matches!(
            unframe(&k, &framed),
            Err(CacheError::Corruption { .. })
        ));
    }

    #[test]
    fn test_unframe_rejects_foreign_key() {
        let framed = frame(&key(1), b"payload");
        assert!(unframe(&key(2), &framed).is_err());
    }

    #[test]
    fn test_unframe_rejects_garbage() {
        let k = key(1);
        assert!(unframe(&k, b"").is_err());
        assert!(unframe(&k, &[0xAB; 200]).is_err());
    }
}
