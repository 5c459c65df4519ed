// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const MAX_CURSOR_BYTES: usize = 4096;

/// Keyset pagination position, signed and bound to a hash of the query that
/// produced it. Ordering is (created_at, id), ascending for the pending queue
/// and descending for search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CursorPayload {
    pub order: String,
    pub last_created_at: String,
    pub last_id: i64,
    pub query_hash: String,
}

pub fn encode_cursor(payload: &CursorPayload, secret: &[u8]) -> Result<String, StoreError> {
    let payload_bytes =
        serde_json::to_vec(payload).map_err(|_| StoreError::Corrupt("cursor payload"))?;
    let payload_part = URL_SAFE_NO_PAD.encode(payload_bytes);
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| StoreError::Corrupt("cursor secret"))?;
    mac.update(payload_part.as_bytes());
    let sig_part = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{payload_part}.{sig_part}"))
}

pub fn decode_cursor(
    token: &str,
    secret: &[u8],
    expected_order: &str,
    expected_hash: &str,
) -> Result<CursorPayload, StoreError> {
    if token.len() > MAX_CURSOR_BYTES {
        return Err(StoreError::InvalidCursor);
    }
    let (payload_part, sig_part) = token.split_once('.').ok_or(StoreError::InvalidCursor)?;

    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| StoreError::Corrupt("cursor secret"))?;
    mac.update(payload_part.as_bytes());
    let sig = URL_SAFE_NO_PAD
        .decode(sig_part)
        .map_err(|_| StoreError::InvalidCursor)?;
    mac.verify_slice(&sig).map_err(|_| StoreError::InvalidCursor)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_part)
        .map_err(|_| StoreError::InvalidCursor)?;
    let payload: CursorPayload =
        serde_json::from_slice(&payload_bytes).map_err(|_| StoreError::InvalidCursor)?;

    if payload.order != expected_order || payload.query_hash != expected_hash {
        return Err(StoreError::InvalidCursor);
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-cursor-secret";

    fn payload() -> CursorPayload {
        CursorPayload {
            order: "search".to_string(),
            last_created_at: "2026-08-27T10:00:00.000000Z".to_string(),
            last_id: 17,
            query_hash: "abc123".to_string(),
        }
    }

    #[test]
    fn cursor_round_trips_with_matching_query() {
        let token = encode_cursor(&payload(), SECRET).expect("encode");
        let decoded = decode_cursor(&token, SECRET, "search", "abc123").expect("decode");
        assert_eq!(decoded, payload());
    }

    #[test]
    fn tampered_cursor_is_rejected() {
        let token = encode_cursor(&payload(), SECRET).expect("encode");
        let mut tampered = token.clone();
        tampered.replace_range(0..1, "Z");
        assert!(matches!(
            decode_cursor(&tampered, SECRET, "search", "abc123"),
            Err(StoreError::InvalidCursor)
        ));
    }

    #[test]
    fn cursor_is_bound_to_query_hash_and_order() {
        let token = encode_cursor(&payload(), SECRET).expect("encode");
        assert!(decode_cursor(&token, SECRET, "search", "other").is_err());
        assert!(decode_cursor(&token, SECRET, "pending", "abc123").is_err());
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let token = encode_cursor(&payload(), SECRET).expect("encode");
        assert!(decode_cursor(&token, b"another-secret", "search", "abc123").is_err());
    }
}
