// Session token codec
//
// Token layout (33 bytes):
//   [0]      format version
//   [1..17]  session id, big-endian u128
//   [17..33] HMAC-SHA256(secret, version || session id), truncated to 16 bytes

use crate::error::TokenError;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_VERSION: u8 = 0x01;
pub const SESSION_ID_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
pub const TOKEN_LEN: usize = 1 + SESSION_ID_LEN + TAG_LEN;

/// Opaque fixed-length session token
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken([u8; TOKEN_LEN]);

impl SessionToken {
    /// Wrap raw bytes without verifying the integrity tag
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TokenError> {
        let raw: [u8; TOKEN_LEN] = bytes.try_into().map_err(|_| TokenError::InvalidToken)?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// URL-safe text form used on the wire
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, TokenError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| TokenError::InvalidToken)?;
        Self::from_bytes(&bytes)
    }

    /// Short hash that identifies the token in logs and audit records
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({})", self.fingerprint())
    }
}

impl Serialize for SessionToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for SessionToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        SessionToken::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Binds session identifiers to an integrity tag under a server secret.
/// Stateless once constructed; safe to share across threads.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::InvalidToken);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidToken)?;
        Ok(Self { mac })
    }

    pub fn encode(&self, session_id: u128) -> SessionToken {
        let mut raw = [0u8; TOKEN_LEN];
        raw[0] = TOKEN_VERSION;
        raw[1..1 + SESSION_ID_LEN].copy_from_slice(&session_id.to_be_bytes());

        let mut mac = self.mac.clone();
        mac.update(&raw[..1 + SESSION_ID_LEN]);
        let tag = mac.finalize().into_bytes();
        raw[1 + SESSION_ID_LEN..].copy_from_slice(&tag[..TAG_LEN]);

        SessionToken(raw)
    }

    /// Verify the tag and extract the session id. Fails closed on any malformed input.
    pub fn decode(&self, token: &[u8]) -> Result<u128, TokenError> {
        if token.len() != TOKEN_LEN || token[0] != TOKEN_VERSION {
            return Err(TokenError::InvalidToken);
        }

        let (payload, tag) = token.split_at(1 + SESSION_ID_LEN);
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.verify_truncated_left(tag)
            .map_err(|_| TokenError::InvalidToken)?;

        let id_bytes: [u8; SESSION_ID_LEN] = payload[1..]
            .try_into()
            .map_err(|_| TokenError::InvalidToken)?;
        Ok(u128::from_be_bytes(id_bytes))
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenCodec { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_decode_recovers_session_id() {
        let codec = TokenCodec::new(SECRET).unwrap();
        for id in [0u128, 1, 42, u128::MAX, 0x677c6781_a7604baf_92691311_454d34e3] {
            let token = codec.encode(id);
            assert_eq!(codec.decode(token.as_bytes()).unwrap(), id);
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let codec = TokenCodec::new(SECRET).unwrap();
        assert_eq!(codec.encode(7), codec.encode(7));
        assert_ne!(codec.encode(7), codec.encode(8));
    }

    #[test]
    fn test_any_single_bit_flip_is_rejected() {
        let codec = TokenCodec::new(SECRET).unwrap();
        let token = codec.encode(0xdead_beef_u128 << 64 | 0x1234);

        for byte in 0..TOKEN_LEN {
            for bit in 0..8 {
                let mut tampered = token.as_bytes().to_vec();
                tampered[byte] ^= 1 << bit;
                assert_eq!(
                    codec.decode(&tampered),
                    Err(TokenError::InvalidToken),
                    "flip of byte {} bit {} was accepted",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let codec = TokenCodec::new(SECRET).unwrap();
        let other = TokenCodec::new(b"another-secret-another-secret-xx").unwrap();
        let token = codec.encode(99);
        assert_eq!(other.decode(token.as_bytes()), Err(TokenError::InvalidToken));
    }

    #[test]
    fn test_malformed_lengths_are_rejected() {
        let codec = TokenCodec::new(SECRET).unwrap();
        let token = codec.encode(5);

        assert!(codec.decode(&[]).is_err());
        assert!(codec.decode(&token.as_bytes()[..TOKEN_LEN - 1]).is_err());

        let mut longer = token.as_bytes().to_vec();
        longer.push(0);
        assert!(codec.decode(&longer).is_err());
    }

    #[test]
    fn test_empty_secret_is_refused() {
        assert!(TokenCodec::new(b"").is_err());
    }

    #[test]
    fn test_base64_text_form() {
        let codec = TokenCodec::new(SECRET).unwrap();
        let token = codec.encode(123);
        let text = token.to_base64();

        assert!(!text.contains('='));
        assert_eq!(SessionToken::from_base64(&text).unwrap(), token);
        assert!(SessionToken::from_base64("not base64!").is_err());
        assert!(SessionToken::from_base64("c2hvcnQ").is_err());
    }

    #[test]
    fn test_fingerprint_does_not_reveal_token() {
        let codec = TokenCodec::new(SECRET).unwrap();
        let token = codec.encode(123);
        let fingerprint = token.fingerprint();

        assert_eq!(fingerprint.len(), 16);
        assert!(!token.to_base64().contains(&fingerprint));
        assert_eq!(format!("{:?}", token), format!("SessionToken({})", fingerprint));
    }
}
