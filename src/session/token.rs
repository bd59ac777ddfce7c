//! Self-authenticating session token.
//!
//! Wire layout: `salt(4) || id(16) || created_at(4, big endian) || mac(32)`, where
//! `mac = HMAC-SHA256(server_key || salt, payload)`. Cookies carry it as base64url
//! without padding.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SALT_LEN: usize = 4;
const ID_LEN: usize = 16;
const CREATED_AT_LEN: usize = 4;
pub const PAYLOAD_LEN: usize = SALT_LEN + ID_LEN + CREATED_AT_LEN;
pub const MAC_LEN: usize = 32;
pub const TOKEN_LEN: usize = PAYLOAD_LEN + MAC_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token length: {0}")]
    InvalidLength(usize),
    #[error("token signature mismatch")]
    InvalidSignature,
    #[error("invalid token encoding")]
    InvalidEncoding,
    #[error("invalid signing key")]
    InvalidKey,
    #[error("failed to generate token randomness")]
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionToken {
    id: Uuid,
    created_at: u32,
    salt: [u8; SALT_LEN],
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u32::try_from(elapsed.as_secs()).unwrap_or(u32::MAX))
}

fn mac_for(key: &[u8], salt: &[u8]) -> Result<HmacSha256, TokenError> {
    let mut salted = Vec::with_capacity(key.len() + salt.len());
    salted.extend_from_slice(key);
    salted.extend_from_slice(salt);
    HmacSha256::new_from_slice(&salted).map_err(|_| TokenError::InvalidKey)
}

impl SessionToken {
    /// Mint a new identity: random id, current second, fresh salt.
    ///
    /// # Errors
    /// Returns `TokenError::Random` if the OS RNG fails.
    pub fn initialize() -> Result<Self, TokenError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|_| TokenError::Random)?;
        Ok(Self {
            id: Uuid::new_v4(),
            created_at: unix_now(),
            salt,
        })
    }

    #[must_use]
    pub const fn from_parts(id: Uuid, created_at: u32, salt: [u8; SALT_LEN]) -> Self {
        Self {
            id,
            created_at,
            salt,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Unix seconds at which the token was minted.
    #[must_use]
    pub const fn created_at(&self) -> u32 {
        self.created_at
    }

    /// Per-token salt mixed into the MAC key.
    #[must_use]
    pub const fn salt(&self) -> [u8; SALT_LEN] {
        self.salt
    }

    fn payload(&self) -> [u8; PAYLOAD_LEN] {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[..SALT_LEN].copy_from_slice(&self.salt);
        payload[SALT_LEN..SALT_LEN + ID_LEN].copy_from_slice(self.id.as_bytes());
        payload[SALT_LEN + ID_LEN..].copy_from_slice(&self.created_at.to_be_bytes());
        payload
    }

    /// Payload followed by its MAC. Deterministic for a given key and token.
    ///
    /// # Errors
    /// Returns `TokenError::InvalidKey` if the MAC cannot be keyed.
    pub fn sign(&self, key: &[u8]) -> Result<Vec<u8>, TokenError> {
        let payload = self.payload();
        let mut mac = mac_for(key, &self.salt)?;
        mac.update(&payload);

        let mut signed = Vec::with_capacity(TOKEN_LEN);
        signed.extend_from_slice(&payload);
        signed.extend_from_slice(&mac.finalize().into_bytes());
        Ok(signed)
    }

    /// Verify and decode signed token bytes.
    ///
    /// # Errors
    /// Returns an error on wrong length or MAC mismatch; the comparison is constant time.
    pub fn parse(key: &[u8], bytes: &[u8]) -> Result<Self, TokenError> {
        if bytes.len() != TOKEN_LEN {
            return Err(TokenError::InvalidLength(bytes.len()));
        }
        let (payload, tag) = bytes.split_at(PAYLOAD_LEN);
        let (salt, rest) = payload.split_at(SALT_LEN);
        let (id, created_at) = rest.split_at(ID_LEN);

        let mut mac = mac_for(key, salt)?;
        mac.update(payload);
        mac.verify_slice(tag)
            .map_err(|_| TokenError::InvalidSignature)?;

        let salt: [u8; SALT_LEN] = salt.try_into().map_err(|_| TokenError::InvalidEncoding)?;
        let id = Uuid::from_slice(id).map_err(|_| TokenError::InvalidEncoding)?;
        let created_at: [u8; CREATED_AT_LEN] = created_at
            .try_into()
            .map_err(|_| TokenError::InvalidEncoding)?;

        Ok(Self {
            id,
            created_at: u32::from_be_bytes(created_at),
            salt,
        })
    }

    /// Signed token as it travels in the cookie.
    ///
    /// # Errors
    /// See [`SessionToken::sign`].
    pub fn encode(&self, key: &[u8]) -> Result<String, TokenError> {
        Ok(Base64UrlUnpadded::encode_string(&self.sign(key)?))
    }

    /// Inverse of [`SessionToken::encode`].
    ///
    /// # Errors
    /// Returns `TokenError::InvalidEncoding` for bad base64, otherwise see [`SessionToken::parse`].
    pub fn decode(key: &[u8], value: &str) -> Result<Self, TokenError> {
        let bytes =
            Base64UrlUnpadded::decode_vec(value).map_err(|_| TokenError::InvalidEncoding)?;
        Self::parse(key, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"secure!!!";

    fn uuid(hex: &str) -> Uuid {
        Uuid::parse_str(hex).unwrap()
    }

    #[test]
    fn golden_tokens() {
        let cases = [
            (
                SessionToken::from_parts(uuid("cb4647f736894bccb85dbd1bfef18855"), 0, *b"abcd"),
                "YWJjZMtGR_c2iUvMuF29G_7xiFUAAAAAoi54y4EnLqb5ggEn6ng7FKxwXw8-iAGaVdoBnas6R3A",
            ),
            (
                SessionToken::from_parts(uuid("e9725d1c68e841d388627561bb54df93"), 1, *b"1234"),
                "MTIzNOlyXRxo6EHTiGJ1YbtU35MAAAABBbfrcwqBRRsAO9JdIIxlUgSWlvR0knstidChTyBP0Lg",
            ),
            (
                SessionToken::from_parts(uuid("e9725d1c68e841d388627561bb54df93"), 0, *b"abcd"),
                "YWJjZOlyXRxo6EHTiGJ1YbtU35MAAAAAlcvsrJ7mWaLv2pFHwdjIt0JWjhUVVn0xs7dw0XcmD5Q",
            ),
        ];

        for (token, expected) in cases {
            assert_eq!(token.encode(KEY).unwrap(), expected);
            assert_eq!(SessionToken::decode(KEY, expected).unwrap(), token);
        }
    }

    #[test]
    fn sign_is_deterministic() {
        let token = SessionToken::initialize().unwrap();
        assert_eq!(token.sign(KEY).unwrap(), token.sign(KEY).unwrap());
        assert_eq!(token.sign(KEY).unwrap().len(), TOKEN_LEN);
    }

    #[test]
    fn initialize_round_trips() {
        for _ in 0..32 {
            let token = SessionToken::initialize().unwrap();
            let parsed = SessionToken::parse(KEY, &token.sign(KEY).unwrap()).unwrap();
            assert_eq!(parsed, token);
        }
    }

    #[test]
    fn initialize_mints_distinct_identities() {
        let first = SessionToken::initialize().unwrap();
        let second = SessionToken::initialize().unwrap();
        assert_ne!(first.id(), second.id());
        assert!(first.created_at() > 0);
    }

    #[test]
    fn any_flipped_byte_is_rejected() {
        let keys: [&[u8]; 3] = [KEY, b"", &[0u8; 64]];
        for key in keys {
            let signed = SessionToken::initialize().unwrap().sign(key).unwrap();
            for index in 0..signed.len() {
                for bit in [0x01u8, 0x80] {
                    let mut tampered = signed.clone();
                    tampered[index] ^= bit;
                    assert_eq!(
                        SessionToken::parse(key, &tampered),
                        Err(TokenError::InvalidSignature),
                        "byte {index} bit {bit:#x}"
                    );
                }
            }
        }
    }

    #[test]
    fn other_key_is_rejected() {
        let signed = SessionToken::initialize().unwrap().sign(KEY).unwrap();
        assert_eq!(
            SessionToken::parse(b"secure!!?", &signed),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn salt_changes_the_mac() {
        let id = Uuid::new_v4();
        let first = SessionToken::from_parts(id, 7, *b"aaaa").sign(KEY).unwrap();
        let second = SessionToken::from_parts(id, 7, *b"aaab").sign(KEY).unwrap();
        assert_ne!(first[PAYLOAD_LEN..], second[PAYLOAD_LEN..]);
        assert_eq!(SessionToken::parse(KEY, &second).unwrap().salt(), *b"aaab");
    }

    #[test]
    fn wrong_length_is_rejected() {
        let signed = SessionToken::initialize().unwrap().sign(KEY).unwrap();
        assert_eq!(
            SessionToken::parse(KEY, &signed[..TOKEN_LEN - 1]),
            Err(TokenError::InvalidLength(TOKEN_LEN - 1))
        );
        let mut longer = signed;
        longer.push(0);
        assert_eq!(
            SessionToken::parse(KEY, &longer),
            Err(TokenError::InvalidLength(TOKEN_LEN + 1))
        );
        assert_eq!(
            SessionToken::parse(KEY, &[]),
            Err(TokenError::InvalidLength(0))
        );
    }

    #[test]
    fn bad_base64_is_rejected() {
        assert_eq!(
            SessionToken::decode(KEY, "not*base64"),
            Err(TokenError::InvalidEncoding)
        );
    }
}
