//! Compact JWS encoding: ES256 for id tokens, HS256 for login links.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use p256::{
    ecdsa::{
        signature::{Signer, Verifier},
        Signature, SigningKey, VerifyingKey,
    },
    pkcs8::DecodePrivateKey,
    SecretKey,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

pub const ES256: &str = "ES256";
pub const HS256: &str = "HS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub alg: String,
    pub typ: String,
}

impl Header {
    fn new(alg: &str) -> Self {
        Self {
            alg: alg.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("failed to parse EC private key")]
    KeyParse,
    #[error("invalid key")]
    InvalidKey,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: DeserializeOwned>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

struct Parts<'a> {
    signing_input: &'a str,
    claims_b64: &'a str,
    signature: Vec<u8>,
}

fn split<'a>(token: &'a str, expected_alg: &str) -> Result<Parts<'a>, Error> {
    let (signing_input, sig_b64) = token.rsplit_once('.').ok_or(Error::TokenFormat)?;
    let (header_b64, claims_b64) = signing_input
        .split_once('.')
        .ok_or(Error::TokenFormat)?;
    if claims_b64.contains('.') {
        return Err(Error::TokenFormat);
    }

    let header: Header = b64d_json(header_b64)?;
    if header.alg != expected_alg {
        return Err(Error::UnsupportedAlg(header.alg));
    }

    Ok(Parts {
        signing_input,
        claims_b64,
        signature: Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?,
    })
}

fn signing_input<C: Serialize>(alg: &str, claims: &C) -> Result<String, Error> {
    Ok(format!(
        "{}.{}",
        b64e_json(&Header::new(alg))?,
        b64e_json(claims)?
    ))
}

/// Load a P-256 key from PKCS#8 or SEC1 PEM.
///
/// # Errors
/// Returns `Error::KeyParse` if neither encoding matches.
pub fn decode_signing_key(pem: &str) -> Result<SigningKey, Error> {
    if let Ok(key) = SigningKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    SecretKey::from_sec1_pem(pem)
        .map(SigningKey::from)
        .map_err(|_| Error::KeyParse)
}

/// Sign `claims` as an ES256 JWS. The signature is the 64-byte `r || s` form.
///
/// # Errors
/// Returns an error if the header or claims cannot be serialized.
pub fn sign_es256<C: Serialize>(key: &SigningKey, claims: &C) -> Result<String, Error> {
    let input = signing_input(ES256, claims)?;
    let signature: Signature = key.sign(input.as_bytes());
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_bytes());
    Ok(format!("{input}.{signature_b64}"))
}

/// Verify an ES256 JWS and decode its claims. Claim validation is left to the caller.
///
/// # Errors
/// Returns an error if the token is malformed, uses another algorithm, or the signature fails.
pub fn verify_es256<C: DeserializeOwned>(token: &str, key: &VerifyingKey) -> Result<C, Error> {
    let parts = split(token, ES256)?;
    let signature =
        Signature::from_slice(&parts.signature).map_err(|_| Error::InvalidSignature)?;
    key.verify(parts.signing_input.as_bytes(), &signature)
        .map_err(|_| Error::InvalidSignature)?;
    b64d_json(parts.claims_b64)
}

fn hs256(key: &[u8], input: &str) -> Result<Hmac<Sha256>, Error> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|_| Error::InvalidKey)?;
    mac.update(input.as_bytes());
    Ok(mac)
}

/// Sign `claims` as an HS256 JWS.
///
/// # Errors
/// Returns an error if the claims cannot be serialized.
pub fn sign_hs256<C: Serialize>(key: &[u8], claims: &C) -> Result<String, Error> {
    let input = signing_input(HS256, claims)?;
    let tag = hs256(key, &input)?.finalize().into_bytes();
    Ok(format!("{input}.{}", Base64UrlUnpadded::encode_string(&tag)))
}

/// Verify an HS256 JWS in constant time and decode its claims.
///
/// # Errors
/// Returns an error if the token is malformed, uses another algorithm, or the MAC fails.
pub fn verify_hs256<C: DeserializeOwned>(token: &str, key: &[u8]) -> Result<C, Error> {
    let parts = split(token, HS256)?;
    hs256(key, parts.signing_input)?
        .verify_slice(&parts.signature)
        .map_err(|_| Error::InvalidSignature)?;
    b64d_json(parts.claims_b64)
}

#[cfg(test)]
pub(crate) fn test_signing_key() -> SigningKey {
    SigningKey::from(SecretKey::random(&mut rand::rngs::OsRng))
}
