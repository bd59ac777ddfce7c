//! Codec for the PHC string format: `$<id>[$v=<version>]$<params>$<salt>$<hash>`.
//!
//! Salt and hash are standard base64 without padding. Decoding is lenient about
//! trailing `=` and the URL-safe alphabet since older records were written that way.

use base64ct::{Base64Unpadded, Base64UrlUnpadded, Encoding};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhcError {
    #[error("malformed PHC string")]
    Malformed,
    #[error("invalid version: {0}")]
    InvalidVersion(String),
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
    #[error("missing parameter: {0}")]
    MissingParam(&'static str),
    #[error("invalid base64 in {0}")]
    InvalidBase64(&'static str),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("key derivation failed: {0}")]
    Derivation(String),
}

/// A parsed PHC string. Parameter order is kept so re-encoding is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhcString {
    pub id: String,
    pub version: Option<u32>,
    pub params: Vec<(String, String)>,
    pub salt: Vec<u8>,
    pub hash: Vec<u8>,
}

impl PhcString {
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Numeric parameter lookup; `Ok(None)` when absent.
    ///
    /// # Errors
    /// Returns `PhcError::InvalidParam` if the value is not an unsigned integer.
    pub fn param_u32(&self, name: &str) -> Result<Option<u32>, PhcError> {
        self.param(name)
            .map(|value| {
                value
                    .parse::<u32>()
                    .map_err(|_| PhcError::InvalidParam(format!("{name}={value}")))
            })
            .transpose()
    }

    /// Like [`PhcString::param_u32`] but the parameter must be present.
    ///
    /// # Errors
    /// Returns `PhcError::MissingParam` or `PhcError::InvalidParam`.
    pub fn required_u32(&self, name: &'static str) -> Result<u32, PhcError> {
        self.param_u32(name)?.ok_or(PhcError::MissingParam(name))
    }
}

fn decode_b64(value: &str, field: &'static str) -> Result<Vec<u8>, PhcError> {
    let trimmed = value.trim_end_matches('=');
    let decoded = if trimmed.contains(['-', '_']) {
        Base64UrlUnpadded::decode_vec(trimmed)
    } else {
        Base64Unpadded::decode_vec(trimmed)
    };
    decoded.map_err(|_| PhcError::InvalidBase64(field))
}

fn parse_params(raw: &str) -> Result<Vec<(String, String)>, PhcError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| PhcError::InvalidParam(pair.to_string()))?;
            if key.is_empty() {
                return Err(PhcError::InvalidParam(pair.to_string()));
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

impl FromStr for PhcString {
    type Err = PhcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix('$').ok_or(PhcError::Malformed)?;
        let fields: Vec<&str> = rest.split('$').collect();

        let (id, version, params, salt, hash) = match fields.as_slice() {
            [id, version, params, salt, hash] => {
                let raw = version
                    .strip_prefix("v=")
                    .ok_or_else(|| PhcError::InvalidVersion((*version).to_string()))?;
                let version = raw
                    .parse::<u32>()
                    .map_err(|_| PhcError::InvalidVersion(raw.to_string()))?;
                (*id, Some(version), *params, *salt, *hash)
            }
            [id, params, salt, hash] => (*id, None, *params, *salt, *hash),
            _ => return Err(PhcError::Malformed),
        };

        if id.is_empty() {
            return Err(PhcError::Malformed);
        }

        Ok(Self {
            id: id.to_string(),
            version,
            params: parse_params(params)?,
            salt: decode_b64(salt, "salt")?,
            hash: decode_b64(hash, "hash")?,
        })
    }
}

impl fmt::Display for PhcString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.id)?;
        if let Some(version) = self.version {
            write!(f, "$v={version}")?;
        }
        let params = self
            .params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        write!(
            f,
            "${params}${}${}",
            Base64Unpadded::encode_string(&self.salt),
            Base64Unpadded::encode_string(&self.hash)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_argon2id_with_version() {
        let phc: PhcString = "$argon2id$v=19$m=65536,t=2,p=4$c2FsdHNhbHQ$aGFzaGhhc2g"
            .parse()
            .unwrap();
        assert_eq!(phc.id, "argon2id");
        assert_eq!(phc.version, Some(19));
        assert_eq!(phc.param("m"), Some("65536"));
        assert_eq!(phc.required_u32("t").unwrap(), 2);
        assert_eq!(phc.param_u32("p").unwrap(), Some(4));
        assert_eq!(phc.salt, b"saltsalt");
        assert_eq!(phc.hash, b"hashhash");
    }

    #[test]
    fn parses_pbkdf2_without_version() {
        let phc: PhcString = "$pbkdf2-sha1$i=1000$AQID$BAUG".parse().unwrap();
        assert_eq!(phc.id, "pbkdf2-sha1");
        assert_eq!(phc.version, None);
        assert_eq!(phc.required_u32("i").unwrap(), 1000);
        assert_eq!(phc.salt, vec![1, 2, 3]);
        assert_eq!(phc.hash, vec![4, 5, 6]);
    }

    #[test]
    fn display_is_stable() {
        let raw = "$argon2id$v=19$m=64,t=1,p=1$AQIDBAUGBwg$CQoLDA0ODxA";
        let phc: PhcString = raw.parse().unwrap();
        assert_eq!(phc.to_string(), raw);
    }

    #[test]
    fn accepts_padding_and_url_alphabet() {
        let phc: PhcString = "$pbkdf2-sha1$i=1$-_8=$AQID".parse().unwrap();
        assert_eq!(phc.salt, vec![0xfb, 0xff]);
    }

    #[test]
    fn rejects_malformed_input() {
        for raw in [
            "",
            "argon2id$v=19$m=1$AA$AA",
            "$argon2id",
            "$argon2id$x=19$m=1$AA$AA",
            "$argon2id$v=abc$m=1$AA$AA",
            "$$m=1$AA$AA",
            "$a$b$c$d$e$f",
        ] {
            assert!(raw.parse::<PhcString>().is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn rejects_bad_params_and_base64() {
        assert!(matches!(
            "$pbkdf2-sha1$i$AQID$AQID".parse::<PhcString>(),
            Err(PhcError::InvalidParam(_))
        ));
        assert_eq!(
            "$pbkdf2-sha1$i=1$!!$AQID".parse::<PhcString>(),
            Err(PhcError::InvalidBase64("salt"))
        );
        let phc: PhcString = "$pbkdf2-sha1$i=x$AQID$AQID".parse().unwrap();
        assert!(phc.required_u32("i").is_err());
        assert_eq!(phc.required_u32("k"), Err(PhcError::MissingParam("k")));
    }
}
