//! Client secret hashing.
//!
//! Stored hashes are PHC strings. Two key derivations are understood: the legacy
//! `pbkdf2-sha1` and the current `argon2id`. New secrets are always Argon2id.

pub mod phc;

use anyhow::{anyhow, Context, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use secrecy::SecretString;
use sha1::Sha1;
use subtle::ConstantTimeEq;

pub use phc::{PhcError, PhcString};

/// Output length used when a PHC string carries no `k=` parameter.
pub const DEFAULT_KEY_LENGTH: usize = 30;
/// Raw bytes in a freshly minted client secret.
pub const SECRET_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 16;

/// Common contract of the supported algorithms.
pub trait KeyDerivation: Sized {
    const ID: &'static str;

    /// Read algorithm parameters out of a parsed PHC string.
    ///
    /// # Errors
    /// Returns an error if a parameter is missing or out of range.
    fn from_phc(phc: &PhcString) -> Result<Self, PhcError>;

    /// Derive a key from `secret` and `salt`.
    ///
    /// # Errors
    /// Returns an error if the underlying primitive rejects the parameters.
    fn derive(&self, secret: &[u8], salt: &[u8]) -> Result<Vec<u8>, PhcError>;

    /// Build the PHC string that records these parameters.
    fn to_phc(&self, salt: Vec<u8>, hash: Vec<u8>) -> PhcString;
}

fn key_length(phc: &PhcString) -> Result<usize, PhcError> {
    match phc.param_u32("k")? {
        Some(0) => Err(PhcError::InvalidParam("k=0".to_string())),
        Some(k) => usize::try_from(k).map_err(|_| PhcError::InvalidParam(format!("k={k}"))),
        None => Ok(DEFAULT_KEY_LENGTH),
    }
}

fn length_param(key_length: usize) -> Option<(String, String)> {
    (key_length != DEFAULT_KEY_LENGTH).then(|| ("k".to_string(), key_length.to_string()))
}

/// PBKDF2-HMAC-SHA1, kept to verify secrets issued before the switch to Argon2id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pbkdf2Sha1 {
    pub iterations: u32,
    pub key_length: usize,
}

impl KeyDerivation for Pbkdf2Sha1 {
    const ID: &'static str = "pbkdf2-sha1";

    fn from_phc(phc: &PhcString) -> Result<Self, PhcError> {
        let iterations = phc.required_u32("i")?;
        if iterations == 0 {
            return Err(PhcError::InvalidParam("i=0".to_string()));
        }
        Ok(Self {
            iterations,
            key_length: key_length(phc)?,
        })
    }

    fn derive(&self, secret: &[u8], salt: &[u8]) -> Result<Vec<u8>, PhcError> {
        let mut out = vec![0u8; self.key_length];
        pbkdf2::pbkdf2_hmac::<Sha1>(secret, salt, self.iterations, &mut out);
        Ok(out)
    }

    fn to_phc(&self, salt: Vec<u8>, hash: Vec<u8>) -> PhcString {
        let mut params = vec![("i".to_string(), self.iterations.to_string())];
        params.extend(length_param(self.key_length));
        PhcString {
            id: Self::ID.to_string(),
            version: None,
            params,
            salt,
            hash,
        }
    }
}

/// Argon2id cost parameters. Memory is in KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2id {
    pub memory_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    pub key_length: usize,
    pub version: u32,
}

impl Default for Argon2id {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            time_cost: 2,
            parallelism: 4,
            key_length: DEFAULT_KEY_LENGTH,
            version: 0x13,
        }
    }
}

impl KeyDerivation for Argon2id {
    const ID: &'static str = "argon2id";

    fn from_phc(phc: &PhcString) -> Result<Self, PhcError> {
        Ok(Self {
            memory_kib: phc.required_u32("m")?,
            time_cost: phc.required_u32("t")?,
            parallelism: phc.required_u32("p")?,
            key_length: key_length(phc)?,
            version: phc.version.unwrap_or(0x13),
        })
    }

    fn derive(&self, secret: &[u8], salt: &[u8]) -> Result<Vec<u8>, PhcError> {
        let version = Version::try_from(self.version)
            .map_err(|_| PhcError::InvalidVersion(self.version.to_string()))?;
        let params = Params::new(
            self.memory_kib,
            self.time_cost,
            self.parallelism,
            Some(self.key_length),
        )
        .map_err(|err| PhcError::InvalidParam(err.to_string()))?;

        let mut out = vec![0u8; self.key_length];
        Argon2::new(Algorithm::Argon2id, version, params)
            .hash_password_into(secret, salt, &mut out)
            .map_err(|err| PhcError::Derivation(err.to_string()))?;
        Ok(out)
    }

    fn to_phc(&self, salt: Vec<u8>, hash: Vec<u8>) -> PhcString {
        let mut params = vec![
            ("m".to_string(), self.memory_kib.to_string()),
            ("t".to_string(), self.time_cost.to_string()),
            ("p".to_string(), self.parallelism.to_string()),
        ];
        params.extend(length_param(self.key_length));
        PhcString {
            id: Self::ID.to_string(),
            version: Some(self.version),
            params,
            salt,
            hash,
        }
    }
}

fn rederive<K: KeyDerivation>(candidate: &[u8], phc: &PhcString) -> Result<Vec<u8>, PhcError> {
    K::from_phc(phc)?.derive(candidate, &phc.salt)
}

/// Check `candidate` against a stored PHC string.
///
/// Unknown algorithms, malformed strings and derivation failures all verify as `false`.
#[must_use]
pub fn verify(candidate: &[u8], stored: &str) -> bool {
    let Ok(phc) = stored.parse::<PhcString>() else {
        return false;
    };

    let derived = if phc.id == Argon2id::ID {
        rederive::<Argon2id>(candidate, &phc)
    } else if phc.id == Pbkdf2Sha1::ID {
        rederive::<Pbkdf2Sha1>(candidate, &phc)
    } else {
        Err(PhcError::UnsupportedAlgorithm(phc.id.clone()))
    };

    match derived {
        Ok(hash) => hash.ct_eq(&phc.hash).into(),
        Err(err) => {
            tracing::debug!("secret verification failed: {err}");
            false
        }
    }
}

/// A secret minted for an operator: the plaintext is shown once, the hash is stored.
#[derive(Debug)]
pub struct GeneratedSecret {
    pub plaintext: SecretString,
    pub phc: String,
}

/// Mints and hashes client secrets with injected Argon2id parameters.
#[derive(Debug, Clone, Default)]
pub struct SecretHasher {
    params: Argon2id,
}

impl SecretHasher {
    #[must_use]
    pub fn new(params: Argon2id) -> Self {
        Self { params }
    }

    #[must_use]
    pub fn params(&self) -> &Argon2id {
        &self.params
    }

    /// Hash `secret` with a fresh random salt.
    ///
    /// # Errors
    /// Returns an error if randomness is unavailable or the parameters are rejected.
    pub fn hash(&self, secret: &[u8]) -> Result<String> {
        let mut salt = vec![0u8; SALT_LENGTH];
        OsRng
            .try_fill_bytes(&mut salt)
            .context("failed to generate salt")?;
        let hash = self
            .params
            .derive(secret, &salt)
            .map_err(|err| anyhow!("failed to hash secret: {err}"))?;
        Ok(self.params.to_phc(salt, hash).to_string())
    }

    /// Mint a new random secret and its hash.
    ///
    /// # Errors
    /// Returns an error if randomness is unavailable or hashing fails.
    pub fn generate(&self) -> Result<GeneratedSecret> {
        let mut raw = [0u8; SECRET_LENGTH];
        OsRng
            .try_fill_bytes(&mut raw)
            .context("failed to generate secret")?;
        let phc = self.hash(&raw)?;
        Ok(GeneratedSecret {
            plaintext: SecretString::from(Base64UrlUnpadded::encode_string(&raw)),
            phc,
        })
    }
}

/// Decode a secret as handed to operators. Trailing padding is tolerated.
///
/// # Errors
/// Returns an error if the input is not base64url.
pub fn decode_secret(encoded: &str) -> Result<Vec<u8>> {
    Base64UrlUnpadded::decode_vec(encoded.trim_end_matches('='))
        .map_err(|_| anyhow!("secret is not valid base64url"))
}

#[cfg(test)]
pub(crate) fn cheap_hasher() -> SecretHasher {
    SecretHasher::new(Argon2id {
        memory_kib: 64,
        time_cost: 1,
        parallelism: 1,
        ..Argon2id::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn verifies_legacy_pbkdf2_hashes() {
        let stored = "$pbkdf2-sha1$i=1,k=32$AQID$gbkoCyl+kgPHGtDI1sbgzYTjh1vawpwGBu7TsfyyQ7Y";
        assert!(verify(b"a", stored));
        assert!(!verify(b"b", stored));

        let default_length = "$pbkdf2-sha1$i=1000$c2FsdHNhbHQ$iwnGHj3e4ShfYAA1SPz7CWOx6OLQJz2j9BQ/Yjc+";
        assert!(verify(b"secret", default_length));
        assert!(!verify(b"Secret", default_length));
    }

    #[test]
    fn pbkdf2_phc_round_trip() {
        let algorithm = Pbkdf2Sha1 {
            iterations: 10,
            key_length: DEFAULT_KEY_LENGTH,
        };
        let salt = b"0123456789abcdef".to_vec();
        let hash = algorithm.derive(b"hunter2", &salt).unwrap();
        let stored = algorithm.to_phc(salt, hash).to_string();
        assert!(stored.starts_with("$pbkdf2-sha1$i=10$"));
        assert!(verify(b"hunter2", &stored));
        assert!(!verify(b"hunter3", &stored));
    }

    #[test]
    fn argon2id_hash_and_verify() {
        let hasher = cheap_hasher();
        let stored = hasher.hash(b"correct horse").unwrap();
        assert!(stored.starts_with("$argon2id$v=19$m=64,t=1,p=1$"));
        assert!(verify(b"correct horse", &stored));
        assert!(!verify(b"correct horsf", &stored));
    }

    #[test]
    fn salts_are_fresh() {
        let hasher = cheap_hasher();
        let first = hasher.hash(b"same").unwrap();
        let second = hasher.hash(b"same").unwrap();
        assert_ne!(first, second);
        assert!(verify(b"same", &first));
        assert!(verify(b"same", &second));
    }

    #[test]
    fn default_params_match_policy() {
        let params = *SecretHasher::default().params();
        assert_eq!(params.memory_kib, 65536);
        assert_eq!(params.time_cost, 2);
        assert_eq!(params.parallelism, 4);
        assert_eq!(params.version, 19);
    }

    #[test]
    fn generated_secret_is_base64url_of_32_bytes() {
        let generated = cheap_hasher().generate().unwrap();
        let raw = decode_secret(generated.plaintext.expose_secret()).unwrap();
        assert_eq!(raw.len(), SECRET_LENGTH);
        assert!(verify(&raw, &generated.phc));
    }

    #[test]
    fn fails_closed() {
        assert!(!verify(b"a", "$md5$i=1$AQID$AQID"));
        assert!(!verify(b"a", "not a phc string"));
        assert!(!verify(b"a", "$pbkdf2-sha1$i=0$AQID$AQID"));
        assert!(!verify(b"a", "$argon2id$v=19$m=64,t=1$AQIDBAUGBwg$AQID"));
        assert!(!verify(b"a", "$argon2id$v=7$m=64,t=1,p=1$AQIDBAUGBwg$AQID"));
    }

    #[test]
    fn decode_secret_tolerates_padding() {
        assert_eq!(decode_secret("AQI=").unwrap(), vec![1, 2]);
        assert_eq!(decode_secret("AQI").unwrap(), vec![1, 2]);
        assert!(decode_secret("not base64!").is_err());
    }
}
