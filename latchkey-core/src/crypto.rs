use argon2::{
    Algorithm, Argon2, Params, ParamsBuilder, Version,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
};
use cookie::Key;
use hmac::{Hmac, Mac};
use password_hash::Error as PasswordHashError;
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Domain separator mixed into the cookie signing key so the cookie jar never
/// shares raw key material with token digests.
const COOKIE_KEY_CONTEXT: &[u8] = b"latchkey.cookie-signing.v1";

/// Centralized cryptographic helper for authentication-sensitive hashing.
///
/// The helper encapsulates three primitives:
/// - Argon2id for password hashing with a server-side pepper.
/// - HMAC-SHA-256 for digesting opaque tokens before they reach a
///   [`TokenStore`](crate::tokens::TokenStore).
/// - A derived signing key for credentials cookies.
///
/// Password hashing belongs to the identity record store; the pipeline only
/// uses the token digest and the cookie key. The hashing half is here so
/// record stores built on this crate pick consistent Argon2 parameters.
pub struct AuthCrypto {
    argon2: Argon2<'static>,
    password_pepper: Zeroizing<Vec<u8>>,
    token_mac: HmacSha256,
    cookie_key: Key,
}

#[derive(Debug, Error)]
pub enum AuthCryptoError {
    #[error("password pepper must not be empty")]
    EmptyPasswordPepper,
    #[error("token HMAC key must not be empty")]
    EmptyTokenKey,
    #[error("invalid Argon2 parameters: {0}")]
    InvalidArgon2Params(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
    #[error("invalid token key: {0}")]
    InvalidTokenKey(String),
}

impl From<PasswordHashError> for AuthCryptoError {
    fn from(err: PasswordHashError) -> Self {
        AuthCryptoError::PasswordHash(err.to_string())
    }
}

impl fmt::Debug for AuthCrypto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCrypto")
            .field("argon2", &self.argon2.params())
            .finish_non_exhaustive()
    }
}

impl AuthCrypto {
    /// Recommended defaults target ~64 MiB memory and 3 iterations.
    const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
    const DEFAULT_ITERATIONS: u32 = 3;
    const DEFAULT_PARALLELISM: u32 = 1;
    const SALT_LENGTH: usize = password_hash::Salt::RECOMMENDED_LENGTH;

    /// Build a helper with default Argon2id parameters.
    pub fn new(
        password_pepper: impl AsRef<[u8]>,
        token_hmac_key: impl AsRef<[u8]>,
    ) -> Result<Self, AuthCryptoError> {
        Self::with_params(
            password_pepper,
            token_hmac_key,
            ParamsBuilder::new()
                .m_cost(Self::DEFAULT_MEMORY_KIB)
                .t_cost(Self::DEFAULT_ITERATIONS)
                .p_cost(Self::DEFAULT_PARALLELISM)
                .output_len(32)
                .build()
                .map_err(|err| {
                    AuthCryptoError::InvalidArgon2Params(err.to_string())
                })?,
        )
    }

    /// Build a helper with caller-specified Argon2 parameters (useful for
    /// tests or constrained environments).
    pub fn with_params(
        password_pepper: impl AsRef<[u8]>,
        token_hmac_key: impl AsRef<[u8]>,
        params: Params,
    ) -> Result<Self, AuthCryptoError> {
        let pepper = password_pepper.as_ref();
        if pepper.is_empty() {
            return Err(AuthCryptoError::EmptyPasswordPepper);
        }

        let key = token_hmac_key.as_ref();
        if key.is_empty() {
            return Err(AuthCryptoError::EmptyTokenKey);
        }

        let token_mac = HmacSha256::new_from_slice(key).map_err(|err| {
            AuthCryptoError::InvalidTokenKey(err.to_string())
        })?;

        let derived = Zeroizing::new(
            Sha512::new()
                .chain_update(COOKIE_KEY_CONTEXT)
                .chain_update(key)
                .finalize()
                .to_vec(),
        );
        let cookie_key = Key::try_from(derived.as_slice()).map_err(|err| {
            AuthCryptoError::InvalidTokenKey(err.to_string())
        })?;

        let argon2 =
            Argon2::new(Algorithm::Argon2id, Version::default(), params);

        Ok(Self {
            argon2,
            password_pepper: Zeroizing::new(pepper.to_vec()),
            token_mac,
            cookie_key,
        })
    }

    /// Hash a password using Argon2id with a random salt and the shared
    /// pepper. The resulting PHC string is suitable for storage.
    pub fn hash_password(
        &self,
        password: &str,
    ) -> Result<String, AuthCryptoError> {
        let material = self.peppered(password);

        let mut salt_bytes = [0u8; Self::SALT_LENGTH];
        OsRng
            .try_fill_bytes(&mut salt_bytes)
            .map_err(|err| AuthCryptoError::PasswordHash(err.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(AuthCryptoError::from)?;
        let hash = self.argon2.hash_password(&material, &salt)?.to_string();
        Ok(hash)
    }

    /// Verify a password against a stored hash, applying the shared pepper.
    pub fn verify_password(
        &self,
        password: &str,
        password_hash: &str,
    ) -> Result<bool, AuthCryptoError> {
        let parsed = PasswordHash::new(password_hash)?;
        let material = self.peppered(password);
        Ok(self.argon2.verify_password(&material, &parsed).is_ok())
    }

    /// Digest an opaque token with HMAC-SHA-256. The hex digest is what token
    /// stores index by; raw token values are never persisted.
    pub fn hash_token(&self, token: &str) -> String {
        let mut mac = self.token_mac.clone();
        mac.update(token.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Key used for signed credentials cookies.
    pub fn cookie_key(&self) -> &Key {
        &self.cookie_key
    }

    fn peppered(&self, password: &str) -> Zeroizing<Vec<u8>> {
        let mut material = Zeroizing::new(Vec::with_capacity(
            password.len() + self.password_pepper.len(),
        ));
        material.extend_from_slice(password.as_bytes());
        material.extend_from_slice(&self.password_pepper);
        material
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_crypto() -> AuthCrypto {
        AuthCrypto::with_params(
            "pepper",
            "token-key",
            Params::new(1024, 1, 1, Some(32)).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn hashes_passwords_and_verifies() {
        let crypto = fast_crypto();
        let hash = crypto.hash_password("correct horse").unwrap();
        assert!(crypto.verify_password("correct horse", &hash).unwrap());
        assert!(!crypto.verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn pepper_is_part_of_the_hash() {
        let crypto = fast_crypto();
        let other = AuthCrypto::with_params(
            "another-pepper",
            "token-key",
            Params::new(1024, 1, 1, Some(32)).unwrap(),
        )
        .unwrap();
        let hash = crypto.hash_password("secret").unwrap();
        assert!(!other.verify_password("secret", &hash).unwrap());
    }

    #[test]
    fn hashes_tokens_to_hex() {
        let crypto = fast_crypto();
        let digest = crypto.hash_token("opaque-token");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, crypto.hash_token("opaque-token"));
        assert_ne!(digest, crypto.hash_token("opaque-token2"));
    }

    #[test]
    fn rejects_empty_inputs() {
        assert!(matches!(
            AuthCrypto::new("", "token"),
            Err(AuthCryptoError::EmptyPasswordPepper)
        ));
        assert!(matches!(
            AuthCrypto::new("pepper", ""),
            Err(AuthCryptoError::EmptyTokenKey)
        ));
    }
}
