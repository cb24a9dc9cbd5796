use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use constant_time_eq::constant_time_eq;
use rand::{TryRngCore, rngs::OsRng};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Upper bound on presented token length; anything longer is not ours.
const MAX_PRESENTED_LEN: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token format")]
    InvalidFormat,

    #[error("token generation failed")]
    GenerationFailed,
}

/// Raw token value handed to a client.
///
/// - 256 bits of entropy, URL-safe base64 encoded
/// - zeroized on drop
/// - only an 8 character preview is ever displayed
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TokenSecret {
    value: String,
}

impl TokenSecret {
    pub fn generate() -> Result<Self, TokenError> {
        let mut token_bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut token_bytes)
            .map_err(|_| TokenError::GenerationFailed)?;

        let value = URL_SAFE_NO_PAD.encode(token_bytes);
        token_bytes.zeroize();
        Ok(Self { value })
    }

    /// Accept a token read back from a transport medium.
    pub fn from_presented(value: impl Into<String>) -> Result<Self, TokenError> {
        let value = value.into();
        if value.is_empty()
            || value.len() > MAX_PRESENTED_LEN
            || URL_SAFE_NO_PAD.decode(&value).is_err()
        {
            return Err(TokenError::InvalidFormat);
        }
        Ok(Self { value })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Constant-time comparison with another token value.
    pub fn secure_compare(&self, other: &str) -> bool {
        let self_bytes = self.value.as_bytes();
        let other_bytes = other.as_bytes();

        if self_bytes.len() != other_bytes.len() {
            return false;
        }

        constant_time_eq(self_bytes, other_bytes)
    }

    fn preview(&self) -> &str {
        self.value.get(..8).unwrap_or(&self.value)
    }
}

impl fmt::Display for TokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}...", self.preview())
    }
}

impl fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TokenSecret")
            .field(&format_args!("{}...", self.preview()))
            .finish()
    }
}
