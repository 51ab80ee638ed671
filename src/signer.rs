use crate::{
    builder::EncryptionRequest,
    header::{EffectiveHeader, JsonObject},
    jose::Jwe,
};
use async_trait::async_trait;

/// A key taking part in an example.
///
/// Every cryptographic operation goes through this trait. Keys that don't support an operation
/// keep the default implementation, which fails with [`CryptoError::UnsupportedAlgorithm`].
#[async_trait]
pub trait ExampleKey: Send + Sync {
    /// The JWK for this key, including its private members.
    fn to_jwk(&self) -> JsonObject;

    /// Sign a JWS signing input using the given algorithm.
    async fn sign(&self, algorithm: &str, _input: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Err(CryptoError::UnsupportedAlgorithm(algorithm.to_string()))
    }

    /// Recover the content encryption key sent to this key.
    ///
    /// `header` is the effective header of the recipient the key belongs to.
    async fn unwrap_key(
        &self,
        algorithm: &str,
        _encrypted_key: Option<&[u8]>,
        _header: &EffectiveHeader,
    ) -> Result<UnwrappedKey, CryptoError> {
        Err(CryptoError::UnsupportedAlgorithm(algorithm.to_string()))
    }
}

/// A content encryption key recovered by [`ExampleKey::unwrap_key`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnwrappedKey {
    /// The raw content encryption key.
    pub cek: Vec<u8>,

    /// Any values derived while unwrapping, like an agreed upon key.
    pub factors: JsonObject,
}

/// Produces JWE objects out of a plaintext.
#[async_trait]
pub trait Encrypter: Send + Sync {
    /// Encrypt a plaintext for the recipients in the request.
    async fn encrypt(&self, plaintext: &[u8], request: &EncryptionRequest) -> Result<Jwe, CryptoError>;

    /// Compress a plaintext the way it's compressed before encryption when `zip` is set.
    async fn deflate(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// An error raised by a cryptographic operation.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key unwrap failed: {0}")]
    Unwrap(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}
