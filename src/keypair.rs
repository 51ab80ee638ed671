use crate::{
    header::JsonObject,
    jose::to_base64,
    signer::{CryptoError, ExampleKey},
};
use async_trait::async_trait;
use k256::{
    ecdsa::{Signature, SigningKey, VerifyingKey},
    SecretKey,
};
use serde_json::Value;
use signature::Signer as _;

/// The only algorithm a [`Secp256k1Key`] signs with.
pub const ES256K: &str = "ES256K";

/// A secp256k1 key that signs using `ES256K`.
#[derive(Clone, Debug)]
pub struct Secp256k1Key {
    signing_key: SigningKey,
    kid: Option<String>,
}

impl Secp256k1Key {
    /// Generates a new, random key.
    pub fn generate() -> Self {
        let secret_key = SecretKey::random(&mut rand::thread_rng());
        Self { signing_key: secret_key.into(), kid: None }
    }

    /// Creates a key from a 32-byte secret key.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { signing_key: secret_key.into(), kid: None })
    }

    /// Set the key id reported in this key's JWK.
    pub fn with_kid<S: Into<String>>(mut self, kid: S) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// The key used to verify signatures made by this key.
    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    /// The public JWK for this key.
    pub fn to_public_jwk(&self) -> JsonObject {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let mut jwk = JsonObject::new();
        jwk.insert("kty".into(), "EC".into());
        if let Some(kid) = &self.kid {
            jwk.insert("kid".into(), kid.clone().into());
        }
        jwk.insert("crv".into(), "secp256k1".into());
        if let (Some(x), Some(y)) = (point.x(), point.y()) {
            jwk.insert("x".into(), to_base64(x).into());
            jwk.insert("y".into(), to_base64(y).into());
        }
        jwk
    }
}

#[async_trait]
impl ExampleKey for Secp256k1Key {
    fn to_jwk(&self) -> JsonObject {
        let mut jwk = self.to_public_jwk();
        jwk.insert("d".into(), Value::String(to_base64(self.signing_key.to_bytes())));
        jwk
    }

    async fn sign(&self, algorithm: &str, input: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if algorithm != ES256K {
            return Err(CryptoError::UnsupportedAlgorithm(algorithm.to_string()));
        }
        let signature: Signature =
            self.signing_key.try_sign(input).map_err(|e| CryptoError::Signing(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}
