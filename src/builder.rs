use crate::{
    header::{HeaderCollision, HeaderScopes, JsonObject, ProtectPolicy},
    jose::{to_base64, to_base64_json, JoseObjectError, Jws, JwsSignature},
    signer::{CryptoError, ExampleKey},
};
use serde_json::Value;
use std::sync::Arc;

/// A signer taking part in a JWS.
#[derive(Clone)]
pub struct SignerSpec {
    /// The key used to sign.
    pub key: Arc<dyn ExampleKey>,

    /// Which of the header fields are protected.
    pub protect: ProtectPolicy,

    /// The header fields for this signer, which must include `alg`.
    pub header: JsonObject,
}

impl SignerSpec {
    /// Construct a new signer.
    pub fn new(key: Arc<dyn ExampleKey>, protect: ProtectPolicy, header: JsonObject) -> Self {
        Self { key, protect, header }
    }
}

/// A JWS builder.
#[derive(Clone)]
pub struct JwsBuilder {
    payload: Vec<u8>,
    signers: Vec<SignerSpec>,
}

impl JwsBuilder {
    /// Construct a new builder for the given payload.
    pub fn new<T: Into<Vec<u8>>>(payload: T) -> Self {
        Self { payload: payload.into(), signers: Vec::new() }
    }

    /// Add a signer.
    pub fn signer(mut self, signer: SignerSpec) -> Self {
        self.signers.push(signer);
        self
    }

    /// Add a list of signers.
    pub fn signers<I>(mut self, signers: I) -> Self
    where
        I: IntoIterator<Item = SignerSpec>,
    {
        self.signers.extend(signers);
        self
    }

    /// Sign the payload with every signer and build the JWS in General JSON Serialization.
    pub async fn build(self) -> Result<Jws, JwsBuildError> {
        let Self { payload, signers } = self;
        let payload = to_base64(payload);

        let mut signatures = Vec::new();
        for (index, signer) in signers.iter().enumerate() {
            let algorithm =
                signer.header.get("alg").and_then(Value::as_str).ok_or(JwsBuildError::MissingAlgorithm(index))?;
            let header = signer.protect.partition(&signer.header);
            let protected = if header.protected.is_empty() {
                None
            } else {
                let encoded =
                    to_base64_json(&header.protected).map_err(|e| JwsBuildError::EncodingHeader(e.to_string()))?;
                Some(encoded)
            };

            let input = format!("{}.{payload}", protected.as_deref().unwrap_or_default());
            let signature = signer.key.sign(algorithm, input.as_bytes()).await?;
            let unprotected = (!header.unprotected.is_empty()).then_some(header.unprotected);
            signatures.push(JwsSignature { protected, header: unprotected, signature: to_base64(signature) });
        }
        Ok(Jws::new(Some(payload), signatures)?)
    }
}

/// An error when building a JWS.
#[derive(Debug, thiserror::Error)]
pub enum JwsBuildError {
    #[error("signer #{0} has no algorithm")]
    MissingAlgorithm(usize),

    #[error("encoding header: {0}")]
    EncodingHeader(String),

    #[error("signing failed: {0}")]
    Signing(#[from] CryptoError),

    #[error(transparent)]
    Object(#[from] JoseObjectError),
}

/// A recipient taking part in a JWE.
#[derive(Clone)]
pub struct RecipientSpec {
    /// The key the content encryption key is wrapped for.
    pub key: Arc<dyn ExampleKey>,

    /// The header fields for this recipient.
    pub header: JsonObject,

    /// The ephemeral key used for key agreement, as a JWK including its private members.
    pub epk: Option<JsonObject>,
}

impl RecipientSpec {
    /// Construct a new recipient.
    pub fn new(key: Arc<dyn ExampleKey>, header: JsonObject) -> Self {
        Self { key, header, epk: None }
    }

    /// Set the ephemeral key used for key agreement.
    pub fn with_epk(mut self, epk: JsonObject) -> Self {
        self.epk = Some(epk);
        self
    }
}

/// The options for a JWE.
#[derive(Clone, Debug, Default)]
pub struct EncryptionOptions {
    /// The content encryption algorithm, set as the `enc` header field.
    pub content_algorithm: String,

    /// Which of the object level header fields are protected.
    pub protect: ProtectPolicy,

    /// Extra object level header fields.
    pub fields: JsonObject,

    /// The additional authenticated data, if any.
    pub aad: Option<Vec<u8>>,

    /// Whether the plaintext is compressed before being encrypted.
    pub zip: bool,
}

/// Everything an [`Encrypter`](crate::signer::Encrypter) needs to produce a JWE.
///
/// The headers are already split into their scopes.
#[derive(Clone)]
pub struct EncryptionRequest {
    /// The protected header.
    pub protected: JsonObject,

    /// The unprotected header shared by every recipient.
    pub unprotected: JsonObject,

    /// The recipients, along with their own unprotected headers.
    pub recipients: Vec<RecipientSpec>,

    /// The additional authenticated data, if any.
    pub aad: Option<Vec<u8>>,

    /// Whether the plaintext is compressed before being encrypted.
    pub zip: bool,
}

impl EncryptionRequest {
    /// Lay out the headers for a JWE.
    ///
    /// The object level fields are `enc` plus the extra fields in the options. When there's a
    /// single recipient its header fields are object level fields as well, so the protect policy
    /// also applies to them.
    pub fn new(options: &EncryptionOptions, recipients: &[RecipientSpec]) -> Result<Self, EncryptionRequestError> {
        if recipients.is_empty() {
            return Err(JoseObjectError::NoRecipients.into());
        }

        let mut object_fields = options.fields.clone();
        object_fields.insert("enc".into(), options.content_algorithm.clone().into());
        for recipient in recipients {
            let scopes = HeaderScopes {
                shared_unprotected: object_fields.clone(),
                per_part_unprotected: recipient.header.clone(),
                ..Default::default()
            };
            scopes.validate()?;
        }

        let (object_fields, recipients) = match recipients {
            [recipient] => {
                let mut fields = recipient.header.clone();
                fields.extend(object_fields);
                (fields, vec![RecipientSpec { header: JsonObject::new(), ..recipient.clone() }])
            }
            recipients => (object_fields, recipients.to_vec()),
        };
        let header = options.protect.partition(&object_fields);
        Ok(Self {
            protected: header.protected,
            unprotected: header.unprotected,
            recipients,
            aad: options.aad.clone(),
            zip: options.zip,
        })
    }
}

/// An error when laying out the headers of a JWE.
#[derive(Debug, thiserror::Error)]
pub enum EncryptionRequestError {
    #[error(transparent)]
    Collision(#[from] HeaderCollision),

    #[error(transparent)]
    Object(#[from] JoseObjectError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        header::ScopeKind,
        jose::from_base64,
        keypair::{Secp256k1Key, ES256K},
    };
    use k256::ecdsa::Signature;
    use serde_json::json;
    use signature::Verifier;

    fn object(value: Value) -> JsonObject {
        value.as_object().cloned().expect("not an object")
    }

    fn decode_json(input: &str) -> Value {
        let input = from_base64(input).expect("invalid base64");
        serde_json::from_slice(&input).expect("invalid JSON")
    }

    struct NoopKey;

    #[async_trait::async_trait]
    impl ExampleKey for NoopKey {
        fn to_jwk(&self) -> JsonObject {
            object(json!({ "kty": "oct", "k": "AAAA" }))
        }
    }

    fn recipient(header: Value) -> RecipientSpec {
        RecipientSpec::new(Arc::new(NoopKey), object(header))
    }

    #[tokio::test]
    async fn protect_everything() {
        let key = Secp256k1Key::generate();
        let spec = SignerSpec::new(Arc::new(key.clone()), ProtectPolicy::All, object(json!({ "alg": ES256K })));
        let jws = JwsBuilder::new("It’s a dangerous business").signer(spec).build().await.expect("build failed");

        let signature = &jws.signatures()[0];
        assert_eq!(signature.header, None);
        let protected = signature.protected.clone().expect("no protected header");
        assert_eq!(decode_json(&protected), json!({ "alg": "ES256K" }));

        let compact = jws.to_compact().expect("no compact form");
        assert_eq!(compact.segments().len(), 3);
        assert!(!compact.segments()[0].is_empty());

        // The signature covers the protected header and the payload.
        let payload = jws.payload.clone().expect("no payload");
        let input = format!("{protected}.{payload}");
        let raw_signature = from_base64(&signature.signature).expect("invalid base64");
        let raw_signature = Signature::try_from(raw_signature.as_slice()).expect("invalid signature");
        key.verifying_key().verify(input.as_bytes(), &raw_signature).expect("verification failed");
    }

    #[tokio::test]
    async fn protect_nothing() {
        let spec = SignerSpec::new(
            Arc::new(Secp256k1Key::generate()),
            ProtectPolicy::None,
            object(json!({ "alg": ES256K, "kid": "bilbo" })),
        );
        let jws = JwsBuilder::new("payload").signer(spec).build().await.expect("build failed");
        let signature = &jws.signatures()[0];
        assert_eq!(signature.protected, None);
        assert_eq!(signature.header, Some(object(json!({ "alg": ES256K, "kid": "bilbo" }))));
        assert_eq!(jws.to_compact(), None);
    }

    #[tokio::test]
    async fn protect_one_field() {
        let spec = SignerSpec::new(
            Arc::new(Secp256k1Key::generate()),
            ProtectPolicy::only("alg"),
            object(json!({ "alg": ES256K, "kid": "bilbo" })),
        );
        let jws = JwsBuilder::new("payload").signer(spec).build().await.expect("build failed");
        let signature = &jws.signatures()[0];
        assert_eq!(decode_json(signature.protected.as_deref().unwrap()), json!({ "alg": ES256K }));
        assert_eq!(signature.header, Some(object(json!({ "kid": "bilbo" }))));

        let header = signature.effective_header().expect("decode failed");
        assert_eq!(header.as_object(), &object(json!({ "alg": ES256K, "kid": "bilbo" })));
    }

    #[tokio::test]
    async fn missing_algorithm() {
        let spec = SignerSpec::new(Arc::new(Secp256k1Key::generate()), ProtectPolicy::All, JsonObject::new());
        let err = JwsBuilder::new("payload").signer(spec).build().await.expect_err("build succeeded");
        assert!(matches!(err, JwsBuildError::MissingAlgorithm(0)));
    }

    #[tokio::test]
    async fn no_signers() {
        let err = JwsBuilder::new("payload").build().await.expect_err("build succeeded");
        assert!(matches!(err, JwsBuildError::Object(JoseObjectError::NoSignatures)));
    }

    #[tokio::test]
    async fn unsupported_key() {
        let spec = SignerSpec::new(Arc::new(NoopKey), ProtectPolicy::All, object(json!({ "alg": "HS256" })));
        let err = JwsBuilder::new("payload").signer(spec).build().await.expect_err("build succeeded");
        assert!(matches!(err, JwsBuildError::Signing(CryptoError::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn single_recipient_fields_are_shared() {
        let options = EncryptionOptions {
            content_algorithm: "A128CBC-HS256".into(),
            protect: ProtectPolicy::All,
            ..Default::default()
        };
        let request = EncryptionRequest::new(&options, &[recipient(json!({ "alg": "RSA1_5" }))]).expect("invalid");
        assert_eq!(request.protected, object(json!({ "alg": "RSA1_5", "enc": "A128CBC-HS256" })));
        assert!(request.unprotected.is_empty());
        assert!(request.recipients[0].header.is_empty());
        assert_eq!(request.recipients[0].epk, None);
        assert_eq!(request.protected.keys().collect::<Vec<_>>(), ["alg", "enc"]);
    }

    #[test]
    fn protect_only_content_algorithm() {
        let options = EncryptionOptions {
            content_algorithm: "A128GCM".into(),
            protect: ProtectPolicy::only("enc"),
            fields: object(json!({ "alg": "A128KW", "kid": "81b20965-8332-43d9-a468-82160ad91ac8" })),
            ..Default::default()
        };
        let request = EncryptionRequest::new(&options, &[recipient(json!({}))]).expect("invalid");
        assert_eq!(request.protected, object(json!({ "enc": "A128GCM" })));
        let unprotected = object(json!({ "alg": "A128KW", "kid": "81b20965-8332-43d9-a468-82160ad91ac8" }));
        assert_eq!(request.unprotected, unprotected);
    }

    #[test]
    fn multiple_recipients_keep_their_headers() {
        let options = EncryptionOptions {
            content_algorithm: "A128CBC-HS256".into(),
            protect: ProtectPolicy::only("enc"),
            fields: object(json!({ "cty": "text/plain" })),
            ..Default::default()
        };
        let recipients = [
            recipient(json!({ "alg": "RSA1_5" })),
            recipient(json!({ "alg": "ECDH-ES+A256KW" })),
            recipient(json!({ "alg": "A256GCMKW" })),
        ];
        let request = EncryptionRequest::new(&options, &recipients).expect("invalid");
        assert_eq!(request.protected, object(json!({ "enc": "A128CBC-HS256" })));
        assert_eq!(request.unprotected, object(json!({ "cty": "text/plain" })));
        let algorithms: Vec<_> = request.recipients.iter().map(|recipient| recipient.header["alg"].clone()).collect();
        assert_eq!(algorithms, [json!("RSA1_5"), json!("ECDH-ES+A256KW"), json!("A256GCMKW")]);
    }

    #[test]
    fn colliding_recipient_header() {
        let options = EncryptionOptions {
            content_algorithm: "A128GCM".into(),
            fields: object(json!({ "alg": "A128KW" })),
            ..Default::default()
        };
        let Err(EncryptionRequestError::Collision(collision)) =
            EncryptionRequest::new(&options, &[recipient(json!({ "alg": "dir" }))])
        else {
            panic!("expected a header collision");
        };
        assert_eq!(collision.name, "alg");
        assert_eq!(collision.first, ScopeKind::SharedUnprotected);
        assert_eq!(collision.second, ScopeKind::PerPartUnprotected);
    }

    #[test]
    fn single_recipient_keeps_ephemeral_key() {
        let epk = object(json!({
            "kty": "EC",
            "crv": "P-384",
            "x": "uBo4kHPw6kbjx5l0xowrd_oYzBmaz",
            "d": "iTx2pk7wW-Gq"
        }));
        let spec = recipient(json!({ "alg": "ECDH-ES+A128KW" })).with_epk(epk.clone());
        let options = EncryptionOptions { content_algorithm: "A128GCM".into(), ..Default::default() };
        let request = EncryptionRequest::new(&options, &[spec]).expect("invalid");
        assert!(request.recipients[0].header.is_empty());
        assert_eq!(request.recipients[0].epk, Some(epk));
    }

    #[test]
    fn no_recipients() {
        let result = EncryptionRequest::new(&EncryptionOptions::default(), &[]);
        assert!(matches!(result, Err(EncryptionRequestError::Object(JoseObjectError::NoRecipients))));
    }
}
