use crate::{
    builder::{
        EncryptionOptions, EncryptionRequest, EncryptionRequestError, JwsBuildError, JwsBuilder, RecipientSpec,
        SignerSpec,
    },
    format::{DisplayBlock, Formatter},
    header::JsonObject,
    jose::{from_base64, to_base64, DecodeError, Jwe, Jws},
    render::{RenderOptions, SectionWriter},
    signer::{CryptoError, Encrypter},
};
use serde_json::Value;
use std::{
    collections::HashSet,
    io::{self, Write},
};

/// A plaintext shared by one or more examples.
#[derive(Clone, Debug, PartialEq)]
pub struct Plaintext {
    /// The title the plaintext is shown under, like `Payload` for signatures or `common` for
    /// encryption, where sections read `common Plaintext`.
    pub title: String,

    /// The plaintext itself.
    pub content: String,

    /// Whether the plaintext is a JSON document and should be shown pretty printed.
    pub json: bool,
}

impl Plaintext {
    /// A text plaintext.
    pub fn text<T: Into<String>, C: Into<String>>(title: T, content: C) -> Self {
        Self { title: title.into(), content: content.into(), json: false }
    }

    /// A JSON plaintext.
    pub fn json<T: Into<String>, C: Into<String>>(title: T, content: C) -> Self {
        Self { title: title.into(), content: content.into(), json: true }
    }
}

/// A signature example.
#[derive(Clone)]
pub struct SignatureExample {
    /// The example name.
    pub name: String,

    /// The payload being signed.
    pub payload: Plaintext,

    /// The signers.
    pub signers: Vec<SignerSpec>,

    /// Whether the payload is left out of the rendered JWS.
    pub detached: bool,
}

/// An encryption example.
#[derive(Clone)]
pub struct EncryptionExample {
    /// The example name.
    pub name: String,

    /// The plaintext being encrypted.
    pub plaintext: Plaintext,

    /// The encryption options.
    pub options: EncryptionOptions,

    /// The recipients.
    pub recipients: Vec<RecipientSpec>,
}

/// An error that aborts a single example.
#[derive(Debug, thiserror::Error)]
pub enum ExampleError {
    #[error(transparent)]
    Build(#[from] JwsBuildError),

    #[error(transparent)]
    Request(#[from] EncryptionRequestError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("recipient #{0} has no algorithm")]
    MissingAlgorithm(usize),

    #[error("expected {expected} recipients, got {found}")]
    RecipientCount { expected: usize, found: usize },

    #[error("serializing example: {0}")]
    Json(#[from] serde_json::Error),

    #[error("writing example: {0}")]
    Io(#[from] io::Error),
}

/// Renders sequences of examples into a document.
///
/// Examples are rendered one at a time. Each of them is fully rendered before anything is written
/// out, so a failing example only leaves a failure line behind.
pub struct Cookbook<W> {
    writer: SectionWriter<W>,
    rendered_plaintexts: HashSet<String>,
}

impl<W: Write> Cookbook<W> {
    /// Construct a new cookbook writing into the given sink.
    pub fn new(sink: W, options: RenderOptions) -> Self {
        Self { writer: SectionWriter::new(sink, options), rendered_plaintexts: HashSet::new() }
    }

    /// Render signature examples, preceded by their payloads.
    pub async fn run_signatures(&mut self, examples: &[SignatureExample]) -> io::Result<()> {
        for example in examples {
            self.plaintext(&example.payload, "", None)?;
        }
        self.writer.line("\n\n")?;

        for example in examples {
            let result = self.signature_example(example).await;
            self.finish(&example.name, result)?;
        }
        Ok(())
    }

    /// Render encryption examples, preceded by their plaintexts.
    pub async fn run_encryptions<E: Encrypter>(
        &mut self,
        encrypter: &E,
        examples: &[EncryptionExample],
    ) -> io::Result<()> {
        for example in examples {
            let plaintext = &example.plaintext;
            let compressed = if example.options.zip && !self.rendered_plaintexts.contains(&plaintext.title) {
                match encrypter.deflate(plaintext.content.as_bytes()).await {
                    Ok(compressed) => Some(compressed),
                    Err(e) => {
                        tracing::warn!(example = %example.name, error = %e, "could not compress plaintext");
                        None
                    }
                }
            } else {
                None
            };
            self.plaintext(plaintext, " Plaintext", compressed.as_deref())?;
        }
        self.writer.line("\n\n")?;

        for example in examples {
            let result = self.encryption_example(encrypter, example).await;
            self.finish(&example.name, result)?;
        }
        Ok(())
    }

    /// Returns true if a plaintext with the given title was already rendered.
    pub fn is_rendered(&self, title: &str) -> bool {
        self.rendered_plaintexts.contains(title)
    }

    /// Consume this cookbook and return the underlying sink.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    // `noun` follows the title in every section heading.
    fn plaintext(&mut self, plaintext: &Plaintext, noun: &str, compressed: Option<&[u8]>) -> io::Result<()> {
        let Plaintext { title, content, json } = plaintext;
        if !self.rendered_plaintexts.insert(title.clone()) {
            tracing::debug!(%title, "plaintext already rendered");
            return Ok(());
        }

        let formatter = *self.writer.formatter();
        let text = match serde_json::from_str::<Value>(content) {
            Ok(value) if *json => formatter.prettify(&value),
            _ => formatter.split_binary(content),
        };
        self.writer.section(&format!("{title}{noun} (utf-8)"), text)?;
        self.writer.section(&format!("{title}{noun} (base64url)"), formatter.prettify_str(&to_base64(content)))?;
        if let Some(compressed) = compressed {
            let compressed = formatter.prettify_str(&to_base64(compressed));
            self.writer.section(&format!("{title} Compressed{noun} (base64url)"), compressed)?;
        }
        self.writer.separator()
    }

    fn finish(&mut self, name: &str, result: Result<Vec<u8>, ExampleError>) -> io::Result<()> {
        match result {
            Ok(output) => self.writer.raw(&output),
            Err(e) => {
                tracing::warn!(example = %name, error = %e, "example failed");
                self.writer.line(format!("Example '{name}' failed: {e}"))
            }
        }
    }

    async fn signature_example(&self, example: &SignatureExample) -> Result<Vec<u8>, ExampleError> {
        let jws = JwsBuilder::new(example.payload.content.as_bytes())
            .signers(example.signers.iter().cloned())
            .build()
            .await?;
        let jws = if example.detached { jws.detach() } else { jws };

        let mut writer = SectionWriter::<Vec<u8>>::buffered(self.writer.options().clone());
        render_jws(&mut writer, &example.name, &jws, &example.signers)?;
        Ok(writer.into_inner())
    }

    async fn encryption_example<E: Encrypter>(
        &self,
        encrypter: &E,
        example: &EncryptionExample,
    ) -> Result<Vec<u8>, ExampleError> {
        let request = EncryptionRequest::new(&example.options, &example.recipients)?;
        let options = self.writer.options().clone();
        let mut writer = SectionWriter::<Vec<u8>>::buffered(options.clone());
        let formatter = *writer.formatter();

        if let Some(aad) = &request.aad {
            let aad_json = match serde_json::from_slice::<Value>(aad) {
                Ok(value) => formatter.prettify(&value),
                Err(_) => formatter.split_binary(&String::from_utf8_lossy(aad)),
            };
            writer.section("Additional Authenticated Data (JSON)", aad_json)?;
            writer.section("Additional Authenticated Data (base64url)", formatter.prettify_str(&to_base64(aad)))?;
        }

        let jwe = encrypter.encrypt(example.plaintext.content.as_bytes(), &request).await?;
        if jwe.recipients().len() != request.recipients.len() {
            return Err(ExampleError::RecipientCount {
                expected: request.recipients.len(),
                found: jwe.recipients().len(),
            });
        }
        let compact = jwe.to_compact();
        writer.banner(&example.name)?;

        let mut recipients = SectionWriter::<Vec<u8>>::buffered(options.clone());
        let mut cek = None;
        for (index, (recipient, spec)) in jwe.recipients().iter().zip(&request.recipients).enumerate() {
            let number = index + 1;
            recipients.section(&format!("Recipient #{number} Key"), key_block(&formatter, &spec.key.to_jwk()))?;
            if let Some(header) = &recipient.header {
                recipients.section(&format!("Recipient #{number} Header (JSON)"), object_block(&formatter, header))?;
            }
            if let Some(epk) = &spec.epk {
                let mut epk = epk.clone();
                for member in ["kid", "use", "alg"] {
                    epk.shift_remove(member);
                }
                let epk = object_block(&formatter, &epk);
                recipients.section(&format!("Recipient #{number} Ephemeral Public/Private Key (JSON)"), epk)?;
            }

            let header = jwe.effective_header(recipient)?;
            let algorithm = header.algorithm().ok_or(ExampleError::MissingAlgorithm(number))?;
            let encrypted_key = recipient
                .encrypted_key
                .as_deref()
                .map(from_base64)
                .transpose()
                .map_err(|e| DecodeError::Base64("encrypted key", e))?;
            let unwrapped = spec.key.unwrap_key(algorithm, encrypted_key.as_deref(), &header).await?;
            if !unwrapped.factors.is_empty() {
                let factors = object_block(&formatter, &unwrapped.factors);
                recipients.section(&format!("Recipient #{number} Content Encryption Factors"), factors)?;
            }
            if let Some(encrypted_key) = &recipient.encrypted_key {
                let encrypted_key = formatter.prettify_str(encrypted_key);
                recipients.section(&format!("Recipient #{number} JWE Encrypted Key"), encrypted_key)?;
            }
            let recipient = formatter.prettify(&serde_json::to_value(recipient)?);
            recipients.section(&format!("Recipient #{number}"), recipient)?;
            cek = Some(to_base64(unwrapped.cek));
        }

        if let Some(cek) = cek {
            writer.section("Content Encryption Key", formatter.prettify_str(&cek))?;
        }
        if let Some(iv) = &jwe.iv {
            writer.section("Initialization Vector", formatter.prettify_str(iv))?;
        }
        writer.raw(&recipients.into_inner())?;
        writer.raw(&shared_headers(&jwe, options)?)?;
        writer.section("Ciphertext", formatter.prettify_str(&jwe.ciphertext))?;
        if let Some(tag) = &jwe.tag {
            writer.section("Authentication Tag", formatter.prettify_str(tag))?;
        }
        if let Some(compact) = compact {
            writer.section("Compact Serialization", compact.to_manuscript(&formatter))?;
        }
        writer.section("JSON Serialization", formatter.prettify(&serde_json::to_value(&jwe)?))?;
        writer.separator()?;
        Ok(writer.into_inner())
    }
}

/// Render a signed example.
///
/// `signers` are the specs the JWS was built from, in the same order as its signatures.
pub fn render_jws<W: Write>(
    writer: &mut SectionWriter<W>,
    name: &str,
    jws: &Jws,
    signers: &[SignerSpec],
) -> Result<(), ExampleError> {
    let formatter = *writer.formatter();
    let compact = jws.to_compact();
    writer.banner(name)?;

    for (index, (signature, signer)) in jws.signatures().iter().zip(signers).enumerate() {
        let number = index + 1;
        writer.section(&format!("Signature #{number} Key"), key_block(&formatter, &signer.key.to_jwk()))?;
        if let Some(protected) = &signature.protected {
            let header = signature.protected_header()?.unwrap_or_default();
            writer.section(&format!("Signature #{number} Protected Header (JSON)"), object_block(&formatter, &header))?;
            let protected = formatter.prettify_str(protected);
            writer.section(&format!("Signature #{number} Protected Header (base64url)"), protected)?;
        }
        if let Some(header) = &signature.header {
            let header = object_block(&formatter, header);
            writer.section(&format!("Signature #{number} Unprotected Header (JSON)"), header)?;
        }
        writer.section(&format!("Signature #{number}"), formatter.prettify_str(&signature.signature))?;
    }

    if let Some(compact) = compact {
        writer.section("Compact Serialization", compact.to_manuscript(&formatter))?;
    }
    writer.section("JSON Serialization", formatter.prettify(&serde_json::to_value(jws)?))?;
    writer.separator()?;
    Ok(())
}

fn shared_headers(jwe: &Jwe, options: RenderOptions) -> Result<Vec<u8>, ExampleError> {
    let mut writer = SectionWriter::<Vec<u8>>::buffered(options);
    let formatter = *writer.formatter();
    if let Some(unprotected) = &jwe.unprotected {
        writer.section("JWE Unprotected Header (JSON)", object_block(&formatter, unprotected))?;
    }
    if let Some(protected) = &jwe.protected {
        let header = jwe.protected_header()?.unwrap_or_default();
        writer.section("JWE Protected Header (JSON)", object_block(&formatter, &header))?;
        writer.section("JWE Protected Header (base64url)", formatter.prettify_str(protected))?;
    }
    Ok(writer.into_inner())
}

// Password based keys are shown as the raw password rather than as a JWK.
fn key_block(formatter: &Formatter, jwk: &JsonObject) -> DisplayBlock {
    let algorithm = jwk.get("alg").and_then(Value::as_str).unwrap_or_default();
    let password = jwk.get("k").and_then(Value::as_str).and_then(|secret| from_base64(secret).ok());
    match password {
        Some(password) if algorithm.starts_with("PBES2-") => {
            formatter.split_binary(&String::from_utf8_lossy(&password))
        }
        _ => object_block(formatter, jwk),
    }
}

fn object_block(formatter: &Formatter, object: &JsonObject) -> DisplayBlock {
    formatter.prettify(&Value::Object(object.clone()))
}
