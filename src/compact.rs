use crate::{
    format::Formatter,
    jose::{JoseObject, Jwe, Jws},
};
use itertools::Itertools;
use std::{convert::Infallible, fmt, str::FromStr};

/// The shape of a compact serialization, based on its segment count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompactShape {
    /// A JWS: protected header, payload, signature.
    Signed,

    /// A JWE: protected header, encrypted key, IV, ciphertext, tag.
    Encrypted,

    /// Any other number of segments.
    Unknown(usize),
}

/// A JOSE object in Compact Serialization.
///
/// This is only a structural view: nothing about the segments is validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactForm {
    segments: Vec<String>,
}

impl CompactForm {
    /// Split a compact serialization into its segments.
    ///
    /// This never fails, the segment count only determines the shape.
    pub fn parse(s: &str) -> Self {
        Self { segments: s.split('.').map(ToString::to_string).collect() }
    }

    /// Get the segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Get the shape of this form.
    pub fn shape(&self) -> CompactShape {
        match self.segments.len() {
            3 => CompactShape::Signed,
            5 => CompactShape::Encrypted,
            other => CompactShape::Unknown(other),
        }
    }

    /// Render this form for a manuscript.
    ///
    /// Every segment is wrapped on its own lines and the dots separating them are kept at the
    /// start of the following segment. Empty segments collapse into a single line break.
    pub fn to_manuscript(&self, formatter: &Formatter) -> String {
        let output = self
            .segments
            .iter()
            .map(|segment| {
                if segment.is_empty() {
                    "\n".to_string()
                } else {
                    format!("\n{}\n", formatter.chunk(segment))
                }
            })
            .join(".");
        output.trim().to_string()
    }
}

impl fmt::Display for CompactForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.iter().join("."))
    }
}

impl FromStr for CompactForm {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// The reason a JOSE object has no compact serialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CompactIllegality {
    #[error("compact serialization needs exactly one signature, found {0}")]
    SignatureCount(usize),

    #[error("signature has an unprotected header")]
    SignatureHeader,

    #[error("ciphertext is missing")]
    MissingCiphertext,

    #[error("additional authenticated data is present")]
    AdditionalAuthenticatedData,

    #[error("shared unprotected header is present")]
    SharedUnprotectedHeader,

    #[error("compact serialization needs exactly one recipient, found {0}")]
    RecipientCount(usize),
}

impl Jws {
    /// Convert this JWS into its compact serialization, if it has one.
    pub fn try_compact(&self) -> Result<CompactForm, CompactIllegality> {
        let [signature] = self.signatures() else {
            return Err(CompactIllegality::SignatureCount(self.signatures().len()));
        };
        if signature.header.as_ref().is_some_and(|header| !header.is_empty()) {
            return Err(CompactIllegality::SignatureHeader);
        }
        let segments = vec![
            signature.protected.clone().unwrap_or_default(),
            self.payload.clone().unwrap_or_default(),
            signature.signature.clone(),
        ];
        Ok(CompactForm { segments })
    }

    /// Convert this JWS into its compact serialization, returning `None` if that's not possible.
    pub fn to_compact(&self) -> Option<CompactForm> {
        log_illegal(self.try_compact())
    }
}

impl Jwe {
    /// Convert this JWE into its compact serialization, if it has one.
    ///
    /// The header of the only recipient is not part of the compact form. Objects built through
    /// [`EncryptionRequest`](crate::builder::EncryptionRequest) never carry one, since a single
    /// recipient's fields are moved to the object level.
    pub fn try_compact(&self) -> Result<CompactForm, CompactIllegality> {
        if self.ciphertext.is_empty() {
            return Err(CompactIllegality::MissingCiphertext);
        }
        if self.aad.as_ref().is_some_and(|aad| !aad.is_empty()) {
            return Err(CompactIllegality::AdditionalAuthenticatedData);
        }
        if self.unprotected.as_ref().is_some_and(|header| !header.is_empty()) {
            return Err(CompactIllegality::SharedUnprotectedHeader);
        }
        let [recipient] = self.recipients() else {
            return Err(CompactIllegality::RecipientCount(self.recipients().len()));
        };
        if let Some(header) = recipient.header.as_ref().filter(|header| !header.is_empty()) {
            let fields = header.keys().join(", ");
            tracing::debug!(%fields, "recipient header left out of compact serialization");
        }
        let segments = vec![
            self.protected.clone().unwrap_or_default(),
            recipient.encrypted_key.clone().unwrap_or_default(),
            self.iv.clone().unwrap_or_default(),
            self.ciphertext.clone(),
            self.tag.clone().unwrap_or_default(),
        ];
        Ok(CompactForm { segments })
    }

    /// Convert this JWE into its compact serialization, returning `None` if that's not possible.
    pub fn to_compact(&self) -> Option<CompactForm> {
        log_illegal(self.try_compact())
    }
}

impl JoseObject {
    /// Convert this object into its compact serialization, if it has one.
    pub fn try_compact(&self) -> Result<CompactForm, CompactIllegality> {
        match self {
            Self::Signed(jws) => jws.try_compact(),
            Self::Encrypted(jwe) => jwe.try_compact(),
        }
    }

    /// Convert this object into its compact serialization, returning `None` if that's not possible.
    pub fn to_compact(&self) -> Option<CompactForm> {
        log_illegal(self.try_compact())
    }
}

fn log_illegal(result: Result<CompactForm, CompactIllegality>) -> Option<CompactForm> {
    match result {
        Ok(form) => Some(form),
        Err(reason) => {
            tracing::debug!(%reason, "no compact serialization");
            None
        }
    }
}
