use crate::header::{EffectiveHeader, HeaderScopes, JsonObject};
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use serde::{de::Error, Deserialize, Deserializer, Serialize};
use serde_with::skip_serializing_none;
use std::str::FromStr;

/// A JOSE object in General JSON Serialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JoseObject {
    /// A JSON Web Encryption object.
    Encrypted(Jwe),

    /// A JSON Web Signature object.
    Signed(Jws),
}

impl FromStr for JoseObject {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

impl From<Jws> for JoseObject {
    fn from(jws: Jws) -> Self {
        Self::Signed(jws)
    }
}

impl From<Jwe> for JoseObject {
    fn from(jwe: Jwe) -> Self {
        Self::Encrypted(jwe)
    }
}

/// A JSON Web Signature.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Jws {
    /// The base64url encoded payload, absent when detached.
    pub payload: Option<String>,

    #[serde(deserialize_with = "non_empty")]
    signatures: Vec<JwsSignature>,
}

impl Jws {
    /// Construct a JWS out of its payload and signatures.
    pub fn new(payload: Option<String>, signatures: Vec<JwsSignature>) -> Result<Self, JoseObjectError> {
        if signatures.is_empty() {
            return Err(JoseObjectError::NoSignatures);
        }
        Ok(Self { payload, signatures })
    }

    /// Get the signatures in this JWS.
    pub fn signatures(&self) -> &[JwsSignature] {
        &self.signatures
    }

    /// Drop the payload, turning this into a detached signature.
    pub fn detach(mut self) -> Self {
        self.payload = None;
        self
    }
}

/// A single signature in a JWS.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JwsSignature {
    /// The base64url encoded protected header.
    pub protected: Option<String>,

    /// The unprotected header for this signature.
    pub header: Option<JsonObject>,

    /// The base64url encoded signature.
    pub signature: String,
}

impl JwsSignature {
    /// Decode the protected header of this signature.
    pub fn protected_header(&self) -> Result<Option<JsonObject>, DecodeError> {
        self.protected.as_deref().map(decode_header).transpose()
    }

    /// Get the header scopes that apply to this signature.
    pub fn scopes(&self) -> Result<HeaderScopes, DecodeError> {
        Ok(HeaderScopes {
            protected: self.protected_header()?.unwrap_or_default(),
            shared_unprotected: JsonObject::new(),
            per_part_unprotected: self.header.clone().unwrap_or_default(),
        })
    }

    /// Compute the effective header for this signature.
    pub fn effective_header(&self) -> Result<EffectiveHeader, DecodeError> {
        Ok(self.scopes()?.resolve())
    }
}

/// A JSON Web Encryption object.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Jwe {
    #[serde(deserialize_with = "non_empty")]
    recipients: Vec<JweRecipient>,

    /// The unprotected header shared by all recipients.
    pub unprotected: Option<JsonObject>,

    /// The base64url encoded protected header.
    pub protected: Option<String>,

    /// The base64url encoded additional authenticated data.
    pub aad: Option<String>,

    /// The base64url encoded initialization vector.
    pub iv: Option<String>,

    /// The base64url encoded ciphertext.
    pub ciphertext: String,

    /// The base64url encoded authentication tag.
    pub tag: Option<String>,
}

impl Jwe {
    /// Construct a JWE out of its recipients and its encrypted content.
    pub fn new(recipients: Vec<JweRecipient>, ciphertext: String) -> Result<Self, JoseObjectError> {
        if recipients.is_empty() {
            return Err(JoseObjectError::NoRecipients);
        }
        Ok(Self { recipients, unprotected: None, protected: None, aad: None, iv: None, ciphertext, tag: None })
    }

    /// Get the recipients of this JWE.
    pub fn recipients(&self) -> &[JweRecipient] {
        &self.recipients
    }

    /// Decode the protected header.
    pub fn protected_header(&self) -> Result<Option<JsonObject>, DecodeError> {
        self.protected.as_deref().map(decode_header).transpose()
    }

    /// Get the header scopes that apply to the given recipient.
    pub fn scopes(&self, recipient: &JweRecipient) -> Result<HeaderScopes, DecodeError> {
        Ok(HeaderScopes {
            protected: self.protected_header()?.unwrap_or_default(),
            shared_unprotected: self.unprotected.clone().unwrap_or_default(),
            per_part_unprotected: recipient.header.clone().unwrap_or_default(),
        })
    }

    /// Compute the effective header for the given recipient.
    pub fn effective_header(&self, recipient: &JweRecipient) -> Result<EffectiveHeader, DecodeError> {
        Ok(self.scopes(recipient)?.resolve())
    }
}

/// A recipient of a JWE.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JweRecipient {
    /// The unprotected header for this recipient.
    pub header: Option<JsonObject>,

    /// The base64url encoded encrypted key.
    pub encrypted_key: Option<String>,
}

/// An error when constructing a JOSE object.
#[derive(Debug, thiserror::Error)]
pub enum JoseObjectError {
    #[error("a JWS needs at least one signature")]
    NoSignatures,

    #[error("a JWE needs at least one recipient")]
    NoRecipients,
}

/// An error when decoding a base64url encoded JSON value.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64 found on {0}: {1}")]
    Base64(&'static str, base64::DecodeError),

    #[error("invalid JSON on {0}: {1}")]
    Json(&'static str, serde_json::Error),
}

fn decode_header(input: &str) -> Result<JsonObject, DecodeError> {
    let input = from_base64(input).map_err(|e| DecodeError::Base64("protected header", e))?;
    serde_json::from_slice(&input).map_err(|e| DecodeError::Json("protected header", e))
}

fn non_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items = Vec::<T>::deserialize(deserializer)?;
    if items.is_empty() {
        return Err(D::Error::custom("expected at least one entry"));
    }
    Ok(items)
}

pub(crate) fn to_base64<T: AsRef<[u8]>>(input: T) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(input)
}

pub(crate) fn to_base64_json<T: Serialize>(input: &T) -> Result<String, serde_json::Error> {
    let input = serde_json::to_vec(input)?;
    Ok(to_base64(input))
}

pub(crate) fn from_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64_URL_SAFE_NO_PAD.decode(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    // A single recipient JWE using AES key wrap.
    const AESKW_JWE: &str = r#"{
  "recipients": [
    {
      "encrypted_key": "CBI6oDw8MydIx1IBntf_lQcw2MmJKIQx"
    }
  ],
  "protected": "eyJhbGciOiJBMTI4S1ciLCJraWQiOiI4MWIyMDk2NS04MzMyLTQzZDktYTQ2OC04MjE2MGFkOTFhYzgiLCJlbmMiOiJBMTI4R0NNIn0",
  "iv": "Qx0pmsDa8KnJc9Jo",
  "ciphertext": "AwliP-KmWgsZ37BvzCefNen6VTbRK3QMA4TkvRkH0tP1bTdhtFJgJxeVmJkLD61A1hnWGetdg11c9ADsnWgL56NyxwSYjU1ZEHcGkd3EkU0vjHi9gTlb90qSYFfeF0LwkcTtjbYKCsiNJQkcIp1yeM03OmuiYSoYJVSpf7ej6zaYcMv3WwdxDFl8REwOhNImk2Xld2JXq6BR53TSFkyT7PwVLuq-1GwtGHlQeg7gDT6xW0JqHDPn_H-puQsmthc9Zg0ojmJfqqFvETUxLAF-KjcBTS5dNy6egwkYtOt8EIHK-oEsKYtZRaa8Z7MOZ7UGxGIMvEmxrGCPeJa14slv2-gaqK0kEThkaSqdYw0FkQZF",
  "tag": "ER7MWJZ1FBI_NKvn7Zb1Lw"
}"#;

    #[test]
    fn parse_encrypted() {
        let object: JoseObject = AESKW_JWE.parse().expect("parse failed");
        let JoseObject::Encrypted(jwe) = object else {
            panic!("not a JWE");
        };
        assert_eq!(jwe.recipients().len(), 1);
        let header = jwe.effective_header(&jwe.recipients()[0]).expect("decode failed");
        assert_eq!(header.algorithm(), Some("A128KW"));
        assert_eq!(header.get("enc"), Some(&json!("A128GCM")));
        assert_eq!(header.get("kid"), Some(&json!("81b20965-8332-43d9-a468-82160ad91ac8")));
    }

    #[test]
    fn parse_signed() {
        let input = json!({
            "payload": "SXTigJlzIGEgZGFuZ2Vyb3Vz",
            "signatures": [
                { "protected": "eyJhbGciOiJIUzI1NiJ9", "signature": "s0h6KThzkfBBBkLspW1h84VsJZFTsPPqMDA7g1Md7p0" }
            ]
        });
        let object: JoseObject = serde_json::from_value(input.clone()).expect("parse failed");
        let JoseObject::Signed(jws) = &object else {
            panic!("not a JWS");
        };
        let scopes = jws.signatures()[0].scopes().expect("decode failed");
        assert_eq!(scopes.protected, json!({ "alg": "HS256" }).as_object().cloned().unwrap());
        assert!(scopes.per_part_unprotected.is_empty());

        // Serializing back doesn't add empty members.
        assert_eq!(serde_json::to_value(&object).expect("serialize failed"), input);
    }

    #[rstest]
    #[case::no_signatures(r#"{"payload":"YQ","signatures":[]}"#)]
    #[case::no_recipients(r#"{"recipients":[],"ciphertext":"YQ"}"#)]
    #[case::neither(r#"{"payload":"YQ"}"#)]
    #[case::not_an_object(r#""YQ""#)]
    fn invalid_objects(#[case] input: &str) {
        input.parse::<JoseObject>().expect_err("parse succeeded");
    }

    #[test]
    fn empty_constructors() {
        assert!(matches!(Jws::new(None, vec![]), Err(JoseObjectError::NoSignatures)));
        assert!(matches!(Jwe::new(vec![], "YQ".into()), Err(JoseObjectError::NoRecipients)));
    }

    #[rstest]
    #[case::bad_base64("&&&")]
    #[case::bad_json("eyJmb28iOiJiYXIi")]
    fn invalid_protected_header(#[case] protected: &str) {
        let signature = JwsSignature { protected: Some(protected.into()), header: None, signature: "YQ".into() };
        signature.protected_header().expect_err("decode succeeded");
    }

    #[test]
    fn detach() {
        let signature = JwsSignature { protected: None, header: None, signature: "YQ".into() };
        let jws = Jws::new(Some("YQ".into()), vec![signature]).expect("no signatures").detach();
        assert_eq!(jws.payload, None);
        let value = serde_json::to_value(&jws).expect("serialize failed");
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn base64_json() {
        let encoded = to_base64_json(&json!({ "alg": "HS256" })).expect("encode failed");
        assert_eq!(encoded, "eyJhbGciOiJIUzI1NiJ9");
        assert_eq!(from_base64(&encoded).expect("decode failed"), br#"{"alg":"HS256"}"#);
    }
}
