use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// A JSON object.
pub type JsonObject = serde_json::Map<String, Value>;

/// The marker used to protect every header field.
const PROTECT_ALL: &str = "*";

/// Which header fields of a part end up in its protected header.
///
/// This serializes as `"*"`, a single field name, or `null`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ProtectPolicy {
    /// Every declared field is protected.
    All,

    /// Only the named field is protected.
    Only(String),

    /// No field is protected.
    #[default]
    None,
}

impl ProtectPolicy {
    /// Construct a policy that only protects the given field.
    pub fn only<S: Into<String>>(field: S) -> Self {
        Self::Only(field.into())
    }

    /// Returns true if the given field is protected under this policy.
    pub fn protects(&self, field: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(name) => name == field,
            Self::None => false,
        }
    }

    /// Split a set of header fields into its protected and unprotected parts.
    pub fn partition(&self, fields: &JsonObject) -> PartitionedHeader {
        let mut output = PartitionedHeader::default();
        for (name, value) in fields {
            let target = if self.protects(name) { &mut output.protected } else { &mut output.unprotected };
            target.insert(name.clone(), value.clone());
        }
        output
    }
}

impl fmt::Display for ProtectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "{PROTECT_ALL}"),
            Self::Only(name) => write!(f, "{name}"),
            Self::None => write!(f, "null"),
        }
    }
}

impl Serialize for ProtectPolicy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::All => serializer.serialize_str(PROTECT_ALL),
            Self::Only(name) => serializer.serialize_str(name),
            Self::None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for ProtectPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let policy = match Option::<String>::deserialize(deserializer)? {
            None => Self::None,
            Some(name) if name == PROTECT_ALL => Self::All,
            Some(name) if name.is_empty() => return Err(D::Error::custom("empty protected field name")),
            Some(name) => Self::Only(name),
        };
        Ok(policy)
    }
}

/// A header split by a [`ProtectPolicy`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartitionedHeader {
    /// The fields that are integrity protected.
    pub protected: JsonObject,

    /// The fields that are not.
    pub unprotected: JsonObject,
}

/// The kind of a header scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    /// The integrity protected header.
    Protected,

    /// The unprotected header shared by every signature or recipient.
    SharedUnprotected,

    /// The unprotected header of a single signature or recipient.
    PerPartUnprotected,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Protected => "protected",
            Self::SharedUnprotected => "shared unprotected",
            Self::PerPartUnprotected => "per-part unprotected",
        };
        write!(f, "{text}")
    }
}

/// The order in which scopes are merged into an effective header.
///
/// Scopes later in this list overwrite fields coming from earlier ones.
pub const PRECEDENCE: [ScopeKind; 3] =
    [ScopeKind::SharedUnprotected, ScopeKind::PerPartUnprotected, ScopeKind::Protected];

/// The three header scopes that apply to a single signature or recipient.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeaderScopes {
    /// The protected header.
    pub protected: JsonObject,

    /// The unprotected header shared across all parts.
    pub shared_unprotected: JsonObject,

    /// The unprotected header for this part only.
    pub per_part_unprotected: JsonObject,
}

impl HeaderScopes {
    /// Get the fields in one scope.
    pub fn scope(&self, kind: ScopeKind) -> &JsonObject {
        match kind {
            ScopeKind::Protected => &self.protected,
            ScopeKind::SharedUnprotected => &self.shared_unprotected,
            ScopeKind::PerPartUnprotected => &self.per_part_unprotected,
        }
    }

    /// Ensure no header field is declared in more than one scope.
    pub fn validate(&self) -> Result<(), HeaderCollision> {
        for (index, first) in PRECEDENCE.iter().enumerate() {
            for second in &PRECEDENCE[index + 1..] {
                let other = self.scope(*second);
                if let Some(name) = self.scope(*first).keys().find(|name| other.contains_key(*name)) {
                    return Err(HeaderCollision { name: name.clone(), first: *first, second: *second });
                }
            }
        }
        Ok(())
    }

    /// Merge the scopes into the effective header.
    ///
    /// Collisions are resolved by [`PRECEDENCE`] rather than reported.
    pub fn resolve(&self) -> EffectiveHeader {
        let mut fields = JsonObject::new();
        for kind in PRECEDENCE {
            for (name, value) in self.scope(kind) {
                fields.insert(name.clone(), value.clone());
            }
        }
        EffectiveHeader(fields)
    }
}

/// A header field declared in two scopes of the same part.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("header field '{name}' is declared in both the {first} and {second} headers")]
pub struct HeaderCollision {
    /// The field name.
    pub name: String,

    /// The first scope the field was found in.
    pub first: ScopeKind,

    /// The second scope the field was found in.
    pub second: ScopeKind,
}

/// The header that effectively applies to a signature or recipient.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectiveHeader(JsonObject);

impl EffectiveHeader {
    /// Get a header field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The `alg` field, if it's a string.
    pub fn algorithm(&self) -> Option<&str> {
        self.get("alg").and_then(Value::as_str)
    }

    /// Get all fields.
    pub fn as_object(&self) -> &JsonObject {
        &self.0
    }

    /// Consume this header and return its fields.
    pub fn into_inner(self) -> JsonObject {
        self.0
    }
}
