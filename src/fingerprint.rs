//! Content fingerprints over canonicalized documents.
//!
//! The canonical form is compact JSON with every object's keys sorted, so
//! whitespace and key order of the changelog source never reach the digest.
//! Multi-document payloads keep their argument order: `[a, b]` and `[b, a]`
//! hash differently.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha512};

use crate::types::Document;

/// SHA-512 digest of a change payload, stored as `{"sha512": "<hex>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash {
    /// Raw digest bytes.
    #[serde(with = "hex_bytes")]
    pub sha512: Vec<u8>,
}

impl Hash {
    /// Lowercase hex rendering of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.sha512)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hashes raw bytes, e.g. an index name.
pub fn fingerprint_bytes(bytes: &[u8]) -> Hash {
    Hash {
        sha512: Sha512::digest(bytes).to_vec(),
    }
}

/// Hashes one document.
pub fn fingerprint_document(document: &Document) -> Hash {
    fingerprint_bytes(canonical_document(document).as_bytes())
}

/// Hashes an ordered list of documents as `[doc1,doc2,...]`.
pub fn fingerprint_documents<'a, I>(documents: I) -> Hash
where
    I: IntoIterator<Item = &'a Document>,
{
    let joined = documents
        .into_iter()
        .map(canonical_document)
        .collect::<Vec<_>>()
        .join(",");
    fingerprint_bytes(format!("[{joined}]").as_bytes())
}

/// Canonical JSON text of a document.
pub fn canonical_document(document: &Document) -> String {
    canonical_json(&Value::Object(document.clone()))
}

/// Canonical JSON text of any value: compact, object keys sorted recursively.
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut entries: Vec<(&String, &Value)> = obj.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::with_capacity(obj.len());
            for (key, item) in entries {
                out.insert(key.clone(), sorted(item));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
