//! 12-byte object identifiers and their extended-JSON form.

use std::{
    fmt,
    str::FromStr,
    sync::{
        LazyLock,
        atomic::{AtomicU32, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, ser::SerializeMap};
use serde_json::{Value, json};

/// Extended-JSON key wrapping an object id.
pub const OID_KEY: &str = "$oid";

static PROCESS_UNIQUE: LazyLock<[u8; 5]> = LazyLock::new(rand::random);
static COUNTER: LazyLock<AtomicU32> = LazyLock::new(|| AtomicU32::new(rand::random()));

/// Identifier made of a 4-byte timestamp, a 5-byte process value and a
/// 3-byte counter. Ids generated by one process sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

/// Rejected object-id literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid object id literal '{0}'")]
pub struct InvalidObjectId(pub String);

impl ObjectId {
    /// Generates a fresh id.
    pub fn new() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Wraps raw bytes.
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Lowercase 24-character hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// True when `literal` is 24 hex characters.
    pub fn is_valid(literal: &str) -> bool {
        literal.len() == 24 && literal.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Extended-JSON representation, `{"$oid": "<hex>"}`.
    pub fn to_value(&self) -> Value {
        json!({ OID_KEY: self.to_hex() })
    }

    /// Reads the extended-JSON representation back.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.len() != 1 {
            return None;
        }
        obj.get(OID_KEY)?.as_str()?.parse().ok()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = InvalidObjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_valid(s) {
            return Err(InvalidObjectId(s.to_string()));
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| InvalidObjectId(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(OID_KEY, &self.to_hex())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Extended {
            #[serde(rename = "$oid")]
            oid: String,
        }

        let ext = Extended::deserialize(deserializer)?;
        ext.oid.parse().map_err(serde::de::Error::custom)
    }
}
