//! Metadata table entries and the `<kind>:<entityId>` id convention.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Kind of host entity an entry was indexed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Conversation,
    Message,
    Resource,
}

impl EntityKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Message => "message",
            Self::Resource => "resource",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "conversation" | "conv" => Ok(Self::Conversation),
            "message" | "msg" => Ok(Self::Message),
            "resource" | "res" => Ok(Self::Resource),
            other => Err(Error::InvalidId(format!("unknown entity kind '{other}'"))),
        }
    }
}

/// A host-side id of the form `<kind>:<entityId>`.
///
/// The index treats ids as opaque strings; this type only helps hosts build
/// and take apart the ones they hand to the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryId {
    kind: EntityKind,
    entity_id: String,
}

impl EntryId {
    pub fn new(kind: EntityKind, entity_id: impl Into<String>) -> Self {
        EntryId {
            kind,
            entity_id: entity_id.into(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.entity_id)
    }
}

impl FromStr for EntryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, entity_id) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidId(format!("'{s}' has no kind prefix")))?;
        if entity_id.is_empty() {
            return Err(Error::InvalidId(format!("'{s}' has an empty entity id")));
        }
        Ok(EntryId::new(kind.parse()?, entity_id))
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> Self {
        id.to_string()
    }
}

/// Caller-supplied metadata for [`super::EmbeddingService::add`].
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub kind: EntityKind,
    pub fields: Map<String, Value>,
}

impl Metadata {
    pub fn new(kind: EntityKind) -> Self {
        Metadata {
            kind,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// One row of the metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_round_trip() {
        let id: EntryId = "conversation:42".parse().unwrap();
        assert_eq!(id.kind(), EntityKind::Conversation);
        assert_eq!(id.entity_id(), "42");
        assert_eq!(id.to_string(), "conversation:42");

        let short: EntryId = "conv:1".parse().unwrap();
        assert_eq!(String::from(short), "conversation:1");
    }

    #[test]
    fn test_entry_id_keeps_inner_colons() {
        let id: EntryId = "resource:s3://bucket/key".parse().unwrap();
        assert_eq!(id.kind(), EntityKind::Resource);
        assert_eq!(id.entity_id(), "s3://bucket/key");
    }

    #[test]
    fn test_invalid_entry_ids() {
        assert!("no-separator".parse::<EntryId>().is_err());
        assert!("bogus:1".parse::<EntryId>().is_err());
        assert!("message:".parse::<EntryId>().is_err());
    }

    #[test]
    fn test_metadata_entry_json_shape() {
        let entry = MetadataEntry {
            text: "hello".into(),
            kind: EntityKind::Message,
            fields: Metadata::new(EntityKind::Message)
                .with_field("conversationId", "c1")
                .fields,
            updated_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["fields"]["conversationId"], "c1");

        let back: MetadataEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }
}
