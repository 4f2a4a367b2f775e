// ABOUTME: Phantom-typed runtime identifiers.
// ABOUTME: Keeps container and network ids from being passed for one another.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

pub enum ContainerKind {}
pub enum NetworkKind {}

/// An engine-assigned identifier tagged with the kind of object it names.
#[must_use = "ids name runtime objects and should not be dropped silently"]
pub struct Id<K> {
    raw: String,
    _kind: PhantomData<K>,
}

impl<K> Id<K> {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            _kind: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The 12-character prefix the docker CLI prints.
    pub fn short(&self) -> &str {
        let end = self
            .raw
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.raw.len());
        &self.raw[..end]
    }

    pub fn into_inner(self) -> String {
        self.raw
    }
}

// K is only a marker, so these are written by hand to avoid bounds on it.

impl<K> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Id").field(&self.raw).finish()
    }
}

impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        Self::new(self.raw.clone())
    }
}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K> Eq for Id<K> {}

impl<K> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl<K> Serialize for Id<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de, K> Deserialize<'de> for Id<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

pub type ContainerId = Id<ContainerKind>;
pub type NetworkId = Id<NetworkKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_truncates_long_ids() {
        let id = ContainerId::new("0123456789abcdef0123");
        assert_eq!(id.short(), "0123456789ab");
    }

    #[test]
    fn short_keeps_short_ids() {
        let id = NetworkId::new("net");
        assert_eq!(id.short(), "net");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ContainerId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
