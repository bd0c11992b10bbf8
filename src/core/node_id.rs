//! Node identifiers.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use super::{DecodeError, MAX_NODE_ID_LEN};

/// Opaque, immutable identifier of a node or server.
///
/// Locally generated identifiers are UUID v4 strings. Identifiers received over
/// the wire are accepted as-is if they are 1 to [`MAX_NODE_ID_LEN`] bytes of
/// printable, non-whitespace ASCII.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse an identifier received from a peer.
    pub fn parse(s: &str) -> Result<Self, DecodeError> {
        let valid = !s.is_empty()
            && s.len() <= MAX_NODE_ID_LEN
            && s.bytes().all(|b| b.is_ascii_graphic());
        if !valid {
            return Err(DecodeError::MalformedNodeId);
        }
        Ok(Self(s.to_owned()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_uuid() {
        let id = NodeId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
        assert_ne!(id, NodeId::generate());
    }

    #[test]
    fn test_parse_accepts_opaque_ids() {
        assert_eq!(NodeId::parse("n1").unwrap().as_str(), "n1");
        assert!(NodeId::parse("storage-node_07:eu-west").is_ok());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(NodeId::parse(""), Err(DecodeError::MalformedNodeId));
        assert_eq!(NodeId::parse("has space"), Err(DecodeError::MalformedNodeId));
        assert_eq!(NodeId::parse("tab\there"), Err(DecodeError::MalformedNodeId));
        assert_eq!(NodeId::parse("nodé"), Err(DecodeError::MalformedNodeId));

        let long = "a".repeat(MAX_NODE_ID_LEN + 1);
        assert_eq!(NodeId::parse(&long), Err(DecodeError::MalformedNodeId));
        assert!(NodeId::parse(&long[1..]).is_ok());
    }
}
