//! Core type definitions for the hypergraph
//!
//! An [`Identity`] is the only handle to an element: a domain-qualified key
//! written `domain:key`. Comparison, hashing and ordering all go through the
//! lowercase composite form, so `Lib:Book1` and `lib:book1` are the same element.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Separator between the domain name and the key
pub const DOMAIN_SEPARATOR: char = ':';

/// Domain-qualified element identity
#[derive(Clone, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Identity {
    domain_name: String,
    key: String,
    /// Lowercase `domain:key`, the only thing equality looks at
    normalized: String,
}

impl Identity {
    /// Create an identity from its two components
    pub fn new(domain_name: impl Into<String>, key: impl Into<String>) -> Self {
        let domain_name = domain_name.into();
        let key = key.into();
        let normalized = format!("{}{}{}", domain_name, DOMAIN_SEPARATOR, key).to_lowercase();
        Identity {
            domain_name,
            key,
            normalized,
        }
    }

    /// The `Empty` sentinel
    pub fn empty() -> Self {
        Identity {
            domain_name: String::new(),
            key: String::new(),
            normalized: String::new(),
        }
    }

    /// Parse `domain:key`. The split happens on the first separator so keys may
    /// themselves contain `:`.
    pub fn parse(text: &str) -> Option<Self> {
        let (domain, key) = text.split_once(DOMAIN_SEPARATOR)?;
        if domain.is_empty() || key.is_empty() {
            return None;
        }
        Some(Identity::new(domain, key))
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Lowercase composite used for equality, hashing and ordering
    pub fn as_normalized(&self) -> &str {
        &self.normalized
    }

    /// Identity of a single property value of this element (`key+property`).
    ///
    /// Property records live under this identity, which also lets the lock
    /// table lock one property independently of its owner.
    pub fn create_attribute_identity(&self, property_name: &str) -> Identity {
        Identity::new(
            self.domain_name.clone(),
            format!("{}+{}", self.key, property_name),
        )
    }

    /// Identity of a meta-property (schema-level value attached to an element)
    pub fn create_meta_identity(&self, property_name: &str) -> Identity {
        Identity::new(
            self.domain_name.clone(),
            format!("{}+@{}", self.key, property_name),
        )
    }

    /// Same key moved to another domain
    pub fn with_domain(&self, domain_name: impl Into<String>) -> Identity {
        Identity::new(domain_name, self.key.clone())
    }

    pub fn belongs_to(&self, domain_name: &str) -> bool {
        self.domain_name.to_lowercase() == domain_name.to_lowercase()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for Identity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "<empty>");
        }
        write!(f, "{}{}{}", self.domain_name, DOMAIN_SEPARATOR, self.key)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        if id.is_empty() {
            String::new()
        } else {
            format!("{}{}{}", id.domain_name, DOMAIN_SEPARATOR, id.key)
        }
    }
}

impl TryFrom<String> for Identity {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.is_empty() {
            return Ok(Identity::empty());
        }
        Identity::parse(&s).ok_or_else(|| format!("invalid identity '{}'", s))
    }
}

/// What a stored record represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// An entity
    Node,
    /// A relationship
    Edge,
    /// A property value owned by an entity or relationship
    Property,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Node => write!(f, "Node"),
            NodeType::Edge => write!(f, "Edge"),
            NodeType::Property => write!(f, "Property"),
        }
    }
}

/// Traversal direction relative to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Incoming,
    Outgoing,
    Both,
}

impl Direction {
    pub fn includes_incoming(self) -> bool {
        matches!(self, Direction::Incoming | Direction::Both)
    }

    pub fn includes_outgoing(self) -> bool {
        matches!(self, Direction::Outgoing | Direction::Both)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_is_case_insensitive() {
        let a = Identity::new("Library", "Book1");
        let b = Identity::new("library", "BOOK1");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));

        // Display keeps the original spelling
        assert_eq!(format!("{}", a), "Library:Book1");
    }

    #[test]
    fn test_identity_parse() {
        let id = Identity::parse("lib:a:b").unwrap();
        assert_eq!(id.domain_name(), "lib");
        assert_eq!(id.key(), "a:b");

        assert!(Identity::parse("nokey").is_none());
        assert!(Identity::parse(":x").is_none());
        assert!(Identity::parse("x:").is_none());
    }

    #[test]
    fn test_empty_identity() {
        let empty = Identity::empty();
        assert!(empty.is_empty());
        assert!(!Identity::new("d", "k").is_empty());
        assert_eq!(format!("{}", empty), "<empty>");
    }

    #[test]
    fn test_derived_identities() {
        let owner = Identity::new("lib", "1");
        let attr = owner.create_attribute_identity("Name");
        let meta = owner.create_meta_identity("Name");

        assert_eq!(attr.domain_name(), "lib");
        assert_ne!(attr, owner);
        assert_ne!(attr, meta);
        assert_eq!(attr, Identity::new("lib", "1+name"));
    }

    #[test]
    fn test_identity_ordering() {
        let a = Identity::new("d", "A");
        let b = Identity::new("d", "b");
        assert!(a < b);
    }

    #[test]
    fn test_identity_serde_round_trip() {
        let id = Identity::new("lib", "42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"lib:42\"");
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_direction() {
        assert!(Direction::Both.includes_incoming());
        assert!(Direction::Both.includes_outgoing());
        assert!(!Direction::Incoming.includes_outgoing());
    }
}
