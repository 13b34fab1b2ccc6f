//! Request fingerprints
//!
//! A fingerprint identifies one cacheable variant of an upstream request: the
//! resource id plus an optional pagination cursor. Inbound keys carry the
//! cursor glued directly onto the id, so the boundary is found by the first
//! occurrence of the cursor prefix.

use std::fmt;
use std::sync::Arc;

use crate::error::{GatewayError, Result};

/// Upstream resource identifier (cooldowns are tracked per resource)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(Arc<str>);

impl ResourceId {
    pub fn new(id: &str) -> Result<Self> {
        if id.is_empty() {
            return Err(GatewayError::InvalidRequest("resource id is empty".into()));
        }
        if id.contains('/') {
            return Err(GatewayError::InvalidRequest(format!(
                "resource id {} must not contain '/'",
                id
            )));
        }
        Ok(Self(Arc::from(id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque pagination token handed out by the upstream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(Arc<str>);

impl Cursor {
    pub fn new(token: &str) -> Self {
        Self(Arc::from(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache key for one (resource, cursor) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub resource: ResourceId,
    pub cursor: Option<Cursor>,
}

impl Fingerprint {
    pub fn new(resource: ResourceId, cursor: Option<Cursor>) -> Self {
        Self { resource, cursor }
    }

    /// Fingerprint for the first page of a resource
    pub fn first_page(resource_id: &str) -> Result<Self> {
        Ok(Self::new(ResourceId::new(resource_id)?, None))
    }

    /// Split an inbound key such as `1818eyJzdGFydEluZGV4Ijo...` into
    /// resource id and cursor. The cursor keeps its prefix.
    pub fn parse_key(key: &str, cursor_prefix: &str) -> Result<Self> {
        let key = key.trim();
        let split = if cursor_prefix.is_empty() {
            None
        } else {
            key.find(cursor_prefix)
        };

        match split {
            Some(at) => {
                let (id, token) = key.split_at(at);
                Ok(Self::new(ResourceId::new(id)?, Some(Cursor::new(token))))
            }
            None => Self::first_page(key),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cursor {
            Some(cursor) => write!(f, "{}?cursor={}", self.resource, cursor),
            None => write!(f, "{}", self.resource),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const PREFIX: &str = "eyJ";

    #[test]
    fn test_parse_key_without_cursor() {
        let fp = Fingerprint::parse_key("920587237", PREFIX).unwrap();
        assert_eq!(fp.resource.as_str(), "920587237");
        assert!(fp.cursor.is_none());
    }

    #[test]
    fn test_parse_key_splits_at_first_prefix() {
        let fp = Fingerprint::parse_key("920587237eyJzdGFydCI6MTAwfQeyJ", PREFIX).unwrap();
        assert_eq!(fp.resource.as_str(), "920587237");
        assert_eq!(
            fp.cursor.as_ref().map(Cursor::as_str),
            Some("eyJzdGFydCI6MTAwfQeyJ")
        );
    }

    #[test]
    fn test_parse_key_rejects_missing_resource() {
        assert!(matches!(
            Fingerprint::parse_key("eyJzdGFydCI6MTAwfQ", PREFIX),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(Fingerprint::parse_key("", PREFIX).is_err());
        assert!(Fingerprint::parse_key("12/34", PREFIX).is_err());
    }

    #[test]
    fn test_parse_key_with_empty_prefix_never_splits() {
        let fp = Fingerprint::parse_key("123eyJabc", "").unwrap();
        assert_eq!(fp.resource.as_str(), "123eyJabc");
        assert!(fp.cursor.is_none());
    }

    #[test]
    fn test_fingerprints_are_distinct_per_cursor() {
        let a = Fingerprint::parse_key("123", PREFIX).unwrap();
        let b = Fingerprint::parse_key("123eyJa", PREFIX).unwrap();
        let c = Fingerprint::parse_key("123eyJb", PREFIX).unwrap();
        let a2 = Fingerprint::first_page("123").unwrap();

        let set: HashSet<_> = [a.clone(), b, c, a2].into_iter().collect();
        assert_eq!(set.len(), 3);
        assert!(set.contains(&a));
    }

    #[test]
    fn test_display() {
        let fp = Fingerprint::parse_key("123eyJa", PREFIX).unwrap();
        assert_eq!(fp.to_string(), "123?cursor=eyJa");
    }
}
