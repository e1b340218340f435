//! `at://` URIs.
//!
//! Form: `at://<authority>[/<collection>[/<rkey>]]`, where the authority is a
//! DID or a handle. Query strings and fragments are not used by this service
//! and are rejected.

use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

const SCHEME: &str = "at://";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtUri {
    pub host: String,
    pub collection: Option<String>,
    pub rkey: Option<String>,
}

impl AtUri {
    pub fn record(host: impl Into<String>, collection: impl Into<String>, rkey: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            collection: Some(collection.into()),
            rkey: Some(rkey.into()),
        }
    }

    pub fn parse(input: &str) -> Result<Self, AppError> {
        let rest = input
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid(input, "missing at:// scheme"))?;
        if rest.contains(['?', '#', ' ']) {
            return Err(invalid(input, "query, fragment and whitespace are not allowed"));
        }

        let mut parts = rest.trim_end_matches('/').split('/');
        let host = parts.next().unwrap_or_default();
        if host.is_empty() {
            return Err(invalid(input, "empty authority"));
        }
        let collection = parts.next().map(str::to_string);
        let rkey = parts.next().map(str::to_string);
        if parts.next().is_some() {
            return Err(invalid(input, "too many path segments"));
        }
        if collection.as_deref() == Some("") || rkey.as_deref() == Some("") {
            return Err(invalid(input, "empty path segment"));
        }

        Ok(Self { host: host.to_string(), collection, rkey })
    }

    pub fn is_did(&self) -> bool {
        self.host.starts_with("did:")
    }

    /// `(repo, collection, rkey)` when the URI points at a single record.
    pub fn record_parts(&self) -> Option<(&str, &str, &str)> {
        match (&self.collection, &self.rkey) {
            (Some(c), Some(r)) => Some((self.host.as_str(), c.as_str(), r.as_str())),
            _ => None,
        }
    }
}

fn invalid(input: &str, why: &str) -> AppError {
    AppError::InvalidRequest(format!("invalid AT URI '{input}': {why}"))
}

impl FromStr for AtUri {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}", self.host)?;
        if let Some(c) = &self.collection {
            write!(f, "/{c}")?;
            if let Some(r) = &self.rkey {
                write!(f, "/{r}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_record_uri() {
        let uri = AtUri::parse("at://did:plc:abc123/app.bsky.feed.post/3kxyz").unwrap();
        assert_eq!(uri.host, "did:plc:abc123");
        assert_eq!(uri.collection.as_deref(), Some("app.bsky.feed.post"));
        assert_eq!(uri.rkey.as_deref(), Some("3kxyz"));
        assert!(uri.is_did());
        assert_eq!(uri.to_string(), "at://did:plc:abc123/app.bsky.feed.post/3kxyz");
    }

    #[test]
    fn parses_authority_only_and_handles() {
        let uri = AtUri::parse("at://alice.bsky.social").unwrap();
        assert!(!uri.is_did());
        assert!(uri.record_parts().is_none());
        assert_eq!(uri.to_string(), "at://alice.bsky.social");
    }

    #[test]
    fn did_web_authority_keeps_colons() {
        let uri = AtUri::parse("at://did:web:places.example.com/com.example.place/1").unwrap();
        assert_eq!(uri.host, "did:web:places.example.com");
        assert_eq!(uri.record_parts(), Some(("did:web:places.example.com", "com.example.place", "1")));
    }

    #[test]
    fn rejects_malformed() {
        for bad in [
            "https://bsky.app/profile/x",
            "at://",
            "at:///app.bsky.feed.post/1",
            "at://did:plc:a/b/c/d",
            "at://did:plc:a//c",
            "at://did:plc:a/b?x=1",
        ] {
            assert!(AtUri::parse(bad).is_err(), "expected '{bad}' to be rejected");
        }
    }
}
