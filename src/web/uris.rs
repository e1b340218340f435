//! Turn pasted links into AT URIs.

use reqwest::Url;

use crate::atproto::AtUri;
use crate::atproto::identity::IdentityResolver;
use crate::error::AppError;

const BSKY_HOST: &str = "bsky.app";
const POST_COLLECTION: &str = "app.bsky.feed.post";

/// A recognised web link to a record, actor not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLink {
    pub actor: String,
    pub collection: &'static str,
    pub rkey: String,
}

/// Match `https://bsky.app/profile/<actor>/post/<rkey>`.
pub fn parse_record_link(input: &str) -> Option<RecordLink> {
    let url = Url::parse(input.trim()).ok()?;
    if url.host_str() != Some(BSKY_HOST) {
        return None;
    }
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["profile", actor, "post", rkey] => Some(RecordLink {
            actor: actor.to_string(),
            collection: POST_COLLECTION,
            rkey: rkey.to_string(),
        }),
        _ => None,
    }
}

/// Convert `input` to an AT URI string.
///
/// `at://` URIs pass through once they parse. Recognised web links have
/// their handle resolved to a DID. Anything else yields `None`.
pub async fn to_at_uri(input: &str, resolver: &IdentityResolver) -> Result<Option<String>, AppError> {
    let input = input.trim();
    if input.starts_with("at://") {
        return Ok(AtUri::parse(input).ok().map(|u| u.to_string()));
    }
    let Some(link) = parse_record_link(input) else {
        return Ok(None);
    };
    let did = if link.actor.starts_with("did:") {
        link.actor
    } else {
        resolver.resolve_did(&link.actor).await?
    };
    Ok(Some(AtUri::record(did, link.collection, link.rkey).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> IdentityResolver {
        // Never contacted: the inputs below need no handle lookups.
        IdentityResolver::new("http://127.0.0.1:9", "http://127.0.0.1:9", 1).unwrap()
    }

    #[test]
    fn recognises_post_links() {
        let link = parse_record_link("https://bsky.app/profile/alice.bsky.social/post/3kabc").unwrap();
        assert_eq!(link.actor, "alice.bsky.social");
        assert_eq!(link.rkey, "3kabc");
        assert!(parse_record_link("https://bsky.app/profile/alice.bsky.social").is_none());
        assert!(parse_record_link("https://example.com/profile/a/post/b").is_none());
        assert!(parse_record_link("not a url").is_none());
    }

    #[tokio::test]
    async fn did_links_and_at_uris_need_no_lookup() {
        let r = resolver();
        assert_eq!(
            to_at_uri("https://bsky.app/profile/did:plc:abc/post/3kabc", &r).await.unwrap(),
            Some("at://did:plc:abc/app.bsky.feed.post/3kabc".to_string())
        );
        assert_eq!(
            to_at_uri(" at://did:plc:abc/app.bsky.feed.post/1 ", &r).await.unwrap(),
            Some("at://did:plc:abc/app.bsky.feed.post/1".to_string())
        );
        assert_eq!(to_at_uri("at://", &r).await.unwrap(), None);
        assert_eq!(to_at_uri("https://example.com/x", &r).await.unwrap(), None);
    }
}
