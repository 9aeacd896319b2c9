//! Wire format of the changeset endpoint

use remote_settings_core::{CollectionKey, Record};
use remote_settings_signature::SignatureMetadata;
use serde::{Deserialize, Serialize};
use url::{ParseError, Url};

/// Collection metadata returned alongside the changes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// Current signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureMetadata>,
    /// Signatures published by newer servers; the first one is used
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<SignatureMetadata>,
}

/// Response of `GET /buckets/{bid}/collections/{cid}/changeset`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    /// Collection metadata
    #[serde(default)]
    pub metadata: CollectionMetadata,
    /// Records changed since the requested cursor (everything without one),
    /// tombstones included
    #[serde(default)]
    pub changes: Vec<Record>,
    /// Collection timestamp after these changes
    pub timestamp: u64,
}

impl Changeset {
    /// The signature of the collection at [`Changeset::timestamp`]
    pub fn signature(&self) -> Option<&SignatureMetadata> {
        self.metadata
            .signature
            .as_ref()
            .or_else(|| self.metadata.signatures.first())
    }
}

/// What to ask the server for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesetRequest {
    /// Collection to fetch
    pub key: CollectionKey,
    /// Timestamp the client expects, used as a cache buster
    pub expected: u64,
    /// Only return changes after this timestamp
    pub since: Option<u64>,
}

impl ChangesetRequest {
    /// URL of this request on `server_url`.
    ///
    /// Bucket and collection ids are percent-encoded as path segments.
    pub fn url(&self, server_url: &str) -> Result<Url, ParseError> {
        let mut url = Url::parse(server_url)?;
        url.path_segments_mut()
            .map_err(|()| ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend([
                "buckets",
                self.key.bucket.as_str(),
                "collections",
                self.key.collection.as_str(),
                "changeset",
            ]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("_expected", &self.expected.to_string());
            if let Some(since) = self.since {
                query.append_pair("_since", &format!("\"{since}\""));
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_changeset_url() {
        let mut request = ChangesetRequest {
            key: CollectionKey::new("main", "cfr"),
            expected: 0,
            since: None,
        };
        assert_eq!(
            request.url("https://example.com/v1/").unwrap().as_str(),
            "https://example.com/v1/buckets/main/collections/cfr/changeset?_expected=0"
        );

        request.expected = 42;
        request.since = Some(42);
        assert_eq!(
            request.url("https://example.com/v1").unwrap().as_str(),
            "https://example.com/v1/buckets/main/collections/cfr/changeset?_expected=42&_since=%2242%22"
        );
    }

    #[test]
    fn test_changeset_url_encodes_ids() {
        let request = ChangesetRequest {
            key: CollectionKey::new("main", "my collection?#"),
            expected: 0,
            since: None,
        };
        let url = request.url("http://localhost:8888/v1").unwrap();
        assert_eq!(
            url.path(),
            "/v1/buckets/main/collections/my%20collection%3F%23/changeset"
        );
        assert_eq!(url.query(), Some("_expected=0"));
        assert!(request.url("not a url").is_err());
    }

    #[test]
    fn test_parse_changeset() {
        let raw = json!({
            "metadata": {
                "id": "cfr",
                "signatures": [{"signature": "abc", "x5u": "https://x/chain", "mode": "ed25519"}]
            },
            "changes": [
                {"id": "a", "last_modified": 2, "value": 1},
                {"id": "b", "last_modified": 3, "deleted": true}
            ],
            "timestamp": 3
        });
        let changeset: Changeset = serde_json::from_value(raw).unwrap();
        assert_eq!(changeset.timestamp, 3);
        assert_eq!(changeset.changes.len(), 2);
        assert!(changeset.changes[1].deleted);
        assert_eq!(changeset.signature().map(|s| s.signature.as_str()), Some("abc"));
    }
}
