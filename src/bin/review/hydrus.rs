//! Hydrus client API module.
//!
//! Implements the remote duplicate service on top of the Hydrus client API:
//! candidate search, file download, duplicate relationships and deletion.
//!
//! Documentation:
//! <https://hydrusnetwork.github.io/hydrus/developer_api.html>

use anyhow::{Context, Result, bail};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use hydrus_review::duplicates::{DuplicateService, FileHash, RelationshipBatch, RelationshipKind, SearchFilter};

/// Header carrying the access key on every request.
const ACCESS_KEY_HEADER: &str = "Hydrus-Client-API-Access-Key";

/// Hydrus client API client.
#[derive(Debug)]
pub struct HydrusClient {
    client: Client,
    base_url: String,
}

/// Response from `/verify_access_key`.
#[derive(Debug, Deserialize)]
struct VerifyKeyResponse {
    /// Name and permissions of the key.
    human_description: String,
}

/// Response from `/api_version`.
#[derive(Debug, Deserialize)]
struct ApiVersionResponse {
    version: u32,
    #[serde(default)]
    hydrus_version: Option<u32>,
}

/// Response from `/manage_file_relationships/get_random_potentials`.
#[derive(Debug, Deserialize)]
struct RandomPotentialsResponse {
    #[serde(default)]
    random_potential_duplicate_hashes: Vec<String>,
}

/// Request body for `/manage_file_relationships/set_file_relationships`.
#[derive(Debug, Serialize)]
struct SetRelationshipsRequest<'a> {
    pair_rows: Vec<(RelationshipKind, &'a FileHash, &'a FileHash, bool, bool, bool)>,
}

/// Request body for `/add_files/delete_files`.
#[derive(Debug, Serialize)]
struct DeleteFilesRequest<'a> {
    hashes: &'a [FileHash],
}

impl HydrusClient {
    /// Create a new client for the given API address and access key.
    ///
    /// # Errors
    /// Returns an error if the key is not a valid header value or the HTTP client cannot be built.
    pub fn new(url: &str, key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut key_value = HeaderValue::from_str(key).context("Access key contains invalid characters")?;
        key_value.set_sensitive(true);
        headers.insert(ACCESS_KEY_HEADER, key_value);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the full URL for an API endpoint.
    fn build_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Check that the access key is accepted.
    /// Returns the description of the key permissions.
    ///
    /// # Errors
    /// Returns an error if the client is unreachable or the key is rejected.
    pub async fn verify_access_key(&self) -> Result<String> {
        let url = self.build_url("verify_access_key");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to connect to Hydrus at {}", self.base_url))?;

        match response.status() {
            StatusCode::OK => {
                let body: VerifyKeyResponse = response.json().await.context("Failed to parse access key response")?;
                Ok(body.human_description)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                bail!("Access key rejected: {}", body.trim())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                bail!("Failed to verify access key: HTTP {status} - {body}")
            }
        }
    }

    /// Get the client API version and the Hydrus version.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn get_api_version(&self) -> Result<(u32, Option<u32>)> {
        let url = self.build_url("api_version");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to get API version")?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            bail!("Failed to get API version: HTTP {status} - {body}");
        }

        let body: ApiVersionResponse = response.json().await.context("Failed to parse API version response")?;
        Ok((body.version, body.hydrus_version))
    }

    /// Check a write response status.
    async fn expect_ok(response: reqwest::Response, action: &str) -> Result<()> {
        let status = response.status();
        if status == StatusCode::OK {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            bail!("Failed to {action}: HTTP {status} - {body}")
        }
    }
}

impl DuplicateService for HydrusClient {
    async fn search_candidates(&self, filter: &SearchFilter) -> Result<Vec<FileHash>> {
        let url = self.build_url("manage_file_relationships/get_random_potentials");
        let tags = filter.tags_json().context("Failed to encode tag search")?;

        let response = self
            .client
            .get(&url)
            .query(&[("tags_1", tags.as_str())])
            .send()
            .await
            .context("Failed to get potential duplicates")?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            bail!("Failed to get potential duplicates: HTTP {status} - {body}");
        }

        let body: RandomPotentialsResponse = response
            .json()
            .await
            .context("Failed to parse potential duplicates response")?;

        Ok(body
            .random_potential_duplicate_hashes
            .into_iter()
            .filter_map(FileHash::new)
            .collect())
    }

    async fn fetch_bytes(&self, hash: &FileHash) -> Result<Vec<u8>> {
        let url = self.build_url("get_files/file");

        let response = self
            .client
            .get(&url)
            .query(&[("hash", hash.as_str())])
            .send()
            .await
            .with_context(|| format!("Failed to download file {hash}"))?;

        match response.status() {
            StatusCode::OK => {
                let bytes = response
                    .bytes()
                    .await
                    .with_context(|| format!("Failed to read file {hash}"))?;
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND => bail!("File not found: {hash}"),
            status => {
                let body = response.text().await.unwrap_or_default();
                bail!("Failed to download file {hash}: HTTP {status} - {body}")
            }
        }
    }

    async fn assign_relationship(&self, batch: &RelationshipBatch) -> Result<()> {
        let url = self.build_url("manage_file_relationships/set_file_relationships");
        let request = SetRelationshipsRequest {
            pair_rows: batch.pair_rows(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send relationship request")?;

        Self::expect_ok(response, "set file relationships").await
    }

    async fn delete(&self, hashes: &[FileHash]) -> Result<()> {
        let url = self.build_url("add_files/delete_files");
        let request = DeleteFilesRequest { hashes };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send delete request")?;

        Self::expect_ok(response, "delete files").await
    }
}

#[cfg(test)]
mod hydrus_client_tests {
    use super::*;

    fn hash(value: &str) -> FileHash {
        FileHash::new(value).expect("valid hash")
    }

    #[test]
    fn build_url_joins_endpoint() {
        let client = HydrusClient::new("http://localhost:45869", "key").expect("should build client");
        assert_eq!(
            client.build_url("verify_access_key"),
            "http://localhost:45869/verify_access_key"
        );
    }

    #[test]
    fn build_url_handles_slashes() {
        let client = HydrusClient::new("http://10.0.0.5:45869/", "key").expect("should build client");
        assert_eq!(client.build_url("/get_files/file"), "http://10.0.0.5:45869/get_files/file");
    }

    #[test]
    fn new_rejects_key_with_newline() {
        assert!(HydrusClient::new("http://localhost:45869", "bad\nkey").is_err());
    }

    #[test]
    fn random_potentials_response_parses() {
        let json = r#"{"random_potential_duplicate_hashes": ["AB12", "cd34"], "version": 80}"#;
        let response: RandomPotentialsResponse = serde_json::from_str(json).expect("should parse");
        let hashes: Vec<FileHash> = response
            .random_potential_duplicate_hashes
            .into_iter()
            .filter_map(FileHash::new)
            .collect();
        assert_eq!(hashes, vec![hash("ab12"), hash("cd34")]);
    }

    #[test]
    fn random_potentials_response_without_hashes_is_empty() {
        let response: RandomPotentialsResponse = serde_json::from_str("{}").expect("should parse");
        assert!(response.random_potential_duplicate_hashes.is_empty());
    }

    #[test]
    fn delete_request_serializes_hash_list() {
        let hashes = vec![hash("aa"), hash("bb")];
        let request = DeleteFilesRequest { hashes: &hashes };
        let json = serde_json::to_string(&request).expect("should serialize");
        assert_eq!(json, r#"{"hashes":["aa","bb"]}"#);
    }

    #[test]
    fn relationship_request_serializes_rows() {
        let batch = RelationshipBatch {
            kind: RelationshipKind::FalsePositive,
            pairs: vec![(hash("aa"), hash("bb"))],
            merge: false,
            delete_a: false,
            delete_b: false,
        };
        let request = SetRelationshipsRequest {
            pair_rows: batch.pair_rows(),
        };
        let json = serde_json::to_string(&request).expect("should serialize");
        assert_eq!(json, r#"{"pair_rows":[[1,"aa","bb",false,false,false]]}"#);
    }

    #[test]
    fn verify_key_response_parses() {
        let json = r#"{"basic_permissions": [0, 1], "human_description": "API Permissions (review): can manage file relationships"}"#;
        let response: VerifyKeyResponse = serde_json::from_str(json).expect("should parse");
        assert!(response.human_description.contains("review"));
    }
}
