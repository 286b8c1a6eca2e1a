//! Blob storage for uploaded media.
//!
//! - [`BlobStore`] trait for abstracting the object store
//! - [`HttpBlobStore`] for S3-compatible stores using path-style requests,
//!   signed with AWS Signature Version 4 when credentials are configured
//! - [`MockBlobStore`] in-memory store for tests and local development

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client as ReqwestClient, Request, Url};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::BlobError;

pub const DEFAULT_BLOB_TIMEOUT_SECS: u64 = 30;

/// Region used in the signing scope when none is configured.
pub const DEFAULT_BLOB_REGION: &str = "us-east-1";

const SIGNING_ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNING_SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

type HmacSha256 = Hmac<Sha256>;

/// Object store used for uploaded files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), BlobError>;

    /// URL under which a stored object can be fetched.
    fn public_url(&self, key: &str) -> String;
}

/// Access key pair for the object store.
#[derive(Clone)]
pub struct BlobCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for BlobCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Connection settings for [`HttpBlobStore`].
#[derive(Debug, Clone)]
pub struct HttpBlobConfig {
    /// Store endpoint, e.g. `http://localhost:9000`.
    pub endpoint: String,
    pub bucket: String,
    /// Base URL clients use to read objects. Defaults to `{endpoint}/{bucket}`.
    pub public_base_url: Option<String>,
    pub timeout: Duration,
    /// Requests are sent unsigned without credentials.
    pub credentials: Option<BlobCredentials>,
    pub region: String,
}

impl HttpBlobConfig {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            public_base_url: None,
            timeout: Duration::from_secs(DEFAULT_BLOB_TIMEOUT_SECS),
            credentials: None,
            region: DEFAULT_BLOB_REGION.to_string(),
        }
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.credentials = Some(BlobCredentials {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        });
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

/// Blob store speaking HTTP `PUT` to an S3-compatible endpoint.
pub struct HttpBlobStore {
    config: HttpBlobConfig,
    endpoint: Url,
    client: ReqwestClient,
}

impl HttpBlobStore {
    pub fn new(config: HttpBlobConfig) -> Result<Self, BlobError> {
        if config.endpoint.trim().is_empty() {
            return Err(BlobError::config("blob endpoint is empty"));
        }
        if config.bucket.trim().is_empty() {
            return Err(BlobError::config("blob bucket is empty"));
        }
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            BlobError::config(format!("invalid blob endpoint {}: {}", config.endpoint, e))
        })?;
        if endpoint.host_str().is_none() {
            return Err(BlobError::config(format!(
                "blob endpoint {} has no host",
                config.endpoint
            )));
        }

        let client = ReqwestClient::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            endpoint,
            client,
        })
    }

    /// `{bucket}/{key}` with every segment percent-encoded.
    fn object_path(&self, key: &str) -> String {
        std::iter::once(self.config.bucket.as_str())
            .chain(key.split('/'))
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/")
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.object_path(key)
        )
    }

    /// `Host` header value as the HTTP client sends it.
    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Build the `PUT` request for `key`, signed at `now` when credentials are set.
    fn put_request(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Request, BlobError> {
        let mut builder = self
            .client
            .put(self.object_url(key))
            .header(CONTENT_TYPE, content_type);

        if let Some(credentials) = &self.config.credentials {
            let payload_hash = hex_sha256(bytes);
            let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
            let date_stamp = now.format("%Y%m%d").to_string();

            let canonical_uri = format!(
                "{}/{}",
                self.endpoint.path().trim_end_matches('/'),
                self.object_path(key)
            );
            let canonical_request = format!(
                "PUT\n{}\n\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\n{}\n{}",
                canonical_uri,
                self.host(),
                payload_hash,
                amz_date,
                SIGNED_HEADERS,
                payload_hash
            );

            let credential_scope = format!(
                "{}/{}/{}/aws4_request",
                date_stamp, self.config.region, SIGNING_SERVICE
            );
            let string_to_sign = format!(
                "{}\n{}\n{}\n{}",
                SIGNING_ALGORITHM,
                amz_date,
                credential_scope,
                hex_sha256(canonical_request.as_bytes())
            );

            let signing_key = derive_signing_key(
                &credentials.secret_key,
                &date_stamp,
                &self.config.region,
                SIGNING_SERVICE,
            )?;
            let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

            let authorization = format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                SIGNING_ALGORITHM,
                credentials.access_key,
                credential_scope,
                SIGNED_HEADERS,
                signature
            );

            builder = builder
                .header("Authorization", authorization)
                .header("x-amz-content-sha256", payload_hash)
                .header("x-amz-date", amz_date);
        }

        Ok(builder.body(bytes.to_vec()).build()?)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), BlobError> {
        let request = self.put_request(key, bytes, content_type, Utc::now())?;
        let response = self.client.execute(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BlobError::StatusError {
                status: status.as_u16(),
                key: key.to_string(),
            });
        }

        debug!(key, size = bytes.len(), "Blob stored");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        match &self.config.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => self.object_url(key),
        }
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, BlobError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| BlobError::config(format!("invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the SigV4 signing key.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, date)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, BlobError> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    )?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; only unreserved characters pass through.
fn uri_encode(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// A stored object in [`MockBlobStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// In-memory blob store.
pub struct MockBlobStore {
    objects: RwLock<HashMap<String, StoredBlob>>,
    fail_puts: bool,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            fail_puts: false,
        }
    }

    /// A store whose every `put` fails.
    pub fn failing() -> Self {
        Self {
            fail_puts: true,
            ..Self::new()
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredBlob> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), BlobError> {
        if self.fail_puts {
            return Err(BlobError::StatusError {
                status: 503,
                key: key.to_string(),
            });
        }
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_string(),
                StoredBlob {
                    content_type: content_type.to_string(),
                    bytes: bytes.to_vec(),
                },
            );
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("mock://blobs/{}", key)
    }
}
