//! HTTP client for the ZuluIDE control service.
//!
//! This module provides:
//!
//! - Wire types for every endpoint: `DriveStatus`, `ImageRef`, `ActionReply`,
//!   `EnumerationUnit`, `CatalogListing` and `VersionInfo`
//! - `ControlApi`: the seam the state machines talk through
//! - `ControlClient`: the `reqwest` implementation of that seam
//!
//! Image enumeration is chunked at the application level: `nextImage` hands
//! out one image per request and answers `{"status": "wait"}` while the board
//! is still producing results and `{"status": "done"}` once the listing is
//! exhausted. Item payloads carry no status at all, so anything that is not a
//! recognised control message and has a usable `filename` is an item; the
//! rest is rejected as malformed rather than guessed at.

use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// User agent for service requests
const USER_AGENT: &str = concat!("zulu-control/", env!("CARGO_PKG_VERSION"));

/// Status value the service uses to accept an action
const STATUS_OK: &str = "ok";

/// Bytes left as they are in a URI component: unreserved characters plus `!*'()`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A mountable image, identified by filename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
}

impl ImageRef {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }
}

/// Snapshot of what the drive currently has mounted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveStatus {
    pub is_primary: bool,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

/// Reply to eject and mount requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReply {
    pub status: String,
}

impl ActionReply {
    pub fn ok() -> Self {
        Self::with_status(STATUS_OK)
    }

    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }

    /// Whether the service accepted the action
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// One step of the `nextImage` listing protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumerationUnit {
    /// The next image in server order
    Item(ImageRef),
    /// The board is still gathering; ask again shortly
    Wait,
    /// The listing is exhausted
    Done,
}

impl EnumerationUnit {
    /// Classify a raw `nextImage` payload.
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        match value.get("status").and_then(Value::as_str) {
            Some("wait") => return Ok(Self::Wait),
            Some("done") => return Ok(Self::Done),
            _ => {}
        }

        image_from_value(&value)
            .map(Self::Item)
            .ok_or_else(|| ApiError::Malformed {
                endpoint: "nextImage",
                payload: value.to_string(),
            })
    }
}

/// Response of the bulk `images` endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogListing {
    /// The board has not finished gathering the listing
    Wait,
    /// The full listing, in server order
    Images(Vec<ImageRef>),
}

impl CatalogListing {
    /// Classify a raw `images` payload. Entries without a usable filename are
    /// dropped with a warning; the rest keep their order.
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        match value {
            Value::Array(entries) => {
                let total = entries.len();
                let images: Vec<ImageRef> = entries.iter().filter_map(image_from_value).collect();
                if images.len() < total {
                    tracing::warn!(
                        "Dropped {} malformed entries from image listing",
                        total - images.len()
                    );
                }
                Ok(Self::Images(images))
            }
            ref other if other.get("status").and_then(Value::as_str) == Some("wait") => {
                Ok(Self::Wait)
            }
            other => Err(ApiError::Malformed {
                endpoint: "images",
                payload: other.to_string(),
            }),
        }
    }
}

/// Extract an image from a payload, requiring a non-empty string filename.
fn image_from_value(value: &Value) -> Option<ImageRef> {
    value
        .get("filename")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(ImageRef::new)
}

/// Client/server protocol versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    #[serde(rename = "clientAPIVersion")]
    pub client_api_version: String,
    #[serde(rename = "serverAPIVersion", default)]
    pub server_api_version: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The operations the control service exposes.
///
/// Every call is a single request/response exchange; nothing is retried here.
pub trait ControlApi: Send + Sync + 'static {
    /// `GET status`
    fn status(&self) -> BoxFuture<'_, Result<DriveStatus, ApiError>>;

    /// `GET eject`
    fn eject(&self) -> BoxFuture<'_, Result<ActionReply, ApiError>>;

    /// `GET nextImage`
    fn next_image(&self) -> BoxFuture<'_, Result<EnumerationUnit, ApiError>>;

    /// `GET images`
    fn images(&self) -> BoxFuture<'_, Result<CatalogListing, ApiError>>;

    /// `GET image?imageName=<filename>`
    fn mount<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<ActionReply, ApiError>>;

    /// `GET version`
    fn version(&self) -> BoxFuture<'_, Result<VersionInfo, ApiError>>;
}

/// `reqwest`-backed control service client
#[derive(Clone)]
pub struct ControlClient {
    client: reqwest::Client,
    base: Url,
}

impl ControlClient {
    /// Create a client for the service rooted at `base_url`.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let base = parse_base_url(base_url)?;

        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base,
        })
    }

    /// Base URL every endpoint is resolved against
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, name: &str) -> Result<Url, ApiError> {
        self.base.join(name).map_err(|e| ApiError::InvalidUrl {
            url: self.base.to_string(),
            reason: e.to_string(),
        })
    }

    /// Issue a GET and return the body as untyped JSON.
    async fn get_value(&self, name: &'static str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        let url = self.endpoint(name)?;
        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        Ok(response.json().await?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        name: &'static str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let value = self.get_value(name, query).await?;
        serde_json::from_value(value).map_err(|source| ApiError::Decode {
            endpoint: name,
            source,
        })
    }
}

/// URI-component encoding of an image name. The board decodes the query
/// string once and forwards the name still encoded, so the name goes on the
/// wire encoded twice: once here and once by the query serializer.
fn encode_image_name(filename: &str) -> String {
    utf8_percent_encode(filename, URI_COMPONENT).to_string()
}

fn parse_base_url(base_url: &str) -> Result<Url, ApiError> {
    let invalid = |reason: String| ApiError::InvalidUrl {
        url: base_url.to_string(),
        reason,
    };

    // Without a trailing slash `join` would replace the last path segment.
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    };

    let url = Url::parse(&normalized).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("expected an http:// or https:// URL".to_string()));
    }
    Ok(url)
}

impl ControlApi for ControlClient {
    fn status(&self) -> BoxFuture<'_, Result<DriveStatus, ApiError>> {
        self.get_json("status", &[]).boxed()
    }

    fn eject(&self) -> BoxFuture<'_, Result<ActionReply, ApiError>> {
        self.get_json("eject", &[]).boxed()
    }

    fn next_image(&self) -> BoxFuture<'_, Result<EnumerationUnit, ApiError>> {
        async move {
            let value = self.get_value("nextImage", &[]).await?;
            EnumerationUnit::from_value(value)
        }
        .boxed()
    }

    fn images(&self) -> BoxFuture<'_, Result<CatalogListing, ApiError>> {
        async move {
            let value = self.get_value("images", &[]).await?;
            CatalogListing::from_value(value)
        }
        .boxed()
    }

    fn mount<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<ActionReply, ApiError>> {
        async move {
            let encoded = encode_image_name(filename);
            self.get_json("image", &[("imageName", encoded.as_str())])
                .await
        }
        .boxed()
    }

    fn version(&self) -> BoxFuture<'_, Result<VersionInfo, ApiError>> {
        self.get_json("version", &[]).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enumeration_unit_control_messages() {
        assert_eq!(
            EnumerationUnit::from_value(json!({"status": "wait"})).unwrap(),
            EnumerationUnit::Wait
        );
        assert_eq!(
            EnumerationUnit::from_value(json!({"status": "done"})).unwrap(),
            EnumerationUnit::Done
        );
    }

    #[test]
    fn test_enumeration_unit_item_ignores_extra_fields() {
        let unit =
            EnumerationUnit::from_value(json!({"filename": "ubuntu.iso", "size": 4096})).unwrap();
        assert_eq!(unit, EnumerationUnit::Item(ImageRef::new("ubuntu.iso")));

        // An unknown status with a filename is still an item
        let unit =
            EnumerationUnit::from_value(json!({"status": "item", "filename": "a.iso"})).unwrap();
        assert_eq!(unit, EnumerationUnit::Item(ImageRef::new("a.iso")));
    }

    #[test]
    fn test_enumeration_unit_rejects_malformed() {
        for payload in [
            json!({}),
            json!({"status": "busy"}),
            json!({"filename": ""}),
            json!({"filename": 12}),
            json!(["a.iso"]),
            json!(null),
        ] {
            let err = EnumerationUnit::from_value(payload.clone()).unwrap_err();
            assert!(err.is_malformed(), "{} should be malformed", payload);
        }
    }

    #[test]
    fn test_catalog_listing() {
        assert_eq!(
            CatalogListing::from_value(json!({"status": "wait"})).unwrap(),
            CatalogListing::Wait
        );

        let listing = CatalogListing::from_value(json!([
            {"filename": "b.iso"},
            {"name": "nameless"},
            {"filename": "a.iso"}
        ]))
        .unwrap();
        assert_eq!(
            listing,
            CatalogListing::Images(vec![ImageRef::new("b.iso"), ImageRef::new("a.iso")])
        );

        assert!(
            CatalogListing::from_value(json!({"status": "done"}))
                .unwrap_err()
                .is_malformed()
        );
    }

    #[test]
    fn test_drive_status_decoding() {
        let status: DriveStatus =
            serde_json::from_value(json!({"isPrimary": true, "image": {"filename": "ubuntu.iso"}}))
                .unwrap();
        assert!(status.is_primary);
        assert_eq!(status.image, Some(ImageRef::new("ubuntu.iso")));

        let status: DriveStatus =
            serde_json::from_value(json!({"isPrimary": false, "image": null})).unwrap();
        assert_eq!(status.image, None);

        let status: DriveStatus = serde_json::from_value(json!({"isPrimary": false})).unwrap();
        assert_eq!(status.image, None);
    }

    #[test]
    fn test_version_info_optional_fields() {
        let info: VersionInfo = serde_json::from_value(json!({"clientAPIVersion": "1.0"})).unwrap();
        assert_eq!(info.client_api_version, "1.0");
        assert_eq!(info.server_api_version, None);
        assert_eq!(info.message, None);

        let info: VersionInfo = serde_json::from_value(json!({
            "clientAPIVersion": "1.0",
            "serverAPIVersion": "1.2",
            "message": "upgrade advised"
        }))
        .unwrap();
        assert_eq!(info.server_api_version.as_deref(), Some("1.2"));
        assert_eq!(info.message.as_deref(), Some("upgrade advised"));
    }

    #[test]
    fn test_action_reply() {
        assert!(ActionReply::ok().is_ok());
        assert!(!ActionReply::with_status("fail").is_ok());
        assert!(!ActionReply::with_status("OK").is_ok());
    }

    #[test]
    fn test_image_name_encoding() {
        assert_eq!(
            encode_image_name("My Disc c++ 50%.iso"),
            "My%20Disc%20c%2B%2B%2050%25.iso"
        );
        assert_eq!(encode_image_name("(a)!~*'_-.iso"), "(a)!~*'_-.iso");
        assert_eq!(encode_image_name("disc/1&2.iso"), "disc%2F1%262.iso");
        assert_eq!(encode_image_name("caf\u{e9}.iso"), "caf%C3%A9.iso");
    }

    #[test]
    fn test_base_url_normalization() {
        let client = ControlClient::new("http://zuluide.local", None).unwrap();
        assert_eq!(
            client.endpoint("status").unwrap().as_str(),
            "http://zuluide.local/status"
        );

        let client = ControlClient::new("http://10.0.0.7/zulu", None).unwrap();
        assert_eq!(
            client.endpoint("nextImage").unwrap().as_str(),
            "http://10.0.0.7/zulu/nextImage"
        );

        assert!(matches!(
            ControlClient::new("zuluide.local", None),
            Err(ApiError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ControlClient::new("ftp://zuluide.local", None),
            Err(ApiError::InvalidUrl { .. })
        ));
    }
}
