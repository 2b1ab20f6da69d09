//! Resolution of media URIs to bytes
//!
//! Providers that cannot fetch arbitrary URLs get media inline. The
//! resolver turns `http(s)://`, `data:`, `file://`, and local paths into
//! bytes plus a content type.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use weft_config::MediaConfig;

use crate::error::LlmError;
use crate::types::Media;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Media bytes with their content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub content_type: String,
    pub data: Vec<u8>,
}

impl ResolvedMedia {
    /// Standard base64 encoding of the bytes
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.data)
    }
}

/// Turns a media reference into bytes
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Fetch or decode the media
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MediaDownload` when a remote fetch fails and
    /// `LlmError::Conversion` for malformed or unsupported URIs.
    async fn resolve(&self, media: &Media) -> Result<ResolvedMedia, LlmError>;
}

/// Resolver backed by `reqwest` and the local filesystem
#[derive(Debug, Clone)]
pub struct DefaultMediaResolver {
    client: Client,
    max_bytes: u64,
}

impl DefaultMediaResolver {
    pub fn new(config: &MediaConfig) -> Self {
        Self::with_client(Client::new(), config.max_download_bytes)
    }

    pub const fn with_client(client: Client, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }

    async fn download(&self, url: &str, content_type: Option<&str>) -> Result<ResolvedMedia, LlmError> {
        let failure = |reason: String| {
            tracing::warn!(url = %url, reason = %reason, "media download failed");
            LlmError::MediaDownload {
                url: url.to_owned(),
                reason,
            }
        };

        let mut response = self.client.get(url).send().await.map_err(|e| failure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failure(format!("status {status}")));
        }

        if let Some(length) = response.content_length()
            && length > self.max_bytes
        {
            return Err(failure(format!(
                "content length {length} exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(strip_parameters);

        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| failure(e.to_string()))? {
            if u64::try_from(data.len() + chunk.len()).unwrap_or(u64::MAX) > self.max_bytes {
                return Err(failure(format!("body exceeds the {} byte limit", self.max_bytes)));
            }
            data.extend_from_slice(&chunk);
        }

        tracing::debug!(url = %url, bytes = data.len(), "downloaded media");

        let content_type = content_type
            .map(str::to_owned)
            .or(header_type)
            .or_else(|| guess_content_type(url))
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_owned());

        Ok(ResolvedMedia { content_type, data })
    }
}

#[async_trait]
impl MediaResolver for DefaultMediaResolver {
    async fn resolve(&self, media: &Media) -> Result<ResolvedMedia, LlmError> {
        let url = media.url.as_str();
        let declared = media.content_type.as_deref();

        if url.starts_with("http://") || url.starts_with("https://") {
            return self.download(url, declared).await;
        }

        if url.starts_with("data:") {
            let mut resolved = parse_data_uri(url)?;
            if let Some(declared) = declared {
                declared.clone_into(&mut resolved.content_type);
            }
            return Ok(resolved);
        }

        if let Some(path) = local_path(url) {
            return read_file(path, declared).await;
        }

        Err(LlmError::Conversion(format!(
            "cannot resolve media URI `{}`: unsupported scheme",
            truncate(url)
        )))
    }
}

/// Decode a `data:` URI
///
/// # Errors
///
/// Returns `LlmError::Conversion` when the comma separator is missing or
/// the base64 payload is invalid.
pub fn parse_data_uri(uri: &str) -> Result<ResolvedMedia, LlmError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| LlmError::Conversion("not a data URI".to_owned()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| LlmError::Conversion("malformed data URI: missing ','".to_owned()))?;

    let (media_type, is_base64) = match header.strip_suffix(";base64") {
        Some(media_type) => (media_type, true),
        None => (header, false),
    };

    let data = if is_base64 {
        STANDARD
            .decode(payload.trim())
            .map_err(|e| LlmError::Conversion(format!("malformed data URI: invalid base64: {e}")))?
    } else {
        payload.as_bytes().to_vec()
    };

    let content_type = match strip_parameters(media_type) {
        ct if ct.is_empty() => "text/plain".to_owned(),
        ct => ct,
    };

    Ok(ResolvedMedia { content_type, data })
}

fn local_path(url: &str) -> Option<&Path> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(Path::new(path));
    }
    if url.starts_with('/') || url.starts_with("./") || url.starts_with("../") {
        return Some(Path::new(url));
    }
    None
}

async fn read_file(path: &Path, declared: Option<&str>) -> Result<ResolvedMedia, LlmError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| LlmError::Conversion(format!("failed to read media file {}: {e}", path.display())))?;

    let content_type = declared
        .map(str::to_owned)
        .or_else(|| mime_guess::from_path(path).first().map(|mime| mime.essence_str().to_owned()))
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_owned());

    Ok(ResolvedMedia { content_type, data })
}

fn guess_content_type(url: &str) -> Option<String> {
    let path = url::Url::parse(url).ok()?.path().to_owned();
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_owned())
}

fn strip_parameters(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Keep data URIs out of error messages
fn truncate(url: &str) -> &str {
    url.char_indices().nth(64).map_or(url, |(idx, _)| &url[..idx])
}
