//! Path-addressed WebDAV storage
//!
//! `DavStorage` speaks the HTTP extensions (PROPFIND, MKCOL, MOVE, COPY) plus
//! plain GET/PUT/DELETE against one endpoint with basic auth. Paths are
//! absolute inside the endpoint: `/` is the root, `/Docs/a.docx` a file.
//! Every request goes through the shared retry wrapper.

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::http_retry::{build_client, check_status, map_send_error, send_with_retry};
use super::types::{parse_timestamp, ProviderError};
use crate::config::{CoreConfig, RetryConfig};

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
    <d:prop>
        <d:resourcetype/>
        <d:getcontentlength/>
        <d:getlastmodified/>
        <d:creationdate/>
        <d:getcontenttype/>
        <d:getetag/>
    </d:prop>
</d:propfind>"#;

/// One resource reported by PROPFIND
#[derive(Debug, Clone, PartialEq)]
pub struct DavEntry {
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// WebDAV client bound to one endpoint and one account
pub struct DavStorage {
    client: Client,
    base_url: Url,
    /// Decoded URL path of the endpoint, without trailing slash
    base_path: String,
    username: String,
    password: SecretString,
    retry: RetryConfig,
}

impl DavStorage {
    pub fn new(endpoint: &str, username: &str, password: SecretString, config: &CoreConfig) -> Result<Self, ProviderError> {
        let base_url =
            Url::parse(endpoint).map_err(|e| ProviderError::InvalidConfig(format!("Invalid URL {}: {}", endpoint, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidConfig(format!("{} cannot be used as a WebDAV endpoint", endpoint)));
        }
        let base_path = urlencoding::decode(base_url.path())
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| base_url.path().to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: build_client(&config.http)?,
            base_url,
            base_path,
            username: username.to_string(),
            password,
            retry: config.retry.clone(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Full URL of `path`, each segment percent-encoded
    pub fn url_for(&self, path: &str) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ProviderError::InvalidConfig(format!("{} cannot be a base URL", self.base_url)))?;
            segments.pop_if_empty();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ProviderError> {
        Ok(self.client.request(method, self.url_for(path)?))
    }

    async fn send(&self, builder: RequestBuilder, context: &str) -> Result<Response, ProviderError> {
        let request = builder
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .build()
            .map_err(map_send_error)?;
        let response = send_with_retry(&self.client, request, &self.retry)
            .await
            .map_err(map_send_error)?;
        check_status(response, context).await
    }

    /// PROPFIND with the given depth, self entry included
    pub async fn propfind(&self, path: &str, depth: u8) -> Result<Vec<DavEntry>, ProviderError> {
        let builder = self
            .request(dav_method("PROPFIND")?, path)?
            .header("Depth", depth.to_string())
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY);
        let response = self.send(builder, &format!("PROPFIND {}", path)).await?;
        let xml = response.text().await.map_err(map_send_error)?;
        let entries = parse_multistatus(&xml, &self.base_path)?;
        tracing::debug!("[WebDAV] PROPFIND {} returned {} entries", path, entries.len());
        Ok(entries)
    }

    /// Direct children of the collection at `path`
    pub async fn list(&self, path: &str) -> Result<Vec<DavEntry>, ProviderError> {
        let target = normalize_path(path);
        Ok(self
            .propfind(&target, 1)
            .await?
            .into_iter()
            .filter(|entry| entry.path != target)
            .collect())
    }

    pub async fn stat(&self, path: &str) -> Result<DavEntry, ProviderError> {
        let target = normalize_path(path);
        let entries = self.propfind(&target, 0).await?;
        let position = entries.iter().position(|e| e.path == target).unwrap_or(0);
        entries
            .into_iter()
            .nth(position)
            .ok_or_else(|| ProviderError::NotFound(target))
    }

    pub async fn exists(&self, path: &str) -> Result<bool, ProviderError> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(ProviderError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn mkcol(&self, path: &str) -> Result<(), ProviderError> {
        let builder = self.request(dav_method("MKCOL")?, path)?;
        self.send(builder, &format!("MKCOL {}", path)).await?;
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Vec<u8>, ProviderError> {
        let builder = self.request(Method::GET, path)?;
        let response = self.send(builder, &format!("GET {}", path)).await?;
        let bytes = response.bytes().await.map_err(map_send_error)?;
        Ok(bytes.to_vec())
    }

    /// Store `data` at `path`. Without `overwrite` an existing resource
    /// fails with `NameConflict`.
    pub async fn put(&self, path: &str, data: Vec<u8>, overwrite: bool) -> Result<(), ProviderError> {
        let content_type = mime_guess::from_path(path).first_or_octet_stream();
        let mut builder = self
            .request(Method::PUT, path)?
            .header("Content-Type", content_type.as_ref())
            .body(data);
        if !overwrite {
            builder = builder.header("If-None-Match", "*");
        }
        self.send(builder, &format!("PUT {}", path)).await?;
        Ok(())
    }

    /// DELETE works for files and, recursively, for collections
    pub async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        let builder = self.request(Method::DELETE, path)?;
        self.send(builder, &format!("DELETE {}", path)).await?;
        Ok(())
    }

    pub async fn move_to(&self, from: &str, to: &str, overwrite: bool) -> Result<(), ProviderError> {
        self.relocate("MOVE", from, to, overwrite).await
    }

    pub async fn copy_to(&self, from: &str, to: &str, overwrite: bool) -> Result<(), ProviderError> {
        self.relocate("COPY", from, to, overwrite).await
    }

    async fn relocate(&self, method: &str, from: &str, to: &str, overwrite: bool) -> Result<(), ProviderError> {
        let destination = self.url_for(to)?;
        let builder = self
            .request(dav_method(method)?, from)?
            .header("Destination", destination.as_str())
            .header("Overwrite", if overwrite { "T" } else { "F" });
        self.send(builder, &format!("{} {} -> {}", method, from, to)).await?;
        Ok(())
    }
}

fn dav_method(name: &str) -> Result<Method, ProviderError> {
    Method::from_bytes(name.as_bytes()).map_err(|e| ProviderError::InvalidConfig(format!("{}: {}", name, e)))
}

/// `/`-rooted path without trailing slash (`/` for the root)
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

pub fn join_path(parent: &str, name: &str) -> String {
    normalize_path(&format!("{}/{}", parent.trim_end_matches('/'), name.trim_matches('/')))
}

/// Parent collection, `None` for the root
pub fn parent_path(path: &str) -> Option<String> {
    let path = normalize_path(path);
    if path == "/" {
        return None;
    }
    path.rsplit_once('/').map(|(head, _)| normalize_path(head))
}

pub fn last_component(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Parse a 207 multistatus body. Hrefs are made relative to `base_path`.
pub fn parse_multistatus(xml: &str, base_path: &str) -> Result<Vec<DavEntry>, ProviderError> {
    let response_pattern = Regex::new(r"(?s)<(?:[a-zA-Z0-9_]+:)?response(?:\s[^>]*)?>(.*?)</(?:[a-zA-Z0-9_]+:)?response>")
        .map_err(|e| ProviderError::ParseError(e.to_string()))?;

    let mut entries = Vec::new();
    for cap in response_pattern.captures_iter(xml) {
        let Some(content) = cap.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let Some(href) = extract_tag_content(content, "href") else {
            tracing::warn!("[WebDAV] No href found in response element");
            continue;
        };

        let path = href_to_path(&href, base_path);
        let name = if path == "/" {
            String::new()
        } else {
            last_component(&path).to_string()
        };
        if name == "." || name == ".." {
            continue;
        }

        entries.push(DavEntry {
            is_dir: is_collection(content) || href.ends_with('/'),
            size: extract_tag_content(content, "getcontentlength")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            modified: extract_tag_content(content, "getlastmodified").and_then(|s| parse_timestamp(&s)),
            created: extract_tag_content(content, "creationdate").and_then(|s| parse_timestamp(&s)),
            content_type: extract_tag_content(content, "getcontenttype"),
            etag: extract_tag_content(content, "getetag").map(|e| e.trim_matches('"').to_string()),
            path,
            name,
        });
    }

    Ok(entries)
}

fn href_to_path(href: &str, base_path: &str) -> String {
    let href = unescape_xml(href);
    let raw_path = if href.contains("://") {
        Url::parse(&href).map(|u| u.path().to_string()).unwrap_or(href)
    } else {
        href
    };
    let decoded = urlencoding::decode(&raw_path)
        .map(|p| p.into_owned())
        .unwrap_or(raw_path);

    let base = base_path.trim_end_matches('/');
    let relative = if base.is_empty() {
        decoded.as_str()
    } else {
        match decoded.strip_prefix(base) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => decoded.as_str(),
        }
    };
    normalize_path(relative)
}

/// Collections are flagged by `collection` inside `<resourcetype>`, or by
/// `<iscollection>1</iscollection>` on servers that use that property instead
fn is_collection(content: &str) -> bool {
    let lower = content.to_lowercase();
    let in_resourcetype = lower
        .find("resourcetype>")
        .and_then(|start| {
            let after = start + "resourcetype>".len();
            lower[after..]
                .find("resourcetype>")
                .map(|end| lower[after..after + end].contains("collection"))
        })
        .unwrap_or(false);
    in_resourcetype || lower.contains("iscollection>1</")
}

/// Text content of the first `tag` element, whatever its namespace prefix
pub fn extract_tag_content(xml: &str, tag: &str) -> Option<String> {
    let patterns = [
        format!(r"<[a-zA-Z][a-zA-Z0-9]*:{}[^>]*>([^<]*)</[a-zA-Z][a-zA-Z0-9]*:{}>", tag, tag),
        format!(r"<{}[^>]*>([^<]*)</{}>", tag, tag),
        // CDATA content
        format!(r"<[a-zA-Z][a-zA-Z0-9]*:{}[^>]*><!\[CDATA\[(.*?)\]\]></[a-zA-Z][a-zA-Z0-9]*:{}>", tag, tag),
        format!(r"<{}[^>]*><!\[CDATA\[(.*?)\]\]></{}>", tag, tag),
    ];

    for pattern in patterns {
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        if let Some(text) = re.captures(xml).and_then(|cap| cap.get(1)) {
            let text = text.as_str().trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
