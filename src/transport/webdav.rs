use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::{ListOptions, RemoteInfo, Transport};
use crate::error::{FsError, FsResult};
use crate::params::ConnectParams;
use crate::utils;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:resourcetype/>
    <D:getcontentlength/>
    <D:getlastmodified/>
  </D:prop>
</D:propfind>"#;

/// WebDAV engine on reqwest. Paths seen by the adapter are rooted at the
/// configured collection root; the root prefix is applied only when URLs
/// are built.
pub struct WebdavTransport {
    client: Client,
    base: Url,
    root: String,
    username: String,
    password: String,
}

impl WebdavTransport {
    pub fn open(params: &ConnectParams) -> FsResult<Self> {
        let scheme = if params.secure() == crate::config::Secure::None {
            "http"
        } else {
            "https"
        };
        let base = Url::parse(&format!("{}://{}:{}/", scheme, params.host, params.port))
            .map_err(|e| FsError::Configuration(format!("bad webdav endpoint: {}", e)))?;

        let mut builder = Client::builder();
        if params.timeout_ms() > 0 {
            builder = builder.timeout(Duration::from_millis(params.timeout_ms()));
        }
        if params.accept_any() {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(cert_path) = params.private_key_path() {
            let der = std::fs::read(cert_path)?;
            let passphrase = params.private_key_passphrase().unwrap_or_default();
            let identity = reqwest::Identity::from_pkcs12_der(&der, passphrase)
                .map_err(|e| FsError::transport("webdav tls", e.to_string()))?;
            builder = builder.identity(identity);
        }
        let client = builder
            .build()
            .map_err(|e| FsError::transport("webdav connect", e.to_string()))?;

        let root = params
            .root_path()
            .map(|r| format!("/{}", r.trim_matches('/')))
            .filter(|r| r.as_str() != "/")
            .unwrap_or_default();

        Ok(Self {
            client,
            base,
            root,
            username: params.username.clone(),
            password: params.password.clone(),
        })
    }

    fn url_for(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        let full = format!("{}/{}", self.root, path.trim_start_matches('/'));
        url.set_path(&full);
        url
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url_for(path))
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn propfind(&self, path: &str, depth: &str) -> FsResult<String> {
        let method = Method::from_bytes(b"PROPFIND").expect("valid method token");
        let resp = self
            .request(method, path)
            .header("Depth", depth)
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await
            .map_err(|e| FsError::transport("stat", e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(FsError::NotFound(path.to_string())),
            s if s.is_success() || s == StatusCode::MULTI_STATUS => resp
                .text()
                .await
                .map_err(|e| FsError::transport("stat", e.to_string())),
            s => Err(FsError::transport("stat", format!("server returned {}", s))),
        }
    }

    /// The adapter-visible path for a multistatus href: percent-decoded,
    /// root prefix stripped, no trailing slash.
    fn href_to_path(&self, href: &str) -> String {
        let raw = if let Ok(url) = Url::parse(href) {
            url.path().to_string()
        } else {
            href.to_string()
        };
        let decoded = percent_decode(&raw);
        let unrooted = decoded
            .strip_prefix(&self.root)
            .unwrap_or(&decoded)
            .to_string();
        let trimmed = unrooted.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    }

    fn entry_from_block(&self, block: &str) -> Option<RemoteInfo> {
        let href = element_text(block, "href")?;
        let full_name = self.href_to_path(&href);
        let name = {
            let base = utils::base_name(&full_name);
            if base.is_empty() {
                "/".to_string()
            } else {
                base.to_string()
            }
        };
        let is_directory = has_element(block, "collection");
        let length = element_text(block, "getcontentlength")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        let last_write_time = element_text(block, "getlastmodified")
            .and_then(|v| DateTime::parse_from_rfc2822(v.trim()).ok())
            .map(|t| t.with_timezone(&Utc));

        Some(RemoteInfo {
            full_name,
            name,
            is_directory,
            length,
            last_write_time,
        })
    }

    async fn list_once(&self, path: &str) -> FsResult<Vec<RemoteInfo>> {
        let body = self.propfind(path, "1").await?;
        let requested = {
            let t = path.trim_end_matches('/');
            if t.is_empty() { "/" } else { t }
        };
        Ok(response_blocks(&body)
            .iter()
            .filter_map(|block| self.entry_from_block(block))
            .filter(|info| info.full_name != requested)
            .collect())
    }

    async fn simple(
        &self,
        op: &'static str,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        dest: Option<Url>,
    ) -> FsResult<reqwest::Response> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.body(body);
        }
        if let Some(dest) = dest {
            req = req.header("Destination", dest.to_string());
        }
        let resp = req
            .send()
            .await
            .map_err(|e| FsError::transport(op, e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(FsError::NotFound(path.to_string())),
            s if s.is_success() || s == StatusCode::MULTI_STATUS => Ok(resp),
            s => Err(FsError::transport(op, format!("server returned {}", s))),
        }
    }
}

#[async_trait]
impl Transport for WebdavTransport {
    async fn stat(&mut self, path: &str) -> FsResult<RemoteInfo> {
        let body = self.propfind(path, "0").await?;
        response_blocks(&body)
            .first()
            .and_then(|block| self.entry_from_block(block))
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    async fn create_directory(&mut self, path: &str) -> FsResult<()> {
        let method = Method::from_bytes(b"MKCOL").expect("valid method token");
        self.simple("create directory", method, path, None, None)
            .await?;
        Ok(())
    }

    async fn put_file(&mut self, local: &Path, remote: &str, remove_source: bool) -> FsResult<()> {
        let content = tokio::fs::read(local).await?;
        tracing::debug!(bytes = content.len(), remote, "webdav upload");
        self.simple("upload", Method::PUT, remote, Some(content), None)
            .await?;
        if remove_source {
            tokio::fs::remove_file(local).await?;
        }
        Ok(())
    }

    async fn get_file(&mut self, remote: &str, local: &Path) -> FsResult<()> {
        let resp = self.simple("download", Method::GET, remote, None, None).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FsError::transport("download", e.to_string()))?;
        tokio::fs::write(local, &bytes).await?;
        Ok(())
    }

    async fn remove(&mut self, path: &str) -> FsResult<()> {
        let resp = self
            .simple("remove", Method::DELETE, path, None, None)
            .await?;
        // A 207 body can carry per-resource failures for a collection
        // delete; any embedded 4xx/5xx means the remove was partial.
        if resp.status() == StatusCode::MULTI_STATUS {
            let body = resp
                .text()
                .await
                .map_err(|e| FsError::transport("remove", e.to_string()))?;
            if body.contains("HTTP/1.1 4") || body.contains("HTTP/1.1 5") {
                return Err(FsError::operation_failed(
                    "remove",
                    "server reported failures for some entries",
                ));
            }
        }
        Ok(())
    }

    async fn list(&mut self, path: &str, options: ListOptions) -> FsResult<Vec<RemoteInfo>> {
        let mut result = Vec::new();
        let mut pending = VecDeque::from([path.to_string()]);

        while let Some(dir) = pending.pop_front() {
            for info in self.list_once(&dir).await? {
                if info.is_directory && options.recursive {
                    pending.push_back(info.full_name.clone());
                }
                if !info.is_directory || options.include_directories {
                    result.push(info);
                }
            }
        }
        Ok(result)
    }

    async fn rename(&mut self, old: &str, new: &str) -> FsResult<()> {
        let method = Method::from_bytes(b"MOVE").expect("valid method token");
        let dest = self.url_for(new);
        self.simple("rename", method, old, None, Some(dest)).await?;
        Ok(())
    }

    async fn close(&mut self) -> FsResult<()> {
        // Stateless HTTP; nothing to release
        Ok(())
    }
}

fn local_name(tag: &str) -> &str {
    tag.rsplit(':').next().unwrap_or(tag)
}

/// All `<response>` element bodies of a multistatus document, prefix
/// agnostic.
fn response_blocks(xml: &str) -> Vec<&str> {
    extract_elements(xml, "response")
}

/// Text content of the first `local`-named element in `block`, entities
/// unescaped.
fn element_text(block: &str, local: &str) -> Option<String> {
    extract_elements(block, local)
        .first()
        .map(|s| unescape(s.trim()))
}

fn has_element(block: &str, local: &str) -> bool {
    !extract_elements(block, local).is_empty()
}

/// Finds elements by local name without an XML dependency; good enough
/// for the fixed multistatus shape PROPFIND returns.
fn extract_elements<'a>(xml: &'a str, local: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut i = 0;
    while let Some(off) = xml[i..].find('<') {
        let start = i + off;
        let rest = &xml[start + 1..];
        if rest.starts_with('/') || rest.starts_with('?') || rest.starts_with('!') {
            i = start + 1;
            continue;
        }
        let name_end = rest
            .find(|c: char| c == '>' || c == '/' || c.is_whitespace())
            .unwrap_or(rest.len());
        if local_name(&rest[..name_end]) != local {
            i = start + 1;
            continue;
        }
        let Some(open_rel) = rest.find('>') else { break };
        let open_end = start + 1 + open_rel;
        if xml[start..=open_end].ends_with("/>") {
            out.push(&xml[open_end..open_end]);
            i = open_end + 1;
            continue;
        }
        let content_start = open_end + 1;
        let mut j = content_start;
        let mut found = false;
        while let Some(coff) = xml[j..].find("</") {
            let cstart = j + coff;
            let crest = &xml[cstart + 2..];
            let cname_end = crest.find('>').unwrap_or(crest.len());
            if local_name(crest[..cname_end].trim()) == local {
                out.push(&xml[content_start..cstart]);
                i = cstart + 2 + cname_end + 1;
                found = true;
                break;
            }
            j = cstart + 2;
        }
        if !found {
            break;
        }
    }
    out
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(h), Some(l)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((h * 16 + l) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTISTATUS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/docs/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/></D:resourcetype>
        <D:getlastmodified>Sat, 01 Jun 2024 10:00:00 GMT</D:getlastmodified>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/dav/docs/report%20final.pdf</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype/>
        <D:getcontentlength>12345</D:getcontentlength>
        <D:getlastmodified>Sat, 01 Jun 2024 11:30:00 GMT</D:getlastmodified>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    #[test]
    fn test_response_blocks_found() {
        assert_eq!(response_blocks(MULTISTATUS).len(), 2);
    }

    #[test]
    fn test_element_text_and_collection_flag() {
        let blocks = response_blocks(MULTISTATUS);
        assert_eq!(element_text(blocks[0], "href").as_deref(), Some("/dav/docs/"));
        assert!(has_element(blocks[0], "collection"));
        assert!(!has_element(blocks[1], "collection"));
        assert_eq!(
            element_text(blocks[1], "getcontentlength").as_deref(),
            Some("12345")
        );
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("report%20final.pdf"), "report final.pdf");
        assert_eq!(percent_decode("plain"), "plain");
        assert_eq!(percent_decode("50%"), "50%");
    }

    #[test]
    fn test_unescape_entities() {
        assert_eq!(unescape("a &amp; b &lt;c&gt;"), "a & b <c>");
    }

    #[test]
    fn test_last_modified_parses_rfc2822() {
        let blocks = response_blocks(MULTISTATUS);
        let raw = element_text(blocks[1], "getlastmodified").unwrap();
        let parsed = DateTime::parse_from_rfc2822(raw.trim()).unwrap();
        assert_eq!(parsed.timestamp(), 1_717_241_400);
    }
}
