// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Safe I/O wrappers for tools.
//!
//! Every wrapper checks access first and only then touches the filesystem or
//! the network. Reads and fetches are analysed; a Block comes back as
//! `OperationError::Security` and ordinary I/O failures as the other variants.

use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::access::AccessController;
use crate::engine::classifier::ContentClassifier;
use crate::engine_core::constants::config::DEFAULT_HTTP_TIMEOUT_SECS;
use crate::engine_core::constants::http;
use crate::engine_core::errors::{OperationError, SecurityError};
use crate::engine_core::models::{Decision, SourceContext};
use crate::engine_core::security_core::SecurityCore;
use crate::policy::Configuration;
use crate::utils::text;

/// A file read that passed the access check.
#[derive(Debug, Clone)]
pub struct SafeFileContent {
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub size: u64,
    /// `None` when the content was not scanned
    pub decision: Option<Decision>,
}

impl SafeFileContent {
    pub fn display_text(&self, max_bytes: usize) -> String {
        text::display_text(&self.content, max_bytes)
    }
}

/// A fetched HTTP response that passed the domain check.
#[derive(Debug, Clone)]
pub struct SafeHttpResponse {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Most severe domain check along the redirect chain (Allow or Warn)
    pub access: Decision,
    /// `None` when the body was not scanned
    pub decision: Option<Decision>,
}

impl SafeHttpResponse {
    pub fn display_text(&self, max_bytes: usize) -> String {
        text::display_text(&self.body, max_bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One request as handed to the fetcher. Redirects are never followed by the
/// fetcher itself; each hop comes back here as a new request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct FetchedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Location of a redirect response, if this is one.
    fn redirect_location(&self) -> Option<&str> {
        match self.status {
            301 | 302 | 303 | 307 | 308 => self.header("location"),
            _ => None,
        }
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// The network side of the `safe_http_*` wrappers.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, OperationError>;
}

/// Default fetcher backed by `reqwest`, with automatic redirects turned off.
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, OperationError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, OperationError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(request.url.clone()),
            HttpMethod::Post => self.client.post(request.url.clone()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.bytes().await?.to_vec();
        Ok(FetchedResponse {
            status,
            headers,
            body,
        })
    }
}

/// Tool-attributed entry point to the safe wrappers.
pub struct Operations {
    core: Arc<SecurityCore>,
    source: SourceContext,
    fetcher: Arc<dyn HttpFetcher>,
    timeout: Duration,
}

impl Operations {
    pub fn new(core: Arc<SecurityCore>, tool: impl Into<String>) -> Result<Self, OperationError> {
        Ok(Self {
            core,
            source: SourceContext::new(tool),
            fetcher: Arc::new(ReqwestFetcher::new()?),
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn HttpFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn core(&self) -> &Arc<SecurityCore> {
        &self.core
    }

    /// Check access, read, analyse.
    pub async fn safe_file_read(&self, path: impl AsRef<Path>) -> Result<SafeFileContent, OperationError> {
        let path = path.as_ref();
        let config = self.core.current();

        self.core.check_file_access_in(&config, path, &self.source)?;

        let content = tokio::fs::read(path)
            .await
            .map_err(|e| OperationError::io(path, e))?;
        let size = content.len() as u64;

        let decision = self.core.analyse_bytes_in(&config, &content, &self.source);
        block_on_decision(decision.as_ref())?;

        Ok(SafeFileContent {
            path: path.to_path_buf(),
            content,
            size,
            decision,
        })
    }

    /// Check access, then write with owner-only permissions. The content
    /// being written is not analysed.
    pub async fn safe_file_write(
        &self,
        path: impl AsRef<Path>,
        content: impl AsRef<[u8]>,
    ) -> Result<(), OperationError> {
        let path = path.as_ref();
        let config = self.core.current();

        self.core.check_file_access_in(&config, path, &self.source)?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(path)
            .await
            .map_err(|e| OperationError::io(path, e))?;

        // `mode` only applies to newly created files
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| OperationError::io(path, e))?;
        }

        file.write_all(content.as_ref())
            .await
            .map_err(|e| OperationError::io(path, e))?;
        file.flush().await.map_err(|e| OperationError::io(path, e))?;

        debug!(tool = %self.source.tool, path = %path.display(), "file written");
        Ok(())
    }

    /// Check the host, fetch under the caller's cancellation token and the
    /// configured timeout, then analyse the body.
    pub async fn safe_http_get(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<SafeHttpResponse, OperationError> {
        self.safe_http_get_with_headers(url, &[], cancel).await
    }

    pub async fn safe_http_get_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<SafeHttpResponse, OperationError> {
        self.safe_http_request(HttpMethod::Get, url, owned_headers(headers), None, cancel)
            .await
    }

    /// POST `body` as JSON. Only the response is analysed.
    pub async fn safe_http_post(
        &self,
        url: &str,
        body: impl Into<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<SafeHttpResponse, OperationError> {
        self.safe_http_post_with_headers(url, body, &[], cancel).await
    }

    /// POST with caller headers. `Content-Type` defaults to JSON when absent.
    pub async fn safe_http_post_with_headers(
        &self,
        url: &str,
        body: impl Into<Vec<u8>>,
        headers: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<SafeHttpResponse, OperationError> {
        let mut headers = owned_headers(headers);
        if find_header(&headers, "content-type").is_none() {
            headers.push((
                "Content-Type".to_string(),
                http::DEFAULT_POST_CONTENT_TYPE.to_string(),
            ));
        }
        self.safe_http_request(HttpMethod::Post, url, headers, Some(body.into()), cancel)
            .await
    }

    async fn safe_http_request(
        &self,
        method: HttpMethod,
        url: &str,
        headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<SafeHttpResponse, OperationError> {
        let (parsed, host) = parse_target(url)?;

        let config = self.core.current();
        let source = self.source.clone().with_url(url);
        let access = self.core.check_domain_in(&config, &host, &source)?;

        let request = FetchRequest {
            method,
            url: parsed,
            headers,
            body,
        };
        let chain = self.follow_redirects(&config, request, host, access, &source);

        let hop = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OperationError::Cancelled),
            result = tokio::time::timeout(self.timeout, chain) => match result {
                Ok(inner) => inner?,
                Err(_) => return Err(OperationError::TimedOut(self.timeout)),
            },
        };
        let FinalHop {
            url: final_url,
            host,
            access,
            response,
        } = hop;

        let content_type = response.content_type().map(str::to_string);
        let binary_type = content_type
            .as_deref()
            .is_some_and(ContentClassifier::is_binary_content_type);
        let trusted_exempt = !config.settings.scan_trusted_domains
            && AccessController::is_trusted(&config, &host);

        let source = source.with_domain(host.as_str());
        let decision = if binary_type || trusted_exempt {
            debug!(url = %final_url, binary_type, trusted_exempt, "response not scanned");
            None
        } else {
            self.core.analyse_bytes_in(&config, &response.body, &source)
        };
        block_on_decision(decision.as_ref())?;

        Ok(SafeHttpResponse {
            url: final_url.to_string(),
            status: response.status,
            content_type,
            headers: response.headers,
            body: response.body,
            access,
            decision,
        })
    }

    /// Fetch `request`, checking every redirect target against the same
    /// snapshot before it is requested.
    async fn follow_redirects(
        &self,
        config: &Configuration,
        mut request: FetchRequest,
        mut host: String,
        mut access: Decision,
        source: &SourceContext,
    ) -> Result<FinalHop, OperationError> {
        let mut hops = 0;
        loop {
            let response = self.fetcher.fetch(&request).await?;
            let Some(location) = response.redirect_location() else {
                return Ok(FinalHop {
                    url: request.url,
                    host,
                    access,
                    response,
                });
            };
            if hops == http::MAX_REDIRECTS {
                return Err(OperationError::TooManyRedirects(http::MAX_REDIRECTS));
            }
            hops += 1;

            let next = request
                .url
                .join(location)
                .map_err(|e| OperationError::InvalidUrl {
                    url: location.to_string(),
                    reason: e.to_string(),
                })?;
            let (next, next_host) = parse_target(next.as_str())?;
            let hop_source = source.clone().with_url(next.as_str());
            let hop_access = self.core.check_domain_in(config, &next_host, &hop_source)?;
            debug!(from = %request.url, to = %next, status = response.status, "following redirect");

            if !hop_access.is_allow() {
                access = hop_access;
            }
            if next_host != host {
                request
                    .headers
                    .retain(|(k, _)| !CROSS_HOST_STRIPPED.iter().any(|h| k.eq_ignore_ascii_case(h)));
            }
            // 307 and 308 replay the request as is
            if matches!(response.status, 301 | 302 | 303) && request.method == HttpMethod::Post {
                request.method = HttpMethod::Get;
                request.body = None;
                request
                    .headers
                    .retain(|(k, _)| !k.eq_ignore_ascii_case("content-type"));
            }
            request.url = next;
            host = next_host;
        }
    }
}

/// Credentials never forwarded to a different host on redirect.
const CROSS_HOST_STRIPPED: [&str; 3] = ["authorization", "cookie", "proxy-authorization"];

struct FinalHop {
    url: Url,
    host: String,
    access: Decision,
    response: FetchedResponse,
}

fn owned_headers(headers: &[(&str, &str)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Parse an http(s) URL and return it with its host.
fn parse_target(url: &str) -> Result<(Url, String), OperationError> {
    let parsed = Url::parse(url).map_err(|e| OperationError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(OperationError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| OperationError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?
        .to_string();
    Ok((parsed, host))
}

fn block_on_decision(decision: Option<&Decision>) -> Result<(), SecurityError> {
    match decision {
        Some(d) if d.is_block() => Err(SecurityError::ContentBlocked {
            id: d.id.clone(),
            message: d.message.clone(),
        }),
        _ => Ok(()),
    }
}
