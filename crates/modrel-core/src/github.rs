//! GitHub REST client implementing [`ReleaseHost`].

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{ReleaseError, Result};
use crate::host::{NewRelease, PublishedRelease, ReleaseHost, TagLookup};

/// Default REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";

/// Connection settings for the GitHub API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// REST API base URL.
    pub api_url: String,
    /// `owner/repo`.
    pub repository: String,
    /// Bearer token (optional for read-only lookups on public repositories).
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl GitHubConfig {
    /// Create config for a repository on the public API.
    pub fn new(repository: &str) -> Self {
        GitHubConfig {
            api_url: DEFAULT_API_URL.to_string(),
            repository: repository.to_string(),
            token: None,
        }
    }

    /// Read `GITHUB_API_URL`, `GITHUB_REPOSITORY` and `GITHUB_TOKEN`.
    pub fn from_env() -> Self {
        GitHubConfig {
            api_url: std::env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            repository: std::env::var("GITHUB_REPOSITORY").unwrap_or_default(),
            token: std::env::var("GITHUB_TOKEN").ok(),
        }
    }

    /// Point at a different API base (GitHub Enterprise, tests).
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    /// Set authentication token.
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

#[derive(Debug, Serialize)]
struct CreateReleaseRequest<'a> {
    tag_name: &'a str,
    name: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    id: u64,
    #[serde(default)]
    html_url: String,
}

/// GitHub API client.
pub struct GitHubClient {
    config: GitHubConfig,
    http_client: reqwest::Client,
}

impl GitHubClient {
    /// Create a new client.
    pub fn new(config: GitHubConfig) -> Result<Self> {
        if config.repository.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(ReleaseError::Config(format!(
                "repository must be 'owner/repo', got '{}'",
                config.repository
            )));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("modrel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReleaseError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(GitHubClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(GitHubConfig::from_env())
    }

    /// Build `{api}/repos/{owner}/{repo}/{segments...}` with each segment escaped.
    fn endpoint<'a, I>(&self, segments: I) -> Result<Url>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = Url::parse(&self.config.api_url)
            .map_err(|e| ReleaseError::Config(format!("invalid api url: {e}")))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ReleaseError::Config("api url cannot be a base".into()))?;
            path.pop_if_empty();
            path.push("repos");
            path.extend(self.config.repository.split('/'));
            path.extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self
            .http_client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn unexpected_status(operation: &str, response: reqwest::Response) -> ReleaseError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(200).collect();
    let detail = format!("HTTP {status}: {excerpt}");
    if is_permanent(status) {
        ReleaseError::rejected(operation, detail)
    } else {
        ReleaseError::transient(operation, detail)
    }
}

/// Client errors other than auth and rate limiting will not change on retry.
fn is_permanent(status: StatusCode) -> bool {
    status.is_client_error()
        && !matches!(
            status,
            StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
                | StatusCode::REQUEST_TIMEOUT
                | StatusCode::TOO_MANY_REQUESTS
        )
}

#[async_trait]
impl ReleaseHost for GitHubClient {
    async fn lookup_tag(&self, tag: &str) -> Result<TagLookup> {
        let url = self.endpoint(["git", "ref", "tags"].into_iter().chain(tag.split('/')))?;
        debug!(tag, url = %url, "looking up tag");

        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| ReleaseError::transient("tag lookup", e))?;

        match response.status() {
            StatusCode::OK => Ok(TagLookup::Found),
            StatusCode::NOT_FOUND => Ok(TagLookup::Missing),
            _ => Err(unexpected_status("tag lookup", response).await),
        }
    }

    async fn create_release(&self, release: &NewRelease) -> Result<PublishedRelease> {
        let url = self.endpoint(["releases"])?;
        let payload = CreateReleaseRequest {
            tag_name: &release.tag_name,
            name: &release.name,
            body: &release.body,
        };

        let response = self
            .request(reqwest::Method::POST, url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ReleaseError::transient("release creation", e))?;

        if !response.status().is_success() {
            return Err(unexpected_status("release creation", response).await);
        }

        let created: ReleaseResponse = response
            .json()
            .await
            .map_err(|e| ReleaseError::transient("release creation", e))?;
        info!(tag = %release.tag_name, release_id = created.id, "release created");

        Ok(PublishedRelease {
            id: created.id,
            html_url: created.html_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer exactly one HTTP request with a canned response and hand back
    /// the raw request text.
    async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let content_length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    fn client(api_url: &str) -> GitHubClient {
        GitHubClient::new(
            GitHubConfig::new("acme/infra")
                .with_api_url(api_url)
                .with_token("t0ken"),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_malformed_repository() {
        assert!(GitHubClient::new(GitHubConfig::new("just-a-name")).is_err());
    }

    #[tokio::test]
    async fn test_lookup_found() {
        let (url, server) = serve_once("200 OK", r#"{"ref":"refs/tags/api/gateway/2.3.0"}"#).await;
        let found = client(&url).lookup_tag("api/gateway/2.3.0").await.unwrap();
        assert_eq!(found, TagLookup::Found);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /repos/acme/infra/git/ref/tags/api/gateway/2.3.0 "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer t0ken"));
    }

    #[tokio::test]
    async fn test_lookup_missing() {
        let (url, server) = serve_once("404 Not Found", r#"{"message":"Not Found"}"#).await;
        let found = client(&url).lookup_tag("queue/1.0.0").await.unwrap();
        assert_eq!(found, TagLookup::Missing);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_lookup_other_status_is_transient() {
        let (url, server) = serve_once("403 Forbidden", r#"{"message":"rate limited"}"#).await;
        let err = client(&url).lookup_tag("queue/1.0.0").await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("403"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_create_release() {
        let (url, server) = serve_once(
            "201 Created",
            r#"{"id":77,"html_url":"https://github.com/acme/infra/releases/tag/queue/1.0.0"}"#,
        )
        .await;
        let created = client(&url)
            .create_release(&NewRelease {
                tag_name: "queue/1.0.0".to_string(),
                name: "queue/1.0.0".to_string(),
                body: "notes".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(created.id, 77);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /repos/acme/infra/releases "));
        assert!(request.contains(r#""tag_name":"queue/1.0.0""#));
    }

    #[tokio::test]
    async fn test_create_release_already_exists_is_rejected() {
        let (url, server) = serve_once(
            "422 Unprocessable Entity",
            r#"{"message":"Validation Failed","errors":[{"code":"already_exists"}]}"#,
        )
        .await;
        let err = client(&url)
            .create_release(&NewRelease {
                tag_name: "x/1.0.0".to_string(),
                name: "x/1.0.0".to_string(),
                body: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Rejected { .. }));
        assert!(!err.is_transient());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_create_release_rate_limited_is_transient() {
        let (url, server) = serve_once("429 Too Many Requests", r#"{"message":"slow down"}"#).await;
        let err = client(&url)
            .create_release(&NewRelease {
                tag_name: "x/1.0.0".to_string(),
                name: "x/1.0.0".to_string(),
                body: String::new(),
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
        server.await.unwrap();
    }

    #[test]
    fn test_permanent_statuses() {
        assert!(is_permanent(StatusCode::UNPROCESSABLE_ENTITY));
        assert!(is_permanent(StatusCode::BAD_REQUEST));
        assert!(!is_permanent(StatusCode::FORBIDDEN));
        assert!(!is_permanent(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_permanent(StatusCode::BAD_GATEWAY));
    }
}
