//! GitHub REST v3 implementation of the forge gateways.
//!
//! Token-authenticated blocking client. Rate-limit responses are retried with
//! backoff here so callers only ever see `RateLimited` after retries are
//! exhausted; every request carries a timeout.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client, Response};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::gateway::{
    BranchGateway, ContentGateway, GatewayError, GatewayResult, PullRequestGateway, RemoteFile,
    RepositoryGateway, WrittenFile,
};
use crate::log_status;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RATE_LIMIT_ATTEMPTS: u32 = 3;

/// GitHub client implementing all four gateway traits.
pub struct GitHubForge {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Clone, Copy)]
enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl GitHubForge {
    /// `base_url` overrides the public API host (GitHub Enterprise).
    pub fn new(token: impl Into<String>, base_url: Option<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "token",
                None,
                "Forge token is empty",
            ));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("reposweep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::internal_unexpected(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            token,
        })
    }

    fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> GatewayResult<(u16, Value)> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let mut request = match method {
                Method::Get => self.client.get(&url),
                Method::Post => self.client.post(&url),
                Method::Put => self.client.put(&url),
                Method::Delete => self.client.delete(&url),
            };
            request = request
                .header("Authorization", format!("Bearer {}", self.token))
                .header("Accept", "application/vnd.github+json");
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send() {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    return Err(GatewayError::Timeout(format!(
                        "Request to {} timed out",
                        path
                    )));
                }
                Err(e) => {
                    return Err(GatewayError::Unknown(format!(
                        "HTTP request failed: {}",
                        e
                    )));
                }
            };

            let status = response.status().as_u16();
            let rate_limited = is_rate_limited(status, &response);
            let retry_after = parse_retry_after(&response);
            let payload = read_json_body(response);

            if rate_limited {
                if attempt < RATE_LIMIT_ATTEMPTS {
                    let delay = retry_after.unwrap_or(1 << attempt);
                    log_status!(
                        "forge",
                        "Rate limited on {}; backing off {}s (attempt {}/{})",
                        path,
                        delay,
                        attempt,
                        RATE_LIMIT_ATTEMPTS
                    );
                    std::thread::sleep(Duration::from_secs(delay));
                    continue;
                }
                return Err(GatewayError::RateLimited(error_message(
                    &payload,
                    "API rate limit exceeded",
                )));
            }

            return Ok((status, payload));
        }
    }

    fn ref_sha(&self, repo: &str, branch: &str) -> GatewayResult<String> {
        let (status, payload) =
            self.execute(Method::Get, &format!("/repos/{}/git/ref/heads/{}", repo, branch), None)?;
        if !is_success(status) {
            return Err(classify(status, &error_message(&payload, "ref lookup failed")));
        }
        payload["object"]["sha"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                GatewayError::Unknown(format!("Ref response for '{}' carried no SHA", branch))
            })
    }

    fn find_open_pull_request(
        &self,
        repo: &str,
        head_branch: &str,
        base_branch: &str,
    ) -> GatewayResult<Option<String>> {
        let owner = repo.split('/').next().unwrap_or(repo);
        let (status, payload) = self.execute(
            Method::Get,
            &format!(
                "/repos/{}/pulls?state=open&head={}:{}&base={}",
                repo, owner, head_branch, base_branch
            ),
            None,
        )?;
        if !is_success(status) {
            return Err(classify(status, &error_message(&payload, "PR lookup failed")));
        }

        Ok(payload
            .as_array()
            .and_then(|pulls| pulls.first())
            .and_then(|pr| pr["html_url"].as_str())
            .map(|url| url.to_string()))
    }
}

impl ContentGateway for GitHubForge {
    fn fetch(&self, repo: &str, path: &str, branch: &str) -> GatewayResult<RemoteFile> {
        let (status, payload) = self.execute(
            Method::Get,
            &format!("/repos/{}/contents/{}?ref={}", repo, path, branch),
            None,
        )?;

        if status == 404 {
            return Err(GatewayError::NotFound(format!(
                "File '{}' not found on branch '{}' of '{}'",
                path, branch, repo
            )));
        }
        if !is_success(status) {
            return Err(classify(status, &error_message(&payload, "fetch failed")));
        }
        if payload.is_array() {
            return Err(GatewayError::Unknown(format!(
                "Path '{}' is a directory, not a file",
                path
            )));
        }

        let sha = payload["sha"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                GatewayError::Unknown(format!("Contents response for '{}' carried no SHA", path))
            })?;
        let content = decode_content(&payload, path)?;

        Ok(RemoteFile { content, sha })
    }

    fn write(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
        sha: Option<&str>,
    ) -> GatewayResult<WrittenFile> {
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content.as_bytes()),
            "branch": branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        let (status, payload) = self.execute(
            Method::Put,
            &format!("/repos/{}/contents/{}", repo, path),
            Some(&body),
        )?;
        if !is_success(status) {
            return Err(classify(status, &error_message(&payload, "write failed")));
        }

        let new_sha = payload["content"]["sha"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                GatewayError::Unknown(format!("Write response for '{}' carried no SHA", path))
            })?;

        Ok(WrittenFile {
            sha: new_sha,
            was_create: status == 201,
        })
    }

    fn delete(
        &self,
        repo: &str,
        path: &str,
        message: &str,
        branch: &str,
        sha: &str,
    ) -> GatewayResult<()> {
        let body = json!({
            "message": message,
            "sha": sha,
            "branch": branch,
        });

        let (status, payload) = self.execute(
            Method::Delete,
            &format!("/repos/{}/contents/{}", repo, path),
            Some(&body),
        )?;
        if !is_success(status) {
            return Err(classify(status, &error_message(&payload, "delete failed")));
        }
        Ok(())
    }
}

impl BranchGateway for GitHubForge {
    fn ensure(&self, repo: &str, new_branch: &str, base_branch: &str) -> GatewayResult<()> {
        let (status, _) = self.execute(
            Method::Get,
            &format!("/repos/{}/git/ref/heads/{}", repo, new_branch),
            None,
        )?;
        if is_success(status) {
            return Ok(());
        }
        if status != 404 {
            return Err(classify(
                status,
                &format!("Could not check branch '{}'", new_branch),
            ));
        }

        let base_sha = self.ref_sha(repo, base_branch).map_err(|e| {
            if e.is_not_found() {
                GatewayError::NotFound(format!(
                    "Base branch '{}' not found in '{}'",
                    base_branch, repo
                ))
            } else {
                e
            }
        })?;

        let body = json!({
            "ref": format!("refs/heads/{}", new_branch),
            "sha": base_sha,
        });
        let (status, payload) =
            self.execute(Method::Post, &format!("/repos/{}/git/refs", repo), Some(&body))?;
        if is_success(status) {
            return Ok(());
        }

        let message = error_message(&payload, "ref creation failed");
        // Lost the existence race: the branch is there, which is all we need.
        if status == 422 && message.contains("already exists") {
            return Ok(());
        }
        Err(classify(status, &message))
    }
}

impl PullRequestGateway for GitHubForge {
    fn create(
        &self,
        repo: &str,
        head_branch: &str,
        base_branch: &str,
        title: &str,
        body: &str,
    ) -> GatewayResult<String> {
        let payload = json!({
            "title": title,
            "body": body,
            "head": head_branch,
            "base": base_branch,
        });

        let (status, response) =
            self.execute(Method::Post, &format!("/repos/{}/pulls", repo), Some(&payload))?;
        if is_success(status) {
            return response["html_url"]
                .as_str()
                .map(|url| url.to_string())
                .ok_or_else(|| {
                    GatewayError::Unknown("PR response carried no html_url".to_string())
                });
        }

        let message = error_message(&response, "PR creation failed");
        if status == 422 && message.contains("already exists") {
            if let Some(url) = self.find_open_pull_request(repo, head_branch, base_branch)? {
                return Ok(url);
            }
        }
        Err(classify(status, &message))
    }
}

impl RepositoryGateway for GitHubForge {
    fn default_branch(&self, repo: &str) -> GatewayResult<String> {
        let (status, payload) = self.execute(Method::Get, &format!("/repos/{}", repo), None)?;
        if !is_success(status) {
            return Err(classify(
                status,
                &error_message(&payload, &format!("Repository '{}' lookup failed", repo)),
            ));
        }
        payload["default_branch"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                GatewayError::Unknown(format!(
                    "Repository '{}' response carried no default branch",
                    repo
                ))
            })
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn is_rate_limited(status: u16, response: &Response) -> bool {
    if status == 429 {
        return true;
    }
    status == 403
        && response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "0")
            .unwrap_or(false)
}

fn parse_retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn read_json_body(response: Response) -> Value {
    response
        .text()
        .ok()
        .and_then(|body| serde_json::from_str(&body).ok())
        .unwrap_or(Value::Null)
}

fn error_message(payload: &Value, fallback: &str) -> String {
    payload["message"]
        .as_str()
        .map(|s| s.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

/// Maps a non-success status to the gateway taxonomy. Rate limiting is
/// detected from headers before this point.
fn classify(status: u16, message: &str) -> GatewayError {
    match status {
        404 => GatewayError::NotFound(message.to_string()),
        401 | 403 => GatewayError::PermissionDenied(message.to_string()),
        409 | 422 => GatewayError::Conflict(message.to_string()),
        429 => GatewayError::RateLimited(message.to_string()),
        _ => GatewayError::Unknown(format!("HTTP {}: {}", status, message)),
    }
}

fn decode_content(payload: &Value, path: &str) -> GatewayResult<String> {
    let encoded = payload["content"].as_str().ok_or_else(|| {
        GatewayError::Unknown(format!(
            "Contents response for '{}' carried no content",
            path
        ))
    })?;

    // The contents API wraps base64 at 60 columns.
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| GatewayError::Unknown(format!("Could not decode '{}': {}", path, e)))?;

    String::from_utf8(bytes)
        .map_err(|e| GatewayError::Unknown(format!("File '{}' is not valid UTF-8: {}", path, e)))
}
