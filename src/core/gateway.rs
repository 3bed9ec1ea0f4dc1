//! Gateway traits over the remote forge.
//!
//! The pipeline only ever talks to the forge through these traits; the
//! production implementation lives in [`crate::forge`], and tests substitute
//! an in-memory double.

use serde::{Deserialize, Serialize};

/// A repository selected for a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Full name in "owner/name" form.
    pub full_name: String,
    /// Default branch, when already known to the caller. Resolved through
    /// [`RepositoryGateway::default_branch`] otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

impl Repository {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            default_branch: None,
        }
    }

    /// Short name: the segment after the owner.
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.full_name)
    }
}

/// Typed failure from a forge call, already classified by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    NotFound(String),
    PermissionDenied(String),
    RateLimited(String),
    Conflict(String),
    Timeout(String),
    Unknown(String),
}

impl GatewayError {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::NotFound(_) => "not_found",
            GatewayError::PermissionDenied(_) => "permission_denied",
            GatewayError::RateLimited(_) => "rate_limited",
            GatewayError::Conflict(_) => "conflict",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Unknown(_) => "unknown",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            GatewayError::NotFound(m)
            | GatewayError::PermissionDenied(m)
            | GatewayError::RateLimited(m)
            | GatewayError::Conflict(m)
            | GatewayError::Timeout(m)
            | GatewayError::Unknown(m) => m,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for GatewayError {}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// A file fetched from the forge.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub content: String,
    pub sha: String,
}

/// Result of a contents write.
#[derive(Debug, Clone)]
pub struct WrittenFile {
    pub sha: String,
    pub was_create: bool,
}

pub trait ContentGateway: Send + Sync {
    fn fetch(&self, repo: &str, path: &str, branch: &str) -> GatewayResult<RemoteFile>;

    /// Writes `content` at `path` on `branch`. With `sha` this is an update of
    /// that blob; without it the forge treats the write as a create and
    /// rejects it if the path already exists.
    fn write(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
        sha: Option<&str>,
    ) -> GatewayResult<WrittenFile>;

    fn delete(
        &self,
        repo: &str,
        path: &str,
        message: &str,
        branch: &str,
        sha: &str,
    ) -> GatewayResult<()>;
}

pub trait BranchGateway: Send + Sync {
    /// Creates `new_branch` from `base_branch`. Idempotent: an existing
    /// branch is reused without error.
    fn ensure(&self, repo: &str, new_branch: &str, base_branch: &str) -> GatewayResult<()>;
}

pub trait PullRequestGateway: Send + Sync {
    /// Opens a pull request and returns its URL. An already-open pull request
    /// for the same head/base pair is returned as-is.
    fn create(
        &self,
        repo: &str,
        head_branch: &str,
        base_branch: &str,
        title: &str,
        body: &str,
    ) -> GatewayResult<String>;
}

pub trait RepositoryGateway: Send + Sync {
    fn default_branch(&self, repo: &str) -> GatewayResult<String>;
}

/// Union of the four gateway capabilities, for `&dyn` use at the pipeline
/// boundary.
pub trait ForgeGateway:
    ContentGateway + BranchGateway + PullRequestGateway + RepositoryGateway
{
}

impl<T> ForgeGateway for T where
    T: ContentGateway + BranchGateway + PullRequestGateway + RepositoryGateway
{
}
