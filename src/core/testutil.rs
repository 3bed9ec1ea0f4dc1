//! In-memory forge gateway for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::gateway::{
    BranchGateway, ContentGateway, GatewayError, GatewayResult, PullRequestGateway, RemoteFile,
    RepositoryGateway, WrittenFile,
};

#[derive(Debug, Clone)]
pub(crate) struct PrRecord {
    pub repo: String,
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub url: String,
}

#[derive(Default)]
struct State {
    /// (repo, branch) -> path -> (content, sha)
    files: HashMap<(String, String), HashMap<String, (String, String)>>,
    branches: HashSet<(String, String)>,
    prs: Vec<PrRecord>,
    writes: u32,
}

/// In-memory `ForgeGateway` double. The configured default branch implicitly
/// exists for every repository; other branches exist once seeded or ensured.
pub(crate) struct InMemoryForge {
    default_branch: String,
    state: Mutex<State>,
    next_sha: AtomicU64,
    fail_branch_repos: Mutex<HashSet<String>>,
    fail_pr_repos: Mutex<HashSet<String>>,
    panic_fetch_paths: Mutex<HashSet<String>>,
}

impl InMemoryForge {
    pub fn new(default_branch: &str) -> Self {
        Self {
            default_branch: default_branch.to_string(),
            state: Mutex::new(State::default()),
            next_sha: AtomicU64::new(1),
            fail_branch_repos: Mutex::new(HashSet::new()),
            fail_pr_repos: Mutex::new(HashSet::new()),
            panic_fetch_paths: Mutex::new(HashSet::new()),
        }
    }

    fn sha(&self) -> String {
        format!("sha-{}", self.next_sha.fetch_add(1, Ordering::SeqCst))
    }

    fn branch_exists(&self, state: &State, repo: &str, branch: &str) -> bool {
        branch == self.default_branch
            || state
                .branches
                .contains(&(repo.to_string(), branch.to_string()))
    }

    pub fn put_file(&self, repo: &str, branch: &str, path: &str, content: &str) {
        let sha = self.sha();
        let mut state = self.state.lock().unwrap();
        if branch != self.default_branch {
            state
                .branches
                .insert((repo.to_string(), branch.to_string()));
        }
        state
            .files
            .entry((repo.to_string(), branch.to_string()))
            .or_default()
            .insert(path.to_string(), (content.to_string(), sha));
    }

    pub fn file_content(&self, repo: &str, branch: &str, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(&(repo.to_string(), branch.to_string()))
            .and_then(|files| files.get(path))
            .map(|(content, _)| content.clone())
    }

    pub fn has_branch(&self, repo: &str, branch: &str) -> bool {
        let state = self.state.lock().unwrap();
        self.branch_exists(&state, repo, branch)
    }

    pub fn prs(&self) -> Vec<PrRecord> {
        self.state.lock().unwrap().prs.clone()
    }

    pub fn write_count(&self) -> u32 {
        self.state.lock().unwrap().writes
    }

    pub fn fail_branches_for(&self, repo: &str) {
        self.fail_branch_repos
            .lock()
            .unwrap()
            .insert(repo.to_string());
    }

    pub fn fail_prs_for(&self, repo: &str) {
        self.fail_pr_repos.lock().unwrap().insert(repo.to_string());
    }

    pub fn panic_on_fetch(&self, path: &str) {
        self.panic_fetch_paths
            .lock()
            .unwrap()
            .insert(path.to_string());
    }
}

impl ContentGateway for InMemoryForge {
    fn fetch(&self, repo: &str, path: &str, branch: &str) -> GatewayResult<RemoteFile> {
        if self.panic_fetch_paths.lock().unwrap().contains(path) {
            panic!("injected panic fetching '{}'", path);
        }

        let state = self.state.lock().unwrap();
        if !self.branch_exists(&state, repo, branch) {
            return Err(GatewayError::NotFound(format!(
                "Branch '{}' not found in '{}'",
                branch, repo
            )));
        }

        state
            .files
            .get(&(repo.to_string(), branch.to_string()))
            .and_then(|files| files.get(path))
            .map(|(content, sha)| RemoteFile {
                content: content.clone(),
                sha: sha.clone(),
            })
            .ok_or_else(|| {
                GatewayError::NotFound(format!(
                    "File '{}' not found on branch '{}' of '{}'",
                    path, branch, repo
                ))
            })
    }

    fn write(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        _message: &str,
        branch: &str,
        sha: Option<&str>,
    ) -> GatewayResult<WrittenFile> {
        let new_sha = self.sha();
        let mut state = self.state.lock().unwrap();
        if !self.branch_exists(&state, repo, branch) {
            return Err(GatewayError::NotFound(format!(
                "Branch '{}' not found in '{}'",
                branch, repo
            )));
        }

        let files = state
            .files
            .entry((repo.to_string(), branch.to_string()))
            .or_default();
        let existing = files.get(path).cloned();

        match (sha, &existing) {
            (None, Some(_)) => {
                return Err(GatewayError::Conflict(format!(
                    "'{}' already exists on branch '{}'",
                    path, branch
                )));
            }
            (Some(given), Some((_, current))) if given != current => {
                return Err(GatewayError::Conflict(format!(
                    "SHA mismatch for '{}' on branch '{}'",
                    path, branch
                )));
            }
            (Some(_), None) => {
                return Err(GatewayError::NotFound(format!(
                    "No file at '{}' on branch '{}' for given SHA",
                    path, branch
                )));
            }
            _ => {}
        }

        let was_create = existing.is_none();
        files.insert(path.to_string(), (content.to_string(), new_sha.clone()));
        state.writes += 1;

        Ok(WrittenFile {
            sha: new_sha,
            was_create,
        })
    }

    fn delete(
        &self,
        repo: &str,
        path: &str,
        _message: &str,
        branch: &str,
        sha: &str,
    ) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        let files = state
            .files
            .entry((repo.to_string(), branch.to_string()))
            .or_default();

        match files.get(path) {
            None => Err(GatewayError::NotFound(format!(
                "File '{}' not found on branch '{}'",
                path, branch
            ))),
            Some((_, current)) if current != sha => Err(GatewayError::Conflict(format!(
                "SHA mismatch deleting '{}'",
                path
            ))),
            Some(_) => {
                files.remove(path);
                Ok(())
            }
        }
    }
}

impl BranchGateway for InMemoryForge {
    fn ensure(&self, repo: &str, new_branch: &str, base_branch: &str) -> GatewayResult<()> {
        if self.fail_branch_repos.lock().unwrap().contains(repo) {
            return Err(GatewayError::PermissionDenied(format!(
                "Branch creation denied in '{}'",
                repo
            )));
        }

        let mut state = self.state.lock().unwrap();
        if self.branch_exists(&state, repo, new_branch) {
            return Ok(());
        }
        if !self.branch_exists(&state, repo, base_branch) {
            return Err(GatewayError::NotFound(format!(
                "Base branch '{}' not found in '{}'",
                base_branch, repo
            )));
        }

        let base_files = state
            .files
            .get(&(repo.to_string(), base_branch.to_string()))
            .cloned()
            .unwrap_or_default();
        state
            .branches
            .insert((repo.to_string(), new_branch.to_string()));
        state
            .files
            .insert((repo.to_string(), new_branch.to_string()), base_files);
        Ok(())
    }
}

impl PullRequestGateway for InMemoryForge {
    fn create(
        &self,
        repo: &str,
        head_branch: &str,
        base_branch: &str,
        title: &str,
        body: &str,
    ) -> GatewayResult<String> {
        if self.fail_pr_repos.lock().unwrap().contains(repo) {
            return Err(GatewayError::Unknown(format!(
                "Pull request creation failed in '{}'",
                repo
            )));
        }

        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .prs
            .iter()
            .find(|pr| pr.repo == repo && pr.head == head_branch && pr.base == base_branch)
        {
            return Ok(existing.url.clone());
        }

        let url = format!("https://forge.local/{}/pull/{}", repo, state.prs.len() + 1);
        state.prs.push(PrRecord {
            repo: repo.to_string(),
            head: head_branch.to_string(),
            base: base_branch.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            url: url.clone(),
        });
        Ok(url)
    }
}

impl RepositoryGateway for InMemoryForge {
    fn default_branch(&self, _repo: &str) -> GatewayResult<String> {
        Ok(self.default_branch.clone())
    }
}
