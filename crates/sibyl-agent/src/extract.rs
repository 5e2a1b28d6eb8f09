//! Content extractors.
//!
//! An [`ContentExtractor`] turns an [`ExtractionTarget`] into file contents.
//! Two implementations ship: [`LocalDirExtractor`] walks the local
//! filesystem, [`GithubExtractor`] reads a repository through the GitHub
//! contents API without cloning. The extraction agent picks whichever
//! extractor claims the target via [`ContentExtractor::supports`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{AgentError, Result};

/// Ceiling on bytes read from any single file.
const DEFAULT_MAX_FILE_BYTES: u64 = 64 * 1024;
/// Ceiling on files returned from one extraction.
const DEFAULT_MAX_FILES: usize = 50;
/// Directory recursion limit for local walks.
const DEFAULT_MAX_DEPTH: usize = 10;
/// Budget for one GitHub API request.
const GITHUB_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_RAW_BASE: &str = "https://raw.githubusercontent.com";

// ─────────────────────────────────────────────────────────────────────────────
// Targets and filters
// ─────────────────────────────────────────────────────────────────────────────

/// What an extraction should read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionTarget {
    /// A GitHub-hosted repository.
    Repository { owner: String, repo: String },
    /// A file or directory on the local filesystem.
    LocalPath { path: PathBuf },
}

impl ExtractionTarget {
    /// Parse a canonical repository reference like `github.com/owner/repo`.
    pub fn from_repo_reference(reference: &str) -> Result<Self> {
        let trimmed = reference
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let mut parts = trimmed.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("github.com"), Some(owner), Some(repo))
                if !owner.is_empty() && !repo.is_empty() =>
            {
                Ok(Self::Repository {
                    owner: owner.to_string(),
                    repo: repo.trim_end_matches(".git").to_string(),
                })
            }
            _ => Err(AgentError::extraction(format!(
                "unsupported repository reference: {reference}"
            ))),
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::LocalPath { path: path.into() }
    }
}

impl fmt::Display for ExtractionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository { owner, repo } => write!(f, "github.com/{owner}/{repo}"),
            Self::LocalPath { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Limits applied while gathering files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFilters {
    /// Keep only these extensions (lowercase, no dot). Empty keeps all.
    pub extensions: Vec<String>,
    pub max_file_bytes: u64,
    pub max_files: usize,
}

impl Default for ExtractionFilters {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl ExtractionFilters {
    /// Restrict results to the given extensions.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Whether a path passes the extension filter.
    fn allows_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }
}

/// One extracted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Path relative to the extraction root.
    pub path: String,
    pub content: String,
}

/// Result of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Human-readable name of what was read.
    pub label: String,
    pub files: Vec<ExtractedFile>,
    /// Candidate files left out: over the size cap, binary, unreadable, or
    /// beyond the file-count cap.
    pub skipped: usize,
}

/// Reads file contents out of one kind of target.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this extractor can handle the target.
    fn supports(&self, target: &ExtractionTarget) -> bool;

    /// Gather file contents from the target, honoring the filters.
    async fn extract(
        &self,
        target: &ExtractionTarget,
        filters: &ExtractionFilters,
    ) -> Result<Extraction>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Local filesystem
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts from local files and directories.
#[derive(Debug, Clone)]
pub struct LocalDirExtractor {
    max_depth: usize,
}

impl LocalDirExtractor {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    fn extract_file(&self, path: &Path, filters: &ExtractionFilters) -> Result<Extraction> {
        let label = path.display().to_string();
        let size = path
            .metadata()
            .map_err(|e| AgentError::extraction(format!("cannot stat {label}: {e}")))?
            .len();

        if size > filters.max_file_bytes {
            return Ok(Extraction {
                label,
                files: Vec::new(),
                skipped: 1,
            });
        }

        match read_text(path) {
            Some(content) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| label.clone());
                Ok(Extraction {
                    label,
                    files: vec![ExtractedFile {
                        path: name,
                        content,
                    }],
                    skipped: 0,
                })
            }
            None => Ok(Extraction {
                label,
                files: Vec::new(),
                skipped: 1,
            }),
        }
    }

    fn extract_dir(&self, root: &Path, filters: &ExtractionFilters) -> Extraction {
        let mut files = Vec::new();
        let mut skipped = 0;

        let walker = WalkDir::new(root)
            .max_depth(self.max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() || !filters.allows_extension(path) {
                continue;
            }

            if files.len() >= filters.max_files {
                skipped += 1;
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
            if size > filters.max_file_bytes {
                skipped += 1;
                continue;
            }

            match read_text(path) {
                Some(content) => {
                    let display_path = path
                        .strip_prefix(root)
                        .unwrap_or(path)
                        .to_string_lossy()
                        .to_string();
                    files.push(ExtractedFile {
                        path: display_path,
                        content,
                    });
                }
                None => skipped += 1,
            }
        }

        Extraction {
            label: root.display().to_string(),
            files,
            skipped,
        }
    }
}

impl Default for LocalDirExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for LocalDirExtractor {
    fn name(&self) -> &str {
        "local"
    }

    fn supports(&self, target: &ExtractionTarget) -> bool {
        matches!(target, ExtractionTarget::LocalPath { .. })
    }

    async fn extract(
        &self,
        target: &ExtractionTarget,
        filters: &ExtractionFilters,
    ) -> Result<Extraction> {
        let ExtractionTarget::LocalPath { path } = target else {
            return Err(AgentError::extraction(format!(
                "local extractor cannot handle {target}"
            )));
        };

        if !path.exists() {
            return Err(AgentError::extraction(format!(
                "path does not exist: {}",
                path.display()
            )));
        }

        let extraction = if path.is_file() {
            self.extract_file(path, filters)?
        } else {
            self.extract_dir(path, filters)
        };

        debug!(
            target = %target,
            files = extraction.files.len(),
            skipped = extraction.skipped,
            "Local extraction finished"
        );
        Ok(extraction)
    }
}

/// Entries below the walk root whose name starts with a dot are pruned.
fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Read a file as text. Returns None for binary or unreadable files.
fn read_text(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    if bytes.contains(&0) {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// GitHub
// ─────────────────────────────────────────────────────────────────────────────

/// Reads repository files through the GitHub API, no clone involved.
pub struct GithubExtractor {
    client: reqwest::Client,
    api_base: String,
    raw_base: String,
    token: Option<String>,
}

impl GithubExtractor {
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(GITHUB_HTTP_TIMEOUT)
            .user_agent("sibyl")
            .build()
            .map_err(|e| AgentError::execution(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: GITHUB_API_BASE.to_string(),
            raw_base: GITHUB_RAW_BASE.to_string(),
            token,
        })
    }

    /// Point at a different API host (GitHub Enterprise, test server).
    pub fn with_api_base(mut self, api: impl Into<String>, raw: impl Into<String>) -> Self {
        self.api_base = api.into();
        self.raw_base = raw.into();
        self
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| AgentError::extraction(format!("GitHub request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AgentError::extraction(format!("not found: {url}")));
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(AgentError::extraction(
                "GitHub denied the request (rate limit or private repository)".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(AgentError::extraction(format!(
                "GitHub returned HTTP {status} for {url}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AgentError::extraction(format!("unexpected GitHub response: {e}")))
    }

    async fn default_branch(&self, owner: &str, repo: &str) -> Result<String> {
        let url = format!("{}/repos/{owner}/{repo}", self.api_base);
        let info: RepoInfo = self.fetch_json(&url).await?;
        Ok(info.default_branch)
    }

    async fn list_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<TreeResponse> {
        let url = format!(
            "{}/repos/{owner}/{repo}/git/trees/{branch}?recursive=1",
            self.api_base
        );
        self.fetch_json(&url).await
    }

    async fn fetch_raw(&self, owner: &str, repo: &str, branch: &str, path: &str) -> Result<String> {
        let url = format!("{}/{owner}/{repo}/{branch}/{path}", self.raw_base);
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::extraction(format!("GitHub request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AgentError::extraction(format!(
                "GitHub returned HTTP {} for {path}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| AgentError::extraction(format!("failed to read {path}: {e}")))
    }
}

#[async_trait]
impl ContentExtractor for GithubExtractor {
    fn name(&self) -> &str {
        "github"
    }

    fn supports(&self, target: &ExtractionTarget) -> bool {
        matches!(target, ExtractionTarget::Repository { .. })
    }

    async fn extract(
        &self,
        target: &ExtractionTarget,
        filters: &ExtractionFilters,
    ) -> Result<Extraction> {
        let ExtractionTarget::Repository { owner, repo } = target else {
            return Err(AgentError::extraction(format!(
                "github extractor cannot handle {target}"
            )));
        };

        let branch = self.default_branch(owner, repo).await?;
        let tree = self.list_tree(owner, repo, &branch).await?;
        let (picked, mut skipped) = pick_blobs(&tree.tree, filters);

        let mut files = Vec::new();
        for entry in picked {
            match self.fetch_raw(owner, repo, &branch, &entry.path).await {
                Ok(content) if content.contains('\0') => skipped += 1,
                Ok(content) => files.push(ExtractedFile {
                    path: entry.path.clone(),
                    content,
                }),
                Err(err) => {
                    warn!(path = %entry.path, error = %err, "Skipping unreadable repository file");
                    skipped += 1;
                }
            }
        }

        debug!(
            target = %target,
            branch = %branch,
            files = files.len(),
            skipped,
            "Repository extraction finished"
        );
        Ok(Extraction {
            label: target.to_string(),
            files,
            skipped,
        })
    }
}

/// Select tree blobs that pass the filters, counting what gets left out.
fn pick_blobs<'a>(
    tree: &'a [TreeEntry],
    filters: &ExtractionFilters,
) -> (Vec<&'a TreeEntry>, usize) {
    let mut picked = Vec::new();
    let mut skipped = 0;

    for entry in tree {
        if entry.kind != "blob" {
            continue;
        }
        let path = Path::new(&entry.path);
        if is_hidden_repo_path(path) || !filters.allows_extension(path) {
            continue;
        }
        if entry.size.unwrap_or(u64::MAX) > filters.max_file_bytes {
            skipped += 1;
            continue;
        }
        if picked.len() >= filters.max_files {
            skipped += 1;
            continue;
        }
        picked.push(entry);
    }

    (picked, skipped)
}

/// Any dot-prefixed component hides a repository path.
fn is_hidden_repo_path(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    size: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
