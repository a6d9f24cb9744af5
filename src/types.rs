use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Error returned when a repository reference cannot be parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepoError {
    #[error("repository must be in format 'owner/repo', got: '{0}'")]
    Format(String),
    #[error("URL must be a GitHub pull request URL, got: '{0}'")]
    NotGitHub(String),
    #[error("invalid pull request number in URL: '{0}'")]
    Number(String),
}

/// A GitHub repository identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Repo {
    owner: String,
    name: String,
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, RepoError> {
        let owner = owner.into();
        let name = name.into();
        if owner.is_empty() || name.is_empty() || owner.contains('/') || name.contains('/') {
            return Err(RepoError::Format(format!("{owner}/{name}")));
        }
        Ok(Self { owner, name })
    }

    /// Parses an `owner/repo` string.
    pub fn parse(repo: &str) -> Result<Self, RepoError> {
        let parts: Vec<&str> = repo.trim().split('/').collect();
        match parts.as_slice() {
            [owner, name] => Self::new(*owner, *name).map_err(|_| RepoError::Format(repo.into())),
            _ => Err(RepoError::Format(repo.to_string())),
        }
    }

    /// Parses a `https://github.com/owner/repo/pull/123` URL into the
    /// repository and pull request number.
    pub fn parse_url(url_str: &str) -> Result<(Self, u64), RepoError> {
        let url =
            url::Url::parse(url_str).map_err(|_| RepoError::NotGitHub(url_str.to_string()))?;

        if url.host_str() != Some("github.com") {
            return Err(RepoError::NotGitHub(url_str.to_string()));
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        // ["owner", "repo", "pull", "123"]
        match segments.as_slice() {
            [owner, name, "pull", number] => {
                let repo = Self::new(*owner, *name)
                    .map_err(|_| RepoError::NotGitHub(url_str.to_string()))?;
                let number = number
                    .parse()
                    .map_err(|_| RepoError::Number(url_str.to_string()))?;
                Ok((repo, number))
            }
            _ => Err(RepoError::NotGitHub(url_str.to_string())),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Identity of a pull request; the key of the patch cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PullRequestId {
    pub repo: Repo,
    pub number: u64,
}

impl PullRequestId {
    pub fn new(repo: Repo, number: u64) -> Self {
        Self { repo, number }
    }
}

impl fmt::Display for PullRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// Snapshot of a pull request as observed when it was fetched.
#[derive(Debug, Clone, Serialize)]
pub struct PullRequest {
    pub id: PullRequestId,
    pub html_url: String,
    pub changed_files: u64,
    pub additions: u64,
    pub deletions: u64,
    pub head_ref: String,
    pub head_sha: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    pub fn repo(&self) -> &Repo {
        &self.id.repo
    }

    pub fn number(&self) -> u64 {
        self.id.number
    }
}

/// Event that triggered a workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    PullRequest,
    Push,
    Other(String),
}

impl WorkflowEvent {
    pub fn from_api(event: &str) -> Self {
        match event {
            "pull_request" => WorkflowEvent::PullRequest,
            "push" => WorkflowEvent::Push,
            other => WorkflowEvent::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WorkflowEvent::PullRequest => "pull_request",
            WorkflowEvent::Push => "push",
            WorkflowEvent::Other(other) => other,
        }
    }
}

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Other(String),
}

impl RunStatus {
    pub fn from_api(status: &str) -> Self {
        match status {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "completed" => RunStatus::Completed,
            other => RunStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Other(other) => other,
        }
    }
}

/// Outcome of a completed workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunConclusion {
    Success,
    Failure,
    Cancelled,
    TimedOut,
    Skipped,
    Other(String),
}

impl RunConclusion {
    pub fn from_api(conclusion: &str) -> Self {
        match conclusion {
            "success" => RunConclusion::Success,
            "failure" => RunConclusion::Failure,
            "cancelled" => RunConclusion::Cancelled,
            "timed_out" => RunConclusion::TimedOut,
            "skipped" => RunConclusion::Skipped,
            other => RunConclusion::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunConclusion::Success => "success",
            RunConclusion::Failure => "failure",
            RunConclusion::Cancelled => "cancelled",
            RunConclusion::TimedOut => "timed_out",
            RunConclusion::Skipped => "skipped",
            RunConclusion::Other(other) => other,
        }
    }
}

/// One execution of a GitHub Actions workflow.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub id: u64,
    pub event: WorkflowEvent,
    pub status: RunStatus,
    pub conclusion: Option<RunConclusion>,
    pub head_sha: String,
    pub head_branch: String,
}

/// Filters sent to the forge when listing workflow runs.
///
/// The listing API has no head commit filter, so results still need
/// correlating against a specific SHA afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRunQuery {
    pub branch: String,
    pub event: WorkflowEvent,
    pub status: RunStatus,
    pub conclusion: RunConclusion,
}

impl WorkflowRunQuery {
    /// Completed, failed runs triggered by a pull request event on `branch`.
    pub fn failed_pull_request_runs(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            event: WorkflowEvent::PullRequest,
            status: RunStatus::Completed,
            conclusion: RunConclusion::Failure,
        }
    }

    pub fn matches(&self, run: &WorkflowRun) -> bool {
        run.event == self.event
            && run.status == self.status
            && run.conclusion.as_ref() == Some(&self.conclusion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_parse() {
        let repo = Repo::parse("apache/maven").unwrap();
        assert_eq!(repo.owner(), "apache");
        assert_eq!(repo.name(), "maven");
        assert_eq!(repo.to_string(), "apache/maven");

        assert!(Repo::parse("apache").is_err());
        assert!(Repo::parse("a/b/c").is_err());
        assert!(Repo::parse("/maven").is_err());
        assert!(Repo::parse("").is_err());
    }

    #[test]
    fn test_repo_parse_url() {
        let (repo, number) = Repo::parse_url("https://github.com/apache/maven/pull/42").unwrap();
        assert_eq!(repo, Repo::parse("apache/maven").unwrap());
        assert_eq!(number, 42);

        assert!(matches!(
            Repo::parse_url("https://gitlab.com/apache/maven/pull/42"),
            Err(RepoError::NotGitHub(_))
        ));
        assert!(matches!(
            Repo::parse_url("https://github.com/apache/maven/issues/42"),
            Err(RepoError::NotGitHub(_))
        ));
        assert!(matches!(
            Repo::parse_url("https://github.com/apache/maven/pull/abc"),
            Err(RepoError::Number(_))
        ));
    }

    #[test]
    fn test_api_enums_roundtrip_unknown_values() {
        assert_eq!(RunStatus::from_api("completed"), RunStatus::Completed);
        assert_eq!(RunStatus::from_api("waiting").as_str(), "waiting");
        assert_eq!(RunConclusion::from_api("failure"), RunConclusion::Failure);
        assert_eq!(RunConclusion::from_api("stale").as_str(), "stale");
        assert_eq!(
            WorkflowEvent::from_api("pull_request"),
            WorkflowEvent::PullRequest
        );
    }
}
