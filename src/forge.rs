use async_trait::async_trait;

use crate::{
    error::RemoteError,
    types::{PullRequest, PullRequestId, Repo, WorkflowRun, WorkflowRunQuery},
};

/// Remote source of pull requests and workflow runs.
///
/// Implemented over the GitHub API by [`crate::GitHub`]; tests supply their
/// own in-memory forges.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Fetches a single pull request with its change counts and head commit.
    async fn pull_request(&self, id: &PullRequestId) -> Result<PullRequest, RemoteError>;

    /// Lists up to `limit` pull request numbers in `repo`, newest first.
    async fn pull_request_numbers(&self, repo: &Repo, limit: usize)
    -> Result<Vec<u64>, RemoteError>;

    /// Fetches the unified diff of a pull request, if it has one.
    async fn pull_request_diff(&self, id: &PullRequestId) -> Result<Option<String>, RemoteError>;

    /// Lists every workflow run in `repo` matching the query's filters.
    async fn workflow_runs(
        &self,
        repo: &Repo,
        query: &WorkflowRunQuery,
    ) -> Result<Vec<WorkflowRun>, RemoteError>;
}
