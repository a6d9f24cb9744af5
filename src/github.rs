use std::process::Command;

use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::{
    Octocrab,
    models::{pulls, workflows},
    params,
};
use tracing::debug;

use crate::{
    error::RemoteError,
    forge::Forge,
    types::{
        PullRequest, PullRequestId, Repo, RunConclusion, RunStatus, WorkflowEvent, WorkflowRun,
        WorkflowRunQuery,
    },
};

pub fn get_github_token() -> Result<String> {
    // Prefer environment variables over gh CLI to avoid subprocess overhead.
    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Ok(token) = std::env::var(var) {
            if !token.trim().is_empty() {
                return Ok(token);
            }
        }
    }

    let output = Command::new("gh")
        .args(["auth", "token"])
        .output()
        .context("Failed to run gh CLI")?;

    if !output.status.success() {
        anyhow::bail!("Failed to get GitHub token from gh CLI. Please run 'gh auth login' first");
    }

    let token = String::from_utf8(output.stdout)?.trim().to_string();

    if token.is_empty() {
        anyhow::bail!("Empty token returned from gh CLI");
    }

    Ok(token)
}

/// [`Forge`] backed by the GitHub REST API.
#[derive(Clone)]
pub struct GitHub {
    octocrab: Octocrab,
}

impl GitHub {
    pub fn new(octocrab: Octocrab) -> Self {
        Self { octocrab }
    }

    /// Creates an authenticated client using available credentials.
    pub fn from_env() -> Result<Self> {
        let token = get_github_token().context("Failed to obtain GitHub authentication token")?;
        let octocrab = Octocrab::builder()
            .personal_token(token)
            .build()
            .context("Failed to create GitHub client")?;
        Ok(Self::new(octocrab))
    }
}

fn convert_pull_request(id: &PullRequestId, pr: pulls::PullRequest) -> PullRequest {
    PullRequest {
        id: id.clone(),
        html_url: pr
            .html_url
            .map(|url| url.to_string())
            .unwrap_or_else(|| format!("https://github.com/{}/pull/{}", id.repo, id.number)),
        changed_files: pr.changed_files.unwrap_or_default(),
        additions: pr.additions.unwrap_or_default(),
        deletions: pr.deletions.unwrap_or_default(),
        head_ref: pr.head.ref_field,
        head_sha: pr.head.sha,
        created_at: pr.created_at,
    }
}

fn convert_run(run: workflows::Run) -> WorkflowRun {
    WorkflowRun {
        id: run.id.into_inner(),
        event: WorkflowEvent::from_api(&run.event),
        status: RunStatus::from_api(&run.status),
        conclusion: run.conclusion.as_deref().map(RunConclusion::from_api),
        head_sha: run.head_sha,
        head_branch: run.head_branch,
    }
}

#[async_trait]
impl Forge for GitHub {
    async fn pull_request(&self, id: &PullRequestId) -> Result<PullRequest, RemoteError> {
        let pr = self
            .octocrab
            .pulls(id.repo.owner(), id.repo.name())
            .get(id.number)
            .await?;
        Ok(convert_pull_request(id, pr))
    }

    async fn pull_request_numbers(
        &self,
        repo: &Repo,
        limit: usize,
    ) -> Result<Vec<u64>, RemoteError> {
        let mut numbers = Vec::new();
        let mut page = self
            .octocrab
            .pulls(repo.owner(), repo.name())
            .list()
            .state(params::State::All)
            .per_page(100u8)
            .send()
            .await?;

        loop {
            numbers.extend(page.items.iter().map(|pr| pr.number));
            if numbers.len() >= limit {
                break;
            }
            match self
                .octocrab
                .get_page::<pulls::PullRequest>(&page.next)
                .await?
            {
                Some(next) => page = next,
                None => break,
            }
        }

        numbers.truncate(limit);
        Ok(numbers)
    }

    async fn pull_request_diff(&self, id: &PullRequestId) -> Result<Option<String>, RemoteError> {
        let diff = self
            .octocrab
            .pulls(id.repo.owner(), id.repo.name())
            .get_diff(id.number)
            .await?;
        Ok(Some(diff).filter(|diff| !diff.is_empty()))
    }

    async fn workflow_runs(
        &self,
        repo: &Repo,
        query: &WorkflowRunQuery,
    ) -> Result<Vec<WorkflowRun>, RemoteError> {
        // The `status` parameter accepts a conclusion as well; a failure
        // conclusion implies a completed run.
        let first = self
            .octocrab
            .workflows(repo.owner(), repo.name())
            .list_all_runs()
            .branch(query.branch.clone())
            .event(query.event.as_str())
            .status(query.conclusion.as_str())
            .per_page(100u8)
            .send()
            .await?;

        let runs = self.octocrab.all_pages(first).await?;
        debug!(
            repo = %repo,
            branch = %query.branch,
            count = runs.len(),
            "Fetched workflow runs"
        );

        Ok(runs.into_iter().map(convert_run).collect())
    }
}
