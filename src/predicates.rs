//! Composable predicates over pull requests.
//!
//! Each predicate is a value implementing [`PullRequestPredicate`]; the free
//! functions below build configured instances. Predicates that make extra
//! remote calls run them under a [`RetryPolicy`] and answer `false` when the
//! forge keeps failing with server errors or the evaluation is cancelled.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    cache::PatchCache,
    correlate::run_for_commit,
    forge::Forge,
    patterns::{changes_dependency_version, touches_manifest},
    retry::RetryPolicy,
    types::{PullRequest, WorkflowRunQuery},
};

/// A boolean test over a pull request.
///
/// `Ok(false)` may be a conservative answer after repeated transient
/// failures; `Err` means the answer could not be determined at all.
#[async_trait]
pub trait PullRequestPredicate: Send + Sync {
    fn name(&self) -> &'static str;

    async fn evaluate(&self, pr: &PullRequest) -> anyhow::Result<bool>;
}

/// Retry settings and cancellation shared by predicates that call the forge.
#[derive(Debug, Clone, Default)]
pub struct RemoteContext {
    pub retry: RetryPolicy,
    pub cancel: CancellationToken,
}

impl RemoteContext {
    pub fn new(retry: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { retry, cancel }
    }
}

/// Matches pull requests whose only change is one dependency `<version>`
/// line in a `pom.xml`.
pub struct ChangesOnlyDependencyVersionInPomXml {
    cache: Arc<dyn PatchCache>,
    remote: RemoteContext,
}

pub fn changes_only_dependency_version_in_pom_xml(
    cache: Arc<dyn PatchCache>,
    remote: RemoteContext,
) -> ChangesOnlyDependencyVersionInPomXml {
    ChangesOnlyDependencyVersionInPomXml { cache, remote }
}

#[async_trait]
impl PullRequestPredicate for ChangesOnlyDependencyVersionInPomXml {
    fn name(&self) -> &'static str {
        "dependency-bump"
    }

    async fn evaluate(&self, pr: &PullRequest) -> anyhow::Result<bool> {
        if pr.changed_files != 1 || pr.additions != 1 || pr.deletions != 1 {
            return Ok(false);
        }

        let cache = self.cache.as_ref();
        let patch = self
            .remote
            .retry
            .run(&pr.html_url, &self.remote.cancel, None, move || async move {
                cache.get(pr).await.map(|patch| Some(patch.unwrap_or_default()))
            })
            .await
            .with_context(|| format!("Failed to fetch diff for {}", pr.html_url))?;

        let Some(patch) = patch else {
            return Ok(false);
        };

        if touches_manifest(&patch) && changes_dependency_version(&patch) {
            return Ok(true);
        }

        // Rejected pull requests are never inspected again.
        self.cache.remove(&pr.id);
        debug!(pr = %pr.id, "Diff is not a dependency version bump");
        Ok(false)
    }
}

/// Matches pull requests whose current head commit has a failed
/// pull-request workflow run.
pub struct BreaksBuild {
    forge: Arc<dyn Forge>,
    remote: RemoteContext,
}

pub fn breaks_build(forge: Arc<dyn Forge>, remote: RemoteContext) -> BreaksBuild {
    BreaksBuild { forge, remote }
}

#[async_trait]
impl PullRequestPredicate for BreaksBuild {
    fn name(&self) -> &'static str {
        "breaks-build"
    }

    async fn evaluate(&self, pr: &PullRequest) -> anyhow::Result<bool> {
        let query = WorkflowRunQuery::failed_pull_request_runs(&pr.head_ref);
        let forge = self.forge.as_ref();
        let query = &query;

        self.remote
            .retry
            .run(&pr.html_url, &self.remote.cancel, false, move || async move {
                let runs = forge.workflow_runs(pr.repo(), query).await?;
                let failed = run_for_commit(&runs, query, &pr.head_sha);
                if let Some(run) = failed {
                    debug!(pr = %pr.id, run_id = run.id, sha = %pr.head_sha, "Found failed run");
                }
                Ok(failed.is_some())
            })
            .await
            .with_context(|| format!("Failed to list workflow runs for {}", pr.html_url))
    }
}

/// Matches pull requests created strictly before a cutoff.
#[derive(Debug, Clone)]
pub struct CreatedBefore {
    cutoff: DateTime<Utc>,
}

pub fn created_before(cutoff: DateTime<Utc>) -> CreatedBefore {
    CreatedBefore { cutoff }
}

#[async_trait]
impl PullRequestPredicate for CreatedBefore {
    fn name(&self) -> &'static str {
        "created-before"
    }

    async fn evaluate(&self, pr: &PullRequest) -> anyhow::Result<bool> {
        let created_at = pr
            .created_at
            .with_context(|| format!("Pull request {} has no creation time", pr.html_url))?;
        Ok(created_at < self.cutoff)
    }
}

/// Conjunction of predicates, evaluated in order and stopping at the first
/// `false`.
#[derive(Default)]
pub struct AllOf {
    predicates: Vec<Box<dyn PullRequestPredicate>>,
}

impl AllOf {
    pub fn new(predicates: Vec<Box<dyn PullRequestPredicate>>) -> Self {
        Self { predicates }
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.predicates.iter().map(|p| p.name()).collect()
    }
}

#[async_trait]
impl PullRequestPredicate for AllOf {
    fn name(&self) -> &'static str {
        "all-of"
    }

    async fn evaluate(&self, pr: &PullRequest) -> anyhow::Result<bool> {
        for predicate in &self.predicates {
            if !predicate.evaluate(pr).await? {
                debug!(pr = %pr.id, predicate = predicate.name(), "Rejected");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
