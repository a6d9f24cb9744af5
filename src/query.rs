use anyhow::Context;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info, warn};

use crate::{
    forge::Forge,
    predicates::{PullRequestPredicate, RemoteContext},
    types::{PullRequest, PullRequestId, Repo},
};

/// Which pull requests to inspect and how many at once.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Repository to list pull requests from when `prs` is empty.
    pub repo: Option<Repo>,
    pub prs: Vec<PullRequestId>,
    pub limit: usize,
    pub concurrency: usize,
}

impl QuerySpec {
    async fn targets<F>(
        &self,
        forge: &F,
        remote: &RemoteContext,
    ) -> anyhow::Result<Vec<PullRequestId>>
    where
        F: Forge + ?Sized,
    {
        if !self.prs.is_empty() {
            return Ok(self.prs.clone());
        }

        let repo = self
            .repo
            .as_ref()
            .context("A repository is required when no pull requests are given")?;
        let limit = self.limit;
        let numbers = remote
            .retry
            .run(&repo.to_string(), &remote.cancel, None, move || async move {
                forge.pull_request_numbers(repo, limit).await.map(Some)
            })
            .await
            .with_context(|| format!("Failed to list pull requests in {repo}"))?;

        let Some(numbers) = numbers else {
            warn!(repo = %repo, "Could not list pull requests, nothing to evaluate");
            return Ok(Vec::new());
        };

        Ok(numbers
            .into_iter()
            .map(|number| PullRequestId::new(repo.clone(), number))
            .collect())
    }
}

/// Fetches the pull requests named by `spec` and keeps those `predicate`
/// accepts, in the order they were requested.
///
/// Remote reads run under `remote`'s retry policy. A pull request that still
/// cannot be fetched after retrying is skipped as unmatched; fatal fetch
/// errors and predicate errors abort the whole query.
pub async fn filter_pull_requests<F, P>(
    spec: &QuerySpec,
    forge: &F,
    predicate: &P,
    remote: &RemoteContext,
) -> anyhow::Result<Vec<PullRequest>>
where
    F: Forge + ?Sized,
    P: PullRequestPredicate + ?Sized,
{
    let targets = spec.targets(forge, remote).await?;
    info!(count = targets.len(), "Evaluating pull requests");

    let mut results: Vec<(usize, PullRequest)> = stream::iter(targets.into_iter().enumerate())
        .map(|(index, id)| async move {
            let target = &id;
            let fetched = remote
                .retry
                .run(&id.to_string(), &remote.cancel, None, move || async move {
                    forge.pull_request(target).await.map(Some)
                })
                .await
                .with_context(|| format!("Failed to fetch pull request {id}"))?;

            let Some(pr) = fetched else {
                warn!(pr = %id, "Skipping pull request after repeated server errors");
                return anyhow::Ok(None);
            };

            let matched = predicate.evaluate(&pr).await?;
            debug!(pr = %id, matched, "Evaluated");
            anyhow::Ok(matched.then_some((index, pr)))
        })
        .buffer_unordered(spec.concurrency.max(1))
        .try_filter_map(|result| async move { Ok(result) })
        .try_collect()
        .await?;

    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, pr)| pr).collect())
}
