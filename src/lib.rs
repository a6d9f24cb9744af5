//! prsieve: classify GitHub pull requests with composable predicates.
//!
//! Predicates answer questions such as "does this PR only bump one
//! dependency version in a pom.xml", "did it break a workflow run" or "was it
//! created before a cutoff". Those that need extra remote data fetch it
//! through a [`Forge`], retrying transient server errors under a
//! [`RetryPolicy`], and cache diff text in a [`PatchCache`].

pub mod cache;
pub mod cli;
pub mod correlate;
pub mod error;
pub mod forge;
pub mod github;
pub mod partition;
pub mod patterns;
pub mod predicates;
pub mod query;
pub mod retry;
pub mod types;

pub use cache::{InMemoryPatchCache, PatchCache};
pub use cli::{Criteria, DisplayMode, FilterRequest, Invocation, PartitionRequest, parse_args};
pub use error::RemoteError;
pub use forge::Forge;
pub use github::GitHub;
pub use partition::{Partition, partition_file};
pub use predicates::{
    AllOf, BreaksBuild, ChangesOnlyDependencyVersionInPomXml, CreatedBefore,
    PullRequestPredicate, RemoteContext, breaks_build, changes_only_dependency_version_in_pom_xml,
    created_before,
};
pub use query::{QuerySpec, filter_pull_requests};
pub use retry::RetryPolicy;
pub use types::{
    PullRequest, PullRequestId, Repo, RepoError, RunConclusion, RunStatus, WorkflowEvent,
    WorkflowRun, WorkflowRunQuery,
};
