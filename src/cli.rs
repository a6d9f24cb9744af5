use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

use crate::{
    cache::PatchCache,
    forge::Forge,
    predicates::{
        AllOf, PullRequestPredicate, RemoteContext, breaks_build,
        changes_only_dependency_version_in_pom_xml, created_before,
    },
    query::QuerySpec,
    retry::RetryPolicy,
    types::{PullRequestId, Repo},
};

/// How matching pull requests are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Normal,
    Quiet,
    Json,
}

/// Predicates selected on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub dependency_bump: bool,
    pub breaks_build: bool,
    pub created_before: Option<DateTime<Utc>>,
}

impl Criteria {
    /// Builds the conjunction of the selected predicates. Cheap local checks
    /// run before the ones that call the forge.
    pub fn into_predicate(
        self,
        forge: Arc<dyn Forge>,
        cache: Arc<dyn PatchCache>,
        remote: RemoteContext,
    ) -> AllOf {
        let mut out: Vec<Box<dyn PullRequestPredicate>> = Vec::new();
        if let Some(cutoff) = self.created_before {
            out.push(Box::new(created_before(cutoff)));
        }
        if self.dependency_bump {
            out.push(Box::new(changes_only_dependency_version_in_pom_xml(
                cache,
                remote.clone(),
            )));
        }
        if self.breaks_build {
            out.push(Box::new(breaks_build(forge, remote)));
        }
        AllOf::new(out)
    }
}

/// A fully validated `filter` invocation.
#[derive(Debug, Clone)]
pub struct FilterRequest {
    pub query: QuerySpec,
    pub criteria: Criteria,
    pub retry: RetryPolicy,
    pub display: DisplayMode,
}

/// A fully validated `partition-repos` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRequest {
    pub input: PathBuf,
    pub matched: PathBuf,
    pub other: PathBuf,
    pub checked_prefix: String,
}

#[derive(Debug, Clone)]
pub enum Invocation {
    Filter(FilterRequest),
    PartitionRepos(PartitionRequest),
}

#[derive(Args, Debug, Clone, Default)]
struct PredicateArgs {
    /// Only PRs that change a single dependency <version> line in pom.xml
    #[arg(long = "dependency-bump", help_heading = "Predicates")]
    pub dependency_bump: bool,

    /// Only PRs whose head commit has a failed pull_request workflow run
    #[arg(long = "breaks-build", help_heading = "Predicates")]
    pub breaks_build: bool,

    /// Only PRs created strictly before DATE (RFC 3339 or YYYY-MM-DD, UTC)
    #[arg(long = "created-before", help_heading = "Predicates", value_name = "DATE")]
    pub created_before: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct RetryArgs {
    /// Attempts per remote call before giving up on server errors
    #[arg(long = "max-attempts", default_value_t = 3, value_name = "N", help_heading = "Retry")]
    pub max_attempts: u32,

    /// Backoff unit in seconds; attempt N waits N times this long
    #[arg(long = "base-delay", default_value_t = 1.0, value_name = "SECS", help_heading = "Retry")]
    pub base_delay: f64,
}

#[derive(Args, Debug, Clone)]
struct FilterArgs {
    /// GitHub repository in format 'owner/repo' (required when using numeric PR arguments or no PR arguments)
    #[arg(short = 'r', long = "repo", value_name = "OWNER/REPO")]
    pub repo: Option<String>,

    /// PR-NUMBER|PR-URL ...
    pub prs: Vec<String>,

    #[command(flatten)]
    pub predicates: PredicateArgs,

    #[command(flatten)]
    pub retry: RetryArgs,

    /// Limit the number of PRs listed from the repository
    #[arg(short = 'L', long, default_value = "100", value_name = "NUM")]
    pub limit: usize,

    /// Number of PRs evaluated concurrently
    #[arg(short = 'j', long, default_value = "4", value_name = "NUM")]
    pub concurrency: usize,

    /// Print PR numbers only
    #[arg(short = 'q', long, conflicts_with = "json")]
    pub quiet: bool,

    /// Print matching PRs as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
struct PartitionArgs {
    /// JSON object mapping repository names to their metadata
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output for entries never checked or last checked under the prefix
    #[arg(long, value_name = "FILE")]
    pub matched: PathBuf,

    /// Output for every other entry
    #[arg(long, value_name = "FILE")]
    pub other: PathBuf,

    /// Prefix of lastCheckedAt that marks an entry as due
    #[arg(long = "checked-prefix", default_value = "2023", value_name = "PREFIX")]
    pub checked_prefix: String,
}

#[derive(Subcommand, Debug, Clone)]
enum CliCommand {
    /// Fetch pull requests and print those matching every selected predicate
    Filter(FilterArgs),

    /// Split a repository index by its lastCheckedAt markers
    PartitionRepos(PartitionArgs),
}

#[derive(Parser, Debug)]
#[command(
    about = "Classify GitHub pull requests: dependency bumps in pom.xml, broken builds, creation cutoffs",
    version
)]
struct CliArgs {
    #[command(subcommand)]
    command: CliCommand,
}

impl FilterArgs {
    pub fn validate(&self) -> Result<()> {
        if self.repo.is_none() && self.prs.is_empty() {
            anyhow::bail!("Must specify --repo, PR URLs, or both");
        }

        if self.prs.iter().any(|pr| !pr.trim().starts_with("https://")) && self.repo.is_none() {
            anyhow::bail!("--repo is required when using PR numbers (not URLs)");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("--max-attempts must be at least 1");
        }

        if !self.retry.base_delay.is_finite() || self.retry.base_delay < 0.0 {
            anyhow::bail!("--base-delay must be a non-negative number of seconds");
        }

        Ok(())
    }
}

/// Parses a cutoff given as RFC 3339 or as a bare date at midnight UTC.
pub fn parse_cutoff(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| {
        format!("Invalid date '{value}'. Supported formats: '2023-06-01', '2023-06-01T12:00:00Z'")
    })?;
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .with_context(|| format!("Invalid date '{value}'"))
}

fn parse_pr_args_to_identifiers(repo: Option<&Repo>, prs: &[String]) -> Result<Vec<PullRequestId>> {
    let mut identifiers = Vec::new();

    for pr in prs {
        let pr = pr.trim();
        if pr.is_empty() {
            continue;
        }
        if pr.starts_with("https://") {
            let (pr_repo, number) = Repo::parse_url(pr)?;
            if let Some(expected) = repo {
                if &pr_repo != expected {
                    anyhow::bail!(
                        "PR URL {} is from {} but --repo specifies {}",
                        pr,
                        pr_repo,
                        expected
                    );
                }
            }
            identifiers.push(PullRequestId::new(pr_repo, number));
        } else {
            let Some(repo) = repo else {
                anyhow::bail!("PR numbers require --repo to be specified");
            };
            let number: u64 = pr
                .parse()
                .with_context(|| format!("Invalid PR number: '{}'", pr))?;
            identifiers.push(PullRequestId::new(repo.clone(), number));
        }
    }

    Ok(identifiers)
}

fn determine_display_mode(args: &FilterArgs) -> DisplayMode {
    match (args.quiet, args.json) {
        (true, _) => DisplayMode::Quiet,
        (_, true) => DisplayMode::Json,
        _ => DisplayMode::Normal,
    }
}

fn create_filter_request(args: FilterArgs) -> Result<FilterRequest> {
    args.validate()?;

    let repo = args
        .repo
        .as_deref()
        .map(|r| Repo::parse(r).with_context(|| format!("Invalid repository format '{}'", r)))
        .transpose()?;

    let prs = parse_pr_args_to_identifiers(repo.as_ref(), &args.prs)?;

    let created_before = args
        .predicates
        .created_before
        .as_deref()
        .map(parse_cutoff)
        .transpose()?;

    let base_delay = Duration::try_from_secs_f64(args.retry.base_delay)
        .context("--base-delay is out of range")?;

    Ok(FilterRequest {
        display: determine_display_mode(&args),
        query: QuerySpec {
            repo,
            prs,
            limit: args.limit,
            concurrency: args.concurrency,
        },
        criteria: Criteria {
            dependency_bump: args.predicates.dependency_bump,
            breaks_build: args.predicates.breaks_build,
            created_before,
        },
        retry: RetryPolicy::new(args.retry.max_attempts, base_delay),
    })
}

/// Parses command-line arguments into a validated invocation.
pub fn parse_args<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = CliArgs::try_parse_from(args)?;
    match cli.command {
        CliCommand::Filter(args) => create_filter_request(args).map(Invocation::Filter),
        CliCommand::PartitionRepos(args) => Ok(Invocation::PartitionRepos(PartitionRequest {
            input: args.input,
            matched: args.matched,
            other: args.other,
            checked_prefix: args.checked_prefix,
        })),
    }
}
