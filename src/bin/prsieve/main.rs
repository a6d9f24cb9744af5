mod display;

use std::sync::Arc;

use anyhow::Context;
use prsieve::{
    FilterRequest, Forge, GitHub, InMemoryPatchCache, Invocation, PartitionRequest,
    RemoteContext, filter_pull_requests, parse_args, partition_file,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use display::display_prs;

fn handle_clap_help_version(clap_err: &clap::Error) -> ! {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            std::process::exit(0);
        }
        _ => {
            eprint!("{clap_err}");
            std::process::exit(2);
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Cancels `token` on the first Ctrl-C so in-flight retries give up.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning pending retries");
            token.cancel();
        }
    });
}

async fn run_filter(request: FilterRequest) -> anyhow::Result<()> {
    let forge: Arc<dyn Forge> = Arc::new(GitHub::from_env()?);
    let cache = Arc::new(InMemoryPatchCache::new(forge.clone()));
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let remote = RemoteContext::new(request.retry, cancel.clone());
    let predicate = request
        .criteria
        .into_predicate(forge.clone(), cache, remote.clone());
    if predicate.is_empty() {
        warn!("No predicates selected, every pull request matches");
    } else {
        info!(predicates = ?predicate.names(), "Filtering");
    }

    let matched = filter_pull_requests(&request.query, forge.as_ref(), &predicate, &remote).await?;
    display_prs(&matched, request.display, &mut std::io::stdout())?;

    // Results after an interrupt may be conservative; report it.
    if cancel.is_cancelled() {
        anyhow::bail!("Interrupted; results may be incomplete");
    }
    Ok(())
}

fn run_partition(request: PartitionRequest) -> anyhow::Result<()> {
    let result = partition_file(
        &request.input,
        &request.matched,
        &request.other,
        &request.checked_prefix,
    )
    .context("Failed to partition repositories")?;

    println!("Partitioned {}:", request.input.display());
    println!(
        "  - {} entries never checked or checked under '{}' -> {}",
        result.matched.len(),
        request.checked_prefix,
        request.matched.display()
    );
    println!(
        "  - {} other entries -> {}",
        result.other.len(),
        request.other.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let invocation = match parse_args(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                handle_clap_help_version(clap_err);
            } else {
                return Err(err);
            }
        }
    };

    match invocation {
        Invocation::Filter(request) => run_filter(request).await,
        Invocation::PartitionRepos(request) => run_partition(request),
    }
}
