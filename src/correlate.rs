use crate::types::{WorkflowRun, WorkflowRunQuery};

/// Finds the run in `runs` that matches `query` and was built from
/// `head_sha`.
///
/// The runs listing can only filter by branch, so a branch that has been
/// force-pushed or updated reports failures for older commits too. Only an
/// exact SHA match counts.
pub fn run_for_commit<'a>(
    runs: &'a [WorkflowRun],
    query: &WorkflowRunQuery,
    head_sha: &str,
) -> Option<&'a WorkflowRun> {
    runs.iter()
        .find(|run| query.matches(run) && run.head_sha == head_sha)
}
