//! Parallel job fetches for one cycle.

use std::collections::HashMap;

use ghwatch_core::{DataSource, FetchError, Job, Listing, RunId};

/// Fetch the jobs of every run in `run_ids`, at most `concurrency` requests at
/// a time. Every result is collected before returning; the first error aborts
/// the whole batch.
pub fn fetch_jobs<S>(
    source: &S,
    run_ids: &[RunId],
    concurrency: usize,
) -> Result<HashMap<RunId, Listing<Job>>, FetchError>
where
    S: DataSource + Sync + ?Sized,
{
    let mut out = HashMap::with_capacity(run_ids.len());
    if run_ids.is_empty() {
        return Ok(out);
    }

    let concurrency = concurrency.max(1);
    if concurrency == 1 || run_ids.len() == 1 {
        for &run_id in run_ids {
            out.insert(run_id, source.list_jobs(run_id)?);
        }
        return Ok(out);
    }

    for batch in run_ids.chunks(concurrency) {
        let results: Vec<(RunId, Result<Listing<Job>, FetchError>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|&run_id| (run_id, scope.spawn(move || source.list_jobs(run_id))))
                .collect();
            handles
                .into_iter()
                .map(|(run_id, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(FetchError::Transport {
                            url: format!("jobs of run {run_id}"),
                            message: "fetch thread panicked".to_string(),
                        })
                    });
                    (run_id, result)
                })
                .collect()
        });
        for (run_id, result) in results {
            out.insert(run_id, result?);
        }
    }
    Ok(out)
}
