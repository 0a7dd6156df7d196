//! Async glue between the engine's fetch outbox and a [`DataSource`].

use futures_util::future::join_all;
use layers::MapRuntime;
use streaming::{DataSource, execute};
use tracing::debug;

use crate::engine::MapEngine;

/// Runs queued fetches concurrently and delivers the results, repeating
/// while deliveries queue more work, for at most `max_rounds` rounds.
/// Returns the number of delivered outcomes.
pub async fn pump<R, S>(engine: &mut MapEngine<R>, source: &S, max_rounds: usize) -> usize
where
    R: MapRuntime,
    S: DataSource + ?Sized,
{
    let mut delivered = 0;
    for round in 0..max_rounds {
        let jobs = engine.take_fetch_jobs();
        if jobs.is_empty() {
            break;
        }
        debug!(round, jobs = jobs.len(), "running fetch round");
        let outcomes = join_all(jobs.into_iter().map(|job| execute(source, job))).await;
        for outcome in outcomes {
            engine.deliver(outcome);
            delivered += 1;
        }
    }
    delivered
}
