//! Bounded-parallelism task runner

use crate::error::EngineError;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::pin::Pin;

/// A deferred unit of work
pub type Task<T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'static>>;

/// Run `tasks` with at most `limit` in flight
///
/// Each task is spawned onto the tokio runtime. Every task runs to completion
/// even if an earlier one fails; results come back in submission order and
/// the first failure (in submission order) is returned instead.
pub async fn run_bounded<T>(tasks: Vec<Task<T>>, limit: usize) -> Result<Vec<T>, EngineError>
where
    T: Send + 'static,
{
    let limit = limit.max(1);

    let mut results: Vec<(usize, Result<T, EngineError>)> = stream::iter(tasks.into_iter().enumerate())
        .map(|(index, task)| async move {
            let result = match tokio::spawn(task).await {
                Ok(result) => result,
                Err(join) => Err(EngineError::TaskPanicked(join.to_string())),
            };
            (index, result)
        })
        .buffer_unordered(limit)
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}
