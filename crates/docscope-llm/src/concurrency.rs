//! Bounded fork-join over fallible futures.

use std::future::Future;

use futures::stream::{self, StreamExt, TryStreamExt};

/// Drive `futures` with at most `limit` in flight and collect their outputs
/// in input order. The first error aborts the whole join.
pub async fn try_join_bounded<I, F, T, E>(futures: I, limit: usize) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    stream::iter(futures)
        .buffered(limit.max(1))
        .try_collect()
        .await
}
