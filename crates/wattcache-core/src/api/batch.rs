use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Run `f` over `items` one at a time, pausing `delay` between items.
///
/// There is no pause after the last item. Results come back in input order.
pub async fn run_batch<I, T, F, Fut>(items: I, delay: Duration, mut f: F) -> Vec<Fut::Output>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future,
{
    let mut items = items.into_iter().peekable();
    let mut results = Vec::new();
    let mut index = 0usize;

    while let Some(item) = items.next() {
        debug!(index, "Batch item");
        results.push(f(item).await);
        index += 1;
        if items.peek().is_some() && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    results
}
