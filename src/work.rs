use {
    super::context::Context,
    crossbeam_channel::{select, Sender},
};

/// One input value tagged with its position in the input.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct WorkItem<T> {
    pub(crate) index: usize,
    pub(crate) value: T,
}

/// Pairs every input with its original position, preserving order.
pub(crate) fn sequence<T>(input: Vec<T>) -> impl ExactSizeIterator<Item = WorkItem<T>> {
    input
        .into_iter()
        .enumerate()
        .map(|(index, value)| WorkItem { index, value })
}

/// How the distributor finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Every item was handed to a worker.
    Exhausted { published: usize },
    /// Cancellation, or the loss of every worker, stopped publishing early.
    Stopped { published: usize },
}

/// Publishes items one at a time until they run out or `stop` is cancelled.
///
/// Each send races against `stop`, so a send blocked on busy workers is
/// abandoned as soon as the run is cancelled. Dropping `jobs` on return
/// tells the workers no more items are coming.
pub(crate) fn distribute<T, I>(items: I, jobs: Sender<WorkItem<T>>, stop: &Context) -> Dispatch
where
    I: IntoIterator<Item = WorkItem<T>>,
{
    let mut published = 0;
    for item in items {
        // When both arms below are ready select! picks one at random, so an
        // already cancelled run must be caught here.
        if stop.is_cancelled() {
            return Dispatch::Stopped { published };
        }
        let index = item.index;
        select! {
            send(jobs, item) -> res => {
                if res.is_err() {
                    return Dispatch::Stopped { published };
                }
                tracing::trace!(index, "dispatched item");
                published += 1;
            }
            recv(stop.done()) -> _ => return Dispatch::Stopped { published },
        }
    }
    Dispatch::Exhausted { published }
}
