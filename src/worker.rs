use {
    super::{context::Context, coordinator::Coordinator, mapper::TryMapper, work::WorkItem},
    crossbeam_channel::{select, Receiver, Sender},
};

/// A worker's report for one item.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Delivery<R> {
    Done { index: usize, value: R },
    Failed { index: usize },
}

/// The body of one worker thread.
///
/// Pulls items until the job channel closes or the run is cancelled. A
/// failure is reported to the collector, recorded with the coordinator, and
/// ends this worker.
pub(crate) fn work<T, M>(
    mut mapper: M,
    jobs: Receiver<WorkItem<T>>,
    results: Sender<Delivery<M::Out>>,
    coordinator: &Coordinator<M::Error>,
) where
    M: TryMapper<T>,
{
    let _guard = coordinator.panic_guard();
    let scope = coordinator.scope();

    loop {
        let item = select! {
            recv(jobs) -> msg => match msg {
                Ok(item) => item,
                Err(_) => return,
            },
            recv(scope.done()) -> _ => {
                coordinator.observe_cancel();
                return;
            }
        };
        if scope.is_cancelled() {
            coordinator.observe_cancel();
            return;
        }

        let WorkItem { index, value } = item;
        match mapper.apply(scope, value) {
            Ok(value) => {
                if !deliver(&results, Delivery::Done { index, value }, scope) {
                    coordinator.observe_cancel();
                    return;
                }
                tracing::trace!(index, "item done");
            }
            Err(error) => {
                deliver(&results, Delivery::Failed { index }, scope);
                if coordinator.fail(index, error) {
                    tracing::debug!(index, "item failed, cancelling run");
                }
                return;
            }
        }
    }
}

/// Sends to the collector unless the run is cancelled first. Only a bounded
/// result channel can block here.
fn deliver<R>(results: &Sender<Delivery<R>>, delivery: Delivery<R>, scope: &Context) -> bool {
    select! {
        send(results, delivery) -> res => res.is_ok(),
        recv(scope.done()) -> _ => false,
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{coordinator::Abort, work::sequence},
    };

    fn double_or_fail(_: &Context, x: i32) -> Result<i32, String> {
        if x < 0 {
            Err(format!("negative: {}", x))
        } else {
            Ok(x * 2)
        }
    }

    #[test]
    fn test_worker_drains_until_closed() {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        for item in sequence(vec![1, 2, 3]) {
            job_tx.send(item).unwrap();
        }
        drop(job_tx);

        let coordinator = Coordinator::new(&Context::background());
        work(double_or_fail, job_rx, result_tx, &coordinator);

        let got: Vec<_> = result_rx.iter().collect();
        assert_eq!(
            got,
            vec![
                Delivery::Done { index: 0, value: 2 },
                Delivery::Done { index: 1, value: 4 },
                Delivery::Done { index: 2, value: 6 },
            ]
        );
        assert!(coordinator.into_abort().is_none());
    }

    #[test]
    fn test_worker_stops_at_first_failure() {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        for item in sequence(vec![1, -2, 3]) {
            job_tx.send(item).unwrap();
        }
        drop(job_tx);

        let coordinator = Coordinator::new(&Context::background());
        work(double_or_fail, job_rx.clone(), result_tx, &coordinator);

        let got: Vec<_> = result_rx.iter().collect();
        assert_eq!(
            got,
            vec![
                Delivery::Done { index: 0, value: 2 },
                Delivery::Failed { index: 1 },
            ]
        );
        assert_eq!(job_rx.len(), 1);
        match coordinator.into_abort() {
            Some(Abort::Failed { index, error }) => {
                assert_eq!(index, 1);
                assert_eq!(error, "negative: -2");
            }
            other => panic!("unexpected abort: {:?}", other),
        }
    }

    #[test]
    fn test_worker_exits_on_cancelled_scope() {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        job_tx.send(WorkItem { index: 0, value: 1 }).unwrap();

        let (parent, cancel) = Context::background().with_cancel();
        let coordinator = Coordinator::new(&parent);
        cancel.cancel();
        work(double_or_fail, job_rx, result_tx, &coordinator);

        assert!(result_rx.try_recv().is_err());
        assert!(matches!(coordinator.into_abort(), Some(Abort::Cancelled(_))));
    }

    #[test]
    fn test_blocked_delivery_abandoned_on_cancel() {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        // Nobody ever reads from this rendezvous channel.
        let (result_tx, result_rx) = crossbeam_channel::bounded(0);
        job_tx.send(WorkItem { index: 0, value: 7 }).unwrap();

        let (parent, cancel) = Context::background().with_cancel();
        let coordinator = Coordinator::new(&parent);
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            cancel.cancel();
        });
        work(double_or_fail, job_rx, result_tx, &coordinator);
        canceller.join().unwrap();

        assert!(result_rx.try_recv().is_err());
        assert!(matches!(
            coordinator.into_abort(),
            Some(Abort::Cancelled(crate::context::Cancelled::Canceled))
        ));
        drop(job_tx);
    }
}
